//! Seams for the services a deployment delegates to.

use anyhow::Result;
use async_trait::async_trait;
use std::path::Path;
use std::sync::Arc;

/// Pushes application code into provisioned resources
#[async_trait]
pub trait CodeSync: Send + Sync {
    /// Upload every file under `source_dir` to the bucket
    async fn sync_frontend(&self, bucket: &str, source_dir: &Path) -> Result<()>;

    /// Replace the function's code with the contents of `source_dir`
    async fn update_function_code(&self, function_name: &str, source_dir: &Path) -> Result<()>;
}

#[async_trait]
impl<T: CodeSync + ?Sized> CodeSync for Arc<T> {
    async fn sync_frontend(&self, bucket: &str, source_dir: &Path) -> Result<()> {
        (**self).sync_frontend(bucket, source_dir).await
    }

    async fn update_function_code(&self, function_name: &str, source_dir: &Path) -> Result<()> {
        (**self).update_function_code(function_name, source_dir).await
    }
}

/// Hook run before a stack is touched, e.g. to take an external advisory
/// lock keyed by stack name. `release` runs once the attempt finishes,
/// whether it succeeded or not.
#[async_trait]
pub trait DeployPrecondition: Send + Sync {
    async fn acquire(&self, stack_name: &str) -> Result<()>;

    async fn release(&self, _stack_name: &str) -> Result<()> {
        Ok(())
    }
}

#[async_trait]
impl<T: DeployPrecondition + ?Sized> DeployPrecondition for Arc<T> {
    async fn acquire(&self, stack_name: &str) -> Result<()> {
        (**self).acquire(stack_name).await
    }

    async fn release(&self, stack_name: &str) -> Result<()> {
        (**self).release(stack_name).await
    }
}

/// Default precondition: no coordination
#[derive(Debug, Clone, Copy, Default)]
pub struct AlwaysProceed;

#[async_trait]
impl DeployPrecondition for AlwaysProceed {
    async fn acquire(&self, _stack_name: &str) -> Result<()> {
        Ok(())
    }
}

/// Lists names already taken in the account, for conflict checks
#[async_trait]
pub trait ExistingNames: Send + Sync {
    async fn existing_names(&self) -> Result<Vec<String>>;
}
