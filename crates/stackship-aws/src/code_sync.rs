//! Uploads frontend assets to S3 and pushes Lambda code.

use anyhow::{bail, Context, Result};
use async_trait::async_trait;
use aws_config::SdkConfig;
use aws_sdk_s3::primitives::ByteStream;
use stackship_core::CodeSync;
use std::io::{Cursor, Write};
use std::path::{Path, PathBuf};
use tracing::{debug, info};
use walkdir::WalkDir;
use zip::write::FileOptions;
use zip::{CompressionMethod, ZipWriter};

pub struct AwsCodeSync {
    s3: aws_sdk_s3::Client,
    lambda: aws_sdk_lambda::Client,
}

impl AwsCodeSync {
    pub fn new(config: &SdkConfig) -> Self {
        Self {
            s3: aws_sdk_s3::Client::new(config),
            lambda: aws_sdk_lambda::Client::new(config),
        }
    }
}

#[async_trait]
impl CodeSync for AwsCodeSync {
    async fn sync_frontend(&self, bucket: &str, source_dir: &Path) -> Result<()> {
        let files = collect_files(source_dir)?;
        if files.is_empty() {
            bail!("No files to upload in {}", source_dir.display());
        }

        for (key, path) in &files {
            let body = ByteStream::from_path(path)
                .await
                .with_context(|| format!("Failed to read {}", path.display()))?;

            self.s3
                .put_object()
                .bucket(bucket)
                .key(key)
                .content_type(content_type_for(path))
                .body(body)
                .send()
                .await
                .with_context(|| format!("Failed to upload s3://{}/{}", bucket, key))?;

            debug!(bucket, key = %key, "Uploaded object");
        }

        info!(bucket, files = files.len(), "Frontend assets uploaded");
        Ok(())
    }

    async fn update_function_code(&self, function_name: &str, source_dir: &Path) -> Result<()> {
        let package = zip_directory(source_dir)?;
        let size = package.len();

        self.lambda
            .update_function_code()
            .function_name(function_name)
            .zip_file(package.into())
            .send()
            .await
            .with_context(|| format!("Failed to update code for function {}", function_name))?;

        info!(function_name, bytes = size, "Function code updated");
        Ok(())
    }
}

/// Regular files under `dir` as `(object key, path)`, keys using `/`
pub(crate) fn collect_files(dir: &Path) -> Result<Vec<(String, PathBuf)>> {
    if !dir.is_dir() {
        bail!("Source directory {} does not exist", dir.display());
    }

    let mut files = Vec::new();
    for entry in WalkDir::new(dir).sort_by_file_name() {
        let entry =
            entry.with_context(|| format!("Failed to walk source directory {}", dir.display()))?;
        if !entry.file_type().is_file() {
            continue;
        }

        let relative = entry
            .path()
            .strip_prefix(dir)
            .with_context(|| format!("{} is outside {}", entry.path().display(), dir.display()))?;
        let key = relative
            .components()
            .map(|c| c.as_os_str().to_string_lossy())
            .collect::<Vec<_>>()
            .join("/");
        files.push((key, entry.path().to_path_buf()));
    }
    Ok(files)
}

/// Deflate-compressed archive of every file under `dir`, in memory
pub fn zip_directory(dir: &Path) -> Result<Vec<u8>> {
    let files = collect_files(dir)?;
    if files.is_empty() {
        bail!("No files to package in {}", dir.display());
    }

    let mut zip = ZipWriter::new(Cursor::new(Vec::new()));
    let options = FileOptions::default()
        .compression_method(CompressionMethod::Deflated)
        .unix_permissions(0o644);

    for (name, path) in &files {
        let contents =
            std::fs::read(path).with_context(|| format!("Failed to read {}", path.display()))?;
        zip.start_file(name.as_str(), options)
            .with_context(|| format!("Failed to add {} to archive", name))?;
        zip.write_all(&contents)
            .with_context(|| format!("Failed to write {} to archive", name))?;
    }

    let cursor = zip.finish().context("Failed to finish archive")?;
    Ok(cursor.into_inner())
}

/// MIME type served by S3 website hosting for a file
pub fn content_type_for(path: &Path) -> &'static str {
    let extension = path
        .extension()
        .and_then(|e| e.to_str())
        .map(str::to_ascii_lowercase)
        .unwrap_or_default();

    match extension.as_str() {
        "html" | "htm" => "text/html; charset=utf-8",
        "css" => "text/css; charset=utf-8",
        "js" | "mjs" => "application/javascript",
        "json" | "map" => "application/json",
        "txt" => "text/plain; charset=utf-8",
        "xml" => "application/xml",
        "svg" => "image/svg+xml",
        "png" => "image/png",
        "jpg" | "jpeg" => "image/jpeg",
        "gif" => "image/gif",
        "webp" => "image/webp",
        "ico" => "image/x-icon",
        "woff" => "font/woff",
        "woff2" => "font/woff2",
        "ttf" => "font/ttf",
        "wasm" => "application/wasm",
        "pdf" => "application/pdf",
        _ => "application/octet-stream",
    }
}
