// stackship - Deploy simple web applications to AWS through CloudFormation
//
// The binary wires configuration loading, tracing and the AWS adapters
// around the stackship-core orchestrator.

pub mod commands;
mod init;

pub use init::init_tracing;
