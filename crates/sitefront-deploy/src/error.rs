//! Error types for the deploy pipeline and its clients.

use sitefront_stack::StackError;
use thiserror::Error;

/// Errors from launching or running an external command.
#[derive(Error, Debug)]
pub enum RunnerError {
    #[error("Stage command is empty")]
    EmptyCommand,

    #[error("Failed to launch `{command}`: {source}")]
    Launch {
        command: String,
        #[source]
        source: std::io::Error,
    },

    #[error("`{command}` exited with code {exit_code}")]
    Failed {
        command: String,
        exit_code: i32,
        stdout: String,
        stderr: String,
    },
}

impl RunnerError {
    /// Exit code of a command that ran and failed.
    pub fn exit_code(&self) -> Option<i32> {
        match self {
            RunnerError::Failed { exit_code, .. } => Some(*exit_code),
            _ => None,
        }
    }
}

/// Errors reading the deploy output manifest.
#[derive(Error, Debug)]
pub enum ManifestError {
    #[error("Failed to read output manifest {path}: {source}")]
    Read {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("Output manifest is not valid JSON: {0}")]
    Parse(#[from] serde_json::Error),
}

/// Errors creating a CloudFront invalidation.
#[derive(Error, Debug)]
pub enum InvalidationError {
    #[error("Stack {stack} has no distribution id output")]
    MissingDistributionId { stack: String },

    #[error("Invalid invalidation request: {0}")]
    Request(String),

    #[error("CloudFront API error: {0}")]
    Api(String),

    #[error("CloudFront returned no invalidation for {0}")]
    EmptyResponse(String),
}

/// Errors syncing a site's build output into its bucket.
#[derive(Error, Debug)]
pub enum UploadError {
    #[error("Build output {0} is not a directory")]
    MissingSource(String),

    #[error("Build output {0} contains no files")]
    EmptySource(String),

    #[error("Failed to read {path}: {reason}")]
    Read { path: String, reason: String },

    #[error("Invalid S3 request: {0}")]
    Request(String),

    #[error("S3 API error: {0}")]
    Api(String),
}

/// Errors purging the Cloudflare zone cache.
#[derive(Error, Debug)]
pub enum PurgeError {
    #[error("HTTP error: {0}")]
    Http(String),

    #[error("Cloudflare rejected purge (HTTP {status}): {message}")]
    Rejected { status: u16, message: String },

    #[error("Cloudflare response carried no purge id")]
    MissingResult,
}

impl From<reqwest::Error> for PurgeError {
    fn from(err: reqwest::Error) -> Self {
        PurgeError::Http(err.to_string())
    }
}

/// Errors surfaced by the deploy pipeline.
#[derive(Error, Debug)]
pub enum DeployError {
    #[error("Failed to load site descriptor {path}: {source}")]
    Descriptor {
        path: String,
        #[source]
        source: StackError,
    },

    #[error("Synthesis failed: {0}")]
    Synthesis(#[from] StackError),

    #[error("Upload for stack {stack} failed: {source}")]
    Upload {
        stack: String,
        #[source]
        source: UploadError,
    },

    #[error("Stage {stage} failed: {source}")]
    Command {
        stage: &'static str,
        #[source]
        source: RunnerError,
    },

    #[error(transparent)]
    Manifest(#[from] ManifestError),

    #[error("{failed} of {total} CloudFront invalidations failed")]
    Invalidation { failed: usize, total: usize },

    #[error(transparent)]
    Purge(#[from] PurgeError),

    #[error("Failed to delete {path}: {source}")]
    Cleanup {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Result type for deploy operations.
pub type Result<T> = std::result::Result<T, DeployError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_runner_failed_display_and_exit_code() {
        let err = RunnerError::Failed {
            command: "cdk deploy --all".to_string(),
            exit_code: 2,
            stdout: String::new(),
            stderr: "boom".to_string(),
        };
        assert_eq!(err.exit_code(), Some(2));
        assert!(err.to_string().contains("cdk deploy --all"));
        assert!(err.to_string().contains("code 2"));
    }

    #[test]
    fn test_command_error_names_stage() {
        let err = DeployError::Command {
            stage: "deploy_infra",
            source: RunnerError::EmptyCommand,
        };
        assert!(err.to_string().contains("deploy_infra"));
    }

    #[test]
    fn test_invalidation_summary_display() {
        let err = DeployError::Invalidation {
            failed: 1,
            total: 3,
        };
        assert_eq!(err.to_string(), "1 of 3 CloudFront invalidations failed");
    }
}
