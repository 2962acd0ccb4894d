//! Error types for stack definition and synthesis.

use thiserror::Error;

/// Errors produced while validating a descriptor or writing a template.
#[derive(Error, Debug)]
pub enum StackError {
    #[error("invalid descriptor for {site}: {reason}")]
    InvalidDescriptor { site: String, reason: String },

    #[error("app descriptor declares no sites")]
    NoSites,

    #[error("duplicate stack name: {0}")]
    DuplicateStack(String),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl StackError {
    pub(crate) fn invalid(site: &str, reason: impl Into<String>) -> Self {
        StackError::InvalidDescriptor {
            site: site.to_string(),
            reason: reason.into(),
        }
    }
}

/// Result type for stack operations.
pub type Result<T> = std::result::Result<T, StackError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_invalid_descriptor_display() {
        let err = StackError::invalid("example.com", "certificate_arn is required");
        let msg = err.to_string();
        assert!(msg.contains("example.com"));
        assert!(msg.contains("certificate_arn is required"));
    }
}
