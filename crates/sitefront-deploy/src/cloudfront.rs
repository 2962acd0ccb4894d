//! CloudFront cache invalidation.

use crate::error::InvalidationError;
use async_trait::async_trait;
use aws_config::BehaviorVersion;
use aws_sdk_cloudfront::error::DisplayErrorContext;
use aws_sdk_cloudfront::types::{InvalidationBatch, Paths};
use aws_sdk_cloudfront::Client;
use serde::Serialize;
use tracing::debug;

/// Path pattern covering every object in a distribution.
pub const INVALIDATE_ALL_PATH: &str = "/*";

/// What CloudFront reported for a created invalidation.
#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
pub struct InvalidationReceipt {
    pub invalidation_id: String,
    /// Usually `InProgress` right after creation.
    pub status: String,
}

/// Discards every cached object of one distribution.
#[async_trait]
pub trait DistributionInvalidator: Send + Sync {
    async fn invalidate_all(
        &self,
        distribution_id: &str,
    ) -> Result<InvalidationReceipt, InvalidationError>;
}

/// Invalidator backed by the AWS SDK.
#[derive(Debug, Clone)]
pub struct CloudFrontInvalidator {
    client: Client,
}

impl CloudFrontInvalidator {
    pub fn new(client: Client) -> Self {
        Self { client }
    }

    /// Build a client from the default AWS credential and region chain.
    pub async fn from_env() -> Self {
        let config = aws_config::load_defaults(BehaviorVersion::latest()).await;
        Self::new(Client::new(&config))
    }
}

/// CloudFront deduplicates requests by caller reference; a timestamp keeps
/// each deploy distinct.
fn caller_reference() -> String {
    chrono::Utc::now().timestamp_millis().to_string()
}

fn invalidate_all_batch(caller_reference: String) -> Result<InvalidationBatch, InvalidationError> {
    let paths = Paths::builder()
        .quantity(1)
        .items(INVALIDATE_ALL_PATH)
        .build()
        .map_err(|e| InvalidationError::Request(e.to_string()))?;

    InvalidationBatch::builder()
        .paths(paths)
        .caller_reference(caller_reference)
        .build()
        .map_err(|e| InvalidationError::Request(e.to_string()))
}

#[async_trait]
impl DistributionInvalidator for CloudFrontInvalidator {
    async fn invalidate_all(
        &self,
        distribution_id: &str,
    ) -> Result<InvalidationReceipt, InvalidationError> {
        let batch = invalidate_all_batch(caller_reference())?;
        debug!(distribution_id, caller_reference = %batch.caller_reference(), "Creating invalidation");

        let response = self
            .client
            .create_invalidation()
            .distribution_id(distribution_id)
            .invalidation_batch(batch)
            .send()
            .await
            .map_err(|e| InvalidationError::Api(DisplayErrorContext(&e).to_string()))?;

        let invalidation = response
            .invalidation()
            .ok_or_else(|| InvalidationError::EmptyResponse(distribution_id.to_string()))?;

        Ok(InvalidationReceipt {
            invalidation_id: invalidation.id().to_string(),
            status: invalidation.status().to_string(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_batch_covers_all_paths() {
        let batch = invalidate_all_batch("12345".to_string()).expect("batch");
        let paths = batch.paths().expect("paths");
        assert_eq!(paths.quantity(), 1);
        assert_eq!(batch.caller_reference(), "12345");
    }

    #[test]
    fn test_caller_reference_is_epoch_millis() {
        let reference = caller_reference();
        assert!(reference.parse::<i64>().expect("numeric") > 1_600_000_000_000);
    }
}
