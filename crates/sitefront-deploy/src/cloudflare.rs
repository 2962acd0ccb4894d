//! Cloudflare zone cache purge.
//!
//! Purges the whole zone; purging by hostname is only available on the
//! enterprise plan.

use crate::config::CloudflareCredentials;
use crate::error::PurgeError;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tracing::debug;

pub const CLOUDFLARE_API_BASE: &str = "https://api.cloudflare.com/client/v4";

/// Identifier Cloudflare returns for an accepted purge.
#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
pub struct PurgeReceipt {
    pub id: String,
}

/// Purges a third-party CDN zone.
#[async_trait]
pub trait ZonePurger: Send + Sync {
    async fn purge_everything(
        &self,
        credentials: &CloudflareCredentials,
    ) -> Result<PurgeReceipt, PurgeError>;
}

#[derive(Debug, Serialize)]
struct PurgeRequest {
    purge_everything: bool,
}

#[derive(Debug, Deserialize)]
struct ApiEnvelope {
    #[serde(default)]
    success: bool,
    #[serde(default)]
    errors: Vec<ApiMessage>,
    result: Option<PurgeResult>,
}

#[derive(Debug, Deserialize)]
struct ApiMessage {
    code: i64,
    message: String,
}

#[derive(Debug, Deserialize)]
struct PurgeResult {
    id: String,
}

fn describe_errors(errors: &[ApiMessage]) -> String {
    if errors.is_empty() {
        return "no error details".to_string();
    }
    errors
        .iter()
        .map(|e| format!("[{}] {}", e.code, e.message))
        .collect::<Vec<_>>()
        .join("; ")
}

/// Cloudflare v4 API client.
#[derive(Debug, Clone)]
pub struct CloudflareClient {
    api_base: String,
    http_client: reqwest::Client,
}

impl CloudflareClient {
    pub fn new(api_base: impl Into<String>) -> Result<Self, PurgeError> {
        let http_client = reqwest::Client::builder()
            .user_agent(concat!("sitefront/", env!("CARGO_PKG_VERSION")))
            .build()?;

        Ok(Self {
            api_base: api_base.into().trim_end_matches('/').to_string(),
            http_client,
        })
    }

    fn purge_url(&self, zone_id: &str) -> String {
        format!("{}/zones/{}/purge_cache", self.api_base, zone_id)
    }
}

#[async_trait]
impl ZonePurger for CloudflareClient {
    async fn purge_everything(
        &self,
        credentials: &CloudflareCredentials,
    ) -> Result<PurgeReceipt, PurgeError> {
        let url = self.purge_url(&credentials.zone_id);
        debug!(zone_id = %credentials.zone_id, "Requesting Cloudflare purge_everything");

        let response = self
            .http_client
            .post(&url)
            .header("X-Auth-Email", &credentials.email)
            .header("X-Auth-Key", &credentials.api_key)
            .json(&PurgeRequest {
                purge_everything: true,
            })
            .send()
            .await?;

        let status = response.status();
        let body = response.text().await?;

        let envelope: ApiEnvelope = match serde_json::from_str(&body) {
            Ok(envelope) => envelope,
            Err(_) => {
                return Err(PurgeError::Rejected {
                    status: status.as_u16(),
                    message: body,
                })
            }
        };

        if !status.is_success() || !envelope.success {
            return Err(PurgeError::Rejected {
                status: status.as_u16(),
                message: describe_errors(&envelope.errors),
            });
        }

        envelope
            .result
            .map(|result| PurgeReceipt { id: result.id })
            .ok_or(PurgeError::MissingResult)
    }
}
