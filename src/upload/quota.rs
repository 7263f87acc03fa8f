//! Quota/entitlement collaborator, consulted before any storage write.

use anyhow::{Context, Result};
use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};

/// Decision returned by the quota collaborator. `message` is shown to
/// the user verbatim when the upload is denied.
#[derive(Debug, Clone, Deserialize)]
pub struct QuotaDecision {
    pub allowed: bool,
    #[serde(default)]
    pub message: String,
}

/// Gates whether a given user may perform another video upload.
#[async_trait]
pub trait QuotaService: Send + Sync {
    async fn check_allowance(&self, user_id: &str) -> Result<QuotaDecision>;
}

#[derive(Debug, Serialize)]
struct AllowanceRequest<'a> {
    user_id: &'a str,
}

/// JSON-over-HTTP quota endpoint.
pub struct HttpQuotaService {
    client: Client,
    endpoint: String,
}

impl HttpQuotaService {
    pub fn new(endpoint: impl Into<String>) -> Self {
        Self {
            client: Client::new(),
            endpoint: endpoint.into(),
        }
    }
}

#[async_trait]
impl QuotaService for HttpQuotaService {
    async fn check_allowance(&self, user_id: &str) -> Result<QuotaDecision> {
        let decision = self
            .client
            .post(&self.endpoint)
            .json(&AllowanceRequest { user_id })
            .send()
            .await
            .context("Failed to reach quota service")?
            .error_for_status()
            .context("Quota service returned error status")?
            .json()
            .await
            .context("Failed to parse quota decision")?;

        Ok(decision)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn allowance_request_serialization() {
        let request = AllowanceRequest { user_id: "user-42" };
        let json = serde_json::to_string(&request).unwrap();
        assert!(json.contains("user-42"));
    }

    #[test]
    fn decision_parses_with_and_without_message() {
        let denied: QuotaDecision =
            serde_json::from_str(r#"{"allowed": false, "message": "Upgrade to continue"}"#)
                .unwrap();
        assert!(!denied.allowed);
        assert_eq!(denied.message, "Upgrade to continue");

        let allowed: QuotaDecision = serde_json::from_str(r#"{"allowed": true}"#).unwrap();
        assert!(allowed.allowed);
        assert!(allowed.message.is_empty());
    }
}
