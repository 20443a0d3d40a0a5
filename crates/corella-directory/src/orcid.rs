//! ORCID enrichment client.
//!
//! Looks up ORCID identifiers in the public ORCID directory. Transient
//! server errors (500/503) are retried with a fixed delay up to a
//! configured attempt count; any other HTTP error propagates
//! immediately. The email-to-ORCID relation is one-to-one-or-none: a
//! query matching more than one record is an invariant violation and
//! yields a fatal, non-retryable error.

use async_trait::async_trait;
use reqwest::{Client, StatusCode};
use serde_json::Value;
use std::time::Duration;
use thiserror::Error;
use tokio::sync::RwLock;
use tracing::{debug, warn};

/// ORCID client errors.
#[derive(Debug, Error)]
pub enum OrcidError {
    /// Transport-level failure.
    #[error("orcid request failed: {0}")]
    Http(#[from] reqwest::Error),

    /// Terminal HTTP error (after retries for 500/503).
    #[error("orcid request failed with status {status}")]
    Status { status: u16 },

    /// More than one ORCID record matched a single email.
    #[error("email to ORCID mapping not unique for {email}")]
    DuplicateMapping { email: String },

    /// Unexpected response shape.
    #[error("orcid protocol error: {message}")]
    Protocol { message: String },
}

impl OrcidError {
    /// Whether this error is a hard invariant violation that must not
    /// be retried or converted to a soft failure.
    #[must_use]
    pub fn is_fatal(&self) -> bool {
        matches!(self, OrcidError::DuplicateMapping { .. })
    }
}

/// Lookup seam for the orchestrator; implemented by [`OrcidClient`] and
/// by fakes in tests.
#[async_trait]
pub trait OrcidLookup: Send + Sync {
    /// Look up the ORCID identifier registered for an email address.
    async fn search_by_email(&self, email: &str) -> Result<Option<String>, OrcidError>;
}

/// ORCID client configuration.
#[derive(Debug, Clone)]
pub struct OrcidConfig {
    /// Public API root, e.g. `https://pub.orcid.org/v3.0`.
    pub api_url: String,
    /// OAuth token endpoint, e.g. `https://orcid.org/oauth/token`.
    pub token_url: String,
    pub client_id: String,
    pub client_secret: String,
    /// Maximum attempts for a query hitting 500/503.
    pub max_attempts: u32,
    /// Fixed delay between retry attempts.
    pub retry_delay: Duration,
}

impl OrcidConfig {
    /// Production endpoints with the given credentials.
    #[must_use]
    pub fn public(client_id: String, client_secret: String) -> Self {
        Self {
            api_url: "https://pub.orcid.org/v3.0".to_string(),
            token_url: "https://orcid.org/oauth/token".to_string(),
            client_id,
            client_secret,
            max_attempts: 3,
            retry_delay: Duration::from_secs(5),
        }
    }
}

/// Client for the public ORCID search API.
pub struct OrcidClient {
    http: Client,
    config: OrcidConfig,
    token: RwLock<Option<String>>,
}

impl OrcidClient {
    #[must_use]
    pub fn new(config: OrcidConfig) -> Self {
        Self {
            http: Client::new(),
            config,
            token: RwLock::new(None),
        }
    }

    /// Obtain (or reuse) a read-public search token.
    async fn search_token(&self) -> Result<String, OrcidError> {
        if let Some(token) = self.token.read().await.clone() {
            return Ok(token);
        }

        let response = self
            .http
            .post(&self.config.token_url)
            .form(&[
                ("client_id", self.config.client_id.as_str()),
                ("client_secret", self.config.client_secret.as_str()),
                ("grant_type", "client_credentials"),
                ("scope", "/read-public"),
            ])
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            return Err(OrcidError::Status {
                status: status.as_u16(),
            });
        }

        let body: Value = response.json().await?;
        let token = body["access_token"]
            .as_str()
            .ok_or_else(|| OrcidError::Protocol {
                message: "token response missing access_token".to_string(),
            })?
            .to_string();

        *self.token.write().await = Some(token.clone());
        Ok(token)
    }

    fn is_retryable(status: StatusCode) -> bool {
        status == StatusCode::INTERNAL_SERVER_ERROR || status == StatusCode::SERVICE_UNAVAILABLE
    }

    /// Run a search query, retrying 500/503 responses with a fixed
    /// delay up to the configured attempt count.
    async fn search(&self, query: &str, rows: u32) -> Result<Value, OrcidError> {
        let token = self.search_token().await?;
        let max_attempts = self.config.max_attempts.max(1);
        let rows = rows.to_string();
        let mut attempt = 1;

        loop {
            let response = self
                .http
                .get(format!("{}/search", self.config.api_url))
                .query(&[("q", query), ("rows", rows.as_str())])
                .bearer_auth(&token)
                .header("Accept", "application/json")
                .send()
                .await?;

            let status = response.status();
            if status.is_success() {
                return Ok(response.json().await?);
            }

            if Self::is_retryable(status) && attempt < max_attempts {
                warn!(
                    query,
                    status = status.as_u16(),
                    attempt,
                    "ORCID search failed, retrying"
                );
                attempt += 1;
                tokio::time::sleep(self.config.retry_delay).await;
                continue;
            }

            return Err(OrcidError::Status {
                status: status.as_u16(),
            });
        }
    }

    fn result_orcid(result: &Value) -> Option<String> {
        result["orcid-identifier"]["path"].as_str().map(str::to_string)
    }

    /// Free-text search returning all matching identifiers.
    pub async fn search_by_text(&self, text: &str) -> Result<Vec<String>, OrcidError> {
        let body = self.search(&format!("text:{text}"), 100).await?;
        // The result list occasionally contains nulls.
        Ok(body["result"]
            .as_array()
            .map(|rows| rows.iter().filter_map(Self::result_orcid).collect())
            .unwrap_or_default())
    }

    /// Name search returning all matching identifiers.
    pub async fn search_by_names(
        &self,
        surname: &str,
        first_name: &str,
    ) -> Result<Vec<String>, OrcidError> {
        let query = format!("family-name:{surname}+AND+given-names:{first_name}");
        let body = self.search(&query, 100).await?;
        Ok(body["result"]
            .as_array()
            .map(|rows| rows.iter().filter_map(Self::result_orcid).collect())
            .unwrap_or_default())
    }
}

#[async_trait]
impl OrcidLookup for OrcidClient {
    async fn search_by_email(&self, email: &str) -> Result<Option<String>, OrcidError> {
        let body = self.search(&format!("email:{email}"), 2).await?;
        let num_found = body["num-found"].as_u64().unwrap_or(0);

        match num_found {
            0 => Ok(None),
            1 => {
                let result = body["result"]
                    .as_array()
                    .and_then(|rows| rows.first())
                    .and_then(Self::result_orcid)
                    .ok_or_else(|| OrcidError::Protocol {
                        message: "search result missing orcid-identifier".to_string(),
                    })?;
                debug!(email, orcid = %result, "ORCID found");
                Ok(Some(result))
            }
            n => {
                warn!(email, matches = n, "Multiple ORCID records for one email");
                Err(OrcidError::DuplicateMapping {
                    email: email.to_string(),
                })
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_retryable_statuses() {
        assert!(OrcidClient::is_retryable(StatusCode::INTERNAL_SERVER_ERROR));
        assert!(OrcidClient::is_retryable(StatusCode::SERVICE_UNAVAILABLE));
        assert!(!OrcidClient::is_retryable(StatusCode::BAD_GATEWAY));
        assert!(!OrcidClient::is_retryable(StatusCode::NOT_FOUND));
        assert!(!OrcidClient::is_retryable(StatusCode::TOO_MANY_REQUESTS));
    }

    #[test]
    fn test_duplicate_mapping_is_fatal() {
        let err = OrcidError::DuplicateMapping {
            email: "a@x.com".to_string(),
        };
        assert!(err.is_fatal());
        assert!(!OrcidError::Status { status: 500 }.is_fatal());
    }
}
