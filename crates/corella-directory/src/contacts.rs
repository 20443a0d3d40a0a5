//! External contact-directory sync.
//!
//! The support system keeps its own contact records. New accounts are
//! pushed there as a courtesy; the pipeline treats this as best-effort
//! and never fails on it.

use async_trait::async_trait;
use reqwest::Client;
use serde::Serialize;
use tracing::debug;

use crate::error::{DirectoryError, DirectoryResult};

/// A contact record pushed to the external directory.
#[derive(Debug, Clone, Serialize)]
pub struct Contact {
    pub email: String,
    pub full_name: String,
}

/// Outbound contact-sync seam; implemented by [`RestContactDirectory`]
/// and by fakes in tests.
#[async_trait]
pub trait ContactDirectory: Send + Sync {
    /// Create or update the contact record for an account.
    async fn upsert_contact(&self, contact: &Contact) -> DirectoryResult<()>;
}

/// Contact directory reached over a REST endpoint with API-key auth.
pub struct RestContactDirectory {
    http: Client,
    base_url: String,
    api_key: Option<String>,
}

impl RestContactDirectory {
    #[must_use]
    pub fn new(base_url: String, api_key: Option<String>) -> Self {
        Self {
            http: Client::new(),
            base_url,
            api_key,
        }
    }
}

#[async_trait]
impl ContactDirectory for RestContactDirectory {
    async fn upsert_contact(&self, contact: &Contact) -> DirectoryResult<()> {
        let mut request = self
            .http
            .post(format!("{}/contacts", self.base_url))
            .json(contact);
        if let Some(key) = &self.api_key {
            request = request.basic_auth(key, None::<&str>);
        }

        let response = request.send().await.map_err(DirectoryError::connection)?;
        let status = response.status();
        if !status.is_success() {
            let text = response.text().await.unwrap_or_default();
            return Err(DirectoryError::from_status(status, &contact.email, &text));
        }

        debug!(email = %contact.email, "Synced contact");
        Ok(())
    }
}
