//! Fire-and-forget dispatch handle.
//!
//! The registration front end enqueues work through this handle and
//! carries on; delivery to the queue is awaited, but processing is not.

use std::sync::Arc;

use tracing::{error, info};
use uuid::Uuid;

use crate::queue::WorkQueue;
use crate::request::{RegistrationAttrs, WorkRequest};

/// Handle for submitting work to the provisioning queue.
#[derive(Clone)]
pub struct WorkerApi {
    queue: Arc<WorkQueue>,
}

impl WorkerApi {
    #[must_use]
    pub fn new(queue: Arc<WorkQueue>) -> Self {
        Self { queue }
    }

    async fn submit(&self, request: WorkRequest) -> Option<Uuid> {
        match self.queue.enqueue(&request).await {
            Ok(id) => Some(id),
            Err(e) => {
                error!(kind = request.kind(), error = %e, "Failed to enqueue request");
                None
            }
        }
    }

    /// Queue full provisioning for a freshly registered identity.
    pub async fn create_user(&self, attrs: RegistrationAttrs) -> Option<Uuid> {
        info!(email = %attrs.mail, "Queueing account creation");
        self.submit(WorkRequest::CreateUser { attrs }).await
    }

    /// Queue an ORCID refresh for an existing account.
    pub async fn refresh_orcid(&self, account_id: i64, email: Option<String>) -> Option<Uuid> {
        self.submit(WorkRequest::RefreshOrcid { account_id, email })
            .await
    }

    /// Queue a push of the stored profile out to the directory.
    pub async fn sync_directory_user(
        &self,
        account_id: i64,
        set_username_as_email: bool,
    ) -> Option<Uuid> {
        self.submit(WorkRequest::SyncDirectoryUser {
            account_id,
            set_username_as_email,
        })
        .await
    }
}
