//! Provisioning worker.
//!
//! Background worker that drains the request queue: claims batches,
//! routes each request to the orchestrator, and records the outcome.
//! Handles retries, dead lettering, stale-claim release and graceful
//! shutdown.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::Semaphore;
use tokio::time::interval;
use tracing::{debug, error, info, instrument, warn};

use crate::manager::{Disposition, Manager, ManagerError};
use crate::queue::{QueuedRequest, WorkQueue};
use crate::request::WorkRequest;

/// Worker configuration.
#[derive(Debug, Clone)]
pub struct WorkerConfig {
    /// Number of requests processed concurrently.
    pub concurrency: usize,

    /// How often to poll the queue (in milliseconds).
    pub poll_interval_ms: u64,

    /// How often to release stale claims (in seconds).
    pub stale_release_interval_secs: u64,

    /// Maximum requests per poll.
    pub batch_size: i64,
}

impl Default for WorkerConfig {
    fn default() -> Self {
        Self {
            concurrency: 4,
            poll_interval_ms: 1000,
            stale_release_interval_secs: 300,
            batch_size: 10,
        }
    }
}

/// Worker that drains the provisioning request queue.
pub struct ProvisioningWorker {
    queue: Arc<WorkQueue>,
    manager: Arc<Manager>,
    config: WorkerConfig,
    shutdown: Arc<AtomicBool>,
}

impl ProvisioningWorker {
    #[must_use]
    pub fn new(queue: Arc<WorkQueue>, manager: Arc<Manager>, config: WorkerConfig) -> Self {
        Self {
            queue,
            manager,
            config,
            shutdown: Arc::new(AtomicBool::new(false)),
        }
    }

    /// Start the worker loop.
    #[instrument(skip(self))]
    pub async fn run(&self) {
        info!(
            concurrency = self.config.concurrency,
            poll_interval_ms = self.config.poll_interval_ms,
            "Starting provisioning worker"
        );

        let semaphore = Arc::new(Semaphore::new(self.config.concurrency));
        let mut poll_interval = interval(Duration::from_millis(self.config.poll_interval_ms));
        let mut stale_interval =
            interval(Duration::from_secs(self.config.stale_release_interval_secs));

        loop {
            tokio::select! {
                _ = poll_interval.tick() => {
                    if self.shutdown.load(Ordering::Relaxed) {
                        info!("Worker shutdown requested, stopping poll loop");
                        break;
                    }
                    self.poll_and_process(&semaphore).await;
                }
                _ = stale_interval.tick() => {
                    self.release_stale().await;
                }
            }
        }

        // Wait for in-flight requests to complete
        info!("Waiting for in-flight requests to complete...");
        let _ = semaphore.acquire_many(self.config.concurrency as u32).await;
        info!("Worker stopped");
    }

    /// Request graceful shutdown.
    pub fn shutdown(&self) {
        info!("Shutdown requested");
        self.shutdown.store(true, Ordering::Relaxed);
    }

    /// Check if shutdown was requested.
    #[must_use]
    pub fn is_shutdown(&self) -> bool {
        self.shutdown.load(Ordering::Relaxed)
    }

    /// Poll the queue and process claimed requests.
    async fn poll_and_process(&self, semaphore: &Arc<Semaphore>) {
        let requests = match self.queue.dequeue(self.config.batch_size).await {
            Ok(requests) => requests,
            Err(e) => {
                error!(error = %e, "Failed to dequeue requests");
                return;
            }
        };

        if requests.is_empty() {
            return;
        }

        debug!(count = requests.len(), "Dequeued requests for processing");

        for request in requests {
            let permit = if let Ok(p) = semaphore.clone().try_acquire_owned() {
                p
            } else {
                debug!("All worker slots busy, skipping remaining requests");
                return;
            };

            let queue = self.queue.clone();
            let manager = self.manager.clone();

            tokio::spawn(async move {
                let _permit = permit; // Hold permit until task completes
                process_request(queue, manager, request).await;
            });
        }
    }

    /// Release claims that are stuck in processing.
    async fn release_stale(&self) {
        match self.queue.release_stale().await {
            Ok(count) if count > 0 => {
                warn!(count = count, "Released stale requests");
            }
            Ok(_) => {}
            Err(e) => {
                error!(error = %e, "Failed to release stale requests");
            }
        }
    }
}

/// Process a single claimed request.
#[instrument(skip(queue, manager, entry), fields(request_id = %entry.id))]
async fn process_request(queue: Arc<WorkQueue>, manager: Arc<Manager>, entry: QueuedRequest) {
    let request = match entry.request() {
        Ok(request) => request,
        Err(e) => {
            error!(error = %e, "Request payload is malformed");
            if let Err(qe) = queue.drop_request(entry.id, &e.to_string()).await {
                error!(error = %qe, "Failed to record malformed request");
            }
            return;
        }
    };

    info!(kind = request.kind(), "Processing request");
    let start = std::time::Instant::now();

    let result = route(&manager, &request).await;
    let duration_ms = start.elapsed().as_millis() as i64;

    match result {
        Ok(()) => {
            info!(duration_ms, "Request completed");
            if let Err(e) = queue.complete(entry.id).await {
                error!(error = %e, "Failed to mark request as complete");
            }
        }
        Err(e) => {
            let message = e.to_string();
            warn!(
                duration_ms,
                error = %message,
                retry_count = entry.retry_count,
                "Request failed"
            );

            let outcome = match e.disposition() {
                Disposition::Drop => queue.drop_request(entry.id, &message).await,
                Disposition::Retry => queue.fail(entry.id, &message, true).await,
                Disposition::Permanent => queue.fail(entry.id, &message, false).await,
            };
            if let Err(qe) = outcome {
                error!(error = %qe, "Failed to record request failure");
            }
        }
    }
}

/// Route a request to the orchestrator.
async fn route(manager: &Manager, request: &WorkRequest) -> Result<(), ManagerError> {
    match request {
        WorkRequest::CreateUser { attrs } => manager.create_user(attrs).await,
        WorkRequest::RefreshOrcid { account_id, email } => {
            manager.refresh_orcid(*account_id, email.as_deref()).await?;
            Ok(())
        }
        WorkRequest::SyncDirectoryUser {
            account_id,
            set_username_as_email,
        } => {
            manager
                .sync_directory_user(*account_id, *set_username_as_email)
                .await
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_worker_config_default() {
        let config = WorkerConfig::default();
        assert_eq!(config.concurrency, 4);
        assert_eq!(config.poll_interval_ms, 1000);
        assert_eq!(config.batch_size, 10);
    }
}
