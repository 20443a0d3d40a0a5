//! Durable work queue backed by Postgres.
//!
//! Requests are claimed with `FOR UPDATE SKIP LOCKED` so any number of
//! workers can poll the same table without double-claiming. Delivery is
//! at-least-once: a worker that dies mid-request leaves it in
//! `processing` until the stale-release sweep puts it back.

use std::time::Duration;

use chrono::{DateTime, Utc};
use sqlx::postgres::PgPool;
use sqlx::FromRow;
use thiserror::Error;
use tracing::{debug, info, instrument};
use uuid::Uuid;

use crate::request::WorkRequest;

/// Queue errors.
#[derive(Debug, Error)]
pub enum QueueError {
    #[error("queue query failed: {0}")]
    Database(#[from] sqlx::Error),

    #[error("request payload is not valid: {0}")]
    Payload(#[from] serde_json::Error),
}

/// Queue tuning.
#[derive(Debug, Clone)]
pub struct QueueConfig {
    /// Retries before a request is moved to the dead letter state.
    pub max_retries: i32,
    /// Base retry delay; the actual delay grows with the retry count.
    pub retry_backoff: Duration,
    /// Requests stuck in `processing` longer than this are released.
    pub stale_after: Duration,
}

impl Default for QueueConfig {
    fn default() -> Self {
        Self {
            max_retries: 3,
            retry_backoff: Duration::from_secs(60),
            stale_after: Duration::from_secs(600),
        }
    }
}

impl QueueConfig {
    /// Delay before the next attempt, proportional to how often the
    /// request has already failed.
    #[must_use]
    pub fn backoff_for(&self, retry_count: i32) -> Duration {
        self.retry_backoff * retry_count.max(1) as u32
    }
}

/// A claimed queue entry.
#[derive(Debug, Clone, FromRow)]
pub struct QueuedRequest {
    pub id: Uuid,
    pub payload: serde_json::Value,
    pub retry_count: i32,
    pub max_retries: i32,
    pub created_at: DateTime<Utc>,
}

impl QueuedRequest {
    /// Decode the payload into a [`WorkRequest`].
    pub fn request(&self) -> Result<WorkRequest, QueueError> {
        Ok(serde_json::from_value(self.payload.clone())?)
    }
}

/// Postgres-backed work queue over `provisioning_requests`.
pub struct WorkQueue {
    pool: PgPool,
    config: QueueConfig,
}

impl WorkQueue {
    #[must_use]
    pub fn new(pool: PgPool, config: QueueConfig) -> Self {
        Self { pool, config }
    }

    /// Enqueue a request for asynchronous processing.
    #[instrument(skip(self, request), fields(kind = request.kind()))]
    pub async fn enqueue(&self, request: &WorkRequest) -> Result<Uuid, QueueError> {
        let id = Uuid::new_v4();
        let payload = serde_json::to_value(request)?;

        sqlx::query(
            r"
            INSERT INTO provisioning_requests (id, payload, max_retries)
            VALUES ($1, $2, $3)
            ",
        )
        .bind(id)
        .bind(&payload)
        .bind(self.config.max_retries)
        .execute(&self.pool)
        .await?;

        info!(request_id = %id, kind = request.kind(), "Enqueued request");
        Ok(id)
    }

    /// Claim up to `batch_size` due requests.
    ///
    /// Claimed rows move to `processing` inside the same statement, so
    /// two workers polling concurrently never see the same row.
    pub async fn dequeue(&self, batch_size: i64) -> Result<Vec<QueuedRequest>, QueueError> {
        let rows = sqlx::query_as::<_, QueuedRequest>(
            r"
            UPDATE provisioning_requests
            SET status = 'processing', started_at = NOW()
            WHERE id IN (
                SELECT id FROM provisioning_requests
                WHERE status = 'queued' AND scheduled_at <= NOW()
                ORDER BY scheduled_at
                LIMIT $1
                FOR UPDATE SKIP LOCKED
            )
            RETURNING id, payload, retry_count, max_retries, created_at
            ",
        )
        .bind(batch_size)
        .fetch_all(&self.pool)
        .await?;

        if !rows.is_empty() {
            debug!(count = rows.len(), "Claimed requests");
        }
        Ok(rows)
    }

    /// Mark a request as completed.
    pub async fn complete(&self, id: Uuid) -> Result<(), QueueError> {
        sqlx::query(
            r"
            UPDATE provisioning_requests
            SET status = 'completed', completed_at = NOW(), last_error = NULL
            WHERE id = $1
            ",
        )
        .bind(id)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    /// Record a failure.
    ///
    /// Retryable failures reschedule the request with a backoff that
    /// grows with the retry count, until the retry budget is spent;
    /// everything else goes straight to the dead letter state.
    pub async fn fail(&self, id: Uuid, error: &str, retryable: bool) -> Result<(), QueueError> {
        if retryable {
            let rescheduled = sqlx::query(
                r"
                UPDATE provisioning_requests
                SET status = 'queued',
                    retry_count = retry_count + 1,
                    last_error = $2,
                    scheduled_at = NOW() + ($3 * (retry_count + 1)) * INTERVAL '1 second'
                WHERE id = $1 AND retry_count < max_retries
                ",
            )
            .bind(id)
            .bind(error)
            .bind(self.config.retry_backoff.as_secs() as i64)
            .execute(&self.pool)
            .await?;

            if rescheduled.rows_affected() > 0 {
                return Ok(());
            }
        }

        sqlx::query(
            r"
            UPDATE provisioning_requests
            SET status = 'dead', completed_at = NOW(), last_error = $2
            WHERE id = $1
            ",
        )
        .bind(id)
        .bind(error)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    /// Record a failure that the request itself caused and that no
    /// amount of retrying will fix, without the dead letter state.
    pub async fn drop_request(&self, id: Uuid, error: &str) -> Result<(), QueueError> {
        sqlx::query(
            r"
            UPDATE provisioning_requests
            SET status = 'failed', completed_at = NOW(), last_error = $2
            WHERE id = $1
            ",
        )
        .bind(id)
        .bind(error)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    /// Put requests stuck in `processing` back on the queue.
    pub async fn release_stale(&self) -> Result<u64, QueueError> {
        let released = sqlx::query(
            r"
            UPDATE provisioning_requests
            SET status = 'queued', started_at = NULL
            WHERE status = 'processing'
              AND started_at < NOW() - ($1 * INTERVAL '1 second')
            ",
        )
        .bind(self.config.stale_after.as_secs() as i64)
        .execute(&self.pool)
        .await?;
        Ok(released.rows_affected())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_queue_config_default() {
        let config = QueueConfig::default();
        assert_eq!(config.max_retries, 3);
        assert_eq!(config.retry_backoff, Duration::from_secs(60));
        assert_eq!(config.stale_after, Duration::from_secs(600));
    }

    #[test]
    fn test_backoff_grows_with_retries() {
        let config = QueueConfig::default();
        assert_eq!(config.backoff_for(1), Duration::from_secs(60));
        assert_eq!(config.backoff_for(3), Duration::from_secs(180));
        // First failures never get a zero delay.
        assert_eq!(config.backoff_for(0), Duration::from_secs(60));
    }

    #[test]
    fn test_queued_request_decodes_payload() {
        let entry = QueuedRequest {
            id: Uuid::new_v4(),
            payload: serde_json::json!({
                "kind": "refresh_orcid",
                "account_id": 9,
            }),
            retry_count: 0,
            max_retries: 3,
            created_at: Utc::now(),
        };
        let request = entry.request().unwrap();
        assert_eq!(request.kind(), "refresh_orcid");
    }
}
