//! External identity binding model.
//!
//! One row per federated-identity subject. Several bindings may point at
//! the same account (re-association after an administrative merge), but
//! each binding has exactly one owning account at any time.

use chrono::{DateTime, Utc};
use sqlx::{FromRow, PgPool};

use crate::error::DbResult;

/// A federated-identity binding to an account.
#[derive(Debug, Clone, FromRow)]
pub struct ExternalId {
    pub id: i64,

    /// The account this binding currently points at.
    pub account_id: i64,

    /// The IdP-supplied subject identifier. Unique across the system.
    pub persistent_id: String,

    /// Issuer entity id of the asserting IdP.
    pub idp: Option<String>,

    /// Last-seen raw federated attribute map, kept for the three-way
    /// merge on the next login.
    pub attributes: serde_json::Value,

    /// Last login through this binding.
    pub last_login: Option<DateTime<Utc>>,
}

impl ExternalId {
    /// Find a binding by its persistent id.
    pub async fn find_by_persistent_id(
        pool: &PgPool,
        persistent_id: &str,
    ) -> DbResult<Option<Self>> {
        let external_id = sqlx::query_as("SELECT * FROM external_ids WHERE persistent_id = $1")
            .bind(persistent_id)
            .fetch_optional(pool)
            .await?;
        Ok(external_id)
    }

    /// List all bindings of an account.
    pub async fn list_for_account(pool: &PgPool, account_id: i64) -> DbResult<Vec<Self>> {
        let rows = sqlx::query_as("SELECT * FROM external_ids WHERE account_id = $1 ORDER BY id")
            .bind(account_id)
            .fetch_all(pool)
            .await?;
        Ok(rows)
    }

    /// Record a login through this binding: refresh the attribute
    /// snapshot and stamp `last_login`.
    pub async fn record_login(
        pool: &PgPool,
        id: i64,
        attributes: &serde_json::Value,
    ) -> DbResult<Option<Self>> {
        let external_id = sqlx::query_as(
            r#"
            UPDATE external_ids
            SET attributes = $2, last_login = NOW()
            WHERE id = $1
            RETURNING *
            "#,
        )
        .bind(id)
        .bind(attributes)
        .fetch_optional(pool)
        .await?;
        Ok(external_id)
    }

    /// Re-point this binding at a different account (administrative
    /// account merge).
    pub async fn reassign(pool: &PgPool, id: i64, account_id: i64) -> DbResult<Option<Self>> {
        let external_id =
            sqlx::query_as("UPDATE external_ids SET account_id = $2 WHERE id = $1 RETURNING *")
                .bind(id)
                .bind(account_id)
                .fetch_optional(pool)
                .await?;
        Ok(external_id)
    }

    /// Delete a binding. The account itself is left untouched.
    pub async fn delete(pool: &PgPool, id: i64) -> DbResult<bool> {
        let result = sqlx::query("DELETE FROM external_ids WHERE id = $1")
            .bind(id)
            .execute(pool)
            .await?;
        Ok(result.rows_affected() > 0)
    }
}
