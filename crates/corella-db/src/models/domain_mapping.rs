//! IdP-to-directory-domain mapping.

use chrono::{DateTime, Utc};
use sqlx::{FromRow, PgPool};

use crate::error::DbResult;

/// Maps an IdP entity id to the directory domain its accounts are
/// provisioned into.
#[derive(Debug, Clone, FromRow)]
pub struct DomainMapping {
    pub id: i64,
    pub idp_entity_id: String,
    pub domain_id: String,
    pub last_seen: Option<DateTime<Utc>>,
}

impl DomainMapping {
    /// Find the mapping for an IdP entity id.
    pub async fn find_by_idp(pool: &PgPool, idp_entity_id: &str) -> DbResult<Option<Self>> {
        let mapping = sqlx::query_as("SELECT * FROM domain_mappings WHERE idp_entity_id = $1")
            .bind(idp_entity_id)
            .fetch_optional(pool)
            .await?;
        Ok(mapping)
    }

    /// Resolve the target domain for an IdP, touching `last_seen` on a
    /// hit and falling back to `default_domain` when unmapped.
    pub async fn resolve_domain(
        pool: &PgPool,
        idp_entity_id: Option<&str>,
        default_domain: &str,
    ) -> DbResult<String> {
        let Some(idp) = idp_entity_id else {
            return Ok(default_domain.to_string());
        };

        let mapping: Option<DomainMapping> = sqlx::query_as(
            r#"
            UPDATE domain_mappings
            SET last_seen = NOW()
            WHERE idp_entity_id = $1
            RETURNING *
            "#,
        )
        .bind(idp)
        .fetch_optional(pool)
        .await?;

        Ok(mapping
            .map(|m| m.domain_id)
            .unwrap_or_else(|| default_domain.to_string()))
    }
}
