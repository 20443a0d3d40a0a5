//! Orchestrator-facing store interface.
//!
//! The provisioning orchestrator performs a small, fixed set of reads
//! and mutations; this trait is that boundary, with a Postgres
//! implementation for production and hand-written fakes in tests.

use async_trait::async_trait;
use sqlx::PgPool;

use crate::error::DbResult;
use crate::models::account::Account;
use crate::models::domain_mapping::DomainMapping;

/// The queries and mutations the provisioning workflow performs against
/// the account record store.
#[async_trait]
pub trait AccountStore: Send + Sync {
    /// Look up the account bound to a federated persistent id.
    async fn find_by_persistent_id(&self, persistent_id: &str) -> DbResult<Option<Account>>;

    /// Look up an account by internal id.
    async fn find_by_id(&self, id: i64) -> DbResult<Option<Account>>;

    /// Resolve the directory domain for an IdP, falling back to
    /// `default_domain` when unmapped.
    async fn resolve_domain(
        &self,
        idp_entity_id: Option<&str>,
        default_domain: &str,
    ) -> DbResult<String>;

    /// Commit a successful provisioning outcome.
    async fn mark_created(&self, id: i64, keystone_user_id: &str) -> DbResult<()>;

    /// Commit the duplicate-account outcome.
    async fn mark_duplicate(&self, id: i64) -> DbResult<()>;

    /// Persist a refreshed ORCID identifier.
    async fn update_orcid(&self, id: i64, orcid: &str) -> DbResult<()>;
}

/// Postgres-backed [`AccountStore`].
#[derive(Debug, Clone)]
pub struct PgAccountStore {
    pool: PgPool,
}

impl PgAccountStore {
    #[must_use]
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl AccountStore for PgAccountStore {
    async fn find_by_persistent_id(&self, persistent_id: &str) -> DbResult<Option<Account>> {
        Account::find_by_persistent_id(&self.pool, persistent_id).await
    }

    async fn find_by_id(&self, id: i64) -> DbResult<Option<Account>> {
        Account::find_by_id(&self.pool, id).await
    }

    async fn resolve_domain(
        &self,
        idp_entity_id: Option<&str>,
        default_domain: &str,
    ) -> DbResult<String> {
        DomainMapping::resolve_domain(&self.pool, idp_entity_id, default_domain).await
    }

    async fn mark_created(&self, id: i64, keystone_user_id: &str) -> DbResult<()> {
        Account::mark_created(&self.pool, id, keystone_user_id).await?;
        Ok(())
    }

    async fn mark_duplicate(&self, id: i64) -> DbResult<()> {
        Account::mark_duplicate(&self.pool, id).await?;
        Ok(())
    }

    async fn update_orcid(&self, id: i64, orcid: &str) -> DbResult<()> {
        Account::update_orcid(&self.pool, id, orcid).await?;
        Ok(())
    }
}
