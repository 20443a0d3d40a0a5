//! Account entity model.
//!
//! The service's internal user record, federated-identity-agnostic.
//! Accounts are reached via their [`ExternalId`](crate::ExternalId)
//! bindings at login time and mutated by the provisioning orchestrator
//! once terms are accepted.

use chrono::{DateTime, Utc};
use sqlx::{FromRow, PgPool};

use crate::error::DbResult;
use crate::merge::RegistrationUpdate;

/// Lifecycle state of an account.
///
/// Transitions are monotonic (`new -> registered -> created`) except for
/// the terminal `duplicate` branch taken when the directory reports a
/// create conflict during provisioning.
#[derive(Debug, Clone, Copy, PartialEq, Eq, sqlx::Type)]
#[sqlx(type_name = "account_state", rename_all = "lowercase")]
pub enum AccountState {
    New,
    Registered,
    Created,
    Duplicate,
}

impl std::fmt::Display for AccountState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            AccountState::New => write!(f, "new"),
            AccountState::Registered => write!(f, "registered"),
            AccountState::Created => write!(f, "created"),
            AccountState::Duplicate => write!(f, "duplicate"),
        }
    }
}

/// A user account.
#[derive(Debug, Clone, FromRow)]
pub struct Account {
    /// Internal identifier. Also names the trial project (`pt-<id>`).
    pub id: i64,

    /// Display name, overwritten from the IdP on every login sync.
    pub displayname: Option<String>,

    /// Email address, overwritten from the IdP on every login sync.
    pub email: Option<String>,

    /// Lifecycle state.
    pub state: AccountState,

    /// When the account completed registration (terms accepted).
    pub registered_at: Option<DateTime<Utc>>,

    /// When the current terms version was accepted.
    pub terms_accepted_at: Option<DateTime<Utc>>,

    /// Version marker of the accepted terms.
    pub terms_version: Option<String>,

    /// Stamped on every login sync.
    pub last_login: Option<DateTime<Utc>>,

    /// Directory identity reference. Set once provisioning completes;
    /// non-null if and only if `state == created` (eventually).
    pub keystone_user_id: Option<String>,

    /// Keep the directory username distinct from the email address.
    pub ignore_username_not_email: bool,

    // Profile fields merged from federated attributes.
    pub first_name: Option<String>,
    pub surname: Option<String>,
    pub phone_number: Option<String>,
    pub mobile_number: Option<String>,
    pub organisation: Option<String>,
    pub orcid: Option<String>,
    pub affiliation: Option<String>,

    // Account-lifecycle expiry tracking, written by an external process.
    pub expiry_status: Option<String>,
    pub expiry_next_step: Option<DateTime<Utc>>,
}

impl Account {
    /// Find an account by internal id.
    pub async fn find_by_id(pool: &PgPool, id: i64) -> DbResult<Option<Self>> {
        let account = sqlx::query_as("SELECT * FROM accounts WHERE id = $1")
            .bind(id)
            .fetch_optional(pool)
            .await?;
        Ok(account)
    }

    /// Find the account bound to a federated persistent id.
    pub async fn find_by_persistent_id(
        pool: &PgPool,
        persistent_id: &str,
    ) -> DbResult<Option<Self>> {
        let account = sqlx::query_as(
            r#"
            SELECT a.* FROM accounts a
            JOIN external_ids e ON e.account_id = a.id
            WHERE e.persistent_id = $1
            "#,
        )
        .bind(persistent_id)
        .fetch_optional(pool)
        .await?;
        Ok(account)
    }

    /// Create a fresh account in state `new` together with its first
    /// federated identity binding.
    pub async fn create(pool: &PgPool, persistent_id: &str, idp: Option<&str>) -> DbResult<Self> {
        let mut tx = pool.begin().await?;

        let account: Account =
            sqlx::query_as("INSERT INTO accounts (state) VALUES ('new') RETURNING *")
                .fetch_one(&mut *tx)
                .await?;

        sqlx::query(
            r#"
            INSERT INTO external_ids (account_id, persistent_id, idp, last_login)
            VALUES ($1, $2, $3, NOW())
            "#,
        )
        .bind(account.id)
        .bind(persistent_id)
        .bind(idp)
        .execute(&mut *tx)
        .await?;

        tx.commit().await?;
        Ok(account)
    }

    /// Mark the account registered after terms acceptance.
    pub async fn mark_registered(
        pool: &PgPool,
        id: i64,
        terms_version: &str,
    ) -> DbResult<Option<Self>> {
        let account = sqlx::query_as(
            r#"
            UPDATE accounts
            SET state = 'registered',
                registered_at = NOW(),
                terms_accepted_at = NOW(),
                terms_version = $2
            WHERE id = $1
            RETURNING *
            "#,
        )
        .bind(id)
        .bind(terms_version)
        .fetch_optional(pool)
        .await?;
        Ok(account)
    }

    /// Commit the provisioning outcome: bind the new directory identity
    /// and transition to `created`.
    pub async fn mark_created(
        pool: &PgPool,
        id: i64,
        keystone_user_id: &str,
    ) -> DbResult<Option<Self>> {
        let account = sqlx::query_as(
            r#"
            UPDATE accounts
            SET keystone_user_id = $2, state = 'created'
            WHERE id = $1
            RETURNING *
            "#,
        )
        .bind(id)
        .bind(keystone_user_id)
        .fetch_optional(pool)
        .await?;
        Ok(account)
    }

    /// Take the terminal `duplicate` branch after a directory create
    /// conflict.
    pub async fn mark_duplicate(pool: &PgPool, id: i64) -> DbResult<Option<Self>> {
        let account =
            sqlx::query_as("UPDATE accounts SET state = 'duplicate' WHERE id = $1 RETURNING *")
                .bind(id)
                .fetch_optional(pool)
                .await?;
        Ok(account)
    }

    /// Update the stored ORCID identifier.
    pub async fn update_orcid(pool: &PgPool, id: i64, orcid: &str) -> DbResult<Option<Self>> {
        let account = sqlx::query_as("UPDATE accounts SET orcid = $2 WHERE id = $1 RETURNING *")
            .bind(id)
            .bind(orcid)
            .fetch_optional(pool)
            .await?;
        Ok(account)
    }

    /// Apply a login-time registration sync: displayname and email are
    /// overwritten unconditionally, the merged profile fields replace the
    /// stored ones and `last_login` is stamped.
    pub async fn apply_registration(
        pool: &PgPool,
        id: i64,
        update: &RegistrationUpdate,
    ) -> DbResult<Option<Self>> {
        let account = sqlx::query_as(
            r#"
            UPDATE accounts
            SET displayname = $2,
                email = $3,
                first_name = $4,
                surname = $5,
                phone_number = $6,
                mobile_number = $7,
                organisation = $8,
                orcid = $9,
                affiliation = $10,
                last_login = NOW()
            WHERE id = $1
            RETURNING *
            "#,
        )
        .bind(id)
        .bind(&update.displayname)
        .bind(&update.email)
        .bind(&update.first_name)
        .bind(&update.surname)
        .bind(&update.phone_number)
        .bind(&update.mobile_number)
        .bind(&update.organisation)
        .bind(&update.orcid)
        .bind(&update.affiliation)
        .fetch_optional(pool)
        .await?;
        Ok(account)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_state_display() {
        assert_eq!(AccountState::New.to_string(), "new");
        assert_eq!(AccountState::Registered.to_string(), "registered");
        assert_eq!(AccountState::Created.to_string(), "created");
        assert_eq!(AccountState::Duplicate.to_string(), "duplicate");
    }
}
