//! # Account Record Store
//!
//! Persistent entities and queries for the corella account service:
//! accounts, their federated-identity bindings, and the IdP-to-domain
//! mapping table, plus the three-way federated attribute merge applied
//! on every login sync.
//!
//! The provisioning orchestrator consumes this crate only through the
//! [`AccountStore`] trait, so it can be exercised in tests without a
//! database.

pub mod error;
pub mod merge;
pub mod migrations;
pub mod models;
pub mod pool;
pub mod store;

pub use error::{DbError, DbResult};
pub use merge::{
    build_registration_update, merge_field, normalize, RegistrationUpdate, AFFILIATION_VALUES,
};
pub use migrations::run_migrations;
pub use models::account::{Account, AccountState};
pub use models::domain_mapping::DomainMapping;
pub use models::external_id::ExternalId;
pub use pool::DbPool;
pub use store::{AccountStore, PgAccountStore};
