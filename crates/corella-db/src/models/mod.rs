//! Persistent entity models.

pub mod account;
pub mod domain_mapping;
pub mod external_id;
