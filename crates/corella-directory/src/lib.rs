//! # Directory capability wrappers
//!
//! Capability-based wrappers over the external collaborators the
//! provisioning pipeline drives:
//!
//! - the cloud identity directory (users, projects, roles, domains,
//!   scoped authentication),
//! - compute/storage quotas and default network security groups,
//! - the ORCID public directory (email lookup with bounded retry),
//! - the notification dispatcher (welcome and duplicate-account mail),
//! - the external contact directory (best-effort contact sync).
//!
//! Each concern is a trait at the seam; the HTTP implementations in
//! [`http`] are thin request/response plumbing with no retry logic of
//! their own.

pub mod contacts;
pub mod error;
pub mod http;
pub mod notify;
pub mod orcid;
pub mod provisioner;
pub mod traits;
pub mod types;

pub use contacts::{Contact, ContactDirectory, RestContactDirectory};
pub use error::{DirectoryError, DirectoryResult};
pub use http::{CloudConfig, OpenStackClient};
pub use notify::{DuplicateNotice, NotifyError, Notifier, SmtpConfig, SmtpNotifier, WelcomeNotice};
pub use orcid::{OrcidClient, OrcidConfig, OrcidError, OrcidLookup};
pub use provisioner::{Provisioner, ProvisionerConfig};
pub use traits::{DirectoryClient, NetworkApi, QuotaApi};
pub use types::{
    ComputeQuota, DirectoryDomain, DirectoryProject, DirectoryRole, DirectoryUser,
    DirectoryUserUpdate, NewDirectoryUser, ScopedToken, SecurityGroupRule,
};
