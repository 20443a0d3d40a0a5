//! Provisioning orchestrator.
//!
//! Drives the account pipeline end to end: resolve the account, create
//! its trial project and directory user, grant roles, apply quotas and
//! default security groups, and send the welcome mail. The duplicate
//! path compensates (notice, project teardown, state change) before
//! propagating.

use std::sync::Arc;

use thiserror::Error;
use tracing::{debug, info, instrument, warn};

use corella_db::{Account, AccountStore, DbError};
use corella_directory::{
    Contact, ContactDirectory, DirectoryClient, DirectoryError, DirectoryUserUpdate,
    DuplicateNotice, NewDirectoryUser, Notifier, OrcidError, OrcidLookup, Provisioner,
    WelcomeNotice,
};

use crate::request::RegistrationAttrs;

/// How a failed request should be handled by the queue.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Disposition {
    /// The request itself is bad; record it as failed and move on.
    Drop,
    /// A hard failure that needs attention; dead letter, no retry.
    Permanent,
    /// A transient failure; redeliver with backoff.
    Retry,
}

/// Orchestrator errors.
#[derive(Debug, Error)]
pub enum ManagerError {
    #[error("no account bound to persistent id {persistent_id}")]
    AccountNotFound { persistent_id: String },

    #[error("account {account_id} not found")]
    AccountIdNotFound { account_id: i64 },

    #[error("account {account_id} has no directory identity yet")]
    NotProvisioned { account_id: i64 },

    /// The identity already existed in the directory; compensation has
    /// already run by the time this surfaces.
    #[error("directory identity already exists for {email}")]
    DuplicateAccount { email: String },

    #[error(transparent)]
    Db(#[from] DbError),

    #[error(transparent)]
    Directory(#[from] DirectoryError),

    #[error(transparent)]
    Orcid(#[from] OrcidError),
}

impl ManagerError {
    /// Classify the failure for the queue.
    #[must_use]
    pub fn disposition(&self) -> Disposition {
        match self {
            ManagerError::AccountNotFound { .. }
            | ManagerError::AccountIdNotFound { .. }
            | ManagerError::NotProvisioned { .. }
            | ManagerError::DuplicateAccount { .. } => Disposition::Drop,
            ManagerError::Db(e) => {
                if e.is_connection_error() {
                    Disposition::Retry
                } else {
                    Disposition::Permanent
                }
            }
            ManagerError::Directory(e) => {
                if e.is_transient() {
                    Disposition::Retry
                } else {
                    Disposition::Permanent
                }
            }
            // Transport failures retry; HTTP failures have already been
            // through the client's own retry budget.
            ManagerError::Orcid(OrcidError::Http(_)) => Disposition::Retry,
            ManagerError::Orcid(_) => Disposition::Permanent,
        }
    }
}

/// Orchestrator configuration.
#[derive(Debug, Clone)]
pub struct ManagerConfig {
    /// Domain for accounts whose IdP has no mapping.
    pub default_domain_id: String,
    /// Roles granted on the trial project.
    pub default_roles: Vec<String>,
}

impl Default for ManagerConfig {
    fn default() -> Self {
        Self {
            default_domain_id: "default".to_string(),
            default_roles: vec!["Member".to_string()],
        }
    }
}

/// The provisioning orchestrator.
pub struct Manager {
    store: Arc<dyn AccountStore>,
    directory: Arc<dyn DirectoryClient>,
    provisioner: Provisioner,
    notifier: Arc<dyn Notifier>,
    orcid: Arc<dyn OrcidLookup>,
    /// Best-effort contact sync; skipped when not configured.
    contacts: Option<Arc<dyn ContactDirectory>>,
    config: ManagerConfig,
}

impl Manager {
    #[must_use]
    pub fn new(
        store: Arc<dyn AccountStore>,
        directory: Arc<dyn DirectoryClient>,
        provisioner: Provisioner,
        notifier: Arc<dyn Notifier>,
        orcid: Arc<dyn OrcidLookup>,
        contacts: Option<Arc<dyn ContactDirectory>>,
        config: ManagerConfig,
    ) -> Self {
        Self {
            store,
            directory,
            provisioner,
            notifier,
            orcid,
            contacts,
            config,
        }
    }

    /// Provision directory resources for a freshly registered account.
    ///
    /// On a duplicate identity the created project is torn down, the
    /// registrant is notified, the account is marked `duplicate` and the
    /// error propagates.
    #[instrument(skip(self, attrs), fields(persistent_id = %attrs.id))]
    pub async fn create_user(&self, attrs: &RegistrationAttrs) -> Result<(), ManagerError> {
        let account = self
            .store
            .find_by_persistent_id(&attrs.id)
            .await?
            .ok_or_else(|| ManagerError::AccountNotFound {
                persistent_id: attrs.id.clone(),
            })?;

        let email = account.email.clone().unwrap_or_else(|| attrs.mail.clone());
        let full_name = account
            .displayname
            .clone()
            .unwrap_or_else(|| attrs.fullname.clone());

        let domain_id = self
            .store
            .resolve_domain(attrs.idp.as_deref(), &self.config.default_domain_id)
            .await?;

        let project_name = format!("pt-{}", account.id);
        let project = self
            .directory
            .create_project(
                &project_name,
                &format!("{full_name}'s project trial."),
                &domain_id,
            )
            .await?;
        info!(project_id = %project.id, project_name, "Created trial project");

        let new_user = NewDirectoryUser::provisioned(&email, &full_name, &domain_id, &project.id);
        let user = match self.directory.create_user(&new_user).await {
            Ok(user) => user,
            Err(e) if e.is_conflict() => {
                return self
                    .compensate_duplicate(&account, &email, &full_name, &project.id, &e)
                    .await;
            }
            Err(e) => return Err(e.into()),
        };
        info!(user_id = %user.id, email, "Created directory user");

        if let Some(contacts) = &self.contacts {
            let contact = Contact {
                email: email.clone(),
                full_name: full_name.clone(),
            };
            if let Err(e) = contacts.upsert_contact(&contact).await {
                warn!(email, error = %e, "Failed to sync contact directory");
            }
        }

        self.grant_default_roles(&user.id, &project.id).await?;

        self.store.mark_created(account.id, &user.id).await?;

        let welcome = WelcomeNotice {
            email: email.clone(),
            full_name: full_name.clone(),
            project_name,
        };
        if let Err(e) = self.notifier.send_welcome(&welcome).await {
            warn!(email, error = %e, "Failed to send welcome mail");
        }

        // The remaining steps run as the new user, scoped to the trial
        // project.
        let token = self
            .directory
            .authenticate(&new_user.name, &new_user.password, &domain_id, &project.id)
            .await?;

        self.provisioner
            .create_default_security_groups(&token, &project.id)
            .await?;
        self.provisioner
            .set_default_compute_quota(&project.id)
            .await?;
        if let Some(quota_gb) = self.provisioner.storage_quota_gb() {
            self.provisioner.set_storage_quota(&project.id, quota_gb).await;
        }

        info!(account_id = account.id, email, "Account provisioned");
        Ok(())
    }

    /// Duplicate-identity compensation: notify the registrant, tear
    /// down the just-created project, record the duplicate state, then
    /// surface the failure.
    async fn compensate_duplicate(
        &self,
        account: &Account,
        email: &str,
        full_name: &str,
        project_id: &str,
        conflict: &DirectoryError,
    ) -> Result<(), ManagerError> {
        warn!(
            account_id = account.id,
            email, "Directory identity already exists, compensating"
        );

        let existing = match conflict {
            DirectoryError::Conflict { identifier } => identifier.clone(),
            _ => email.to_string(),
        };
        let notice = DuplicateNotice {
            email: email.to_string(),
            full_name: full_name.to_string(),
            existing_user_id: existing,
        };
        if let Err(e) = self.notifier.send_duplicate_notice(&notice).await {
            warn!(email, error = %e, "Failed to send duplicate-account notice");
        }

        self.directory.delete_project(project_id).await?;
        self.store.mark_duplicate(account.id).await?;

        Err(ManagerError::DuplicateAccount {
            email: email.to_string(),
        })
    }

    async fn grant_default_roles(
        &self,
        user_id: &str,
        project_id: &str,
    ) -> Result<(), ManagerError> {
        let roles = self.directory.list_roles().await?;
        for wanted in &self.config.default_roles {
            let role = roles
                .iter()
                .find(|r| r.name.eq_ignore_ascii_case(wanted))
                .ok_or_else(|| DirectoryError::NotFound {
                    identifier: wanted.clone(),
                })?;
            self.directory
                .grant_role(user_id, &role.id, project_id)
                .await?;
            debug!(user_id, project_id, role = %role.name, "Granted role");
        }
        Ok(())
    }

    /// Re-run the ORCID lookup for an account. Returns whether the
    /// lookup completed; a lookup abandoned after its retry budget
    /// yields `false` without mutating the account.
    #[instrument(skip(self))]
    pub async fn refresh_orcid(
        &self,
        account_id: i64,
        email_override: Option<&str>,
    ) -> Result<bool, ManagerError> {
        let account = self
            .store
            .find_by_id(account_id)
            .await?
            .ok_or(ManagerError::AccountIdNotFound { account_id })?;

        let email = match email_override {
            Some(email) => email.to_string(),
            None => match &account.email {
                Some(email) => email.clone(),
                None => {
                    warn!(account_id, "Account has no email, skipping ORCID lookup");
                    return Ok(false);
                }
            },
        };

        // The lookup client has already spent its retry budget on 5xx
        // answers; what is left is abandoned, not dead-lettered. A
        // duplicate mapping is a hard invariant violation and a
        // transport failure is worth a redelivery, both propagate.
        let found = match self.orcid.search_by_email(&email).await {
            Ok(found) => found,
            Err(e @ OrcidError::DuplicateMapping { .. }) | Err(e @ OrcidError::Http(_)) => {
                return Err(e.into());
            }
            Err(e) => {
                warn!(account_id, email, error = %e, "ORCID lookup failed, giving up");
                return Ok(false);
            }
        };

        match (account.orcid.as_deref(), found.as_deref()) {
            (_, None) => {
                debug!(account_id, email, "No ORCID registered for email");
            }
            (Some(current), Some(found)) if current == found => {
                debug!(account_id, orcid = found, "ORCID unchanged");
            }
            (Some(current), Some(found)) => {
                info!(account_id, from = current, to = found, "ORCID changed");
                self.store.update_orcid(account_id, found).await?;
            }
            (None, Some(found)) => {
                info!(account_id, orcid = found, "ORCID added");
                self.store.update_orcid(account_id, found).await?;
            }
        }
        Ok(true)
    }

    /// Push the stored profile out to the account's directory record.
    #[instrument(skip(self))]
    pub async fn sync_directory_user(
        &self,
        account_id: i64,
        set_username_as_email: bool,
    ) -> Result<(), ManagerError> {
        let account = self
            .store
            .find_by_id(account_id)
            .await?
            .ok_or(ManagerError::AccountIdNotFound { account_id })?;

        let user_id = account
            .keystone_user_id
            .as_deref()
            .ok_or(ManagerError::NotProvisioned { account_id })?;

        let mut update = DirectoryUserUpdate {
            email: account.email.clone(),
            full_name: account.displayname.clone(),
            ..DirectoryUserUpdate::default()
        };
        if set_username_as_email && !account.ignore_username_not_email {
            update.name = account.email.clone();
        }

        if update.is_empty() {
            debug!(account_id, "Nothing to sync");
            return Ok(());
        }

        self.directory.update_user(user_id, &update).await?;
        info!(account_id, user_id, "Synced directory user");
        Ok(())
    }
}
