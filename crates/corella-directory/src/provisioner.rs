//! Quota and network provisioning for new projects.
//!
//! Compute quota and security groups are single-attempt: a failure
//! propagates and the surrounding request is redelivered. Storage quota
//! is retried with a bounded attempt count and linearly increasing
//! backoff, then abandoned; it never fails the pipeline.

use std::sync::Arc;
use std::time::Duration;

use tracing::{error, info, warn};

use crate::error::DirectoryResult;
use crate::traits::{NetworkApi, QuotaApi};
use crate::types::{ComputeQuota, ScopedToken, SecurityGroupRule};

/// Provisioner configuration.
#[derive(Debug, Clone)]
pub struct ProvisionerConfig {
    /// Compute quota applied to every new project.
    pub compute_quota: ComputeQuota,

    /// Object-storage quota in GB; `None` disables the storage step.
    pub storage_quota_gb: Option<i64>,

    /// Maximum storage-quota attempts before giving up.
    pub storage_max_attempts: u32,

    /// Base backoff between storage-quota attempts; multiplied by the
    /// attempt number.
    pub storage_backoff: Duration,
}

impl Default for ProvisionerConfig {
    fn default() -> Self {
        Self {
            compute_quota: ComputeQuota::default(),
            storage_quota_gb: None,
            storage_max_attempts: 10,
            storage_backoff: Duration::from_secs(2),
        }
    }
}

/// Applies quotas and default security groups to a new project.
pub struct Provisioner {
    quota: Arc<dyn QuotaApi>,
    network: Arc<dyn NetworkApi>,
    config: ProvisionerConfig,
}

impl Provisioner {
    #[must_use]
    pub fn new(
        quota: Arc<dyn QuotaApi>,
        network: Arc<dyn NetworkApi>,
        config: ProvisionerConfig,
    ) -> Self {
        Self {
            quota,
            network,
            config,
        }
    }

    /// Configured storage quota, if any.
    #[must_use]
    pub fn storage_quota_gb(&self) -> Option<i64> {
        self.config.storage_quota_gb
    }

    /// Set the default compute quota on a project. Single attempt.
    pub async fn set_default_compute_quota(&self, project_id: &str) -> DirectoryResult<()> {
        self.quota
            .set_compute_quota(project_id, &self.config.compute_quota)
            .await
    }

    /// Set the configured storage quota on a project, retrying up to the
    /// configured bound. Gives up silently when attempts exhaust.
    pub async fn set_storage_quota(&self, project_id: &str, quota_gb: i64) {
        let max_attempts = self.config.storage_max_attempts.max(1);
        for attempt in 1..=max_attempts {
            match self.quota.set_storage_quota(project_id, quota_gb).await {
                Ok(()) => {
                    info!(project_id, quota_gb, "Set storage quota");
                    return;
                }
                Err(e) => {
                    warn!(
                        project_id,
                        attempt,
                        error = %e,
                        "Failed to set storage quota, retrying"
                    );
                    if attempt < max_attempts {
                        tokio::time::sleep(self.config.storage_backoff * attempt).await;
                    }
                }
            }
        }
        error!(project_id, "Failed to set storage quota, giving up");
    }

    /// Create the default security groups on a new project:
    /// ICMP (all), SSH (22) and HTTP/S (80 + 443) ingress.
    pub async fn create_default_security_groups(
        &self,
        token: &ScopedToken,
        project_id: &str,
    ) -> DirectoryResult<()> {
        let icmp = self
            .network
            .create_security_group(token, "icmp", "Allow ICMP (eg. ping)")
            .await?;
        self.network
            .create_security_group_rule(token, &icmp, &SecurityGroupRule::icmp())
            .await?;
        info!(project_id, "Added security group icmp");

        let ssh = self
            .network
            .create_security_group(token, "ssh", "Allow SSH")
            .await?;
        self.network
            .create_security_group_rule(token, &ssh, &SecurityGroupRule::tcp(22, 22))
            .await?;
        info!(project_id, "Added security group ssh");

        let http = self
            .network
            .create_security_group(token, "http", "Allow HTTP/S")
            .await?;
        self.network
            .create_security_group_rule(token, &http, &SecurityGroupRule::tcp(80, 80))
            .await?;
        self.network
            .create_security_group_rule(token, &http, &SecurityGroupRule::tcp(443, 443))
            .await?;
        info!(project_id, "Added security group http");

        Ok(())
    }
}
