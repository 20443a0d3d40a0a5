//! Worker configuration loaded from environment variables.
//!
//! Fail-fast loading with validation: required variables must be
//! present and valid or startup aborts with a clear error.

use std::env;
use std::time::Duration;

use thiserror::Error;

use corella_directory::{CloudConfig, OrcidConfig, ProvisionerConfig, SmtpConfig};
use corella_provisioning::{ManagerConfig, QueueConfig, WorkerConfig};

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("missing required environment variable {0}")]
    Missing(String),

    #[error("invalid value for {name}: {message}")]
    Invalid { name: String, message: String },
}

fn required(name: &str) -> Result<String, ConfigError> {
    env::var(name).map_err(|_| ConfigError::Missing(name.to_string()))
}

fn optional(name: &str) -> Option<String> {
    env::var(name).ok().filter(|v| !v.is_empty())
}

fn parse<T: std::str::FromStr>(name: &str, value: &str) -> Result<T, ConfigError>
where
    T::Err: std::fmt::Display,
{
    value.parse().map_err(|e| ConfigError::Invalid {
        name: name.to_string(),
        message: format!("{e}"),
    })
}

fn optional_parsed<T: std::str::FromStr>(name: &str, default: T) -> Result<T, ConfigError>
where
    T::Err: std::fmt::Display,
{
    match optional(name) {
        Some(value) => parse(name, &value),
        None => Ok(default),
    }
}

/// Fully resolved worker configuration.
#[derive(Debug, Clone)]
pub struct Config {
    pub database_url: String,
    pub db_max_connections: u32,
    pub log_filter: String,

    pub cloud: CloudConfig,
    pub smtp: SmtpConfig,
    pub orcid: OrcidConfig,

    /// Contact sync is skipped entirely when no URL is configured.
    pub contact_directory_url: Option<String>,
    pub contact_directory_api_key: Option<String>,

    pub manager: ManagerConfig,
    pub provisioner: ProvisionerConfig,
    pub queue: QueueConfig,
    pub worker: WorkerConfig,
}

impl Config {
    /// Load from the environment. Missing or malformed required
    /// variables abort startup.
    pub fn from_env() -> Result<Self, ConfigError> {
        let cloud = CloudConfig {
            auth_url: required("OS_AUTH_URL")?,
            admin_username: required("OS_ADMIN_USERNAME")?,
            admin_password: required("OS_ADMIN_PASSWORD")?,
            admin_domain_id: optional("OS_ADMIN_DOMAIN_ID").unwrap_or_else(|| "default".into()),
            admin_project_id: required("OS_ADMIN_PROJECT_ID")?,
            compute_url: required("OS_COMPUTE_URL")?,
            storage_url: required("OS_STORAGE_URL")?,
            network_url: required("OS_NETWORK_URL")?,
        };

        let smtp = SmtpConfig {
            host: required("SMTP_HOST")?,
            port: optional_parsed("SMTP_PORT", 587)?,
            username: optional("SMTP_USERNAME"),
            password: optional("SMTP_PASSWORD"),
            from_address: required("SMTP_FROM_ADDRESS")?,
            support_url: optional("SUPPORT_URL")
                .unwrap_or_else(|| "https://support.example.org".into()),
        };

        let mut orcid = OrcidConfig::public(
            required("ORCID_CLIENT_ID")?,
            required("ORCID_CLIENT_SECRET")?,
        );
        if let Some(api_url) = optional("ORCID_API_URL") {
            orcid.api_url = api_url;
        }
        if let Some(token_url) = optional("ORCID_TOKEN_URL") {
            orcid.token_url = token_url;
        }
        orcid.max_attempts = optional_parsed("ORCID_MAX_ATTEMPTS", orcid.max_attempts)?;
        orcid.retry_delay =
            Duration::from_secs(optional_parsed("ORCID_RETRY_DELAY_SECS", 5u64)?);

        let manager = ManagerConfig {
            default_domain_id: optional("DEFAULT_DOMAIN_ID").unwrap_or_else(|| "default".into()),
            ..ManagerConfig::default()
        };

        let provisioner = ProvisionerConfig {
            storage_quota_gb: match optional("STORAGE_DEFAULT_QUOTA_GB") {
                Some(value) => Some(parse("STORAGE_DEFAULT_QUOTA_GB", &value)?),
                None => None,
            },
            ..ProvisionerConfig::default()
        };

        let queue = QueueConfig {
            max_retries: optional_parsed("QUEUE_MAX_RETRIES", 3)?,
            retry_backoff: Duration::from_secs(optional_parsed("QUEUE_RETRY_BACKOFF_SECS", 60u64)?),
            stale_after: Duration::from_secs(optional_parsed("QUEUE_STALE_AFTER_SECS", 600u64)?),
        };

        let worker = WorkerConfig {
            concurrency: optional_parsed("WORKER_CONCURRENCY", 4)?,
            poll_interval_ms: optional_parsed("WORKER_POLL_INTERVAL_MS", 1000)?,
            stale_release_interval_secs: optional_parsed("WORKER_STALE_RELEASE_INTERVAL_SECS", 300)?,
            batch_size: optional_parsed("WORKER_BATCH_SIZE", 10)?,
        };

        Ok(Self {
            database_url: required("DATABASE_URL")?,
            db_max_connections: optional_parsed("DATABASE_MAX_CONNECTIONS", 10)?,
            log_filter: optional("LOG_FILTER").unwrap_or_else(|| "info".into()),
            cloud,
            smtp,
            orcid,
            contact_directory_url: optional("CONTACT_DIRECTORY_URL"),
            contact_directory_api_key: optional("CONTACT_DIRECTORY_API_KEY"),
            manager,
            provisioner,
            queue,
            worker,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_rejects_garbage() {
        let err = parse::<u32>("SMTP_PORT", "not-a-number").unwrap_err();
        assert!(matches!(err, ConfigError::Invalid { .. }));
    }

    #[test]
    fn test_optional_parsed_uses_default() {
        // Variable is unset in the test environment.
        let value: u32 = optional_parsed("CORELLA_TEST_UNSET_VARIABLE", 42).unwrap();
        assert_eq!(value, 42);
    }
}
