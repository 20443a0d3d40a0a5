//! Directory object types.

use serde::{Deserialize, Serialize};

/// A user record in the cloud identity directory.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DirectoryUser {
    pub id: String,
    /// Login name. For provisioned accounts this equals the email.
    pub name: String,
    pub email: Option<String>,
    pub full_name: Option<String>,
    pub default_project_id: Option<String>,
    pub domain_id: Option<String>,
}

/// Parameters for creating a directory user.
#[derive(Debug, Clone, Serialize)]
pub struct NewDirectoryUser {
    pub name: String,
    pub email: String,
    pub full_name: Option<String>,
    pub password: String,
    pub domain_id: String,
    pub default_project_id: Option<String>,
}

impl NewDirectoryUser {
    /// Build the parameters for a provisioned account: username and
    /// email are the same value and the first password is random (the
    /// user signs in through the federated flow, never with it).
    #[must_use]
    pub fn provisioned(
        email: &str,
        full_name: &str,
        domain_id: &str,
        default_project_id: &str,
    ) -> Self {
        Self {
            name: email.to_string(),
            email: email.to_string(),
            full_name: Some(full_name.to_string()),
            password: generate_password(),
            domain_id: domain_id.to_string(),
            default_project_id: Some(default_project_id.to_string()),
        }
    }
}

/// Generate a random first password for a directory user.
#[must_use]
pub fn generate_password() -> String {
    use base64::Engine;
    use rand::RngCore;

    let mut bytes = [0u8; 16];
    rand::thread_rng().fill_bytes(&mut bytes);
    let encoded = base64::engine::general_purpose::STANDARD.encode(bytes);
    encoded.chars().take(20).collect()
}

/// A partial update of a directory user. `None` fields are untouched.
#[derive(Debug, Clone, Default, Serialize)]
pub struct DirectoryUserUpdate {
    pub name: Option<String>,
    pub email: Option<String>,
    pub full_name: Option<String>,
}

impl DirectoryUserUpdate {
    /// Whether there is anything to send.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.name.is_none() && self.email.is_none() && self.full_name.is_none()
    }
}

/// A project in the cloud identity directory.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DirectoryProject {
    pub id: String,
    pub name: String,
    pub domain_id: String,
    pub description: Option<String>,
}

/// A grantable role.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DirectoryRole {
    pub id: String,
    pub name: String,
}

/// An identity domain.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DirectoryDomain {
    pub id: String,
    pub name: String,
}

/// A project-scoped session token obtained by authenticating as the
/// provisioned user.
#[derive(Clone, Serialize, Deserialize)]
pub struct ScopedToken(pub String);

impl std::fmt::Debug for ScopedToken {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        // Tokens never land in logs.
        write!(f, "ScopedToken(***)")
    }
}

impl ScopedToken {
    #[must_use]
    pub fn secret(&self) -> &str {
        &self.0
    }
}

/// Compute quota limits applied to a new project.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct ComputeQuota {
    pub cores: i32,
    pub instances: i32,
    pub ram_mb: i32,
}

impl Default for ComputeQuota {
    fn default() -> Self {
        Self {
            cores: 2,
            instances: 2,
            ram_mb: 8192,
        }
    }
}

/// An ingress rule added to a default security group.
#[derive(Debug, Clone, Serialize)]
pub struct SecurityGroupRule {
    pub protocol: String,
    pub port_min: Option<u16>,
    pub port_max: Option<u16>,
    pub remote_ip_prefix: String,
}

impl SecurityGroupRule {
    /// An ingress rule open to the world for a TCP port range.
    #[must_use]
    pub fn tcp(port_min: u16, port_max: u16) -> Self {
        Self {
            protocol: "tcp".to_string(),
            port_min: Some(port_min),
            port_max: Some(port_max),
            remote_ip_prefix: "0.0.0.0/0".to_string(),
        }
    }

    /// An ingress rule allowing all ICMP.
    #[must_use]
    pub fn icmp() -> Self {
        Self {
            protocol: "icmp".to_string(),
            port_min: None,
            port_max: None,
            remote_ip_prefix: "0.0.0.0/0".to_string(),
        }
    }
}
