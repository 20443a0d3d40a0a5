//! HTTP implementations of the capability traits against an
//! OpenStack-compatible cloud (Keystone v3 identity, Nova quota sets,
//! Swift account metadata, Neutron security groups).
//!
//! These wrappers are deliberately thin: request, map the status to a
//! [`DirectoryError`], parse the body. Retry policy lives with the
//! callers.

use reqwest::{Client, StatusCode};
use serde_json::{json, Value};
use tokio::sync::RwLock;
use tracing::debug;

use crate::error::{DirectoryError, DirectoryResult};
use crate::traits::{DirectoryClient, NetworkApi, QuotaApi};
use crate::types::{
    ComputeQuota, DirectoryDomain, DirectoryProject, DirectoryRole, DirectoryUser,
    DirectoryUserUpdate, NewDirectoryUser, ScopedToken, SecurityGroupRule,
};

const AUTH_TOKEN_HEADER: &str = "X-Auth-Token";
const SUBJECT_TOKEN_HEADER: &str = "X-Subject-Token";
const SWIFT_QUOTA_HEADER: &str = "X-Account-Meta-Quota-Bytes";

/// Endpoint and admin-credential configuration for the cloud APIs.
#[derive(Debug, Clone)]
pub struct CloudConfig {
    /// Keystone v3 endpoint, e.g. `https://keystone.example.org:5000/v3`.
    pub auth_url: String,
    pub admin_username: String,
    pub admin_password: String,
    pub admin_domain_id: String,
    pub admin_project_id: String,
    /// Nova endpoint, e.g. `https://nova.example.org:8774/v2.1`.
    pub compute_url: String,
    /// Swift endpoint root, e.g. `https://swift.example.org:8080/v1`.
    pub storage_url: String,
    /// Neutron endpoint, e.g. `https://neutron.example.org:9696/v2.0`.
    pub network_url: String,
}

/// Client for the OpenStack-compatible cloud APIs.
///
/// Implements [`DirectoryClient`], [`QuotaApi`] and [`NetworkApi`].
/// The admin token is fetched lazily and cached for the lifetime of the
/// client; an expired token surfaces as an authentication error and the
/// surrounding request is redelivered.
pub struct OpenStackClient {
    http: Client,
    config: CloudConfig,
    admin_token: RwLock<Option<String>>,
}

impl OpenStackClient {
    #[must_use]
    pub fn new(config: CloudConfig) -> Self {
        Self {
            http: Client::new(),
            config,
            admin_token: RwLock::new(None),
        }
    }

    /// Obtain (or reuse) an admin-scoped token.
    async fn admin_token(&self) -> DirectoryResult<String> {
        if let Some(token) = self.admin_token.read().await.clone() {
            return Ok(token);
        }

        let token = self
            .password_auth(
                &self.config.admin_username,
                &self.config.admin_password,
                &self.config.admin_domain_id,
                &self.config.admin_project_id,
            )
            .await?;

        *self.admin_token.write().await = Some(token.clone());
        Ok(token)
    }

    /// Keystone v3 password authentication scoped to a project.
    async fn password_auth(
        &self,
        username: &str,
        password: &str,
        user_domain_id: &str,
        project_id: &str,
    ) -> DirectoryResult<String> {
        let body = json!({
            "auth": {
                "identity": {
                    "methods": ["password"],
                    "password": {
                        "user": {
                            "name": username,
                            "domain": { "id": user_domain_id },
                            "password": password,
                        }
                    }
                },
                "scope": { "project": { "id": project_id } }
            }
        });

        let response = self
            .http
            .post(format!("{}/auth/tokens", self.config.auth_url))
            .json(&body)
            .send()
            .await
            .map_err(DirectoryError::connection)?;

        let status = response.status();
        if !status.is_success() {
            let text = response.text().await.unwrap_or_default();
            // Keystone answers 401 for bad credentials here, which maps
            // to AuthenticationFailed via from_status.
            return Err(DirectoryError::from_status(status, username, &text));
        }

        response
            .headers()
            .get(SUBJECT_TOKEN_HEADER)
            .and_then(|v| v.to_str().ok())
            .map(str::to_string)
            .ok_or_else(|| DirectoryError::Protocol {
                message: "token response missing subject token header".to_string(),
            })
    }

    async fn request_json(
        &self,
        request: reqwest::RequestBuilder,
        identifier: &str,
    ) -> DirectoryResult<Value> {
        let token = self.admin_token().await?;
        let response = request
            .header(AUTH_TOKEN_HEADER, token)
            .send()
            .await
            .map_err(DirectoryError::connection)?;

        let status = response.status();
        if status == StatusCode::NO_CONTENT {
            return Ok(Value::Null);
        }
        let text = response.text().await.unwrap_or_default();
        if !status.is_success() {
            return Err(DirectoryError::from_status(status, identifier, &text));
        }
        if text.is_empty() {
            return Ok(Value::Null);
        }
        serde_json::from_str(&text).map_err(|e| DirectoryError::Protocol {
            message: format!("invalid response body: {e}"),
        })
    }

    fn parse_user(value: &Value) -> DirectoryResult<DirectoryUser> {
        let user = &value["user"];
        let id = user["id"].as_str().ok_or_else(|| DirectoryError::Protocol {
            message: "user response missing id".to_string(),
        })?;
        Ok(DirectoryUser {
            id: id.to_string(),
            name: user["name"].as_str().unwrap_or_default().to_string(),
            email: user["email"].as_str().map(str::to_string),
            full_name: user["full_name"].as_str().map(str::to_string),
            default_project_id: user["default_project_id"].as_str().map(str::to_string),
            domain_id: user["domain_id"].as_str().map(str::to_string),
        })
    }
}

#[async_trait::async_trait]
impl DirectoryClient for OpenStackClient {
    async fn get_user(&self, user_id: &str) -> DirectoryResult<DirectoryUser> {
        let value = self
            .request_json(
                self.http
                    .get(format!("{}/users/{user_id}", self.config.auth_url)),
                user_id,
            )
            .await?;
        Self::parse_user(&value)
    }

    async fn create_user(&self, user: &NewDirectoryUser) -> DirectoryResult<DirectoryUser> {
        debug!(name = %user.name, domain_id = %user.domain_id, "Creating directory user");
        let body = json!({
            "user": {
                "name": user.name,
                "email": user.email,
                "full_name": user.full_name,
                "password": user.password,
                "domain_id": user.domain_id,
                "default_project_id": user.default_project_id,
                "enabled": true,
            }
        });
        let value = self
            .request_json(
                self.http
                    .post(format!("{}/users", self.config.auth_url))
                    .json(&body),
                &user.name,
            )
            .await?;
        Self::parse_user(&value)
    }

    async fn update_user(
        &self,
        user_id: &str,
        update: &DirectoryUserUpdate,
    ) -> DirectoryResult<DirectoryUser> {
        let mut fields = serde_json::Map::new();
        if let Some(name) = &update.name {
            fields.insert("name".to_string(), json!(name));
        }
        if let Some(email) = &update.email {
            fields.insert("email".to_string(), json!(email));
        }
        if let Some(full_name) = &update.full_name {
            fields.insert("full_name".to_string(), json!(full_name));
        }
        let value = self
            .request_json(
                self.http
                    .patch(format!("{}/users/{user_id}", self.config.auth_url))
                    .json(&json!({ "user": Value::Object(fields) })),
                user_id,
            )
            .await?;
        Self::parse_user(&value)
    }

    async fn create_project(
        &self,
        name: &str,
        description: &str,
        domain_id: &str,
    ) -> DirectoryResult<DirectoryProject> {
        let body = json!({
            "project": {
                "name": name,
                "description": description,
                "domain_id": domain_id,
                "enabled": true,
            }
        });
        let value = self
            .request_json(
                self.http
                    .post(format!("{}/projects", self.config.auth_url))
                    .json(&body),
                name,
            )
            .await?;
        let project = &value["project"];
        Ok(DirectoryProject {
            id: project["id"]
                .as_str()
                .ok_or_else(|| DirectoryError::Protocol {
                    message: "project response missing id".to_string(),
                })?
                .to_string(),
            name: project["name"].as_str().unwrap_or(name).to_string(),
            domain_id: project["domain_id"].as_str().unwrap_or(domain_id).to_string(),
            description: project["description"].as_str().map(str::to_string),
        })
    }

    async fn delete_project(&self, project_id: &str) -> DirectoryResult<()> {
        self.request_json(
            self.http
                .delete(format!("{}/projects/{project_id}", self.config.auth_url)),
            project_id,
        )
        .await?;
        Ok(())
    }

    async fn list_roles(&self) -> DirectoryResult<Vec<DirectoryRole>> {
        let value = self
            .request_json(
                self.http.get(format!("{}/roles", self.config.auth_url)),
                "roles",
            )
            .await?;
        let roles = value["roles"]
            .as_array()
            .ok_or_else(|| DirectoryError::Protocol {
                message: "roles response missing list".to_string(),
            })?
            .iter()
            .filter_map(|r| {
                Some(DirectoryRole {
                    id: r["id"].as_str()?.to_string(),
                    name: r["name"].as_str()?.to_string(),
                })
            })
            .collect();
        Ok(roles)
    }

    async fn grant_role(
        &self,
        user_id: &str,
        role_id: &str,
        project_id: &str,
    ) -> DirectoryResult<()> {
        self.request_json(
            self.http.put(format!(
                "{}/projects/{project_id}/users/{user_id}/roles/{role_id}",
                self.config.auth_url
            )),
            user_id,
        )
        .await?;
        Ok(())
    }

    async fn get_domain(&self, domain_id: &str) -> DirectoryResult<DirectoryDomain> {
        let value = self
            .request_json(
                self.http
                    .get(format!("{}/domains/{domain_id}", self.config.auth_url)),
                domain_id,
            )
            .await?;
        let domain = &value["domain"];
        Ok(DirectoryDomain {
            id: domain["id"]
                .as_str()
                .ok_or_else(|| DirectoryError::Protocol {
                    message: "domain response missing id".to_string(),
                })?
                .to_string(),
            name: domain["name"].as_str().unwrap_or_default().to_string(),
        })
    }

    async fn authenticate(
        &self,
        username: &str,
        password: &str,
        user_domain_id: &str,
        project_id: &str,
    ) -> DirectoryResult<ScopedToken> {
        let token = self
            .password_auth(username, password, user_domain_id, project_id)
            .await?;
        Ok(ScopedToken(token))
    }
}

#[async_trait::async_trait]
impl QuotaApi for OpenStackClient {
    async fn set_compute_quota(
        &self,
        project_id: &str,
        quota: &ComputeQuota,
    ) -> DirectoryResult<()> {
        let body = json!({
            "quota_set": {
                "cores": quota.cores,
                "instances": quota.instances,
                "ram": quota.ram_mb,
            }
        });
        self.request_json(
            self.http
                .put(format!(
                    "{}/os-quota-sets/{project_id}",
                    self.config.compute_url
                ))
                .json(&body),
            project_id,
        )
        .await?;
        Ok(())
    }

    async fn set_storage_quota(&self, project_id: &str, quota_gb: i64) -> DirectoryResult<()> {
        let quota_bytes = quota_gb * 1024 * 1024 * 1024;
        self.request_json(
            self.http
                .post(format!("{}/AUTH_{project_id}", self.config.storage_url))
                .header(SWIFT_QUOTA_HEADER, quota_bytes.to_string()),
            project_id,
        )
        .await?;
        Ok(())
    }
}

#[async_trait::async_trait]
impl NetworkApi for OpenStackClient {
    async fn create_security_group(
        &self,
        token: &ScopedToken,
        name: &str,
        description: &str,
    ) -> DirectoryResult<String> {
        let body = json!({
            "security_group": { "name": name, "description": description }
        });
        let response = self
            .http
            .post(format!("{}/security-groups", self.config.network_url))
            .header(AUTH_TOKEN_HEADER, token.secret())
            .json(&body)
            .send()
            .await
            .map_err(DirectoryError::connection)?;

        let status = response.status();
        let text = response.text().await.unwrap_or_default();
        if !status.is_success() {
            return Err(DirectoryError::from_status(status, name, &text));
        }
        let value: Value = serde_json::from_str(&text).map_err(|e| DirectoryError::Protocol {
            message: format!("invalid response body: {e}"),
        })?;
        value["security_group"]["id"]
            .as_str()
            .map(str::to_string)
            .ok_or_else(|| DirectoryError::Protocol {
                message: "security group response missing id".to_string(),
            })
    }

    async fn create_security_group_rule(
        &self,
        token: &ScopedToken,
        security_group_id: &str,
        rule: &SecurityGroupRule,
    ) -> DirectoryResult<()> {
        let body = json!({
            "security_group_rule": {
                "security_group_id": security_group_id,
                "direction": "ingress",
                "protocol": rule.protocol,
                "port_range_min": rule.port_min,
                "port_range_max": rule.port_max,
                "remote_ip_prefix": rule.remote_ip_prefix,
            }
        });
        let response = self
            .http
            .post(format!("{}/security-group-rules", self.config.network_url))
            .header(AUTH_TOKEN_HEADER, token.secret())
            .json(&body)
            .send()
            .await
            .map_err(DirectoryError::connection)?;

        let status = response.status();
        if !status.is_success() {
            let text = response.text().await.unwrap_or_default();
            return Err(DirectoryError::from_status(status, security_group_id, &text));
        }
        Ok(())
    }
}
