//! Capability traits for the external cloud services.
//!
//! The orchestrator only ever sees these traits; production wires in the
//! HTTP implementations from [`crate::http`], tests wire in fakes.

use async_trait::async_trait;

use crate::error::DirectoryResult;
use crate::types::{
    ComputeQuota, DirectoryDomain, DirectoryProject, DirectoryRole, DirectoryUser,
    DirectoryUserUpdate, NewDirectoryUser, ScopedToken, SecurityGroupRule,
};

/// The cloud identity directory: users, projects, roles, domains and
/// scoped authentication.
#[async_trait]
pub trait DirectoryClient: Send + Sync {
    /// Fetch a user by directory id.
    async fn get_user(&self, user_id: &str) -> DirectoryResult<DirectoryUser>;

    /// Create a user.
    ///
    /// Returns [`DirectoryError::Conflict`](crate::DirectoryError::Conflict)
    /// when the identity already exists. That is the duplicate-account
    /// signal the pipeline branches on.
    async fn create_user(&self, user: &NewDirectoryUser) -> DirectoryResult<DirectoryUser>;

    /// Apply a partial update to a user.
    async fn update_user(
        &self,
        user_id: &str,
        update: &DirectoryUserUpdate,
    ) -> DirectoryResult<DirectoryUser>;

    /// Create a project in a domain.
    async fn create_project(
        &self,
        name: &str,
        description: &str,
        domain_id: &str,
    ) -> DirectoryResult<DirectoryProject>;

    /// Delete a project (compensating action on the duplicate path).
    async fn delete_project(&self, project_id: &str) -> DirectoryResult<()>;

    /// List all grantable roles.
    async fn list_roles(&self) -> DirectoryResult<Vec<DirectoryRole>>;

    /// Grant a role to a user on a project.
    async fn grant_role(
        &self,
        user_id: &str,
        role_id: &str,
        project_id: &str,
    ) -> DirectoryResult<()>;

    /// Fetch a domain by id.
    async fn get_domain(&self, domain_id: &str) -> DirectoryResult<DirectoryDomain>;

    /// Authenticate as a user scoped to a project, yielding a session
    /// token for project-scoped provisioning calls. The user is looked
    /// up by name inside `user_domain_id`, the domain it was
    /// provisioned into.
    async fn authenticate(
        &self,
        username: &str,
        password: &str,
        user_domain_id: &str,
        project_id: &str,
    ) -> DirectoryResult<ScopedToken>;
}

/// Compute and storage quota management.
#[async_trait]
pub trait QuotaApi: Send + Sync {
    /// Set the compute quota on a project.
    async fn set_compute_quota(&self, project_id: &str, quota: &ComputeQuota)
        -> DirectoryResult<()>;

    /// Set the object-storage quota (in gigabytes) on a project.
    async fn set_storage_quota(&self, project_id: &str, quota_gb: i64) -> DirectoryResult<()>;
}

/// Network security group management, scoped by the new project's token.
#[async_trait]
pub trait NetworkApi: Send + Sync {
    /// Create a security group, returning its id.
    async fn create_security_group(
        &self,
        token: &ScopedToken,
        name: &str,
        description: &str,
    ) -> DirectoryResult<String>;

    /// Add an ingress rule to a security group.
    async fn create_security_group_rule(
        &self,
        token: &ScopedToken,
        security_group_id: &str,
        rule: &SecurityGroupRule,
    ) -> DirectoryResult<()>;
}
