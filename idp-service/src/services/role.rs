//! Catalog of system roles.
//!
//! System roles are `<type>-<resource>` pairs such as `write-user`. Holding a
//! write role without the matching read role is never allowed, and cluster
//! roles only exist inside the master project.

use std::collections::BTreeMap;
use std::fmt;

use crate::models::MASTER_PROJECT;

use super::{ErrorKind, ServiceError};

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum Resource {
    Cluster,
    Project,
    Role,
    User,
    Client,
    CustomRole,
}

impl Resource {
    pub const ALL: [Resource; 6] = [
        Resource::Cluster,
        Resource::Project,
        Resource::Role,
        Resource::User,
        Resource::Client,
        Resource::CustomRole,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            Resource::Cluster => "cluster",
            Resource::Project => "project",
            Resource::Role => "role",
            Resource::User => "user",
            Resource::Client => "client",
            Resource::CustomRole => "customrole",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum RoleType {
    Read,
    Write,
}

impl RoleType {
    pub fn as_str(self) -> &'static str {
        match self {
            RoleType::Read => "read",
            RoleType::Write => "write",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SystemRole {
    pub id: String,
    pub resource: Resource,
    pub role_type: RoleType,
}

impl SystemRole {
    fn new(resource: Resource, role_type: RoleType) -> Self {
        Self {
            id: format!("{}-{}", role_type.as_str(), resource.as_str()),
            resource,
            role_type,
        }
    }

    /// Id of the read role paired with this role's resource.
    pub fn read_counterpart(&self) -> String {
        format!("{}-{}", RoleType::Read.as_str(), self.resource.as_str())
    }

    pub fn write_counterpart(&self) -> String {
        format!("{}-{}", RoleType::Write.as_str(), self.resource.as_str())
    }
}

impl fmt::Display for SystemRole {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.id)
    }
}

#[derive(Debug, Clone)]
pub struct RoleCatalog {
    roles: BTreeMap<String, SystemRole>,
}

impl Default for RoleCatalog {
    fn default() -> Self {
        Self::new()
    }
}

impl RoleCatalog {
    pub fn new() -> Self {
        let mut roles = BTreeMap::new();
        for resource in Resource::ALL {
            for role_type in [RoleType::Read, RoleType::Write] {
                let role = SystemRole::new(resource, role_type);
                roles.insert(role.id.clone(), role);
            }
        }
        Self { roles }
    }

    pub fn get(&self, id: &str) -> Option<&SystemRole> {
        self.roles.get(id)
    }

    pub fn all_ids(&self) -> Vec<String> {
        self.roles.keys().cloned().collect()
    }

    fn lookup(&self, id: &str) -> Result<&SystemRole, ServiceError> {
        self.get(id).ok_or_else(|| {
            ServiceError::validation(format!("Unknown system role {}", id))
        })
    }

    fn check_scope(role: &SystemRole, project: &str) -> Result<(), ServiceError> {
        if role.resource == Resource::Cluster && project != MASTER_PROJECT {
            return Err(ServiceError::validation(format!(
                "Role {} is only available in the {} project",
                role.id, MASTER_PROJECT
            )));
        }
        Ok(())
    }

    /// Check a complete role set as it will be stored on a user.
    pub fn validate_set(&self, project: &str, roles: &[String]) -> Result<(), ServiceError> {
        for id in roles {
            let role = self.lookup(id)?;
            Self::check_scope(role, project)?;
            if role.role_type == RoleType::Write && !roles.contains(&role.read_counterpart()) {
                return Err(ServiceError::validation(format!(
                    "Role {} requires {}",
                    role.id,
                    role.read_counterpart()
                )));
            }
        }
        Ok(())
    }

    /// Check adding `id` to a user currently holding `held`.
    pub fn check_grant(&self, project: &str, held: &[String], id: &str) -> Result<(), ServiceError> {
        let role = self.lookup(id)?;
        Self::check_scope(role, project)?;
        if held.iter().any(|r| r == id) {
            return Err(ServiceError::new(
                ErrorKind::AlreadyExists,
                format!("Role {} is already assigned", id),
            ));
        }
        if role.role_type == RoleType::Write && !held.contains(&role.read_counterpart()) {
            return Err(ServiceError::validation(format!(
                "Role {} requires {}",
                role.id,
                role.read_counterpart()
            )));
        }
        Ok(())
    }

    /// Check removing `id` from a user currently holding `held`.
    pub fn check_revoke(&self, held: &[String], id: &str) -> Result<(), ServiceError> {
        let role = self.lookup(id)?;
        if !held.iter().any(|r| r == id) {
            return Err(ServiceError::not_found(format!("Role {} is not assigned", id)));
        }
        if role.role_type == RoleType::Read && held.contains(&role.write_counterpart()) {
            return Err(ServiceError::validation(format!(
                "Role {} is still required by {}",
                role.id,
                role.write_counterpart()
            )));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ids(v: &[&str]) -> Vec<String> {
        v.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn catalog_has_every_pair() {
        let catalog = RoleCatalog::new();
        assert_eq!(catalog.all_ids().len(), 12);
        assert!(catalog.get("write-customrole").is_some());
        assert!(catalog.get("manage-user").is_none());
    }

    #[test]
    fn write_needs_read() {
        let catalog = RoleCatalog::new();
        assert!(catalog.validate_set("tenant-a", &ids(&["write-user"])).is_err());
        assert!(catalog
            .validate_set("tenant-a", &ids(&["read-user", "write-user"]))
            .is_ok());
    }

    #[test]
    fn cluster_roles_stay_in_master() {
        let catalog = RoleCatalog::new();
        assert!(catalog.validate_set("tenant-a", &ids(&["read-cluster"])).is_err());
        assert!(catalog.validate_set(MASTER_PROJECT, &ids(&["read-cluster"])).is_ok());
        assert!(catalog.check_grant("tenant-a", &[], "read-cluster").is_err());
    }

    #[test]
    fn grant_and_revoke_guards() {
        let catalog = RoleCatalog::new();
        let held = ids(&["read-user", "write-user"]);

        let err = catalog.check_grant("tenant-a", &held, "read-user").unwrap_err();
        assert!(err.is(ErrorKind::AlreadyExists));

        let err = catalog.check_revoke(&held, "read-user").unwrap_err();
        assert!(err.is(ErrorKind::ValidationFailed));

        let err = catalog.check_revoke(&held, "read-client").unwrap_err();
        assert!(err.is(ErrorKind::NotFound));

        assert!(catalog.check_revoke(&held, "write-user").is_ok());
    }
}
