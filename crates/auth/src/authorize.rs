use std::collections::HashSet;

use thiserror::Error;

use crate::{Permission, PrincipalId, Role};

/// A fully resolved principal for authorization decisions.
///
/// Construction is decoupled from storage and transport: the API derives it
/// from verified claims and a role→permission policy.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Principal {
    pub principal_id: PrincipalId,
    pub roles: Vec<Role>,
    pub permissions: Vec<Permission>,
}

impl Principal {
    pub fn is_admin(&self) -> bool {
        self.roles.iter().any(Role::is_admin)
    }
}

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum AuthzError {
    #[error("forbidden: missing permission '{0}'")]
    Forbidden(String),
}

/// Command-side authorization contract (checked at the command boundary).
///
/// The API layer enforces these requirements before dispatching an operation.
pub trait CommandAuthorization {
    fn required_permissions(&self) -> &[Permission];
}

/// Authorize a principal for one permission.
///
/// - No IO
/// - No panics
/// - No business logic (pure policy check)
pub fn authorize(principal: &Principal, required: &Permission) -> Result<(), AuthzError> {
    let perms: HashSet<&str> = principal.permissions.iter().map(|p| p.as_str()).collect();

    if perms.contains("*") || perms.contains(required.as_str()) {
        Ok(())
    } else {
        Err(AuthzError::Forbidden(required.as_str().to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn principal(roles: &[&'static str], perms: &[&'static str]) -> Principal {
        Principal {
            principal_id: PrincipalId::new(),
            roles: roles.iter().map(|r| Role::new(*r)).collect(),
            permissions: perms.iter().map(|p| Permission::new(*p)).collect(),
        }
    }

    #[test]
    fn wildcard_grants_everything() {
        let p = principal(&["admin"], &["*"]);
        assert!(p.is_admin());
        assert_eq!(authorize(&p, &Permission::new("items.delete")), Ok(()));
    }

    #[test]
    fn explicit_permission_is_required() {
        let p = principal(&["nurse"], &["stock.additions.create"]);
        assert!(!p.is_admin());
        assert_eq!(authorize(&p, &Permission::new("stock.additions.create")), Ok(()));
        assert_eq!(
            authorize(&p, &Permission::new("stock.additions.delete")),
            Err(AuthzError::Forbidden("stock.additions.delete".to_string()))
        );
    }
}
