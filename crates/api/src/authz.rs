//! API-side authorization guard for operations.
//!
//! Enforces authorization at the operation boundary (before the service is
//! called), keeping the domain and infra crates auth-agnostic.

use wardstock_auth::{AuthzError, CommandAuthorization, Permission, Principal, Role, authorize};
use wardstock_inventory::LedgerKind;

use crate::context::PrincipalContext;

/// Permission names checked by handlers.
pub mod perms {
    use wardstock_auth::Permission;

    pub const ITEMS_WRITE: Permission = Permission::from_static("items.write");
    pub const ITEMS_AUDIT: Permission = Permission::from_static("items.audit");
    pub const LOW_STOCK_READ: Permission = Permission::from_static("items.low_stock.read");

    pub const STOCK_READ: Permission = Permission::from_static("stock.read");
    pub const STOCK_CREATE: Permission = Permission::from_static("stock.create");
    pub const STOCK_MANAGE: Permission = Permission::from_static("stock.manage");

    pub const USAGE_READ: Permission = Permission::from_static("usage.read");
    pub const USAGE_CREATE: Permission = Permission::from_static("usage.create");
    pub const USAGE_MANAGE: Permission = Permission::from_static("usage.manage");
    /// Filter usage listings by author.
    pub const USAGE_READ_ANY_USER: Permission = Permission::from_static("usage.read_any_user");
}

/// Read, create and manage (correct/delete) permissions of one ledger.
pub fn ledger_permissions(kind: LedgerKind) -> (Permission, Permission, Permission) {
    match kind {
        LedgerKind::Addition => (perms::STOCK_READ, perms::STOCK_CREATE, perms::STOCK_MANAGE),
        LedgerKind::Usage => (perms::USAGE_READ, perms::USAGE_CREATE, perms::USAGE_MANAGE),
    }
}

/// Associates required permissions with an operation.
pub struct OpAuth {
    pub required: Vec<Permission>,
}

impl OpAuth {
    pub fn new(required: impl IntoIterator<Item = Permission>) -> Self {
        Self {
            required: required.into_iter().collect(),
        }
    }
}

impl CommandAuthorization for OpAuth {
    fn required_permissions(&self) -> &[Permission] {
        &self.required
    }
}

/// Check authorization for an operation in the current request context.
pub fn authorize_command<C: CommandAuthorization>(
    principal: &PrincipalContext,
    command: &C,
) -> Result<(), AuthzError> {
    let resolved = resolve(principal);
    for perm in command.required_permissions() {
        authorize(&resolved, perm)?;
    }
    Ok(())
}

/// Whether the principal holds `permission`, without failing.
pub fn has_permission(principal: &PrincipalContext, permission: &Permission) -> bool {
    authorize(&resolve(principal), permission).is_ok()
}

fn resolve(principal: &PrincipalContext) -> Principal {
    Principal {
        principal_id: principal.principal_id(),
        roles: principal.roles().to_vec(),
        permissions: permissions_from_roles(principal.roles()),
    }
}

/// Role → permission policy.
///
/// `admin` grants everything. Any other authenticated principal may read the
/// ledgers, record stock in/out and see low-stock items.
fn permissions_from_roles(roles: &[Role]) -> Vec<Permission> {
    if roles.iter().any(Role::is_admin) {
        return vec![Permission::new("*")];
    }

    vec![
        perms::LOW_STOCK_READ,
        perms::STOCK_READ,
        perms::STOCK_CREATE,
        perms::USAGE_READ,
        perms::USAGE_CREATE,
    ]
}
