//! API-side authorization guard for commands.
//!
//! Permissions are checked at the command boundary, before dispatch. Ownership
//! and participation are left to the aggregates (through the caller's
//! [`Actor`](miam_core::Actor)) or to the handler when only a read model knows.

use miam_auth::{AuthzError, CommandAuthorization, Permission, authorize};

use crate::context::PrincipalContext;

pub fn authorize_command<C: CommandAuthorization>(
    principal: &PrincipalContext,
    command: &C,
) -> Result<(), AuthzError> {
    let principal = principal.principal();
    for perm in command.required_permissions() {
        authorize(&principal, perm)?;
    }
    Ok(())
}

pub fn require(principal: &PrincipalContext, permission: &Permission) -> Result<(), AuthzError> {
    authorize(&principal.principal(), permission)
}
