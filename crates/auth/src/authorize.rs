use thiserror::Error;

use miam_core::UserId;

use crate::{Permission, Role, permissions_for};

/// An authenticated actor resolved for authorization decisions.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Principal {
    pub user_id: UserId,
    pub role: Role,
    pub permissions: Vec<Permission>,
}

impl Principal {
    /// Principal with the fixed permission set of its role.
    pub fn for_role(user_id: UserId, role: Role) -> Self {
        Self {
            user_id,
            role,
            permissions: permissions_for(role),
        }
    }

    pub fn is_admin(&self) -> bool {
        self.role.is_admin()
    }
}

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum AuthzError {
    #[error("forbidden: missing permission '{0}'")]
    Forbidden(String),

    #[error("forbidden: {0}")]
    NotOwner(String),
}

/// Permissions a command needs before it may be dispatched.
pub trait CommandAuthorization {
    fn required_permissions(&self) -> &[Permission];
}

/// Pure permission check, no IO.
pub fn authorize(principal: &Principal, required: &Permission) -> Result<(), AuthzError> {
    let granted = principal
        .permissions
        .iter()
        .any(|p| p.is_wildcard() || p == required);
    if granted {
        Ok(())
    } else {
        Err(AuthzError::Forbidden(required.as_str().to_string()))
    }
}

/// Resource-level check: the actor owns the resource or is an admin.
pub fn ensure_owner_or_admin(
    principal: &Principal,
    owner: UserId,
    what: &str,
) -> Result<(), AuthzError> {
    if principal.is_admin() || principal.user_id == owner {
        Ok(())
    } else {
        Err(AuthzError::NotOwner(format!("not the owner of this {what}")))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::permissions::{catalog, ordering};

    #[test]
    fn wildcard_grants_everything() {
        let admin = Principal::for_role(UserId::new(), Role::Admin);
        assert!(authorize(&admin, &ordering::PLACE).is_ok());
        assert!(authorize(&admin, &catalog::MENU_MANAGE).is_ok());
    }

    #[test]
    fn missing_permission_is_forbidden() {
        let client = Principal::for_role(UserId::new(), Role::Client);
        let err = authorize(&client, &catalog::MENU_MANAGE).unwrap_err();
        assert_eq!(err, AuthzError::Forbidden("catalog.menu.manage".into()));
    }

    #[test]
    fn ownership_check_lets_admins_through() {
        let owner = UserId::new();
        let stranger = Principal::for_role(UserId::new(), Role::Restaurateur);
        let admin = Principal::for_role(UserId::new(), Role::Admin);

        assert!(ensure_owner_or_admin(&stranger, owner, "restaurant").is_err());
        assert!(ensure_owner_or_admin(&admin, owner, "restaurant").is_ok());
    }
}
