use serde::{Deserialize, Serialize};

use crate::error::{DomainError, DomainResult};
use crate::id::UserId;

/// Who issued a command, as far as an aggregate needs to know.
///
/// Aggregates decide participation themselves (client, owner, courier) by
/// comparing ids they hold; the admin flag is the only role fact they need.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Actor {
    pub user_id: UserId,
    pub is_admin: bool,
}

impl Actor {
    pub fn user(user_id: UserId) -> Self {
        Self { user_id, is_admin: false }
    }

    pub fn admin(user_id: UserId) -> Self {
        Self { user_id, is_admin: true }
    }

    pub fn is(&self, user_id: UserId) -> bool {
        self.user_id == user_id
    }

    /// `Unauthorized` unless the actor is `owner` or an admin.
    pub fn ensure_owner_or_admin(&self, owner: UserId) -> DomainResult<()> {
        if self.is_admin || self.is(owner) {
            Ok(())
        } else {
            Err(DomainError::unauthorized())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn owner_and_admin_pass() {
        let owner = UserId::new();
        assert!(Actor::user(owner).ensure_owner_or_admin(owner).is_ok());
        assert!(Actor::admin(UserId::new()).ensure_owner_or_admin(owner).is_ok());
        assert_eq!(
            Actor::user(UserId::new()).ensure_owner_or_admin(owner),
            Err(DomainError::Unauthorized)
        );
    }
}
