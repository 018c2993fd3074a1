use std::borrow::Cow;

use serde::{Deserialize, Serialize};

use crate::Role;

/// Permission identifier, an opaque dotted string such as `"order.place"`.
///
/// `"*"` grants everything and is only held by admins.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Permission(Cow<'static, str>);

impl Permission {
    pub fn new(name: impl Into<Cow<'static, str>>) -> Self {
        Self(name.into())
    }

    pub const fn from_static(name: &'static str) -> Self {
        Self(Cow::Borrowed(name))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn is_wildcard(&self) -> bool {
        self.as_str() == "*"
    }
}

impl core::fmt::Display for Permission {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.write_str(&self.0)
    }
}

pub const WILDCARD: Permission = Permission::from_static("*");

pub mod account {
    use super::Permission;

    pub const PROFILE_UPDATE: Permission = Permission::from_static("account.profile.update");
}

pub mod catalog {
    use super::Permission;

    pub const RESTAURANT_MANAGE: Permission = Permission::from_static("catalog.restaurant.manage");
    pub const MENU_MANAGE: Permission = Permission::from_static("catalog.menu.manage");
}

pub mod ordering {
    use super::Permission;

    pub const PLACE: Permission = Permission::from_static("order.place");
    pub const READ: Permission = Permission::from_static("order.read");
    pub const FULFIL: Permission = Permission::from_static("order.fulfil");
    pub const CANCEL: Permission = Permission::from_static("order.cancel");
    pub const CHAT: Permission = Permission::from_static("order.chat");
}

pub mod payments {
    use super::Permission;

    pub const INITIATE: Permission = Permission::from_static("payment.initiate");
    pub const READ: Permission = Permission::from_static("payment.read");
}

pub mod delivery {
    use super::Permission;

    pub const WORK: Permission = Permission::from_static("delivery.work");
    pub const EARNINGS_READ: Permission = Permission::from_static("courier.earnings.read");
    pub const PAYOUT_REQUEST: Permission = Permission::from_static("courier.payout.request");
}

pub mod notifications {
    use super::Permission;

    pub const READ: Permission = Permission::from_static("notification.read");
}

pub mod recommendations {
    use super::Permission;

    pub const READ: Permission = Permission::from_static("recommendation.read");
}

pub mod realtime {
    use super::Permission;

    pub const SUBSCRIBE: Permission = Permission::from_static("realtime.subscribe");
}

pub mod admin {
    use super::Permission;

    pub const USERS_READ: Permission = Permission::from_static("admin.users.read");
    pub const USERS_MANAGE: Permission = Permission::from_static("admin.users.manage");
    pub const STATS_READ: Permission = Permission::from_static("admin.stats.read");
    pub const PAYOUTS_MANAGE: Permission = Permission::from_static("admin.payouts.manage");
}

/// Fixed role → permission policy.
pub fn permissions_for(role: Role) -> Vec<Permission> {
    let mut perms = vec![
        account::PROFILE_UPDATE,
        ordering::READ,
        notifications::READ,
        realtime::SUBSCRIBE,
    ];
    match role {
        Role::Admin => return vec![WILDCARD],
        Role::Client => perms.extend([
            ordering::PLACE,
            ordering::CANCEL,
            ordering::CHAT,
            payments::INITIATE,
            payments::READ,
            recommendations::READ,
        ]),
        Role::Restaurateur => perms.extend([
            catalog::RESTAURANT_MANAGE,
            catalog::MENU_MANAGE,
            ordering::FULFIL,
            ordering::CANCEL,
            ordering::CHAT,
        ]),
        Role::Livreur => perms.extend([
            ordering::CHAT,
            delivery::WORK,
            delivery::EARNINGS_READ,
            delivery::PAYOUT_REQUEST,
        ]),
    }
    perms
}
