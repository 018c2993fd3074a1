//! Account directory: profile lookup, email index and admin listing.
//!
//! Password hashes stay out of the read model; login rehydrates the account.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;

use miam_auth::{ACCOUNT_AGGREGATE, AccountEvent, AccountStatus, Role, RoleProfile};
use miam_core::UserId;
use miam_events::{EventEnvelope, Projection, ProjectionError, StreamCursors};

use crate::read_model::{InMemoryStore, KeyedStore};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AccountView {
    pub user_id: UserId,
    pub email: String,
    pub full_name: String,
    pub phone: Option<String>,
    pub role: Role,
    pub profile: RoleProfile,
    pub status: AccountStatus,
    /// Couriers only.
    pub available: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

pub struct AccountsProjection<S = InMemoryStore<UserId, AccountView>> {
    store: S,
    emails: InMemoryStore<String, UserId>,
    cursors: StreamCursors,
}

impl AccountsProjection {
    pub fn in_memory() -> Self {
        Self::new(InMemoryStore::new())
    }
}

impl<S> AccountsProjection<S>
where
    S: KeyedStore<UserId, AccountView>,
{
    pub fn new(store: S) -> Self {
        Self { store, emails: InMemoryStore::new(), cursors: StreamCursors::new() }
    }

    pub fn get(&self, user_id: UserId) -> Option<AccountView> {
        self.store.get(&user_id)
    }

    /// Expects an already normalized email.
    pub fn find_by_email(&self, email: &str) -> Option<UserId> {
        self.emails.get(&email.to_string())
    }

    /// Oldest first, optionally restricted to one role.
    pub fn list(&self, role: Option<Role>) -> Vec<AccountView> {
        let mut all: Vec<_> =
            self.store.list().into_iter().filter(|a| role.is_none_or(|r| a.role == r)).collect();
        all.sort_by_key(|a| (a.created_at, a.user_id));
        all
    }

    pub fn count_by_role(&self, role: Role) -> usize {
        self.store.list().iter().filter(|a| a.role == role).count()
    }

    fn touch(&self, user_id: UserId, at: DateTime<Utc>, f: impl FnOnce(&mut AccountView)) {
        self.store.update(&user_id, |view| {
            f(view);
            view.updated_at = at;
        });
    }
}

impl<S> Projection for AccountsProjection<S>
where
    S: KeyedStore<UserId, AccountView>,
{
    fn name(&self) -> &'static str {
        "accounts"
    }

    fn apply_envelope(&self, envelope: &EventEnvelope<JsonValue>) -> Result<(), ProjectionError> {
        if envelope.aggregate_type() != ACCOUNT_AGGREGATE || !self.cursors.should_apply(envelope)? {
            return Ok(());
        }
        let event: AccountEvent =
            envelope.decode().map_err(|e| ProjectionError::deserialize(envelope, e))?;

        match event {
            AccountEvent::Registered(e) => {
                self.emails.upsert(e.email.clone(), e.user_id);
                self.store.upsert(
                    e.user_id,
                    AccountView {
                        user_id: e.user_id,
                        email: e.email,
                        full_name: e.full_name,
                        phone: e.phone,
                        role: e.profile.role(),
                        profile: e.profile,
                        status: AccountStatus::Active,
                        available: false,
                        created_at: e.occurred_at,
                        updated_at: e.occurred_at,
                    },
                );
            }
            AccountEvent::ProfileUpdated(e) => self.touch(e.user_id, e.occurred_at, |v| {
                v.full_name = e.full_name;
                v.phone = e.phone;
                v.profile = e.profile;
            }),
            AccountEvent::PasswordChanged(e) => self.touch(e.user_id, e.occurred_at, |_| {}),
            AccountEvent::CourierAvailabilityChanged(e) => {
                self.touch(e.user_id, e.occurred_at, |v| v.available = e.available)
            }
            AccountEvent::Suspended(e) => {
                self.touch(e.user_id, e.occurred_at, |v| v.status = AccountStatus::Suspended)
            }
            AccountEvent::Activated(e) => {
                self.touch(e.user_id, e.occurred_at, |v| v.status = AccountStatus::Active)
            }
        }

        self.cursors.advance(envelope);
        Ok(())
    }

    fn reset(&self) {
        self.store.clear();
        self.emails.clear();
        self.cursors.clear();
    }
}
