//! Account aggregate (event-sourced).
//!
//! One account per user. The role is fixed at registration and carries a
//! role-specific profile: clients keep a default delivery address,
//! restaurateurs a company name, couriers a vehicle and an availability flag.
//!
//! Password hashing happens before the command is built, so events only ever
//! see the Argon2 PHC string.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use miam_core::{Address, Aggregate, AggregateRoot, DomainError, UserId};
use miam_events::Event;

use crate::Role;

pub const ACCOUNT_AGGREGATE: &str = "auth.account";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum AccountStatus {
    #[default]
    Active,
    Suspended,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Vehicle {
    Bicycle,
    Scooter,
    Car,
    OnFoot,
}

/// Role plus the data only that role carries.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "role", rename_all = "lowercase")]
pub enum RoleProfile {
    Client {
        #[serde(default)]
        default_address: Option<Address>,
    },
    Restaurateur {
        #[serde(default)]
        company_name: Option<String>,
    },
    Livreur {
        vehicle: Vehicle,
    },
    Admin,
}

impl RoleProfile {
    pub fn role(&self) -> Role {
        match self {
            RoleProfile::Client { .. } => Role::Client,
            RoleProfile::Restaurateur { .. } => Role::Restaurateur,
            RoleProfile::Livreur { .. } => Role::Livreur,
            RoleProfile::Admin => Role::Admin,
        }
    }

    fn normalized(&self) -> Result<RoleProfile, DomainError> {
        Ok(match self {
            RoleProfile::Client { default_address } => RoleProfile::Client {
                default_address: default_address.as_ref().map(Address::normalized).transpose()?,
            },
            RoleProfile::Restaurateur { company_name } => RoleProfile::Restaurateur {
                company_name: trimmed(company_name.as_deref()),
            },
            other => other.clone(),
        })
    }
}

/// How the account came to exist. Admins are only created at bootstrap.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RegistrationChannel {
    SelfService,
    Bootstrap,
}

#[derive(Debug, Clone)]
pub struct Account {
    pub id: UserId,
    pub email: String,
    pub password_hash: String,
    pub full_name: String,
    pub phone: Option<String>,
    pub profile: Option<RoleProfile>,
    pub status: AccountStatus,
    /// Couriers only: currently accepting deliveries.
    pub available: bool,
    pub version: u64,
    pub created: bool,
}

impl Account {
    pub fn empty(id: UserId) -> Self {
        Self {
            id,
            email: String::new(),
            password_hash: String::new(),
            full_name: String::new(),
            phone: None,
            profile: None,
            status: AccountStatus::Active,
            available: false,
            version: 0,
            created: false,
        }
    }

    pub fn role(&self) -> Option<Role> {
        self.profile.as_ref().map(RoleProfile::role)
    }

    fn ensure_created(&self) -> Result<(), DomainError> {
        if !self.created {
            return Err(DomainError::NotFound);
        }
        Ok(())
    }

    fn ensure_active(&self) -> Result<(), DomainError> {
        if self.status == AccountStatus::Suspended {
            return Err(DomainError::invariant("account is suspended"));
        }
        Ok(())
    }
}

impl AggregateRoot for Account {
    type Id = UserId;

    fn id(&self) -> &Self::Id {
        &self.id
    }

    fn version(&self) -> u64 {
        self.version
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Commands
// ─────────────────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RegisterAccount {
    pub user_id: UserId,
    pub email: String,
    pub password_hash: String,
    pub full_name: String,
    pub phone: Option<String>,
    pub profile: RoleProfile,
    pub channel: RegistrationChannel,
    pub occurred_at: DateTime<Utc>,
}

/// Partial profile update; `None` leaves a field unchanged.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UpdateProfile {
    pub user_id: UserId,
    pub full_name: Option<String>,
    pub phone: Option<String>,
    pub default_address: Option<Address>,
    pub company_name: Option<String>,
    pub vehicle: Option<Vehicle>,
    pub occurred_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChangePassword {
    pub user_id: UserId,
    pub new_password_hash: String,
    pub occurred_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SetCourierAvailability {
    pub user_id: UserId,
    pub available: bool,
    pub occurred_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SuspendAccount {
    pub user_id: UserId,
    pub reason: String,
    pub occurred_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ActivateAccount {
    pub user_id: UserId,
    pub occurred_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum AccountCommand {
    Register(RegisterAccount),
    UpdateProfile(UpdateProfile),
    ChangePassword(ChangePassword),
    SetCourierAvailability(SetCourierAvailability),
    Suspend(SuspendAccount),
    Activate(ActivateAccount),
}

// ─────────────────────────────────────────────────────────────────────────────
// Events
// ─────────────────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AccountRegistered {
    pub user_id: UserId,
    pub email: String,
    pub password_hash: String,
    pub full_name: String,
    pub phone: Option<String>,
    pub profile: RoleProfile,
    pub occurred_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProfileUpdated {
    pub user_id: UserId,
    pub full_name: String,
    pub phone: Option<String>,
    pub profile: RoleProfile,
    pub occurred_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PasswordChanged {
    pub user_id: UserId,
    pub password_hash: String,
    pub occurred_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CourierAvailabilityChanged {
    pub user_id: UserId,
    pub available: bool,
    pub occurred_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AccountSuspended {
    pub user_id: UserId,
    pub reason: String,
    pub occurred_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AccountActivated {
    pub user_id: UserId,
    pub occurred_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum AccountEvent {
    Registered(AccountRegistered),
    ProfileUpdated(ProfileUpdated),
    PasswordChanged(PasswordChanged),
    CourierAvailabilityChanged(CourierAvailabilityChanged),
    Suspended(AccountSuspended),
    Activated(AccountActivated),
}

impl Event for AccountEvent {
    fn event_type(&self) -> &'static str {
        match self {
            AccountEvent::Registered(_) => "auth.account.registered",
            AccountEvent::ProfileUpdated(_) => "auth.account.profile_updated",
            AccountEvent::PasswordChanged(_) => "auth.account.password_changed",
            AccountEvent::CourierAvailabilityChanged(_) => "auth.account.availability_changed",
            AccountEvent::Suspended(_) => "auth.account.suspended",
            AccountEvent::Activated(_) => "auth.account.activated",
        }
    }

    fn version(&self) -> u32 {
        1
    }

    fn occurred_at(&self) -> DateTime<Utc> {
        match self {
            AccountEvent::Registered(e) => e.occurred_at,
            AccountEvent::ProfileUpdated(e) => e.occurred_at,
            AccountEvent::PasswordChanged(e) => e.occurred_at,
            AccountEvent::CourierAvailabilityChanged(e) => e.occurred_at,
            AccountEvent::Suspended(e) => e.occurred_at,
            AccountEvent::Activated(e) => e.occurred_at,
        }
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Aggregate
// ─────────────────────────────────────────────────────────────────────────────

impl Aggregate for Account {
    type Command = AccountCommand;
    type Event = AccountEvent;
    type Error = DomainError;

    fn apply(&mut self, event: &Self::Event) {
        match event {
            AccountEvent::Registered(e) => {
                self.id = e.user_id;
                self.email = e.email.clone();
                self.password_hash = e.password_hash.clone();
                self.full_name = e.full_name.clone();
                self.phone = e.phone.clone();
                self.profile = Some(e.profile.clone());
                self.status = AccountStatus::Active;
                self.available = false;
                self.created = true;
            }
            AccountEvent::ProfileUpdated(e) => {
                self.full_name = e.full_name.clone();
                self.phone = e.phone.clone();
                self.profile = Some(e.profile.clone());
            }
            AccountEvent::PasswordChanged(e) => self.password_hash = e.password_hash.clone(),
            AccountEvent::CourierAvailabilityChanged(e) => self.available = e.available,
            AccountEvent::Suspended(_) => {
                self.status = AccountStatus::Suspended;
                self.available = false;
            }
            AccountEvent::Activated(_) => self.status = AccountStatus::Active,
        }
        self.version += 1;
    }

    fn handle(&self, command: &Self::Command) -> Result<Vec<Self::Event>, Self::Error> {
        match command {
            AccountCommand::Register(cmd) => self.handle_register(cmd),
            AccountCommand::UpdateProfile(cmd) => self.handle_update_profile(cmd),
            AccountCommand::ChangePassword(cmd) => self.handle_change_password(cmd),
            AccountCommand::SetCourierAvailability(cmd) => self.handle_availability(cmd),
            AccountCommand::Suspend(cmd) => self.handle_suspend(cmd),
            AccountCommand::Activate(cmd) => self.handle_activate(cmd),
        }
    }
}

impl Account {
    fn handle_register(&self, cmd: &RegisterAccount) -> Result<Vec<AccountEvent>, DomainError> {
        if self.created {
            return Err(DomainError::conflict("account already exists"));
        }

        let email = normalize_email(&cmd.email)?;
        let full_name = cmd.full_name.trim();
        if full_name.is_empty() {
            return Err(DomainError::validation("full name cannot be empty"));
        }
        if cmd.password_hash.is_empty() {
            return Err(DomainError::validation("password hash missing"));
        }
        if cmd.profile.role() == Role::Admin && cmd.channel != RegistrationChannel::Bootstrap {
            return Err(DomainError::validation("admin accounts cannot self-register"));
        }

        Ok(vec![AccountEvent::Registered(AccountRegistered {
            user_id: cmd.user_id,
            email,
            password_hash: cmd.password_hash.clone(),
            full_name: full_name.to_string(),
            phone: trimmed(cmd.phone.as_deref()),
            profile: cmd.profile.normalized()?,
            occurred_at: cmd.occurred_at,
        })])
    }

    fn handle_update_profile(&self, cmd: &UpdateProfile) -> Result<Vec<AccountEvent>, DomainError> {
        self.ensure_created()?;
        self.ensure_active()?;

        let full_name = match &cmd.full_name {
            Some(name) if name.trim().is_empty() => {
                return Err(DomainError::validation("full name cannot be empty"));
            }
            Some(name) => name.trim().to_string(),
            None => self.full_name.clone(),
        };
        let phone = match &cmd.phone {
            Some(p) => trimmed(Some(p)),
            None => self.phone.clone(),
        };

        let current = self
            .profile
            .clone()
            .ok_or_else(|| DomainError::invariant("account has no profile"))?;
        let profile = match current {
            RoleProfile::Client { default_address } => RoleProfile::Client {
                default_address: match &cmd.default_address {
                    Some(addr) => Some(addr.normalized()?),
                    None => default_address,
                },
            },
            RoleProfile::Restaurateur { company_name } => RoleProfile::Restaurateur {
                company_name: match &cmd.company_name {
                    Some(c) => trimmed(Some(c)),
                    None => company_name,
                },
            },
            RoleProfile::Livreur { vehicle } => RoleProfile::Livreur {
                vehicle: cmd.vehicle.unwrap_or(vehicle),
            },
            RoleProfile::Admin => RoleProfile::Admin,
        };

        Ok(vec![AccountEvent::ProfileUpdated(ProfileUpdated {
            user_id: self.id,
            full_name,
            phone,
            profile,
            occurred_at: cmd.occurred_at,
        })])
    }

    fn handle_change_password(
        &self,
        cmd: &ChangePassword,
    ) -> Result<Vec<AccountEvent>, DomainError> {
        self.ensure_created()?;
        self.ensure_active()?;
        if cmd.new_password_hash.is_empty() {
            return Err(DomainError::validation("password hash missing"));
        }
        Ok(vec![AccountEvent::PasswordChanged(PasswordChanged {
            user_id: self.id,
            password_hash: cmd.new_password_hash.clone(),
            occurred_at: cmd.occurred_at,
        })])
    }

    fn handle_availability(
        &self,
        cmd: &SetCourierAvailability,
    ) -> Result<Vec<AccountEvent>, DomainError> {
        self.ensure_created()?;
        self.ensure_active()?;
        if self.role() != Some(Role::Livreur) {
            return Err(DomainError::invariant("only couriers have an availability"));
        }
        if self.available == cmd.available {
            return Ok(vec![]);
        }
        Ok(vec![AccountEvent::CourierAvailabilityChanged(
            CourierAvailabilityChanged {
                user_id: self.id,
                available: cmd.available,
                occurred_at: cmd.occurred_at,
            },
        )])
    }

    fn handle_suspend(&self, cmd: &SuspendAccount) -> Result<Vec<AccountEvent>, DomainError> {
        self.ensure_created()?;
        if self.status == AccountStatus::Suspended {
            return Err(DomainError::invariant("account already suspended"));
        }
        if self.role() == Some(Role::Admin) {
            return Err(DomainError::invariant("admin accounts cannot be suspended"));
        }
        Ok(vec![AccountEvent::Suspended(AccountSuspended {
            user_id: self.id,
            reason: cmd.reason.trim().to_string(),
            occurred_at: cmd.occurred_at,
        })])
    }

    fn handle_activate(&self, cmd: &ActivateAccount) -> Result<Vec<AccountEvent>, DomainError> {
        self.ensure_created()?;
        if self.status == AccountStatus::Active {
            return Err(DomainError::invariant("account already active"));
        }
        Ok(vec![AccountEvent::Activated(AccountActivated {
            user_id: self.id,
            occurred_at: cmd.occurred_at,
        })])
    }
}

/// Trim and lowercase; at least `x@y`.
pub fn normalize_email(raw: &str) -> Result<String, DomainError> {
    let email = raw.trim().to_lowercase();
    match email.split_once('@') {
        Some((local, domain)) if !local.is_empty() && !domain.is_empty() => Ok(email),
        _ => Err(DomainError::validation("invalid email format")),
    }
}

fn trimmed(value: Option<&str>) -> Option<String> {
    value.map(str::trim).filter(|v| !v.is_empty()).map(str::to_string)
}
