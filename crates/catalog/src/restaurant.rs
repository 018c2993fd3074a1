use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use miam_core::{
    Actor, Address, Aggregate, AggregateRoot, DomainError, DomainResult, MenuItemId, Money,
    RestaurantId, UserId,
};
use miam_events::Event;

pub const RESTAURANT_AGGREGATE: &str = "catalog.restaurant";

pub const DEFAULT_PREP_MINUTES: u16 = 20;
const MAX_PREP_MINUTES: u16 = 180;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MenuItem {
    pub id: MenuItemId,
    pub name: String,
    pub description: Option<String>,
    pub price: Money,
    pub category: Option<String>,
    pub available: bool,
}

/// Aggregate root: Restaurant, including its menu.
#[derive(Debug, Clone, PartialEq)]
pub struct Restaurant {
    id: RestaurantId,
    owner_id: UserId,
    name: String,
    description: Option<String>,
    cuisine: String,
    address: Option<Address>,
    phone: Option<String>,
    prep_minutes: u16,
    is_open: bool,
    menu: Vec<MenuItem>,
    version: u64,
    created: bool,
}

impl Restaurant {
    pub fn empty(id: RestaurantId) -> Self {
        Self {
            id,
            owner_id: UserId::default(),
            name: String::new(),
            description: None,
            cuisine: String::new(),
            address: None,
            phone: None,
            prep_minutes: DEFAULT_PREP_MINUTES,
            is_open: false,
            menu: Vec::new(),
            version: 0,
            created: false,
        }
    }

    pub fn owner_id(&self) -> UserId {
        self.owner_id
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn cuisine(&self) -> &str {
        &self.cuisine
    }

    pub fn address(&self) -> Option<&Address> {
        self.address.as_ref()
    }

    pub fn prep_minutes(&self) -> u16 {
        self.prep_minutes
    }

    pub fn is_open(&self) -> bool {
        self.is_open
    }

    pub fn exists(&self) -> bool {
        self.created
    }

    /// Live items only; removed items are dropped from state.
    pub fn menu(&self) -> &[MenuItem] {
        &self.menu
    }

    pub fn item(&self, id: MenuItemId) -> Option<&MenuItem> {
        self.menu.iter().find(|i| i.id == id)
    }

    fn ensure_created(&self) -> DomainResult<()> {
        if !self.created {
            return Err(DomainError::NotFound);
        }
        Ok(())
    }

    fn ensure_can_manage(&self, actor: &Actor) -> DomainResult<()> {
        self.ensure_created()?;
        actor.ensure_owner_or_admin(self.owner_id)
    }

    fn ensure_unique_name(&self, name: &str, except: Option<MenuItemId>) -> DomainResult<()> {
        let clash = self
            .menu
            .iter()
            .any(|i| Some(i.id) != except && i.name.to_lowercase() == name.to_lowercase());
        if clash {
            return Err(DomainError::conflict(format!("menu already has an item named '{name}'")));
        }
        Ok(())
    }
}

impl AggregateRoot for Restaurant {
    type Id = RestaurantId;

    fn id(&self) -> &Self::Id {
        &self.id
    }

    fn version(&self) -> u64 {
        self.version
    }
}

/// Command: CreateRestaurant.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CreateRestaurant {
    pub restaurant_id: RestaurantId,
    pub owner_id: UserId,
    pub name: String,
    pub description: Option<String>,
    pub cuisine: String,
    pub address: Address,
    pub phone: Option<String>,
    pub prep_minutes: Option<u16>,
    pub occurred_at: DateTime<Utc>,
}

/// Command: UpdateRestaurant. `None` keeps the current value.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UpdateRestaurant {
    pub restaurant_id: RestaurantId,
    pub actor: Actor,
    pub name: Option<String>,
    pub description: Option<String>,
    pub cuisine: Option<String>,
    pub address: Option<Address>,
    pub phone: Option<String>,
    pub prep_minutes: Option<u16>,
    pub occurred_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OpenRestaurant {
    pub restaurant_id: RestaurantId,
    pub actor: Actor,
    pub occurred_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CloseRestaurant {
    pub restaurant_id: RestaurantId,
    pub actor: Actor,
    pub occurred_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AddMenuItem {
    pub restaurant_id: RestaurantId,
    pub actor: Actor,
    pub item_id: MenuItemId,
    pub name: String,
    pub description: Option<String>,
    pub price: Money,
    pub category: Option<String>,
    pub occurred_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UpdateMenuItem {
    pub restaurant_id: RestaurantId,
    pub actor: Actor,
    pub item_id: MenuItemId,
    pub name: Option<String>,
    pub description: Option<String>,
    pub price: Option<Money>,
    pub category: Option<String>,
    pub occurred_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SetMenuItemAvailability {
    pub restaurant_id: RestaurantId,
    pub actor: Actor,
    pub item_id: MenuItemId,
    pub available: bool,
    pub occurred_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RemoveMenuItem {
    pub restaurant_id: RestaurantId,
    pub actor: Actor,
    pub item_id: MenuItemId,
    pub occurred_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum RestaurantCommand {
    Create(CreateRestaurant),
    Update(UpdateRestaurant),
    Open(OpenRestaurant),
    Close(CloseRestaurant),
    AddMenuItem(AddMenuItem),
    UpdateMenuItem(UpdateMenuItem),
    SetMenuItemAvailability(SetMenuItemAvailability),
    RemoveMenuItem(RemoveMenuItem),
}

/// Restaurant details as they stand after a create or an update.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RestaurantDetails {
    pub restaurant_id: RestaurantId,
    pub owner_id: UserId,
    pub name: String,
    pub description: Option<String>,
    pub cuisine: String,
    pub address: Address,
    pub phone: Option<String>,
    pub prep_minutes: u16,
    pub occurred_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OpeningChanged {
    pub restaurant_id: RestaurantId,
    pub occurred_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MenuItemChanged {
    pub restaurant_id: RestaurantId,
    pub item: MenuItem,
    pub occurred_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MenuItemRemoved {
    pub restaurant_id: RestaurantId,
    pub item_id: MenuItemId,
    pub occurred_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum RestaurantEvent {
    Created(RestaurantDetails),
    Updated(RestaurantDetails),
    Opened(OpeningChanged),
    Closed(OpeningChanged),
    MenuItemAdded(MenuItemChanged),
    MenuItemUpdated(MenuItemChanged),
    MenuItemRemoved(MenuItemRemoved),
}

impl Event for RestaurantEvent {
    fn event_type(&self) -> &'static str {
        match self {
            RestaurantEvent::Created(_) => "catalog.restaurant.created",
            RestaurantEvent::Updated(_) => "catalog.restaurant.updated",
            RestaurantEvent::Opened(_) => "catalog.restaurant.opened",
            RestaurantEvent::Closed(_) => "catalog.restaurant.closed",
            RestaurantEvent::MenuItemAdded(_) => "catalog.restaurant.menu_item_added",
            RestaurantEvent::MenuItemUpdated(_) => "catalog.restaurant.menu_item_updated",
            RestaurantEvent::MenuItemRemoved(_) => "catalog.restaurant.menu_item_removed",
        }
    }

    fn version(&self) -> u32 {
        1
    }

    fn occurred_at(&self) -> DateTime<Utc> {
        match self {
            RestaurantEvent::Created(e) | RestaurantEvent::Updated(e) => e.occurred_at,
            RestaurantEvent::Opened(e) | RestaurantEvent::Closed(e) => e.occurred_at,
            RestaurantEvent::MenuItemAdded(e) | RestaurantEvent::MenuItemUpdated(e) => {
                e.occurred_at
            }
            RestaurantEvent::MenuItemRemoved(e) => e.occurred_at,
        }
    }
}

impl Aggregate for Restaurant {
    type Command = RestaurantCommand;
    type Event = RestaurantEvent;
    type Error = DomainError;

    fn apply(&mut self, event: &Self::Event) {
        match event {
            RestaurantEvent::Created(d) | RestaurantEvent::Updated(d) => {
                self.id = d.restaurant_id;
                self.owner_id = d.owner_id;
                self.name = d.name.clone();
                self.description = d.description.clone();
                self.cuisine = d.cuisine.clone();
                self.address = Some(d.address.clone());
                self.phone = d.phone.clone();
                self.prep_minutes = d.prep_minutes;
                self.created = true;
            }
            RestaurantEvent::Opened(_) => self.is_open = true,
            RestaurantEvent::Closed(_) => self.is_open = false,
            RestaurantEvent::MenuItemAdded(e) => self.menu.push(e.item.clone()),
            RestaurantEvent::MenuItemUpdated(e) => {
                if let Some(slot) = self.menu.iter_mut().find(|i| i.id == e.item.id) {
                    *slot = e.item.clone();
                }
            }
            RestaurantEvent::MenuItemRemoved(e) => self.menu.retain(|i| i.id != e.item_id),
        }
        self.version += 1;
    }

    fn handle(&self, command: &Self::Command) -> Result<Vec<Self::Event>, Self::Error> {
        match command {
            RestaurantCommand::Create(cmd) => {
                if self.created {
                    return Err(DomainError::conflict("restaurant already exists"));
                }
                let address = cmd.address.normalized()?;
                address.require_location()?;
                Ok(vec![RestaurantEvent::Created(RestaurantDetails {
                    restaurant_id: cmd.restaurant_id,
                    owner_id: cmd.owner_id,
                    name: required(&cmd.name, "restaurant name")?,
                    description: optional(cmd.description.as_deref()),
                    cuisine: required(&cmd.cuisine, "cuisine")?,
                    address,
                    phone: optional(cmd.phone.as_deref()),
                    prep_minutes: prep_minutes(cmd.prep_minutes.unwrap_or(DEFAULT_PREP_MINUTES))?,
                    occurred_at: cmd.occurred_at,
                })])
            }
            RestaurantCommand::Update(cmd) => {
                self.ensure_can_manage(&cmd.actor)?;
                let address = match &cmd.address {
                    Some(a) => {
                        let a = a.normalized()?;
                        a.require_location()?;
                        a
                    }
                    None => self
                        .address
                        .clone()
                        .ok_or_else(|| DomainError::invariant("restaurant has no address"))?,
                };
                Ok(vec![RestaurantEvent::Updated(RestaurantDetails {
                    restaurant_id: self.id,
                    owner_id: self.owner_id,
                    name: match &cmd.name {
                        Some(n) => required(n, "restaurant name")?,
                        None => self.name.clone(),
                    },
                    description: match &cmd.description {
                        Some(d) => optional(Some(d)),
                        None => self.description.clone(),
                    },
                    cuisine: match &cmd.cuisine {
                        Some(c) => required(c, "cuisine")?,
                        None => self.cuisine.clone(),
                    },
                    address,
                    phone: match &cmd.phone {
                        Some(p) => optional(Some(p)),
                        None => self.phone.clone(),
                    },
                    prep_minutes: prep_minutes(cmd.prep_minutes.unwrap_or(self.prep_minutes))?,
                    occurred_at: cmd.occurred_at,
                })])
            }
            RestaurantCommand::Open(cmd) => {
                self.ensure_can_manage(&cmd.actor)?;
                if self.is_open {
                    return Ok(vec![]);
                }
                Ok(vec![RestaurantEvent::Opened(OpeningChanged {
                    restaurant_id: self.id,
                    occurred_at: cmd.occurred_at,
                })])
            }
            RestaurantCommand::Close(cmd) => {
                self.ensure_can_manage(&cmd.actor)?;
                if !self.is_open {
                    return Ok(vec![]);
                }
                Ok(vec![RestaurantEvent::Closed(OpeningChanged {
                    restaurant_id: self.id,
                    occurred_at: cmd.occurred_at,
                })])
            }
            RestaurantCommand::AddMenuItem(cmd) => {
                self.ensure_can_manage(&cmd.actor)?;
                if self.item(cmd.item_id).is_some() {
                    return Err(DomainError::conflict("menu item already exists"));
                }
                let name = required(&cmd.name, "menu item name")?;
                self.ensure_unique_name(&name, None)?;
                Ok(vec![RestaurantEvent::MenuItemAdded(MenuItemChanged {
                    restaurant_id: self.id,
                    item: MenuItem {
                        id: cmd.item_id,
                        name,
                        description: optional(cmd.description.as_deref()),
                        price: positive_price(cmd.price)?,
                        category: optional(cmd.category.as_deref()),
                        available: true,
                    },
                    occurred_at: cmd.occurred_at,
                })])
            }
            RestaurantCommand::UpdateMenuItem(cmd) => {
                self.ensure_can_manage(&cmd.actor)?;
                let current = self.item(cmd.item_id).ok_or(DomainError::NotFound)?;
                let name = match &cmd.name {
                    Some(n) => required(n, "menu item name")?,
                    None => current.name.clone(),
                };
                self.ensure_unique_name(&name, Some(current.id))?;
                Ok(vec![RestaurantEvent::MenuItemUpdated(MenuItemChanged {
                    restaurant_id: self.id,
                    item: MenuItem {
                        id: current.id,
                        name,
                        description: match &cmd.description {
                            Some(d) => optional(Some(d)),
                            None => current.description.clone(),
                        },
                        price: positive_price(cmd.price.unwrap_or(current.price))?,
                        category: match &cmd.category {
                            Some(c) => optional(Some(c)),
                            None => current.category.clone(),
                        },
                        available: current.available,
                    },
                    occurred_at: cmd.occurred_at,
                })])
            }
            RestaurantCommand::SetMenuItemAvailability(cmd) => {
                self.ensure_can_manage(&cmd.actor)?;
                let current = self.item(cmd.item_id).ok_or(DomainError::NotFound)?;
                if current.available == cmd.available {
                    return Ok(vec![]);
                }
                Ok(vec![RestaurantEvent::MenuItemUpdated(MenuItemChanged {
                    restaurant_id: self.id,
                    item: MenuItem { available: cmd.available, ..current.clone() },
                    occurred_at: cmd.occurred_at,
                })])
            }
            RestaurantCommand::RemoveMenuItem(cmd) => {
                self.ensure_can_manage(&cmd.actor)?;
                if self.item(cmd.item_id).is_none() {
                    return Err(DomainError::NotFound);
                }
                Ok(vec![RestaurantEvent::MenuItemRemoved(MenuItemRemoved {
                    restaurant_id: self.id,
                    item_id: cmd.item_id,
                    occurred_at: cmd.occurred_at,
                })])
            }
        }
    }
}

fn required(value: &str, what: &str) -> DomainResult<String> {
    let v = value.trim();
    if v.is_empty() {
        return Err(DomainError::validation(format!("{what} cannot be empty")));
    }
    Ok(v.to_string())
}

fn optional(value: Option<&str>) -> Option<String> {
    value.map(str::trim).filter(|v| !v.is_empty()).map(str::to_string)
}

fn positive_price(price: Money) -> DomainResult<Money> {
    if !price.is_positive() {
        return Err(DomainError::validation("price must be greater than zero"));
    }
    Ok(price)
}

fn prep_minutes(minutes: u16) -> DomainResult<u16> {
    if minutes == 0 || minutes > MAX_PREP_MINUTES {
        return Err(DomainError::validation(format!(
            "preparation time must be within 1..={MAX_PREP_MINUTES} minutes"
        )));
    }
    Ok(minutes)
}
