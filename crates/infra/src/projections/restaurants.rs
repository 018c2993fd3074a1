use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;

use miam_catalog::{MenuItem, RESTAURANT_AGGREGATE, RestaurantDetails, RestaurantEvent};
use miam_core::{Address, RestaurantId, UserId};
use miam_events::{EventEnvelope, Projection, ProjectionError, StreamCursors};

use crate::read_model::{InMemoryStore, KeyedStore};

/// Public restaurant card, menu included.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RestaurantView {
    pub restaurant_id: RestaurantId,
    pub owner_id: UserId,
    pub name: String,
    pub description: Option<String>,
    pub cuisine: String,
    pub address: Address,
    pub phone: Option<String>,
    pub prep_minutes: u16,
    pub is_open: bool,
    pub menu: Vec<MenuItem>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl RestaurantView {
    pub fn available_items(&self) -> impl Iterator<Item = &MenuItem> {
        self.menu.iter().filter(|i| i.available)
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RestaurantFilter {
    /// Case-insensitive match on the cuisine.
    pub cuisine: Option<String>,
    pub open: Option<bool>,
    pub owner_id: Option<UserId>,
}

pub struct RestaurantsProjection<S = InMemoryStore<RestaurantId, RestaurantView>> {
    store: S,
    cursors: StreamCursors,
}

impl RestaurantsProjection {
    pub fn in_memory() -> Self {
        Self::new(InMemoryStore::new())
    }
}

impl<S> RestaurantsProjection<S>
where
    S: KeyedStore<RestaurantId, RestaurantView>,
{
    pub fn new(store: S) -> Self {
        Self { store, cursors: StreamCursors::new() }
    }

    pub fn get(&self, id: RestaurantId) -> Option<RestaurantView> {
        self.store.get(&id)
    }

    /// Sorted by name.
    pub fn list(&self, filter: &RestaurantFilter) -> Vec<RestaurantView> {
        let cuisine = filter.cuisine.as_deref().map(|c| c.trim().to_lowercase());
        let mut out: Vec<_> = self
            .store
            .list()
            .into_iter()
            .filter(|r| cuisine.as_deref().is_none_or(|c| r.cuisine.to_lowercase() == c))
            .filter(|r| filter.open.is_none_or(|o| r.is_open == o))
            .filter(|r| filter.owner_id.is_none_or(|o| r.owner_id == o))
            .collect();
        out.sort_by(|a, b| a.name.cmp(&b.name).then(a.restaurant_id.cmp(&b.restaurant_id)));
        out
    }

    fn upsert_details(&self, d: RestaurantDetails, created: bool) {
        let existing = self.store.get(&d.restaurant_id);
        let view = RestaurantView {
            restaurant_id: d.restaurant_id,
            owner_id: d.owner_id,
            name: d.name,
            description: d.description,
            cuisine: d.cuisine,
            address: d.address,
            phone: d.phone,
            prep_minutes: d.prep_minutes,
            is_open: existing.as_ref().is_some_and(|r| r.is_open),
            menu: existing.as_ref().map(|r| r.menu.clone()).unwrap_or_default(),
            created_at: match (&existing, created) {
                (Some(r), false) => r.created_at,
                _ => d.occurred_at,
            },
            updated_at: d.occurred_at,
        };
        self.store.upsert(view.restaurant_id, view);
    }

    fn touch(&self, id: RestaurantId, at: DateTime<Utc>, f: impl FnOnce(&mut RestaurantView)) {
        self.store.update(&id, |view| {
            f(view);
            view.updated_at = at;
        });
    }
}

impl<S> Projection for RestaurantsProjection<S>
where
    S: KeyedStore<RestaurantId, RestaurantView>,
{
    fn name(&self) -> &'static str {
        "restaurants"
    }

    fn apply_envelope(&self, envelope: &EventEnvelope<JsonValue>) -> Result<(), ProjectionError> {
        if envelope.aggregate_type() != RESTAURANT_AGGREGATE {
            return Ok(());
        }
        if !self.cursors.should_apply(envelope)? {
            return Ok(());
        }
        let event: RestaurantEvent =
            envelope.decode().map_err(|e| ProjectionError::deserialize(envelope, e))?;

        match event {
            RestaurantEvent::Created(d) => self.upsert_details(d, true),
            RestaurantEvent::Updated(d) => self.upsert_details(d, false),
            RestaurantEvent::Opened(e) => self.touch(e.restaurant_id, e.occurred_at, |r| {
                r.is_open = true;
            }),
            RestaurantEvent::Closed(e) => self.touch(e.restaurant_id, e.occurred_at, |r| {
                r.is_open = false;
            }),
            RestaurantEvent::MenuItemAdded(e) => {
                self.touch(e.restaurant_id, e.occurred_at, |r| r.menu.push(e.item))
            }
            RestaurantEvent::MenuItemUpdated(e) => {
                self.touch(e.restaurant_id, e.occurred_at, |r| {
                    if let Some(slot) = r.menu.iter_mut().find(|i| i.id == e.item.id) {
                        *slot = e.item;
                    }
                })
            }
            RestaurantEvent::MenuItemRemoved(e) => {
                self.touch(e.restaurant_id, e.occurred_at, |r| r.menu.retain(|i| i.id != e.item_id))
            }
        }

        self.cursors.advance(envelope);
        Ok(())
    }

    fn reset(&self) {
        self.store.clear();
        self.cursors.clear();
    }
}
