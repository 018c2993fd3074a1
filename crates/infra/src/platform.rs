//! Process wiring: one store, one bus, the inline read models and the hub.

use std::sync::Arc;

use miam_payments::PaymentGateway;

use crate::dispatcher::{CommandDispatcher, DispatchError, EnvelopeBus, SharedDispatcher};
use crate::event_store::{EventStore, InMemoryEventStore};
use crate::projections::{
    AccountsProjection, DeliveriesProjection, OrdersProjection, PaymentsProjection,
    PayoutsProjection, RestaurantsProjection,
};
use crate::reactor::Reactor;
use crate::realtime::RealtimeHub;

pub const DEFAULT_REALTIME_CAPACITY: usize = 256;

#[derive(Clone)]
pub struct ReadModels {
    pub accounts: Arc<AccountsProjection>,
    pub restaurants: Arc<RestaurantsProjection>,
    pub orders: Arc<OrdersProjection>,
    pub payments: Arc<PaymentsProjection>,
    pub deliveries: Arc<DeliveriesProjection>,
    pub payouts: Arc<PayoutsProjection>,
}

impl ReadModels {
    fn new() -> Self {
        Self {
            accounts: Arc::new(AccountsProjection::in_memory()),
            restaurants: Arc::new(RestaurantsProjection::in_memory()),
            orders: Arc::new(OrdersProjection::in_memory()),
            payments: Arc::new(PaymentsProjection::in_memory()),
            deliveries: Arc::new(DeliveriesProjection::in_memory()),
            payouts: Arc::new(PayoutsProjection::in_memory()),
        }
    }
}

#[derive(Clone)]
pub struct Platform {
    pub dispatcher: SharedDispatcher,
    pub read: ReadModels,
    pub hub: RealtimeHub,
}

impl Platform {
    pub fn new(store: Arc<dyn EventStore>, realtime_capacity: usize) -> Self {
        let read = ReadModels::new();
        let dispatcher = CommandDispatcher::new(store, Arc::new(EnvelopeBus::new()))
            .with_projection(read.accounts.clone())
            .with_projection(read.restaurants.clone())
            .with_projection(read.orders.clone())
            .with_projection(read.payments.clone())
            .with_projection(read.deliveries.clone())
            .with_projection(read.payouts.clone());
        Self { dispatcher: Arc::new(dispatcher), read, hub: RealtimeHub::new(realtime_capacity) }
    }

    pub fn in_memory() -> Self {
        Self::new(Arc::new(InMemoryEventStore::new()), DEFAULT_REALTIME_CAPACITY)
    }

    /// Rebuild read models from the store. Call before serving traffic.
    pub async fn replay(&self) -> Result<usize, DispatchError> {
        self.dispatcher.replay().await
    }

    /// A reactor subscribed now; spawn it or drive it with `process_pending`.
    pub fn reactor(&self, gateway: Arc<dyn PaymentGateway>) -> Reactor {
        Reactor::new(self.dispatcher.clone(), gateway, self.read.payments.clone(), self.hub.clone())
    }
}
