//! Service wiring shared by every handler: the platform (store, dispatcher,
//! read models, realtime hub), token signing, the payment gateway and the
//! earnings policy.

use std::collections::hash_map::DefaultHasher;
use std::hash::{Hash, Hasher};
use std::sync::Arc;

use anyhow::Context;
use chrono::Utc;
use tokio::sync::Mutex;
use tracing::{info, instrument, warn};

use miam_auth::{
    ACCOUNT_AGGREGATE, Account, AccountCommand, Hs256Jwt, RegisterAccount, RegistrationChannel,
    RoleProfile, hash_password, normalize_email,
};
use miam_catalog::{RESTAURANT_AGGREGATE, Restaurant, RestaurantCommand};
use miam_core::{DeliveryId, OrderId, PaymentId, RestaurantId, UserId};
use miam_delivery::{
    CourierWallet, DELIVERY_AGGREGATE, Delivery, DeliveryCommand, EarningsPolicy, WALLET_AGGREGATE,
    WalletCommand,
};
use miam_infra::event_store::{EventStore, InMemoryEventStore};
use miam_infra::projections::{AccountView, OrderView, PaymentView};
use miam_infra::{Platform, ReadModels};
use miam_notifications::{INBOX_AGGREGATE, Inbox, InboxCommand};
use miam_ordering::{
    CHAT_AGGREGATE, ORDER_AGGREGATE, Order, OrderChat, OrderChatCommand, OrderCommand,
    OrderStatus, PaymentStatus,
};
use miam_payments::{
    ChargeRequest, CompletePayment, FailPayment, GatewayOutcome, InitiatePayment, MockGateway,
    PAYMENT_AGGREGATE, Payment, PaymentCommand, PaymentGateway,
};

use crate::app::errors::{ApiError, ApiResult};
use crate::config::{AppConfig, BootstrapAdmin};

pub struct NewAccount {
    pub email: String,
    pub password: String,
    pub full_name: String,
    pub phone: Option<String>,
    pub profile: RoleProfile,
    pub channel: RegistrationChannel,
}

pub struct AppServices {
    pub platform: Platform,
    pub jwt: Arc<Hs256Jwt>,
    pub gateway: Arc<dyn PaymentGateway>,
    pub earnings: EarningsPolicy,
    /// Serializes the email-uniqueness check with the registration commit.
    registration: Mutex<()>,
    payment_locks: PaymentLocks,
}

const PAYMENT_STRIPES: usize = 64;

/// Striped per-order locks around the open-payment check and `Initiate`, so
/// an order is never charged twice while other orders proceed in parallel.
struct PaymentLocks {
    stripes: Vec<Mutex<()>>,
}

impl PaymentLocks {
    fn new() -> Self {
        Self { stripes: (0..PAYMENT_STRIPES).map(|_| Mutex::new(())).collect() }
    }

    fn for_order(&self, order_id: OrderId) -> &Mutex<()> {
        let mut hasher = DefaultHasher::new();
        order_id.hash(&mut hasher);
        &self.stripes[(hasher.finish() as usize) % self.stripes.len()]
    }
}

/// Build the services, replay the store into the read models and bootstrap
/// the admin account if configured.
pub async fn build_services(config: &AppConfig) -> anyhow::Result<AppServices> {
    build_services_with(config, Arc::new(MockGateway::new())).await
}

pub async fn build_services_with(
    config: &AppConfig,
    gateway: Arc<dyn PaymentGateway>,
) -> anyhow::Result<AppServices> {
    let store = open_store(config).await?;
    let platform = Platform::new(store, config.realtime_capacity);
    let replayed = platform.replay().await.context("failed to replay event store")?;
    info!(events = replayed, "read models rebuilt");

    let services = AppServices {
        platform,
        jwt: Arc::new(Hs256Jwt::new(config.jwt_secret.as_bytes(), config.jwt_ttl)),
        gateway,
        earnings: config.earnings,
        registration: Mutex::new(()),
        payment_locks: PaymentLocks::new(),
    };
    if let Some(admin) = &config.bootstrap_admin {
        services.bootstrap_admin(admin).await.context("failed to bootstrap admin account")?;
    }
    Ok(services)
}

#[cfg(feature = "postgres")]
async fn open_store(config: &AppConfig) -> anyhow::Result<Arc<dyn EventStore>> {
    use miam_infra::event_store::PostgresEventStore;

    let Some(url) = &config.database_url else {
        return Ok(Arc::new(InMemoryEventStore::new()));
    };
    let store = PostgresEventStore::connect(url).await.context("failed to connect to Postgres")?;
    store.migrate().await.context("failed to migrate the events table")?;
    info!("using Postgres event store");
    Ok(Arc::new(store))
}

#[cfg(not(feature = "postgres"))]
async fn open_store(config: &AppConfig) -> anyhow::Result<Arc<dyn EventStore>> {
    if config.database_url.is_some() {
        warn!("DATABASE_URL is set but the postgres feature is disabled; using in-memory store");
    }
    Ok(Arc::new(InMemoryEventStore::new()))
}

impl AppServices {
    pub fn read(&self) -> &ReadModels {
        &self.platform.read
    }

    #[instrument(skip_all, fields(channel = ?account.channel))]
    pub async fn register_account(&self, account: NewAccount) -> ApiResult<AccountView> {
        let email = normalize_email(&account.email)?;
        let password = account.password;
        // Argon2 is deliberately slow; keep it off the async workers.
        let password_hash = tokio::task::spawn_blocking(move || hash_password(&password))
            .await
            .map_err(|e| ApiError::Internal(e.to_string()))??;

        let _guard = self.registration.lock().await;
        if self.read().accounts.find_by_email(&email).is_some() {
            return Err(ApiError::Conflict("email already registered".into()));
        }

        let user_id = UserId::new();
        let cmd = AccountCommand::Register(RegisterAccount {
            user_id,
            email,
            password_hash,
            full_name: account.full_name,
            phone: account.phone,
            profile: account.profile,
            channel: account.channel,
            occurred_at: Utc::now(),
        });
        self.account(user_id, cmd).await?;
        self.read().accounts.get(user_id).ok_or_else(|| ApiError::not_found("account"))
    }

    async fn bootstrap_admin(&self, admin: &BootstrapAdmin) -> ApiResult<()> {
        let email = normalize_email(&admin.email)?;
        if self.read().accounts.find_by_email(&email).is_some() {
            return Ok(());
        }
        let view = self
            .register_account(NewAccount {
                email,
                password: admin.password.clone(),
                full_name: "Administrator".into(),
                phone: None,
                profile: RoleProfile::Admin,
                channel: RegistrationChannel::Bootstrap,
            })
            .await?;
        info!(user_id = %view.user_id, "bootstrap admin registered");
        Ok(())
    }

    /// Charge an order and record the outcome.
    ///
    /// Cash payments stay pending until the order is delivered. A gateway
    /// outage fails the payment and surfaces as a 502.
    #[instrument(skip(self), fields(order_id = %order_id))]
    pub async fn initiate_payment(
        &self,
        payer_id: UserId,
        order_id: OrderId,
    ) -> ApiResult<PaymentView> {
        let (payment_id, order) = {
            let _guard = self.payment_locks.for_order(order_id).lock().await;
            let order =
                self.read().orders.get(order_id).ok_or_else(|| ApiError::not_found("order"))?;
            if order.client_id != payer_id {
                return Err(ApiError::forbidden("only the ordering client can pay"));
            }
            if order.status == OrderStatus::Cancelled {
                return Err(ApiError::Invariant("order is cancelled".into()));
            }
            if order.payment_status != PaymentStatus::Unpaid {
                return Err(ApiError::Conflict("order is already paid".into()));
            }
            if self.read().payments.active_for_order(order_id).is_some() {
                return Err(ApiError::Conflict("a payment for this order is already open".into()));
            }

            let payment_id = PaymentId::new();
            let initiate = PaymentCommand::Initiate(InitiatePayment {
                payment_id,
                order_id,
                payer_id,
                amount: order.total,
                method: order.payment_method,
                occurred_at: Utc::now(),
            });
            self.payment(payment_id, initiate).await?;
            (payment_id, order)
        };

        // From here the open payment turns away further attempts.
        if order.payment_method.is_online() {
            self.charge(payment_id, &order).await?;
        }

        self.read().payments.get(payment_id).ok_or_else(|| ApiError::not_found("payment"))
    }

    async fn charge(&self, payment_id: PaymentId, order: &OrderView) -> ApiResult<()> {
        let request = ChargeRequest {
            payment_id,
            order_id: order.order_id,
            amount: order.total,
            method: order.payment_method,
        };
        let reference = match self.gateway.charge(&request).await {
            Ok(GatewayOutcome::Approved { reference }) => reference,
            Ok(GatewayOutcome::Declined { reason }) => {
                self.fail_payment(payment_id, reason).await?;
                return Ok(());
            }
            Err(err) => {
                self.fail_payment(payment_id, err.to_string()).await?;
                return Err(err.into());
            }
        };

        let complete = PaymentCommand::Complete(CompletePayment {
            payment_id,
            provider_reference: Some(reference.clone()),
            occurred_at: Utc::now(),
        });
        if let Err(err) = self.payment(payment_id, complete).await {
            // The payment was voided while the provider was charging.
            warn!(%payment_id, error = %err, "approved charge could not be recorded");
            let refund_ref = self.gateway.refund(&reference, order.total).await?;
            info!(%payment_id, %refund_ref, "charge returned at provider");
            return Err(ApiError::Conflict(
                "order was cancelled during payment; the charge was refunded".into(),
            ));
        }
        Ok(())
    }

    async fn fail_payment(&self, payment_id: PaymentId, reason: String) -> ApiResult<()> {
        let cmd = PaymentCommand::Fail(FailPayment { payment_id, reason, occurred_at: Utc::now() });
        self.payment(payment_id, cmd).await?;
        Ok(())
    }

    // ── per-aggregate dispatch ────────────────────────────────────────────

    pub async fn account(&self, user_id: UserId, cmd: AccountCommand) -> ApiResult<Account> {
        let out = self
            .platform
            .dispatcher
            .dispatch(ACCOUNT_AGGREGATE, user_id.into(), cmd, |id| Account::empty(id.into()))
            .await?;
        Ok(out.aggregate)
    }

    pub async fn restaurant(
        &self,
        restaurant_id: RestaurantId,
        cmd: RestaurantCommand,
    ) -> ApiResult<Restaurant> {
        let out = self
            .platform
            .dispatcher
            .dispatch(RESTAURANT_AGGREGATE, restaurant_id.into(), cmd, |id| {
                Restaurant::empty(id.into())
            })
            .await?;
        Ok(out.aggregate)
    }

    pub async fn order(&self, order_id: OrderId, cmd: OrderCommand) -> ApiResult<Order> {
        let out = self
            .platform
            .dispatcher
            .dispatch(ORDER_AGGREGATE, order_id.into(), cmd, |id| Order::empty(id.into()))
            .await?;
        Ok(out.aggregate)
    }

    pub async fn chat(&self, order_id: OrderId, cmd: OrderChatCommand) -> ApiResult<OrderChat> {
        let out = self
            .platform
            .dispatcher
            .dispatch(CHAT_AGGREGATE, order_id.into(), cmd, |id| OrderChat::empty(id.into()))
            .await?;
        Ok(out.aggregate)
    }

    pub async fn payment(&self, payment_id: PaymentId, cmd: PaymentCommand) -> ApiResult<Payment> {
        let out = self
            .platform
            .dispatcher
            .dispatch(PAYMENT_AGGREGATE, payment_id.into(), cmd, |id| Payment::empty(id.into()))
            .await?;
        Ok(out.aggregate)
    }

    pub async fn delivery(
        &self,
        delivery_id: DeliveryId,
        cmd: DeliveryCommand,
    ) -> ApiResult<Delivery> {
        let out = self
            .platform
            .dispatcher
            .dispatch(DELIVERY_AGGREGATE, delivery_id.into(), cmd, |id| {
                Delivery::empty(id.into())
            })
            .await?;
        Ok(out.aggregate)
    }

    pub async fn wallet(&self, courier_id: UserId, cmd: WalletCommand) -> ApiResult<CourierWallet> {
        let out = self
            .platform
            .dispatcher
            .dispatch(WALLET_AGGREGATE, courier_id.into(), cmd, |id| {
                CourierWallet::empty(id.into())
            })
            .await?;
        Ok(out.aggregate)
    }

    pub async fn inbox(&self, recipient_id: UserId, cmd: InboxCommand) -> ApiResult<Inbox> {
        let out = self
            .platform
            .dispatcher
            .dispatch(INBOX_AGGREGATE, recipient_id.into(), cmd, |id| Inbox::empty(id.into()))
            .await?;
        Ok(out.aggregate)
    }

    // ── rehydration without a command ─────────────────────────────────────

    pub async fn load_account(&self, user_id: UserId) -> ApiResult<Account> {
        let account: Account = self
            .platform
            .dispatcher
            .load(ACCOUNT_AGGREGATE, user_id.into(), |id| Account::empty(id.into()))
            .await?;
        Ok(account)
    }

    pub async fn load_restaurant(&self, restaurant_id: RestaurantId) -> ApiResult<Restaurant> {
        let restaurant: Restaurant = self
            .platform
            .dispatcher
            .load(RESTAURANT_AGGREGATE, restaurant_id.into(), |id| Restaurant::empty(id.into()))
            .await?;
        Ok(restaurant)
    }

    pub async fn load_chat(&self, order_id: OrderId) -> ApiResult<OrderChat> {
        let chat: OrderChat = self
            .platform
            .dispatcher
            .load(CHAT_AGGREGATE, order_id.into(), |id| OrderChat::empty(id.into()))
            .await?;
        Ok(chat)
    }

    pub async fn load_wallet(&self, courier_id: UserId) -> ApiResult<CourierWallet> {
        let wallet: CourierWallet = self
            .platform
            .dispatcher
            .load(WALLET_AGGREGATE, courier_id.into(), |id| CourierWallet::empty(id.into()))
            .await?;
        Ok(wallet)
    }

    pub async fn load_inbox(&self, recipient_id: UserId) -> ApiResult<Inbox> {
        let inbox: Inbox = self
            .platform
            .dispatcher
            .load(INBOX_AGGREGATE, recipient_id.into(), |id| Inbox::empty(id.into()))
            .await?;
        Ok(inbox)
    }
}

#[cfg(test)]
mod tests {
    use tokio::sync::Notify;

    use miam_catalog::{AddMenuItem, CreateRestaurant, OpenRestaurant};
    use miam_core::{Actor, Address, GeoPoint, MenuItemId, Money};
    use miam_ordering::{
        CancelOrder, DeliveryTerms, LineRequest, PaymentMethod, PlaceOrder, price_lines,
    };
    use miam_payments::{GatewayError, PaymentState};

    use super::*;

    /// Holds every charge until released, then approves it.
    #[derive(Default)]
    struct HeldGateway {
        charging: Notify,
        release: Notify,
        refunds: std::sync::Mutex<Vec<String>>,
    }

    #[axum::async_trait]
    impl PaymentGateway for HeldGateway {
        async fn charge(&self, _request: &ChargeRequest) -> Result<GatewayOutcome, GatewayError> {
            self.charging.notify_one();
            self.release.notified().await;
            Ok(GatewayOutcome::Approved { reference: "held_ch_1".into() })
        }

        async fn refund(&self, reference: &str, _amount: Money) -> Result<String, GatewayError> {
            self.refunds.lock().unwrap().push(reference.to_string());
            Ok("held_re_1".into())
        }
    }

    fn address(lat: f64) -> Address {
        Address {
            street: "Avenue Cheikh Anta Diop".into(),
            city: "Dakar".into(),
            postal_code: None,
            location: Some(GeoPoint { lat, lng: -17.4467 }),
        }
    }

    /// An open restaurant and a placed order; returns `(client_id, order_id)`.
    async fn seed_order(services: &AppServices, method: PaymentMethod) -> (UserId, OrderId) {
        let (owner, client) = (UserId::new(), UserId::new());
        let (restaurant_id, item_id) = (RestaurantId::new(), MenuItemId::new());
        let now = Utc::now();
        let commands = [
            RestaurantCommand::Create(CreateRestaurant {
                restaurant_id,
                owner_id: owner,
                name: "Chez Awa".into(),
                description: None,
                cuisine: "Senegalese".into(),
                address: address(14.6928),
                phone: None,
                prep_minutes: None,
                occurred_at: now,
            }),
            RestaurantCommand::AddMenuItem(AddMenuItem {
                restaurant_id,
                actor: Actor::user(owner),
                item_id,
                name: "Thieboudienne".into(),
                description: None,
                price: Money::from_cents(2_000),
                category: None,
                occurred_at: now,
            }),
            RestaurantCommand::Open(OpenRestaurant {
                restaurant_id,
                actor: Actor::user(owner),
                occurred_at: now,
            }),
        ];
        let mut restaurant = None;
        for cmd in commands {
            restaurant = Some(services.restaurant(restaurant_id, cmd).await.unwrap());
        }
        let restaurant = restaurant.unwrap();

        let priced = price_lines(&restaurant, &[LineRequest { item_id, quantity: 1 }]).unwrap();
        let (pickup, dropoff) = (address(14.6928), address(14.7100));
        let distance_m =
            pickup.require_location().unwrap().distance_m(&dropoff.require_location().unwrap());
        let quote = services.earnings.quote(distance_m).unwrap();
        let order_id = OrderId::new();
        let place = OrderCommand::Place(PlaceOrder {
            order_id,
            client_id: client,
            restaurant_id,
            owner_id: owner,
            lines: priced.lines,
            delivery: DeliveryTerms {
                pickup,
                dropoff,
                distance_m,
                delivery_fee: quote.delivery_fee,
                courier_earning: quote.courier_earning,
                tip: Money::ZERO,
            },
            payment_method: method,
            notes: None,
            occurred_at: now,
        });
        services.order(order_id, place).await.unwrap();
        (client, order_id)
    }

    async fn services_with(gateway: Arc<HeldGateway>) -> Arc<AppServices> {
        let config = AppConfig::for_tests("services-secret");
        Arc::new(build_services_with(&config, gateway).await.unwrap())
    }

    #[tokio::test]
    async fn charge_approved_after_cancellation_is_returned_to_the_payer() {
        let gateway = Arc::new(HeldGateway::default());
        let services = services_with(gateway.clone()).await;
        let mut reactor = services.platform.reactor(gateway.clone());
        let (client, order_id) = seed_order(&services, PaymentMethod::Card).await;

        let paying = tokio::spawn({
            let services = services.clone();
            async move { services.initiate_payment(client, order_id).await }
        });
        gateway.charging.notified().await;

        // The client cancels while the provider is still charging.
        let cancel = OrderCommand::Cancel(CancelOrder {
            order_id,
            actor: Actor::user(client),
            reason: None,
            occurred_at: Utc::now(),
        });
        services.order(order_id, cancel).await.unwrap();
        reactor.process_pending().await;
        gateway.release.notify_one();

        let outcome = paying.await.unwrap();
        assert!(matches!(outcome, Err(ApiError::Conflict(_))));
        assert_eq!(gateway.refunds.lock().unwrap().as_slice(), ["held_ch_1".to_string()]);
        let payments = services.read().payments.for_payer(client);
        assert_eq!(payments.len(), 1);
        assert_eq!(payments[0].state, PaymentState::Failed);
    }

    #[tokio::test]
    async fn a_slow_charge_blocks_only_its_own_order() {
        let gateway = Arc::new(HeldGateway::default());
        let services = services_with(gateway.clone()).await;
        let (client, card_order) = seed_order(&services, PaymentMethod::Card).await;
        let (cash_client, cash_order) = seed_order(&services, PaymentMethod::Cash).await;

        let paying = tokio::spawn({
            let services = services.clone();
            async move { services.initiate_payment(client, card_order).await }
        });
        gateway.charging.notified().await;

        let again = services.initiate_payment(client, card_order).await;
        assert!(matches!(again, Err(ApiError::Conflict(_))));
        let cash = services.initiate_payment(cash_client, cash_order).await.unwrap();
        assert_eq!(cash.state, PaymentState::Pending);

        gateway.release.notify_one();
        let card = paying.await.unwrap().unwrap();
        assert_eq!(card.state, PaymentState::Completed);
    }
}
