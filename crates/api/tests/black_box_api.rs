use std::time::Duration;

use miam_api::config::BootstrapAdmin;
use miam_api::{AppConfig, build_app};
use reqwest::StatusCode;
use serde_json::{Value, json};

const JWT_SECRET: &str = "test-secret";
const ADMIN_EMAIL: &str = "root@miam.test";
const ADMIN_PASSWORD: &str = "root-password";

struct TestServer {
    base_url: String,
    client: reqwest::Client,
    handle: tokio::task::JoinHandle<()>,
}

impl TestServer {
    async fn spawn() -> Self {
        // Same router as prod, in-memory store, ephemeral port.
        let mut config = AppConfig::for_tests(JWT_SECRET);
        config.bootstrap_admin = Some(BootstrapAdmin {
            email: ADMIN_EMAIL.into(),
            password: ADMIN_PASSWORD.into(),
        });
        let app = build_app(&config).await.expect("failed to build app");
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0")
            .await
            .expect("failed to bind ephemeral port");
        let addr = listener.local_addr().unwrap();

        let handle = tokio::spawn(async move {
            axum::serve(listener, app).await.unwrap();
        });

        Self { base_url: format!("http://{addr}/api"), client: reqwest::Client::new(), handle }
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }

    async fn post(&self, path: &str, token: Option<&str>, body: Value) -> (StatusCode, Value) {
        let mut req = self.client.post(self.url(path)).json(&body);
        if let Some(token) = token {
            req = req.bearer_auth(token);
        }
        let res = req.send().await.unwrap();
        let status = res.status();
        (status, res.json().await.unwrap_or(Value::Null))
    }

    async fn put(&self, path: &str, token: &str, body: Value) -> (StatusCode, Value) {
        let res =
            self.client.put(self.url(path)).bearer_auth(token).json(&body).send().await.unwrap();
        let status = res.status();
        (status, res.json().await.unwrap_or(Value::Null))
    }

    async fn get(&self, path: &str, token: Option<&str>) -> (StatusCode, Value) {
        let mut req = self.client.get(self.url(path));
        if let Some(token) = token {
            req = req.bearer_auth(token);
        }
        let res = req.send().await.unwrap();
        let status = res.status();
        (status, res.json().await.unwrap_or(Value::Null))
    }

    /// POST with a raw body, sent as JSON whatever it contains.
    async fn post_raw(&self, path: &str, token: &str, body: &'static str) -> (StatusCode, Value) {
        let res = self
            .client
            .post(self.url(path))
            .bearer_auth(token)
            .header(reqwest::header::CONTENT_TYPE, "application/json")
            .body(body)
            .send()
            .await
            .unwrap();
        let status = res.status();
        (status, res.json().await.unwrap_or(Value::Null))
    }

    /// Status of a realtime subscription; the stream itself is dropped unread.
    async fn subscribe(&self, rooms: &str, token: &str) -> StatusCode {
        let url = self.url(&format!("/realtime?rooms={rooms}"));
        self.client.get(url).bearer_auth(token).send().await.unwrap().status()
    }

    /// Follow-ups run in the background reactor; poll until it catches up.
    async fn get_until(&self, path: &str, token: &str, done: impl Fn(&Value) -> bool) -> Value {
        for _ in 0..100 {
            let (status, body) = self.get(path, Some(token)).await;
            if status == StatusCode::OK && done(&body) {
                return body;
            }
            tokio::time::sleep(Duration::from_millis(20)).await;
        }
        panic!("{path} did not reach the expected state in time");
    }

    /// Register an account and return `(token, user_id)`.
    async fn register(&self, role: &str, email: &str, extra: Value) -> (String, String) {
        let mut body = json!({
            "email": email,
            "password": "correct-horse",
            "full_name": format!("Test {role}"),
            "role": role,
        });
        if let (Some(body), Some(extra)) = (body.as_object_mut(), extra.as_object()) {
            body.extend(extra.clone());
        }
        let (status, res) = self.post("/auth/register", None, body).await;
        assert_eq!(status, StatusCode::CREATED, "register {email}: {res}");
        (
            res["token"].as_str().unwrap().to_string(),
            res["user"]["user_id"].as_str().unwrap().to_string(),
        )
    }

    async fn login(&self, email: &str, password: &str) -> (StatusCode, Value) {
        self.post("/auth/login", None, json!({ "email": email, "password": password })).await
    }
}

impl Drop for TestServer {
    fn drop(&mut self) {
        self.handle.abort();
    }
}

fn address(lat: f64) -> Value {
    json!({
        "street": "1 Rue du Commerce",
        "city": "Abidjan",
        "location": { "lat": lat, "lng": -4.0083 },
    })
}

/// An open restaurant with one item on its menu: `(owner_token, restaurant_id, item_id)`.
async fn open_restaurant(srv: &TestServer, email: &str) -> (String, String, String) {
    let (owner, _) =
        srv.register("restaurateur", email, json!({ "company_name": "Chez Test" })).await;

    let (status, restaurant) = srv
        .post(
            "/restaurants",
            Some(&owner),
            json!({ "name": "Maquis Test", "cuisine": "ivorian", "address": address(5.36) }),
        )
        .await;
    assert_eq!(status, StatusCode::CREATED, "{restaurant}");
    let restaurant_id = restaurant["restaurant_id"].as_str().unwrap().to_string();

    let (status, item) = srv
        .post(
            &format!("/restaurants/{restaurant_id}/menu"),
            Some(&owner),
            json!({ "name": "Garba", "price": 1500 }),
        )
        .await;
    assert_eq!(status, StatusCode::CREATED, "{item}");
    let item_id = item["id"].as_str().unwrap().to_string();

    let (status, opened) =
        srv.post(&format!("/restaurants/{restaurant_id}/open"), Some(&owner), json!({})).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(opened["is_open"], true);

    (owner, restaurant_id, item_id)
}

async fn place_order(
    srv: &TestServer,
    client: &str,
    restaurant_id: &str,
    item_id: &str,
    method: &str,
) -> Value {
    let (status, order) = srv
        .post(
            "/orders",
            Some(client),
            json!({
                "restaurant_id": restaurant_id,
                "items": [{ "item_id": item_id, "quantity": 2 }],
                "delivery_address": address(5.378),
                "payment_method": method,
                "tip": 200,
            }),
        )
        .await;
    assert_eq!(status, StatusCode::CREATED, "{order}");
    order
}

#[tokio::test]
async fn register_login_and_verify_round_trip() {
    let srv = TestServer::spawn().await;
    let (token, user_id) = srv.register("client", "Ama@Example.com ", json!({})).await;

    let (status, verified) = srv.get("/auth/verify", Some(&token)).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(verified["valid"], true);
    assert_eq!(verified["claims"]["sub"], user_id.as_str());
    assert_eq!(verified["claims"]["role"], "client");
    assert_eq!(verified["user"]["email"], "ama@example.com");

    let (status, login) = srv.login("ama@example.com", "correct-horse").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(login["user"]["user_id"], user_id.as_str());

    let (status, err) = srv.login("ama@example.com", "wrong-horse").await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
    assert_eq!(err["error"], "unauthorized");
    let (status, _) = srv.login("nobody@example.com", "correct-horse").await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);

    let (status, _) = srv.get("/auth/verify", Some("not-a-jwt")).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn registration_rejects_duplicates_and_admins() {
    let srv = TestServer::spawn().await;
    srv.register("client", "kofi@example.com", json!({})).await;

    let body = json!({
        "email": "KOFI@example.com",
        "password": "correct-horse",
        "full_name": "Kofi",
        "role": "client",
    });
    let (status, err) = srv.post("/auth/register", None, body).await;
    assert_eq!(status, StatusCode::CONFLICT);
    assert_eq!(err["error"], "conflict");

    let body = json!({
        "email": "boss@example.com",
        "password": "correct-horse",
        "full_name": "Boss",
        "role": "admin",
    });
    let (status, _) = srv.post("/auth/register", None, body).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    let body = json!({
        "email": "short@example.com",
        "password": "short",
        "full_name": "Short",
        "role": "client",
    });
    let (status, _) = srv.post("/auth/register", None, body).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn unauthenticated_writes_are_rejected() {
    let srv = TestServer::spawn().await;
    for path in ["/orders", "/restaurants", "/payments", "/notifications/read-all"] {
        let (status, body) = srv.post(path, None, json!({})).await;
        assert_eq!(status, StatusCode::UNAUTHORIZED, "{path}");
        assert_eq!(body["error"], "unauthorized");
    }
    let (status, _) = srv.get("/auth/me", None).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn list_endpoints_return_arrays() {
    let srv = TestServer::spawn().await;
    let (status, body) = srv.get("/restaurants", None).await;
    assert_eq!(status, StatusCode::OK);
    assert!(body.is_array());

    let (client, _) = srv.register("client", "lists@example.com", json!({})).await;
    for path in ["/orders", "/payments", "/notifications"] {
        let (status, body) = srv.get(path, Some(&client)).await;
        assert_eq!(status, StatusCode::OK, "{path}");
        assert!(body.is_array(), "{path}: {body}");
    }
}

#[tokio::test]
async fn courier_cannot_place_orders_and_client_cannot_manage_menus() {
    let srv = TestServer::spawn().await;
    let (_, restaurant_id, item_id) = open_restaurant(&srv, "owner-perm@example.com").await;
    let (courier, _) =
        srv.register("livreur", "rider-perm@example.com", json!({ "vehicle": "bicycle" })).await;
    let (client, _) = srv.register("client", "client-perm@example.com", json!({})).await;

    let body = json!({
        "restaurant_id": restaurant_id,
        "items": [{ "item_id": item_id, "quantity": 1 }],
        "delivery_address": address(5.37),
        "payment_method": "cash",
    });
    let (status, _) = srv.post("/orders", Some(&courier), body).await;
    assert_eq!(status, StatusCode::FORBIDDEN);

    let (status, _) = srv
        .post(
            &format!("/restaurants/{restaurant_id}/menu"),
            Some(&client),
            json!({ "name": "Alloco", "price": 800 }),
        )
        .await;
    assert_eq!(status, StatusCode::FORBIDDEN);
}

#[tokio::test]
async fn full_delivery_happy_path() {
    let srv = TestServer::spawn().await;
    let (owner, restaurant_id, item_id) = open_restaurant(&srv, "owner@example.com").await;
    let (client, _) = srv.register("client", "client@example.com", json!({})).await;
    let (courier, courier_id) =
        srv.register("livreur", "rider@example.com", json!({ "vehicle": "scooter" })).await;

    let order = place_order(&srv, &client, &restaurant_id, &item_id, "card").await;
    let order_id = order["order_id"].as_str().unwrap().to_string();
    assert_eq!(order["status"], "pending");
    assert_eq!(order["subtotal"], 3000);
    let fee = order["delivery"]["delivery_fee"].as_i64().unwrap();
    assert_eq!(order["total"].as_i64().unwrap(), 3000 + fee + 200);

    let (status, payment) =
        srv.post("/payments", Some(&client), json!({ "order_id": order_id })).await;
    assert_eq!(status, StatusCode::CREATED, "{payment}");
    assert_eq!(payment["state"], "completed");
    let order_path = format!("/orders/{order_id}");
    srv.get_until(&order_path, &client, |o| o["payment_status"] == "paid").await;

    let (status, again) =
        srv.post("/payments", Some(&client), json!({ "order_id": order_id })).await;
    assert_eq!(status, StatusCode::CONFLICT, "{again}");

    for step in ["confirm", "prepare", "ready"] {
        let (status, body) =
            srv.post(&format!("/orders/{order_id}/{step}"), Some(&owner), json!({})).await;
        assert_eq!(status, StatusCode::OK, "{step}: {body}");
    }

    let (status, _) =
        srv.put("/couriers/me/availability", &courier, json!({ "available": true })).await;
    assert_eq!(status, StatusCode::OK);

    let board = srv
        .get_until("/deliveries/available", &courier, |d| {
            d.as_array().is_some_and(|d| d.iter().any(|d| d["order_id"] == order_id.as_str()))
        })
        .await;
    let delivery = board
        .as_array()
        .unwrap()
        .iter()
        .find(|d| d["order_id"] == order_id.as_str())
        .unwrap()
        .clone();
    let delivery_id = delivery["delivery_id"].as_str().unwrap().to_string();
    let earning = delivery["courier_earning"].as_i64().unwrap();
    assert_eq!(delivery["tip"], 200);

    let (status, body) =
        srv.post(&format!("/deliveries/{delivery_id}/accept"), Some(&courier), json!({})).await;
    assert_eq!(status, StatusCode::OK, "{body}");
    srv.get_until(&order_path, &client, |o| o["courier_id"] == courier_id.as_str()).await;
    srv.get_until(&format!("/deliveries/{delivery_id}"), &courier, |d| {
        d["ready_for_pickup"] == true
    })
    .await;

    for step in ["pickup", "complete"] {
        let (status, body) =
            srv.post(&format!("/deliveries/{delivery_id}/{step}"), Some(&courier), json!({})).await;
        assert_eq!(status, StatusCode::OK, "{step}: {body}");
        if step == "pickup" {
            srv.get_until(&order_path, &client, |o| o["status"] == "picked_up").await;
        }
    }

    srv.get_until(&order_path, &client, |o| o["status"] == "delivered").await;
    let wallet = srv
        .get_until("/couriers/me/wallet", &courier, |w| w["available"].as_i64() > Some(0))
        .await;
    assert_eq!(wallet["available"].as_i64().unwrap(), earning + 200);

    let notes = srv
        .get_until("/notifications", &client, |n| {
            n.as_array().is_some_and(|n| n.iter().any(|n| n["kind"] == "order_delivered"))
        })
        .await;
    assert!(notes.as_array().unwrap().iter().any(|n| n["kind"] == "payment_completed"));
}

#[tokio::test]
async fn cancellation_rules_follow_roles_and_refund_paid_orders() {
    let srv = TestServer::spawn().await;
    let (owner, restaurant_id, item_id) = open_restaurant(&srv, "owner-c@example.com").await;
    let (client, _) = srv.register("client", "client-c@example.com", json!({})).await;

    // Paid while pending; the client may still cancel and is refunded.
    let order = place_order(&srv, &client, &restaurant_id, &item_id, "card").await;
    let order_id = order["order_id"].as_str().unwrap().to_string();
    let (_, payment) = srv.post("/payments", Some(&client), json!({ "order_id": order_id })).await;
    let payment_id = payment["payment_id"].as_str().unwrap().to_string();
    srv.get_until(&format!("/orders/{order_id}"), &client, |o| o["payment_status"] == "paid")
        .await;

    let (status, cancelled) = srv
        .post(&format!("/orders/{order_id}/cancel"), Some(&client), json!({ "reason": "late" }))
        .await;
    assert_eq!(status, StatusCode::OK, "{cancelled}");
    assert_eq!(cancelled["status"], "cancelled");
    srv.get_until(&format!("/payments/{payment_id}"), &client, |p| p["state"] == "refunded")
        .await;

    let (status, err) =
        srv.post(&format!("/orders/{order_id}/cancel"), Some(&client), json!({})).await;
    assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY, "{err}");

    // Cash order: confirmable unpaid; the client loses the right to cancel.
    let order = place_order(&srv, &client, &restaurant_id, &item_id, "cash").await;
    let order_id = order["order_id"].as_str().unwrap().to_string();
    let (status, _) =
        srv.post(&format!("/orders/{order_id}/confirm"), Some(&owner), json!({})).await;
    assert_eq!(status, StatusCode::OK);

    let (status, _) =
        srv.post(&format!("/orders/{order_id}/cancel"), Some(&client), json!({})).await;
    assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);
    let (status, body) =
        srv.post(&format!("/orders/{order_id}/cancel"), Some(&owner), json!({})).await;
    assert_eq!(status, StatusCode::OK, "{body}");

    // Unpaid card orders cannot be confirmed.
    let order = place_order(&srv, &client, &restaurant_id, &item_id, "card").await;
    let order_id = order["order_id"].as_str().unwrap();
    let (status, _) =
        srv.post(&format!("/orders/{order_id}/confirm"), Some(&owner), json!({})).await;
    assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);
}

#[tokio::test]
async fn strangers_cannot_read_orders_or_chat() {
    let srv = TestServer::spawn().await;
    let (owner, restaurant_id, item_id) = open_restaurant(&srv, "owner-chat@example.com").await;
    let (client, _) = srv.register("client", "client-chat@example.com", json!({})).await;
    let (stranger, _) = srv.register("client", "nosy@example.com", json!({})).await;

    let order = place_order(&srv, &client, &restaurant_id, &item_id, "cash").await;
    let order_id = order["order_id"].as_str().unwrap();
    let messages = format!("/orders/{order_id}/messages");

    let (status, msg) = srv.post(&messages, Some(&client), json!({ "body": "ring twice" })).await;
    assert_eq!(status, StatusCode::CREATED, "{msg}");
    let (status, history) = srv.get(&messages, Some(&owner)).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(history[0]["body"], "ring twice");

    let (status, _) = srv.get(&format!("/orders/{order_id}"), Some(&stranger)).await;
    assert_eq!(status, StatusCode::FORBIDDEN);
    let (status, _) = srv.post(&messages, Some(&stranger), json!({ "body": "hi" })).await;
    assert_eq!(status, StatusCode::FORBIDDEN);

    let (status, err) = srv.get("/orders/not-a-uuid", Some(&client)).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(err["error"], "invalid_id");
}

#[tokio::test]
async fn admin_suspension_blocks_login() {
    let srv = TestServer::spawn().await;
    let (status, admin) = srv.login(ADMIN_EMAIL, ADMIN_PASSWORD).await;
    assert_eq!(status, StatusCode::OK, "{admin}");
    assert_eq!(admin["user"]["role"], "admin");
    let admin = admin["token"].as_str().unwrap().to_string();

    let (client, client_id) = srv.register("client", "suspend-me@example.com", json!({})).await;
    let (status, users) = srv.get("/admin/users?role=client", Some(&admin)).await;
    assert_eq!(status, StatusCode::OK);
    assert!(users.as_array().unwrap().iter().any(|u| u["user_id"] == client_id.as_str()));

    let (status, _) = srv.get("/admin/stats", Some(&client)).await;
    assert_eq!(status, StatusCode::FORBIDDEN);

    let (status, suspended) = srv
        .post(&format!("/admin/users/{client_id}/suspend"), Some(&admin), json!({}))
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(suspended["status"], "suspended");

    let (status, _) = srv.login("suspend-me@example.com", "correct-horse").await;
    assert_eq!(status, StatusCode::FORBIDDEN);
    let (status, _) = srv.get("/auth/me", Some(&client)).await;
    assert_eq!(status, StatusCode::FORBIDDEN);

    let (status, stats) = srv.get("/admin/stats", Some(&admin)).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(stats["users"]["clients"], 1);
}

#[tokio::test]
async fn payouts_respect_the_minimum() {
    let srv = TestServer::spawn().await;
    let (courier, _) =
        srv.register("livreur", "broke@example.com", json!({ "vehicle": "on_foot" })).await;

    let (status, err) = srv.post("/couriers/me/payouts", Some(&courier), json!({})).await;
    assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY, "{err}");

    let (status, earnings) = srv.get("/couriers/me/earnings", Some(&courier)).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(earnings["deliveries"], 0);
    assert_eq!(earnings["available"], 0);
}

#[tokio::test]
async fn malformed_optional_bodies_are_rejected() {
    let srv = TestServer::spawn().await;
    let (_, restaurant_id, item_id) = open_restaurant(&srv, "owner-bodies@example.com").await;
    let (client, _) = srv.register("client", "client-bodies@example.com", json!({})).await;
    let rider = json!({ "vehicle": "bicycle" });
    let (courier, _) = srv.register("livreur", "courier-bodies@example.com", rider).await;

    let payouts = "/couriers/me/payouts";
    let bad_amount = json!({ "amount": "not-a-number" });
    let (status, err) = srv.post(payouts, Some(&courier), bad_amount).await;
    assert_eq!(status, StatusCode::BAD_REQUEST, "{err}");
    assert_eq!(err["error"], "validation_error");
    let (status, _) = srv.post_raw(payouts, &courier, "{\"amount\":").await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    // No body at all still means "everything available".
    let (status, _) = srv.post_raw(payouts, &courier, "").await;
    assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);

    let order = place_order(&srv, &client, &restaurant_id, &item_id, "cash").await;
    let order_id = order["order_id"].as_str().unwrap();
    let cancel = format!("/orders/{order_id}/cancel");
    let (status, err) = srv.post(&cancel, Some(&client), json!({ "reason": 42 })).await;
    assert_eq!(status, StatusCode::BAD_REQUEST, "{err}");
    let (status, order) = srv.get(&format!("/orders/{order_id}"), Some(&client)).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(order["status"], "pending");

    let (status, order) = srv.post_raw(&cancel, &client, "").await;
    assert_eq!(status, StatusCode::OK, "{order}");
    assert_eq!(order["status"], "cancelled");
}

#[tokio::test]
async fn realtime_rooms_are_limited_to_participants() {
    let srv = TestServer::spawn().await;
    let (owner, restaurant_id, item_id) = open_restaurant(&srv, "owner-rooms@example.com").await;
    let (other_owner, ..) = open_restaurant(&srv, "rival-rooms@example.com").await;
    let (client, _) = srv.register("client", "client-rooms@example.com", json!({})).await;
    let (stranger, _) = srv.register("client", "stranger-rooms@example.com", json!({})).await;
    let (courier, _) =
        srv.register("livreur", "courier-rooms@example.com", json!({ "vehicle": "bicycle" })).await;

    let order = place_order(&srv, &client, &restaurant_id, &item_id, "cash").await;
    let order_room = format!("order:{}", order["order_id"].as_str().unwrap());
    let restaurant_room = format!("restaurant:{restaurant_id}");

    assert_eq!(srv.subscribe(&order_room, &client).await, StatusCode::OK);
    assert_eq!(srv.subscribe(&order_room, &owner).await, StatusCode::OK);
    assert_eq!(srv.subscribe(&order_room, &stranger).await, StatusCode::FORBIDDEN);

    assert_eq!(srv.subscribe(&restaurant_room, &owner).await, StatusCode::OK);
    assert_eq!(srv.subscribe(&restaurant_room, &other_owner).await, StatusCode::FORBIDDEN);
    assert_eq!(srv.subscribe(&restaurant_room, &client).await, StatusCode::FORBIDDEN);

    assert_eq!(srv.subscribe("deliveries", &courier).await, StatusCode::OK);
    assert_eq!(srv.subscribe("deliveries", &client).await, StatusCode::FORBIDDEN);
    assert_eq!(srv.subscribe("bogus:1", &client).await, StatusCode::BAD_REQUEST);
}
