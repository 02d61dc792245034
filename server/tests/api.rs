//! End-to-end flows through the HTTP router, backed by an in-memory journal
//! and a fake wallet platform.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use axum::body::Body;
use axum::http::{Request, StatusCode};
use axum::Router;
use chrono::Utc;
use serde_json::{json, Value};
use tower::ServiceExt;
use uuid::Uuid;

use pimart_server::app_state::AppState;
use pimart_server::config::AppConfig;
use pimart_server::error::{MarketError, MarketResult};
use pimart_server::market::{Changeset, MarketState};
use pimart_server::routes;
use pimart_server::services::{ChatHub, MarketService};
use pimart_server::store::Journal;
use pimart_server::wallet::{PaymentDto, PaymentStatusDto, PaymentTransactionDto, WalletGateway, WalletUser};

const ADMIN_PASSWORD: &str = "admin-pass";

#[derive(Default)]
struct FakeWallet {
    users: Mutex<HashMap<String, WalletUser>>,
    payments: Mutex<HashMap<String, PaymentDto>>,
}

impl FakeWallet {
    fn add_user(&self, access_token: &str, uid: &str) {
        self.users.lock().unwrap().insert(
            access_token.to_string(),
            WalletUser {
                uid: uid.to_string(),
                username: Some(uid.to_string()),
            },
        );
    }

    fn completed_payment(&self, id: &str, uid: &str, amount: f64, kind: &str) {
        self.payments.lock().unwrap().insert(
            id.to_string(),
            PaymentDto {
                identifier: id.to_string(),
                user_uid: uid.to_string(),
                amount,
                memo: String::new(),
                metadata: json!({ "type": kind }),
                status: PaymentStatusDto {
                    developer_approved: true,
                    transaction_verified: true,
                    developer_completed: true,
                    ..Default::default()
                },
                transaction: Some(PaymentTransactionDto {
                    txid: format!("tx-{id}"),
                    verified: true,
                }),
            },
        );
    }

    fn find(&self, id: &str) -> MarketResult<PaymentDto> {
        self.payments
            .lock()
            .unwrap()
            .get(id)
            .cloned()
            .ok_or_else(|| MarketError::Payment(format!("unknown payment {id}")))
    }
}

#[async_trait]
impl WalletGateway for FakeWallet {
    async fn me(&self, access_token: &str) -> MarketResult<WalletUser> {
        self.users
            .lock()
            .unwrap()
            .get(access_token)
            .cloned()
            .ok_or(MarketError::Unauthorized)
    }

    async fn payment(&self, payment_id: &str) -> MarketResult<PaymentDto> {
        self.find(payment_id)
    }

    async fn approve(&self, payment_id: &str) -> MarketResult<PaymentDto> {
        let mut payment = self.find(payment_id)?;
        payment.status.developer_approved = true;
        Ok(payment)
    }

    async fn complete(&self, payment_id: &str, txid: &str) -> MarketResult<PaymentDto> {
        let mut payment = self.find(payment_id)?;
        payment.status.developer_completed = true;
        payment.transaction = Some(PaymentTransactionDto {
            txid: txid.to_string(),
            verified: true,
        });
        Ok(payment)
    }
}

/// Journal that can be told to fail every commit.
#[derive(Default)]
struct SwitchJournal {
    failing: AtomicBool,
}

#[async_trait]
impl Journal for SwitchJournal {
    async fn commit(&self, _changes: &Changeset) -> MarketResult<()> {
        if self.failing.load(Ordering::SeqCst) {
            return Err(MarketError::Conflict("journal offline".to_string()));
        }
        Ok(())
    }
}

struct TestApp {
    router: Router,
    market: Arc<MarketService>,
    wallet: Arc<FakeWallet>,
    journal: Arc<SwitchJournal>,
}

impl TestApp {
    fn new() -> Self {
        let mut config = AppConfig::for_tests();
        config.admin_password_hash = Some(bcrypt::hash(ADMIN_PASSWORD, 4).unwrap());

        let journal = Arc::new(SwitchJournal::default());
        let wallet = Arc::new(FakeWallet::default());
        let market = Arc::new(MarketService::new(
            MarketState::new(Utc::now()),
            config.market_settings(),
            journal.clone(),
        ));
        let chat = Arc::new(ChatHub::new(journal.clone()));
        let state = AppState::new(market.clone(), chat, wallet.clone(), config);

        Self {
            router: routes::app(state),
            market,
            wallet,
            journal,
        }
    }

    async fn send(&self, method: &str, uri: &str, token: Option<&str>, body: Option<Value>) -> (StatusCode, Value) {
        let mut request = Request::builder().method(method).uri(uri);
        if let Some(token) = token {
            request = request.header("Authorization", format!("Bearer {token}"));
        }
        let request = match body {
            Some(body) => request
                .header("Content-Type", "application/json")
                .body(Body::from(body.to_string()))
                .unwrap(),
            None => request.body(Body::empty()).unwrap(),
        };

        let response = self.router.clone().oneshot(request).await.unwrap();
        let status = response.status();
        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX).await.unwrap();
        let value = serde_json::from_slice(&bytes).unwrap_or(Value::Null);
        (status, value)
    }

    async fn get(&self, uri: &str, token: &str) -> Value {
        let (status, body) = self.send("GET", uri, Some(token), None).await;
        assert_eq!(status, StatusCode::OK, "GET {uri}: {body}");
        body["data"].clone()
    }

    async fn post(&self, uri: &str, token: &str, body: Value) -> Value {
        let (status, body) = self.send("POST", uri, Some(token), Some(body)).await;
        assert_eq!(status, StatusCode::OK, "POST {uri}: {body}");
        body["data"].clone()
    }

    /// Sign in a wallet user; returns `(token, user id)`.
    async fn login(&self, name: &str) -> (String, Uuid) {
        let access_token = format!("{name}-access");
        self.wallet.add_user(&access_token, &format!("{name}-uid"));
        let (status, body) = self
            .send("POST", "/auth/pi/login", None, Some(json!({ "accessToken": access_token })))
            .await;
        assert_eq!(status, StatusCode::OK, "{body}");
        let token = body["data"]["token"].as_str().unwrap().to_string();
        let id = Uuid::parse_str(body["data"]["user"]["id"].as_str().unwrap()).unwrap();
        (token, id)
    }

    async fn admin(&self) -> String {
        let (status, body) = self
            .send(
                "POST",
                "/auth/admin/login",
                None,
                Some(json!({ "username": "admin", "password": ADMIN_PASSWORD })),
            )
            .await;
        assert_eq!(status, StatusCode::OK, "{body}");
        body["data"]["token"].as_str().unwrap().to_string()
    }

    async fn recharge(&self, name: &str, token: &str, payment_id: &str, amount_pi: f64) -> Value {
        self.wallet
            .completed_payment(payment_id, &format!("{name}-uid"), amount_pi, "recharge");
        self.post("/users/recharge", token, json!({ "paymentId": payment_id })).await
    }

    /// Seller with a full deposit and one approved listing.
    async fn seller_with_listing(&self, admin: &str, price: i64, stock: i32) -> (String, Uuid, Uuid) {
        let (token, id) = self.login("seller").await;
        self.wallet.completed_payment("dep-seller", "seller-uid", 1000.0, "deposit");
        self.post("/users/deposit/pay", &token, json!({ "paymentId": "dep-seller" }))
            .await;

        let created = self
            .post(
                "/products",
                &token,
                json!({
                    "title": "Hand-made mug",
                    "pricePoints": price,
                    "stock": stock,
                    "category": "home",
                    "deliveryMethod": "post",
                }),
            )
            .await;
        let product_id = Uuid::parse_str(created["item"]["id"].as_str().unwrap()).unwrap();
        assert_eq!(created["item"]["moderation"], "pending");
        assert_eq!(created["item"]["isActive"], false);

        let approved = self
            .post(&format!("/admin/products/{product_id}/approve"), admin, json!({}))
            .await;
        assert_eq!(approved["isActive"], true);
        (token, id, product_id)
    }

    async fn balance(&self, user_id: Uuid) -> i64 {
        self.market
            .read(|s| s.user(user_id).map(|u| u.balance_points).unwrap_or_default())
            .await
    }
}

#[tokio::test]
async fn health_is_public() {
    let app = TestApp::new();
    let (status, _) = app.send("GET", "/health", None, None).await;
    assert_eq!(status, StatusCode::OK);
}

#[tokio::test]
async fn unknown_wallet_token_is_rejected() {
    let app = TestApp::new();
    let (status, body) = app
        .send("POST", "/auth/pi/login", None, Some(json!({ "accessToken": "nope" })))
        .await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
    assert_eq!(body["code"], "unauthorized");
}

#[tokio::test]
async fn admin_routes_require_an_admin_token() {
    let app = TestApp::new();
    let (user, _) = app.login("alice").await;

    let (status, _) = app.send("GET", "/admin/dashboard", None, None).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);

    let (status, body) = app.send("GET", "/admin/dashboard", Some(&user), None).await;
    assert_eq!(status, StatusCode::FORBIDDEN);
    assert_eq!(body["code"], "forbidden");

    let (status, _) = app
        .send(
            "POST",
            "/auth/admin/login",
            None,
            Some(json!({ "username": "admin", "password": "wrong" })),
        )
        .await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn purchase_without_balance_is_rejected() {
    let app = TestApp::new();
    let admin = app.admin().await;
    let (_, _, product_id) = app.seller_with_listing(&admin, 100, 1).await;
    let (buyer, _) = app.login("buyer").await;

    let (status, body) = app
        .send("POST", "/orders", Some(&buyer), Some(json!({ "productId": product_id })))
        .await;
    assert_eq!(status, StatusCode::PAYMENT_REQUIRED);
    assert_eq!(body["code"], "insufficient_balance");

    let orders = app.get("/orders/my", &buyer).await;
    assert!(orders["list"].as_array().unwrap().is_empty());
    let product = app.get(&format!("/products/{product_id}"), &buyer).await;
    assert_eq!(product["stock"], 1);
}

#[tokio::test]
async fn confirmed_order_pays_seller_and_platform() {
    let app = TestApp::new();
    let admin = app.admin().await;
    let (seller, seller_id, product_id) = app.seller_with_listing(&admin, 100, 2).await;
    let (buyer, buyer_id) = app.login("buyer").await;
    app.recharge("buyer", &buyer, "rc-1", 100.0).await;

    let placed = app.post("/orders", &buyer, json!({ "productId": product_id })).await;
    let order_id = placed["order"]["id"].as_str().unwrap().to_string();
    assert_eq!(placed["order"]["status"], "paid");
    assert_eq!(placed["order"]["escrowPoints"], 100);
    assert_eq!(placed["order"]["feePoints"], 5);

    // only the seller ships
    let (status, _) = app
        .send("POST", &format!("/orders/{order_id}/ship"), Some(&buyer), None)
        .await;
    assert_eq!(status, StatusCode::FORBIDDEN);
    let order = app.get(&format!("/orders/{order_id}"), &seller).await;
    assert_eq!(order["status"], "paid");

    app.post(&format!("/orders/{order_id}/ship"), &seller, json!({})).await;
    let done = app.post(&format!("/orders/{order_id}/confirm"), &buyer, json!({})).await;
    assert_eq!(done["status"], "completed");
    assert_eq!(done["escrowPoints"], 0);

    assert_eq!(app.balance(seller_id).await, 95);
    assert_eq!(app.balance(Uuid::nil()).await, 5);
    assert_eq!(app.balance(buyer_id).await, 0);

    // confirming twice pays nothing more
    let (status, body) = app
        .send("POST", &format!("/orders/{order_id}/confirm"), Some(&buyer), None)
        .await;
    assert_eq!(status, StatusCode::CONFLICT);
    assert_eq!(body["code"], "invalid_state");
    assert_eq!(app.balance(seller_id).await, 95);

    let sold = app.get("/orders/sold", &seller).await;
    assert_eq!(sold["list"].as_array().unwrap().len(), 1);
}

#[tokio::test]
async fn admin_refund_of_shipped_order_restores_buyer() {
    let app = TestApp::new();
    let admin = app.admin().await;
    let (seller, seller_id, product_id) = app.seller_with_listing(&admin, 100, 1).await;
    let (buyer, buyer_id) = app.login("buyer").await;
    app.recharge("buyer", &buyer, "rc-1", 100.0).await;

    let placed = app.post("/orders", &buyer, json!({ "productId": product_id })).await;
    let order_id = placed["order"]["id"].as_str().unwrap().to_string();
    assert_eq!(app.balance(buyer_id).await, 0);
    app.post(&format!("/orders/{order_id}/ship"), &seller, json!({})).await;

    let refunded = app
        .post(&format!("/admin/orders/{order_id}/refund"), &admin, json!({}))
        .await;
    assert_eq!(refunded["status"], "refunded");
    assert_eq!(refunded["escrowPoints"], 0);

    let me = app.get("/users/me", &buyer).await;
    assert_eq!(me["availablePoints"], 100);
    assert_eq!(me["availablePi"], 100);
    assert_eq!(app.balance(seller_id).await, 0);
    assert_eq!(app.balance(Uuid::nil()).await, 0);
}

#[tokio::test]
async fn partial_deposit_cannot_list_products() {
    let app = TestApp::new();
    let (seller, _) = app.login("seller").await;
    app.wallet.completed_payment("dep-half", "seller-uid", 500.0, "deposit");
    let deposit = app
        .post("/users/deposit/pay", &seller, json!({ "paymentId": "dep-half" }))
        .await;
    assert_eq!(deposit["amountPoints"], 500);

    let (status, body) = app
        .send(
            "POST",
            "/products",
            Some(&seller),
            Some(json!({
                "title": "Bike",
                "pricePoints": 300,
                "stock": 1,
                "category": "sport",
                "deliveryMethod": "pickup",
            })),
        )
        .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["code"], "deposit_required");

    let me = app.get("/users/me", &seller).await;
    assert_eq!(me["depositPoints"], 500);
    assert_eq!(me["role"], "buyer");
    assert_eq!(me["depositShortfallPi"], 500);
}

#[tokio::test]
async fn complaint_with_penalty_refunds_and_debits_deposit() {
    let app = TestApp::new();
    let admin = app.admin().await;
    let (_, seller_id, product_id) = app.seller_with_listing(&admin, 100, 1).await;
    let (buyer, buyer_id) = app.login("buyer").await;
    app.recharge("buyer", &buyer, "rc-1", 100.0).await;

    let placed = app.post("/orders", &buyer, json!({ "productId": product_id })).await;
    let order_id = placed["order"]["id"].as_str().unwrap().to_string();

    let complaint = app
        .post(
            &format!("/orders/{order_id}/complaints"),
            &buyer,
            json!({ "reason": "never arrived" }),
        )
        .await;
    let complaint_id = complaint["id"].as_str().unwrap().to_string();

    let (status, _) = app
        .send(
            "POST",
            &format!("/orders/{order_id}/complaints"),
            Some(&buyer),
            Some(json!({ "reason": "again" })),
        )
        .await;
    assert_eq!(status, StatusCode::CONFLICT);

    let decided = app
        .post(
            &format!("/admin/complaints/{complaint_id}/decide"),
            &admin,
            json!({ "decision": "refund_and_penalty", "penaltyPoints": 1000 }),
        )
        .await;
    assert_eq!(decided["status"], "resolved");
    assert_eq!(decided["penaltyPoints"], 1000);

    let order = app.get(&format!("/orders/{order_id}"), &buyer).await;
    assert_eq!(order["status"], "refunded");
    assert_eq!(app.balance(buyer_id).await, 100);

    let seller = app.market.read(|s| s.user(seller_id).cloned()).await.unwrap();
    assert_eq!(seller.deposit_points, 0);
    assert_eq!(seller.violation_count, 1);
    assert_eq!(app.balance(Uuid::nil()).await, 1000);

    let (status, body) = app
        .send(
            "POST",
            &format!("/admin/complaints/{complaint_id}/decide"),
            Some(&admin),
            Some(json!({ "decision": "reject" })),
        )
        .await;
    assert_eq!(status, StatusCode::CONFLICT);
    assert_eq!(body["code"], "already_decided");
}

#[tokio::test]
async fn recharge_replay_credits_once() {
    let app = TestApp::new();
    let (buyer, buyer_id) = app.login("buyer").await;

    let first = app.recharge("buyer", &buyer, "rc-1", 12.5).await;
    assert_eq!(first["creditedPoints"], 13);
    assert_eq!(first["replayed"], false);

    let again = app.post("/users/recharge", &buyer, json!({ "paymentId": "rc-1" })).await;
    assert_eq!(again["replayed"], true);
    assert_eq!(app.balance(buyer_id).await, 13);

    let ledger = app.get("/users/transactions", &buyer).await;
    assert_eq!(ledger["list"].as_array().unwrap().len(), 1);
}

#[tokio::test]
async fn payment_of_another_wallet_is_forbidden() {
    let app = TestApp::new();
    let (_, _) = app.login("alice").await;
    let (mallory, mallory_id) = app.login("mallory").await;
    app.wallet.completed_payment("rc-alice", "alice-uid", 50.0, "recharge");

    let (status, _) = app
        .send(
            "POST",
            "/users/recharge",
            Some(&mallory),
            Some(json!({ "paymentId": "rc-alice" })),
        )
        .await;
    assert_eq!(status, StatusCode::FORBIDDEN);
    assert_eq!(app.balance(mallory_id).await, 0);

    let (status, _) = app
        .send("POST", "/payments/rc-alice/approve", Some(&mallory), None)
        .await;
    assert_eq!(status, StatusCode::FORBIDDEN);
}

#[tokio::test]
async fn order_paid_by_wallet_payment_replays_the_same_order() {
    let app = TestApp::new();
    let admin = app.admin().await;
    let (_, _, product_id) = app.seller_with_listing(&admin, 100, 3).await;
    let (buyer, buyer_id) = app.login("buyer").await;
    app.wallet.completed_payment("pay-order", "buyer-uid", 100.0, "order");

    let body = json!({ "productId": product_id, "paymentId": "pay-order" });
    let first = app.post("/orders", &buyer, body.clone()).await;
    let second = app.post("/orders", &buyer, body).await;
    assert_eq!(first["order"]["id"], second["order"]["id"]);
    assert_eq!(first["order"]["paymentId"], "pay-order");

    let orders = app.get("/orders/my", &buyer).await;
    assert_eq!(orders["list"].as_array().unwrap().len(), 1);
    assert_eq!(app.balance(buyer_id).await, 0);
    let product = app.get(&format!("/products/{product_id}"), &buyer).await;
    assert_eq!(product["stock"], 2);
}

#[tokio::test]
async fn journal_failure_leaves_nothing_behind() {
    let app = TestApp::new();
    let admin = app.admin().await;
    let (_, _, product_id) = app.seller_with_listing(&admin, 100, 1).await;
    let (buyer, buyer_id) = app.login("buyer").await;
    app.recharge("buyer", &buyer, "rc-1", 100.0).await;

    app.journal.failing.store(true, Ordering::SeqCst);
    let (status, body) = app
        .send("POST", "/orders", Some(&buyer), Some(json!({ "productId": product_id })))
        .await;
    assert_eq!(status, StatusCode::CONFLICT);
    assert_eq!(body["code"], "conflict");
    app.journal.failing.store(false, Ordering::SeqCst);

    assert!(app.get("/orders/my", &buyer).await["list"].as_array().unwrap().is_empty());
    let me = app.get("/users/me", &buyer).await;
    assert_eq!(me["availablePoints"], 100);
    assert_eq!(me["frozenPoints"], 0);
    let product = app.get(&format!("/products/{product_id}"), &buyer).await;
    assert_eq!(product["stock"], 1);
    assert_eq!(product["isActive"], true);

    // the same request succeeds once the journal is back
    app.post("/orders", &buyer, json!({ "productId": product_id })).await;
    assert_eq!(app.balance(buyer_id).await, 0);
}

#[tokio::test]
async fn webhook_requires_secret_and_credits_recharges() {
    let app = TestApp::new();
    let (_, buyer_id) = app.login("buyer").await;
    app.wallet.completed_payment("hook-1", "buyer-uid", 20.0, "recharge");
    let payload = serde_json::to_value(app.wallet.find("hook-1").unwrap()).unwrap();

    let (status, _) = app
        .send("POST", "/payments/webhook", None, Some(payload.clone()))
        .await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);

    let request = |body: Value| {
        Request::builder()
            .method("POST")
            .uri("/payments/webhook")
            .header("Content-Type", "application/json")
            .header("X-Webhook-Secret", "hook-secret")
            .body(Body::from(body.to_string()))
            .unwrap()
    };
    for expected in [true, false] {
        let response = app.router.clone().oneshot(request(payload.clone())).await.unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX).await.unwrap();
        let body: Value = serde_json::from_slice(&bytes).unwrap();
        assert_eq!(body["data"]["credited"], expected);
    }
    assert_eq!(app.balance(buyer_id).await, 20);
}

#[tokio::test]
async fn webhook_credits_only_what_the_platform_reports() {
    let app = TestApp::new();
    let (_, alice_id) = app.login("alice").await;
    let webhook = |body: Value| {
        Request::builder()
            .method("POST")
            .uri("/payments/webhook")
            .header("Content-Type", "application/json")
            .header("X-Webhook-Secret", "hook-secret")
            .body(Body::from(body.to_string()))
            .unwrap()
    };
    let claim = |id: &str, amount: f64| {
        json!({
            "identifier": id,
            "user_uid": "alice-uid",
            "amount": amount,
            "metadata": { "type": "recharge" },
            "status": {
                "developer_approved": true,
                "transaction_verified": true,
                "developer_completed": true,
            },
            "transaction": { "txid": "tx-forged", "verified": true },
        })
    };

    let response = app.router.clone().oneshot(webhook(claim("forged-1", 1_000_000.0))).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX).await.unwrap();
    let body: Value = serde_json::from_slice(&bytes).unwrap();
    assert_eq!(body["data"]["credited"], false);
    assert_eq!(app.balance(alice_id).await, 0);

    app.wallet.completed_payment("real-1", "alice-uid", 15.0, "recharge");
    let response = app.router.clone().oneshot(webhook(claim("real-1", 1_000_000.0))).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(app.balance(alice_id).await, 15);
}

#[tokio::test]
async fn withdrawal_freezes_and_pays_out() {
    let app = TestApp::new();
    let admin = app.admin().await;
    let (user, user_id) = app.login("alice").await;
    app.recharge("alice", &user, "rc-1", 80.0).await;

    let withdrawal = app
        .post(
            "/withdrawals",
            &user,
            json!({ "amountPoints": 50, "address": "GALICEWALLET" }),
        )
        .await;
    let id = withdrawal["id"].as_str().unwrap().to_string();
    let me = app.get("/users/me", &user).await;
    assert_eq!(me["availablePoints"], 30);
    assert_eq!(me["frozenPoints"], 50);

    let (status, _) = app
        .send(
            "POST",
            "/withdrawals",
            Some(&user),
            Some(json!({ "amountPoints": 31, "address": "GALICEWALLET" })),
        )
        .await;
    assert_eq!(status, StatusCode::PAYMENT_REQUIRED);

    let paid = app
        .post(&format!("/admin/withdrawals/{id}/review"), &admin, json!({ "action": "paid" }))
        .await;
    assert_eq!(paid["status"], "paid");
    assert_eq!(app.balance(user_id).await, 30);

    let pending = app.get("/admin/withdrawals?status=pending", &admin).await;
    assert!(pending["list"].as_array().unwrap().is_empty());
}

#[tokio::test]
async fn order_chat_is_limited_to_participants() {
    let app = TestApp::new();
    let admin = app.admin().await;
    let (seller, _, product_id) = app.seller_with_listing(&admin, 100, 1).await;
    let (buyer, _) = app.login("buyer").await;
    let (stranger, _) = app.login("stranger").await;
    app.recharge("buyer", &buyer, "rc-1", 100.0).await;
    let placed = app.post("/orders", &buyer, json!({ "productId": product_id })).await;
    let room = format!("order:{}", placed["order"]["id"].as_str().unwrap());

    app.post(&format!("/chat/{room}"), &buyer, json!({ "content": "when will it ship?" }))
        .await;

    let (status, _) = app.send("GET", &format!("/chat/{room}"), Some(&stranger), None).await;
    assert_eq!(status, StatusCode::FORBIDDEN);

    let conversations = app.get("/chat/user/conversations", &seller).await;
    assert_eq!(conversations["list"][0]["unreadCount"], 1);

    let read = app.post(&format!("/chat/{room}/read"), &seller, json!({})).await;
    assert_eq!(read["updated"], 1);
    let history = app.get(&format!("/chat/{room}"), &seller).await;
    assert_eq!(history["list"][0]["content"], "when will it ship?");
    assert_eq!(history["list"][0]["read"], true);
}
