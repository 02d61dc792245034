//! Route definitions for the marketplace API

use axum::{
    http::{header, HeaderValue, Method},
    routing::{get, post},
    Router,
};
use tower_http::{cors::CorsLayer, trace::TraceLayer};

use crate::app_state::AppState;
use crate::handlers::{admin, auth, chat, orders, payments, products, users};

pub fn auth_routes() -> Router<AppState> {
    Router::new()
        .route("/auth/pi/login", post(auth::pi_login))
        .route("/auth/admin/login", post(auth::admin_login))
}

pub fn user_routes() -> Router<AppState> {
    Router::new()
        .route("/users/me", get(users::me))
        .route("/users/transactions", get(users::transactions))
        .route("/users/recharge", post(users::recharge))
        .route("/users/deposit/pay", post(users::pay_deposit))
        .route("/users/deposit/refund", post(users::request_deposit_refund))
        .route("/users/:id", get(users::profile))
        .route("/withdrawals", post(users::create_withdrawal))
        .route("/withdrawals/my", get(users::my_withdrawals))
}

pub fn product_routes() -> Router<AppState> {
    Router::new()
        .route("/products", get(products::list_products).post(products::create_product))
        .route("/products/my", get(products::my_products))
        .route("/products/:id", get(products::get_product).put(products::update_product))
        .route("/products/:id/activate", post(products::activate_product))
        .route("/products/:id/deactivate", post(products::deactivate_product))
        .route("/products/:id/favorite", post(products::toggle_favorite))
        .route("/products/:id/price-modification", post(products::request_price_change))
}

pub fn order_routes() -> Router<AppState> {
    Router::new()
        .route("/orders", post(orders::create_order))
        .route("/orders/my", get(orders::my_orders))
        .route("/orders/sold", get(orders::sold_orders))
        .route("/orders/:id", get(orders::get_order))
        .route("/orders/:id/ship", post(orders::ship_order))
        .route("/orders/:id/confirm", post(orders::confirm_order))
        .route("/orders/:id/cancel", post(orders::cancel_order))
        .route("/orders/:id/complaints", post(orders::file_complaint))
}

pub fn chat_routes() -> Router<AppState> {
    Router::new()
        .route("/chat/user/conversations", get(chat::conversations))
        .route("/chat/:room_id", get(chat::history).post(chat::post_message))
        .route("/chat/:room_id/read", post(chat::mark_read))
        .route("/ws", get(chat::ws_handler))
}

pub fn payment_routes() -> Router<AppState> {
    Router::new()
        .route("/payments/webhook", post(payments::payment_webhook))
        .route("/payments/:id/approve", post(payments::approve_payment))
        .route("/payments/:id/complete", post(payments::complete_payment))
}

pub fn admin_routes() -> Router<AppState> {
    Router::new()
        .route("/admin/dashboard", get(admin::dashboard))
        .route("/admin/products/pending", get(admin::pending_products))
        .route("/admin/products/:id/approve", post(admin::approve_product))
        .route("/admin/products/:id/reject", post(admin::reject_product))
        .route(
            "/admin/price-modifications/pending",
            get(admin::pending_price_modifications),
        )
        .route(
            "/admin/price-modifications/:id/review",
            post(admin::review_price_modification),
        )
        .route("/admin/withdrawals", get(admin::withdrawals))
        .route("/admin/withdrawals/:id/review", post(admin::review_withdrawal))
        .route("/admin/deposits", get(admin::deposits))
        .route("/admin/deposits/:id/review", post(admin::review_deposit))
        .route("/admin/complaints", get(admin::complaints))
        .route("/admin/complaints/:id/decide", post(admin::decide_complaint))
        .route("/admin/orders/:id/settle", post(admin::settle_order))
        .route("/admin/orders/:id/refund", post(admin::refund_order))
        .route("/admin/users/:id/deactivate", post(admin::deactivate_user))
}

async fn root() -> &'static str {
    "Pi Mart API Server"
}

async fn health_check() -> &'static str {
    "OK"
}

/// Full application router with shared layers applied.
pub fn app(state: AppState) -> Router {
    let cors = build_cors_layer(&state.config.cors_allowed_origins);
    Router::new()
        .route("/", get(root))
        .route("/health", get(health_check))
        .merge(auth_routes())
        .merge(user_routes())
        .merge(product_routes())
        .merge(order_routes())
        .merge(chat_routes())
        .merge(payment_routes())
        .merge(admin_routes())
        .layer(TraceLayer::new_for_http())
        .layer(cors)
        .with_state(state)
}

fn build_cors_layer(origins: &[String]) -> CorsLayer {
    let allowed_origins = origins
        .iter()
        .filter_map(|origin| origin.parse::<HeaderValue>().ok())
        .collect::<Vec<_>>();

    CorsLayer::new()
        .allow_origin(allowed_origins)
        .allow_methods([Method::GET, Method::POST, Method::PUT, Method::OPTIONS])
        .allow_headers([header::AUTHORIZATION, header::CONTENT_TYPE, header::ACCEPT])
        .allow_credentials(false)
}
