use axum::{
    extract::{Path, State},
    Json,
};
use uuid::Uuid;
use validator::Validate;

use super::payments::verified_payment;
use super::{list, ok, ApiResult};
use crate::app_state::AppState;
use crate::middleware::AuthenticatedUser;
use crate::models::{Complaint, ComplaintRequest, CreateOrderRequest, CreateOrderResponse, ListResponse, Order};

/// Place an order. With a `paymentId` the wallet payment funds the purchase
/// and doubles as the idempotency key.
pub async fn create_order(
    State(state): State<AppState>,
    user: AuthenticatedUser,
    Json(payload): Json<CreateOrderRequest>,
) -> ApiResult<CreateOrderResponse> {
    payload.validate()?;
    let payment = match payload.payment_id.as_deref() {
        Some(id) => Some(verified_payment(&state, id).await?),
        None => None,
    };
    let placement = state
        .market
        .place_order(user.id, payload.product_id, payment.as_ref())
        .await?;
    ok(CreateOrderResponse { order: placement.order })
}

pub async fn my_orders(State(state): State<AppState>, user: AuthenticatedUser) -> ApiResult<ListResponse<Order>> {
    list(state.market.orders_as_buyer(user.id).await)
}

pub async fn sold_orders(State(state): State<AppState>, user: AuthenticatedUser) -> ApiResult<ListResponse<Order>> {
    list(state.market.orders_as_seller(user.id).await)
}

pub async fn get_order(
    State(state): State<AppState>,
    user: AuthenticatedUser,
    Path(id): Path<Uuid>,
) -> ApiResult<Order> {
    ok(state.market.order_for(user.id, id).await?)
}

pub async fn ship_order(
    State(state): State<AppState>,
    user: AuthenticatedUser,
    Path(id): Path<Uuid>,
) -> ApiResult<Order> {
    ok(state.market.ship(id, user.id).await?)
}

pub async fn confirm_order(
    State(state): State<AppState>,
    user: AuthenticatedUser,
    Path(id): Path<Uuid>,
) -> ApiResult<Order> {
    ok(state.market.confirm(id, user.id).await?)
}

pub async fn cancel_order(
    State(state): State<AppState>,
    user: AuthenticatedUser,
    Path(id): Path<Uuid>,
) -> ApiResult<Order> {
    ok(state.market.cancel(id, user.id).await?)
}

pub async fn file_complaint(
    State(state): State<AppState>,
    user: AuthenticatedUser,
    Path(id): Path<Uuid>,
    Json(payload): Json<ComplaintRequest>,
) -> ApiResult<Complaint> {
    payload.validate()?;
    ok(state.market.file_complaint(user.id, id, payload.reason).await?)
}
