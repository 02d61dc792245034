//! Admin console endpoints. Every handler requires an admin token.

use axum::{
    extract::{Path, Query, State},
    Json,
};
use chrono::Utc;
use uuid::Uuid;

use super::{list, ok, ApiResult};
use crate::app_state::AppState;
use crate::error::MarketError;
use crate::middleware::AdminUser;
use crate::models::{
    Complaint, ComplaintDecisionRequest, DashboardStats, Deposit, ListResponse, ListWithdrawalsQuery, Order,
    PriceModification, Product, RejectRequest, ReviewRequest, User, Withdrawal, WithdrawalReviewRequest,
};

pub async fn dashboard(State(state): State<AppState>, _admin: AdminUser) -> ApiResult<DashboardStats> {
    ok(state.market.dashboard(Utc::now()).await)
}

pub async fn pending_products(
    State(state): State<AppState>,
    _admin: AdminUser,
) -> ApiResult<ListResponse<Product>> {
    list(state.market.pending_products().await)
}

pub async fn approve_product(
    State(state): State<AppState>,
    admin: AdminUser,
    Path(id): Path<Uuid>,
) -> ApiResult<Product> {
    let product = state.market.approve_product(id).await?;
    tracing::info!(admin = %admin.name, product_id = %id, "product approved");
    ok(product)
}

pub async fn reject_product(
    State(state): State<AppState>,
    admin: AdminUser,
    Path(id): Path<Uuid>,
    payload: Option<Json<RejectRequest>>,
) -> ApiResult<Product> {
    let note = payload.and_then(|Json(req)| req.note);
    let product = state.market.reject_product(id, note).await?;
    tracing::info!(admin = %admin.name, product_id = %id, "product rejected");
    ok(product)
}

pub async fn pending_price_modifications(
    State(state): State<AppState>,
    _admin: AdminUser,
) -> ApiResult<ListResponse<PriceModification>> {
    list(state.market.pending_price_modifications().await)
}

pub async fn review_price_modification(
    State(state): State<AppState>,
    _admin: AdminUser,
    Path(id): Path<Uuid>,
    Json(payload): Json<ReviewRequest>,
) -> ApiResult<PriceModification> {
    ok(state.market.review_price_change(id, payload.approved, payload.note).await?)
}

pub async fn withdrawals(
    State(state): State<AppState>,
    _admin: AdminUser,
    Query(query): Query<ListWithdrawalsQuery>,
) -> ApiResult<ListResponse<Withdrawal>> {
    list(state.market.withdrawals(query.status).await)
}

pub async fn review_withdrawal(
    State(state): State<AppState>,
    _admin: AdminUser,
    Path(id): Path<Uuid>,
    Json(payload): Json<WithdrawalReviewRequest>,
) -> ApiResult<Withdrawal> {
    ok(state.market.review_withdrawal(id, payload.action).await?)
}

pub async fn deposits(State(state): State<AppState>, _admin: AdminUser) -> ApiResult<ListResponse<Deposit>> {
    list(state.market.deposits().await)
}

pub async fn review_deposit(
    State(state): State<AppState>,
    _admin: AdminUser,
    Path(id): Path<Uuid>,
    Json(payload): Json<ReviewRequest>,
) -> ApiResult<Deposit> {
    ok(state.market.review_deposit(id, payload.approved, payload.note).await?)
}

pub async fn complaints(State(state): State<AppState>, _admin: AdminUser) -> ApiResult<ListResponse<Complaint>> {
    list(state.market.complaints().await)
}

pub async fn decide_complaint(
    State(state): State<AppState>,
    _admin: AdminUser,
    Path(id): Path<Uuid>,
    Json(payload): Json<ComplaintDecisionRequest>,
) -> ApiResult<Complaint> {
    if payload.penalty_points < 0 {
        return Err(MarketError::Validation("penaltyPoints cannot be negative".to_string()));
    }
    ok(state
        .market
        .decide_complaint(id, payload.decision, payload.penalty_points)
        .await?)
}

pub async fn settle_order(State(state): State<AppState>, _admin: AdminUser, Path(id): Path<Uuid>) -> ApiResult<Order> {
    ok(state.market.settle(id).await?)
}

pub async fn refund_order(State(state): State<AppState>, _admin: AdminUser, Path(id): Path<Uuid>) -> ApiResult<Order> {
    ok(state.market.refund(id).await?)
}

pub async fn deactivate_user(
    State(state): State<AppState>,
    admin: AdminUser,
    Path(id): Path<Uuid>,
) -> ApiResult<User> {
    let user = state.market.deactivate_user(id).await?;
    tracing::info!(admin = %admin.name, user_id = %id, "user deactivated by admin");
    ok(user)
}
