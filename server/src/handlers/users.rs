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
use crate::models::{
    Deposit, DepositPayRequest, LedgerEntry, ListResponse, MeResponse, PublicProfile, RechargeRequest,
    RechargeResponse, Withdrawal, WithdrawalRequest,
};

pub async fn me(State(state): State<AppState>, user: AuthenticatedUser) -> ApiResult<MeResponse> {
    ok(state.market.me(user.id).await?)
}

pub async fn transactions(
    State(state): State<AppState>,
    user: AuthenticatedUser,
) -> ApiResult<ListResponse<LedgerEntry>> {
    list(state.market.transactions(user.id).await)
}

pub async fn profile(
    State(state): State<AppState>,
    _user: AuthenticatedUser,
    Path(id): Path<Uuid>,
) -> ApiResult<PublicProfile> {
    ok(state.market.profile(id).await?)
}

/// Credit a completed wallet payment to the caller's balance.
pub async fn recharge(
    State(state): State<AppState>,
    user: AuthenticatedUser,
    Json(payload): Json<RechargeRequest>,
) -> ApiResult<RechargeResponse> {
    let payment = verified_payment(&state, &payload.payment_id).await?;

    if let Some(claimed) = payload.amount_pi {
        let rate = &state.market.settings().rate;
        if rate.points_from_pi(claimed).ok() != Some(payment.amount_points) {
            tracing::warn!(
                payment_id = %payment.payment_id,
                claimed_pi = claimed,
                credited_points = payment.amount_points,
                "recharge amount differs from the verified payment"
            );
        }
    }

    ok(state.market.recharge(user.id, &payment).await?)
}

pub async fn pay_deposit(
    State(state): State<AppState>,
    user: AuthenticatedUser,
    payload: Option<Json<DepositPayRequest>>,
) -> ApiResult<Deposit> {
    let payment_id = payload.and_then(|Json(req)| req.payment_id);
    let deposit = match payment_id {
        Some(id) => {
            let payment = verified_payment(&state, &id).await?;
            state.market.pay_deposit(user.id, Some(&payment)).await?
        }
        None => state.market.pay_deposit(user.id, None).await?,
    };
    ok(deposit)
}

pub async fn request_deposit_refund(State(state): State<AppState>, user: AuthenticatedUser) -> ApiResult<Deposit> {
    ok(state.market.request_deposit_refund(user.id).await?)
}

pub async fn create_withdrawal(
    State(state): State<AppState>,
    user: AuthenticatedUser,
    Json(payload): Json<WithdrawalRequest>,
) -> ApiResult<Withdrawal> {
    payload.validate()?;
    ok(state.market.request_withdrawal(user.id, payload).await?)
}

pub async fn my_withdrawals(
    State(state): State<AppState>,
    user: AuthenticatedUser,
) -> ApiResult<ListResponse<Withdrawal>> {
    list(state.market.withdrawals_of(user.id).await)
}
