//! Wallet payment plumbing: server-side approval and completion, plus the
//! platform webhook.

use axum::{
    extract::{Path, State},
    http::HeaderMap,
    Json,
};
use serde::{Deserialize, Serialize};

use super::{ok, ApiResult};
use crate::app_state::AppState;
use crate::error::{MarketError, MarketResult};
use crate::market::{PaymentEvent, VerifiedPayment};
use crate::middleware::AuthenticatedUser;
use crate::wallet::PaymentDto;

#[derive(Debug, Deserialize)]
pub struct CompletePaymentRequest {
    pub txid: String,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PaymentStatusResponse {
    pub payment_id: String,
    pub state: &'static str,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct WebhookAck {
    pub credited: bool,
}

fn state_name(event: &PaymentEvent) -> &'static str {
    match event {
        PaymentEvent::Created(_) => "created",
        PaymentEvent::Approved(_) => "approved",
        PaymentEvent::Completed { .. } => "completed",
        PaymentEvent::Cancelled(_) => "cancelled",
        PaymentEvent::Error { .. } => "error",
    }
}

/// Fetch a payment from the wallet platform and require it to be completed.
pub(crate) async fn verified_payment(state: &AppState, payment_id: &str) -> MarketResult<VerifiedPayment> {
    let payment_id = payment_id.trim();
    if payment_id.is_empty() {
        return Err(MarketError::Validation("paymentId is required".to_string()));
    }
    let event = PaymentEvent::from(state.wallet.payment(payment_id).await?);
    event.verified(&state.market.settings().rate)
}

async fn owned_payment(state: &AppState, user: &AuthenticatedUser, payment_id: &str) -> MarketResult<PaymentDto> {
    let payment = state.wallet.payment(payment_id).await?;
    if user.user.wallet_uid.as_deref() != Some(payment.user_uid.as_str()) {
        tracing::warn!(%payment_id, user_id = %user.id, "payment belongs to another wallet");
        return Err(MarketError::forbidden("payment belongs to another wallet"));
    }
    Ok(payment)
}

pub async fn approve_payment(
    State(state): State<AppState>,
    user: AuthenticatedUser,
    Path(payment_id): Path<String>,
) -> ApiResult<PaymentStatusResponse> {
    owned_payment(&state, &user, &payment_id).await?;
    let event = PaymentEvent::from(state.wallet.approve(&payment_id).await?);
    tracing::info!(%payment_id, user_id = %user.id, "payment approved");
    ok(PaymentStatusResponse {
        payment_id,
        state: state_name(&event),
    })
}

pub async fn complete_payment(
    State(state): State<AppState>,
    user: AuthenticatedUser,
    Path(payment_id): Path<String>,
    Json(payload): Json<CompletePaymentRequest>,
) -> ApiResult<PaymentStatusResponse> {
    if payload.txid.trim().is_empty() {
        return Err(MarketError::Validation("txid is required".to_string()));
    }
    owned_payment(&state, &user, &payment_id).await?;
    let event = PaymentEvent::from(state.wallet.complete(&payment_id, payload.txid.trim()).await?);
    tracing::info!(%payment_id, user_id = %user.id, state = state_name(&event), "payment completed");
    ok(PaymentStatusResponse {
        payment_id,
        state: state_name(&event),
    })
}

fn check_webhook_secret(state: &AppState, headers: &HeaderMap) -> MarketResult<()> {
    match state.config.payment_webhook_secret.as_deref() {
        Some(secret) if !secret.is_empty() => {
            let presented = headers
                .get("X-Webhook-Secret")
                .and_then(|h| h.to_str().ok())
                .unwrap_or_default();
            if presented != secret {
                tracing::warn!("payment webhook rejected: bad secret");
                return Err(MarketError::Unauthorized);
            }
            Ok(())
        }
        _ => {
            tracing::error!("payment webhook secret not configured, rejecting request");
            Err(MarketError::Unavailable("payment webhook is not configured"))
        }
    }
}

/// Wallet platform callback. The body only names the payment: its state,
/// amount and wallet are fetched from the platform before anything is
/// credited. Completed recharges for known wallets are credited; everything
/// else is logged and acknowledged.
pub async fn payment_webhook(
    State(state): State<AppState>,
    headers: HeaderMap,
    Json(notice): Json<PaymentDto>,
) -> ApiResult<WebhookAck> {
    check_webhook_secret(&state, &headers)?;

    let payment_id = notice.identifier.trim();
    if payment_id.is_empty() {
        tracing::warn!("payment webhook without a payment identifier");
        return ok(WebhookAck { credited: false });
    }

    let fetched = match state.wallet.payment(payment_id).await {
        Ok(payment) => payment,
        Err(MarketError::Payment(reason)) => {
            tracing::warn!(%payment_id, %reason, "webhook names a payment the platform does not confirm");
            return ok(WebhookAck { credited: false });
        }
        Err(err) => return Err(err),
    };
    if fetched.user_uid != notice.user_uid || fetched.amount != notice.amount {
        tracing::warn!(%payment_id, "webhook body disagrees with the platform record, using the platform record");
    }

    let event = PaymentEvent::from(fetched);
    let is_recharge = event
        .info()
        .and_then(|info| info.purpose_hint.as_deref())
        .map_or(false, |hint| hint == "recharge");

    match &event {
        PaymentEvent::Completed { .. } if is_recharge => {
            let payment = event.verified(&state.market.settings().rate)?;
            let credited = match state.market.credit_webhook_recharge(&payment).await? {
                Some(credit) => !credit.replayed,
                None => {
                    tracing::warn!(payment_id = %payment.payment_id, "webhook payment from unknown wallet");
                    false
                }
            };
            ok(WebhookAck { credited })
        }
        PaymentEvent::Error { payment_id, reason } => {
            tracing::warn!(%payment_id, %reason, "malformed payment record from the platform");
            ok(WebhookAck { credited: false })
        }
        other => {
            tracing::info!(payment_id = %other.payment_id(), state = state_name(other), "payment webhook acknowledged");
            ok(WebhookAck { credited: false })
        }
    }
}
