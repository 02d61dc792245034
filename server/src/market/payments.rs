//! Wallet payments entering the ledger.
//!
//! Raw payment payloads are turned into a [`PaymentEvent`] at the boundary.
//! Only a completed payment, verified against the caller's wallet, becomes a
//! [`VerifiedPayment`] that may be credited, and each payment id is credited
//! at most once.

use uuid::Uuid;

use super::ledger::{self, EntryRef};
use super::{PointsRate, Txn};
use crate::error::{MarketError, MarketResult};
use crate::models::{EntryKind, PaymentPurpose, PaymentRecord};
use crate::wallet::PaymentDto;

/// Fields common to every well-formed payment
#[derive(Debug, Clone, PartialEq)]
pub struct PaymentInfo {
    pub payment_id: String,
    pub wallet_uid: String,
    pub amount_pi: f64,
    /// `metadata.type` set by the client when it created the payment
    pub purpose_hint: Option<String>,
}

/// Validated lifecycle state of a wallet payment
#[derive(Debug, Clone, PartialEq)]
pub enum PaymentEvent {
    Created(PaymentInfo),
    Approved(PaymentInfo),
    Completed { info: PaymentInfo, txid: String },
    Cancelled(PaymentInfo),
    Error { payment_id: String, reason: String },
}

impl From<PaymentDto> for PaymentEvent {
    fn from(dto: PaymentDto) -> Self {
        let payment_id = dto.identifier.trim().to_string();
        let fail = |reason: &str| PaymentEvent::Error {
            payment_id: payment_id.clone(),
            reason: reason.to_string(),
        };

        if payment_id.is_empty() {
            return fail("payment identifier is missing");
        }
        if dto.user_uid.trim().is_empty() {
            return fail("payment has no user");
        }
        if !dto.amount.is_finite() || dto.amount <= 0.0 {
            return fail("payment amount must be a positive number");
        }

        let info = PaymentInfo {
            payment_id: payment_id.clone(),
            wallet_uid: dto.user_uid,
            amount_pi: dto.amount,
            purpose_hint: dto
                .metadata
                .get("type")
                .and_then(|v| v.as_str())
                .map(str::to_string),
        };

        let status = dto.status;
        if status.cancelled || status.user_cancelled {
            return PaymentEvent::Cancelled(info);
        }
        if status.developer_completed {
            return match dto.transaction {
                Some(tx) if !tx.txid.is_empty() => PaymentEvent::Completed { info, txid: tx.txid },
                _ => fail("completed payment has no transaction"),
            };
        }
        if status.developer_approved {
            return PaymentEvent::Approved(info);
        }
        PaymentEvent::Created(info)
    }
}

impl PaymentEvent {
    pub fn payment_id(&self) -> &str {
        match self {
            Self::Created(info) | Self::Approved(info) | Self::Cancelled(info) => &info.payment_id,
            Self::Completed { info, .. } => &info.payment_id,
            Self::Error { payment_id, .. } => payment_id,
        }
    }

    pub fn info(&self) -> Option<&PaymentInfo> {
        match self {
            Self::Created(info) | Self::Approved(info) | Self::Cancelled(info) => Some(info),
            Self::Completed { info, .. } => Some(info),
            Self::Error { .. } => None,
        }
    }

    /// Creditable form of a completed payment.
    pub fn verified(&self, rate: &PointsRate) -> MarketResult<VerifiedPayment> {
        match self {
            Self::Completed { info, .. } => Ok(VerifiedPayment {
                payment_id: info.payment_id.clone(),
                wallet_uid: info.wallet_uid.clone(),
                amount_points: rate.points_from_pi(info.amount_pi)?,
            }),
            Self::Error { reason, .. } => Err(MarketError::Payment(reason.clone())),
            Self::Cancelled(info) => Err(MarketError::Payment(format!(
                "payment {} was cancelled",
                info.payment_id
            ))),
            Self::Created(info) | Self::Approved(info) => Err(MarketError::Payment(format!(
                "payment {} is not completed",
                info.payment_id
            ))),
        }
    }
}

/// Completed payment converted to points
#[derive(Debug, Clone, PartialEq)]
pub struct VerifiedPayment {
    pub payment_id: String,
    pub wallet_uid: String,
    pub amount_points: i64,
}

#[derive(Debug, Clone)]
pub struct Credit {
    pub record: PaymentRecord,
    /// The payment had been credited before; nothing changed
    pub replayed: bool,
}

/// Credit a verified payment to `user_id` once.
pub fn credit_payment(
    txn: &mut Txn<'_>,
    user_id: Uuid,
    payment: &VerifiedPayment,
    purpose: PaymentPurpose,
    order_id: Option<Uuid>,
) -> MarketResult<Credit> {
    if let Some(record) = txn.payment(&payment.payment_id) {
        if record.user_id != user_id {
            return Err(MarketError::forbidden("payment belongs to another user"));
        }
        return Ok(Credit {
            record,
            replayed: true,
        });
    }

    let user = txn.active_user(user_id)?;
    if user.wallet_uid.as_deref() != Some(payment.wallet_uid.as_str()) {
        return Err(MarketError::forbidden("payment was made from another wallet"));
    }

    let at = EntryRef {
        order_id,
        ref_id: None,
    };
    ledger::credit(txn, user_id, EntryKind::Recharge, payment.amount_points, at)?;

    let record = PaymentRecord {
        payment_id: payment.payment_id.clone(),
        user_id,
        amount_points: payment.amount_points,
        purpose,
        order_id,
        created_at: txn.now(),
    };
    txn.put_payment(record.clone());
    Ok(Credit {
        record,
        replayed: false,
    })
}
