use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Ledger entry kinds
#[derive(Debug, Serialize, Deserialize, sqlx::Type, Clone, Copy, PartialEq, Eq)]
#[sqlx(type_name = "entry_kind", rename_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum EntryKind {
    Recharge,
    Purchase,
    Refund,
    OrderIncome,
    PlatformFee,
    Deposit,
    DepositRefund,
    Withdrawal,
    WithdrawalReturned,
    Penalty,
}

/// Append-only record of a points movement on one account.
///
/// `amount_points` is the signed change of the available balance, except for
/// `Penalty` entries on a seller, which record the change of the deposit.
#[derive(Debug, Serialize, Deserialize, sqlx::FromRow, Clone, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct LedgerEntry {
    pub id: Uuid,
    pub user_id: Uuid,
    pub kind: EntryKind,
    pub amount_points: i64,
    pub balance_after: i64,
    pub order_id: Option<Uuid>,
    pub ref_id: Option<Uuid>,
    pub created_at: DateTime<Utc>,
}

/// What a credited wallet payment was used for
#[derive(Debug, Serialize, Deserialize, sqlx::Type, Clone, Copy, PartialEq, Eq)]
#[sqlx(type_name = "payment_purpose", rename_all = "lowercase")]
#[serde(rename_all = "lowercase")]
pub enum PaymentPurpose {
    Recharge,
    Deposit,
    Order,
}

/// A wallet payment that has been credited to the ledger; keyed by the
/// wallet payment identifier so a payment is credited at most once.
#[derive(Debug, Serialize, Deserialize, sqlx::FromRow, Clone, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct PaymentRecord {
    pub payment_id: String,
    pub user_id: Uuid,
    pub amount_points: i64,
    pub purpose: PaymentPurpose,
    pub order_id: Option<Uuid>,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RechargeRequest {
    pub payment_id: String,
    /// Informational; the credited amount comes from the verified payment
    pub amount_pi: Option<f64>,
}

/// Result of a recharge; `replayed` is set when the payment had already been credited
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RechargeResponse {
    pub credited_points: i64,
    pub balance_points: i64,
    pub replayed: bool,
}

/// Admin dashboard figures for the current UTC day
#[derive(Debug, Serialize, Default, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct DashboardStats {
    pub orders_today: i64,
    pub amount_points_today: i64,
    pub fee_points_today: i64,
    pub pending_products: i64,
    pub pending_withdrawals: i64,
    pub open_complaints: i64,
}
