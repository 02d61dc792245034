//! Records that go through an admin decision

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;
use validator::Validate;

use super::ReviewStatus;

/// Seller request to change a product price
#[derive(Debug, Serialize, Deserialize, sqlx::FromRow, Clone, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct PriceModification {
    pub id: Uuid,
    pub product_id: Uuid,
    pub seller_id: Uuid,
    pub old_price: i64,
    pub new_price: i64,
    pub reason: String,
    pub status: ReviewStatus,
    pub reviewer_note: Option<String>,
    pub created_at: DateTime<Utc>,
    pub reviewed_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct PriceModificationRequest {
    #[validate(range(min = 1, max = 1000000000000))]
    pub new_price: i64,
    #[validate(length(min = 1, max = 500))]
    pub reason: String,
}

#[derive(Debug, Deserialize)]
pub struct ReviewRequest {
    pub approved: bool,
    #[serde(default)]
    pub note: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
pub struct RejectRequest {
    #[serde(default)]
    pub note: Option<String>,
}

/// Withdrawal status
#[derive(Debug, Serialize, Deserialize, sqlx::Type, Clone, Copy, PartialEq, Eq)]
#[sqlx(type_name = "withdrawal_status", rename_all = "lowercase")]
#[serde(rename_all = "lowercase")]
pub enum WithdrawalStatus {
    Pending,
    Approved,
    Rejected,
    Paid,
}

/// Withdrawal of available points to an external wallet address
#[derive(Debug, Serialize, Deserialize, sqlx::FromRow, Clone, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct Withdrawal {
    pub id: Uuid,
    pub user_id: Uuid,
    pub amount_points: i64,
    pub address: String,
    pub status: WithdrawalStatus,
    pub created_at: DateTime<Utc>,
    pub reviewed_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct WithdrawalRequest {
    #[validate(range(min = 1))]
    pub amount_points: i64,
    #[validate(length(min = 1, max = 128))]
    pub address: String,
}

#[derive(Debug, Deserialize, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum WithdrawalAction {
    Approve,
    Reject,
    Paid,
}

#[derive(Debug, Deserialize)]
pub struct WithdrawalReviewRequest {
    pub action: WithdrawalAction,
}

#[derive(Debug, Default, Deserialize)]
pub struct ListWithdrawalsQuery {
    pub status: Option<WithdrawalStatus>,
}

/// Deposit record kind
#[derive(Debug, Serialize, Deserialize, sqlx::Type, Clone, Copy, PartialEq, Eq)]
#[sqlx(type_name = "deposit_kind", rename_all = "lowercase")]
#[serde(rename_all = "lowercase")]
pub enum DepositKind {
    Payment,
    Refund,
}

/// Seller deposit movement. Payments are settled immediately (`Approved`),
/// refunds wait for an admin decision.
#[derive(Debug, Serialize, Deserialize, sqlx::FromRow, Clone, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct Deposit {
    pub id: Uuid,
    pub user_id: Uuid,
    pub kind: DepositKind,
    pub amount_points: i64,
    pub status: ReviewStatus,
    pub payment_id: Option<String>,
    pub note: Option<String>,
    pub created_at: DateTime<Utc>,
    pub reviewed_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DepositPayRequest {
    pub payment_id: Option<String>,
}

/// Complaint status
#[derive(Debug, Serialize, Deserialize, sqlx::Type, Clone, Copy, PartialEq, Eq)]
#[sqlx(type_name = "complaint_status", rename_all = "lowercase")]
#[serde(rename_all = "lowercase")]
pub enum ComplaintStatus {
    Pending,
    Resolved,
    Rejected,
}

#[derive(Debug, Serialize, Deserialize, sqlx::Type, Clone, Copy, PartialEq, Eq)]
#[sqlx(type_name = "complaint_decision", rename_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum ComplaintDecision {
    RefundAndPenalty,
    Reject,
}

/// Dispute raised by a participant of an open order
#[derive(Debug, Serialize, Deserialize, sqlx::FromRow, Clone, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct Complaint {
    pub id: Uuid,
    pub order_id: Uuid,
    pub complainant_id: Uuid,
    pub reason: String,
    pub status: ComplaintStatus,
    pub decision: Option<ComplaintDecision>,
    pub penalty_points: i64,
    pub created_at: DateTime<Utc>,
    pub decided_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Deserialize, Validate)]
pub struct ComplaintRequest {
    #[validate(length(min = 1, max = 1000))]
    pub reason: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ComplaintDecisionRequest {
    pub decision: ComplaintDecision,
    #[serde(default)]
    pub penalty_points: i64,
}
