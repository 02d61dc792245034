use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;
use validator::Validate;

/// Order lifecycle status
#[derive(Debug, Serialize, Deserialize, sqlx::Type, Clone, Copy, PartialEq, Eq, Hash)]
#[sqlx(type_name = "order_status", rename_all = "lowercase")]
#[serde(rename_all = "lowercase")]
pub enum OrderStatus {
    Paid,
    Shipped,
    Completed,
    Refunded,
    Canceled,
}

impl OrderStatus {
    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Completed | Self::Refunded | Self::Canceled)
    }

    /// Escrow is held exactly while the order is open.
    pub fn holds_escrow(self) -> bool {
        matches!(self, Self::Paid | Self::Shipped)
    }
}

/// Purchase order; `escrow_points` equals `amount_points` while the order is
/// open and drops to zero on the terminal transition.
#[derive(Debug, Serialize, Deserialize, sqlx::FromRow, Clone, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct Order {
    pub id: Uuid,
    pub product_id: Uuid,
    pub product_title: String,
    pub buyer_id: Uuid,
    pub seller_id: Uuid,
    pub amount_points: i64,
    pub fee_points: i64,
    pub escrow_points: i64,
    pub status: OrderStatus,
    pub payment_id: Option<String>,
    pub created_at: DateTime<Utc>,
    pub shipped_at: Option<DateTime<Utc>>,
    pub completed_at: Option<DateTime<Utc>>,
    pub closed_at: Option<DateTime<Utc>>,
    pub updated_at: DateTime<Utc>,
}

impl Order {
    pub fn is_participant(&self, user_id: Uuid) -> bool {
        self.buyer_id == user_id || self.seller_id == user_id
    }
}

/// Request DTO for placing an order
#[derive(Debug, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct CreateOrderRequest {
    pub product_id: Uuid,
    /// Wallet payment that funds this purchase; doubles as idempotency key
    #[validate(length(min = 1, max = 128))]
    pub payment_id: Option<String>,
}

/// Response DTO for order creation
#[derive(Debug, Serialize)]
pub struct CreateOrderResponse {
    pub order: Order,
}
