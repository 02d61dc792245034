//! Data models for the marketplace backend

use serde::{Deserialize, Serialize};

pub mod chat;
pub mod ledger;
pub mod moderation;
pub mod order;
pub mod product;
pub mod user;

pub use chat::*;
pub use ledger::*;
pub use moderation::*;
pub use order::*;
pub use product::*;
pub use user::*;

/// API response wrapper: every successful body is `{ "data": ... }`
#[derive(Debug, Serialize, Deserialize)]
pub struct ApiResponse<T> {
    pub data: T,
}

impl<T> ApiResponse<T> {
    pub fn new(data: T) -> Self {
        Self { data }
    }
}

/// Collection payload, rendered as `{ "list": [...] }`
#[derive(Debug, Serialize, Deserialize)]
pub struct ListResponse<T> {
    pub list: Vec<T>,
}

impl<T> From<Vec<T>> for ListResponse<T> {
    fn from(list: Vec<T>) -> Self {
        Self { list }
    }
}

/// Pagination parameters
#[derive(Debug, Default, Clone, Deserialize)]
pub struct PaginationParams {
    pub page: Option<i64>,
    pub limit: Option<i64>,
}

impl PaginationParams {
    /// Resolved `(offset, limit)`; page starts at 1, limit is clamped to 1..=100.
    pub fn window(&self) -> (usize, usize) {
        let page = self.page.unwrap_or(1).max(1);
        let limit = self.limit.unwrap_or(20).clamp(1, 100);
        (((page - 1) * limit) as usize, limit as usize)
    }

    pub fn apply<T>(&self, items: Vec<T>) -> Vec<T> {
        let (offset, limit) = self.window();
        items.into_iter().skip(offset).take(limit).collect()
    }
}

/// Review status shared by product approval, price modifications and
/// deposit refund requests
#[derive(Debug, Serialize, Deserialize, sqlx::Type, Clone, Copy, PartialEq, Eq)]
#[sqlx(type_name = "review_status", rename_all = "lowercase")]
#[serde(rename_all = "lowercase")]
pub enum ReviewStatus {
    Pending,
    Approved,
    Rejected,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn pagination_defaults_and_clamps() {
        let params = PaginationParams::default();
        assert_eq!(params.window(), (0, 20));

        let params = PaginationParams {
            page: Some(3),
            limit: Some(500),
        };
        assert_eq!(params.window(), (200, 100));

        let params = PaginationParams {
            page: Some(-2),
            limit: Some(0),
        };
        assert_eq!(params.window(), (0, 1));
    }

    #[test]
    fn api_response_wraps_data() {
        let body = serde_json::to_value(ApiResponse::new(ListResponse::from(vec![1, 2]))).unwrap();
        assert_eq!(body, serde_json::json!({ "data": { "list": [1, 2] } }));
    }
}
