use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;
use validator::Validate;

use super::{PaginationParams, ReviewStatus};

/// Highest price a listing may carry
pub const MAX_PRICE_POINTS: i64 = 1_000_000_000_000;

/// Product listing
#[derive(Debug, Serialize, Deserialize, sqlx::FromRow, Clone, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct Product {
    pub id: Uuid,
    pub seller_id: Uuid,
    pub title: String,
    pub subtitle: String,
    pub description: String,
    pub price_points: i64,
    pub stock: i32,
    pub images: Vec<String>,
    pub category: String,
    pub delivery_method: String,
    pub is_active: bool,
    pub moderation: ReviewStatus,
    pub review_note: Option<String>,
    pub favorites_count: i64,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Product {
    /// Listed for sale: approved by an admin, active and in stock.
    pub fn is_listed(&self) -> bool {
        self.moderation == ReviewStatus::Approved && self.is_active && self.stock > 0
    }

    pub fn matches(&self, query: &ListProductsQuery) -> bool {
        if let Some(category) = query.category.as_deref().filter(|c| !c.is_empty()) {
            if self.category != category {
                return false;
            }
        }
        match query.q.as_deref().map(str::trim).filter(|q| !q.is_empty()) {
            Some(q) => {
                let q = q.to_lowercase();
                self.title.to_lowercase().contains(&q) || self.subtitle.to_lowercase().contains(&q)
            }
            None => true,
        }
    }
}

/// Request DTO for listing a product
#[derive(Debug, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct CreateProductRequest {
    #[validate(length(min = 1, max = 120))]
    pub title: String,
    #[serde(default)]
    #[validate(length(max = 200))]
    pub subtitle: String,
    #[serde(default)]
    pub description: String,
    #[validate(range(min = 1, max = 1000000000000))]
    pub price_points: i64,
    #[validate(range(min = 1))]
    pub stock: i32,
    #[serde(default)]
    #[validate(length(max = 9))]
    pub images: Vec<String>,
    #[validate(length(min = 1, max = 60))]
    pub category: String,
    #[validate(length(min = 1, max = 60))]
    pub delivery_method: String,
}

/// Request DTO for editing a product; the price changes only through a
/// price modification request.
#[derive(Debug, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct UpdateProductRequest {
    #[validate(length(min = 1, max = 120))]
    pub title: Option<String>,
    #[validate(length(max = 200))]
    pub subtitle: Option<String>,
    pub description: Option<String>,
    #[validate(length(min = 1, max = 60))]
    pub category: Option<String>,
    #[validate(length(min = 1, max = 60))]
    pub delivery_method: Option<String>,
    #[validate(range(min = 0))]
    pub stock: Option<i32>,
    #[validate(length(max = 9))]
    pub images: Option<Vec<String>>,
}

/// Query parameters for browsing listings
#[derive(Debug, Default, Deserialize)]
pub struct ListProductsQuery {
    pub q: Option<String>,
    pub category: Option<String>,
    pub page: Option<i64>,
    pub limit: Option<i64>,
}

impl ListProductsQuery {
    pub fn pagination(&self) -> PaginationParams {
        PaginationParams {
            page: self.page,
            limit: self.limit,
        }
    }
}

/// Response DTO for product creation
#[derive(Debug, Serialize)]
pub struct CreateProductResponse {
    pub item: Product,
}

/// Result of toggling a favorite
#[derive(Debug, Serialize, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct FavoriteToggle {
    pub action: FavoriteAction,
    pub favorites_count: i64,
}

#[derive(Debug, Serialize, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum FavoriteAction {
    Favorite,
    Unfavorite,
}
