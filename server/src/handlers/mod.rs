//! HTTP handlers for the marketplace API
//!
//! Handlers validate input, resolve the caller through the auth extractors and
//! delegate to the services. Successful bodies are wrapped as `{ "data": ... }`.

use axum::Json;

use crate::error::MarketResult;
use crate::models::{ApiResponse, ListResponse};

pub mod admin;
pub mod auth;
pub mod chat;
pub mod orders;
pub mod payments;
pub mod products;
pub mod users;

pub type ApiResult<T> = MarketResult<Json<ApiResponse<T>>>;

pub(crate) fn ok<T>(data: T) -> ApiResult<T> {
    Ok(Json(ApiResponse::new(data)))
}

pub(crate) fn list<T>(items: Vec<T>) -> ApiResult<ListResponse<T>> {
    ok(ListResponse::from(items))
}
