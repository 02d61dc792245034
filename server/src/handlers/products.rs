use axum::{
    extract::{Path, Query, State},
    Json,
};
use uuid::Uuid;
use validator::Validate;

use super::{list, ok, ApiResult};
use crate::app_state::AppState;
use crate::middleware::AuthenticatedUser;
use crate::models::{
    CreateProductRequest, CreateProductResponse, FavoriteToggle, ListProductsQuery, ListResponse,
    PriceModification, PriceModificationRequest, Product, UpdateProductRequest,
};

/// Public catalogue: approved, active listings only.
pub async fn list_products(
    State(state): State<AppState>,
    Query(query): Query<ListProductsQuery>,
) -> ApiResult<ListResponse<Product>> {
    list(state.market.list_products(&query).await)
}

pub async fn my_products(
    State(state): State<AppState>,
    user: AuthenticatedUser,
) -> ApiResult<ListResponse<Product>> {
    list(state.market.products_of(user.id).await)
}

pub async fn get_product(State(state): State<AppState>, Path(id): Path<Uuid>) -> ApiResult<Product> {
    ok(state.market.product(id).await?)
}

pub async fn create_product(
    State(state): State<AppState>,
    user: AuthenticatedUser,
    Json(payload): Json<CreateProductRequest>,
) -> ApiResult<CreateProductResponse> {
    payload.validate()?;
    let item = state.market.create_product(user.id, payload).await?;
    ok(CreateProductResponse { item })
}

pub async fn update_product(
    State(state): State<AppState>,
    user: AuthenticatedUser,
    Path(id): Path<Uuid>,
    Json(payload): Json<UpdateProductRequest>,
) -> ApiResult<Product> {
    payload.validate()?;
    ok(state.market.update_product(user.id, id, payload).await?)
}

pub async fn activate_product(
    State(state): State<AppState>,
    user: AuthenticatedUser,
    Path(id): Path<Uuid>,
) -> ApiResult<Product> {
    ok(state.market.set_product_active(user.id, id, true).await?)
}

pub async fn deactivate_product(
    State(state): State<AppState>,
    user: AuthenticatedUser,
    Path(id): Path<Uuid>,
) -> ApiResult<Product> {
    ok(state.market.set_product_active(user.id, id, false).await?)
}

pub async fn toggle_favorite(
    State(state): State<AppState>,
    user: AuthenticatedUser,
    Path(id): Path<Uuid>,
) -> ApiResult<FavoriteToggle> {
    ok(state.market.toggle_favorite(user.id, id).await?)
}

pub async fn request_price_change(
    State(state): State<AppState>,
    user: AuthenticatedUser,
    Path(id): Path<Uuid>,
    Json(payload): Json<PriceModificationRequest>,
) -> ApiResult<PriceModification> {
    payload.validate()?;
    ok(state.market.request_price_change(user.id, id, payload).await?)
}
