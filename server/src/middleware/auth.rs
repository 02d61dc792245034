//! Bearer-token extractors

use async_trait::async_trait;
use axum::{extract::FromRequestParts, http::request::Parts};
use axum_extra::TypedHeader;
use headers::{authorization::Bearer, Authorization};
use uuid::Uuid;

use crate::app_state::AppState;
use crate::auth::{verify_token, Claims, TokenRole};
use crate::error::{MarketError, MarketResult};
use crate::models::User;

/// Signed-in, active marketplace user
#[derive(Debug, Clone)]
pub struct AuthenticatedUser {
    pub id: Uuid,
    pub user: User,
}

/// Signed-in admin console operator
#[derive(Debug, Clone)]
pub struct AdminUser {
    pub name: String,
}

async fn bearer_claims(parts: &mut Parts, state: &AppState) -> MarketResult<Claims> {
    let TypedHeader(Authorization(bearer)) =
        TypedHeader::<Authorization<Bearer>>::from_request_parts(parts, state)
            .await
            .map_err(|_| MarketError::Unauthorized)?;
    verify_token(&state.tokens, bearer.token())
}

/// Resolve a user access token, as sent in a header or a query string.
pub async fn user_from_token(state: &AppState, token: &str) -> MarketResult<AuthenticatedUser> {
    let claims = verify_token(&state.tokens, token)?;
    user_from_claims(state, claims).await
}

async fn user_from_claims(state: &AppState, claims: Claims) -> MarketResult<AuthenticatedUser> {
    if claims.role != TokenRole::User {
        return Err(MarketError::forbidden("a user token is required"));
    }
    let id = Uuid::parse_str(&claims.sub).map_err(|_| MarketError::Unauthorized)?;
    let user = state.market.active_user(id).await?;
    Ok(AuthenticatedUser { id, user })
}

#[async_trait]
impl FromRequestParts<AppState> for AuthenticatedUser {
    type Rejection = MarketError;

    async fn from_request_parts(parts: &mut Parts, state: &AppState) -> Result<Self, Self::Rejection> {
        let claims = bearer_claims(parts, state).await?;
        user_from_claims(state, claims).await
    }
}

#[async_trait]
impl FromRequestParts<AppState> for AdminUser {
    type Rejection = MarketError;

    async fn from_request_parts(parts: &mut Parts, state: &AppState) -> Result<Self, Self::Rejection> {
        let claims = bearer_claims(parts, state).await?;
        if claims.role != TokenRole::Admin {
            tracing::warn!(subject = %claims.sub, "user token used on an admin route");
            return Err(MarketError::forbidden("admin access required"));
        }
        Ok(AdminUser { name: claims.sub })
    }
}
