use axum::{extract::State, Json};

use super::{ok, ApiResult};
use crate::app_state::AppState;
use crate::auth::{generate_access_token, TokenRole};
use crate::error::MarketError;
use crate::models::{AdminLoginRequest, AdminLoginResponse, LoginResponse, PiLoginRequest};

/// Sign in with a wallet access token, verified against the wallet platform.
pub async fn pi_login(
    State(state): State<AppState>,
    Json(payload): Json<PiLoginRequest>,
) -> ApiResult<LoginResponse> {
    let access_token = payload
        .token()
        .ok_or_else(|| MarketError::Validation("accessToken is required".to_string()))?;

    let wallet_user = state.wallet.me(access_token).await?;
    let user = state.market.sign_in(&wallet_user).await?;
    let token = generate_access_token(&state.tokens, &user.id.to_string(), TokenRole::User)?;

    ok(LoginResponse { token, user })
}

pub async fn admin_login(
    State(state): State<AppState>,
    Json(payload): Json<AdminLoginRequest>,
) -> ApiResult<AdminLoginResponse> {
    let Some(hash) = state.config.admin_password_hash.as_deref() else {
        tracing::warn!("admin login attempted but ADMIN_PASSWORD_HASH is not set");
        return Err(MarketError::forbidden("admin login is disabled"));
    };

    let password_ok = bcrypt::verify(&payload.password, hash).unwrap_or_else(|err| {
        tracing::error!(error = %err, "ADMIN_PASSWORD_HASH is not a valid bcrypt hash");
        false
    });
    if payload.username != state.config.admin_username || !password_ok {
        tracing::warn!(username = %payload.username, "admin login rejected");
        return Err(MarketError::Unauthorized);
    }

    let token = generate_access_token(&state.tokens, &payload.username, TokenRole::Admin)?;
    tracing::info!(username = %payload.username, "admin signed in");
    ok(AdminLoginResponse {
        token,
        username: payload.username,
    })
}
