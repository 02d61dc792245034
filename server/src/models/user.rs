use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Reserved account that collects platform fees and penalties.
pub const PLATFORM_ACCOUNT: Uuid = Uuid::nil();

/// User model
#[derive(Debug, Serialize, Deserialize, sqlx::FromRow, Clone, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct User {
    pub id: Uuid,
    pub wallet_uid: Option<String>,
    pub username: String,
    pub role: UserRole,
    /// Available plus frozen points
    pub balance_points: i64,
    pub frozen_points: i64,
    pub deposit_points: i64,
    pub rating: f64,
    pub violation_count: i32,
    pub is_active: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl User {
    pub fn new(wallet_uid: String, username: String, now: DateTime<Utc>) -> Self {
        Self {
            id: Uuid::new_v4(),
            wallet_uid: Some(wallet_uid),
            username,
            role: UserRole::Buyer,
            balance_points: 0,
            frozen_points: 0,
            deposit_points: 0,
            rating: 5.0,
            violation_count: 0,
            is_active: true,
            created_at: now,
            updated_at: now,
        }
    }

    pub fn platform(now: DateTime<Utc>) -> Self {
        Self {
            id: PLATFORM_ACCOUNT,
            wallet_uid: None,
            username: "platform".to_string(),
            role: UserRole::Platform,
            balance_points: 0,
            frozen_points: 0,
            deposit_points: 0,
            rating: 5.0,
            violation_count: 0,
            is_active: true,
            created_at: now,
            updated_at: now,
        }
    }

    pub fn available_points(&self) -> i64 {
        self.balance_points - self.frozen_points
    }
}

/// User roles
#[derive(Debug, Serialize, Deserialize, sqlx::Type, Clone, Copy, PartialEq, Eq)]
#[sqlx(type_name = "user_role", rename_all = "lowercase")]
#[serde(rename_all = "lowercase")]
pub enum UserRole {
    Buyer,
    Seller,
    Platform,
}

/// Current user with the server-side conversion constants
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct MeResponse {
    #[serde(flatten)]
    pub user: User,
    pub available_points: i64,
    /// Available points in whole Pi, rounded to nearest
    pub available_pi: i64,
    /// Whole Pi still needed to reach the seller deposit
    pub deposit_shortfall_pi: i64,
    pub config: ClientConfig,
}

#[derive(Debug, Serialize, Clone, Copy)]
#[serde(rename_all = "camelCase")]
pub struct ClientConfig {
    pub points_per_pi: i64,
    pub required_deposit_points: i64,
    pub platform_fee_bps: i64,
}

/// What other users may see about an account
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PublicProfile {
    pub id: Uuid,
    pub username: String,
    pub role: UserRole,
    pub rating: f64,
    pub violation_count: i32,
}

impl From<&User> for PublicProfile {
    fn from(user: &User) -> Self {
        Self {
            id: user.id,
            username: user.username.clone(),
            role: user.role,
            rating: user.rating,
            violation_count: user.violation_count,
        }
    }
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AuthData {
    pub access_token: String,
}

/// Wallet sign-in; the SDK nests the token under `authData` in some versions
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PiLoginRequest {
    pub access_token: Option<String>,
    pub auth_data: Option<AuthData>,
}

impl PiLoginRequest {
    pub fn token(&self) -> Option<&str> {
        self.access_token
            .as_deref()
            .or_else(|| self.auth_data.as_ref().map(|d| d.access_token.as_str()))
            .map(str::trim)
            .filter(|t| !t.is_empty())
    }
}

#[derive(Debug, Deserialize)]
pub struct AdminLoginRequest {
    pub username: String,
    pub password: String,
}

#[derive(Debug, Serialize)]
pub struct LoginResponse {
    pub token: String,
    pub user: User,
}

#[derive(Debug, Serialize)]
pub struct AdminLoginResponse {
    pub token: String,
    pub username: String,
}
