//! Runtime configuration read from the environment

use std::env;
use std::fmt::Display;
use std::str::FromStr;

use anyhow::{bail, Context, Result};

use crate::auth::TokenKeys;
use crate::market::{MarketSettings, PointsRate};

#[derive(Clone, Debug)]
pub struct AppConfig {
    pub port: u16,
    pub bind_addr: String,
    pub database_url: Option<String>,
    pub jwt_secret: String,
    pub token_ttl_hours: i64,
    pub points_per_pi: i64,
    pub seller_deposit_pi: i64,
    pub platform_fee_bps: i64,
    pub pi_api_base: String,
    pub pi_api_key: Option<String>,
    pub payment_webhook_secret: Option<String>,
    pub admin_username: String,
    pub admin_password_hash: Option<String>,
    pub cors_allowed_origins: Vec<String>,
}

fn parsed<T>(name: &str, default: T) -> Result<T>
where
    T: FromStr,
    T::Err: Display,
{
    match env::var(name) {
        Ok(raw) if !raw.trim().is_empty() => raw
            .trim()
            .parse::<T>()
            .map_err(|e| anyhow::anyhow!("{name} is invalid: {e}")),
        _ => Ok(default),
    }
}

fn optional(name: &str) -> Option<String> {
    env::var(name).ok().filter(|v| !v.trim().is_empty())
}

impl AppConfig {
    /// Load `.env` if present, then read the process environment.
    pub fn from_env() -> Result<Self> {
        dotenvy::dotenv().ok();

        let config = Self {
            port: parsed("PORT", 3001)?,
            bind_addr: env::var("BIND_ADDR").unwrap_or_else(|_| "127.0.0.1".to_string()),
            database_url: optional("DATABASE_URL"),
            jwt_secret: optional("JWT_SECRET").context("JWT_SECRET must be set")?,
            token_ttl_hours: parsed("TOKEN_TTL_HOURS", 168)?,
            points_per_pi: parsed("POINTS_PER_PI", 1)?,
            seller_deposit_pi: parsed("SELLER_DEPOSIT_PI", 1000)?,
            platform_fee_bps: parsed("PLATFORM_FEE_BPS", 500)?,
            pi_api_base: env::var("PI_API_BASE")
                .unwrap_or_else(|_| "https://api.minepi.com".to_string()),
            pi_api_key: optional("PI_API_KEY"),
            payment_webhook_secret: optional("PAYMENT_WEBHOOK_SECRET"),
            admin_username: env::var("ADMIN_USERNAME").unwrap_or_else(|_| "admin".to_string()),
            admin_password_hash: optional("ADMIN_PASSWORD_HASH"),
            cors_allowed_origins: env::var("CORS_ALLOWED_ORIGINS")
                .unwrap_or_else(|_| "http://localhost:5173".to_string())
                .split(',')
                .map(|o| o.trim().to_string())
                .filter(|o| !o.is_empty())
                .collect(),
        };
        config.check()?;
        Ok(config)
    }

    fn check(&self) -> Result<()> {
        if self.points_per_pi < 1 {
            bail!("POINTS_PER_PI must be at least 1");
        }
        if self.seller_deposit_pi < 0 {
            bail!("SELLER_DEPOSIT_PI cannot be negative");
        }
        if !(0..=10_000).contains(&self.platform_fee_bps) {
            bail!("PLATFORM_FEE_BPS must be between 0 and 10000");
        }
        if self.token_ttl_hours < 1 {
            bail!("TOKEN_TTL_HOURS must be at least 1");
        }
        Ok(())
    }

    pub fn market_settings(&self) -> MarketSettings {
        MarketSettings {
            rate: PointsRate::new(self.points_per_pi),
            seller_deposit_pi: self.seller_deposit_pi,
            platform_fee_bps: self.platform_fee_bps,
        }
    }

    pub fn token_keys(&self) -> TokenKeys {
        TokenKeys::new(&self.jwt_secret, self.token_ttl_hours)
    }

    /// Configuration for tests and local tooling.
    pub fn for_tests() -> Self {
        Self {
            port: 0,
            bind_addr: "127.0.0.1".to_string(),
            database_url: None,
            jwt_secret: "test-secret-test-secret-test-secret".to_string(),
            token_ttl_hours: 1,
            points_per_pi: 1,
            seller_deposit_pi: 1000,
            platform_fee_bps: 500,
            pi_api_base: "http://127.0.0.1:9".to_string(),
            pi_api_key: None,
            payment_webhook_secret: Some("hook-secret".to_string()),
            admin_username: "admin".to_string(),
            admin_password_hash: None,
            cors_allowed_origins: vec!["http://localhost:5173".to_string()],
        }
    }
}
