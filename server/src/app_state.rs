//! Application state shared across handlers

use std::sync::Arc;

use crate::auth::TokenKeys;
use crate::config::AppConfig;
use crate::services::{ChatHub, MarketService};
use crate::wallet::WalletGateway;

/// Shared application state
#[derive(Clone)]
pub struct AppState {
    pub market: Arc<MarketService>,
    pub chat: Arc<ChatHub>,
    pub wallet: Arc<dyn WalletGateway>,
    pub tokens: TokenKeys,
    pub config: Arc<AppConfig>,
}

impl AppState {
    pub fn new(
        market: Arc<MarketService>,
        chat: Arc<ChatHub>,
        wallet: Arc<dyn WalletGateway>,
        config: AppConfig,
    ) -> Self {
        Self {
            market,
            chat,
            wallet,
            tokens: config.token_keys(),
            config: Arc::new(config),
        }
    }
}
