//! Pi Mart backend server
//!
//! Loads configuration, restores the marketplace from Postgres (or starts
//! with an in-memory journal when no database is configured) and serves the
//! HTTP and WebSocket API.

use std::net::SocketAddr;
use std::sync::Arc;

use anyhow::Context;
use chrono::Utc;
use sqlx::postgres::PgPoolOptions;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

use pimart_server::app_state::AppState;
use pimart_server::config::AppConfig;
use pimart_server::market::MarketState;
use pimart_server::routes;
use pimart_server::services::{ChatHub, MarketService};
use pimart_server::store::{Journal, MemoryJournal, PgJournal};
use pimart_server::wallet::PiGateway;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info,pimart_server=debug")),
        )
        .init();

    let config = AppConfig::from_env()?;
    let settings = config.market_settings();

    let (journal, state, messages): (Arc<dyn Journal>, MarketState, _) = match &config.database_url {
        Some(url) => {
            let pool = PgPoolOptions::new()
                .max_connections(10)
                .connect(url)
                .await
                .context("failed to connect to DATABASE_URL")?;
            let journal = PgJournal::new(pool);
            journal.migrate().await?;
            let snapshot = journal.load().await.context("failed to load marketplace state")?;
            info!(
                orders = snapshot.state.orders().count(),
                messages = snapshot.messages.len(),
                "marketplace state restored from postgres"
            );
            (Arc::new(journal), snapshot.state, snapshot.messages)
        }
        None => {
            warn!("DATABASE_URL not set; running with an in-memory journal, data is lost on restart");
            (Arc::new(MemoryJournal), MarketState::new(Utc::now()), Vec::new())
        }
    };

    if config.pi_api_key.is_none() {
        warn!("PI_API_KEY not set; payment verification will fail");
    }
    let wallet = Arc::new(PiGateway::new(config.pi_api_base.clone(), config.pi_api_key.clone()));
    let market = Arc::new(MarketService::new(state, settings, journal.clone()));
    let chat = Arc::new(ChatHub::with_history(messages, journal));

    let ip = config
        .bind_addr
        .parse::<std::net::IpAddr>()
        .with_context(|| format!("BIND_ADDR {} is not an IP address", config.bind_addr))?;
    let addr = SocketAddr::new(ip, config.port);

    let app = routes::app(AppState::new(market, chat, wallet, config));

    info!("Server starting on {}", addr);
    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .with_context(|| format!("failed to bind {addr}"))?;
    axum::serve(listener, app).await?;
    Ok(())
}
