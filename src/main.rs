// =============================================================================
// Flowboard — Main Entry Point
// =============================================================================
//
// Boots the buy/sell pressure screener: load config, resolve the tracked
// symbol universe, start the REST API, then run the first scan cycle in the
// background. Auto-refresh is off by default and can be enabled at runtime
// via the config endpoint.
// =============================================================================

// ── Module declarations ──────────────────────────────────────────────────────
mod api;
mod binance;
mod catalog;
mod config;
mod error;
mod fetcher;
mod observer;
mod ranking;
mod scanner;
mod signal_detector;
mod state;
mod types;
mod volume_profile;

use std::sync::Arc;

use anyhow::Context;
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;

use crate::binance::FuturesClient;
use crate::config::ScreenerConfig;
use crate::fetcher::KlineFetcher;
use crate::observer::LogObserver;
use crate::scanner::ScanEngine;
use crate::state::ScreenerState;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // ── 1. Environment & config ──────────────────────────────────────────
    let _ = dotenv::dotenv();

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    info!("╔══════════════════════════════════════════════════════════╗");
    info!("║        Flowboard Screener — Starting Up                  ║");
    info!("╚══════════════════════════════════════════════════════════╝");

    let mut config = ScreenerConfig::load(config::CONFIG_PATH).unwrap_or_else(|e| {
        warn!(error = %e, "Failed to load config, using defaults");
        ScreenerConfig::default()
    });

    // Override the quote asset from env if available.
    if let Ok(quote) = std::env::var("FLOWBOARD_QUOTE_ASSET") {
        let quote = quote.trim().to_uppercase();
        if !quote.is_empty() {
            config.quote_asset = quote;
        }
    }

    info!(
        interval = %config.interval,
        range_days = config.range_days,
        smoothing = config.smoothing,
        quote_asset = %config.quote_asset,
        universe_size = config.universe_size,
        "Screener configuration ready"
    );

    // ── 2. Resolve the symbol universe ───────────────────────────────────
    let client = FuturesClient::new();
    let universe = catalog::load_universe(&client, &config.quote_asset, config.universe_size)
        .await
        .context("failed to load the symbol universe")?;

    // ── 3. Build shared state & scan engine ──────────────────────────────
    let retry = config.retry.clone();
    let state = Arc::new(ScreenerState::new(config));
    state.board.seed(&universe);

    let fetcher = KlineFetcher::new(client, retry);
    let engine = Arc::new(ScanEngine::new(state.clone(), fetcher));
    engine.add_observer(Arc::new(LogObserver));

    // ── 4. Start the API server ──────────────────────────────────────────
    let api_engine = engine.clone();
    let bind_addr =
        std::env::var("FLOWBOARD_BIND_ADDR").unwrap_or_else(|_| "0.0.0.0:3100".into());
    let bind_addr_clone = bind_addr.clone();

    tokio::spawn(async move {
        let app = api::rest::router(api_engine);
        let listener = tokio::net::TcpListener::bind(&bind_addr_clone)
            .await
            .expect("Failed to bind API server");
        info!(addr = %bind_addr_clone, "API server listening");
        axum::serve(listener, app)
            .await
            .expect("API server failed");
    });

    // ── 5. Initial scan + auto-refresh loop ──────────────────────────────
    engine.clone().spawn_cycle();
    tokio::spawn(engine.clone().run_refresh_loop());

    info!("All subsystems running. Press Ctrl+C to stop.");

    // ── 6. Graceful shutdown ─────────────────────────────────────────────
    tokio::signal::ctrl_c().await?;
    warn!("Shutdown signal received — stopping gracefully");

    if let Err(e) = state.config.read().save(config::CONFIG_PATH) {
        error!(error = %e, "Failed to save screener config on shutdown");
    }

    info!("Flowboard screener shut down complete.");
    Ok(())
}
