//! Game 24 · Puzzle Backend
//!
//! - Axum HTTP + WebSocket API
//! - Exact solver, safe expression evaluator and complexity scorer
//! - In-memory puzzle index loaded from a row export or a flat JSON corpus
//!
//! Important env variables:
//!   PORT               : u16 (default 3000)
//!   GAME24_CONFIG_PATH : path to TOML config (corpus paths, complexity thresholds, play settings)
//!   LOG_LEVEL          : tracing filter, e.g. "debug" or full directives
//!   LOG_FORMAT         : "pretty" (default) or "json"

mod telemetry;
mod util;
mod domain;
mod error;
mod config;
mod normalize;
mod eval;
mod complexity;
mod solver;
mod source;
mod store;
mod session;
mod state;
mod protocol;
mod logic;
mod routes;

use std::{net::SocketAddr, sync::Arc};
use tokio::net::TcpListener;
use tracing::{info, instrument};

use crate::routes::build_router;
use crate::state::AppState;

#[instrument(level = "info", skip_all)]
#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
  telemetry::init_tracing();

  // Wire sources from config, then warm the puzzle index before taking traffic.
  let state = Arc::new(AppState::new());
  if let Some(report) = state.reload(false).await {
    info!(target: "game24_backend", puzzles = report.puzzles, source = ?report.source, "Puzzle store warm");
  }

  // Build the HTTP router with routes, CORS and tracing layers.
  let app = build_router(state.clone());

  // Read port from env or default to 3000.
  let addr: SocketAddr = std::env::var("PORT")
    .ok()
    .and_then(|p| p.parse::<u16>().ok())
    .map(|port| SocketAddr::from(([0, 0, 0, 0], port)))
    .unwrap_or_else(|| SocketAddr::from(([0, 0, 0, 0], 3000)));

  let listener = TcpListener::bind(addr).await?;
  info!(target: "game24_backend", %addr, "HTTP server listening");
  axum::serve(listener, app)
    .with_graceful_shutdown(async {
      let _ = tokio::signal::ctrl_c().await;
      info!(target: "game24_backend", "Shutdown signal received");
    })
    .await?;
  Ok(())
}
