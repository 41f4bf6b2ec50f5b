//! Application state: the puzzle store, per-session play state, and configuration.
//!
//! The store is built from the configured sources: the row export (if any) first, then the
//! flat JSON corpus. Loading happens once at warmup and again on explicit rebuilds.

use std::sync::Arc;
use std::time::Duration;

use tracing::{info, instrument, warn};

use crate::config::{load_config_from_env, AppConfig};
use crate::error::StoreError;
use crate::session::SessionStore;
use crate::source::{JsonFileSource, PuzzleSource, RowsFileSource};
use crate::store::{LoadReport, PuzzleStore};

pub struct AppState {
    pub store: Arc<PuzzleStore>,
    pub sessions: SessionStore,
    pub config: AppConfig,
}

impl AppState {
    /// Build state from env: load config and wire the corpus sources. Does not load puzzles.
    #[instrument(level = "info", skip_all)]
    pub fn new() -> Self {
        let config = load_config_from_env().unwrap_or_default();
        Self::from_config(config)
    }

    pub fn from_config(config: AppConfig) -> Self {
        let primary: Option<Box<dyn PuzzleSource>> = config
            .store
            .rows_path
            .clone()
            .map(|path| Box::new(RowsFileSource { path }) as Box<dyn PuzzleSource>);
        let fallback: Box<dyn PuzzleSource> = Box::new(JsonFileSource { path: config.store.json_path.clone() });
        let store = PuzzleStore::new(primary, Some(fallback), config.complexity.clone());
        Self::with_store(config, store)
    }

    pub fn with_store(config: AppConfig, store: PuzzleStore) -> Self {
        info!(
            target: "game24_backend",
            rows_path = ?config.store.rows_path,
            json_path = %config.store.json_path.display(),
            default_target = config.play.default_target,
            "Puzzle sources configured"
        );
        Self {
            sessions: SessionStore::new(
                config.play.recent_keys_cap,
                config.play.max_sessions,
                Duration::from_secs(config.play.session_idle_secs),
            ),
            store: Arc::new(store),
            config,
        }
    }

    /// Load the corpus on a blocking thread. An empty corpus is logged, not fatal.
    #[instrument(level = "info", skip(self))]
    pub async fn reload(&self, force: bool) -> Option<LoadReport> {
        let store = self.store.clone();
        match tokio::task::spawn_blocking(move || store.load(force)).await {
            Ok(Ok(report)) => Some(report),
            Ok(Err(StoreError::Unavailable)) => {
                warn!(target: "game24_backend", "Puzzle store is empty; deals will report exhausted pools");
                None
            }
            Ok(Err(e)) => {
                warn!(target: "game24_backend", error = %e, "Puzzle store load failed");
                None
            }
            Err(e) => {
                warn!(target: "game24_backend", error = %e, "Puzzle store load task panicked");
                None
            }
        }
    }
}
