//! Loading service configuration (corpus paths, complexity thresholds, play settings) from TOML.
//!
//! Every section and field is optional; see the `Default` impls for the values used.
//!
//! ```toml
//! [store]
//! rows_path = "data/puzzle_rows.json"
//! json_path = "static/answers.json"
//!
//! [complexity]
//! simple_threshold = 11
//! hard_threshold = 18
//! [complexity.weights]
//! div = 2
//!
//! [play]
//! default_target = 24
//! session_idle_secs = 1800
//! ```

use std::path::PathBuf;

use serde::Deserialize;
use tracing::{error, info};

use crate::complexity::ComplexityConfig;

#[derive(Clone, Debug, Deserialize, Default)]
pub struct AppConfig {
  #[serde(default)]
  pub store: StoreConfig,
  #[serde(default)]
  pub complexity: ComplexityConfig,
  #[serde(default)]
  pub play: PlayConfig,
}

#[derive(Clone, Debug, Deserialize)]
#[serde(default)]
pub struct StoreConfig {
  /// Row export of the puzzles table; tried first when set.
  pub rows_path: Option<PathBuf>,
  /// Flat corpus used when the row source is absent or empty.
  pub json_path: PathBuf,
}

impl Default for StoreConfig {
  fn default() -> Self {
    Self { rows_path: None, json_path: PathBuf::from("static/answers.json") }
  }
}

#[derive(Clone, Debug, Deserialize)]
#[serde(default)]
pub struct PlayConfig {
  pub default_target: i64,
  /// How many dealt values keys a session remembers.
  pub recent_keys_cap: usize,
  /// Deal attempts when a non-24 target needs a solvable hand.
  pub pick_max_tries: usize,
  /// Cap on solutions returned by "show all".
  pub help_limit: usize,
  /// Live sessions kept before the least recently used one is dropped.
  pub max_sessions: usize,
  /// Seconds without a request before a session expires.
  pub session_idle_secs: u64,
}

impl Default for PlayConfig {
  fn default() -> Self {
    Self {
      default_target: 24,
      recent_keys_cap: 100,
      pick_max_tries: 60,
      help_limit: 10,
      max_sessions: 10_000,
      session_idle_secs: 1800,
    }
  }
}

/// Load `AppConfig` from GAME24_CONFIG_PATH. Unset, unreadable or invalid files give `None`.
pub fn load_config_from_env() -> Option<AppConfig> {
  let path = std::env::var("GAME24_CONFIG_PATH").ok()?;
  match std::fs::read_to_string(&path) {
    Ok(s) => match toml::from_str::<AppConfig>(&s) {
      Ok(cfg) => {
        info!(target: "game24_backend", %path, "Loaded config (TOML)");
        Some(cfg)
      }
      Err(e) => {
        error!(target: "game24_backend", %path, error = %e, "Failed to parse TOML config");
        None
      }
    },
    Err(e) => {
      error!(target: "game24_backend", %path, error = %e, "Failed to read TOML config file");
      None
    }
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn empty_toml_uses_defaults() {
    let cfg: AppConfig = toml::from_str("").unwrap();
    assert_eq!(cfg.play.default_target, 24);
    assert_eq!(cfg.complexity.simple_threshold, 11);
    assert_eq!(cfg.complexity.hard_threshold, 18);
    assert_eq!(cfg.store.json_path, PathBuf::from("static/answers.json"));
    assert!(cfg.store.rows_path.is_none());
  }

  #[test]
  fn partial_sections_keep_other_defaults() {
    let cfg: AppConfig = toml::from_str(
      r#"
      [store]
      rows_path = "rows.json"
      [complexity]
      hard_threshold = 20
      [complexity.weights]
      pow = 4
      [play]
      help_limit = 3
      "#,
    )
    .unwrap();
    assert_eq!(cfg.store.rows_path, Some(PathBuf::from("rows.json")));
    assert_eq!(cfg.complexity.hard_threshold, 20);
    assert_eq!(cfg.complexity.simple_threshold, 11);
    assert_eq!(cfg.complexity.weights.pow, 4);
    assert_eq!(cfg.complexity.weights.div, 2);
    assert_eq!(cfg.play.help_limit, 3);
    assert_eq!(cfg.play.pick_max_tries, 60);
    assert_eq!(cfg.play.session_idle_secs, 1800);
  }
}
