//! Domain models: puzzles, nominal levels, requested difficulties, pools and values keys.

use std::fmt;

use serde::{Deserialize, Serialize};

/// Nominal difficulty label stored on a puzzle.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Level {
  Easy,
  Medium,
  Hard,
}

impl Level {
  /// Lenient parse used for corpus rows: trimmed, case-insensitive, unknown labels are `None`.
  pub fn parse_label(raw: &str) -> Option<Self> {
    match raw.trim().to_ascii_lowercase().as_str() {
      "easy" => Some(Level::Easy),
      "medium" => Some(Level::Medium),
      "hard" => Some(Level::Hard),
      _ => None,
    }
  }

  pub fn as_str(&self) -> &'static str {
    match self {
      Level::Easy => "easy",
      Level::Medium => "medium",
      Level::Hard => "hard",
    }
  }
}

/// Difficulty a player asks for when dealing. Distinct from `Level`: it selects a pool.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Difficulty {
  Easy,
  Medium,
  Hard,
  Challenge,
  Nosol,
  All,
}

impl Difficulty {
  /// Anything unrecognised (including empty input) means `Medium`.
  pub fn normalize(raw: &str) -> Self {
    match raw.trim().to_ascii_lowercase().as_str() {
      "easy" => Difficulty::Easy,
      "hard" => Difficulty::Hard,
      "challenge" => Difficulty::Challenge,
      "nosol" => Difficulty::Nosol,
      "all" => Difficulty::All,
      _ => Difficulty::Medium,
    }
  }

  pub fn pool(&self) -> PoolName {
    match self {
      Difficulty::Challenge | Difficulty::Nosol => PoolName::Nosol,
      Difficulty::Hard => PoolName::HardLike,
      Difficulty::Easy => PoolName::EasyLike,
      Difficulty::Medium | Difficulty::All => PoolName::Medium,
    }
  }

  pub fn as_str(&self) -> &'static str {
    match self {
      Difficulty::Easy => "easy",
      Difficulty::Medium => "medium",
      Difficulty::Hard => "hard",
      Difficulty::Challenge => "challenge",
      Difficulty::Nosol => "nosol",
      Difficulty::All => "all",
    }
  }
}

/// Derived serving pools.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PoolName {
  Nosol,
  EasyLike,
  Medium,
  HardLike,
}

impl PoolName {
  pub const ALL: [PoolName; 4] = [PoolName::Nosol, PoolName::EasyLike, PoolName::Medium, PoolName::HardLike];

  pub fn as_str(&self) -> &'static str {
    match self {
      PoolName::Nosol => "nosol",
      PoolName::EasyLike => "easy_like",
      PoolName::Medium => "medium",
      PoolName::HardLike => "hard_like",
    }
  }
}

impl fmt::Display for PoolName {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    f.write_str(self.as_str())
  }
}

/// Order-independent fingerprint of a values multiset, e.g. `01-04-08-08`.
#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ValuesKey(String);

impl ValuesKey {
  pub fn from_values(values: &[i64]) -> Self {
    let mut sorted = values.to_vec();
    sorted.sort_unstable();
    let parts: Vec<String> = sorted.iter().map(|v| format!("{:02}", v)).collect();
    ValuesKey(parts.join("-"))
  }

  pub fn as_str(&self) -> &str {
    &self.0
  }
}

impl fmt::Display for ValuesKey {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    f.write_str(&self.0)
  }
}

impl From<String> for ValuesKey {
  fn from(s: String) -> Self {
    ValuesKey(s)
  }
}

/// One corpus entry. Immutable once loaded.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Puzzle {
  pub case_id: i64,
  pub cards: [i64; 4],
  /// Known solutions for target 24; empty means "no solution".
  #[serde(default)]
  pub solutions: Vec<String>,
  #[serde(default)]
  pub level: Option<Level>,
}

impl Puzzle {
  pub fn has_solution(&self) -> bool {
    !self.solutions.is_empty()
  }

  pub fn values_key(&self) -> ValuesKey {
    ValuesKey::from_values(&self.cards)
  }
}
