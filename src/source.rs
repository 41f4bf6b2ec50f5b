//! Puzzle corpus sources.
//!
//! Two shapes are accepted:
//!   - row export: `[{ "case_id"|"external_id", "content": { cards, solutions?, level? } }]`
//!   - flat corpus: `[{ case_id, cards, solutions?, level? }]`, optionally wrapped in an
//!     object under one of `answers`, `items`, `data`, `puzzles`.
//!
//! Malformed entries are skipped with a warning; the rest still load.

use std::fmt;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::{info, instrument, warn};

use crate::domain::{Level, Puzzle};
use crate::error::StoreError;

const WRAPPER_KEYS: [&str; 4] = ["answers", "items", "data", "puzzles"];

/// Which backing source satisfied a load.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SourceKind {
  Db,
  Json,
}

impl fmt::Display for SourceKind {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    f.write_str(match self {
      SourceKind::Db => "db",
      SourceKind::Json => "json",
    })
  }
}

pub trait PuzzleSource: Send + Sync {
  fn kind(&self) -> SourceKind;
  fn fetch(&self) -> Result<Vec<Puzzle>, StoreError>;
}

/// Structured content of a stored row.
#[derive(Clone, Debug, Default, Deserialize)]
pub struct PuzzleContent {
  #[serde(default)]
  pub case_id: Option<i64>,
  #[serde(default)]
  pub cards: Vec<i64>,
  #[serde(default, alias = "solution")]
  pub solutions: Option<Vec<String>>,
  #[serde(default)]
  pub level: Option<String>,
}

/// One row as a database layer hands it over.
#[derive(Clone, Debug, Deserialize)]
pub struct PuzzleRow {
  #[serde(default)]
  pub case_id: Option<i64>,
  #[serde(default)]
  pub external_id: Option<String>,
  #[serde(default)]
  pub content: PuzzleContent,
}

fn parse_level(raw: Option<&str>) -> Option<Level> {
  raw.and_then(Level::parse_label)
}

fn cards_array(cards: &[i64]) -> Option<[i64; 4]> {
  <[i64; 4]>::try_from(cards).ok()
}

impl PuzzleRow {
  /// `external_id` wins when it is numeric, then `content.case_id`, then the row's own `case_id`.
  pub fn into_puzzle(self) -> Option<Puzzle> {
    let case_id = self
      .external_id
      .as_deref()
      .map(str::trim)
      .filter(|s| !s.is_empty() && s.chars().all(|c| c.is_ascii_digit()))
      .and_then(|s| s.parse::<i64>().ok())
      .or(self.content.case_id)
      .or(self.case_id);
    let Some(case_id) = case_id else {
      warn!(target: "puzzle_store", external_id = ?self.external_id, "skip row without case id");
      return None;
    };
    let Some(cards) = cards_array(&self.content.cards) else {
      warn!(target: "puzzle_store", case_id, cards = ?self.content.cards, "skip row: need exactly 4 cards");
      return None;
    };
    Some(Puzzle {
      case_id,
      cards,
      solutions: self.content.solutions.unwrap_or_default(),
      level: parse_level(self.content.level.as_deref()),
    })
  }
}

#[derive(Clone, Debug, Deserialize)]
struct FlatEntry {
  case_id: Option<i64>,
  #[serde(default)]
  cards: Vec<i64>,
  #[serde(default)]
  solutions: Option<Vec<String>>,
  #[serde(default)]
  level: Option<String>,
}

/// Decode rows one by one so that one bad row does not sink the whole batch.
pub fn puzzles_from_rows(rows: Vec<PuzzleRow>) -> Vec<Puzzle> {
  rows.into_iter().filter_map(PuzzleRow::into_puzzle).collect()
}

fn array_items(data: Value) -> Vec<Value> {
  match data {
    Value::Array(items) => items,
    Value::Object(mut map) => {
      for key in WRAPPER_KEYS {
        if let Some(Value::Array(items)) = map.remove(key) {
          return items;
        }
      }
      warn!(target: "puzzle_store", "corpus object has none of {:?}", WRAPPER_KEYS);
      Vec::new()
    }
    _ => Vec::new(),
  }
}

/// Parse the flat corpus shape.
pub fn parse_flat_corpus(data: Value) -> Vec<Puzzle> {
  array_items(data)
    .into_iter()
    .enumerate()
    .filter_map(|(idx, item)| {
      let entry: FlatEntry = match serde_json::from_value(item) {
        Ok(e) => e,
        Err(e) => {
          warn!(target: "puzzle_store", idx, error = %e, "skip malformed corpus entry");
          return None;
        }
      };
      let Some(case_id) = entry.case_id else {
        warn!(target: "puzzle_store", idx, "skip corpus entry without case_id");
        return None;
      };
      let Some(cards) = cards_array(&entry.cards) else {
        warn!(target: "puzzle_store", case_id, "skip corpus entry: need exactly 4 cards");
        return None;
      };
      Some(Puzzle {
        case_id,
        cards,
        solutions: entry.solutions.unwrap_or_default(),
        level: parse_level(entry.level.as_deref()),
      })
    })
    .collect()
}

/// Parse the row-export shape.
pub fn parse_row_export(data: Value) -> Vec<Puzzle> {
  let rows = array_items(data)
    .into_iter()
    .enumerate()
    .filter_map(|(idx, item)| match serde_json::from_value::<PuzzleRow>(item) {
      Ok(row) => Some(row),
      Err(e) => {
        warn!(target: "puzzle_store", idx, error = %e, "skip malformed row");
        None
      }
    })
    .collect();
  puzzles_from_rows(rows)
}

fn read_json(path: &Path) -> Result<Value, StoreError> {
  let text = std::fs::read_to_string(path).map_err(|source| StoreError::Io { path: path.to_path_buf(), source })?;
  serde_json::from_str(&text).map_err(|source| StoreError::Json { path: path.to_path_buf(), source })
}

/// Rows exported from the puzzles table (primary source).
#[derive(Clone, Debug)]
pub struct RowsFileSource {
  pub path: PathBuf,
}

impl PuzzleSource for RowsFileSource {
  fn kind(&self) -> SourceKind {
    SourceKind::Db
  }

  #[instrument(level = "info", skip(self), fields(path = %self.path.display()))]
  fn fetch(&self) -> Result<Vec<Puzzle>, StoreError> {
    let puzzles = parse_row_export(read_json(&self.path)?);
    info!(target: "puzzle_store", count = puzzles.len(), "read puzzle rows");
    Ok(puzzles)
  }
}

/// Static flat corpus (fallback source).
#[derive(Clone, Debug)]
pub struct JsonFileSource {
  pub path: PathBuf,
}

impl PuzzleSource for JsonFileSource {
  fn kind(&self) -> SourceKind {
    SourceKind::Json
  }

  #[instrument(level = "info", skip(self), fields(path = %self.path.display()))]
  fn fetch(&self) -> Result<Vec<Puzzle>, StoreError> {
    if !self.path.exists() {
      warn!(target: "puzzle_store", "corpus file missing");
      return Ok(Vec::new());
    }
    let puzzles = parse_flat_corpus(read_json(&self.path)?);
    info!(target: "puzzle_store", count = puzzles.len(), "read flat corpus");
    Ok(puzzles)
  }
}

/// Rows already in memory, e.g. handed over by an embedding database layer.
#[derive(Clone, Debug, Default)]
pub struct MemorySource {
  pub rows: Vec<PuzzleRow>,
}

impl PuzzleSource for MemorySource {
  fn kind(&self) -> SourceKind {
    SourceKind::Db
  }

  fn fetch(&self) -> Result<Vec<Puzzle>, StoreError> {
    Ok(puzzles_from_rows(self.rows.clone()))
  }
}
