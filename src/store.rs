//! Puzzle store: indexes by case id and values key, derived pools, randomized serving.
//!
//! Readers clone an `Arc` to the current snapshot and work on it without further locking.
//! A reload builds a complete new snapshot and swaps the pointer, so a reader sees either
//! the old index or the new one, never a half-built one. Rebuilds are serialized.

use std::collections::{BTreeMap, HashMap, HashSet};
use std::sync::Arc;

use parking_lot::{Mutex, RwLock};
use rand::seq::SliceRandom;
use rand::Rng;
use serde::Serialize;
use tracing::{error, info, instrument, warn};

use crate::complexity::ComplexityConfig;
use crate::domain::{Difficulty, Level, PoolName, Puzzle, ValuesKey};
use crate::error::StoreError;
use crate::source::{PuzzleSource, SourceKind};

/// Only this many most recent keys are avoided when picking.
pub const RECENT_WINDOW: usize = 50;

#[derive(Clone, Debug)]
pub struct PoolEntry {
  pub puzzle: Arc<Puzzle>,
  pub key: ValuesKey,
}

/// Result of a random pick: the puzzle (if any) and whether the pool is exhausted for
/// this caller (nothing eligible, or a repeat had to be allowed).
#[derive(Clone, Debug)]
pub struct Pick {
  pub puzzle: Option<Arc<Puzzle>>,
  pub exhausted: bool,
}

#[derive(Clone, Debug, Serialize)]
pub struct LoadReport {
  pub source: Option<SourceKind>,
  pub puzzles: usize,
  pub pools: BTreeMap<PoolName, usize>,
}

/// One fully built index. Never mutated after construction.
#[derive(Debug, Default)]
struct Snapshot {
  by_id: HashMap<i64, Arc<Puzzle>>,
  /// Last writer wins when several puzzles share the same values.
  by_key: HashMap<ValuesKey, Arc<Puzzle>>,
  pools: HashMap<PoolName, Vec<PoolEntry>>,
  loaded_from: Option<SourceKind>,
}

impl Snapshot {
  fn build(puzzles: Vec<Puzzle>, loaded_from: Option<SourceKind>, complexity: &ComplexityConfig) -> Self {
    let mut by_id = HashMap::with_capacity(puzzles.len());
    let mut by_key = HashMap::with_capacity(puzzles.len());
    let mut pools: HashMap<PoolName, Vec<PoolEntry>> = PoolName::ALL.iter().map(|p| (*p, Vec::new())).collect();

    // Medium puzzles promoted into easy_like/hard_like go after the native entries.
    let mut easy = Vec::new();
    let mut hard = Vec::new();
    let mut medium_simple = Vec::new();
    let mut medium_hard = Vec::new();

    for p in puzzles {
      let puzzle = Arc::new(p);
      let key = puzzle.values_key();
      if by_id.insert(puzzle.case_id, puzzle.clone()).is_some() {
        warn!(target: "puzzle_store", case_id = puzzle.case_id, "duplicate case_id; keeping the later row");
      }
      by_key.insert(key.clone(), puzzle.clone());

      let entry = PoolEntry { puzzle: puzzle.clone(), key };
      let has_sol = puzzle.has_solution();
      if !has_sol {
        pools.entry(PoolName::Nosol).or_default().push(entry.clone());
      }
      match puzzle.level {
        Some(Level::Easy) if has_sol => easy.push(entry),
        Some(Level::Medium) => {
          if has_sol && complexity.has_simple_solution(&puzzle) {
            medium_simple.push(entry.clone());
          }
          if has_sol && complexity.has_hard_solution(&puzzle) {
            medium_hard.push(entry.clone());
          }
          pools.entry(PoolName::Medium).or_default().push(entry);
        }
        Some(Level::Hard) if has_sol => hard.push(entry),
        _ => {}
      }
    }

    easy.extend(medium_simple);
    hard.extend(medium_hard);
    pools.insert(PoolName::EasyLike, easy);
    pools.insert(PoolName::HardLike, hard);

    Snapshot { by_id, by_key, pools, loaded_from }
  }

  fn report(&self) -> BTreeMap<PoolName, usize> {
    PoolName::ALL
      .iter()
      .map(|name| (*name, self.pools.get(name).map_or(0, Vec::len)))
      .collect()
  }
}

pub struct PuzzleStore {
  primary: Option<Box<dyn PuzzleSource>>,
  fallback: Option<Box<dyn PuzzleSource>>,
  complexity: ComplexityConfig,
  /// `None` until the first load.
  current: RwLock<Option<Arc<Snapshot>>>,
  rebuild: Mutex<()>,
}

impl PuzzleStore {
  pub fn new(
    primary: Option<Box<dyn PuzzleSource>>,
    fallback: Option<Box<dyn PuzzleSource>>,
    complexity: ComplexityConfig,
  ) -> Self {
    Self { primary, fallback, complexity, current: RwLock::new(None), rebuild: Mutex::new(()) }
  }

  fn snapshot(&self) -> Option<Arc<Snapshot>> {
    self.current.read().clone()
  }

  pub fn is_loaded(&self) -> bool {
    self.current.read().is_some()
  }

  pub fn loaded_from(&self) -> Option<SourceKind> {
    self.snapshot().and_then(|s| s.loaded_from)
  }

  pub fn len(&self) -> usize {
    self.snapshot().map_or(0, |s| s.by_id.len())
  }

  fn fetch_from(source: &Option<Box<dyn PuzzleSource>>) -> (Vec<Puzzle>, Option<SourceKind>) {
    let Some(src) = source else {
      return (Vec::new(), None);
    };
    match src.fetch() {
      Ok(puzzles) => (puzzles, Some(src.kind())),
      Err(e) => {
        error!(target: "puzzle_store", source = %src.kind(), error = %e, "puzzle source failed");
        (Vec::new(), Some(src.kind()))
      }
    }
  }

  /// Populate the index. A no-op when already loaded and `force` is false.
  ///
  /// Source failures never escape as panics: when neither source yields a puzzle the store
  /// becomes loaded-but-empty and `StoreError::Unavailable` is returned for the caller to log.
  #[instrument(level = "info", skip(self))]
  pub fn load(&self, force: bool) -> Result<LoadReport, StoreError> {
    if !force {
      if let Some(s) = self.snapshot() {
        return Ok(LoadReport { source: s.loaded_from, puzzles: s.by_id.len(), pools: s.report() });
      }
    }

    let _guard = self.rebuild.lock();
    // Another caller may have finished a load while we waited.
    if !force {
      if let Some(s) = self.snapshot() {
        return Ok(LoadReport { source: s.loaded_from, puzzles: s.by_id.len(), pools: s.report() });
      }
    }

    let (mut puzzles, mut source) = Self::fetch_from(&self.primary);
    if puzzles.is_empty() {
      let (fallback, kind) = Self::fetch_from(&self.fallback);
      puzzles = fallback;
      source = if puzzles.is_empty() { None } else { kind };
    }

    let snapshot = Snapshot::build(puzzles, source, &self.complexity);
    let report = LoadReport { source, puzzles: snapshot.by_id.len(), pools: snapshot.report() };
    *self.current.write() = Some(Arc::new(snapshot));

    if report.puzzles == 0 {
      error!(target: "puzzle_store", "no puzzles from any source; store is empty");
      return Err(StoreError::Unavailable);
    }
    info!(
      target: "puzzle_store",
      source = ?report.source,
      puzzles = report.puzzles,
      nosol = report.pools[&PoolName::Nosol],
      easy_like = report.pools[&PoolName::EasyLike],
      medium = report.pools[&PoolName::Medium],
      hard_like = report.pools[&PoolName::HardLike],
      "puzzle store loaded"
    );
    Ok(report)
  }

  /// Pool name -> size. All zero before the first load.
  pub fn pool_report(&self) -> BTreeMap<PoolName, usize> {
    self
      .snapshot()
      .map(|s| s.report())
      .unwrap_or_else(|| PoolName::ALL.iter().map(|n| (*n, 0)).collect())
  }

  pub fn get_by_id(&self, case_id: i64) -> Option<Arc<Puzzle>> {
    self.snapshot()?.by_id.get(&case_id).cloned()
  }

  /// Lookup by values multiset. With several puzzles on the same values, which one comes
  /// back is unspecified.
  pub fn get_by_values(&self, values: &[i64]) -> Option<Arc<Puzzle>> {
    self.snapshot()?.by_key.get(&ValuesKey::from_values(values)).cloned()
  }

  /// Stored target-24 solutions for a values multiset (empty when unknown or unsolvable).
  pub fn solutions_for(&self, values: &[i64]) -> Vec<String> {
    self.get_by_values(values).map(|p| p.solutions.clone()).unwrap_or_default()
  }

  pub fn random_pick(
    &self,
    level: &str,
    recent_keys: &[ValuesKey],
    eligible: Option<&dyn Fn(i64) -> bool>,
  ) -> Pick {
    self.random_pick_with(&mut rand::thread_rng(), level, recent_keys, eligible)
  }

  /// `random_pick` with an explicit RNG.
  #[instrument(level = "debug", skip(self, rng, recent_keys, eligible), fields(recent = recent_keys.len()))]
  pub fn random_pick_with<R: Rng + ?Sized>(
    &self,
    rng: &mut R,
    level: &str,
    recent_keys: &[ValuesKey],
    eligible: Option<&dyn Fn(i64) -> bool>,
  ) -> Pick {
    let exhausted = Pick { puzzle: None, exhausted: true };
    let Some(snapshot) = self.snapshot() else {
      return exhausted;
    };

    let wanted = Difficulty::normalize(level).pool();
    let pool = match snapshot.pools.get(&wanted) {
      Some(p) if !p.is_empty() => p,
      _ => match snapshot.pools.get(&PoolName::Medium) {
        Some(p) if !p.is_empty() => p,
        _ => return exhausted,
      },
    };

    let base: Vec<&PoolEntry> = match eligible {
      Some(ok) => pool.iter().filter(|e| ok(e.puzzle.case_id)).collect(),
      None => pool.iter().collect(),
    };
    if base.is_empty() {
      return exhausted;
    }

    let start = recent_keys.len().saturating_sub(RECENT_WINDOW);
    let recent: HashSet<&ValuesKey> = recent_keys[start..].iter().collect();
    let fresh: Vec<&PoolEntry> = base.iter().copied().filter(|e| !recent.contains(&e.key)).collect();

    if fresh.is_empty() {
      let repeat = base.choose(rng).map(|e| e.puzzle.clone());
      return Pick { puzzle: repeat, exhausted: true };
    }
    Pick { puzzle: fresh.choose(rng).map(|e| e.puzzle.clone()), exhausted: false }
  }
}
