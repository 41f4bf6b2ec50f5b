//! Per-session play state: recently dealt keys, the current hand, counters, and an optional
//! assigned case pool (custom practice set or timed competition).
//!
//! Sessions are keyed by an opaque id (a uuid when the client has none). Only dealing, starting
//! a pool and restarting open a session; every other call works on an existing one or none.
//! Idle sessions expire, and the map is capped by evicting the least recently used entry.

use std::collections::{BTreeMap, HashMap, VecDeque};
use std::time::{Duration, Instant};

use serde::{Deserialize, Serialize};
use tokio::sync::Mutex;
use tracing::debug;
use uuid::Uuid;

use crate::domain::ValuesKey;

#[derive(Clone, Debug, Default, Serialize)]
pub struct LevelStats {
  pub played: u32,
  pub solved: u32,
}

#[derive(Clone, Debug, Default, Serialize)]
pub struct PlayStats {
  pub played: u32,
  pub solved: u32,
  pub revealed: u32,
  pub skipped: u32,
  pub answer_attempts: u32,
  pub answer_correct: u32,
  pub answer_wrong: u32,
  pub deal_swaps: u32,
  pub help_single: u32,
  pub help_all: u32,
  pub by_level: BTreeMap<String, LevelStats>,
}

/// The hand currently in front of the player.
#[derive(Clone, Debug, Serialize)]
pub struct Hand {
  pub case_id: Option<i64>,
  pub cards: [i64; 4],
  pub target: i64,
  pub level: String,
  /// Set by the first check/help/skip on this hand.
  pub interacted: bool,
  pub helped: bool,
  pub solved: bool,
}

impl Hand {
  /// Same cards (in any order) and same target.
  pub fn matches(&self, values: &[i64], target: i64) -> bool {
    self.target == target && ValuesKey::from_values(&self.cards) == ValuesKey::from_values(values)
  }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PoolMode {
  Custom,
  Competition,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum CaseStatus {
  Unseen,
  Shown,
  Attempted,
  Good,
  Revealed,
  Skipped,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum CaseEvent {
  Shown,
  Attempt,
  Good,
  Revealed,
  Skipped,
}

#[derive(Clone, Debug, Serialize)]
pub struct CaseRecord {
  pub status: CaseStatus,
  pub attempts: u32,
  /// 1 once answered correctly, never reset.
  pub score: u8,
}

impl CaseRecord {
  fn apply(&mut self, event: CaseEvent) {
    match event {
      CaseEvent::Shown => {
        if self.status == CaseStatus::Unseen {
          self.status = CaseStatus::Shown;
        }
      }
      CaseEvent::Attempt => {
        self.attempts += 1;
        if matches!(self.status, CaseStatus::Unseen | CaseStatus::Shown) {
          self.status = CaseStatus::Attempted;
        }
      }
      CaseEvent::Revealed | CaseEvent::Skipped if self.status == CaseStatus::Good => {}
      CaseEvent::Revealed => self.status = CaseStatus::Revealed,
      CaseEvent::Skipped => self.status = CaseStatus::Skipped,
      CaseEvent::Good => {
        self.status = CaseStatus::Good;
        self.score = 1;
      }
    }
  }
}

/// A fixed list of case ids assigned to a session.
#[derive(Clone, Debug)]
pub struct CasePool {
  pub mode: PoolMode,
  /// Serving order; duplicates removed.
  pub ids: Vec<i64>,
  pub cases: HashMap<i64, CaseRecord>,
  /// Set for timed competitions only.
  pub ends_at: Option<Instant>,
}

impl CasePool {
  pub fn new(mode: PoolMode, ids: &[i64], duration: Option<Duration>, now: Instant) -> Self {
    let mut ordered = Vec::with_capacity(ids.len());
    let mut cases = HashMap::with_capacity(ids.len());
    for id in ids {
      if cases.insert(*id, CaseRecord { status: CaseStatus::Unseen, attempts: 0, score: 0 }).is_none() {
        ordered.push(*id);
      }
    }
    let ends_at = match (mode, duration) {
      (PoolMode::Competition, Some(d)) if !d.is_zero() => Some(now + d),
      _ => None,
    };
    Self { mode, ids: ordered, cases, ends_at }
  }

  /// Ids not dealt yet, in serving order.
  pub fn remaining(&self) -> impl Iterator<Item = i64> + '_ {
    self.ids.iter().copied().filter(|id| self.cases.get(id).map_or(false, |c| c.status == CaseStatus::Unseen))
  }

  pub fn is_done(&self) -> bool {
    self.remaining().next().is_none()
  }

  pub fn help_disabled(&self) -> bool {
    self.ends_at.is_some()
  }

  /// Whole seconds left in a timed competition.
  pub fn time_left(&self, now: Instant) -> Option<u64> {
    self.ends_at.map(|end| end.saturating_duration_since(now).as_secs_f64().round() as u64)
  }

  pub fn expired(&self, now: Instant) -> bool {
    self.ends_at.map_or(false, |end| now >= end)
  }

  pub fn mark(&mut self, case_id: i64, event: CaseEvent) {
    if let Some(record) = self.cases.get_mut(&case_id) {
      record.apply(event);
    }
  }

  pub fn score_map(&self) -> BTreeMap<i64, u8> {
    self.ids.iter().map(|id| (*id, self.cases.get(id).map_or(0, |c| c.score))).collect()
  }

  pub fn unfinished(&self) -> Vec<i64> {
    self.ids.iter().copied().filter(|id| self.cases.get(id).map_or(true, |c| c.score == 0)).collect()
  }
}

#[derive(Clone, Debug)]
pub struct PlayState {
  pub recent_keys: VecDeque<ValuesKey>,
  pub hand: Option<Hand>,
  pub stats: PlayStats,
  pub pool: Option<CasePool>,
  recent_cap: usize,
  last_seen: Instant,
}

impl PlayState {
  pub fn new(recent_cap: usize) -> Self {
    Self {
      recent_keys: VecDeque::new(),
      hand: None,
      stats: PlayStats::default(),
      pool: None,
      recent_cap: recent_cap.max(1),
      last_seen: Instant::now(),
    }
  }

  /// Push `key` as the most recent deal. A key already present moves to the back, so the
  /// newest deals are always at the end of the deque.
  pub fn remember(&mut self, key: ValuesKey) {
    if let Some(pos) = self.recent_keys.iter().position(|k| *k == key) {
      self.recent_keys.remove(pos);
    }
    self.recent_keys.push_back(key);
    while self.recent_keys.len() > self.recent_cap {
      self.recent_keys.pop_front();
    }
  }

  pub fn recent(&self) -> Vec<ValuesKey> {
    self.recent_keys.iter().cloned().collect()
  }

  fn mark_case(&mut self, event: CaseEvent) {
    let case_id = self.hand.as_ref().and_then(|h| h.case_id);
    if let (Some(pool), Some(id)) = (self.pool.as_mut(), case_id) {
      pool.mark(id, event);
    }
  }

  /// Start a new hand. Dealing over an untouched hand counts as a swap.
  pub fn deal(&mut self, hand: Hand) {
    if matches!(&self.hand, Some(h) if !h.interacted) {
      self.stats.deal_swaps += 1;
    }
    self.hand = Some(hand);
    self.mark_case(CaseEvent::Shown);
  }

  /// Count the current hand as played on its first interaction.
  pub fn touch(&mut self) {
    let Some(hand) = self.hand.as_mut() else {
      return;
    };
    if hand.interacted {
      return;
    }
    hand.interacted = true;
    self.stats.played += 1;
    self.stats.by_level.entry(hand.level.clone()).or_default().played += 1;
  }

  pub fn record_attempt(&mut self, correct: bool) {
    self.touch();
    self.stats.answer_attempts += 1;
    if !correct {
      self.stats.answer_wrong += 1;
      self.mark_case(CaseEvent::Attempt);
      return;
    }
    self.stats.answer_correct += 1;
    self.mark_case(CaseEvent::Good);
    if let Some(hand) = self.hand.as_mut() {
      if !hand.solved {
        hand.solved = true;
        self.stats.solved += 1;
        self.stats.by_level.entry(hand.level.clone()).or_default().solved += 1;
      }
    }
  }

  pub fn record_help(&mut self, all: bool, has_solution: bool) {
    self.touch();
    if all {
      self.stats.help_all += 1;
    } else {
      self.stats.help_single += 1;
    }
    if has_solution {
      self.mark_case(CaseEvent::Revealed);
    }
    if let Some(hand) = self.hand.as_mut() {
      if !hand.helped {
        hand.helped = true;
        self.stats.revealed += 1;
      }
    }
  }

  pub fn record_skip(&mut self) {
    self.touch();
    self.stats.skipped += 1;
    self.mark_case(CaseEvent::Skipped);
    self.hand = None;
  }

  /// Assign a case pool. Counters, recent keys and the current hand start over.
  pub fn start_pool(&mut self, pool: CasePool) {
    self.stats = PlayStats::default();
    self.recent_keys.clear();
    self.hand = None;
    self.pool = Some(pool);
  }

  pub fn help_disabled(&self) -> bool {
    self.pool.as_ref().map_or(false, CasePool::help_disabled)
  }
}

pub struct SessionStore {
  sessions: Mutex<HashMap<String, PlayState>>,
  recent_cap: usize,
  max_sessions: usize,
  idle_ttl: Duration,
}

impl SessionStore {
  pub fn new(recent_cap: usize, max_sessions: usize, idle_ttl: Duration) -> Self {
    Self { sessions: Mutex::new(HashMap::new()), recent_cap, max_sessions: max_sessions.max(1), idle_ttl }
  }

  /// Use the given id when present and non-empty, otherwise mint one.
  pub fn resolve_id(id: Option<&str>) -> String {
    match id.map(str::trim) {
      Some(s) if !s.is_empty() => s.chars().take(64).collect(),
      _ => Uuid::new_v4().to_string(),
    }
  }

  /// Run `f` on the session's state, opening the session on first use.
  pub async fn with<T>(&self, id: &str, f: impl FnOnce(&mut PlayState) -> T) -> T {
    let now = Instant::now();
    let mut sessions = self.sessions.lock().await;
    if !sessions.contains_key(id) {
      prune(&mut sessions, now, self.idle_ttl, self.max_sessions - 1);
    }
    let state = sessions.entry(id.to_string()).or_insert_with(|| PlayState::new(self.recent_cap));
    state.last_seen = now;
    f(state)
  }

  /// Run `f` only when the session exists and has not gone idle.
  pub async fn with_existing<T>(&self, id: &str, f: impl FnOnce(&mut PlayState) -> T) -> Option<T> {
    let now = Instant::now();
    let mut sessions = self.sessions.lock().await;
    let state = sessions.get_mut(id)?;
    if now.saturating_duration_since(state.last_seen) > self.idle_ttl {
      sessions.remove(id);
      return None;
    }
    state.last_seen = now;
    Some(f(state))
  }

  /// Replace the session with a fresh state.
  pub async fn reset(&self, id: &str) {
    self.with(id, |st| *st = PlayState::new(st.recent_cap)).await
  }
}

/// Drop sessions idle for longer than `ttl`, then the least recently used ones until at most
/// `keep` remain.
fn prune(sessions: &mut HashMap<String, PlayState>, now: Instant, ttl: Duration, keep: usize) {
  let before = sessions.len();
  sessions.retain(|_, st| now.saturating_duration_since(st.last_seen) <= ttl);
  if sessions.len() > keep {
    let mut by_age: Vec<(Instant, String)> = sessions.iter().map(|(id, st)| (st.last_seen, id.clone())).collect();
    by_age.sort();
    let excess = sessions.len() - keep;
    for (_, id) in by_age.into_iter().take(excess) {
      sessions.remove(&id);
    }
  }
  if sessions.len() != before {
    debug!(target: "play", evicted = before - sessions.len(), live = sessions.len(), "sessions pruned");
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  fn hand(level: &str) -> Hand {
    Hand { case_id: Some(1), cards: [1, 2, 3, 4], target: 24, level: level.into(), interacted: false, helped: false, solved: false }
  }

  fn key(v: i64) -> ValuesKey {
    ValuesKey::from_values(&[v, v, v, v])
  }

  #[test]
  fn recent_keys_are_bounded_and_deduplicated() {
    let mut st = PlayState::new(3);
    for v in 1..=5 {
      st.remember(key(v));
    }
    st.remember(key(5));
    let keys: Vec<String> = st.recent().iter().map(|k| k.to_string()).collect();
    assert_eq!(keys, vec!["03-03-03-03", "04-04-04-04", "05-05-05-05"]);
  }

  #[test]
  fn redealt_key_moves_into_the_avoid_window() {
    let mut st = PlayState::new(100);
    for v in 1..=55 {
      st.remember(key(v));
    }
    st.remember(key(1));
    let recent = st.recent();
    assert_eq!(recent.len(), 55);
    assert_eq!(recent.last(), Some(&key(1)));
    let window = &recent[recent.len() - crate::store::RECENT_WINDOW..];
    assert!(window.contains(&key(1)));
  }

  #[test]
  fn played_counts_once_per_hand() {
    let mut st = PlayState::new(10);
    st.deal(hand("easy"));
    st.record_attempt(false);
    st.record_attempt(true);
    st.record_attempt(true);
    assert_eq!(st.stats.played, 1);
    assert_eq!(st.stats.solved, 1);
    assert_eq!(st.stats.answer_attempts, 3);
    assert_eq!(st.stats.answer_correct, 2);
    assert_eq!(st.stats.answer_wrong, 1);
    assert_eq!(st.stats.by_level["easy"].played, 1);
    assert_eq!(st.stats.by_level["easy"].solved, 1);
  }

  #[test]
  fn dealing_over_untouched_hand_is_a_swap() {
    let mut st = PlayState::new(10);
    st.deal(hand("easy"));
    st.deal(hand("easy"));
    assert_eq!(st.stats.deal_swaps, 1);
    st.record_help(false, true);
    st.deal(hand("hard"));
    assert_eq!(st.stats.deal_swaps, 1);
    assert_eq!(st.stats.revealed, 1);
    assert_eq!(st.stats.help_single, 1);
  }

  #[test]
  fn skip_clears_hand() {
    let mut st = PlayState::new(10);
    st.deal(hand("medium"));
    st.record_skip();
    assert!(st.hand.is_none());
    assert_eq!(st.stats.skipped, 1);
    assert_eq!(st.stats.played, 1);
  }

  #[test]
  fn case_status_follows_play() {
    let now = Instant::now();
    let mut st = PlayState::new(10);
    st.start_pool(CasePool::new(PoolMode::Custom, &[1, 2, 1, 3], None, now));
    let pool = st.pool.as_ref().unwrap();
    assert_eq!(pool.ids, vec![1, 2, 3]);
    assert!(!pool.help_disabled());

    st.deal(hand("easy"));
    st.record_attempt(false);
    st.record_attempt(true);
    st.record_skip();

    let mut other = hand("easy");
    other.case_id = Some(2);
    st.deal(other);
    st.record_help(true, true);

    let pool = st.pool.as_ref().unwrap();
    assert_eq!(pool.cases[&1].status, CaseStatus::Good);
    assert_eq!(pool.cases[&1].attempts, 1);
    assert_eq!(pool.cases[&2].status, CaseStatus::Revealed);
    assert_eq!(pool.cases[&3].status, CaseStatus::Unseen);
    assert_eq!(pool.remaining().collect::<Vec<_>>(), vec![3]);
    assert_eq!(pool.score_map(), BTreeMap::from([(1, 1), (2, 0), (3, 0)]));
    assert_eq!(pool.unfinished(), vec![2, 3]);
    assert!(!pool.is_done());
  }

  #[test]
  fn starting_a_pool_resets_counters() {
    let mut st = PlayState::new(10);
    st.deal(hand("easy"));
    st.record_attempt(true);
    st.remember(key(1));
    st.start_pool(CasePool::new(PoolMode::Custom, &[1], None, Instant::now()));
    assert_eq!(st.stats.solved, 0);
    assert!(st.recent_keys.is_empty());
    assert!(st.hand.is_none());
  }

  #[test]
  fn competitions_are_timed_and_disable_help() {
    let now = Instant::now();
    let pool = CasePool::new(PoolMode::Competition, &[1], Some(Duration::from_secs(90)), now);
    assert!(pool.help_disabled());
    assert_eq!(pool.time_left(now), Some(90));
    assert!(!pool.expired(now));
    assert!(pool.expired(now + Duration::from_secs(90)));
    assert_eq!(pool.time_left(now + Duration::from_secs(120)), Some(0));

    let untimed = CasePool::new(PoolMode::Competition, &[1], None, now);
    assert!(!untimed.help_disabled());
    assert_eq!(untimed.time_left(now), None);
  }

  #[test]
  fn resolve_id_mints_when_missing() {
    assert_eq!(SessionStore::resolve_id(Some(" abc ")), "abc");
    assert_eq!(SessionStore::resolve_id(Some("")).len(), 36);
    assert_eq!(SessionStore::resolve_id(None).len(), 36);
  }

  #[tokio::test]
  async fn sessions_are_isolated_and_lookups_do_not_create() {
    let store = SessionStore::new(10, 100, Duration::from_secs(60));
    store.with("a", |st| st.remember(key(1))).await;
    store.with("b", |_| ()).await;
    assert_eq!(store.with_existing("a", |st| st.recent_keys.len()).await, Some(1));
    assert_eq!(store.with_existing("b", |st| st.recent_keys.len()).await, Some(0));
    assert_eq!(store.with_existing("c", |_| ()).await, None);
    assert_eq!(store.sessions.lock().await.len(), 2);
  }

  #[tokio::test]
  async fn session_count_is_capped() {
    let store = SessionStore::new(10, 2, Duration::from_secs(60));
    store.with("a", |_| ()).await;
    store.with("b", |_| ()).await;
    store.with("a", |_| ()).await;
    store.with("c", |_| ()).await;
    let sessions = store.sessions.lock().await;
    assert_eq!(sessions.len(), 2);
    assert!(sessions.contains_key("a") && sessions.contains_key("c"));
  }

  #[test]
  fn idle_sessions_are_pruned() {
    let now = Instant::now();
    let mut sessions = HashMap::new();
    sessions.insert("old".to_string(), PlayState::new(10));
    sessions.insert("new".to_string(), PlayState::new(10));
    if let Some(st) = sessions.get_mut("new") {
      st.last_seen = now + Duration::from_secs(100);
    }
    prune(&mut sessions, now + Duration::from_secs(120), Duration::from_secs(60), 10);
    assert_eq!(sessions.keys().collect::<Vec<_>>(), vec!["new"]);
  }

  #[tokio::test]
  async fn reset_starts_over() {
    let store = SessionStore::new(10, 10, Duration::from_secs(60));
    store.with("a", |st| st.remember(key(1))).await;
    store.reset("a").await;
    assert_eq!(store.with_existing("a", |st| st.recent_keys.len()).await, Some(0));
  }
}
