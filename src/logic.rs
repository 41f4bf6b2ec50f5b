//! Core behaviors shared by both HTTP and WebSocket handlers.
//!
//! This includes:
//!   - Dealing a hand (with solvability retries for non-24 targets, or from an assigned case pool)
//!   - Checking answers, including "no solution" claims
//!   - Help (stored solutions for 24, solver otherwise)
//!   - Skip, stats, session pools and reports, solver and pool reports
//!
//! Only a request about the session's current hand (same cards, same target) moves that
//! hand's counters. Requests with other values are answered but leave the session alone.

use std::collections::HashSet;
use std::sync::Arc;
use std::time::{Duration, Instant};

use tracing::{debug, info, instrument, warn};

use crate::complexity::ComplexityConfig;
use crate::domain::{Difficulty, Puzzle, ValuesKey};
use crate::error::PlayError;
use crate::eval::{evaluate, hits_target};
use crate::normalize::normalize;
use crate::protocol::*;
use crate::session::{CasePool, Hand, PlayState, SessionStore};
use crate::solver::{enumerate_solutions, solve_one};
use crate::state::AppState;
use crate::store::PuzzleStore;
use crate::util::{is_no_solution_claim, trunc_for_log};

/// Target the stored corpus is solved for.
const CORPUS_TARGET: i64 = 24;

/// Upper bound on solutions a single solve request may ask for.
const SOLVE_LIMIT_CAP: usize = 100;

/// Longest answer accepted for checking, in characters.
const MAX_ANSWER_CHARS: usize = 200;

/// Random pick that, for targets other than 24, retries until the solver finds a solution
/// (giving up after `max_tries` and serving the last candidate).
/// Returns the pick, whether the pool ran out of fresh hands, and every key drawn on the way
/// so the caller can keep them out of the next draws.
pub fn pick_for_target(
  store: &PuzzleStore,
  level: &str,
  target: i64,
  recent: &[ValuesKey],
  max_tries: usize,
) -> (Option<Arc<Puzzle>>, bool, Vec<ValuesKey>) {
  let mut avoid = recent.to_vec();
  let mut drawn = Vec::new();
  let mut chosen = None;
  let mut exhausted = false;
  for _ in 0..max_tries.max(1) {
    let pick = store.random_pick(level, &avoid, None);
    exhausted = pick.exhausted;
    let Some(puzzle) = pick.puzzle else {
      return (None, exhausted, drawn);
    };
    let key = puzzle.values_key();
    avoid.retain(|k| *k != key);
    avoid.push(key.clone());
    drawn.push(key);
    if target == CORPUS_TARGET || solve_one(&puzzle.cards, target).is_some() {
      return (Some(puzzle), exhausted, drawn);
    }
    debug!(target: "play", case_id = puzzle.case_id, target, "hand unsolvable for target; redrawing");
    chosen = Some(puzzle);
  }
  warn!(target: "play", target, "no solvable hand found; serving the last draw");
  (chosen, exhausted, drawn)
}

/// Next case from an assigned pool. With a `level`, draw at random among the undealt cases in
/// that difficulty's pool; otherwise (or when none of them sit in it) serve in list order.
pub fn pick_from_case_pool(
  store: &PuzzleStore,
  pool: &CasePool,
  level: Option<&str>,
  recent: &[ValuesKey],
) -> Option<Arc<Puzzle>> {
  let remaining: HashSet<i64> = pool.remaining().collect();
  if remaining.is_empty() {
    return None;
  }
  if let Some(level) = level {
    let eligible = |case_id: i64| remaining.contains(&case_id);
    if let Some(puzzle) = store.random_pick(level, recent, Some(&eligible)).puzzle {
      return Some(puzzle);
    }
  }
  pool.remaining().find_map(|id| store.get_by_id(id))
}

/// The stored puzzle for `case_id`, but only when it holds exactly these values.
fn case_for_values(store: &PuzzleStore, case_id: Option<i64>, values: &[i64]) -> Option<Arc<Puzzle>> {
  let key = ValuesKey::from_values(values);
  case_id.and_then(|id| store.get_by_id(id)).filter(|p| p.values_key() == key)
}

/// Decide a "no solution" claim. Returns (claim is correct, method used).
pub fn no_solution_correct(store: &PuzzleStore, values: &[i64], case_id: Option<i64>, target: i64) -> (bool, &'static str) {
  if target == CORPUS_TARGET {
    if let Some(p) = case_for_values(store, case_id, values) {
      return (!p.has_solution(), "case_id");
    }
    if let Some(p) = store.get_by_values(values) {
      return (!p.has_solution(), "values");
    }
  }
  (solve_one(values, target).is_none(), "solver")
}

fn four_values(values: Vec<i64>) -> Result<Vec<i64>, PlayError> {
  if values.len() != 4 {
    return Err(PlayError::ValueCount(values.len()));
  }
  Ok(values)
}

/// What a check or help request is about.
struct Resolved {
  values: Vec<i64>,
  target: i64,
  case_id: Option<i64>,
  /// The request is about the session's current hand.
  on_hand: bool,
  help_disabled: bool,
}

/// Values and target from the request, falling back to the session's current hand.
async fn resolve_hand(
  sessions: &SessionStore,
  session_id: &str,
  values: Option<Vec<i64>>,
  target: Option<i64>,
  case_id: Option<i64>,
  default_target: i64,
) -> Result<Resolved, PlayError> {
  let (hand, help_disabled) = sessions
    .with_existing(session_id, |st| (st.hand.clone(), st.help_disabled()))
    .await
    .unwrap_or((None, false));

  let values = match (values, &hand) {
    (Some(v), _) => four_values(v)?,
    (None, Some(h)) => h.cards.to_vec(),
    (None, None) => return Err(PlayError::NoHand),
  };
  let same_cards = hand.as_ref().map_or(false, |h| ValuesKey::from_values(&h.cards) == ValuesKey::from_values(&values));
  let target = target
    .or_else(|| hand.as_ref().filter(|_| same_cards).map(|h| h.target))
    .unwrap_or(default_target);
  let on_hand = hand.as_ref().map_or(false, |h| h.matches(&values, target));
  let case_id = case_id.or_else(|| hand.as_ref().filter(|_| on_hand).and_then(|h| h.case_id));
  Ok(Resolved { values, target, case_id, on_hand, help_disabled })
}

fn deal_label(puzzle: &Puzzle, requested: &str, from_pool: bool) -> String {
  match (from_pool, puzzle.level) {
    (true, Some(level)) => level.as_str().to_string(),
    _ => Difficulty::normalize(requested).as_str().to_string(),
  }
}

#[instrument(level = "info", skip(state, q), fields(level = ?q.level, target = ?q.target, case_id = ?q.case_id))]
pub async fn deal_next(state: &AppState, q: NextQuery) -> Result<DealOut, PlayError> {
  let session_id = SessionStore::resolve_id(q.session_id.as_deref());
  let requested = q.level.clone().unwrap_or_else(|| "medium".into());
  let target = q.target.unwrap_or(state.config.play.default_target);
  let now = Instant::now();

  let (recent, pool) = state.sessions.with(&session_id, |st| (st.recent(), st.pool.clone())).await;
  if pool.as_ref().map_or(false, |p| p.expired(now)) {
    info!(target: "play", %session_id, "deal refused: competition over");
    return Err(PlayError::CompetitionOver);
  }

  let (puzzle, exhausted, drawn, fixed) = if let Some(id) = q.case_id {
    (Some(state.store.get_by_id(id).ok_or(PlayError::CaseNotFound(id))?), false, Vec::new(), true)
  } else if let Some(pool) = &pool {
    let p = pick_from_case_pool(&state.store, pool, q.level.as_deref(), &recent);
    let ran_out = p.is_none();
    (p, ran_out, Vec::new(), true)
  } else {
    let (p, exhausted, drawn) = pick_for_target(&state.store, &requested, target, &recent, state.config.play.pick_max_tries);
    (p, exhausted, drawn, false)
  };

  let hand = puzzle.as_ref().map(|p| Hand {
    case_id: Some(p.case_id),
    cards: p.cards,
    target,
    level: deal_label(p, &requested, fixed),
    interacted: false,
    helped: false,
    solved: false,
  });
  let dealt_key = puzzle.as_ref().map(|p| p.values_key());
  let (pool_done, help_disabled, time_left, unfinished) = state
    .sessions
    .with(&session_id, |st: &mut PlayState| {
      for k in drawn.into_iter().chain(dealt_key) {
        st.remember(k);
      }
      if let Some(h) = hand {
        st.deal(h);
      }
      match &st.pool {
        Some(p) => {
          // Ids missing from the corpus can never be dealt, so running out of cards ends the pool.
          let done = exhausted || p.is_done();
          let unfinished = if done { p.unfinished() } else { Vec::new() };
          (done, p.help_disabled(), p.time_left(now), unfinished)
        }
        None => (exhausted, false, None, Vec::new()),
      }
    })
    .await;

  info!(target: "play", %session_id, level = %requested, target, case_id = ?puzzle.as_ref().map(|p| p.case_id), pool_done, "hand dealt");
  let mut out = DealOut::new(session_id, puzzle.as_deref(), &requested, target, pool_done);
  out.help_disabled = help_disabled;
  out.time_left = time_left;
  out.unfinished = unfinished;
  Ok(out)
}

#[instrument(level = "info", skip(state, body), fields(answer_len = body.answer.len()))]
pub async fn check_answer(state: &AppState, body: CheckIn) -> CheckOut {
  let session_id = SessionStore::resolve_id(body.session_id.as_deref());
  let refuse = |session_id: String, e: PlayError| CheckOut {
    session_id,
    correct: false,
    value: None,
    target: body.target.unwrap_or(state.config.play.default_target),
    error: Some(e.code()),
    reason: e.to_string(),
  };
  if body.answer.chars().count() > MAX_ANSWER_CHARS {
    return refuse(session_id, PlayError::AnswerTooLong(MAX_ANSWER_CHARS));
  }
  let resolved = resolve_hand(
    &state.sessions,
    &session_id,
    body.values.clone(),
    body.target,
    body.case_id,
    state.config.play.default_target,
  )
  .await;
  let Resolved { values, target, case_id, on_hand, .. } = match resolved {
    Ok(r) => r,
    Err(e) => return refuse(session_id, e),
  };

  let out = if is_no_solution_claim(&body.answer) {
    let (correct, method) = no_solution_correct(&state.store, &values, case_id, target);
    let reason = if correct {
      format!("Correct: no solution reaches {} ({})", target, method)
    } else {
      format!("There is a solution for {} ({})", target, method)
    };
    CheckOut { session_id: session_id.clone(), correct, value: None, target, error: None, reason }
  } else {
    let expr = normalize(&body.answer);
    match evaluate(&expr, &values) {
      Ok(value) => {
        let correct = hits_target(value, target);
        let reason = if correct { format!("{} = {}", expr, target) } else { format!("{} = {}, not {}", expr, value, target) };
        CheckOut { session_id: session_id.clone(), correct, value: Some(value), target, error: None, reason }
      }
      Err(e) => CheckOut { session_id: session_id.clone(), correct: false, value: None, target, error: Some(e.code()), reason: e.to_string() },
    }
  };

  if on_hand {
    let correct = out.correct;
    state.sessions.with_existing(&session_id, |st| st.record_attempt(correct)).await;
  }
  info!(target: "play", %session_id, answer = %trunc_for_log(&body.answer, 64), correct = out.correct, on_hand, error = ?out.error, "answer checked");
  out
}

#[instrument(level = "info", skip(state, body), fields(all = body.all))]
pub async fn help(state: &AppState, body: HelpIn) -> Result<HelpOut, PlayError> {
  let session_id = SessionStore::resolve_id(body.session_id.as_deref());
  let Resolved { values, target, case_id, on_hand, help_disabled } = resolve_hand(
    &state.sessions,
    &session_id,
    body.values,
    body.target,
    body.case_id,
    state.config.play.default_target,
  )
  .await?;
  if help_disabled {
    return Err(PlayError::HelpDisabled);
  }
  let limit = if body.all { state.config.play.help_limit.max(1) } else { 1 };

  let mut source = "solver";
  let mut solutions = Vec::new();
  if target == CORPUS_TARGET {
    let stored = case_for_values(&state.store, case_id, &values)
      .map(|p| p.solutions.clone())
      .unwrap_or_else(|| state.store.solutions_for(&values));
    if !stored.is_empty() {
      source = "store";
      solutions = stored.into_iter().take(limit).collect();
    }
  }
  if solutions.is_empty() {
    solutions = if body.all {
      enumerate_solutions(&values, target, limit)
    } else {
      solve_one(&values, target).into_iter().collect()
    };
  }

  let has_solution = !solutions.is_empty();
  if on_hand {
    let all = body.all;
    state.sessions.with_existing(&session_id, |st| st.record_help(all, has_solution)).await;
  }
  info!(target: "play", %session_id, target, count = solutions.len(), source, on_hand, "help served");
  Ok(HelpOut { session_id, target, has_solution, solutions, source })
}

#[instrument(level = "info", skip(state, q))]
pub async fn skip(state: &AppState, q: SessionQuery) -> StatsOut {
  let session_id = SessionStore::resolve_id(q.session_id.as_deref());
  let stats = state
    .sessions
    .with_existing(&session_id, |st| {
      st.record_skip();
      st.stats.clone()
    })
    .await
    .unwrap_or_default();
  StatsOut { session_id, stats }
}

pub async fn stats(state: &AppState, q: SessionQuery) -> StatsOut {
  let session_id = SessionStore::resolve_id(q.session_id.as_deref());
  let stats = state.sessions.with_existing(&session_id, |st| st.stats.clone()).await.unwrap_or_default();
  StatsOut { session_id, stats }
}

/// Assign a custom set or a competition. Counters and recent keys start over.
#[instrument(level = "info", skip(state, body), fields(mode = ?body.mode, cases = body.case_ids.len(), duration = ?body.duration_sec))]
pub async fn start_pool(state: &AppState, body: PoolIn) -> Result<PoolStartOut, PlayError> {
  if body.case_ids.is_empty() {
    return Err(PlayError::InvalidPool("no case ids given"));
  }
  let session_id = SessionStore::resolve_id(body.session_id.as_deref());
  let now = Instant::now();
  let pool = CasePool::new(body.mode, &body.case_ids, body.duration_sec.map(Duration::from_secs), now);
  let (pool_len, help_disabled, time_left) = (pool.ids.len(), pool.help_disabled(), pool.time_left(now));
  state.sessions.with(&session_id, |st| st.start_pool(pool)).await;
  info!(target: "play", %session_id, mode = ?body.mode, pool_len, help_disabled, "case pool started");
  Ok(PoolStartOut { session_id, mode: body.mode, pool_len, stats_reset: true, help_disabled, time_left })
}

fn build_report(store: &PuzzleStore, session_id: String, st: Option<(crate::session::PlayStats, Option<CasePool>)>) -> SessionReport {
  let (stats, pool) = st.unwrap_or_default();
  let Some(pool) = pool else {
    return SessionReport {
      session_id,
      stats,
      pool_mode: None,
      pool_len: 0,
      pool_score: Default::default(),
      unfinished: Vec::new(),
      pool_report: Vec::new(),
    };
  };
  let pool_report = pool
    .ids
    .iter()
    .filter_map(|id| {
      let record = pool.cases.get(id)?;
      Some(CaseReportRow {
        case_id: *id,
        level: store.get_by_id(*id).and_then(|p| p.level),
        status: record.status,
        attempts: record.attempts,
      })
    })
    .collect();
  SessionReport {
    session_id,
    stats,
    pool_mode: Some(pool.mode),
    pool_len: pool.ids.len(),
    pool_score: pool.score_map(),
    unfinished: pool.unfinished(),
    pool_report,
  }
}

pub async fn report(state: &AppState, q: SessionQuery) -> SessionReport {
  let session_id = SessionStore::resolve_id(q.session_id.as_deref());
  let snapshot = state.sessions.with_existing(&session_id, |st| (st.stats.clone(), st.pool.clone())).await;
  build_report(&state.store, session_id, snapshot)
}

/// Leave the assigned pool and return the final summary.
#[instrument(level = "info", skip(state, q))]
pub async fn exit(state: &AppState, q: SessionQuery) -> SessionReport {
  let session_id = SessionStore::resolve_id(q.session_id.as_deref());
  let snapshot = state
    .sessions
    .with_existing(&session_id, |st| (st.stats.clone(), st.pool.take()))
    .await;
  let out = build_report(&state.store, session_id, snapshot);
  info!(target: "play", session_id = %out.session_id, pool_mode = ?out.pool_mode, unfinished = out.unfinished.len(), "session exited pool");
  out
}

#[instrument(level = "info", skip(state, q))]
pub async fn restart(state: &AppState, q: SessionQuery) -> RestartOut {
  let session_id = SessionStore::resolve_id(q.session_id.as_deref());
  state.sessions.reset(&session_id).await;
  RestartOut { session_id }
}

#[instrument(level = "info", skip(state, body), fields(values = ?body.values, target = ?body.target, limit = ?body.limit))]
pub fn solve(state: &AppState, body: SolveIn) -> Result<SolveOut, PlayError> {
  let values = four_values(body.values)?;
  let target = body.target.unwrap_or(state.config.play.default_target);
  let solutions = match body.limit {
    Some(limit) => enumerate_solutions(&values, target, limit.min(SOLVE_LIMIT_CAP)),
    None => solve_one(&values, target).into_iter().collect(),
  };
  Ok(SolveOut { values, target, solutions })
}

pub fn score(complexity: &ComplexityConfig, expr: &str) -> ScoreOut {
  ScoreOut { normalized: normalize(expr), score: complexity.score(expr) }
}

pub fn pools(store: &PuzzleStore) -> PoolsOut {
  PoolsOut { loaded: store.is_loaded(), source: store.loaded_from(), puzzles: store.len(), pools: store.pool_report() }
}
