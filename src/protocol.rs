//! Public protocol structs for WebSocket and HTTP endpoints (serde ready).
//! Keep this small and stable to evolve backend and frontend independently.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::domain::{Level, PoolName, Puzzle};
use crate::error::PlayError;
use crate::session::{CaseStatus, PlayStats, PoolMode};
use crate::source::SourceKind;
use crate::util::rank_code;

/// Messages the client can send over WebSocket.
#[derive(Debug, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ClientWsMessage {
    Ping,
    Next(NextQuery),
    Check(CheckIn),
    Help(HelpIn),
    Skip(SessionQuery),
    Solve(SolveIn),
    Stats(SessionQuery),
    StartPool(PoolIn),
    Report(SessionQuery),
    Restart(SessionQuery),
    Exit(SessionQuery),
}

/// Messages the server sends back over WebSocket.
#[derive(Debug, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ServerWsMessage {
    Pong,
    Puzzle(DealOut),
    CheckResult(CheckOut),
    Help(HelpOut),
    Skipped(StatsOut),
    Solved(SolveOut),
    Stats(StatsOut),
    PoolStarted(PoolStartOut),
    Report(SessionReport),
    Restarted(RestartOut),
    Exited(SessionReport),
    Error { code: &'static str, message: String },
}

/// A card as shown to the player.
#[derive(Debug, Clone, Serialize)]
pub struct CardOut {
    pub value: i64,
    pub code: String,
}

pub fn cards_out(cards: &[i64]) -> Vec<CardOut> {
    cards.iter().map(|v| CardOut { value: *v, code: rank_code(*v) }).collect()
}

//
// Requests
//

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NextQuery {
    #[serde(default)]
    pub session_id: Option<String>,
    #[serde(default)]
    pub level: Option<String>,
    #[serde(default)]
    pub target: Option<i64>,
    /// Deal this exact case instead of drawing.
    #[serde(default)]
    pub case_id: Option<i64>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionQuery {
    #[serde(default)]
    pub session_id: Option<String>,
}

/// When `values`/`target` are omitted, the session's current hand is used.
#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CheckIn {
    #[serde(default)]
    pub session_id: Option<String>,
    #[serde(default)]
    pub case_id: Option<i64>,
    #[serde(default)]
    pub values: Option<Vec<i64>>,
    #[serde(default)]
    pub target: Option<i64>,
    pub answer: String,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HelpIn {
    #[serde(default)]
    pub session_id: Option<String>,
    #[serde(default)]
    pub case_id: Option<i64>,
    #[serde(default)]
    pub values: Option<Vec<i64>>,
    #[serde(default)]
    pub target: Option<i64>,
    #[serde(default)]
    pub all: bool,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SolveIn {
    pub values: Vec<i64>,
    pub target: Option<i64>,
    /// Absent: one solution. Present: up to this many.
    #[serde(default)]
    pub limit: Option<usize>,
}

/// Assign a custom practice set or a competition to a session.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PoolIn {
    #[serde(default)]
    pub session_id: Option<String>,
    pub mode: PoolMode,
    pub case_ids: Vec<i64>,
    /// Competition length; zero or absent means untimed.
    #[serde(default)]
    pub duration_sec: Option<u64>,
}

#[derive(Debug, Deserialize)]
pub struct ExprIn {
    pub expr: String,
}

//
// Responses
//

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DealOut {
    pub session_id: String,
    pub case_id: Option<i64>,
    pub cards: Vec<CardOut>,
    pub level: Option<Level>,
    pub requested: String,
    pub target: i64,
    /// No fresh puzzle was left for this session at the requested difficulty,
    /// or every case of an assigned pool has been dealt.
    pub pool_done: bool,
    pub help_disabled: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub time_left: Option<u64>,
    /// Assigned cases not yet answered correctly; only sent once the pool is done.
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub unfinished: Vec<i64>,
}

impl DealOut {
    pub fn new(session_id: String, puzzle: Option<&Puzzle>, requested: &str, target: i64, pool_done: bool) -> Self {
        Self {
            session_id,
            case_id: puzzle.map(|p| p.case_id),
            cards: puzzle.map(|p| cards_out(&p.cards)).unwrap_or_default(),
            level: puzzle.and_then(|p| p.level),
            requested: requested.to_string(),
            target,
            pool_done,
            help_disabled: false,
            time_left: None,
            unfinished: Vec::new(),
        }
    }
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CheckOut {
    pub session_id: String,
    pub correct: bool,
    pub value: Option<f64>,
    pub target: i64,
    /// Short machine code for rejections (e.g. `wrong_operands`).
    pub error: Option<&'static str>,
    pub reason: String,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct HelpOut {
    pub session_id: String,
    pub target: i64,
    pub has_solution: bool,
    pub solutions: Vec<String>,
    /// "store" for cached 24 solutions, "solver" otherwise.
    pub source: &'static str,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SolveOut {
    pub values: Vec<i64>,
    pub target: i64,
    pub solutions: Vec<String>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct StatsOut {
    pub session_id: String,
    pub stats: PlayStats,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PoolStartOut {
    pub session_id: String,
    pub mode: PoolMode,
    pub pool_len: usize,
    pub stats_reset: bool,
    pub help_disabled: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub time_left: Option<u64>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CaseReportRow {
    pub case_id: i64,
    pub level: Option<Level>,
    pub status: CaseStatus,
    pub attempts: u32,
}

/// Session summary: counters plus, when a pool is assigned, per-case progress.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionReport {
    pub session_id: String,
    pub stats: PlayStats,
    pub pool_mode: Option<PoolMode>,
    pub pool_len: usize,
    pub pool_score: BTreeMap<i64, u8>,
    pub unfinished: Vec<i64>,
    pub pool_report: Vec<CaseReportRow>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RestartOut {
    pub session_id: String,
}

#[derive(Debug, Serialize)]
pub struct NormalizeOut {
    pub normalized: String,
}

#[derive(Debug, Serialize)]
pub struct ScoreOut {
    pub normalized: String,
    pub score: u32,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PoolsOut {
    pub loaded: bool,
    pub source: Option<SourceKind>,
    pub puzzles: usize,
    pub pools: BTreeMap<PoolName, usize>,
}

#[derive(Debug, Serialize)]
pub struct ErrorOut {
    pub code: &'static str,
    pub error: String,
}

impl From<&PlayError> for ErrorOut {
    fn from(e: &PlayError) -> Self {
        Self { code: e.code(), error: e.to_string() }
    }
}

#[derive(Serialize)]
pub struct HealthOut {
    pub ok: bool,
    pub puzzles: usize,
}
