//! Engine error types.
//!
//! Evaluation errors are user-input mistakes and are always surfaced to the caller.
//! Store errors are logged by the store and degrade to an empty index.
//! Play errors are request-level refusals from the session layer.

use std::path::PathBuf;

use thiserror::Error;

/// Why a submitted expression was rejected.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum EvalError {
  /// Anything outside literals, `+ - * / ^`, unary signs and parentheses.
  #[error("illegal expression: {0}")]
  IllegalExpression(String),
  #[error("division by zero")]
  DivisionByZero,
  #[error("power out of range: {base}^{exponent}")]
  PowerOverflow { base: f64, exponent: f64 },
  /// The literals do not match the dealt values one-for-one.
  #[error("must use each of {expected:?} exactly once (found {found:?})")]
  WrongOperands { expected: Vec<i64>, found: Vec<String> },
}

impl EvalError {
  /// Stable short code for API payloads.
  pub fn code(&self) -> &'static str {
    match self {
      EvalError::IllegalExpression(_) => "illegal_expression",
      EvalError::DivisionByZero => "division_by_zero",
      EvalError::PowerOverflow { .. } => "power_overflow",
      EvalError::WrongOperands { .. } => "wrong_operands",
    }
  }
}

#[derive(Debug, Error)]
pub enum StoreError {
  /// Neither the primary nor the fallback source produced a puzzle.
  #[error("no puzzle source produced any puzzles")]
  Unavailable,
  #[error("failed to read {path}: {source}")]
  Io {
    path: PathBuf,
    #[source]
    source: std::io::Error,
  },
  #[error("failed to parse {path}: {source}")]
  Json {
    path: PathBuf,
    #[source]
    source: serde_json::Error,
  },
}

/// Why a play request was refused.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum PlayError {
  #[error("no hand dealt and no values given")]
  NoHand,
  #[error("expected 4 values, got {0}")]
  ValueCount(usize),
  #[error("case #{0} not found")]
  CaseNotFound(i64),
  #[error("competition time is over")]
  CompetitionOver,
  #[error("help is disabled during a timed competition")]
  HelpDisabled,
  #[error("invalid case pool: {0}")]
  InvalidPool(&'static str),
  #[error("answer longer than {0} characters")]
  AnswerTooLong(usize),
}

impl PlayError {
  pub fn code(&self) -> &'static str {
    match self {
      PlayError::NoHand => "no_hand",
      PlayError::ValueCount(_) => "value_count",
      PlayError::CaseNotFound(_) => "case_not_found",
      PlayError::CompetitionOver => "competition_over",
      PlayError::HelpDisabled => "help_disabled",
      PlayError::InvalidPool(_) => "invalid_pool",
      PlayError::AnswerTooLong(_) => "answer_too_long",
    }
  }
}
