//! HTTP endpoint handlers. These are thin wrappers that forward to core logic.
//! Each handler is instrumented and logs its parameters and basic result info.

use std::sync::Arc;
use axum::{extract::{State, Query}, http::StatusCode, Json, response::IntoResponse};
use tracing::{info, instrument, warn};

use crate::error::PlayError;
use crate::logic;
use crate::normalize::normalize;
use crate::protocol::*;
use crate::state::AppState;

fn play_error(e: PlayError) -> (StatusCode, Json<ErrorOut>) {
  let status = match e {
    PlayError::CompetitionOver | PlayError::HelpDisabled => StatusCode::FORBIDDEN,
    PlayError::CaseNotFound(_) => StatusCode::NOT_FOUND,
    _ => StatusCode::BAD_REQUEST,
  };
  (status, Json(ErrorOut::from(&e)))
}

#[instrument(level = "info", skip(state))]
pub async fn http_health(State(state): State<Arc<AppState>>) -> impl IntoResponse {
  Json(HealthOut { ok: state.store.is_loaded(), puzzles: state.store.len() })
}

#[instrument(level = "info", skip(state, q), fields(level = ?q.level, target = ?q.target))]
pub async fn http_get_next(
  State(state): State<Arc<AppState>>,
  Query(q): Query<NextQuery>,
) -> impl IntoResponse {
  match logic::deal_next(&state, q).await {
    Ok(out) => {
      info!(target: "play", case_id = ?out.case_id, pool_done = out.pool_done, "HTTP hand served");
      Json(out).into_response()
    }
    Err(e) => play_error(e).into_response(),
  }
}

#[instrument(level = "info", skip(state, body), fields(answer_len = body.answer.len()))]
pub async fn http_post_check(
  State(state): State<Arc<AppState>>,
  Json(body): Json<CheckIn>,
) -> impl IntoResponse {
  let out = logic::check_answer(&state, body).await;
  info!(target: "play", correct = out.correct, error = ?out.error, "HTTP check evaluated");
  Json(out)
}

#[instrument(level = "info", skip(state, body), fields(all = body.all))]
pub async fn http_post_help(
  State(state): State<Arc<AppState>>,
  Json(body): Json<HelpIn>,
) -> impl IntoResponse {
  match logic::help(&state, body).await {
    Ok(out) => Json(out).into_response(),
    Err(e) => play_error(e).into_response(),
  }
}

#[instrument(level = "info", skip(state, body))]
pub async fn http_post_skip(
  State(state): State<Arc<AppState>>,
  Json(body): Json<SessionQuery>,
) -> impl IntoResponse {
  Json(logic::skip(&state, body).await)
}

#[instrument(level = "info", skip(state, body), fields(values = ?body.values, target = ?body.target))]
pub async fn http_post_solve(
  State(state): State<Arc<AppState>>,
  Json(body): Json<SolveIn>,
) -> impl IntoResponse {
  match logic::solve(&state, body) {
    Ok(out) => {
      info!(target: "solver", count = out.solutions.len(), "HTTP solve served");
      Json(out).into_response()
    }
    Err(e) => play_error(e).into_response(),
  }
}

#[instrument(level = "info", skip(body), fields(expr_len = body.expr.len()))]
pub async fn http_post_normalize(Json(body): Json<ExprIn>) -> impl IntoResponse {
  Json(NormalizeOut { normalized: normalize(&body.expr) })
}

#[instrument(level = "info", skip(state, body), fields(expr_len = body.expr.len()))]
pub async fn http_post_score(
  State(state): State<Arc<AppState>>,
  Json(body): Json<ExprIn>,
) -> impl IntoResponse {
  Json(logic::score(&state.config.complexity, &body.expr))
}

#[instrument(level = "info", skip(state, q))]
pub async fn http_get_stats(
  State(state): State<Arc<AppState>>,
  Query(q): Query<SessionQuery>,
) -> impl IntoResponse {
  Json(logic::stats(&state, q).await)
}

#[instrument(level = "info", skip(state, body), fields(mode = ?body.mode, cases = body.case_ids.len()))]
pub async fn http_post_session_pool(
  State(state): State<Arc<AppState>>,
  Json(body): Json<PoolIn>,
) -> impl IntoResponse {
  match logic::start_pool(&state, body).await {
    Ok(out) => Json(out).into_response(),
    Err(e) => play_error(e).into_response(),
  }
}

#[instrument(level = "info", skip(state, q))]
pub async fn http_get_session_report(
  State(state): State<Arc<AppState>>,
  Query(q): Query<SessionQuery>,
) -> impl IntoResponse {
  Json(logic::report(&state, q).await)
}

#[instrument(level = "info", skip(state, body))]
pub async fn http_post_session_restart(
  State(state): State<Arc<AppState>>,
  Json(body): Json<SessionQuery>,
) -> impl IntoResponse {
  Json(logic::restart(&state, body).await)
}

#[instrument(level = "info", skip(state, body))]
pub async fn http_post_session_exit(
  State(state): State<Arc<AppState>>,
  Json(body): Json<SessionQuery>,
) -> impl IntoResponse {
  Json(logic::exit(&state, body).await)
}

#[instrument(level = "info", skip(state))]
pub async fn http_get_pools(State(state): State<Arc<AppState>>) -> impl IntoResponse {
  Json(logic::pools(&state.store))
}

#[instrument(level = "info", skip(state))]
pub async fn http_post_rebuild(State(state): State<Arc<AppState>>) -> impl IntoResponse {
  match state.reload(true).await {
    Some(report) => {
      info!(target: "puzzle_store", puzzles = report.puzzles, "HTTP rebuild finished");
      Json(logic::pools(&state.store)).into_response()
    }
    None => {
      warn!(target: "puzzle_store", "HTTP rebuild left the store empty");
      (StatusCode::SERVICE_UNAVAILABLE, Json(ErrorOut { code: "unavailable", error: "no puzzles available".into() })).into_response()
    }
  }
}
