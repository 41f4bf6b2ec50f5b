//! WebSocket upgrade + message loop. Each client message is parsed as JSON and
//! forwarded to core logic. We reply with a single JSON message per request.

use std::sync::Arc;
use axum::{
  extract::{
    ws::{Message, WebSocket},
    State, WebSocketUpgrade,
  },
  response::IntoResponse,
};
use tracing::{info, error, instrument, debug};

use crate::error::PlayError;
use crate::protocol::{ClientWsMessage, ServerWsMessage};
use crate::logic;
use crate::state::AppState;

#[instrument(level = "info", skip(state))]
pub async fn ws_upgrade(ws: WebSocketUpgrade, State(state): State<Arc<AppState>>) -> impl IntoResponse {
  info!(target: "game24_backend", "WebSocket upgrade requested");
  ws.on_upgrade(move |socket| handle_ws(socket, state))
}

#[instrument(level = "info", skip(socket, state))]
async fn handle_ws(mut socket: WebSocket, state: Arc<AppState>) {
  info!(target: "game24_backend", "WebSocket connected");
  while let Some(Ok(msg)) = socket.recv().await {
    match msg {
      Message::Text(txt) => {
        let reply_msg = match serde_json::from_str::<ClientWsMessage>(&txt) {
          Ok(incoming) => {
            debug!(target: "game24_backend", "WS received: {:?}", &incoming);
            handle_client_ws(incoming, &state).await
          }
          Err(e) => ServerWsMessage::Error { code: "invalid_json", message: format!("Invalid JSON: {}", e) },
        };

        let out = serde_json::to_string(&reply_msg).unwrap_or_else(|e| {
          serde_json::json!({ "type": "error", "code": "serialization", "message": format!("Serialization error: {}", e) }).to_string()
        });

        if let Err(e) = socket.send(Message::Text(out)).await {
          error!(target: "game24_backend", error = %e, "WS send error");
          break;
        }
      }
      Message::Ping(payload) => { let _ = socket.send(Message::Pong(payload)).await; }
      Message::Close(_) => break,
      _ => {}
    }
  }
  info!(target: "game24_backend", "WebSocket disconnected");
}

/// Dispatch one parsed client message. Shared by the socket loop and tests.
#[instrument(level = "info", skip(state))]
pub async fn handle_client_ws(msg: ClientWsMessage, state: &AppState) -> ServerWsMessage {
  match msg {
    ClientWsMessage::Ping => ServerWsMessage::Pong,

    ClientWsMessage::Next(q) => match logic::deal_next(state, q).await {
      Ok(out) => {
        info!(target: "play", case_id = ?out.case_id, pool_done = out.pool_done, "WS hand served");
        ServerWsMessage::Puzzle(out)
      }
      Err(e) => error_msg(e),
    },

    ClientWsMessage::Check(body) => {
      let out = logic::check_answer(state, body).await;
      info!(target: "play", correct = out.correct, "WS check evaluated");
      ServerWsMessage::CheckResult(out)
    }

    ClientWsMessage::Help(body) => match logic::help(state, body).await {
      Ok(out) => ServerWsMessage::Help(out),
      Err(e) => error_msg(e),
    },

    ClientWsMessage::Skip(q) => ServerWsMessage::Skipped(logic::skip(state, q).await),

    ClientWsMessage::Solve(body) => match logic::solve(state, body) {
      Ok(out) => ServerWsMessage::Solved(out),
      Err(e) => error_msg(e),
    },

    ClientWsMessage::Stats(q) => ServerWsMessage::Stats(logic::stats(state, q).await),

    ClientWsMessage::StartPool(body) => match logic::start_pool(state, body).await {
      Ok(out) => ServerWsMessage::PoolStarted(out),
      Err(e) => error_msg(e),
    },

    ClientWsMessage::Report(q) => ServerWsMessage::Report(logic::report(state, q).await),
    ClientWsMessage::Restart(q) => ServerWsMessage::Restarted(logic::restart(state, q).await),
    ClientWsMessage::Exit(q) => ServerWsMessage::Exited(logic::exit(state, q).await),
  }
}

fn error_msg(e: PlayError) -> ServerWsMessage {
  ServerWsMessage::Error { code: e.code(), message: e.to_string() }
}
