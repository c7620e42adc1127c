use axum::extract::State;
use axum::extract::ws::{Message, WebSocket, WebSocketUpgrade};
use axum::http::{HeaderMap, StatusCode};
use axum::response::IntoResponse;
use futures_util::{SinkExt, StreamExt};
use serde::Serialize;
use tracing::Instrument;
use uuid::Uuid;

use crate::analysis;
use crate::bus::ClientEvent;
use crate::error::json_error;
use crate::identity::Principal;
use crate::state::AppState;
use crate::ws::frames::{ClientFrame, ClientInbound};

#[derive(Debug, Serialize)]
struct ConnectedFrame {
    connected: ConnectedPayload,
}

#[derive(Debug, Serialize)]
struct ConnectedPayload {
    session_key: Uuid,
}

#[derive(Debug, Serialize)]
struct ErrorFrame {
    error: ErrorPayload,
}

#[derive(Debug, Serialize)]
struct ErrorPayload {
    message: String,
}

/// `GET /ws/client` — the operator-UI audience. Broadcast events are
/// forwarded as-is; the only inbound events are `analyze_job` and
/// `enqueue_job`.
pub async fn client_ws(
    State(state): State<AppState>,
    ws: WebSocketUpgrade,
    headers: HeaderMap,
) -> impl IntoResponse {
    let principal = match state.identity.authenticate(&headers).await {
        Ok(p) => p,
        Err(err) => return json_error(StatusCode::UNAUTHORIZED, err.to_string()),
    };
    let Principal::User { .. } = principal else {
        return json_error(StatusCode::UNAUTHORIZED, "user identity required");
    };

    ws.on_upgrade(move |socket| handle_client_socket(state, socket))
        .into_response()
}

async fn handle_client_socket(state: AppState, socket: WebSocket) {
    let session_key = Uuid::new_v4();
    let span = tracing::debug_span!("client_ws", %session_key);
    async move {
        let (mut sender, mut receiver) = socket.split();
        let mut events = state.bus.subscribe_clients();

        let hello = ConnectedFrame {
            connected: ConnectedPayload { session_key },
        };
        if let Ok(text) = serde_json::to_string(&hello) {
            if sender.send(Message::Text(text)).await.is_err() {
                return;
            }
        }

        loop {
            tokio::select! {
                event = events.recv() => {
                    match event {
                        Ok(event) => {
                            let Ok(text) = serde_json::to_string(&event) else { continue };
                            if sender.send(Message::Text(text)).await.is_err() {
                                break;
                            }
                        }
                        Err(tokio::sync::broadcast::error::RecvError::Lagged(skipped)) => {
                            tracing::debug!(skipped, "client fell behind the event stream");
                        }
                        Err(tokio::sync::broadcast::error::RecvError::Closed) => break,
                    }
                }
                msg = receiver.next() => {
                    let Some(Ok(msg)) = msg else { break };
                    match msg {
                        Message::Text(text) => {
                            match serde_json::from_str::<ClientFrame>(&text) {
                                Ok(frame) if frame.key == session_key => {
                                    handle_event(&state, frame.event).await;
                                }
                                Ok(_) => {
                                    tracing::warn!("client session key mismatch, disconnecting");
                                    break;
                                }
                                Err(err) => {
                                    let reply = ErrorFrame {
                                        error: ErrorPayload {
                                            message: format!("invalid frame: {err}"),
                                        },
                                    };
                                    if let Ok(text) = serde_json::to_string(&reply) {
                                        let _ = sender.send(Message::Text(text)).await;
                                    }
                                }
                            }
                        }
                        Message::Close(_) => break,
                        _ => {}
                    }
                }
            }
        }
    }
    .instrument(span)
    .await
}

/// Inbound client commands run with the connection's write deadline; the
/// outcome goes out as a `*_done` / `*_error` broadcast so every UI stays
/// in sync.
async fn handle_event(state: &AppState, event: ClientInbound) {
    let deadline = state.cfg.write_timeout;
    match event {
        ClientInbound::AnalyzeJob { job_id } => {
            let result = tokio::time::timeout(
                deadline,
                analysis::analyze_job(&state.db, &state.store, &state.analyzer, job_id),
            )
            .await;
            match result {
                Ok(Ok(_)) => {
                    state.bus.emit_clients(ClientEvent::JobAnalyzeDone { job_id });
                    state.bus.emit_clients(ClientEvent::JobsUpdated {});
                }
                Ok(Err(err)) => {
                    state.bus.emit_clients(ClientEvent::JobAnalyzeError {
                        job_id,
                        message: err.to_string(),
                    });
                }
                Err(_) => {
                    state.bus.emit_clients(ClientEvent::JobAnalyzeError {
                        job_id,
                        message: "analysis timed out".to_string(),
                    });
                }
            }
        }
        ClientInbound::EnqueueJob { job_id } => {
            let result =
                tokio::time::timeout(deadline, state.dispatcher.enqueue_job(job_id)).await;
            match result {
                Ok(Ok(_)) => {
                    state.bus.emit_clients(ClientEvent::JobEnqueueDone { job_id });
                }
                Ok(Err(err)) => {
                    state.bus.emit_clients(ClientEvent::JobEnqueueError {
                        job_id,
                        message: err.to_string(),
                    });
                }
                Err(_) => {
                    state.bus.emit_clients(ClientEvent::JobEnqueueError {
                        job_id,
                        message: "enqueue timed out".to_string(),
                    });
                }
            }
        }
    }
}
