use std::sync::Arc;

use axum::extract::ws::{Message, WebSocket, WebSocketUpgrade};
use axum::extract::State;
use axum::http::{HeaderMap, StatusCode};
use axum::response::IntoResponse;
use futures_util::{SinkExt, StreamExt};
use platen_core::Error;
use sea_orm::TransactionTrait;
use tokio::sync::mpsc;
use tracing::Instrument;
use uuid::Uuid;

use crate::bus::{ClientEvent, PrinterConnection, PrinterEvent};
use crate::error::json_error;
use crate::identity;
use crate::repo::{self, map_db_err};
use crate::state::AppState;
use crate::ws::frames::{PrinterFrame, PrinterInbound};

/// `GET /ws/printer` — the printers audience. The connection is
/// authenticated once here; afterwards every inbound frame must echo the
/// session key or the socket is dropped.
pub async fn printer_ws(
    State(state): State<AppState>,
    ws: WebSocketUpgrade,
    headers: HeaderMap,
) -> impl IntoResponse {
    let printer = match identity::authenticate_printer(&state.identity, &state.db, &headers).await
    {
        Ok(p) => p,
        Err(platen_core::Error::Auth(err)) => {
            return json_error(StatusCode::UNAUTHORIZED, err.to_string());
        }
        Err(err) => {
            tracing::error!(%err, "printer lookup failed");
            return json_error(StatusCode::INTERNAL_SERVER_ERROR, "internal server error");
        }
    };

    let printer_id = printer.id;
    ws.on_upgrade(move |socket| handle_printer_socket(state, socket, printer_id))
        .into_response()
}

async fn handle_printer_socket(state: AppState, socket: WebSocket, printer_id: Uuid) {
    let session_key = Uuid::new_v4();
    let span = tracing::info_span!("printer_ws", %printer_id, %session_key);
    async move {
        let (mut sender, mut receiver) = socket.split();
        let (tx, mut rx) = mpsc::channel::<Message>(64);

        let conn = Arc::new(PrinterConnection {
            printer_id,
            session_key,
            tx,
        });

        // A reconnect supersedes the previous session; tell the old socket
        // to go away before the new one is live.
        if let Some(old) = state.bus.hub().insert(conn.clone()).await {
            tracing::info!(old_session = %old.session_key, "superseding previous session");
            let _ = old.tx.send(Message::Close(None)).await;
        }

        if let Err(err) = persist_session(&state, printer_id, session_key).await {
            tracing::error!(%err, "failed to persist session");
            state.bus.hub().remove(printer_id, session_key).await;
            return;
        }

        let writer = tokio::spawn(async move {
            while let Some(msg) = rx.recv().await {
                if sender.send(msg).await.is_err() {
                    break;
                }
            }
        });

        let connected = PrinterEvent::Connected { session_key };
        if let Ok(text) = serde_json::to_string(&connected) {
            let _ = conn.tx.send(Message::Text(text)).await;
        }
        tracing::info!("printer connected");

        while let Some(msg) = receiver.next().await {
            let Ok(msg) = msg else { break };
            match msg {
                Message::Text(text) => {
                    let frame = match serde_json::from_str::<PrinterFrame>(&text) {
                        Ok(frame) => frame,
                        Err(err) => {
                            tracing::warn!(%err, "malformed printer frame, disconnecting");
                            break;
                        }
                    };
                    if frame.key != session_key {
                        tracing::warn!("session key mismatch, disconnecting");
                        break;
                    }

                    let deadline = state.cfg.write_timeout;
                    match tokio::time::timeout(
                        deadline,
                        handle_event(&state, printer_id, frame.event),
                    )
                    .await
                    {
                        Ok(Ok(())) => {}
                        Ok(Err(err)) => {
                            tracing::warn!(%err, "printer event rejected");
                        }
                        Err(_) => {
                            tracing::warn!("printer event handler exceeded deadline, abandoned");
                        }
                    }
                }
                Message::Close(_) => break,
                _ => {}
            }
        }

        state.bus.hub().remove(printer_id, session_key).await;
        if let Err(err) = state
            .dispatcher
            .on_printer_disconnected(printer_id, session_key)
            .await
        {
            tracing::error!(%err, "disconnect handling failed");
        }
        writer.abort();
    }
    .instrument(span)
    .await
}

async fn persist_session(
    state: &AppState,
    printer_id: Uuid,
    session_key: Uuid,
) -> Result<(), Error> {
    let txn = state.db.begin().await.map_err(map_db_err)?;
    let printer = repo::printers::get(&txn, printer_id).await?;
    repo::printers::set_session(&txn, printer, Some(session_key), None).await?;
    txn.commit().await.map_err(map_db_err)?;
    state
        .bus
        .emit_clients(ClientEvent::PrinterDataUpdated { printer_id });
    Ok(())
}

/// Translate one authenticated inbound event into dispatcher calls.
async fn handle_event(
    state: &AppState,
    printer_id: Uuid,
    event: PrinterInbound,
) -> Result<(), Error> {
    match event {
        PrinterInbound::InitialData(data) => {
            state
                .dispatcher
                .on_printer_initial_data(printer_id, data.state, &data.extruders_info)
                .await
        }
        PrinterInbound::StateUpdated { state: new_state } => {
            state
                .dispatcher
                .on_printer_state_changed(printer_id, new_state)
                .await
        }
        PrinterInbound::ExtrudersUpdated { extruders_info } => {
            state
                .dispatcher
                .on_printer_extruders_changed(printer_id, &extruders_info)
                .await
        }
        PrinterInbound::PrintStarted { job_id } => {
            state.dispatcher.on_print_started(printer_id, job_id).await
        }
        PrinterInbound::PrintFinished { job_id, cancelled } => {
            state
                .dispatcher
                .on_print_finished(printer_id, job_id, cancelled)
                .await
        }
        PrinterInbound::PrintFeedback { job_id, feedback } => {
            state
                .dispatcher
                .on_print_feedback(printer_id, job_id, feedback)
                .await
        }
        PrinterInbound::TemperaturesUpdated {
            bed_temp,
            extruders_temp,
        } => {
            // Telemetry only; nothing is persisted.
            state
                .bus
                .emit_clients(ClientEvent::PrinterTemperaturesUpdated {
                    printer_id,
                    bed_temp,
                    extruders_temp,
                });
            Ok(())
        }
        PrinterInbound::JobProgressUpdated {
            id,
            progress,
            estimated_seconds_left,
        } => {
            state
                .dispatcher
                .on_job_progress(printer_id, id, progress, estimated_seconds_left)
                .await
        }
    }
}
