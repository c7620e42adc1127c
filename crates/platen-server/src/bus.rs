use std::collections::HashMap;
use std::sync::Arc;

use axum::extract::ws::Message;
use chrono::{DateTime, Utc};
use serde::Serialize;
use tokio::sync::{RwLock, broadcast, mpsc};
use uuid::Uuid;

/// Broadcast events for the `clients` audience. Serde's external tagging
/// produces the wire shape `{"<event_name>": {...payload}}`.
#[derive(Debug, Clone, Serialize)]
pub enum ClientEvent {
    #[serde(rename = "jobs_updated")]
    JobsUpdated {},
    #[serde(rename = "job_analyze_done")]
    JobAnalyzeDone { job_id: Uuid },
    #[serde(rename = "job_analyze_error")]
    JobAnalyzeError { job_id: Uuid, message: String },
    #[serde(rename = "job_enqueue_done")]
    JobEnqueueDone { job_id: Uuid },
    #[serde(rename = "job_enqueue_error")]
    JobEnqueueError { job_id: Uuid, message: String },
    #[serde(rename = "printer_data_updated")]
    PrinterDataUpdated { printer_id: Uuid },
    #[serde(rename = "printer_temperatures_updated")]
    PrinterTemperaturesUpdated {
        printer_id: Uuid,
        bed_temp: f64,
        extruders_temp: Vec<f64>,
    },
    #[serde(rename = "job_progress_updated")]
    JobProgressUpdated {
        id: Uuid,
        progress: f64,
        #[serde(skip_serializing_if = "Option::is_none")]
        estimated_seconds_left: Option<f64>,
    },
}

/// Point-to-point events for a single printer.
#[derive(Debug, Clone, Serialize)]
pub enum PrinterEvent {
    #[serde(rename = "connected")]
    Connected { session_key: Uuid },
    #[serde(rename = "print_job")]
    PrintJob { id: Uuid, name: String, file_id: Uuid },
    #[serde(rename = "job_recovered")]
    JobRecovered {
        id: Uuid,
        name: String,
        started_at: Option<DateTime<Utc>>,
        interrupted: bool,
    },
}

/// One live printer socket. `tx` feeds the socket's writer task; dropping
/// the connection closes it.
#[derive(Debug)]
pub struct PrinterConnection {
    pub printer_id: Uuid,
    pub session_key: Uuid,
    pub tx: mpsc::Sender<Message>,
}

/// Registry of connected printers, one connection per printer id. A new
/// session supersedes the previous one; the superseded socket is told to
/// close.
#[derive(Clone, Default)]
pub struct PrinterHub {
    inner: Arc<RwLock<HashMap<Uuid, Arc<PrinterConnection>>>>,
}

impl PrinterHub {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn get(&self, printer_id: Uuid) -> Option<Arc<PrinterConnection>> {
        self.inner.read().await.get(&printer_id).cloned()
    }

    pub async fn connected_printers(&self) -> Vec<Uuid> {
        self.inner.read().await.keys().copied().collect()
    }

    /// Register a connection, returning the superseded one if any.
    pub async fn insert(&self, conn: Arc<PrinterConnection>) -> Option<Arc<PrinterConnection>> {
        self.inner.write().await.insert(conn.printer_id, conn)
    }

    /// Remove the connection for `printer_id`, but only if it still belongs
    /// to `session_key`. A superseded socket tearing down must not evict
    /// its successor.
    pub async fn remove(&self, printer_id: Uuid, session_key: Uuid) -> bool {
        let mut map = self.inner.write().await;
        match map.get(&printer_id) {
            Some(conn) if conn.session_key == session_key => {
                map.remove(&printer_id);
                true
            }
            _ => false,
        }
    }
}

/// In-process event bus: broadcast fan-out to operator clients plus
/// point-to-point delivery to printers. Emission never blocks a committed
/// transition; a dead receiver is logged and skipped.
#[derive(Clone)]
pub struct EventBus {
    clients: broadcast::Sender<ClientEvent>,
    hub: PrinterHub,
}

impl EventBus {
    pub fn new() -> Self {
        let (clients, _) = broadcast::channel(256);
        EventBus {
            clients,
            hub: PrinterHub::new(),
        }
    }

    pub fn hub(&self) -> &PrinterHub {
        &self.hub
    }

    pub fn subscribe_clients(&self) -> broadcast::Receiver<ClientEvent> {
        self.clients.subscribe()
    }

    pub fn emit_clients(&self, event: ClientEvent) {
        // Err means no client is connected right now; that is fine.
        let _ = self.clients.send(event);
    }

    /// Returns false if the printer has no live session or its send queue
    /// is gone.
    pub async fn emit_printer(&self, printer_id: Uuid, event: &PrinterEvent) -> bool {
        let Some(conn) = self.hub.get(printer_id).await else {
            tracing::debug!(%printer_id, "emit_printer: no live session");
            return false;
        };
        let text = match serde_json::to_string(event) {
            Ok(t) => t,
            Err(err) => {
                tracing::error!(%err, "failed to encode printer event");
                return false;
            }
        };
        if conn.tx.send(Message::Text(text)).await.is_err() {
            tracing::warn!(%printer_id, "emit_printer: connection closed mid-send");
            return false;
        }
        true
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn client_events_are_keyed_by_event_name() {
        let v = serde_json::to_value(ClientEvent::JobsUpdated {}).unwrap();
        assert_eq!(v, serde_json::json!({"jobs_updated": {}}));

        let id = Uuid::new_v4();
        let v = serde_json::to_value(ClientEvent::JobProgressUpdated {
            id,
            progress: 42.5,
            estimated_seconds_left: None,
        })
        .unwrap();
        assert_eq!(
            v,
            serde_json::json!({"job_progress_updated": {"id": id, "progress": 42.5}})
        );
    }

    #[test]
    fn print_job_event_shape() {
        let id = Uuid::new_v4();
        let file_id = Uuid::new_v4();
        let v = serde_json::to_value(PrinterEvent::PrintJob {
            id,
            name: "benchy".to_string(),
            file_id,
        })
        .unwrap();
        assert_eq!(
            v,
            serde_json::json!({"print_job": {"id": id, "name": "benchy", "file_id": file_id}})
        );
    }

    #[tokio::test]
    async fn broadcast_reaches_subscribers() {
        let bus = EventBus::new();
        let mut rx = bus.subscribe_clients();
        bus.emit_clients(ClientEvent::JobsUpdated {});
        let got = rx.recv().await.unwrap();
        assert!(matches!(got, ClientEvent::JobsUpdated {}));
    }

    #[tokio::test]
    async fn new_session_supersedes_previous() {
        let hub = PrinterHub::new();
        let printer_id = Uuid::new_v4();
        let (tx1, _rx1) = mpsc::channel(4);
        let (tx2, _rx2) = mpsc::channel(4);
        let first = Arc::new(PrinterConnection {
            printer_id,
            session_key: Uuid::new_v4(),
            tx: tx1,
        });
        let second = Arc::new(PrinterConnection {
            printer_id,
            session_key: Uuid::new_v4(),
            tx: tx2,
        });

        assert!(hub.insert(first.clone()).await.is_none());
        let superseded = hub.insert(second.clone()).await.unwrap();
        assert_eq!(superseded.session_key, first.session_key);

        // The old session's teardown must not evict the new one.
        assert!(!hub.remove(printer_id, first.session_key).await);
        assert!(hub.get(printer_id).await.is_some());
        assert!(hub.remove(printer_id, second.session_key).await);
        assert!(hub.get(printer_id).await.is_none());
    }
}
