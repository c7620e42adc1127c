use std::sync::Arc;
use std::time::Duration;

use crate::dispatcher::Dispatcher;

/// Periodic healer for missed wakeups: re-runs `try_assign` on every Ready,
/// idle printer. The dispatcher is event-driven; this only papers over a
/// lost notification, so the interval is coarse (floor 60 s).
pub struct Watchdog {
    dispatcher: Arc<Dispatcher>,
    interval: Duration,
}

impl Watchdog {
    pub fn new(dispatcher: Arc<Dispatcher>, interval: Duration) -> Watchdog {
        Watchdog {
            dispatcher,
            interval: interval.max(Duration::from_secs(60)),
        }
    }

    pub fn spawn(self) {
        tokio::spawn(async move {
            loop {
                tokio::time::sleep(self.interval).await;
                self.tick().await;
            }
        });
    }

    async fn tick(&self) {
        let printers = match self.dispatcher.ready_idle_printers().await {
            Ok(p) => p,
            Err(err) => {
                tracing::warn!(%err, "watchdog: listing printers failed");
                return;
            }
        };
        for printer_id in printers {
            match self.dispatcher.try_assign(printer_id).await {
                Ok(Some(job_id)) => {
                    tracing::info!(%printer_id, %job_id, "watchdog healed a missed assignment");
                }
                Ok(None) => {}
                Err(err) => {
                    tracing::warn!(%err, %printer_id, "watchdog: try_assign failed");
                }
            }
        }
    }
}
