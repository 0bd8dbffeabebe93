pub mod policy;
pub mod traits;

use tokio::sync::broadcast;
use tracing::{info, warn};
use traits::{AlertSink, PriceAlert};

/// Writes every alert to the log.
pub struct LogSink;

impl AlertSink for LogSink {
    fn name(&self) -> &'static str {
        "log"
    }

    fn deliver(&self, alert: &PriceAlert) {
        info!(
            asset = %alert.asset_id,
            price = alert.price,
            delta_pct = alert.delta_pct,
            direction = ?alert.direction,
            "PRICE ALERT"
        );
    }
}

/// Fans alerts out to toast subscribers. Lagging or absent
/// subscribers never hold up delivery.
#[derive(Clone)]
pub struct ToastSink {
    tx: broadcast::Sender<PriceAlert>,
}

impl ToastSink {
    pub fn new(capacity: usize) -> Self {
        let (tx, _) = broadcast::channel(capacity);
        Self { tx }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<PriceAlert> {
        self.tx.subscribe()
    }
}

impl AlertSink for ToastSink {
    fn name(&self) -> &'static str {
        "toast"
    }

    fn deliver(&self, alert: &PriceAlert) {
        // Err only means nobody is subscribed right now.
        let _ = self.tx.send(alert.clone());
    }
}

/// Prints toasts as they arrive.
/// Stand-in for the presentation layer when running headless.
pub async fn run_toast_printer(mut rx: broadcast::Receiver<PriceAlert>) {
    loop {
        match rx.recv().await {
            Ok(alert) => info!(toast = %alert, "toast"),
            Err(broadcast::error::RecvError::Lagged(skipped)) => {
                warn!(skipped, "toast printer lagged behind alerts");
            }
            Err(broadcast::error::RecvError::Closed) => break,
        }
    }

    info!("alert channel closed, toast printer shutting down");
}
