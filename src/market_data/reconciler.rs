use tokio::sync::mpsc;
use tracing::{debug, info, warn};

use crate::alerts::policy::{AlertDecision, NotificationPolicy};
use crate::alerts::traits::{AlertSink, PriceAlert};
use crate::market_data::types::MarketEvent;
use crate::metrics::prometheus::{record_alert, record_push, set_tracked_assets};
use crate::state::asset_table::PushOutcome;
use crate::state::dashboard::DashboardHandle;

const DEFAULT_SNAPSHOT_ERROR: &str = "Failed to fetch crypto data";

/// Sole writer of the dashboard state. Snapshots, pushes, connection
/// changes and retracks are applied strictly in arrival order.
pub struct Reconciler {
    state: DashboardHandle,
    policy: NotificationPolicy,
    sinks: Vec<Box<dyn AlertSink>>,
}

impl Reconciler {
    pub fn new(
        state: DashboardHandle,
        policy: NotificationPolicy,
        sinks: Vec<Box<dyn AlertSink>>,
    ) -> Self {
        Self {
            state,
            policy,
            sinks,
        }
    }

    pub async fn handle(&mut self, event: MarketEvent) {
        let alert = self.apply(event).await;

        // Sinks run after the write lock is released.
        if let Some(alert) = alert {
            record_alert(&alert.asset_id, "fired");
            for sink in &self.sinks {
                debug!(sink = sink.name(), asset = %alert.asset_id, "delivering alert");
                sink.deliver(&alert);
            }
        }
    }

    async fn apply(&mut self, event: MarketEvent) -> Option<PriceAlert> {
        let mut state = self.state.write().await;

        match event {
            MarketEvent::Snapshot(quotes) => {
                let received = quotes.len();
                let stored = state.assets.apply_snapshot(quotes);
                state.last_error = None;
                debug!(received, stored, "snapshot applied");
                None
            }
            MarketEvent::SnapshotFailed(message) => {
                let message = if message.trim().is_empty() {
                    DEFAULT_SNAPSHOT_ERROR.to_string()
                } else {
                    message
                };
                warn!(error = %message, "keeping previous records after snapshot failure");
                state.last_error = Some(message);
                None
            }
            MarketEvent::Push { id, price } => match state.assets.apply_push(&id, price) {
                PushOutcome::UnknownAsset => {
                    record_push("unknown");
                    debug!(%id, "push for asset without a snapshot record");
                    None
                }
                PushOutcome::ZeroBaseline { new_price } => {
                    record_push("zero_baseline");
                    debug!(%id, new_price, "stored price was zero, percent change skipped");
                    None
                }
                PushOutcome::Applied {
                    old_price,
                    new_price,
                    delta_pct,
                } => {
                    record_push("applied");
                    debug!(%id, old_price, new_price, delta_pct, "push applied");

                    let name = state
                        .assets
                        .get(&id)
                        .map(|r| r.display_name.clone())
                        .unwrap_or_else(|| id.clone());

                    match self.policy.evaluate(&id, &name, new_price, delta_pct) {
                        AlertDecision::Fire(alert) => Some(alert),
                        AlertDecision::Deduped => {
                            record_alert(&id, "deduped");
                            debug!(%id, delta_pct, "alert suppressed by dedupe window");
                            None
                        }
                        AlertDecision::BelowThreshold => None,
                    }
                }
            },
            MarketEvent::Connection(feed) => {
                if state.feed != feed {
                    info!(from = state.feed.as_str(), to = feed.as_str(), "price stream state");
                }
                state.feed = feed;
                None
            }
            MarketEvent::Retrack(ids) => {
                let removed = state.assets.retrack(ids);
                for id in &removed {
                    self.policy.forget(id);
                }
                let tracked = state.assets.tracked_ids();
                set_tracked_assets(tracked.len());
                info!(?tracked, ?removed, "tracked assets changed");
                None
            }
        }
    }
}

pub async fn run_reconciler(
    mut rx: mpsc::Receiver<MarketEvent>,
    mut reconciler: Reconciler,
) -> anyhow::Result<()> {
    info!("reconciler started");

    while let Some(event) = rx.recv().await {
        reconciler.handle(event).await;
    }

    info!("event channel closed, reconciler shutting down");
    Ok(())
}
