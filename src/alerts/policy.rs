use super::traits::PriceAlert;
use std::collections::HashMap;
use std::time::{Duration, Instant};

/// Decides whether a recomputed percent change deserves an alert.
///
/// Default behaviour alerts on every push whose move is at least
/// `threshold_pct`, repeated or not. An optional dedupe window adds
/// per-asset suppression on top of that (off unless configured).
#[derive(Debug)]
pub struct NotificationPolicy {
    threshold_pct: f64,
    dedupe_window: Option<Duration>,
    /// asset id -> (last alerted price, when)
    last_alerted: HashMap<String, (f64, Instant)>,
}

#[derive(Debug, Clone, PartialEq)]
pub enum AlertDecision {
    BelowThreshold,
    /// Same move already alerted inside the dedupe window.
    Deduped,
    Fire(PriceAlert),
}

impl NotificationPolicy {
    pub fn new(threshold_pct: f64, dedupe_window: Option<Duration>) -> Self {
        Self {
            threshold_pct,
            dedupe_window,
            last_alerted: HashMap::new(),
        }
    }

    pub fn threshold_pct(&self) -> f64 {
        self.threshold_pct
    }

    pub fn is_significant(&self, delta_pct: f64) -> bool {
        delta_pct.abs() >= self.threshold_pct
    }

    pub fn evaluate(
        &mut self,
        asset_id: &str,
        asset_name: &str,
        price: f64,
        delta_pct: f64,
    ) -> AlertDecision {
        self.evaluate_at(asset_id, asset_name, price, delta_pct, Instant::now())
    }

    pub fn evaluate_at(
        &mut self,
        asset_id: &str,
        asset_name: &str,
        price: f64,
        delta_pct: f64,
        now: Instant,
    ) -> AlertDecision {
        if !self.is_significant(delta_pct) {
            return AlertDecision::BelowThreshold;
        }

        if let Some(window) = self.dedupe_window {
            if let Some(&(last_price, at)) = self.last_alerted.get(asset_id) {
                let within_window = now.saturating_duration_since(at) < window;
                let moved_pct = if last_price != 0.0 {
                    ((price - last_price) / last_price * 100.0).abs()
                } else {
                    f64::INFINITY
                };
                if within_window && moved_pct < self.threshold_pct {
                    return AlertDecision::Deduped;
                }
            }
            self.last_alerted.insert(asset_id.to_string(), (price, now));
        }

        AlertDecision::Fire(PriceAlert::new(asset_id, asset_name, price, delta_pct))
    }

    /// Forget dedupe history for assets no longer tracked.
    pub fn forget(&mut self, asset_id: &str) {
        self.last_alerted.remove(asset_id);
    }
}
