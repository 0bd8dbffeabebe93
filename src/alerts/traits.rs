use serde::Serialize;
use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Direction {
    Up,
    Down,
}

/// A significant price movement, ready to show as a toast.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PriceAlert {
    pub asset_id: String,
    pub asset_name: String,
    pub price: f64,
    pub delta_pct: f64,
    pub direction: Direction,
}

impl PriceAlert {
    pub fn new(asset_id: &str, asset_name: &str, price: f64, delta_pct: f64) -> Self {
        let direction = if delta_pct >= 0.0 {
            Direction::Up
        } else {
            Direction::Down
        };
        Self {
            asset_id: asset_id.to_string(),
            asset_name: asset_name.to_string(),
            price,
            delta_pct,
            direction,
        }
    }
}

impl fmt::Display for PriceAlert {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let verb = match self.direction {
            Direction::Up => "up",
            Direction::Down => "down",
        };
        write!(
            f,
            "{} {} {:.2}% to ${:.2}",
            self.asset_name,
            verb,
            self.delta_pct.abs(),
            self.price
        )
    }
}

/// Destination for alerts that passed the notification policy.
///
/// Synchronous and infallible: delivery happens inside the
/// reconciler loop and must not block it.
pub trait AlertSink: Send + Sync {
    fn name(&self) -> &'static str;

    fn deliver(&self, alert: &PriceAlert);
}
