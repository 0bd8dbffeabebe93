use serde::{Deserialize, Serialize};

use crate::state::dashboard::FeedConnectionState;

/// Which feed last wrote an `AssetRecord`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum UpdateSource {
    Snapshot,
    Push,
}

/// One row of a batch quote response.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AssetQuote {
    pub id: String,
    pub name: String,
    pub symbol: String,
    pub price: f64,
    pub percent_change_24h: f64,
    pub market_cap: f64,
}

/// Everything the reconciler consumes. Adapters only ever produce these;
/// they never touch the asset table directly.
#[derive(Debug, Clone)]
pub enum MarketEvent {
    /// Full authoritative batch, replaces the table wholesale.
    Snapshot(Vec<AssetQuote>),
    /// Batch fetch failed; carries the user-facing message.
    SnapshotFailed(String),
    /// Single price-only update from the stream.
    Push { id: String, price: f64 },
    Connection(FeedConnectionState),
    /// Replace the tracked identifier set.
    Retrack(Vec<String>),
}
