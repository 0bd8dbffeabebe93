use serde::Serialize;

use crate::market_data::types::{AssetQuote, UpdateSource};

/// Authoritative per-asset view.
/// Metadata and market cap come from snapshots only; pushes touch
/// `price` and `percent_change_24h`.
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct AssetRecord {
    pub id: String,
    pub display_name: String,
    pub symbol: String,
    pub price: f64,
    /// After a push this is the move since the previously stored price,
    /// not a rolling 24h figure.
    pub percent_change_24h: f64,
    pub market_cap: f64,
    pub last_update_source: UpdateSource,
}

impl From<AssetQuote> for AssetRecord {
    fn from(quote: AssetQuote) -> Self {
        Self {
            id: quote.id,
            display_name: quote.name,
            symbol: quote.symbol,
            price: quote.price,
            percent_change_24h: quote.percent_change_24h,
            market_cap: quote.market_cap,
            last_update_source: UpdateSource::Snapshot,
        }
    }
}
