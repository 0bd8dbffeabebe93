//! Snapshot fetcher: periodic batch quotes from the CoinGecko markets endpoint.

use crate::errors::FeedError;
use crate::market_data::types::{AssetQuote, MarketEvent};
use crate::metrics::prometheus::{record_snapshot, record_snapshot_latency};
use async_trait::async_trait;
use serde::Deserialize;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::{mpsc, watch};
use tokio::time::{interval, MissedTickBehavior};
use tracing::{debug, info, warn};

/// Batch quote endpoint.
#[async_trait]
pub trait QuoteSource: Send + Sync {
    async fn fetch_quotes(&self, ids: &[String]) -> Result<Vec<AssetQuote>, FeedError>;
}

pub struct CoinGeckoClient {
    http: reqwest::Client,
    base_url: String,
    vs_currency: String,
}

impl CoinGeckoClient {
    pub fn new(base_url: &str, vs_currency: &str, timeout: Duration) -> Result<Self, FeedError> {
        let http = reqwest::Client::builder().timeout(timeout).build()?;
        Ok(Self {
            http,
            base_url: base_url.trim_end_matches('/').to_string(),
            vs_currency: vs_currency.to_string(),
        })
    }
}

#[async_trait]
impl QuoteSource for CoinGeckoClient {
    async fn fetch_quotes(&self, ids: &[String]) -> Result<Vec<AssetQuote>, FeedError> {
        if ids.is_empty() {
            return Ok(Vec::new());
        }

        let joined = ids.join(",");
        let resp = self
            .http
            .get(format!("{}/coins/markets", self.base_url))
            .query(&[
                ("vs_currency", self.vs_currency.as_str()),
                ("ids", joined.as_str()),
                ("order", "market_cap_desc"),
                ("per_page", "100"),
                ("page", "1"),
                ("sparkline", "false"),
            ])
            .send()
            .await?;

        let status = resp.status();
        if !status.is_success() {
            return Err(FeedError::Status {
                status: status.as_u16(),
            });
        }

        let body = resp.text().await?;
        parse_markets(&body)
    }
}

/// Row shape of `/coins/markets`. Numeric fields are nullable upstream.
#[derive(Debug, Deserialize)]
struct CoinMarket {
    id: String,
    #[serde(default)]
    name: String,
    #[serde(default)]
    symbol: String,
    current_price: Option<f64>,
    price_change_percentage_24h: Option<f64>,
    market_cap: Option<f64>,
}

impl CoinMarket {
    /// `None` when the row carries no usable price. Stored prices stay
    /// positive, so such rows are left out of the snapshot entirely.
    fn into_quote(self) -> Option<AssetQuote> {
        let price = self.current_price.filter(|p| p.is_finite() && *p > 0.0);
        let Some(price) = price else {
            debug!(id = %self.id, raw = ?self.current_price, "dropping snapshot row without a price");
            return None;
        };
        Some(AssetQuote {
            id: self.id,
            name: self.name,
            symbol: self.symbol,
            price,
            percent_change_24h: self.price_change_percentage_24h.unwrap_or(0.0),
            market_cap: self.market_cap.unwrap_or(0.0),
        })
    }
}

pub fn parse_markets(body: &str) -> Result<Vec<AssetQuote>, FeedError> {
    let rows: Vec<CoinMarket> =
        serde_json::from_str(body).map_err(|e| FeedError::Decode(e.to_string()))?;
    Ok(rows.into_iter().filter_map(CoinMarket::into_quote).collect())
}

/// Fetches on start and then every `every`. Each tick spawns its own
/// request: a slow response is never cancelled by the next tick, and
/// whichever resolves last is applied last.
pub async fn run_snapshot_poller(
    source: Arc<dyn QuoteSource>,
    tracked: watch::Receiver<Vec<String>>,
    every: Duration,
    tx: mpsc::Sender<MarketEvent>,
    mut shutdown: watch::Receiver<bool>,
) -> anyhow::Result<()> {
    info!(interval_secs = every.as_secs(), "snapshot poller started");

    let mut ticker = interval(every);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

    loop {
        tokio::select! {
            _ = ticker.tick() => {
                if tx.is_closed() {
                    warn!("event channel closed, stopping snapshot poller");
                    break;
                }
                let ids = tracked.borrow().clone();
                tokio::spawn(fetch_snapshot(source.clone(), ids, tx.clone()));
            }
            _ = shutdown.changed() => {
                break;
            }
        }
    }

    info!("snapshot poller stopped");
    Ok(())
}

async fn fetch_snapshot(
    source: Arc<dyn QuoteSource>,
    ids: Vec<String>,
    tx: mpsc::Sender<MarketEvent>,
) {
    let started = Instant::now();

    let event = match source.fetch_quotes(&ids).await {
        Ok(quotes) => {
            record_snapshot("ok");
            debug!(rows = quotes.len(), "snapshot received");
            MarketEvent::Snapshot(quotes)
        }
        Err(err) => {
            record_snapshot("failed");
            warn!(error = %err, "snapshot fetch failed");
            MarketEvent::SnapshotFailed(err.user_message())
        }
    };
    record_snapshot_latency(started.elapsed().as_secs_f64() * 1000.0);

    // After teardown the receiver is gone; the late result is dropped.
    if tx.send(event).await.is_err() {
        debug!("reconciler gone, discarding snapshot result");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Mutex;

    const MARKETS_BODY: &str = r#"[
        {"id":"bitcoin","symbol":"btc","name":"Bitcoin","current_price":64321.5,
         "market_cap":1266000000000,"price_change_percentage_24h":-1.42,"total_volume":1},
        {"id":"cardano","symbol":"ada","name":"Cardano","current_price":null,
         "market_cap":null,"price_change_percentage_24h":null},
        {"id":"ethereum","symbol":"eth","name":"Ethereum","current_price":3100.0,
         "market_cap":null,"price_change_percentage_24h":null},
        {"id":"solana","symbol":"sol","name":"Solana","current_price":0}
    ]"#;

    #[test]
    fn parses_markets_rows() {
        let quotes = parse_markets(MARKETS_BODY).unwrap();
        assert_eq!(quotes.len(), 2);
        assert_eq!(
            quotes[0],
            AssetQuote {
                id: "bitcoin".to_string(),
                name: "Bitcoin".to_string(),
                symbol: "btc".to_string(),
                price: 64321.5,
                percent_change_24h: -1.42,
                market_cap: 1_266_000_000_000.0,
            }
        );
        assert_eq!(quotes[1].id, "ethereum");
        assert_eq!(quotes[1].price, 3100.0);
        assert_eq!(quotes[1].percent_change_24h, 0.0);
        assert_eq!(quotes[1].market_cap, 0.0);
    }

    #[test]
    fn rows_without_a_positive_price_are_dropped() {
        let quotes = parse_markets(MARKETS_BODY).unwrap();
        assert!(quotes.iter().all(|q| q.price > 0.0));
        assert!(!quotes.iter().any(|q| q.id == "cardano" || q.id == "solana"));
    }

    #[test]
    fn rejects_non_array_body() {
        let err = parse_markets(r#"{"error":"rate limited"}"#).unwrap_err();
        assert!(matches!(err, FeedError::Decode(_)));
    }

    /// Returns a price equal to the call number after a per-call delay.
    struct ScriptedSource {
        calls: AtomicUsize,
        delays: Vec<Duration>,
        seen_ids: Mutex<Vec<Vec<String>>>,
    }

    #[async_trait]
    impl QuoteSource for ScriptedSource {
        async fn fetch_quotes(&self, ids: &[String]) -> Result<Vec<AssetQuote>, FeedError> {
            let call = self.calls.fetch_add(1, Ordering::SeqCst);
            self.seen_ids.lock().unwrap().push(ids.to_vec());
            let delay = self.delays.get(call).copied().unwrap_or_default();
            tokio::time::sleep(delay).await;
            if call >= self.delays.len() {
                return Err(FeedError::Status { status: 503 });
            }
            Ok(vec![AssetQuote {
                id: "bitcoin".to_string(),
                name: "Bitcoin".to_string(),
                symbol: "btc".to_string(),
                price: (call + 1) as f64,
                percent_change_24h: 0.0,
                market_cap: 0.0,
            }])
        }
    }

    fn snapshot_price(event: MarketEvent) -> f64 {
        match event {
            MarketEvent::Snapshot(quotes) => quotes[0].price,
            other => panic!("expected snapshot, got {other:?}"),
        }
    }

    #[tokio::test(start_paused = true)]
    async fn slow_request_is_not_cancelled_and_resolves_last() {
        let source = Arc::new(ScriptedSource {
            calls: AtomicUsize::new(0),
            delays: vec![Duration::from_secs(90), Duration::from_secs(1)],
            seen_ids: Mutex::new(Vec::new()),
        });
        let (_tracked_tx, tracked_rx) = watch::channel(vec!["bitcoin".to_string()]);
        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        let (tx, mut rx) = mpsc::channel(16);

        let poller = tokio::spawn(run_snapshot_poller(
            source.clone(),
            tracked_rx,
            Duration::from_secs(60),
            tx,
            shutdown_rx,
        ));

        // Tick at t=60 resolves at t=61, the t=0 request at t=90.
        assert_eq!(snapshot_price(rx.recv().await.unwrap()), 2.0);
        assert_eq!(snapshot_price(rx.recv().await.unwrap()), 1.0);

        shutdown_tx.send(true).unwrap();
        poller.await.unwrap().unwrap();
        assert_eq!(source.seen_ids.lock().unwrap()[0], vec!["bitcoin".to_string()]);
    }

    #[tokio::test(start_paused = true)]
    async fn failure_becomes_snapshot_failed_event() {
        let source = Arc::new(ScriptedSource {
            calls: AtomicUsize::new(0),
            delays: Vec::new(),
            seen_ids: Mutex::new(Vec::new()),
        });
        let (_tracked_tx, tracked_rx) = watch::channel(vec!["bitcoin".to_string()]);
        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        let (tx, mut rx) = mpsc::channel(16);

        let poller = tokio::spawn(run_snapshot_poller(
            source,
            tracked_rx,
            Duration::from_secs(60),
            tx,
            shutdown_rx,
        ));

        match rx.recv().await.unwrap() {
            MarketEvent::SnapshotFailed(msg) => {
                assert_eq!(msg, "Request failed with status code 503")
            }
            other => panic!("expected failure, got {other:?}"),
        }

        shutdown_tx.send(true).unwrap();
        poller.await.unwrap().unwrap();
    }

    #[tokio::test(start_paused = true)]
    async fn next_tick_requests_the_new_tracked_set() {
        let source = Arc::new(ScriptedSource {
            calls: AtomicUsize::new(0),
            delays: vec![Duration::ZERO, Duration::ZERO],
            seen_ids: Mutex::new(Vec::new()),
        });
        let (tracked_tx, tracked_rx) = watch::channel(vec!["bitcoin".to_string()]);
        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        let (tx, mut rx) = mpsc::channel(16);

        let poller = tokio::spawn(run_snapshot_poller(
            source.clone(),
            tracked_rx,
            Duration::from_secs(60),
            tx,
            shutdown_rx,
        ));

        rx.recv().await.unwrap();
        tracked_tx.send(vec!["ethereum".to_string()]).unwrap();
        rx.recv().await.unwrap();

        shutdown_tx.send(true).unwrap();
        poller.await.unwrap().unwrap();

        let seen = source.seen_ids.lock().unwrap();
        assert_eq!(seen[0], vec!["bitcoin".to_string()]);
        assert_eq!(seen[1], vec!["ethereum".to_string()]);
    }
}
