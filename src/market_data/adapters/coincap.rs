//! Live feed listener for the CoinCap price stream.
//!
//! One websocket per process, subscribed to the tracked ids at construction.
//! Each frame is a JSON object of `id -> "price"`; entries are parsed
//! independently and forwarded to the reconciler as push events. The
//! subscription is fixed for the life of the connection and there is no
//! reconnect: after a close the snapshot poller is the only data path.

use crate::errors::FeedError;
use crate::market_data::types::MarketEvent;
use crate::metrics::prometheus::{record_connection_state, record_push};
use crate::state::dashboard::FeedConnectionState;
use futures::{SinkExt, Stream, StreamExt};
use serde_json::Value;
use std::collections::HashSet;
use tokio::sync::{mpsc, watch};
use tokio_tungstenite::connect_async;
use tokio_tungstenite::tungstenite::{Error as WsError, Message};
use tracing::{debug, info, warn};

pub struct CoinCapListener {
    stream_url: String,
    assets: Vec<String>,
}

/// Why a stream session stopped.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SessionEnd {
    /// Server sent a close frame.
    Closed,
    /// Stream ended without a close frame.
    Ended,
    Failed(String),
    Shutdown,
    /// The reconciler dropped its receiver.
    ReceiverGone,
}

/// Parsed push frame. Bad entries are collected, not fatal.
#[derive(Debug, Default)]
pub struct PriceMessage {
    pub prices: Vec<(String, f64)>,
    pub rejected: Vec<FeedError>,
}

impl CoinCapListener {
    pub fn new(stream_url: &str, assets: &[String]) -> Self {
        Self {
            stream_url: stream_url.trim_end_matches('/').to_string(),
            assets: assets.to_vec(),
        }
    }

    pub fn subscription_url(&self) -> String {
        format!("{}?assets={}", self.stream_url, self.assets.join(","))
    }

    pub async fn run(
        self,
        tx: mpsc::Sender<MarketEvent>,
        mut shutdown: watch::Receiver<bool>,
    ) -> anyhow::Result<()> {
        let url = self.subscription_url();
        let subscribed: HashSet<String> = self.assets.iter().cloned().collect();

        emit_state(&tx, FeedConnectionState::Connecting).await;
        info!(%url, "connecting to price stream");

        let connected = tokio::select! {
            res = connect_async(url.as_str()) => res,
            _ = shutdown.changed() => {
                emit_state(&tx, FeedConnectionState::Disconnected).await;
                return Ok(());
            }
        };

        let (ws_stream, resp) = match connected {
            Ok(pair) => pair,
            Err(e) => {
                let err = FeedError::ConnectionLost(e.to_string());
                warn!(error = %err, "price stream connect failed; polling only");
                emit_state(&tx, FeedConnectionState::Disconnected).await;
                return Err(err.into());
            }
        };

        info!(status = %resp.status(), "price stream connected");

        let (mut write, mut read) = ws_stream.split();
        let end = run_session(&mut read, &subscribed, &tx, &mut shutdown).await;

        match end {
            SessionEnd::Shutdown => {
                let _ = write.close().await;
                info!("price stream closed on shutdown");
                Ok(())
            }
            SessionEnd::Failed(reason) => {
                let err = FeedError::ConnectionLost(reason);
                warn!(error = %err, "price stream dropped; polling only");
                Err(err.into())
            }
            other => {
                info!(end = ?other, "price stream ended; polling only");
                Ok(())
            }
        }
    }
}

/// Pumps one connected stream into `tx`.
///
/// Emits `Connected` first and `Disconnected` exactly once on the way out,
/// whatever ended the session.
pub async fn run_session<S>(
    read: &mut S,
    subscribed: &HashSet<String>,
    tx: &mpsc::Sender<MarketEvent>,
    shutdown: &mut watch::Receiver<bool>,
) -> SessionEnd
where
    S: Stream<Item = Result<Message, WsError>> + Unpin,
{
    emit_state(tx, FeedConnectionState::Connected).await;

    let end = loop {
        tokio::select! {
            _ = shutdown.changed() => break SessionEnd::Shutdown,
            msg = read.next() => {
                let Some(msg) = msg else {
                    break SessionEnd::Ended;
                };
                match msg {
                    Ok(Message::Text(text)) => {
                        if !forward_prices(&text, subscribed, tx).await {
                            break SessionEnd::ReceiverGone;
                        }
                    }
                    Ok(Message::Binary(bytes)) => {
                        let text = String::from_utf8_lossy(&bytes);
                        if !forward_prices(&text, subscribed, tx).await {
                            break SessionEnd::ReceiverGone;
                        }
                    }
                    Ok(Message::Close(frame)) => {
                        debug!(?frame, "price stream close frame");
                        break SessionEnd::Closed;
                    }
                    Ok(_) => {}
                    Err(e) => break SessionEnd::Failed(e.to_string()),
                }
            }
        }
    };

    emit_state(tx, FeedConnectionState::Disconnected).await;
    end
}

/// Returns false once the receiver is gone.
async fn forward_prices(
    text: &str,
    subscribed: &HashSet<String>,
    tx: &mpsc::Sender<MarketEvent>,
) -> bool {
    let parsed = match parse_price_message(text) {
        Ok(parsed) => parsed,
        Err(err) => {
            record_push("malformed");
            debug!(error = %err, "ignoring price frame");
            return true;
        }
    };

    for err in &parsed.rejected {
        record_push("malformed");
        debug!(error = %err, "skipping price entry");
    }

    for (id, price) in parsed.prices {
        if !subscribed.contains(&id) {
            record_push("unsubscribed");
            debug!(%id, "dropping price for unsubscribed asset");
            continue;
        }
        if tx.send(MarketEvent::Push { id, price }).await.is_err() {
            return false;
        }
    }

    true
}

pub fn parse_price_message(text: &str) -> Result<PriceMessage, FeedError> {
    let entries: serde_json::Map<String, Value> =
        serde_json::from_str(text).map_err(|e| FeedError::MalformedMessage(e.to_string()))?;

    let mut message = PriceMessage::default();
    for (id, value) in entries {
        match parse_price(&value) {
            Some(price) => message.prices.push((id, price)),
            None => message.rejected.push(FeedError::MalformedEntry {
                id,
                raw: value.to_string(),
            }),
        }
    }
    Ok(message)
}

/// Accepts a decimal string or a bare number; must be finite and > 0.
fn parse_price(value: &Value) -> Option<f64> {
    let price = match value {
        Value::String(s) => s.trim().parse::<f64>().ok()?,
        Value::Number(n) => n.as_f64()?,
        _ => return None,
    };
    (price.is_finite() && price > 0.0).then_some(price)
}

async fn emit_state(tx: &mpsc::Sender<MarketEvent>, state: FeedConnectionState) {
    record_connection_state(state.as_str());
    if tx.send(MarketEvent::Connection(state)).await.is_err() {
        debug!(state = state.as_str(), "reconciler gone, connection state not delivered");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use futures::stream;

    fn subscribed(ids: &[&str]) -> HashSet<String> {
        ids.iter().map(|s| s.to_string()).collect()
    }

    fn drain(rx: &mut mpsc::Receiver<MarketEvent>) -> Vec<MarketEvent> {
        let mut events = Vec::new();
        while let Ok(event) = rx.try_recv() {
            events.push(event);
        }
        events
    }

    fn connection_states(events: &[MarketEvent]) -> Vec<FeedConnectionState> {
        events
            .iter()
            .filter_map(|e| match e {
                MarketEvent::Connection(state) => Some(*state),
                _ => None,
            })
            .collect()
    }

    fn pushes(events: &[MarketEvent]) -> Vec<(String, f64)> {
        events
            .iter()
            .filter_map(|e| match e {
                MarketEvent::Push { id, price } => Some((id.clone(), *price)),
                _ => None,
            })
            .collect()
    }

    #[test]
    fn subscription_url_lists_assets() {
        let listener = CoinCapListener::new(
            "wss://ws.coincap.io/prices/",
            &["bitcoin".to_string(), "ethereum".to_string()],
        );
        assert_eq!(
            listener.subscription_url(),
            "wss://ws.coincap.io/prices?assets=bitcoin,ethereum"
        );
    }

    #[test]
    fn malformed_entry_does_not_spoil_the_rest() {
        let parsed =
            parse_price_message(r#"{"bitcoin":"64000.50","ethereum":"n/a","cardano":"0.45"}"#)
                .unwrap();

        let mut prices = parsed.prices.clone();
        prices.sort_by(|a, b| a.0.cmp(&b.0));
        assert_eq!(
            prices,
            vec![("bitcoin".to_string(), 64000.5), ("cardano".to_string(), 0.45)]
        );
        assert_eq!(parsed.rejected.len(), 1);
        assert!(matches!(
            &parsed.rejected[0],
            FeedError::MalformedEntry { id, .. } if id == "ethereum"
        ));
    }

    #[test]
    fn rejects_non_positive_and_non_finite_prices() {
        let parsed = parse_price_message(
            r#"{"a":"0","b":"-3","c":"NaN","d":"inf","e":null,"f":12.5,"g":" 7 "}"#,
        )
        .unwrap();
        let mut accepted: Vec<&str> = parsed.prices.iter().map(|(id, _)| id.as_str()).collect();
        accepted.sort();
        assert_eq!(accepted, vec!["f", "g"]);
        assert_eq!(parsed.rejected.len(), 5);
    }

    #[test]
    fn non_object_frame_is_malformed_message() {
        assert!(matches!(
            parse_price_message("[1,2,3]"),
            Err(FeedError::MalformedMessage(_))
        ));
        assert!(matches!(
            parse_price_message("not json"),
            Err(FeedError::MalformedMessage(_))
        ));
    }

    #[tokio::test]
    async fn session_forwards_valid_entries_and_reports_close() {
        let (tx, mut rx) = mpsc::channel(32);
        let (_shutdown_tx, mut shutdown_rx) = watch::channel(false);
        let frames: Vec<Result<Message, WsError>> = vec![
            Ok(Message::Text(r#"{"bitcoin":"101.5","ethereum":"bad"}"#.to_string())),
            Ok(Message::Text("garbage".to_string())),
            Ok(Message::Ping(Vec::new())),
            Ok(Message::Text(r#"{"dogecoin":"0.1","ethereum":"2500"}"#.to_string())),
            Ok(Message::Close(None)),
            Ok(Message::Text(r#"{"bitcoin":"1"}"#.to_string())),
        ];
        let mut read = stream::iter(frames);

        let end = run_session(
            &mut read,
            &subscribed(&["bitcoin", "ethereum"]),
            &tx,
            &mut shutdown_rx,
        )
        .await;
        assert_eq!(end, SessionEnd::Closed);

        let events = drain(&mut rx);
        assert_eq!(
            connection_states(&events),
            vec![FeedConnectionState::Connected, FeedConnectionState::Disconnected]
        );
        assert_eq!(
            pushes(&events),
            vec![("bitcoin".to_string(), 101.5), ("ethereum".to_string(), 2500.0)]
        );
        assert!(matches!(events.first(), Some(MarketEvent::Connection(FeedConnectionState::Connected))));
        assert!(matches!(events.last(), Some(MarketEvent::Connection(FeedConnectionState::Disconnected))));
    }

    #[tokio::test]
    async fn transport_error_disconnects_exactly_once() {
        let (tx, mut rx) = mpsc::channel(32);
        let (_shutdown_tx, mut shutdown_rx) = watch::channel(false);
        let frames: Vec<Result<Message, WsError>> = vec![
            Ok(Message::Text(r#"{"bitcoin":"100"}"#.to_string())),
            Err(WsError::ConnectionClosed),
        ];
        let mut read = stream::iter(frames);

        let end = run_session(&mut read, &subscribed(&["bitcoin"]), &tx, &mut shutdown_rx).await;
        assert!(matches!(end, SessionEnd::Failed(_)));

        let states = connection_states(&drain(&mut rx));
        assert_eq!(
            states,
            vec![FeedConnectionState::Connected, FeedConnectionState::Disconnected]
        );
    }

    #[tokio::test]
    async fn stream_end_without_close_frame_still_disconnects() {
        let (tx, mut rx) = mpsc::channel(8);
        let (_shutdown_tx, mut shutdown_rx) = watch::channel(false);
        let mut read = stream::iter(Vec::<Result<Message, WsError>>::new());

        let end = run_session(&mut read, &subscribed(&["bitcoin"]), &tx, &mut shutdown_rx).await;
        assert_eq!(end, SessionEnd::Ended);
        assert_eq!(
            connection_states(&drain(&mut rx)),
            vec![FeedConnectionState::Connected, FeedConnectionState::Disconnected]
        );
    }

    #[tokio::test]
    async fn shutdown_ends_an_idle_session() {
        let (tx, mut rx) = mpsc::channel(8);
        let (shutdown_tx, mut shutdown_rx) = watch::channel(false);
        let mut read = stream::pending::<Result<Message, WsError>>();

        let session = tokio::spawn(async move {
            run_session(&mut read, &subscribed(&["bitcoin"]), &tx, &mut shutdown_rx).await
        });
        shutdown_tx.send(true).unwrap();

        assert_eq!(session.await.unwrap(), SessionEnd::Shutdown);
        assert_eq!(
            connection_states(&drain(&mut rx)),
            vec![FeedConnectionState::Connected, FeedConnectionState::Disconnected]
        );
    }
}
