use std::sync::Arc;

use tokio::sync::{broadcast, mpsc, watch, RwLock};
use tokio::task::JoinHandle;
use tracing::{info, warn};

use crate::alerts::policy::NotificationPolicy;
use crate::alerts::traits::{AlertSink, PriceAlert};
use crate::alerts::{LogSink, ToastSink};
use crate::config::Config;
use crate::market_data::adapters::coincap::CoinCapListener;
use crate::market_data::adapters::coingecko::{run_snapshot_poller, CoinGeckoClient, QuoteSource};
use crate::market_data::reconciler::{run_reconciler, Reconciler};
use crate::market_data::types::MarketEvent;
use crate::metrics::prometheus::set_tracked_assets;
use crate::news::{run_news_poller, HeadlineSource, NewsDataClient, NewsHandle, NewsState};
use crate::state::dashboard::{self, DashboardHandle, DashboardView};
use crate::state::favorites::FavoritesStore;
use crate::weather::{
    run_weather_poller, OpenWeatherClient, WeatherHandle, WeatherSource, WeatherState,
};

/// Adapter→reconciler channel buffer.
/// Sized to absorb stream bursts without back-pressuring the listener.
const EVENT_CHANNEL_BUFFER: usize = 4_096;

const TOAST_CHANNEL_CAPACITY: usize = 64;

/// Data sources the service drives. `stream: None` runs polling only.
pub struct Sources {
    pub quotes: Arc<dyn QuoteSource>,
    pub headlines: Option<Arc<dyn HeadlineSource>>,
    pub weather: Option<Arc<dyn WeatherSource>>,
    pub stream: Option<CoinCapListener>,
}

impl Sources {
    pub fn from_config(config: &Config) -> anyhow::Result<Self> {
        let quotes = CoinGeckoClient::new(
            &config.snapshot_url,
            &config.quote_currency,
            config.http_timeout,
        )?;

        let headlines = match &config.news_api_key {
            Some(key) => {
                let client = NewsDataClient::new(&config.news_url, key, config.http_timeout)?;
                Some(Arc::new(client) as Arc<dyn HeadlineSource>)
            }
            None => {
                info!("NEWSDATA_API_KEY not set, headline feed disabled");
                None
            }
        };

        let weather = match &config.weather_api_key {
            Some(key) => {
                let client = OpenWeatherClient::new(&config.weather_url, key, config.http_timeout)?;
                Some(Arc::new(client) as Arc<dyn WeatherSource>)
            }
            None => {
                info!("OPENWEATHER_API_KEY not set, weather feed disabled");
                None
            }
        };

        Ok(Self {
            quotes: Arc::new(quotes),
            headlines,
            weather,
            stream: Some(CoinCapListener::new(&config.stream_url, &config.tracked_assets)),
        })
    }
}

/// Owns every background task of the dashboard and the handles the
/// presentation layer reads from.
pub struct DashboardService {
    state: DashboardHandle,
    news: NewsHandle,
    weather: WeatherHandle,
    favorites: FavoritesStore,
    toasts: ToastSink,
    events: mpsc::Sender<MarketEvent>,
    tracked: watch::Sender<Vec<String>>,
    shutdown: watch::Sender<bool>,
    reconciler: JoinHandle<anyhow::Result<()>>,
    tasks: Vec<(&'static str, JoinHandle<anyhow::Result<()>>)>,
}

impl DashboardService {
    /// Spawns the reconciler, the snapshot poller, the price stream and
    /// the headline and weather pollers. Must be called inside a tokio runtime.
    pub fn start(config: &Config, sources: Sources) -> Self {
        let state = dashboard::new_handle(&config.tracked_assets);
        let news: NewsHandle = Arc::new(RwLock::new(NewsState::default()));
        let weather: WeatherHandle = Arc::new(RwLock::new(WeatherState::default()));
        let toasts = ToastSink::new(TOAST_CHANNEL_CAPACITY);

        let (events, rx) = mpsc::channel(EVENT_CHANNEL_BUFFER);
        let (tracked, tracked_rx) = watch::channel(config.tracked_assets.clone());
        let (shutdown, shutdown_rx) = watch::channel(false);

        set_tracked_assets(config.tracked_assets.len());

        let policy = NotificationPolicy::new(config.alert_threshold_pct, config.alert_dedupe_window);
        info!(
            threshold_pct = policy.threshold_pct(),
            dedupe_window = ?config.alert_dedupe_window,
            "notification policy configured"
        );
        let sinks: Vec<Box<dyn AlertSink>> = vec![Box::new(LogSink), Box::new(toasts.clone())];
        let reconciler = tokio::spawn(run_reconciler(
            rx,
            Reconciler::new(state.clone(), policy, sinks),
        ));

        let mut tasks = Vec::new();

        tasks.push((
            "snapshot_poller",
            tokio::spawn(run_snapshot_poller(
                sources.quotes,
                tracked_rx,
                config.snapshot_interval,
                events.clone(),
                shutdown_rx.clone(),
            )),
        ));

        if let Some(listener) = sources.stream {
            tasks.push((
                "price_stream",
                tokio::spawn(listener.run(events.clone(), shutdown_rx.clone())),
            ));
        }

        if let Some(headlines) = sources.headlines {
            tasks.push((
                "news_poller",
                tokio::spawn(run_news_poller(
                    headlines,
                    config.news_keywords.clone(),
                    config.news_interval,
                    news.clone(),
                    shutdown_rx.clone(),
                )),
            ));
        }

        if let Some(source) = sources.weather {
            tasks.push((
                "weather_poller",
                tokio::spawn(run_weather_poller(
                    source,
                    config.weather_cities.clone(),
                    config.weather_interval,
                    weather.clone(),
                    shutdown_rx,
                )),
            ));
        }

        info!(
            tracked = ?config.tracked_assets,
            tasks = tasks.len() + 1,
            "dashboard service started"
        );

        Self {
            state,
            news,
            weather,
            favorites: FavoritesStore::new(),
            toasts,
            events,
            tracked,
            shutdown,
            reconciler,
            tasks,
        }
    }

    pub async fn view(&self) -> DashboardView {
        dashboard::view(&self.state).await
    }

    pub async fn headlines(&self) -> NewsState {
        self.news.read().await.clone()
    }

    pub async fn weather(&self) -> WeatherState {
        self.weather.read().await.clone()
    }

    pub fn favorites(&self) -> &FavoritesStore {
        &self.favorites
    }

    pub fn subscribe_alerts(&self) -> broadcast::Receiver<PriceAlert> {
        self.toasts.subscribe()
    }

    /// Replaces the tracked set. The poller picks it up on its next tick;
    /// the live stream keeps its original subscription.
    pub async fn retrack(&self, ids: Vec<String>) -> anyhow::Result<()> {
        self.tracked.send_replace(ids.clone());
        self.events
            .send(MarketEvent::Retrack(ids))
            .await
            .map_err(|_| anyhow::anyhow!("reconciler is not running"))
    }

    /// Stops the timers and closes the stream, then stops the reconciler.
    /// Snapshot requests still in flight resolve into a closed channel.
    pub async fn shutdown(self) {
        let _ = self.shutdown.send(true);

        for (name, handle) in self.tasks {
            match handle.await {
                Ok(Ok(())) => info!(task = name, "task stopped"),
                Ok(Err(err)) => warn!(task = name, error = %err, "task returned error"),
                Err(err) => warn!(task = name, error = %err, "task panicked"),
            }
        }

        drop(self.events);
        self.reconciler.abort();
        let _ = self.reconciler.await;

        info!("dashboard service stopped");
    }
}
