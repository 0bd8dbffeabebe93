use anyhow::{anyhow, Result};
use std::env;
use std::time::Duration;

#[derive(Debug, Clone)]
pub struct Config {
    pub log_level: String,

    // Tracked assets
    pub tracked_assets: Vec<String>,
    pub quote_currency: String,

    // Endpoints
    pub snapshot_url: String,
    pub stream_url: String,
    pub news_url: String,
    pub news_api_key: Option<String>,
    pub news_keywords: Vec<String>,
    pub weather_url: String,
    pub weather_api_key: Option<String>,
    pub weather_cities: Vec<String>,

    // Timing
    pub snapshot_interval: Duration,
    pub news_interval: Duration,
    pub weather_interval: Duration,
    pub http_timeout: Duration,

    // Alerts
    pub alert_threshold_pct: f64,
    /// `None` keeps every qualifying push as its own alert.
    pub alert_dedupe_window: Option<Duration>,

    /// 0 disables the Prometheus listener.
    pub metrics_port: u16,
}

impl Config {
    pub fn from_env() -> Result<Self> {
        // dotenvy loads .env, but doesn't override already-set env vars
        dotenvy::dotenv().ok();

        let log_level = env::var("RUST_LOG").unwrap_or_else(|_| "info".to_string());

        let tracked_assets = parse_list("PULSE_TRACKED_ASSETS", "bitcoin,ethereum,cardano");
        if tracked_assets.is_empty() {
            return Err(anyhow!("PULSE_TRACKED_ASSETS must name at least one asset"));
        }

        let snapshot_interval_secs = parse_u64("PULSE_SNAPSHOT_INTERVAL_SECS", 60)?;
        let news_interval_secs = parse_u64("PULSE_NEWS_INTERVAL_SECS", 300)?;
        let weather_interval_secs = parse_u64("PULSE_WEATHER_INTERVAL_SECS", 60)?;
        let http_timeout_secs = parse_u64("PULSE_HTTP_TIMEOUT_SECS", 10)?;
        if snapshot_interval_secs == 0 || news_interval_secs == 0 || weather_interval_secs == 0 {
            return Err(anyhow!("poll intervals must be > 0"));
        }
        if http_timeout_secs == 0 {
            return Err(anyhow!("PULSE_HTTP_TIMEOUT_SECS must be > 0"));
        }

        let alert_threshold_pct = parse_f64("PULSE_ALERT_THRESHOLD_PCT", 1.0)?;
        if !alert_threshold_pct.is_finite() || alert_threshold_pct <= 0.0 {
            return Err(anyhow!("PULSE_ALERT_THRESHOLD_PCT must be > 0"));
        }

        let dedupe_secs = parse_u64("PULSE_ALERT_DEDUPE_SECS", 0)?;

        Ok(Self {
            log_level,
            tracked_assets,
            quote_currency: env::var("PULSE_QUOTE_CURRENCY").unwrap_or_else(|_| "usd".to_string()),
            snapshot_url: env::var("PULSE_SNAPSHOT_URL")
                .unwrap_or_else(|_| "https://api.coingecko.com/api/v3".to_string()),
            stream_url: env::var("PULSE_STREAM_URL")
                .unwrap_or_else(|_| "wss://ws.coincap.io/prices".to_string()),
            news_url: env::var("PULSE_NEWS_URL")
                .unwrap_or_else(|_| "https://newsdata.io/api/1".to_string()),
            news_api_key: env::var("NEWSDATA_API_KEY").ok().filter(|k| !k.trim().is_empty()),
            news_keywords: parse_list("PULSE_NEWS_KEYWORDS", "cryptocurrency,weather"),
            weather_url: env::var("PULSE_WEATHER_URL")
                .unwrap_or_else(|_| "https://api.openweathermap.org/data/2.5".to_string()),
            weather_api_key: env::var("OPENWEATHER_API_KEY")
                .ok()
                .filter(|k| !k.trim().is_empty()),
            weather_cities: parse_list("PULSE_WEATHER_CITIES", "New York,London,Tokyo"),
            snapshot_interval: Duration::from_secs(snapshot_interval_secs),
            news_interval: Duration::from_secs(news_interval_secs),
            weather_interval: Duration::from_secs(weather_interval_secs),
            http_timeout: Duration::from_secs(http_timeout_secs),
            alert_threshold_pct,
            alert_dedupe_window: (dedupe_secs > 0).then(|| Duration::from_secs(dedupe_secs)),
            metrics_port: parse_u16("PULSE_METRICS_PORT", 9000)?,
        })
    }
}

/// Comma-separated list with blanks dropped.
fn parse_list(var_name: &str, default: &str) -> Vec<String> {
    split_list(&env::var(var_name).unwrap_or_else(|_| default.to_string()))
}

fn split_list(raw: &str) -> Vec<String> {
    raw.split(',')
        .map(|s| s.trim().to_string())
        .filter(|s| !s.is_empty())
        .collect()
}

fn parse_f64(var_name: &str, default: f64) -> Result<f64> {
    match env::var(var_name) {
        Ok(val) => val.parse().map_err(|_| anyhow!("{} must be a valid f64", var_name)),
        Err(_) => Ok(default),
    }
}

fn parse_u64(var_name: &str, default: u64) -> Result<u64> {
    match env::var(var_name) {
        Ok(val) => val.parse().map_err(|_| anyhow!("{} must be a valid u64", var_name)),
        Err(_) => Ok(default),
    }
}

fn parse_u16(var_name: &str, default: u16) -> Result<u16> {
    match env::var(var_name) {
        Ok(val) => val.parse().map_err(|_| anyhow!("{} must be a valid port", var_name)),
        Err(_) => Ok(default),
    }
}
