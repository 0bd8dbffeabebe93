//! Headline feed. Read by the presentation layer only; nothing here
//! touches the asset table.

use crate::errors::FeedError;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{watch, RwLock};
use tokio::time::{interval, MissedTickBehavior};
use tracing::{debug, info, warn};

/// Headlines shown per refresh.
pub const MAX_HEADLINES: usize = 5;

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Headline {
    pub title: String,
    pub description: Option<String>,
    pub url: String,
    pub source_name: Option<String>,
    pub published_at: Option<String>,
}

#[derive(Debug, Default, Clone, Serialize)]
pub struct NewsState {
    pub headlines: Vec<Headline>,
    pub error: Option<String>,
}

pub type NewsHandle = Arc<RwLock<NewsState>>;

#[async_trait]
pub trait HeadlineSource: Send + Sync {
    async fn fetch_headlines(&self, keywords: &[String]) -> Result<Vec<Headline>, FeedError>;
}

pub struct NewsDataClient {
    http: reqwest::Client,
    base_url: String,
    api_key: String,
}

impl NewsDataClient {
    pub fn new(base_url: &str, api_key: &str, timeout: Duration) -> Result<Self, FeedError> {
        let http = reqwest::Client::builder().timeout(timeout).build()?;
        Ok(Self {
            http,
            base_url: base_url.trim_end_matches('/').to_string(),
            api_key: api_key.to_string(),
        })
    }
}

#[async_trait]
impl HeadlineSource for NewsDataClient {
    async fn fetch_headlines(&self, keywords: &[String]) -> Result<Vec<Headline>, FeedError> {
        let query = keywords.join(" OR ");
        let resp = self
            .http
            .get(format!("{}/news", self.base_url))
            .query(&[
                ("apikey", self.api_key.as_str()),
                ("q", query.as_str()),
                ("language", "en"),
                ("category", "technology,business"),
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
        parse_headlines(&body)
    }
}

#[derive(Debug, Deserialize)]
struct NewsResponse {
    #[serde(default)]
    results: Vec<RawArticle>,
}

#[derive(Debug, Deserialize)]
struct RawSource {
    name: Option<String>,
}

/// Accepts both the NewsData field names and the `source.name` /
/// `publishedAt` variant.
#[derive(Debug, Deserialize)]
struct RawArticle {
    title: Option<String>,
    description: Option<String>,
    #[serde(alias = "link")]
    url: Option<String>,
    source: Option<RawSource>,
    source_name: Option<String>,
    source_id: Option<String>,
    #[serde(alias = "pubDate", alias = "publishedAt")]
    published_at: Option<String>,
}

impl RawArticle {
    fn into_headline(self) -> Option<Headline> {
        let title = self.title.filter(|t| !t.trim().is_empty())?;
        let url = self.url.filter(|u| !u.trim().is_empty())?;
        let source_name = self
            .source
            .and_then(|s| s.name)
            .or(self.source_name)
            .or(self.source_id);
        Some(Headline {
            title,
            description: self.description,
            url,
            source_name,
            published_at: self.published_at,
        })
    }
}

/// Rows without a title or link are skipped.
pub fn parse_headlines(body: &str) -> Result<Vec<Headline>, FeedError> {
    let resp: NewsResponse =
        serde_json::from_str(body).map_err(|e| FeedError::Decode(e.to_string()))?;
    Ok(resp
        .results
        .into_iter()
        .filter_map(RawArticle::into_headline)
        .collect())
}

pub async fn refresh(source: &dyn HeadlineSource, keywords: &[String], news: &NewsHandle) {
    match source.fetch_headlines(keywords).await {
        Ok(mut headlines) => {
            headlines.truncate(MAX_HEADLINES);
            debug!(count = headlines.len(), "headlines refreshed");
            let mut state = news.write().await;
            state.headlines = headlines;
            state.error = None;
        }
        Err(err) => {
            warn!(error = %err, "headline fetch failed");
            let message = match &err {
                FeedError::Decode(_) => "Failed to fetch news data".to_string(),
                other => other.user_message(),
            };
            news.write().await.error = Some(message);
        }
    }
}

pub async fn run_news_poller(
    source: Arc<dyn HeadlineSource>,
    keywords: Vec<String>,
    every: Duration,
    news: NewsHandle,
    mut shutdown: watch::Receiver<bool>,
) -> anyhow::Result<()> {
    info!(?keywords, interval_secs = every.as_secs(), "news poller started");

    let mut ticker = interval(every);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

    loop {
        tokio::select! {
            _ = ticker.tick() => refresh(source.as_ref(), &keywords, &news).await,
            _ = shutdown.changed() => break,
        }
    }

    info!("news poller stopped");
    Ok(())
}
