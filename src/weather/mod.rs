//! Current conditions per configured city. Like the headline feed, this is
//! presentation data only and never touches the asset table.

use crate::errors::FeedError;
use async_trait::async_trait;
use futures::future::try_join_all;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{watch, RwLock};
use tokio::time::{interval, MissedTickBehavior};
use tracing::{debug, info, warn};

pub const WEATHER_FAILURE_MESSAGE: &str = "Failed to fetch weather data";

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CityWeather {
    pub city: String,
    /// Degrees Celsius.
    pub temperature: f64,
    /// Percent.
    pub humidity: f64,
    pub conditions: String,
    pub icon: String,
}

#[derive(Debug, Default, Clone, Serialize)]
pub struct WeatherState {
    pub data: Vec<CityWeather>,
    pub error: Option<String>,
}

pub type WeatherHandle = Arc<RwLock<WeatherState>>;

#[async_trait]
pub trait WeatherSource: Send + Sync {
    async fn fetch_city(&self, city: &str) -> Result<CityWeather, FeedError>;
}

pub struct OpenWeatherClient {
    http: reqwest::Client,
    base_url: String,
    api_key: String,
}

impl OpenWeatherClient {
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
impl WeatherSource for OpenWeatherClient {
    async fn fetch_city(&self, city: &str) -> Result<CityWeather, FeedError> {
        let resp = self
            .http
            .get(format!("{}/weather", self.base_url))
            .query(&[
                ("q", city),
                ("appid", self.api_key.as_str()),
                ("units", "metric"),
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
        parse_current_weather(city, &body)
    }
}

#[derive(Debug, Deserialize)]
struct CurrentWeather {
    main: MainBlock,
    #[serde(default)]
    weather: Vec<Condition>,
}

#[derive(Debug, Deserialize)]
struct MainBlock {
    temp: f64,
    humidity: f64,
}

#[derive(Debug, Deserialize)]
struct Condition {
    #[serde(default)]
    description: String,
    #[serde(default)]
    icon: String,
}

/// Maps an OpenWeather `/weather` body. The city label is the one that was
/// requested, not the name echoed back by the API.
pub fn parse_current_weather(city: &str, body: &str) -> Result<CityWeather, FeedError> {
    let raw: CurrentWeather =
        serde_json::from_str(body).map_err(|e| FeedError::Decode(e.to_string()))?;
    let condition = raw
        .weather
        .into_iter()
        .next()
        .ok_or_else(|| FeedError::Decode(format!("no conditions reported for {city}")))?;

    Ok(CityWeather {
        city: city.to_string(),
        temperature: raw.main.temp,
        humidity: raw.main.humidity,
        conditions: condition.description,
        icon: condition.icon,
    })
}

/// All cities are requested concurrently and land as one batch. A single
/// failing city fails the batch; the previous data stays in place.
pub async fn refresh(source: &dyn WeatherSource, cities: &[String], weather: &WeatherHandle) {
    match try_join_all(cities.iter().map(|city| source.fetch_city(city))).await {
        Ok(data) => {
            debug!(count = data.len(), "weather refreshed");
            let mut state = weather.write().await;
            state.data = data;
            state.error = None;
        }
        Err(err) => {
            warn!(error = %err, "weather fetch failed");
            let message = match &err {
                FeedError::Decode(_) => WEATHER_FAILURE_MESSAGE.to_string(),
                other => other.user_message(),
            };
            weather.write().await.error = Some(message);
        }
    }
}

pub async fn run_weather_poller(
    source: Arc<dyn WeatherSource>,
    cities: Vec<String>,
    every: Duration,
    weather: WeatherHandle,
    mut shutdown: watch::Receiver<bool>,
) -> anyhow::Result<()> {
    info!(?cities, interval_secs = every.as_secs(), "weather poller started");

    let mut ticker = interval(every);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

    loop {
        tokio::select! {
            _ = ticker.tick() => refresh(source.as_ref(), &cities, &weather).await,
            _ = shutdown.changed() => break,
        }
    }

    info!("weather poller stopped");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    const LONDON_BODY: &str = r#"{
        "coord": {"lon": -0.13, "lat": 51.51},
        "weather": [
            {"id": 500, "main": "Rain", "description": "light rain", "icon": "10d"},
            {"id": 701, "main": "Mist", "description": "mist", "icon": "50d"}
        ],
        "main": {"temp": 12.4, "feels_like": 11.8, "pressure": 1012, "humidity": 81},
        "name": "London"
    }"#;

    #[test]
    fn maps_main_block_and_first_condition() {
        let weather = parse_current_weather("London", LONDON_BODY).unwrap();
        assert_eq!(
            weather,
            CityWeather {
                city: "London".to_string(),
                temperature: 12.4,
                humidity: 81.0,
                conditions: "light rain".to_string(),
                icon: "10d".to_string(),
            }
        );
    }

    #[test]
    fn missing_conditions_or_main_is_a_decode_error() {
        let no_conditions = r#"{"weather":[],"main":{"temp":1.0,"humidity":2}}"#;
        assert!(matches!(
            parse_current_weather("Tokyo", no_conditions),
            Err(FeedError::Decode(_))
        ));
        assert!(matches!(
            parse_current_weather("Tokyo", r#"{"cod":"404","message":"city not found"}"#),
            Err(FeedError::Decode(_))
        ));
    }

    enum Canned {
        Temperature(f64),
        Garbled,
    }

    /// Serves canned results per city; unknown cities fail with 404.
    struct CannedWeather {
        cities: HashMap<String, Canned>,
    }

    #[async_trait]
    impl WeatherSource for CannedWeather {
        async fn fetch_city(&self, city: &str) -> Result<CityWeather, FeedError> {
            match self.cities.get(city) {
                Some(Canned::Temperature(temperature)) => Ok(CityWeather {
                    city: city.to_string(),
                    temperature: *temperature,
                    humidity: 50.0,
                    conditions: "clear sky".to_string(),
                    icon: "01d".to_string(),
                }),
                Some(Canned::Garbled) => Err(FeedError::Decode("bad body".to_string())),
                None => Err(FeedError::Status { status: 404 }),
            }
        }
    }

    fn handle() -> WeatherHandle {
        Arc::new(RwLock::new(WeatherState::default()))
    }

    fn cities(names: &[&str]) -> Vec<String> {
        names.iter().map(|s| s.to_string()).collect()
    }

    #[tokio::test]
    async fn refresh_keeps_requested_city_order() {
        let source = CannedWeather {
            cities: HashMap::from([
                ("New York".to_string(), Canned::Temperature(21.0)),
                ("London".to_string(), Canned::Temperature(12.0)),
                ("Tokyo".to_string(), Canned::Temperature(18.0)),
            ]),
        };
        let weather = handle();

        refresh(&source, &cities(&["New York", "London", "Tokyo"]), &weather).await;

        let state = weather.read().await;
        assert!(state.error.is_none());
        let names: Vec<&str> = state.data.iter().map(|w| w.city.as_str()).collect();
        assert_eq!(names, vec!["New York", "London", "Tokyo"]);
        assert_eq!(state.data[2].temperature, 18.0);
    }

    #[tokio::test]
    async fn one_failing_city_sets_error_and_keeps_last_data() {
        let weather = handle();
        let good = CannedWeather {
            cities: HashMap::from([("London".to_string(), Canned::Temperature(12.0))]),
        };
        refresh(&good, &cities(&["London"]), &weather).await;

        let broken = CannedWeather {
            cities: HashMap::from([
                ("London".to_string(), Canned::Temperature(13.0)),
                ("Atlantis".to_string(), Canned::Garbled),
            ]),
        };
        refresh(&broken, &cities(&["London", "Atlantis"]), &weather).await;

        {
            let state = weather.read().await;
            assert_eq!(state.error.as_deref(), Some(WEATHER_FAILURE_MESSAGE));
            assert_eq!(state.data.len(), 1);
            assert_eq!(state.data[0].temperature, 12.0);
        }

        refresh(&broken, &cities(&["Nowhere"]), &weather).await;
        let state = weather.read().await;
        assert_eq!(
            state.error.as_deref(),
            Some("Request failed with status code 404")
        );
    }

    #[tokio::test]
    async fn successful_refresh_clears_previous_error() {
        let weather = handle();
        weather.write().await.error = Some(WEATHER_FAILURE_MESSAGE.to_string());

        let source = CannedWeather {
            cities: HashMap::from([("Tokyo".to_string(), Canned::Temperature(18.0))]),
        };
        refresh(&source, &cities(&["Tokyo"]), &weather).await;

        let state = weather.read().await;
        assert!(state.error.is_none());
        assert_eq!(state.data.len(), 1);
    }
}
