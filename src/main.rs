use anyhow::Result;
use market_pulse::alerts::run_toast_printer;
use market_pulse::metrics::prometheus::init_metrics_server;
use market_pulse::{Config, DashboardService, Sources};
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

fn init_tracing(default_level: &str) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));
    tracing_subscriber::fmt().with_env_filter(filter).init();
}

#[tokio::main]
async fn main() -> Result<()> {
    let config = Config::from_env()?;
    init_tracing(&config.log_level);

    if config.metrics_port > 0 {
        init_metrics_server(config.metrics_port)?;
    }

    info!(tracked = ?config.tracked_assets, "market-pulse starting");

    let service = DashboardService::start(&config, Sources::from_config(&config)?);
    let mut toast_handle = tokio::spawn(run_toast_printer(service.subscribe_alerts()));

    tokio::select! {
        res = tokio::signal::ctrl_c() => {
            match res {
                Ok(()) => info!("received Ctrl-C, shutting down"),
                Err(err) => warn!(error = %err, "failed to listen for Ctrl-C, shutting down"),
            }
        }
        res = &mut toast_handle => {
            match res {
                Ok(()) => warn!("toast printer exited"),
                Err(err) => warn!(error = %err, "toast printer task panicked"),
            }
        }
    }

    let view = service.view().await;
    let news = service.headlines().await;
    let weather = service.weather().await;
    info!(
        assets = view.assets.len(),
        feed = view.feed.as_str(),
        error = ?view.error,
        headlines = news.headlines.len(),
        cities = weather.data.len(),
        weather_error = ?weather.error,
        "final dashboard state"
    );

    service.shutdown().await;
    toast_handle.abort();

    Ok(())
}
