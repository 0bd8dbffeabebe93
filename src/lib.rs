//! market-pulse - live crypto price dashboard backend
//!
//! Merges periodic batch snapshots and a push price stream into one
//! authoritative asset table, and raises alerts on significant moves.

pub mod alerts;
pub mod config;
pub mod errors;
pub mod market_data;
pub mod metrics;
pub mod news;
pub mod service;
pub mod state;
pub mod weather;

pub use config::Config;
pub use errors::FeedError;
pub use service::{DashboardService, Sources};
