use crate::state::asset::AssetRecord;
use crate::state::asset_table::AssetTable;
use serde::Serialize;
use std::sync::Arc;
use tokio::sync::RwLock;

/// Liveness of the price stream, shown as the dashboard's live dot.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum FeedConnectionState {
    #[default]
    Disconnected,
    Connecting,
    Connected,
}

impl FeedConnectionState {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Disconnected => "disconnected",
            Self::Connecting => "connecting",
            Self::Connected => "connected",
        }
    }
}

/// Everything the presentation layer reads. Written only by the reconciler.
#[derive(Debug, Default)]
pub struct DashboardState {
    pub assets: AssetTable,
    pub feed: FeedConnectionState,
    /// Latest snapshot failure, cleared by the next good snapshot.
    pub last_error: Option<String>,
}

/// Owned copy handed to readers so no lock is held while rendering.
#[derive(Debug, Clone, Serialize)]
pub struct DashboardView {
    pub assets: Vec<AssetRecord>,
    pub feed: FeedConnectionState,
    pub error: Option<String>,
}

impl DashboardState {
    pub fn new(tracked: &[String]) -> Self {
        Self {
            assets: AssetTable::new(tracked.iter().cloned()),
            feed: FeedConnectionState::Disconnected,
            last_error: None,
        }
    }

    pub fn view(&self) -> DashboardView {
        DashboardView {
            assets: self.assets.records().into_iter().cloned().collect(),
            feed: self.feed,
            error: self.last_error.clone(),
        }
    }
}

pub type DashboardHandle = Arc<RwLock<DashboardState>>;

pub fn new_handle(tracked: &[String]) -> DashboardHandle {
    Arc::new(RwLock::new(DashboardState::new(tracked)))
}

pub async fn view(handle: &DashboardHandle) -> DashboardView {
    handle.read().await.view()
}
