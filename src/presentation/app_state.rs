// Application state for HTTP handlers
use crate::application::analytics_facade::{AnalyticsFacade, FarmInterest};
use std::sync::Arc;
use std::time::Duration;

#[derive(Clone)]
pub struct AppState {
    pub facade: AnalyticsFacade,
    /// Snapshot interval used when a stream request does not name one.
    pub default_stream_every: Duration,
    /// Keeps configured farms ingesting for as long as the server runs.
    pub watched: Arc<Vec<FarmInterest>>,
}
