use serde::{Deserialize, Serialize};

/// One normalized earthquake from the upstream feed.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SeismicEvent {
    pub magnitude: Option<f64>,
    pub place: String,
    pub latitude: f64,
    pub longitude: f64,
}

/// Events in the order the upstream feed returned them.
pub type Dataset = Vec<SeismicEvent>;

/// A single point of the heatmap layer.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct HeatPoint {
    /// `[longitude, latitude]`, the order the map layer expects.
    pub position: [f64; 2],
    pub weight: f64,
}

/// Everything the dashboard needs for one render.
#[derive(Debug, Clone, Serialize)]
pub struct DatasetView {
    pub events: Dataset,
    pub heatmap: Vec<HeatPoint>,
    pub event_count: usize,
    pub max_magnitude: Option<f64>,
    /// RFC 3339 timestamp of the fetch that produced `events`.
    pub fetched_at: String,
    pub stale: bool,
    pub last_error: Option<String>,
}
