use crate::cache::DatasetSnapshot;
use crate::types::{DatasetView, HeatPoint, SeismicEvent};
use serde::Serialize;
use std::collections::HashMap;

/// Dark basemap tiles behind the heatmap.
const TILE_URL: &str = "https://{s}.basemaps.cartocdn.com/dark_all/{z}/{x}/{y}{r}.png";

/// Side of the square grid cell, in degrees, inside which heat weights are averaged.
pub const HEAT_CELL_DEGREES: f64 = 1.0;

/// Initial camera and heatmap layer settings for the dashboard map.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct MapView {
    pub latitude: f64,
    pub longitude: f64,
    pub zoom: f64,
    pub tile_url: String,
    pub layer: HeatmapLayer,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct HeatmapLayer {
    pub opacity: f64,
}

impl Default for MapView {
    fn default() -> Self {
        Self {
            latitude: 0.0,
            longitude: 0.0,
            zoom: 1.2,
            tile_url: TILE_URL.to_string(),
            layer: HeatmapLayer {
                opacity: 0.9,
            },
        }
    }
}

/// Heat weight for one event. Missing and negative magnitudes weigh nothing.
fn heat_weight(magnitude: Option<f64>) -> f64 {
    magnitude.map(|m| m.max(0.0)).unwrap_or(0.0)
}

/// Build heatmap points keyed by `[longitude, latitude]`, one per event.
pub fn heat_points(events: &[SeismicEvent]) -> Vec<HeatPoint> {
    events
        .iter()
        .map(|e| HeatPoint {
            position: [e.longitude, e.latitude],
            weight: heat_weight(e.magnitude),
        })
        .collect()
}

#[derive(Default)]
struct CellSum {
    lon: f64,
    lat: f64,
    weight: f64,
    count: usize,
}

/// MEAN aggregation: one point per grid cell at the members' centroid,
/// weighted by the average of their weights. Cells keep first-seen order.
pub fn mean_heat_points(events: &[SeismicEvent], cell_degrees: f64) -> Vec<HeatPoint> {
    let mut index: HashMap<(i64, i64), usize> = HashMap::new();
    let mut cells: Vec<CellSum> = Vec::new();

    for point in heat_points(events) {
        let [lon, lat] = point.position;
        let key = (
            (lon / cell_degrees).floor() as i64,
            (lat / cell_degrees).floor() as i64,
        );
        let slot = *index.entry(key).or_insert_with(|| {
            cells.push(CellSum::default());
            cells.len() - 1
        });
        let cell = &mut cells[slot];
        cell.lon += lon;
        cell.lat += lat;
        cell.weight += point.weight;
        cell.count += 1;
    }

    cells
        .into_iter()
        .map(|c| {
            let n = c.count as f64;
            HeatPoint {
                position: [c.lon / n, c.lat / n],
                weight: c.weight / n,
            }
        })
        .collect()
}

/// Largest known magnitude in the dataset.
pub fn max_magnitude(events: &[SeismicEvent]) -> Option<f64> {
    events
        .iter()
        .filter_map(|e| e.magnitude)
        .fold(None, |acc, m| Some(acc.map_or(m, |a: f64| a.max(m))))
}

impl From<DatasetSnapshot> for DatasetView {
    fn from(snapshot: DatasetSnapshot) -> Self {
        let heatmap = mean_heat_points(&snapshot.dataset, HEAT_CELL_DEGREES);
        let max_magnitude = max_magnitude(&snapshot.dataset);
        Self {
            event_count: snapshot.dataset.len(),
            heatmap,
            max_magnitude,
            fetched_at: snapshot.fetched_at.to_rfc3339(),
            stale: snapshot.stale,
            last_error: snapshot.last_error,
            events: snapshot.dataset,
        }
    }
}
