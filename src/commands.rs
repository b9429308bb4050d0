use crate::types::DatasetView;
use crate::view::MapView;
use crate::QuakeCache;
use tauri::State;

#[tauri::command]
pub async fn get_earthquakes(cache: State<'_, QuakeCache>) -> Result<DatasetView, String> {
    cache
        .read()
        .await
        .map(DatasetView::from)
        .map_err(|e| e.to_string())
}

/// Manual refresh: drop the cached dataset's freshness and read again.
#[tauri::command]
pub async fn refresh_earthquakes(cache: State<'_, QuakeCache>) -> Result<DatasetView, String> {
    cache.invalidate().await;
    cache
        .read()
        .await
        .map(DatasetView::from)
        .map_err(|e| e.to_string())
}

#[tauri::command]
pub fn get_map_view() -> MapView {
    MapView::default()
}
