pub mod cache;
mod commands;
pub mod error;
pub mod feed;
pub mod types;
pub mod view;

use cache::DatasetCache;
use feed::UsgsFeed;
use tauri::Manager;
use tracing::{error, info};

pub type QuakeCache = DatasetCache<UsgsFeed>;

#[cfg_attr(mobile, tauri::mobile_entry_point)]
pub fn run() {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "quake_view_lib=info".into()),
        )
        .with_target(true)
        .init();

    let result = tauri::Builder::default()
        .plugin(tauri_plugin_opener::init())
        .invoke_handler(tauri::generate_handler![
            commands::get_earthquakes,
            commands::refresh_earthquakes,
            commands::get_map_view,
        ])
        .setup(|app| {
            let feed = UsgsFeed::new()?;
            info!(url = feed.endpoint(), "earthquake feed configured");
            app.manage(QuakeCache::new(feed));
            Ok(())
        })
        .run(tauri::generate_context!());

    if let Err(e) = result {
        error!(error = %e, "error while running tauri application");
        std::process::exit(1);
    }
}
