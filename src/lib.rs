pub mod models;
pub mod services;
pub mod commands;
pub mod db;
pub mod utils;

use db::database::Database;
use models::tracker::Tracker;
use services::refresh_service::RefreshSlot;
use std::sync::Mutex;
use tauri::Manager;

pub struct AppState {
    pub db: Database,
    pub trackers: Mutex<Vec<Tracker>>,
    pub refresh_slot: RefreshSlot,
}

#[cfg_attr(mobile, tauri::mobile_entry_point)]
pub fn run() {
    tauri::Builder::default()
        .plugin(tauri_plugin_shell::init())
        .plugin(tauri_plugin_dialog::init())
        .setup(|app| {
            if cfg!(debug_assertions) {
                app.handle().plugin(
                    tauri_plugin_log::Builder::default()
                        .level(log::LevelFilter::Info)
                        .build(),
                )?;
            }

            let app_data_dir = app.path().app_data_dir()
                .expect("Failed to get app data directory");
            let database = Database::new(app_data_dir)
                .expect("Failed to initialize database");

            let trackers = database.load_trackers().unwrap_or_default();

            app.manage(AppState {
                db: database,
                trackers: Mutex::new(trackers),
                refresh_slot: RefreshSlot::new(),
            });

            Ok(())
        })
        .invoke_handler(tauri::generate_handler![
            commands::tracker_cmd::get_trackers,
            commands::tracker_cmd::add_tracker,
            commands::tracker_cmd::remove_tracker,
            commands::tracker_cmd::set_tracker_completed,
            commands::tracker_cmd::refresh_tracker,
            commands::tracker_cmd::refresh_all_trackers,
            commands::tracker_cmd::refresh_stale_trackers,
            commands::transfer_cmd::export_trackers,
            commands::transfer_cmd::import_trackers,
            commands::settings_cmd::get_settings,
            commands::settings_cmd::set_api_key,
            commands::settings_cmd::set_title,
            commands::settings_cmd::set_subtitle,
        ])
        .run(tauri::generate_context!())
        .expect("error while running tauri application");
}
