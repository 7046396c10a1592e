use tauri::State;

use crate::models::settings::AppSettings;
use crate::AppState;

#[tauri::command]
pub async fn get_settings(state: State<'_, AppState>) -> Result<AppSettings, String> {
    state.db.load_settings().map_err(|e| e.to_string())
}

/// The frontend follows a successful credential change with a
/// refresh_stale_trackers sweep.
#[tauri::command]
pub async fn set_api_key(state: State<'_, AppState>, api_key: String) -> Result<(), String> {
    state.db.save_api_key(api_key.trim()).map_err(|e| e.to_string())
}

#[tauri::command]
pub async fn set_title(state: State<'_, AppState>, title: String) -> Result<(), String> {
    state.db.save_title(&title).map_err(|e| e.to_string())
}

#[tauri::command]
pub async fn set_subtitle(state: State<'_, AppState>, subtitle: String) -> Result<(), String> {
    state.db.save_subtitle(&subtitle).map_err(|e| e.to_string())
}
