use anyhow::{anyhow, Result};
use tauri::State;

use crate::models::tracker::Tracker;
use crate::AppState;

/// Write the full tracker list as indented JSON to a caller-supplied path
/// (the save dialog lives in the frontend).
#[tauri::command]
pub async fn export_trackers(state: State<'_, AppState>, path: String) -> Result<(), String> {
    let trackers = state.trackers.lock().unwrap().clone();
    let json = serde_json::to_string_pretty(&trackers).map_err(|e| e.to_string())?;
    std::fs::write(&path, json).map_err(|e| format!("Failed to write {}: {}", path, e))
}

/// Replace the whole tracker list with the contents of an export file. Any
/// parse or validation failure rejects the import wholesale and leaves the
/// existing list untouched.
#[tauri::command]
pub async fn import_trackers(
    state: State<'_, AppState>,
    path: String,
) -> Result<Vec<Tracker>, String> {
    let raw = std::fs::read_to_string(&path)
        .map_err(|e| format!("Failed to read {}: {}", path, e))?;
    let imported = parse_tracker_export(&raw).map_err(|e| e.to_string())?;

    let mut trackers = state.trackers.lock().unwrap();
    *trackers = imported;
    state.db.save_trackers(&trackers).map_err(|e| e.to_string())?;
    Ok(trackers.clone())
}

/// Validate and deserialize an export document: a JSON array where every
/// element carries a non-empty id, a non-empty symbol and a numeric
/// startPrice.
pub fn parse_tracker_export(raw: &str) -> Result<Vec<Tracker>> {
    let value: serde_json::Value =
        serde_json::from_str(raw).map_err(|e| anyhow!("Not valid JSON: {}", e))?;
    let items = value
        .as_array()
        .ok_or_else(|| anyhow!("Import must be a JSON array of trackers"))?;

    for (i, item) in items.iter().enumerate() {
        let id = item.get("id").and_then(|v| v.as_str()).unwrap_or("");
        if id.is_empty() {
            return Err(anyhow!("Tracker #{} has no id", i + 1));
        }
        let symbol = item.get("symbol").and_then(|v| v.as_str()).unwrap_or("");
        if symbol.is_empty() {
            return Err(anyhow!("Tracker #{} has no symbol", i + 1));
        }
        if item.get("startPrice").and_then(|v| v.as_f64()).is_none() {
            return Err(anyhow!("Tracker #{} has no startPrice", i + 1));
        }
    }

    serde_json::from_value(value).map_err(|e| anyhow!("Malformed tracker entry: {}", e))
}
