use std::collections::HashSet;

use tauri::State;

use crate::models::tracker::{self, SortMode, Tracker};
use crate::services::price_service::PriceService;
use crate::services::refresh_service::{self, ERR_REFRESH_BUSY, ERR_UPDATE_FAILED};
use crate::AppState;

#[tauri::command]
pub async fn get_trackers(
    state: State<'_, AppState>,
    sort_mode: Option<SortMode>,
) -> Result<Vec<Tracker>, String> {
    let mut trackers = state.trackers.lock().unwrap().clone();
    tracker::sort_for_display(&mut trackers, sort_mode.unwrap_or_default());
    Ok(trackers)
}

#[tauri::command]
pub async fn add_tracker(
    state: State<'_, AppState>,
    symbol: String,
    start_price: f64,
    target_price: f64,
) -> Result<Tracker, String> {
    let symbol = symbol.trim().to_uppercase();
    if symbol.is_empty() {
        return Err("Symbol must not be empty".to_string());
    }

    let tracker = Tracker::new(&symbol, start_price, target_price);
    let id = tracker.id.clone();
    {
        let mut trackers = state.trackers.lock().unwrap();
        // Newest tracker goes to the front of the stored order.
        trackers.insert(0, tracker);
        state.db.save_trackers(&trackers).map_err(|e| e.to_string())?;
    }

    // Fetch the initial price right away. A busy slot or a missing credential
    // just leaves the new tracker stale for the next sweep.
    if let Err(e) = refresh_symbols(&state, vec![symbol.clone()]).await {
        log::info!("initial fetch for {} skipped: {}", symbol, e);
    }

    let trackers = state.trackers.lock().unwrap();
    trackers
        .iter()
        .find(|t| t.id == id)
        .cloned()
        .ok_or_else(|| "Tracker was removed while refreshing".to_string())
}

#[tauri::command]
pub async fn remove_tracker(state: State<'_, AppState>, id: String) -> Result<(), String> {
    let mut trackers = state.trackers.lock().unwrap();
    let before = trackers.len();
    trackers.retain(|t| t.id != id);
    if trackers.len() == before {
        return Err("Tracker not found".to_string());
    }
    state.db.save_trackers(&trackers).map_err(|e| e.to_string())
}

#[tauri::command]
pub async fn set_tracker_completed(
    state: State<'_, AppState>,
    id: String,
    completed: bool,
) -> Result<Tracker, String> {
    let mut trackers = state.trackers.lock().unwrap();
    let tracker = trackers
        .iter_mut()
        .find(|t| t.id == id)
        .ok_or_else(|| "Tracker not found".to_string())?;
    tracker.is_completed = completed;
    let updated = tracker.clone();
    state.db.save_trackers(&trackers).map_err(|e| e.to_string())?;
    Ok(updated)
}

/// Manual refresh of one tracker's symbol, regardless of staleness.
#[tauri::command]
pub async fn refresh_tracker(state: State<'_, AppState>, id: String) -> Result<Tracker, String> {
    let symbol = {
        let trackers = state.trackers.lock().unwrap();
        trackers
            .iter()
            .find(|t| t.id == id)
            .map(|t| t.symbol.clone())
            .ok_or_else(|| "Tracker not found".to_string())?
    };
    refresh_symbols(&state, vec![symbol]).await?;

    let trackers = state.trackers.lock().unwrap();
    trackers
        .iter()
        .find(|t| t.id == id)
        .cloned()
        .ok_or_else(|| "Tracker was removed while refreshing".to_string())
}

/// Manual "refresh all": every non-completed tracker, staleness ignored.
#[tauri::command]
pub async fn refresh_all_trackers(state: State<'_, AppState>) -> Result<Vec<Tracker>, String> {
    let symbols = {
        let trackers = state.trackers.lock().unwrap();
        refresh_service::active_symbols(&trackers)
    };
    refresh_symbols(&state, symbols).await?;
    Ok(state.trackers.lock().unwrap().clone())
}

/// Automatic sweep run at startup and after the credential is set: refreshes
/// only trackers whose last attempt is more than an hour old (or absent).
#[tauri::command]
pub async fn refresh_stale_trackers(state: State<'_, AppState>) -> Result<Vec<Tracker>, String> {
    let symbols = {
        let trackers = state.trackers.lock().unwrap();
        refresh_service::stale_symbols(&trackers, refresh_service::now_ms())
    };
    refresh_symbols(&state, symbols).await?;
    Ok(state.trackers.lock().unwrap().clone())
}

/// Shared refresh path behind every trigger. Acquires the single refresh
/// slot, runs one batched fetch for the given unique symbols and merges the
/// outcome back into the tracker list. The tracker list lock is never held
/// across the network await; symbols are snapshotted up front and the merge
/// re-reads the current list, so trackers added or removed mid-flight are
/// handled by the requested-set check inside the merge.
pub(crate) async fn refresh_symbols(
    state: &AppState,
    symbols: Vec<String>,
) -> Result<(), String> {
    if symbols.is_empty() {
        return Ok(());
    }

    let api_key = state.db.load_api_key().map_err(|e| e.to_string())?;
    if api_key.trim().is_empty() {
        return Err("No API key configured".to_string());
    }

    let _permit = state
        .refresh_slot
        .try_acquire()
        .ok_or_else(|| ERR_REFRESH_BUSY.to_string())?;

    let requested: HashSet<String> = symbols.iter().cloned().collect();
    match PriceService::fetch_prices(&symbols, &api_key).await {
        Ok(results) => {
            let mut trackers = state.trackers.lock().unwrap();
            refresh_service::apply_results(
                &mut trackers,
                &requested,
                &results,
                refresh_service::now_ms(),
            );
            state.db.save_trackers(&trackers).map_err(|e| e.to_string())?;
            Ok(())
        }
        Err(e) => {
            log::warn!("price refresh for {} symbols failed: {:#}", symbols.len(), e);
            let mut trackers = state.trackers.lock().unwrap();
            refresh_service::apply_batch_failure(
                &mut trackers,
                &requested,
                refresh_service::now_ms(),
            );
            state.db.save_trackers(&trackers).map_err(|e| e.to_string())?;
            Err(format!("{}: {}", ERR_UPDATE_FAILED, e))
        }
    }
}
