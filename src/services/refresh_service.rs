use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicBool, Ordering};

use crate::models::tracker::Tracker;
use crate::services::price_service::PriceUpdate;

/// Generic per-symbol failure, shown on the tracker card.
pub const ERR_SYMBOL_UNAVAILABLE: &str = "Symbol not found or data unavailable";
/// Generic batch-level failure (network, timeout, credential rejected).
pub const ERR_UPDATE_FAILED: &str = "Update failed";
/// Returned when a refresh is requested while another is in flight.
pub const ERR_REFRESH_BUSY: &str = "A refresh is already in progress";

pub fn now_ms() -> i64 {
    chrono::Utc::now().timestamp_millis()
}

/// Single-slot supervisor for the one outstanding price round-trip. Every
/// refresh entry point (manual trigger, newly added tracker, staleness
/// sweep) must hold the permit for the duration of the round-trip; a second
/// request while the slot is taken is rejected with a busy signal rather
/// than queued. The permit releases the slot on drop, so it is cleared on
/// success, merge failure and panic alike.
pub struct RefreshSlot {
    busy: AtomicBool,
}

impl RefreshSlot {
    pub fn new() -> Self {
        Self {
            busy: AtomicBool::new(false),
        }
    }

    pub fn try_acquire(&self) -> Option<RefreshPermit<'_>> {
        if self
            .busy
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .is_ok()
        {
            Some(RefreshPermit { slot: self })
        } else {
            None
        }
    }

    pub fn is_busy(&self) -> bool {
        self.busy.load(Ordering::Acquire)
    }
}

impl Default for RefreshSlot {
    fn default() -> Self {
        Self::new()
    }
}

pub struct RefreshPermit<'a> {
    slot: &'a RefreshSlot,
}

impl Drop for RefreshPermit<'_> {
    fn drop(&mut self) {
        self.slot.busy.store(false, Ordering::Release);
    }
}

/// Unique symbols of all non-completed trackers, in list order. One network
/// round-trip serves every tracker sharing a symbol.
pub fn active_symbols(trackers: &[Tracker]) -> Vec<String> {
    dedup_symbols(trackers.iter().filter(|t| !t.is_completed))
}

/// Unique symbols of trackers that qualify for the automatic refresh sweep.
pub fn stale_symbols(trackers: &[Tracker], now_ms: i64) -> Vec<String> {
    dedup_symbols(trackers.iter().filter(|t| t.is_stale(now_ms)))
}

fn dedup_symbols<'a>(trackers: impl Iterator<Item = &'a Tracker>) -> Vec<String> {
    let mut seen = HashSet::new();
    trackers
        .filter(|t| seen.insert(t.symbol.clone()))
        .map(|t| t.symbol.clone())
        .collect()
}

/// Merge one batch of fetch results into the tracker list. Only trackers
/// whose symbol was in the requested set are touched.
///
/// A result with a positive price updates price, name (if the result name is
/// non-empty), attribution and timestamp, and clears any error. A missing or
/// unresolved result records the generic unavailable message and still bumps
/// the timestamp, which blocks an immediate re-retry; the previously known
/// price stays as it was.
pub fn apply_results(
    trackers: &mut [Tracker],
    requested: &HashSet<String>,
    results: &[PriceUpdate],
    now_ms: i64,
) {
    let by_symbol: HashMap<&str, &PriceUpdate> =
        results.iter().map(|r| (r.symbol.as_str(), r)).collect();

    for tracker in trackers.iter_mut() {
        if !requested.contains(&tracker.symbol) {
            continue;
        }
        match by_symbol.get(tracker.symbol.as_str()) {
            Some(update) if matches!(update.price, Some(p) if p > 0.0) => {
                tracker.current_price = update.price;
                if !update.name.is_empty() {
                    tracker.company_name = Some(update.name.clone());
                }
                tracker.source_url = update.source_url.clone();
                tracker.source_title = update.source_title.clone();
                tracker.last_updated = Some(now_ms);
                tracker.error_message = None;
            }
            _ => {
                tracker.last_updated = Some(now_ms);
                tracker.error_message = Some(ERR_SYMBOL_UNAVAILABLE.to_string());
            }
        }
    }
}

/// Record a batch-level failure on every tracker whose symbol was requested.
/// Prices and attribution are left untouched; the timestamp still moves so a
/// failing batch is throttled like any other attempt.
pub fn apply_batch_failure(trackers: &mut [Tracker], requested: &HashSet<String>, now_ms: i64) {
    for tracker in trackers.iter_mut() {
        if !requested.contains(&tracker.symbol) {
            continue;
        }
        tracker.last_updated = Some(now_ms);
        tracker.error_message = Some(ERR_UPDATE_FAILED.to_string());
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const NOW: i64 = 1_700_000_000_000;

    fn update(symbol: &str, price: Option<f64>, name: &str) -> PriceUpdate {
        PriceUpdate {
            symbol: symbol.to_string(),
            price,
            name: name.to_string(),
            source_url: Some("https://example.com".to_string()),
            source_title: Some("Example".to_string()),
        }
    }

    fn requested(symbols: &[&str]) -> HashSet<String> {
        symbols.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn test_merge_success_fills_tracker() {
        let mut trackers = vec![Tracker::new("AAPL", 100.0, 200.0)];
        apply_results(
            &mut trackers,
            &requested(&["AAPL"]),
            &[update("AAPL", Some(150.0), "Apple Inc.")],
            NOW,
        );

        let t = &trackers[0];
        assert_eq!(t.current_price, Some(150.0));
        assert_eq!(t.company_name.as_deref(), Some("Apple Inc."));
        assert_eq!(t.last_updated, Some(NOW));
        assert_eq!(t.source_url.as_deref(), Some("https://example.com"));
        assert!(t.error_message.is_none());
    }

    #[test]
    fn test_merge_success_clears_previous_error() {
        let mut tracker = Tracker::new("AAPL", 100.0, 200.0);
        tracker.error_message = Some(ERR_UPDATE_FAILED.to_string());
        let mut trackers = vec![tracker];

        apply_results(
            &mut trackers,
            &requested(&["AAPL"]),
            &[update("AAPL", Some(150.0), "Apple Inc.")],
            NOW,
        );
        assert!(trackers[0].error_message.is_none());
    }

    #[test]
    fn test_merge_unresolved_keeps_price_and_sets_error() {
        let mut tracker = Tracker::new("AAPL", 100.0, 200.0);
        tracker.current_price = Some(140.0);
        let mut trackers = vec![tracker];

        apply_results(
            &mut trackers,
            &requested(&["AAPL"]),
            &[update("AAPL", None, "AAPL")],
            NOW,
        );

        let t = &trackers[0];
        assert_eq!(t.current_price, Some(140.0));
        assert_eq!(t.error_message.as_deref(), Some(ERR_SYMBOL_UNAVAILABLE));
        assert_eq!(t.last_updated, Some(NOW));
    }

    #[test]
    fn test_merge_missing_result_counts_as_unresolved() {
        let mut trackers = vec![Tracker::new("MSFT", 100.0, 200.0)];
        apply_results(&mut trackers, &requested(&["MSFT"]), &[], NOW);
        assert_eq!(
            trackers[0].error_message.as_deref(),
            Some(ERR_SYMBOL_UNAVAILABLE)
        );
        assert!(trackers[0].current_price.is_none());
    }

    #[test]
    fn test_merge_empty_name_keeps_company_name() {
        let mut tracker = Tracker::new("AAPL", 100.0, 200.0);
        tracker.company_name = Some("Apple Inc.".to_string());
        let mut trackers = vec![tracker];

        apply_results(
            &mut trackers,
            &requested(&["AAPL"]),
            &[update("AAPL", Some(150.0), "")],
            NOW,
        );
        assert_eq!(trackers[0].company_name.as_deref(), Some("Apple Inc."));
        assert_eq!(trackers[0].current_price, Some(150.0));
    }

    #[test]
    fn test_merge_leaves_unrequested_trackers_untouched() {
        let mut aapl = Tracker::new("AAPL", 100.0, 200.0);
        aapl.current_price = Some(140.0);
        let other = Tracker::new("MSFT", 300.0, 400.0);
        let snapshot = other.clone();
        let mut trackers = vec![aapl, other];

        apply_results(
            &mut trackers,
            &requested(&["AAPL"]),
            &[update("AAPL", Some(150.0), "Apple Inc.")],
            NOW,
        );
        assert_eq!(trackers[1], snapshot);
    }

    #[test]
    fn test_batch_failure_marks_requested_only() {
        let mut aapl = Tracker::new("AAPL", 100.0, 200.0);
        aapl.current_price = Some(140.0);
        let msft = Tracker::new("MSFT", 300.0, 400.0);
        let snapshot = msft.clone();
        let mut trackers = vec![aapl, msft];

        apply_batch_failure(&mut trackers, &requested(&["AAPL"]), NOW);

        assert_eq!(trackers[0].current_price, Some(140.0));
        assert_eq!(trackers[0].error_message.as_deref(), Some(ERR_UPDATE_FAILED));
        assert_eq!(trackers[0].last_updated, Some(NOW));
        assert_eq!(trackers[1], snapshot);
    }

    #[test]
    fn test_shared_symbol_trackers_all_merge() {
        let mut trackers = vec![
            Tracker::new("AAPL", 100.0, 200.0),
            Tracker::new("AAPL", 50.0, 300.0),
        ];
        apply_results(
            &mut trackers,
            &requested(&["AAPL"]),
            &[update("AAPL", Some(150.0), "Apple Inc.")],
            NOW,
        );
        assert_eq!(trackers[0].current_price, Some(150.0));
        assert_eq!(trackers[1].current_price, Some(150.0));
    }

    #[test]
    fn test_active_symbols_dedups_and_skips_completed() {
        let mut done = Tracker::new("TSLA", 100.0, 200.0);
        done.is_completed = true;
        let trackers = vec![
            Tracker::new("AAPL", 100.0, 200.0),
            Tracker::new("AAPL", 50.0, 300.0),
            done,
            Tracker::new("MSFT", 300.0, 400.0),
        ];
        assert_eq!(active_symbols(&trackers), vec!["AAPL", "MSFT"]);
    }

    #[test]
    fn test_stale_symbols_uses_staleness_predicate() {
        let mut fresh = Tracker::new("AAPL", 100.0, 200.0);
        fresh.last_updated = Some(NOW - 1_000);
        let mut stale = Tracker::new("MSFT", 300.0, 400.0);
        stale.last_updated = Some(NOW - 3_600_001);
        let never = Tracker::new("NVDA", 500.0, 700.0);
        let trackers = vec![fresh, stale, never];

        assert_eq!(stale_symbols(&trackers, NOW), vec!["MSFT", "NVDA"]);
    }

    #[test]
    fn test_refresh_slot_single_occupancy() {
        let slot = RefreshSlot::new();
        let permit = slot.try_acquire();
        assert!(permit.is_some());
        assert!(slot.is_busy());
        // Second caller is rejected while the permit is held.
        assert!(slot.try_acquire().is_none());

        drop(permit);
        assert!(!slot.is_busy());
        assert!(slot.try_acquire().is_some());
    }
}
