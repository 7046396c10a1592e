use serde::{Deserialize, Serialize};

/// A tracker is considered stale one hour after its last fetch attempt.
pub const STALE_AFTER_MS: i64 = 60 * 60 * 1000;

/// One tracked instrument: a user-defined start/target price range plus the
/// latest fetched price state. Serialized camelCase for the webview and for
/// export files.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Tracker {
    pub id: String,
    /// Ticker symbol, uppercased at creation, immutable afterwards.
    pub symbol: String,
    pub start_price: f64,
    /// May be above or below start_price (bullish or bearish goal).
    pub target_price: f64,
    /// Last known price; None if never fetched or never resolved.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub current_price: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub company_name: Option<String>,
    /// Epoch milliseconds of the most recent fetch attempt, success or failure.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_updated: Option<i64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub source_url: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub source_title: Option<String>,
    /// Present iff the most recent fetch attempt failed to resolve a price.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error_message: Option<String>,
    /// Completed trackers are excluded from the active group and auto-refresh.
    #[serde(default)]
    pub is_completed: bool,
}

impl Tracker {
    pub fn new(symbol: &str, start_price: f64, target_price: f64) -> Self {
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            symbol: symbol.trim().to_uppercase(),
            start_price,
            target_price,
            current_price: None,
            company_name: None,
            last_updated: None,
            source_url: None,
            source_title: None,
            error_message: None,
            is_completed: false,
        }
    }

    /// Progress from start toward target in percent, None without a price.
    /// A zero-width range is defined as 0 rather than an error.
    pub fn progress(&self) -> Option<f64> {
        let current = self.current_price?;
        let range = self.target_price - self.start_price;
        if range == 0.0 {
            return Some(0.0);
        }
        Some((current - self.start_price) / range * 100.0)
    }

    /// Eligible for the automatic refresh sweep. Throttled on attempt time,
    /// not on success: a tracker that failed five minutes ago is not retried
    /// for the rest of the hour.
    pub fn is_stale(&self, now_ms: i64) -> bool {
        if self.is_completed {
            return false;
        }
        match self.last_updated {
            None => true,
            Some(at) => now_ms - at > STALE_AFTER_MS,
        }
    }
}

/// Presentation-only ordering for the tracker list. Insertion keeps the
/// stored order (new trackers are prepended at creation, so newest stays
/// first); the progress modes never mutate stored order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
pub enum SortMode {
    #[default]
    #[serde(rename = "insertion")]
    Insertion,
    #[serde(rename = "progress_desc")]
    ProgressDesc,
    #[serde(rename = "progress_asc")]
    ProgressAsc,
}

/// Sort a display copy of the list. Trackers with no resolved price order
/// below every defined progress value, so they sink to the bottom in
/// descending mode.
pub fn sort_for_display(trackers: &mut [Tracker], mode: SortMode) {
    match mode {
        SortMode::Insertion => {}
        SortMode::ProgressDesc => {
            trackers.sort_by(|a, b| cmp_progress(b.progress(), a.progress()))
        }
        SortMode::ProgressAsc => {
            trackers.sort_by(|a, b| cmp_progress(a.progress(), b.progress()))
        }
    }
}

fn cmp_progress(a: Option<f64>, b: Option<f64>) -> std::cmp::Ordering {
    use std::cmp::Ordering;
    match (a, b) {
        (None, None) => Ordering::Equal,
        (None, Some(_)) => Ordering::Less,
        (Some(_), None) => Ordering::Greater,
        (Some(x), Some(y)) => x.partial_cmp(&y).unwrap_or(Ordering::Equal),
    }
}
