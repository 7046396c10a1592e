//! Tracker lifecycle tests against a scratch database: persistence, sweep
//! selection, result merging and export/import.

use std::collections::HashSet;

use app_lib::commands::transfer_cmd::parse_tracker_export;
use app_lib::db::database::Database;
use app_lib::models::tracker::Tracker;
use app_lib::services::price_service::{PriceService, PriceUpdate};
use app_lib::services::refresh_service;

fn scratch_db() -> Database {
    let dir = std::env::temp_dir().join(format!("price-tracker-it-{}", uuid::Uuid::new_v4()));
    Database::new(dir).expect("scratch database")
}

fn resolved(symbol: &str, price: f64, name: &str) -> PriceUpdate {
    PriceUpdate {
        symbol: symbol.to_string(),
        price: Some(price),
        name: name.to_string(),
        source_url: Some("https://finance.example.com".to_string()),
        source_title: Some("Example Finance".to_string()),
    }
}

// ==================== Persistence + merge ====================

#[test]
fn test_lifecycle_add_merge_reload() {
    let db = scratch_db();
    let now = refresh_service::now_ms();

    // Two trackers, newest prepended like the add command does.
    let mut trackers = vec![Tracker::new("MSFT", 300.0, 400.0)];
    trackers.insert(0, Tracker::new("AAPL", 100.0, 200.0));
    db.save_trackers(&trackers).unwrap();

    let requested: HashSet<String> = ["AAPL".to_string(), "MSFT".to_string()].into();
    let results = vec![
        resolved("AAPL", 150.0, "Apple Inc."),
        resolved("MSFT", 350.0, "Microsoft Corporation"),
    ];
    refresh_service::apply_results(&mut trackers, &requested, &results, now);
    db.save_trackers(&trackers).unwrap();

    let reloaded = db.load_trackers().unwrap();
    assert_eq!(reloaded, trackers);
    assert_eq!(reloaded[0].symbol, "AAPL");
    assert_eq!(reloaded[0].current_price, Some(150.0));
    assert_eq!(reloaded[0].company_name.as_deref(), Some("Apple Inc."));
    assert_eq!(reloaded[0].progress(), Some(50.0));
    assert!(reloaded[0].error_message.is_none());
    assert_eq!(reloaded[0].last_updated, Some(now));
}

#[test]
fn test_failed_batch_throttles_next_sweep() {
    let now = refresh_service::now_ms();
    let mut trackers = vec![Tracker::new("BADSYM", 1.0, 2.0)];
    assert_eq!(refresh_service::stale_symbols(&trackers, now), vec!["BADSYM"]);

    let requested: HashSet<String> = ["BADSYM".to_string()].into();
    refresh_service::apply_batch_failure(&mut trackers, &requested, now);

    // The failure moved last_updated, so the symbol is out of the next sweep
    // for the rest of the hour even though it never resolved a price.
    assert!(trackers[0].error_message.is_some());
    assert!(refresh_service::stale_symbols(&trackers, now + 5 * 60 * 1000).is_empty());
    assert_eq!(
        refresh_service::stale_symbols(&trackers, now + 3_600_001),
        vec!["BADSYM"]
    );
}

#[test]
fn test_unresolved_then_resolved_round() {
    let now = refresh_service::now_ms();
    let mut trackers = vec![Tracker::new("AAPL", 100.0, 200.0)];
    let requested: HashSet<String> = ["AAPL".to_string()].into();

    let unresolved = PriceUpdate {
        symbol: "AAPL".to_string(),
        price: None,
        name: "AAPL".to_string(),
        source_url: None,
        source_title: None,
    };
    refresh_service::apply_results(&mut trackers, &requested, &[unresolved], now);
    assert!(trackers[0].error_message.is_some());
    assert!(trackers[0].current_price.is_none());

    refresh_service::apply_results(
        &mut trackers,
        &requested,
        &[resolved("AAPL", 150.0, "Apple Inc.")],
        now + 1,
    );
    assert!(trackers[0].error_message.is_none());
    assert_eq!(trackers[0].current_price, Some(150.0));
    assert_eq!(trackers[0].source_url.as_deref(), Some("https://finance.example.com"));
}

// ==================== Export / import ====================

#[test]
fn test_export_import_replaces_list_wholesale() {
    let db = scratch_db();
    let mut original = vec![Tracker::new("AAPL", 100.0, 200.0)];
    original[0].current_price = Some(150.0);
    original[0].last_updated = Some(1_700_000_000_000);
    db.save_trackers(&original).unwrap();

    let exported = serde_json::to_string_pretty(&original).unwrap();
    let imported = parse_tracker_export(&exported).unwrap();
    assert_eq!(imported, original);

    // A wholesale replacement drops everything that was there before.
    let replacement = vec![Tracker::new("ETH-USD", 2_000.0, 5_000.0)];
    db.save_trackers(&replacement).unwrap();
    let reloaded = db.load_trackers().unwrap();
    assert_eq!(reloaded.len(), 1);
    assert_eq!(reloaded[0].symbol, "ETH-USD");
}

#[test]
fn test_malformed_import_is_detected_before_any_state_change() {
    assert!(parse_tracker_export(r#"{"not": "an array"}"#).is_err());
    assert!(parse_tracker_export(r#"[{"id": "a", "startPrice": 1.0}]"#).is_err());
}

// ==================== Ingestion boundary ====================

#[tokio::test]
async fn test_fetch_prices_empty_batch_needs_no_network() {
    let results = PriceService::fetch_prices(&[], "no-key-needed").await.unwrap();
    assert!(results.is_empty());
}
