//! End-to-end behaviour of the lookup and watchlist services over an
//! in-memory store.

use chrono::{TimeZone, Utc};
use core_types::{fallback_watchlist, LookupOutcome, UnavailableReason, WatchlistAction};
use database::{ArtifactPublisher, ArtifactStore, MemoryRepository, WatchlistStore};
use pretty_assertions::assert_eq;
use serde_json::json;
use services::{FallbackCause, ListingSource, LookupService, WatchlistService};
use std::sync::Arc;
use std::time::{Duration, Instant};

const TIMEOUT: Duration = Duration::from_millis(250);

fn lookup_over(repo: &Arc<MemoryRepository>) -> LookupService {
    LookupService::new(Some(repo.clone() as Arc<dyn ArtifactStore>), TIMEOUT)
}

fn watchlist_over(repo: &Arc<MemoryRepository>) -> WatchlistService {
    WatchlistService::new(Some(repo.clone() as Arc<dyn WatchlistStore>), TIMEOUT)
}

fn codes(entries: &[core_types::WatchlistEntry]) -> Vec<String> {
    entries.iter().map(|e| e.code.clone()).collect()
}

#[tokio::test]
async fn unknown_codes_are_pending() {
    let repo = Arc::new(MemoryRepository::new());
    let lookup = lookup_over(&repo);

    for code in ["000001", "600519", "688981", "430047"] {
        match lookup.lookup(code).await.unwrap() {
            LookupOutcome::Pending { message } => assert!(!message.is_empty()),
            other => panic!("{code}: expected pending, got {:?}", other),
        }
    }
}

#[tokio::test]
async fn published_artifact_is_ready_with_metadata() {
    let repo = Arc::new(MemoryRepository::new());
    let updated_at = repo
        .publish_artifact("688981", &json!({"score": 65, "price": 48.2}))
        .await
        .unwrap();

    let LookupOutcome::Ready(document) = lookup_over(&repo).lookup("688981").await.unwrap() else {
        panic!("expected ready");
    };
    let value = document.into_value();

    assert_eq!(value["score"], json!(65));
    assert_eq!(
        value["lastUpdated"],
        json!(updated_at.to_rfc3339_opts(chrono::SecondsFormat::Millis, true))
    );
    let news = value["news"].as_array().unwrap();
    assert_eq!(news.len(), 1);
    assert_eq!(news[0]["type"], json!("系统"));
    assert!(!news[0]["title"].as_str().unwrap().is_empty());
}

#[tokio::test]
async fn producer_news_survives_lookup() {
    let repo = Arc::new(MemoryRepository::new());
    let stamp = Utc.with_ymd_and_hms(2024, 6, 3, 8, 0, 0).unwrap();
    repo.insert_artifact_row(
        "300750",
        json!({"news": [{"type": "研报", "title": "维持买入评级", "time": "2小时前"}]}),
        stamp,
    );

    let LookupOutcome::Ready(document) = lookup_over(&repo).lookup("300750").await.unwrap() else {
        panic!("expected ready");
    };
    assert_eq!(document.get("news").unwrap()[0]["type"], json!("研报"));
    assert_eq!(document.get("lastUpdated"), Some(&json!("2024-06-03T08:00:00.000Z")));
}

#[tokio::test]
async fn slow_store_times_out_as_unavailable() {
    let repo = Arc::new(MemoryRepository::new());
    repo.set_latency(Duration::from_secs(5));

    let started = Instant::now();
    let outcome = lookup_over(&repo).lookup("600519").await.unwrap();

    assert!(started.elapsed() < Duration::from_secs(2));
    match outcome {
        LookupOutcome::Unavailable(reason) => {
            assert!(reason.is_transient());
            assert!(reason.to_string().contains("Timed out"), "{reason}");
        }
        other => panic!("expected unavailable, got {:?}", other),
    }
}

#[tokio::test]
async fn unconfigured_store_surfaces_for_lookup_but_degrades_for_watchlist() {
    let lookup = LookupService::new(None, TIMEOUT);
    let watchlist = WatchlistService::new(None, TIMEOUT);

    assert_eq!(
        lookup.lookup("600519").await.unwrap(),
        LookupOutcome::Unavailable(UnavailableReason::NotConfigured)
    );

    let listing = watchlist.list().await;
    assert_eq!(listing.entries.len(), 3);
    assert_eq!(listing.entries, fallback_watchlist());
    assert_eq!(listing.source, ListingSource::Fallback(FallbackCause::NotConfigured));

    let outcome = watchlist
        .mutate(WatchlistAction::Add, "688981", Some("中芯国际"))
        .await
        .unwrap();
    assert!(!outcome.persisted);
    assert!(!outcome.changed);
    assert_eq!(watchlist.list().await.entries, fallback_watchlist());
}

#[tokio::test]
async fn add_then_list_puts_entry_at_head() {
    let repo = Arc::new(MemoryRepository::new());
    let watchlist = watchlist_over(&repo);

    watchlist
        .mutate(WatchlistAction::Add, "300750", Some("宁德时代"))
        .await
        .unwrap();
    watchlist
        .mutate(WatchlistAction::Add, "600519", Some("贵州茅台"))
        .await
        .unwrap();

    let listing = watchlist.list().await;
    assert_eq!(listing.source, ListingSource::Store);
    let head = &listing.entries[0];
    assert_eq!(head.code, "600519");
    assert_eq!(head.name.as_deref(), Some("贵州茅台"));
    assert!(head.added_at.is_some());
}

#[tokio::test]
async fn repeated_add_keeps_original_name() {
    let repo = Arc::new(MemoryRepository::new());
    let watchlist = watchlist_over(&repo);

    let once = watchlist
        .mutate(WatchlistAction::Add, "600519", Some("贵州茅台"))
        .await
        .unwrap();
    let twice = watchlist
        .mutate(WatchlistAction::Add, "600519", Some("茅台"))
        .await
        .unwrap();

    assert!(once.changed);
    assert!(!twice.changed);
    assert_eq!(once.entries, twice.entries);
    assert_eq!(twice.entries[0].name.as_deref(), Some("贵州茅台"));
}

#[tokio::test]
async fn removing_absent_code_is_a_successful_no_op() {
    let repo = Arc::new(MemoryRepository::new());
    let watchlist = watchlist_over(&repo);
    watchlist
        .mutate(WatchlistAction::Add, "000001", Some("平安银行"))
        .await
        .unwrap();

    let outcome = watchlist
        .mutate(WatchlistAction::Remove, "999999", None)
        .await
        .unwrap();

    assert!(outcome.persisted);
    assert!(!outcome.changed);
    assert_eq!(codes(&outcome.entries), vec!["000001".to_string()]);
}

#[tokio::test]
async fn removing_last_entry_returns_empty_list_but_listing_falls_back() {
    let repo = Arc::new(MemoryRepository::new());
    let watchlist = watchlist_over(&repo);
    watchlist
        .mutate(WatchlistAction::Add, "000001", Some("平安银行"))
        .await
        .unwrap();

    let outcome = watchlist
        .mutate(WatchlistAction::Remove, "000001", None)
        .await
        .unwrap();
    assert!(outcome.changed);
    assert!(outcome.entries.is_empty());

    let listing = watchlist.list().await;
    assert_eq!(listing.source, ListingSource::Fallback(FallbackCause::Empty));
}

#[tokio::test]
async fn outage_during_list_serves_fallback() {
    let repo = Arc::new(MemoryRepository::new());
    let watchlist = watchlist_over(&repo);
    watchlist
        .mutate(WatchlistAction::Add, "688981", Some("中芯国际"))
        .await
        .unwrap();

    repo.fail_with("connection reset by peer");
    let listing = watchlist.list().await;

    assert_eq!(listing.entries, fallback_watchlist());
    assert!(matches!(
        listing.source,
        ListingSource::Fallback(FallbackCause::Unavailable(ref msg)) if msg.contains("connection reset")
    ));
}

#[tokio::test]
async fn concurrent_adds_of_one_code_store_a_single_entry() {
    let repo = Arc::new(MemoryRepository::new());
    let watchlist = watchlist_over(&repo);

    let handles: Vec<_> = (0..8)
        .map(|i| {
            let watchlist = watchlist.clone();
            tokio::spawn(async move {
                let name = format!("name-{i}");
                watchlist
                    .mutate(WatchlistAction::Add, "600519", Some(name.as_str()))
                    .await
            })
        })
        .collect();

    let mut inserted = 0;
    for handle in handles {
        if handle.await.unwrap().unwrap().changed {
            inserted += 1;
        }
    }

    assert_eq!(inserted, 1);
    assert_eq!(watchlist.list().await.entries.len(), 1);
}
