mod support;

use somnia_core::events::OneShot;
use somnia_core::records::QUALITY_UNRATED;
use somnia_core::store::SessionStore;
use somnia_core::tracker::TrackerManager;
use std::time::Duration;
use support::{MemoryStore, completed_session};

#[tokio::test]
async fn initial_load_adopts_an_active_session() {
    let store = MemoryStore::new();
    store.seed([somnia_core::records::SleepSession::begin()]);

    let mut tracker = TrackerManager::new(store.clone(), 0);
    tracker.wait_idle().await;

    let snap = tracker.snapshot();
    assert!(snap.tonight.is_some());
    assert!(snap.stop_enabled);
    assert!(!snap.start_enabled);
    assert!(snap.clear_enabled);
}

#[tokio::test]
async fn initial_load_ignores_a_completed_session() {
    let store = MemoryStore::new();
    store.seed([completed_session(10, 480)]);

    let mut tracker = TrackerManager::new(store.clone(), 0);
    tracker.wait_idle().await;

    let snap = tracker.snapshot();
    assert!(snap.tonight.is_none());
    assert!(snap.start_enabled);
    assert!(snap.clear_enabled, "history exists even while idle");
}

#[tokio::test]
async fn start_inserts_and_adopts_the_new_session() {
    let store = MemoryStore::new();
    let mut tracker = TrackerManager::new(store.clone(), 0);
    tracker.wait_idle().await;

    tracker.start_tracking();
    tracker.wait_idle().await;

    let stored = store.sessions();
    assert_eq!(stored.len(), 1);
    assert!(stored[0].is_active());
    assert_eq!(stored[0].quality, QUALITY_UNRATED);

    let snap = tracker.snapshot();
    assert_eq!(snap.tonight.as_ref().map(|s| s.id), Some(stored[0].id));
    assert!(snap.stop_enabled);
    assert!(!snap.start_enabled);
}

#[tokio::test]
async fn repeated_start_inserts_a_single_record() {
    let store = MemoryStore::new();
    let mut tracker = TrackerManager::new(store.clone(), 0);
    tracker.wait_idle().await;

    tracker.start_tracking();
    tracker.start_tracking();
    tracker.wait_idle().await;

    assert_eq!(store.sessions().len(), 1);
    assert!(tracker.snapshot().stop_enabled);
}

#[tokio::test]
async fn stop_completes_the_session_and_raises_navigation() {
    let store = MemoryStore::new();
    let mut tracker = TrackerManager::new(store.clone(), 0);
    tracker.wait_idle().await;

    tracker.start_tracking();
    tracker.wait_idle().await;
    // Distinct end timestamp; the active invariant is exact equality.
    tokio::time::sleep(Duration::from_millis(10)).await;
    tracker.stop_tracking();
    tracker.wait_idle().await;

    let stored = store.sessions();
    assert_eq!(stored.len(), 1);
    assert!(stored[0].end_time > stored[0].start_time);
    assert_eq!(stored[0].quality, QUALITY_UNRATED);

    assert_eq!(tracker.rate_session_event(), OneShot::Pending(stored[0].id));

    // Acknowledging returns the tracker to Idle and retires the event.
    tracker.acknowledge_rate_session();
    assert_eq!(tracker.rate_session_event(), OneShot::Idle);
    let snap = tracker.snapshot();
    assert!(snap.tonight.is_none());
    assert!(snap.start_enabled);
}

#[tokio::test]
async fn stop_while_idle_is_a_safe_noop() {
    let store = MemoryStore::new();
    let mut tracker = TrackerManager::new(store.clone(), 0);
    tracker.wait_idle().await;

    tracker.stop_tracking();
    tracker.wait_idle().await;

    assert!(store.sessions().is_empty());
    assert_eq!(tracker.rate_session_event(), OneShot::Idle);
    let snap = tracker.snapshot();
    assert!(snap.start_enabled);
    assert!(!snap.stop_enabled);
}

#[tokio::test]
async fn clear_wipes_history_and_notifies_exactly_once() {
    let store = MemoryStore::new();
    store.seed([completed_session(30, 420), completed_session(6, 390)]);

    let mut tracker = TrackerManager::new(store.clone(), 0);
    tracker.wait_idle().await;
    assert!(tracker.snapshot().clear_enabled);

    let mut cleared_rx = tracker.watch_cleared();
    tracker.clear();
    tracker.wait_idle().await;

    assert!(store.all().expect("all").is_empty());
    let snap = tracker.snapshot();
    assert!(snap.tonight.is_none());
    assert!(!snap.clear_enabled);
    assert_eq!(snap.history_text, "No sleep history yet.");

    cleared_rx.changed().await.expect("cleared notification");
    assert!(cleared_rx.borrow().is_pending());

    tracker.acknowledge_cleared();
    assert_eq!(tracker.cleared_event(), OneShot::Idle);
    // A subscription opened after the acknowledge sees nothing pending.
    assert_eq!(*tracker.watch_cleared().borrow(), OneShot::Idle);
}

#[tokio::test]
async fn start_does_not_adopt_a_record_another_writer_already_ended() {
    let store = MemoryStore::new();
    store.complete_on_insert(true);

    let mut tracker = TrackerManager::new(store.clone(), 0);
    tracker.wait_idle().await;

    tracker.start_tracking();
    tracker.wait_idle().await;

    // The insert landed, but the re-fetched record is no longer active,
    // so the slot stays empty.
    assert_eq!(store.sessions().len(), 1);
    let snap = tracker.snapshot();
    assert!(snap.tonight.is_none());
    assert!(snap.start_enabled);
}

#[tokio::test]
async fn insert_failure_keeps_last_known_good_state() {
    let store = MemoryStore::new();
    store.fail_inserts(true);

    let mut tracker = TrackerManager::new(store.clone(), 0);
    tracker.wait_idle().await;

    tracker.start_tracking();
    tracker.wait_idle().await;

    assert!(store.sessions().is_empty());
    let snap = tracker.snapshot();
    assert!(snap.tonight.is_none());
    assert!(snap.start_enabled);
    assert!(
        snap.health.iter().any(|m| m.contains("start failed")),
        "failure should surface in health: {:?}",
        snap.health
    );
}

#[tokio::test]
async fn history_text_respects_the_limit() {
    let store = MemoryStore::new();
    store.seed((1..=4).map(|i| completed_session(i * 24, 400)));

    let mut tracker = TrackerManager::new(store.clone(), 2);
    tracker.wait_idle().await;

    let snap = tracker.snapshot();
    assert_eq!(snap.nights.len(), 4);
    assert_eq!(snap.history_text.lines().count(), 3);
    assert!(snap.history_text.contains("... and 2 more"));
}

#[tokio::test]
async fn dropping_the_manager_closes_its_watchers() {
    let store = MemoryStore::new();
    let mut tracker = TrackerManager::new(store.clone(), 0);
    tracker.wait_idle().await;

    let mut rx = tracker.watch_snapshot();
    drop(tracker);

    assert!(rx.changed().await.is_err(), "sender should be gone");
}
