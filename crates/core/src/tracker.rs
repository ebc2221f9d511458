use crate::events::{EventSlot, OneShot};
use crate::format::format_history;
use crate::records::{SleepSession, now_millis};
use crate::store::{SessionStore, run_blocking};
use anyhow::Result;
use log::{debug, error, info};
use serde::{Deserialize, Serialize};
use std::collections::VecDeque;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use tokio::sync::watch;
use tokio::task::JoinSet;

const HEALTH_CAP: usize = 16;

/// Everything the presentation layer needs to render the tracker screen,
/// recomputed and republished whenever the underlying state changes.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TrackerSnapshot {
    pub seq: u64,
    /// The current-session slot; `Some` while a session is active or has
    /// ended but not yet been acknowledged.
    pub tonight: Option<SleepSession>,
    /// Full history, most recent first.
    pub nights: Vec<SleepSession>,
    pub start_enabled: bool,
    pub stop_enabled: bool,
    pub clear_enabled: bool,
    pub history_text: String,
    /// Storage failures surfaced to the caller; state stays last-known-good.
    pub health: Vec<String>,
}

impl TrackerSnapshot {
    fn empty() -> Self {
        Self {
            seq: 0,
            tonight: None,
            nights: Vec::new(),
            start_enabled: true,
            stop_enabled: false,
            clear_enabled: false,
            history_text: format_history(&[], 0),
            health: Vec::new(),
        }
    }
}

struct TrackerInner {
    store: Arc<dyn SessionStore>,
    history_limit: usize,
    /// Logical operations run one at a time so each precondition check
    /// observes settled state, even when the UI double-taps.
    op_lock: tokio::sync::Mutex<()>,
    seq: AtomicU64,
    tonight: Mutex<Option<SleepSession>>,
    nights: Mutex<Vec<SleepSession>>,
    health: Mutex<VecDeque<String>>,
    snapshot_tx: watch::Sender<TrackerSnapshot>,
    snapshot_rx: watch::Receiver<TrackerSnapshot>,
    rate_session: EventSlot<i64>,
    cleared: EventSlot<()>,
}

impl TrackerInner {
    fn tonight(&self) -> Option<SleepSession> {
        self.tonight.lock().expect("tonight lock poisoned").clone()
    }

    fn set_tonight(&self, session: Option<SleepSession>) {
        *self.tonight.lock().expect("tonight lock poisoned") = session;
    }

    fn push_health(&self, msg: impl Into<String>) {
        let msg = msg.into();
        error!("tracker: {msg}");
        let mut buf = self.health.lock().expect("health lock poisoned");
        if buf.len() >= HEALTH_CAP {
            let _ = buf.pop_front();
        }
        buf.push_back(msg);
    }

    async fn refresh_nights(&self) -> Result<()> {
        let store = Arc::clone(&self.store);
        let nights = run_blocking(move || store.all()).await?;
        *self.nights.lock().expect("nights lock poisoned") = nights;
        Ok(())
    }

    fn publish(&self) {
        let tonight = self.tonight();
        let nights = self.nights.lock().expect("nights lock poisoned").clone();
        let health = self
            .health
            .lock()
            .expect("health lock poisoned")
            .iter()
            .cloned()
            .collect();
        let seq = self.seq.fetch_add(1, Ordering::Relaxed) + 1;
        let snap = TrackerSnapshot {
            seq,
            start_enabled: tonight.is_none(),
            stop_enabled: tonight.is_some(),
            clear_enabled: !nights.is_empty(),
            history_text: format_history(&nights, self.history_limit),
            tonight,
            nights,
            health,
        };
        let _ = self.snapshot_tx.send(snap);
    }
}

/// Owns the current-session lifecycle: Idle (no active session) and
/// Active (started, not ended). Start, stop and clear are issued from the
/// interactive context and run as background logical operations; their
/// effects publish in issue order. Dropping the manager cancels whatever
/// it still has in flight.
pub struct TrackerManager {
    inner: Arc<TrackerInner>,
    tasks: JoinSet<()>,
}

impl TrackerManager {
    /// Must be called within a Tokio runtime; the manager immediately
    /// loads the current slot and history from storage in the background.
    pub fn new(store: Arc<dyn SessionStore>, history_limit: usize) -> Self {
        let (snapshot_tx, snapshot_rx) = watch::channel(TrackerSnapshot::empty());
        let inner = Arc::new(TrackerInner {
            store,
            history_limit,
            op_lock: tokio::sync::Mutex::new(()),
            seq: AtomicU64::new(0),
            tonight: Mutex::new(None),
            nights: Mutex::new(Vec::new()),
            health: Mutex::new(VecDeque::new()),
            snapshot_tx,
            snapshot_rx,
            rate_session: EventSlot::new(),
            cleared: EventSlot::new(),
        });

        let mut tasks = JoinSet::new();
        let init = Arc::clone(&inner);
        tasks.spawn(async move {
            let _op = init.op_lock.lock().await;
            let store = Arc::clone(&init.store);
            match run_blocking(move || store.most_recent()).await {
                // Adopt the stored record only while it is still open.
                Ok(Some(session)) if session.is_active() => init.set_tonight(Some(session)),
                Ok(_) => {}
                Err(e) => init.push_health(format!("initial load failed: {e}")),
            }
            if let Err(e) = init.refresh_nights().await {
                init.push_health(format!("history load failed: {e}"));
            }
            init.publish();
        });

        Self { inner, tasks }
    }

    /// Begin a new session. A no-op when one is already active.
    pub fn start_tracking(&mut self) {
        let inner = Arc::clone(&self.inner);
        self.tasks.spawn(async move {
            let _op = inner.op_lock.lock().await;
            if inner.tonight().is_some() {
                debug!("start ignored: a session is already active");
                return;
            }

            let store = Arc::clone(&inner.store);
            let outcome = async {
                let session = SleepSession::begin();
                let insert_store = Arc::clone(&store);
                let id = run_blocking(move || insert_store.insert(&session)).await?;
                debug!("inserted session {id}");
                // Re-derive the slot from storage truth rather than trusting
                // the local object; another writer may have ended it already.
                let fetch_store = Arc::clone(&store);
                run_blocking(move || fetch_store.most_recent()).await
            }
            .await;

            match outcome {
                Ok(Some(session)) if session.is_active() => {
                    info!("session {} started", session.id);
                    inner.set_tonight(Some(session));
                }
                Ok(_) => debug!("freshly started session is no longer active; staying idle"),
                Err(e) => {
                    inner.push_health(format!("start failed: {e}"));
                    inner.publish();
                    return;
                }
            }

            if let Err(e) = inner.refresh_nights().await {
                inner.push_health(format!("history refresh failed: {e}"));
            }
            inner.publish();
        });
    }

    /// End the active session and raise the one-shot rate-session event.
    /// A no-op when nothing is active.
    pub fn stop_tracking(&mut self) {
        let inner = Arc::clone(&self.inner);
        self.tasks.spawn(async move {
            let _op = inner.op_lock.lock().await;
            let Some(mut session) = inner.tonight() else {
                debug!("stop ignored: no session in the slot");
                return;
            };
            if !session.is_active() {
                debug!("stop ignored: session {} already ended", session.id);
                return;
            }

            session.end_time = now_millis();
            let store = Arc::clone(&inner.store);
            let update = session.clone();
            match run_blocking(move || store.update(&update)).await {
                Ok(()) => {
                    info!("session {} ended", session.id);
                    let id = session.id;
                    inner.set_tonight(Some(session));
                    if let Err(e) = inner.refresh_nights().await {
                        inner.push_health(format!("history refresh failed: {e}"));
                    }
                    inner.rate_session.publish(id);
                }
                Err(e) => inner.push_health(format!("stop failed: {e}")),
            }
            inner.publish();
        });
    }

    /// Delete the entire history, reset the slot and raise the one-shot
    /// cleared notification.
    pub fn clear(&mut self) {
        let inner = Arc::clone(&self.inner);
        self.tasks.spawn(async move {
            let _op = inner.op_lock.lock().await;
            let store = Arc::clone(&inner.store);
            match run_blocking(move || store.clear()).await {
                Ok(()) => {
                    info!("sleep history cleared");
                    inner.set_tonight(None);
                    inner
                        .nights
                        .lock()
                        .expect("nights lock poisoned")
                        .clear();
                    inner.cleared.publish(());
                }
                Err(e) => inner.push_health(format!("clear failed: {e}")),
            }
            inner.publish();
        });
    }

    /// Acknowledge the rate-session navigation. Resets the event and, if
    /// the slot holds the ended session, returns the tracker to Idle.
    pub fn acknowledge_rate_session(&self) {
        self.inner.rate_session.reset();
        let slot_cleared = {
            let mut slot = self.inner.tonight.lock().expect("tonight lock poisoned");
            if slot.as_ref().is_some_and(|s| !s.is_active()) {
                *slot = None;
                true
            } else {
                false
            }
        };
        if slot_cleared {
            self.inner.publish();
        }
    }

    /// Acknowledge the cleared notification.
    pub fn acknowledge_cleared(&self) {
        self.inner.cleared.reset();
    }

    pub fn snapshot(&self) -> TrackerSnapshot {
        self.inner.snapshot_rx.borrow().clone()
    }

    pub fn watch_snapshot(&self) -> watch::Receiver<TrackerSnapshot> {
        self.inner.snapshot_rx.clone()
    }

    pub fn rate_session_event(&self) -> OneShot<i64> {
        self.inner.rate_session.get()
    }

    pub fn watch_rate_session(&self) -> watch::Receiver<OneShot<i64>> {
        self.inner.rate_session.watch()
    }

    pub fn cleared_event(&self) -> OneShot<()> {
        self.inner.cleared.get()
    }

    pub fn watch_cleared(&self) -> watch::Receiver<OneShot<()>> {
        self.inner.cleared.watch()
    }

    /// Wait for every operation issued so far to finish. Mostly useful to
    /// tests and to callers that want to drain before shutdown.
    pub async fn wait_idle(&mut self) {
        while self.tasks.join_next().await.is_some() {}
    }
}
