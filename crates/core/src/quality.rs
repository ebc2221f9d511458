use crate::events::{EventSlot, OneShot};
use crate::records::{QUALITY_MAX, QUALITY_MIN};
use crate::store::{SessionStore, run_blocking};
use log::{debug, error, warn};
use std::sync::Arc;
use tokio::sync::watch;
use tokio::task::JoinSet;

struct QualityInner {
    store: Arc<dyn SessionStore>,
    session_id: i64,
    op_lock: tokio::sync::Mutex<()>,
    back_to_tracker: EventSlot<()>,
    error_tx: watch::Sender<Option<String>>,
    error_rx: watch::Receiver<Option<String>>,
}

/// Applies a rating to one past session, then raises the one-shot
/// back-to-tracker event. If the record was cleared in the meantime the
/// operation is silently abandoned and the event still fires, so the
/// rating screen always gets its exit signal.
pub struct QualityManager {
    inner: Arc<QualityInner>,
    tasks: JoinSet<()>,
}

impl QualityManager {
    pub fn new(store: Arc<dyn SessionStore>, session_id: i64) -> Self {
        let (error_tx, error_rx) = watch::channel(None);
        Self {
            inner: Arc::new(QualityInner {
                store,
                session_id,
                op_lock: tokio::sync::Mutex::new(()),
                back_to_tracker: EventSlot::new(),
                error_tx,
                error_rx,
            }),
            tasks: JoinSet::new(),
        }
    }

    pub fn session_id(&self) -> i64 {
        self.inner.session_id
    }

    pub fn set_quality(&mut self, rating: i32) {
        let inner = Arc::clone(&self.inner);
        self.tasks.spawn(async move {
            let _op = inner.op_lock.lock().await;
            let id = inner.session_id;

            if !(QUALITY_MIN..=QUALITY_MAX).contains(&rating) {
                // Same exit path as a vanished record: nothing written,
                // navigation still fires.
                warn!("ignoring out-of-range quality {rating} for session {id}");
                inner.back_to_tracker.publish(());
                return;
            }

            let store = Arc::clone(&inner.store);
            let result = run_blocking(move || {
                let Some(mut session) = store.by_key(id)? else {
                    return Ok(false);
                };
                session.quality = rating;
                store.update(&session)?;
                Ok(true)
            })
            .await;

            match result {
                Ok(updated) => {
                    if updated {
                        debug!("session {id} rated {rating}");
                    } else {
                        debug!("session {id} gone before rating; abandoning");
                    }
                    let _ = inner.error_tx.send(None);
                    inner.back_to_tracker.publish(());
                }
                Err(e) => {
                    error!("quality update for session {id} failed: {e}");
                    let _ = inner.error_tx.send(Some(format!("rating update failed: {e}")));
                }
            }
        });
    }

    /// Reset the navigation event after the caller handled it.
    pub fn acknowledge_navigation(&self) {
        self.inner.back_to_tracker.reset();
    }

    pub fn navigation(&self) -> OneShot<()> {
        self.inner.back_to_tracker.get()
    }

    pub fn watch_navigation(&self) -> watch::Receiver<OneShot<()>> {
        self.inner.back_to_tracker.watch()
    }

    /// Last storage failure, if the most recent operation had one.
    pub fn watch_errors(&self) -> watch::Receiver<Option<String>> {
        self.inner.error_rx.clone()
    }

    pub async fn wait_idle(&mut self) {
        while self.tasks.join_next().await.is_some() {}
    }
}
