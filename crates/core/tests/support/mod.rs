#![allow(dead_code)]

use anyhow::{Result, bail};
use chrono::{Duration, TimeZone, Utc};
use somnia_core::records::SleepSession;
use somnia_core::store::SessionStore;
use std::sync::{Arc, Mutex};

#[derive(Default)]
struct Inner {
    sessions: Vec<SleepSession>,
    next_id: i64,
    fail_inserts: bool,
    fail_updates: bool,
    complete_on_insert: bool,
}

/// In-memory stand-in for the SQLite store, with knobs to simulate I/O
/// failures and a concurrent writer ending sessions behind our back.
#[derive(Default)]
pub struct MemoryStore {
    inner: Mutex<Inner>,
}

impl MemoryStore {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn seed(&self, sessions: impl IntoIterator<Item = SleepSession>) {
        let mut inner = self.inner.lock().unwrap();
        for mut session in sessions {
            inner.next_id += 1;
            session.id = inner.next_id;
            inner.sessions.push(session);
        }
    }

    pub fn sessions(&self) -> Vec<SleepSession> {
        self.inner.lock().unwrap().sessions.clone()
    }

    pub fn fail_inserts(&self, fail: bool) {
        self.inner.lock().unwrap().fail_inserts = fail;
    }

    pub fn fail_updates(&self, fail: bool) {
        self.inner.lock().unwrap().fail_updates = fail;
    }

    /// Every inserted session is immediately ended, as if another manager
    /// stopped it before the re-fetch.
    pub fn complete_on_insert(&self, enabled: bool) {
        self.inner.lock().unwrap().complete_on_insert = enabled;
    }
}

impl SessionStore for MemoryStore {
    fn insert(&self, session: &SleepSession) -> Result<i64> {
        let mut inner = self.inner.lock().unwrap();
        if inner.fail_inserts {
            bail!("simulated insert failure");
        }
        inner.next_id += 1;
        let mut stored = session.clone();
        stored.id = inner.next_id;
        if inner.complete_on_insert {
            stored.end_time = stored.start_time + Duration::minutes(1);
        }
        let id = stored.id;
        inner.sessions.push(stored);
        Ok(id)
    }

    fn update(&self, session: &SleepSession) -> Result<()> {
        let mut inner = self.inner.lock().unwrap();
        if inner.fail_updates {
            bail!("simulated update failure");
        }
        match inner.sessions.iter_mut().find(|s| s.id == session.id) {
            Some(stored) => {
                *stored = session.clone();
                Ok(())
            }
            None => bail!("no session with id {}", session.id),
        }
    }

    fn most_recent(&self) -> Result<Option<SleepSession>> {
        let inner = self.inner.lock().unwrap();
        Ok(inner
            .sessions
            .iter()
            .max_by_key(|s| (s.start_time, s.id))
            .cloned())
    }

    fn by_key(&self, id: i64) -> Result<Option<SleepSession>> {
        let inner = self.inner.lock().unwrap();
        Ok(inner.sessions.iter().find(|s| s.id == id).cloned())
    }

    fn all(&self) -> Result<Vec<SleepSession>> {
        let inner = self.inner.lock().unwrap();
        let mut out = inner.sessions.clone();
        out.sort_by(|a, b| (b.start_time, b.id).cmp(&(a.start_time, a.id)));
        Ok(out)
    }

    fn clear(&self) -> Result<()> {
        self.inner.lock().unwrap().sessions.clear();
        Ok(())
    }
}

/// A completed, unrated session starting `hours_ago` hours before now.
pub fn completed_session(hours_ago: i64, slept_minutes: i64) -> SleepSession {
    let start = Utc
        .timestamp_millis_opt(Utc::now().timestamp_millis())
        .unwrap()
        - Duration::hours(hours_ago);
    let mut session = SleepSession::begin_at(start);
    session.end_time = session.start_time + Duration::minutes(slept_minutes);
    session
}
