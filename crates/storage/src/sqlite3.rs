use anyhow::{Context, Result, bail};
use chrono::{TimeZone, Utc};
use log::debug;
use rusqlite::{Connection, OptionalExtension, Row, params};
use std::path::Path;
use std::sync::Mutex;

use somnia_core::records::SleepSession;
use somnia_core::store::SessionStore;

/// SQLite-backed session store. The connection sits behind a mutex, so
/// conflicting writes from independent managers serialize inside the
/// store; the last write wins.
pub struct SqliteSessionStore {
    conn: Mutex<Connection>,
}

impl SqliteSessionStore {
    pub fn open<P: AsRef<Path>>(db_path: P) -> Result<Self> {
        let db_path = db_path.as_ref();
        if let Some(parent) = db_path.parent() {
            std::fs::create_dir_all(parent)
                .with_context(|| format!("Failed to create directory: {:?}", parent))?;
        }

        let conn = Connection::open(db_path)
            .with_context(|| format!("Failed to open database: {:?}", db_path))?;
        Self::init_db(&conn)?;
        debug!("opened sleep history database at {:?}", db_path);

        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    fn init_db(conn: &Connection) -> Result<()> {
        conn.pragma_update(None, "journal_mode", "WAL")?;
        conn.pragma_update(None, "synchronous", "NORMAL")?;

        conn.execute_batch(
            "CREATE TABLE IF NOT EXISTS sleep_sessions (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                start_time_ms INTEGER NOT NULL,
                end_time_ms INTEGER NOT NULL,
                quality INTEGER NOT NULL DEFAULT -1
            );
            CREATE INDEX IF NOT EXISTS idx_sleep_sessions_start_time
                ON sleep_sessions(start_time_ms);",
        )?;
        Ok(())
    }

    fn conn(&self) -> std::sync::MutexGuard<'_, Connection> {
        self.conn.lock().expect("sqlite connection mutex poisoned")
    }
}

fn session_from_row(row: &Row<'_>) -> rusqlite::Result<(i64, i64, i64, i32)> {
    Ok((row.get(0)?, row.get(1)?, row.get(2)?, row.get(3)?))
}

fn build_session(id: i64, start_ms: i64, end_ms: i64, quality: i32) -> Result<SleepSession> {
    let start_time = Utc
        .timestamp_millis_opt(start_ms)
        .single()
        .context("Invalid start_time_ms in DB")?;
    let end_time = Utc
        .timestamp_millis_opt(end_ms)
        .single()
        .context("Invalid end_time_ms in DB")?;
    Ok(SleepSession {
        id,
        start_time,
        end_time,
        quality,
    })
}

const SELECT_FIELDS: &str = "id, start_time_ms, end_time_ms, quality";

impl SessionStore for SqliteSessionStore {
    fn insert(&self, session: &SleepSession) -> Result<i64> {
        let conn = self.conn();
        conn.execute(
            "INSERT INTO sleep_sessions (start_time_ms, end_time_ms, quality) VALUES (?, ?, ?)",
            params![
                session.start_time.timestamp_millis(),
                session.end_time.timestamp_millis(),
                session.quality,
            ],
        )
        .context("Failed to insert session")?;
        Ok(conn.last_insert_rowid())
    }

    fn update(&self, session: &SleepSession) -> Result<()> {
        let changed = self
            .conn()
            .execute(
                "UPDATE sleep_sessions SET start_time_ms = ?, end_time_ms = ?, quality = ? WHERE id = ?",
                params![
                    session.start_time.timestamp_millis(),
                    session.end_time.timestamp_millis(),
                    session.quality,
                    session.id,
                ],
            )
            .context("Failed to update session")?;
        if changed == 0 {
            bail!("no session with id {}", session.id);
        }
        Ok(())
    }

    fn most_recent(&self) -> Result<Option<SleepSession>> {
        let row = self
            .conn()
            .query_row(
                &format!(
                    "SELECT {SELECT_FIELDS} FROM sleep_sessions
                     ORDER BY start_time_ms DESC, id DESC LIMIT 1"
                ),
                [],
                session_from_row,
            )
            .optional()
            .context("Failed to fetch most recent session")?;
        match row {
            Some((id, start_ms, end_ms, quality)) => {
                Ok(Some(build_session(id, start_ms, end_ms, quality)?))
            }
            None => Ok(None),
        }
    }

    fn by_key(&self, id: i64) -> Result<Option<SleepSession>> {
        let row = self
            .conn()
            .query_row(
                &format!("SELECT {SELECT_FIELDS} FROM sleep_sessions WHERE id = ?"),
                [id],
                session_from_row,
            )
            .optional()
            .with_context(|| format!("Failed to fetch session {id}"))?;
        match row {
            Some((id, start_ms, end_ms, quality)) => {
                Ok(Some(build_session(id, start_ms, end_ms, quality)?))
            }
            None => Ok(None),
        }
    }

    fn all(&self) -> Result<Vec<SleepSession>> {
        let conn = self.conn();
        let mut stmt = conn.prepare(&format!(
            "SELECT {SELECT_FIELDS} FROM sleep_sessions
             ORDER BY start_time_ms DESC, id DESC"
        ))?;
        let mut rows = stmt.query([])?;
        let mut out = Vec::new();
        while let Some(row) = rows.next()? {
            let (id, start_ms, end_ms, quality) = session_from_row(row)?;
            out.push(build_session(id, start_ms, end_ms, quality)?);
        }
        Ok(out)
    }

    fn clear(&self) -> Result<()> {
        self.conn()
            .execute("DELETE FROM sleep_sessions", [])
            .context("Failed to clear sessions")?;
        Ok(())
    }
}
