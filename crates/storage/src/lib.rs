use anyhow::Result;
use once_cell::sync::OnceCell;
use std::path::Path;
use std::sync::Arc;

use crate::sqlite3::SqliteSessionStore;

pub mod sqlite3;

static STORE: OnceCell<Arc<SqliteSessionStore>> = OnceCell::new();

/// Process-wide storage handle. The first caller opens the database at
/// `db_path`; every later caller (any thread) gets the same handle, and
/// racing first callers observe exactly one construction. The handle
/// lives until the process exits.
pub fn session_store(db_path: &Path) -> Result<Arc<SqliteSessionStore>> {
    let store = STORE.get_or_try_init(|| SqliteSessionStore::open(db_path).map(Arc::new))?;
    Ok(Arc::clone(store))
}
