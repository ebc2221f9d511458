use std::path::{Path, PathBuf};

const SESSION_DB_NAME: &str = "sleep-history.sqlite3";

pub fn session_db(workspace_dir: &Path) -> PathBuf {
    workspace_dir.join(SESSION_DB_NAME)
}
