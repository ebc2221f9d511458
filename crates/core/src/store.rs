use crate::records::SleepSession;
use anyhow::{Result, anyhow};

/// The operation set the managers require from persistence. Methods are
/// synchronous and may touch disk; callers must route them through
/// [`run_blocking`] so the interactive context never stalls.
///
/// The implementation owns serialization of conflicting writes; callers
/// get last-write-wins semantics for races on the same record.
pub trait SessionStore: Send + Sync {
    /// Persist a new record and return the id storage assigned to it.
    fn insert(&self, session: &SleepSession) -> Result<i64>;
    /// Overwrite the stored record matching `session.id`. Errors if the id
    /// is absent.
    fn update(&self, session: &SleepSession) -> Result<()>;
    /// The record with the greatest start time, if any exist.
    fn most_recent(&self) -> Result<Option<SleepSession>>;
    fn by_key(&self, id: i64) -> Result<Option<SleepSession>>;
    /// Every record, most recent first.
    fn all(&self) -> Result<Vec<SleepSession>>;
    /// Delete every record. Irreversible.
    fn clear(&self) -> Result<()>;
}

/// Run one store closure on the blocking worker pool and resume here with
/// its result. Sequencing two calls keeps their effects strictly ordered
/// even though execution hops off the interactive context.
pub async fn run_blocking<T, F>(f: F) -> Result<T>
where
    F: FnOnce() -> Result<T> + Send + 'static,
    T: Send + 'static,
{
    match tokio::task::spawn_blocking(f).await {
        Ok(result) => result,
        Err(e) => Err(anyhow!("storage worker task failed: {e}")),
    }
}
