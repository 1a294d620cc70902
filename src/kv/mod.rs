use thiserror::Error;

pub mod memory;
pub mod sqlite;

/// Durable string slots addressed by key. `set` replaces the whole value;
/// readers never observe a partially written one.
pub trait KeyValueStore: Send + Sync {
    fn get(&self, key: &str) -> Result<Option<String>, KvError>;
    fn set(&self, key: &str, value: &str) -> Result<(), KvError>;

    /// Whether another process changed the store since the previous call.
    /// Stores that live inside this process never report one.
    fn take_external_change(&self) -> Result<bool, KvError> {
        Ok(false)
    }
}

#[derive(Debug, Error)]
pub enum KvError {
    #[error("sqlite: {0}")]
    Sqlite(#[from] rusqlite::Error),
}
