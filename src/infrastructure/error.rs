use thiserror::Error;

#[derive(Debug, Error)]
pub enum InfraError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
    #[error("SQLite error: {0}")]
    Sqlite(#[from] rusqlite::Error),
    #[error("Invalid config: {0}")]
    InvalidConfig(String),
    #[error("Storage unavailable: {0}")]
    StorageUnavailable(String),
    #[error("Lock poisoned: {0}")]
    LockPoisoned(String),
    #[error("Runtime unavailable: {0}")]
    Runtime(String),
}
