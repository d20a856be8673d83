//! Error types for the core library

use thiserror::Error;

#[derive(Error, Debug)]
pub enum Error {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Database error: {0}")]
    Database(String),

    #[error("Corrupt value in column {column}: {detail}")]
    CorruptRow {
        column: &'static str,
        detail: String,
    },

    #[error("Storage error: {0}")]
    Storage(String),

    /// A staged replace or remove found no row to change at commit time
    #[error("Task {0} no longer exists")]
    Missing(uuid::Uuid),

    #[error("Operation cancelled")]
    Cancelled,

    #[error("Blocking task failed: {0}")]
    Join(#[from] tokio::task::JoinError),
}

impl From<rusqlite::Error> for Error {
    fn from(e: rusqlite::Error) -> Self {
        Error::Database(e.to_string())
    }
}
