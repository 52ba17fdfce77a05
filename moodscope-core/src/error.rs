//! Error types for moodscope-core

use thiserror::Error;

/// Main error type for the moodscope-core library
#[derive(Error, Debug)]
pub enum Error {
    /// Database error
    #[error("database error: {0}")]
    Database(#[from] rusqlite::Error),

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON parsing error
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// Configuration error
    #[error("configuration error: {0}")]
    Config(String),

    /// Invalid analysis window (bad year/month input)
    #[error("invalid analysis window: {0}")]
    InvalidWindow(String),

    /// Journal entry fetch failed
    #[error("entry fetch error: {0}")]
    EntryFetch(String),

    /// Narrative summarizer failure (upstream error or timeout)
    #[error("summarizer error: {0}")]
    Summarizer(String),

    /// Digest upsert failed after a successful summarizer call
    #[error("persistence error: {0}")]
    Persistence(String),

    /// Notification webhook error
    #[error("notifier error: {0}")]
    Notify(String),
}

/// Result type alias for moodscope-core
pub type Result<T> = std::result::Result<T, Error>;
