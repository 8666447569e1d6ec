//! Error types for pathscope-core

use thiserror::Error;

/// Main error type for the pathscope-core library
#[derive(Error, Debug)]
pub enum Error {
    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON parsing error
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// Configuration error
    #[error("configuration error: {0}")]
    Config(String),

    /// Delivery channel failure (connect, read or write)
    #[error("transport error: {0}")]
    Transport(String),

    /// A command was issued while no connection was open
    #[error("not connected to the event source")]
    NotConnected,

    /// A start-run command was issued while a run is still in progress
    #[error("a run is already in progress")]
    RunInProgress,

    /// The snapshot store stopped accepting input
    #[error("snapshot store is no longer running")]
    StoreClosed,

    /// Persisted preference could not be read or written
    #[error("preferences error: {0}")]
    Preferences(String),
}

/// Result type alias for pathscope-core
pub type Result<T> = std::result::Result<T, Error>;
