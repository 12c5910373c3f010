use thiserror::Error;

/// Errors surfaced by the broadcast subsystem before or outside a run.
///
/// Per-send failures never appear here — they are contained inside the run
/// loop and reported through the event sink.
#[derive(Debug, Error)]
pub enum BroadcastError {
    /// The job parameters cannot produce a valid run.
    #[error("invalid broadcast configuration: {0}")]
    InvalidConfig(String),

    /// A job is already running or stopping; only one run at a time.
    #[error("a broadcast is already running")]
    AlreadyRunning,

    /// Underlying SQLite / rusqlite error.
    #[error("Database error: {0}")]
    Database(#[from] rusqlite::Error),

    /// No template with the given ID exists in the store.
    #[error("Template not found: {id}")]
    TemplateNotFound { id: String },
}

pub type Result<T> = std::result::Result<T, BroadcastError>;
