use thiserror::Error;

/// Errors produced by transport operations.
///
/// `RateLimited` and `AuthChallenge` are expected, recoverable conditions
/// the caller reacts to; everything else is reported as-is. Retries are the
/// caller's business — nothing here retries internally.
#[derive(Debug, Error)]
pub enum TransportError {
    #[error("connection failed: {0}")]
    ConnectionFailed(String),

    #[error("not connected")]
    NotConnected,

    #[error("authentication failed: {0}")]
    Auth(String),

    #[error("a second factor is required to complete login")]
    AuthChallenge,

    #[error("rate limited: wait {wait_secs}s")]
    RateLimited { wait_secs: u32 },

    #[error("send failed: {0}")]
    SendFailed(String),

    #[error("transport worker is gone")]
    WorkerGone,
}

pub type Result<T> = std::result::Result<T, TransportError>;
