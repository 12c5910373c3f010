//! `herald-telegram` — Telegram implementation of the transport seam.
//!
//! Wraps a teloxide `Bot` behind the [`herald_transport::Transport`] trait.
//! Bot identities authenticate with a token, so the whole client is driven
//! from the transport worker thread like any other implementation, and
//! Telegram's `RetryAfter` answers surface as
//! [`herald_transport::TransportError::RateLimited`].

mod transport;

pub use transport::TelegramTransport;
