//! `herald-transport` — the async execution context and transport facade.
//!
//! # Overview
//!
//! Remote-transport clients are frequently unsafe to drive from multiple
//! native threads. This crate funnels every client call through one
//! dedicated [`worker::Worker`] thread running a single-threaded cooperative
//! scheduler, and hands the rest of the application a pollable
//! [`handle::TaskHandle`] per operation — non-blocking `is_done()` from any
//! thread, `result()` once complete, and an awaitable bounded `wait()` for
//! async callers.
//!
//! The [`transport::Transport`] trait is the seam to the opaque remote
//! client; [`facade::TransportFacade`] exposes its operations as
//! submit-and-poll calls that never block the caller.

pub mod error;
pub mod facade;
pub mod handle;
pub mod transport;
pub mod worker;

pub use error::TransportError;
pub use facade::TransportFacade;
pub use handle::TaskHandle;
pub use transport::Transport;
pub use worker::Worker;
