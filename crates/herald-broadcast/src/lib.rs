//! `herald-broadcast` — the broadcast scheduling and throttling engine.
//!
//! # Overview
//!
//! A [`engine::Broadcaster`] runs at most one bounded-duration broadcast job
//! at a time: it repeatedly scans the job's fixed target set, sends through
//! the transport facade, adapts to declared and signalled slow-mode windows,
//! and reports progress through an append-only [`sink::EventSink`]. The
//! control side observes and cancels cooperatively — no send is ever killed
//! mid-flight.
//!
//! # Run states
//!
//! | State      | Meaning                                              |
//! |------------|------------------------------------------------------|
//! | `Idle`     | No job; `start()` accepted                           |
//! | `Running`  | Loop scanning and sending                            |
//! | `Stopping` | Stop requested; loop exits at its next check point   |
//!
//! Only the control side moves `Running → Stopping`; only the run loop
//! moves back to `Idle`.

pub mod engine;
pub mod error;
pub mod registry;
pub mod sink;
pub mod store;

#[cfg(test)]
mod testsupport;

pub use engine::{Broadcaster, JobParams, RunState, Timing};
pub use error::{BroadcastError, Result};
pub use registry::DestinationRegistry;
pub use sink::{EventSink, SinkEvent};
pub use store::{Store, Template};
