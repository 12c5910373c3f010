//! `herald-core` — shared leaves of the Herald workspace.
//!
//! Holds the pieces every other crate depends on: configuration loading
//! (TOML + `HERALD_*` env overrides), the shared error type, the
//! [`types::Destination`] data model, and the pure spintax
//! [`template::expand`] function.

pub mod config;
pub mod error;
pub mod template;
pub mod types;

pub use error::{HeraldError, Result};
pub use types::{Destination, DestinationId, DestinationKind};
