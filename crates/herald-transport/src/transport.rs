use async_trait::async_trait;

use herald_core::types::{Destination, DestinationId};

use crate::error::TransportError;

/// Interface to the opaque remote chat client.
///
/// Implementations run exclusively on the [`Worker`](crate::worker::Worker)
/// thread, so they may hold `!Send` state and use interior mutability
/// (`RefCell`) freely. All methods are remote calls; none retry internally —
/// retry policy belongs to the caller.
#[async_trait(?Send)]
pub trait Transport {
    /// Establish the connection, optionally switching to a new identity
    /// (phone number, bot token — whatever the transport authenticates with).
    async fn connect(&self, identity: Option<String>) -> Result<(), TransportError>;

    /// Whether the current identity holds a usable session.
    async fn is_authorized(&self) -> Result<bool, TransportError>;

    /// Ask the transport to issue a login code for `identity`.
    async fn request_login_code(&self, identity: String) -> Result<(), TransportError>;

    /// Complete a code-based login.
    ///
    /// Fails with [`TransportError::AuthChallenge`] when the account requires
    /// a second factor and none was supplied.
    async fn complete_login(
        &self,
        code: String,
        second_factor: Option<String>,
    ) -> Result<(), TransportError>;

    /// Enumerate the group-like destinations the identity can see, with
    /// kind, restriction and slow-mode metadata. Non-group peers are
    /// excluded by the implementation.
    async fn list_destinations(&self) -> Result<Vec<Destination>, TransportError>;

    /// Deliver `text` to one destination.
    ///
    /// Fails with [`TransportError::RateLimited`] when the transport reports
    /// an explicit cool-down.
    async fn send(&self, destination: DestinationId, text: String) -> Result<(), TransportError>;
}
