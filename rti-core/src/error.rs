//! The shared error taxonomy (`spec.md` §7 "Error handling design").
//!
//! Shaped after `boomerang_federated::client::ClientError`: a closed set of
//! domain variants plus one `#[from] anyhow::Error` escape hatch for
//! transport/IO glue that no layer above should have to pattern-match on.

use thiserror::Error;

/// Domain-level error kinds shared by every layer of the message fabric.
#[derive(Debug, Error)]
pub enum Error {
    /// Wire format violation; fatal for the connection that produced it.
    #[error("protocol error: {0}")]
    Protocol(String),

    /// A referenced class/attribute/region/sync-point/federate is not defined.
    #[error("not found: {0}")]
    NotFound(String),

    /// Duplicate federation/sync-point/federate-name.
    #[error("already exists: {0}")]
    AlreadyExists(String),

    /// A federate is not subscribed/published as the caller claimed.
    #[error("not registered: {0}")]
    NotRegistered(String),

    /// A region's routing space disagrees with the FOM for the attribute/interaction at hand.
    #[error("invalid region context: {0}")]
    InvalidRegionContext(String),

    /// The response correlator's deadline elapsed before a matching response arrived.
    #[error("timed out waiting for a response")]
    Timeout,

    /// A handler chain explicitly declined to process a message.
    ///
    /// Converted to success by the sink if no response has been populated by the
    /// time it propagates out (§4.5).
    #[error("handler vetoed the message")]
    Veto,

    /// Anything else; surfaced to the caller and logged at error level.
    #[error(transparent)]
    Internal(#[from] anyhow::Error),
}

impl Error {
    pub fn not_found(what: impl Into<String>) -> Self {
        Error::NotFound(what.into())
    }

    pub fn already_exists(what: impl Into<String>) -> Self {
        Error::AlreadyExists(what.into())
    }

    pub fn not_registered(what: impl Into<String>) -> Self {
        Error::NotRegistered(what.into())
    }

    pub fn invalid_region_context(what: impl Into<String>) -> Self {
        Error::InvalidRegionContext(what.into())
    }

    /// `true` for errors a handler chain should convert into a populated
    /// error response rather than tear down the connection (§7 propagation policy).
    pub fn is_recoverable(&self) -> bool {
        !matches!(self, Error::Protocol(_))
    }
}
