//! Shared types for the RTI message fabric: handles, logical time, and the
//! error taxonomy every other crate in the workspace builds on.
//!
//! Mirrors the role the teacher's `boomerang_core` plays for
//! `boomerang_federated`: a small, dependency-light crate of value types with
//! no networking or state of its own.

mod error;
mod handles;
mod time;

pub use error::Error;
pub use handles::{
    AttributeHandle, DimensionHandle, FederateHandle, FederationHandle, InteractionClassHandle,
    ObjectClassHandle, RegionToken, RequestId, NULL_FEDERATE, RTI_HANDLE, TARGET_ALL_HANDLE,
    TARGET_MANY_HANDLE,
};
pub use time::LogicalTime;

/// The result type used throughout the fabric.
pub type Result<T> = std::result::Result<T, Error>;

/// The recipient of an outbound control message (§3 "Target").
///
/// Resolved at the connection boundary rather than threaded through the wire
/// header: the header's federate-handle field only ever carries one real
/// handle or one of the two broadcast sentinels, so a genuine multi-target
/// send is expanded into one message per recipient before it reaches the
/// transport (§9 Open Question (a)).
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Target {
    /// A single named federate.
    One(FederateHandle),
    /// Every federate currently joined to the federation.
    All,
    /// An explicit subset, expanded to one [`Target::One`] send per member
    /// by the connection layer before anything touches the wire.
    Many(Vec<FederateHandle>),
}

impl Target {
    pub fn is_broadcast(&self) -> bool {
        matches!(self, Target::All | Target::Many(_))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn many_target_is_broadcast() {
        assert!(Target::Many(vec![NULL_FEDERATE]).is_broadcast());
        assert!(Target::All.is_broadcast());
        assert!(!Target::One(NULL_FEDERATE).is_broadcast());
    }
}
