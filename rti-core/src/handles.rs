//! The RTI handle space (`spec.md` §3 "Handle space").
//!
//! Every kind of handle is a small opaque integer. The teacher's
//! `tinymap::key_type!` macro generates exactly this shape (`Copy`, `Ord`,
//! `Hash`, `Debug`, `From<usize>`/`index()`) but keeps its backing field
//! private, which rules it out here: `FederateHandle` needs const sentinel
//! values (`NULL_HANDLE`, `RTI_HANDLE`, ...) that a private field can't
//! express from outside the macro's crate. `handle_type!` below reproduces
//! the same shape by hand so those sentinels can exist, and still implements
//! `tinymap::Key` for callers that do want a dense, insert-assigns-the-key
//! store. Every handle-indexed store in `rti-fabric` turns out to need
//! *removal* (interest entries, sync-point subsets, the federate table,
//! the region store) — `tinymap::TinyMap` has no removal API, so those stay
//! plain `HashMap`s and `rti-fabric` never ends up pulling in `tinymap` at
//! all; it remains a `rti-core`-only dependency.
#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

macro_rules! handle_type {
    ($(#[$outer:meta])* $vis:vis $name:ident) => {
        $(#[$outer])*
        #[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
        #[derive(Default, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
        #[repr(transparent)]
        $vis struct $name(pub(crate) u64);

        impl tinymap::Key for $name {
            fn index(&self) -> usize {
                self.0 as usize
            }
        }

        impl $name {
            /// The raw integer value, for callers (e.g. wire codecs in
            /// `rti-fabric`) that need it outside this crate.
            pub fn raw(&self) -> u64 {
                self.0
            }
        }

        impl From<usize> for $name {
            fn from(value: usize) -> Self {
                Self(value as _)
            }
        }

        impl std::fmt::Debug for $name {
            fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
                write!(f, "{}({})", stringify!($name), self.0)
            }
        }
    };
}

handle_type! {
    /// Identifies one federate within a federation.
    pub FederateHandle
}

handle_type! {
    /// Identifies a running federation.
    pub FederationHandle
}

handle_type! {
    /// Identifies an object class in the FOM.
    pub ObjectClassHandle
}

handle_type! {
    /// Identifies an attribute of an object class in the FOM.
    pub AttributeHandle
}

handle_type! {
    /// Identifies an interaction class in the FOM.
    pub InteractionClassHandle
}

handle_type! {
    /// Identifies a dimension in the FOM's routing space.
    pub DimensionHandle
}

handle_type! {
    /// Identifies a DDM region instance created in a federation's `RegionStore`.
    pub RegionToken
}

/// Sentinel federate handle meaning "no federate" (`NULL_HANDLE`).
pub const NULL_FEDERATE: FederateHandle = FederateHandle(0);

/// Sentinel federate handle used as the source of messages the RTI itself originates.
pub const RTI_HANDLE: FederateHandle = FederateHandle(u64::MAX);

/// Sentinel target meaning "every federate in the federation".
pub const TARGET_ALL_HANDLE: FederateHandle = FederateHandle(u64::MAX - 1);

/// Sentinel target meaning "see the accompanying multi-target set", used only
/// as a marker; the actual recipient set travels alongside in [`Target::Many`].
///
/// [`Target::Many`]: crate::Target
pub const TARGET_MANY_HANDLE: FederateHandle = FederateHandle(u64::MAX - 2);

impl FederateHandle {
    /// A real, federate-assigned handle never collides with the three reserved sentinels.
    pub fn is_real(&self) -> bool {
        *self != NULL_FEDERATE
            && *self != RTI_HANDLE
            && *self != TARGET_ALL_HANDLE
            && *self != TARGET_MANY_HANDLE
    }

    /// Narrow to the 16-bit field the wire header carries.
    ///
    /// Reserved sentinels map to fixed well-known values so they round-trip
    /// through the header; real handles above `u16::MAX` cannot be encoded.
    pub fn to_wire(self) -> Result<u16, crate::Error> {
        match self {
            NULL_FEDERATE => Ok(0),
            RTI_HANDLE => Ok(0xFFFF),
            TARGET_ALL_HANDLE => Ok(0xFFFE),
            TARGET_MANY_HANDLE => Ok(0xFFFD),
            FederateHandle(v) if v <= u16::MAX as u64 - 3 => Ok(v as u16),
            _ => Err(crate::Error::Protocol(
                "federate handle does not fit in the 16-bit wire field".into(),
            )),
        }
    }

    /// Inverse of [`FederateHandle::to_wire`].
    pub fn from_wire(raw: u16) -> Self {
        match raw {
            0 => NULL_FEDERATE,
            0xFFFF => RTI_HANDLE,
            0xFFFE => TARGET_ALL_HANDLE,
            0xFFFD => TARGET_MANY_HANDLE,
            v => FederateHandle(v as u64),
        }
    }
}

impl FederationHandle {
    /// Narrow to the header's 4-bit federation-ID field (§3 Header layout).
    ///
    /// Only 16 concurrently-addressable federations fit in the wire header;
    /// this is a deliberate ceiling of the wire format, not of `Federation`
    /// itself.
    pub fn to_wire4(self) -> Result<u8, crate::Error> {
        if self.0 < 16 {
            Ok(self.0 as u8)
        } else {
            Err(crate::Error::Protocol(
                "federation handle does not fit in the 4-bit wire field".into(),
            ))
        }
    }

    pub fn from_wire4(raw: u8) -> Self {
        FederationHandle((raw & 0x0F) as u64)
    }
}

impl std::fmt::Display for FederateHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match *self {
            NULL_FEDERATE => write!(f, "<null-federate>"),
            RTI_HANDLE => write!(f, "<rti>"),
            TARGET_ALL_HANDLE => write!(f, "<all>"),
            TARGET_MANY_HANDLE => write!(f, "<many>"),
            FederateHandle(v) => write!(f, "federate#{v}"),
        }
    }
}

/// A request ID used by the response correlator (§4.4). 0 means "no correlation needed".
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default)]
pub struct RequestId(pub u16);

impl RequestId {
    pub const NONE: RequestId = RequestId(0);

    pub fn wrapping_next(self) -> Self {
        let next = self.0.wrapping_add(1);
        if next == 0 {
            RequestId(1)
        } else {
            RequestId(next)
        }
    }
}

impl std::fmt::Display for RequestId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "req#{}", self.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn sentinels_round_trip_through_wire() {
        for h in [NULL_FEDERATE, RTI_HANDLE, TARGET_ALL_HANDLE, TARGET_MANY_HANDLE] {
            let wire = h.to_wire().unwrap();
            assert_eq!(FederateHandle::from_wire(wire), h);
        }
    }

    #[test]
    fn real_handle_round_trips() {
        let h = FederateHandle::from(42usize);
        assert!(h.is_real());
        let wire = h.to_wire().unwrap();
        assert_eq!(wire, 42);
        assert_eq!(FederateHandle::from_wire(wire), h);
    }

    #[test]
    fn request_id_wraps_around_skipping_zero() {
        let mut id = RequestId(u16::MAX);
        id = id.wrapping_next();
        assert_eq!(id, RequestId(1));
    }

    #[test]
    fn federation_handle_wire4_round_trips_and_rejects_overflow() {
        let h = FederationHandle::from(7usize);
        assert_eq!(FederationHandle::from_wire4(h.to_wire4().unwrap()), h);
        assert!(FederationHandle::from(16usize).to_wire4().is_err());
    }

    proptest! {
        #[test]
        fn any_real_federate_handle_round_trips_through_the_wire(raw in 0u64..=(u16::MAX as u64 - 3)) {
            let h = FederateHandle::from(raw as usize);
            let wire = h.to_wire().unwrap();
            prop_assert_eq!(FederateHandle::from_wire(wire), h);
        }

        #[test]
        fn any_addressable_federation_handle_round_trips_through_wire4(raw in 0u64..16) {
            let h = FederationHandle::from(raw as usize);
            let wire = h.to_wire4().unwrap();
            prop_assert_eq!(FederationHandle::from_wire4(wire), h);
        }
    }
}
