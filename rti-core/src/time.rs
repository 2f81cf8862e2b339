//! Logical time (`spec.md` §3, the `PorticoMessage` "logical timestamp" field).
//!
//! The teacher's own `boomerang_core::time` models time as a superdense `Tag`
//! (a `Timestamp` offset plus a microstep), which fits Lingua-Franca-style
//! discrete-event execution. This spec's time model has no microstep: a
//! federate's logical time is a single `f64`, with a dedicated `NULL_TIME`
//! sentinel meaning "untimestamped" (§3 `PorticoMessage`). `LogicalTime`
//! keeps the teacher's newtype-with-named-constructors style but drops the
//! superdense half that doesn't apply here.

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

/// A federate's logical time, or the sentinel meaning "no timestamp".
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct LogicalTime(f64);

impl LogicalTime {
    /// The sentinel carried by messages that have no logical timestamp.
    pub const NULL_TIME: LogicalTime = LogicalTime(f64::NEG_INFINITY);

    /// Logical time zero, the origin every federate starts at (§4.8).
    pub const ZERO: LogicalTime = LogicalTime(0.0);

    pub fn new(t: f64) -> Self {
        debug_assert!(!t.is_nan(), "logical time must not be NaN");
        LogicalTime(t)
    }

    pub fn is_null(&self) -> bool {
        *self == Self::NULL_TIME
    }

    pub fn as_f64(&self) -> f64 {
        self.0
    }

    /// `self + lookahead`, per the LBTS definition in §3/§4.8. The null sentinel
    /// is absorbing: a lookahead offset never turns "untimestamped" into a time.
    pub fn checked_add(self, lookahead: f64) -> Self {
        if self.is_null() {
            self
        } else {
            LogicalTime(self.0 + lookahead)
        }
    }
}

impl Eq for LogicalTime {}

impl PartialOrd for LogicalTime {
    fn partial_cmp(&self, other: &Self) -> Option<std::cmp::Ordering> {
        self.0.partial_cmp(&other.0)
    }
}

impl Ord for LogicalTime {
    fn cmp(&self, other: &Self) -> std::cmp::Ordering {
        self.partial_cmp(other)
            .expect("LogicalTime values are never NaN")
    }
}

impl From<f64> for LogicalTime {
    fn from(t: f64) -> Self {
        LogicalTime::new(t)
    }
}

impl std::fmt::Display for LogicalTime {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        if self.is_null() {
            write!(f, "NULL_TIME")
        } else {
            write!(f, "{}", self.0)
        }
    }
}
