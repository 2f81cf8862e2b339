//! Per-federate time-advancement state machine (C8, §4.8).

use rti_core::LogicalTime;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ConstrainedState {
    On,
    Pending,
    Off,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum RegulatingState {
    On,
    Pending,
    Off,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum AdvancingState {
    None,
    Requested,
    Available,
    Provisional,
}

/// One federate's time status (§3 "TimeStatus").
///
/// Invariant: `lbts == requestedTime + lookahead` after every mutator here;
/// every method that touches `requested_time` or `lookahead` recomputes it
/// before returning.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct TimeStatus {
    pub constrained: ConstrainedState,
    pub regulating: RegulatingState,
    pub advancing: AdvancingState,
    pub current_time: LogicalTime,
    pub requested_time: LogicalTime,
    pub lookahead: f64,
    pub lbts: LogicalTime,
    pub asynchronous: bool,
}

impl Default for TimeStatus {
    fn default() -> Self {
        TimeStatus {
            constrained: ConstrainedState::Off,
            regulating: RegulatingState::Off,
            advancing: AdvancingState::None,
            current_time: LogicalTime::ZERO,
            requested_time: LogicalTime::ZERO,
            lookahead: 0.0,
            lbts: LogicalTime::ZERO,
            asynchronous: false,
        }
    }
}

impl TimeStatus {
    pub fn new() -> Self {
        Self::default()
    }

    fn recompute_lbts(&mut self) {
        self.lbts = self.requested_time.checked_add(self.lookahead);
    }

    pub fn set_lookahead(&mut self, lookahead: f64) {
        self.lookahead = lookahead;
        self.recompute_lbts();
    }

    /// `timeAdvanceRequested` (TAR) or, with `available=true`, the TARA
    /// variant. Requires `advancing == None` (§4.8).
    pub fn time_advance_requested(&mut self, t: LogicalTime, available: bool) -> rti_core::Result<()> {
        if self.advancing != AdvancingState::None {
            return Err(rti_core::Error::Protocol(
                "time advance already pending for this federate".into(),
            ));
        }
        self.requested_time = t;
        self.advancing = if available {
            AdvancingState::Available
        } else {
            AdvancingState::Requested
        };
        self.recompute_lbts();
        Ok(())
    }

    /// True iff this federate may be granted its requested advance given the
    /// federation's current LBTS.
    pub fn can_advance(&self, federation_lbts: LogicalTime) -> bool {
        match self.advancing {
            AdvancingState::Requested => {
                !self.is_constrained() || self.requested_time < federation_lbts
            }
            AdvancingState::Available => {
                !self.is_constrained() || self.requested_time <= federation_lbts
            }
            AdvancingState::None | AdvancingState::Provisional => false,
        }
    }

    fn is_constrained(&self) -> bool {
        self.constrained == ConstrainedState::On
    }

    /// Must only be called once [`TimeStatus::can_advance`] holds.
    pub fn advance_federate(&mut self, new_time: LogicalTime) {
        self.current_time = new_time;
        self.requested_time = new_time;
        self.recompute_lbts();
        self.advancing = AdvancingState::Provisional;
    }

    pub fn advance_grant_callback_processed(&mut self, new_time: LogicalTime) {
        self.advancing = AdvancingState::None;
        self.current_time = new_time;
        self.requested_time = new_time;
        self.recompute_lbts();
    }
}

/// The federation-wide LBTS: the minimum over every regulating federate's
/// `lbts`, or `+infinity` if none are regulating (§4.8).
pub fn federation_lbts<'a>(statuses: impl Iterator<Item = &'a TimeStatus>) -> LogicalTime {
    statuses
        .filter(|s| s.regulating == RegulatingState::On)
        .map(|s| s.lbts)
        .min()
        .unwrap_or(LogicalTime::new(f64::INFINITY))
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn lbts_tracks_requested_time_plus_lookahead() {
        let mut ts = TimeStatus::new();
        ts.set_lookahead(1.0);
        ts.time_advance_requested(LogicalTime::new(5.0), false).unwrap();
        assert_eq!(ts.lbts, LogicalTime::new(6.0));
    }

    #[test]
    fn scenario_s6_time_advance_with_constraint() {
        let mut f1 = TimeStatus::new();
        f1.regulating = RegulatingState::On;
        f1.set_lookahead(1.0);
        f1.time_advance_requested(LogicalTime::new(5.0), false).unwrap();
        assert_eq!(f1.lbts, LogicalTime::new(6.0));

        let mut f2 = TimeStatus::new();
        f2.constrained = ConstrainedState::On;
        f2.time_advance_requested(LogicalTime::new(5.5), false).unwrap();

        let fed_lbts = federation_lbts([&f1].into_iter());
        assert_eq!(fed_lbts, LogicalTime::new(6.0));
        assert!(f2.can_advance(fed_lbts));

        f2.advance_federate(LogicalTime::new(5.5));
        assert_eq!(f2.advancing, AdvancingState::Provisional);

        f2.advance_grant_callback_processed(LogicalTime::new(5.5));
        assert_eq!(f2.advancing, AdvancingState::None);
        assert_eq!(f2.current_time, LogicalTime::new(5.5));
    }

    #[test]
    fn cannot_advance_when_none_or_provisional() {
        let ts = TimeStatus::new();
        assert!(!ts.can_advance(LogicalTime::new(100.0)));

        let mut ts2 = TimeStatus::new();
        ts2.time_advance_requested(LogicalTime::ZERO, false).unwrap();
        ts2.advance_federate(LogicalTime::ZERO);
        assert!(!ts2.can_advance(LogicalTime::new(100.0)));
    }

    #[test]
    fn requesting_advance_twice_without_grant_is_an_error() {
        let mut ts = TimeStatus::new();
        ts.time_advance_requested(LogicalTime::new(1.0), false).unwrap();
        assert!(ts.time_advance_requested(LogicalTime::new(2.0), false).is_err());
    }

    #[test]
    fn federation_lbts_is_infinite_with_no_regulating_federates() {
        let ts = TimeStatus::new();
        assert_eq!(federation_lbts([&ts].into_iter()), LogicalTime::new(f64::INFINITY));
    }

    fn regulating_status(requested: f64, lookahead: f64) -> TimeStatus {
        let mut ts = TimeStatus::new();
        ts.regulating = RegulatingState::On;
        ts.set_lookahead(lookahead);
        ts.time_advance_requested(LogicalTime::new(requested), true).unwrap();
        ts
    }

    proptest! {
        #[test]
        fn federation_lbts_never_exceeds_any_regulating_federates_lbts(
            pairs in prop::collection::vec((0.0f64..1_000.0, 0.0f64..10.0), 1..8),
        ) {
            let statuses: Vec<TimeStatus> = pairs
                .iter()
                .map(|(requested, lookahead)| regulating_status(*requested, *lookahead))
                .collect();
            let fed_lbts = federation_lbts(statuses.iter());
            for ts in &statuses {
                prop_assert!(fed_lbts <= ts.lbts);
            }
        }

        #[test]
        fn federation_lbts_equals_the_minimum_regulating_lbts(
            pairs in prop::collection::vec((0.0f64..1_000.0, 0.0f64..10.0), 1..8),
        ) {
            let statuses: Vec<TimeStatus> = pairs
                .iter()
                .map(|(requested, lookahead)| regulating_status(*requested, *lookahead))
                .collect();
            let expected = statuses.iter().map(|ts| ts.lbts).min().unwrap();
            prop_assert_eq!(federation_lbts(statuses.iter()), expected);
        }
    }
}
