//! Synchronization-point manager (C7, §4.7).

use std::collections::{BTreeMap, BTreeSet};

use rti_core::{Error, FederateHandle, Result};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum SyncPointStatus {
    Announced,
    Achieved,
    Synchronized,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SyncPoint {
    pub label: String,
    pub tag: Vec<u8>,
    /// `None` means federation-wide; `Some(subset)` restricts achievement to
    /// exactly those handles (§3, §9 Open Question (c)).
    pub subset: Option<BTreeSet<FederateHandle>>,
    pub registrant: FederateHandle,
    pub achieved: BTreeSet<FederateHandle>,
    pub status: SyncPointStatus,
}

impl SyncPoint {
    fn required_set<'a>(&'a self, federation_handles: &'a BTreeSet<FederateHandle>) -> &'a BTreeSet<FederateHandle> {
        // Restricted points track achievement against the registered subset,
        // not the federation's live handle set, per the spec's prose (§9
        // Open Question (c) flags this as worth re-confirming against the
        // authoritative HLA standard; we keep the literal reading here).
        self.subset.as_ref().unwrap_or(federation_handles)
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SyncPointManagerState {
    points: BTreeMap<String, SyncPoint>,
}

pub struct SyncPointManager {
    state: SyncPointManagerState,
}

impl SyncPointManager {
    pub fn new() -> Self {
        SyncPointManager { state: SyncPointManagerState::default() }
    }

    pub fn register(
        &mut self,
        label: impl Into<String>,
        tag: Vec<u8>,
        subset: Option<BTreeSet<FederateHandle>>,
        registrant: FederateHandle,
    ) -> Result<()> {
        let label = label.into();
        if self.state.points.contains_key(&label) {
            return Err(Error::already_exists(format!("sync point {label:?}")));
        }
        self.state.points.insert(
            label.clone(),
            SyncPoint {
                label,
                tag,
                subset,
                registrant,
                achieved: BTreeSet::new(),
                status: SyncPointStatus::Announced,
            },
        );
        Ok(())
    }

    /// `achieve(label, f)`; recomputes synchronization afterward (§4.7).
    /// Achieving an already-`Synchronized` point is accepted but a no-op.
    pub fn achieve(&mut self, label: &str, f: FederateHandle, federation_handles: &BTreeSet<FederateHandle>) -> Result<()> {
        let point = self
            .state
            .points
            .get_mut(label)
            .ok_or_else(|| Error::not_found(format!("sync point {label:?} not announced")))?;
        if point.status == SyncPointStatus::Synchronized {
            return Ok(());
        }
        point.achieved.insert(f);
        let required = point.required_set(federation_handles);
        if required.is_subset(&point.achieved) {
            point.status = SyncPointStatus::Synchronized;
        } else {
            point.status = SyncPointStatus::Achieved;
        }
        Ok(())
    }

    pub fn is_synchronized(&self, label: &str) -> bool {
        self.state
            .points
            .get(label)
            .is_some_and(|p| p.status == SyncPointStatus::Synchronized)
    }

    pub fn remove(&mut self, label: &str) -> Option<SyncPoint> {
        self.state.points.remove(label)
    }

    pub fn get_all(&self) -> impl Iterator<Item = &SyncPoint> {
        self.state.points.values()
    }

    pub fn get_all_unsynchronized_labels(&self) -> Vec<&str> {
        self.state
            .points
            .values()
            .filter(|p| p.status != SyncPointStatus::Synchronized)
            .map(|p| p.label.as_str())
            .collect()
    }

    /// Called on federate resignation: the resigning federate is dropped from
    /// every point's required set implicitly (by removing it from any
    /// restricted subset) and synchronization is re-evaluated (§4.7).
    pub fn federate_resigned(&mut self, f: FederateHandle, federation_handles: &BTreeSet<FederateHandle>) {
        for point in self.state.points.values_mut() {
            if let Some(subset) = point.subset.as_mut() {
                subset.remove(&f);
            }
            point.achieved.remove(&f);
            if point.status != SyncPointStatus::Synchronized {
                let required = point.required_set(federation_handles);
                if required.is_subset(&point.achieved) && !required.is_empty() {
                    point.status = SyncPointStatus::Synchronized;
                }
            }
        }
    }

    pub fn save_to_stream(&self) -> Result<Vec<u8>> {
        bincode::serialize(&self.state).map_err(|e| Error::Internal(e.into()))
    }

    pub fn restore_from_stream(&mut self, bytes: &[u8]) -> Result<()> {
        self.state = bincode::deserialize(bytes).map_err(|e| Error::Internal(e.into()))?;
        Ok(())
    }
}

impl Default for SyncPointManager {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn handles(ns: &[usize]) -> BTreeSet<FederateHandle> {
        ns.iter().map(|n| FederateHandle::from(*n)).collect()
    }

    #[test]
    fn scenario_3_restricted_sync_point() {
        let f1 = FederateHandle::from(1usize);
        let f2 = FederateHandle::from(2usize);
        let f3 = FederateHandle::from(3usize);
        let federation = handles(&[1, 2, 3]);

        let mut mgr = SyncPointManager::new();
        mgr.register("mid", vec![], Some(handles(&[1, 2])), f1).unwrap();
        assert!(!mgr.is_synchronized("mid"));

        mgr.achieve("mid", f1, &federation).unwrap();
        assert!(!mgr.is_synchronized("mid"));

        mgr.achieve("mid", f2, &federation).unwrap();
        assert!(mgr.is_synchronized("mid"));

        mgr.achieve("mid", f3, &federation).unwrap();
        assert!(mgr.is_synchronized("mid"));
    }

    #[test]
    fn invariant_8_monotonicity_and_idempotence() {
        let f1 = FederateHandle::from(1usize);
        let federation = handles(&[1]);
        let mut mgr = SyncPointManager::new();
        mgr.register("p", vec![], None, f1).unwrap();
        mgr.achieve("p", f1, &federation).unwrap();
        assert!(mgr.is_synchronized("p"));
        mgr.achieve("p", f1, &federation).unwrap();
        assert!(mgr.is_synchronized("p"));
    }

    #[test]
    fn achieving_an_unannounced_point_is_an_error() {
        let mut mgr = SyncPointManager::new();
        assert!(mgr.achieve("nope", FederateHandle::from(1usize), &handles(&[1])).is_err());
    }

    #[test]
    fn registering_a_duplicate_label_is_an_error() {
        let f1 = FederateHandle::from(1usize);
        let mut mgr = SyncPointManager::new();
        mgr.register("p", vec![], None, f1).unwrap();
        assert!(mgr.register("p", vec![], None, f1).is_err());
    }

    #[test]
    fn save_restore_round_trips() {
        let f1 = FederateHandle::from(1usize);
        let mut mgr = SyncPointManager::new();
        mgr.register("p", vec![1, 2, 3], None, f1).unwrap();
        mgr.achieve("p", f1, &handles(&[1])).unwrap();
        let bytes = mgr.save_to_stream().unwrap();
        let mut restored = SyncPointManager::new();
        restored.restore_from_stream(&bytes).unwrap();
        assert_eq!(restored.state, mgr.state);
    }
}
