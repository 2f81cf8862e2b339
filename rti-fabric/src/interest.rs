//! Per-federation publish/subscribe registry (C6, §4.6).
//!
//! Maps use `BTreeMap`/`BTreeSet` rather than their hashed counterparts so
//! that `save_to_stream`/`restore_from_stream` serialize deterministically
//! (§6 "Persisted state", §8 invariant 11) without a separate snapshot type:
//! bincode over a `BTreeMap` already is the "ordered Vec encoding" the spec
//! asks for.

use std::collections::{BTreeMap, BTreeSet};
use std::sync::Arc;

use rti_core::{AttributeHandle, Error, FederateHandle, InteractionClassHandle, ObjectClassHandle, RegionToken, Result};
use serde::{Deserialize, Serialize};

use crate::ddm::RegionStore;
use crate::fom::FomModel;

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct OCInterest {
    pub entries: BTreeMap<FederateHandle, (BTreeSet<AttributeHandle>, Option<BTreeSet<RegionToken>>)>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ICInterest {
    pub entries: BTreeMap<FederateHandle, Option<BTreeSet<RegionToken>>>,
}

/// The persisted shape of an [`InterestManager`] (§6 "Persisted state").
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct InterestManagerState {
    pub published_objects: BTreeMap<ObjectClassHandle, OCInterest>,
    pub subscribed_objects: BTreeMap<ObjectClassHandle, OCInterest>,
    pub published_interactions: BTreeMap<InteractionClassHandle, ICInterest>,
    pub subscribed_interactions: BTreeMap<InteractionClassHandle, ICInterest>,
}

pub struct InterestManager {
    fom: Arc<dyn FomModel>,
    state: InterestManagerState,
}

impl InterestManager {
    pub fn new(fom: Arc<dyn FomModel>) -> Self {
        InterestManager { fom, state: InterestManagerState::default() }
    }

    pub fn publish_object_class(
        &mut self,
        f: FederateHandle,
        class: ObjectClassHandle,
        attrs: &[AttributeHandle],
    ) -> Result<()> {
        self.validate_object_attrs(class, attrs)?;
        let entry = self.state.published_objects.entry(class).or_default();
        let (set, _) = entry.entries.entry(f).or_default();
        set.extend(attrs.iter().copied());
        Ok(())
    }

    pub fn subscribe_object_class(
        &mut self,
        f: FederateHandle,
        class: ObjectClassHandle,
        attrs: &[AttributeHandle],
        region: Option<RegionToken>,
        regions: &RegionStore,
    ) -> Result<()> {
        self.validate_object_attrs(class, attrs)?;
        if let Some(token) = region {
            self.validate_region_context_object(class, attrs, token, regions)?;
        }
        let entry = self.state.subscribed_objects.entry(class).or_default();
        let (set, region_set) = entry.entries.entry(f).or_default();
        set.extend(attrs.iter().copied());
        if let Some(token) = region {
            region_set.get_or_insert_with(BTreeSet::new).insert(token);
        }
        Ok(())
    }

    pub fn unpublish_object_class(
        &mut self,
        f: FederateHandle,
        class: ObjectClassHandle,
        attrs: &[AttributeHandle],
    ) -> Result<()> {
        Self::unregister_object(&mut self.state.published_objects, f, class, attrs)
    }

    pub fn unsubscribe_object_class(
        &mut self,
        f: FederateHandle,
        class: ObjectClassHandle,
        attrs: &[AttributeHandle],
    ) -> Result<()> {
        Self::unregister_object(&mut self.state.subscribed_objects, f, class, attrs)
    }

    fn unregister_object(
        map: &mut BTreeMap<ObjectClassHandle, OCInterest>,
        f: FederateHandle,
        class: ObjectClassHandle,
        attrs: &[AttributeHandle],
    ) -> Result<()> {
        let entry = map
            .get_mut(&class)
            .ok_or_else(|| Error::not_registered(format!("{class:?} has no interest entries")))?;
        let (set, _) = entry
            .entries
            .get_mut(&f)
            .ok_or_else(|| Error::not_registered(format!("{f} has no interest in {class:?}")))?;
        if attrs.is_empty() {
            entry.entries.remove(&f);
        } else {
            for a in attrs {
                set.remove(a);
            }
            if set.is_empty() {
                entry.entries.remove(&f);
            }
        }
        if entry.entries.is_empty() {
            map.remove(&class);
        }
        Ok(())
    }

    pub fn publish_interaction_class(&mut self, f: FederateHandle, class: InteractionClassHandle) -> Result<()> {
        if !self.fom.interaction_class_exists(class) {
            return Err(Error::not_found(format!("interaction class {class:?} not defined")));
        }
        self.state
            .published_interactions
            .entry(class)
            .or_default()
            .entries
            .entry(f)
            .or_insert(None);
        Ok(())
    }

    pub fn subscribe_interaction_class(
        &mut self,
        f: FederateHandle,
        class: InteractionClassHandle,
        region: Option<RegionToken>,
        regions: &RegionStore,
    ) -> Result<()> {
        if !self.fom.interaction_class_exists(class) {
            return Err(Error::not_found(format!("interaction class {class:?} not defined")));
        }
        if let Some(token) = region {
            self.validate_region_context_interaction(class, token, regions)?;
        }
        let region_set = self
            .state
            .subscribed_interactions
            .entry(class)
            .or_default()
            .entries
            .entry(f)
            .or_insert(None);
        if let Some(token) = region {
            region_set.get_or_insert_with(BTreeSet::new).insert(token);
        }
        Ok(())
    }

    pub fn unpublish_interaction_class(&mut self, f: FederateHandle, class: InteractionClassHandle) -> Result<()> {
        Self::unregister_interaction(&mut self.state.published_interactions, f, class)
    }

    pub fn unsubscribe_interaction_class(&mut self, f: FederateHandle, class: InteractionClassHandle) -> Result<()> {
        Self::unregister_interaction(&mut self.state.subscribed_interactions, f, class)
    }

    fn unregister_interaction(
        map: &mut BTreeMap<InteractionClassHandle, ICInterest>,
        f: FederateHandle,
        class: InteractionClassHandle,
    ) -> Result<()> {
        let entry = map
            .get_mut(&class)
            .ok_or_else(|| Error::not_registered(format!("{class:?} has no interest entries")))?;
        entry
            .entries
            .remove(&f)
            .ok_or_else(|| Error::not_registered(format!("{f} has no interest in {class:?}")))?;
        if entry.entries.is_empty() {
            map.remove(&class);
        }
        Ok(())
    }

    /// HLA discovery-class resolution (§4.6): the most specific class along
    /// `class`'s inheritance chain that `f` is subscribed to.
    pub fn get_discovery_type(&self, f: FederateHandle, class: ObjectClassHandle) -> Option<ObjectClassHandle> {
        let mut current = Some(class);
        while let Some(c) = current {
            if self.state.subscribed_objects.get(&c).is_some_and(|oc| oc.entries.contains_key(&f)) {
                return Some(c);
            }
            current = self.fom.object_class_parent(c);
        }
        None
    }

    pub fn get_subscribed_interaction_type(
        &self,
        f: FederateHandle,
        class: InteractionClassHandle,
    ) -> Option<InteractionClassHandle> {
        let mut current = Some(class);
        while let Some(c) = current {
            if self.state.subscribed_interactions.get(&c).is_some_and(|ic| ic.entries.contains_key(&f)) {
                return Some(c);
            }
            current = self.fom.interaction_class_parent(c);
        }
        None
    }

    /// Per federate, the most specific class (along `class`'s chain) it is
    /// subscribed to.
    pub fn get_all_subscribers_with_types(
        &self,
        class: ObjectClassHandle,
    ) -> BTreeMap<FederateHandle, ObjectClassHandle> {
        let mut result = BTreeMap::new();
        let mut current = Some(class);
        while let Some(c) = current {
            if let Some(oc) = self.state.subscribed_objects.get(&c) {
                for f in oc.entries.keys() {
                    result.entry(*f).or_insert(c);
                }
            }
            current = self.fom.object_class_parent(c);
        }
        result
    }

    pub fn get_all_subscribers(&self, class: ObjectClassHandle) -> BTreeSet<FederateHandle> {
        self.get_all_subscribers_with_types(class).into_keys().collect()
    }

    pub fn is_attribute_class_subscribed(
        &self,
        f: FederateHandle,
        class: ObjectClassHandle,
        attr: AttributeHandle,
    ) -> bool {
        match self.get_discovery_type(f, class) {
            Some(discovered) => self
                .state
                .subscribed_objects
                .get(&discovered)
                .and_then(|oc| oc.entries.get(&f))
                .is_some_and(|(attrs, _)| attrs.contains(&attr)),
            None => false,
        }
    }

    /// Region filtering (§4.6): a subscription matches an update iff the
    /// update's region overlaps one of the subscriber's regions, or either
    /// side has none ("match unconditionally").
    pub fn object_update_matches(
        &self,
        f: FederateHandle,
        class: ObjectClassHandle,
        update_region: Option<&crate::ddm::Region>,
        regions: &RegionStore,
    ) -> bool {
        let Some(oc) = self.state.subscribed_objects.get(&class) else { return false };
        let Some((_, subscriber_regions)) = oc.entries.get(&f) else { return false };
        match (subscriber_regions, update_region) {
            (None, _) | (_, None) => true,
            (Some(tokens), Some(update_region)) => tokens
                .iter()
                .filter_map(|t| regions.get(*t))
                .any(|r| r.overlaps(update_region)),
        }
    }

    fn validate_object_attrs(&self, class: ObjectClassHandle, attrs: &[AttributeHandle]) -> Result<()> {
        if !self.fom.object_class_exists(class) {
            return Err(Error::not_found(format!("object class {class:?} not defined")));
        }
        for a in attrs {
            if !self.fom.attribute_belongs_to(class, *a) {
                return Err(Error::not_found(format!("attribute {a:?} not defined on {class:?}")));
            }
        }
        Ok(())
    }

    fn validate_region_context_object(
        &self,
        class: ObjectClassHandle,
        attrs: &[AttributeHandle],
        token: RegionToken,
        regions: &RegionStore,
    ) -> Result<()> {
        let region = regions
            .get(token)
            .ok_or_else(|| Error::not_found(format!("region {token:?} not known")))?;
        for a in attrs {
            let Some(space) = self.fom.attribute_routing_space(class, *a) else {
                return Err(Error::invalid_region_context(format!(
                    "attribute {a:?} on {class:?} has no declared routing space"
                )));
            };
            if !region.dimensions().all(|d| space.contains(d)) {
                return Err(Error::invalid_region_context(format!(
                    "region {token:?} spans a dimension outside {class:?}.{a:?}'s routing space"
                )));
            }
        }
        Ok(())
    }

    fn validate_region_context_interaction(
        &self,
        class: InteractionClassHandle,
        token: RegionToken,
        regions: &RegionStore,
    ) -> Result<()> {
        let region = regions
            .get(token)
            .ok_or_else(|| Error::not_found(format!("region {token:?} not known")))?;
        let Some(space) = self.fom.interaction_routing_space(class) else {
            return Err(Error::invalid_region_context(format!(
                "interaction class {class:?} has no declared routing space"
            )));
        };
        if !region.dimensions().all(|d| space.contains(d)) {
            return Err(Error::invalid_region_context(format!(
                "region {token:?} spans a dimension outside {class:?}'s routing space"
            )));
        }
        Ok(())
    }

    pub fn save_to_stream(&self) -> Result<Vec<u8>> {
        bincode::serialize(&self.state).map_err(|e| Error::Internal(e.into()))
    }

    pub fn restore_from_stream(&mut self, bytes: &[u8]) -> Result<()> {
        self.state = bincode::deserialize(bytes).map_err(|e| Error::Internal(e.into()))?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fom::StaticFom;

    fn chained_fom() -> Arc<StaticFom> {
        // C1 (root) <- C2 <- C3
        let c1 = ObjectClassHandle::from(1usize);
        let c2 = ObjectClassHandle::from(2usize);
        let c3 = ObjectClassHandle::from(3usize);
        let mut fom = StaticFom::default();
        fom.object_classes.extend([c1, c2, c3]);
        fom.object_parents.insert(c3, c2);
        fom.object_parents.insert(c2, c1);
        Arc::new(fom)
    }

    #[test]
    fn scenario_7_interest_inheritance() {
        let fom = chained_fom();
        let c1 = ObjectClassHandle::from(1usize);
        let c2 = ObjectClassHandle::from(2usize);
        let c3 = ObjectClassHandle::from(3usize);
        let f = FederateHandle::from(1usize);
        let mut mgr = InterestManager::new(fom);
        mgr.subscribe_object_class(f, c2, &[], None, &RegionStore::new()).unwrap();
        assert_eq!(mgr.get_discovery_type(f, c3), Some(c2));
        assert_eq!(mgr.get_discovery_type(f, c1), None);
    }

    #[test]
    fn scenario_2_publish_subscribe_discovery() {
        let a = ObjectClassHandle::from(1usize);
        let b = ObjectClassHandle::from(2usize);
        let a1 = AttributeHandle::from(1usize);
        let a2 = AttributeHandle::from(2usize);
        let mut fom = StaticFom::default();
        fom.object_classes.extend([a, b]);
        fom.object_parents.insert(b, a);
        fom.object_attributes.insert((b, a1));
        fom.object_attributes.insert((b, a2));
        fom.object_attributes.insert((a, a1));
        let fom = Arc::new(fom);

        let f1 = FederateHandle::from(1usize);
        let f2 = FederateHandle::from(2usize);
        let mut mgr = InterestManager::new(fom);
        mgr.publish_object_class(f1, b, &[a1, a2]).unwrap();
        mgr.subscribe_object_class(f2, a, &[a1], None, &RegionStore::new()).unwrap();

        let subscribers = mgr.get_all_subscribers_with_types(b);
        assert_eq!(subscribers.get(&f2), Some(&a));
        assert!(!mgr.is_attribute_class_subscribed(f2, b, a2));
        assert!(mgr.is_attribute_class_subscribed(f2, b, a1));
    }

    #[test]
    fn unsubscribe_with_empty_attrs_removes_the_whole_entry() {
        let a = ObjectClassHandle::from(1usize);
        let a1 = AttributeHandle::from(1usize);
        let mut fom = StaticFom::default();
        fom.object_classes.insert(a);
        fom.object_attributes.insert((a, a1));
        let mgr_fom = Arc::new(fom);
        let f = FederateHandle::from(1usize);
        let mut mgr = InterestManager::new(mgr_fom);
        mgr.subscribe_object_class(f, a, &[a1], None, &RegionStore::new()).unwrap();
        mgr.unsubscribe_object_class(f, a, &[]).unwrap();
        assert!(mgr.get_all_subscribers(a).is_empty());
    }

    #[test]
    fn save_restore_round_trips() {
        let a = ObjectClassHandle::from(1usize);
        let a1 = AttributeHandle::from(1usize);
        let mut fom = StaticFom::default();
        fom.object_classes.insert(a);
        fom.object_attributes.insert((a, a1));
        let fom = Arc::new(fom);
        let f = FederateHandle::from(1usize);
        let mut mgr = InterestManager::new(fom);
        mgr.subscribe_object_class(f, a, &[a1], None, &RegionStore::new()).unwrap();

        let bytes = mgr.save_to_stream().unwrap();
        let mut restored = InterestManager::new(Arc::new(StaticFom::default()));
        restored.restore_from_stream(&bytes).unwrap();
        assert_eq!(restored.state, mgr.state);
    }
}
