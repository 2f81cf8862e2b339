//! Read-only FOM (Federation Object Model) metadata surface.
//!
//! The FOM parser itself is out of scope; callers plug in a real one behind
//! this trait. The interest manager (C6) is the only consumer.

use rti_core::{AttributeHandle, DimensionHandle, InteractionClassHandle, ObjectClassHandle};

/// A routing space is just the set of dimensions it spans (§3 "Region/Extent").
pub type RoutingSpace = Vec<DimensionHandle>;

pub trait FomModel: Send + Sync {
    fn object_class_exists(&self, class: ObjectClassHandle) -> bool;

    /// Immediate parent of `class` in the inheritance tree, or `None` at the root.
    fn object_class_parent(&self, class: ObjectClassHandle) -> Option<ObjectClassHandle>;

    fn attribute_belongs_to(&self, class: ObjectClassHandle, attribute: AttributeHandle) -> bool;

    /// The routing space declared for `attribute` on `class`, if DDM-enabled.
    fn attribute_routing_space(
        &self,
        class: ObjectClassHandle,
        attribute: AttributeHandle,
    ) -> Option<RoutingSpace>;

    fn interaction_class_exists(&self, class: InteractionClassHandle) -> bool;

    fn interaction_class_parent(&self, class: InteractionClassHandle) -> Option<InteractionClassHandle>;

    fn interaction_routing_space(&self, class: InteractionClassHandle) -> Option<RoutingSpace>;
}

/// An in-memory [`FomModel`] for tests and for embedders small enough not to
/// need a real FOM parser.
#[derive(Debug, Clone, Default)]
pub struct StaticFom {
    pub object_parents: std::collections::HashMap<ObjectClassHandle, ObjectClassHandle>,
    pub object_classes: std::collections::HashSet<ObjectClassHandle>,
    pub object_attributes: std::collections::HashSet<(ObjectClassHandle, AttributeHandle)>,
    pub object_routing_spaces:
        std::collections::HashMap<(ObjectClassHandle, AttributeHandle), RoutingSpace>,
    pub interaction_parents: std::collections::HashMap<InteractionClassHandle, InteractionClassHandle>,
    pub interaction_classes: std::collections::HashSet<InteractionClassHandle>,
    pub interaction_routing_spaces: std::collections::HashMap<InteractionClassHandle, RoutingSpace>,
}

impl FomModel for StaticFom {
    fn object_class_exists(&self, class: ObjectClassHandle) -> bool {
        self.object_classes.contains(&class)
    }

    fn object_class_parent(&self, class: ObjectClassHandle) -> Option<ObjectClassHandle> {
        self.object_parents.get(&class).copied()
    }

    fn attribute_belongs_to(&self, class: ObjectClassHandle, attribute: AttributeHandle) -> bool {
        self.object_attributes.contains(&(class, attribute))
    }

    fn attribute_routing_space(
        &self,
        class: ObjectClassHandle,
        attribute: AttributeHandle,
    ) -> Option<RoutingSpace> {
        self.object_routing_spaces.get(&(class, attribute)).cloned()
    }

    fn interaction_class_exists(&self, class: InteractionClassHandle) -> bool {
        self.interaction_classes.contains(&class)
    }

    fn interaction_class_parent(&self, class: InteractionClassHandle) -> Option<InteractionClassHandle> {
        self.interaction_parents.get(&class).copied()
    }

    fn interaction_routing_space(&self, class: InteractionClassHandle) -> Option<RoutingSpace> {
        self.interaction_routing_spaces.get(&class).cloned()
    }
}
