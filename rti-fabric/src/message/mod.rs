//! The typed message model (C1, §3 "PorticoMessage" / "Message (wire envelope)").

pub mod header;
pub mod wire;

use rti_core::{
    AttributeHandle, Error, FederateHandle, FederationHandle, InteractionClassHandle,
    LogicalTime, ObjectClassHandle, RegionToken, Result, Target,
};
use serde::{Deserialize, Serialize};

pub use wire::Message;

/// A runtime object instance identifier carried by `UpdateAttributes` (§3).
///
/// Distinct from [`ObjectClassHandle`]: the class is FOM metadata, this is
/// the handle of one live object instance in a federation's repository.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ObjectInstanceId(pub i32);

/// Discriminates a [`PorticoMessage`]'s payload (§9 "replace subclass-per-message
/// with a tagged variant").
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum MessageType {
    RtiProbe = 0,
    CreateFederation = 1,
    DestroyFederation = 2,
    JoinFederation = 3,
    ResignFederation = 4,
    PublishObjectClass = 5,
    UnpublishObjectClass = 6,
    SubscribeObjectClass = 7,
    UnsubscribeObjectClass = 8,
    PublishInteractionClass = 9,
    UnpublishInteractionClass = 10,
    SubscribeInteractionClass = 11,
    UnsubscribeInteractionClass = 12,
    RegisterSyncPoint = 13,
    SynchronizationPointAchieved = 14,
    FederationSynchronized = 15,
    TimeAdvanceRequest = 16,
    TimeAdvanceRequestAvailable = 17,
    TimeAdvanceGrant = 18,
    EnableTimeConstrained = 19,
    EnableTimeRegulation = 20,
    UpdateAttributes = 21,
    SendInteraction = 22,
}

impl MessageType {
    pub fn from_u8(v: u8) -> Result<Self> {
        use MessageType::*;
        Ok(match v {
            0 => RtiProbe,
            1 => CreateFederation,
            2 => DestroyFederation,
            3 => JoinFederation,
            4 => ResignFederation,
            5 => PublishObjectClass,
            6 => UnpublishObjectClass,
            7 => SubscribeObjectClass,
            8 => UnsubscribeObjectClass,
            9 => PublishInteractionClass,
            10 => UnpublishInteractionClass,
            11 => SubscribeInteractionClass,
            12 => UnsubscribeInteractionClass,
            13 => RegisterSyncPoint,
            14 => SynchronizationPointAchieved,
            15 => FederationSynchronized,
            16 => TimeAdvanceRequest,
            17 => TimeAdvanceRequestAvailable,
            18 => TimeAdvanceGrant,
            19 => EnableTimeConstrained,
            20 => EnableTimeRegulation,
            21 => UpdateAttributes,
            22 => SendInteraction,
            other => return Err(Error::Protocol(format!("unknown MessageType id {other}"))),
        })
    }

    /// `UpdateAttributes` and `SendInteraction` dominate traffic volume and
    /// opt into the manual marshaller (§4.1); every other type uses the
    /// generic serializer.
    pub fn uses_manual_marshal(self) -> bool {
        matches!(self, MessageType::UpdateAttributes | MessageType::SendInteraction)
    }
}

/// The payload of a [`PorticoMessage`], one variant per [`MessageType`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum MessageBody {
    RtiProbe,
    CreateFederation {
        name: String,
        fom_modules: Vec<String>,
    },
    DestroyFederation {
        name: String,
    },
    JoinFederation {
        federate_name: String,
        federate_type: String,
    },
    ResignFederation,
    PublishObjectClass {
        class: ObjectClassHandle,
        attributes: Vec<AttributeHandle>,
    },
    UnpublishObjectClass {
        class: ObjectClassHandle,
        attributes: Vec<AttributeHandle>,
    },
    SubscribeObjectClass {
        class: ObjectClassHandle,
        attributes: Vec<AttributeHandle>,
        region: Option<RegionToken>,
    },
    UnsubscribeObjectClass {
        class: ObjectClassHandle,
        attributes: Vec<AttributeHandle>,
    },
    PublishInteractionClass {
        class: InteractionClassHandle,
    },
    UnpublishInteractionClass {
        class: InteractionClassHandle,
    },
    SubscribeInteractionClass {
        class: InteractionClassHandle,
        region: Option<RegionToken>,
    },
    UnsubscribeInteractionClass {
        class: InteractionClassHandle,
    },
    RegisterSyncPoint {
        label: String,
        tag: Vec<u8>,
        subset: Vec<FederateHandle>,
    },
    SynchronizationPointAchieved {
        label: String,
    },
    FederationSynchronized {
        label: String,
    },
    TimeAdvanceRequest {
        time: LogicalTime,
        available: bool,
    },
    TimeAdvanceGrant {
        time: LogicalTime,
    },
    EnableTimeConstrained,
    EnableTimeRegulation {
        lookahead: f64,
    },
    /// Manually marshalled (§4.1); `attributes` pairs a handle with its
    /// FOM-opaque encoded value.
    UpdateAttributes {
        object_id: ObjectInstanceId,
        attributes: Vec<(AttributeHandle, Vec<u8>)>,
    },
    /// Manually marshalled (§4.1).
    SendInteraction {
        interaction_class: InteractionClassHandle,
        parameters: Vec<(AttributeHandle, Vec<u8>)>,
    },
}

impl MessageBody {
    pub fn message_type(&self) -> MessageType {
        use MessageBody::*;
        match self {
            RtiProbe => MessageType::RtiProbe,
            CreateFederation { .. } => MessageType::CreateFederation,
            DestroyFederation { .. } => MessageType::DestroyFederation,
            JoinFederation { .. } => MessageType::JoinFederation,
            ResignFederation => MessageType::ResignFederation,
            PublishObjectClass { .. } => MessageType::PublishObjectClass,
            UnpublishObjectClass { .. } => MessageType::UnpublishObjectClass,
            SubscribeObjectClass { .. } => MessageType::SubscribeObjectClass,
            UnsubscribeObjectClass { .. } => MessageType::UnsubscribeObjectClass,
            PublishInteractionClass { .. } => MessageType::PublishInteractionClass,
            UnpublishInteractionClass { .. } => MessageType::UnpublishInteractionClass,
            SubscribeInteractionClass { .. } => MessageType::SubscribeInteractionClass,
            UnsubscribeInteractionClass { .. } => MessageType::UnsubscribeInteractionClass,
            RegisterSyncPoint { .. } => MessageType::RegisterSyncPoint,
            SynchronizationPointAchieved { .. } => MessageType::SynchronizationPointAchieved,
            FederationSynchronized { .. } => MessageType::FederationSynchronized,
            TimeAdvanceRequest { available, .. } => {
                if *available {
                    MessageType::TimeAdvanceRequestAvailable
                } else {
                    MessageType::TimeAdvanceRequest
                }
            }
            TimeAdvanceGrant { .. } => MessageType::TimeAdvanceGrant,
            EnableTimeConstrained => MessageType::EnableTimeConstrained,
            EnableTimeRegulation { .. } => MessageType::EnableTimeRegulation,
            UpdateAttributes { .. } => MessageType::UpdateAttributes,
            SendInteraction { .. } => MessageType::SendInteraction,
        }
    }
}

/// Every application-level message (§3 "PorticoMessage"). Treated as an
/// immutable value once constructed; cloned rather than mutated in place
/// once it has been handed to a connection for transport.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PorticoMessage {
    pub source: FederateHandle,
    pub target: Target,
    pub federation: FederationHandle,
    pub from_rti: bool,
    pub immediate_processing: bool,
    pub timestamp: LogicalTime,
    pub body: MessageBody,
}

impl PorticoMessage {
    pub fn message_type(&self) -> MessageType {
        self.body.message_type()
    }
}
