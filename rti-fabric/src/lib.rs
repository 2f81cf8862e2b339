//! The HLA RTI message fabric: wire protocol, bundler, pluggable protocol
//! stack, connection and response correlator, interest manager, sync-point
//! manager, time-status state machine, message sink, and federation hub.

pub mod config;
pub mod connection;
pub mod ddm;
pub mod federation;
pub mod fom;
pub mod interest;
pub mod message;
pub mod protocol;
pub mod sink;
pub mod syncpoint;
pub mod time;
pub mod transport;

pub use config::Config;
pub use connection::{ApplicationReceiver, Connection};
pub use ddm::{Range, Region, RegionStore};
pub use federation::{Federate, Federation, FederationManager};
pub use fom::{FomModel, RoutingSpace, StaticFom};
pub use interest::InterestManager;
pub use message::{Message, MessageBody, MessageType, ObjectInstanceId, PorticoMessage};
pub use protocol::{Action, Protocol, ProtocolStack};
pub use sink::{Handler, MessageContext, MessageSink, RtiProbeHandler};
pub use syncpoint::{SyncPoint, SyncPointManager, SyncPointStatus};
pub use time::{federation_lbts, TimeStatus};
pub use transport::bundler::{Bundler, BundlerConfig};
pub use transport::tcp::TcpTransport;
pub use transport::Transport;
