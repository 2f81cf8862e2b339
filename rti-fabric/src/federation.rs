//! Federation hub (C9, §4.9).
//!
//! Owns everything scoped to one running federation: its FOM-derived
//! interest state, its sync points, per-federate time status, its region
//! store, the set of joined federates' connections, and the outgoing
//! control queue's dedicated processor task.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use rti_core::{Error, FederateHandle, FederationHandle, Result, Target, NULL_FEDERATE, RTI_HANDLE};
use tokio::sync::{mpsc, Mutex, RwLock};
use tokio::task::JoinHandle;
use tracing::{error, instrument, warn};

use crate::config::Config;
use crate::connection::{ApplicationReceiver, Connection};
use crate::ddm::RegionStore;
use crate::fom::FomModel;
use crate::interest::InterestManager;
use crate::message::PorticoMessage;
use crate::sink::{MessageContext, MessageSink};
use crate::syncpoint::SyncPointManager;
use crate::time::TimeStatus;

/// One joined federate: its identity plus the connection its messages travel on.
pub struct Federate {
    pub handle: FederateHandle,
    pub name: String,
    pub federate_type: String,
    pub connection: Arc<Connection>,
}

/// All mutable per-federation state, behind one logical write-lock (§5
/// "Shared-resource policy"): readers take the read guard, any mutation
/// takes the write guard.
struct FederationState {
    federates: HashMap<FederateHandle, Federate>,
    interest: InterestManager,
    sync_points: SyncPointManager,
    time_status: HashMap<FederateHandle, TimeStatus>,
    regions: RegionStore,
    next_federate: u64,
}

/// A running federation (C9).
pub struct Federation {
    pub handle: FederationHandle,
    pub name: String,
    state: RwLock<FederationState>,
    incoming_sink: Arc<MessageSink>,
    outgoing_tx: mpsc::Sender<PorticoMessage>,
    outgoing_processor: Mutex<Option<JoinHandle<()>>>,
}

impl Federation {
    pub fn new(
        handle: FederationHandle,
        name: impl Into<String>,
        fom: Arc<dyn FomModel>,
        incoming_sink: Arc<MessageSink>,
        config: &Config,
    ) -> Arc<Self> {
        let (outgoing_tx, outgoing_rx) = mpsc::channel(config.outgoing_queue.capacity);
        let federation = Arc::new(Federation {
            handle,
            name: name.into(),
            state: RwLock::new(FederationState {
                federates: HashMap::new(),
                interest: InterestManager::new(fom),
                sync_points: SyncPointManager::new(),
                time_status: HashMap::new(),
                regions: RegionStore::new(),
                next_federate: 1,
            }),
            incoming_sink,
            outgoing_tx,
            outgoing_processor: Mutex::new(None),
        });
        federation.start_outgoing_processor(outgoing_rx);
        federation
    }

    /// Starts the dedicated outgoing-processor task (§4.9, §5): drains the
    /// control queue and fans each message out as a `ControlRequest` over
    /// every joined federate's connection. Started on creation, stopped by
    /// [`Federation::destroy`].
    fn start_outgoing_processor(self: &Arc<Self>, mut rx: mpsc::Receiver<PorticoMessage>) {
        let federation = self.clone();
        let handle = tokio::spawn(async move {
            while let Some(message) = rx.recv().await {
                let connections: Vec<Arc<Connection>> = {
                    let state = federation.state.read().await;
                    state.federates.values().map(|f| f.connection.clone()).collect()
                };
                for connection in connections {
                    if let Err(e) = connection.send_control_request(&message).await {
                        error!(federation = %federation.handle.raw(), error = %e, "outgoing control message failed");
                    }
                }
            }
        });
        // Locking here can't block: this runs once, before any other task
        // has a reference to `self`.
        *self.outgoing_processor.try_lock().expect("uncontended at startup") = Some(handle);
    }

    /// `queueControlMessage(m)` (§4.9): stamps `fromRti`/`source` if unset and
    /// offers to the bounded queue, dropping with a warning if full.
    #[instrument(skip(self, message))]
    pub async fn queue_control_message(&self, mut message: PorticoMessage) {
        message.from_rti = true;
        if message.source == NULL_FEDERATE {
            message.source = RTI_HANDLE;
        }
        message.federation = self.handle;
        if let Err(mpsc::error::TrySendError::Full(_)) = self.outgoing_tx.try_send(message) {
            warn!(federation = %self.handle.raw(), "outgoing queue full, dropping control message");
        }
    }

    /// `queueDataMessage(m, senderConn)` (§4.9): runs the sink for local
    /// side effects, then fans out to every federate connection except the
    /// sender's. No loopback.
    #[instrument(skip(self, message, sender))]
    pub async fn queue_data_message(
        &self,
        message: PorticoMessage,
        sender: Option<&Arc<Connection>>,
    ) -> Result<()> {
        let mut ctx = MessageContext::new(message.clone());
        self.incoming_sink.dispatch(&mut ctx).await?;

        let connections: Vec<Arc<Connection>> = {
            let state = self.state.read().await;
            state
                .federates
                .values()
                .filter(|f| !sender.is_some_and(|s| Arc::ptr_eq(s, &f.connection)))
                .map(|f| f.connection.clone())
                .collect()
        };
        for connection in connections {
            if let Err(e) = connection.send_data_message(&message).await {
                error!(federation = %self.handle.raw(), error = %e, "data message fan-out failed");
            }
        }
        Ok(())
    }

    pub async fn join(
        &self,
        name: impl Into<String>,
        federate_type: impl Into<String>,
        connection: Arc<Connection>,
    ) -> FederateHandle {
        let mut state = self.state.write().await;
        let raw = state.next_federate;
        state.next_federate += 1;
        let handle = FederateHandle::from(raw as usize);
        state.federates.insert(
            handle,
            Federate { handle, name: name.into(), federate_type: federate_type.into(), connection },
        );
        state.time_status.insert(handle, TimeStatus::default());
        handle
    }

    pub async fn resign(&self, handle: FederateHandle) {
        let mut state = self.state.write().await;
        state.federates.remove(&handle);
        state.time_status.remove(&handle);
        let federation_handles: std::collections::BTreeSet<_> = state.federates.keys().copied().collect();
        state.sync_points.federate_resigned(handle, &federation_handles);
    }

    pub async fn federate_handles(&self) -> std::collections::BTreeSet<FederateHandle> {
        self.state.read().await.federates.keys().copied().collect()
    }

    pub async fn with_interest_manager<R>(&self, f: impl FnOnce(&mut InterestManager) -> R) -> R {
        f(&mut self.state.write().await.interest)
    }

    pub async fn with_sync_points<R>(&self, f: impl FnOnce(&mut SyncPointManager) -> R) -> R {
        f(&mut self.state.write().await.sync_points)
    }

    pub async fn with_regions<R>(&self, f: impl FnOnce(&mut RegionStore) -> R) -> R {
        f(&mut self.state.write().await.regions)
    }

    pub async fn with_time_status<R>(
        &self,
        handle: FederateHandle,
        f: impl FnOnce(&mut TimeStatus) -> R,
    ) -> Option<R> {
        let mut state = self.state.write().await;
        state.time_status.get_mut(&handle).map(f)
    }

    pub async fn federation_lbts(&self) -> rti_core::LogicalTime {
        let state = self.state.read().await;
        crate::time::federation_lbts(state.time_status.values())
    }

    pub fn target(&self, handle: FederateHandle) -> Target {
        Target::One(handle)
    }

    /// Interrupts and joins the outgoing processor with a 5 s timeout (§4.9).
    pub async fn destroy(&self) {
        let handle = self.outgoing_processor.lock().await.take();
        if let Some(handle) = handle {
            handle.abort();
            let _ = tokio::time::timeout(Duration::from_secs(5), handle).await;
        }
    }
}

/// A joined federate's connection hands `DataMessage`/`Notification` traffic
/// straight to [`Federation::queue_data_message`] (§4.4 "appReceiver", §4.9).
#[async_trait]
impl ApplicationReceiver for Federation {
    async fn receive_data_message(&self, message: PorticoMessage, connection: &Arc<Connection>) -> Result<()> {
        self.queue_data_message(message, Some(connection)).await
    }

    async fn receive_notification(&self, message: PorticoMessage, connection: &Arc<Connection>) -> Result<()> {
        self.queue_data_message(message, Some(connection)).await
    }
}

/// Process-wide registry of running federations (§5 "Shared-resource
/// policy"): one logical lock, no ambient singleton beyond this value and
/// the atomic handle counter.
pub struct FederationManager {
    federations: RwLock<HashMap<FederationHandle, Arc<Federation>>>,
    names: Mutex<HashMap<String, FederationHandle>>,
    next_handle: AtomicU64,
    config: Config,
}

impl FederationManager {
    pub fn new(config: Config) -> Self {
        FederationManager {
            federations: RwLock::new(HashMap::new()),
            names: Mutex::new(HashMap::new()),
            next_handle: AtomicU64::new(1),
            config,
        }
    }

    #[instrument(skip(self, fom, incoming_sink))]
    pub async fn create_federation(
        &self,
        name: impl Into<String>,
        fom: Arc<dyn FomModel>,
        incoming_sink: Arc<MessageSink>,
    ) -> Result<Arc<Federation>> {
        let name = name.into();
        let mut names = self.names.lock().await;
        if names.contains_key(&name) {
            return Err(Error::already_exists(format!("federation {name:?}")));
        }
        let raw = self.next_handle.fetch_add(1, Ordering::SeqCst);
        let handle = FederationHandle::from(raw as usize);
        let federation = Federation::new(handle, name.clone(), fom, incoming_sink, &self.config);
        names.insert(name, handle);
        self.federations.write().await.insert(handle, federation.clone());
        Ok(federation)
    }

    pub async fn get(&self, handle: FederationHandle) -> Option<Arc<Federation>> {
        self.federations.read().await.get(&handle).cloned()
    }

    pub async fn destroy_federation(&self, handle: FederationHandle) -> Result<()> {
        let federation = self
            .federations
            .write()
            .await
            .remove(&handle)
            .ok_or_else(|| Error::not_found(format!("federation {handle:?}")))?;
        federation.destroy().await;
        self.names.lock().await.retain(|_, v| *v != handle);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fom::StaticFom;

    fn manager() -> FederationManager {
        FederationManager::new(Config::default())
    }

    #[tokio::test]
    async fn duplicate_federation_names_are_rejected() {
        let mgr = manager();
        let fom: Arc<dyn FomModel> = Arc::new(StaticFom::default());
        let sink = Arc::new(MessageSink::new());
        mgr.create_federation("alpha", fom.clone(), sink.clone()).await.unwrap();
        assert!(mgr.create_federation("alpha", fom, sink).await.is_err());
    }

    #[tokio::test]
    async fn destroying_an_unknown_federation_is_an_error() {
        let mgr = manager();
        assert!(mgr.destroy_federation(FederationHandle::from(99usize)).await.is_err());
    }

    #[tokio::test]
    async fn create_then_destroy_round_trips() {
        let mgr = manager();
        let fom: Arc<dyn FomModel> = Arc::new(StaticFom::default());
        let sink = Arc::new(MessageSink::new());
        let federation = mgr.create_federation("alpha", fom, sink).await.unwrap();
        let handle = federation.handle;
        assert!(mgr.get(handle).await.is_some());
        mgr.destroy_federation(handle).await.unwrap();
        assert!(mgr.get(handle).await.is_none());
    }
}
