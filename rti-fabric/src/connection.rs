//! Connection façade, response correlator, and inbound dispatch (C4, §4.4).

use std::collections::HashMap;
use std::sync::{Arc, Weak};
use std::time::Duration;

use async_trait::async_trait;
use rti_core::{Error, RequestId, Result, Target};
use tokio::net::TcpStream;
use tokio::sync::{oneshot, Mutex};
use tracing::{instrument, warn};

use crate::message::header::CallType;
use crate::message::{Message, PorticoMessage};
use crate::protocol::{AppConnector, ProtocolStack};
use crate::sink::{MessageContext, MessageSink};
use crate::transport::bundler::BundlerConfig;
use crate::transport::tcp::TcpTransport;
use crate::transport::Transport;

/// What a connection's owner does with an inbound `DataMessage`/`Notification`
/// once `receive(m)` has routed past the response correlator and the sink
/// (§4.4 "appReceiver"). A federation hub implements this to fan the message
/// out to every other joined federate (§4.9).
#[async_trait]
pub trait ApplicationReceiver: Send + Sync {
    async fn receive_data_message(&self, message: PorticoMessage, connection: &Arc<Connection>) -> Result<()>;
    async fn receive_notification(&self, message: PorticoMessage, connection: &Arc<Connection>) -> Result<()>;
}

/// Maps request IDs to the oneshot sender a blocked `sendControlRequest`
/// waits on (§4.4 "response correlator"). Guarded by an async mutex since
/// registration and delivery can race across tasks.
struct Correlator {
    next_id: u16,
    waiters: HashMap<RequestId, oneshot::Sender<PorticoMessage>>,
}

impl Correlator {
    fn new() -> Self {
        Correlator { next_id: 1, waiters: HashMap::new() }
    }

    fn register(&mut self) -> (RequestId, oneshot::Receiver<PorticoMessage>) {
        loop {
            let id = RequestId(self.next_id);
            self.next_id = self.next_id.wrapping_add(1).max(1);
            if id != RequestId::NONE && !self.waiters.contains_key(&id) {
                let (tx, rx) = oneshot::channel();
                self.waiters.insert(id, tx);
                return (id, rx);
            }
        }
    }

    fn offer(&mut self, id: RequestId, response: PorticoMessage) {
        if let Some(tx) = self.waiters.remove(&id) {
            let _ = tx.send(response);
        }
    }

    fn cancel(&mut self, id: RequestId) {
        self.waiters.remove(&id);
    }
}

/// One endpoint relationship, federate↔RTI or RTI↔federate (§4.4).
pub struct Connection {
    stack: ProtocolStack,
    correlator: Arc<Mutex<Correlator>>,
    default_timeout: Duration,
    sink: Arc<MessageSink>,
    app_receiver: Arc<dyn ApplicationReceiver>,
}

impl Connection {
    /// Build a connection on top of an already-open transport. Uses
    /// `Arc::new_cyclic` because the stack's application connector needs a
    /// handle back to the connection it feeds `receive(m)` into, and that
    /// connection doesn't exist until the stack does (§4.3's implicit head).
    pub fn new(
        transport: Arc<dyn Transport>,
        default_timeout: Duration,
        sink: Arc<MessageSink>,
        app_receiver: Arc<dyn ApplicationReceiver>,
    ) -> Arc<Self> {
        Arc::new_cyclic(|weak: &Weak<Connection>| {
            let weak = weak.clone();
            let app_connector: AppConnector = Arc::new(move |message: Message| {
                let weak = weak.clone();
                Box::pin(async move {
                    let Some(connection) = weak.upgrade() else {
                        return Ok(());
                    };
                    let (body, envelope) = Message::decode(message.as_bytes().to_vec())?;
                    connection.receive(body, &envelope).await
                })
            });
            Connection {
                stack: ProtocolStack::new(transport, app_connector),
                correlator: Arc::new(Mutex::new(Correlator::new())),
                default_timeout,
                sink,
                app_receiver,
            }
        })
    }

    /// Wire a bundled-stream TCP transport all the way up to this connection:
    /// splits `stream`, spawns the bundler's flusher and the bundle reader
    /// (§4.2), and spawns the task that pumps every decoded inbound envelope
    /// through the protocol stack's `receive_up` (§4.3) into `receive(m)`
    /// (§4.4).
    pub fn from_tcp_stream(
        stream: TcpStream,
        bundler_config: BundlerConfig,
        default_timeout: Duration,
        sink: Arc<MessageSink>,
        app_receiver: Arc<dyn ApplicationReceiver>,
    ) -> Arc<Self> {
        let (transport, mut inbound_rx) = TcpTransport::new(stream, bundler_config);
        let connection = Connection::new(Arc::new(transport), default_timeout, sink, app_receiver);
        let pump_target = connection.clone();
        tokio::spawn(async move {
            while let Some(envelope) = inbound_rx.recv().await {
                if let Err(e) = pump_target.stack.receive_up(envelope).await {
                    warn!(error = %e, "inbound message processing failed");
                }
            }
        });
        connection
    }

    /// `receive(m)` (§4.4): the inbound `CallType` switch. `ControlRequest`
    /// goes through the sink and, if a handler populates a response, is
    /// answered back down the stack. `ControlResponseOK|Err` wakes the
    /// correlator waiter. `DataMessage`/`Notification` go to whatever owns
    /// this connection (normally a federation hub, §4.9).
    #[instrument(skip(self, message, envelope))]
    pub async fn receive(self: &Arc<Self>, message: PorticoMessage, envelope: &Message) -> Result<()> {
        match envelope.call_type {
            CallType::ControlResponseOk | CallType::ControlResponseErr => {
                self.complete_control_request(message, envelope.request_id).await;
                Ok(())
            }
            CallType::ControlRequest => {
                let mut ctx = MessageContext::new(message);
                let response = self.sink.dispatch(&mut ctx).await?;
                if let Some(body) = response {
                    let reply = Message::encode_response(&envelope.header(), &body, true)?;
                    self.stack.send_down(reply).await?;
                }
                Ok(())
            }
            CallType::DataMessage => self.app_receiver.receive_data_message(message, self).await,
            CallType::Notification => self.app_receiver.receive_notification(message, self).await,
        }
    }

    /// Non-blocking (§4.4).
    #[instrument(skip(self, message))]
    pub async fn send_data_message(&self, message: &PorticoMessage) -> Result<()> {
        let encoded = Message::encode(message, CallType::DataMessage, RequestId::NONE)?;
        self.stack.send_down(encoded).await
    }

    /// Non-blocking (§4.4).
    #[instrument(skip(self, message))]
    pub async fn send_notification(&self, message: &PorticoMessage) -> Result<()> {
        let encoded = Message::encode(message, CallType::Notification, RequestId::NONE)?;
        self.stack.send_down(encoded).await
    }

    /// Blocks until a matching response, a timeout, or the connection closes
    /// (§4.4). `RtiProbe` travels this path; a successful reply proves an
    /// RTI is reachable.
    #[instrument(skip(self, message))]
    pub async fn send_control_request(&self, message: &PorticoMessage) -> Result<PorticoMessage> {
        self.send_control_request_with_timeout(message, self.default_timeout).await
    }

    pub async fn send_control_request_with_timeout(
        &self,
        message: &PorticoMessage,
        timeout: Duration,
    ) -> Result<PorticoMessage> {
        let (request_id, rx) = self.correlator.lock().await.register();
        let encoded = Message::encode(message, CallType::ControlRequest, request_id)?;
        if let Err(e) = self.stack.send_down(encoded).await {
            self.correlator.lock().await.cancel(request_id);
            return Err(e);
        }
        match tokio::time::timeout(timeout, rx).await {
            Ok(Ok(response)) => Ok(response),
            Ok(Err(_)) => Err(Error::Protocol("connection closed while awaiting response".into())),
            Err(_) => {
                self.correlator.lock().await.cancel(request_id);
                Err(Error::Timeout)
            }
        }
    }

    /// `findRti()` (§4.4 S1): a reachable RTI answers `RtiProbe` with success.
    pub async fn find_rti(&self, probe: &PorticoMessage, timeout: Duration) -> bool {
        self.send_control_request_with_timeout(probe, timeout).await.is_ok()
    }

    /// Delivers a response to the correlator waiter registered under
    /// `request_id`, if any is still waiting (§4.4).
    async fn complete_control_request(&self, response: PorticoMessage, request_id: RequestId) {
        self.correlator.lock().await.offer(request_id, response);
    }

    pub fn target_for(&self, handle: rti_core::FederateHandle) -> Target {
        Target::One(handle)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn correlator_never_reuses_id_zero() {
        let mut correlator = Correlator::new();
        let (id, _rx) = correlator.register();
        assert_ne!(id, RequestId::NONE);
    }

    #[tokio::test]
    async fn correlator_delivers_to_matching_waiter_only() {
        let mut correlator = Correlator::new();
        let (id_a, rx_a) = correlator.register();
        let (id_b, rx_b) = correlator.register();
        assert_ne!(id_a, id_b);

        let body_a = crate::message::MessageBody::RtiProbe;
        let msg_a = PorticoMessage {
            source: rti_core::RTI_HANDLE,
            target: Target::One(rti_core::RTI_HANDLE),
            federation: rti_core::FederationHandle::from(0usize),
            from_rti: true,
            immediate_processing: false,
            timestamp: rti_core::LogicalTime::NULL_TIME,
            body: body_a,
        };
        correlator.offer(id_a, msg_a.clone());
        let got = rx_a.await.unwrap();
        assert_eq!(got, msg_a);
        assert!(rx_b.try_recv().is_err());
    }
}
