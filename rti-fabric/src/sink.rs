//! Message sink & handler dispatch (C5, §4.5).

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use rti_core::{Error, LogicalTime, Result, Target, RTI_HANDLE};
use tracing::warn;

use crate::message::{MessageBody, MessageType, PorticoMessage};

/// Carries the inbound request and, once a handler populates it, the
/// outbound response (§4.4 "build a context").
pub struct MessageContext {
    pub request: PorticoMessage,
    pub response: Option<PorticoMessage>,
}

impl MessageContext {
    pub fn new(request: PorticoMessage) -> Self {
        MessageContext { request, response: None }
    }
}

#[async_trait]
pub trait Handler: Send + Sync {
    /// `Ok(())` continues the chain. `Err(Error::Veto)` stops it; if no
    /// response has been set by then the sink treats the message as
    /// successfully handled (§4.5, §7).
    async fn handle(&self, ctx: &mut MessageContext) -> Result<()>;
}

enum SinkEntry {
    Single(Arc<dyn Handler>),
    Chain(Vec<Arc<dyn Handler>>),
    Exclusive(Arc<dyn Handler>),
}

/// Maps [`MessageType`] to handler(s), with three registration modes (§4.5).
#[derive(Default)]
pub struct MessageSink {
    entries: HashMap<MessageType, SinkEntry>,
}

impl MessageSink {
    pub fn new() -> Self {
        MessageSink::default()
    }

    pub fn register_single(&mut self, mt: MessageType, handler: Arc<dyn Handler>) -> Result<()> {
        if matches!(self.entries.get(&mt), Some(SinkEntry::Exclusive(_))) {
            return Err(Error::already_exists(format!("{mt:?} is registered exclusively")));
        }
        self.entries.insert(mt, SinkEntry::Single(handler));
        Ok(())
    }

    pub fn register_chain(&mut self, mt: MessageType, handler: Arc<dyn Handler>) -> Result<()> {
        match self.entries.get_mut(&mt) {
            Some(SinkEntry::Exclusive(_)) => {
                return Err(Error::already_exists(format!("{mt:?} is registered exclusively")))
            }
            Some(SinkEntry::Single(_)) => {
                return Err(Error::already_exists(format!(
                    "{mt:?} already has a single-mode handler"
                )))
            }
            Some(SinkEntry::Chain(chain)) => chain.push(handler),
            None => {
                self.entries.insert(mt, SinkEntry::Chain(vec![handler]));
            }
        }
        Ok(())
    }

    /// No further handler may register for `mt` after this call (§4.5).
    pub fn register_exclusive(&mut self, mt: MessageType, handler: Arc<dyn Handler>) -> Result<()> {
        if self.entries.contains_key(&mt) {
            return Err(Error::already_exists(format!("{mt:?} already has a handler")));
        }
        self.entries.insert(mt, SinkEntry::Exclusive(handler));
        Ok(())
    }

    /// Dispatches `ctx.request` to its registered handler(s), returning the
    /// populated response if any. Unknown types are logged and dropped.
    pub async fn dispatch(&self, ctx: &mut MessageContext) -> Result<Option<PorticoMessage>> {
        let mt = ctx.request.message_type();
        match self.entries.get(&mt) {
            None => {
                warn!(message_type = ?mt, "no handler registered, dropping message");
                Ok(None)
            }
            Some(SinkEntry::Single(h)) | Some(SinkEntry::Exclusive(h)) => match h.handle(ctx).await {
                Ok(()) => Ok(ctx.response.take()),
                Err(Error::Veto) => Ok(ctx.response.take()),
                Err(e) => Err(e),
            },
            Some(SinkEntry::Chain(handlers)) => {
                for h in handlers {
                    match h.handle(ctx).await {
                        Ok(()) => continue,
                        Err(Error::Veto) => break,
                        Err(e) => return Err(e),
                    }
                }
                Ok(ctx.response.take())
            }
        }
    }
}

/// Answers every `RtiProbe` with success (§4.4 S1 `findRti()`). The probe
/// carries no payload, so echoing it back to the requester is enough to
/// prove something answered.
pub struct RtiProbeHandler;

#[async_trait]
impl Handler for RtiProbeHandler {
    async fn handle(&self, ctx: &mut MessageContext) -> Result<()> {
        ctx.response = Some(PorticoMessage {
            source: RTI_HANDLE,
            target: Target::One(ctx.request.source),
            federation: ctx.request.federation,
            from_rti: true,
            immediate_processing: false,
            timestamp: LogicalTime::NULL_TIME,
            body: MessageBody::RtiProbe,
        });
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rti_core::FederationHandle;
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn probe_ctx() -> MessageContext {
        MessageContext::new(PorticoMessage {
            source: RTI_HANDLE,
            target: Target::One(RTI_HANDLE),
            federation: FederationHandle::from(0usize),
            from_rti: false,
            immediate_processing: false,
            timestamp: LogicalTime::NULL_TIME,
            body: crate::message::MessageBody::RtiProbe,
        })
    }

    struct Counter(Arc<AtomicUsize>);
    #[async_trait]
    impl Handler for Counter {
        async fn handle(&self, _ctx: &mut MessageContext) -> Result<()> {
            self.0.fetch_add(1, Ordering::SeqCst);
            Ok(())
        }
    }

    struct Vetoer;
    #[async_trait]
    impl Handler for Vetoer {
        async fn handle(&self, _ctx: &mut MessageContext) -> Result<()> {
            Err(Error::Veto)
        }
    }

    #[tokio::test]
    async fn chain_invokes_handlers_in_registration_order_until_veto() {
        let count = Arc::new(AtomicUsize::new(0));
        let mut sink = MessageSink::new();
        sink.register_chain(MessageType::RtiProbe, Arc::new(Counter(count.clone()))).unwrap();
        sink.register_chain(MessageType::RtiProbe, Arc::new(Vetoer)).unwrap();
        sink.register_chain(MessageType::RtiProbe, Arc::new(Counter(count.clone()))).unwrap();

        let mut ctx = probe_ctx();
        let response = sink.dispatch(&mut ctx).await.unwrap();
        assert!(response.is_none());
        assert_eq!(count.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn exclusive_registration_blocks_further_registration() {
        let mut sink = MessageSink::new();
        sink.register_exclusive(MessageType::RtiProbe, Arc::new(Vetoer)).unwrap();
        assert!(sink.register_single(MessageType::RtiProbe, Arc::new(Vetoer)).is_err());
        assert!(sink.register_chain(MessageType::RtiProbe, Arc::new(Vetoer)).is_err());
    }

    #[tokio::test]
    async fn unregistered_type_is_dropped_without_error() {
        let sink = MessageSink::new();
        let mut ctx = probe_ctx();
        assert!(sink.dispatch(&mut ctx).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn rti_probe_handler_answers_with_success() {
        let mut sink = MessageSink::new();
        sink.register_single(MessageType::RtiProbe, Arc::new(RtiProbeHandler)).unwrap();
        let mut ctx = probe_ctx();
        let requester = ctx.request.source;
        let response = sink.dispatch(&mut ctx).await.unwrap().expect("probe must answer");
        assert_eq!(response.target, Target::One(requester));
        assert!(matches!(response.body, MessageBody::RtiProbe));
    }
}
