//! The pluggable protocol stack (C3, §4.3).
//!
//! Modeled as an arena (`Vec`) indexed by position rather than a literal
//! doubly-linked list of owned references, per the design note on cyclic
//! references: each entry's neighbors are implicit in its index, so `close()`
//! can never observe a partially-freed neighbor. The implicit head
//! ("ApplicationConnector") is the stack's `app_connector` callback; the
//! implicit tail is the `Transport` the stack was built with.

use std::collections::HashSet;
use std::sync::Arc;

use async_trait::async_trait;
use futures::future::BoxFuture;
use rti_core::{Error, Result};
use tracing::{error, instrument};

use crate::message::Message;
use crate::transport::Transport;

/// What a protocol does with a message flowing through it (§4.3: "A protocol
/// may drop a message by not forwarding it, or synthesize new messages").
pub enum Action {
    Forward(Message),
    Drop,
    Synthesize(Vec<Message>),
}

#[async_trait]
pub trait Protocol: Send + Sync {
    fn name(&self) -> &str;
    async fn open(&self) -> Result<()> {
        Ok(())
    }
    async fn close(&self) -> Result<()> {
        Ok(())
    }
    async fn down(&self, message: &Message) -> Result<Action>;
    async fn up(&self, message: &Message) -> Result<Action>;
}

pub(crate) type AppConnector = Arc<dyn Fn(Message) -> BoxFuture<'static, Result<()>> + Send + Sync>;

pub struct ProtocolStack {
    protocols: Vec<(String, Arc<dyn Protocol>)>,
    transport: Arc<dyn Transport>,
    app_connector: AppConnector,
    opened: bool,
}

impl ProtocolStack {
    pub fn new(transport: Arc<dyn Transport>, app_connector: AppConnector) -> Self {
        ProtocolStack { protocols: Vec::new(), transport, app_connector, opened: false }
    }

    /// Insert a protocol immediately before the transport (§4.3: "`Transport`
    /// always last"). Opens it immediately if the stack is already open.
    #[instrument(skip(self, protocol))]
    pub async fn add_protocol(&mut self, protocol: Arc<dyn Protocol>) -> Result<()> {
        if self.protocols.iter().any(|(name, _)| name == protocol.name()) {
            return Err(Error::AlreadyExists(format!(
                "protocol named {:?} already in this stack",
                protocol.name()
            )));
        }
        if self.opened {
            protocol.open().await?;
        }
        self.protocols.push((protocol.name().to_string(), protocol));
        Ok(())
    }

    /// Open every protocol, head-to-tail, skipping the transport (the
    /// transport is opened separately by the connection, §4.3).
    pub async fn open(&mut self) -> Result<()> {
        for (_, protocol) in &self.protocols {
            protocol.open().await?;
        }
        self.opened = true;
        Ok(())
    }

    /// Close every protocol, head-to-tail; exceptions are logged and
    /// swallowed so every protocol gets a chance to close (§4.3).
    pub async fn close(&mut self) {
        for (name, protocol) in &self.protocols {
            if let Err(e) = protocol.close().await {
                error!(protocol = name.as_str(), error = %e, "error closing protocol");
            }
        }
        self.opened = false;
    }

    pub fn protocol_names(&self) -> HashSet<String> {
        self.protocols.iter().map(|(name, _)| name.clone()).collect()
    }

    pub async fn send_down(&self, message: Message) -> Result<()> {
        self.send_down_from(0, message).await
    }

    fn send_down_from<'a>(&'a self, start: usize, message: Message) -> BoxFuture<'a, Result<()>> {
        Box::pin(async move {
            let mut message = message;
            for i in start..self.protocols.len() {
                match self.protocols[i].1.down(&message).await? {
                    Action::Forward(m) => message = m,
                    Action::Drop => return Ok(()),
                    Action::Synthesize(extra) => {
                        for m in extra {
                            self.send_down_from(i + 1, m).await?;
                        }
                        return Ok(());
                    }
                }
            }
            self.transport.down(message).await
        })
    }

    pub async fn receive_up(&self, message: Message) -> Result<()> {
        self.receive_up_from(self.protocols.len(), message).await
    }

    fn receive_up_from<'a>(&'a self, start_rev: usize, message: Message) -> BoxFuture<'a, Result<()>> {
        Box::pin(async move {
            let mut message = message;
            let mut i = start_rev;
            while i > 0 {
                i -= 1;
                match self.protocols[i].1.up(&message).await? {
                    Action::Forward(m) => message = m,
                    Action::Drop => return Ok(()),
                    Action::Synthesize(extra) => {
                        for m in extra {
                            self.receive_up_from(i, m).await?;
                        }
                        return Ok(());
                    }
                }
            }
            (self.app_connector)(message).await
        })
    }
}
