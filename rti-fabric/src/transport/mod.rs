//! Transport abstraction and implementations (C2, §4.2).

pub mod bundler;
pub mod tcp;

use async_trait::async_trait;
use rti_core::Result;

use crate::message::Message;

/// An abstract I/O endpoint a [`crate::protocol::ProtocolStack`] sits on top
/// of. The bundled-stream TCP transport ([`tcp::TcpTransport`]) is the only
/// implementation in scope; the trait exists so the protocol stack and
/// connection layers never depend on it directly (§4.3's "Tail = the
/// Transport itself").
#[async_trait]
pub trait Transport: Send + Sync {
    async fn open(&self) -> Result<()>;
    async fn close(&self) -> Result<()>;
    /// Send a fully-encoded message toward the wire.
    async fn down(&self, message: Message) -> Result<()>;
    fn is_open(&self) -> bool;
}
