//! Bundled-stream TCP transport (C2, §4.2/§6).
//!
//! One reader task per connection pulls `0xCAFE`-framed bundles off the wire
//! and forwards each inner message up; writes go through a [`Bundler`].
//! Shaped after the split-reader/writer task pattern in the teacher's
//! `client::handler::Handler::run` and `rti::federate`'s connection loop.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use rti_core::{Error, Result};
use tokio::io::{AsyncReadExt, ReadHalf, WriteHalf};
use tokio::net::TcpStream;
use tokio::sync::mpsc;
use tracing::{instrument, warn};

use super::bundler::{Bundler, BundlerConfig};
use super::Transport;
use crate::message::header::{HeaderView, BUNDLE_MAGIC, HEADER_LEN};
use crate::message::Message;

/// A header-parsed, body-undecoded inbound message, handed up to whatever
/// owns the transport (normally a [`crate::protocol::ProtocolStack`]'s
/// `receive_up`, via a [`crate::connection::Connection`]).
pub type Inbound = Message;

pub struct TcpTransport {
    bundler: Bundler,
    open: Arc<AtomicBool>,
}

impl TcpTransport {
    /// Split `stream` into read/write halves, spawn the bundler's flusher
    /// task and the bundle reader task, and return the transport handle plus
    /// the channel the reader delivers decoded messages on.
    pub fn new(stream: TcpStream, config: BundlerConfig) -> (Self, mpsc::UnboundedReceiver<Inbound>) {
        let (read_half, write_half) = tokio::io::split(stream);
        let (tx, rx) = mpsc::unbounded_channel();
        let open = Arc::new(AtomicBool::new(true));

        let bundler = Bundler::spawn(config, write_half);
        tokio::spawn(read_bundles(read_half, tx, open.clone()));

        (TcpTransport { bundler, open }, rx)
    }
}

#[async_trait]
impl Transport for TcpTransport {
    async fn open(&self) -> Result<()> {
        self.open.store(true, Ordering::SeqCst);
        Ok(())
    }

    async fn close(&self) -> Result<()> {
        self.open.store(false, Ordering::SeqCst);
        Ok(())
    }

    #[instrument(skip(self, message))]
    async fn down(&self, message: Message) -> Result<()> {
        if !self.is_open() {
            return Err(Error::Protocol("transport is closed".into()));
        }
        self.bundler.submit(message.call_type, message.as_bytes()).await
    }

    fn is_open(&self) -> bool {
        self.open.load(Ordering::SeqCst)
    }
}

/// Reads `0xCAFE || len || bytes` bundles from `reader`, splits each bundle
/// into its constituent header-prefixed messages using each inner header's
/// payload length, and forwards the decoded results on `tx`.
#[instrument(skip(reader, tx, open))]
async fn read_bundles(
    mut reader: ReadHalf<TcpStream>,
    tx: mpsc::UnboundedSender<Inbound>,
    open: Arc<AtomicBool>,
) {
    loop {
        let mut magic_and_len = [0u8; 8];
        if let Err(e) = reader.read_exact(&mut magic_and_len).await {
            if e.kind() != std::io::ErrorKind::UnexpectedEof {
                warn!(error = %e, "bundle reader I/O error");
            }
            break;
        }
        let magic = u32::from_be_bytes(magic_and_len[0..4].try_into().unwrap());
        if magic != BUNDLE_MAGIC {
            warn!(magic, "bundle magic mismatch, closing connection");
            break;
        }
        let len = u32::from_be_bytes(magic_and_len[4..8].try_into().unwrap()) as usize;
        let mut bundle = vec![0u8; len];
        if reader.read_exact(&mut bundle).await.is_err() {
            break;
        }

        if let Err(e) = split_and_forward(&bundle, &tx) {
            warn!(error = %e, "failed to split bundle into messages");
            break;
        }
    }
    open.store(false, Ordering::SeqCst);
}

fn split_and_forward(bundle: &[u8], tx: &mpsc::UnboundedSender<Inbound>) -> Result<()> {
    let mut offset = 0;
    while offset < bundle.len() {
        let remaining = &bundle[offset..];
        let view = HeaderView::new(remaining)?;
        let frame_len = HEADER_LEN + view.payload_len() as usize;
        if frame_len > remaining.len() {
            return Err(Error::Protocol("bundle truncated mid-message".into()));
        }
        let frame = remaining[..frame_len].to_vec();
        let envelope = Message::from_encoded(frame)?;
        if tx.send(envelope).is_err() {
            return Ok(()); // receiver dropped; nothing left to do
        }
        offset += frame_len;
    }
    Ok(())
}
