//! In-memory sink for tests
//!
//! Frames sent through [`ChannelSink`] land on an unbounded channel. Dropping
//! the receiver makes every later send fail, like a closed socket.

use async_trait::async_trait;
use std::sync::Arc;
use tokio::sync::mpsc;

use crate::protocol::Envelope;
use crate::sink::{DeliveryError, SignalSink};

pub struct ChannelSink {
    tx: mpsc::UnboundedSender<String>,
}

impl ChannelSink {
    pub fn new() -> (Arc<Self>, mpsc::UnboundedReceiver<String>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Arc::new(Self { tx }), rx)
    }
}

#[async_trait]
impl SignalSink for ChannelSink {
    async fn send_text(&self, text: String) -> Result<(), DeliveryError> {
        self.tx.send(text).map_err(|_| DeliveryError::Closed)
    }

    async fn closed(&self) {
        self.tx.closed().await
    }
}

/// Receive and decode the next envelope, or None once the sink is gone
pub async fn recv_envelope(rx: &mut mpsc::UnboundedReceiver<String>) -> Option<Envelope> {
    let text = rx.recv().await?;
    Envelope::decode(text.as_bytes()).ok()
}
