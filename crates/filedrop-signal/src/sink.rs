//! Outbound transport abstraction
//!
//! The relay writes to a connection through [`SignalSink`] so the same engine
//! runs over a websocket in the daemon and over in-memory channels in tests.

use async_trait::async_trait;
use thiserror::Error;

use crate::error::RelayError;
use crate::protocol::Envelope;

/// Errors from sending over a connection
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum DeliveryError {
    #[error("connection closed")]
    Closed,
    #[error("send failed: {0}")]
    Failed(String),
}

/// Write half of one signaling connection
#[async_trait]
pub trait SignalSink: Send + Sync {
    /// Send one text frame
    async fn send_text(&self, text: String) -> Result<(), DeliveryError>;

    /// Resolves once the connection can no longer accept frames
    async fn closed(&self);
}

/// Encode and send an envelope
pub async fn send_envelope(sink: &dyn SignalSink, envelope: &Envelope) -> Result<(), RelayError> {
    let text = envelope.to_text()?;
    sink.send_text(text).await?;
    Ok(())
}
