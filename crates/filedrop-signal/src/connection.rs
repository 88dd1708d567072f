//! Per-socket connection manager
//!
//! A connection is bound to one role and one record id for its whole life:
//! a host to a Files Record, a connector to a Signaling Record. The read loop
//! hands every frame to its own task and goes straight back to reading, so
//! messages from one peer are processed concurrently and in no fixed order.
//! There is no cap on outstanding dispatch tasks.
//!
//! When the read side fails or closes, the bound record is deleted (best effort).
//! Subscriptions still running notice the closed socket on their next send.

use filedrop_core::SessionStore;
use futures::{Stream, StreamExt};
use std::fmt::Display;
use std::sync::Arc;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::auth::AuthGate;
use crate::error::RelayError;
use crate::processor::Outcome;
use crate::protocol::{Envelope, Inbound, Outbound};
use crate::sink::{send_envelope, SignalSink};

/// Which side of a negotiation a socket speaks for
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Role {
    /// Owner of a Files Record; may relay for many negotiations at once
    Host,
    /// Peer that opened one Signaling Record
    Connector,
}

/// One frame read from the socket. Ping/pong never reaches the engine.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Frame {
    Text(String),
    Binary(Vec<u8>),
    Close,
}

/// State shared by the read loop, dispatch tasks and subscriptions of one socket
pub struct ConnectionContext {
    role: Role,
    bound_id: String,
    store: Arc<dyn SessionStore>,
    gate: AuthGate,
    sink: Arc<dyn SignalSink>,
}

impl ConnectionContext {
    pub fn role(&self) -> Role {
        self.role
    }

    pub fn bound_id(&self) -> &str {
        &self.bound_id
    }

    pub fn store(&self) -> &dyn SessionStore {
        self.store.as_ref()
    }

    pub fn gate(&self) -> &AuthGate {
        &self.gate
    }

    pub fn sink(&self) -> Arc<dyn SignalSink> {
        Arc::clone(&self.sink)
    }

    /// Signaling Record a message applies to: hosts address one per message,
    /// connectors are pinned to the record they connected with.
    fn session_id(&self, from_envelope: Option<String>) -> String {
        match self.role {
            Role::Host => from_envelope.unwrap_or_default(),
            Role::Connector => self.bound_id.clone(),
        }
    }

    async fn process_frame(&self, frame: &[u8]) -> Result<Outcome, RelayError> {
        let Envelope {
            tag,
            signaling_id,
            data,
        } = Envelope::decode(frame)?;
        let session_id = self.session_id(signaling_id);
        let message = Inbound::decode(tag, data)?;
        debug!("{:?} {} -> {:?}", self.role, self.bound_id, message.message_type());
        message.process(self, &session_id).await
    }

    async fn handle_frame(&self, frame: Vec<u8>) {
        match self.process_frame(&frame).await {
            Ok(outcome) => debug!("{:?} {}: {:?}", self.role, self.bound_id, outcome),
            Err(e) => self.report(e).await,
        }
    }

    /// Send one Error envelope back to the peer. The connection stays open.
    async fn report(&self, err: RelayError) {
        debug!("{:?} {}: {}", self.role, self.bound_id, err);
        let envelope = Outbound::error(err.to_string()).into_envelope(None);
        if let Err(e) = send_envelope(self.sink.as_ref(), &envelope).await {
            debug!("Could not report error to {}: {}", self.bound_id, e);
        }
    }
}

/// Connection manager for one socket
pub struct Connection {
    ctx: Arc<ConnectionContext>,
}

impl Connection {
    pub fn new(
        role: Role,
        bound_id: impl Into<String>,
        store: Arc<dyn SessionStore>,
        sink: Arc<dyn SignalSink>,
    ) -> Self {
        let gate = AuthGate::new(Arc::clone(&store));
        Self {
            ctx: Arc::new(ConnectionContext {
                role,
                bound_id: bound_id.into(),
                store,
                gate,
                sink,
            }),
        }
    }

    pub fn context(&self) -> &ConnectionContext {
        &self.ctx
    }

    /// Run the read loop until the socket closes, then clean up
    pub async fn serve<S, E>(self, frames: S)
    where
        S: Stream<Item = Result<Frame, E>> + Send,
        E: Display,
    {
        info!("{:?} connected for {}", self.ctx.role, self.ctx.bound_id);
        let mut frames = std::pin::pin!(frames);

        while let Some(frame) = frames.next().await {
            match frame {
                Ok(Frame::Text(text)) => {
                    self.dispatch(text.into_bytes());
                }
                Ok(Frame::Binary(data)) => {
                    self.dispatch(data);
                }
                Ok(Frame::Close) => break,
                Err(e) => {
                    debug!("Read failed for {}: {}", self.ctx.bound_id, e);
                    break;
                }
            }
        }

        self.close().await;
    }

    /// Process one frame on its own task
    pub fn dispatch(&self, frame: Vec<u8>) -> JoinHandle<()> {
        let ctx = Arc::clone(&self.ctx);
        tokio::spawn(async move { ctx.handle_frame(frame).await })
    }

    /// Delete the bound record. Failures are logged, never surfaced.
    pub async fn close(&self) {
        let ctx = &self.ctx;
        let result = match ctx.role {
            Role::Host => ctx.store.delete_files_record(&ctx.bound_id).await,
            Role::Connector => ctx.store.delete_signaling_record(&ctx.bound_id).await,
        };
        match result {
            Ok(()) => info!("{:?} disconnected, {} removed", ctx.role, ctx.bound_id),
            Err(e) => warn!("Cleanup of {} failed: {}", ctx.bound_id, e),
        }
    }
}
