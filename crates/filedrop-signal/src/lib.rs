//! Signaling relay for filedrop
//!
//! Brokers WebRTC offer/answer/ICE exchange between a host and a connector
//! through a shared Signaling Record.
//!
//! # Overview
//!
//! - **Protocol**: JSON envelopes with a small integer type tag, decoded in two
//!   phases into the closed [`Inbound`] message set
//! - **Processing**: each inbound message either mutates the Signaling Record it
//!   addresses or starts a change-feed relay back to the socket
//! - **Diff translation**: store update diffs become typed outbound events
//! - **Connection manager**: one read loop per socket, one task per frame,
//!   bound-record cleanup on disconnect
//!
//! # Example
//!
//! ```rust,no_run
//! use filedrop_core::MemorySessionStore;
//! use filedrop_signal::mock::ChannelSink;
//! use filedrop_signal::{Connection, Frame, Role};
//! use std::sync::Arc;
//!
//! # async fn run(bound_id: String) {
//! let store = Arc::new(MemorySessionStore::new());
//! let (sink, _outbound) = ChannelSink::new();
//! let (tx, frames) = futures::channel::mpsc::unbounded::<Result<Frame, std::io::Error>>();
//!
//! tx.unbounded_send(Ok(Frame::Text(r#"{"type":1,"data":{}}"#.into()))).unwrap();
//! Connection::new(Role::Connector, bound_id, store, sink).serve(frames).await;
//! # }
//! ```

pub mod auth;
pub mod connection;
pub mod diff;
pub mod error;
pub mod mock;
pub mod processor;
pub mod protocol;
pub mod sink;
pub mod subscription;

pub use auth::AuthGate;
pub use connection::{Connection, ConnectionContext, Frame, Role};
pub use diff::{normalize, translate, translate_update};
pub use error::RelayError;
pub use processor::Outcome;
pub use protocol::{
    Envelope, ErrorMessage, IceCandidate, Inbound, ListenOffersConn, ListenOffersHost,
    MessageType, Outbound, ProtocolError, SessionDescription,
};
pub use sink::{send_envelope, DeliveryError, SignalSink};
pub use subscription::RelayScope;
