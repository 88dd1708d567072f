//! filedrop-core - records and the session store behind the signaling relay
//!
//! Two record kinds live in a [`SessionStore`]:
//!
//! - **Files Record**: created by the owner, gated by two secrets, lists the
//!   shared file descriptors and expires after a TTL.
//! - **Signaling Record**: one offer/answer negotiation against a Files Record,
//!   with the current SDPs and two append-only ICE candidate lists.
//!
//! The store also exposes a change feed of field-level update events, which the
//! relay turns into protocol messages. [`MemorySessionStore`] is the in-process
//! implementation used by the daemon and the tests.

pub mod memory;
pub mod store;
pub mod types;

pub use memory::{MemorySessionStore, DEFAULT_FEED_CAPACITY};
pub use store::{ChangeEvent, ChangeFeed, FieldDiff, MatchFilter, SessionStore, StoreError};
pub use types::{
    FieldMutation, FileEntry, FilesRecord, RecordId, SignalingRecord, RECORD_ID_HEX_LEN,
};
