//! Record types shared by the store and the signaling relay

use serde::{Deserialize, Serialize};
use std::fmt;
use std::time::SystemTime;

use crate::store::StoreError;

/// Length of a record id in hex characters (12 random bytes)
pub const RECORD_ID_HEX_LEN: usize = 24;

/// Opaque record identity
///
/// Rendered as 24 lowercase hex characters. Knowing a Signaling Record id is
/// the capability that lets a connector take part in a negotiation, so ids are
/// drawn from the thread RNG rather than a counter.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RecordId(String);

impl RecordId {
    /// Generate a fresh random id
    pub fn generate() -> Self {
        let bytes: [u8; RECORD_ID_HEX_LEN / 2] = rand::random();
        Self(hex::encode(bytes))
    }

    /// Parse a caller-supplied id, rejecting anything that is not 24 hex digits
    pub fn parse(s: &str) -> Result<Self, StoreError> {
        if s.len() != RECORD_ID_HEX_LEN || !s.bytes().all(|b| b.is_ascii_hexdigit()) {
            return Err(StoreError::InvalidId(s.to_string()));
        }
        Ok(Self(s.to_ascii_lowercase()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for RecordId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl std::str::FromStr for RecordId {
    type Err = StoreError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

/// Descriptor of one shared file
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FileEntry {
    pub name: String,
    pub length: u64,
    /// Milliseconds since the unix epoch, as reported by the browser
    pub last_modified: u64,
}

/// Owner-created, password-gated list of shared files
#[derive(Debug, Clone)]
pub struct FilesRecord {
    pub id: RecordId,
    /// Secret a connector must present to open a negotiation
    pub password_user: String,
    /// Generated secret handed back to the owner; gates listening and file edits
    pub password_files: String,
    pub files: Vec<FileEntry>,
    pub expire_at: SystemTime,
}

impl FilesRecord {
    pub fn is_expired(&self, now: SystemTime) -> bool {
        self.expire_at <= now
    }
}

/// One in-progress offer/answer negotiation against a Files Record
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SignalingRecord {
    pub id: RecordId,
    pub files_id: RecordId,
    pub offer: Option<String>,
    pub answer: Option<String>,
    /// ICE candidates pushed by the host, in append order
    pub offer_ice: Vec<String>,
    /// ICE candidates pushed by the connector, in append order
    pub answer_ice: Vec<String>,
}

impl SignalingRecord {
    pub fn new(id: RecordId, files_id: RecordId) -> Self {
        Self {
            id,
            files_id,
            offer: None,
            answer: None,
            offer_ice: Vec::new(),
            answer_ice: Vec::new(),
        }
    }
}

/// Single-field update applied to a Signaling Record
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FieldMutation {
    SetOffer(String),
    SetAnswer(String),
    PushOfferIce(String),
    PushAnswerIce(String),
}
