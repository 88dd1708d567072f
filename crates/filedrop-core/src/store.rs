//! Session store interface
//!
//! The signaling relay never touches records directly. Everything goes through
//! [`SessionStore`]: point reads, point mutations and a change feed of update
//! events for Signaling Records.

use async_trait::async_trait;
use futures::stream::{BoxStream, Stream, StreamExt};
use serde_json::{Map, Value};
use std::pin::Pin;
use std::task::{Context, Poll};
use std::time::{Duration, SystemTime};

use crate::types::{FieldMutation, FileEntry, RecordId, SignalingRecord};

/// Field path -> post-image value for a single update operation.
///
/// Paths are dotted: `offer`, `answer`, `offerIce.3`. An append onto an absent or
/// empty ICE list may instead surface as the whole array under the bare field name.
pub type FieldDiff = Map<String, Value>;

/// Store error type
#[derive(Debug, Clone, thiserror::Error)]
pub enum StoreError {
    #[error("invalid record id: {0:?}")]
    InvalidId(String),
    #[error("record not found")]
    NotFound,
    #[error("store closed")]
    Closed,
    #[error("store error: {0}")]
    Other(String),
}

/// Which Signaling Records a change feed observes
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MatchFilter {
    /// Exactly one record
    Record(RecordId),
    /// Every record referencing the given Files Record
    FilesId(RecordId),
}

impl MatchFilter {
    pub fn matches(&self, record_id: &RecordId, files_id: &RecordId) -> bool {
        match self {
            MatchFilter::Record(id) => id == record_id,
            MatchFilter::FilesId(id) => id == files_id,
        }
    }
}

/// One update observed on the change feed
#[derive(Debug, Clone, PartialEq)]
pub struct ChangeEvent {
    pub record_id: RecordId,
    pub updated_fields: FieldDiff,
}

/// Lazy, unbounded sequence of [`ChangeEvent`]s for one subscription.
///
/// Every call to [`SessionStore::subscribe_signaling_updates`] yields an
/// independent feed; dropping it ends the subscription.
pub struct ChangeFeed {
    inner: BoxStream<'static, ChangeEvent>,
}

impl ChangeFeed {
    pub fn new<S>(stream: S) -> Self
    where
        S: Stream<Item = ChangeEvent> + Send + 'static,
    {
        Self {
            inner: stream.boxed(),
        }
    }
}

impl Stream for ChangeFeed {
    type Item = ChangeEvent;

    fn poll_next(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        self.inner.poll_next_unpin(cx)
    }
}

impl std::fmt::Debug for ChangeFeed {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ChangeFeed").finish_non_exhaustive()
    }
}

/// Persistent home of Files Records and Signaling Records
#[async_trait]
pub trait SessionStore: Send + Sync {
    // ========================================================================
    // Files Records
    // ========================================================================

    /// Create a Files Record that expires after `ttl`
    async fn create_files_record(
        &self,
        password_user: String,
        password_files: String,
        files: Vec<FileEntry>,
        ttl: Duration,
    ) -> Result<RecordId, StoreError>;

    /// File descriptors of a Files Record
    async fn files(&self, id: &str) -> Result<Vec<FileEntry>, StoreError>;

    /// Append file descriptors. A wrong secret reads as `NotFound`.
    async fn add_files(
        &self,
        id: &str,
        password_files: &str,
        files: Vec<FileEntry>,
    ) -> Result<(), StoreError>;

    /// Remove file descriptors by name. A wrong secret reads as `NotFound`.
    async fn remove_files(
        &self,
        id: &str,
        password_files: &str,
        names: &[String],
    ) -> Result<(), StoreError>;

    /// True iff the record exists and its files-access secret matches
    async fn check_files_secret(&self, id: &str, secret: &str) -> bool;

    /// True iff the record exists and its user secret matches
    async fn check_user_secret(&self, id: &str, secret: &str) -> bool;

    /// Delete a Files Record. Deleting a missing record is not an error.
    async fn delete_files_record(&self, id: &str) -> Result<(), StoreError>;

    /// Remove Files Records whose expiry has passed, returning how many went
    async fn purge_expired(&self, now: SystemTime) -> Result<usize, StoreError>;

    // ========================================================================
    // Signaling Records
    // ========================================================================

    /// Open a new negotiation against an existing Files Record
    async fn create_signaling_record(&self, files_id: &str) -> Result<RecordId, StoreError>;

    /// Delete a Signaling Record. Deleting a missing record is not an error.
    async fn delete_signaling_record(&self, id: &str) -> Result<(), StoreError>;

    /// Apply exactly one field mutation
    async fn update_signaling_record(
        &self,
        id: &str,
        mutation: FieldMutation,
    ) -> Result<(), StoreError>;

    /// Current state of a Signaling Record
    async fn signaling_record(&self, id: &str) -> Result<Option<SignalingRecord>, StoreError>;

    /// Subscribe to update events on the Signaling Records matching `filter`
    async fn subscribe_signaling_updates(
        &self,
        filter: MatchFilter,
    ) -> Result<ChangeFeed, StoreError>;
}
