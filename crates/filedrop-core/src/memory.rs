//! In-process session store with per-subscription change feeds

use async_trait::async_trait;
use serde_json::Value;
use std::collections::HashMap;
use std::sync::{Arc, RwLock, RwLockReadGuard, RwLockWriteGuard};
use std::time::{Duration, SystemTime};
use tokio::sync::mpsc::{self, error::TrySendError};
use tracing::{debug, warn};

use crate::store::{ChangeEvent, ChangeFeed, FieldDiff, MatchFilter, SessionStore, StoreError};
use crate::types::{FieldMutation, FileEntry, FilesRecord, RecordId, SignalingRecord};

/// Default number of buffered matching events per subscriber
pub const DEFAULT_FEED_CAPACITY: usize = 1024;

/// One open change feed. Only events passing `filter` are queued on `tx`.
#[derive(Debug)]
struct Subscriber {
    filter: MatchFilter,
    tx: mpsc::Sender<ChangeEvent>,
}

#[derive(Debug, Default)]
struct MemorySessionStoreInner {
    files: HashMap<RecordId, FilesRecord>,
    signaling: HashMap<RecordId, SignalingRecord>,
    subscribers: Vec<Subscriber>,
}

impl MemorySessionStoreInner {
    /// Queue an update on every matching feed and forget feeds whose reader is gone
    fn publish(&mut self, record_id: &RecordId, files_id: &RecordId, updated_fields: FieldDiff) {
        self.subscribers.retain(|sub| {
            if !sub.filter.matches(record_id, files_id) {
                return !sub.tx.is_closed();
            }
            let event = ChangeEvent {
                record_id: record_id.clone(),
                updated_fields: updated_fields.clone(),
            };
            match sub.tx.try_send(event) {
                Ok(()) => true,
                Err(TrySendError::Full(_)) => {
                    warn!("Change feed for {:?} is full, update to {} dropped", sub.filter, record_id);
                    true
                }
                Err(TrySendError::Closed(_)) => false,
            }
        });
    }

    /// Remove a Files Record together with the Signaling Records opened against it
    fn remove_files_record(&mut self, id: &RecordId) -> bool {
        let removed = self.files.remove(id).is_some();
        self.signaling.retain(|_, record| &record.files_id != id);
        removed
    }
}

/// In-memory [`SessionStore`]
///
/// Updates are queued while the write lock is held, so every subscriber sees the
/// updates of one record in the order they were applied. Each feed buffers only
/// the events its filter admits; traffic on other records never displaces them.
#[derive(Debug, Clone)]
pub struct MemorySessionStore {
    inner: Arc<RwLock<MemorySessionStoreInner>>,
    feed_capacity: usize,
}

impl Default for MemorySessionStore {
    fn default() -> Self {
        Self::new()
    }
}

impl MemorySessionStore {
    pub fn new() -> Self {
        Self::with_feed_capacity(DEFAULT_FEED_CAPACITY)
    }

    /// Create a store whose subscribers buffer up to `capacity` matching events
    /// before further ones are dropped
    pub fn with_feed_capacity(capacity: usize) -> Self {
        Self {
            inner: Arc::new(RwLock::new(MemorySessionStoreInner::default())),
            feed_capacity: capacity.max(1),
        }
    }

    /// Number of live Files Records
    pub fn files_count(&self) -> usize {
        self.read().map(|inner| inner.files.len()).unwrap_or(0)
    }

    /// Number of live Signaling Records
    pub fn signaling_count(&self) -> usize {
        self.read().map(|inner| inner.signaling.len()).unwrap_or(0)
    }

    /// Number of change feeds whose reader is still alive
    pub fn subscriber_count(&self) -> usize {
        self.read()
            .map(|inner| inner.subscribers.iter().filter(|sub| !sub.tx.is_closed()).count())
            .unwrap_or(0)
    }

    fn read(&self) -> Result<RwLockReadGuard<'_, MemorySessionStoreInner>, StoreError> {
        self.inner
            .read()
            .map_err(|_| StoreError::Other("lock poisoned".into()))
    }

    fn write(&self) -> Result<RwLockWriteGuard<'_, MemorySessionStoreInner>, StoreError> {
        self.inner
            .write()
            .map_err(|_| StoreError::Other("lock poisoned".into()))
    }

    fn files_secret_matches(&self, id: &str, secret: &str, user: bool) -> bool {
        let Ok(id) = RecordId::parse(id) else {
            return false;
        };
        let Ok(inner) = self.read() else {
            return false;
        };
        let now = SystemTime::now();
        inner.files.get(&id).is_some_and(|record| {
            if record.is_expired(now) {
                return false;
            }
            let expected = if user {
                &record.password_user
            } else {
                &record.password_files
            };
            expected == secret
        })
    }
}

/// Apply a mutation and describe it the way a document database reports updated fields.
///
/// Appending onto an empty list reports the whole post-image array under the bare
/// field name; appending onto a non-empty list reports the index-qualified path.
fn apply_mutation(record: &mut SignalingRecord, mutation: FieldMutation) -> FieldDiff {
    fn push(list: &mut Vec<String>, field: &str, value: String) -> FieldDiff {
        let mut diff = FieldDiff::new();
        list.push(value.clone());
        if list.len() == 1 {
            diff.insert(field.to_string(), Value::Array(vec![Value::String(value)]));
        } else {
            diff.insert(format!("{}.{}", field, list.len() - 1), Value::String(value));
        }
        diff
    }

    match mutation {
        FieldMutation::SetOffer(sdp) => {
            record.offer = Some(sdp.clone());
            FieldDiff::from_iter([("offer".to_string(), Value::String(sdp))])
        }
        FieldMutation::SetAnswer(sdp) => {
            record.answer = Some(sdp.clone());
            FieldDiff::from_iter([("answer".to_string(), Value::String(sdp))])
        }
        FieldMutation::PushOfferIce(ice) => push(&mut record.offer_ice, "offerIce", ice),
        FieldMutation::PushAnswerIce(ice) => push(&mut record.answer_ice, "answerIce", ice),
    }
}

#[async_trait]
impl SessionStore for MemorySessionStore {
    async fn create_files_record(
        &self,
        password_user: String,
        password_files: String,
        files: Vec<FileEntry>,
        ttl: Duration,
    ) -> Result<RecordId, StoreError> {
        let expire_at = SystemTime::now()
            .checked_add(ttl)
            .ok_or_else(|| StoreError::Other(format!("ttl of {:?} is out of range", ttl)))?;
        let id = RecordId::generate();
        let record = FilesRecord {
            id: id.clone(),
            password_user,
            password_files,
            files,
            expire_at,
        };
        self.write()?.files.insert(id.clone(), record);
        debug!("Files record {} created", id);
        Ok(id)
    }

    async fn files(&self, id: &str) -> Result<Vec<FileEntry>, StoreError> {
        let id = RecordId::parse(id)?;
        let inner = self.read()?;
        inner
            .files
            .get(&id)
            .map(|record| record.files.clone())
            .ok_or(StoreError::NotFound)
    }

    async fn add_files(
        &self,
        id: &str,
        password_files: &str,
        files: Vec<FileEntry>,
    ) -> Result<(), StoreError> {
        let id = RecordId::parse(id)?;
        let mut inner = self.write()?;
        match inner.files.get_mut(&id) {
            Some(record) if record.password_files == password_files => {
                record.files.extend(files);
                Ok(())
            }
            _ => Err(StoreError::NotFound),
        }
    }

    async fn remove_files(
        &self,
        id: &str,
        password_files: &str,
        names: &[String],
    ) -> Result<(), StoreError> {
        let id = RecordId::parse(id)?;
        let mut inner = self.write()?;
        match inner.files.get_mut(&id) {
            Some(record) if record.password_files == password_files => {
                record.files.retain(|f| !names.contains(&f.name));
                Ok(())
            }
            _ => Err(StoreError::NotFound),
        }
    }

    async fn check_files_secret(&self, id: &str, secret: &str) -> bool {
        self.files_secret_matches(id, secret, false)
    }

    async fn check_user_secret(&self, id: &str, secret: &str) -> bool {
        self.files_secret_matches(id, secret, true)
    }

    async fn delete_files_record(&self, id: &str) -> Result<(), StoreError> {
        let id = RecordId::parse(id)?;
        if self.write()?.remove_files_record(&id) {
            debug!("Files record {} deleted", id);
        }
        Ok(())
    }

    async fn purge_expired(&self, now: SystemTime) -> Result<usize, StoreError> {
        let mut inner = self.write()?;
        let expired: Vec<RecordId> = inner
            .files
            .values()
            .filter(|record| record.is_expired(now))
            .map(|record| record.id.clone())
            .collect();
        for id in &expired {
            inner.remove_files_record(id);
        }
        Ok(expired.len())
    }

    async fn create_signaling_record(&self, files_id: &str) -> Result<RecordId, StoreError> {
        let files_id = RecordId::parse(files_id)?;
        let mut inner = self.write()?;
        if !inner.files.contains_key(&files_id) {
            return Err(StoreError::NotFound);
        }
        let id = RecordId::generate();
        inner
            .signaling
            .insert(id.clone(), SignalingRecord::new(id.clone(), files_id));
        debug!("Signaling record {} created", id);
        Ok(id)
    }

    async fn delete_signaling_record(&self, id: &str) -> Result<(), StoreError> {
        let id = RecordId::parse(id)?;
        if self.write()?.signaling.remove(&id).is_some() {
            debug!("Signaling record {} deleted", id);
        }
        Ok(())
    }

    async fn update_signaling_record(
        &self,
        id: &str,
        mutation: FieldMutation,
    ) -> Result<(), StoreError> {
        let id = RecordId::parse(id)?;
        let mut inner = self.write()?;
        let record = inner.signaling.get_mut(&id).ok_or(StoreError::NotFound)?;
        let updated_fields = apply_mutation(record, mutation);
        let (record_id, files_id) = (record.id.clone(), record.files_id.clone());

        inner.publish(&record_id, &files_id, updated_fields);
        Ok(())
    }

    async fn signaling_record(&self, id: &str) -> Result<Option<SignalingRecord>, StoreError> {
        let id = RecordId::parse(id)?;
        Ok(self.read()?.signaling.get(&id).cloned())
    }

    async fn subscribe_signaling_updates(
        &self,
        filter: MatchFilter,
    ) -> Result<ChangeFeed, StoreError> {
        let (tx, rx) = mpsc::channel(self.feed_capacity);
        {
            let mut inner = self.write()?;
            inner.subscribers.retain(|sub| !sub.tx.is_closed());
            inner.subscribers.push(Subscriber {
                filter: filter.clone(),
                tx,
            });
        }
        debug!("Change feed opened for {:?}", filter);

        // Dropping the feed drops `rx`, which unregisters it on the next publish
        let stream = futures::stream::unfold(rx, |mut rx| async move {
            let event = rx.recv().await?;
            Some((event, rx))
        });

        Ok(ChangeFeed::new(stream))
    }
}
