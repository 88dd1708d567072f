//! Shared-secret checks against a Files Record

use filedrop_core::{RecordId, SessionStore};
use std::sync::Arc;
use tracing::debug;

use crate::error::RelayError;

/// Validates caller-supplied secrets before a listener or a negotiation is allowed.
///
/// A single point lookup matches id and secret together, so a rejection does not
/// tell the caller whether the id exists.
#[derive(Clone)]
pub struct AuthGate {
    store: Arc<dyn SessionStore>,
}

impl AuthGate {
    pub fn new(store: Arc<dyn SessionStore>) -> Self {
        Self { store }
    }

    /// Check the files-access secret; required before a host may listen for offers
    pub async fn authorize_listener(
        &self,
        files_id: &str,
        password_files: &str,
    ) -> Result<RecordId, RelayError> {
        if !self.store.check_files_secret(files_id, password_files).await {
            debug!("Rejected listener for files record {:?}", files_id);
            return Err(RelayError::Unauthorized);
        }
        Ok(RecordId::parse(files_id)?)
    }

    /// Check the user secret; required before a connector may open a negotiation
    pub async fn authorize_connector(
        &self,
        files_id: &str,
        password_user: &str,
    ) -> Result<RecordId, RelayError> {
        if !self.store.check_user_secret(files_id, password_user).await {
            debug!("Rejected connector for files record {:?}", files_id);
            return Err(RelayError::Unauthorized);
        }
        Ok(RecordId::parse(files_id)?)
    }
}
