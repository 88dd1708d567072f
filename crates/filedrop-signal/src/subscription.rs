//! Change-feed relays started by the listen messages

use filedrop_core::{ChangeFeed, MatchFilter, RecordId, SessionStore};
use futures::StreamExt;
use std::sync::Arc;
use tokio::task::JoinHandle;
use tracing::{debug, warn};

use crate::diff::translate_update;
use crate::error::RelayError;
use crate::protocol::Outbound;
use crate::sink::{send_envelope, SignalSink};

/// Who a relay forwards to
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RelayScope {
    /// Every negotiation against one Files Record; events carry their Signaling Record id
    Host,
    /// One negotiation; the connector's own offer and offer candidates are not echoed
    Connector,
}

impl RelayScope {
    pub fn admits(self, message: &Outbound) -> bool {
        match self {
            RelayScope::Host => true,
            RelayScope::Connector => !matches!(
                message,
                Outbound::NewOffer(_) | Outbound::OfferIceCandidate(_)
            ),
        }
    }

    fn signaling_id(self, record_id: &RecordId) -> Option<String> {
        match self {
            RelayScope::Host => Some(record_id.to_string()),
            RelayScope::Connector => None,
        }
    }
}

/// Open a feed for `filter` and relay it on its own task.
///
/// Returns once the feed is open, so updates applied after this call are observed.
pub async fn start(
    store: &dyn SessionStore,
    sink: Arc<dyn SignalSink>,
    filter: MatchFilter,
    scope: RelayScope,
) -> Result<JoinHandle<()>, RelayError> {
    let feed = store.subscribe_signaling_updates(filter.clone()).await?;
    debug!("Relaying {:?} as {:?}", filter, scope);
    Ok(tokio::spawn(relay(feed, sink, scope)))
}

/// Forward translated events until the socket goes away or the feed ends.
/// A failed send also stops the relay; it is never retried.
pub async fn relay(mut feed: ChangeFeed, sink: Arc<dyn SignalSink>, scope: RelayScope) {
    loop {
        let event = tokio::select! {
            event = feed.next() => event,
            _ = sink.closed() => {
                debug!("Socket closed, {:?} relay done", scope);
                return;
            }
        };
        let Some(event) = event else {
            break;
        };
        for message in translate_update(&event.updated_fields) {
            if !scope.admits(&message) {
                continue;
            }
            let envelope = message.into_envelope(scope.signaling_id(&event.record_id));
            if let Err(e) = send_envelope(sink.as_ref(), &envelope).await {
                warn!("Stopping {:?} relay: {}", scope, e);
                return;
            }
        }
    }
    debug!("Change feed ended, {:?} relay done", scope);
}
