//! Per-message processing
//!
//! Mutating messages perform exactly one point update on the Signaling Record
//! the message addresses. Listen messages open a change feed and leave it
//! running on its own task.

use filedrop_core::{FieldMutation, MatchFilter, RecordId};

use crate::connection::ConnectionContext;
use crate::error::RelayError;
use crate::protocol::Inbound;
use crate::subscription::{self, RelayScope};

/// What a processed message did
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Outcome {
    Applied,
    SubscriptionStarted,
}

impl Inbound {
    pub async fn process(
        self,
        ctx: &ConnectionContext,
        session_id: &str,
    ) -> Result<Outcome, RelayError> {
        match self {
            Inbound::ListenOffersHost(listen) => {
                let files_id = ctx
                    .gate()
                    .authorize_listener(&listen.url, &listen.password_files)
                    .await?;
                subscribe(ctx, MatchFilter::FilesId(files_id), RelayScope::Host).await
            }
            Inbound::ListenOffersConn(_) => {
                let record_id = RecordId::parse(session_id)?;
                subscribe(ctx, MatchFilter::Record(record_id), RelayScope::Connector).await
            }
            Inbound::OfferIceCandidate(c) => {
                apply(ctx, session_id, FieldMutation::PushOfferIce(c.ice)).await
            }
            Inbound::AnswerIceCandidate(c) => {
                apply(ctx, session_id, FieldMutation::PushAnswerIce(c.ice)).await
            }
            Inbound::NewAnswer(d) => apply(ctx, session_id, FieldMutation::SetAnswer(d.sdp)).await,
            Inbound::NewOffer(d) => apply(ctx, session_id, FieldMutation::SetOffer(d.sdp)).await,
        }
    }
}

async fn apply(
    ctx: &ConnectionContext,
    session_id: &str,
    mutation: FieldMutation,
) -> Result<Outcome, RelayError> {
    ctx.store()
        .update_signaling_record(session_id, mutation)
        .await?;
    Ok(Outcome::Applied)
}

async fn subscribe(
    ctx: &ConnectionContext,
    filter: MatchFilter,
    scope: RelayScope,
) -> Result<Outcome, RelayError> {
    subscription::start(ctx.store(), ctx.sink(), filter, scope).await?;
    Ok(Outcome::SubscriptionStarted)
}
