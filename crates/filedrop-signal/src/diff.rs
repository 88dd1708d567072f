//! Change-feed diff translation
//!
//! A store update names the fields it changed and their post-image values. SDP
//! fields are *set*, so they arrive as `offer` / `answer`. ICE lists are *pushed*,
//! so they arrive either as an index-qualified path (`offerIce.3`) or, for the
//! first element of a list, as the whole array under the bare name (`offerIce`).
//!
//! [`normalize`] folds the array form into `<field>.0` holding element 0, after
//! which [`translate`] maps each path onto one typed outbound message.

use serde_json::Value;
use tracing::debug;

use crate::protocol::{IceCandidate, Outbound, SessionDescription};
use filedrop_core::FieldDiff;

pub const OFFER_FIELD: &str = "offer";
pub const ANSWER_FIELD: &str = "answer";
pub const OFFER_ICE_PREFIX: &str = "offerIce.";
pub const ANSWER_ICE_PREFIX: &str = "answerIce.";

/// Rewrite array-valued fields as `<field>.0` holding the array's first element.
///
/// Empty arrays carry no element and are dropped. Scalar fields pass through.
pub fn normalize(diff: &FieldDiff) -> FieldDiff {
    let mut normalized = FieldDiff::new();
    for (path, value) in diff {
        match value {
            Value::Array(items) => {
                if let Some(first) = items.first() {
                    normalized.insert(format!("{}.0", path), first.clone());
                }
            }
            other => {
                normalized.insert(path.clone(), other.clone());
            }
        }
    }
    normalized
}

/// Map a normalized diff onto outbound messages, in the diff's iteration order.
///
/// Unknown paths are ignored, as are known paths whose value is not a string.
pub fn translate(diff: &FieldDiff) -> Vec<Outbound> {
    let mut messages = Vec::new();
    for (path, value) in diff {
        let Some(text) = value.as_str() else {
            debug!("Skipping non-string value at {}", path);
            continue;
        };
        let text = text.to_string();

        if path == OFFER_FIELD {
            messages.push(Outbound::NewOffer(SessionDescription { sdp: text }));
        } else if path == ANSWER_FIELD {
            messages.push(Outbound::NewAnswer(SessionDescription { sdp: text }));
        } else if path.starts_with(OFFER_ICE_PREFIX) {
            messages.push(Outbound::OfferIceCandidate(IceCandidate { ice: text }));
        } else if path.starts_with(ANSWER_ICE_PREFIX) {
            messages.push(Outbound::AnswerIceCandidate(IceCandidate { ice: text }));
        }
    }
    messages
}

/// Normalize then translate a raw change-feed diff
pub fn translate_update(raw: &FieldDiff) -> Vec<Outbound> {
    translate(&normalize(raw))
}
