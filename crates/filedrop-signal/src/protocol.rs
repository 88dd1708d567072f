//! Wire protocol for the signaling websocket
//!
//! Every frame is a JSON envelope:
//!
//! ```text
//! { "type": <u8 tag>, "signalingId"?: <string>, "data": <type-specific payload> }
//! ```
//!
//! Decoding is two-phase. The envelope is parsed first with the payload kept as a
//! raw JSON value; the payload is parsed only once the tag has resolved to a
//! concrete shape.

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::{json, Map, Value};

/// Message kind tags. The numbering is part of the wire format.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum MessageType {
    ListenOffersHost = 0,
    ListenOffersConn = 1,
    OfferIceCandidate = 2,
    AnswerIceCandidate = 3,
    NewAnswer = 4,
    NewOffer = 5,
    /// Outbound only
    Error = 6,
}

impl MessageType {
    pub fn from_tag(tag: i64) -> Option<Self> {
        match tag {
            0 => Some(MessageType::ListenOffersHost),
            1 => Some(MessageType::ListenOffersConn),
            2 => Some(MessageType::OfferIceCandidate),
            3 => Some(MessageType::AnswerIceCandidate),
            4 => Some(MessageType::NewAnswer),
            5 => Some(MessageType::NewOffer),
            6 => Some(MessageType::Error),
            _ => None,
        }
    }

    pub fn tag(self) -> i64 {
        self as u8 as i64
    }
}

/// Protocol decode/encode errors
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ProtocolError {
    #[error("error decoding message: {0}")]
    Envelope(String),
    #[error("error getting message kind: unknown message type {0}")]
    UnknownType(i64),
    #[error("error getting message kind: {0:?} is outbound only")]
    OutboundOnly(MessageType),
    #[error("error decoding message data: {0}")]
    Payload(String),
    #[error("error encoding message: {0}")]
    Encode(String),
}

/// Envelope as it travels over the socket
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Envelope {
    /// Raw tag; resolved by [`MessageType::from_tag`] in the second phase
    #[serde(rename = "type")]
    pub tag: i64,
    /// Set by a host to address one of the negotiations it relays for
    #[serde(rename = "signalingId", default, skip_serializing_if = "Option::is_none")]
    pub signaling_id: Option<String>,
    #[serde(default)]
    pub data: Value,
}

impl Envelope {
    /// First decoding phase
    pub fn decode(frame: &[u8]) -> Result<Self, ProtocolError> {
        serde_json::from_slice(frame).map_err(|e| ProtocolError::Envelope(e.to_string()))
    }

    pub fn to_text(&self) -> Result<String, ProtocolError> {
        serde_json::to_string(self).map_err(|e| ProtocolError::Encode(e.to_string()))
    }

    pub fn message_type(&self) -> Option<MessageType> {
        MessageType::from_tag(self.tag)
    }
}

// ============================================================================
// Payloads
// ============================================================================

/// Start relaying every negotiation against a Files Record to this host
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ListenOffersHost {
    /// Files Record id
    pub url: String,
    #[serde(rename = "passwordFiles")]
    pub password_files: String,
}

/// Start relaying the peer's answer and ICE candidates to this connector
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ListenOffersConn {}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IceCandidate {
    pub ice: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SessionDescription {
    pub sdp: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ErrorMessage {
    pub msg: String,
}

fn payload<T: DeserializeOwned>(data: Value) -> Result<T, ProtocolError> {
    serde_json::from_value(data).map_err(|e| ProtocolError::Payload(e.to_string()))
}

// ============================================================================
// Typed messages
// ============================================================================

/// Every message a peer may send. `Error` has no inbound variant.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Inbound {
    ListenOffersHost(ListenOffersHost),
    ListenOffersConn(ListenOffersConn),
    OfferIceCandidate(IceCandidate),
    AnswerIceCandidate(IceCandidate),
    NewAnswer(SessionDescription),
    NewOffer(SessionDescription),
}

impl Inbound {
    /// Second decoding phase: resolve the tag, then parse the payload for it
    pub fn decode(tag: i64, data: Value) -> Result<Self, ProtocolError> {
        let kind = MessageType::from_tag(tag).ok_or(ProtocolError::UnknownType(tag))?;
        match kind {
            MessageType::ListenOffersHost => payload(data).map(Inbound::ListenOffersHost),
            MessageType::ListenOffersConn => {
                // The payload is empty; a missing or null `data` is accepted
                let data = if data.is_null() {
                    Value::Object(Map::new())
                } else {
                    data
                };
                payload(data).map(Inbound::ListenOffersConn)
            }
            MessageType::OfferIceCandidate => payload(data).map(Inbound::OfferIceCandidate),
            MessageType::AnswerIceCandidate => payload(data).map(Inbound::AnswerIceCandidate),
            MessageType::NewAnswer => payload(data).map(Inbound::NewAnswer),
            MessageType::NewOffer => payload(data).map(Inbound::NewOffer),
            MessageType::Error => Err(ProtocolError::OutboundOnly(kind)),
        }
    }

    pub fn message_type(&self) -> MessageType {
        match self {
            Inbound::ListenOffersHost(_) => MessageType::ListenOffersHost,
            Inbound::ListenOffersConn(_) => MessageType::ListenOffersConn,
            Inbound::OfferIceCandidate(_) => MessageType::OfferIceCandidate,
            Inbound::AnswerIceCandidate(_) => MessageType::AnswerIceCandidate,
            Inbound::NewAnswer(_) => MessageType::NewAnswer,
            Inbound::NewOffer(_) => MessageType::NewOffer,
        }
    }
}

/// Every message the relay may send
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Outbound {
    OfferIceCandidate(IceCandidate),
    AnswerIceCandidate(IceCandidate),
    NewAnswer(SessionDescription),
    NewOffer(SessionDescription),
    Error(ErrorMessage),
}

impl Outbound {
    pub fn error(msg: impl Into<String>) -> Self {
        Outbound::Error(ErrorMessage { msg: msg.into() })
    }

    pub fn message_type(&self) -> MessageType {
        match self {
            Outbound::OfferIceCandidate(_) => MessageType::OfferIceCandidate,
            Outbound::AnswerIceCandidate(_) => MessageType::AnswerIceCandidate,
            Outbound::NewAnswer(_) => MessageType::NewAnswer,
            Outbound::NewOffer(_) => MessageType::NewOffer,
            Outbound::Error(_) => MessageType::Error,
        }
    }

    pub fn into_envelope(self, signaling_id: Option<String>) -> Envelope {
        let tag = self.message_type().tag();
        let data = match self {
            Outbound::OfferIceCandidate(c) | Outbound::AnswerIceCandidate(c) => {
                json!({ "ice": c.ice })
            }
            Outbound::NewAnswer(d) | Outbound::NewOffer(d) => json!({ "sdp": d.sdp }),
            Outbound::Error(e) => json!({ "msg": e.msg }),
        };
        Envelope {
            tag,
            signaling_id,
            data,
        }
    }
}
