//! Wire envelope: JSON objects with a `type` discriminator.
//!
//! Inbound frames are classified into [`ClientMessage`]. Signaling frames keep
//! their raw text so they can be forwarded to the recipient unmodified.
//! Outbound frames are built from [`ServerMessage`] and serialized once per
//! fan-out.

use std::fmt;
use std::sync::Arc;

use serde::Serialize;
use serde_json::{Map, Value};
use thiserror::Error;

/// Why an inbound frame could not be classified.
#[derive(Debug, Error)]
pub enum ProtocolError {
    /// The frame is not valid JSON.
    #[error("invalid JSON: {0}")]
    InvalidJson(#[from] serde_json::Error),
    /// The frame is JSON but not an object.
    #[error("message is not a JSON object")]
    NotAnObject,
    /// The object has no string `type` field.
    #[error("message has no string `type` field")]
    MissingType,
    /// A field required by the message type is absent or has the wrong shape.
    #[error("`{kind}` message has an invalid `{field}` field")]
    InvalidField {
        /// Message type.
        kind: &'static str,
        /// Offending field.
        field: &'static str,
    },
}

/// Signaling message types relayed between two participants.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SignalKind {
    /// SDP offer.
    Offer,
    /// SDP answer.
    Answer,
    /// Trickled ICE candidate.
    IceCandidate,
}

impl SignalKind {
    /// Wire name of the type.
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Offer => "offer",
            Self::Answer => "answer",
            Self::IceCandidate => "ice-candidate",
        }
    }

    fn from_type(kind: &str) -> Option<Self> {
        match kind {
            "offer" => Some(Self::Offer),
            "answer" => Some(Self::Answer),
            "ice-candidate" => Some(Self::IceCandidate),
            _ => None,
        }
    }
}

impl fmt::Display for SignalKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A signaling frame. Only the routing fields are read; the payload is opaque.
#[derive(Clone, Debug)]
pub struct SignalMessage {
    /// Message type.
    pub kind: SignalKind,
    /// Sender handle, `None` when absent or empty.
    pub from: Option<String>,
    /// Recipient handle, `None` when absent or empty.
    pub to: Option<String>,
    /// The frame exactly as received.
    pub raw: Arc<String>,
}

/// A classified inbound frame.
#[derive(Clone, Debug)]
pub enum ClientMessage {
    /// Register the sending connection under `handle`.
    Join {
        /// The `gamertag` field.
        handle: String,
    },
    /// Explicit unregister.
    Leave,
    /// Targeted relay to another participant.
    Signal(SignalMessage),
    /// Keep-alive, no effect.
    Heartbeat,
    /// Ask for the current participant list.
    RequestParticipants,
    /// Well-formed envelope with a type this relay does not handle.
    Unknown(String),
}

impl ClientMessage {
    /// Classify a text frame.
    pub fn parse(text: &str) -> Result<Self, ProtocolError> {
        let value: Value = serde_json::from_str(text)?;
        let Value::Object(map) = value else {
            return Err(ProtocolError::NotAnObject);
        };
        let kind = map
            .get("type")
            .and_then(Value::as_str)
            .ok_or(ProtocolError::MissingType)?;

        if let Some(signal) = SignalKind::from_type(kind) {
            return Ok(Self::Signal(SignalMessage {
                kind: signal,
                from: routing_field(&map, "from"),
                to: routing_field(&map, "to"),
                raw: Arc::new(text.to_owned()),
            }));
        }

        match kind {
            "join" => {
                let handle = map
                    .get("gamertag")
                    .and_then(Value::as_str)
                    .ok_or(ProtocolError::InvalidField {
                        kind: "join",
                        field: "gamertag",
                    })?;
                Ok(Self::Join {
                    handle: handle.to_owned(),
                })
            }
            "leave" => Ok(Self::Leave),
            "heartbeat" => Ok(Self::Heartbeat),
            "request-participants" => Ok(Self::RequestParticipants),
            other => Ok(Self::Unknown(other.to_owned())),
        }
    }
}

fn routing_field(map: &Map<String, Value>, field: &str) -> Option<String> {
    map.get(field)
        .and_then(Value::as_str)
        .filter(|s| !s.is_empty())
        .map(str::to_owned)
}

/// Frames the relay originates.
#[derive(Clone, Debug, Serialize)]
#[serde(tag = "type", rename_all = "kebab-case")]
pub enum ServerMessage {
    /// Someone joined.
    Join {
        /// Handle of the new participant.
        gamertag: String,
    },
    /// Someone left or disconnected.
    Leave {
        /// Handle of the departed participant.
        gamertag: String,
    },
    /// Full current roster.
    ParticipantsList {
        /// Handles in join order.
        list: Vec<String>,
    },
    /// Latest external data snapshot.
    MinecraftUpdate {
        /// Opaque blob as pushed by the ingestion endpoint.
        data: Value,
    },
}

impl ServerMessage {
    /// Wire name of the type, for logs.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Join { .. } => "join",
            Self::Leave { .. } => "leave",
            Self::ParticipantsList { .. } => "participants-list",
            Self::MinecraftUpdate { .. } => "minecraft-update",
        }
    }

    /// Serialize for fan-out.
    pub fn encode(&self) -> Result<Arc<String>, serde_json::Error> {
        serde_json::to_string(self).map(Arc::new)
    }
}
