//! Wire protocol: the envelope exchanged between nodes.
//!
//! Every datagram, multicast or unicast, carries one JSON-serialized
//! [`Envelope`]. The `payload` field is opaque to this module; it is parsed
//! only by the announce path ([`AnnouncePayload`]) and by user handlers.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::{DiscoveryError, DiscoveryResult};

/// Read buffer size, and therefore the ceiling for an encoded envelope.
/// Oversized envelopes are rejected at encode time rather than truncated on
/// the receiving side.
pub const MAX_DATAGRAM_LEN: usize = 2048;

/// Command name carried by presence announcements.
pub const ANNOUNCE_COMMAND: &str = "announce";

/// The three message intents.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Intent {
    /// Multicast presence broadcast.
    Announce,
    /// Unicast request or command aimed at one destination.
    Directed,
    /// Unicast reply carrying the task id of a pending request.
    Response,
}

impl Intent {
    /// Wire representation of the intent.
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Announce => "announce",
            Self::Directed => "directed",
            Self::Response => "response",
        }
    }
}

impl fmt::Display for Intent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Intent {
    type Err = DiscoveryError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "announce" => Ok(Self::Announce),
            "directed" => Ok(Self::Directed),
            "response" => Ok(Self::Response),
            other => Err(DiscoveryError::UnknownIntent {
                intent: other.to_string(),
            }),
        }
    }
}

/// The unit of wire communication.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Envelope {
    /// Identifier of the sending node. Stamped by the discovery instance on
    /// the way out; receive loops drop datagrams whose `from_id` equals the
    /// local id.
    #[serde(default)]
    pub from_id: String,

    /// Message intent.
    pub intent: Intent,

    /// Unicast target (`host:port`). Required unless intent is `announce`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub destination: Option<String>,

    /// Operation name, e.g. `"ping"`, `"exec"`, or [`ANNOUNCE_COMMAND`].
    pub command: String,

    /// Correlation identifier: requester-generated, echoed back verbatim in
    /// the matching response. Unique per outstanding request.
    #[serde(default)]
    pub task_id: String,

    /// Opaque, command-specific data.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub payload: Option<serde_json::Value>,
}

impl Envelope {
    /// Build a presence announcement from the local node's identity.
    /// Each announcement gets a fresh task id.
    #[must_use]
    pub fn announce(local: &AnnouncePayload) -> Self {
        Self {
            from_id: local.id.clone(),
            intent: Intent::Announce,
            destination: None,
            command: ANNOUNCE_COMMAND.to_string(),
            task_id: Uuid::new_v4().to_string(),
            payload: Some(local.to_value()),
        }
    }

    /// Build a directed envelope with an empty task id; `request_response`
    /// assigns one before sending.
    #[must_use]
    pub fn directed(
        destination: impl Into<String>,
        command: impl Into<String>,
        payload: Option<serde_json::Value>,
    ) -> Self {
        Self {
            from_id: String::new(),
            intent: Intent::Directed,
            destination: Some(destination.into()),
            command: command.into(),
            task_id: String::new(),
            payload,
        }
    }

    /// Build the response to a received request, echoing its task id.
    /// `destination` is normally the request datagram's source address.
    #[must_use]
    pub fn reply(
        request: &Envelope,
        destination: impl Into<String>,
        command: impl Into<String>,
        payload: Option<serde_json::Value>,
    ) -> Self {
        Self {
            from_id: String::new(),
            intent: Intent::Response,
            destination: Some(destination.into()),
            command: command.into(),
            task_id: request.task_id.clone(),
            payload,
        }
    }

    /// Serialize for the wire, enforcing the datagram ceiling.
    pub fn encode(&self) -> DiscoveryResult<Vec<u8>> {
        let data = serde_json::to_vec(self)?;
        if data.len() > MAX_DATAGRAM_LEN {
            return Err(DiscoveryError::EnvelopeTooLarge {
                size: data.len(),
                max: MAX_DATAGRAM_LEN,
            });
        }
        Ok(data)
    }

    /// Deserialize a received datagram. Malformed input yields
    /// [`DiscoveryError::EnvelopeDecode`]; it never panics, so receive loops
    /// can log and discard bad datagrams.
    pub fn decode(data: &[u8]) -> DiscoveryResult<Self> {
        Ok(serde_json::from_slice(data)?)
    }
}

/// Typed body of an announce envelope.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AnnouncePayload {
    /// Announcing node's id.
    pub id: String,
    /// Human-readable node name.
    pub name: String,
    /// IPv4 address the node is reachable on.
    pub ip: String,
    /// Unicast port for directed envelopes.
    pub port: u16,
    /// Software version string.
    pub version: String,
}

impl AnnouncePayload {
    /// Parse the payload of an announce envelope.
    pub fn from_envelope(envelope: &Envelope) -> DiscoveryResult<Self> {
        let payload = envelope.payload.clone().unwrap_or(serde_json::Value::Null);
        Ok(serde_json::from_value(payload)?)
    }

    /// The payload as an opaque JSON value for embedding in an envelope.
    #[must_use]
    pub fn to_value(&self) -> serde_json::Value {
        serde_json::to_value(self).unwrap_or(serde_json::Value::Null)
    }

    /// `ip:port` string usable as an envelope destination.
    #[must_use]
    pub fn addr(&self) -> String {
        format!("{}:{}", self.ip, self.port)
    }
}
