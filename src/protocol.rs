//! Binary wire protocol for room synchronization.
//!
//! Every frame exchanged through a rendezvous is a bincode-encoded
//! [`WireMessage`]:
//!
//! ```text
//! ┌──────────┬───────────┬──────────┬──────────┬──────────┐
//! │ msg_type │ peer_id   │ doc_id   │ clock    │ payload  │
//! │ 1 byte   │ 16 bytes  │ 16 bytes │ 8 bytes  │ variable │
//! └──────────┴───────────┴──────────┴──────────┴──────────┘
//! ```
//!
//! The payload distinguishes the two message classes the session layer
//! cares about — document operations and presence updates — plus the
//! handshake and sync frames that bracket them.

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::document::{TextOp, VersionVector};
use crate::presence::PresenceRecord;

/// Message types for the room protocol.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[repr(u8)]
pub enum MessageType {
    /// Peer announcement: presence record + room-key fingerprint
    Hello = 1,
    /// Version vector asking for everything the sender has not seen
    SyncRequest = 2,
    /// Operation batch answering a SyncRequest
    SyncReply = 3,
    /// Incremental document operation batch
    Ops = 4,
    /// Whole-record presence update
    Presence = 5,
    /// Clean departure notification
    Bye = 6,
    /// Heartbeat ping
    Ping = 7,
    /// Heartbeat pong
    Pong = 8,
}

/// Hello payload: who the peer is, and proof it derived the same room key.
///
/// The fingerprint is a SHA-256 digest of the room id and the optional
/// shared secret. Peers whose fingerprints differ never complete the
/// handshake with each other; their traffic is dropped without affecting
/// the rest of the room.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct HelloPayload {
    pub record: PresenceRecord,
    pub key_tag: [u8; 32],
    /// True when answering another peer's announcement; replies are never
    /// answered, which keeps the exchange loop-free.
    pub reply: bool,
}

/// Top-level protocol message.
///
/// Serialized with bincode for minimal overhead. A typical Ops message is
/// 41 bytes of header + payload.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WireMessage {
    pub msg_type: MessageType,
    pub peer_id: Uuid,
    pub doc_id: Uuid,
    /// Sender's Lamport clock at send time
    pub clock: u64,
    /// Message payload (varies by msg_type)
    pub payload: Vec<u8>,
}

impl WireMessage {
    /// Create a peer announcement.
    pub fn hello(
        peer_id: Uuid,
        doc_id: Uuid,
        record: &PresenceRecord,
        key_tag: [u8; 32],
        reply: bool,
    ) -> Result<Self, ProtocolError> {
        let payload = encode(&HelloPayload {
            record: record.clone(),
            key_tag,
            reply,
        })?;
        Ok(Self {
            msg_type: MessageType::Hello,
            peer_id,
            doc_id,
            clock: 0,
            payload,
        })
    }

    /// Create a sync request carrying the sender's version vector.
    pub fn sync_request(
        peer_id: Uuid,
        doc_id: Uuid,
        version: &VersionVector,
    ) -> Result<Self, ProtocolError> {
        Ok(Self {
            msg_type: MessageType::SyncRequest,
            peer_id,
            doc_id,
            clock: 0,
            payload: encode(version)?,
        })
    }

    /// Create a sync reply carrying the operations the requester missed.
    pub fn sync_reply(
        peer_id: Uuid,
        doc_id: Uuid,
        ops: &[TextOp],
    ) -> Result<Self, ProtocolError> {
        Ok(Self {
            msg_type: MessageType::SyncReply,
            peer_id,
            doc_id,
            clock: 0,
            payload: encode(&ops.to_vec())?,
        })
    }

    /// Create an incremental operation batch.
    pub fn ops(
        peer_id: Uuid,
        doc_id: Uuid,
        clock: u64,
        ops: &[TextOp],
    ) -> Result<Self, ProtocolError> {
        Ok(Self {
            msg_type: MessageType::Ops,
            peer_id,
            doc_id,
            clock,
            payload: encode(&ops.to_vec())?,
        })
    }

    /// Create a presence update.
    pub fn presence(
        peer_id: Uuid,
        doc_id: Uuid,
        record: &PresenceRecord,
    ) -> Result<Self, ProtocolError> {
        Ok(Self {
            msg_type: MessageType::Presence,
            peer_id,
            doc_id,
            clock: 0,
            payload: encode(record)?,
        })
    }

    /// Create a clean-departure notification.
    pub fn bye(peer_id: Uuid, doc_id: Uuid) -> Self {
        Self {
            msg_type: MessageType::Bye,
            peer_id,
            doc_id,
            clock: 0,
            payload: Vec::new(),
        }
    }

    /// Create a ping message.
    pub fn ping(peer_id: Uuid) -> Self {
        Self {
            msg_type: MessageType::Ping,
            peer_id,
            doc_id: Uuid::nil(),
            clock: 0,
            payload: Vec::new(),
        }
    }

    /// Create a pong message.
    pub fn pong(peer_id: Uuid) -> Self {
        Self {
            msg_type: MessageType::Pong,
            peer_id,
            doc_id: Uuid::nil(),
            clock: 0,
            payload: Vec::new(),
        }
    }

    /// Serialize to binary wire format.
    pub fn encode(&self) -> Result<Vec<u8>, ProtocolError> {
        encode(self)
    }

    /// Deserialize from binary wire format.
    pub fn decode(bytes: &[u8]) -> Result<Self, ProtocolError> {
        decode(bytes)
    }

    /// Parse a Hello payload.
    pub fn hello_payload(&self) -> Result<HelloPayload, ProtocolError> {
        if self.msg_type != MessageType::Hello {
            return Err(ProtocolError::InvalidMessageType);
        }
        decode(&self.payload)
    }

    /// Parse a SyncRequest payload.
    pub fn version_vector(&self) -> Result<VersionVector, ProtocolError> {
        if self.msg_type != MessageType::SyncRequest {
            return Err(ProtocolError::InvalidMessageType);
        }
        decode(&self.payload)
    }

    /// Parse an Ops or SyncReply payload.
    pub fn text_ops(&self) -> Result<Vec<TextOp>, ProtocolError> {
        if self.msg_type != MessageType::Ops && self.msg_type != MessageType::SyncReply {
            return Err(ProtocolError::InvalidMessageType);
        }
        decode(&self.payload)
    }

    /// Parse a Presence payload.
    pub fn presence_record(&self) -> Result<PresenceRecord, ProtocolError> {
        if self.msg_type != MessageType::Presence {
            return Err(ProtocolError::InvalidMessageType);
        }
        decode(&self.payload)
    }
}

fn encode<T: Serialize>(value: &T) -> Result<Vec<u8>, ProtocolError> {
    bincode::serde::encode_to_vec(value, bincode::config::standard())
        .map_err(|e| ProtocolError::SerializationError(e.to_string()))
}

fn decode<T: serde::de::DeserializeOwned>(bytes: &[u8]) -> Result<T, ProtocolError> {
    let (value, _) = bincode::serde::decode_from_slice(bytes, bincode::config::standard())
        .map_err(|e| ProtocolError::DeserializationError(e.to_string()))?;
    Ok(value)
}

/// Protocol errors.
#[derive(Debug, Clone)]
pub enum ProtocolError {
    SerializationError(String),
    DeserializationError(String),
    InvalidMessageType,
    ConnectionClosed,
}

impl std::fmt::Display for ProtocolError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::SerializationError(e) => write!(f, "Serialization error: {e}"),
            Self::DeserializationError(e) => write!(f, "Deserialization error: {e}"),
            Self::InvalidMessageType => write!(f, "Invalid message type"),
            Self::ConnectionClosed => write!(f, "Connection closed"),
        }
    }
}

impl std::error::Error for ProtocolError {}
