//! Protocol Messages
//!
//! Wire format for peer-to-peer lobby traffic. Every message travels in a
//! tagged `Envelope` carrying exactly one payload kind: a full lobby
//! snapshot, a membership protocol message, or a low-level transport
//! notice. JSON is available for debugging ease, bincode for the compact
//! form.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::core::id::{PeerId, RoomId};
use crate::lobby::state::Lobby;

// =============================================================================
// ENVELOPE
// =============================================================================

/// A routed message between peers.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Envelope {
    /// Sending peer.
    pub source: PeerId,
    /// Target peer for unicast sends; `None` on broadcasts.
    pub dest: Option<PeerId>,
    /// The single payload.
    pub payload: Payload,
}

impl Envelope {
    /// Unicast envelope.
    pub fn to(source: PeerId, dest: PeerId, payload: Payload) -> Self {
        Self {
            source,
            dest: Some(dest),
            payload,
        }
    }

    /// Broadcast envelope.
    pub fn broadcast(source: PeerId, payload: Payload) -> Self {
        Self {
            source,
            dest: None,
            payload,
        }
    }
}

/// Envelope payload, exactly one kind per message.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub enum Payload {
    /// Full lobby state, broadcast periodically by the lobby owner.
    Snapshot(Lobby),
    /// Membership/metadata protocol message.
    Lobby(LobbyMessage),
    /// Low-level transport lifecycle notice.
    Notice(TransportNotice),
}

// =============================================================================
// LOBBY PROTOCOL MESSAGES
// =============================================================================

/// A membership or metadata message scoped to one room.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct LobbyMessage {
    /// Target room.
    pub room: RoomId,
    /// What the sender wants.
    pub kind: LobbyMessageKind,
}

/// Lobby message kinds.
///
/// Everything except `Leave` and `ChangeOwner` is acted on only by the
/// room's current owner; other recipients ignore it.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub enum LobbyMessageKind {
    /// Request to be added as a member (sender is the joiner).
    Join,
    /// Announce departure (sender is the leaver). Any recipient removes
    /// the sender from its local membership view.
    Leave,
    /// Delta for the sender's own per-member metadata.
    MemberData {
        /// Key→value pairs to upsert.
        values: BTreeMap<String, String>,
    },
    /// Delta for lobby-level metadata, delegated to the owner by a
    /// non-owner caller.
    LobbyData {
        /// Key→value pairs to upsert.
        values: BTreeMap<String, String>,
    },
    /// Authoritative new-owner announcement; accepted unconditionally.
    ChangeOwner {
        /// The new authoritative peer.
        new_owner: PeerId,
    },
    /// Opaque chat payload for every current member, sender included.
    Chat {
        /// Message bytes, text or binary.
        payload: Vec<u8>,
    },
    /// Invitation to join the room. Carries no mutation.
    Invite,
}

// =============================================================================
// TRANSPORT NOTICES
// =============================================================================

/// Low-level connect/disconnect notice surfaced by the transport.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum TransportNotice {
    /// Peer became reachable.
    Connect,
    /// Peer is gone; it must be swept out of every lobby membership.
    Disconnect,
}

// =============================================================================
// SERIALIZATION HELPERS
// =============================================================================

impl Envelope {
    /// Serialize to JSON string.
    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string(self)
    }

    /// Deserialize from JSON string.
    pub fn from_json(s: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(s)
    }

    /// Serialize to binary.
    pub fn to_bytes(&self) -> Result<Vec<u8>, bincode::Error> {
        bincode::serialize(self)
    }

    /// Deserialize from binary.
    pub fn from_bytes(data: &[u8]) -> Result<Self, bincode::Error> {
        bincode::deserialize(data)
    }
}
