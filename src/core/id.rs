//! Peer, Room and Application Identifiers
//!
//! Stable 64-bit identifiers used throughout the protocol.
//! Room ids embed the creating peer's low-order bits so that two peers
//! creating rooms at the same instant cannot collide.

use std::fmt;

use serde::{Deserialize, Serialize};

/// Unique peer identifier.
///
/// Assigned by the embedding application (identity collaborator) and stable
/// for the process lifetime. Implements `Ord` for deterministic ordering.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct PeerId(pub u64);

impl PeerId {
    /// Create from a raw value.
    pub const fn new(raw: u64) -> Self {
        Self(raw)
    }

    /// Raw value.
    pub const fn raw(self) -> u64 {
        self.0
    }

    /// Low-order 32 bits, embedded into room ids created by this peer.
    pub const fn low_bits(self) -> u32 {
        (self.0 & 0xFFFF_FFFF) as u32
    }
}

impl fmt::Display for PeerId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:016x}", self.0)
    }
}

/// Unique room (lobby) identifier.
///
/// Generated once at creation by the room's first owner and never reassigned.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct RoomId(pub u64);

impl RoomId {
    /// Create from a raw value.
    pub const fn new(raw: u64) -> Self {
        Self(raw)
    }

    /// Raw value.
    pub const fn raw(self) -> u64 {
        self.0
    }

    /// Generate a fresh room id for a room owned by `owner`.
    ///
    /// The low 32 bits carry the owner's low-order peer bits; the high
    /// 32 bits come from v4-uuid entropy. Any sufficiently unique scheme
    /// satisfies the protocol contract, callers must not parse the value.
    pub fn generate(owner: PeerId) -> Self {
        let entropy = uuid::Uuid::new_v4();
        let bytes = entropy.as_bytes();
        let high = u32::from_be_bytes([bytes[0], bytes[1], bytes[2], bytes[3]]);
        Self(((high as u64) << 32) | owner.low_bits() as u64)
    }
}

impl fmt::Display for RoomId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:016x}", self.0)
    }
}

/// Application identifier.
///
/// Lobbies replicate only between peers running the same application;
/// snapshots for other applications are ignored by reconciliation.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct AppId(pub u32);

impl AppId {
    /// Create from a raw value.
    pub const fn new(raw: u32) -> Self {
        Self(raw)
    }
}

impl fmt::Display for AppId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn room_id_embeds_owner_low_bits() {
        let owner = PeerId::new(0xAABB_CCDD_1122_3344);
        let room = RoomId::generate(owner);
        assert_eq!((room.raw() & 0xFFFF_FFFF) as u32, owner.low_bits());
    }

    #[test]
    fn room_ids_are_unique_per_generation() {
        let owner = PeerId::new(7);
        let a = RoomId::generate(owner);
        let b = RoomId::generate(owner);
        assert_ne!(a, b);
    }

    #[test]
    fn low_bits_follow_owner_for_arbitrary_peers() {
        for _ in 0..32 {
            let owner = PeerId::new(rand::random::<u64>());
            let room = RoomId::generate(owner);
            assert_eq!((room.raw() & 0xFFFF_FFFF) as u32, owner.low_bits());
        }
    }

    #[test]
    fn display_is_fixed_width_hex() {
        assert_eq!(PeerId::new(0xff).to_string(), "00000000000000ff");
    }
}
