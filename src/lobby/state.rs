//! Lobby State Definitions
//!
//! The replicated lobby entity, its members, and the local registry of
//! every lobby this peer knows about (owned or not). Field-for-field
//! equality on `Lobby` is what reconciliation uses to detect no-op
//! snapshots, so every replicated field must take part in `PartialEq`.

use std::net::Ipv4Addr;

use serde::{Deserialize, Serialize};

use crate::core::id::{AppId, PeerId, RoomId};
use crate::core::keymap::KeyMap;

// =============================================================================
// LOBBY KIND
// =============================================================================

/// Lobby visibility class.
///
/// Determines whether the lobby can come back from a directory search and
/// whether membership occupies the local "current lobby" slot.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum LobbyKind {
    /// Joinable only through an out-of-band room id or invite.
    Private,
    /// Discoverable by friends of members.
    FriendsOnly,
    /// Discoverable by everyone.
    #[default]
    Public,
    /// Discoverable, but membership does not count as presence.
    Invisible,
    /// Private and never reused after deletion.
    PrivateUnique,
}

impl LobbyKind {
    /// Whether a directory search may return lobbies of this kind.
    pub fn searchable(self) -> bool {
        matches!(
            self,
            LobbyKind::Public | LobbyKind::Invisible | LobbyKind::FriendsOnly
        )
    }
}

// =============================================================================
// MEMBERS
// =============================================================================

/// A peer participating in a lobby, with its per-member metadata.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Member {
    /// Peer identifier, unique within the lobby.
    pub id: PeerId,
    /// Per-member key→value metadata, owned by this member but only
    /// written through the lobby owner.
    pub metadata: KeyMap,
}

impl Member {
    /// A member with empty metadata.
    pub fn new(id: PeerId) -> Self {
        Self {
            id,
            metadata: KeyMap::new(),
        }
    }
}

// =============================================================================
// GAME SERVER ASSOCIATION
// =============================================================================

/// Optional game-server association set by the lobby owner.
///
/// `num_updates` increments on every write so replicas can detect a change
/// without comparing the other fields.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct GameServerInfo {
    /// Identifier of the hosting peer (or dedicated server).
    pub server_id: PeerId,
    /// Server address.
    pub ip: Ipv4Addr,
    /// Server port.
    pub port: u16,
    /// Monotonic update counter, starts at 1 on first set.
    pub num_updates: u32,
}

// =============================================================================
// LOBBY
// =============================================================================

/// A replicated lobby entity.
///
/// Exactly one peer (the owner) is authoritative for a non-deleted lobby.
/// Non-owners hold eventually-consistent copies refreshed by owner
/// snapshot broadcasts.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Lobby {
    /// Stable room identifier, assigned at creation.
    pub room_id: RoomId,
    /// Current authoritative peer. Invariant: a member while not deleted.
    pub owner: PeerId,
    /// Visibility class.
    pub kind: LobbyKind,
    /// When false, no new member may join regardless of kind.
    pub joinable: bool,
    /// Maximum member count; 0 means unlimited.
    pub member_limit: u32,
    /// Ordered member list, unique by peer id. List order is load-bearing:
    /// owner hand-off picks the first remaining member.
    pub members: Vec<Member>,
    /// Lobby-level metadata.
    pub metadata: KeyMap,
    /// Game-server association, if the owner has set one.
    pub game_server: Option<GameServerInfo>,
    /// Once set the lobby is inert and will be purged after a grace period.
    pub deleted: bool,
    /// Unix seconds at deletion time; 0 while alive.
    pub deleted_at: u64,
    /// Owning application. Reconciliation ignores other applications.
    pub app_id: AppId,
}

impl Lobby {
    /// A fresh lobby owned by `owner`, with the owner not yet a member.
    pub fn new(room_id: RoomId, owner: PeerId, kind: LobbyKind, member_limit: u32, app_id: AppId) -> Self {
        Self {
            room_id,
            owner,
            kind,
            joinable: true,
            member_limit,
            members: Vec::new(),
            metadata: KeyMap::new(),
            game_server: None,
            deleted: false,
            deleted_at: 0,
            app_id,
        }
    }

    /// A placeholder for a room known only by id, pending its first
    /// snapshot. Every other field is default until reconciliation
    /// overwrites the copy wholesale.
    pub fn placeholder(room_id: RoomId) -> Self {
        Self {
            room_id,
            owner: PeerId::default(),
            kind: LobbyKind::default(),
            joinable: false,
            member_limit: 0,
            members: Vec::new(),
            metadata: KeyMap::new(),
            game_server: None,
            deleted: false,
            deleted_at: 0,
            app_id: AppId::default(),
        }
    }

    /// Member lookup by peer id.
    pub fn member(&self, id: PeerId) -> Option<&Member> {
        self.members.iter().find(|m| m.id == id)
    }

    /// Mutable member lookup by peer id.
    pub fn member_mut(&mut self, id: PeerId) -> Option<&mut Member> {
        self.members.iter_mut().find(|m| m.id == id)
    }

    /// Whether `id` is currently a member.
    pub fn is_member(&self, id: PeerId) -> bool {
        self.member(id).is_some()
    }

    /// Append a member if absent. Returns `false` on duplicates.
    pub fn add_member(&mut self, id: PeerId) -> bool {
        if self.is_member(id) {
            return false;
        }
        self.members.push(Member::new(id));
        true
    }

    /// Remove a member. Returns `true` if one was removed.
    pub fn remove_member(&mut self, id: PeerId) -> bool {
        let before = self.members.len();
        self.members.retain(|m| m.id != id);
        self.members.len() != before
    }

    /// Whether the member limit still has room.
    pub fn has_free_slot(&self) -> bool {
        self.member_limit == 0 || (self.members.len() as u32) < self.member_limit
    }

    /// Mark deleted at `now_unix`. Deleted lobbies accept no mutations and
    /// are purged once the grace period elapses.
    pub fn mark_deleted(&mut self, now_unix: u64) {
        self.deleted = true;
        self.deleted_at = now_unix;
    }
}

// =============================================================================
// REGISTRY
// =============================================================================

/// The authoritative local set of known lobbies.
///
/// Insertion order is preserved; directory search walks lobbies in this
/// order.
#[derive(Debug, Default)]
pub struct Registry {
    lobbies: Vec<Lobby>,
}

impl Registry {
    /// Create an empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Find a lobby by room id.
    pub fn find(&self, room: RoomId) -> Option<&Lobby> {
        self.lobbies.iter().find(|l| l.room_id == room)
    }

    /// Find a lobby mutably by room id.
    pub fn find_mut(&mut self, room: RoomId) -> Option<&mut Lobby> {
        self.lobbies.iter_mut().find(|l| l.room_id == room)
    }

    /// Insert a lobby. The caller guarantees the room id is not present.
    pub fn insert(&mut self, lobby: Lobby) {
        debug_assert!(self.find(lobby.room_id).is_none());
        self.lobbies.push(lobby);
    }

    /// Get the lobby for `room`, creating a placeholder if unknown.
    pub fn find_or_placeholder(&mut self, room: RoomId) -> &mut Lobby {
        let idx = match self.lobbies.iter().position(|l| l.room_id == room) {
            Some(idx) => idx,
            None => {
                self.lobbies.push(Lobby::placeholder(room));
                self.lobbies.len() - 1
            }
        };
        &mut self.lobbies[idx]
    }

    /// Iterate lobbies in insertion order.
    pub fn iter(&self) -> impl Iterator<Item = &Lobby> {
        self.lobbies.iter()
    }

    /// Iterate lobbies mutably.
    pub fn iter_mut(&mut self) -> impl Iterator<Item = &mut Lobby> {
        self.lobbies.iter_mut()
    }

    /// Number of known lobbies (any state).
    pub fn len(&self) -> usize {
        self.lobbies.len()
    }

    /// Whether no lobbies are known.
    pub fn is_empty(&self) -> bool {
        self.lobbies.is_empty()
    }

    /// Drop dead lobbies: memberless ones, and deleted ones whose grace
    /// period has elapsed. Returns the purged room ids so callers can
    /// clear side caches.
    pub fn purge(&mut self, now_unix: u64, grace_secs: u64) -> Vec<RoomId> {
        let mut purged = Vec::new();
        self.lobbies.retain(|l| {
            let dead = l.members.is_empty() || (l.deleted && l.deleted_at + grace_secs < now_unix);
            if dead {
                purged.push(l.room_id);
            }
            !dead
        });
        purged
    }
}
