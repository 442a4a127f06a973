//! Pending Operation Tracker
//!
//! In-flight asynchronous requests, one list per operation kind, each
//! resolved on a tick by deadline or by observed registry state. Records
//! reference lobbies only by room id, since the target may not exist
//! locally yet, or may be deleted before resolution.

use std::time::Instant;

use crate::core::id::RoomId;
use crate::lobby::events::RequestId;
use crate::lobby::state::LobbyKind;

/// A create request waiting out the artificial creation delay.
#[derive(Clone, Debug)]
pub struct PendingCreate {
    /// Completion token handed back to the caller.
    pub request: RequestId,
    /// Requested visibility class.
    pub kind: LobbyKind,
    /// Requested member limit (0 = unlimited).
    pub member_limit: u32,
    /// When the create was requested.
    pub requested_at: Instant,
}

/// A join request awaiting membership, failure, or timeout.
#[derive(Clone, Debug)]
pub struct PendingJoin {
    /// Completion token handed back to the caller.
    pub request: RequestId,
    /// Target room.
    pub room: RoomId,
    /// When the join was requested.
    pub requested_at: Instant,
    /// Whether the JOIN message reached the transport yet; re-attempted
    /// every tick while false (the owner may not be known locally).
    pub message_sent: bool,
}

/// A metadata refresh for a room the local peer need not be in.
#[derive(Clone, Debug)]
pub struct DataRequest {
    /// Target room.
    pub room: RoomId,
    /// When the refresh was requested.
    pub requested_at: Instant,
}

/// All in-flight asynchronous operations.
///
/// Resolution logic lives in the service tick; this type only owns the
/// records.
#[derive(Debug, Default)]
pub struct PendingOps {
    /// Outstanding creates.
    pub creates: Vec<PendingCreate>,
    /// Outstanding joins.
    pub joins: Vec<PendingJoin>,
    /// Outstanding data refreshes.
    pub data_requests: Vec<DataRequest>,
}

impl PendingOps {
    /// Create an empty tracker.
    pub fn new() -> Self {
        Self::default()
    }

    /// The outstanding join for `room`, if any. Join requests are
    /// per-target idempotent: a second request re-uses this record.
    pub fn join_for(&self, room: RoomId) -> Option<&PendingJoin> {
        self.joins.iter().find(|j| j.room == room)
    }

    /// Whether any operation is outstanding.
    pub fn is_empty(&self) -> bool {
        self.creates.is_empty() && self.joins.is_empty() && self.data_requests.is_empty()
    }
}
