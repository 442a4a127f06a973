//! Notifications and Completions
//!
//! Application-facing events. One stream carries both broadcast
//! notifications (membership churn, data updates, chat) and terminal
//! completions for asynchronous requests (create/join/search), matched by
//! `RequestId`. The queue supports the sink contract from the protocol
//! design: optional delivery delay and replace-matching-queued semantics,
//! drained cooperatively by the embedding application.

use std::net::Ipv4Addr;
use std::time::{Duration, Instant};

use crate::core::id::{PeerId, RoomId};

/// Token identifying an asynchronous request; completions echo it back.
pub type RequestId = u64;

// =============================================================================
// EVENT KINDS
// =============================================================================

/// Outcome delivered with an "entered lobby" completion.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum EnterResponse {
    /// Local peer is now a member.
    Success,
    /// Target unknown, deleted, or the join timed out.
    DoesNotExist,
}

/// Membership transition direction.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum MemberChange {
    /// Member appeared.
    Entered,
    /// Member went away.
    Left,
}

/// What a data-update notification is scoped to.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum UpdateSubject {
    /// The lobby's own replicated fields or metadata.
    Lobby,
    /// One member's per-member metadata.
    Member(PeerId),
}

/// Notification payloads.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum EventKind {
    /// Create completed. `room` is `None` when creation is
    /// administratively disabled.
    LobbyCreated {
        /// The new room, on success.
        room: Option<RoomId>,
    },
    /// Join (or self-create enter) completed.
    LobbyEntered {
        /// Target room.
        room: RoomId,
        /// Terminal outcome.
        response: EnterResponse,
        /// Whether the room is closed to uninvited peers.
        locked: bool,
    },
    /// Replicated state changed, or a data refresh resolved.
    DataUpdated {
        /// Affected room.
        room: RoomId,
        /// Lobby-level or member-level scope.
        subject: UpdateSubject,
        /// `false` only for a failed data refresh.
        success: bool,
    },
    /// A member entered or left.
    MemberEvent {
        /// Affected room.
        room: RoomId,
        /// The member that changed.
        member: PeerId,
        /// Direction.
        change: MemberChange,
    },
    /// Directory search concluded.
    SearchFinished {
        /// Number of rooms in the result set.
        count: usize,
    },
    /// The owner associated (or re-associated) a game server.
    GameServerSet {
        /// Affected room.
        room: RoomId,
        /// Hosting peer.
        server: PeerId,
        /// Server address.
        ip: Ipv4Addr,
        /// Server port.
        port: u16,
    },
    /// A chat entry was appended to the local log.
    ChatReceived {
        /// Affected room.
        room: RoomId,
        /// Sending member.
        sender: PeerId,
        /// Stable index into the chat log.
        index: usize,
    },
    /// Another peer invited the local peer into a room.
    InviteReceived {
        /// Target room.
        room: RoomId,
        /// Inviting peer.
        from: PeerId,
    },
}

/// A queued or delivered notification.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Event {
    /// Set when this event completes an asynchronous request.
    pub request: Option<RequestId>,
    /// Payload.
    pub kind: EventKind,
}

impl Event {
    /// A broadcast notification with no request attached.
    pub fn notify(kind: EventKind) -> Self {
        Self {
            request: None,
            kind,
        }
    }

    /// A completion for `request`.
    pub fn complete(request: RequestId, kind: EventKind) -> Self {
        Self {
            request: Some(request),
            kind,
        }
    }

    /// Whether `self` occupies the same notification slot as `other`,
    /// for replace-on-emit coalescing. Data updates for the same room and
    /// subject coalesce; everything else is distinct.
    fn same_slot(&self, other: &Event) -> bool {
        if self.request != other.request {
            return false;
        }
        match (&self.kind, &other.kind) {
            (
                EventKind::DataUpdated { room: a, subject: sa, .. },
                EventKind::DataUpdated { room: b, subject: sb, .. },
            ) => a == b && sa == sb,
            _ => false,
        }
    }
}

// =============================================================================
// EVENT QUEUE
// =============================================================================

#[derive(Debug)]
struct QueuedEvent {
    due: Instant,
    event: Event,
}

/// Delayed-delivery notification queue.
///
/// Events become visible to `drain_ready` once their due time passes;
/// among ready events, emission order is preserved.
#[derive(Debug, Default)]
pub struct EventQueue {
    entries: Vec<QueuedEvent>,
}

impl EventQueue {
    /// Create an empty queue.
    pub fn new() -> Self {
        Self::default()
    }

    /// Emit an event, optionally delayed, optionally replacing a queued
    /// event in the same slot (keeps one pending data-update per subject
    /// instead of a burst).
    pub fn emit(&mut self, event: Event, now: Instant, delay: Duration, replace: bool) {
        if replace {
            self.entries.retain(|e| !e.event.same_slot(&event));
        }
        self.entries.push(QueuedEvent {
            due: now + delay,
            event,
        });
    }

    /// Emit with no delay and no replacement.
    pub fn emit_now(&mut self, event: Event, now: Instant) {
        self.emit(event, now, Duration::ZERO, false);
    }

    /// Take every event whose due time has passed, in emission order.
    pub fn drain_ready(&mut self, now: Instant) -> Vec<Event> {
        let mut ready = Vec::new();
        let mut remaining = Vec::new();
        for entry in self.entries.drain(..) {
            if entry.due <= now {
                ready.push(entry.event);
            } else {
                remaining.push(entry);
            }
        }
        self.entries = remaining;
        ready
    }

    /// Number of queued (undelivered) events.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Whether nothing is queued.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

// =============================================================================
// CHAT LOG
// =============================================================================

/// Chat entry kind. Only plain messages exist on this protocol surface.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ChatKind {
    /// An ordinary chat message.
    Message,
}

/// One append-only chat log record.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ChatEntry {
    /// Room the message was sent in.
    pub room: RoomId,
    /// Sending member.
    pub sender: PeerId,
    /// Entry kind.
    pub kind: ChatKind,
    /// Opaque payload bytes.
    pub payload: Vec<u8>,
}

/// Process-local chat log. Indices are stable for the process lifetime;
/// nothing is ever compacted away.
#[derive(Debug, Default)]
pub struct ChatLog {
    entries: Vec<ChatEntry>,
}

impl ChatLog {
    /// Create an empty log.
    pub fn new() -> Self {
        Self::default()
    }

    /// Append an entry and return its stable index.
    pub fn append(&mut self, entry: ChatEntry) -> usize {
        self.entries.push(entry);
        self.entries.len() - 1
    }

    /// Entry at `index`, if it exists and belongs to `room`.
    pub fn get(&self, room: RoomId, index: usize) -> Option<&ChatEntry> {
        self.entries.get(index).filter(|e| e.room == room)
    }

    /// Total number of entries across all rooms.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Whether the log is empty.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn data_update(room: u64) -> Event {
        Event::notify(EventKind::DataUpdated {
            room: RoomId::new(room),
            subject: UpdateSubject::Lobby,
            success: true,
        })
    }

    #[test]
    fn drain_respects_delay() {
        let mut queue = EventQueue::new();
        let now = Instant::now();
        queue.emit(data_update(1), now, Duration::from_millis(200), false);
        queue.emit_now(data_update(2), now);

        let ready = queue.drain_ready(now);
        assert_eq!(ready.len(), 1);
        assert!(matches!(
            ready[0].kind,
            EventKind::DataUpdated { room, .. } if room == RoomId::new(2)
        ));

        let later = queue.drain_ready(now + Duration::from_millis(250));
        assert_eq!(later.len(), 1);
    }

    #[test]
    fn replace_coalesces_same_subject_updates() {
        let mut queue = EventQueue::new();
        let now = Instant::now();
        queue.emit(data_update(1), now, Duration::from_millis(100), true);
        queue.emit(data_update(1), now, Duration::from_millis(100), true);
        queue.emit(data_update(2), now, Duration::from_millis(100), true);

        assert_eq!(queue.len(), 2);
    }

    #[test]
    fn replace_never_touches_completions() {
        let mut queue = EventQueue::new();
        let now = Instant::now();
        let mut completed = data_update(1);
        completed.request = Some(7);
        queue.emit(completed, now, Duration::ZERO, true);
        queue.emit(data_update(1), now, Duration::ZERO, true);

        assert_eq!(queue.len(), 2);
    }

    #[test]
    fn chat_log_indices_are_stable_and_room_scoped() {
        let mut log = ChatLog::new();
        let idx = log.append(ChatEntry {
            room: RoomId::new(1),
            sender: PeerId::new(5),
            kind: ChatKind::Message,
            payload: b"hi".to_vec(),
        });

        assert_eq!(idx, 0);
        assert!(log.get(RoomId::new(1), 0).is_some());
        assert!(log.get(RoomId::new(2), 0).is_none());
        assert!(log.get(RoomId::new(1), 1).is_none());
    }
}
