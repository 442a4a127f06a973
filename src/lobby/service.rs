//! Lobby Service
//!
//! The canonical lobby capability: every operation the protocol supports,
//! the cooperative tick driver, and the inbound message handler. One
//! instance per peer; all state is owned by the instance and every entry
//! point takes `&mut self`, so there is no lock. The embedding
//! application funnels its calls and the transport's inbound messages
//! through one logical actor.
//!
//! Authority model: the lobby owner mutates directly and disseminates
//! full-state snapshots; non-owners delegate mutations by message and
//! learn of changes by diffing inbound snapshots against their local
//! copy.

use std::collections::{BTreeMap, HashMap};
use std::net::Ipv4Addr;
use std::time::{Duration, Instant};

use tracing::{debug, info, warn};

use crate::core::clock::{Clock, SystemClock};
use crate::core::id::{AppId, PeerId, RoomId};
use crate::core::keymap::KeyMap;
use crate::lobby::events::{
    ChatEntry, ChatKind, ChatLog, EnterResponse, Event, EventKind, EventQueue, MemberChange,
    RequestId, UpdateSubject,
};
use crate::lobby::filter::{Comparison, Criterion};
use crate::lobby::pending::{DataRequest, PendingCreate, PendingJoin, PendingOps};
use crate::lobby::search::SearchState;
use crate::lobby::state::{GameServerInfo, Lobby, LobbyKind, Registry};
use crate::network::protocol::{Envelope, LobbyMessage, LobbyMessageKind, Payload, TransportNotice};
use crate::network::transport::Transport;

// =============================================================================
// CONFIGURATION
// =============================================================================

/// Protocol timing constants.
///
/// Defaults match the behavior the protocol was tuned against; tests
/// shrink them freely.
#[derive(Clone, Copy, Debug)]
pub struct Timing {
    /// Interval between periodic owner snapshot rebroadcasts.
    pub send_lobby_interval: Duration,
    /// How long a pending join waits before failing.
    pub pending_join_timeout: Duration,
    /// How long a data refresh waits before failing.
    pub data_request_timeout: Duration,
    /// Grace period between deletion and purge.
    pub deleted_purge_grace: Duration,
    /// Artificial delay before a local create resolves (models the
    /// round trip a backed implementation would pay).
    pub create_delay: Duration,
    /// How long a directory search keeps accumulating results.
    pub search_timeout: Duration,
}

impl Default for Timing {
    fn default() -> Self {
        Self {
            send_lobby_interval: Duration::from_secs(5),
            pending_join_timeout: Duration::from_secs(10),
            data_request_timeout: Duration::from_secs(6),
            deleted_purge_grace: Duration::from_secs(2),
            create_delay: Duration::from_millis(70),
            search_timeout: Duration::from_millis(200),
        }
    }
}

/// Default result-count cap for a directory search.
pub const FILTER_MAX_RESULTS_DEFAULT: usize = 4096;

/// Per-peer service configuration.
#[derive(Clone, Debug)]
pub struct ServiceConfig {
    /// The local application. Snapshots for other applications are
    /// ignored.
    pub app_id: AppId,
    /// Administratively refuse lobby creation (creates complete as
    /// failures).
    pub disable_lobby_creation: bool,
    /// Timing constants.
    pub timing: Timing,
}

impl ServiceConfig {
    /// Configuration with default timing.
    pub fn new(app_id: AppId) -> Self {
        Self {
            app_id,
            disable_lobby_creation: false,
            timing: Timing::default(),
        }
    }
}

// =============================================================================
// ERRORS
// =============================================================================

/// Errors surfaced when feeding raw transport bytes into the service.
#[derive(Debug, thiserror::Error)]
pub enum LobbyError {
    /// The byte buffer was not a valid envelope.
    #[error("malformed envelope: {0}")]
    Decode(#[from] bincode::Error),
}

// =============================================================================
// SERVICE
// =============================================================================

/// One peer's lobby directory, pending operations, and protocol driver.
pub struct LobbyService {
    local_peer: PeerId,
    config: ServiceConfig,
    clock: Box<dyn Clock>,
    transport: Box<dyn Transport>,

    registry: Registry,
    pending: PendingOps,

    search: Option<SearchState>,
    last_results: Vec<RoomId>,
    filter_pending: Vec<Criterion>,
    filter_max_results: usize,

    events: EventQueue,
    chat: ChatLog,

    /// Local cache of the local peer's own per-member metadata, kept
    /// per room even before the owner has applied it.
    self_member_data: HashMap<RoomId, KeyMap>,
    /// The single "currently in this lobby" slot. Invisible lobbies do
    /// not occupy it.
    current_lobby: Option<RoomId>,

    last_snapshot_broadcast: Option<Instant>,
    next_request_id: RequestId,
}

impl LobbyService {
    /// Create a service on the system clock.
    pub fn new(local_peer: PeerId, config: ServiceConfig, transport: Box<dyn Transport>) -> Self {
        Self::with_clock(local_peer, config, transport, Box::new(SystemClock))
    }

    /// Create a service on an explicit clock (tests use `ManualClock`).
    pub fn with_clock(
        local_peer: PeerId,
        config: ServiceConfig,
        transport: Box<dyn Transport>,
        clock: Box<dyn Clock>,
    ) -> Self {
        info!(peer = %local_peer, app = %config.app_id, "lobby service starting");
        Self {
            local_peer,
            config,
            clock,
            transport,
            registry: Registry::new(),
            pending: PendingOps::new(),
            search: None,
            last_results: Vec::new(),
            filter_pending: Vec::new(),
            filter_max_results: FILTER_MAX_RESULTS_DEFAULT,
            events: EventQueue::new(),
            chat: ChatLog::new(),
            self_member_data: HashMap::new(),
            current_lobby: None,
            last_snapshot_broadcast: None,
            next_request_id: 0,
        }
    }

    /// The local peer identity.
    pub fn local_peer(&self) -> PeerId {
        self.local_peer
    }

    /// The local application identity.
    pub fn app_id(&self) -> AppId {
        self.config.app_id
    }

    /// The room whose membership currently counts as local presence.
    pub fn current_lobby(&self) -> Option<RoomId> {
        self.current_lobby
    }

    /// Read-only view of a known lobby.
    pub fn lobby(&self, room: RoomId) -> Option<&Lobby> {
        self.registry.find(room)
    }

    fn reserve_request(&mut self) -> RequestId {
        self.next_request_id += 1;
        self.next_request_id
    }

    fn now(&self) -> Instant {
        self.clock.now()
    }

    // =========================================================================
    // NOTIFICATION HELPERS
    // =========================================================================

    /// Emit a data-update notification for `subject`; member-scoped
    /// updates also re-emit for the lobby itself. When `rebroadcast` is
    /// set and the local peer owns the room, the changed snapshot goes
    /// out immediately instead of waiting for the periodic pass.
    fn emit_data_update(
        &mut self,
        room: RoomId,
        subject: UpdateSubject,
        success: bool,
        delay: Duration,
        rebroadcast: bool,
    ) {
        let now = self.now();
        self.events.emit(
            Event::notify(EventKind::DataUpdated {
                room,
                subject,
                success,
            }),
            now,
            delay,
            true,
        );
        if matches!(subject, UpdateSubject::Member(_)) {
            self.events.emit(
                Event::notify(EventKind::DataUpdated {
                    room,
                    subject: UpdateSubject::Lobby,
                    success,
                }),
                now,
                delay,
                true,
            );
        }

        if rebroadcast {
            let owned = self
                .registry
                .find(room)
                .map(|l| l.owner == self.local_peer)
                .unwrap_or(false);
            if owned {
                self.broadcast_snapshot(room);
            }
        }
    }

    /// Emit a member entered/left notification plus the lobby-level
    /// data update that accompanies membership churn.
    fn emit_member_event(&mut self, room: RoomId, member: PeerId, change: MemberChange, delay: Duration) {
        let now = self.now();
        self.events.emit(
            Event::notify(EventKind::MemberEvent {
                room,
                member,
                change,
            }),
            now,
            delay,
            false,
        );
        self.emit_data_update(room, UpdateSubject::Lobby, true, delay, false);
    }

    /// Update the "currently in this lobby" slot. Invisible lobbies do
    /// not count as presence.
    fn on_self_enter_leave(&mut self, room: RoomId, kind: LobbyKind, leaving: bool) {
        if kind == LobbyKind::Invisible {
            return;
        }
        self.current_lobby = if leaving { None } else { Some(room) };
    }

    // =========================================================================
    // OUTBOUND HELPERS
    // =========================================================================

    /// Unicast a lobby message to the room's current owner. Fails when
    /// the room (and therefore its owner) is not known locally yet.
    fn send_owner(&mut self, room: RoomId, kind: LobbyMessageKind) -> bool {
        let Some(owner) = self.registry.find(room).map(|l| l.owner) else {
            return false;
        };
        let envelope = Envelope::to(
            self.local_peer,
            owner,
            Payload::Lobby(LobbyMessage { room, kind }),
        );
        self.transport.send(owner, envelope)
    }

    /// Unicast a lobby message to every current member, local peer
    /// included (the transport loops self-sends back).
    fn send_members(&mut self, room: RoomId, kind: LobbyMessageKind) -> bool {
        let Some(members) = self
            .registry
            .find(room)
            .map(|l| l.members.iter().map(|m| m.id).collect::<Vec<_>>())
        else {
            return false;
        };
        for member in members {
            let envelope = Envelope::to(
                self.local_peer,
                member,
                Payload::Lobby(LobbyMessage {
                    room,
                    kind: kind.clone(),
                }),
            );
            self.transport.send(member, envelope);
        }
        true
    }

    /// Broadcast the current full state of `room` to all related peers.
    fn broadcast_snapshot(&mut self, room: RoomId) {
        let Some(snapshot) = self.registry.find(room).cloned() else {
            return;
        };
        debug!(room = %room, "broadcasting snapshot");
        self.transport
            .broadcast(Envelope::broadcast(self.local_peer, Payload::Snapshot(snapshot)));
    }

    // =========================================================================
    // CREATE / JOIN / LEAVE
    // =========================================================================

    /// Request creation of a lobby owned by the local peer. Completes
    /// asynchronously with `LobbyCreated` (and `LobbyEntered` on
    /// success) once the creation delay elapses on a tick.
    pub fn create_lobby(&mut self, kind: LobbyKind, member_limit: u32) -> RequestId {
        let request = self.reserve_request();
        debug!(?kind, member_limit, request, "create requested");
        self.pending.creates.push(PendingCreate {
            request,
            kind,
            member_limit,
            requested_at: self.now(),
        });
        request
    }

    /// Request to join `room`. Per-target idempotent: while a join for
    /// the same room is pending, the original token is returned.
    pub fn join_lobby(&mut self, room: RoomId) -> RequestId {
        if let Some(existing) = self.pending.join_for(room) {
            debug!(room = %room, request = existing.request, "join already pending");
            return existing.request;
        }

        let request = self.reserve_request();
        let message_sent = self.send_owner(room, LobbyMessageKind::Join);
        debug!(room = %room, request, message_sent, "join requested");
        self.pending.joins.push(PendingJoin {
            request,
            room,
            requested_at: self.now(),
            message_sent,
        });
        request
    }

    /// Leave `room`. No-op when the room is unknown, deleted, or the
    /// local peer is not a member. A departing owner hands the room to
    /// the first remaining member in list order, or deletes it when
    /// leaving alone.
    pub fn leave_lobby(&mut self, room: RoomId) {
        let Some(lobby) = self.registry.find(room) else {
            return;
        };
        if lobby.deleted || !lobby.is_member(self.local_peer) {
            return;
        }
        let kind = lobby.kind;
        let is_owner = lobby.owner == self.local_peer;
        let alone = lobby.members.len() == 1;

        debug!(room = %room, is_owner, alone, "leaving lobby");
        self.on_self_enter_leave(room, kind, true);
        self.self_member_data.remove(&room);

        let local = self.local_peer;
        if !is_owner {
            if let Some(lobby) = self.registry.find_mut(room) {
                lobby.remove_member(local);
            }
            self.send_owner(room, LobbyMessageKind::Leave);
        } else if !alone {
            let mut successor = None;
            if let Some(lobby) = self.registry.find_mut(room) {
                lobby.remove_member(local);
                successor = lobby.members.first().map(|m| m.id);
            }
            if let Some(successor) = successor {
                self.change_owner_internal(room, successor);
                self.send_members(room, LobbyMessageKind::Leave);
            }
        } else {
            self.transport.broadcast(Envelope::broadcast(
                self.local_peer,
                Payload::Lobby(LobbyMessage {
                    room,
                    kind: LobbyMessageKind::Leave,
                }),
            ));
            let now_unix = self.clock.unix_secs();
            if let Some(lobby) = self.registry.find_mut(room) {
                lobby.mark_deleted(now_unix);
            }
        }
    }

    /// Invite another peer into `room`. Returns `true` when the invite
    /// was handed to the transport.
    pub fn invite_peer(&mut self, room: RoomId, peer: PeerId) -> bool {
        if self.registry.find(room).is_none() {
            return false;
        }
        let envelope = Envelope::to(
            self.local_peer,
            peer,
            Payload::Lobby(LobbyMessage {
                room,
                kind: LobbyMessageKind::Invite,
            }),
        );
        self.transport.send(peer, envelope)
    }

    /// Transfer ownership of `room` to `new_owner`, who must be a
    /// member. Owner-only.
    pub fn set_lobby_owner(&mut self, room: RoomId, new_owner: PeerId) -> bool {
        let Some(lobby) = self.registry.find(room) else {
            return false;
        };
        if lobby.deleted || lobby.owner != self.local_peer || !lobby.is_member(new_owner) {
            return false;
        }
        self.change_owner_internal(room, new_owner);
        true
    }

    /// Set the owner field, announce it to all members, and raise the
    /// data-update notification.
    fn change_owner_internal(&mut self, room: RoomId, new_owner: PeerId) {
        debug!(room = %room, new_owner = %new_owner, "ownership hand-off");
        if let Some(lobby) = self.registry.find_mut(room) {
            lobby.owner = new_owner;
        }
        self.send_members(room, LobbyMessageKind::ChangeOwner { new_owner });
        self.emit_data_update(room, UpdateSubject::Lobby, true, Duration::ZERO, false);
    }

    // =========================================================================
    // LOBBY DATA
    // =========================================================================

    /// Lobby metadata value for `key`; empty when absent or the room is
    /// unknown.
    pub fn lobby_data(&self, room: RoomId, key: &str) -> &str {
        self.registry
            .find(room)
            .and_then(|l| l.metadata.get(key))
            .unwrap_or("")
    }

    /// Number of metadata keys set on `room`.
    pub fn lobby_data_count(&self, room: RoomId) -> usize {
        self.registry.find(room).map(|l| l.metadata.len()).unwrap_or(0)
    }

    /// Metadata pair by index, in deterministic order.
    pub fn lobby_data_by_index(&self, room: RoomId, index: usize) -> Option<(&str, &str)> {
        self.registry.find(room)?.metadata.get_index(index)
    }

    /// Set a lobby metadata key. The owner applies it locally and
    /// rebroadcasts immediately; a non-owner delegates the delta to the
    /// owner, fire-and-forget, and succeeds once the send is attempted.
    pub fn set_lobby_data(&mut self, room: RoomId, key: &str, value: &str) -> bool {
        if key.is_empty() {
            return false;
        }
        let Some(lobby) = self.registry.find(room) else {
            return false;
        };
        if lobby.deleted {
            return false;
        }

        if lobby.owner == self.local_peer {
            let changed = self
                .registry
                .find_mut(room)
                .map(|l| l.metadata.set(key, value))
                .unwrap_or(false);
            if changed {
                self.emit_data_update(
                    room,
                    UpdateSubject::Lobby,
                    true,
                    Duration::from_millis(5),
                    true,
                );
            }
        } else {
            let mut values = BTreeMap::new();
            values.insert(key.to_owned(), value.to_owned());
            self.send_owner(room, LobbyMessageKind::LobbyData { values });
        }
        true
    }

    /// Remove a lobby metadata key. Owner-only.
    pub fn delete_lobby_data(&mut self, room: RoomId, key: &str) -> bool {
        let Some(lobby) = self.registry.find(room) else {
            return false;
        };
        if lobby.deleted || lobby.owner != self.local_peer {
            return false;
        }
        self.registry.find_mut(room).map(|l| l.metadata.remove(key));
        self.emit_data_update(room, UpdateSubject::Lobby, true, Duration::ZERO, true);
        true
    }

    // =========================================================================
    // MEMBER DATA
    // =========================================================================

    /// Per-member metadata value. The local peer reads its own writes
    /// from the local cache immediately, before the owner has applied
    /// them; other members are read from the replicated copy.
    pub fn member_data(&self, room: RoomId, member: PeerId, key: &str) -> &str {
        let Some(lobby) = self.registry.find(room) else {
            return "";
        };
        let Some(record) = lobby.member(member) else {
            return "";
        };
        if member == self.local_peer {
            self.self_member_data
                .get(&room)
                .and_then(|d| d.get(key))
                .unwrap_or("")
        } else {
            record.metadata.get(key).unwrap_or("")
        }
    }

    /// Set one of the local peer's own per-member metadata keys. The
    /// owner applies directly; a non-owner delegates to the owner.
    pub fn set_member_data(&mut self, room: RoomId, key: &str, value: &str) {
        if key.is_empty() {
            return;
        }
        let Some(lobby) = self.registry.find(room) else {
            return;
        };
        if lobby.deleted || !lobby.is_member(self.local_peer) {
            return;
        }

        if lobby.owner == self.local_peer {
            let local = self.local_peer;
            if let Some(member) = self.registry.find_mut(room).and_then(|l| l.member_mut(local)) {
                member.metadata.set(key, value);
            }
            self.emit_data_update(
                room,
                UpdateSubject::Member(local),
                true,
                Duration::ZERO,
                false,
            );
        } else {
            let mut values = BTreeMap::new();
            values.insert(key.to_owned(), value.to_owned());
            self.send_owner(room, LobbyMessageKind::MemberData { values });
        }

        self.self_member_data
            .entry(room)
            .or_default()
            .set(key, value);
    }

    // =========================================================================
    // MEMBERSHIP ACCESSORS
    // =========================================================================

    /// Number of members in `room`; 0 when unknown.
    pub fn member_count(&self, room: RoomId) -> usize {
        self.registry.find(room).map(|l| l.members.len()).unwrap_or(0)
    }

    /// Member by list position. `None` for deleted rooms and
    /// out-of-range indices.
    pub fn member_by_index(&self, room: RoomId, index: usize) -> Option<PeerId> {
        let lobby = self.registry.find(room)?;
        if lobby.deleted {
            return None;
        }
        lobby.members.get(index).map(|m| m.id)
    }

    /// Current owner; `None` for unknown or deleted rooms.
    pub fn lobby_owner(&self, room: RoomId) -> Option<PeerId> {
        let lobby = self.registry.find(room)?;
        if lobby.deleted {
            return None;
        }
        Some(lobby.owner)
    }

    /// Member limit; 0 when unlimited or unknown.
    pub fn member_limit(&self, room: RoomId) -> u32 {
        self.registry.find(room).map(|l| l.member_limit).unwrap_or(0)
    }

    /// Set the member limit. Owner-only.
    pub fn set_member_limit(&mut self, room: RoomId, limit: u32) -> bool {
        if !self.owner_may_mutate(room) {
            return false;
        }
        if let Some(lobby) = self.registry.find_mut(room) {
            lobby.member_limit = limit;
        }
        self.emit_data_update(room, UpdateSubject::Lobby, true, Duration::ZERO, false);
        true
    }

    /// Change the visibility class. Owner-only. Moving into or out of
    /// `Invisible` updates the local presence slot.
    pub fn set_lobby_kind(&mut self, room: RoomId, kind: LobbyKind) -> bool {
        if !self.owner_may_mutate(room) {
            return false;
        }
        let old = self.registry.find(room).map(|l| l.kind).unwrap_or_default();
        if old == kind {
            return true;
        }
        if old == LobbyKind::Invisible {
            self.on_self_enter_leave(room, kind, false);
        }
        if kind == LobbyKind::Invisible {
            self.on_self_enter_leave(room, old, true);
        }
        if let Some(lobby) = self.registry.find_mut(room) {
            lobby.kind = kind;
        }
        self.emit_data_update(room, UpdateSubject::Lobby, true, Duration::ZERO, false);
        true
    }

    /// Open or close the room to new members. Owner-only.
    pub fn set_lobby_joinable(&mut self, room: RoomId, joinable: bool) -> bool {
        if !self.owner_may_mutate(room) {
            return false;
        }
        let changed = self
            .registry
            .find_mut(room)
            .map(|l| {
                let changed = l.joinable != joinable;
                l.joinable = joinable;
                changed
            })
            .unwrap_or(false);
        if changed {
            self.emit_data_update(room, UpdateSubject::Lobby, true, Duration::ZERO, false);
        }
        true
    }

    fn owner_may_mutate(&self, room: RoomId) -> bool {
        self.registry
            .find(room)
            .map(|l| !l.deleted && l.owner == self.local_peer)
            .unwrap_or(false)
    }

    // =========================================================================
    // GAME SERVER
    // =========================================================================

    /// Associate a game server with `room`, bumping the update counter.
    /// Owner-only.
    pub fn set_game_server(
        &mut self,
        room: RoomId,
        server_id: PeerId,
        ip: Ipv4Addr,
        port: u16,
    ) -> bool {
        if !self.owner_may_mutate(room) {
            return false;
        }
        let num_updates = self
            .registry
            .find(room)
            .and_then(|l| l.game_server.as_ref().map(|g| g.num_updates))
            .unwrap_or(0)
            + 1;
        if let Some(lobby) = self.registry.find_mut(room) {
            lobby.game_server = Some(GameServerInfo {
                server_id,
                ip,
                port,
                num_updates,
            });
        }
        let now = self.now();
        self.events.emit_now(
            Event::notify(EventKind::GameServerSet {
                room,
                server: server_id,
                ip,
                port,
            }),
            now,
        );
        self.emit_data_update(room, UpdateSubject::Lobby, true, Duration::ZERO, false);
        true
    }

    /// The room's game-server association, if set.
    pub fn game_server(&self, room: RoomId) -> Option<GameServerInfo> {
        self.registry.find(room)?.game_server
    }

    // =========================================================================
    // CHAT
    // =========================================================================

    /// Send an opaque chat payload to every current member of `room`,
    /// the local peer included.
    pub fn send_chat(&mut self, room: RoomId, payload: &[u8]) -> bool {
        let Some(lobby) = self.registry.find(room) else {
            return false;
        };
        if lobby.deleted {
            return false;
        }
        self.send_members(
            room,
            LobbyMessageKind::Chat {
                payload: payload.to_vec(),
            },
        )
    }

    /// Chat log entry by stable index, scoped to `room`.
    pub fn chat_entry(&self, room: RoomId, index: usize) -> Option<&ChatEntry> {
        self.chat.get(room, index)
    }

    // =========================================================================
    // DIRECTORY SEARCH
    // =========================================================================

    /// Accumulate a string criterion for the next search.
    pub fn add_string_filter(&mut self, key: &str, value: &str, comparison: Comparison) {
        self.filter_pending.push(Criterion::text(key, value, comparison));
    }

    /// Accumulate a numeric criterion for the next search.
    pub fn add_numeric_filter(&mut self, key: &str, value: i64, comparison: Comparison) {
        self.filter_pending.push(Criterion::number(key, value, comparison));
    }

    /// Cap the result count for the next search.
    pub fn set_max_results(&mut self, max: usize) {
        self.filter_max_results = max;
    }

    /// Begin a directory search. Snapshots and clears the accumulated
    /// criteria and result cap, discards the previous result set, and
    /// silently abandons any search still in flight. Exactly one
    /// `SearchFinished` completion follows per call.
    pub fn request_lobby_list(&mut self) -> RequestId {
        let request = self.reserve_request();
        let criteria = std::mem::take(&mut self.filter_pending);
        let max_results =
            std::mem::replace(&mut self.filter_max_results, FILTER_MAX_RESULTS_DEFAULT);
        self.last_results.clear();
        if let Some(old) = self.search.take() {
            debug!(abandoned = old.request, "superseding unfinished search");
        }
        debug!(request, criteria = criteria.len(), max_results, "search started");
        self.search = Some(SearchState::new(
            request,
            criteria,
            max_results,
            self.now(),
            self.config.timing.search_timeout,
        ));
        request
    }

    /// Search result by index, valid after (or during) a search.
    pub fn lobby_by_index(&self, index: usize) -> Option<RoomId> {
        match &self.search {
            Some(search) => search.results.get(index).copied(),
            None => self.last_results.get(index).copied(),
        }
    }

    /// Number of rooms in the current result set.
    pub fn search_result_count(&self) -> usize {
        match &self.search {
            Some(search) => search.results.len(),
            None => self.last_results.len(),
        }
    }

    // =========================================================================
    // DATA REFRESH
    // =========================================================================

    /// Refresh metadata for a room the local peer need not be in.
    /// Resolves on a later tick with a data-update notification:
    /// success as soon as the room is known locally, failure on
    /// timeout.
    pub fn request_lobby_data(&mut self, room: RoomId) -> bool {
        self.pending.data_requests.push(DataRequest {
            room,
            requested_at: self.now(),
        });
        true
    }

    // =========================================================================
    // TICK DRIVER
    // =========================================================================

    /// Advance every timeout-driven piece of state. The embedding
    /// application calls this periodically; nothing runs in the
    /// background.
    pub fn tick(&mut self) {
        let now = self.now();
        self.purge_lobbies();
        self.resolve_pending_creates(now);

        let broadcast_due = self
            .last_snapshot_broadcast
            .map_or(true, |t| now.duration_since(t) >= self.config.timing.send_lobby_interval);
        if broadcast_due {
            self.broadcast_owned_lobbies();
            self.last_snapshot_broadcast = Some(now);
        }

        self.run_search(now);
        self.resolve_pending_joins(now);
        self.resolve_data_requests(now);
    }

    /// Take every notification whose due time has passed.
    pub fn poll_events(&mut self) -> Vec<Event> {
        let now = self.now();
        self.events.drain_ready(now)
    }

    fn purge_lobbies(&mut self) {
        let now_unix = self.clock.unix_secs();
        let grace = self.config.timing.deleted_purge_grace.as_secs();
        for room in self.registry.purge(now_unix, grace) {
            debug!(room = %room, "purged lobby");
            self.self_member_data.remove(&room);
        }
    }

    fn resolve_pending_creates(&mut self, now: Instant) {
        let delay = self.config.timing.create_delay;
        let due: Vec<PendingCreate> = {
            let (due, rest) = self
                .pending
                .creates
                .drain(..)
                .partition(|c| now.duration_since(c.requested_at) >= delay);
            self.pending.creates = rest;
            due
        };

        for create in due {
            if self.config.disable_lobby_creation {
                warn!(request = create.request, "lobby creation disabled");
                self.events
                    .emit_now(Event::complete(create.request, EventKind::LobbyCreated { room: None }), now);
                continue;
            }

            let room = RoomId::generate(self.local_peer);
            let mut lobby = Lobby::new(
                room,
                self.local_peer,
                create.kind,
                create.member_limit,
                self.config.app_id,
            );
            lobby.add_member(self.local_peer);
            self.registry.insert(lobby);
            info!(room = %room, kind = ?create.kind, "lobby created");

            self.events.emit_now(
                Event::complete(create.request, EventKind::LobbyCreated { room: Some(room) }),
                now,
            );
            self.events.emit_now(
                Event::notify(EventKind::LobbyEntered {
                    room,
                    response: EnterResponse::Success,
                    locked: create.kind == LobbyKind::Private,
                }),
                now,
            );
            self.on_self_enter_leave(room, create.kind, false);
            self.emit_data_update(room, UpdateSubject::Lobby, true, Duration::ZERO, false);
        }
    }

    fn broadcast_owned_lobbies(&mut self) {
        let owned: Vec<RoomId> = self
            .registry
            .iter()
            .filter(|l| !l.deleted && l.owner == self.local_peer && l.is_member(self.local_peer))
            .map(|l| l.room_id)
            .collect();
        for room in owned {
            self.broadcast_snapshot(room);
        }
    }

    fn run_search(&mut self, now: Instant) {
        let Some(mut search) = self.search.take() else {
            return;
        };
        let cap_hit = search.scan(&self.registry);
        if cap_hit || search.expired(now) {
            let count = search.results.len();
            debug!(request = search.request, count, cap_hit, "search finished");
            self.last_results = std::mem::take(&mut search.results);
            self.events
                .emit_now(Event::complete(search.request, EventKind::SearchFinished { count }), now);
        } else {
            self.search = Some(search);
        }
    }

    fn resolve_pending_joins(&mut self, now: Instant) {
        // Re-attempt sends that could not be routed yet (unknown owner).
        let unsent: Vec<RoomId> = self
            .pending
            .joins
            .iter()
            .filter(|j| !j.message_sent)
            .map(|j| j.room)
            .collect();
        for room in unsent {
            let sent = self.send_owner(room, LobbyMessageKind::Join);
            if let Some(join) = self.pending.joins.iter_mut().find(|j| j.room == room) {
                join.message_sent = sent;
            }
        }

        // Resolution priority: deleted target, then observed membership,
        // then timeout.
        let timeout = self.config.timing.pending_join_timeout;
        let local = self.local_peer;
        let registry = &self.registry;
        let mut resolved: Vec<(RequestId, RoomId, EnterResponse)> = Vec::new();
        self.pending.joins.retain(|join| {
            let lobby = registry.find(join.room);
            let outcome = match lobby {
                Some(l) if l.deleted => Some(EnterResponse::DoesNotExist),
                Some(l) if l.is_member(local) => Some(EnterResponse::Success),
                _ if now.duration_since(join.requested_at) >= timeout => {
                    Some(EnterResponse::DoesNotExist)
                }
                _ => None,
            };
            match outcome {
                Some(response) => {
                    resolved.push((join.request, join.room, response));
                    false
                }
                None => true,
            }
        });

        for (request, room, response) in resolved {
            debug!(request, room = %room, ?response, "join resolved");
            self.events.emit_now(
                Event::complete(
                    request,
                    EventKind::LobbyEntered {
                        room,
                        response,
                        locked: false,
                    },
                ),
                now,
            );
            if response == EnterResponse::Success {
                self.emit_data_update(room, UpdateSubject::Lobby, true, Duration::ZERO, false);
            }
        }
    }

    fn resolve_data_requests(&mut self, now: Instant) {
        let timeout = self.config.timing.data_request_timeout;
        let mut resolved: Vec<(RoomId, bool)> = Vec::new();
        let registry = &self.registry;
        self.pending.data_requests.retain(|req| {
            if registry.find(req.room).is_some() {
                resolved.push((req.room, true));
                false
            } else if now.duration_since(req.requested_at) >= timeout {
                resolved.push((req.room, false));
                false
            } else {
                true
            }
        });

        for (room, success) in resolved {
            self.emit_data_update(room, UpdateSubject::Lobby, success, Duration::ZERO, false);
        }
    }

    // =========================================================================
    // INBOUND
    // =========================================================================

    /// Decode and handle a raw envelope from the transport.
    pub fn handle_bytes(&mut self, bytes: &[u8]) -> Result<(), LobbyError> {
        let envelope = Envelope::from_bytes(bytes)?;
        self.handle_envelope(envelope);
        Ok(())
    }

    /// Handle one inbound envelope. Called by the embedding application
    /// for every message the transport delivers, in arrival order.
    pub fn handle_envelope(&mut self, envelope: Envelope) {
        match envelope.payload {
            Payload::Snapshot(snapshot) => self.reconcile_snapshot(snapshot),
            Payload::Lobby(message) => self.handle_lobby_message(envelope.source, message),
            Payload::Notice(TransportNotice::Disconnect) => self.handle_disconnect(envelope.source),
            Payload::Notice(TransportNotice::Connect) => {}
        }
        self.purge_lobbies();
    }

    /// Reconcile an inbound full-lobby snapshot against the local copy:
    /// compute every notification from the old/new diff first, then
    /// replace the local copy wholesale.
    fn reconcile_snapshot(&mut self, incoming: Lobby) {
        if incoming.owner == self.local_peer {
            // Our own broadcast reflected back; we are authoritative.
            return;
        }
        if incoming.app_id != self.config.app_id {
            debug!(room = %incoming.room_id, app = %incoming.app_id, "snapshot for foreign app ignored");
            return;
        }

        let room = incoming.room_id;
        let old = match self.registry.find(room) {
            Some(local) => {
                if local.deleted {
                    return;
                }
                local.clone()
            }
            None => Lobby::placeholder(room),
        };

        if old == incoming {
            return;
        }

        let we_are_in = old.is_member(self.local_peer);
        if we_are_in {
            self.emit_data_update(room, UpdateSubject::Lobby, true, Duration::ZERO, false);
        }

        // Departures and per-member changes, diffed from the old copy.
        for member in &old.members {
            match incoming.member(member.id) {
                None => {
                    if we_are_in {
                        self.emit_member_event(
                            room,
                            member.id,
                            MemberChange::Left,
                            Duration::from_millis(200),
                        );
                    }
                }
                Some(updated) => {
                    if we_are_in && updated.metadata != member.metadata {
                        self.emit_data_update(
                            room,
                            UpdateSubject::Member(member.id),
                            true,
                            Duration::ZERO,
                            false,
                        );
                    }
                }
            }
        }

        // Arrivals, including our own join completing.
        let mut joined = false;
        for member in &incoming.members {
            if old.member(member.id).is_some() {
                continue;
            }
            if member.id == self.local_peer {
                let completions: Vec<RequestId> = self
                    .pending
                    .joins
                    .iter()
                    .filter(|j| j.room == room)
                    .map(|j| j.request)
                    .collect();
                self.pending.joins.retain(|j| j.room != room);
                let now = self.now();
                for request in completions {
                    joined = true;
                    self.events.emit_now(
                        Event::complete(
                            request,
                            EventKind::LobbyEntered {
                                room,
                                response: EnterResponse::Success,
                                locked: false,
                            },
                        ),
                        now,
                    );
                }
                if joined {
                    self.on_self_enter_leave(room, incoming.kind, false);
                    self.emit_data_update(room, UpdateSubject::Lobby, true, Duration::ZERO, false);
                }
            } else if we_are_in {
                self.emit_member_event(room, member.id, MemberChange::Entered, Duration::ZERO);
            }
        }

        // Game-server association changes, detected via the counter.
        let old_updates = old.game_server.map(|g| g.num_updates).unwrap_or(0);
        let new_updates = incoming.game_server.map(|g| g.num_updates).unwrap_or(0);
        if (joined && new_updates != 0) || (we_are_in && old_updates != new_updates) {
            if let Some(server) = incoming.game_server {
                let now = self.now();
                self.events.emit_now(
                    Event::notify(EventKind::GameServerSet {
                        room,
                        server: server.server_id,
                        ip: server.ip,
                        port: server.port,
                    }),
                    now,
                );
                self.emit_data_update(room, UpdateSubject::Lobby, true, Duration::ZERO, false);
            }
        }

        *self.registry.find_or_placeholder(room) = incoming;
    }

    /// Apply one lobby protocol message per the authority rules: the
    /// owner is the only peer that acts on mutation requests; `Leave`
    /// and `ChangeOwner` are honored by every recipient.
    fn handle_lobby_message(&mut self, source: PeerId, message: LobbyMessage) {
        let room = message.room;

        if let LobbyMessageKind::Invite = message.kind {
            let now = self.now();
            self.events
                .emit_now(Event::notify(EventKind::InviteReceived { room, from: source }), now);
            return;
        }

        let (we_are_in, is_owner, accepts_joins) = match self.registry.find(room) {
            Some(lobby) if !lobby.deleted => (
                lobby.is_member(self.local_peer),
                lobby.owner == self.local_peer,
                lobby.joinable && lobby.has_free_slot(),
            ),
            _ => return,
        };

        match message.kind {
            LobbyMessageKind::Join => {
                if !is_owner {
                    return;
                }
                if !accepts_joins {
                    debug!(room = %room, joiner = %source, "join refused (closed or full)");
                    return;
                }
                let added = self
                    .registry
                    .find_mut(room)
                    .map(|l| l.add_member(source))
                    .unwrap_or(false);
                if added {
                    debug!(room = %room, joiner = %source, "member joined");
                    self.emit_member_event(
                        room,
                        source,
                        MemberChange::Entered,
                        Duration::from_millis(10),
                    );
                    self.broadcast_snapshot(room);
                }
            }
            LobbyMessageKind::MemberData { values } => {
                if !is_owner {
                    return;
                }
                let applied = self
                    .registry
                    .find_mut(room)
                    .and_then(|l| l.member_mut(source))
                    .map(|member| {
                        for (key, value) in &values {
                            member.metadata.set(key, value);
                        }
                    })
                    .is_some();
                if applied {
                    self.emit_data_update(
                        room,
                        UpdateSubject::Member(source),
                        true,
                        Duration::ZERO,
                        true,
                    );
                }
            }
            LobbyMessageKind::LobbyData { values } => {
                if !is_owner {
                    return;
                }
                let changed = self
                    .registry
                    .find_mut(room)
                    .map(|l| {
                        let mut changed = false;
                        for (key, value) in &values {
                            changed |= l.metadata.set(key, value);
                        }
                        changed
                    })
                    .unwrap_or(false);
                if changed {
                    self.emit_data_update(
                        room,
                        UpdateSubject::Lobby,
                        true,
                        Duration::from_millis(5),
                        true,
                    );
                }
            }
            LobbyMessageKind::Leave => {
                let removed = self
                    .registry
                    .find_mut(room)
                    .map(|l| l.remove_member(source))
                    .unwrap_or(false);
                if removed {
                    debug!(room = %room, leaver = %source, "member left");
                    if we_are_in {
                        self.emit_member_event(
                            room,
                            source,
                            MemberChange::Left,
                            Duration::from_millis(200),
                        );
                    }
                    if is_owner {
                        self.broadcast_snapshot(room);
                    }
                }
            }
            LobbyMessageKind::ChangeOwner { new_owner } => {
                if let Some(lobby) = self.registry.find_mut(room) {
                    lobby.owner = new_owner;
                }
                if we_are_in {
                    self.emit_data_update(room, UpdateSubject::Lobby, true, Duration::ZERO, false);
                }
            }
            LobbyMessageKind::Chat { payload } => {
                if we_are_in {
                    let index = self.chat.append(ChatEntry {
                        room,
                        sender: source,
                        kind: ChatKind::Message,
                        payload,
                    });
                    let now = self.now();
                    self.events.emit_now(
                        Event::notify(EventKind::ChatReceived {
                            room,
                            sender: source,
                            index,
                        }),
                        now,
                    );
                }
            }
            // Handled before the lobby lookup above.
            LobbyMessageKind::Invite => {}
        }
    }

    /// Sweep a vanished peer out of every known lobby.
    fn handle_disconnect(&mut self, peer: PeerId) {
        debug!(peer = %peer, "transport disconnect");
        let affected: Vec<RoomId> = self
            .registry
            .iter_mut()
            .filter_map(|l| l.remove_member(peer).then_some(l.room_id))
            .collect();
        for room in affected {
            self.emit_member_event(room, peer, MemberChange::Left, Duration::ZERO);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::clock::ManualClock;
    use crate::network::transport::LoopbackHub;

    const APP: AppId = AppId(480);

    /// Shared loopback network and clock for a multi-peer scenario.
    struct Net {
        hub: LoopbackHub,
        clock: ManualClock,
    }

    impl Net {
        fn new() -> Self {
            Self {
                hub: LoopbackHub::new(),
                clock: ManualClock::new(),
            }
        }

        fn peer(&self, id: u64) -> LobbyService {
            self.peer_with(id, ServiceConfig::new(APP))
        }

        fn peer_with(&self, id: u64, config: ServiceConfig) -> LobbyService {
            let peer = PeerId::new(id);
            LobbyService::with_clock(
                peer,
                config,
                Box::new(self.hub.register(peer)),
                Box::new(self.clock.clone()),
            )
        }

        /// Deliver everything queued for `service`, in arrival order.
        fn pump(&self, service: &mut LobbyService) {
            for envelope in self.hub.drain(service.local_peer()) {
                service.handle_envelope(envelope);
            }
        }

        fn advance(&self, d: Duration) {
            self.clock.advance(d);
        }
    }

    /// Drive a create to completion and return the new room id.
    fn create_room(net: &Net, service: &mut LobbyService, kind: LobbyKind) -> RoomId {
        let request = service.create_lobby(kind, 0);
        net.advance(Duration::from_millis(70));
        service.tick();
        let events = service.poll_events();
        events
            .iter()
            .find_map(|e| match e.kind {
                EventKind::LobbyCreated { room } if e.request == Some(request) => room,
                _ => None,
            })
            .expect("create did not complete")
    }

    /// Join `room` end to end: B sends, the owner accepts and
    /// rebroadcasts, B reconciles.
    fn join_room(net: &Net, owner: &mut LobbyService, joiner: &mut LobbyService, room: RoomId) {
        joiner.join_lobby(room);
        net.pump(owner);
        net.pump(joiner);
        joiner.poll_events();
        owner.poll_events();
    }

    #[test]
    fn create_completes_only_after_delay() {
        let net = Net::new();
        let mut a = net.peer(1);

        let request = a.create_lobby(LobbyKind::Public, 4);
        a.tick();
        assert!(a.poll_events().is_empty());

        net.advance(Duration::from_millis(70));
        a.tick();
        let events = a.poll_events();

        let room = events
            .iter()
            .find_map(|e| match e.kind {
                EventKind::LobbyCreated { room } if e.request == Some(request) => room,
                _ => None,
            })
            .expect("missing create completion");
        assert!(events.iter().any(|e| matches!(
            e.kind,
            EventKind::LobbyEntered { response: EnterResponse::Success, .. }
        )));
        assert_eq!(a.member_count(room), 1);
        assert_eq!(a.member_by_index(room, 0), Some(PeerId::new(1)));
        assert_eq!(a.lobby_owner(room), Some(PeerId::new(1)));
        assert_eq!(a.current_lobby(), Some(room));
        assert_eq!(a.member_limit(room), 4);
    }

    #[test]
    fn disabled_creation_fails_without_a_lobby() {
        let net = Net::new();
        let mut config = ServiceConfig::new(APP);
        config.disable_lobby_creation = true;
        let mut a = net.peer_with(1, config);

        let request = a.create_lobby(LobbyKind::Public, 0);
        net.advance(Duration::from_millis(70));
        a.tick();
        let events = a.poll_events();

        assert!(events.iter().any(|e| {
            e.request == Some(request) && matches!(e.kind, EventKind::LobbyCreated { room: None })
        }));
        assert!(!events
            .iter()
            .any(|e| matches!(e.kind, EventKind::LobbyEntered { .. })));
        assert_eq!(a.current_lobby(), None);
    }

    #[test]
    fn invisible_lobby_does_not_occupy_presence_slot() {
        let net = Net::new();
        let mut a = net.peer(1);
        let room = create_room(&net, &mut a, LobbyKind::Invisible);
        assert_eq!(a.current_lobby(), None);
        assert_eq!(a.member_count(room), 1);
    }

    #[test]
    fn join_over_loopback_succeeds() {
        let net = Net::new();
        let mut a = net.peer(1);
        let mut b = net.peer(2);

        let room = create_room(&net, &mut a, LobbyKind::Public);
        net.pump(&mut b); // creation-tick snapshot

        let request = b.join_lobby(room);
        net.pump(&mut a); // owner accepts, rebroadcasts
        net.pump(&mut b); // joiner reconciles its own membership

        let events = b.poll_events();
        let completions: Vec<_> = events
            .iter()
            .filter(|e| e.request == Some(request))
            .collect();
        assert_eq!(completions.len(), 1);
        assert!(matches!(
            completions[0].kind,
            EventKind::LobbyEntered { response: EnterResponse::Success, .. }
        ));
        assert_eq!(b.member_count(room), 2);
        assert_eq!(b.current_lobby(), Some(room));

        // Owner saw the member arrive.
        net.advance(Duration::from_millis(300));
        let owner_events = a.poll_events();
        assert!(owner_events.iter().any(|e| matches!(
            e.kind,
            EventKind::MemberEvent { member, change: MemberChange::Entered, .. }
                if member == PeerId::new(2)
        )));
        assert_eq!(a.member_count(room), 2);
    }

    #[test]
    fn join_is_idempotent_per_target() {
        let net = Net::new();
        let mut b = net.peer(2);
        let room = RoomId::new(0xDEAD);

        let first = b.join_lobby(room);
        let second = b.join_lobby(room);
        assert_eq!(first, second);
    }

    #[test]
    fn unreachable_join_times_out_with_one_failure() {
        let net = Net::new();
        let mut b = net.peer(2);
        let room = RoomId::new(0xDEAD);

        let request = b.join_lobby(room);
        b.tick();
        assert!(b.poll_events().is_empty());

        net.advance(Duration::from_secs(10));
        b.tick();
        b.tick();
        let events = b.poll_events();

        let completions: Vec<_> = events
            .iter()
            .filter(|e| e.request == Some(request))
            .collect();
        assert_eq!(completions.len(), 1);
        assert!(matches!(
            completions[0].kind,
            EventKind::LobbyEntered { response: EnterResponse::DoesNotExist, .. }
        ));
    }

    #[test]
    fn join_refused_while_unjoinable() {
        let net = Net::new();
        let mut a = net.peer(1);
        let mut b = net.peer(2);

        let room = create_room(&net, &mut a, LobbyKind::Public);
        assert!(a.set_lobby_joinable(room, false));
        net.pump(&mut b);

        let request = b.join_lobby(room);
        net.pump(&mut a);
        net.pump(&mut b);
        assert_eq!(a.member_count(room), 1);

        net.advance(Duration::from_secs(10));
        b.tick();
        let events = b.poll_events();
        assert!(events.iter().any(|e| {
            e.request == Some(request)
                && matches!(
                    e.kind,
                    EventKind::LobbyEntered { response: EnterResponse::DoesNotExist, .. }
                )
        }));
    }

    #[test]
    fn owner_leave_hands_off_to_first_member() {
        let net = Net::new();
        let mut a = net.peer(1);
        let mut b = net.peer(2);
        let mut c = net.peer(3);

        let room = create_room(&net, &mut a, LobbyKind::Public);
        net.pump(&mut b);
        net.pump(&mut c);
        join_room(&net, &mut a, &mut b, room);
        net.pump(&mut c); // c sees the rebroadcast
        join_room(&net, &mut a, &mut c, room);
        net.pump(&mut b);
        assert_eq!(a.member_count(room), 3);

        a.leave_lobby(room);
        net.pump(&mut b);
        net.pump(&mut c);

        // Successor is the previously-first non-owner member, and the
        // owner-is-a-member invariant holds on every surviving copy.
        assert_eq!(b.lobby_owner(room), Some(PeerId::new(2)));
        assert_eq!(c.lobby_owner(room), Some(PeerId::new(2)));
        assert_eq!(b.member_count(room), 2);
        assert!(b.lobby(room).unwrap().is_member(PeerId::new(2)));
        assert!(!b.lobby(room).unwrap().deleted);
        assert_eq!(a.current_lobby(), None);

        net.advance(Duration::from_millis(300));
        let events = b.poll_events();
        assert!(events.iter().any(|e| matches!(
            e.kind,
            EventKind::MemberEvent { member, change: MemberChange::Left, .. }
                if member == PeerId::new(1)
        )));
    }

    #[test]
    fn solo_owner_leave_deletes_then_purges() {
        let net = Net::new();
        let mut a = net.peer(1);

        let room = create_room(&net, &mut a, LobbyKind::Public);
        a.leave_lobby(room);

        let lobby = a.lobby(room).unwrap();
        assert!(lobby.deleted);
        assert!(lobby.deleted_at > 0);
        assert_eq!(a.current_lobby(), None);

        a.tick();
        assert!(a.lobby(room).is_some(), "still in grace period");

        net.advance(Duration::from_secs(3));
        a.tick();
        assert!(a.lobby(room).is_none(), "purged after grace");
    }

    #[test]
    fn repeated_snapshot_is_a_no_op() {
        let net = Net::new();
        let mut a = net.peer(1);
        let mut b = net.peer(2);

        let room = create_room(&net, &mut a, LobbyKind::Public);
        net.pump(&mut b);
        join_room(&net, &mut a, &mut b, room);

        a.set_lobby_data(room, "map", "relay");
        let snapshot = a.lobby(room).unwrap().clone();
        let envelope = Envelope::broadcast(PeerId::new(1), Payload::Snapshot(snapshot));

        b.handle_envelope(envelope.clone());
        net.advance(Duration::from_millis(300));
        assert!(!b.poll_events().is_empty());

        b.handle_envelope(envelope);
        net.advance(Duration::from_millis(300));
        assert!(b.poll_events().is_empty());
    }

    #[test]
    fn numeric_search_matches_exact_slots_only() {
        let net = Net::new();
        let mut a = net.peer(1);
        let mut b = net.peer(2);

        let two = create_room(&net, &mut a, LobbyKind::Public);
        let three = create_room(&net, &mut a, LobbyKind::Public);
        a.set_lobby_data(two, "slots", "2");
        a.set_lobby_data(three, "slots", "3");
        net.pump(&mut b);

        b.add_numeric_filter("slots", 2, Comparison::Equal);
        let request = b.request_lobby_list();
        b.tick();
        net.advance(Duration::from_millis(200));
        b.tick();

        let events = b.poll_events();
        assert!(events.iter().any(|e| {
            e.request == Some(request) && matches!(e.kind, EventKind::SearchFinished { count: 1 })
        }));
        assert_eq!(b.lobby_by_index(0), Some(two));
        assert_eq!(b.lobby_by_index(1), None);
    }

    #[test]
    fn search_never_matches_missing_key() {
        let net = Net::new();
        let mut a = net.peer(1);
        let mut b = net.peer(2);

        create_room(&net, &mut a, LobbyKind::Public);
        net.pump(&mut b);

        b.add_numeric_filter("slots", 2, Comparison::Equal);
        b.request_lobby_list();
        b.tick();
        net.advance(Duration::from_millis(200));
        b.tick();

        let events = b.poll_events();
        assert!(events
            .iter()
            .any(|e| matches!(e.kind, EventKind::SearchFinished { count: 0 })));
    }

    #[test]
    fn search_cap_concludes_immediately() {
        let net = Net::new();
        let mut a = net.peer(1);
        let mut b = net.peer(2);

        create_room(&net, &mut a, LobbyKind::Public);
        create_room(&net, &mut a, LobbyKind::Public);
        net.pump(&mut b);

        b.set_max_results(1);
        let request = b.request_lobby_list();
        b.tick();

        let events = b.poll_events();
        assert!(events.iter().any(|e| {
            e.request == Some(request) && matches!(e.kind, EventKind::SearchFinished { count: 1 })
        }));

        // No second completion, ever.
        net.advance(Duration::from_secs(1));
        b.tick();
        assert!(!b
            .poll_events()
            .iter()
            .any(|e| matches!(e.kind, EventKind::SearchFinished { .. })));
    }

    #[test]
    fn new_search_abandons_unfinished_one() {
        let net = Net::new();
        let mut b = net.peer(2);

        let first = b.request_lobby_list();
        b.tick();
        let second = b.request_lobby_list();
        net.advance(Duration::from_millis(200));
        b.tick();

        let events = b.poll_events();
        assert!(!events.iter().any(|e| e.request == Some(first)));
        assert!(events.iter().any(|e| e.request == Some(second)));
    }

    #[test]
    fn member_data_delegates_through_owner() {
        let net = Net::new();
        let mut a = net.peer(1);
        let mut b = net.peer(2);

        let room = create_room(&net, &mut a, LobbyKind::Public);
        net.pump(&mut b);
        join_room(&net, &mut a, &mut b, room);

        b.set_member_data(room, "ready", "1");
        // Own writes are visible locally before the owner applies them.
        assert_eq!(b.member_data(room, PeerId::new(2), "ready"), "1");

        net.pump(&mut a);
        assert_eq!(a.member_data(room, PeerId::new(2), "ready"), "1");
        net.advance(Duration::from_millis(300));
        assert!(a.poll_events().iter().any(|e| matches!(
            e.kind,
            EventKind::DataUpdated { subject: UpdateSubject::Member(m), .. }
                if m == PeerId::new(2)
        )));

        // The owner's rebroadcast carries the consolidated state.
        net.pump(&mut b);
        assert_eq!(
            b.lobby(room)
                .unwrap()
                .member(PeerId::new(2))
                .unwrap()
                .metadata
                .get("ready"),
            Some("1")
        );
    }

    #[test]
    fn lobby_data_delegates_through_owner() {
        let net = Net::new();
        let mut a = net.peer(1);
        let mut b = net.peer(2);

        let room = create_room(&net, &mut a, LobbyKind::Public);
        net.pump(&mut b);
        join_room(&net, &mut a, &mut b, room);

        assert!(b.set_lobby_data(room, "map", "dust"));
        assert_eq!(b.lobby_data(room, "map"), "", "not applied locally");

        net.pump(&mut a);
        assert_eq!(a.lobby_data(room, "map"), "dust");

        net.pump(&mut b);
        assert_eq!(b.lobby_data(room, "map"), "dust");
        net.advance(Duration::from_millis(300));
        assert!(b.poll_events().iter().any(|e| matches!(
            e.kind,
            EventKind::DataUpdated { subject: UpdateSubject::Lobby, .. }
        )));
    }

    #[test]
    fn owner_metadata_write_is_case_insensitive_upsert() {
        let net = Net::new();
        let mut a = net.peer(1);
        let room = create_room(&net, &mut a, LobbyKind::Public);

        assert!(a.set_lobby_data(room, "Map", "dust"));
        assert!(a.set_lobby_data(room, "MAP", "relay"));

        assert_eq!(a.lobby_data_count(room), 1);
        assert_eq!(a.lobby_data(room, "map"), "relay");
        assert_eq!(a.lobby_data_by_index(room, 0), Some(("Map", "relay")));
    }

    #[test]
    fn non_owner_direct_mutations_are_refused() {
        let net = Net::new();
        let mut a = net.peer(1);
        let mut b = net.peer(2);

        let room = create_room(&net, &mut a, LobbyKind::Public);
        net.pump(&mut b);
        join_room(&net, &mut a, &mut b, room);

        assert!(!b.set_member_limit(room, 8));
        assert!(!b.set_lobby_joinable(room, false));
        assert!(!b.set_lobby_kind(room, LobbyKind::Private));
        assert!(!b.delete_lobby_data(room, "map"));
        assert!(!b.set_lobby_owner(room, PeerId::new(2)));
        assert!(!b.set_game_server(room, PeerId::new(9), Ipv4Addr::new(10, 0, 0, 1), 27015));
    }

    #[test]
    fn chat_reaches_every_member_including_sender() {
        let net = Net::new();
        let mut a = net.peer(1);
        let mut b = net.peer(2);

        let room = create_room(&net, &mut a, LobbyKind::Public);
        net.pump(&mut b);
        join_room(&net, &mut a, &mut b, room);

        assert!(b.send_chat(room, b"gg"));
        net.pump(&mut a);
        net.pump(&mut b);

        for service in [&mut a, &mut b] {
            let events = service.poll_events();
            let index = events
                .iter()
                .find_map(|e| match e.kind {
                    EventKind::ChatReceived { sender, index, .. } if sender == PeerId::new(2) => {
                        Some(index)
                    }
                    _ => None,
                })
                .expect("missing chat event");
            let entry = service.chat_entry(room, index).unwrap();
            assert_eq!(entry.payload, b"gg");
            assert_eq!(entry.sender, PeerId::new(2));
        }
    }

    #[test]
    fn game_server_change_propagates_via_counter() {
        let net = Net::new();
        let mut a = net.peer(1);
        let mut b = net.peer(2);

        let room = create_room(&net, &mut a, LobbyKind::Public);
        net.pump(&mut b);
        join_room(&net, &mut a, &mut b, room);

        let ip = Ipv4Addr::new(10, 0, 0, 7);
        assert!(a.set_game_server(room, PeerId::new(9), ip, 27015));
        assert_eq!(a.game_server(room).unwrap().num_updates, 1);
        assert!(a
            .poll_events()
            .iter()
            .any(|e| matches!(e.kind, EventKind::GameServerSet { .. })));

        // Non-owners learn on the next periodic snapshot.
        net.advance(Duration::from_secs(5));
        a.tick();
        net.pump(&mut b);

        let events = b.poll_events();
        assert!(events.iter().any(|e| matches!(
            e.kind,
            EventKind::GameServerSet { server, port: 27015, .. } if server == PeerId::new(9)
        )));
        assert_eq!(b.game_server(room).unwrap().ip, ip);
    }

    #[test]
    fn disconnect_sweeps_peer_from_membership() {
        let net = Net::new();
        let mut a = net.peer(1);
        let mut b = net.peer(2);

        let room = create_room(&net, &mut a, LobbyKind::Public);
        net.pump(&mut b);
        join_room(&net, &mut a, &mut b, room);
        assert_eq!(a.member_count(room), 2);

        net.hub.disconnect(PeerId::new(2));
        net.pump(&mut a);

        assert_eq!(a.member_count(room), 1);
        let events = a.poll_events();
        assert!(events.iter().any(|e| matches!(
            e.kind,
            EventKind::MemberEvent { member, change: MemberChange::Left, .. }
                if member == PeerId::new(2)
        )));
    }

    #[test]
    fn data_request_resolves_when_lobby_becomes_known() {
        let net = Net::new();
        let mut a = net.peer(1);
        let mut b = net.peer(2);

        let room = create_room(&net, &mut a, LobbyKind::Public);
        assert!(b.request_lobby_data(room));
        b.tick();
        assert!(b.poll_events().is_empty());

        net.advance(Duration::from_secs(5));
        a.tick();
        net.pump(&mut b);
        b.tick();

        let events = b.poll_events();
        assert!(events.iter().any(|e| matches!(
            e.kind,
            EventKind::DataUpdated { room: r, success: true, .. } if r == room
        )));
    }

    #[test]
    fn data_request_times_out_as_failure() {
        let net = Net::new();
        let mut b = net.peer(2);
        let room = RoomId::new(0xDEAD);

        assert!(b.request_lobby_data(room));
        net.advance(Duration::from_secs(6));
        b.tick();

        let events = b.poll_events();
        assert!(events.iter().any(|e| matches!(
            e.kind,
            EventKind::DataUpdated { room: r, success: false, .. } if r == room
        )));
    }

    #[test]
    fn invite_is_delivered_without_local_lobby_knowledge() {
        let net = Net::new();
        let mut a = net.peer(1);
        let mut b = net.peer(2);

        let room = create_room(&net, &mut a, LobbyKind::Private);
        assert!(a.invite_peer(room, PeerId::new(2)));
        net.pump(&mut b);

        let events = b.poll_events();
        assert!(events.iter().any(|e| matches!(
            e.kind,
            EventKind::InviteReceived { room: r, from } if r == room && from == PeerId::new(1)
        )));
    }

    #[test]
    fn owner_transfer_by_api_announces_to_members() {
        let net = Net::new();
        let mut a = net.peer(1);
        let mut b = net.peer(2);

        let room = create_room(&net, &mut a, LobbyKind::Public);
        net.pump(&mut b);
        join_room(&net, &mut a, &mut b, room);

        assert!(a.set_lobby_owner(room, PeerId::new(2)));
        assert_eq!(a.lobby_owner(room), Some(PeerId::new(2)));
        net.pump(&mut b);
        assert_eq!(b.lobby_owner(room), Some(PeerId::new(2)));
    }

    #[test]
    fn malformed_bytes_surface_a_decode_error() {
        let net = Net::new();
        let mut a = net.peer(1);
        assert!(a.handle_bytes(&[0xFF, 0x00, 0x13]).is_err());
    }

    #[test]
    fn accessors_tolerate_unknown_rooms() {
        let net = Net::new();
        let a = net.peer(1);
        let room = RoomId::new(0xDEAD);

        assert_eq!(a.member_count(room), 0);
        assert_eq!(a.member_by_index(room, 0), None);
        assert_eq!(a.lobby_data(room, "k"), "");
        assert_eq!(a.lobby_data_count(room), 0);
        assert_eq!(a.member_data(room, PeerId::new(1), "k"), "");
        assert_eq!(a.lobby_owner(room), None);
        assert_eq!(a.member_limit(room), 0);
        assert!(a.game_server(room).is_none());
        assert!(a.chat_entry(room, 0).is_none());
    }
}
