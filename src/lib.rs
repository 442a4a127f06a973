//! # Lobby Mesh
//!
//! Peer-to-peer lobby directory and synchronization protocol: peers
//! discover, create, join, leave, and update small shared multiplayer
//! rooms with no central server. One peer per lobby is the **owner** and
//! is authoritative for that lobby's membership and metadata; everyone
//! else receives owner-broadcast snapshots and relays mutations through
//! the owner.
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │                        LOBBY MESH                            │
//! ├─────────────────────────────────────────────────────────────┤
//! │  core/           - Deterministic primitives                  │
//! │  ├── id.rs       - Peer / room / application identifiers     │
//! │  ├── keymap.rs   - Case-insensitive metadata map             │
//! │  └── clock.rs    - Time source abstraction                   │
//! │                                                              │
//! │  lobby/          - Protocol core (single logical actor)      │
//! │  ├── state.rs    - Replicated lobby entity + local registry  │
//! │  ├── events.rs   - Notifications, completions, chat log      │
//! │  ├── filter.rs   - Search criteria evaluation                │
//! │  ├── search.rs   - Directory search state machine            │
//! │  ├── pending.rs  - In-flight create/join/refresh tracking    │
//! │  ├── service.rs  - Canonical API, tick driver, reconciliation│
//! │  ├── compat.rs   - Legacy call-shape facades                 │
//! │  └── favorites.rs- Legacy flat-file server list              │
//! │                                                              │
//! │  network/        - Plumbing (non-authoritative)              │
//! │  ├── protocol.rs - Tagged envelope, JSON/bincode codecs      │
//! │  └── transport.rs- Transport trait + in-process loopback     │
//! └─────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Consistency Model
//!
//! The transport is best-effort: no delivery guarantee, no ordering
//! across independent messages. The protocol survives that by design:
//! owners rebroadcast full lobby snapshots on a fixed interval,
//! non-owners reconcile snapshots by diff-then-replace, and every
//! asynchronous request (create, join, search, data refresh) carries a
//! deadline that converts silence into exactly one failure completion.
//! There is no background execution: the embedding application drives
//! everything through [`LobbyService::tick`] and
//! [`LobbyService::handle_envelope`] on one logical actor.

#![warn(missing_docs)]
#![warn(clippy::all)]
#![deny(unsafe_code)]

pub mod core;
pub mod lobby;
pub mod network;

// Re-export commonly used types
pub use self::core::clock::{Clock, ManualClock, SystemClock};
pub use self::core::id::{AppId, PeerId, RoomId};
pub use self::core::keymap::KeyMap;
pub use lobby::events::{EnterResponse, Event, EventKind, MemberChange, RequestId, UpdateSubject};
pub use lobby::filter::Comparison;
pub use lobby::service::{LobbyError, LobbyService, ServiceConfig, Timing};
pub use lobby::state::{GameServerInfo, Lobby, LobbyKind, Member};
pub use network::protocol::{Envelope, LobbyMessage, LobbyMessageKind, Payload, TransportNotice};
pub use network::transport::{LoopbackHub, Transport};

/// Crate version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
