//! Protocol Core
//!
//! The lobby directory and synchronization logic. Everything
//! authoritative lives here; `network/` only moves bytes.
//!
//! ## Module Structure
//!
//! - `state`: replicated lobby entity and the local registry
//! - `events`: notifications, completions, chat log
//! - `filter`: search criteria evaluation
//! - `search`: directory search state machine
//! - `pending`: in-flight create/join/data-refresh tracking
//! - `service`: canonical API, tick driver, inbound handling
//! - `compat`: legacy call-shape facades
//! - `favorites`: legacy flat-file server list

pub mod compat;
pub mod events;
pub mod favorites;
pub mod filter;
pub mod pending;
pub mod search;
pub mod service;
pub mod state;

// Re-export key types
pub use events::{ChatEntry, EnterResponse, Event, EventKind, MemberChange, RequestId, UpdateSubject};
pub use filter::{Comparison, Criterion};
pub use service::{LobbyError, LobbyService, ServiceConfig, Timing};
pub use state::{GameServerInfo, Lobby, LobbyKind, Member};
