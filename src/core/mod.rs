//! Core primitives.
//!
//! Identifiers, the case-insensitive metadata map and the time source
//! abstraction. Everything here is deterministic and free of protocol
//! state.

pub mod clock;
pub mod id;
pub mod keymap;

// Re-export core types
pub use clock::{Clock, ManualClock, SystemClock};
pub use id::{AppId, PeerId, RoomId};
pub use keymap::KeyMap;
