//! Network Layer
//!
//! The wire envelope and the transport collaborator boundary. Everything
//! here is **non-authoritative** plumbing; all protocol decisions live in
//! `lobby/`.

pub mod protocol;
pub mod transport;

pub use protocol::{Envelope, LobbyMessage, LobbyMessageKind, Payload, TransportNotice};
pub use transport::{LoopbackEndpoint, LoopbackHub, Transport};
