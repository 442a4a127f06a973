//! Transport Abstraction
//!
//! The protocol core never talks to sockets. It hands outbound envelopes
//! to a `Transport` collaborator: best-effort unicast and broadcast, no
//! delivery or ordering guarantee. The periodic snapshot rebroadcast and
//! timeout fallbacks in the core are what make message loss survivable.
//!
//! `LoopbackHub` is the in-process implementation used by tests and the
//! demo binary: every registered peer gets an inbox, and sends are queue
//! pushes.

use std::collections::{HashMap, VecDeque};
use std::sync::{Arc, Mutex};

use crate::core::id::PeerId;
use crate::network::protocol::{Envelope, Payload, TransportNotice};

/// Best-effort message transport between peers.
pub trait Transport: Send {
    /// Unicast to one peer. Returns `false` if the send could not even be
    /// attempted (unknown peer, closed socket); delivery is never
    /// guaranteed either way.
    fn send(&mut self, to: PeerId, envelope: Envelope) -> bool;

    /// Best-effort send to every known related peer (not the local one).
    fn broadcast(&mut self, envelope: Envelope) -> bool;
}

// =============================================================================
// LOOPBACK HUB
// =============================================================================

#[derive(Debug, Default)]
struct HubInner {
    inboxes: HashMap<PeerId, VecDeque<Envelope>>,
}

/// In-process transport hub connecting any number of local peers.
#[derive(Clone, Debug, Default)]
pub struct LoopbackHub {
    inner: Arc<Mutex<HubInner>>,
}

impl LoopbackHub {
    /// Create an empty hub.
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a peer and get its transport endpoint.
    pub fn register(&self, peer: PeerId) -> LoopbackEndpoint {
        self.inner
            .lock()
            .expect("loopback lock poisoned")
            .inboxes
            .entry(peer)
            .or_default();
        LoopbackEndpoint {
            peer,
            inner: Arc::clone(&self.inner),
        }
    }

    /// Drain every envelope queued for `peer`, in arrival order.
    pub fn drain(&self, peer: PeerId) -> Vec<Envelope> {
        let mut inner = self.inner.lock().expect("loopback lock poisoned");
        match inner.inboxes.get_mut(&peer) {
            Some(queue) => queue.drain(..).collect(),
            None => Vec::new(),
        }
    }

    /// Drop a peer and tell everyone else it is gone.
    pub fn disconnect(&self, peer: PeerId) {
        let mut inner = self.inner.lock().expect("loopback lock poisoned");
        inner.inboxes.remove(&peer);
        let notice = Envelope::broadcast(peer, Payload::Notice(TransportNotice::Disconnect));
        for queue in inner.inboxes.values_mut() {
            queue.push_back(notice.clone());
        }
    }
}

/// One peer's handle onto a `LoopbackHub`.
#[derive(Debug)]
pub struct LoopbackEndpoint {
    peer: PeerId,
    inner: Arc<Mutex<HubInner>>,
}

impl Transport for LoopbackEndpoint {
    fn send(&mut self, to: PeerId, mut envelope: Envelope) -> bool {
        envelope.dest = Some(to);
        let mut inner = self.inner.lock().expect("loopback lock poisoned");
        match inner.inboxes.get_mut(&to) {
            Some(queue) => {
                queue.push_back(envelope);
                true
            }
            None => false,
        }
    }

    fn broadcast(&mut self, mut envelope: Envelope) -> bool {
        envelope.dest = None;
        let mut inner = self.inner.lock().expect("loopback lock poisoned");
        for (peer, queue) in inner.inboxes.iter_mut() {
            if *peer != self.peer {
                queue.push_back(envelope.clone());
            }
        }
        true
    }
}
