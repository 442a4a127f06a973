//! Directory Search
//!
//! One in-flight search over the local lobby directory. Criteria and the
//! result cap are snapshotted when the search begins; the tick driver
//! rescans the registry every pass until the cap is hit or the deadline
//! elapses, then emits exactly one completion.

use std::time::{Duration, Instant};

use crate::core::id::RoomId;
use crate::lobby::events::RequestId;
use crate::lobby::filter::{matches_all, Criterion};
use crate::lobby::state::Registry;

/// An in-flight directory search.
#[derive(Debug)]
pub struct SearchState {
    /// Completion token for the search result.
    pub request: RequestId,
    /// Criteria snapshot, immutable for the search's duration.
    pub criteria: Vec<Criterion>,
    /// Result-count cap snapshot.
    pub max_results: usize,
    /// Accumulated matching rooms, deduplicated, in registry order.
    pub results: Vec<RoomId>,
    /// When the search concludes regardless of results.
    pub deadline: Instant,
}

impl SearchState {
    /// Begin a search with snapshotted criteria.
    pub fn new(
        request: RequestId,
        criteria: Vec<Criterion>,
        max_results: usize,
        now: Instant,
        timeout: Duration,
    ) -> Self {
        Self {
            request,
            criteria,
            max_results,
            results: Vec::new(),
            deadline: now + timeout,
        }
    }

    /// Walk the registry once, accumulating matches. Returns `true` when
    /// the result cap was reached and the search must conclude now.
    ///
    /// Only joinable, non-deleted lobbies of a searchable kind are
    /// candidates. Lobbies that appear in the registry between passes are
    /// picked up on the next pass.
    pub fn scan(&mut self, registry: &Registry) -> bool {
        for lobby in registry.iter() {
            let candidate = lobby.joinable && lobby.kind.searchable() && !lobby.deleted;
            if candidate
                && matches_all(lobby, &self.criteria)
                && !self.results.contains(&lobby.room_id)
            {
                self.results.push(lobby.room_id);
            }
            if self.results.len() >= self.max_results {
                return true;
            }
        }
        false
    }

    /// Whether the search deadline has elapsed.
    pub fn expired(&self, now: Instant) -> bool {
        now >= self.deadline
    }
}
