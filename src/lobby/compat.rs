//! Legacy API Facades
//!
//! Earlier revisions of the embedding SDK exposed the same capability
//! under older call shapes. Each facade is a thin adapter translating an
//! old shape onto the canonical operation set in `LobbyService`; none of
//! them hold state of their own.

use std::net::Ipv4Addr;

use crate::core::id::{PeerId, RoomId};
use crate::lobby::events::RequestId;
use crate::lobby::favorites::FavoritesStore;
use crate::lobby::filter::Comparison;
use crate::lobby::service::LobbyService;
use crate::lobby::state::LobbyKind;

/// First-revision call shapes.
pub struct MatchmakingV1<'a> {
    service: &'a mut LobbyService,
}

impl<'a> MatchmakingV1<'a> {
    /// Wrap the canonical service.
    pub fn new(service: &'a mut LobbyService) -> Self {
        Self { service }
    }

    /// Old create shape: a boolean picked between private and public,
    /// and there was no member limit.
    pub fn create_lobby(&mut self, private: bool) -> RequestId {
        let kind = if private {
            LobbyKind::Private
        } else {
            LobbyKind::Public
        };
        self.service.create_lobby(kind, 0)
    }

    /// Typed create without a member limit.
    pub fn create_lobby_typed(&mut self, kind: LobbyKind) -> RequestId {
        self.service.create_lobby(kind, 0)
    }

    /// Fire-and-forget join; the completion still arrives as an event.
    pub fn join_lobby(&mut self, room: RoomId) {
        self.service.join_lobby(room);
    }

    /// Search with inline equality filters instead of accumulated
    /// criteria calls.
    pub fn request_lobby_list_filtered(&mut self, filters: &[(&str, &str)]) -> RequestId {
        for (key, value) in filters {
            self.service.add_string_filter(key, value, Comparison::Equal);
        }
        self.service.request_lobby_list()
    }

    /// Old member-data shape reported success; the canonical call is
    /// infallible-by-contract, so this always reports `true`.
    pub fn set_member_data(&mut self, room: RoomId, key: &str, value: &str) -> bool {
        self.service.set_member_data(room, key, value);
        true
    }

    /// Invite under its first-revision name.
    pub fn invite_user_to_lobby(&mut self, room: RoomId, peer: PeerId) -> bool {
        self.service.invite_peer(room, peer)
    }
}

/// Favorites call shapes without the query-port argument newer
/// revisions grew.
pub struct FavoritesV1<'a> {
    store: &'a FavoritesStore,
}

impl<'a> FavoritesV1<'a> {
    /// Wrap the canonical store.
    pub fn new(store: &'a FavoritesStore) -> Self {
        Self { store }
    }

    /// Old add shape: no query port.
    pub fn add_favorite_game(&self, ip: Ipv4Addr, conn_port: u16, flags: u32) -> usize {
        self.store.add(ip, conn_port, flags)
    }

    /// Old remove shape: no query port.
    pub fn remove_favorite_game(&self, ip: Ipv4Addr, conn_port: u16, flags: u32) -> bool {
        self.store.remove(ip, conn_port, flags)
    }

    /// Old get shape returned only the favorites list.
    pub fn get_favorite_game(&self, index: usize) -> Option<(Ipv4Addr, u16)> {
        self.store.get(index)
    }

    /// Favorite count, unchanged across revisions.
    pub fn get_favorite_game_count(&self) -> usize {
        self.store.count()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::clock::ManualClock;
    use crate::core::id::AppId;
    use crate::lobby::favorites::FLAG_FAVORITE;
    use crate::lobby::service::ServiceConfig;
    use crate::network::transport::LoopbackHub;
    use std::time::Duration;

    fn service() -> (LoopbackHub, ManualClock, LobbyService) {
        let hub = LoopbackHub::new();
        let clock = ManualClock::new();
        let peer = PeerId::new(1);
        let service = LobbyService::with_clock(
            peer,
            ServiceConfig::new(AppId(480)),
            Box::new(hub.register(peer)),
            Box::new(clock.clone()),
        );
        (hub, clock, service)
    }

    #[test]
    fn v1_create_maps_private_flag_to_kind() {
        let (_hub, clock, mut service) = service();

        MatchmakingV1::new(&mut service).create_lobby(true);
        clock.advance(Duration::from_millis(70));
        service.tick();
        let events = service.poll_events();

        let room = events
            .iter()
            .find_map(|e| match e.kind {
                crate::lobby::events::EventKind::LobbyCreated { room } => room,
                _ => None,
            })
            .unwrap();
        assert_eq!(service.lobby(room).unwrap().kind, LobbyKind::Private);
        assert_eq!(service.member_limit(room), 0);
    }

    #[test]
    fn v1_filtered_search_translates_to_equality_criteria() {
        let (_hub, clock, mut service) = service();

        let request =
            MatchmakingV1::new(&mut service).request_lobby_list_filtered(&[("mode", "ffa")]);
        clock.advance(Duration::from_millis(200));
        service.tick();

        let events = service.poll_events();
        assert!(events.iter().any(|e| e.request == Some(request)));
    }

    #[test]
    fn v1_favorites_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let store = FavoritesStore::new(dir.path());
        let v1 = FavoritesV1::new(&store);

        let ip = Ipv4Addr::new(10, 0, 0, 1);
        assert_eq!(v1.add_favorite_game(ip, 27015, FLAG_FAVORITE), 1);
        assert_eq!(v1.get_favorite_game_count(), 1);
        assert_eq!(v1.get_favorite_game(0), Some((ip, 27015)));
        assert!(v1.remove_favorite_game(ip, 27015, FLAG_FAVORITE));
    }
}
