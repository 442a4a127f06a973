//! Lobby Mesh Demo
//!
//! Three in-process peers on the loopback transport walk through the
//! whole protocol: create, directory search, join, metadata, chat, and
//! an owner hand-off.

use std::time::Duration;

use anyhow::{bail, Result};
use tracing::{info, Level};
use tracing_subscriber::FmtSubscriber;

use lobby_mesh::{
    AppId, Comparison, EventKind, LobbyKind, LobbyService, LoopbackHub, PeerId, ServiceConfig,
    VERSION,
};

const APP: AppId = AppId(480);

fn peer(hub: &LoopbackHub, id: u64) -> LobbyService {
    let peer = PeerId::new(id);
    LobbyService::new(peer, ServiceConfig::new(APP), Box::new(hub.register(peer)))
}

/// Run a few tick rounds across every peer, returning all events raised.
async fn settle(
    hub: &LoopbackHub,
    peers: &mut [&mut LobbyService],
) -> Vec<lobby_mesh::Event> {
    let mut interval = tokio::time::interval(Duration::from_millis(25));
    let mut collected = Vec::new();
    for _ in 0..4 {
        interval.tick().await;
        for service in peers.iter_mut() {
            for envelope in hub.drain(service.local_peer()) {
                service.handle_envelope(envelope);
            }
            service.tick();
            collected.extend(service.poll_events());
        }
    }
    collected
}

#[tokio::main]
async fn main() -> Result<()> {
    let subscriber = FmtSubscriber::builder()
        .with_max_level(Level::INFO)
        .finish();
    tracing::subscriber::set_global_default(subscriber)?;

    info!("lobby-mesh demo v{VERSION}");

    let hub = LoopbackHub::new();
    let mut alice = peer(&hub, 0xA11);
    let mut bob = peer(&hub, 0xB0B);
    let mut carol = peer(&hub, 0xCA407);

    // Alice opens a public room and describes it.
    alice.create_lobby(LobbyKind::Public, 4);
    let mut created = None;
    for _ in 0..10 {
        let events = settle(&hub, &mut [&mut alice, &mut bob, &mut carol]).await;
        created = events.iter().find_map(|e| match e.kind {
            EventKind::LobbyCreated { room } => room,
            _ => None,
        });
        if created.is_some() {
            break;
        }
    }
    let Some(room) = created else {
        bail!("lobby creation did not complete");
    };
    info!(room = %room, "alice created a room");
    alice.set_lobby_data(room, "map", "relay");
    alice.set_lobby_data(room, "slots", "4");

    // Bob discovers it through the directory.
    bob.add_string_filter("map", "relay", Comparison::Equal);
    bob.request_lobby_list();
    let mut found = None;
    for _ in 0..10 {
        let events = settle(&hub, &mut [&mut alice, &mut bob, &mut carol]).await;
        if events
            .iter()
            .any(|e| matches!(e.kind, EventKind::SearchFinished { count } if count > 0))
        {
            found = bob.lobby_by_index(0);
            break;
        }
    }
    let Some(found) = found else {
        bail!("directory search found nothing");
    };
    info!(room = %found, "bob found the room by its metadata");

    // Bob and Carol join.
    bob.join_lobby(found);
    carol.join_lobby(found);
    for _ in 0..10 {
        settle(&hub, &mut [&mut alice, &mut bob, &mut carol]).await;
        if bob.member_count(found) == 3 && carol.member_count(found) == 3 {
            break;
        }
    }
    if bob.member_count(found) != 3 {
        bail!("joins did not converge");
    }
    info!(members = bob.member_count(found), "room is full of friends");

    // Member metadata and chat flow through the owner.
    bob.set_member_data(found, "ready", "1");
    bob.send_chat(found, b"glhf");
    let events = settle(&hub, &mut [&mut alice, &mut bob, &mut carol]).await;
    for event in &events {
        if let EventKind::ChatReceived { sender, index, .. } = event.kind {
            info!(sender = %sender, index, "chat delivered");
        }
    }

    // Alice walks away; ownership hands off to the first joiner.
    alice.leave_lobby(room);
    settle(&hub, &mut [&mut alice, &mut bob, &mut carol]).await;
    info!(
        owner = %bob.lobby_owner(found).map(|p| p.to_string()).unwrap_or_default(),
        members = bob.member_count(found),
        "owner left, room carried on"
    );

    Ok(())
}
