mod common;

use common::{make_session, make_session_with, record};
use meshsync_client::{ConflictMode, SendOptions, Session, SessionConfig};
use meshsync_shared::{Event, EventKind, InventoryItem, Vec3};
use meshsync_test::{pump, Fabric, SignalingHub};

fn potion(quantity: u32) -> InventoryItem {
    InventoryItem {
        id: "potion".to_string(),
        kind: "heal".to_string(),
        quantity,
    }
}

fn connect_pair(hub: &SignalingHub, fabric: &Fabric) -> (Session, Session) {
    let mut a = make_session(hub, fabric, "a");
    let mut b = make_session(hub, fabric, "b");
    a.start().unwrap();
    b.start().unwrap();
    pump(&mut [&mut a, &mut b], 0.0, 4);
    assert_eq!(a.peer_ids().unwrap().len(), 1);
    assert_eq!(b.peer_ids().unwrap().len(), 1);
    (a, b)
}

#[test]
fn moves_replicate_with_last_writer_wins() {
    let hub = SignalingHub::new();
    let fabric = Fabric::new();
    let (mut a, mut b) = connect_pair(&hub, &fabric);

    b.broadcast_move("b", Vec3::new(1.0, 1.0), None).unwrap();
    b.broadcast_move("b", Vec3::new(2.0, 2.0), None).unwrap();
    pump(&mut [&mut a, &mut b], 10.0, 2);

    let position = a.get_state().unwrap().players["b"].position;
    assert_eq!((position.x, position.y), (2.0, 2.0));
}

#[test]
fn transfer_converges_on_both_replicas_and_rejects_overdraw() {
    let hub = SignalingHub::new();
    let fabric = Fabric::new();
    let (mut a, mut b) = connect_pair(&hub, &fabric);

    a.update_inventory(vec![potion(2)]).unwrap();
    pump(&mut [&mut a, &mut b], 10.0, 2);
    assert_eq!(b.get_state().unwrap().inventories["a"][0].quantity, 2);

    a.transfer_item("b", potion(1)).unwrap();
    pump(&mut [&mut a, &mut b], 20.0, 2);

    for session in [&a, &b] {
        let state = session.get_state().unwrap();
        assert_eq!(state.inventories["a"], vec![potion(1)]);
        assert_eq!(state.inventories["b"], vec![potion(1)]);
    }

    // an overdraw is rejected identically everywhere
    a.transfer_item("b", potion(2)).unwrap();
    pump(&mut [&mut a, &mut b], 30.0, 2);
    for session in [&a, &b] {
        let state = session.get_state().unwrap();
        assert_eq!(state.inventories["a"], vec![potion(1)]);
        assert_eq!(state.inventories["b"], vec![potion(1)]);
    }
}

#[test]
fn snapshot_preserves_the_local_live_view() {
    let hub = SignalingHub::new();
    let fabric = Fabric::new();
    let (mut a, mut b) = connect_pair(&hub, &fabric);

    // b has an accepted, sequenced move of its own
    b.broadcast_move("b", Vec3::new(100.0, 100.0), None).unwrap();
    pump(&mut [&mut a, &mut b], 10.0, 2);

    // the host rebroadcasts a snapshot that places b elsewhere
    let mut rewritten = a.get_state().unwrap();
    rewritten.players.get_mut("b").unwrap().position = Vec3::new(0.0, 0.0);
    rewritten.players.insert(
        "ghost".to_string(),
        meshsync_shared::PlayerState {
            id: "ghost".to_string(),
            position: Vec3::new(7.0, 7.0),
            velocity: None,
        },
    );
    a.set_state_and_broadcast(rewritten).unwrap();
    pump(&mut [&mut a, &mut b], 20.0, 2);

    let state = b.get_state().unwrap();
    // b's own live view survives, everything else is taken from the snapshot
    let own = state.players["b"].position;
    assert_eq!((own.x, own.y), (100.0, 100.0));
    assert!(state.players.contains_key("ghost"));
}

#[test]
fn initial_join_accepts_the_hosts_placement() {
    let hub = SignalingHub::new();
    let fabric = Fabric::new();
    let mut a = make_session(&hub, &fabric, "a");
    a.start().unwrap();
    pump(&mut [&mut a], 0.0, 2);

    // the host seeds an entry for the not-yet-joined player
    let mut seeded = a.get_state().unwrap();
    seeded.players.insert(
        "b".to_string(),
        meshsync_shared::PlayerState {
            id: "b".to_string(),
            position: Vec3::new(1.0, 2.0),
            velocity: None,
        },
    );
    a.set_state_and_broadcast(seeded).unwrap();

    let mut b = make_session(&hub, &fabric, "b");
    b.start().unwrap();
    pump(&mut [&mut a, &mut b], 10.0, 6);

    // b never sent a sequenced message, so the join snapshot placed it
    let position = b.get_state().unwrap().players["b"].position;
    assert_eq!((position.x, position.y), (1.0, 2.0));
}

#[test]
fn channel_routing_matches_message_kinds() {
    let hub = SignalingHub::new();
    let fabric = Fabric::new();
    let (mut a, _b) = connect_pair(&hub, &fabric);

    let unreliable_before = fabric.frame_count("game-unreliable");
    let reliable_before = fabric.frame_count("game-reliable");

    a.broadcast_move("a", Vec3::new(1.0, 1.0), None).unwrap();
    assert_eq!(fabric.frame_count("game-unreliable"), unreliable_before + 1);
    assert_eq!(fabric.frame_count("game-reliable"), reliable_before);

    a.update_inventory(vec![potion(1)]).unwrap();
    assert_eq!(fabric.frame_count("game-unreliable"), unreliable_before + 1);
    assert_eq!(fabric.frame_count("game-reliable"), reliable_before + 1);

    // the per-call override flips routing once
    a.broadcast_payload(
        serde_json::json!({"emote": "wave"}),
        None,
        SendOptions { unreliable: true },
    )
    .unwrap();
    assert_eq!(fabric.frame_count("game-unreliable"), unreliable_before + 2);
    assert_eq!(fabric.frame_count("game-reliable"), reliable_before + 1);
}

#[test]
fn payloads_arrive_with_their_channel_tag() {
    let hub = SignalingHub::new();
    let fabric = Fabric::new();
    let (mut a, mut b) = connect_pair(&hub, &fabric);

    let payloads = record(&mut b, EventKind::SharedPayload);
    a.broadcast_payload(
        serde_json::json!({"vote": 1}),
        Some("lobby".to_string()),
        SendOptions::default(),
    )
    .unwrap();
    pump(&mut [&mut a, &mut b], 10.0, 2);

    let payloads = payloads.borrow();
    assert!(matches!(
        &payloads[..],
        [Event::SharedPayload { from, channel, payload }]
            if from == "a"
                && channel.as_deref() == Some("lobby")
                && payload["vote"] == serde_json::json!(1)
    ));
}

#[test]
fn deltas_replicate_paths_and_advance_tick() {
    let hub = SignalingHub::new();
    let fabric = Fabric::new();
    let (mut a, mut b) = connect_pair(&hub, &fabric);

    a.update_inventory(vec![potion(3)]).unwrap();
    pump(&mut [&mut a, &mut b], 10.0, 2);

    let deltas = record(&mut b, EventKind::StateDelta);
    a.broadcast_delta(&["inventories.a".to_string()]).unwrap();
    pump(&mut [&mut a, &mut b], 20.0, 2);

    assert_eq!(deltas.borrow().len(), 1);
    let state = b.get_state().unwrap();
    assert_eq!(state.inventories["a"], vec![potion(3)]);
    assert!(state.tick >= 1);
}

#[test]
fn authoritative_mode_ignores_non_authority_mutations() {
    let hub = SignalingHub::new();
    let fabric = Fabric::new();
    let config = SessionConfig {
        conflict_resolution: ConflictMode::Authoritative,
        ..SessionConfig::default()
    };
    let mut a = make_session_with(&hub, &fabric, "a", config.clone());
    let mut b = make_session_with(&hub, &fabric, "b", config);
    a.start().unwrap();
    b.start().unwrap();
    pump(&mut [&mut a, &mut b], 0.0, 4);
    // host "a" is the adopted authority on both sides
    assert_eq!(a.get_host_id().unwrap().as_deref(), Some("a"));

    b.broadcast_move("b", Vec3::new(9.0, 9.0), None).unwrap();
    a.broadcast_move("a", Vec3::new(4.0, 4.0), None).unwrap();
    pump(&mut [&mut a, &mut b], 10.0, 2);

    for session in [&a, &b] {
        let state = session.get_state().unwrap();
        assert!(!state.players.contains_key("b"));
        let host = state.players["a"].position;
        assert_eq!((host.x, host.y), (4.0, 4.0));
    }
}

#[test]
fn host_cleanup_removes_departed_players_everywhere() {
    let hub = SignalingHub::new();
    let fabric = Fabric::new();
    let config = SessionConfig {
        cleanup_on_peer_leave: true,
        ..SessionConfig::default()
    };
    let mut a = make_session_with(&hub, &fabric, "a", config.clone());
    let mut b = make_session_with(&hub, &fabric, "b", config.clone());
    let mut c = make_session_with(&hub, &fabric, "c", config);
    a.start().unwrap();
    b.start().unwrap();
    c.start().unwrap();
    pump(&mut [&mut a, &mut b, &mut c], 0.0, 6);

    b.broadcast_move("b", Vec3::new(5.0, 5.0), None).unwrap();
    pump(&mut [&mut a, &mut b, &mut c], 10.0, 2);
    assert!(c.get_state().unwrap().players.contains_key("b"));

    b.stop();
    pump(&mut [&mut a, &mut c], 20.0, 6);

    // the host deleted b's entries and broadcast the removal
    assert!(!a.get_state().unwrap().players.contains_key("b"));
    assert!(!c.get_state().unwrap().players.contains_key("b"));
}

#[test]
fn binary_min_scheme_replicates_like_json() {
    let hub = SignalingHub::new();
    let fabric = Fabric::new();
    let config = SessionConfig {
        serialization: meshsync_shared::Scheme::BinaryMin,
        ..SessionConfig::default()
    };
    let mut a = make_session_with(&hub, &fabric, "a", config.clone());
    let mut b = make_session_with(&hub, &fabric, "b", config);
    a.start().unwrap();
    b.start().unwrap();
    pump(&mut [&mut a, &mut b], 0.0, 4);

    b.broadcast_move("b", Vec3::new(8.0, 9.0), None).unwrap();
    pump(&mut [&mut a, &mut b], 10.0, 2);

    // frames ride as opaque byte buffers
    assert!(fabric
        .frames()
        .iter()
        .all(|frame| matches!(frame.payload, meshsync_shared::WirePayload::Binary(_))));
    let position = a.get_state().unwrap().players["b"].position;
    assert_eq!((position.x, position.y), (8.0, 9.0));
}

#[test]
fn every_outbound_mutation_carries_a_fresh_sequence_number() {
    let hub = SignalingHub::new();
    let fabric = Fabric::new();
    let (_a, mut b) = connect_pair(&hub, &fabric);

    b.broadcast_move("b", Vec3::new(1.0, 1.0), None).unwrap();
    b.broadcast_move("b", Vec3::new(2.0, 2.0), None).unwrap();
    b.update_inventory(vec![potion(1)]).unwrap();

    let seqs: Vec<u64> = fabric
        .frames()
        .iter()
        .filter_map(|frame| match &frame.payload {
            meshsync_shared::WirePayload::Text(text) => {
                let value: serde_json::Value = serde_json::from_str(text).ok()?;
                (value["from"] == serde_json::json!("b")).then(|| value["seq"].as_u64())?
            }
            meshsync_shared::WirePayload::Binary(_) => None,
        })
        .collect();

    assert_eq!(seqs, vec![1, 2, 3]);
}
