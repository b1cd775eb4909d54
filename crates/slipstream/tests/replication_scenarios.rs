//! # Replication Scenarios
//!
//! End-to-end checks of the replication guarantees, server and clients on
//! the loopback network:
//!
//! 1. **Creation before deltas**: full snapshot first, then updates that
//!    carry only the components that changed; updates for unseen entities
//!    are dropped, even when they overtake the creation
//! 2. **Deletes**: broadcast to everyone, unknown IDs ignored
//! 3. **Loss**: a lost update is repaired by the periodic refresh
//! 4. **Codec**: round trip onto an empty store, idempotent re-application,
//!    malformed counts close the connection
//! 5. **Events**: duplicated deliveries run handlers once
//! 6. **Sessions**: idle-pool reuse, inputs applied on the next tick only
//!
//! Run with: cargo test --test replication_scenarios

use std::sync::Arc;

use parking_lot::Mutex;
use slipstream_core::{EntityId, World};
use slipstream_net::{
    component_hash, decode_snapshot, encode_snapshot, ClientConfig, ClientInput, ClientState,
    IdRemap, LinkConditions, LocalEndpoint, LocalNetwork, MessageKind, ProtocolError,
    ReleasePolicy, ReplicationClient, ReplicationGroup, ReplicationServer, ServerConfig,
    SnapshotKind, Transport, TransportEvent, WireWriter,
};
use slipstream_shared::{
    game_components, racing_groups, register_entity_types, BlueprintConfig, CarBody, CarModel,
    ChunkData, CollisionEvent, Position, RaceSystems, RocketMotor, Rotation, Surface, Vec3,
    Velocity, RACE_CAR_TYPE, SIMPLE_ROCKET_TYPE, WORLD_CHUNK_TYPE,
};

/// Stock content plus a `SPECTATOR` type that no replication group selects,
/// so peers can watch without adding entities of their own.
const BLUEPRINTS: &str = r#"
[RACE_CAR]
position = [0.0, 0.0, 0.0]
rotation = [0.0, 0.0, 0.0, 1.0]
velocity = [0.0, 0.0, 0.0]
car = { model = "ROADSTER", color = "white", mass = 1000.0 }

[SIMPLE_ROCKET]
position = [0.0, 0.0, 0.0]
velocity = [0.0, 0.0, 0.0]
rocket = { fuel = 2.0, thrust = 30.0 }

[WORLD_CHUNK]
chunk = { coord = [0, 0, 0], heights = [0.0, 0.0, 0.0, 0.0, 0.0, 0.0, 0.0, 0.0, 0.0, 0.0, 0.0, 0.0, 0.0, 0.0, 0.0, 0.0] }

[SPECTATOR]
position = [0.0, 10.0, 0.0]
"#;

// ============================================================================
// HARNESS
// ============================================================================

fn blueprints() -> BlueprintConfig {
    BlueprintConfig::from_toml_str(BLUEPRINTS).unwrap()
}

fn server_with(
    network: &LocalNetwork,
    config: ServerConfig,
    groups: Vec<ReplicationGroup>,
) -> ReplicationServer<LocalEndpoint> {
    ReplicationServer::new(
        config,
        network.listen(),
        register_entity_types(&blueprints()).unwrap(),
        game_components(),
        groups,
    )
}

fn spectator_server(
    network: &LocalNetwork,
    groups: Vec<ReplicationGroup>,
) -> ReplicationServer<LocalEndpoint> {
    let config = ServerConfig {
        controlled_entity_type: "SPECTATOR".to_owned(),
        ..ServerConfig::default()
    };
    server_with(network, config, groups)
}

fn client(network: &LocalNetwork) -> ReplicationClient<LocalEndpoint> {
    ReplicationClient::new(
        &ClientConfig::default(),
        network.endpoint(),
        register_entity_types(&blueprints()).unwrap(),
        game_components(),
    )
}

/// Payloads waiting at a raw endpoint.
fn received(endpoint: &mut LocalEndpoint) -> Vec<Vec<u8>> {
    endpoint
        .poll_events()
        .into_iter()
        .filter_map(|event| match event {
            TransportEvent::Received { payload, .. } => Some(payload),
            _ => None,
        })
        .collect()
}

/// A store holding one of each stock entity type, with non-default values.
fn populated_world() -> (World, Vec<EntityId>) {
    let types = register_entity_types(&blueprints()).unwrap();
    let mut world = World::new();

    let car = types.instantiate(&mut world, RACE_CAR_TYPE);
    world.get_mut::<Position>(car).0 = Vec3::new(12.0, 0.5, -3.0);
    world.get_mut::<Velocity>(car).0 = Vec3::new(0.0, 0.0, 9.5);
    *world.get_mut::<CarBody>(car) = CarBody {
        model: CarModel::Rally,
        color: "midnight blue".to_owned(),
        mass: 1180.0,
    };

    let rocket = types.instantiate(&mut world, SIMPLE_ROCKET_TYPE);
    world.get_mut::<RocketMotor>(rocket).fuel = 0.75;
    world.get_mut::<Position>(rocket).0 = Vec3::new(1.0, 40.0, 2.0);

    let chunk = types.instantiate(&mut world, WORLD_CHUNK_TYPE);
    let data = world.get_mut::<ChunkData>(chunk);
    data.coord = [-2, 0, 5];
    for (i, height) in data.heights.iter_mut().enumerate() {
        *height = i as f32 * 0.25;
    }

    (world, vec![car, rocket, chunk])
}

// ============================================================================
// SCENARIO 1: CREATION BEFORE DELTAS
// ============================================================================

#[test]
fn scenario_full_snapshot_then_position_only_update() {
    let network = LocalNetwork::new();
    let mut server = spectator_server(&network, racing_groups());

    // Tick 1: the car exists before anyone is watching.
    assert_eq!(server.current_tick(), 1);
    let mut spawned = None;
    let report = server.tick(|ctx| spawned = Some(ctx.spawn(RACE_CAR_TYPE)));
    let car = spawned.unwrap();
    assert_eq!(report.snapshots, 0);

    // Tick 2: peer A has connected; its first snapshot is a full one per
    // group, and only the cars group has anything in it.
    let mut peer_a = network.endpoint();
    peer_a.connect().unwrap();
    server.poll_network();
    server.tick(|_| {});

    let messages = received(&mut peer_a);
    assert_eq!(messages.len(), 4);
    assert_eq!(messages[0][0], MessageKind::EntityIdAssignment.to_byte());
    assert_eq!(messages[1][0], MessageKind::RegistryFull.to_byte());

    let types = register_entity_types(&blueprints()).unwrap();
    let components = game_components();
    let mut mirror = World::new();
    let mut remap = IdRemap::new();
    for message in &messages[1..] {
        assert_eq!(message[0], MessageKind::RegistryFull.to_byte());
        decode_snapshot(&mut mirror, message, &types, &components, &mut remap).unwrap();
    }
    assert_eq!(mirror.alive_count(), 1);

    let local = remap.local(car.to_wire()).unwrap();
    assert_eq!(mirror.entity_type(local), Some(RACE_CAR_TYPE));
    assert_eq!(mirror.get::<CarBody>(local), server.world().get::<CarBody>(car));

    // Tick 3: only the position changes, and only the position travels,
    // although the group also replicates rotation and velocity.
    server.tick(|ctx| ctx.modify::<Position>(car).0.x = 5.0);

    let messages = received(&mut peer_a);
    assert_eq!(messages.len(), 1);
    let update = &messages[0];
    assert_eq!(update[0], MessageKind::RegistryComponentUpdate.to_byte());
    assert_eq!(update[1], 1);
    assert_eq!(&update[2..6], &component_hash::<Position>().to_le_bytes());
    // kind + header + count + wire id + 3 x f32
    assert_eq!(update.len(), 1 + 5 + 4 + 4 + 12);

    let report = decode_snapshot(&mut mirror, update, &types, &components, &mut remap).unwrap();
    assert_eq!(report.updated, 1);
    assert_eq!(mirror.get::<Position>(local).0, Vec3::new(5.0, 0.0, 0.0));
}

#[test]
fn entities_with_different_changes_get_separate_updates() {
    let network = LocalNetwork::new();
    let mut server = spectator_server(&network, racing_groups());
    let mut cars = Vec::new();
    server.tick(|ctx| {
        cars.push(ctx.spawn(RACE_CAR_TYPE));
        cars.push(ctx.spawn(RACE_CAR_TYPE));
        cars.push(ctx.spawn(RACE_CAR_TYPE));
    });

    let mut peer = network.endpoint();
    peer.connect().unwrap();
    server.poll_network();
    server.tick(|_| {});
    received(&mut peer);

    let report = server.tick(|ctx| {
        ctx.modify::<Position>(cars[0]).0.x = 1.0;
        ctx.modify::<Velocity>(cars[1]).0.z = 4.0;
        ctx.modify::<Position>(cars[2]).0.x = 2.0;
    });
    assert_eq!(report.dirty, 3);
    assert_eq!(report.snapshots, 2);

    let messages = received(&mut peer);
    assert_eq!(messages.len(), 2);
    // Position for two cars, then velocity for one.
    assert_eq!(&messages[0][2..6], &component_hash::<Position>().to_le_bytes());
    assert_eq!(messages[0].len(), 1 + 5 + 4 + 2 * (4 + 12));
    assert_eq!(&messages[1][2..6], &component_hash::<Velocity>().to_le_bytes());
    assert_eq!(messages[1].len(), 1 + 5 + 4 + (4 + 12));
}

#[test]
fn update_overtaking_its_creation_is_dropped() {
    let network = LocalNetwork::new();
    let mut server = spectator_server(&network, racing_groups());
    let mut peer = client(&network);
    peer.connect().unwrap();
    server.poll_network();
    server.tick(|_| {});
    peer.poll_network().unwrap();

    // The creation is held back in the network...
    network.set_conditions(LinkConditions {
        hold_back_every_nth_reliable: Some(1),
        ..LinkConditions::perfect()
    });
    let mut spawned = None;
    server.tick(|ctx| spawned = Some(ctx.spawn(RACE_CAR_TYPE)));
    let car = spawned.unwrap();

    // ...so the next tick's update reaches the peer first.
    network.set_conditions(LinkConditions::perfect());
    server.tick(|ctx| ctx.modify::<Position>(car).0.x = 8.0);

    peer.poll_network().unwrap();
    assert_eq!(peer.stats().dropped_updates, 1);
    assert_eq!(peer.stats().created, 1);
    assert!(peer.last_error().is_none());
    assert_eq!(peer.state(), ClientState::Connected);

    let local = peer.remap().local(car.to_wire()).unwrap();
    assert_eq!(peer.world().get::<Position>(local).0, Vec3::ZERO);

    // The next change carries the whole position again.
    server.tick(|ctx| ctx.modify::<Position>(car).0.z = 3.0);
    peer.poll_network().unwrap();
    assert_eq!(
        peer.world().get::<Position>(local),
        server.world().get::<Position>(car)
    );
}

#[test]
fn update_for_unseen_entity_is_dropped() {
    let (world, _) = populated_world();
    let components = game_components();
    let cars = &racing_groups()[0];
    let message = encode_snapshot(
        &world,
        &components,
        cars,
        SnapshotKind::ComponentUpdate,
        &cars.matching(&world, &components),
    );

    let types = register_entity_types(&blueprints()).unwrap();
    let mut mirror = World::new();
    let mut remap = IdRemap::new();
    let report = decode_snapshot(&mut mirror, &message, &types, &components, &mut remap).unwrap();

    assert_eq!(report.dropped, 1);
    assert!(report.created.is_empty());
    assert_eq!(mirror.alive_count(), 0);
    assert!(remap.is_empty());
}

// ============================================================================
// SCENARIO 2: DELETES
// ============================================================================

#[test]
fn scenario_delete_at_tick_five() {
    let network = LocalNetwork::new();
    let mut server = spectator_server(&network, racing_groups());

    let mut peer_a = client(&network);
    peer_a.connect().unwrap();
    server.poll_network();

    // Tick 1: A is watching when the car appears.
    let mut spawned = None;
    server.tick(|ctx| spawned = Some(ctx.spawn(RACE_CAR_TYPE)));
    let car = spawned.unwrap();
    peer_a.poll_network().unwrap();
    assert_eq!(peer_a.world().alive_count(), 1);

    for _ in 2..5 {
        server.tick(|_| {});
    }

    // B's connection is in flight during tick 5: its transport hears the
    // delete before its session exists.
    let mut peer_b = client(&network);
    peer_b.connect().unwrap();

    assert_eq!(server.current_tick(), 5);
    let report = server.tick(|ctx| {
        ctx.despawn(car);
    });
    assert_eq!(report.deleted, 1);

    peer_a.poll_network().unwrap();
    assert_eq!(peer_a.world().alive_count(), 0);
    assert!(peer_a.remap().is_empty());
    assert_eq!(peer_a.stats().deleted, 1);

    // Tick 6: B's session starts from a full snapshot without the car.
    server.poll_network();
    server.tick(|_| {});
    peer_b.poll_network().unwrap();
    assert_eq!(peer_b.state(), ClientState::Connected);
    assert_eq!(peer_b.world().alive_count(), 0);
    assert_eq!(peer_b.stats().deleted, 0);
    assert!(peer_b.last_error().is_none());
}

// ============================================================================
// SCENARIO 3: LOSS
// ============================================================================

#[test]
fn lost_update_is_repaired_by_refresh() {
    let network = LocalNetwork::new();
    let config = ServerConfig {
        controlled_entity_type: "SPECTATOR".to_owned(),
        refresh_interval: 4,
        ..ServerConfig::default()
    };
    let mut server = server_with(&network, config, racing_groups());

    let mut spawned = None;
    server.tick(|ctx| spawned = Some(ctx.spawn(RACE_CAR_TYPE)));
    let car = spawned.unwrap();

    // Tick 2: the peer connects and receives the car.
    let mut peer = client(&network);
    peer.connect().unwrap();
    server.poll_network();
    server.tick(|_| {});
    peer.poll_network().unwrap();
    let local = peer.remap().local(car.to_wire()).unwrap();

    // Tick 3: the car's only move is lost, and it never moves again.
    network.set_conditions(LinkConditions {
        drop_every_nth_unreliable: Some(1),
        ..LinkConditions::perfect()
    });
    server.tick(|ctx| ctx.modify::<Position>(car).0.x = 5.0);
    network.set_conditions(LinkConditions::perfect());

    for _ in 4..6 {
        server.tick(|_| {});
    }
    peer.poll_network().unwrap();
    assert_eq!(peer.world().get::<Position>(local).0, Vec3::ZERO);

    // Tick 6 is four ticks after the connect: everything is resent.
    assert_eq!(server.current_tick(), 6);
    let report = server.tick(|_| {});
    assert_eq!(report.dirty, 0);
    assert_eq!(report.snapshots, 1);

    peer.poll_network().unwrap();
    assert_eq!(
        peer.world().get::<Position>(local),
        server.world().get::<Position>(car)
    );
    assert_eq!(
        peer.world().get::<Velocity>(local),
        server.world().get::<Velocity>(car)
    );
}

// ============================================================================
// SCENARIO 4: CODEC
// ============================================================================

#[test]
fn full_snapshot_round_trip_onto_empty_store() {
    let (world, entities) = populated_world();
    let components = game_components();
    let types = register_entity_types(&blueprints()).unwrap();

    let mut mirror = World::new();
    let mut remap = IdRemap::new();
    for group in &racing_groups() {
        let message = encode_snapshot(
            &world,
            &components,
            group,
            SnapshotKind::Full,
            &group.matching(&world, &components),
        );
        decode_snapshot(&mut mirror, &message, &types, &components, &mut remap).unwrap();
    }
    assert_eq!(mirror.alive_count(), 3);

    let [car, rocket, chunk] = [entities[0], entities[1], entities[2]];
    let local = |id: EntityId| remap.local(id.to_wire()).unwrap();

    assert_eq!(mirror.get::<Position>(local(car)), world.get::<Position>(car));
    assert_eq!(mirror.get::<Velocity>(local(car)), world.get::<Velocity>(car));
    assert_eq!(mirror.get::<Rotation>(local(car)), world.get::<Rotation>(car));
    assert_eq!(mirror.get::<CarBody>(local(car)), world.get::<CarBody>(car));
    assert_eq!(mirror.get::<RocketMotor>(local(rocket)), world.get::<RocketMotor>(rocket));
    assert_eq!(mirror.get::<Position>(local(rocket)), world.get::<Position>(rocket));
    assert_eq!(mirror.get::<ChunkData>(local(chunk)), world.get::<ChunkData>(chunk));
    assert_eq!(mirror.entity_type(local(chunk)), Some(WORLD_CHUNK_TYPE));
}

#[test]
fn applying_the_same_update_twice_is_idempotent() {
    let (mut world, entities) = populated_world();
    let components = game_components();
    let types = register_entity_types(&blueprints()).unwrap();
    let cars = &racing_groups()[0];
    let car = entities[0];

    let mut mirror = World::new();
    let mut remap = IdRemap::new();
    let full = encode_snapshot(&world, &components, cars, SnapshotKind::Full, &[car]);
    decode_snapshot(&mut mirror, &full, &types, &components, &mut remap).unwrap();

    world.get_mut::<Position>(car).0.z = 77.0;
    let update = encode_snapshot(&world, &components, cars, SnapshotKind::ComponentUpdate, &[car]);

    let first = decode_snapshot(&mut mirror, &update, &types, &components, &mut remap).unwrap();
    let local = remap.local(car.to_wire()).unwrap();
    let after_first = *mirror.get::<Position>(local);

    let second = decode_snapshot(&mut mirror, &update, &types, &components, &mut remap).unwrap();
    assert_eq!(first, second);
    assert_eq!(mirror.get::<Position>(local), &after_first);
    assert_eq!(after_first.0.z, 77.0);
    assert_eq!(mirror.alive_count(), 1);
    assert_eq!(remap.len(), 1);
}

#[test]
fn malformed_count_closes_the_connection() {
    let network = LocalNetwork::new();
    let mut raw_server = network.listen();
    let mut peer = client(&network);
    peer.connect().unwrap();

    let events = raw_server.poll_events();
    let Some(&TransportEvent::Connected(id)) = events.first() else {
        panic!("expected a connect, got {events:?}");
    };

    let mut writer = WireWriter::new();
    writer.write_u8(MessageKind::RegistryFull.to_byte());
    writer.write_u8(0); // no components
    writer.write_u32(1000); // claims 1000 entities
    writer.write_u32(7); // but carries one wire id
    raw_server.send_reliable(id, writer.as_slice()).unwrap();
    raw_server.send_reliable(id, writer.as_slice()).unwrap();

    let error = peer.poll_network().unwrap_err();
    assert!(matches!(error, ProtocolError::CountMismatch { declared: 1000, .. }));
    assert_eq!(peer.state(), ClientState::Disconnected);
    assert_eq!(peer.last_error(), Some(&error));
    assert_eq!(peer.world().alive_count(), 0);
    assert_eq!(raw_server.poll_events(), vec![TransportEvent::Disconnected(id)]);
}

// ============================================================================
// SCENARIO 5: EVENTS
// ============================================================================

#[test]
fn duplicated_event_runs_handlers_once() {
    let network = LocalNetwork::with_conditions(LinkConditions {
        duplicate_reliable: true,
        ..LinkConditions::perfect()
    });
    let mut server = spectator_server(&network, racing_groups());
    let mut peer = client(&network);

    let hits = Arc::new(Mutex::new(Vec::new()));
    let sink = Arc::clone(&hits);
    peer.dispatcher_mut()
        .subscribe(move |event: &CollisionEvent| sink.lock().push(event.surface));

    peer.connect().unwrap();
    server.poll_network();
    let report = server.tick(|ctx| {
        ctx.emit(&CollisionEvent {
            position: Vec3::ZERO,
            impulse: 300.0,
            surface: Surface::Barrier,
        });
    });
    assert_eq!(report.events, 1);

    peer.poll_network().unwrap();
    assert_eq!(*hits.lock(), vec![Surface::Barrier]);
    assert_eq!(peer.stats().events, 1);
    assert_eq!(peer.stats().duplicate_events, 1);
}

// ============================================================================
// SCENARIO 6: SESSIONS
// ============================================================================

#[test]
fn idle_pool_hands_car_to_next_peer() {
    let network = LocalNetwork::new();
    let config = ServerConfig {
        release_policy: ReleasePolicy::IdlePool,
        ..ServerConfig::default()
    };
    let mut server = server_with(&network, config, racing_groups());

    let mut peer_a = client(&network);
    peer_a.connect().unwrap();
    server.poll_network();
    let peer_a_id = peer_a.transport().local_peer_id().unwrap();
    let car = server.controlled_entity(peer_a_id).unwrap();
    server.tick(|_| {});

    peer_a.disconnect();
    server.poll_network();
    let report = server.tick(|_| {});
    assert_eq!(report.deleted, 0);
    assert!(server.world().is_alive(car));
    assert_eq!(server.sessions().idle_count(), 1);

    let mut peer_b = client(&network);
    peer_b.connect().unwrap();
    server.poll_network();
    let peer_b_id = peer_b.transport().local_peer_id().unwrap();
    assert_eq!(server.controlled_entity(peer_b_id), Some(car));
    assert_eq!(server.sessions().idle_count(), 0);

    server.tick(|_| {});
    peer_b.poll_network().unwrap();
    let mirror = peer_b.controlled_entity().unwrap();
    assert!(peer_b.world().has::<CarBody>(mirror));
    assert_eq!(peer_b.remap().remote(mirror), Some(car.to_wire()));
}

#[test]
fn input_applies_on_the_next_tick_only() {
    let network = LocalNetwork::new();
    let mut server = server_with(&network, ServerConfig::default(), racing_groups());
    let mut peer = client(&network);
    let mut systems = RaceSystems::new();

    peer.connect().unwrap();
    server.poll_network();
    let car = server
        .controlled_entity(peer.transport().local_peer_id().unwrap())
        .unwrap();
    server.tick(|ctx| systems.run(ctx, 0.1));
    peer.poll_network().unwrap();

    let mut input = ClientInput::new(0);
    input.throttle = 1.0;
    assert_eq!(peer.send_input(input), Ok(1));

    // Sent but not yet polled: this tick runs without it.
    server.tick(|ctx| systems.run(ctx, 0.1));
    assert_eq!(server.world().get::<Velocity>(car).0, Vec3::ZERO);

    server.poll_network();
    server.tick(|ctx| systems.run(ctx, 0.1));
    assert!(server.world().get::<Velocity>(car).0.z > 0.0);

    peer.poll_network().unwrap();
    let mirror = peer.controlled_entity().unwrap();
    assert_eq!(
        peer.world().get::<Velocity>(mirror),
        server.world().get::<Velocity>(car)
    );
}
