//! # Racing Systems
//!
//! Server-side gameplay run inside [`ReplicationServer::tick`]. Every write
//! to a replicated component goes through [`TickContext::modify`] so the
//! change is picked up by the next component update.
//!
//! [`ReplicationServer::tick`]: slipstream_net::ReplicationServer::tick

use std::collections::HashMap;

use slipstream_core::EntityId;
use slipstream_net::{ClientInput, PeerInput, TickContext};

use crate::blueprint::SIMPLE_ROCKET_TYPE;
use crate::components::{CarBody, Position, RocketMotor, Rotation, Velocity};
use crate::events::{CollisionEvent, RocketLaunchedEvent, SoundCue, SoundCueEvent, Surface};
use crate::math::{Quaternion, Vec3};

/// Engine force at full throttle (newtons).
pub const ENGINE_FORCE: f32 = 12_000.0;

/// Turn rate at full steering (radians per second).
pub const TURN_RATE: f32 = 2.0;

/// Fraction of speed lost per second when coasting.
pub const DRAG: f32 = 0.5;

/// Speeds below this snap to zero.
pub const REST_SPEED: f32 = 0.01;

/// Boost multiplier on engine force.
pub const BOOST_FACTOR: f32 = 1.5;

/// Extra speed a launched rocket gets over its car.
pub const LAUNCH_SPEED: f32 = 20.0;

/// Gameplay state kept between ticks.
#[derive(Debug, Default)]
pub struct RaceSystems {
    /// Input sequence that last fired a rocket, per car.
    launched: HashMap<EntityId, u32>,
}

impl RaceSystems {
    /// Creates the systems.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Runs one tick of gameplay.
    pub fn run(&mut self, ctx: &mut TickContext<'_>, dt: f32) {
        self.drive_cars(ctx, dt);
        move_cars(ctx, dt);
        burn_rockets(ctx, dt);
        self.launched.retain(|&car, _| ctx.world.is_alive(car));
    }

    /// Applies each peer's latest input to the car it drives.
    pub fn drive_cars(&mut self, ctx: &mut TickContext<'_>, dt: f32) {
        let inputs: &[PeerInput] = ctx.inputs;
        for PeerInput { entity, input, .. } in inputs {
            let car = *entity;
            if !ctx.world.is_alive(car) || !ctx.world.has::<CarBody>(car) {
                continue;
            }
            steer(ctx, car, input, dt);

            if input.is_launching() && self.launched.get(&car) != Some(&input.sequence) {
                self.launched.insert(car, input.sequence);
                launch_rocket(ctx, car);
            }
        }
    }
}

fn steer(ctx: &mut TickContext<'_>, car: EntityId, input: &ClientInput, dt: f32) {
    let mass = ctx.world.get::<CarBody>(car).mass;
    let yaw = ctx.world.get::<Rotation>(car).0.yaw() + input.steering.clamp(-1.0, 1.0) * TURN_RATE * dt;
    let heading = Quaternion::from_yaw(yaw);

    let mut force = input.throttle.clamp(-1.0, 1.0) * ENGINE_FORCE;
    if input.is_boosting() {
        force *= BOOST_FACTOR;
    }
    let speed = ctx.world.get::<Velocity>(car).0.length();
    let mut speed = speed + force / mass * dt;
    if input.is_braking() {
        speed *= 0.5;
    }

    ctx.modify::<Rotation>(car).0 = heading;
    ctx.modify::<Velocity>(car).0 = heading.forward() * speed;
}

fn launch_rocket(ctx: &mut TickContext<'_>, car: EntityId) {
    let origin = ctx.world.get::<Position>(car).0 + Vec3::Y;
    let heading = ctx.world.get::<Rotation>(car).0;
    let car_velocity = ctx.world.get::<Velocity>(car).0;

    let rocket = ctx.spawn(SIMPLE_ROCKET_TYPE);
    ctx.modify::<Position>(rocket).0 = origin;
    ctx.modify::<Velocity>(rocket).0 = car_velocity + heading.forward() * LAUNCH_SPEED;

    tracing::debug!(%car, %rocket, tick = ctx.tick(), "rocket launched");
    ctx.emit(&RocketLaunchedEvent {
        rocket: rocket.to_wire(),
        origin,
    });
    ctx.emit(&SoundCueEvent {
        position: origin,
        cue: SoundCue::Ignition,
        volume: 1.0,
    });
}

/// Moves every car along its velocity and applies drag.
///
/// Cars at rest are left untouched, so they never show up as dirty.
pub fn move_cars(ctx: &mut TickContext<'_>, dt: f32) {
    let cars: Vec<EntityId> = ctx.world.view::<(CarBody, Position, Velocity)>().iter().collect();
    for car in cars {
        let velocity = ctx.world.get::<Velocity>(car).0;
        if velocity == Vec3::ZERO {
            continue;
        }
        ctx.modify::<Position>(car).0 += velocity * dt;

        let damped = velocity * (1.0 - DRAG * dt).max(0.0);
        ctx.modify::<Velocity>(car).0 = if damped.length() < REST_SPEED {
            Vec3::ZERO
        } else {
            damped
        };
    }
}

/// Accelerates rockets upward until their fuel runs out, then destroys
/// them.
pub fn burn_rockets(ctx: &mut TickContext<'_>, dt: f32) {
    let rockets: Vec<EntityId> = ctx
        .world
        .view::<(RocketMotor, Position, Velocity)>()
        .iter()
        .collect();
    for rocket in rockets {
        if ctx.world.get::<RocketMotor>(rocket).is_spent() {
            let position = ctx.world.get::<Position>(rocket).0;
            ctx.despawn(rocket);
            ctx.emit(&CollisionEvent {
                position,
                impulse: 0.0,
                surface: Surface::Ground,
            });
            continue;
        }

        let motor = ctx.modify::<RocketMotor>(rocket);
        motor.fuel = (motor.fuel - dt).max(0.0);
        let thrust = motor.thrust;

        let velocity = {
            let velocity = ctx.modify::<Velocity>(rocket);
            velocity.0 += Vec3::Y * (thrust * dt);
            velocity.0
        };
        ctx.modify::<Position>(rocket).0 += velocity * dt;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use slipstream_net::{
        ControlMessage, LocalEndpoint, LocalNetwork, PeerId, ReplicationServer, ServerConfig, Transport,
    };

    use crate::blueprint::{racing_groups, register_entity_types, BlueprintConfig, RACE_CAR_TYPE};
    use crate::components::game_components;

    fn server(network: &LocalNetwork) -> ReplicationServer<LocalEndpoint> {
        ReplicationServer::new(
            ServerConfig::default(),
            network.listen(),
            register_entity_types(&BlueprintConfig::default()).unwrap(),
            game_components(),
            racing_groups(),
        )
    }

    fn send(client: &mut LocalEndpoint, input: ClientInput) {
        client
            .send_unreliable(PeerId::SERVER, &ControlMessage::ClientInput(input).encode())
            .unwrap();
    }

    #[test]
    fn test_throttle_moves_car() {
        let network = LocalNetwork::new();
        let mut server = server(&network);
        let mut client = network.endpoint();
        client.connect().unwrap();
        server.poll_network();
        let car = server.controlled_entity(client.local_peer_id().unwrap()).unwrap();

        let mut input = ClientInput::new(1);
        input.throttle = 1.0;
        send(&mut client, input);
        server.poll_network();

        let mut systems = RaceSystems::new();
        server.tick(|ctx| systems.run(ctx, 0.1));

        let world = server.world();
        assert!(world.get::<Velocity>(car).0.z > 0.0);
        assert!(world.get::<Position>(car).0.z > 0.0);
        assert_eq!(world.get::<Position>(car).0.x, 0.0);
    }

    #[test]
    fn test_idle_car_stays_clean() {
        let network = LocalNetwork::new();
        let mut server = server(&network);
        let mut systems = RaceSystems::new();
        let report = server.tick(|ctx| {
            ctx.spawn(RACE_CAR_TYPE);
            systems.run(ctx, 0.1);
        });
        assert_eq!(report.dirty, 0);
    }

    #[test]
    fn test_launch_fires_once_per_input() {
        let network = LocalNetwork::new();
        let mut server = server(&network);
        let mut client = network.endpoint();
        client.connect().unwrap();
        server.poll_network();

        let mut input = ClientInput::new(1);
        input.flags = ClientInput::FLAG_LAUNCH;
        send(&mut client, input);
        server.poll_network();

        let mut systems = RaceSystems::new();
        let first = server.tick(|ctx| systems.run(ctx, 0.1));
        assert_eq!(first.events, 2);

        // Same input still latest: no second rocket.
        let second = server.tick(|ctx| systems.run(ctx, 0.1));
        assert_eq!(second.events, 0);
        assert_eq!(server.world().view::<(RocketMotor,)>().iter().count(), 1);
    }

    #[test]
    fn test_rocket_burns_out() {
        let network = LocalNetwork::new();
        let mut server = server(&network);
        server.tick(|ctx| {
            ctx.spawn(SIMPLE_ROCKET_TYPE);
        });

        let mut systems = RaceSystems::new();
        let mut deleted = 0;
        let mut climbed = false;
        for _ in 0..6 {
            let report = server.tick(|ctx| {
                systems.run(ctx, 0.5);
                climbed |= ctx
                    .world
                    .view::<(RocketMotor, Position)>()
                    .iter()
                    .any(|id| ctx.world.get::<Position>(id).0.y > 0.0);
            });
            deleted += report.deleted;
        }
        assert!(climbed);
        assert_eq!(deleted, 1);
        assert!(server.world().view::<(RocketMotor,)>().is_empty());
    }
}
