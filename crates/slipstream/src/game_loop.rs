//! # Headless Match Loop
//!
//! One authoritative server and N scripted drivers on a loopback network.
//! ```text
//! Frame N:
//! ┌─────────────────────────────────────────────────────────────────────┐
//! │ 1. DRIVE                                                            │
//! │    └─ Every connected driver sends its scripted input (unreliable) │
//! │                                                                     │
//! │ 2. SERVER POLL                                                      │
//! │    └─ Connects, disconnects, inputs, pings                          │
//! │                                                                     │
//! │ 3. SERVER TICK                                                      │
//! │    ├─ Racing systems (inputs from step 2 apply now)                 │
//! │    └─ Snapshots, deletes, events                                    │
//! │                                                                     │
//! │ 4. CLIENT POLL                                                      │
//! │    └─ Every driver applies what arrived to its mirror               │
//! │                                                                     │
//! │ 5. PRESENT                                                          │
//! │    └─ Client-only VisualState refreshed from the mirror             │
//! └─────────────────────────────────────────────────────────────────────┘
//! ```

use std::sync::Arc;
use std::time::Instant;

use parking_lot::Mutex;
use slipstream_core::{EntityId, World};
use slipstream_net::{
    ClientInput, ClientState, ClientStats, LocalEndpoint, LocalNetwork, ReplicationClient,
    ReplicationServer, TickLoop, Transport, TransportStats,
};
use slipstream_shared::{
    game_components, racing_groups, register_entity_types, register_game_events,
    BlueprintConfig, ChunkData, CollisionEvent, Position, RaceSystems, RocketLaunchedEvent,
    SoundCueEvent, VisualState, WORLD_CHUNK_TYPE,
};

use crate::config::DemoConfig;
use crate::error::{DemoError, DemoResult};

/// A driver fires a rocket once every this many ticks.
pub const LAUNCH_INTERVAL: u64 = 90;

/// Chunks per side of the terrain spawned before anyone connects.
pub const TERRAIN_CHUNKS: i32 = 2;

/// Events a driver's handlers have seen.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct Feedback {
    /// Collision events.
    pub collisions: u64,
    /// Sound cues.
    pub sounds: u64,
    /// Rocket launches.
    pub launches: u64,
}

/// Per-frame numbers.
#[derive(Clone, Copy, Debug, Default)]
pub struct FrameStats {
    /// Server tick that ran.
    pub tick: u64,
    /// Snapshot messages the server sent.
    pub snapshots: usize,
    /// Events the server broadcast.
    pub events: usize,
    /// Entities destroyed this tick.
    pub deleted: usize,
    /// Messages applied across all drivers.
    pub applied: usize,
    /// Frame time in microseconds.
    pub total_us: u64,
}

/// Outcome of a run.
#[derive(Clone, Debug, Default)]
pub struct MatchSummary {
    /// Frames run.
    pub frames: u64,
    /// Entities alive on the server.
    pub server_entities: usize,
    /// Drivers still connected.
    pub connected_drivers: usize,
    /// Entities mirrored by each driver.
    pub mirrored_entities: Vec<usize>,
    /// Snapshot messages sent by the server.
    pub snapshots_sent: u64,
    /// Events broadcast by the server.
    pub events_sent: u64,
    /// Client counters summed over every driver.
    pub clients: ClientStats,
    /// Handler counts summed over every driver.
    pub feedback: Feedback,
    /// Protocol errors that cost a driver its connection.
    pub protocol_errors: u64,
    /// Server transport counters.
    pub transport: TransportStats,
}

/// One scripted client.
pub struct Driver {
    index: usize,
    client: ReplicationClient<LocalEndpoint>,
    feedback: Arc<Mutex<Feedback>>,
}

impl Driver {
    fn new(index: usize, client: ReplicationClient<LocalEndpoint>) -> Self {
        let mut driver = Self {
            index,
            client,
            feedback: Arc::new(Mutex::new(Feedback::default())),
        };
        let dispatcher = driver.client.dispatcher_mut();
        register_game_events(dispatcher);

        let feedback = Arc::clone(&driver.feedback);
        dispatcher.subscribe(move |_: &CollisionEvent| feedback.lock().collisions += 1);
        let feedback = Arc::clone(&driver.feedback);
        dispatcher.subscribe(move |_: &SoundCueEvent| feedback.lock().sounds += 1);
        let feedback = Arc::clone(&driver.feedback);
        dispatcher.subscribe(move |_: &RocketLaunchedEvent| feedback.lock().launches += 1);
        driver
    }

    /// The replication client.
    #[must_use]
    pub const fn client(&self) -> &ReplicationClient<LocalEndpoint> {
        &self.client
    }

    /// Events this driver's handlers have seen.
    #[must_use]
    pub fn feedback(&self) -> Feedback {
        *self.feedback.lock()
    }

    /// Scripted input for `tick`: full throttle, weaving, and a rocket
    /// every [`LAUNCH_INTERVAL`] ticks (staggered per driver).
    #[allow(clippy::cast_precision_loss)]
    fn input_for(&self, tick: u64) -> ClientInput {
        let phase = tick as f32 * 0.05 + self.index as f32;
        let mut input = ClientInput::new(0);
        input.throttle = 1.0;
        input.steering = phase.sin() * 0.5;
        if (tick + self.index as u64 * 15) % LAUNCH_INTERVAL == 0 {
            input.flags |= ClientInput::FLAG_LAUNCH;
        }
        input
    }
}

/// Refreshes client-only presentation state on every positioned mirror.
///
/// The component is attached on first sight and never touched by
/// replication.
pub fn update_visuals(world: &mut World, controlled: Option<EntityId>, dt: f32) {
    let mirrors: Vec<EntityId> = world.view::<(Position,)>().iter().collect();
    for id in mirrors {
        let position = world.get::<Position>(id).0;
        if !world.has::<VisualState>(id) {
            world.insert(
                id,
                VisualState {
                    last_position: position,
                    ..VisualState::default()
                },
            );
        }
        let visual = world.get_mut::<VisualState>(id);
        if visual.last_position == position {
            visual.since_moved += dt;
        } else {
            visual.last_position = position;
            visual.since_moved = 0.0;
        }
        visual.highlighted = controlled == Some(id);
    }
}

/// Server plus drivers, stepped together.
pub struct RaceMatch {
    network: LocalNetwork,
    server: ReplicationServer<LocalEndpoint>,
    drivers: Vec<Driver>,
    systems: RaceSystems,
    tick_loop: Option<TickLoop>,
    dt: f32,
    frames: u64,
    snapshots_sent: u64,
    events_sent: u64,
    protocol_errors: u64,
}

impl RaceMatch {
    /// Builds the server, lays out the terrain and connects every driver.
    ///
    /// # Errors
    ///
    /// Fails on bad blueprints or if a driver cannot connect.
    pub fn new(config: &DemoConfig) -> DemoResult<Self> {
        let blueprints = config.blueprints()?;
        Self::with_blueprints(config, &blueprints)
    }

    /// As [`new`](Self::new) with already loaded blueprints.
    ///
    /// # Errors
    ///
    /// Fails on bad blueprints or if a driver cannot connect.
    #[allow(clippy::cast_precision_loss)]
    pub fn with_blueprints(config: &DemoConfig, blueprints: &BlueprintConfig) -> DemoResult<Self> {
        let network = LocalNetwork::with_conditions(config.link.conditions());
        let mut server = ReplicationServer::new(
            config.server.clone(),
            network.listen(),
            register_entity_types(blueprints)?,
            game_components(),
            racing_groups(),
        );

        server.tick(|ctx| {
            for x in 0..TERRAIN_CHUNKS {
                for z in 0..TERRAIN_CHUNKS {
                    let chunk = ctx.spawn(WORLD_CHUNK_TYPE);
                    ctx.world.get_mut::<ChunkData>(chunk).coord = [x, 0, z];
                }
            }
        });

        let mut drivers = Vec::with_capacity(config.clients);
        for index in 0..config.clients {
            let mut client = ReplicationClient::new(
                &config.client,
                network.endpoint(),
                register_entity_types(blueprints)?,
                game_components(),
            );
            client
                .connect()
                .map_err(|source| DemoError::Connect { driver: index, source })?;
            drivers.push(Driver::new(index, client));
        }

        tracing::info!(
            drivers = drivers.len(),
            tick_rate = config.server.tick_rate,
            "match ready"
        );

        Ok(Self {
            network,
            server,
            drivers,
            systems: RaceSystems::new(),
            tick_loop: config.realtime.then(|| TickLoop::from_config(&config.server)),
            dt: 1.0 / config.server.tick_rate as f32,
            frames: 0,
            snapshots_sent: 0,
            events_sent: 0,
            protocol_errors: 0,
        })
    }

    /// The authoritative server.
    #[must_use]
    pub const fn server(&self) -> &ReplicationServer<LocalEndpoint> {
        &self.server
    }

    /// Every driver, connected or not.
    #[must_use]
    pub fn drivers(&self) -> &[Driver] {
        &self.drivers
    }

    /// The loopback network, for changing link conditions mid-run.
    #[must_use]
    pub const fn network(&self) -> &LocalNetwork {
        &self.network
    }

    /// Runs one frame.
    pub fn frame(&mut self) -> FrameStats {
        let start = Instant::now();
        let tick = self.server.current_tick();

        // 1. Drive
        for driver in &mut self.drivers {
            if driver.client.state() != ClientState::Connected {
                continue;
            }
            let input = driver.input_for(tick);
            if let Err(error) = driver.client.send_input(input) {
                tracing::debug!(driver = driver.index, %error, "input not sent");
            }
        }

        // 2-3. Server
        self.server.poll_network();
        let systems = &mut self.systems;
        let dt = self.dt;
        let report = self.server.tick(|ctx| systems.run(ctx, dt));
        self.snapshots_sent += report.snapshots as u64;
        self.events_sent += report.events as u64;

        // 4-5. Clients
        let mut applied = 0;
        for driver in &mut self.drivers {
            match driver.client.poll_network() {
                Ok(count) => applied += count,
                Err(error) => {
                    self.protocol_errors += 1;
                    tracing::warn!(driver = driver.index, %error, "driver dropped");
                }
            }
            let controlled = driver.client.controlled_entity();
            update_visuals(driver.client.world_mut(), controlled, dt);
        }

        self.frames += 1;
        FrameStats {
            tick,
            snapshots: report.snapshots,
            events: report.events,
            deleted: report.deleted,
            applied,
            total_us: u64::try_from(start.elapsed().as_micros()).unwrap_or(u64::MAX),
        }
    }

    /// Runs `frames` frames, paced at the tick rate when configured for
    /// real time.
    pub fn run(&mut self, frames: u64) -> MatchSummary {
        let mut remaining = frames;
        while remaining > 0 {
            let Some(mut tick_loop) = self.tick_loop.take() else {
                self.frame();
                remaining -= 1;
                continue;
            };
            while remaining > 0 && tick_loop.should_tick() {
                let start = tick_loop.begin_tick();
                self.frame();
                tick_loop.end_tick(start);
                remaining -= 1;
            }
            if remaining > 0 {
                tick_loop.wait_for_next_tick();
            }
            self.tick_loop = Some(tick_loop);
        }

        if let Some(tick_loop) = &self.tick_loop {
            let stats = tick_loop.stats();
            tracing::info!(
                avg_us = stats.avg_tick_us,
                max_us = stats.max_tick_us,
                late = stats.late_ticks,
                "pacing"
            );
        }
        self.summary()
    }

    /// Current totals.
    #[must_use]
    pub fn summary(&self) -> MatchSummary {
        let mut summary = MatchSummary {
            frames: self.frames,
            server_entities: self.server.world().alive_count(),
            snapshots_sent: self.snapshots_sent,
            events_sent: self.events_sent,
            protocol_errors: self.protocol_errors,
            transport: self.server.transport().stats(),
            ..MatchSummary::default()
        };
        for driver in &self.drivers {
            let client = &driver.client;
            if client.state() == ClientState::Connected {
                summary.connected_drivers += 1;
            }
            summary.mirrored_entities.push(client.world().alive_count());

            let stats = client.stats();
            summary.clients.snapshots += stats.snapshots;
            summary.clients.created += stats.created;
            summary.clients.updated += stats.updated;
            summary.clients.dropped_updates += stats.dropped_updates;
            summary.clients.deleted += stats.deleted;
            summary.clients.events += stats.events;
            summary.clients.duplicate_events += stats.duplicate_events;

            let feedback = driver.feedback();
            summary.feedback.collisions += feedback.collisions;
            summary.feedback.sounds += feedback.sounds;
            summary.feedback.launches += feedback.launches;
        }
        summary
    }
}
