//! # SLIPSTREAM Shared
//!
//! Game content used by both client and server:
//! - Math types with flat-float wire layouts
//! - Networked components and the component registry
//! - Entity types (`RACE_CAR`, `SIMPLE_ROCKET`, `WORLD_CHUNK`) and their
//!   TOML blueprints
//! - Gameplay events
//! - Server-side racing systems
//!
//! ## Setup
//!
//! ```rust,ignore
//! let blueprints = BlueprintConfig::default();
//! let server = ReplicationServer::new(
//!     ServerConfig::default(),
//!     network.listen(),
//!     register_entity_types(&blueprints)?,
//!     game_components(),
//!     racing_groups(),
//! );
//! ```
//!
//! A client builds the same registries from the same blueprints.

#![deny(missing_docs)]
#![deny(unsafe_code)]

pub mod blueprint;
pub mod components;
pub mod events;
pub mod math;
pub mod systems;

pub use blueprint::{
    racing_groups, register_entity_types, BlueprintConfig, EntityBlueprint, RACE_CAR,
    RACE_CAR_TYPE, SIMPLE_ROCKET, SIMPLE_ROCKET_TYPE, WORLD_CHUNK, WORLD_CHUNK_TYPE,
};
pub use components::{
    game_components, CarBody, CarModel, ChunkData, Position, RocketMotor, Rotation, Velocity,
    VisualState,
};
pub use events::{
    register_game_events, CollisionEvent, RocketLaunchedEvent, SoundCue, SoundCueEvent, Surface,
};
pub use math::{Quaternion, Vec3};
pub use systems::RaceSystems;
