//! # SLIPSTREAM Core
//!
//! The authoritative entity store the replication layer is built on:
//! - Sparse-set ECS with generational handles
//! - Entity type registry (blueprints shared by server and client)
//! - Dirty / deleted tracking, drained once per tick
//!
//! ## Architecture Rules
//!
//! 1. **Single writer** - The store is mutated by the simulation thread only
//! 2. **Explicit registries** - Built at startup, passed by reference
//! 3. **Missing components are bugs** - `get` panics, callers `has` first
//!
//! ## Example
//!
//! ```rust,ignore
//! use slipstream_core::{Blueprint, DirtyTracker, EntityTypeRegistry, World};
//!
//! let mut types = EntityTypeRegistry::new();
//! types.register(Blueprint::new("RACE_CAR").with(Position::default()));
//!
//! let mut world = World::new();
//! let car = types.instantiate_named(&mut world, "RACE_CAR");
//!
//! let mut tracker = DirtyTracker::new();
//! world.get_mut::<Position>(car).0.x += 1.0;
//! tracker.mark_dirty(car);
//! ```

#![deny(missing_docs)]
#![deny(unsafe_code)]
#![deny(clippy::all)]
#![warn(clippy::pedantic)]

pub mod dirty;
pub mod ecs;
pub mod registry;

pub use dirty::{despawn_tracked, Changed, DeletedEntity, DirtyEntity, DirtyTracker};
pub use ecs::{Component, ComponentStorage, Entity, EntityId, View, World};
pub use registry::{symbol_hash, Blueprint, ComponentFactory, EntityTypeId, EntityTypeRegistry};
