//! # Entity Component System
//!
//! The Entity Store at the bottom of the replication stack.
//!
//! ## Design Philosophy
//!
//! - One sparse set per component type, looked up by `TypeId`
//! - Entity IDs are indices with generation counters
//! - Systems name the exact component signature they iterate (`view`)
//! - No dynamic dispatch per component access in typed paths

mod component;
mod entity;
mod storage;
mod view;
mod world;

pub use component::Component;
pub use entity::{Entity, EntityId, MAX_WIRE_INDEX, WIRE_INDEX_BITS};
pub use storage::{AnyStorage, ComponentStorage};
pub use view::{ComponentSet, View, ViewIter};
pub use world::World;
