//! # Component System
//!
//! Components are pure data containers with no behavior.
//! Unlike a bitmask ECS there is no fixed component ID: storages are
//! looked up by `TypeId`, so any number of component types can exist.

/// Marker trait for ECS components.
///
/// Components must be:
/// - `'static`: stored type-erased, keyed by `TypeId`
/// - `Send + Sync`: the store can be handed to another thread between ticks
///
/// # Example
///
/// ```rust,ignore
/// #[derive(Clone, Copy, Debug, Default)]
/// struct Fuel(f32);
///
/// impl Component for Fuel {}
/// ```
pub trait Component: Send + Sync + 'static {}
