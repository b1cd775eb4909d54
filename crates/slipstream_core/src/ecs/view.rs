//! # Views
//!
//! A view is the answer to "which entities have all of these components?".
//! It drives iteration from the smallest participating storage and checks
//! membership in the others, so cost scales with the rarest component.

use std::any::TypeId;

use super::component::Component;
use super::entity::EntityId;
use super::storage::AnyStorage;
use super::world::World;

/// A type signature a system operates on: a tuple of 1 to 4 component types.
pub trait ComponentSet: 'static {
    /// The `TypeId` of every member, in declaration order.
    fn type_ids() -> Vec<TypeId>;
}

macro_rules! impl_component_set {
    ($($name:ident),+) => {
        impl<$($name: Component),+> ComponentSet for ($($name,)+) {
            fn type_ids() -> Vec<TypeId> {
                vec![$(TypeId::of::<$name>()),+]
            }
        }
    };
}

impl_component_set!(A);
impl_component_set!(A, B);
impl_component_set!(A, B, C);
impl_component_set!(A, B, C, D);

/// Lazy, restartable set of entities carrying a fixed list of component
/// types.
pub struct View<'w> {
    /// Storage with the fewest entries; drives iteration.
    driver: Option<&'w dyn AnyStorage>,
    /// Remaining storages to test membership against.
    filters: Vec<&'w dyn AnyStorage>,
}

impl<'w> View<'w> {
    /// An empty type list matches nothing.
    pub(crate) fn new(world: &'w World, type_ids: &[TypeId]) -> Self {
        let mut storages = Vec::with_capacity(type_ids.len());
        for &type_id in type_ids {
            match world.erased_storage(type_id) {
                Some(storage) => storages.push(storage),
                // No entity ever had this component: nothing can match.
                None => {
                    return Self {
                        driver: None,
                        filters: Vec::new(),
                    }
                }
            }
        }

        storages.sort_by_key(|s| s.owners().len());
        let mut storages = storages.into_iter();
        let driver = storages.next();

        Self {
            driver,
            filters: storages.collect(),
        }
    }

    /// Starts a fresh pass over the matching entities.
    #[must_use]
    pub fn iter(&self) -> ViewIter<'_> {
        ViewIter {
            candidates: self.driver.map_or(&[][..], |d| d.owners()),
            filters: &self.filters,
            position: 0,
        }
    }

    /// Returns true if no entity matches.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.iter().next().is_none()
    }
}

impl<'a, 'w> IntoIterator for &'a View<'w> {
    type Item = EntityId;
    type IntoIter = ViewIter<'a>;

    fn into_iter(self) -> Self::IntoIter {
        self.iter()
    }
}

/// Iterator over one pass of a [`View`].
pub struct ViewIter<'a> {
    candidates: &'a [EntityId],
    filters: &'a [&'a dyn AnyStorage],
    position: usize,
}

impl Iterator for ViewIter<'_> {
    type Item = EntityId;

    fn next(&mut self) -> Option<Self::Item> {
        while let Some(&id) = self.candidates.get(self.position) {
            self.position += 1;
            if self.filters.iter().all(|s| s.contains_entity(id)) {
                return Some(id);
            }
        }
        None
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        (0, Some(self.candidates.len() - self.position))
    }
}
