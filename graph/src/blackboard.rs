//! Type-indexed per-frame storage.
//!
//! Frame-assembly code often produces handles in one place and consumes
//! them several passes later; the blackboard carries those payloads by
//! type so setup functions stay decoupled.

use fxhash::FxHashMap;
use std::any::{type_name, Any, TypeId};

#[derive(Default)]
pub struct Blackboard {
    resources: FxHashMap<TypeId, Box<dyn Any>>,
}

impl Blackboard {
    pub fn new() -> Blackboard {
        Default::default()
    }

    /// Stores `value`. If an entry of this type already exists it is kept
    /// and returned instead, with a warning.
    pub fn add<T: 'static>(&mut self, value: T) -> &mut T {
        use std::collections::hash_map::Entry;
        match self.resources.entry(TypeId::of::<T>()) {
            Entry::Occupied(entry) => {
                log::warn!("blackboard entry {} already exists", type_name::<T>());
                entry
                    .into_mut()
                    .downcast_mut()
                    .expect("entry stored under its own TypeId")
            }
            Entry::Vacant(entry) => entry
                .insert(Box::new(value))
                .downcast_mut()
                .expect("entry stored under its own TypeId"),
        }
    }

    /// Panics when the entry is missing; use [`try_get`](Self::try_get)
    /// for the fallible lookup.
    pub fn get<T: 'static>(&self) -> &T {
        self.try_get()
            .unwrap_or_else(|| panic!("blackboard entry {} does not exist", type_name::<T>()))
    }

    pub fn get_mut<T: 'static>(&mut self) -> &mut T {
        self.resources
            .get_mut(&TypeId::of::<T>())
            .and_then(|b| b.downcast_mut())
            .unwrap_or_else(|| panic!("blackboard entry {} does not exist", type_name::<T>()))
    }

    pub fn try_get<T: 'static>(&self) -> Option<&T> {
        self.resources
            .get(&TypeId::of::<T>())
            .and_then(|b| b.downcast_ref())
    }

    pub fn contains<T: 'static>(&self) -> bool {
        self.resources.contains_key(&TypeId::of::<T>())
    }

    pub fn remove<T: 'static>(&mut self) -> Option<T> {
        self.resources
            .remove(&TypeId::of::<T>())
            .and_then(|b| b.downcast().ok())
            .map(|b| *b)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::handle::ImageHandle;

    struct GBufferOutput {
        albedo: ImageHandle,
    }

    #[test]
    fn add_and_get() {
        let mut blackboard = Blackboard::new();
        let albedo = ImageHandle::mint();
        blackboard.add(GBufferOutput { albedo });
        assert!(blackboard.contains::<GBufferOutput>());
        assert_eq!(blackboard.get::<GBufferOutput>().albedo, albedo);
    }

    #[test]
    fn duplicate_add_keeps_first() {
        let mut blackboard = Blackboard::new();
        blackboard.add(1u32);
        blackboard.add(2u32);
        assert_eq!(*blackboard.get::<u32>(), 1);
    }

    #[test]
    fn remove_returns_value() {
        let mut blackboard = Blackboard::new();
        blackboard.add(7i64);
        assert_eq!(blackboard.remove::<i64>(), Some(7));
        assert!(!blackboard.contains::<i64>());
    }
}
