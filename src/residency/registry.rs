//! Resource registry
//!
//! Owns every logical resource ever created. Ids are handed out in creation
//! order starting at 0 and never reused, so an id stays valid for the lifetime
//! of the registry.

use std::cmp::Ordering;
use std::fmt;
use std::hash::{Hash, Hasher};
use std::marker::PhantomData;

use crate::error::{SlotError, SlotResult};

/// Permanent id of a logical resource of type `T`
///
/// The type parameter keeps ids of one pool from being passed to another:
///
/// ```compile_fail
/// use slotted_renderer::{
///     DummyBackend, Material, MaterialManager, MaterialManagerConfig, ShadowMapConfig,
///     ShadowMapper,
/// };
///
/// let backend = DummyBackend::new();
/// let mut materials = MaterialManager::new(&backend, &MaterialManagerConfig::default()).unwrap();
/// let mut shadows = ShadowMapper::new(&backend, &ShadowMapConfig::default()).unwrap();
/// let gold = materials.create(Material::gold());
/// shadows.use_shadow_map(&backend, gold).unwrap();
/// ```
pub struct ResourceId<T> {
    index: u32,
    _marker: PhantomData<fn() -> T>,
}

impl<T> ResourceId<T> {
    pub(crate) fn new(index: u32) -> Self {
        Self {
            index,
            _marker: PhantomData,
        }
    }

    pub fn index(&self) -> u32 {
        self.index
    }
}

impl<T> Clone for ResourceId<T> {
    fn clone(&self) -> Self {
        *self
    }
}

impl<T> Copy for ResourceId<T> {}

impl<T> PartialEq for ResourceId<T> {
    fn eq(&self, other: &Self) -> bool {
        self.index == other.index
    }
}

impl<T> Eq for ResourceId<T> {}

impl<T> PartialOrd for ResourceId<T> {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl<T> Ord for ResourceId<T> {
    fn cmp(&self, other: &Self) -> Ordering {
        self.index.cmp(&other.index)
    }
}

impl<T> Hash for ResourceId<T> {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.index.hash(state);
    }
}

impl<T> fmt::Debug for ResourceId<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("ResourceId").field(&self.index).finish()
    }
}

impl<T> fmt::Display for ResourceId<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.index)
    }
}

/// A logical resource plus its residency bookkeeping.
///
/// `usage > 0` implies `slot.is_some()`.
#[derive(Debug, Clone)]
pub struct Entry<T> {
    pub resource: T,
    pub slot: Option<u32>,
    pub usage: u32,
    /// Mutated since the last upload of its record
    pub dirty: bool,
}

impl<T> Entry<T> {
    fn new(resource: T) -> Self {
        Self {
            resource,
            slot: None,
            usage: 0,
            dirty: false,
        }
    }

    pub fn is_active(&self) -> bool {
        self.slot.is_some()
    }
}

#[derive(Debug, Clone)]
pub struct Registry<T> {
    kind: &'static str,
    entries: Vec<Entry<T>>,
}

impl<T> Registry<T> {
    /// `kind` names the resource in `NotFound` errors.
    pub fn new(kind: &'static str) -> Self {
        Self {
            kind,
            entries: Vec::new(),
        }
    }

    pub fn create(&mut self, resource: T) -> ResourceId<T> {
        let id = ResourceId::new(self.entries.len() as u32);
        self.entries.push(Entry::new(resource));
        id
    }

    pub fn get(&self, id: ResourceId<T>) -> SlotResult<&Entry<T>> {
        self.entries
            .get(id.index as usize)
            .ok_or_else(|| SlotError::not_found(self.kind, id))
    }

    pub fn get_mut(&mut self, id: ResourceId<T>) -> SlotResult<&mut Entry<T>> {
        let kind = self.kind;
        self.entries
            .get_mut(id.index as usize)
            .ok_or_else(|| SlotError::not_found(kind, id))
    }

    pub fn contains(&self, id: ResourceId<T>) -> bool {
        (id.index as usize) < self.entries.len()
    }

    /// First resource in creation order matching `predicate`.
    pub fn find(&self, mut predicate: impl FnMut(&T) -> bool) -> Option<ResourceId<T>> {
        self.entries
            .iter()
            .position(|entry| predicate(&entry.resource))
            .map(|index| ResourceId::new(index as u32))
    }

    pub fn iter(&self) -> impl Iterator<Item = (ResourceId<T>, &Entry<T>)> + '_ {
        self.entries
            .iter()
            .enumerate()
            .map(|(index, entry)| (ResourceId::new(index as u32), entry))
    }

    pub fn iter_mut(&mut self) -> impl Iterator<Item = (ResourceId<T>, &mut Entry<T>)> + '_ {
        self.entries
            .iter_mut()
            .enumerate()
            .map(|(index, entry)| (ResourceId::new(index as u32), entry))
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_ids_are_sequential() {
        let mut registry = Registry::new("thing");
        let a = registry.create("a");
        let b = registry.create("b");
        assert_eq!(a.index(), 0);
        assert_eq!(b.index(), 1);
        assert_eq!(registry.len(), 2);
    }

    #[test]
    fn test_new_entries_are_inactive() {
        let mut registry = Registry::new("thing");
        let id = registry.create(1.5f32);
        let entry = registry.get(id).unwrap();
        assert_eq!(entry.slot, None);
        assert_eq!(entry.usage, 0);
        assert!(!entry.dirty);
        assert!(!entry.is_active());
    }

    #[test]
    fn test_unknown_id_is_not_found() {
        let registry = Registry::<u8>::new("thing");
        let err = registry.get(ResourceId::new(4)).unwrap_err();
        assert_eq!(err.to_string(), "thing not found: #4");
    }

    #[test]
    fn test_ids_compare_by_index() {
        let mut registry = Registry::new("thing");
        let a = registry.create("a");
        let b = registry.create("b");
        assert!(a < b);
        assert_eq!(registry.find(|name| *name == "b"), Some(b));
        assert_eq!(format!("{} {:?}", b, b), "#1 ResourceId(1)");
    }

    #[test]
    fn test_find_returns_first_match() {
        let mut registry = Registry::new("thing");
        registry.create("stone");
        let first = registry.create("brick");
        registry.create("brick");

        assert_eq!(registry.find(|name| *name == "brick"), Some(first));
        assert_eq!(registry.find(|name| *name == "glass"), None);
    }
}
