//! Identity and lookup for scene entities.
//!
//! Records iterate in id order. The registry owns the id → record mapping
//! only: resources referenced from a payload (render handles, bodies) belong to
//! whoever created them, and [`EntityRegistry::remove`] hands the record back
//! so the caller can release them.

use std::collections::{BTreeMap, BTreeSet};
use std::fmt;

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

#[derive(Copy, Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct EntityId(pub u64);

impl fmt::Display for EntityId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "e{}", self.0)
    }
}

/// `{id, kind, data, tags}`. `kind` and `tags` are fixed at registration.
#[derive(Clone, Debug)]
pub struct Entity<D> {
    id: EntityId,
    kind: String,
    pub data: D,
    tags: BTreeSet<String>,
}

impl<D> Entity<D> {
    pub fn id(&self) -> EntityId {
        self.id
    }

    pub fn kind(&self) -> &str {
        &self.kind
    }

    pub fn tags(&self) -> &BTreeSet<String> {
        &self.tags
    }

    pub fn has_tag(&self, tag: &str) -> bool {
        self.tags.contains(tag)
    }
}

pub struct EntityRegistry<D> {
    entities: BTreeMap<EntityId, Entity<D>>,
    next_id: u64,
}

impl<D> Default for EntityRegistry<D> {
    fn default() -> Self {
        Self::new()
    }
}

impl<D> EntityRegistry<D> {
    pub fn new() -> Self {
        Self {
            entities: BTreeMap::new(),
            next_id: 1,
        }
    }

    /// Register a record under a caller-chosen id.
    pub fn insert(&mut self, id: EntityId, kind: &str, data: D, tags: &[&str]) -> Result<()> {
        if self.entities.contains_key(&id) {
            return Err(Error::DuplicateEntity(id));
        }
        // Keep spawn() from ever handing out an id the caller has used
        self.next_id = self.next_id.max(id.0.saturating_add(1));
        self.entities.insert(
            id,
            Entity {
                id,
                kind: kind.to_owned(),
                data,
                tags: tags.iter().map(|t| (*t).to_owned()).collect(),
            },
        );
        Ok(())
    }

    /// Register a record under a fresh id that has never been used.
    pub fn spawn(&mut self, kind: &str, data: D, tags: &[&str]) -> EntityId {
        let id = EntityId(self.next_id);
        self.next_id += 1;
        self.entities.insert(
            id,
            Entity {
                id,
                kind: kind.to_owned(),
                data,
                tags: tags.iter().map(|t| (*t).to_owned()).collect(),
            },
        );
        id
    }

    pub fn get(&self, id: EntityId) -> Result<&Entity<D>> {
        self.entities.get(&id).ok_or(Error::EntityNotFound(id))
    }

    pub fn get_mut(&mut self, id: EntityId) -> Result<&mut Entity<D>> {
        self.entities.get_mut(&id).ok_or(Error::EntityNotFound(id))
    }

    /// Unregister and return the record. Payload resources are not released.
    pub fn remove(&mut self, id: EntityId) -> Result<Entity<D>> {
        self.entities.remove(&id).ok_or(Error::EntityNotFound(id))
    }

    pub fn contains(&self, id: EntityId) -> bool {
        self.entities.contains_key(&id)
    }

    pub fn len(&self) -> usize {
        self.entities.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entities.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &Entity<D>> {
        self.entities.values()
    }

    pub fn iter_mut(&mut self) -> impl Iterator<Item = &mut Entity<D>> {
        self.entities.values_mut()
    }

    pub fn by_kind<'a>(&'a self, kind: &'a str) -> impl Iterator<Item = &'a Entity<D>> {
        self.entities.values().filter(move |e| e.kind == kind)
    }

    pub fn with_tag<'a>(&'a self, tag: &'a str) -> impl Iterator<Item = &'a Entity<D>> {
        self.entities.values().filter(move |e| e.tags.contains(tag))
    }

    /// Remove every record, returning them in id order for cleanup.
    pub fn drain(&mut self) -> Vec<Entity<D>> {
        std::mem::take(&mut self.entities).into_values().collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Debug, PartialEq)]
    enum Payload {
        Sprite(u32),
        Marker,
    }

    #[test]
    fn test_insert_get_remove() {
        let mut reg = EntityRegistry::new();
        reg.insert(EntityId(10), "player", Payload::Sprite(3), &["controllable"]).unwrap();
        let e = reg.get(EntityId(10)).unwrap();
        assert_eq!(e.kind(), "player");
        assert!(e.has_tag("controllable"));
        assert_eq!(e.data, Payload::Sprite(3));

        reg.get_mut(EntityId(10)).unwrap().data = Payload::Sprite(4);
        let removed = reg.remove(EntityId(10)).unwrap();
        assert_eq!(removed.data, Payload::Sprite(4));
        assert!(reg.is_empty());
    }

    #[test]
    fn test_unknown_and_duplicate_ids_are_errors() {
        let mut reg = EntityRegistry::new();
        reg.insert(EntityId(1), "a", Payload::Marker, &[]).unwrap();
        assert!(matches!(
            reg.insert(EntityId(1), "b", Payload::Marker, &[]),
            Err(Error::DuplicateEntity(EntityId(1)))
        ));
        assert!(matches!(reg.get(EntityId(2)), Err(Error::EntityNotFound(EntityId(2)))));
        reg.remove(EntityId(1)).unwrap();
        assert!(reg.remove(EntityId(1)).is_err());
    }

    #[test]
    fn test_spawn_never_reuses_ids() {
        let mut reg = EntityRegistry::new();
        reg.insert(EntityId(7), "block", Payload::Marker, &[]).unwrap();
        let a = reg.spawn("crate", Payload::Marker, &[]);
        assert_eq!(a, EntityId(8));
        reg.remove(a).unwrap();
        reg.remove(EntityId(7)).unwrap();
        let b = reg.spawn("crate", Payload::Marker, &[]);
        assert_eq!(b, EntityId(9));
    }

    #[test]
    fn test_bulk_queries_in_id_order() {
        let mut reg = EntityRegistry::new();
        let c2 = reg.spawn("crate", Payload::Sprite(2), &["pushable"]);
        let p = reg.spawn("player", Payload::Sprite(1), &["camera-target"]);
        let c1 = reg.spawn("crate", Payload::Sprite(3), &["pushable", "fragile"]);
        let crates: Vec<_> = reg.by_kind("crate").map(|e| e.id()).collect();
        assert_eq!(crates, vec![c2, c1]);
        let fragile: Vec<_> = reg.with_tag("fragile").map(|e| e.id()).collect();
        assert_eq!(fragile, vec![c1]);
        assert_eq!(reg.with_tag("camera-target").next().unwrap().id(), p);

        for e in reg.iter_mut().filter(|e| e.has_tag("pushable")) {
            e.data = Payload::Marker;
        }
        let markers: Vec<_> = reg
            .iter()
            .filter(|e| e.data == Payload::Marker)
            .map(|e| e.id())
            .collect();
        assert_eq!(markers, vec![c2, c1]);
        assert_eq!(reg.get(p).unwrap().data, Payload::Sprite(1));

        let drained = reg.drain();
        assert_eq!(drained.len(), 3);
        assert!(reg.is_empty());
    }
}
