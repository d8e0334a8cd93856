//! Named labels and physical groups attached to entities.

use std::collections::{BTreeSet, HashMap, HashSet};

use crate::error::TagError;
use crate::selection::{Provenance, Selection};
use crate::topology::{EntityKind, EntityRef};

#[derive(Debug, Clone)]
struct Group {
    kind: EntityKind,
    members: Vec<EntityRef>,
    index: HashSet<EntityRef>,
}

/// Session-wide store of entity labels and named groups.
///
/// All writes are idempotent: adding a label or member twice has no
/// further effect.
#[derive(Debug, Default, Clone)]
pub struct TagStore {
    labels: HashMap<EntityRef, BTreeSet<String>>,
    groups: HashMap<String, Group>,
    group_order: Vec<String>,
}

impl TagStore {
    /// Creates an empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Attaches the label `name` to `entity`.
    pub fn add_tag(&mut self, entity: EntityRef, name: &str) {
        let labels = self.labels.entry(entity).or_default();
        if !labels.contains(name) {
            labels.insert(name.to_owned());
        }
    }

    /// Adds `entities` to the group `name`, creating it if needed.
    ///
    /// # Errors
    ///
    /// Returns [`TagError::GroupKindMismatch`] if an entity's kind differs from
    /// the group's; nothing is added in that case.
    pub fn add_to_group(&mut self, name: &str, entities: &[EntityRef]) -> Result<(), TagError> {
        let Some(first) = entities.first() else {
            return Ok(());
        };
        let expected = self.groups.get(name).map_or(first.kind(), |g| g.kind);
        if let Some(bad) = entities.iter().find(|e| e.kind() != expected) {
            return Err(TagError::GroupKindMismatch {
                name: name.to_owned(),
                expected,
                found: bad.kind(),
            });
        }

        if !self.groups.contains_key(name) {
            self.group_order.push(name.to_owned());
        }
        let group = self.groups.entry(name.to_owned()).or_insert_with(|| Group {
            kind: expected,
            members: Vec::new(),
            index: HashSet::new(),
        });
        for entity in entities {
            if group.index.insert(*entity) {
                group.members.push(*entity);
            }
        }
        Ok(())
    }

    /// Returns the members of group `name`, in insertion order.
    ///
    /// # Errors
    ///
    /// Returns [`TagError::UnknownGroup`] if no such group exists.
    pub fn members_of(&self, name: &str) -> Result<Selection, TagError> {
        let group = self
            .groups
            .get(name)
            .ok_or_else(|| TagError::UnknownGroup(name.to_owned()))?;
        Ok(Selection::new(
            group.kind,
            group.members.iter().copied(),
            Provenance::Group(name.to_owned()),
        ))
    }

    /// Returns the entity kind held by group `name`.
    #[must_use]
    pub fn group_kind(&self, name: &str) -> Option<EntityKind> {
        self.groups.get(name).map(|g| g.kind)
    }

    /// Returns the labels attached to `entity`.
    #[must_use]
    pub fn tags_of(&self, entity: EntityRef) -> BTreeSet<String> {
        self.labels.get(&entity).cloned().unwrap_or_default()
    }

    /// Returns `true` if `entity` carries the label `name`.
    #[must_use]
    pub fn has_label(&self, entity: EntityRef, name: &str) -> bool {
        self.labels.get(&entity).is_some_and(|l| l.contains(name))
    }

    /// Returns `true` if `entity` is a member of group `name`.
    #[must_use]
    pub fn in_group(&self, entity: EntityRef, name: &str) -> bool {
        self.groups
            .get(name)
            .is_some_and(|g| g.index.contains(&entity))
    }

    /// Returns the names of the groups `entity` belongs to, in creation order.
    #[must_use]
    pub fn groups_of(&self, entity: EntityRef) -> Vec<&str> {
        self.groups()
            .filter(|name| self.in_group(entity, name))
            .collect()
    }

    /// Iterates group names in creation order.
    pub fn groups(&self) -> impl Iterator<Item = &str> {
        self.group_order.iter().map(String::as_str)
    }
}
