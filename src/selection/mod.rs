//! Ordered, deduplicated sets of entities and the context stack that focuses them.

pub mod context;

pub use context::{Context, ContextStack};

use std::collections::HashSet;

use crate::error::SelectionError;
use crate::query::Predicate;
use crate::topology::{EntityKind, EntityRef};

/// Where a selection came from.
#[derive(Debug, Clone, PartialEq)]
pub enum Provenance {
    /// Built directly by the caller.
    Explicit,
    /// Produced by a query.
    Query(Predicate),
    /// Looked up from a named group.
    Group(String),
    Union,
    Intersection,
    Difference,
}

/// An ordered sequence of distinct entities of one kind.
#[derive(Debug, Clone, PartialEq)]
pub struct Selection {
    kind: EntityKind,
    entities: Vec<EntityRef>,
    provenance: Provenance,
}

impl Selection {
    /// Creates a selection, keeping the first occurrence of each entity.
    ///
    /// Entities of another kind than `kind` are dropped.
    pub fn new(
        kind: EntityKind,
        entities: impl IntoIterator<Item = EntityRef>,
        provenance: Provenance,
    ) -> Self {
        let mut seen = HashSet::new();
        let entities = entities
            .into_iter()
            .filter(|e| e.kind() == kind && seen.insert(*e))
            .collect();
        Self {
            kind,
            entities,
            provenance,
        }
    }

    /// Creates an empty selection of `kind`.
    #[must_use]
    pub fn empty(kind: EntityKind) -> Self {
        Self::new(kind, Vec::new(), Provenance::Explicit)
    }

    /// Returns the kind shared by every entity.
    #[must_use]
    pub fn kind(&self) -> EntityKind {
        self.kind
    }

    /// Returns the entities in selection order.
    #[must_use]
    pub fn entities(&self) -> &[EntityRef] {
        &self.entities
    }

    /// Returns where the selection came from.
    #[must_use]
    pub fn provenance(&self) -> &Provenance {
        &self.provenance
    }

    /// Returns the number of entities.
    #[must_use]
    pub fn len(&self) -> usize {
        self.entities.len()
    }

    /// Returns `true` if the selection holds no entity.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entities.is_empty()
    }

    /// Returns `true` if `entity` is selected.
    #[must_use]
    pub fn contains(&self, entity: EntityRef) -> bool {
        self.entities.contains(&entity)
    }

    /// Iterates the entities in selection order.
    pub fn iter(&self) -> impl Iterator<Item = EntityRef> + '_ {
        self.entities.iter().copied()
    }

    /// Entities of either selection: left's order, then right's new entities.
    ///
    /// # Errors
    ///
    /// Returns [`SelectionError::KindMismatch`] if the kinds differ.
    pub fn union(&self, other: &Selection) -> Result<Selection, SelectionError> {
        self.check_kind(other)?;
        Ok(Selection::new(
            self.kind,
            self.iter().chain(other.iter()),
            Provenance::Union,
        ))
    }

    /// Entities of this selection that are also in `other`, in this order.
    ///
    /// # Errors
    ///
    /// Returns [`SelectionError::KindMismatch`] if the kinds differ.
    pub fn intersect(&self, other: &Selection) -> Result<Selection, SelectionError> {
        self.check_kind(other)?;
        let keep: HashSet<EntityRef> = other.iter().collect();
        Ok(Selection::new(
            self.kind,
            self.iter().filter(|e| keep.contains(e)),
            Provenance::Intersection,
        ))
    }

    /// Entities of this selection that are not in `other`, in this order.
    ///
    /// # Errors
    ///
    /// Returns [`SelectionError::KindMismatch`] if the kinds differ.
    pub fn difference(&self, other: &Selection) -> Result<Selection, SelectionError> {
        self.check_kind(other)?;
        let exclude: HashSet<EntityRef> = other.iter().collect();
        Ok(Selection::new(
            self.kind,
            self.iter().filter(|e| !exclude.contains(e)),
            Provenance::Difference,
        ))
    }

    fn check_kind(&self, other: &Selection) -> Result<(), SelectionError> {
        if self.kind == other.kind {
            Ok(())
        } else {
            Err(SelectionError::KindMismatch {
                left: self.kind,
                right: other.kind,
            })
        }
    }
}

impl<'a> IntoIterator for &'a Selection {
    type Item = &'a EntityRef;
    type IntoIter = std::slice::Iter<'a, EntityRef>;

    fn into_iter(self) -> Self::IntoIter {
        self.entities.iter()
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn faces(indices: &[u32]) -> Selection {
        Selection::new(
            EntityKind::Face,
            indices.iter().map(|i| EntityRef::new(EntityKind::Face, *i)),
            Provenance::Explicit,
        )
    }

    fn indices(selection: &Selection) -> Vec<usize> {
        selection.iter().map(EntityRef::index).collect()
    }

    #[test]
    fn construction_deduplicates_in_first_seen_order() {
        let s = faces(&[4, 2, 4, 1, 2]);
        assert_eq!(indices(&s), [4, 2, 1]);
    }

    #[test]
    fn union_is_left_then_right() {
        let u = faces(&[3, 1]).union(&faces(&[2, 1, 0])).unwrap();
        assert_eq!(indices(&u), [3, 1, 2, 0]);
        assert_eq!(u.provenance(), &Provenance::Union);
    }

    #[test]
    fn intersect_and_difference_keep_left_order() {
        let a = faces(&[5, 3, 1, 0]);
        let b = faces(&[0, 1, 9]);
        assert_eq!(indices(&a.intersect(&b).unwrap()), [1, 0]);
        assert_eq!(indices(&a.difference(&b).unwrap()), [5, 3]);
    }

    #[test]
    fn kinds_must_match() {
        let edges = Selection::new(
            EntityKind::Edge,
            [EntityRef::new(EntityKind::Edge, 0)],
            Provenance::Explicit,
        );
        assert!(matches!(
            faces(&[0]).union(&edges),
            Err(SelectionError::KindMismatch { .. })
        ));
    }

    #[test]
    fn foreign_kinds_are_dropped() {
        let s = Selection::new(
            EntityKind::Face,
            [EntityRef::new(EntityKind::Edge, 0), EntityRef::new(EntityKind::Face, 0)],
            Provenance::Explicit,
        );
        assert_eq!(s.len(), 1);
    }

    proptest! {
        #[test]
        fn union_holds_exactly_the_distinct_members(
            a in prop::collection::vec(0u32..20, 0..15),
            b in prop::collection::vec(0u32..20, 0..15),
        ) {
            let u = faces(&a).union(&faces(&b)).unwrap();
            let mut expected: Vec<u32> = a.iter().chain(b.iter()).copied().collect();
            expected.sort_unstable();
            expected.dedup();
            let mut got: Vec<u32> = u.iter().map(|e| e.index() as u32).collect();
            got.sort_unstable();
            prop_assert_eq!(got, expected);
        }

        #[test]
        fn intersection_is_a_subset_of_both(
            a in prop::collection::vec(0u32..20, 0..15),
            b in prop::collection::vec(0u32..20, 0..15),
        ) {
            let (sa, sb) = (faces(&a), faces(&b));
            let i = sa.intersect(&sb).unwrap();
            prop_assert!(i.iter().all(|e| sa.contains(e) && sb.contains(e)));
        }

        #[test]
        fn difference_excludes_the_right_operand(
            a in prop::collection::vec(0u32..20, 0..15),
            b in prop::collection::vec(0u32..20, 0..15),
        ) {
            let (sa, sb) = (faces(&a), faces(&b));
            let d = sa.difference(&sb).unwrap();
            prop_assert!(d.iter().all(|e| !sb.contains(e)));
            prop_assert_eq!(d.len() + sa.intersect(&sb).unwrap().len(), sa.len());
        }
    }
}
