//! Query evaluation: scoping a search to the current context and filtering it.

mod predicate;

pub use predicate::{GeometricPredicate, Predicate};

use tracing::debug;

use crate::error::SelectionError;
use crate::selection::{Context, Provenance, Selection};
use crate::tags::TagStore;
use crate::topology::{EntityKind, EntityRef, TopologyGraph};

/// Selects entities of one kind reachable from a context.
pub struct Select<'a> {
    kind: EntityKind,
    predicate: &'a Predicate,
    strict: bool,
}

impl<'a> Select<'a> {
    /// Creates a new `Select` query.
    #[must_use]
    pub fn new(kind: EntityKind, predicate: &'a Predicate) -> Self {
        Self {
            kind,
            predicate,
            strict: false,
        }
    }

    /// Requires a non-empty result.
    #[must_use]
    pub fn strict(mut self, strict: bool) -> Self {
        self.strict = strict;
        self
    }

    /// Executes the query.
    ///
    /// From the root context every entity of the kind is a candidate. From a
    /// context focused on the same kind, its own entities are. Otherwise the
    /// candidates are the entities of the kind adjacent to the focused ones.
    /// Matches keep candidate order.
    ///
    /// # Errors
    ///
    /// Returns [`SelectionError::EmptyResult`] if the query is strict and
    /// nothing matches.
    pub fn execute(
        &self,
        graph: &TopologyGraph,
        tags: &TagStore,
        context: &Context,
    ) -> Result<Selection, SelectionError> {
        let candidates = scope(graph, context, self.kind);
        let total = candidates.len();
        let selection = Selection::new(
            self.kind,
            candidates
                .into_iter()
                .filter(|e| self.predicate.matches(*e, graph, tags)),
            Provenance::Query(self.predicate.clone()),
        );
        debug!(
            kind = %self.kind,
            candidates = total,
            matched = selection.len(),
            "Evaluated query"
        );
        if self.strict && selection.is_empty() {
            return Err(SelectionError::EmptyResult { kind: self.kind });
        }
        Ok(selection)
    }
}

/// Candidate entities of `kind` reachable from `context`, deduplicated, in traversal order.
fn scope(graph: &TopologyGraph, context: &Context, kind: EntityKind) -> Vec<EntityRef> {
    let Some(focus) = context.selection() else {
        return graph.entities_of_type(kind).to_vec();
    };
    if focus.kind() == kind {
        return focus.entities().to_vec();
    }
    let adjacent = focus.iter().flat_map(|e| graph.adjacent(e, kind).iter().copied());
    Selection::new(kind, adjacent, Provenance::Explicit)
        .entities()
        .to_vec()
}
