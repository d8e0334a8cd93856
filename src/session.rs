//! Fluent, chain-style surface over a loaded shape.

use std::collections::HashMap;

use tracing::{debug, info};

use crate::config::{
    BoundaryLayer, DirectiveTarget, GroupMergePolicy, MeshAlgorithm2D, MeshAlgorithm3D,
    MeshConfigModel, StructuralHint, SubdivisionAlgorithm, TransfiniteArrangement,
    TransfiniteDistribution,
};
use crate::error::{ConfigError, Result, SelectionError};
use crate::generate::{Generate, MeshingEngine};
use crate::kernel::GeometryKernel;
use crate::query::{Predicate, Select};
use crate::selection::{ContextStack, Provenance, Selection};
use crate::tags::TagStore;
use crate::topology::{EntityKind, EntityRef, TopologyGraph, DEFAULT_IDENTITY_TOLERANCE};

/// Parameters for a meshing session.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SessionParams {
    /// Whether a query matching nothing is an error. Default: false
    pub strict: bool,

    /// How directives inherited from several groups combine.
    /// Default: [`GroupMergePolicy::LastWriteWins`]
    pub group_merge: GroupMergePolicy,

    /// Quantization step used to identify kernel handles. Default: 1e-7
    pub identity_tolerance: f64,
}

impl Default for SessionParams {
    fn default() -> Self {
        Self {
            strict: false,
            group_merge: GroupMergePolicy::default(),
            identity_tolerance: DEFAULT_IDENTITY_TOLERANCE,
        }
    }
}

impl SessionParams {
    /// Set strict query mode.
    #[must_use]
    pub const fn with_strict(mut self, strict: bool) -> Self {
        self.strict = strict;
        self
    }

    /// Set the group merge policy.
    #[must_use]
    pub const fn with_group_merge(mut self, policy: GroupMergePolicy) -> Self {
        self.group_merge = policy;
        self
    }

    /// Set the identity tolerance.
    #[must_use]
    pub const fn with_identity_tolerance(mut self, tolerance: f64) -> Self {
        self.identity_tolerance = tolerance;
        self
    }
}

/// Recombination angle, in degrees, used when a directive recombines on its own.
const AUTO_RECOMBINE_ANGLE: f64 = 45.0;

/// A loaded shape with its tags, directives and selection contexts.
///
/// Queries push a new context focused on their result; [`Session::end`]
/// returns to the previous one. Directive methods act on the focused
/// selection, or on every top-level entity at the root.
#[derive(Debug)]
pub struct Session {
    graph: TopologyGraph,
    tags: TagStore,
    config: MeshConfigModel,
    contexts: ContextStack,
    params: SessionParams,
}

impl Session {
    /// Loads a shape with default parameters.
    ///
    /// # Errors
    ///
    /// Returns a topology error if the shape cannot be loaded.
    pub fn load<K: GeometryKernel + ?Sized>(kernel: &K) -> Result<Self> {
        Self::load_with(kernel, SessionParams::default())
    }

    /// Loads a shape.
    ///
    /// # Errors
    ///
    /// Returns a topology error if the shape cannot be loaded.
    pub fn load_with<K: GeometryKernel + ?Sized>(
        kernel: &K,
        params: SessionParams,
    ) -> Result<Self> {
        let graph = TopologyGraph::load_with_tolerance(kernel, params.identity_tolerance)?;
        info!(
            dimension = graph.dimension(),
            strict = params.strict,
            "Started meshing session"
        );
        Ok(Self {
            graph,
            tags: TagStore::new(),
            config: MeshConfigModel::new(),
            contexts: ContextStack::new(),
            params,
        })
    }

    /// Returns the loaded shape's topology.
    #[must_use]
    pub fn graph(&self) -> &TopologyGraph {
        &self.graph
    }

    /// Returns the labels and groups written so far.
    #[must_use]
    pub fn tags(&self) -> &TagStore {
        &self.tags
    }

    /// Returns the directives written so far.
    #[must_use]
    pub fn config(&self) -> &MeshConfigModel {
        &self.config
    }

    /// Returns the selection context stack.
    #[must_use]
    pub fn contexts(&self) -> &ContextStack {
        &self.contexts
    }

    /// Returns the parameters the session was loaded with.
    #[must_use]
    pub fn params(&self) -> &SessionParams {
        &self.params
    }

    /// Runs a query from the current context without changing it.
    ///
    /// # Errors
    ///
    /// Returns [`SelectionError::EmptyResult`] in strict mode when nothing
    /// matches.
    pub fn select(&self, kind: EntityKind, predicate: &Predicate) -> Result<Selection> {
        let selection = Select::new(kind, predicate)
            .strict(self.params.strict)
            .execute(&self.graph, &self.tags, self.contexts.current())?;
        Ok(selection)
    }

    /// Every entity of `kind` in scope of the current context.
    fn scope(&self, kind: EntityKind) -> Result<Selection> {
        let selection = Select::new(kind, &Predicate::All).execute(
            &self.graph,
            &self.tags,
            self.contexts.current(),
        )?;
        Ok(selection)
    }

    /// Focuses an existing selection in a new context.
    ///
    /// # Errors
    ///
    /// Returns [`SelectionError::ForeignEntity`], pushing nothing, if the
    /// selection holds an entity the loaded shape does not.
    pub fn push_selection(&mut self, selection: Selection) -> Result<&mut Self> {
        if let Some(foreign) = selection.iter().find(|e| !self.graph.contains(*e)) {
            return Err(SelectionError::ForeignEntity(foreign).into());
        }
        self.contexts.push(selection);
        Ok(self)
    }

    fn narrow(&mut self, kind: EntityKind, predicate: &Predicate) -> Result<&mut Self> {
        let selection = self.select(kind, predicate)?;
        self.contexts.push(selection);
        Ok(self)
    }

    /// Selects vertices from the current context and focuses them.
    ///
    /// # Errors
    ///
    /// See [`Session::select`].
    pub fn vertices(&mut self, predicate: &Predicate) -> Result<&mut Self> {
        self.narrow(EntityKind::Vertex, predicate)
    }

    /// Selects edges from the current context and focuses them.
    ///
    /// # Errors
    ///
    /// See [`Session::select`].
    pub fn edges(&mut self, predicate: &Predicate) -> Result<&mut Self> {
        self.narrow(EntityKind::Edge, predicate)
    }

    /// Selects faces from the current context and focuses them.
    ///
    /// # Errors
    ///
    /// See [`Session::select`].
    pub fn faces(&mut self, predicate: &Predicate) -> Result<&mut Self> {
        self.narrow(EntityKind::Face, predicate)
    }

    /// Selects solids from the current context and focuses them.
    ///
    /// # Errors
    ///
    /// See [`Session::select`].
    pub fn solids(&mut self, predicate: &Predicate) -> Result<&mut Self> {
        self.narrow(EntityKind::Solid, predicate)
    }

    /// The focused selection; at the root, every entity of the shape's top kind.
    #[must_use]
    pub fn selection(&self) -> Selection {
        match self.contexts.current().selection() {
            Some(selection) => selection.clone(),
            None => {
                let kind =
                    EntityKind::from_dim(self.graph.dimension()).unwrap_or(EntityKind::Solid);
                Selection::new(
                    kind,
                    self.graph.entities_of_type(kind).iter().copied(),
                    Provenance::Explicit,
                )
            }
        }
    }

    /// Labels every focused entity.
    pub fn add_tag(&mut self, name: &str) -> &mut Self {
        for entity in self.selection().iter() {
            self.tags.add_tag(entity, name);
        }
        self
    }

    /// Adds the focused entities to a physical group.
    ///
    /// # Errors
    ///
    /// Returns [`crate::error::TagError::GroupKindMismatch`] if the group
    /// already holds entities of another kind.
    pub fn add_physical_group(&mut self, name: &str) -> Result<&mut Self> {
        let selection = self.selection();
        self.tags.add_to_group(name, selection.entities())?;
        debug!(name, count = selection.len(), "Added physical group members");
        Ok(self)
    }

    /// Sets the element size on the vertices in scope of the current context.
    ///
    /// Sizes are carried by points, so focusing a face sizes its corners.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::InvalidParameter`] for a size that is not
    /// positive and finite.
    pub fn set_mesh_size(&mut self, size: f64) -> Result<&mut Self> {
        for vertex in self.scope(EntityKind::Vertex)?.iter() {
            self.config.set_size(&DirectiveTarget::Entity(vertex), size)?;
        }
        Ok(self)
    }

    /// Sets the element size inherited by every member of a group.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::InvalidParameter`] for a size that is not
    /// positive and finite.
    pub fn set_group_mesh_size(&mut self, group: &str, size: f64) -> Result<&mut Self> {
        self.config.set_size(&DirectiveTarget::Group(group.to_owned()), size)?;
        Ok(self)
    }

    /// Grows a boundary layer from the focused entities, recombining the
    /// faces in scope when the layer is grown from faces or solids.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::InvalidParameter`] for an invalid layer
    /// specification.
    pub fn add_boundary_layer(
        &mut self,
        first_layer: f64,
        ratio: f64,
        layers: u32,
    ) -> Result<&mut Self> {
        self.add_boundary_layer_with(BoundaryLayer::new(first_layer, ratio, layers), true)
    }

    /// Grows a fully specified boundary layer from the focused entities.
    ///
    /// With `auto_recombine`, a layer grown from faces or solids also
    /// recombines the faces in scope.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::InvalidParameter`] for an invalid layer
    /// specification; nothing is written in that case.
    pub fn add_boundary_layer_with(
        &mut self,
        spec: BoundaryLayer,
        auto_recombine: bool,
    ) -> Result<&mut Self> {
        spec.validate()?;
        let focus = self.selection();
        for entity in focus.iter() {
            self.config
                .set_boundary_layer(&DirectiveTarget::Entity(entity), spec.clone())?;
        }
        if auto_recombine && focus.kind() >= EntityKind::Face {
            self.recombine(AUTO_RECOMBINE_ANGLE)?;
        }
        Ok(self)
    }

    /// Applies `hint` to the entities of its kind in scope of the current
    /// context, following the same scoping as queries.
    fn hint(&mut self, hint: StructuralHint) -> Result<&mut Self> {
        let targets = self.scope(hint.kind().applies_to())?;
        for entity in targets.iter() {
            self.config
                .set_structural_hint(&DirectiveTarget::Entity(entity), hint.clone())?;
        }
        Ok(self)
    }

    /// Makes the edges in scope transfinite with `nodes` nodes.
    ///
    /// A different layout already set on an edge is a conflict at generation;
    /// use [`Session::replace_transfinite_edge`] to change it.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::InvalidParameter`] for fewer than two nodes or a
    /// non-positive coefficient.
    pub fn set_transfinite_edge(
        &mut self,
        nodes: u32,
        distribution: TransfiniteDistribution,
        coef: f64,
    ) -> Result<&mut Self> {
        self.hint(StructuralHint::TransfiniteCurve {
            nodes,
            distribution,
            coef,
        })
    }

    /// Makes the edges in scope transfinite, replacing any layout they had.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::InvalidParameter`] for fewer than two nodes or a
    /// non-positive coefficient.
    pub fn replace_transfinite_edge(
        &mut self,
        nodes: u32,
        distribution: TransfiniteDistribution,
        coef: f64,
    ) -> Result<&mut Self> {
        let hint = StructuralHint::TransfiniteCurve {
            nodes,
            distribution,
            coef,
        };
        hint.validate()?;
        for edge in self.scope(EntityKind::Edge)?.iter() {
            self.config.replace_structural_hint(edge, hint.clone())?;
        }
        Ok(self)
    }

    /// Makes the faces in scope transfinite.
    ///
    /// # Errors
    ///
    /// Fails only if the configuration model rejects the hint.
    pub fn set_transfinite_face(
        &mut self,
        arrangement: TransfiniteArrangement,
    ) -> Result<&mut Self> {
        self.hint(StructuralHint::TransfiniteSurface { arrangement })
    }

    /// Makes the solids in scope transfinite.
    ///
    /// # Errors
    ///
    /// Fails only if the configuration model rejects the hint.
    pub fn set_transfinite_solid(&mut self) -> Result<&mut Self> {
        self.hint(StructuralHint::TransfiniteVolume)
    }

    /// Lays out a structured mesh over everything in scope.
    ///
    /// Solids (in a 3D shape) and faces in scope become transfinite. Edges
    /// facing each other across a four-sided face are grouped, transitively,
    /// and every edge of a group gets the same node count: the largest of
    /// `ceil(length / group length * max_nodes)` over the group, raised to
    /// at least `min_nodes`. Earlier layouts on those entities are replaced.
    /// With `auto_recombine` the faces in scope are recombined as well.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::InvalidParameter`], writing nothing, if a group
    /// would get fewer than two nodes.
    pub fn set_transfinite_auto(
        &mut self,
        max_nodes: u32,
        min_nodes: u32,
        auto_recombine: bool,
    ) -> Result<&mut Self> {
        let faces = self.scope(EntityKind::Face)?;
        let solids = if self.graph.dimension() == 3 {
            self.scope(EntityKind::Solid)?
        } else {
            Selection::empty(EntityKind::Solid)
        };

        let mut layout: Vec<(EntityRef, StructuralHint)> = Vec::new();
        for group in opposite_edge_groups(&self.graph, &faces) {
            let nodes = group_node_count(&self.graph, &group, max_nodes, min_nodes);
            if nodes < 2 {
                return Err(ConfigError::invalid(
                    "max_nodes",
                    format!("an edge group would get {nodes} nodes; raise max_nodes"),
                )
                .into());
            }
            let curve = StructuralHint::TransfiniteCurve {
                nodes,
                distribution: TransfiniteDistribution::Progression,
                coef: 1.0,
            };
            layout.extend(group.into_iter().map(|edge| (edge, curve.clone())));
        }
        let surface = StructuralHint::TransfiniteSurface {
            arrangement: TransfiniteArrangement::Left,
        };
        layout.extend(faces.iter().map(|face| (face, surface.clone())));
        layout.extend(
            solids
                .iter()
                .map(|solid| (solid, StructuralHint::TransfiniteVolume)),
        );

        debug!(
            faces = faces.len(),
            solids = solids.len(),
            entities = layout.len(),
            "Laid out transfinite mesh"
        );
        for (entity, hint) in layout {
            self.config.replace_structural_hint(entity, hint)?;
        }
        if auto_recombine {
            self.recombine(AUTO_RECOMBINE_ANGLE)?;
        }
        Ok(self)
    }

    /// Recombines triangles into quadrangles on the faces in scope.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::InvalidParameter`] for an angle outside
    /// (0, 90] degrees.
    pub fn recombine(&mut self, angle: f64) -> Result<&mut Self> {
        self.hint(StructuralHint::Recombine { angle })
    }

    /// Smooths the faces in scope.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::InvalidParameter`] for zero passes.
    pub fn smooth(&mut self, passes: u32) -> Result<&mut Self> {
        self.hint(StructuralHint::Smoothing { passes })
    }

    /// Overrides the surface algorithm on the faces in scope.
    ///
    /// # Errors
    ///
    /// Fails only if the configuration model rejects the hint.
    pub fn set_face_algorithm(&mut self, algorithm: MeshAlgorithm2D) -> Result<&mut Self> {
        self.hint(StructuralHint::Algorithm2D(algorithm))
    }

    /// Sets the session-wide surface algorithm.
    pub fn set_mesh_algorithm(&mut self, algorithm: MeshAlgorithm2D) -> &mut Self {
        self.config.set_algorithm_2d(algorithm);
        self
    }

    /// Sets the session-wide volume algorithm.
    pub fn set_mesh_algorithm_3d(&mut self, algorithm: MeshAlgorithm3D) -> &mut Self {
        self.config.set_algorithm_3d(algorithm);
        self
    }

    /// Sets the element subdivision applied after meshing.
    pub fn set_subdivision_algorithm(&mut self, algorithm: SubdivisionAlgorithm) -> &mut Self {
        self.config.set_subdivision(algorithm);
        self
    }

    /// Requests `passes` uniform refinements after generation.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::InvalidParameter`] for zero passes.
    pub fn refine(&mut self, passes: u32) -> Result<&mut Self> {
        self.config.set_refinements(passes)?;
        Ok(self)
    }

    /// Returns to the previous context.
    ///
    /// # Errors
    ///
    /// Returns [`SelectionError::EmptyContext`] at the root.
    pub fn end(&mut self) -> Result<&mut Self> {
        self.contexts.pop()?;
        Ok(self)
    }

    /// Pops exactly `count` contexts.
    ///
    /// # Errors
    ///
    /// Returns [`SelectionError::EmptyContext`], popping nothing, if fewer
    /// than `count` contexts are open.
    pub fn end_many(&mut self, count: usize) -> Result<&mut Self> {
        self.contexts.pop_many(count)?;
        Ok(self)
    }

    /// Returns to the root context.
    pub fn reset(&mut self) -> &mut Self {
        self.contexts.reset();
        self
    }

    /// Resolves every directive and drives `engine` to a mesh of `dimension`.
    ///
    /// # Errors
    ///
    /// See [`Generate::execute`].
    pub fn generate<E: MeshingEngine + ?Sized>(
        &self,
        engine: &mut E,
        dimension: u8,
    ) -> Result<E::Mesh> {
        Generate::new(&self.graph, &self.tags, &self.config, dimension)
            .policy(self.params.group_merge)
            .execute(engine)
    }
}

/// Groups the edges lying opposite each other on four-sided faces.
///
/// Edges of other faces form groups of their own. Groups keep first-seen order.
fn opposite_edge_groups(graph: &TopologyGraph, faces: &Selection) -> Vec<Vec<EntityRef>> {
    let mut groups: Vec<Vec<EntityRef>> = Vec::new();
    let mut group_of: HashMap<EntityRef, usize> = HashMap::new();
    for face in faces.iter() {
        let edges = graph.adjacent(face, EntityKind::Edge);
        let pairs: Vec<(EntityRef, EntityRef)> = match edges {
            [a, b, c, d] => vec![(*a, *c), (*b, *d)],
            _ => edges.iter().map(|e| (*e, *e)).collect(),
        };
        for (a, b) in pairs {
            match (group_of.get(&a).copied(), group_of.get(&b).copied()) {
                (None, None) => {
                    group_of.insert(a, groups.len());
                    group_of.insert(b, groups.len());
                    groups.push(if a == b { vec![a] } else { vec![a, b] });
                }
                (Some(i), None) => {
                    group_of.insert(b, i);
                    groups[i].push(b);
                }
                (None, Some(j)) => {
                    group_of.insert(a, j);
                    groups[j].push(a);
                }
                (Some(i), Some(j)) if i != j => {
                    let (keep, gone) = (i.min(j), i.max(j));
                    let moved = std::mem::take(&mut groups[gone]);
                    for edge in &moved {
                        group_of.insert(*edge, keep);
                    }
                    groups[keep].extend(moved);
                }
                _ => {}
            }
        }
    }
    groups.retain(|g| !g.is_empty());
    groups
}

#[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
fn group_node_count(
    graph: &TopologyGraph,
    group: &[EntityRef],
    max_nodes: u32,
    min_nodes: u32,
) -> u32 {
    let lengths: Vec<f64> = group
        .iter()
        .map(|e| graph.geometry(*e).map_or(0.0, |g| g.extent()))
        .collect();
    let total: f64 = lengths.iter().sum();
    lengths
        .iter()
        .map(|length| {
            let nodes = if total > 0.0 {
                (length * f64::from(max_nodes) / total).ceil() as u32
            } else {
                0
            };
            nodes.max(min_nodes)
        })
        .max()
        .unwrap_or(min_nodes)
}
