//! Drives a meshing engine from a resolved configuration.

pub mod recording;

pub use recording::{EngineCall, RecordedMesh, RecordingEngine};

use tracing::{debug, info, warn};

use crate::config::{
    BoundaryLayer, GroupMergePolicy, MeshConfigModel, MeshConfiguration, MeshOptions,
    PhysicalGroup, StructuralHint,
};
use crate::error::{EngineError, GenerationError, Result, SelectionError};
use crate::tags::TagStore;
use crate::topology::{EntityRef, TopologyGraph};

/// The meshing kernel that turns registered directives into a mesh.
///
/// Entities are passed as [`EntityRef`]s; engines numbering entities from 1
/// use [`EntityRef::tag`].
pub trait MeshingEngine {
    /// Opaque handle to a generated mesh.
    type Mesh;

    /// Applies session-wide options.
    ///
    /// # Errors
    ///
    /// Returns an [`EngineError`] if the engine rejects an option.
    fn set_options(&mut self, options: &MeshOptions) -> std::result::Result<(), EngineError>;

    /// Sets the element size on a batch of entities.
    ///
    /// # Errors
    ///
    /// Returns an [`EngineError`] if the engine rejects the directive.
    fn set_size(
        &mut self,
        entities: &[EntityRef],
        size: f64,
    ) -> std::result::Result<(), EngineError>;

    /// Applies one structural hint to a batch of entities.
    ///
    /// # Errors
    ///
    /// Returns an [`EngineError`] if the engine rejects the directive.
    fn set_structural_hint(
        &mut self,
        entities: &[EntityRef],
        hint: &StructuralHint,
    ) -> std::result::Result<(), EngineError>;

    /// Grows one boundary layer from a batch of entities.
    ///
    /// # Errors
    ///
    /// Returns an [`EngineError`] if the engine rejects the directive.
    fn add_boundary_layer(
        &mut self,
        entities: &[EntityRef],
        spec: &BoundaryLayer,
    ) -> std::result::Result<(), EngineError>;

    /// Exports a named physical group.
    ///
    /// # Errors
    ///
    /// Returns an [`EngineError`] if the engine rejects the group.
    fn add_physical_group(&mut self, group: &PhysicalGroup) -> std::result::Result<(), EngineError>;

    /// Generates the mesh up to `dimension`.
    ///
    /// # Errors
    ///
    /// Returns an [`EngineError`] if meshing fails.
    fn generate(&mut self, dimension: u8) -> std::result::Result<Self::Mesh, EngineError>;

    /// Drops everything registered since the last successful generation.
    fn discard(&mut self);
}

/// Validates, resolves and registers all directives, then generates a mesh.
pub struct Generate<'a> {
    graph: &'a TopologyGraph,
    tags: &'a TagStore,
    config: &'a MeshConfigModel,
    policy: GroupMergePolicy,
    dimension: u8,
}

impl<'a> Generate<'a> {
    /// Creates a new `Generate` operation.
    #[must_use]
    pub fn new(
        graph: &'a TopologyGraph,
        tags: &'a TagStore,
        config: &'a MeshConfigModel,
        dimension: u8,
    ) -> Self {
        Self {
            graph,
            tags,
            config,
            policy: GroupMergePolicy::default(),
            dimension,
        }
    }

    #[must_use]
    pub fn policy(mut self, policy: GroupMergePolicy) -> Self {
        self.policy = policy;
        self
    }

    /// Executes the operation against `engine`.
    ///
    /// Registration order is options, sizes, structural hints, boundary
    /// layers, then physical groups. Entities sharing an identical value are
    /// registered in one call.
    ///
    /// # Errors
    ///
    /// Returns [`GenerationError::InvalidDimension`] if the requested dimension
    /// exceeds the shape's, any resolution error,
    /// [`SelectionError::ForeignEntity`] if a directive or group names an
    /// entity the graph does not hold, or [`GenerationError::GenerationFailed`]
    /// if the engine fails. Nothing reaches the engine unless the engine
    /// itself fails, in which case it is told to discard its registered state.
    pub fn execute<E: MeshingEngine + ?Sized>(&self, engine: &mut E) -> Result<E::Mesh> {
        let shape = self.graph.dimension();
        if self.dimension > 3 || self.dimension > shape {
            return Err(GenerationError::InvalidDimension {
                requested: self.dimension,
                shape,
            }
            .into());
        }

        let config = self.config.resolve(self.tags, self.policy)?;
        let mut referenced = config
            .directives
            .keys()
            .chain(config.groups.iter().flat_map(|g| &g.members));
        if let Some(foreign) = referenced.find(|e| !self.graph.contains(**e)) {
            return Err(SelectionError::ForeignEntity(*foreign).into());
        }
        info!(
            dimension = self.dimension,
            entities = config.directives.len(),
            groups = config.groups.len(),
            "Generating mesh"
        );

        let mesh = register(&config, engine).and_then(|()| engine.generate(self.dimension));
        match mesh {
            Ok(mesh) => {
                info!(dimension = self.dimension, "Mesh generated");
                Ok(mesh)
            }
            Err(source) => {
                warn!(
                    error = %source,
                    diagnostics = source.diagnostics.len(),
                    "Meshing engine failed, discarding registered state"
                );
                engine.discard();
                Err(GenerationError::GenerationFailed { source }.into())
            }
        }
    }
}

/// Entities sharing one value, in first-seen order.
struct Batches<T> {
    batches: Vec<(T, Vec<EntityRef>)>,
}

impl<T: PartialEq> Batches<T> {
    fn new() -> Self {
        Self {
            batches: Vec::new(),
        }
    }

    fn add(&mut self, value: T, entity: EntityRef) {
        match self.batches.iter_mut().find(|(v, _)| *v == value) {
            Some((_, entities)) => entities.push(entity),
            None => self.batches.push((value, vec![entity])),
        }
    }
}

fn register<E: MeshingEngine + ?Sized>(
    config: &MeshConfiguration,
    engine: &mut E,
) -> std::result::Result<(), EngineError> {
    let mut sizes = Batches::new();
    let mut hints = Batches::new();
    let mut layers = Batches::new();
    for (entity, directive) in &config.directives {
        if let Some(size) = directive.size {
            sizes.add(size, *entity);
        }
        for hint in &directive.hints {
            hints.add(hint, *entity);
        }
        if let Some(spec) = &directive.boundary_layer {
            layers.add(spec, *entity);
        }
    }

    engine.set_options(&config.options)?;
    for (size, entities) in &sizes.batches {
        debug!(size, count = entities.len(), "Registering element size");
        engine.set_size(entities, *size)?;
    }
    for (hint, entities) in &hints.batches {
        debug!(hint = hint.kind().name(), count = entities.len(), "Registering structural hint");
        engine.set_structural_hint(entities, hint)?;
    }
    for (spec, entities) in &layers.batches {
        debug!(
            first_layer = spec.first_layer,
            layers = spec.layers,
            count = entities.len(),
            "Registering boundary layer"
        );
        engine.add_boundary_layer(entities, spec)?;
    }
    for group in &config.groups {
        debug!(name = %group.name, count = group.members.len(), "Registering physical group");
        engine.add_physical_group(group)?;
    }
    Ok(())
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use crate::config::{DirectiveTarget, TransfiniteDistribution};
    use crate::error::{MeshqlError, TagError};
    use crate::kernel::BrepBuilder;
    use crate::math::Point3;
    use crate::topology::EntityKind;

    fn unit_box() -> TopologyGraph {
        let shape = BrepBuilder::new()
            .block(Point3::new(0.0, 0.0, 0.0), Point3::new(1.0, 1.0, 1.0))
            .build()
            .unwrap();
        TopologyGraph::load(&shape).unwrap()
    }

    #[test]
    fn registration_order_and_batching() {
        let graph = unit_box();
        let faces = graph.entities_of_type(EntityKind::Face).to_vec();
        let edges = graph.entities_of_type(EntityKind::Edge).to_vec();
        let mut tags = TagStore::new();
        tags.add_to_group("walls", &faces[2..]).unwrap();

        let mut config = MeshConfigModel::new();
        for face in &faces[..2] {
            config.set_size(&DirectiveTarget::Entity(*face), 0.1).unwrap();
        }
        config.set_size(&"walls".into(), 0.2).unwrap();
        let curve = StructuralHint::TransfiniteCurve {
            nodes: 5,
            distribution: TransfiniteDistribution::Progression,
            coef: 1.0,
        };
        for edge in &edges[..3] {
            config.set_structural_hint(&(*edge).into(), curve.clone()).unwrap();
        }
        config
            .set_boundary_layer(&faces[0].into(), BoundaryLayer::new(0.01, 1.2, 4))
            .unwrap();

        let mut engine = RecordingEngine::new();
        Generate::new(&graph, &tags, &config, 3)
            .execute(&mut engine)
            .unwrap();

        let calls = engine.calls();
        assert!(matches!(calls[0], EngineCall::SetOptions(_)));
        assert_eq!(
            calls[1],
            EngineCall::SetSize {
                entities: faces[..2].to_vec(),
                size: 0.1
            }
        );
        assert_eq!(
            calls[2],
            EngineCall::SetSize {
                entities: faces[2..].to_vec(),
                size: 0.2
            }
        );
        assert_eq!(
            calls[3],
            EngineCall::SetStructuralHint {
                entities: edges[..3].to_vec(),
                hint: curve
            }
        );
        assert!(matches!(calls[4], EngineCall::AddBoundaryLayer { .. }));
        assert!(matches!(calls[5], EngineCall::AddPhysicalGroup(ref g) if g.name == "walls"));
        assert_eq!(calls[6], EngineCall::Generate(3));
        assert_eq!(calls.len(), 7);
    }

    #[test]
    fn dimension_is_checked_before_the_engine() {
        let graph = unit_box();
        let mut engine = RecordingEngine::new();
        let err = Generate::new(&graph, &TagStore::new(), &MeshConfigModel::new(), 4)
            .execute(&mut engine)
            .unwrap_err();
        assert!(matches!(
            err,
            MeshqlError::Generation(GenerationError::InvalidDimension {
                requested: 4,
                shape: 3
            })
        ));
        assert!(engine.calls().is_empty());
    }

    #[test]
    fn resolution_errors_reach_no_engine() {
        let graph = unit_box();
        let mut config = MeshConfigModel::new();
        config.set_size(&"nowhere".into(), 1.0).unwrap();
        let mut engine = RecordingEngine::new();
        let err = Generate::new(&graph, &TagStore::new(), &config, 2)
            .execute(&mut engine)
            .unwrap_err();
        assert!(matches!(err, MeshqlError::Tag(TagError::UnknownGroup(_))));
        assert!(engine.calls().is_empty());
    }

    #[test]
    fn entities_of_another_shape_are_rejected() {
        let graph = unit_box();
        let stranger = EntityRef::new(EntityKind::Face, 59);
        let mut config = MeshConfigModel::new();
        config.set_size(&stranger.into(), 0.5).unwrap();
        let mut engine = RecordingEngine::new();
        let err = Generate::new(&graph, &TagStore::new(), &config, 3)
            .execute(&mut engine)
            .unwrap_err();
        assert!(matches!(
            err,
            MeshqlError::Selection(SelectionError::ForeignEntity(e)) if e == stranger
        ));
        assert!(engine.calls().is_empty());

        let mut tags = TagStore::new();
        tags.add_to_group("ghost", &[stranger]).unwrap();
        let err = Generate::new(&graph, &tags, &MeshConfigModel::new(), 3)
            .execute(&mut engine)
            .unwrap_err();
        assert!(matches!(err, MeshqlError::Selection(SelectionError::ForeignEntity(_))));
        assert!(engine.calls().is_empty());
    }

    #[test]
    fn engine_failure_discards() {
        let graph = unit_box();
        let mut tags = TagStore::new();
        tags.add_to_group("all", graph.entities_of_type(EntityKind::Face))
            .unwrap();
        let mut engine = RecordingEngine::new().fail_on_generate(
            EngineError::new("tetrahedralization failed").with_diagnostic("face 3 self-intersects"),
        );
        let err = Generate::new(&graph, &tags, &MeshConfigModel::new(), 3)
            .execute(&mut engine)
            .unwrap_err();
        let MeshqlError::Generation(GenerationError::GenerationFailed { source }) = err else {
            panic!("expected a generation failure");
        };
        assert_eq!(source.diagnostics, ["face 3 self-intersects"]);
        assert!(engine.discarded());
        assert!(engine.calls().is_empty());
    }
}
