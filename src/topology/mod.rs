//! Normalized, read-only view of a shape's sub-entities and their adjacency.

pub mod entity;
pub mod identity;

pub use entity::{EntityKind, EntityRef};
pub use identity::Fingerprint;

use std::collections::HashMap;

use tracing::{debug, info};

use crate::error::TopologyError;
use crate::kernel::{probe_geometry, EntityGeometry, GeometryKernel, KernelHandle};
use entity::PerKind;
use identity::IdentityMap;

/// Default quantization step for geometric identities.
pub const DEFAULT_IDENTITY_TOLERANCE: f64 = 1e-7;

/// Sub-entities of a loaded shape with adjacency between every pair of kinds.
///
/// Built once by [`TopologyGraph::load`]. Changes made to the source shape
/// afterwards are not reflected; load again instead.
#[derive(Debug)]
pub struct TopologyGraph {
    entities: PerKind<Vec<EntityRef>>,
    geometry: PerKind<Vec<EntityGeometry>>,
    adjacency: HashMap<(EntityRef, EntityKind), Vec<EntityRef>>,
    dimension: u8,
}

impl TopologyGraph {
    /// Loads a shape with the default identity tolerance.
    ///
    /// # Errors
    ///
    /// See [`TopologyGraph::load_with_tolerance`].
    pub fn load<K: GeometryKernel + ?Sized>(kernel: &K) -> Result<Self, TopologyError> {
        Self::load_with_tolerance(kernel, DEFAULT_IDENTITY_TOLERANCE)
    }

    /// Loads a shape, merging handles whose signatures agree within `tolerance`.
    ///
    /// # Errors
    ///
    /// Returns [`TopologyError::InvalidShape`] if the shape has no
    /// sub-entities, two entities share one identity, an adjacency refers to
    /// an entity that was never enumerated, or an entity lacks boundary
    /// entities of a kind the shape otherwise has. Kernel failures are
    /// passed through.
    pub fn load_with_tolerance<K: GeometryKernel + ?Sized>(
        kernel: &K,
        tolerance: f64,
    ) -> Result<Self, TopologyError> {
        let mut ids = IdentityMap::default();
        let mut entities: PerKind<Vec<EntityRef>> = PerKind::default();
        let mut geometry: PerKind<Vec<EntityGeometry>> = PerKind::default();
        let mut handles: Vec<(EntityRef, KernelHandle)> = Vec::new();

        for kind in EntityKind::ALL {
            for handle in kernel.enumerate(kind)? {
                let fingerprint = Fingerprint::new(kind, &kernel.signature(handle)?, tolerance)?;
                let entity = ids.mint(fingerprint)?;
                entities.get_mut(kind).push(entity);
                geometry.get_mut(kind).push(probe_geometry(kernel, handle)?);
                handles.push((entity, handle));
            }
        }

        let Some(top) = EntityKind::ALL
            .into_iter()
            .rev()
            .find(|k| !entities.get(*k).is_empty())
        else {
            return Err(TopologyError::InvalidShape("shape has no sub-entities".into()));
        };

        let mut adjacency = HashMap::new();
        for (entity, handle) in handles {
            for kind in EntityKind::ALL {
                if kind == entity.kind() {
                    continue;
                }
                let mut related: Vec<EntityRef> = Vec::new();
                for other in kernel.adjacency(handle, kind)? {
                    let fingerprint = Fingerprint::new(kind, &kernel.signature(other)?, tolerance)?;
                    let resolved = ids.lookup(&fingerprint).ok_or_else(|| {
                        TopologyError::InvalidShape(format!(
                            "{entity} is adjacent to a {kind} that was never enumerated"
                        ))
                    })?;
                    if !related.contains(&resolved) {
                        related.push(resolved);
                    }
                }
                if kind < entity.kind() && related.is_empty() && !entities.get(kind).is_empty() {
                    return Err(TopologyError::InvalidShape(format!(
                        "{entity} has no bounding {kind} entities"
                    )));
                }
                if !related.is_empty() {
                    adjacency.insert((entity, kind), related);
                }
            }
        }

        let graph = Self {
            entities,
            geometry,
            adjacency,
            dimension: top.dim(),
        };
        info!(
            vertices = graph.entities_of_type(EntityKind::Vertex).len(),
            edges = graph.entities_of_type(EntityKind::Edge).len(),
            faces = graph.entities_of_type(EntityKind::Face).len(),
            solids = graph.entities_of_type(EntityKind::Solid).len(),
            dimension = graph.dimension,
            "Loaded topology graph"
        );
        debug!(relations = graph.adjacency.len(), "Indexed adjacency");
        Ok(graph)
    }

    /// Returns all entities of `kind`, in the same order on every call.
    #[must_use]
    pub fn entities_of_type(&self, kind: EntityKind) -> &[EntityRef] {
        self.entities.get(kind)
    }

    /// Returns the entities of `kind` bounding, or bounded by, `entity`.
    #[must_use]
    pub fn adjacent(&self, entity: EntityRef, kind: EntityKind) -> &[EntityRef] {
        self.adjacency
            .get(&(entity, kind))
            .map(Vec::as_slice)
            .unwrap_or_default()
    }

    /// Returns `true` if `entity` was minted by this graph.
    #[must_use]
    pub fn contains(&self, entity: EntityRef) -> bool {
        entity.index() < self.entities.get(entity.kind()).len()
    }

    /// Returns the geometric data probed for `entity` at load time.
    #[must_use]
    pub fn geometry(&self, entity: EntityRef) -> Option<&EntityGeometry> {
        self.geometry.get(entity.kind()).get(entity.index())
    }

    /// Returns the shape's dimension: that of its highest non-empty kind.
    #[must_use]
    pub fn dimension(&self) -> u8 {
        self.dimension
    }
}
