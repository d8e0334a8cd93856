//! The geometry-kernel boundary.
//!
//! A kernel enumerates a shape's sub-entities, reports adjacency and answers
//! geometric probes. Its handles are opaque and may be fresh on every call;
//! the topology graph maps them to stable [`EntityRef`](crate::topology::EntityRef)s
//! through their signatures.

pub mod brep;

use crate::error::TopologyError;
use crate::math::{Aabb, Point3, Vector3};
use crate::topology::EntityKind;

pub use brep::{BrepBuilder, BrepShape};

/// Opaque, possibly transient, handle issued by a geometry kernel.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct KernelHandle(pub u64);

/// Where an entity lies relative to the boundary of the solids it belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Location {
    /// Shared between solids, or otherwise inside the shape's outer boundary.
    Interior,
    /// On the outer boundary of the shape.
    Exterior,
}

/// A geometric question put to the kernel about one entity.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Probe {
    Location,
    Centroid,
    Normal,
    Bounds,
}

/// The kernel's answer to a [`Probe`].
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum ProbeValue {
    Location(Location),
    Point(Point3),
    /// Unit normal, `None` where the entity has no single normal.
    Normal(Option<Vector3>),
    Bounds(Aabb),
}

/// Geometric data the graph records for each entity at load time.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct EntityGeometry {
    pub location: Location,
    pub centroid: Point3,
    pub normal: Option<Vector3>,
    pub bounds: Aabb,
}

impl EntityGeometry {
    /// Diagonal of the bounding box; the length of a straight edge.
    #[must_use]
    pub fn extent(&self) -> f64 {
        (self.bounds.max - self.bounds.min).norm()
    }
}

/// Operations the topology graph needs from a geometry kernel.
pub trait GeometryKernel {
    /// Lists every entity of `kind` in a deterministic order.
    ///
    /// # Errors
    ///
    /// Returns [`TopologyError::Kernel`] if the kernel cannot enumerate the shape.
    fn enumerate(&self, kind: EntityKind) -> Result<Vec<KernelHandle>, TopologyError>;

    /// Lists the entities of `kind` adjacent to `handle`, above or below it.
    ///
    /// # Errors
    ///
    /// Returns [`TopologyError::Kernel`] if `handle` is not known to the kernel.
    fn adjacency(
        &self,
        handle: KernelHandle,
        kind: EntityKind,
    ) -> Result<Vec<KernelHandle>, TopologyError>;

    /// Returns characteristic points that identify the entity geometrically.
    ///
    /// The same entity must yield the same point set on every call, in any order.
    ///
    /// # Errors
    ///
    /// Returns [`TopologyError::Kernel`] if `handle` is not known to the kernel.
    fn signature(&self, handle: KernelHandle) -> Result<Vec<Point3>, TopologyError>;

    /// Answers a geometric probe about the entity.
    ///
    /// # Errors
    ///
    /// Returns [`TopologyError::Kernel`] if `handle` is not known to the kernel.
    fn classify(&self, handle: KernelHandle, probe: Probe) -> Result<ProbeValue, TopologyError>;
}

/// Probes all geometric data for one entity.
pub(crate) fn probe_geometry<K: GeometryKernel + ?Sized>(
    kernel: &K,
    handle: KernelHandle,
) -> Result<EntityGeometry, TopologyError> {
    let unexpected = |probe: Probe| {
        TopologyError::Kernel(format!("kernel answered {probe:?} with the wrong value kind"))
    };
    let ProbeValue::Location(location) = kernel.classify(handle, Probe::Location)? else {
        return Err(unexpected(Probe::Location));
    };
    let ProbeValue::Point(centroid) = kernel.classify(handle, Probe::Centroid)? else {
        return Err(unexpected(Probe::Centroid));
    };
    let ProbeValue::Normal(normal) = kernel.classify(handle, Probe::Normal)? else {
        return Err(unexpected(Probe::Normal));
    };
    let ProbeValue::Bounds(bounds) = kernel.classify(handle, Probe::Bounds)? else {
        return Err(unexpected(Probe::Bounds));
    };
    Ok(EntityGeometry {
        location,
        centroid,
        normal,
        bounds,
    })
}
