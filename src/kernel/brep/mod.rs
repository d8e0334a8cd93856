//! In-memory boundary representation used as a reference geometry kernel.
//!
//! Entities live in typed arenas and reference each other by generational
//! IDs. Every call through [`GeometryKernel`] issues fresh handles, the way
//! external CAD kernels return new wrappers for the same sub-shape.

mod builder;

pub use builder::BrepBuilder;

use std::cell::RefCell;
use std::collections::HashMap;

use slotmap::SlotMap;

use super::{GeometryKernel, KernelHandle, Location, Probe, ProbeValue};
use crate::error::TopologyError;
use crate::math::{Aabb, Point3, Vector3};
use crate::topology::EntityKind;

slotmap::new_key_type! {
    /// Identifier for a vertex in a [`BrepShape`].
    pub struct VertexId;
    /// Identifier for an edge in a [`BrepShape`].
    pub struct EdgeId;
    /// Identifier for a face in a [`BrepShape`].
    pub struct FaceId;
    /// Identifier for a solid in a [`BrepShape`].
    pub struct SolidId;
}

/// A point of the shape.
#[derive(Debug, Clone)]
pub struct VertexData {
    pub point: Point3,
}

/// A straight edge between two vertices.
#[derive(Debug, Clone)]
pub struct EdgeData {
    pub start: VertexId,
    pub end: VertexId,
}

/// A planar face bounded by a closed loop of edges.
#[derive(Debug, Clone)]
pub struct FaceData {
    /// Boundary edges in loop order.
    pub edges: Vec<EdgeId>,
    /// Unit normal, outward for the solid that created the face.
    pub normal: Vector3,
}

/// A volume enclosed by faces.
#[derive(Debug, Clone)]
pub struct SolidData {
    pub faces: Vec<FaceId>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
enum Element {
    Vertex(VertexId),
    Edge(EdgeId),
    Face(FaceId),
    Solid(SolidId),
}

impl Element {
    fn kind(self) -> EntityKind {
        match self {
            Self::Vertex(_) => EntityKind::Vertex,
            Self::Edge(_) => EntityKind::Edge,
            Self::Face(_) => EntityKind::Face,
            Self::Solid(_) => EntityKind::Solid,
        }
    }
}

#[derive(Debug, Default)]
struct HandleTable {
    next: u64,
    issued: HashMap<u64, Element>,
}

/// A shape made of planar faces and straight edges.
#[derive(Debug, Default)]
pub struct BrepShape {
    vertices: SlotMap<VertexId, VertexData>,
    edges: SlotMap<EdgeId, EdgeData>,
    faces: SlotMap<FaceId, FaceData>,
    solids: SlotMap<SolidId, SolidData>,
    handles: RefCell<HandleTable>,
}

impl BrepShape {
    /// Returns the number of entities of `kind`.
    #[must_use]
    pub fn count(&self, kind: EntityKind) -> usize {
        match kind {
            EntityKind::Vertex => self.vertices.len(),
            EntityKind::Edge => self.edges.len(),
            EntityKind::Face => self.faces.len(),
            EntityKind::Solid => self.solids.len(),
        }
    }

    pub(crate) fn add_vertex(&mut self, data: VertexData) -> VertexId {
        self.vertices.insert(data)
    }

    pub(crate) fn add_edge(&mut self, data: EdgeData) -> EdgeId {
        self.edges.insert(data)
    }

    pub(crate) fn add_face(&mut self, data: FaceData) -> FaceId {
        self.faces.insert(data)
    }

    pub(crate) fn add_solid(&mut self, data: SolidData) -> SolidId {
        self.solids.insert(data)
    }

    pub(crate) fn vertex(&self, id: VertexId) -> Result<&VertexData, TopologyError> {
        self.vertices
            .get(id)
            .ok_or_else(|| TopologyError::Kernel("vertex not found".into()))
    }

    pub(crate) fn edge(&self, id: EdgeId) -> Result<&EdgeData, TopologyError> {
        self.edges
            .get(id)
            .ok_or_else(|| TopologyError::Kernel("edge not found".into()))
    }

    pub(crate) fn face(&self, id: FaceId) -> Result<&FaceData, TopologyError> {
        self.faces
            .get(id)
            .ok_or_else(|| TopologyError::Kernel("face not found".into()))
    }

    fn solid(&self, id: SolidId) -> Result<&SolidData, TopologyError> {
        self.solids
            .get(id)
            .ok_or_else(|| TopologyError::Kernel("solid not found".into()))
    }

    fn issue(&self, element: Element) -> KernelHandle {
        let mut table = self.handles.borrow_mut();
        table.next += 1;
        let id = table.next;
        table.issued.insert(id, element);
        KernelHandle(id)
    }

    fn lookup(&self, handle: KernelHandle) -> Result<Element, TopologyError> {
        self.handles
            .borrow()
            .issued
            .get(&handle.0)
            .copied()
            .ok_or_else(|| TopologyError::Kernel(format!("unknown handle {}", handle.0)))
    }

    fn elements(&self, kind: EntityKind) -> Vec<Element> {
        match kind {
            EntityKind::Vertex => self.vertices.keys().map(Element::Vertex).collect(),
            EntityKind::Edge => self.edges.keys().map(Element::Edge).collect(),
            EntityKind::Face => self.faces.keys().map(Element::Face).collect(),
            EntityKind::Solid => self.solids.keys().map(Element::Solid).collect(),
        }
    }

    /// Direct boundary of an element, one level down.
    fn boundary(&self, element: Element) -> Result<Vec<Element>, TopologyError> {
        Ok(match element {
            Element::Vertex(_) => Vec::new(),
            Element::Edge(id) => {
                let edge = self.edge(id)?;
                vec![Element::Vertex(edge.start), Element::Vertex(edge.end)]
            }
            Element::Face(id) => {
                self.face(id)?.edges.iter().copied().map(Element::Edge).collect()
            }
            Element::Solid(id) => {
                self.solid(id)?.faces.iter().copied().map(Element::Face).collect()
            }
        })
    }

    /// Every element of `kind` below `element`, in boundary traversal order.
    fn closure(&self, element: Element, kind: EntityKind) -> Result<Vec<Element>, TopologyError> {
        let mut frontier = vec![element];
        while frontier.first().is_some_and(|e| e.kind() > kind) {
            let mut next = Vec::new();
            for e in &frontier {
                for child in self.boundary(*e)? {
                    if !next.contains(&child) {
                        next.push(child);
                    }
                }
            }
            frontier = next;
        }
        Ok(frontier)
    }

    fn related(&self, element: Element, kind: EntityKind) -> Result<Vec<Element>, TopologyError> {
        if kind < element.kind() {
            return self.closure(element, kind);
        }
        if kind == element.kind() {
            return Ok(Vec::new());
        }
        let mut parents = Vec::new();
        for candidate in self.elements(kind) {
            if self.closure(candidate, element.kind())?.contains(&element) {
                parents.push(candidate);
            }
        }
        Ok(parents)
    }

    fn points(&self, element: Element) -> Result<Vec<Point3>, TopologyError> {
        let vertices = match element {
            Element::Vertex(_) => vec![element],
            _ => self.closure(element, EntityKind::Vertex)?,
        };
        vertices
            .into_iter()
            .map(|v| match v {
                Element::Vertex(id) => Ok(self.vertex(id)?.point),
                _ => Err(TopologyError::Kernel("vertex closure returned a non-vertex".into())),
            })
            .collect()
    }

    /// The highest kind present; its facets are one dimension lower.
    fn top_kind(&self) -> Option<EntityKind> {
        EntityKind::ALL.into_iter().rev().find(|k| self.count(*k) > 0)
    }

    fn location(&self, element: Element) -> Result<Location, TopologyError> {
        let Some(top) = self.top_kind() else {
            return Ok(Location::Exterior);
        };
        let Some(facet) = top.dim().checked_sub(1).and_then(EntityKind::from_dim) else {
            return Ok(Location::Exterior);
        };
        let facet_is_interior =
            |f: Element| -> Result<bool, TopologyError> { Ok(self.related(f, top)?.len() >= 2) };

        if element.kind() == facet {
            return Ok(if facet_is_interior(element)? {
                Location::Interior
            } else {
                Location::Exterior
            });
        }
        let facets = self.related(element, facet)?;
        let mut interior = !facets.is_empty();
        for f in facets {
            interior &= facet_is_interior(f)?;
        }
        Ok(if interior {
            Location::Interior
        } else {
            Location::Exterior
        })
    }
}

impl GeometryKernel for BrepShape {
    fn enumerate(&self, kind: EntityKind) -> Result<Vec<KernelHandle>, TopologyError> {
        Ok(self
            .elements(kind)
            .into_iter()
            .map(|e| self.issue(e))
            .collect())
    }

    fn adjacency(
        &self,
        handle: KernelHandle,
        kind: EntityKind,
    ) -> Result<Vec<KernelHandle>, TopologyError> {
        let element = self.lookup(handle)?;
        Ok(self
            .related(element, kind)?
            .into_iter()
            .map(|e| self.issue(e))
            .collect())
    }

    fn signature(&self, handle: KernelHandle) -> Result<Vec<Point3>, TopologyError> {
        self.points(self.lookup(handle)?)
    }

    fn classify(&self, handle: KernelHandle, probe: Probe) -> Result<ProbeValue, TopologyError> {
        let element = self.lookup(handle)?;
        match probe {
            Probe::Location => Ok(ProbeValue::Location(self.location(element)?)),
            Probe::Normal => Ok(ProbeValue::Normal(match element {
                Element::Face(id) => Some(self.face(id)?.normal),
                _ => None,
            })),
            Probe::Centroid | Probe::Bounds => {
                let points = self.points(element)?;
                let bounds = Aabb::from_points(&points)
                    .ok_or_else(|| TopologyError::Kernel("entity has no vertices".into()))?;
                if probe == Probe::Bounds {
                    return Ok(ProbeValue::Bounds(bounds));
                }
                #[allow(clippy::cast_precision_loss)]
                let n = points.len() as f64;
                let sum = points.iter().fold(Vector3::zeros(), |acc, p| acc + p.coords);
                Ok(ProbeValue::Point(Point3::from(sum / n)))
            }
        }
    }
}
