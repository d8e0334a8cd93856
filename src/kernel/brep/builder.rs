use std::collections::HashMap;

use super::{BrepShape, EdgeData, EdgeId, FaceData, FaceId, SolidData, VertexData, VertexId};
use crate::error::TopologyError;
use crate::math::{Axis, Point3, Vector3, TOLERANCE};

/// Quantization step used to merge coincident vertices.
const WELD_STEP: f64 = 1e-9;

type WeldKey = [i64; 3];

enum Part {
    Block { min: Point3, max: Point3 },
    Rect { min: Point3, max: Point3 },
}

/// Builds a [`BrepShape`] from axis-aligned blocks and planar rectangles.
///
/// Parts that touch share their coincident vertices, edges and faces, so two
/// blocks meeting on a full face become two solids bounded by one common
/// face. Parts must meet conformally (shared faces must match exactly).
#[derive(Default)]
pub struct BrepBuilder {
    parts: Vec<Part>,
}

impl BrepBuilder {
    /// Creates an empty builder.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds a box solid spanning `min..max`.
    #[must_use]
    pub fn block(mut self, min: Point3, max: Point3) -> Self {
        self.parts.push(Part::Block { min, max });
        self
    }

    /// Adds a box cut through by the plane `axis = at`, as two solids sharing the cut face.
    #[must_use]
    pub fn split_block(self, min: Point3, max: Point3, axis: Axis, at: f64) -> Self {
        let mut lower_max = max;
        let mut upper_min = min;
        let i = axis_index(axis);
        lower_max[i] = at;
        upper_min[i] = at;
        self.block(min, lower_max).block(upper_min, max)
    }

    /// Adds a planar rectangle spanning `min..max`; exactly one axis must be flat.
    #[must_use]
    pub fn rect(mut self, min: Point3, max: Point3) -> Self {
        self.parts.push(Part::Rect { min, max });
        self
    }

    /// Executes the build, welding coincident entities.
    ///
    /// # Errors
    ///
    /// Returns [`TopologyError::InvalidShape`] if a block is degenerate or a
    /// rectangle is not flat along exactly one axis.
    pub fn build(self) -> Result<BrepShape, TopologyError> {
        let mut weld = Weld::default();
        for part in &self.parts {
            match part {
                Part::Block { min, max } => weld.block(min, max)?,
                Part::Rect { min, max } => weld.rect(min, max)?,
            }
        }
        Ok(weld.shape)
    }
}

fn axis_index(axis: Axis) -> usize {
    match axis {
        Axis::X => 0,
        Axis::Y => 1,
        Axis::Z => 2,
    }
}

#[derive(Default)]
struct Weld {
    shape: BrepShape,
    vertices: HashMap<WeldKey, VertexId>,
    edges: HashMap<(VertexId, VertexId), EdgeId>,
    faces: HashMap<Vec<VertexId>, FaceId>,
}

impl Weld {
    #[allow(clippy::cast_possible_truncation)]
    fn key(p: &Point3) -> WeldKey {
        [
            (p.x / WELD_STEP).round() as i64,
            (p.y / WELD_STEP).round() as i64,
            (p.z / WELD_STEP).round() as i64,
        ]
    }

    fn vertex(&mut self, point: Point3) -> VertexId {
        let shape = &mut self.shape;
        *self
            .vertices
            .entry(Self::key(&point))
            .or_insert_with(|| shape.add_vertex(VertexData { point }))
    }

    fn edge(&mut self, a: VertexId, b: VertexId) -> EdgeId {
        let key = if a < b { (a, b) } else { (b, a) };
        let shape = &mut self.shape;
        *self
            .edges
            .entry(key)
            .or_insert_with(|| shape.add_edge(EdgeData { start: a, end: b }))
    }

    /// Adds (or reuses) a face bounded by the closed loop through `corners`.
    fn face(&mut self, corners: &[Point3], normal: Vector3) -> FaceId {
        let ids: Vec<VertexId> = corners.iter().map(|c| self.vertex(*c)).collect();
        let mut key = ids.clone();
        key.sort();
        if let Some(existing) = self.faces.get(&key) {
            return *existing;
        }
        let n = ids.len();
        let edges = (0..n).map(|i| self.edge(ids[i], ids[(i + 1) % n])).collect();
        let id = self.shape.add_face(FaceData { edges, normal });
        self.faces.insert(key, id);
        id
    }

    fn block(&mut self, min: &Point3, max: &Point3) -> Result<(), TopologyError> {
        if (0..3).any(|i| max[i] - min[i] < TOLERANCE) {
            return Err(TopologyError::InvalidShape(format!(
                "degenerate block {min:?}..{max:?}"
            )));
        }
        let c = |x: f64, y: f64, z: f64| Point3::new(x, y, z);
        let (x0, y0, z0, x1, y1, z1) = (min.x, min.y, min.z, max.x, max.y, max.z);

        // Bottom, top, then the four sides in +X, +Y, -X, -Y order.
        let faces = [
            (vec![c(x0, y0, z0), c(x0, y1, z0), c(x1, y1, z0), c(x1, y0, z0)], -Vector3::z()),
            (vec![c(x0, y0, z1), c(x1, y0, z1), c(x1, y1, z1), c(x0, y1, z1)], Vector3::z()),
            (vec![c(x1, y0, z0), c(x1, y1, z0), c(x1, y1, z1), c(x1, y0, z1)], Vector3::x()),
            (vec![c(x0, y1, z0), c(x0, y1, z1), c(x1, y1, z1), c(x1, y1, z0)], Vector3::y()),
            (vec![c(x0, y0, z0), c(x0, y0, z1), c(x0, y1, z1), c(x0, y1, z0)], -Vector3::x()),
            (vec![c(x0, y0, z0), c(x1, y0, z0), c(x1, y0, z1), c(x0, y0, z1)], -Vector3::y()),
        ];
        let face_ids = faces
            .iter()
            .map(|(corners, normal)| self.face(corners, *normal))
            .collect();
        self.shape.add_solid(SolidData { faces: face_ids });
        Ok(())
    }

    fn rect(&mut self, min: &Point3, max: &Point3) -> Result<(), TopologyError> {
        let flat: Vec<usize> = (0..3).filter(|i| (max[*i] - min[*i]).abs() < TOLERANCE).collect();
        let [axis] = flat[..] else {
            return Err(TopologyError::InvalidShape(format!(
                "rectangle {min:?}..{max:?} must be flat along exactly one axis"
            )));
        };
        let (u, v) = ((axis + 1) % 3, (axis + 2) % 3);
        let corner = |a: f64, b: f64| {
            let mut p = *min;
            p[u] = a;
            p[v] = b;
            p
        };
        let corners = [
            corner(min[u], min[v]),
            corner(max[u], min[v]),
            corner(max[u], max[v]),
            corner(min[u], max[v]),
        ];
        let mut normal = Vector3::zeros();
        normal[axis] = 1.0;
        self.face(&corners, normal);
        Ok(())
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use crate::topology::EntityKind;

    fn p(x: f64, y: f64, z: f64) -> Point3 {
        Point3::new(x, y, z)
    }

    #[test]
    fn block_counts() {
        let shape = BrepBuilder::new()
            .block(p(0.0, 0.0, 0.0), p(1.0, 2.0, 3.0))
            .build()
            .unwrap();
        assert_eq!(shape.count(EntityKind::Vertex), 8);
        assert_eq!(shape.count(EntityKind::Edge), 12);
        assert_eq!(shape.count(EntityKind::Face), 6);
        assert_eq!(shape.count(EntityKind::Solid), 1);
    }

    #[test]
    fn adjacent_rects_share_an_edge() {
        let shape = BrepBuilder::new()
            .rect(p(0.0, 0.0, 0.0), p(1.0, 1.0, 0.0))
            .rect(p(1.0, 0.0, 0.0), p(2.0, 1.0, 0.0))
            .build()
            .unwrap();
        assert_eq!(shape.count(EntityKind::Face), 2);
        assert_eq!(shape.count(EntityKind::Edge), 7);
        assert_eq!(shape.count(EntityKind::Vertex), 6);
        assert_eq!(shape.count(EntityKind::Solid), 0);
    }

    #[test]
    fn degenerate_block_is_rejected() {
        let result = BrepBuilder::new()
            .block(p(0.0, 0.0, 0.0), p(1.0, 0.0, 1.0))
            .build();
        assert!(matches!(result, Err(TopologyError::InvalidShape(_))));
    }

    #[test]
    fn rect_must_be_flat() {
        let result = BrepBuilder::new()
            .rect(p(0.0, 0.0, 0.0), p(1.0, 1.0, 1.0))
            .build();
        assert!(matches!(result, Err(TopologyError::InvalidShape(_))));
    }
}
