use crate::kernel::{EntityGeometry, Location};
use crate::math::{Aabb, Axis, Point3, Vector3, TOLERANCE};
use crate::tags::TagStore;
use crate::topology::{EntityKind, EntityRef, TopologyGraph};

/// A geometric relation tested against data probed when the shape was loaded.
#[derive(Debug, Clone, PartialEq)]
pub enum GeometricPredicate {
    /// Not on the outer boundary of the shape (e.g. a face shared by two solids).
    Interior,
    /// On the outer boundary of the shape.
    Exterior,
    /// Unit normal within `tolerance` radians of `direction`.
    ///
    /// Entities without a normal never match.
    NormalAlong { direction: Vector3, tolerance: f64 },
    /// Centroid coordinate along `axis` within `min..=max`.
    CoordinateRange { axis: Axis, min: f64, max: f64 },
    /// Bounding box entirely inside the box `min..max`.
    Within { min: Point3, max: Point3 },
}

impl GeometricPredicate {
    fn matches(&self, geometry: &EntityGeometry) -> bool {
        match self {
            Self::Interior => geometry.location == Location::Interior,
            Self::Exterior => geometry.location == Location::Exterior,
            Self::NormalAlong {
                direction,
                tolerance,
            } => {
                let Some(normal) = geometry.normal else {
                    return false;
                };
                let Some(direction) = direction.try_normalize(TOLERANCE) else {
                    return false;
                };
                normal.angle(&direction) <= *tolerance
            }
            Self::CoordinateRange { axis, min, max } => {
                let c = axis.of(&geometry.centroid);
                c >= *min && c <= *max
            }
            Self::Within { min, max } => Aabb {
                min: *min,
                max: *max,
            }
            .contains(&geometry.bounds, TOLERANCE),
        }
    }
}

/// A closed set of entity filters.
#[derive(Debug, Clone, PartialEq)]
pub enum Predicate {
    /// Matches every entity.
    All,
    /// Matches entities of one kind.
    Kind(EntityKind),
    /// Matches entities carrying a label or belonging to a group of this name.
    Tagged(String),
    /// Matches members of a group.
    InGroup(String),
    Geometric(GeometricPredicate),
    Not(Box<Predicate>),
    And(Vec<Predicate>),
    Or(Vec<Predicate>),
}

impl Predicate {
    #[must_use]
    pub fn tagged(name: impl Into<String>) -> Self {
        Self::Tagged(name.into())
    }

    #[must_use]
    pub fn in_group(name: impl Into<String>) -> Self {
        Self::InGroup(name.into())
    }

    #[must_use]
    pub fn interior() -> Self {
        Self::Geometric(GeometricPredicate::Interior)
    }

    #[must_use]
    pub fn exterior() -> Self {
        Self::Geometric(GeometricPredicate::Exterior)
    }

    /// Matches entities whose normal points along `direction`, within `tolerance` radians.
    #[must_use]
    pub fn normal_along(direction: Vector3, tolerance: f64) -> Self {
        Self::Geometric(GeometricPredicate::NormalAlong {
            direction,
            tolerance,
        })
    }

    #[must_use]
    pub fn coordinate_range(axis: Axis, min: f64, max: f64) -> Self {
        Self::Geometric(GeometricPredicate::CoordinateRange { axis, min, max })
    }

    #[must_use]
    pub fn within(min: Point3, max: Point3) -> Self {
        Self::Geometric(GeometricPredicate::Within { min, max })
    }

    #[must_use]
    pub fn and(self, other: Predicate) -> Self {
        match self {
            Self::And(mut all) => {
                all.push(other);
                Self::And(all)
            }
            first => Self::And(vec![first, other]),
        }
    }

    #[must_use]
    pub fn or(self, other: Predicate) -> Self {
        match self {
            Self::Or(mut any) => {
                any.push(other);
                Self::Or(any)
            }
            first => Self::Or(vec![first, other]),
        }
    }

    #[must_use]
    #[allow(clippy::should_implement_trait)]
    pub fn not(self) -> Self {
        Self::Not(Box::new(self))
    }

    /// Evaluates the predicate for one entity.
    ///
    /// Entities unknown to `graph` fail every geometric test.
    #[must_use]
    pub fn matches(&self, entity: EntityRef, graph: &TopologyGraph, tags: &TagStore) -> bool {
        match self {
            Self::All => true,
            Self::Kind(kind) => entity.kind() == *kind,
            Self::Tagged(name) => tags.has_label(entity, name) || tags.in_group(entity, name),
            Self::InGroup(name) => tags.in_group(entity, name),
            Self::Geometric(geometric) => graph
                .geometry(entity)
                .is_some_and(|g| geometric.matches(g)),
            Self::Not(inner) => !inner.matches(entity, graph, tags),
            Self::And(all) => all.iter().all(|p| p.matches(entity, graph, tags)),
            Self::Or(any) => any.iter().any(|p| p.matches(entity, graph, tags)),
        }
    }
}
