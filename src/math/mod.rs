/// 3D point type.
pub type Point3 = nalgebra::Point3<f64>;

/// 3D vector type.
pub type Vector3 = nalgebra::Vector3<f64>;

/// Global geometric tolerance for floating-point comparisons.
pub const TOLERANCE: f64 = 1e-10;

/// A coordinate axis.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Axis {
    X,
    Y,
    Z,
}

impl Axis {
    /// Returns the component of `point` along this axis.
    #[must_use]
    pub fn of(self, point: &Point3) -> f64 {
        match self {
            Self::X => point.x,
            Self::Y => point.y,
            Self::Z => point.z,
        }
    }

    /// Returns the unit vector along this axis.
    #[must_use]
    pub fn unit(self) -> Vector3 {
        match self {
            Self::X => Vector3::x(),
            Self::Y => Vector3::y(),
            Self::Z => Vector3::z(),
        }
    }
}

/// An axis-aligned bounding box.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Aabb {
    /// Minimum corner of the bounding box.
    pub min: Point3,
    /// Maximum corner of the bounding box.
    pub max: Point3,
}

impl Aabb {
    /// Creates the smallest box containing every point, or `None` if there are none.
    #[must_use]
    pub fn from_points<'a>(points: impl IntoIterator<Item = &'a Point3>) -> Option<Self> {
        let mut iter = points.into_iter();
        let first = *iter.next()?;
        let mut aabb = Self {
            min: first,
            max: first,
        };
        for p in iter {
            aabb.min = aabb.min.inf(p);
            aabb.max = aabb.max.sup(p);
        }
        Some(aabb)
    }

    /// Returns the center of the box.
    #[must_use]
    pub fn center(&self) -> Point3 {
        nalgebra::center(&self.min, &self.max)
    }

    /// Returns `true` if `other` lies inside this box, within `tol`.
    #[must_use]
    pub fn contains(&self, other: &Aabb, tol: f64) -> bool {
        (0..3).all(|i| other.min[i] >= self.min[i] - tol && other.max[i] <= self.max[i] + tol)
    }
}
