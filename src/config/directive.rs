use crate::error::ConfigError;
use crate::topology::{EntityKind, EntityRef};

/// What a directive is attached to.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum DirectiveTarget {
    /// One entity; overrides anything inherited from groups.
    Entity(EntityRef),
    /// Every member of a named group.
    Group(String),
}

impl From<EntityRef> for DirectiveTarget {
    fn from(entity: EntityRef) -> Self {
        Self::Entity(entity)
    }
}

impl From<&str> for DirectiveTarget {
    fn from(group: &str) -> Self {
        Self::Group(group.to_owned())
    }
}

/// A graded stack of thin layers grown from the selected entities.
#[derive(Debug, Clone, PartialEq)]
pub struct BoundaryLayer {
    /// Thickness of the first layer.
    pub first_layer: f64,
    /// Growth ratio between consecutive layers.
    pub ratio: f64,
    /// Number of layers.
    pub layers: u32,
    /// Optional tag naming the region the layers grow into.
    pub grown_region: Option<String>,
}

impl BoundaryLayer {
    #[must_use]
    pub fn new(first_layer: f64, ratio: f64, layers: u32) -> Self {
        Self {
            first_layer,
            ratio,
            layers,
            grown_region: None,
        }
    }

    #[must_use]
    pub fn with_grown_region(mut self, tag: impl Into<String>) -> Self {
        self.grown_region = Some(tag.into());
        self
    }

    /// Total thickness of all layers.
    #[must_use]
    pub fn thickness(&self) -> f64 {
        (0..self.layers)
            .map(|i| self.first_layer * self.ratio.powf(f64::from(i)))
            .sum()
    }

    pub(crate) fn validate(&self) -> Result<(), ConfigError> {
        validate_size("first_layer", self.first_layer)?;
        if !self.ratio.is_finite() || self.ratio < 1.0 {
            return Err(ConfigError::invalid(
                "ratio",
                format!("must be at least 1, got {}", self.ratio),
            ));
        }
        if self.layers == 0 {
            return Err(ConfigError::invalid("layers", "must be a positive integer"));
        }
        if self.grown_region.as_deref().is_some_and(str::is_empty) {
            return Err(ConfigError::invalid("grown_region", "tag must not be empty"));
        }
        Ok(())
    }
}

pub(crate) fn validate_size(parameter: &'static str, value: f64) -> Result<(), ConfigError> {
    if value.is_finite() && value > 0.0 {
        Ok(())
    } else {
        Err(ConfigError::invalid(
            parameter,
            format!("must be positive and finite, got {value}"),
        ))
    }
}

/// Node spacing law along a transfinite curve.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransfiniteDistribution {
    Progression,
    Bump,
    Beta,
}

/// Triangle orientation of a transfinite surface.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransfiniteArrangement {
    Left,
    Right,
    AlternateLeft,
    AlternateRight,
    Alternate,
}

/// Surface meshing algorithms.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MeshAlgorithm2D {
    MeshAdapt,
    Automatic,
    InitialMeshOnly,
    Delaunay,
    FrontalDelaunay,
    Bamg,
    FrontalDelaunayQuads,
    PackingOfParallelograms,
    QuasiStructuredQuad,
}

/// Volume meshing algorithms.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MeshAlgorithm3D {
    Delaunay,
    InitialMeshOnly,
    Frontal,
    Mmg3d,
    RTree,
    Hxt,
}

/// Element subdivision applied after meshing.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SubdivisionAlgorithm {
    None,
    AllQuadrangles,
    AllHexahedra,
    Barycentric,
}

/// Structured-meshing and per-entity algorithm hints.
#[derive(Debug, Clone, PartialEq)]
pub enum StructuralHint {
    TransfiniteCurve {
        nodes: u32,
        distribution: TransfiniteDistribution,
        coef: f64,
    },
    TransfiniteSurface {
        arrangement: TransfiniteArrangement,
    },
    TransfiniteVolume,
    /// Merge triangles into quadrangles where the angle criterion (degrees) allows.
    Recombine {
        angle: f64,
    },
    Smoothing {
        passes: u32,
    },
    Algorithm2D(MeshAlgorithm2D),
}

/// The parameter slot a hint occupies; one value per slot per entity.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum HintKind {
    TransfiniteCurve,
    TransfiniteSurface,
    TransfiniteVolume,
    Recombine,
    Smoothing,
    Algorithm2D,
}

impl HintKind {
    /// The hint's name as used in error messages.
    #[must_use]
    pub fn name(self) -> &'static str {
        match self {
            Self::TransfiniteCurve => "transfinite curve",
            Self::TransfiniteSurface => "transfinite surface",
            Self::TransfiniteVolume => "transfinite volume",
            Self::Recombine => "recombine",
            Self::Smoothing => "smoothing",
            Self::Algorithm2D => "2D algorithm",
        }
    }

    /// Whether a later direct write silently replaces an earlier one.
    ///
    /// Transfinite node layouts must agree across neighbouring entities, so
    /// two different direct curve or surface layouts are a conflict.
    #[must_use]
    pub fn is_mergeable(self) -> bool {
        !matches!(self, Self::TransfiniteCurve | Self::TransfiniteSurface)
    }

    /// The only entity kind this hint applies to.
    #[must_use]
    pub fn applies_to(self) -> EntityKind {
        match self {
            Self::TransfiniteCurve => EntityKind::Edge,
            Self::TransfiniteVolume => EntityKind::Solid,
            Self::TransfiniteSurface | Self::Recombine | Self::Smoothing | Self::Algorithm2D => {
                EntityKind::Face
            }
        }
    }
}

impl StructuralHint {
    #[must_use]
    pub fn kind(&self) -> HintKind {
        match self {
            Self::TransfiniteCurve { .. } => HintKind::TransfiniteCurve,
            Self::TransfiniteSurface { .. } => HintKind::TransfiniteSurface,
            Self::TransfiniteVolume => HintKind::TransfiniteVolume,
            Self::Recombine { .. } => HintKind::Recombine,
            Self::Smoothing { .. } => HintKind::Smoothing,
            Self::Algorithm2D(_) => HintKind::Algorithm2D,
        }
    }

    pub(crate) fn validate(&self) -> Result<(), ConfigError> {
        match self {
            Self::TransfiniteCurve { nodes, coef, .. } => {
                if *nodes < 2 {
                    return Err(ConfigError::invalid(
                        "nodes",
                        format!("a transfinite curve needs at least 2 nodes, got {nodes}"),
                    ));
                }
                validate_size("coef", *coef)
            }
            Self::Recombine { angle } => {
                if angle.is_finite() && *angle > 0.0 && *angle <= 90.0 {
                    Ok(())
                } else {
                    Err(ConfigError::invalid(
                        "angle",
                        format!("must lie in (0, 90] degrees, got {angle}"),
                    ))
                }
            }
            Self::Smoothing { passes } if *passes == 0 => {
                Err(ConfigError::invalid("passes", "must be a positive integer"))
            }
            _ => Ok(()),
        }
    }

    pub(crate) fn check_kind(&self, kind: EntityKind) -> Result<(), ConfigError> {
        let expected = self.kind().applies_to();
        if kind == expected {
            Ok(())
        } else {
            Err(ConfigError::invalid(
                "hint",
                format!(
                    "{} applies to {expected} entities, not {kind}",
                    self.kind().name()
                ),
            ))
        }
    }
}
