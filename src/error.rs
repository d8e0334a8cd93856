use thiserror::Error;

use crate::topology::{EntityKind, EntityRef};

/// Top-level error type for meshql.
#[derive(Debug, Error)]
pub enum MeshqlError {
    #[error(transparent)]
    Topology(#[from] TopologyError),

    #[error(transparent)]
    Selection(#[from] SelectionError),

    #[error(transparent)]
    Tag(#[from] TagError),

    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error(transparent)]
    Generation(#[from] GenerationError),
}

/// Errors raised while loading a shape into the topology graph.
#[derive(Debug, Error)]
pub enum TopologyError {
    #[error("invalid shape: {0}")]
    InvalidShape(String),

    #[error("geometry kernel error: {0}")]
    Kernel(String),
}

/// Errors related to selections, queries and the context stack.
#[derive(Debug, Error)]
pub enum SelectionError {
    #[error("cannot pop the root selection context")]
    EmptyContext,

    #[error("query for {kind} entities matched nothing")]
    EmptyResult { kind: EntityKind },

    #[error("selection kinds differ: {left} vs {right}")]
    KindMismatch { left: EntityKind, right: EntityKind },

    #[error("{0} is not an entity of the loaded shape")]
    ForeignEntity(EntityRef),
}

/// Errors related to tags and groups.
#[derive(Debug, Error)]
pub enum TagError {
    #[error("unknown group: {0}")]
    UnknownGroup(String),

    #[error("group `{name}` holds {expected} entities, got {found}")]
    GroupKindMismatch {
        name: String,
        expected: EntityKind,
        found: EntityKind,
    },
}

/// Errors related to mesh directives.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("invalid parameter {parameter}: {reason}")]
    InvalidParameter {
        parameter: &'static str,
        reason: String,
    },

    #[error("conflicting {parameter} directives on {entity}")]
    Conflict {
        parameter: &'static str,
        entity: String,
    },
}

/// Errors raised by the generation orchestrator.
#[derive(Debug, Error)]
pub enum GenerationError {
    #[error("invalid dimension {requested}: shape dimension is {shape}")]
    InvalidDimension { requested: u8, shape: u8 },

    #[error("mesh generation failed")]
    GenerationFailed {
        #[source]
        source: EngineError,
    },
}

/// Failure reported by a meshing engine, with its diagnostics.
#[derive(Debug, Clone, Error)]
#[error("{message}")]
pub struct EngineError {
    /// Human-readable failure summary.
    pub message: String,
    /// Engine-specific diagnostic lines.
    pub diagnostics: Vec<String>,
}

impl EngineError {
    /// Creates an engine error with no diagnostics.
    #[must_use]
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            diagnostics: Vec::new(),
        }
    }

    /// Attaches a diagnostic line.
    #[must_use]
    pub fn with_diagnostic(mut self, line: impl Into<String>) -> Self {
        self.diagnostics.push(line.into());
        self
    }
}

impl ConfigError {
    pub(crate) fn invalid(parameter: &'static str, reason: impl Into<String>) -> Self {
        Self::InvalidParameter {
            parameter,
            reason: reason.into(),
        }
    }
}

/// Convenience type alias for results using [`MeshqlError`].
pub type Result<T> = std::result::Result<T, MeshqlError>;

#[cfg(test)]
mod tests {
    use super::*;
    use std::error::Error as _;

    #[test]
    fn generation_failure_keeps_engine_source() {
        let err: MeshqlError = GenerationError::GenerationFailed {
            source: EngineError::new("no convergence").with_diagnostic("face 3"),
        }
        .into();
        assert_eq!(err.to_string(), "mesh generation failed");
        let source = err.source().map(ToString::to_string);
        assert_eq!(source.as_deref(), Some("no convergence"));
    }

    #[test]
    fn kind_mismatch_display() {
        let err = SelectionError::KindMismatch {
            left: EntityKind::Face,
            right: EntityKind::Edge,
        };
        assert_eq!(err.to_string(), "selection kinds differ: face vs edge");
    }
}
