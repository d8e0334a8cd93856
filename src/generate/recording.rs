use super::MeshingEngine;
use crate::config::{BoundaryLayer, MeshOptions, PhysicalGroup, StructuralHint};
use crate::error::EngineError;
use crate::topology::EntityRef;

/// One instruction received by a [`RecordingEngine`].
#[derive(Debug, Clone, PartialEq)]
pub enum EngineCall {
    SetOptions(MeshOptions),
    SetSize {
        entities: Vec<EntityRef>,
        size: f64,
    },
    SetStructuralHint {
        entities: Vec<EntityRef>,
        hint: StructuralHint,
    },
    AddBoundaryLayer {
        entities: Vec<EntityRef>,
        spec: BoundaryLayer,
    },
    AddPhysicalGroup(PhysicalGroup),
    Generate(u8),
}

/// Summary of a dry-run mesh: the instruction stream that produced it.
#[derive(Debug, Clone, PartialEq)]
pub struct RecordedMesh {
    pub dimension: u8,
    pub calls: Vec<EngineCall>,
}

/// Dry-run meshing engine that records every instruction.
///
/// It can be told to fail on generation, after which it behaves like a real
/// engine rolling back: [`MeshingEngine::discard`] clears the recorded state.
#[derive(Debug, Default)]
pub struct RecordingEngine {
    calls: Vec<EngineCall>,
    failure: Option<EngineError>,
    discarded: bool,
}

impl RecordingEngine {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Makes every subsequent `generate` call fail with `error`.
    #[must_use]
    pub fn fail_on_generate(mut self, error: EngineError) -> Self {
        self.failure = Some(error);
        self
    }

    /// Instructions registered since the last discard.
    #[must_use]
    pub fn calls(&self) -> &[EngineCall] {
        &self.calls
    }

    /// Returns `true` once registered state has been discarded.
    #[must_use]
    pub fn discarded(&self) -> bool {
        self.discarded
    }

    /// Number of recorded `generate` instructions.
    #[must_use]
    pub fn generate_count(&self) -> usize {
        self.calls
            .iter()
            .filter(|c| matches!(c, EngineCall::Generate(_)))
            .count()
    }
}

impl MeshingEngine for RecordingEngine {
    type Mesh = RecordedMesh;

    fn set_options(&mut self, options: &MeshOptions) -> Result<(), EngineError> {
        self.calls.push(EngineCall::SetOptions(*options));
        Ok(())
    }

    fn set_size(&mut self, entities: &[EntityRef], size: f64) -> Result<(), EngineError> {
        self.calls.push(EngineCall::SetSize {
            entities: entities.to_vec(),
            size,
        });
        Ok(())
    }

    fn set_structural_hint(
        &mut self,
        entities: &[EntityRef],
        hint: &StructuralHint,
    ) -> Result<(), EngineError> {
        self.calls.push(EngineCall::SetStructuralHint {
            entities: entities.to_vec(),
            hint: hint.clone(),
        });
        Ok(())
    }

    fn add_boundary_layer(
        &mut self,
        entities: &[EntityRef],
        spec: &BoundaryLayer,
    ) -> Result<(), EngineError> {
        self.calls.push(EngineCall::AddBoundaryLayer {
            entities: entities.to_vec(),
            spec: spec.clone(),
        });
        Ok(())
    }

    fn add_physical_group(&mut self, group: &PhysicalGroup) -> Result<(), EngineError> {
        self.calls.push(EngineCall::AddPhysicalGroup(group.clone()));
        Ok(())
    }

    fn generate(&mut self, dimension: u8) -> Result<RecordedMesh, EngineError> {
        if let Some(error) = &self.failure {
            return Err(error.clone());
        }
        self.calls.push(EngineCall::Generate(dimension));
        Ok(RecordedMesh {
            dimension,
            calls: self.calls.clone(),
        })
    }

    fn discard(&mut self) {
        self.calls.clear();
        self.discarded = true;
    }
}
