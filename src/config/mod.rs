//! Per-entity and per-group meshing directives, and their resolution into one configuration.

mod directive;

pub use directive::{
    BoundaryLayer, DirectiveTarget, HintKind, MeshAlgorithm2D, MeshAlgorithm3D,
    StructuralHint, SubdivisionAlgorithm, TransfiniteArrangement, TransfiniteDistribution,
};

use std::collections::{BTreeMap, BTreeSet, HashMap};

use tracing::debug;

use crate::error::{ConfigError, Result, TagError};
use crate::tags::TagStore;
use crate::topology::{EntityKind, EntityRef};
use directive::validate_size;

/// How values inherited from different groups combine on one entity.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum GroupMergePolicy {
    /// The most recent group write wins.
    #[default]
    LastWriteWins,
    /// The smallest element size wins; other parameters follow the most recent write.
    Finest,
}

/// Session-wide meshing options.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct MeshOptions {
    pub algorithm_2d: Option<MeshAlgorithm2D>,
    pub algorithm_3d: Option<MeshAlgorithm3D>,
    pub subdivision: Option<SubdivisionAlgorithm>,
    /// Uniform refinement passes after generation.
    pub refinements: u32,
}

#[derive(Debug, Clone)]
struct Stamped<T> {
    value: T,
    seq: u64,
}

#[derive(Debug, Clone, Default)]
struct DirectRecord {
    size: Option<f64>,
    boundary_layer: Option<BoundaryLayer>,
    /// Distinct direct values per slot; more than one only for non-mergeable hints.
    hints: BTreeMap<HintKind, Vec<StructuralHint>>,
}

#[derive(Debug, Clone, Default)]
struct GroupRecord {
    size: Option<Stamped<f64>>,
    boundary_layer: Option<Stamped<BoundaryLayer>>,
    hints: BTreeMap<HintKind, Stamped<StructuralHint>>,
}

/// The effective directive of one entity after resolution.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct EffectiveDirective {
    pub size: Option<f64>,
    pub boundary_layer: Option<BoundaryLayer>,
    /// At most one hint per [`HintKind`], in slot order.
    pub hints: Vec<StructuralHint>,
}

/// A named group exported to the meshing engine.
#[derive(Debug, Clone, PartialEq)]
pub struct PhysicalGroup {
    pub name: String,
    pub kind: EntityKind,
    pub members: Vec<EntityRef>,
}

/// The merged view the generation orchestrator consumes.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct MeshConfiguration {
    pub directives: BTreeMap<EntityRef, EffectiveDirective>,
    pub groups: Vec<PhysicalGroup>,
    pub options: MeshOptions,
}

impl MeshConfiguration {
    /// Returns the effective directive of `entity`, if it has any.
    #[must_use]
    pub fn directive(&self, entity: EntityRef) -> Option<&EffectiveDirective> {
        self.directives.get(&entity)
    }

    /// Returns the effective element size of `entity`.
    #[must_use]
    pub fn size_of(&self, entity: EntityRef) -> Option<f64> {
        self.directive(entity).and_then(|d| d.size)
    }

    /// Returns `true` if any entity carries a transfinite hint.
    #[must_use]
    pub fn is_structured(&self) -> bool {
        self.directives.values().flat_map(|d| &d.hints).any(|h| {
            matches!(
                h.kind(),
                HintKind::TransfiniteCurve
                    | HintKind::TransfiniteSurface
                    | HintKind::TransfiniteVolume
            )
        })
    }
}

/// Accumulates meshing directives keyed by entity or group.
///
/// Every setter validates before writing, so a rejected call leaves the
/// model untouched.
#[derive(Debug, Clone, Default)]
pub struct MeshConfigModel {
    direct: BTreeMap<EntityRef, DirectRecord>,
    groups: HashMap<String, GroupRecord>,
    options: MeshOptions,
    seq: u64,
}

impl MeshConfigModel {
    /// Creates an empty model.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    fn stamp<T>(&mut self, value: T) -> Stamped<T> {
        self.seq += 1;
        Stamped {
            value,
            seq: self.seq,
        }
    }

    /// Sets the target element size.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::InvalidParameter`] if `size` is not positive and finite.
    pub fn set_size(&mut self, target: &DirectiveTarget, size: f64) -> Result<()> {
        validate_size("size", size)?;
        match target {
            DirectiveTarget::Entity(e) => self.direct.entry(*e).or_default().size = Some(size),
            DirectiveTarget::Group(name) => {
                let stamped = self.stamp(size);
                self.groups.entry(name.clone()).or_default().size = Some(stamped);
            }
        }
        Ok(())
    }

    /// Sets the boundary layer grown from the target.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::InvalidParameter`] if the first-layer size is
    /// not positive, the ratio is below 1, or there are no layers.
    pub fn set_boundary_layer(
        &mut self,
        target: &DirectiveTarget,
        spec: BoundaryLayer,
    ) -> Result<()> {
        spec.validate()?;
        match target {
            DirectiveTarget::Entity(e) => {
                self.direct.entry(*e).or_default().boundary_layer = Some(spec);
            }
            DirectiveTarget::Group(name) => {
                let stamped = self.stamp(spec);
                self.groups.entry(name.clone()).or_default().boundary_layer = Some(stamped);
            }
        }
        Ok(())
    }

    /// Sets a structural hint on the target.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::InvalidParameter`] if the hint's parameters are
    /// out of range or it does not apply to the target entity's kind.
    pub fn set_structural_hint(
        &mut self,
        target: &DirectiveTarget,
        hint: StructuralHint,
    ) -> Result<()> {
        hint.validate()?;
        let slot = hint.kind();
        match target {
            DirectiveTarget::Entity(e) => {
                hint.check_kind(e.kind())?;
                let record = self.direct.entry(*e).or_default();
                let values = record.hints.entry(slot).or_default();
                if slot.is_mergeable() {
                    values.clear();
                    values.push(hint);
                } else if !values.contains(&hint) {
                    values.push(hint);
                }
            }
            DirectiveTarget::Group(name) => {
                let stamped = self.stamp(hint);
                self.groups
                    .entry(name.clone())
                    .or_default()
                    .hints
                    .insert(slot, stamped);
            }
        }
        Ok(())
    }

    /// Sets a structural hint on an entity, dropping any direct value it
    /// already holds in the same slot.
    ///
    /// Unlike [`MeshConfigModel::set_structural_hint`], a different
    /// transfinite layout replaces the previous one instead of conflicting.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::InvalidParameter`] if the hint's parameters are
    /// out of range or it does not apply to the entity's kind.
    pub fn replace_structural_hint(
        &mut self,
        entity: EntityRef,
        hint: StructuralHint,
    ) -> Result<()> {
        hint.validate()?;
        hint.check_kind(entity.kind())?;
        let values = self
            .direct
            .entry(entity)
            .or_default()
            .hints
            .entry(hint.kind())
            .or_default();
        values.clear();
        values.push(hint);
        Ok(())
    }

    /// Sets the session-wide surface algorithm.
    pub fn set_algorithm_2d(&mut self, algorithm: MeshAlgorithm2D) {
        self.options.algorithm_2d = Some(algorithm);
    }

    /// Sets the session-wide volume algorithm.
    pub fn set_algorithm_3d(&mut self, algorithm: MeshAlgorithm3D) {
        self.options.algorithm_3d = Some(algorithm);
    }

    /// Sets the element subdivision applied after meshing.
    pub fn set_subdivision(&mut self, algorithm: SubdivisionAlgorithm) {
        self.options.subdivision = Some(algorithm);
    }

    /// Sets the number of uniform refinement passes.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::InvalidParameter`] if `passes` is zero.
    pub fn set_refinements(&mut self, passes: u32) -> Result<()> {
        if passes == 0 {
            return Err(ConfigError::invalid("refinements", "must be a positive integer").into());
        }
        self.options.refinements = passes;
        Ok(())
    }

    /// Returns the session-wide options.
    #[must_use]
    pub fn options(&self) -> &MeshOptions {
        &self.options
    }

    /// Returns the size written directly on the target, ignoring inheritance.
    #[must_use]
    pub fn size_of(&self, target: &DirectiveTarget) -> Option<f64> {
        match target {
            DirectiveTarget::Entity(e) => self.direct.get(e).and_then(|r| r.size),
            DirectiveTarget::Group(g) => self
                .groups
                .get(g)
                .and_then(|r| r.size.as_ref())
                .map(|s| s.value),
        }
    }

    /// Returns the boundary layer written directly on the target.
    #[must_use]
    pub fn boundary_layer_of(&self, target: &DirectiveTarget) -> Option<&BoundaryLayer> {
        match target {
            DirectiveTarget::Entity(e) => {
                self.direct.get(e).and_then(|r| r.boundary_layer.as_ref())
            }
            DirectiveTarget::Group(g) => self
                .groups
                .get(g)
                .and_then(|r| r.boundary_layer.as_ref())
                .map(|s| &s.value),
        }
    }

    /// Merges all directives into one configuration.
    ///
    /// Direct directives override group ones. Among groups, `policy` decides.
    ///
    /// # Errors
    ///
    /// Returns [`TagError::UnknownGroup`] for a directive on a group that has
    /// no members, [`ConfigError::InvalidParameter`] for a group hint that
    /// does not apply to the group's kind, and [`ConfigError::Conflict`] when
    /// an entity has two different direct values of a non-mergeable hint.
    pub fn resolve(&self, tags: &TagStore, policy: GroupMergePolicy) -> Result<MeshConfiguration> {
        let mut inherited: BTreeMap<EntityRef, Vec<&GroupRecord>> = BTreeMap::new();
        let mut names: Vec<&String> = self.groups.keys().collect();
        names.sort();
        for name in names {
            let record = &self.groups[name];
            let kind = tags
                .group_kind(name)
                .ok_or_else(|| TagError::UnknownGroup(name.clone()))?;
            for stamped in record.hints.values() {
                stamped.value.check_kind(kind)?;
            }
            for member in tags.members_of(name)?.iter() {
                inherited.entry(member).or_default().push(record);
            }
        }

        let entities: BTreeSet<EntityRef> = self
            .direct
            .keys()
            .chain(inherited.keys())
            .copied()
            .collect();

        let mut directives = BTreeMap::new();
        for entity in entities {
            let direct = self.direct.get(&entity);
            let groups = inherited.get(&entity).map_or(&[][..], Vec::as_slice);
            let effective = resolve_entity(entity, direct, groups, policy)?;
            if effective != EffectiveDirective::default() {
                directives.insert(entity, effective);
            }
        }

        let groups = tags
            .groups()
            .map(|name| {
                let members = tags.members_of(name)?;
                Ok(PhysicalGroup {
                    name: name.to_owned(),
                    kind: members.kind(),
                    members: members.entities().to_vec(),
                })
            })
            .collect::<Result<Vec<_>>>()?;

        debug!(
            entities = directives.len(),
            groups = groups.len(),
            "Resolved mesh configuration"
        );
        Ok(MeshConfiguration {
            directives,
            groups,
            options: self.options,
        })
    }
}

fn latest<'a, T>(values: impl Iterator<Item = &'a Stamped<T>>) -> Option<&'a T>
where
    T: 'a,
{
    values.max_by_key(|s| s.seq).map(|s| &s.value)
}

fn resolve_entity(
    entity: EntityRef,
    direct: Option<&DirectRecord>,
    groups: &[&GroupRecord],
    policy: GroupMergePolicy,
) -> Result<EffectiveDirective> {
    let group_sizes = groups.iter().filter_map(|g| g.size.as_ref());
    let inherited_size = match policy {
        GroupMergePolicy::LastWriteWins => latest(group_sizes).copied(),
        GroupMergePolicy::Finest => group_sizes.map(|s| s.value).reduce(f64::min),
    };
    let size = direct.and_then(|d| d.size).or(inherited_size);

    let boundary_layer = direct
        .and_then(|d| d.boundary_layer.clone())
        .or_else(|| latest(groups.iter().filter_map(|g| g.boundary_layer.as_ref())).cloned());

    let mut slots: BTreeSet<HintKind> = BTreeSet::new();
    if let Some(d) = direct {
        slots.extend(d.hints.keys().copied());
    }
    for g in groups {
        slots.extend(g.hints.keys().copied());
    }

    let mut hints = Vec::with_capacity(slots.len());
    for slot in slots {
        let direct_values = direct.and_then(|d| d.hints.get(&slot)).filter(|v| !v.is_empty());
        let hint = match direct_values {
            Some(values) if values.len() > 1 => {
                return Err(ConfigError::Conflict {
                    parameter: slot.name(),
                    entity: entity.to_string(),
                }
                .into());
            }
            Some(values) => values.first().cloned(),
            None => latest(groups.iter().filter_map(|g| g.hints.get(&slot))).cloned(),
        };
        hints.extend(hint);
    }

    Ok(EffectiveDirective {
        size,
        boundary_layer,
        hints,
    })
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use crate::error::MeshqlError;
    use approx::assert_relative_eq;

    fn face(i: u32) -> EntityRef {
        EntityRef::new(EntityKind::Face, i)
    }

    fn edge(i: u32) -> EntityRef {
        EntityRef::new(EntityKind::Edge, i)
    }

    fn curve(nodes: u32) -> StructuralHint {
        StructuralHint::TransfiniteCurve {
            nodes,
            distribution: TransfiniteDistribution::Progression,
            coef: 1.0,
        }
    }

    #[test]
    fn direct_size_beats_group_size() {
        let mut tags = TagStore::new();
        tags.add_to_group("group", &[face(0), face(1)]).unwrap();
        let mut model = MeshConfigModel::new();
        model.set_size(&"group".into(), 1.0).unwrap();
        model.set_size(&face(0).into(), 2.0).unwrap();

        let config = model.resolve(&tags, GroupMergePolicy::default()).unwrap();
        assert_relative_eq!(config.size_of(face(0)).unwrap(), 2.0);
        assert_relative_eq!(config.size_of(face(1)).unwrap(), 1.0);
    }

    #[test]
    fn direct_wins_regardless_of_write_order() {
        let mut tags = TagStore::new();
        tags.add_to_group("group", &[face(0)]).unwrap();
        let mut model = MeshConfigModel::new();
        model.set_size(&face(0).into(), 2.0).unwrap();
        model.set_size(&"group".into(), 1.0).unwrap();
        let config = model.resolve(&tags, GroupMergePolicy::default()).unwrap();
        assert_relative_eq!(config.size_of(face(0)).unwrap(), 2.0);
    }

    #[test]
    fn last_direct_write_wins() {
        let mut model = MeshConfigModel::new();
        model.set_size(&face(0).into(), 3.0).unwrap();
        model.set_size(&face(0).into(), 4.0).unwrap();
        let config = model.resolve(&TagStore::new(), GroupMergePolicy::default()).unwrap();
        assert_relative_eq!(config.size_of(face(0)).unwrap(), 4.0);
    }

    #[test]
    fn group_merge_policies() {
        let mut tags = TagStore::new();
        tags.add_to_group("coarse", &[face(0)]).unwrap();
        tags.add_to_group("fine", &[face(0)]).unwrap();
        let mut model = MeshConfigModel::new();
        model.set_size(&"fine".into(), 0.5).unwrap();
        model.set_size(&"coarse".into(), 4.0).unwrap();

        let last = model.resolve(&tags, GroupMergePolicy::LastWriteWins).unwrap();
        assert_relative_eq!(last.size_of(face(0)).unwrap(), 4.0);
        let finest = model.resolve(&tags, GroupMergePolicy::Finest).unwrap();
        assert_relative_eq!(finest.size_of(face(0)).unwrap(), 0.5);
    }

    #[test]
    fn invalid_boundary_layer_leaves_model_unchanged() {
        let mut model = MeshConfigModel::new();
        let target = face(0).into();
        model.set_size(&target, 0.2).unwrap();
        let err = model
            .set_boundary_layer(&target, BoundaryLayer::new(-1.0, 1.5, 3))
            .unwrap_err();
        assert!(matches!(
            err,
            MeshqlError::Config(ConfigError::InvalidParameter { .. })
        ));
        assert_eq!(model.size_of(&target), Some(0.2));
        assert!(model.boundary_layer_of(&target).is_none());
    }

    #[test]
    fn invalid_size_is_rejected() {
        let mut model = MeshConfigModel::new();
        for bad in [0.0, -2.0, f64::INFINITY, f64::NAN] {
            assert!(model.set_size(&face(0).into(), bad).is_err());
        }
        assert_eq!(model.size_of(&face(0).into()), None);
    }

    #[test]
    fn conflicting_direct_transfinite_curves() {
        let mut model = MeshConfigModel::new();
        model.set_structural_hint(&edge(0).into(), curve(10)).unwrap();
        model.set_structural_hint(&edge(0).into(), curve(10)).unwrap();
        assert!(model.resolve(&TagStore::new(), GroupMergePolicy::default()).is_ok());

        model.set_structural_hint(&edge(0).into(), curve(12)).unwrap();
        let err = model
            .resolve(&TagStore::new(), GroupMergePolicy::default())
            .unwrap_err();
        assert!(matches!(err, MeshqlError::Config(ConfigError::Conflict { .. })));
    }

    #[test]
    fn replacing_a_transfinite_curve_clears_the_conflict() {
        let mut model = MeshConfigModel::new();
        model.set_structural_hint(&edge(0).into(), curve(10)).unwrap();
        model.set_structural_hint(&edge(0).into(), curve(12)).unwrap();
        model.replace_structural_hint(edge(0), curve(14)).unwrap();
        let config = model.resolve(&TagStore::new(), GroupMergePolicy::default()).unwrap();
        assert_eq!(config.directive(edge(0)).unwrap().hints, [curve(14)]);
        assert!(model.replace_structural_hint(face(0), curve(3)).is_err());
        assert!(model.replace_structural_hint(edge(1), curve(1)).is_err());
    }

    #[test]
    fn mergeable_hints_are_overwritten() {
        let mut model = MeshConfigModel::new();
        model
            .set_structural_hint(&face(0).into(), StructuralHint::Recombine { angle: 30.0 })
            .unwrap();
        model
            .set_structural_hint(&face(0).into(), StructuralHint::Recombine { angle: 45.0 })
            .unwrap();
        let config = model.resolve(&TagStore::new(), GroupMergePolicy::default()).unwrap();
        assert_eq!(
            config.directive(face(0)).unwrap().hints,
            [StructuralHint::Recombine { angle: 45.0 }]
        );
        assert!(!config.is_structured());
    }

    #[test]
    fn group_hints_never_conflict() {
        let mut tags = TagStore::new();
        tags.add_to_group("a", &[edge(0)]).unwrap();
        tags.add_to_group("b", &[edge(0)]).unwrap();
        let mut model = MeshConfigModel::new();
        model.set_structural_hint(&"a".into(), curve(5)).unwrap();
        model.set_structural_hint(&"b".into(), curve(8)).unwrap();
        let config = model.resolve(&tags, GroupMergePolicy::default()).unwrap();
        assert_eq!(config.directive(edge(0)).unwrap().hints, [curve(8)]);
        assert!(config.is_structured());
    }

    #[test]
    fn hint_kind_is_checked() {
        let mut model = MeshConfigModel::new();
        assert!(model
            .set_structural_hint(&face(0).into(), StructuralHint::TransfiniteVolume)
            .is_err());

        let mut tags = TagStore::new();
        tags.add_to_group("faces", &[face(0)]).unwrap();
        model
            .set_structural_hint(&"faces".into(), StructuralHint::TransfiniteVolume)
            .unwrap();
        assert!(model.resolve(&tags, GroupMergePolicy::default()).is_err());
    }

    #[test]
    fn directives_on_unknown_groups_fail_to_resolve() {
        let mut model = MeshConfigModel::new();
        model.set_size(&"ghost".into(), 1.0).unwrap();
        let err = model
            .resolve(&TagStore::new(), GroupMergePolicy::default())
            .unwrap_err();
        assert!(matches!(err, MeshqlError::Tag(TagError::UnknownGroup(_))));
    }

    #[test]
    fn groups_are_exported_in_creation_order() {
        let mut tags = TagStore::new();
        tags.add_to_group("outlet", &[face(2)]).unwrap();
        tags.add_to_group("inlet", &[face(0), face(1)]).unwrap();
        let config = MeshConfigModel::new()
            .resolve(&tags, GroupMergePolicy::default())
            .unwrap();
        let names: Vec<_> = config.groups.iter().map(|g| g.name.as_str()).collect();
        assert_eq!(names, ["outlet", "inlet"]);
        assert_eq!(config.groups[1].members, [face(0), face(1)]);
        assert!(config.directives.is_empty());
    }

    #[test]
    fn options_and_refinements() {
        let mut model = MeshConfigModel::new();
        model.set_algorithm_2d(MeshAlgorithm2D::FrontalDelaunayQuads);
        model.set_subdivision(SubdivisionAlgorithm::AllQuadrangles);
        assert!(model.set_refinements(0).is_err());
        model.set_refinements(2).unwrap();
        let config = model.resolve(&TagStore::new(), GroupMergePolicy::default()).unwrap();
        assert_eq!(config.options.refinements, 2);
        assert_eq!(
            config.options.algorithm_2d,
            Some(MeshAlgorithm2D::FrontalDelaunayQuads)
        );
    }
}
