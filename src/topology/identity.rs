use std::collections::HashMap;

use super::entity::{EntityKind, EntityRef, PerKind};
use crate::error::TopologyError;
use crate::math::Point3;

/// Canonical, order-independent geometric key of one sub-entity.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Fingerprint {
    kind: EntityKind,
    points: Vec<[i64; 3]>,
}

impl Fingerprint {
    /// Quantizes `points` onto a grid of spacing `tolerance` and sorts them.
    ///
    /// # Errors
    ///
    /// Returns [`TopologyError::InvalidShape`] if there are no points, a
    /// coordinate is not finite, or `tolerance` is not positive.
    #[allow(clippy::cast_possible_truncation)]
    pub fn new(kind: EntityKind, points: &[Point3], tolerance: f64) -> Result<Self, TopologyError> {
        if tolerance.is_nan() || tolerance <= 0.0 {
            return Err(TopologyError::InvalidShape(format!(
                "identity tolerance must be positive, got {tolerance}"
            )));
        }
        if points.is_empty() {
            return Err(TopologyError::InvalidShape(format!(
                "{kind} has no signature points"
            )));
        }
        let mut quantized = Vec::with_capacity(points.len());
        for p in points {
            if !p.coords.iter().all(|c| c.is_finite()) {
                return Err(TopologyError::InvalidShape(format!(
                    "{kind} has a non-finite coordinate"
                )));
            }
            quantized.push([
                (p.x / tolerance).round() as i64,
                (p.y / tolerance).round() as i64,
                (p.z / tolerance).round() as i64,
            ]);
        }
        quantized.sort_unstable();
        quantized.dedup();
        Ok(Self {
            kind,
            points: quantized,
        })
    }

    /// Returns the entity kind this fingerprint identifies.
    #[must_use]
    pub fn kind(&self) -> EntityKind {
        self.kind
    }
}

/// Maps fingerprints to long-lived [`EntityRef`]s.
#[derive(Debug, Default)]
pub(crate) struct IdentityMap {
    refs: HashMap<Fingerprint, EntityRef>,
    counts: PerKind<u32>,
}

impl IdentityMap {
    /// Mints a ref for a fingerprint seen for the first time.
    ///
    /// Enumeration must yield distinct entities, so a repeated fingerprint is
    /// an error rather than a lookup.
    pub(crate) fn mint(&mut self, fingerprint: Fingerprint) -> Result<EntityRef, TopologyError> {
        if self.refs.contains_key(&fingerprint) {
            return Err(TopologyError::InvalidShape(format!(
                "two {} entities share one geometric identity",
                fingerprint.kind
            )));
        }
        let count = self.counts.get_mut(fingerprint.kind);
        let entity = EntityRef::new(fingerprint.kind, *count);
        *count += 1;
        self.refs.insert(fingerprint, entity);
        Ok(entity)
    }

    pub(crate) fn lookup(&self, fingerprint: &Fingerprint) -> Option<EntityRef> {
        self.refs.get(fingerprint).copied()
    }
}
