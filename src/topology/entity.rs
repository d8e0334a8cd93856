use std::fmt;

/// The topological kind of a sub-entity.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum EntityKind {
    Vertex,
    Edge,
    Face,
    Solid,
}

impl EntityKind {
    /// All kinds, lowest dimension first.
    pub const ALL: [EntityKind; 4] = [Self::Vertex, Self::Edge, Self::Face, Self::Solid];

    /// Returns the topological dimension (0 for vertices up to 3 for solids).
    #[must_use]
    pub fn dim(self) -> u8 {
        match self {
            Self::Vertex => 0,
            Self::Edge => 1,
            Self::Face => 2,
            Self::Solid => 3,
        }
    }

    /// Returns the kind of the given dimension, if any.
    #[must_use]
    pub fn from_dim(dim: u8) -> Option<Self> {
        Self::ALL.get(usize::from(dim)).copied()
    }

    fn slot(self) -> usize {
        usize::from(self.dim())
    }
}

impl fmt::Display for EntityKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Vertex => "vertex",
            Self::Edge => "edge",
            Self::Face => "face",
            Self::Solid => "solid",
        })
    }
}

/// Stable identity of one sub-entity of a loaded shape.
///
/// Minted by the topology graph the first time it observes an entity and
/// never reused within a session. Indices are dense per kind, in kernel
/// enumeration order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct EntityRef {
    kind: EntityKind,
    index: u32,
}

impl EntityRef {
    pub(crate) fn new(kind: EntityKind, index: u32) -> Self {
        Self { kind, index }
    }

    /// Returns the topological kind of the entity.
    #[must_use]
    pub fn kind(self) -> EntityKind {
        self.kind
    }

    /// Returns the zero-based index among entities of the same kind.
    #[must_use]
    pub fn index(self) -> usize {
        self.index as usize
    }

    /// Returns the 1-based number engines use to address this entity.
    #[must_use]
    pub fn tag(self) -> u32 {
        self.index + 1
    }
}

impl fmt::Display for EntityRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}#{}", self.kind, self.tag())
    }
}

/// A per-kind table, indexed by [`EntityKind`].
#[derive(Debug, Clone, Default)]
pub(crate) struct PerKind<T> {
    slots: [T; 4],
}

impl<T> PerKind<T> {
    pub(crate) fn get(&self, kind: EntityKind) -> &T {
        &self.slots[kind.slot()]
    }

    pub(crate) fn get_mut(&mut self, kind: EntityKind) -> &mut T {
        &mut self.slots[kind.slot()]
    }
}
