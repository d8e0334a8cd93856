pub mod config;
pub mod error;
pub mod generate;
pub mod kernel;
pub mod math;
pub mod query;
pub mod selection;
pub mod session;
pub mod tags;
pub mod topology;

pub use error::{MeshqlError, Result};
pub use query::Predicate;
pub use selection::Selection;
pub use session::{Session, SessionParams};
pub use topology::{EntityKind, EntityRef, TopologyGraph};
