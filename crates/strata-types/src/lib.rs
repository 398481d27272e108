//! Core data types for the strata lookup engine.
//!
//! This crate is the dependency-light leaf of the workspace: the dynamic
//! [`Value`] model, dotted [`Key`] parsing with dig/bury navigation, and the
//! layered interpolation [`Scope`]. The engine (`strata-runtime`) and the
//! CLI build on these; plugin authors can too, since the [`Value`] wire
//! form (including tagged binary) lives here.

mod key;
mod scope;
mod value;

pub use key::{Key, KeyError, Segment};
pub use scope::Scope;
pub use value::{Map, Value, ValueError, ValueKind};
