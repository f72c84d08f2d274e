//! Configuration loading and schema definitions
//!
//! Config only supplies defaults. Every invocation still receives its own
//! immutable parameter values.

mod loader;
mod schema;

pub use loader::EngineConfig;
pub use schema::*;
