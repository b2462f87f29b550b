//! Schema introspection for db-chat.
//!
//! Describes the tables of the active database and summarizes them for
//! grounding query generation.

mod cache;
mod introspector;
mod model;

pub use cache::SchemaCache;
pub use introspector::SchemaIntrospector;
pub use model::{Column, SchemaSummary, TableSchema};
