//! docshape - schema-aware query, update and aggregation builders
//!
//! Documents are checked against a declared schema while they are built,
//! so a mistyped field or a misapplied operator fails at construction
//! instead of at the database.

pub mod cli;
pub mod config;
pub mod operators;
pub mod path;
pub mod pipeline;
pub mod query;
pub mod schema;
