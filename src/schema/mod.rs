//! Schema model for docshape
//!
//! A schema describes the shape of a document: object nodes with named,
//! ordered children, array nodes with a single element type, and scalar
//! leaves.
//!
//! # Design Principles
//!
//! - Immutable once built, shared by `Arc`
//! - Lookups answer with typed results, never panics
//! - Optional and nullable are presence facts; they never change shape
//! - Descriptions load from JSON catalogs

mod errors;
mod literal;
mod loader;
mod types;

pub use errors::{LookupError, SchemaError, SchemaErrorCode, SchemaResult, Severity};
pub use literal::{
    conforms, describe, extended_json_kind, is_extended_json, is_regex_literal, literal_type,
    unify, Presence,
};
pub use loader::{FieldDef, SchemaCatalog, SchemaDef, SchemaLoader};
pub use types::{ObjectNode, ScalarKind, SchemaNode};
