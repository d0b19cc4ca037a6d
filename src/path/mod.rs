//! Path resolution algebra
//!
//! Turns dot paths such as `roles.0.name`, `tags.$[]` or `roles.name` into
//! the schema node they reach, and enumerates every path a schema admits.
//!
//! # Design Principles
//!
//! - One explicit depth budget shared by resolution and enumeration
//! - Arrays may be indexed, addressed by placeholder, or skipped
//! - Placeholders are opt-in per call site
//! - Failures are typed values that name the offending segment

mod enumerate;
mod errors;
mod resolver;
mod segment;

pub use enumerate::{enumerate_paths, PathPattern, PatternSegment, PlaceholderPattern};
pub use errors::{PathError, PathResult};
pub use resolver::{resolve, resolve_path, ResolveOptions, ResolvedPath, MAX_PATH_DEPTH};
pub use segment::{is_identifier, FieldPath, PathSegment, Placeholder};
