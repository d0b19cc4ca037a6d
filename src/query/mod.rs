//! Schema-checked query documents
//!
//! Filters, updates and aggregation expressions are validated against a
//! schema when they are constructed. A value of type `Filter` or `Update`
//! is proof that its document passed.
//!
//! # Design Principles
//!
//! - Validation happens once, at construction
//! - Operator gating is table driven
//! - Errors name the operator and the path they concern
//! - Unrecognized operators are rejected, never passed through

mod errors;
mod expr;
mod filter;
mod update;

pub use errors::{QueryError, QueryErrorCode, QueryResult};
pub use expr::{infer_type, is_variable_name, ExprInferer, SYSTEM_VARIABLES};
pub use filter::Filter;
pub use update::Update;

pub(crate) use filter::{is_operator_object, FilterChecker};
