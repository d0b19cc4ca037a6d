//! Operator tables
//!
//! Declarative tables for every filter, update, expression and
//! accumulator operator the builder understands, plus the capability
//! predicates that gate them by field type.
//!
//! # Design Principles
//!
//! - Tables are static data; validation logic lives with the builders
//! - One capability check decides whether an operator applies to a field
//! - Unknown operator names are answered with `None`, never a panic

mod accumulator;
mod bson;
mod capability;
mod expression;
mod filter_ops;
pub mod geo;
mod update_ops;

pub use accumulator::{accumulator, accumulators, Accumulator, AccumulatorArgs, AccumulatorOutput};
pub use bson::{alias_for_code, is_alias, is_code, is_type_spec, scalar_for_alias, BSON_TYPES, NUMBER_ALIAS};
pub use capability::Capability;
pub use expression::{expr_operator, expr_operators, ExprArgs, ExprCategory, ExprOperator, ExprReturn};
pub use filter_ops::{
    filter_operator, filter_operators, filter_operators_for, FilterArgument, FilterOperator,
    ROOT_FILTER_OPERATORS,
};
pub use update_ops::{update_operator, update_operators, UpdateOperator, UpdatePayload};
