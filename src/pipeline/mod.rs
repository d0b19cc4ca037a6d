//! Typed aggregation pipelines
//!
//! A `Pipeline` carries the schema of the documents flowing out of its
//! last stage. Every stage method validates its arguments against that
//! schema and returns a new pipeline with the derived output schema.
//!
//! # Design Principles
//!
//! - Pipelines are immutable; appending returns a new value
//! - A stage is checked against the schema produced by the stage before it
//! - Failures carry the stage name, its index and the schema it saw
//! - `$out` and `$merge` end a pipeline and produce its stage list
//! - Raw stage documents replay through the same builder methods

mod builder;
mod errors;
mod group;
mod join;
mod project;
mod replay;
mod shape;
mod stage;
mod terminal;
mod update_pipeline;
mod validate;
mod window;

pub use builder::Pipeline;
pub use errors::{PipelineError, PipelineErrorCode, PipelineResult};
pub use replay::{replay, Replay};
pub use stage::StageDescriptor;
pub use update_pipeline::{UpdatePipeline, UPDATE_STAGES};
