//! Replaying raw stage documents
//!
//! Raw `{ "$stage": args }` documents go through the same builder methods
//! a caller would use, so a replayed pipeline obeys exactly the same
//! rules. `$out` and `$merge` are accepted only as the last stage.

use std::sync::Arc;

use serde_json::Value;

use crate::query::{QueryError, QueryResult};
use crate::schema::{describe, SchemaNode};

use super::builder::Pipeline;
use super::errors::{PipelineError, PipelineResult};
use super::stage::StageDescriptor;
use super::validate::{known_keys, object_arg};

/// Result of replaying a stage list
#[derive(Debug, Clone)]
pub struct Replay {
    pipeline: Pipeline,
    terminal: Option<StageDescriptor>,
}

impl Replay {
    /// Pipeline built from the non-terminal stages
    pub fn pipeline(&self) -> &Pipeline {
        &self.pipeline
    }

    /// Trailing `$out` or `$merge`, if any
    pub fn terminal(&self) -> Option<&StageDescriptor> {
        self.terminal.as_ref()
    }

    /// Schema of the documents leaving the last non-terminal stage
    pub fn schema(&self) -> &Arc<SchemaNode> {
        self.pipeline.schema()
    }

    pub fn into_pipeline(self) -> Pipeline {
        self.pipeline
    }

    /// Every stage, terminal included
    pub fn into_stages(self) -> Vec<StageDescriptor> {
        let mut stages = self.pipeline.build();
        stages.extend(self.terminal);
        stages
    }
}

fn integer(stage: &str, value: &Value) -> QueryResult<i64> {
    value.as_i64().ok_or_else(|| {
        QueryError::invalid_argument(stage, format!("expected an integer, found {}", describe(value)))
    })
}

/// Applies one non-terminal stage through its builder method
pub(crate) fn apply_stage(pipeline: &Pipeline, stage: &StageDescriptor) -> PipelineResult<Pipeline> {
    let name = stage.name();
    let args = stage.arguments().clone();
    let reject = |cause: QueryError| pipeline.reject(name, cause);

    match name {
        "$match" => pipeline.match_(args),
        "$sample" => {
            let map = object_arg(name, &args).map_err(reject)?;
            known_keys(name, map, &["size"]).map_err(reject)?;
            let size = integer(name, map.get("size").unwrap_or(&Value::Null)).map_err(reject)?;
            pipeline.sample(size)
        }
        "$limit" => pipeline.limit(integer(name, &args).map_err(reject)?),
        "$skip" => pipeline.skip(integer(name, &args).map_err(reject)?),
        "$sort" => pipeline.sort(args),
        "$setWindowFields" => pipeline.set_window_fields(args),
        "$addFields" => pipeline.add_fields(args),
        "$set" => pipeline.set(args),
        "$unset" => pipeline.unset(args),
        "$project" => pipeline.project(args),
        "$group" => pipeline.group(args),
        "$count" => match args.as_str() {
            Some(field) => pipeline.count(field),
            None => Err(reject(QueryError::invalid_argument(name, "expected a field name"))),
        },
        "$sortByCount" => pipeline.sort_by_count(args),
        "$lookup" => pipeline.lookup(args),
        "$unwind" => pipeline.unwind(args),
        "$replaceRoot" => {
            let map = object_arg(name, &args).map_err(reject)?;
            known_keys(name, map, &["newRoot"]).map_err(reject)?;
            pipeline.replace_root(map.get("newRoot").cloned().unwrap_or(Value::Null))
        }
        "$replaceWith" => pipeline.replace_with(args),
        "$facet" => {
            let map = object_arg(name, &args).map_err(reject)?;
            pipeline.facet(|seed| {
                map.iter()
                    .map(|(branch, stages)| {
                        let Value::Array(stages) = stages else {
                            return Err(reject(QueryError::invalid_argument(
                                "$facet",
                                format!("branch '{}' must be an array of stages", branch),
                            )));
                        };
                        let replayed = replay(seed, stages)?;
                        if let Some(terminal) = replayed.terminal() {
                            return Err(reject(QueryError::invalid_argument(
                                "$facet",
                                format!("branch '{}' may not contain {}", branch, terminal.name()),
                            )));
                        }
                        Ok((branch.clone(), replayed.into_pipeline()))
                    })
                    .collect::<PipelineResult<Vec<_>>>()
            })
        }
        "$bucket" => pipeline.bucket(args),
        "$bucketAuto" => pipeline.bucket_auto(args),
        "$densify" => pipeline.densify(args),
        "$fill" => pipeline.fill(args),
        "$geoNear" => pipeline.geo_near(args),
        "$graphLookup" => pipeline.graph_lookup(args),
        "$unionWith" => pipeline.union_with(args),
        "$documents" => pipeline.documents(args),
        "$out" | "$merge" => Err(PipelineError::terminal_stage(pipeline.len(), name)),
        _ => Err(reject(QueryError::unknown_operator(name, "pipeline"))),
    }
}

/// Replays `stages` on top of `pipeline`.
pub fn replay(pipeline: &Pipeline, stages: &[Value]) -> PipelineResult<Replay> {
    let mut current = pipeline.clone();
    let mut terminal = None;

    for (position, raw) in stages.iter().enumerate() {
        let stage = StageDescriptor::parse(raw).map_err(|cause| current.reject("pipeline", cause))?;
        let last = position + 1 == stages.len();
        match stage.name() {
            "$out" | "$merge" if !last => {
                return Err(PipelineError::terminal_stage(current.len(), stage.name()));
            }
            "$out" => terminal = Some(current.out_stage(stage.arguments().clone())?),
            "$merge" => terminal = Some(current.merge_stage(stage.arguments().clone())?),
            _ => current = apply_stage(&current, &stage)?,
        }
    }
    Ok(Replay {
        pipeline: current,
        terminal,
    })
}
