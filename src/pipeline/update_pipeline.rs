//! Update pipelines
//!
//! An update may be given as an aggregation pipeline restricted to the
//! stages that reshape a single document. `UpdatePipeline` exposes only
//! those stages, so a `$group` cannot be expressed at all.

use std::sync::Arc;

use serde_json::Value;

use crate::config::DslConfig;
use crate::query::QueryError;
use crate::schema::SchemaNode;

use super::builder::Pipeline;
use super::errors::PipelineResult;
use super::replay::apply_stage;
use super::stage::StageDescriptor;

/// Stages permitted in an update pipeline
pub const UPDATE_STAGES: &[&str] = &[
    "$addFields",
    "$set",
    "$project",
    "$unset",
    "$replaceRoot",
    "$replaceWith",
];

/// Immutable builder for update-with-pipeline documents
#[derive(Debug, Clone)]
pub struct UpdatePipeline {
    inner: Pipeline,
}

impl UpdatePipeline {
    pub fn new(schema: impl Into<Arc<SchemaNode>>) -> Self {
        Self {
            inner: Pipeline::new(schema),
        }
    }

    pub(crate) fn from_pipeline(inner: Pipeline) -> Self {
        Self { inner }
    }

    pub fn with_config(self, config: DslConfig) -> Self {
        Self {
            inner: self.inner.with_config(config),
        }
    }

    /// Schema of the updated document
    pub fn schema(&self) -> &Arc<SchemaNode> {
        self.inner.schema()
    }

    pub fn stages(&self) -> &[StageDescriptor] {
        self.inner.stages()
    }

    pub fn add_fields(&self, spec: Value) -> PipelineResult<Self> {
        self.inner.add_fields(spec).map(Self::from_pipeline)
    }

    pub fn set(&self, spec: Value) -> PipelineResult<Self> {
        self.inner.set(spec).map(Self::from_pipeline)
    }

    pub fn project(&self, spec: Value) -> PipelineResult<Self> {
        self.inner.project(spec).map(Self::from_pipeline)
    }

    pub fn unset(&self, paths: Value) -> PipelineResult<Self> {
        self.inner.unset(paths).map(Self::from_pipeline)
    }

    pub fn replace_root(&self, new_root: Value) -> PipelineResult<Self> {
        self.inner.replace_root(new_root).map(Self::from_pipeline)
    }

    pub fn replace_root_as(&self, new_root: Value, output: impl Into<Arc<SchemaNode>>) -> PipelineResult<Self> {
        self.inner.replace_root_as(new_root, output).map(Self::from_pipeline)
    }

    pub fn replace_with(&self, expr: Value) -> PipelineResult<Self> {
        self.inner.replace_with(expr).map(Self::from_pipeline)
    }

    pub fn replace_with_as(&self, expr: Value, output: impl Into<Arc<SchemaNode>>) -> PipelineResult<Self> {
        self.inner.replace_with_as(expr, output).map(Self::from_pipeline)
    }

    pub fn build(&self) -> Vec<StageDescriptor> {
        self.inner.build()
    }

    /// Replays raw stage documents, rejecting any stage an update
    /// pipeline may not contain.
    pub fn replay(&self, stages: &[Value]) -> PipelineResult<Self> {
        let mut current = self.inner.clone();
        for raw in stages {
            let stage = StageDescriptor::parse(raw).map_err(|cause| current.reject("pipeline", cause))?;
            if !UPDATE_STAGES.contains(&stage.name()) {
                let cause = QueryError::unknown_operator(stage.name(), "update pipeline");
                return Err(current.reject(stage.name(), cause));
            }
            current = apply_stage(&current, &stage)?;
        }
        Ok(Self::from_pipeline(current))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::query::QueryErrorCode;
    use crate::schema::ObjectNode;
    use serde_json::json;

    fn account() -> SchemaNode {
        SchemaNode::object(
            ObjectNode::new()
                .with_field("owner", SchemaNode::string())
                .with_field("balance", SchemaNode::double())
                .with_optional_field("note", SchemaNode::string()),
        )
    }

    #[test]
    fn test_builds_update_stages() {
        let update = UpdatePipeline::new(account())
            .set(json!({"balance": {"$add": ["$balance", 10]}, "touched": true}))
            .unwrap()
            .unset(json!("note"))
            .unwrap();
        let stages = serde_json::to_value(update.build()).unwrap();
        assert_eq!(
            stages,
            json!([
                {"$set": {"balance": {"$add": ["$balance", 10]}, "touched": true}},
                {"$unset": "note"}
            ])
        );
        assert_eq!(update.schema().top_level_fields(), vec!["owner", "balance", "touched"]);
    }

    #[test]
    fn test_replay_rejects_other_stages() {
        let update = UpdatePipeline::new(account());
        let err = update
            .replay(&[json!({"$set": {"x": 1}}), json!({"$group": {"_id": null}})])
            .unwrap_err();
        assert_eq!(err.stage(), "$group");
        assert_eq!(err.stage_index(), 1);
        assert_eq!(err.cause().unwrap().code(), QueryErrorCode::UnknownOperator);

        let replayed = update
            .replay(&[json!({"$replaceWith": {"owner": "$owner"}})])
            .unwrap();
        assert_eq!(replayed.schema().top_level_fields(), vec!["owner"]);
    }
}
