//! Immutable pipeline builder
//!
//! Every stage method validates its arguments against the current schema
//! and returns a new `Pipeline`; the receiver is never modified, so any
//! intermediate value can be extended along several independent branches.

use std::collections::HashSet;
use std::sync::Arc;

use serde_json::{json, Map, Value};

use crate::config::DslConfig;
use crate::path::ResolvedPath;
use crate::query::{ExprInferer, FilterChecker, QueryError, QueryResult};
use crate::schema::{ObjectNode, SchemaCatalog, SchemaNode, SchemaResult};

use super::errors::{PipelineError, PipelineResult};
use super::group;
use super::join;
use super::project;
use super::shape::check_field_name;
use super::stage::StageDescriptor;
use super::terminal;
use super::validate;
use super::window;

/// Stages that may not appear inside a `$facet` branch
const FACET_EXCLUDED: &[&str] = &["$facet", "$geoNear", "$documents"];

/// Why a stage was rejected
pub(crate) enum StageFailure {
    /// The stage's own arguments
    Query(QueryError),
    /// A nested pipeline, reported against its own stage indexes
    Nested(PipelineError),
}

impl From<QueryError> for StageFailure {
    fn from(err: QueryError) -> Self {
        StageFailure::Query(err)
    }
}

impl From<PipelineError> for StageFailure {
    fn from(err: PipelineError) -> Self {
        StageFailure::Nested(err)
    }
}

/// Aggregation pipeline with the schema of the documents it emits
#[derive(Debug, Clone)]
pub struct Pipeline {
    schema: Arc<SchemaNode>,
    stages: Arc<Vec<StageDescriptor>>,
    config: Arc<DslConfig>,
    catalog: Option<Arc<SchemaCatalog>>,
    /// `$$name` bindings visible to every stage
    variables: Vec<(String, Arc<SchemaNode>)>,
}

impl Pipeline {
    /// Empty pipeline over documents of `schema`
    pub fn new(schema: impl Into<Arc<SchemaNode>>) -> Self {
        Self {
            schema: schema.into(),
            stages: Arc::new(Vec::new()),
            config: Arc::new(DslConfig::default()),
            catalog: None,
            variables: Vec::new(),
        }
    }

    /// Empty pipeline over a catalog collection, with the catalog attached
    /// for `$lookup`, `$graphLookup` and `$unionWith`.
    pub fn for_collection(catalog: impl Into<Arc<SchemaCatalog>>, collection: &str) -> SchemaResult<Self> {
        let catalog = catalog.into();
        let schema = catalog.get(collection)?;
        Ok(Self::new(schema).with_catalog(catalog))
    }

    pub fn with_config(mut self, config: DslConfig) -> Self {
        self.config = Arc::new(config);
        self
    }

    pub fn with_catalog(mut self, catalog: impl Into<Arc<SchemaCatalog>>) -> Self {
        self.catalog = Some(catalog.into());
        self
    }

    /// Schema of the documents leaving the last stage
    pub fn schema(&self) -> &Arc<SchemaNode> {
        &self.schema
    }

    pub fn stages(&self) -> &[StageDescriptor] {
        &self.stages
    }

    pub fn len(&self) -> usize {
        self.stages.len()
    }

    pub fn is_empty(&self) -> bool {
        self.stages.is_empty()
    }

    pub fn config(&self) -> &DslConfig {
        &self.config
    }

    /// The stage list, detached from this pipeline
    pub fn build(&self) -> Vec<StageDescriptor> {
        self.stages.as_ref().clone()
    }

    // ==================== Internals shared by the stage rules ====================

    pub(crate) fn inferer(&self) -> ExprInferer<'_> {
        self.variables
            .iter()
            .fold(ExprInferer::new(&self.schema, &self.config), |inferer, (name, node)| {
                inferer.with_variable(name.clone(), node.clone())
            })
    }

    pub(crate) fn check_filter(&self, root: &Arc<SchemaNode>, document: &Value) -> QueryResult<()> {
        FilterChecker::new(&self.config)
            .with_scope(self.variables.clone())
            .check_document(root, document)
    }

    /// Resolves `path` against the current schema
    pub(crate) fn resolve(&self, path: &str) -> QueryResult<ResolvedPath> {
        self.resolve_in(&self.schema, path)
    }

    pub(crate) fn resolve_in(&self, root: &Arc<SchemaNode>, path: &str) -> QueryResult<ResolvedPath> {
        Ok(crate::path::resolve(root, path, self.config.resolve_options())?)
    }

    /// Schema of a catalog collection
    pub(crate) fn foreign(&self, collection: &str) -> QueryResult<Arc<SchemaNode>> {
        match &self.catalog {
            Some(catalog) => Ok(catalog.get(collection)?),
            None => Err(QueryError::unknown_collection(collection)),
        }
    }

    /// Empty pipeline over `schema` sharing this pipeline's config, catalog
    /// and variables
    pub(crate) fn seed(&self, schema: Arc<SchemaNode>) -> Pipeline {
        Pipeline {
            schema,
            stages: Arc::new(Vec::new()),
            config: self.config.clone(),
            catalog: self.catalog.clone(),
            variables: self.variables.clone(),
        }
    }

    pub(crate) fn with_bindings(mut self, bindings: Vec<(String, Arc<SchemaNode>)>) -> Self {
        self.variables.extend(bindings);
        self
    }

    pub(crate) fn require_first(&self, stage: &str) -> QueryResult<()> {
        if self.stages.is_empty() {
            Ok(())
        } else {
            Err(QueryError::invalid_argument(
                stage,
                "must be the first stage of the pipeline",
            ))
        }
    }

    pub(crate) fn reject(&self, stage: &str, cause: QueryError) -> PipelineError {
        PipelineError::stage_validation(self.stages.len(), stage, &self.schema, cause)
    }

    fn append(&self, name: &str, arguments: Value, schema: Arc<SchemaNode>) -> Pipeline {
        let mut stages = self.stages.as_ref().clone();
        stages.push(StageDescriptor::new(name, arguments));
        tracing::debug!(
            stage = name,
            index = stages.len() - 1,
            fields = schema.top_level_fields().len(),
            "stage appended"
        );
        Pipeline {
            schema,
            stages: Arc::new(stages),
            config: self.config.clone(),
            catalog: self.catalog.clone(),
            variables: self.variables.clone(),
        }
    }

    fn stage<F>(&self, name: &str, arguments: Value, derive: F) -> PipelineResult<Pipeline>
    where
        F: FnOnce(&Pipeline, &Value) -> Result<Arc<SchemaNode>, StageFailure>,
    {
        match derive(self, &arguments) {
            Ok(schema) => Ok(self.append(name, arguments, schema)),
            Err(StageFailure::Query(cause)) => Err(self.reject(name, cause)),
            Err(StageFailure::Nested(err)) => Err(err),
        }
    }

    fn passthrough<F>(&self, name: &str, arguments: Value, check: F) -> PipelineResult<Pipeline>
    where
        F: FnOnce(&Pipeline, &Value) -> Result<(), StageFailure>,
    {
        self.stage(name, arguments, |pipeline, args| {
            check(pipeline, args)?;
            Ok(pipeline.schema.clone())
        })
    }

    // ==================== Passthrough stages ====================

    /// `$match`: the filter is validated like a standalone `Filter`
    pub fn match_(&self, filter: Value) -> PipelineResult<Pipeline> {
        self.passthrough("$match", filter, |pipeline, args| {
            Ok(pipeline.check_filter(&pipeline.schema, args)?)
        })
    }

    pub fn sample(&self, size: i64) -> PipelineResult<Pipeline> {
        self.passthrough("$sample", json!({ "size": size }), |_, _| {
            if size > 0 {
                Ok(())
            } else {
                Err(QueryError::invalid_argument("$sample", "size must be a positive integer").into())
            }
        })
    }

    pub fn limit(&self, limit: i64) -> PipelineResult<Pipeline> {
        self.passthrough("$limit", json!(limit), |_, _| {
            if limit > 0 {
                Ok(())
            } else {
                Err(QueryError::invalid_argument("$limit", "limit must be a positive integer").into())
            }
        })
    }

    pub fn skip(&self, skip: i64) -> PipelineResult<Pipeline> {
        self.passthrough("$skip", json!(skip), |_, _| {
            if skip >= 0 {
                Ok(())
            } else {
                Err(QueryError::invalid_argument("$skip", "skip must be a non-negative integer").into())
            }
        })
    }

    pub fn sort(&self, spec: Value) -> PipelineResult<Pipeline> {
        self.passthrough("$sort", spec, |pipeline, args| {
            Ok(validate::sort_spec(pipeline, "$sort", args)?)
        })
    }

    pub fn set_window_fields(&self, spec: Value) -> PipelineResult<Pipeline> {
        self.passthrough("$setWindowFields", spec, |pipeline, args| {
            Ok(window::set_window_fields(pipeline, args)?)
        })
    }

    pub fn bucket(&self, spec: Value) -> PipelineResult<Pipeline> {
        self.passthrough("$bucket", spec, |pipeline, args| Ok(window::bucket(pipeline, args)?))
    }

    pub fn bucket_auto(&self, spec: Value) -> PipelineResult<Pipeline> {
        self.passthrough("$bucketAuto", spec, |pipeline, args| {
            Ok(window::bucket_auto(pipeline, args)?)
        })
    }

    pub fn densify(&self, spec: Value) -> PipelineResult<Pipeline> {
        self.passthrough("$densify", spec, |pipeline, args| Ok(window::densify(pipeline, args)?))
    }

    pub fn fill(&self, spec: Value) -> PipelineResult<Pipeline> {
        self.passthrough("$fill", spec, |pipeline, args| Ok(window::fill(pipeline, args)?))
    }

    /// `$geoNear`, only as the first stage
    pub fn geo_near(&self, spec: Value) -> PipelineResult<Pipeline> {
        self.passthrough("$geoNear", spec, |pipeline, args| {
            pipeline.require_first("$geoNear")?;
            Ok(validate::geo_near(pipeline, args)?)
        })
    }

    pub fn graph_lookup(&self, spec: Value) -> PipelineResult<Pipeline> {
        self.passthrough("$graphLookup", spec, |pipeline, args| {
            Ok(join::graph_lookup(pipeline, args)?)
        })
    }

    /// `$unionWith`; a sub-pipeline is checked against the foreign schema
    pub fn union_with(&self, spec: Value) -> PipelineResult<Pipeline> {
        self.passthrough("$unionWith", spec, join::union_with)
    }

    // ==================== Reshaping stages ====================

    pub fn add_fields(&self, spec: Value) -> PipelineResult<Pipeline> {
        self.stage("$addFields", spec, |pipeline, args| {
            Ok(project::add_fields(pipeline, "$addFields", args)?)
        })
    }

    /// `$set`, an alias of `$addFields`
    pub fn set(&self, spec: Value) -> PipelineResult<Pipeline> {
        self.stage("$set", spec, |pipeline, args| {
            Ok(project::add_fields(pipeline, "$set", args)?)
        })
    }

    /// `$unset` with one path or a list of paths
    pub fn unset(&self, paths: Value) -> PipelineResult<Pipeline> {
        self.stage("$unset", paths, |pipeline, args| Ok(project::unset(pipeline, args)?))
    }

    pub fn project(&self, spec: Value) -> PipelineResult<Pipeline> {
        self.stage("$project", spec, |pipeline, args| Ok(project::project(pipeline, args)?))
    }

    pub fn group(&self, spec: Value) -> PipelineResult<Pipeline> {
        self.stage("$group", spec, |pipeline, args| Ok(group::group(pipeline, args)?))
    }

    /// `$count`: the output is `{ <field>: number }`
    pub fn count(&self, field: &str) -> PipelineResult<Pipeline> {
        self.stage("$count", json!(field), |_, _| Ok(group::count(field)?))
    }

    pub fn sort_by_count(&self, expr: Value) -> PipelineResult<Pipeline> {
        self.stage("$sortByCount", expr, |pipeline, args| {
            Ok(group::sort_by_count(pipeline, args)?)
        })
    }

    pub fn lookup(&self, spec: Value) -> PipelineResult<Pipeline> {
        self.stage("$lookup", spec, join::lookup)
    }

    /// `$unwind` with `"$path"` or `{ path, includeArrayIndex, preserveNullAndEmptyArrays }`
    pub fn unwind(&self, spec: Value) -> PipelineResult<Pipeline> {
        self.stage("$unwind", spec, |pipeline, args| Ok(validate::unwind(pipeline, args)?))
    }

    /// `$replaceRoot`; the output is the inferred type of `new_root`
    pub fn replace_root(&self, new_root: Value) -> PipelineResult<Pipeline> {
        self.stage("$replaceRoot", json!({ "newRoot": new_root }), |pipeline, args| {
            Ok(validate::replace_root(pipeline, "$replaceRoot", &args["newRoot"], None)?)
        })
    }

    /// `$replaceRoot` with a caller-declared output schema
    pub fn replace_root_as(
        &self,
        new_root: Value,
        output: impl Into<Arc<SchemaNode>>,
    ) -> PipelineResult<Pipeline> {
        let output = output.into();
        self.stage("$replaceRoot", json!({ "newRoot": new_root }), |pipeline, args| {
            Ok(validate::replace_root(pipeline, "$replaceRoot", &args["newRoot"], Some(output))?)
        })
    }

    pub fn replace_with(&self, expr: Value) -> PipelineResult<Pipeline> {
        self.stage("$replaceWith", expr, |pipeline, args| {
            Ok(validate::replace_root(pipeline, "$replaceWith", args, None)?)
        })
    }

    pub fn replace_with_as(&self, expr: Value, output: impl Into<Arc<SchemaNode>>) -> PipelineResult<Pipeline> {
        let output = output.into();
        self.stage("$replaceWith", expr, |pipeline, args| {
            Ok(validate::replace_root(pipeline, "$replaceWith", args, Some(output))?)
        })
    }

    /// `$documents`, only as the first stage
    pub fn documents(&self, documents: Value) -> PipelineResult<Pipeline> {
        self.stage("$documents", documents, |pipeline, args| {
            pipeline.require_first("$documents")?;
            Ok(validate::documents(pipeline, args)?)
        })
    }

    /// `$facet`.
    ///
    /// `branches` receives an empty pipeline seeded with the current schema
    /// and returns the named branches built from it. Errors raised while
    /// building a branch keep their branch-relative stage index.
    pub fn facet<F, B, S>(&self, branches: F) -> PipelineResult<Pipeline>
    where
        F: FnOnce(&Pipeline) -> PipelineResult<B>,
        B: IntoIterator<Item = (S, Pipeline)>,
        S: Into<String>,
    {
        let seed = self.seed(self.schema.clone());
        let branches: Vec<(String, Pipeline)> = branches(&seed)?
            .into_iter()
            .map(|(name, branch)| (name.into(), branch))
            .collect();

        let arguments: Map<String, Value> = branches
            .iter()
            .map(|(name, branch)| {
                let stages = branch.stages.iter().map(StageDescriptor::to_document).collect();
                (name.clone(), Value::Array(stages))
            })
            .collect();

        self.stage("$facet", Value::Object(arguments), |_, _| {
            Ok(facet_schema(&branches)?)
        })
    }

    // ==================== Terminal stages ====================

    /// The stage list followed by `$out`
    pub fn out(&self, target: impl Into<Value>) -> PipelineResult<Vec<StageDescriptor>> {
        let stage = self.out_stage(target.into())?;
        Ok(self.terminate(stage))
    }

    /// The stage list followed by `$merge`
    pub fn merge(&self, spec: impl Into<Value>) -> PipelineResult<Vec<StageDescriptor>> {
        let stage = self.merge_stage(spec.into())?;
        Ok(self.terminate(stage))
    }

    pub(crate) fn out_stage(&self, target: Value) -> PipelineResult<StageDescriptor> {
        terminal::out(&target).map_err(|cause| self.reject("$out", cause))?;
        Ok(StageDescriptor::new("$out", target))
    }

    pub(crate) fn merge_stage(&self, spec: Value) -> PipelineResult<StageDescriptor> {
        match terminal::merge(self, &spec) {
            Ok(()) => Ok(StageDescriptor::new("$merge", spec)),
            Err(StageFailure::Query(cause)) => Err(self.reject("$merge", cause)),
            Err(StageFailure::Nested(err)) => Err(err),
        }
    }

    fn terminate(&self, stage: StageDescriptor) -> Vec<StageDescriptor> {
        let mut stages = self.build();
        stages.push(stage);
        stages
    }
}

fn facet_schema(branches: &[(String, Pipeline)]) -> QueryResult<Arc<SchemaNode>> {
    if branches.is_empty() {
        return Err(QueryError::invalid_argument("$facet", "at least one branch is required"));
    }
    let mut seen = HashSet::new();
    let mut output = ObjectNode::new();
    for (name, branch) in branches {
        check_field_name("$facet", name)?;
        if !seen.insert(name.as_str()) {
            return Err(QueryError::invalid_argument(
                "$facet",
                format!("duplicate branch '{}'", name),
            ));
        }
        if let Some(stage) = branch
            .stages()
            .iter()
            .find(|stage| FACET_EXCLUDED.contains(&stage.name()))
        {
            return Err(QueryError::invalid_argument(
                "$facet",
                format!("branch '{}' may not contain {}", name, stage.name()),
            ));
        }
        output.insert(name.clone(), SchemaNode::array(branch.schema.clone()), false);
    }
    Ok(Arc::new(SchemaNode::object(output)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pipeline::PipelineErrorCode;
    use crate::query::QueryErrorCode;

    fn employees() -> SchemaNode {
        SchemaNode::object(
            ObjectNode::new()
                .with_field("name", SchemaNode::string())
                .with_field("department", SchemaNode::string())
                .with_field("salary", SchemaNode::double())
                .with_field("tags", SchemaNode::array(SchemaNode::string())),
        )
    }

    #[test]
    fn test_stages_are_recorded_in_order() {
        let pipeline = Pipeline::new(employees())
            .match_(json!({"department": "eng"}))
            .unwrap()
            .limit(10)
            .unwrap();
        let stages = serde_json::to_value(pipeline.build()).unwrap();
        assert_eq!(stages, json!([{"$match": {"department": "eng"}}, {"$limit": 10}]));
    }

    #[test]
    fn test_receiver_is_not_modified() {
        let base = Pipeline::new(employees()).skip(5).unwrap();
        let left = base.limit(1).unwrap();
        let right = base.sample(3).unwrap();
        assert_eq!(base.len(), 1);
        assert_eq!(left.stages()[1].name(), "$limit");
        assert_eq!(right.stages()[1].name(), "$sample");
    }

    #[test]
    fn test_numeric_stage_arguments() {
        let pipeline = Pipeline::new(employees());
        assert!(pipeline.limit(0).is_err());
        assert!(pipeline.skip(-1).is_err());
        assert!(pipeline.skip(0).is_ok());
        assert!(pipeline.sample(0).is_err());
    }

    #[test]
    fn test_rejection_carries_context() {
        let err = Pipeline::new(employees())
            .limit(3)
            .unwrap()
            .sort(json!({"age": 1}))
            .unwrap_err();
        assert_eq!(err.code(), PipelineErrorCode::StageValidation);
        assert_eq!(err.stage_index(), 1);
        assert_eq!(err.stage(), "$sort");
        assert_eq!(err.path(), Some("age"));
        assert_eq!(err.cause().unwrap().code(), QueryErrorCode::UnknownField);
        assert_eq!(**err.available().unwrap(), employees());
    }

    #[test]
    fn test_first_stage_only() {
        let docs = json!([{"a": 1}]);
        assert!(Pipeline::new(employees()).documents(docs.clone()).is_ok());
        let err = Pipeline::new(employees())
            .limit(1)
            .unwrap()
            .documents(docs)
            .unwrap_err();
        assert_eq!(err.stage(), "$documents");
    }

    #[test]
    fn test_facet_branches() {
        let pipeline = Pipeline::new(employees())
            .facet(|seed| {
                Ok([
                    ("top", seed.sort(json!({"salary": -1}))?.limit(3)?),
                    ("count", seed.count("total")?),
                ])
            })
            .unwrap();

        let schema = pipeline.schema();
        assert_eq!(schema.top_level_fields(), vec!["top", "count"]);
        let count = schema.field_type("count").unwrap().element_type().unwrap().clone();
        assert_eq!(count.top_level_fields(), vec!["total"]);

        let stages = serde_json::to_value(pipeline.build()).unwrap();
        assert_eq!(
            stages,
            json!([{"$facet": {
                "top": [{"$sort": {"salary": -1}}, {"$limit": 3}],
                "count": [{"$count": "total"}]
            }}])
        );
    }

    #[test]
    fn test_facet_branch_rules() {
        let base = Pipeline::new(employees());
        let nested = base.facet(|seed| {
            let inner = seed.facet(|s| Ok([("x", s.limit(1)?)]))?;
            Ok([("outer", inner)])
        });
        assert_eq!(nested.unwrap_err().stage(), "$facet");

        assert!(base.facet(|seed| Ok([("$bad", seed.clone())])).is_err());
        assert!(base.facet(|seed| Ok([("a.b", seed.clone())])).is_err());
        assert!(base
            .facet(|seed| Ok(vec![("a", seed.clone()), ("a", seed.clone())]))
            .is_err());
        assert!(base.facet(|_| Ok(Vec::<(String, Pipeline)>::new())).is_err());
    }

    #[test]
    fn test_facet_branch_error_index_is_relative() {
        let err = Pipeline::new(employees())
            .limit(5)
            .unwrap()
            .facet(|seed| Ok([("bad", seed.limit(2)?.sort(json!({"missing": 1}))?)]))
            .unwrap_err();
        assert_eq!(err.stage(), "$sort");
        assert_eq!(err.stage_index(), 1);
    }

    #[test]
    fn test_terminal_stages_leave_pipeline_usable() {
        let pipeline = Pipeline::new(employees()).limit(1).unwrap();
        let stages = pipeline.out("archive").unwrap();
        assert_eq!(stages.len(), 2);
        assert_eq!(stages[1].to_document(), json!({"$out": "archive"}));
        assert_eq!(pipeline.len(), 1);
        assert!(pipeline.skip(1).is_ok());
    }

    #[test]
    fn test_foreign_requires_catalog() {
        let err = Pipeline::new(employees())
            .lookup(json!({"from": "orders", "localField": "name", "foreignField": "customer", "as": "orders"}))
            .unwrap_err();
        assert_eq!(err.cause().unwrap().code(), QueryErrorCode::UnknownCollection);
    }
}
