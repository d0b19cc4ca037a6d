//! `$lookup`, `$graphLookup` and `$unionWith`
//!
//! Foreign collections come from the catalog attached to the pipeline.
//! Sub-pipelines are replayed against the foreign schema.

use std::sync::Arc;

use serde_json::Value;

use crate::query::{is_variable_name, QueryError, QueryResult};
use crate::schema::{describe, SchemaNode};

use super::builder::{Pipeline, StageFailure};
use super::replay::replay;
use super::shape::{field_names, set_path, Slot};
use super::validate::{known_keys, object_arg, string_arg};

/// Replays `stages` over `seed`, refusing terminal stages
fn sub_pipeline(stage: &str, seed: &Pipeline, stages: &Value) -> Result<Pipeline, StageFailure> {
    let Value::Array(stages) = stages else {
        return Err(QueryError::invalid_argument(stage, "'pipeline' must be an array of stages").into());
    };
    let replayed = replay(seed, stages)?;
    if let Some(terminal) = replayed.terminal() {
        return Err(QueryError::invalid_argument(
            stage,
            format!("{} is not allowed in a sub-pipeline", terminal.name()),
        )
        .into());
    }
    Ok(replayed.into_pipeline())
}

/// `let` bindings, typed against the current schema
fn bindings(pipeline: &Pipeline, stage: &str, value: Option<&Value>) -> QueryResult<Vec<(String, Arc<SchemaNode>)>> {
    let Some(value) = value else {
        return Ok(Vec::new());
    };
    let inferer = pipeline.inferer();
    object_arg(stage, value)?
        .iter()
        .map(|(name, expr)| {
            if !is_variable_name(name) {
                return Err(QueryError::invalid_argument(
                    stage,
                    format!("'{}' is not a valid variable name", name),
                ));
            }
            Ok((name.clone(), inferer.infer(expr)?))
        })
        .collect()
}

pub(crate) fn lookup(pipeline: &Pipeline, spec: &Value) -> Result<Arc<SchemaNode>, StageFailure> {
    let map = object_arg("$lookup", spec)?;
    known_keys(
        "$lookup",
        map,
        &["from", "localField", "foreignField", "let", "pipeline", "as"],
    )?;
    let foreign = pipeline.foreign(string_arg("$lookup", map, "from")?)?;
    let target = field_names("$lookup", string_arg("$lookup", map, "as")?)?;

    let equality = match (map.contains_key("localField"), map.contains_key("foreignField")) {
        (true, true) => {
            pipeline.resolve(string_arg("$lookup", map, "localField")?)?;
            pipeline.resolve_in(&foreign, string_arg("$lookup", map, "foreignField")?)?;
            true
        }
        (false, false) => false,
        _ => {
            return Err(QueryError::invalid_argument(
                "$lookup",
                "'localField' and 'foreignField' must be given together",
            )
            .into())
        }
    };

    let joined = match map.get("pipeline") {
        Some(stages) => {
            let variables = bindings(pipeline, "$lookup", map.get("let"))?;
            let seed = pipeline.seed(foreign).with_bindings(variables);
            sub_pipeline("$lookup", &seed, stages)?.schema().clone()
        }
        None if map.contains_key("let") => {
            return Err(QueryError::invalid_argument("$lookup", "'let' requires 'pipeline'").into())
        }
        None if !equality => {
            return Err(QueryError::invalid_argument(
                "$lookup",
                "either 'localField'/'foreignField' or 'pipeline' is required",
            )
            .into())
        }
        None => foreign,
    };

    let schema = set_path(
        pipeline.schema(),
        &target,
        Arc::new(SchemaNode::array(joined)),
        Slot::required(),
    );
    Ok(Arc::new(schema))
}

pub(crate) fn graph_lookup(pipeline: &Pipeline, spec: &Value) -> QueryResult<()> {
    let map = object_arg("$graphLookup", spec)?;
    known_keys(
        "$graphLookup",
        map,
        &[
            "from",
            "startWith",
            "connectFromField",
            "connectToField",
            "as",
            "maxDepth",
            "depthField",
            "restrictSearchWithMatch",
        ],
    )?;
    let foreign = pipeline.foreign(string_arg("$graphLookup", map, "from")?)?;

    let start = map
        .get("startWith")
        .ok_or_else(|| QueryError::invalid_argument("$graphLookup", "'startWith' is required"))?;
    pipeline.inferer().infer(start)?;
    pipeline.resolve_in(&foreign, string_arg("$graphLookup", map, "connectFromField")?)?;
    pipeline.resolve_in(&foreign, string_arg("$graphLookup", map, "connectToField")?)?;
    field_names("$graphLookup", string_arg("$graphLookup", map, "as")?)?;

    if map.contains_key("depthField") {
        field_names("$graphLookup", string_arg("$graphLookup", map, "depthField")?)?;
    }
    if map.get("maxDepth").map_or(false, |depth| depth.as_u64().is_none()) {
        return Err(QueryError::invalid_argument(
            "$graphLookup",
            "'maxDepth' must be a non-negative integer",
        ));
    }
    if let Some(restrict) = map.get("restrictSearchWithMatch") {
        pipeline.check_filter(&foreign, restrict)?;
    }
    Ok(())
}

pub(crate) fn union_with(pipeline: &Pipeline, spec: &Value) -> Result<(), StageFailure> {
    match spec {
        Value::String(collection) if !collection.is_empty() => Ok(()),
        Value::Object(map) => {
            known_keys("$unionWith", map, &["coll", "pipeline"])?;
            let collection = string_arg("$unionWith", map, "coll")?;
            if let Some(stages) = map.get("pipeline") {
                let seed = pipeline.seed(pipeline.foreign(collection)?);
                sub_pipeline("$unionWith", &seed, stages)?;
            }
            Ok(())
        }
        other => Err(QueryError::invalid_argument(
            "$unionWith",
            format!("expected a collection name or {{coll, pipeline}}, found {}", describe(other)),
        )
        .into()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pipeline::PipelineErrorCode;
    use crate::query::QueryErrorCode;
    use crate::schema::{ObjectNode, SchemaCatalog};
    use serde_json::json;

    fn catalog() -> SchemaCatalog {
        SchemaCatalog::new()
            .with_collection(
                "customers",
                SchemaNode::object(
                    ObjectNode::new()
                        .with_field("_id", SchemaNode::object_id())
                        .with_field("name", SchemaNode::string())
                        .with_field("manager", SchemaNode::string()),
                ),
            )
            .with_collection(
                "orders",
                SchemaNode::object(
                    ObjectNode::new()
                        .with_field("customer", SchemaNode::object_id())
                        .with_field("amount", SchemaNode::double())
                        .with_field("status", SchemaNode::string()),
                ),
            )
    }

    fn customers() -> Pipeline {
        Pipeline::for_collection(catalog(), "customers").unwrap()
    }

    fn query_code(result: Result<Arc<SchemaNode>, StageFailure>) -> QueryErrorCode {
        match result {
            Err(StageFailure::Query(err)) => err.code(),
            _ => panic!("expected a query failure"),
        }
    }

    #[test]
    fn test_equality_lookup() {
        let schema = lookup(
            &customers(),
            &json!({"from": "orders", "localField": "_id", "foreignField": "customer", "as": "orders"}),
        )
        .ok()
        .unwrap();
        let orders = schema.field_type("orders").unwrap();
        let order = orders.element_type().unwrap();
        assert_eq!(order.top_level_fields(), vec!["customer", "amount", "status"]);
    }

    #[test]
    fn test_pipeline_lookup() {
        let schema = lookup(
            &customers(),
            &json!({
                "from": "orders",
                "let": {"cid": "$_id"},
                "pipeline": [
                    {"$match": {"$expr": {"$eq": ["$customer", "$$cid"]}}},
                    {"$group": {"_id": "$status", "total": {"$sum": "$amount"}}}
                ],
                "as": "totals"
            }),
        )
        .ok()
        .unwrap();
        let totals = schema.field_type("totals").unwrap().element_type().unwrap().clone();
        assert_eq!(totals.top_level_fields(), vec!["_id", "total"]);
    }

    #[test]
    fn test_lookup_errors() {
        let p = customers();
        assert_eq!(
            query_code(lookup(&p, &json!({"from": "nope", "localField": "_id", "foreignField": "customer", "as": "x"}))),
            QueryErrorCode::UnknownCollection
        );
        assert_eq!(
            query_code(lookup(&p, &json!({"from": "orders", "localField": "_id", "foreignField": "cust", "as": "x"}))),
            QueryErrorCode::UnknownField
        );
        assert_eq!(
            query_code(lookup(&p, &json!({"from": "orders", "localField": "_id", "as": "x"}))),
            QueryErrorCode::InvalidArgument
        );
        assert_eq!(
            query_code(lookup(&p, &json!({"from": "orders", "as": "x"}))),
            QueryErrorCode::InvalidArgument
        );
        assert_eq!(
            query_code(lookup(&p, &json!({"from": "orders", "let": {"Bad": 1}, "pipeline": [], "as": "x"}))),
            QueryErrorCode::InvalidArgument
        );
    }

    #[test]
    fn test_lookup_sub_pipeline_error_is_nested() {
        let result = lookup(
            &customers(),
            &json!({"from": "orders", "pipeline": [{"$limit": 1}, {"$sort": {"name": 1}}], "as": "x"}),
        );
        match result {
            Err(StageFailure::Nested(err)) => {
                assert_eq!(err.code(), PipelineErrorCode::StageValidation);
                assert_eq!(err.stage_index(), 1);
                assert_eq!(err.path(), Some("name"));
            }
            _ => panic!("expected a nested failure"),
        }

        let result = lookup(
            &customers(),
            &json!({"from": "orders", "pipeline": [{"$out": "x"}], "as": "x"}),
        );
        assert_eq!(query_code(result), QueryErrorCode::InvalidArgument);
    }

    #[test]
    fn test_graph_lookup() {
        let p = customers();
        let ok = json!({
            "from": "customers",
            "startWith": "$manager",
            "connectFromField": "manager",
            "connectToField": "name",
            "as": "chain",
            "maxDepth": 3,
            "depthField": "level",
            "restrictSearchWithMatch": {"name": {"$ne": ""}}
        });
        assert!(graph_lookup(&p, &ok).is_ok());

        let bad = json!({
            "from": "customers",
            "startWith": "$manager",
            "connectFromField": "boss",
            "connectToField": "name",
            "as": "chain"
        });
        assert_eq!(graph_lookup(&p, &bad).unwrap_err().code(), QueryErrorCode::UnknownField);
    }

    #[test]
    fn test_union_with() {
        let p = customers();
        assert!(union_with(&p, &json!("archive")).is_ok());
        assert!(union_with(&p, &json!({"coll": "orders", "pipeline": [{"$match": {"amount": {"$gt": 1}}}]})).is_ok());
        assert!(matches!(
            union_with(&p, &json!({"coll": "orders", "pipeline": [{"$match": {"name": "x"}}]})),
            Err(StageFailure::Nested(_))
        ));
        assert!(matches!(union_with(&p, &json!(1)), Err(StageFailure::Query(_))));
    }
}
