//! `$out` and `$merge`

use std::sync::Arc;

use serde_json::Value;

use crate::query::{is_variable_name, QueryError, QueryResult};
use crate::schema::{describe, SchemaNode};

use super::builder::{Pipeline, StageFailure};
use super::update_pipeline::UpdatePipeline;
use super::validate::{known_keys, object_arg, string_arg};

const WHEN_MATCHED: &[&str] = &["replace", "keepExisting", "merge", "fail"];
const WHEN_NOT_MATCHED: &[&str] = &["insert", "discard", "fail"];

/// A collection name or `{ db, coll }`
fn namespace(stage: &str, value: &Value) -> QueryResult<()> {
    match value {
        Value::String(name) if !name.is_empty() => Ok(()),
        Value::Object(map) => {
            known_keys(stage, map, &["db", "coll"])?;
            string_arg(stage, map, "db")?;
            string_arg(stage, map, "coll")?;
            Ok(())
        }
        other => Err(QueryError::invalid_argument(
            stage,
            format!("expected a collection name or {{db, coll}}, found {}", describe(other)),
        )),
    }
}

pub(crate) fn out(target: &Value) -> QueryResult<()> {
    namespace("$out", target)
}

fn merge_on(pipeline: &Pipeline, on: &Value) -> QueryResult<()> {
    let paths: Vec<&Value> = match on {
        Value::String(_) => vec![on],
        Value::Array(items) if !items.is_empty() => items.iter().collect(),
        other => {
            return Err(QueryError::invalid_argument(
                "$merge",
                format!("'on' must be a path or a non-empty list of paths, found {}", describe(other)),
            ))
        }
    };
    for path in paths {
        let path = path
            .as_str()
            .ok_or_else(|| QueryError::invalid_argument("$merge", "'on' paths must be strings"))?;
        pipeline.resolve(path)?;
    }
    Ok(())
}

pub(crate) fn merge(pipeline: &Pipeline, spec: &Value) -> Result<(), StageFailure> {
    if spec.is_string() {
        return Ok(namespace("$merge", spec)?);
    }
    let map = object_arg("$merge", spec)?;
    known_keys(
        "$merge",
        map,
        &["into", "on", "let", "whenMatched", "whenNotMatched"],
    )?;
    let into = map
        .get("into")
        .ok_or_else(|| QueryError::invalid_argument("$merge", "'into' is required"))?;
    namespace("$merge", into)?;
    if let Some(on) = map.get("on") {
        merge_on(pipeline, on)?;
    }

    // `$$new` is the incoming document unless `let` rebinds it
    let mut variables = vec![("new".to_string(), pipeline.schema().clone())];
    if let Some(bindings) = map.get("let") {
        let inferer = pipeline.inferer();
        for (name, expr) in object_arg("$merge", bindings)? {
            if !is_variable_name(name) {
                return Err(QueryError::invalid_argument(
                    "$merge",
                    format!("'{}' is not a valid variable name", name),
                )
                .into());
            }
            variables.push((name.clone(), inferer.infer(expr)?));
        }
    }

    match map.get("whenMatched") {
        None => {}
        Some(Value::String(mode)) if WHEN_MATCHED.contains(&mode.as_str()) => {}
        Some(Value::Array(stages)) => {
            let target: Arc<SchemaNode> = pipeline.schema().clone();
            let seed = UpdatePipeline::from_pipeline(pipeline.seed(target).with_bindings(variables));
            seed.replay(stages)?;
        }
        Some(other) => {
            return Err(QueryError::invalid_argument(
                "$merge",
                format!("invalid 'whenMatched' value {}", describe(other)),
            )
            .into())
        }
    }
    match map.get("whenNotMatched") {
        None => Ok(()),
        Some(Value::String(mode)) if WHEN_NOT_MATCHED.contains(&mode.as_str()) => Ok(()),
        Some(other) => Err(QueryError::invalid_argument(
            "$merge",
            format!("invalid 'whenNotMatched' value {}", describe(other)),
        )
        .into()),
    }
}
