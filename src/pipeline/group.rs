//! `$group`, `$count` and `$sortByCount`, plus the accumulator rules
//! shared with `$bucket` and `$setWindowFields`

use std::sync::Arc;

use serde_json::Value;

use crate::operators::{accumulator, AccumulatorArgs, AccumulatorOutput};
use crate::query::{is_operator_object, QueryError, QueryResult};
use crate::schema::{describe, ObjectNode, SchemaNode};

use super::builder::Pipeline;
use super::shape::check_field_name;
use super::validate::sort_spec;

/// Output type of `{ <accumulator>: <args> }`.
///
/// Window-only accumulators are accepted only when `window` is set.
pub(crate) fn accumulate(pipeline: &Pipeline, stage: &str, field: &str, value: &Value, window: bool) -> QueryResult<Arc<SchemaNode>> {
    let (name, args) = match value {
        Value::Object(map) if map.len() == 1 && is_operator_object(map) => {
            map.iter().next().ok_or_else(|| QueryError::invalid_argument(stage, "empty accumulator"))?
        }
        other => {
            return Err(QueryError::invalid_argument(
                stage,
                format!("field '{}' must be a single accumulator object, found {}", field, describe(other)),
            )
            .with_path(field))
        }
    };
    let entry = accumulator(name).ok_or_else(|| QueryError::unknown_operator(name, "accumulator"))?;
    if entry.window_only && !window {
        return Err(QueryError::invalid_argument(name, "only valid inside $setWindowFields"));
    }

    let inferer = pipeline.inferer();
    let inner = match entry.args {
        AccumulatorArgs::Expression => inferer.infer(args)?,
        AccumulatorArgs::EmptyObject => match args {
            Value::Object(map) if map.is_empty() => Arc::new(SchemaNode::unknown()),
            _ => return Err(QueryError::invalid_argument(name, "expected {}")),
        },
        AccumulatorArgs::Named { required, optional } => {
            let Value::Object(map) = args else {
                return Err(QueryError::invalid_argument(name, "expected an object of named arguments"));
            };
            if let Some(missing) = required.iter().find(|key| !map.contains_key(**key)) {
                return Err(QueryError::invalid_argument(
                    name,
                    format!("missing required argument '{}'", missing),
                ));
            }
            let mut inner = Arc::new(SchemaNode::unknown());
            for (key, arg) in map {
                if !required.contains(&key.as_str()) && !optional.contains(&key.as_str()) {
                    return Err(QueryError::invalid_argument(
                        name,
                        format!("unexpected argument '{}'", key),
                    ));
                }
                if key == "sortBy" {
                    sort_spec(pipeline, name, arg)?;
                    continue;
                }
                let node = inferer.infer(arg)?;
                if entry.inner == Some(key.as_str()) {
                    inner = node;
                }
            }
            inner
        }
    };

    Ok(match entry.output {
        AccumulatorOutput::Number => Arc::new(SchemaNode::number()),
        AccumulatorOutput::ArrayOfInner => Arc::new(SchemaNode::array(inner)),
        AccumulatorOutput::Inner => inner,
    })
}

pub(crate) fn group(pipeline: &Pipeline, spec: &Value) -> QueryResult<Arc<SchemaNode>> {
    let Value::Object(map) = spec else {
        return Err(QueryError::invalid_argument(
            "$group",
            format!("expected an object, found {}", describe(spec)),
        ));
    };
    let id = map
        .get("_id")
        .ok_or_else(|| QueryError::invalid_argument("$group", "'_id' is required"))?;

    let mut output = ObjectNode::new();
    output.insert("_id", pipeline.inferer().infer(id).map_err(|e| e.with_path("_id"))?, false);
    for (field, value) in map {
        if field == "_id" {
            continue;
        }
        check_field_name("$group", field)?;
        let node = accumulate(pipeline, "$group", field, value, false)?;
        output.insert(field.clone(), node, false);
    }
    Ok(Arc::new(SchemaNode::object(output)))
}

pub(crate) fn count(field: &str) -> QueryResult<Arc<SchemaNode>> {
    check_field_name("$count", field)?;
    Ok(Arc::new(SchemaNode::object(
        ObjectNode::new().with_field(field, SchemaNode::number()),
    )))
}

/// A grouping key must be a field path or an expression object
pub(crate) fn group_key(pipeline: &Pipeline, stage: &str, expr: &Value) -> QueryResult<Arc<SchemaNode>> {
    let valid = match expr {
        Value::String(text) => text.starts_with('$'),
        Value::Object(map) => is_operator_object(map),
        _ => false,
    };
    if !valid {
        return Err(QueryError::invalid_argument(
            stage,
            format!("expected a field path or an expression object, found {}", describe(expr)),
        ));
    }
    pipeline.inferer().infer(expr)
}

pub(crate) fn sort_by_count(pipeline: &Pipeline, expr: &Value) -> QueryResult<Arc<SchemaNode>> {
    let key = group_key(pipeline, "$sortByCount", expr)?;
    Ok(Arc::new(SchemaNode::object(
        ObjectNode::new()
            .with_field("_id", key)
            .with_field("count", SchemaNode::number()),
    )))
}
