//! `$bucket`, `$bucketAuto`, `$densify`, `$fill` and `$setWindowFields`
//!
//! These stages are checked against the current schema and pass it
//! through unchanged.

use serde_json::{Map, Value};

use crate::operators::Capability;
use crate::query::{QueryError, QueryResult};
use crate::schema::{describe, extended_json_kind, ScalarKind};

use super::builder::Pipeline;
use super::group::{accumulate, group_key};
use super::shape::{check_field_name, field_names};
use super::validate::{known_keys, object_arg, sort_spec, string_arg};

const GRANULARITIES: &[&str] = &[
    "R5", "R10", "R20", "R40", "R80", "1-2-5", "E6", "E12", "E24", "E48", "E96", "E192",
    "POWERSOF2",
];

const TIME_UNITS: &[&str] = &[
    "millisecond",
    "second",
    "minute",
    "hour",
    "day",
    "week",
    "month",
    "quarter",
    "year",
];

fn is_positive_integer(value: &Value) -> bool {
    value.as_i64().map_or(false, |n| n > 0)
}

/// `output` of `$bucket` and `$bucketAuto`
fn bucket_output(pipeline: &Pipeline, stage: &str, output: Option<&Value>) -> QueryResult<()> {
    let Some(output) = output else {
        return Ok(());
    };
    for (field, value) in object_arg(stage, output)? {
        check_field_name(stage, field)?;
        accumulate(pipeline, stage, field, value, false)?;
    }
    Ok(())
}

/// Comparable boundary value
fn boundary_key(value: &Value) -> Option<(&'static str, Value)> {
    match value {
        Value::Number(n) => n.as_f64().map(|f| ("number", Value::from(f))),
        Value::String(_) => Some(("string", value.clone())),
        Value::Object(map) => match extended_json_kind(map) {
            Some(ScalarKind::Date) => Some(("date", value.clone())),
            Some(kind) if kind.is_numeric() => Some(("number", value.clone())),
            _ => None,
        },
        _ => None,
    }
}

fn ascending(left: &Value, right: &Value) -> bool {
    match (left, right) {
        (Value::Number(a), Value::Number(b)) => match (a.as_f64(), b.as_f64()) {
            (Some(a), Some(b)) => a < b,
            _ => false,
        },
        (Value::String(a), Value::String(b)) => a < b,
        // Extended JSON values are not ordered here
        _ => true,
    }
}

pub(crate) fn bucket(pipeline: &Pipeline, spec: &Value) -> QueryResult<()> {
    let map = object_arg("$bucket", spec)?;
    known_keys("$bucket", map, &["groupBy", "boundaries", "default", "output"])?;

    let group_by = map
        .get("groupBy")
        .ok_or_else(|| QueryError::invalid_argument("$bucket", "'groupBy' is required"))?;
    group_key(pipeline, "$bucket", group_by)?;

    let boundaries = match map.get("boundaries") {
        Some(Value::Array(items)) if items.len() >= 2 => items,
        _ => {
            return Err(QueryError::invalid_argument(
                "$bucket",
                "'boundaries' must be an array of at least two values",
            ))
        }
    };
    let mut kind = None;
    for (i, boundary) in boundaries.iter().enumerate() {
        let Some((this_kind, key)) = boundary_key(boundary) else {
            return Err(QueryError::invalid_argument(
                "$bucket",
                format!("boundary {} is not a number, string or date", describe(boundary)),
            ));
        };
        if kind.map_or(false, |k| k != this_kind) {
            return Err(QueryError::invalid_argument(
                "$bucket",
                "all boundaries must have the same type",
            ));
        }
        kind = Some(this_kind);
        if i > 0 {
            let previous = boundary_key(&boundaries[i - 1]).map(|(_, v)| v).unwrap_or(Value::Null);
            if !ascending(&previous, &key) {
                return Err(QueryError::invalid_argument(
                    "$bucket",
                    "boundaries must be sorted in ascending order",
                ));
            }
        }
    }
    bucket_output(pipeline, "$bucket", map.get("output"))
}

pub(crate) fn bucket_auto(pipeline: &Pipeline, spec: &Value) -> QueryResult<()> {
    let map = object_arg("$bucketAuto", spec)?;
    known_keys("$bucketAuto", map, &["groupBy", "buckets", "output", "granularity"])?;

    let group_by = map
        .get("groupBy")
        .ok_or_else(|| QueryError::invalid_argument("$bucketAuto", "'groupBy' is required"))?;
    group_key(pipeline, "$bucketAuto", group_by)?;

    if !map.get("buckets").map_or(false, is_positive_integer) {
        return Err(QueryError::invalid_argument(
            "$bucketAuto",
            "'buckets' must be a positive integer",
        ));
    }
    if map.contains_key("granularity") {
        let granularity = string_arg("$bucketAuto", map, "granularity")?;
        if !GRANULARITIES.contains(&granularity) {
            return Err(QueryError::invalid_argument(
                "$bucketAuto",
                format!("unknown granularity '{}'", granularity),
            ));
        }
    }
    bucket_output(pipeline, "$bucketAuto", map.get("output"))
}

fn partition_fields(pipeline: &Pipeline, stage: &str, value: Option<&Value>) -> QueryResult<()> {
    let Some(value) = value else {
        return Ok(());
    };
    let Value::Array(fields) = value else {
        return Err(QueryError::invalid_argument(
            stage,
            "'partitionByFields' must be an array of paths",
        ));
    };
    for field in fields {
        let path = field.as_str().ok_or_else(|| {
            QueryError::invalid_argument(stage, "'partitionByFields' must be an array of paths")
        })?;
        pipeline.resolve(path)?;
    }
    Ok(())
}

fn check_bounds(stage: &str, bounds: &Value) -> QueryResult<()> {
    let valid = match bounds {
        Value::String(text) => text == "full" || text == "partition",
        Value::Array(pair) => pair.len() == 2,
        _ => false,
    };
    if valid {
        Ok(())
    } else {
        Err(QueryError::invalid_argument(
            stage,
            "'bounds' must be \"full\", \"partition\" or a [lower, upper] pair",
        ))
    }
}

fn check_unit(stage: &str, map: &Map<String, Value>) -> QueryResult<()> {
    if map.contains_key("unit") {
        let unit = string_arg(stage, map, "unit")?;
        if !TIME_UNITS.contains(&unit) {
            return Err(QueryError::invalid_argument(
                stage,
                format!("unknown time unit '{}'", unit),
            ));
        }
    }
    Ok(())
}

pub(crate) fn densify(pipeline: &Pipeline, spec: &Value) -> QueryResult<()> {
    let map = object_arg("$densify", spec)?;
    known_keys("$densify", map, &["field", "partitionByFields", "range"])?;

    let field = string_arg("$densify", map, "field")?;
    let resolved = pipeline.resolve(field)?;
    let node = resolved.node();
    if !Capability::Numeric.admits(node) && !Capability::Date.admits(node) {
        return Err(QueryError::incompatible_operator(
            "$densify",
            field,
            node,
            Capability::Numeric,
        ));
    }
    partition_fields(pipeline, "$densify", map.get("partitionByFields"))?;

    let range = object_arg(
        "$densify",
        map.get("range")
            .ok_or_else(|| QueryError::invalid_argument("$densify", "'range' is required"))?,
    )?;
    known_keys("$densify", range, &["step", "unit", "bounds"])?;
    let step_ok = range
        .get("step")
        .and_then(Value::as_f64)
        .map_or(false, |step| step > 0.0);
    if !step_ok {
        return Err(QueryError::invalid_argument(
            "$densify",
            "'range.step' must be a positive number",
        ));
    }
    check_unit("$densify", range)?;
    let bounds = range
        .get("bounds")
        .ok_or_else(|| QueryError::invalid_argument("$densify", "'range.bounds' is required"))?;
    check_bounds("$densify", bounds)
}

pub(crate) fn fill(pipeline: &Pipeline, spec: &Value) -> QueryResult<()> {
    let map = object_arg("$fill", spec)?;
    known_keys("$fill", map, &["sortBy", "partitionBy", "partitionByFields", "output"])?;
    if map.contains_key("partitionBy") && map.contains_key("partitionByFields") {
        return Err(QueryError::invalid_argument(
            "$fill",
            "'partitionBy' and 'partitionByFields' are mutually exclusive",
        ));
    }
    if let Some(partition) = map.get("partitionBy") {
        pipeline.inferer().infer(partition)?;
    }
    partition_fields(pipeline, "$fill", map.get("partitionByFields"))?;
    if let Some(sort) = map.get("sortBy") {
        sort_spec(pipeline, "$fill", sort)?;
    }

    let output = object_arg(
        "$fill",
        map.get("output")
            .ok_or_else(|| QueryError::invalid_argument("$fill", "'output' is required"))?,
    )?;
    for (path, method) in output {
        pipeline.resolve(path)?;
        let method = object_arg("$fill", method)?;
        match (method.get("value"), method.get("method")) {
            (Some(value), None) if method.len() == 1 => {
                pipeline.inferer().infer(value)?;
            }
            (None, Some(Value::String(name))) if method.len() == 1 => match name.as_str() {
                "locf" => {}
                "linear" if map.contains_key("sortBy") => {}
                "linear" => {
                    return Err(QueryError::invalid_argument(
                        "$fill",
                        "the linear method requires 'sortBy'",
                    ))
                }
                other => {
                    return Err(QueryError::invalid_argument(
                        "$fill",
                        format!("unknown fill method '{}'", other),
                    ))
                }
            },
            _ => {
                return Err(QueryError::invalid_argument(
                    "$fill",
                    format!("output '{}' must be {{value: <expr>}} or {{method: <name>}}", path),
                )
                .with_path(path.clone()))
            }
        }
    }
    Ok(())
}

fn check_window(window: &Value) -> QueryResult<()> {
    let map = object_arg("window", window)?;
    known_keys("window", map, &["documents", "range", "unit"])?;
    let bounds = match (map.get("documents"), map.get("range")) {
        (Some(bounds), None) => bounds,
        (None, Some(bounds)) => bounds,
        _ => {
            return Err(QueryError::invalid_argument(
                "window",
                "exactly one of 'documents' or 'range' is required",
            ))
        }
    };
    let valid = match bounds {
        Value::Array(pair) if pair.len() == 2 => pair.iter().all(|bound| {
            bound.is_number() || matches!(bound.as_str(), Some("current" | "unbounded"))
        }),
        _ => false,
    };
    if !valid {
        return Err(QueryError::invalid_argument(
            "window",
            "bounds must be a [lower, upper] pair of numbers, \"current\" or \"unbounded\"",
        ));
    }
    check_unit("window", map)
}

pub(crate) fn set_window_fields(pipeline: &Pipeline, spec: &Value) -> QueryResult<()> {
    let map = object_arg("$setWindowFields", spec)?;
    known_keys("$setWindowFields", map, &["partitionBy", "sortBy", "output"])?;
    if let Some(partition) = map.get("partitionBy") {
        pipeline.inferer().infer(partition)?;
    }
    if let Some(sort) = map.get("sortBy") {
        sort_spec(pipeline, "$setWindowFields", sort)?;
    }

    let output = object_arg(
        "$setWindowFields",
        map.get("output").ok_or_else(|| {
            QueryError::invalid_argument("$setWindowFields", "'output' is required")
        })?,
    )?;
    for (field, definition) in output {
        field_names("$setWindowFields", field)?;
        let definition = object_arg("$setWindowFields", definition)?;
        let mut function = Map::new();
        for (key, value) in definition {
            if key == "window" {
                check_window(value)?;
            } else {
                function.insert(key.clone(), value.clone());
            }
        }
        accumulate(pipeline, "$setWindowFields", field, &Value::Object(function), true)?;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::query::QueryErrorCode;
    use crate::schema::{ObjectNode, SchemaNode};
    use serde_json::json;

    fn pipeline() -> Pipeline {
        Pipeline::new(SchemaNode::object(
            ObjectNode::new()
                .with_field("name", SchemaNode::string())
                .with_field("dept", SchemaNode::string())
                .with_field("price", SchemaNode::double())
                .with_field("day", SchemaNode::date())
                .with_optional_field("stock", SchemaNode::int()),
        ))
    }

    fn code(result: QueryResult<()>) -> QueryErrorCode {
        result.unwrap_err().code()
    }

    #[test]
    fn test_bucket() {
        let p = pipeline();
        let ok = json!({
            "groupBy": "$price",
            "boundaries": [0, 100, 200],
            "default": "other",
            "output": {"count": {"$sum": 1}, "names": {"$push": "$name"}}
        });
        assert!(bucket(&p, &ok).is_ok());

        assert_eq!(
            code(bucket(&p, &json!({"groupBy": "$price", "boundaries": [100, 0]}))),
            QueryErrorCode::InvalidArgument
        );
        assert_eq!(
            code(bucket(&p, &json!({"groupBy": "$price", "boundaries": [0, "a"]}))),
            QueryErrorCode::InvalidArgument
        );
        assert_eq!(
            code(bucket(&p, &json!({"groupBy": "price", "boundaries": [0, 1]}))),
            QueryErrorCode::InvalidArgument
        );
        assert_eq!(
            code(bucket(&p, &json!({"groupBy": "$cost", "boundaries": [0, 1]}))),
            QueryErrorCode::UnknownField
        );
    }

    #[test]
    fn test_bucket_auto() {
        let p = pipeline();
        assert!(bucket_auto(&p, &json!({"groupBy": "$price", "buckets": 4, "granularity": "R5"})).is_ok());
        assert!(bucket_auto(&p, &json!({"groupBy": "$price", "buckets": 0})).is_err());
        assert!(bucket_auto(&p, &json!({"groupBy": "$price", "buckets": 2, "granularity": "R7"})).is_err());
    }

    #[test]
    fn test_densify() {
        let p = pipeline();
        let ok = json!({"field": "day", "partitionByFields": ["dept"], "range": {"step": 1, "unit": "day", "bounds": "full"}});
        assert!(densify(&p, &ok).is_ok());
        assert!(densify(&p, &json!({"field": "price", "range": {"step": 0.5, "bounds": [0, 10]}})).is_ok());

        assert_eq!(
            code(densify(&p, &json!({"field": "name", "range": {"step": 1, "bounds": "full"}}))),
            QueryErrorCode::IncompatibleOperator
        );
        assert_eq!(
            code(densify(&p, &json!({"field": "price", "range": {"step": -1, "bounds": "full"}}))),
            QueryErrorCode::InvalidArgument
        );
        assert_eq!(
            code(densify(&p, &json!({"field": "price", "range": {"step": 1, "bounds": "all"}}))),
            QueryErrorCode::InvalidArgument
        );
    }

    #[test]
    fn test_fill() {
        let p = pipeline();
        let ok = json!({"sortBy": {"day": 1}, "output": {"price": {"method": "linear"}, "stock": {"value": 0}}});
        assert!(fill(&p, &ok).is_ok());

        assert_eq!(
            code(fill(&p, &json!({"output": {"price": {"method": "linear"}}}))),
            QueryErrorCode::InvalidArgument
        );
        assert_eq!(
            code(fill(&p, &json!({"output": {"missing": {"value": 0}}}))),
            QueryErrorCode::UnknownField
        );
        assert_eq!(
            code(fill(&p, &json!({"partitionBy": "$dept", "partitionByFields": ["dept"], "output": {}}))),
            QueryErrorCode::InvalidArgument
        );
    }

    #[test]
    fn test_set_window_fields() {
        let p = pipeline();
        let ok = json!({
            "partitionBy": "$dept",
            "sortBy": {"day": 1},
            "output": {
                "running": {"$sum": "$price", "window": {"documents": ["unbounded", "current"]}},
                "rank": {"$rank": {}}
            }
        });
        assert!(set_window_fields(&p, &ok).is_ok());

        assert_eq!(
            code(set_window_fields(&p, &json!({"output": {"x": {"$sum": "$price", "window": {"documents": [0]}}}}))),
            QueryErrorCode::InvalidArgument
        );
        assert_eq!(
            code(set_window_fields(&p, &json!({"output": {"x": {"$concat": ["$name"]}}}))),
            QueryErrorCode::UnknownOperator
        );
        assert_eq!(
            code(set_window_fields(&p, &json!({"sortBy": {"missing": 1}, "output": {}}))),
            QueryErrorCode::UnknownField
        );
    }
}
