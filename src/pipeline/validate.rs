//! Argument rules for `$sort`, `$unwind`, `$replaceRoot`/`$replaceWith`,
//! `$documents` and `$geoNear`

use std::sync::Arc;

use serde_json::{Map, Value};

use crate::operators::{geo, Capability};
use crate::query::{ExprInferer, QueryError, QueryErrorCode, QueryResult};
use crate::schema::{describe, unify, ObjectNode, SchemaNode};

use super::builder::Pipeline;
use super::shape::{field_names, set_path, unwrap_array, Slot};

const META_SORTS: &[&str] = &["textScore", "searchScore"];

/// Rejects keys outside `allowed`
pub(crate) fn known_keys(stage: &str, map: &Map<String, Value>, allowed: &[&str]) -> QueryResult<()> {
    match map.keys().find(|key| !allowed.contains(&key.as_str())) {
        Some(key) => Err(QueryError::invalid_argument(
            stage,
            format!("unexpected argument '{}'", key),
        )),
        None => Ok(()),
    }
}

pub(crate) fn object_arg<'v>(stage: &str, value: &'v Value) -> QueryResult<&'v Map<String, Value>> {
    match value {
        Value::Object(map) => Ok(map),
        other => Err(QueryError::invalid_argument(
            stage,
            format!("expected an object, found {}", describe(other)),
        )),
    }
}

pub(crate) fn string_arg<'v>(stage: &str, map: &'v Map<String, Value>, key: &str) -> QueryResult<&'v str> {
    match map.get(key) {
        Some(Value::String(text)) if !text.is_empty() => Ok(text),
        Some(_) => Err(QueryError::invalid_argument(
            stage,
            format!("'{}' must be a non-empty string", key),
        )),
        None => Err(QueryError::invalid_argument(
            stage,
            format!("'{}' is required", key),
        )),
    }
}

pub(crate) fn is_non_negative_number(value: &Value) -> bool {
    value.as_f64().map_or(false, |n| n >= 0.0)
}

/// `{ <path>: 1 | -1 | { $meta: ... } }` against the current schema
pub(crate) fn sort_spec(pipeline: &Pipeline, stage: &str, spec: &Value) -> QueryResult<()> {
    let map = match spec {
        Value::Object(map) if !map.is_empty() => map,
        other => {
            return Err(QueryError::invalid_argument(
                stage,
                format!("expected a non-empty sort object, found {}", describe(other)),
            ))
        }
    };
    for (path, direction) in map {
        match direction {
            Value::Object(meta) => {
                let valid = meta.len() == 1
                    && meta
                        .get("$meta")
                        .and_then(Value::as_str)
                        .map_or(false, |kind| META_SORTS.contains(&kind));
                if !valid {
                    return Err(QueryError::invalid_argument(
                        stage,
                        format!("sort key '{}' has an invalid $meta argument", path),
                    )
                    .with_path(path.clone()));
                }
            }
            other if matches!(other.as_i64(), Some(1 | -1)) => {
                pipeline.resolve(path)?;
            }
            other => {
                return Err(QueryError::invalid_argument(
                    stage,
                    format!("sort direction for '{}' must be 1 or -1, found {}", path, describe(other)),
                )
                .with_path(path.clone()))
            }
        }
    }
    Ok(())
}

pub(crate) fn unwind(pipeline: &Pipeline, spec: &Value) -> QueryResult<Arc<SchemaNode>> {
    let (path, index, preserve) = match spec {
        Value::String(path) => (path.as_str(), None, false),
        Value::Object(map) => {
            known_keys("$unwind", map, &["path", "includeArrayIndex", "preserveNullAndEmptyArrays"])?;
            let path = string_arg("$unwind", map, "path")?;
            let index = match map.get("includeArrayIndex") {
                None => None,
                Some(_) => Some(string_arg("$unwind", map, "includeArrayIndex")?),
            };
            let preserve = match map.get("preserveNullAndEmptyArrays") {
                None => false,
                Some(Value::Bool(flag)) => *flag,
                Some(_) => {
                    return Err(QueryError::invalid_argument(
                        "$unwind",
                        "'preserveNullAndEmptyArrays' must be a boolean",
                    ))
                }
            };
            (path, index, preserve)
        }
        other => {
            return Err(QueryError::invalid_argument(
                "$unwind",
                format!("expected a field path or an options object, found {}", describe(other)),
            ))
        }
    };
    let path = match path.strip_prefix('$') {
        Some(stripped) if !stripped.starts_with('$') => stripped,
        _ => {
            return Err(QueryError::invalid_argument(
                "$unwind",
                format!("path '{}' must be a field path starting with '$'", path),
            ))
        }
    };
    let names = field_names("$unwind", path)?;

    let schema = match pipeline.resolve(path) {
        Ok(resolved) if resolved.node().as_array().is_some() => {
            let slot = Slot {
                optional: preserve,
                nullable: false,
            };
            unwrap_array(pipeline.schema(), &names, slot)
        }
        Ok(_) => (**pipeline.schema()).clone(),
        Err(err) if err.code() == QueryErrorCode::UnknownField && pipeline.config().lenient_unwind => {
            tracing::warn!(path, "unwinding an unknown path; schema passed through");
            (**pipeline.schema()).clone()
        }
        Err(err) => return Err(err),
    };

    let schema = match index {
        Some(index) => {
            let index_names = field_names("$unwind", index)?;
            let slot = Slot {
                optional: false,
                nullable: preserve,
            };
            set_path(&schema, &index_names, Arc::new(SchemaNode::long()), slot)
        }
        None => schema,
    };
    Ok(Arc::new(schema))
}

/// Output schema of `$replaceRoot` and `$replaceWith`
pub(crate) fn replace_root(
    pipeline: &Pipeline,
    stage: &str,
    expr: &Value,
    declared: Option<Arc<SchemaNode>>,
) -> QueryResult<Arc<SchemaNode>> {
    if expr.is_null() {
        return Err(QueryError::invalid_argument(stage, "a replacement document is required"));
    }
    let inferred = pipeline.inferer().infer(expr)?;
    if let Some(declared) = declared {
        return Ok(declared);
    }
    match inferred.as_ref() {
        SchemaNode::Object(_) => Ok(inferred),
        node if node.is_unknown() => Ok(Arc::new(SchemaNode::object(ObjectNode::open(
            SchemaNode::unknown(),
        )))),
        node => Err(QueryError::invalid_argument(
            stage,
            format!("replacement evaluates to {}, not a document", node),
        )),
    }
}

/// Common shape of literal documents; keys missing from some become optional
pub(crate) fn documents(pipeline: &Pipeline, docs: &Value) -> QueryResult<Arc<SchemaNode>> {
    let Value::Array(items) = docs else {
        return Err(QueryError::invalid_argument(
            "$documents",
            format!("expected an array of documents, found {}", describe(docs)),
        ));
    };
    let empty = Arc::new(SchemaNode::object(ObjectNode::new()));
    let inferer = ExprInferer::new(&empty, pipeline.config());

    let mut shape: Option<SchemaNode> = None;
    for item in items {
        let node = match item {
            Value::Object(_) => inferer.infer(item)?,
            other => {
                return Err(QueryError::invalid_argument(
                    "$documents",
                    format!("every entry must be a document, found {}", describe(other)),
                ))
            }
        };
        if node.as_object().is_none() {
            return Err(QueryError::invalid_argument(
                "$documents",
                format!("entry evaluates to {}, not a document", node),
            ));
        }
        shape = Some(match shape {
            None => (*node).clone(),
            Some(prev) => unify(&prev, &node),
        });
    }
    Ok(Arc::new(shape.unwrap_or_else(|| SchemaNode::object(ObjectNode::new()))))
}

pub(crate) fn geo_near(pipeline: &Pipeline, spec: &Value) -> QueryResult<()> {
    let map = object_arg("$geoNear", spec)?;
    known_keys(
        "$geoNear",
        map,
        &[
            "near",
            "distanceField",
            "spherical",
            "maxDistance",
            "minDistance",
            "query",
            "key",
            "includeLocs",
            "distanceMultiplier",
        ],
    )?;

    match map.get("near") {
        Some(near) if geo::is_point(near) || geo::is_coordinate_pair(near) => {}
        Some(_) => {
            return Err(QueryError::invalid_argument(
                "$geoNear",
                "'near' must be a GeoJSON point or a coordinate pair",
            ))
        }
        None => return Err(QueryError::invalid_argument("$geoNear", "'near' is required")),
    }
    field_names("$geoNear", string_arg("$geoNear", map, "distanceField")?)?;
    if map.contains_key("includeLocs") {
        field_names("$geoNear", string_arg("$geoNear", map, "includeLocs")?)?;
    }
    if map.get("spherical").map_or(false, |v| !v.is_boolean()) {
        return Err(QueryError::invalid_argument("$geoNear", "'spherical' must be a boolean"));
    }
    for key in ["maxDistance", "minDistance", "distanceMultiplier"] {
        if map.get(key).map_or(false, |v| !is_non_negative_number(v)) {
            return Err(QueryError::invalid_argument(
                "$geoNear",
                format!("'{}' must be a non-negative number", key),
            ));
        }
    }
    if let Some(query) = map.get("query") {
        pipeline.check_filter(pipeline.schema(), query)?;
    }
    if map.contains_key("key") {
        let key = string_arg("$geoNear", map, "key")?;
        let resolved = pipeline.resolve(key)?;
        if !Capability::GeoPoint.admits(resolved.node()) {
            return Err(QueryError::incompatible_operator(
                "$geoNear",
                key,
                resolved.node(),
                Capability::GeoPoint,
            ));
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::DslConfig;
    use serde_json::json;

    fn schema() -> SchemaNode {
        SchemaNode::object(
            ObjectNode::new()
                .with_field("name", SchemaNode::string())
                .with_field("tags", SchemaNode::array(SchemaNode::string()))
                .with_field(
                    "orders",
                    SchemaNode::array(SchemaNode::object(
                        ObjectNode::new().with_field("amount", SchemaNode::double()),
                    )),
                )
                .with_field("location", SchemaNode::array(SchemaNode::double()))
                .with_field(
                    "profile",
                    SchemaNode::object(ObjectNode::new().with_field("bio", SchemaNode::string())),
                ),
        )
    }

    fn pipeline() -> Pipeline {
        Pipeline::new(schema())
    }

    #[test]
    fn test_sort_spec() {
        let p = pipeline();
        assert!(sort_spec(&p, "$sort", &json!({"name": 1, "orders.amount": -1})).is_ok());
        assert!(sort_spec(&p, "$sort", &json!({"score": {"$meta": "textScore"}})).is_ok());

        let err = sort_spec(&p, "$sort", &json!({"missing": 1})).unwrap_err();
        assert_eq!(err.code(), QueryErrorCode::UnknownField);
        for bad in [json!({"name": 2}), json!({"name": "asc"}), json!({}), json!({"s": {"$meta": "x"}})] {
            let err = sort_spec(&p, "$sort", &bad).unwrap_err();
            assert_eq!(err.code(), QueryErrorCode::InvalidArgument);
        }
    }

    #[test]
    fn test_unwind_extracts_element() {
        let schema = unwind(&pipeline(), &json!("$tags")).unwrap();
        assert_eq!(**schema.field_type("tags").unwrap(), SchemaNode::string());
        assert!(!schema.is_optional("tags"));
    }

    #[test]
    fn test_unwind_options() {
        let schema = unwind(
            &pipeline(),
            &json!({"path": "$orders", "includeArrayIndex": "idx", "preserveNullAndEmptyArrays": true}),
        )
        .unwrap();
        assert!(schema.is_optional("orders"));
        assert_eq!(schema.field_type("orders").unwrap().top_level_fields(), vec!["amount"]);
        assert_eq!(**schema.field_type("idx").unwrap(), SchemaNode::long());
        assert!(schema.is_nullable("idx"));
    }

    #[test]
    fn test_unwind_non_array_is_unchanged() {
        let schema = unwind(&pipeline(), &json!("$name")).unwrap();
        assert_eq!(*schema, pipeline().schema().as_ref().clone());
    }

    #[test]
    fn test_unwind_unknown_path() {
        let err = unwind(&pipeline(), &json!("$missing")).unwrap_err();
        assert_eq!(err.code(), QueryErrorCode::UnknownField);

        let lenient = Pipeline::new(schema()).with_config(DslConfig::default().with_lenient_unwind(true));
        let schema = unwind(&lenient, &json!("$missing")).unwrap();
        assert_eq!(*schema, *lenient.schema().as_ref());

        for bad in [json!("tags"), json!("$$tags"), json!({"path": "$tags", "extra": 1}), json!(3)] {
            assert_eq!(unwind(&pipeline(), &bad).unwrap_err().code(), QueryErrorCode::InvalidArgument);
        }
    }

    #[test]
    fn test_replace_root() {
        let p = pipeline();
        let schema = replace_root(&p, "$replaceRoot", &json!("$profile"), None).unwrap();
        assert_eq!(schema.top_level_fields(), vec!["bio"]);

        let schema = replace_root(&p, "$replaceWith", &json!({"n": "$name"}), None).unwrap();
        assert_eq!(**schema.field_type("n").unwrap(), SchemaNode::string());

        let declared = Arc::new(SchemaNode::object(ObjectNode::new().with_field("x", SchemaNode::int())));
        let schema = replace_root(&p, "$replaceRoot", &json!("$profile"), Some(declared.clone())).unwrap();
        assert_eq!(schema, declared);

        let schema = replace_root(&p, "$replaceRoot", &json!({"$mergeObjects": ["$profile", "$$ROOT"]}), None);
        assert!(schema.is_ok());

        let err = replace_root(&p, "$replaceRoot", &json!("$name"), None).unwrap_err();
        assert_eq!(err.code(), QueryErrorCode::InvalidArgument);
        let err = replace_root(&p, "$replaceRoot", &json!("$nope"), None).unwrap_err();
        assert_eq!(err.code(), QueryErrorCode::UnknownField);
    }

    #[test]
    fn test_documents_common_shape() {
        let schema = documents(&pipeline(), &json!([{"a": 1, "b": "x"}, {"a": 2}])).unwrap();
        assert_eq!(schema.top_level_fields(), vec!["a", "b"]);
        assert!(!schema.is_optional("a"));
        assert!(schema.is_optional("b"));

        assert!(documents(&pipeline(), &json!([1])).is_err());
        assert!(documents(&pipeline(), &json!({"a": 1})).is_err());
        assert_eq!(documents(&pipeline(), &json!([])).unwrap().top_level_fields().len(), 0);
    }

    #[test]
    fn test_geo_near() {
        let p = pipeline();
        let ok = json!({
            "near": {"type": "Point", "coordinates": [4.9, 52.3]},
            "distanceField": "dist",
            "key": "location",
            "query": {"name": "x"},
            "maxDistance": 1000
        });
        assert!(geo_near(&p, &ok).is_ok());

        let missing = json!({"near": [1, 2]});
        assert_eq!(geo_near(&p, &missing).unwrap_err().code(), QueryErrorCode::InvalidArgument);

        let bad_key = json!({"near": [1, 2], "distanceField": "d", "key": "name"});
        assert_eq!(geo_near(&p, &bad_key).unwrap_err().code(), QueryErrorCode::IncompatibleOperator);

        let bad_near = json!({"near": "here", "distanceField": "d"});
        assert_eq!(geo_near(&p, &bad_near).unwrap_err().code(), QueryErrorCode::InvalidArgument);
    }
}
