//! Filter documents
//!
//! A `Filter` can only be constructed from a document that validates
//! against a schema:
//!
//! 1. Every field key resolves as a dot path
//! 2. Every operator is known and its capability admits the field
//! 3. Every argument has the operator's declared shape
//! 4. Literals conform to the field type (or its element type)

use std::sync::Arc;

use serde::Serialize;
use serde_json::{Map, Value};

use crate::config::DslConfig;
use crate::operators::{
    filter_operator, geo, is_type_spec, Capability, FilterArgument, ROOT_FILTER_OPERATORS,
};
use crate::path::resolve;
use crate::schema::{
    conforms, describe, extended_json_kind, is_regex_literal, Presence, ScalarKind, SchemaNode,
};

use super::errors::{QueryError, QueryResult};
use super::expr::ExprInferer;

const REGEX_FLAGS: &str = "imxsu";

/// True for `{ "$op": ..., ... }` where every key is an operator
pub(crate) fn is_operator_object(map: &Map<String, Value>) -> bool {
    !map.is_empty()
        && extended_json_kind(map).is_none()
        && map.keys().all(|key| key.starts_with('$'))
}

fn require(ok: bool, operator: &str, reason: &str) -> QueryResult<()> {
    if ok {
        Ok(())
    } else {
        Err(QueryError::invalid_argument(operator, reason))
    }
}

fn is_non_negative_integer(value: &Value) -> bool {
    value.as_u64().is_some()
}

fn is_bit_mask(value: &Value) -> bool {
    match value {
        Value::Array(positions) => positions.iter().all(is_non_negative_integer),
        Value::Object(map) => extended_json_kind(map) == Some(ScalarKind::BinData),
        other => is_non_negative_integer(other),
    }
}

fn admits_pattern(node: &SchemaNode) -> bool {
    Capability::StringLike.admits(node)
        || node
            .as_array()
            .map_or(false, |element| Capability::StringLike.admits(element))
}

/// A field being constrained
struct Target {
    path: String,
    node: Arc<SchemaNode>,
    /// Missing or null values are acceptable literals
    absent_ok: bool,
}

/// Validates filter documents against a schema
pub(crate) struct FilterChecker<'c> {
    config: &'c DslConfig,
    scope: Vec<(String, Arc<SchemaNode>)>,
}

impl<'c> FilterChecker<'c> {
    pub(crate) fn new(config: &'c DslConfig) -> Self {
        Self {
            config,
            scope: Vec::new(),
        }
    }

    /// Variables visible to `$expr`
    pub(crate) fn with_scope(mut self, scope: Vec<(String, Arc<SchemaNode>)>) -> Self {
        self.scope = scope;
        self
    }

    fn inferer<'r>(&self, root: &'r Arc<SchemaNode>) -> ExprInferer<'r> {
        self.scope
            .iter()
            .fold(ExprInferer::new(root, self.config), |inferer, (name, node)| {
                inferer.with_variable(name.clone(), node.clone())
            })
    }

    pub(crate) fn check_document(&self, root: &Arc<SchemaNode>, document: &Value) -> QueryResult<()> {
        let map = match document {
            Value::Object(map) if extended_json_kind(map).is_none() => map,
            other => {
                return Err(QueryError::invalid_argument(
                    "filter",
                    format!("expected a filter object, found {}", describe(other)),
                ))
            }
        };

        for (key, condition) in map {
            if key.starts_with('$') {
                self.check_root_operator(root, key, condition)?;
                continue;
            }
            let resolved = resolve(root, key, self.config.resolve_options())?;
            let target = Target {
                path: key.clone(),
                node: resolved.node().clone(),
                absent_ok: resolved.is_optional() || resolved.is_nullable(),
            };
            self.check_condition(root, &target, condition)?;
        }
        Ok(())
    }

    fn check_root_operator(&self, root: &Arc<SchemaNode>, operator: &str, argument: &Value) -> QueryResult<()> {
        if !ROOT_FILTER_OPERATORS.contains(&operator) {
            return Err(QueryError::unknown_operator(operator, "filter root"));
        }
        match operator {
            "$and" | "$or" | "$nor" => match argument {
                Value::Array(clauses) if !clauses.is_empty() => clauses
                    .iter()
                    .try_for_each(|clause| self.check_document(root, clause)),
                _ => Err(QueryError::invalid_argument(
                    operator,
                    "expected a non-empty array of filters",
                )),
            },
            "$text" => check_text(argument),
            "$where" => require(argument.is_string(), operator, "expected a JavaScript string"),
            "$comment" => require(
                argument.is_string() || argument.is_object(),
                operator,
                "expected a string or object",
            ),
            "$expr" => self.inferer(root).infer(argument).map(drop),
            _ => require(argument.is_object(), operator, "expected a schema object"),
        }
    }

    fn check_condition(&self, root: &Arc<SchemaNode>, target: &Target, condition: &Value) -> QueryResult<()> {
        match condition {
            Value::Object(map) if is_operator_object(map) => self.check_operators(root, target, map),
            Value::Object(map)
                if extended_json_kind(map).is_none() && map.keys().any(|k| k.starts_with('$')) =>
            {
                Err(QueryError::invalid_argument(
                    "filter",
                    format!("condition on '{}' mixes operators and field names", target.path),
                )
                .with_path(&target.path))
            }
            literal => self.check_literal(target, literal, true),
        }
    }

    fn check_literal(&self, target: &Target, value: &Value, allow_pattern: bool) -> QueryResult<()> {
        let node = &target.node;
        let accepted = conforms(node, value, target.absent_ok, Presence::Full)
            || node
                .as_array()
                .map_or(false, |element| conforms(element, value, false, Presence::Full))
            || (allow_pattern && is_regex_literal(value) && admits_pattern(node));
        if accepted {
            Ok(())
        } else {
            Err(QueryError::type_mismatch(&target.path, node, value))
        }
    }

    fn check_operators(&self, root: &Arc<SchemaNode>, target: &Target, map: &Map<String, Value>) -> QueryResult<()> {
        if map.contains_key("$options") && !map.contains_key("$regex") {
            return Err(QueryError::invalid_argument("$options", "requires a sibling $regex")
                .with_path(&target.path));
        }
        for (operator, argument) in map {
            self.check_operator(root, target, operator, argument)
                .map_err(|err| err.with_path(&target.path))?;
        }
        Ok(())
    }

    fn check_operator(
        &self,
        root: &Arc<SchemaNode>,
        target: &Target,
        operator: &str,
        argument: &Value,
    ) -> QueryResult<()> {
        let entry = filter_operator(operator)
            .ok_or_else(|| QueryError::unknown_operator(operator, "filter condition"))?;
        if !entry.capability.admits(&target.node) {
            return Err(QueryError::incompatible_operator(
                operator,
                &target.path,
                &target.node,
                entry.capability,
            ));
        }

        match entry.argument {
            FilterArgument::FieldValue => self.check_literal(target, argument, false),
            FilterArgument::FieldValueOrPattern => self.check_literal(target, argument, true),
            FilterArgument::FieldValues => match argument {
                Value::Array(items) => items
                    .iter()
                    .try_for_each(|item| self.check_literal(target, item, true)),
                _ => Err(QueryError::invalid_argument(operator, "expected an array of values")),
            },
            FilterArgument::Bool => require(
                argument.is_boolean() || argument.is_number(),
                operator,
                "expected a boolean",
            ),
            FilterArgument::TypeSpec => require(
                is_type_spec(argument),
                operator,
                "expected a BSON type alias, code, or array of those",
            ),
            FilterArgument::Count => require(
                is_non_negative_integer(argument),
                operator,
                "expected a non-negative integer",
            ),
            FilterArgument::ElementValues => self.check_all(root, target, argument),
            FilterArgument::ElementFilter => self.check_elem_match(root, target, argument),
            FilterArgument::Pattern => require(
                argument.is_string() || is_regex_literal(argument),
                operator,
                "expected a pattern string or regular expression",
            ),
            FilterArgument::RegexOptions => require(
                argument
                    .as_str()
                    .map_or(false, |flags| flags.chars().all(|c| REGEX_FLAGS.contains(c))),
                operator,
                "expected flags drawn from 'imxsu'",
            ),
            FilterArgument::ModPair => {
                let valid = match argument.as_array().map(Vec::as_slice) {
                    Some([divisor, remainder]) => {
                        divisor.is_number()
                            && remainder.is_number()
                            && divisor.as_f64().map_or(false, |d| d != 0.0)
                    }
                    _ => false,
                };
                require(valid, operator, "expected [divisor, remainder] with a non-zero divisor")
            }
            FilterArgument::BitMask => require(
                is_bit_mask(argument),
                operator,
                "expected a bit mask, an array of bit positions, or binData",
            ),
            FilterArgument::GeoWithin => check_geo_within(argument),
            FilterArgument::Geometry => {
                let valid = match argument {
                    Value::Object(map) => {
                        map.len() == 1 && map.get("$geometry").map_or(false, geo::is_geometry)
                    }
                    _ => false,
                };
                require(valid, operator, "expected {$geometry: <GeoJSON>}")
            }
            FilterArgument::Near => check_near(operator, argument),
            FilterArgument::Distance => require(
                argument.as_f64().map_or(false, |d| d >= 0.0),
                operator,
                "expected a non-negative distance",
            ),
            FilterArgument::Expression => self.inferer(root).infer(argument).map(drop),
            FilterArgument::JsonSchema => require(argument.is_object(), operator, "expected a schema object"),
            FilterArgument::EmptyObject => require(
                argument.as_object().map_or(false, Map::is_empty),
                operator,
                "expected {}",
            ),
            FilterArgument::Negation => self.check_not(root, target, argument),
        }
    }

    fn check_all(&self, root: &Arc<SchemaNode>, target: &Target, argument: &Value) -> QueryResult<()> {
        let Value::Array(items) = argument else {
            return Err(QueryError::invalid_argument("$all", "expected an array of values"));
        };
        let element = target
            .node
            .as_array()
            .cloned()
            .unwrap_or_else(|| Arc::new(SchemaNode::unknown()));
        for item in items {
            match item {
                Value::Object(map) if map.len() == 1 && map.contains_key("$elemMatch") => {
                    self.check_elem_match(root, target, &map["$elemMatch"])?;
                }
                value => {
                    let accepted = conforms(&element, value, false, Presence::Full)
                        || (is_regex_literal(value) && Capability::StringLike.admits(&element));
                    if !accepted {
                        return Err(QueryError::type_mismatch(&target.path, &element, value));
                    }
                }
            }
        }
        Ok(())
    }

    fn check_elem_match(&self, root: &Arc<SchemaNode>, target: &Target, argument: &Value) -> QueryResult<()> {
        let element = target
            .node
            .as_array()
            .cloned()
            .unwrap_or_else(|| Arc::new(SchemaNode::unknown()));
        let Value::Object(map) = argument else {
            return Err(QueryError::invalid_argument("$elemMatch", "expected a filter object"));
        };
        if element.as_object().is_some() || element.is_unknown() {
            return self.check_document(&element, argument);
        }
        if is_operator_object(map) {
            let element_target = Target {
                path: target.path.clone(),
                node: element,
                absent_ok: false,
            };
            return self.check_operators(root, &element_target, map);
        }
        Err(QueryError::invalid_argument(
            "$elemMatch",
            "scalar elements take an operator object",
        ))
    }

    fn check_not(&self, root: &Arc<SchemaNode>, target: &Target, argument: &Value) -> QueryResult<()> {
        match argument {
            value if is_regex_literal(value) => {
                if admits_pattern(&target.node) {
                    Ok(())
                } else {
                    Err(QueryError::incompatible_operator(
                        "$not",
                        &target.path,
                        &target.node,
                        Capability::StringLike,
                    ))
                }
            }
            Value::Object(map) if is_operator_object(map) => self.check_operators(root, target, map),
            other => self.check_literal(target, other, false),
        }
    }
}

fn check_text(argument: &Value) -> QueryResult<()> {
    let Value::Object(map) = argument else {
        return Err(QueryError::invalid_argument("$text", "expected an object"));
    };
    require(
        map.get("$search").map_or(false, Value::is_string),
        "$text",
        "'$search' must be a string",
    )?;
    for (key, value) in map {
        let valid = match key.as_str() {
            "$search" | "$language" => value.is_string(),
            "$caseSensitive" | "$diacriticSensitive" => value.is_boolean(),
            _ => {
                return Err(QueryError::invalid_argument(
                    "$text",
                    format!("unexpected argument '{}'", key),
                ))
            }
        };
        require(valid, "$text", &format!("invalid value for '{}'", key))?;
    }
    Ok(())
}

fn check_geo_within(argument: &Value) -> QueryResult<()> {
    let valid = match argument {
        Value::Object(map) if map.len() == 1 => match map.iter().next() {
            Some((key, shape)) if key == "$geometry" => geo::is_polygon(shape),
            Some((key, shape)) => geo::is_legacy_shape(key, shape),
            None => false,
        },
        _ => false,
    };
    require(
        valid,
        "$geoWithin",
        "expected a $geometry polygon or one of $box, $polygon, $center, $centerSphere",
    )
}

fn check_near(operator: &str, argument: &Value) -> QueryResult<()> {
    if geo::is_coordinate_pair(argument) {
        return Ok(());
    }
    let Value::Object(map) = argument else {
        return Err(QueryError::invalid_argument(operator, "expected a point"));
    };
    require(
        map.get("$geometry").map_or(false, geo::is_point),
        operator,
        "'$geometry' must be a GeoJSON point",
    )?;
    for (key, value) in map {
        match key.as_str() {
            "$geometry" => {}
            "$maxDistance" | "$minDistance" => require(
                value.as_f64().map_or(false, |d| d >= 0.0),
                operator,
                "distances must be non-negative numbers",
            )?,
            _ => {
                return Err(QueryError::invalid_argument(
                    operator,
                    format!("unexpected argument '{}'", key),
                ))
            }
        }
    }
    Ok(())
}

/// A filter document validated against a schema
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(transparent)]
pub struct Filter {
    document: Value,
}

impl Filter {
    /// Validates `document` against `schema` with the default configuration.
    pub fn new(schema: &Arc<SchemaNode>, document: Value) -> QueryResult<Self> {
        Self::with_config(schema, document, &DslConfig::default())
    }

    pub fn with_config(schema: &Arc<SchemaNode>, document: Value, config: &DslConfig) -> QueryResult<Self> {
        FilterChecker::new(config).check_document(schema, &document)?;
        Ok(Self { document })
    }

    pub fn document(&self) -> &Value {
        &self.document
    }

    pub fn into_document(self) -> Value {
        self.document
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::query::QueryErrorCode;
    use crate::schema::ObjectNode;
    use serde_json::json;

    fn places() -> Arc<SchemaNode> {
        let point = ObjectNode::new()
            .with_field("type", SchemaNode::string())
            .with_field("coordinates", SchemaNode::array(SchemaNode::number()));
        let review = ObjectNode::new()
            .with_field("score", SchemaNode::int())
            .with_field("author", SchemaNode::string());
        Arc::new(SchemaNode::object(
            ObjectNode::new()
                .with_field("name", SchemaNode::string())
                .with_field("flags", SchemaNode::int())
                .with_field("rating", SchemaNode::double())
                .with_optional_field("closed", SchemaNode::bool())
                .with_field("tags", SchemaNode::array(SchemaNode::string()))
                .with_field("location", SchemaNode::object(point))
                .with_field("legacy", SchemaNode::array(SchemaNode::double()))
                .with_field("reviews", SchemaNode::array(SchemaNode::object(review))),
        ))
    }

    fn check(document: Value) -> QueryResult<Filter> {
        Filter::new(&places(), document)
    }

    fn code(document: Value) -> QueryErrorCode {
        check(document).unwrap_err().code()
    }

    #[test]
    fn test_literal_conditions() {
        assert!(check(json!({"name": "Cafe", "rating": 4.5})).is_ok());
        assert!(check(json!({"tags": "vegan"})).is_ok());
        assert!(check(json!({"name": {"$regularExpression": {"pattern": "^C", "options": ""}}})).is_ok());
        assert!(check(json!({"closed": null})).is_ok());
        assert_eq!(code(json!({"rating": "high"})), QueryErrorCode::TypeMismatch);
        assert_eq!(code(json!({"nope": 1})), QueryErrorCode::UnknownField);
    }

    #[test]
    fn test_operator_gating() {
        assert!(check(json!({"flags": {"$bitsAllSet": [0, 3]}})).is_ok());
        assert_eq!(code(json!({"name": {"$bitsAllSet": 4}})), QueryErrorCode::IncompatibleOperator);
        assert_eq!(code(json!({"rating": {"$bitsAnySet": 4}})), QueryErrorCode::IncompatibleOperator);
        assert!(check(json!({"name": {"$regex": "^C", "$options": "i"}})).is_ok());
        assert_eq!(code(json!({"flags": {"$regex": "1"}})), QueryErrorCode::IncompatibleOperator);
        assert!(check(json!({"rating": {"$mod": [2, 0]}})).is_ok());
        assert_eq!(code(json!({"name": {"$mod": [2, 0]}})), QueryErrorCode::IncompatibleOperator);
        assert_eq!(code(json!({"name": {"$size": 2}})), QueryErrorCode::IncompatibleOperator);
    }

    #[test]
    fn test_geo_gating() {
        assert!(check(json!({"legacy": {"$near": [1.0, 2.0], "$maxDistance": 10}})).is_ok());
        assert!(check(json!({"location": {"$nearSphere": {"$geometry": {"type": "Point", "coordinates": [1, 2]}}}})).is_ok());
        assert_eq!(code(json!({"name": {"$near": [1, 2]}})), QueryErrorCode::IncompatibleOperator);
        assert_eq!(code(json!({"legacy": {"$nearSphere": [1, 2]}})), QueryErrorCode::IncompatibleOperator);
        assert!(check(json!({"location": {"$geoWithin": {"$box": [[0, 0], [5, 5]]}}})).is_ok());
        assert_eq!(code(json!({"location": {"$geoWithin": {"$box": [[0, 0]]}}})), QueryErrorCode::InvalidArgument);
    }

    #[test]
    fn test_argument_shapes() {
        assert_eq!(code(json!({"tags": {"$size": -1}})), QueryErrorCode::InvalidArgument);
        assert_eq!(code(json!({"rating": {"$mod": [0, 1]}})), QueryErrorCode::InvalidArgument);
        assert_eq!(code(json!({"name": {"$options": "i"}})), QueryErrorCode::InvalidArgument);
        assert_eq!(code(json!({"name": {"$regex": "a", "$options": "q"}})), QueryErrorCode::InvalidArgument);
        assert_eq!(code(json!({"name": {"$type": "text"}})), QueryErrorCode::InvalidArgument);
        assert_eq!(code(json!({"name": {"$in": "Cafe"}})), QueryErrorCode::InvalidArgument);
        assert_eq!(code(json!({"name": {"$in": ["Cafe", 3]}})), QueryErrorCode::TypeMismatch);
        assert_eq!(code(json!({"name": {"$gt": 1, "x": 2}})), QueryErrorCode::InvalidArgument);
        assert_eq!(code(json!({"name": {"$frob": 1}})), QueryErrorCode::UnknownOperator);
    }

    #[test]
    fn test_elem_match_and_all() {
        assert!(check(json!({"reviews": {"$elemMatch": {"score": {"$gte": 4}, "author": "ann"}}})).is_ok());
        assert_eq!(
            code(json!({"reviews": {"$elemMatch": {"stars": 5}}})),
            QueryErrorCode::UnknownField
        );
        assert!(check(json!({"tags": {"$elemMatch": {"$in": ["a", "b"]}}})).is_ok());
        assert!(check(json!({"tags": {"$all": ["a", "b"]}})).is_ok());
        assert_eq!(code(json!({"tags": {"$all": [1]}})), QueryErrorCode::TypeMismatch);
    }

    #[test]
    fn test_not() {
        assert!(check(json!({"rating": {"$not": {"$gt": 3}}})).is_ok());
        assert!(check(json!({"name": {"$not": {"$regularExpression": {"pattern": "x", "options": ""}}}})).is_ok());
        assert_eq!(
            code(json!({"rating": {"$not": {"$regularExpression": {"pattern": "x", "options": ""}}}})),
            QueryErrorCode::IncompatibleOperator
        );
    }

    #[test]
    fn test_root_operators() {
        assert!(check(json!({"$or": [{"name": "a"}, {"rating": {"$gt": 2}}]})).is_ok());
        assert_eq!(code(json!({"$or": []})), QueryErrorCode::InvalidArgument);
        assert_eq!(code(json!({"$and": [{"nope": 1}]})), QueryErrorCode::UnknownField);
        assert!(check(json!({"$text": {"$search": "coffee", "$caseSensitive": false}})).is_ok());
        assert_eq!(code(json!({"$text": {"$language": "en"}})), QueryErrorCode::InvalidArgument);
        assert!(check(json!({"$expr": {"$gt": ["$rating", "$flags"]}})).is_ok());
        assert_eq!(code(json!({"$expr": {"$gt": ["$nope", 1]}})), QueryErrorCode::UnknownField);
        assert_eq!(code(json!({"$gt": 1})), QueryErrorCode::UnknownOperator);
        assert!(check(json!({"$comment": "audit", "name": "a"})).is_ok());
    }

    #[test]
    fn test_serializes_document() {
        let filter = check(json!({"name": "a"})).unwrap();
        assert_eq!(serde_json::to_value(&filter).unwrap(), json!({"name": "a"}));
    }
}
