//! Update documents
//!
//! Every `{ "$op": { "<path>": <payload> } }` entry is checked:
//!
//! 1. The operator is known
//! 2. The path resolves (placeholders only where the operator allows them)
//! 3. The target's capability admits the operator
//! 4. The payload has the operator's shape and conforms to the target
//!
//! Finally no two targets may overlap.

use std::sync::Arc;

use serde::Serialize;
use serde_json::{Map, Value};

use crate::config::DslConfig;
use crate::operators::{update_operator, UpdateOperator, UpdatePayload};
use crate::path::{resolve, resolve_path, FieldPath, ResolvedPath};
use crate::schema::{
    conforms, describe, extended_json_kind, ObjectNode, Presence, ScalarKind, SchemaNode,
};

use super::errors::{QueryError, QueryResult};
use super::filter::{is_operator_object, FilterChecker};

const PUSH_MODIFIERS: &[&str] = &["$each", "$position", "$slice", "$sort"];

fn is_numeric_literal(value: &Value) -> bool {
    match value {
        Value::Number(_) => true,
        Value::Object(map) => extended_json_kind(map).map_or(false, |kind| kind.is_numeric()),
        _ => false,
    }
}

fn is_sort_direction(value: &Value) -> bool {
    matches!(value.as_i64(), Some(1 | -1))
}

struct UpdateChecker<'c> {
    config: &'c DslConfig,
    root: &'c Arc<SchemaNode>,
}

impl<'c> UpdateChecker<'c> {
    fn check(&self, document: &Value) -> QueryResult<()> {
        let operators = match document {
            Value::Object(map) if !map.is_empty() => map,
            other => {
                return Err(QueryError::invalid_argument(
                    "update",
                    format!("expected a non-empty object of update operators, found {}", describe(other)),
                ))
            }
        };

        let mut targets: Vec<FieldPath> = Vec::new();
        for (name, fields) in operators {
            let entry = update_operator(name).ok_or_else(|| QueryError::unknown_operator(name, "update"))?;
            let Value::Object(fields) = fields else {
                return Err(QueryError::invalid_argument(
                    name,
                    "expected an object mapping paths to values",
                ));
            };
            for (path, payload) in fields {
                let path = FieldPath::parse(path)?;
                let text = path.to_string();
                self.check_target(entry, &path, payload, &mut targets)
                    .map_err(|err| err.with_path(text))?;
            }
        }
        check_conflicts(&targets)
    }

    fn check_target(
        &self,
        entry: &UpdateOperator,
        path: &FieldPath,
        payload: &Value,
        targets: &mut Vec<FieldPath>,
    ) -> QueryResult<()> {
        let name = entry.name;
        if path.head() == Some("_id") && entry.payload != UpdatePayload::InsertValue {
            return Err(QueryError::invalid_argument(name, "the '_id' field is immutable"));
        }

        let options = self
            .config
            .resolve_options()
            .with_placeholders(entry.allow_placeholders);
        let resolved = resolve_path(self.root, path, options)?;
        let node = resolved.node();

        if !entry.capability.admits(node) {
            return Err(QueryError::incompatible_operator(
                name,
                path.to_string(),
                node,
                entry.capability,
            ));
        }
        if entry.removes_field && !resolved.is_optional() && !self.config.allow_unset_required {
            return Err(QueryError::required_field(name, path.to_string()));
        }

        targets.push(path.clone());
        self.check_payload(entry, &resolved, payload, targets)
    }

    fn check_payload(
        &self,
        entry: &UpdateOperator,
        resolved: &ResolvedPath,
        payload: &Value,
        targets: &mut Vec<FieldPath>,
    ) -> QueryResult<()> {
        let name = entry.name;
        let node = resolved.node();
        let path = resolved.path().to_string();
        let element = node.as_array().cloned().unwrap_or_else(|| Arc::new(SchemaNode::unknown()));

        match entry.payload {
            UpdatePayload::Value => {
                // Identifiable objects, alone or in arrays, need only their `_id`.
                expect_conforms(&path, node, payload, resolved.is_nullable(), Presence::for_node(node))
            }
            UpdatePayload::InsertValue => {
                expect_conforms(&path, node, payload, resolved.is_nullable(), Presence::Full)
            }
            UpdatePayload::Number => {
                if is_numeric_literal(payload) {
                    Ok(())
                } else {
                    Err(QueryError::type_mismatch(path, node, payload))
                }
            }
            UpdatePayload::Bitwise => check_bitwise(payload),
            UpdatePayload::CurrentDate => check_current_date(&path, node, payload),
            UpdatePayload::UnsetMarker => {
                let valid = payload.is_boolean()
                    || payload.as_str() == Some("")
                    || payload.as_i64() == Some(1);
                if valid {
                    Ok(())
                } else {
                    Err(QueryError::invalid_argument(name, "expected \"\", 1 or a boolean"))
                }
            }
            UpdatePayload::RenameTarget => {
                let destination = self.check_rename(resolved, payload)?;
                targets.push(destination);
                Ok(())
            }
            UpdatePayload::Push => self.check_array_insert(name, &path, &element, payload, PUSH_MODIFIERS),
            UpdatePayload::AddToSet => self.check_array_insert(name, &path, &element, payload, &["$each"]),
            UpdatePayload::Pull => self.check_pull(&path, &element, payload),
            UpdatePayload::PullAll => match payload {
                Value::Array(items) => items
                    .iter()
                    .try_for_each(|item| expect_conforms(&path, &element, item, false, Presence::Full)),
                _ => Err(QueryError::invalid_argument(name, "expected an array of values")),
            },
            UpdatePayload::Pop => {
                if is_sort_direction(payload) {
                    Ok(())
                } else {
                    Err(QueryError::invalid_argument(name, "expected 1 or -1"))
                }
            }
        }
    }

    fn check_rename(&self, source: &ResolvedPath, payload: &Value) -> QueryResult<FieldPath> {
        let Value::String(text) = payload else {
            return Err(QueryError::invalid_argument("$rename", "expected a destination path string"));
        };
        if source.traversed_array() {
            return Err(QueryError::invalid_argument(
                "$rename",
                "source paths may not pass through arrays",
            ));
        }
        let destination = FieldPath::parse(text)?;
        if destination == *source.path()
            || destination.is_prefix_of(source.path())
            || source.path().is_prefix_of(&destination)
        {
            return Err(QueryError::conflicting_paths(&source.path().to_string(), text));
        }

        let target = resolve_path(self.root, &destination, self.config.resolve_options())?;
        if target.node() != source.node() {
            return Err(QueryError::invalid_argument(
                "$rename",
                format!(
                    "destination '{}' is {}, but the source is {}",
                    text,
                    target.node(),
                    source.node()
                ),
            ));
        }
        if target.traversed_array() {
            return Err(QueryError::invalid_argument(
                "$rename",
                "destination paths may not pass through arrays",
            ));
        }
        Ok(destination)
    }

    fn check_array_insert(
        &self,
        name: &str,
        path: &str,
        element: &Arc<SchemaNode>,
        payload: &Value,
        modifiers: &[&str],
    ) -> QueryResult<()> {
        let presence = Presence::for_node(element);
        let map = match payload {
            Value::Object(map) if map.keys().any(|key| key.starts_with('$')) && extended_json_kind(map).is_none() => map,
            value => return expect_conforms(path, element, value, false, presence),
        };

        if let Some(key) = map.keys().find(|key| !modifiers.contains(&key.as_str())) {
            return Err(QueryError::invalid_argument(
                name,
                format!("unexpected modifier '{}'", key),
            ));
        }
        let Some(Value::Array(items)) = map.get("$each") else {
            return Err(QueryError::invalid_argument(name, "'$each' must be an array"));
        };
        for item in items {
            expect_conforms(path, element, item, false, presence)?;
        }
        for key in ["$position", "$slice"] {
            if let Some(value) = map.get(key) {
                if value.as_i64().is_none() {
                    return Err(QueryError::invalid_argument(
                        name,
                        format!("'{}' must be an integer", key),
                    ));
                }
            }
        }
        if let Some(sort) = map.get("$sort") {
            self.check_push_sort(element, sort)?;
        }
        Ok(())
    }

    fn check_push_sort(&self, element: &Arc<SchemaNode>, sort: &Value) -> QueryResult<()> {
        match sort {
            value if is_sort_direction(value) => Ok(()),
            Value::Object(spec) if !spec.is_empty() && element.as_object().is_some() => {
                let options = self.config.resolve_options();
                for (key, direction) in spec {
                    resolve(element, key, options)?;
                    if !is_sort_direction(direction) {
                        return Err(QueryError::invalid_argument("$sort", "directions must be 1 or -1"));
                    }
                }
                Ok(())
            }
            _ => Err(QueryError::invalid_argument(
                "$sort",
                "expected 1, -1, or a sort document over object elements",
            )),
        }
    }

    fn check_pull(&self, path: &str, element: &Arc<SchemaNode>, payload: &Value) -> QueryResult<()> {
        let checker = FilterChecker::new(self.config);
        match payload {
            Value::Object(map) if is_operator_object(map) => {
                // Conditions on scalar elements, e.g. `{$gte: 6}`.
                let wrapped: Map<String, Value> =
                    std::iter::once((String::from("value"), payload.clone())).collect();
                let scalar_root = Arc::new(SchemaNode::object(
                    ObjectNode::new().with_field("value", element.clone()),
                ));
                checker
                    .check_document(&scalar_root, &Value::Object(wrapped))
                    .map_err(|err| err.with_path(path))
            }
            Value::Object(map) if extended_json_kind(map).is_none() && element.as_object().is_some() => {
                checker.check_document(element, payload)
            }
            value => expect_conforms(path, element, value, false, Presence::Full),
        }
    }
}

fn expect_conforms(
    path: &str,
    node: &SchemaNode,
    value: &Value,
    nullable: bool,
    presence: Presence,
) -> QueryResult<()> {
    if conforms(node, value, nullable, presence) {
        Ok(())
    } else {
        Err(QueryError::type_mismatch(path, node, value))
    }
}

fn check_bitwise(payload: &Value) -> QueryResult<()> {
    let valid = match payload {
        Value::Object(map) if !map.is_empty() => map.iter().all(|(key, value)| {
            matches!(key.as_str(), "and" | "or" | "xor") && value.as_i64().is_some()
        }),
        _ => false,
    };
    if valid {
        Ok(())
    } else {
        Err(QueryError::invalid_argument("$bit", "expected {and|or|xor: <integer>}"))
    }
}

fn check_current_date(path: &str, node: &SchemaNode, payload: &Value) -> QueryResult<()> {
    let requested = match payload {
        Value::Bool(true) => Some(ScalarKind::Date),
        Value::Object(map) if map.len() == 1 => match map.get("$type").and_then(Value::as_str) {
            Some("date") => Some(ScalarKind::Date),
            Some("timestamp") => Some(ScalarKind::Timestamp),
            _ => None,
        },
        _ => None,
    };
    match requested {
        None => Err(QueryError::invalid_argument(
            "$currentDate",
            "expected true or {$type: \"date\"|\"timestamp\"}",
        )),
        Some(kind) if node.scalar_kind() == Some(kind) => Ok(()),
        Some(_) => Err(QueryError::type_mismatch(path, node, payload)),
    }
}

/// Rejects equal or prefix-related update targets.
fn check_conflicts(targets: &[FieldPath]) -> QueryResult<()> {
    for (i, first) in targets.iter().enumerate() {
        for second in &targets[i + 1..] {
            if first == second || first.is_prefix_of(second) || second.is_prefix_of(first) {
                return Err(QueryError::conflicting_paths(
                    &first.to_string(),
                    &second.to_string(),
                ));
            }
        }
    }
    Ok(())
}

/// An update document validated against a schema
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(transparent)]
pub struct Update {
    document: Value,
}

impl Update {
    /// Validates `document` against `schema` with the default configuration.
    pub fn new(schema: &Arc<SchemaNode>, document: Value) -> QueryResult<Self> {
        Self::with_config(schema, document, &DslConfig::default())
    }

    pub fn with_config(schema: &Arc<SchemaNode>, document: Value, config: &DslConfig) -> QueryResult<Self> {
        UpdateChecker { config, root: schema }.check(&document)?;
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
    use serde_json::json;

    fn accounts() -> Arc<SchemaNode> {
        let role = ObjectNode::new()
            .with_field("_id", SchemaNode::object_id())
            .with_field("title", SchemaNode::string())
            .with_field("level", SchemaNode::int());
        Arc::new(SchemaNode::object(
            ObjectNode::new()
                .with_field("_id", SchemaNode::object_id())
                .with_field("name", SchemaNode::string())
                .with_optional_field("nickname", SchemaNode::string())
                .with_optional_field("alias", SchemaNode::string())
                .with_field("balance", SchemaNode::double())
                .with_field("flags", SchemaNode::int())
                .with_field("updated", SchemaNode::date())
                .with_field("scores", SchemaNode::array(SchemaNode::int()))
                .with_field("tags", SchemaNode::array(SchemaNode::string()))
                .with_field("roles", SchemaNode::array(SchemaNode::object(role.clone())))
                .with_field("main", SchemaNode::object(role)),
        ))
    }

    fn check(document: Value) -> QueryResult<Update> {
        Update::new(&accounts(), document)
    }

    fn code(document: Value) -> QueryErrorCode {
        check(document).unwrap_err().code()
    }

    #[test]
    fn test_set_and_numeric_operators() {
        assert!(check(json!({"$set": {"name": "x"}, "$inc": {"balance": 5}})).is_ok());
        assert_eq!(code(json!({"$set": {"name": 3}})), QueryErrorCode::TypeMismatch);
        assert_eq!(code(json!({"$inc": {"name": 1}})), QueryErrorCode::IncompatibleOperator);
        assert_eq!(code(json!({"$inc": {"balance": "1"}})), QueryErrorCode::TypeMismatch);
        assert!(check(json!({"$max": {"balance": 10}, "$mul": {"flags": 2}})).is_ok());
    }

    #[test]
    fn test_placeholders_and_partial_elements() {
        assert!(check(json!({"$set": {"roles.$.title": "admin"}})).is_ok());
        assert!(check(json!({"$set": {"roles.$[r].level": 2}})).is_ok());
        assert!(check(json!({"$set": {"roles.0": {"_id": {"$oid": "5f1d7f3e9b1e8a3c4d2b1a00"}}}})).is_ok());
        assert_eq!(code(json!({"$set": {"roles.0": {"title": "x"}}})), QueryErrorCode::TypeMismatch);
        assert!(check(json!({"$set": {"roles": [{"_id": {"$oid": "5f1d7f3e9b1e8a3c4d2b1a00"}}]}})).is_ok());
        assert!(check(json!({"$set": {"main": {"_id": {"$oid": "5f1d7f3e9b1e8a3c4d2b1a01"}}}})).is_ok());
        assert_eq!(code(json!({"$set": {"roles": [{"level": 1}]}})), QueryErrorCode::TypeMismatch);
        assert_eq!(code(json!({"$setOnInsert": {"main": {"_id": {"$oid": "5f1d7f3e9b1e8a3c4d2b1a01"}}}})), QueryErrorCode::TypeMismatch);
        assert_eq!(code(json!({"$push": {"tags.$": "x"}})), QueryErrorCode::PlaceholderNotAllowed);
        assert_eq!(code(json!({"$setOnInsert": {"roles.$.title": "x"}})), QueryErrorCode::PlaceholderNotAllowed);
    }

    #[test]
    fn test_array_operators() {
        assert!(check(json!({"$push": {"tags": "new"}})).is_ok());
        assert!(check(json!({"$push": {"scores": {"$each": [1, 2], "$slice": -5, "$sort": -1}}})).is_ok());
        assert!(check(json!({"$push": {"roles": {"$each": [], "$sort": {"level": 1}}}})).is_ok());
        assert_eq!(code(json!({"$push": {"roles": {"$each": [], "$sort": {"rank": 1}}}})), QueryErrorCode::UnknownField);
        assert_eq!(code(json!({"$addToSet": {"tags": {"$each": ["a"], "$slice": 1}}})), QueryErrorCode::InvalidArgument);
        assert_eq!(code(json!({"$pop": {"name": 1}})), QueryErrorCode::IncompatibleOperator);
        assert_eq!(code(json!({"$pop": {"tags": 2}})), QueryErrorCode::InvalidArgument);
        assert!(check(json!({"$pull": {"scores": {"$gte": 6}}})).is_ok());
        assert!(check(json!({"$pull": {"roles": {"level": {"$lt": 2}}}})).is_ok());
        assert_eq!(code(json!({"$pull": {"roles": {"rank": 1}}})), QueryErrorCode::UnknownField);
        assert!(check(json!({"$pullAll": {"tags": ["a", "b"]}})).is_ok());
    }

    #[test]
    fn test_unset_and_rename() {
        assert!(check(json!({"$unset": {"nickname": ""}})).is_ok());
        assert_eq!(code(json!({"$unset": {"name": ""}})), QueryErrorCode::IncompatibleOperator);
        let lenient = DslConfig::default().with_allow_unset_required(true);
        assert!(Update::with_config(&accounts(), json!({"$unset": {"name": 1}}), &lenient).is_ok());
        assert!(check(json!({"$rename": {"nickname": "alias"}})).is_ok());
        assert_eq!(code(json!({"$rename": {"nickname": "balance"}})), QueryErrorCode::InvalidArgument);
    }

    #[test]
    fn test_bit_and_current_date() {
        assert!(check(json!({"$bit": {"flags": {"and": 5}}})).is_ok());
        assert_eq!(code(json!({"$bit": {"balance": {"and": 5}}})), QueryErrorCode::IncompatibleOperator);
        assert_eq!(code(json!({"$bit": {"flags": {"nand": 5}}})), QueryErrorCode::InvalidArgument);
        assert!(check(json!({"$currentDate": {"updated": true}})).is_ok());
        assert!(check(json!({"$currentDate": {"updated": {"$type": "date"}}})).is_ok());
        assert_eq!(code(json!({"$currentDate": {"name": true}})), QueryErrorCode::IncompatibleOperator);
    }

    #[test]
    fn test_id_and_conflicts() {
        assert_eq!(code(json!({"$set": {"_id": {"$oid": "5f1d7f3e9b1e8a3c4d2b1a00"}}})), QueryErrorCode::InvalidArgument);
        assert!(check(json!({"$setOnInsert": {"_id": {"$oid": "5f1d7f3e9b1e8a3c4d2b1a00"}}})).is_ok());
        assert_eq!(
            code(json!({"$set": {"roles": []}, "$inc": {"roles.0.level": 1}})),
            QueryErrorCode::ConflictingPaths
        );
        assert_eq!(
            code(json!({"$set": {"name": "a"}, "$rename": {"nickname": "name"}})),
            QueryErrorCode::ConflictingPaths
        );
        assert_eq!(code(json!({"$frob": {"name": 1}})), QueryErrorCode::UnknownOperator);
        assert_eq!(code(json!({})), QueryErrorCode::InvalidArgument);
    }
}
