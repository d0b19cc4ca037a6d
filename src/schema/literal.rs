//! Literal values checked against schema nodes
//!
//! Scalars that JSON cannot express natively are written in Extended JSON
//! (`{"$date": ...}`, `{"$oid": ...}`, `{"$numberLong": ...}`, ...). A date
//! may also be given as an RFC 3339 string and an object id as 24 hex
//! digits.

use std::sync::{Arc, OnceLock};

use chrono::DateTime;
use regex::Regex;
use serde_json::{Map, Value};

use super::types::{ObjectNode, ScalarKind, SchemaNode};

static OBJECT_ID: OnceLock<Option<Regex>> = OnceLock::new();

fn is_object_id(text: &str) -> bool {
    OBJECT_ID
        .get_or_init(|| Regex::new(r"^[0-9a-fA-F]{24}$").ok())
        .as_ref()
        .map_or(false, |re| re.is_match(text))
}

fn is_date_string(text: &str) -> bool {
    DateTime::parse_from_rfc3339(text).is_ok()
}

/// How strictly required fields are enforced for object literals
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Presence {
    /// Every required field must be present
    Full,
    /// Only `_id` is required; used for identifiable objects
    PartialButId,
}

impl Presence {
    /// `PartialButId` for objects that declare an `_id`, `Full` otherwise.
    /// Array levels are looked through, so an array of identifiable
    /// objects is partial too.
    pub fn for_node(node: &SchemaNode) -> Self {
        let mut node = node;
        while let Some(element) = node.as_array() {
            node = &**element;
        }
        match node.as_object() {
            Some(object) if object.contains("_id") => Presence::PartialButId,
            _ => Presence::Full,
        }
    }
}

/// Scalar kind of an Extended JSON wrapper, if `map` is one.
pub fn extended_json_kind(map: &Map<String, Value>) -> Option<ScalarKind> {
    if map.len() != 1 {
        return None;
    }
    let (key, payload) = map.iter().next()?;
    let kind = match key.as_str() {
        "$date" => match payload {
            Value::String(text) if is_date_string(text) => ScalarKind::Date,
            Value::Number(n) if n.is_i64() => ScalarKind::Date,
            Value::Object(inner) if inner.contains_key("$numberLong") => ScalarKind::Date,
            _ => return None,
        },
        "$oid" => match payload {
            Value::String(text) if is_object_id(text) => ScalarKind::ObjectId,
            _ => return None,
        },
        "$numberInt" => ScalarKind::Int,
        "$numberLong" => ScalarKind::Long,
        "$numberDouble" => ScalarKind::Double,
        "$numberDecimal" => ScalarKind::Decimal,
        "$timestamp" => ScalarKind::Timestamp,
        "$binary" => ScalarKind::BinData,
        "$regularExpression" => ScalarKind::Regex,
        _ => return None,
    };
    Some(kind)
}

/// True for any Extended JSON scalar wrapper.
pub fn is_extended_json(value: &Value) -> bool {
    matches!(value, Value::Object(map) if extended_json_kind(map).is_some())
}

/// True for a regular expression literal.
pub fn is_regex_literal(value: &Value) -> bool {
    matches!(value, Value::Object(map) if extended_json_kind(map) == Some(ScalarKind::Regex))
}

/// Short description of a JSON value's shape, for error messages
pub fn describe(value: &Value) -> String {
    match value {
        Value::Null => "null".to_string(),
        Value::Bool(_) => "bool".to_string(),
        Value::Number(_) => "number".to_string(),
        Value::String(_) => "string".to_string(),
        Value::Array(_) => "array".to_string(),
        Value::Object(map) => match extended_json_kind(map) {
            Some(kind) => kind.name().to_string(),
            None => "object".to_string(),
        },
    }
}

fn scalar_conforms(kind: ScalarKind, value: &Value) -> bool {
    let wrapped = match value {
        Value::Object(map) => extended_json_kind(map),
        _ => None,
    };
    match kind {
        ScalarKind::Unknown => true,
        ScalarKind::String => value.is_string(),
        ScalarKind::Int => {
            value
                .as_i64()
                .map_or(false, |n| i32::try_from(n).is_ok())
                || wrapped == Some(ScalarKind::Int)
        }
        ScalarKind::Long => {
            value.is_i64()
                || value.is_u64()
                || matches!(wrapped, Some(ScalarKind::Int | ScalarKind::Long))
        }
        ScalarKind::Double | ScalarKind::Decimal | ScalarKind::Number => {
            value.is_number() || wrapped.map_or(false, |k| k.is_numeric())
        }
        ScalarKind::Bool => value.is_boolean(),
        ScalarKind::Date => {
            wrapped == Some(ScalarKind::Date) || value.as_str().map_or(false, is_date_string)
        }
        ScalarKind::ObjectId => {
            wrapped == Some(ScalarKind::ObjectId) || value.as_str().map_or(false, is_object_id)
        }
        ScalarKind::Null => value.is_null(),
        ScalarKind::Timestamp | ScalarKind::BinData | ScalarKind::Regex => wrapped == Some(kind),
    }
}

fn object_conforms(object: &ObjectNode, map: &Map<String, Value>, presence: Presence) -> bool {
    for (name, value) in map {
        let Some(child) = object.field(name) else {
            return false;
        };
        let nullable = object.is_nullable(name);
        if !conforms(child, value, nullable, Presence::Full) {
            return false;
        }
    }
    object.fields().all(|(name, _)| {
        object.is_optional(name)
            || map.contains_key(name)
            || (presence == Presence::PartialButId && name != "_id")
    })
}

/// Checks a literal against a node.
///
/// `nullable` admits `null` for the top-level value; nested nullability
/// comes from the object nodes themselves.
pub fn conforms(node: &SchemaNode, value: &Value, nullable: bool, presence: Presence) -> bool {
    if value.is_null() {
        return nullable || matches!(node, SchemaNode::Scalar(ScalarKind::Null | ScalarKind::Unknown));
    }
    match node {
        SchemaNode::Scalar(kind) => scalar_conforms(*kind, value),
        SchemaNode::Array(element) => value.as_array().map_or(false, |items| {
            items
                .iter()
                .all(|item| conforms(element, item, false, presence))
        }),
        SchemaNode::Object(object) => match value {
            Value::Object(map) if extended_json_kind(map).is_none() => {
                object_conforms(object, map, presence)
            }
            _ => false,
        },
    }
}

/// Schema node describing a literal value
pub fn literal_type(value: &Value) -> SchemaNode {
    match value {
        Value::Null => SchemaNode::null(),
        Value::Bool(_) => SchemaNode::bool(),
        Value::Number(_) => SchemaNode::number(),
        Value::String(_) => SchemaNode::string(),
        Value::Array(items) => {
            let element = items
                .iter()
                .map(literal_type)
                .reduce(|a, b| unify(&a, &b))
                .unwrap_or_else(SchemaNode::unknown);
            SchemaNode::array(element)
        }
        Value::Object(map) => {
            if let Some(kind) = extended_json_kind(map) {
                return SchemaNode::scalar(kind);
            }
            let mut object = ObjectNode::new();
            for (name, item) in map {
                object.insert(name.clone(), literal_type(item), false);
            }
            SchemaNode::object(object)
        }
    }
}

/// Smallest node describing values of either `a` or `b`.
///
/// Numeric kinds widen to `number`; objects merge, with fields missing
/// on one side becoming optional; anything else collapses to `unknown`.
pub fn unify(a: &SchemaNode, b: &SchemaNode) -> SchemaNode {
    if a == b {
        return a.clone();
    }
    match (a, b) {
        (SchemaNode::Scalar(x), SchemaNode::Scalar(y)) if x.is_numeric() && y.is_numeric() => {
            SchemaNode::number()
        }
        (SchemaNode::Array(x), SchemaNode::Array(y)) => SchemaNode::array(unify(x, y)),
        (SchemaNode::Object(x), SchemaNode::Object(y)) => {
            let mut merged = ObjectNode::new();
            for (name, left) in x.fields() {
                match y.declared(name) {
                    Some(right) => {
                        let node: Arc<SchemaNode> = Arc::new(unify(left, right));
                        merged.insert(name, node, x.is_optional(name) || y.is_optional(name));
                    }
                    None => merged.insert(name, left.clone(), true),
                }
            }
            for (name, right) in y.fields() {
                if !x.contains(name) {
                    merged.insert(name, right.clone(), true);
                }
            }
            SchemaNode::object(merged)
        }
        _ => SchemaNode::unknown(),
    }
}
