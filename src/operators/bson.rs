//! BSON type aliases and numeric codes accepted by `$type`

use serde_json::Value;

use crate::schema::ScalarKind;

/// `(alias, code)` pairs
pub const BSON_TYPES: &[(&str, i64)] = &[
    ("double", 1),
    ("string", 2),
    ("object", 3),
    ("array", 4),
    ("binData", 5),
    ("undefined", 6),
    ("objectId", 7),
    ("bool", 8),
    ("date", 9),
    ("null", 10),
    ("regex", 11),
    ("dbPointer", 12),
    ("javascript", 13),
    ("symbol", 14),
    ("javascriptWithScope", 15),
    ("int", 16),
    ("timestamp", 17),
    ("long", 18),
    ("decimal", 19),
    ("minKey", -1),
    ("maxKey", 127),
];

/// Alias matching any numeric type; it has no code of its own.
pub const NUMBER_ALIAS: &str = "number";

pub fn is_alias(alias: &str) -> bool {
    alias == NUMBER_ALIAS || BSON_TYPES.iter().any(|(name, _)| *name == alias)
}

pub fn is_code(code: i64) -> bool {
    BSON_TYPES.iter().any(|(_, c)| *c == code)
}

pub fn alias_for_code(code: i64) -> Option<&'static str> {
    BSON_TYPES
        .iter()
        .find(|(_, c)| *c == code)
        .map(|(name, _)| *name)
}

/// Scalar kind produced by converting to `alias` (`$convert.to`)
pub fn scalar_for_alias(alias: &str) -> Option<ScalarKind> {
    let kind = match alias {
        "double" => ScalarKind::Double,
        "string" => ScalarKind::String,
        "binData" => ScalarKind::BinData,
        "objectId" => ScalarKind::ObjectId,
        "bool" => ScalarKind::Bool,
        "date" => ScalarKind::Date,
        "null" => ScalarKind::Null,
        "regex" => ScalarKind::Regex,
        "int" => ScalarKind::Int,
        "timestamp" => ScalarKind::Timestamp,
        "long" => ScalarKind::Long,
        "decimal" => ScalarKind::Decimal,
        "number" => ScalarKind::Number,
        _ => return None,
    };
    Some(kind)
}

fn is_single_type(value: &Value) -> bool {
    match value {
        Value::String(alias) => is_alias(alias),
        Value::Number(n) => n.as_i64().map_or(false, is_code),
        _ => false,
    }
}

/// A `$type` argument: alias, code, or non-empty array of either.
pub fn is_type_spec(value: &Value) -> bool {
    match value {
        Value::Array(items) => !items.is_empty() && items.iter().all(is_single_type),
        other => is_single_type(other),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_aliases_and_codes() {
        assert!(is_alias("objectId"));
        assert!(is_alias("number"));
        assert!(!is_alias("integer"));
        assert!(is_code(127));
        assert!(!is_code(20));
        assert_eq!(alias_for_code(16), Some("int"));
    }

    #[test]
    fn test_type_spec() {
        assert!(is_type_spec(&json!("string")));
        assert!(is_type_spec(&json!(2)));
        assert!(is_type_spec(&json!(["int", "long", 1])));
        assert!(!is_type_spec(&json!([])));
        assert!(!is_type_spec(&json!("text")));
        assert!(!is_type_spec(&json!(true)));
    }

    #[test]
    fn test_scalar_for_alias() {
        assert_eq!(scalar_for_alias("long"), Some(ScalarKind::Long));
        assert_eq!(scalar_for_alias("object"), None);
    }
}
