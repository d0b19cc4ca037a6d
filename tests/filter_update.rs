//! Filter and Update Tests
//!
//! Operator gating by field capability:
//! - Filter operators apply only to fields whose type supports them
//! - Update operators check both the target field and their payload
//! - Removal of required fields is opt-in
//! - Overlapping update paths conflict

use std::sync::Arc;

use docshape::config::DslConfig;
use docshape::query::{Filter, QueryErrorCode, Update};
use docshape::schema::{ObjectNode, SchemaNode};
use serde_json::{json, Value};

// =============================================================================
// Helper Functions
// =============================================================================

fn places() -> Arc<SchemaNode> {
    let point = ObjectNode::new()
        .with_field("type", SchemaNode::string())
        .with_field("coordinates", SchemaNode::array(SchemaNode::double()));
    Arc::new(SchemaNode::object(
        ObjectNode::new()
            .with_field("name", SchemaNode::string())
            .with_field("mask", SchemaNode::int())
            .with_field("rating", SchemaNode::double())
            .with_field("open", SchemaNode::bool())
            .with_field("labels", SchemaNode::array(SchemaNode::string()))
            .with_field("address", SchemaNode::object(ObjectNode::new().with_field("city", SchemaNode::string())))
            .with_field("loc", SchemaNode::array(SchemaNode::double()))
            .with_field("geo", SchemaNode::object(point))
            .with_optional_field("note", SchemaNode::string())
            .with_field("visits", SchemaNode::int()),
    ))
}

fn filter_code(document: Value) -> QueryErrorCode {
    Filter::new(&places(), document).unwrap_err().code()
}

fn update_code(document: Value) -> QueryErrorCode {
    Update::new(&places(), document).unwrap_err().code()
}

// =============================================================================
// Filter Gating Tests
// =============================================================================

/// `$bitsAllSet` applies to integer fields only.
#[test]
fn test_bits_operators_need_integers() {
    assert!(Filter::new(&places(), json!({"mask": {"$bitsAllSet": 6}})).is_ok());
    for field in ["name", "open", "address", "labels"] {
        let mut document = serde_json::Map::new();
        document.insert(field.to_string(), json!({"$bitsAllSet": 6}));
        assert_eq!(
            filter_code(Value::Object(document)),
            QueryErrorCode::IncompatibleOperator,
            "{}",
            field
        );
    }
}

/// `$regex` and `$options` apply to strings, `$mod` to numbers.
#[test]
fn test_string_and_numeric_operators() {
    assert!(Filter::new(&places(), json!({"name": {"$regex": "^caf", "$options": "i"}})).is_ok());
    assert_eq!(filter_code(json!({"rating": {"$regex": "4"}})), QueryErrorCode::IncompatibleOperator);
    assert_eq!(filter_code(json!({"name": {"$options": "i"}})), QueryErrorCode::InvalidArgument);

    assert!(Filter::new(&places(), json!({"visits": {"$mod": [2, 0]}})).is_ok());
    assert_eq!(filter_code(json!({"name": {"$mod": [2, 0]}})), QueryErrorCode::IncompatibleOperator);
}

/// Proximity operators need a coordinate pair or a GeoJSON point.
#[test]
fn test_geo_operators() {
    assert!(Filter::new(&places(), json!({"loc": {"$near": [1.5, 2.5], "$maxDistance": 10}})).is_ok());
    assert!(Filter::new(
        &places(),
        json!({"geo": {"$near": {"$geometry": {"type": "Point", "coordinates": [1.5, 2.5]}}}})
    )
    .is_ok());
    assert_eq!(filter_code(json!({"name": {"$near": [1, 2]}})), QueryErrorCode::IncompatibleOperator);
    assert_eq!(filter_code(json!({"labels": {"$minDistance": 1}})), QueryErrorCode::IncompatibleOperator);
}

/// Unknown fields and operators are rejected, not passed through.
#[test]
fn test_unknown_references() {
    assert_eq!(filter_code(json!({"nmae": "x"})), QueryErrorCode::UnknownField);
    assert_eq!(filter_code(json!({"name": {"$frob": 1}})), QueryErrorCode::UnknownOperator);
    assert!(Filter::new(&places(), json!({"$or": [{"name": "a"}, {"address.city": "b"}]})).is_ok());
}

/// Empty `$cond` and `$switch` are rejected inside `$expr`.
#[test]
fn test_expression_discriminants_required() {
    assert_eq!(filter_code(json!({"$expr": {"$cond": {}}})), QueryErrorCode::InvalidArgument);
    assert_eq!(filter_code(json!({"$expr": {"$switch": {}}})), QueryErrorCode::InvalidArgument);
    assert!(Filter::new(
        &places(),
        json!({"$expr": {"$cond": {"if": {"$gt": ["$visits", 3]}, "then": true, "else": false}}})
    )
    .is_ok());
}

// =============================================================================
// Update Gating Tests
// =============================================================================

/// Array and numeric update operators refuse string fields.
#[test]
fn test_update_operators_on_strings() {
    assert_eq!(update_code(json!({"$pop": {"name": 1}})), QueryErrorCode::IncompatibleOperator);
    assert_eq!(update_code(json!({"$inc": {"name": 1}})), QueryErrorCode::IncompatibleOperator);
    assert!(Update::new(&places(), json!({"$inc": {"visits": 1}, "$pop": {"labels": -1}})).is_ok());
}

/// `$unset` of a required field needs `allow_unset_required`.
#[test]
fn test_unset_required_field() {
    assert!(Update::new(&places(), json!({"$unset": {"note": ""}})).is_ok());
    assert_eq!(update_code(json!({"$unset": {"name": ""}})), QueryErrorCode::IncompatibleOperator);

    let config = DslConfig::default().with_allow_unset_required(true);
    assert!(Update::with_config(&places(), json!({"$unset": {"name": ""}}), &config).is_ok());
}

/// Updating a path and one of its prefixes conflicts.
#[test]
fn test_overlapping_paths_conflict() {
    assert_eq!(
        update_code(json!({"$set": {"address": {"city": "Oslo"}, "address.city": "Bergen"}})),
        QueryErrorCode::ConflictingPaths
    );
    assert_eq!(
        update_code(json!({"$set": {"address.city": "Oslo"}, "$setOnInsert": {"address": {"city": "Bergen"}}})),
        QueryErrorCode::ConflictingPaths
    );
}

/// Validated documents round-trip unchanged.
#[test]
fn test_documents_are_preserved() {
    let document = json!({"$set": {"rating": 4.5}, "$addToSet": {"labels": "cozy"}});
    let update = Update::new(&places(), document.clone()).unwrap();
    assert_eq!(update.document(), &document);
    assert_eq!(serde_json::to_value(&update).unwrap(), document);
}
