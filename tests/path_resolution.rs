//! Path Resolution Tests
//!
//! Dot path behavior over nested and array-bearing schemas:
//! - The depth budget admits exactly nine segments by default
//! - Array levels may be indexed, skipped or addressed by placeholder
//! - Every enumerated pattern resolves once instantiated
//! - Catalog files load into the same trees the builders use

use std::io::Write;
use std::sync::Arc;

use docshape::path::{enumerate_paths, resolve, resolve_path, PathError, ResolveOptions};
use docshape::schema::{ObjectNode, SchemaLoader, SchemaNode};
use serde_json::json;
use tempfile::NamedTempFile;

// =============================================================================
// Helper Functions
// =============================================================================

/// `{ a: { b: { ... { j: string } } } }`, ten levels deep
fn chain() -> Arc<SchemaNode> {
    let mut node = SchemaNode::string();
    for name in ["j", "i", "h", "g", "f", "e", "d", "c", "b", "a"] {
        node = SchemaNode::object(ObjectNode::new().with_field(name, node));
    }
    Arc::new(node)
}

fn users() -> Arc<SchemaNode> {
    let role = ObjectNode::new().with_field("name", SchemaNode::string());
    Arc::new(SchemaNode::object(
        ObjectNode::new()
            .with_field("tags", SchemaNode::array(SchemaNode::string()))
            .with_field("roles", SchemaNode::array(SchemaNode::object(role))),
    ))
}

fn placeholders() -> ResolveOptions {
    ResolveOptions::new().with_placeholders(true)
}

// =============================================================================
// Depth Bound Tests
// =============================================================================

/// Nine segments resolve, the tenth exceeds the budget.
#[test]
fn test_depth_bound_on_resolution() {
    let root = chain();
    let resolved = resolve(&root, "a.b.c.d.e.f.g.h.i", ResolveOptions::new()).unwrap();
    assert!(resolved.node().as_object().is_some());

    let err = resolve(&root, "a.b.c.d.e.f.g.h.i.j", ResolveOptions::new()).unwrap_err();
    assert!(matches!(err, PathError::DepthExceeded { max_depth: 9, .. }));
    assert_eq!(err.code(), "SHAPE_DEPTH_EXCEEDED");
}

/// Enumeration stops at the same bound resolution uses.
#[test]
fn test_depth_bound_on_enumeration() {
    let listed: Vec<String> = enumerate_paths(&chain(), ResolveOptions::new())
        .iter()
        .map(ToString::to_string)
        .collect();
    assert_eq!(listed.len(), 9);
    assert!(listed.contains(&"a.b.c.d.e.f.g.h.i".to_string()));
    assert!(!listed.contains(&"a.b.c.d.e.f.g.h.i.j".to_string()));
}

// =============================================================================
// Array Addressing Tests
// =============================================================================

/// Indexed and skipped array levels reach the same leaf.
#[test]
fn test_array_skip_level_resolution() {
    let root = users();
    let options = ResolveOptions::new();

    let skipped = resolve(&root, "roles.name", options).unwrap();
    let indexed = resolve(&root, "roles.0.name", options).unwrap();
    assert_eq!(**skipped.node(), SchemaNode::string());
    assert_eq!(**indexed.node(), SchemaNode::string());

    let element = resolve(&root, "roles.0", options).unwrap();
    assert_eq!(element.node().top_level_fields(), vec!["name"]);

    let whole = resolve(&root, "roles", options).unwrap();
    assert!(whole.element_type().is_some());
}

/// Placeholder forms reach the element, or the array under check-in-array.
#[test]
fn test_placeholder_forms() {
    let root = users();
    for path in ["tags.$", "tags.$[]", "tags.$[anyIdentifier]"] {
        let plain = resolve(&root, path, placeholders()).unwrap();
        assert_eq!(*plain.value_type(), SchemaNode::string(), "{}", path);

        let checked = resolve(&root, path, placeholders().with_check_in_array(true)).unwrap();
        assert_eq!(*checked.value_type(), SchemaNode::array(SchemaNode::string()), "{}", path);
    }
}

/// Placeholders are refused unless the call site enables them.
#[test]
fn test_placeholders_are_opt_in() {
    let err = resolve(&users(), "tags.$[]", ResolveOptions::new()).unwrap_err();
    assert_eq!(err.code(), "SHAPE_PLACEHOLDER_NOT_ALLOWED");
    assert_eq!(err.path(), "tags.$[]");
}

/// Malformed paths fail before any lookup.
#[test]
fn test_malformed_paths() {
    for path in ["", "roles..name", "tags.$[bad id]"] {
        let err = resolve(&users(), path, placeholders()).unwrap_err();
        assert_eq!(err.code(), "SHAPE_MALFORMED_PATH", "{:?}", path);
    }
}

// =============================================================================
// Enumeration Tests
// =============================================================================

/// Every enumerated pattern, once instantiated, resolves.
#[test]
fn test_every_enumerated_pattern_resolves() {
    let root = users();
    for pattern in enumerate_paths(&root, placeholders()) {
        let path = pattern.instantiate();
        assert!(pattern.matches(&path));
        assert!(
            resolve_path(&root, &path, placeholders()).is_ok(),
            "{} should resolve",
            pattern
        );
    }
}

// =============================================================================
// Catalog Tests
// =============================================================================

/// A catalog file loads into resolvable roots.
#[test]
fn test_catalog_file_resolves() {
    let mut file = NamedTempFile::new().unwrap();
    let content = json!({"collections": {"users": {"type": "object", "fields": {
        "profile": {"type": "object", "nullable": true, "fields": {
            "email": {"type": "string", "optional": true}
        }}
    }}}});
    file.write_all(content.to_string().as_bytes()).unwrap();

    let catalog = SchemaLoader::load_file(file.path()).unwrap();
    let root = catalog.get("users").unwrap();
    let email = resolve(&root, "profile.email", ResolveOptions::new()).unwrap();
    assert!(email.is_optional());
    assert!(resolve(&root, "profile", ResolveOptions::new()).unwrap().is_nullable());
}
