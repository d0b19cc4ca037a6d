//! Schema reshaping
//!
//! Stages never mutate a schema; they derive a new tree that shares the
//! untouched subtrees. Writes and removals that pass through an array
//! apply to its element type.

use std::sync::Arc;

use crate::path::{FieldPath, PathSegment};
use crate::query::{QueryError, QueryResult};
use crate::schema::{ObjectNode, SchemaNode};

/// Presence flags for a written field
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub(crate) struct Slot {
    pub optional: bool,
    pub nullable: bool,
}

impl Slot {
    pub fn required() -> Self {
        Self::default()
    }

    pub fn optional() -> Self {
        Self {
            optional: true,
            nullable: false,
        }
    }
}

/// Splits a written path into plain field names.
///
/// Stages that create fields accept neither indexes nor placeholders.
pub(crate) fn field_names(stage: &str, path: &str) -> QueryResult<Vec<String>> {
    let parsed = FieldPath::parse(path)?;
    parsed
        .segments()
        .iter()
        .map(|segment| match segment {
            PathSegment::Name(name) => Ok(name.clone()),
            other => Err(QueryError::invalid_argument(
                stage,
                format!("positional segment '{}' is not allowed in '{}'", other, path),
            )
            .with_path(path)),
        })
        .collect()
}

/// A single field name: non-empty, no `$` prefix, no `.`
pub(crate) fn check_field_name(stage: &str, name: &str) -> QueryResult<()> {
    if name.is_empty() || name.starts_with('$') || name.contains('.') {
        return Err(QueryError::invalid_argument(
            stage,
            format!("'{}' is not a valid field name", name),
        ));
    }
    Ok(())
}

/// Returns `root` with `value` written at `path`.
///
/// Missing intermediate objects are created; a scalar in the way is
/// replaced by an object.
pub(crate) fn set_path(root: &SchemaNode, path: &[String], value: Arc<SchemaNode>, slot: Slot) -> SchemaNode {
    let Some((head, rest)) = path.split_first() else {
        return (*value).clone();
    };
    match root {
        SchemaNode::Array(element) => SchemaNode::array(set_path(element, path, value, slot)),
        SchemaNode::Object(object) => {
            let mut object = object.clone();
            if rest.is_empty() {
                object.insert(head.clone(), value, slot.optional);
                object.set_nullable(head, slot.nullable);
            } else {
                let child = match object.field(head) {
                    Some(child) => set_path(child, rest, value, slot),
                    None => set_path(&SchemaNode::object(ObjectNode::new()), rest, value, slot),
                };
                let optional = object.contains(head) && object.is_optional(head);
                object.insert(head.clone(), child, optional);
            }
            SchemaNode::object(object)
        }
        SchemaNode::Scalar(_) => set_path(&SchemaNode::object(ObjectNode::new()), path, value, slot),
    }
}

/// Returns `root` without the field at `path`. Missing paths are a no-op.
pub(crate) fn remove_path(root: &SchemaNode, path: &[String]) -> SchemaNode {
    let Some((head, rest)) = path.split_first() else {
        return root.clone();
    };
    match root {
        SchemaNode::Array(element) => SchemaNode::array(remove_path(element, path)),
        SchemaNode::Object(object) => {
            let mut object = object.clone();
            if rest.is_empty() {
                object.remove(head);
            } else if let Some(child) = object.declared(head).cloned() {
                let optional = object.is_optional(head);
                let nullable = object.is_nullable(head);
                object.insert(head.clone(), remove_path(&child, rest), optional);
                object.set_nullable(head, nullable);
            }
            SchemaNode::object(object)
        }
        SchemaNode::Scalar(_) => root.clone(),
    }
}

/// Replaces the array at `path` with its element type.
pub(crate) fn unwrap_array(root: &SchemaNode, path: &[String], slot: Slot) -> SchemaNode {
    let Some((head, rest)) = path.split_first() else {
        return match root {
            SchemaNode::Array(element) => (**element).clone(),
            other => other.clone(),
        };
    };
    match root {
        SchemaNode::Array(element) => SchemaNode::array(unwrap_array(element, path, slot)),
        SchemaNode::Object(object) => {
            let Some(child) = object.field(head).cloned() else {
                return root.clone();
            };
            let mut object = object.clone();
            let optional = object.is_optional(head);
            let nullable = object.is_nullable(head);
            if rest.is_empty() {
                object.insert(head.clone(), unwrap_array(&child, rest, slot), optional || slot.optional);
                object.set_nullable(head, nullable || slot.nullable);
            } else {
                object.insert(head.clone(), unwrap_array(&child, rest, slot), optional);
                object.set_nullable(head, nullable);
            }
            SchemaNode::object(object)
        }
        SchemaNode::Scalar(_) => root.clone(),
    }
}
