//! `$project`, `$addFields`/`$set` and `$unset`
//!
//! Nested sub-objects flatten into dot keys first. `$project` then picks
//! a mode: any `1`/`true` leaf selects inclusion, otherwise the projection
//! excludes.

use std::sync::Arc;

use indexmap::IndexMap;
use serde_json::Value;

use crate::query::{is_operator_object, QueryError, QueryResult};
use crate::schema::{describe, extended_json_kind, ObjectNode, SchemaNode};

use super::builder::Pipeline;
use super::shape::{field_names, remove_path, set_path, Slot};

/// A leaf of a projection spec
enum Leaf {
    Include,
    Exclude,
    Expression,
}

fn classify(value: &Value) -> Leaf {
    match value {
        Value::Bool(true) => Leaf::Include,
        Value::Bool(false) => Leaf::Exclude,
        Value::Number(n) if n.as_f64() == Some(0.0) => Leaf::Exclude,
        Value::Number(_) => Leaf::Include,
        _ => Leaf::Expression,
    }
}

/// Non-empty object that is neither an expression nor extended JSON
fn is_sub_document(value: &Value) -> bool {
    match value {
        Value::Object(map) => {
            !map.is_empty() && extended_json_kind(map).is_none() && !map.keys().any(|k| k.starts_with('$'))
        }
        _ => false,
    }
}

fn flatten<'v>(prefix: &str, value: &'v Value, out: &mut Vec<(String, &'v Value)>) {
    match value {
        Value::Object(map) if is_sub_document(value) => {
            for (key, child) in map {
                flatten(&format!("{}.{}", prefix, key), child, out);
            }
        }
        _ => out.push((prefix.to_string(), value)),
    }
}

fn spec_entries<'v>(stage: &str, spec: &'v Value) -> QueryResult<Vec<(String, &'v Value)>> {
    let map = match spec {
        Value::Object(map) if !map.is_empty() && !is_operator_object(map) => map,
        other => {
            return Err(QueryError::invalid_argument(
                stage,
                format!("expected a non-empty object of fields, found {}", describe(other)),
            ))
        }
    };
    let mut entries = Vec::new();
    for (key, value) in map {
        flatten(key, value, &mut entries);
    }
    Ok(entries)
}

/// No written path may be a prefix of another
fn check_collisions(stage: &str, paths: &[Vec<String>]) -> QueryResult<()> {
    for (i, left) in paths.iter().enumerate() {
        for right in &paths[i + 1..] {
            let shorter = left.len().min(right.len());
            if left[..shorter] == right[..shorter] {
                let (a, b) = (left.join("."), right.join("."));
                return Err(QueryError::invalid_argument(
                    stage,
                    format!("path collision between '{}' and '{}'", a, b),
                )
                .with_path(b));
            }
        }
    }
    Ok(())
}

/// Inclusion tree node
enum Kept {
    Field,
    Computed(Arc<SchemaNode>),
    Nested(IndexMap<String, Kept>),
}

fn plant(tree: &mut IndexMap<String, Kept>, names: &[String], leaf: Kept) {
    let Some((head, rest)) = names.split_first() else {
        return;
    };
    if rest.is_empty() {
        tree.insert(head.clone(), leaf);
        return;
    }
    let entry = tree
        .entry(head.clone())
        .or_insert_with(|| Kept::Nested(IndexMap::new()));
    if let Kept::Nested(children) = entry {
        plant(children, rest, leaf);
    }
}

fn include(source: &SchemaNode, tree: &IndexMap<String, Kept>) -> SchemaNode {
    if let SchemaNode::Array(element) = source {
        return SchemaNode::array(include(element, tree));
    }
    let object = source.as_object();
    let mut output = ObjectNode::new();
    for (name, kept) in tree {
        let child = object.and_then(|o| o.field(name));
        let optional = object.map_or(true, |o| o.is_optional(name));
        let nullable = object.map_or(false, |o| o.is_nullable(name));
        match kept {
            Kept::Field => match child {
                Some(child) => {
                    output.insert(name.clone(), child.clone(), optional);
                    output.set_nullable(name, nullable);
                }
                None => output.insert(name.clone(), SchemaNode::unknown(), true),
            },
            Kept::Computed(node) => output.insert(name.clone(), node.clone(), false),
            // A null parent has no subfields to keep, so the rebuilt field may be absent.
            Kept::Nested(children) => match child {
                Some(child) => output.insert(name.clone(), include(child, children), optional || nullable),
                None => output.insert(
                    name.clone(),
                    include(&SchemaNode::object(ObjectNode::new()), children),
                    false,
                ),
            },
        }
    }
    SchemaNode::object(output)
}

pub(crate) fn project(pipeline: &Pipeline, spec: &Value) -> QueryResult<Arc<SchemaNode>> {
    let entries = spec_entries("$project", spec)?;
    let inclusion = entries
        .iter()
        .any(|(_, value)| matches!(classify(value), Leaf::Include));

    let mut paths = Vec::with_capacity(entries.len());
    let mut tree = IndexMap::new();
    let mut schema = (**pipeline.schema()).clone();

    for (key, value) in &entries {
        let names = field_names("$project", key)?;
        match classify(value) {
            Leaf::Include => {
                pipeline.resolve(key)?;
                plant(&mut tree, &names, Kept::Field);
            }
            Leaf::Exclude if inclusion => {
                if key != "_id" {
                    return Err(QueryError::invalid_argument(
                        "$project",
                        format!("cannot exclude '{}' in an inclusion projection", key),
                    )
                    .with_path(key.clone()));
                }
            }
            Leaf::Exclude => {
                pipeline.resolve(key)?;
                schema = remove_path(&schema, &names);
            }
            Leaf::Expression => {
                let node = pipeline.inferer().infer(value).map_err(|e| e.with_path(key.clone()))?;
                if inclusion {
                    plant(&mut tree, &names, Kept::Computed(node));
                } else {
                    schema = set_path(&schema, &names, node, Slot::required());
                }
            }
        }
        paths.push(names);
    }
    check_collisions("$project", &paths)?;

    if inclusion {
        Ok(Arc::new(include(pipeline.schema(), &tree)))
    } else {
        Ok(Arc::new(schema))
    }
}

/// `$addFields` and `$set`. Values are inferred against the input schema.
pub(crate) fn add_fields(pipeline: &Pipeline, stage: &str, spec: &Value) -> QueryResult<Arc<SchemaNode>> {
    let entries = spec_entries(stage, spec)?;
    let inferer = pipeline.inferer();

    let mut writes = Vec::with_capacity(entries.len());
    for (key, value) in &entries {
        let names = field_names(stage, key)?;
        let node = if value.as_str() == Some("$$REMOVE") {
            None
        } else {
            Some(inferer.infer(value).map_err(|e| e.with_path(key.clone()))?)
        };
        writes.push((names, node));
    }
    let paths: Vec<Vec<String>> = writes.iter().map(|(names, _)| names.clone()).collect();
    check_collisions(stage, &paths)?;

    let schema = writes
        .into_iter()
        .fold((**pipeline.schema()).clone(), |schema, (names, node)| match node {
            Some(node) => set_path(&schema, &names, node, Slot::required()),
            None => remove_path(&schema, &names),
        });
    Ok(Arc::new(schema))
}

pub(crate) fn unset(pipeline: &Pipeline, spec: &Value) -> QueryResult<Arc<SchemaNode>> {
    let paths: Vec<&str> = match spec {
        Value::String(path) => vec![path.as_str()],
        Value::Array(items) if !items.is_empty() => items
            .iter()
            .map(|item| {
                item.as_str()
                    .ok_or_else(|| QueryError::invalid_argument("$unset", "every path must be a string"))
            })
            .collect::<QueryResult<_>>()?,
        other => {
            return Err(QueryError::invalid_argument(
                "$unset",
                format!("expected a path or a non-empty list of paths, found {}", describe(other)),
            ))
        }
    };

    let mut schema = (**pipeline.schema()).clone();
    for path in paths {
        let names = field_names("$unset", path)?;
        pipeline.resolve(path)?;
        schema = remove_path(&schema, &names);
    }
    Ok(Arc::new(schema))
}
