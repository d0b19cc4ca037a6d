//! Stage descriptors
//!
//! A descriptor is one stage document: a single `$name` key mapped to the
//! stage's validated arguments.

use serde::ser::{Serialize, SerializeMap, Serializer};
use serde_json::{Map, Value};

use crate::query::{QueryError, QueryResult};
use crate::schema::describe;

/// One validated stage, in wire form
#[derive(Debug, Clone, PartialEq)]
pub struct StageDescriptor {
    name: String,
    arguments: Value,
}

impl StageDescriptor {
    pub(crate) fn new(name: impl Into<String>, arguments: Value) -> Self {
        Self {
            name: name.into(),
            arguments,
        }
    }

    /// Splits a raw `{ "$stage": args }` document.
    pub fn parse(document: &Value) -> QueryResult<Self> {
        match document {
            Value::Object(map) if map.len() == 1 => {
                let (name, arguments) = map.iter().next().ok_or_else(|| {
                    QueryError::invalid_argument("pipeline", "empty stage document")
                })?;
                if !name.starts_with('$') {
                    return Err(QueryError::invalid_argument(
                        "pipeline",
                        format!("stage name '{}' must start with '$'", name),
                    ));
                }
                Ok(Self::new(name.clone(), arguments.clone()))
            }
            Value::Object(map) => Err(QueryError::invalid_argument(
                "pipeline",
                format!("a stage document has exactly one key, found {}", map.len()),
            )),
            other => Err(QueryError::invalid_argument(
                "pipeline",
                format!("expected a stage document, found {}", describe(other)),
            )),
        }
    }

    /// Stage name including the `$`
    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn arguments(&self) -> &Value {
        &self.arguments
    }

    /// The stage document `{ "$name": arguments }`
    pub fn to_document(&self) -> Value {
        let mut map = Map::new();
        map.insert(self.name.clone(), self.arguments.clone());
        Value::Object(map)
    }
}

impl Serialize for StageDescriptor {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(Some(1))?;
        map.serialize_entry(&self.name, &self.arguments)?;
        map.end()
    }
}
