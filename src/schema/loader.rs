//! Schema loader for JSON schema descriptions
//!
//! A catalog file maps collection names to root descriptions:
//!
//! ```json
//! {"collections": {"users": {"type": "object", "fields": {
//!     "name": {"type": "string"},
//!     "age": {"type": "int", "optional": true},
//!     "tags": {"type": "array", "items": {"type": "string"}}
//! }}}}
//! ```
//!
//! Roots must be objects. Field names may not be empty, start with `$`
//! or contain `.`.

use std::fs;
use std::path::Path;
use std::sync::Arc;

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};

use super::errors::{SchemaError, SchemaResult};
use super::types::{ObjectNode, ScalarKind, SchemaNode};

/// Serialized description of a schema node
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "camelCase")]
pub enum SchemaDef {
    String,
    Int,
    Long,
    Double,
    Decimal,
    Number,
    Bool,
    Date,
    Timestamp,
    BinData,
    ObjectId,
    Null,
    Regex,
    #[serde(alias = "any")]
    Unknown,
    Object {
        #[serde(default)]
        fields: IndexMap<String, FieldDef>,
        #[serde(default)]
        additional: Option<Box<SchemaDef>>,
    },
    Array {
        items: Box<SchemaDef>,
    },
}

/// A field entry: the node description plus presence flags
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FieldDef {
    #[serde(flatten)]
    pub def: SchemaDef,

    /// Field may be absent (default: false)
    #[serde(default)]
    pub optional: bool,

    /// Field may hold null (default: false)
    #[serde(default)]
    pub nullable: bool,
}

impl SchemaDef {
    /// Converts the description into a schema tree.
    ///
    /// `at` is the dotted location used in error messages.
    pub fn to_node(&self, at: &str) -> Result<SchemaNode, String> {
        let node = match self {
            SchemaDef::String => SchemaNode::scalar(ScalarKind::String),
            SchemaDef::Int => SchemaNode::scalar(ScalarKind::Int),
            SchemaDef::Long => SchemaNode::scalar(ScalarKind::Long),
            SchemaDef::Double => SchemaNode::scalar(ScalarKind::Double),
            SchemaDef::Decimal => SchemaNode::scalar(ScalarKind::Decimal),
            SchemaDef::Number => SchemaNode::scalar(ScalarKind::Number),
            SchemaDef::Bool => SchemaNode::scalar(ScalarKind::Bool),
            SchemaDef::Date => SchemaNode::scalar(ScalarKind::Date),
            SchemaDef::Timestamp => SchemaNode::scalar(ScalarKind::Timestamp),
            SchemaDef::BinData => SchemaNode::scalar(ScalarKind::BinData),
            SchemaDef::ObjectId => SchemaNode::scalar(ScalarKind::ObjectId),
            SchemaDef::Null => SchemaNode::scalar(ScalarKind::Null),
            SchemaDef::Regex => SchemaNode::scalar(ScalarKind::Regex),
            SchemaDef::Unknown => SchemaNode::scalar(ScalarKind::Unknown),
            SchemaDef::Array { items } => {
                SchemaNode::array(items.to_node(&format!("{}[]", at))?)
            }
            SchemaDef::Object { fields, additional } => {
                let mut object = ObjectNode::new();
                for (name, field) in fields {
                    validate_field_name(at, name)?;
                    let location = if at.is_empty() {
                        name.clone()
                    } else {
                        format!("{}.{}", at, name)
                    };
                    let child = field.def.to_node(&location)?;
                    object.insert(name.clone(), child, field.optional);
                    object.set_nullable(name, field.nullable);
                }
                if let Some(additional) = additional {
                    object = object.with_additional(additional.to_node(&format!("{}.*", at))?);
                }
                SchemaNode::object(object)
            }
        };
        Ok(node)
    }
}

impl SchemaDef {
    /// Describes a schema tree in the catalog format.
    pub fn from_node(node: &SchemaNode) -> SchemaDef {
        match node {
            SchemaNode::Scalar(kind) => match kind {
                ScalarKind::String => SchemaDef::String,
                ScalarKind::Int => SchemaDef::Int,
                ScalarKind::Long => SchemaDef::Long,
                ScalarKind::Double => SchemaDef::Double,
                ScalarKind::Decimal => SchemaDef::Decimal,
                ScalarKind::Number => SchemaDef::Number,
                ScalarKind::Bool => SchemaDef::Bool,
                ScalarKind::Date => SchemaDef::Date,
                ScalarKind::Timestamp => SchemaDef::Timestamp,
                ScalarKind::BinData => SchemaDef::BinData,
                ScalarKind::ObjectId => SchemaDef::ObjectId,
                ScalarKind::Null => SchemaDef::Null,
                ScalarKind::Regex => SchemaDef::Regex,
                ScalarKind::Unknown => SchemaDef::Unknown,
            },
            SchemaNode::Array(element) => SchemaDef::Array {
                items: Box::new(SchemaDef::from_node(element)),
            },
            SchemaNode::Object(object) => SchemaDef::Object {
                fields: object
                    .fields()
                    .map(|(name, child)| {
                        let field = FieldDef {
                            def: SchemaDef::from_node(child),
                            optional: object.is_optional(name),
                            nullable: object.is_nullable(name),
                        };
                        (name.to_string(), field)
                    })
                    .collect(),
                additional: object
                    .additional()
                    .map(|node| Box::new(SchemaDef::from_node(node))),
            },
        }
    }
}

fn validate_field_name(at: &str, name: &str) -> Result<(), String> {
    let location = if at.is_empty() { "<root>" } else { at };
    if name.is_empty() {
        return Err(format!("empty field name under {}", location));
    }
    if name.starts_with('$') {
        return Err(format!("field '{}' under {} starts with '$'", name, location));
    }
    if name.contains('.') {
        return Err(format!("field '{}' under {} contains '.'", name, location));
    }
    Ok(())
}

#[derive(Debug, Deserialize)]
struct CatalogFile {
    collections: IndexMap<String, SchemaDef>,
}

/// Named root schemas, one per collection
#[derive(Debug, Clone, Default)]
pub struct SchemaCatalog {
    collections: IndexMap<String, Arc<SchemaNode>>,
}

impl SchemaCatalog {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a collection (for tests or programmatic creation).
    pub fn with_collection(mut self, name: impl Into<String>, root: impl Into<Arc<SchemaNode>>) -> Self {
        self.collections.insert(name.into(), root.into());
        self
    }

    pub fn get(&self, name: &str) -> SchemaResult<Arc<SchemaNode>> {
        self.collections
            .get(name)
            .cloned()
            .ok_or_else(|| SchemaError::unknown_collection(name))
    }

    pub fn names(&self) -> Vec<String> {
        self.collections.keys().cloned().collect()
    }

    pub fn len(&self) -> usize {
        self.collections.len()
    }

    pub fn is_empty(&self) -> bool {
        self.collections.is_empty()
    }

    /// The root schema to use when no collection is named.
    ///
    /// Only unambiguous for single-collection catalogs.
    pub fn sole(&self) -> Option<Arc<SchemaNode>> {
        if self.collections.len() == 1 {
            self.collections.values().next().cloned()
        } else {
            None
        }
    }
}

/// Reads schema descriptions from disk or memory.
pub struct SchemaLoader;

impl SchemaLoader {
    /// Loads a catalog file.
    pub fn load_file(path: &Path) -> SchemaResult<SchemaCatalog> {
        let source = path.display().to_string();
        let content = fs::read_to_string(path)
            .map_err(|e| SchemaError::unreadable(&source, format!("Failed to read file: {}", e)))?;
        Self::parse_catalog(&source, &content)
    }

    /// Parses a catalog from JSON text.
    pub fn parse_catalog(source: &str, content: &str) -> SchemaResult<SchemaCatalog> {
        let file: CatalogFile = serde_json::from_str(content)
            .map_err(|e| SchemaError::unreadable(source, format!("Invalid JSON: {}", e)))?;

        let mut catalog = SchemaCatalog::new();
        for (name, def) in file.collections {
            if name.is_empty() {
                return Err(SchemaError::malformed(source, "empty collection name"));
            }
            let root = Self::root_from_def(&format!("{}#{}", source, name), &def)?;
            catalog = catalog.with_collection(name, root);
        }
        tracing::debug!(source, collections = catalog.len(), "schema catalog loaded");
        Ok(catalog)
    }

    /// Parses a single root description from JSON text.
    pub fn parse_root(source: &str, content: &str) -> SchemaResult<SchemaNode> {
        let def: SchemaDef = serde_json::from_str(content)
            .map_err(|e| SchemaError::unreadable(source, format!("Invalid JSON: {}", e)))?;
        Self::root_from_def(source, &def)
    }

    /// Converts a root description, requiring an object.
    pub fn root_from_def(source: &str, def: &SchemaDef) -> SchemaResult<SchemaNode> {
        if !matches!(def, SchemaDef::Object { .. }) {
            return Err(SchemaError::malformed(source, "root must be an object"));
        }
        def.to_node("").map_err(|e| SchemaError::malformed(source, e))
    }
}
