//! Schema model types
//!
//! A schema is a tree of object, array and scalar nodes. Nodes are never
//! mutated once shared: every derived schema is a new tree that reuses
//! untouched subtrees through `Arc`.

use std::collections::BTreeSet;
use std::fmt;
use std::sync::Arc;

use indexmap::IndexMap;

use super::errors::LookupError;

/// Primitive kind of a scalar leaf
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ScalarKind {
    String,
    Int,
    Long,
    Double,
    Decimal,
    /// Any numeric value (int, long, double or decimal)
    Number,
    Bool,
    Date,
    Timestamp,
    BinData,
    ObjectId,
    Null,
    Regex,
    /// Opaque value; only supports operators that accept anything
    Unknown,
}

impl ScalarKind {
    /// Returns the BSON-style name of this kind
    pub fn name(&self) -> &'static str {
        match self {
            ScalarKind::String => "string",
            ScalarKind::Int => "int",
            ScalarKind::Long => "long",
            ScalarKind::Double => "double",
            ScalarKind::Decimal => "decimal",
            ScalarKind::Number => "number",
            ScalarKind::Bool => "bool",
            ScalarKind::Date => "date",
            ScalarKind::Timestamp => "timestamp",
            ScalarKind::BinData => "binData",
            ScalarKind::ObjectId => "objectId",
            ScalarKind::Null => "null",
            ScalarKind::Regex => "regex",
            ScalarKind::Unknown => "unknown",
        }
    }

    pub fn is_numeric(&self) -> bool {
        matches!(
            self,
            ScalarKind::Int
                | ScalarKind::Long
                | ScalarKind::Double
                | ScalarKind::Decimal
                | ScalarKind::Number
        )
    }

    /// Integer-capable kinds. `Number` counts because it may hold integers.
    pub fn is_integer(&self) -> bool {
        matches!(self, ScalarKind::Int | ScalarKind::Long | ScalarKind::Number)
    }
}

/// A node of the schema tree
#[derive(Debug, Clone, PartialEq)]
pub enum SchemaNode {
    Scalar(ScalarKind),
    Object(ObjectNode),
    Array(Arc<SchemaNode>),
}

/// Object node: ordered named children plus presence metadata
#[derive(Debug, Clone, PartialEq, Default)]
pub struct ObjectNode {
    fields: IndexMap<String, Arc<SchemaNode>>,
    optional: BTreeSet<String>,
    nullable: BTreeSet<String>,
    /// Value shape for keys not declared in `fields` (open objects)
    additional: Option<Arc<SchemaNode>>,
}

impl ObjectNode {
    pub fn new() -> Self {
        Self::default()
    }

    /// An open object whose every key holds `value`
    pub fn open(value: impl Into<Arc<SchemaNode>>) -> Self {
        Self::new().with_additional(value)
    }

    /// Adds a required, non-null field
    pub fn with_field(mut self, name: impl Into<String>, node: impl Into<Arc<SchemaNode>>) -> Self {
        self.insert(name, node, false);
        self
    }

    /// Adds a field that may be absent
    pub fn with_optional_field(
        mut self,
        name: impl Into<String>,
        node: impl Into<Arc<SchemaNode>>,
    ) -> Self {
        self.insert(name, node, true);
        self
    }

    /// Adds a field that may hold `null`
    pub fn with_nullable_field(
        mut self,
        name: impl Into<String>,
        node: impl Into<Arc<SchemaNode>>,
    ) -> Self {
        let name = name.into();
        self.insert(name.clone(), node, false);
        self.nullable.insert(name);
        self
    }

    pub fn with_additional(mut self, node: impl Into<Arc<SchemaNode>>) -> Self {
        self.additional = Some(node.into());
        self
    }

    /// Inserts or overwrites a field, keeping its position if it existed.
    pub fn insert(&mut self, name: impl Into<String>, node: impl Into<Arc<SchemaNode>>, optional: bool) {
        let name = name.into();
        self.nullable.remove(&name);
        if optional {
            self.optional.insert(name.clone());
        } else {
            self.optional.remove(&name);
        }
        self.fields.insert(name, node.into());
    }

    pub fn remove(&mut self, name: &str) -> Option<Arc<SchemaNode>> {
        self.optional.remove(name);
        self.nullable.remove(name);
        self.fields.shift_remove(name)
    }

    pub fn set_optional(&mut self, name: &str, optional: bool) {
        if !self.fields.contains_key(name) {
            return;
        }
        if optional {
            self.optional.insert(name.to_string());
        } else {
            self.optional.remove(name);
        }
    }

    pub fn set_nullable(&mut self, name: &str, nullable: bool) {
        if !self.fields.contains_key(name) {
            return;
        }
        if nullable {
            self.nullable.insert(name.to_string());
        } else {
            self.nullable.remove(name);
        }
    }

    /// Declared field, falling back to the open-object value shape
    pub fn field(&self, name: &str) -> Option<&Arc<SchemaNode>> {
        self.fields.get(name).or(self.additional.as_ref())
    }

    /// Declared field only
    pub fn declared(&self, name: &str) -> Option<&Arc<SchemaNode>> {
        self.fields.get(name)
    }

    pub fn fields(&self) -> impl Iterator<Item = (&str, &Arc<SchemaNode>)> {
        self.fields.iter().map(|(k, v)| (k.as_str(), v))
    }

    pub fn field_names(&self) -> Vec<String> {
        self.fields.keys().cloned().collect()
    }

    pub fn contains(&self, name: &str) -> bool {
        self.fields.contains_key(name)
    }

    pub fn len(&self) -> usize {
        self.fields.len()
    }

    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }

    pub fn is_optional(&self, name: &str) -> bool {
        self.optional.contains(name)
    }

    pub fn is_nullable(&self, name: &str) -> bool {
        self.nullable.contains(name)
    }

    pub fn additional(&self) -> Option<&Arc<SchemaNode>> {
        self.additional.as_ref()
    }

    pub fn is_open(&self) -> bool {
        self.additional.is_some()
    }
}

impl From<ObjectNode> for SchemaNode {
    fn from(object: ObjectNode) -> Self {
        SchemaNode::Object(object)
    }
}

impl SchemaNode {
    pub fn scalar(kind: ScalarKind) -> Self {
        SchemaNode::Scalar(kind)
    }

    pub fn string() -> Self {
        SchemaNode::Scalar(ScalarKind::String)
    }

    pub fn int() -> Self {
        SchemaNode::Scalar(ScalarKind::Int)
    }

    pub fn long() -> Self {
        SchemaNode::Scalar(ScalarKind::Long)
    }

    pub fn double() -> Self {
        SchemaNode::Scalar(ScalarKind::Double)
    }

    pub fn number() -> Self {
        SchemaNode::Scalar(ScalarKind::Number)
    }

    pub fn bool() -> Self {
        SchemaNode::Scalar(ScalarKind::Bool)
    }

    pub fn date() -> Self {
        SchemaNode::Scalar(ScalarKind::Date)
    }

    pub fn object_id() -> Self {
        SchemaNode::Scalar(ScalarKind::ObjectId)
    }

    pub fn null() -> Self {
        SchemaNode::Scalar(ScalarKind::Null)
    }

    pub fn unknown() -> Self {
        SchemaNode::Scalar(ScalarKind::Unknown)
    }

    pub fn array(element: impl Into<Arc<SchemaNode>>) -> Self {
        SchemaNode::Array(element.into())
    }

    pub fn object(object: ObjectNode) -> Self {
        SchemaNode::Object(object)
    }

    /// Looks up a named child of an object node.
    pub fn field_type(&self, name: &str) -> Result<&Arc<SchemaNode>, LookupError> {
        match self {
            SchemaNode::Object(object) => object
                .field(name)
                .ok_or_else(|| LookupError::NotFound(name.to_string())),
            _ => Err(LookupError::NotFound(name.to_string())),
        }
    }

    /// Element type of an array node.
    pub fn element_type(&self) -> Result<&Arc<SchemaNode>, LookupError> {
        match self {
            SchemaNode::Array(element) => Ok(element),
            other => Err(LookupError::NotArray(other.kind_name())),
        }
    }

    pub fn is_optional(&self, name: &str) -> bool {
        self.as_object().map_or(false, |o| o.is_optional(name))
    }

    pub fn is_nullable(&self, name: &str) -> bool {
        self.as_object().map_or(false, |o| o.is_nullable(name))
    }

    pub fn as_object(&self) -> Option<&ObjectNode> {
        match self {
            SchemaNode::Object(object) => Some(object),
            _ => None,
        }
    }

    pub fn as_array(&self) -> Option<&Arc<SchemaNode>> {
        match self {
            SchemaNode::Array(element) => Some(element),
            _ => None,
        }
    }

    pub fn scalar_kind(&self) -> Option<ScalarKind> {
        match self {
            SchemaNode::Scalar(kind) => Some(*kind),
            _ => None,
        }
    }

    pub fn is_unknown(&self) -> bool {
        matches!(self, SchemaNode::Scalar(ScalarKind::Unknown))
    }

    /// Short kind label used in error messages
    pub fn kind_name(&self) -> String {
        match self {
            SchemaNode::Scalar(kind) => kind.name().to_string(),
            SchemaNode::Object(_) => "object".to_string(),
            SchemaNode::Array(element) => format!("array<{}>", element.kind_name()),
        }
    }

    /// Top-level field names, empty for non-objects
    pub fn top_level_fields(&self) -> Vec<String> {
        self.as_object().map(ObjectNode::field_names).unwrap_or_default()
    }
}

impl fmt::Display for SchemaNode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SchemaNode::Scalar(kind) => write!(f, "{}", kind.name()),
            SchemaNode::Array(element) => write!(f, "{}[]", element),
            SchemaNode::Object(object) => {
                if object.is_empty() && !object.is_open() {
                    return write!(f, "{{}}");
                }
                write!(f, "{{ ")?;
                let mut first = true;
                for (name, node) in object.fields() {
                    if !first {
                        write!(f, ", ")?;
                    }
                    first = false;
                    let marker = if object.is_optional(name) { "?" } else { "" };
                    write!(f, "{}{}: {}", name, marker, node)?;
                    if object.is_nullable(name) {
                        write!(f, " | null")?;
                    }
                }
                if let Some(additional) = object.additional() {
                    if !first {
                        write!(f, ", ")?;
                    }
                    write!(f, "[key: string]: {}", additional)?;
                }
                write!(f, " }}")
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn user() -> SchemaNode {
        SchemaNode::object(
            ObjectNode::new()
                .with_field("name", SchemaNode::string())
                .with_optional_field("age", SchemaNode::int())
                .with_nullable_field("nickname", SchemaNode::string())
                .with_field("tags", SchemaNode::array(SchemaNode::string())),
        )
    }

    #[test]
    fn test_field_lookup() {
        let schema = user();
        assert_eq!(**schema.field_type("name").unwrap(), SchemaNode::string());
        assert_eq!(
            schema.field_type("missing"),
            Err(LookupError::NotFound("missing".into()))
        );
    }

    #[test]
    fn test_element_lookup() {
        let schema = user();
        let tags = schema.field_type("tags").unwrap();
        assert_eq!(**tags.element_type().unwrap(), SchemaNode::string());

        let name = schema.field_type("name").unwrap();
        assert_eq!(
            name.element_type(),
            Err(LookupError::NotArray("string".into()))
        );
    }

    #[test]
    fn test_presence_flags() {
        let schema = user();
        assert!(schema.is_optional("age"));
        assert!(!schema.is_optional("name"));
        assert!(schema.is_nullable("nickname"));
        assert!(!SchemaNode::string().is_optional("anything"));
    }

    #[test]
    fn test_open_object_lookup() {
        let meta = SchemaNode::object(ObjectNode::open(SchemaNode::string()));
        assert_eq!(**meta.field_type("whatever").unwrap(), SchemaNode::string());
    }

    #[test]
    fn test_insert_keeps_position() {
        let mut object = ObjectNode::new()
            .with_field("a", SchemaNode::string())
            .with_field("b", SchemaNode::string());
        object.insert("a", SchemaNode::int(), true);
        assert_eq!(object.field_names(), vec!["a", "b"]);
        assert!(object.is_optional("a"));
    }

    #[test]
    fn test_display() {
        assert_eq!(
            user().to_string(),
            "{ name: string, age?: int, nickname: string | null, tags: string[] }"
        );
        assert_eq!(SchemaNode::object(ObjectNode::new()).to_string(), "{}");
    }
}
