//! Dot path resolution
//!
//! Resolution walks the schema one segment at a time:
//!
//! 1. Object + name: look the field up
//! 2. Array + index: descend into the element
//! 3. Array + placeholder: descend into the element (if enabled)
//! 4. Array + name: skip the array level without consuming the segment
//!
//! Every descent spends one level of the depth budget. A segment that
//! still has to be processed once the budget is spent fails with
//! `DepthExceeded`; nothing is truncated.

use std::sync::Arc;

use crate::schema::{ScalarKind, SchemaNode};

use super::errors::{PathError, PathResult};
use super::segment::{FieldPath, PathSegment};

/// Default traversal depth bound
pub const MAX_PATH_DEPTH: usize = 9;

/// Per-call resolution switches
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ResolveOptions {
    /// Accept `$`, `$[]` and `$[id]`
    pub allow_placeholders: bool,
    /// Wrap values reached through a skipped or placeholder array as arrays
    pub check_in_array: bool,
    /// Maximum number of descents
    pub max_depth: usize,
}

impl Default for ResolveOptions {
    fn default() -> Self {
        Self {
            allow_placeholders: false,
            check_in_array: false,
            max_depth: MAX_PATH_DEPTH,
        }
    }
}

impl ResolveOptions {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_placeholders(mut self, allow: bool) -> Self {
        self.allow_placeholders = allow;
        self
    }

    pub fn with_check_in_array(mut self, check: bool) -> Self {
        self.check_in_array = check;
        self
    }

    pub fn with_max_depth(mut self, max_depth: usize) -> Self {
        self.max_depth = max_depth;
        self
    }
}

/// Outcome of a successful resolution
#[derive(Debug, Clone)]
pub struct ResolvedPath {
    path: FieldPath,
    node: Arc<SchemaNode>,
    traversed_array: bool,
    in_array: bool,
    optional: bool,
    nullable: bool,
    check_in_array: bool,
}

impl ResolvedPath {
    pub fn path(&self) -> &FieldPath {
        &self.path
    }

    pub fn segments(&self) -> &[PathSegment] {
        self.path.segments()
    }

    /// The node reached, never wrapped
    pub fn node(&self) -> &Arc<SchemaNode> {
        &self.node
    }

    /// Any array was unwrapped on the way
    pub fn traversed_array(&self) -> bool {
        self.traversed_array
    }

    /// An array was unwrapped by a skip or a placeholder
    pub fn in_array(&self) -> bool {
        self.in_array
    }

    /// The final field may be absent
    pub fn is_optional(&self) -> bool {
        self.optional
    }

    /// The final field may hold null
    pub fn is_nullable(&self) -> bool {
        self.nullable
    }

    /// Value type at the path.
    ///
    /// With check-in-array semantics a value reached through a skipped or
    /// placeholder array is an array of the leaf type.
    pub fn value_type(&self) -> Arc<SchemaNode> {
        if self.check_in_array && self.in_array {
            Arc::new(SchemaNode::Array(self.node.clone()))
        } else {
            self.node.clone()
        }
    }

    /// Element type if the reached node is an array
    pub fn element_type(&self) -> Option<&Arc<SchemaNode>> {
        self.node.as_array()
    }
}

struct Walk<'p> {
    path: &'p FieldPath,
    options: ResolveOptions,
    traversed_array: bool,
    in_array: bool,
    optional: bool,
    nullable: bool,
}

impl<'p> Walk<'p> {
    fn path_text(&self) -> String {
        self.path.to_string()
    }

    fn check_placeholder(&self, segment: &PathSegment) -> PathResult<()> {
        if self.options.allow_placeholders {
            Ok(())
        } else {
            Err(PathError::PlaceholderNotAllowed {
                path: self.path_text(),
                segment: segment.to_string(),
            })
        }
    }

    fn not_an_array(&self, segment: &PathSegment) -> PathError {
        PathError::NotAnArrayButIndexed {
            path: self.path_text(),
            segment: segment.to_string(),
        }
    }

    fn descend(&mut self, node: &Arc<SchemaNode>, index: usize, depth: usize) -> PathResult<Arc<SchemaNode>> {
        let path: &'p FieldPath = self.path;
        let Some(segment) = path.segments().get(index) else {
            return Ok(node.clone());
        };
        if depth >= self.options.max_depth {
            return Err(PathError::DepthExceeded {
                path: self.path_text(),
                max_depth: self.options.max_depth,
            });
        }

        match (node.as_ref(), segment) {
            (SchemaNode::Array(element), PathSegment::Index(_)) => {
                self.traversed_array = true;
                self.optional = false;
                self.nullable = false;
                self.descend(element, index + 1, depth + 1)
            }
            (SchemaNode::Array(element), PathSegment::Placeholder(_)) => {
                self.check_placeholder(segment)?;
                self.traversed_array = true;
                self.in_array = true;
                self.optional = false;
                self.nullable = false;
                self.descend(element, index + 1, depth + 1)
            }
            (SchemaNode::Array(element), PathSegment::Name(_)) => {
                // Skip the array level; the same segment addresses the element.
                self.traversed_array = true;
                self.in_array = true;
                self.descend(element, index, depth + 1)
            }
            (SchemaNode::Object(object), PathSegment::Name(name)) => {
                let child = object.field(name).ok_or_else(|| PathError::UnknownField {
                    path: self.path_text(),
                    segment: name.clone(),
                })?;
                self.optional = object.is_optional(name) || object.declared(name).is_none();
                self.nullable = object.is_nullable(name);
                let child = child.clone();
                self.descend(&child, index + 1, depth + 1)
            }
            (SchemaNode::Object(object), PathSegment::Index(i)) => {
                // Numeric keys are legal object field names.
                let key = i.to_string();
                let child = object.field(&key).ok_or_else(|| self.not_an_array(segment))?;
                self.optional = object.is_optional(&key) || object.declared(&key).is_none();
                self.nullable = object.is_nullable(&key);
                let child = child.clone();
                self.descend(&child, index + 1, depth + 1)
            }
            (_, PathSegment::Placeholder(_)) => {
                self.check_placeholder(segment)?;
                Err(self.not_an_array(segment))
            }
            // Opaque values admit any further path; the result stays opaque.
            (SchemaNode::Scalar(ScalarKind::Unknown), _) => {
                self.optional = true;
                self.nullable = false;
                Ok(node.clone())
            }
            (SchemaNode::Scalar(_), PathSegment::Index(_)) => Err(self.not_an_array(segment)),
            (SchemaNode::Scalar(_), PathSegment::Name(name)) => Err(PathError::UnknownField {
                path: self.path_text(),
                segment: name.clone(),
            }),
        }
    }
}

/// Resolves an already tokenized path.
pub fn resolve_path(root: &Arc<SchemaNode>, path: &FieldPath, options: ResolveOptions) -> PathResult<ResolvedPath> {
    if path.is_empty() {
        return Err(PathError::MalformedPath {
            path: String::new(),
            reason: "empty path".to_string(),
        });
    }

    let mut walk = Walk {
        path,
        options,
        traversed_array: false,
        in_array: false,
        optional: false,
        nullable: false,
    };
    let node = walk.descend(root, 0, 0)?;
    tracing::trace!(path = %path, node = %node, "path resolved");

    Ok(ResolvedPath {
        path: path.clone(),
        node,
        traversed_array: walk.traversed_array,
        in_array: walk.in_array,
        optional: walk.optional,
        nullable: walk.nullable,
        check_in_array: options.check_in_array,
    })
}

/// Tokenizes and resolves a dot path.
pub fn resolve(root: &Arc<SchemaNode>, path: &str, options: ResolveOptions) -> PathResult<ResolvedPath> {
    let path = FieldPath::parse(path)?;
    resolve_path(root, &path, options)
}
