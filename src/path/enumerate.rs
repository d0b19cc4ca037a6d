//! Enumeration of every valid path into a schema
//!
//! Uses the same depth accounting as resolution, so each pattern resolves
//! once its wildcards are filled in, and nothing deeper is emitted.

use std::fmt;

use indexmap::IndexSet;

use crate::schema::SchemaNode;

use super::resolver::ResolveOptions;
use super::segment::{FieldPath, PathSegment, Placeholder};

/// Placeholder form inside a pattern
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum PlaceholderPattern {
    Bare,
    Unfiltered,
    AnyIdentifier,
}

/// One token of an enumerated path
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum PatternSegment {
    Name(String),
    /// Any array index
    AnyIndex,
    /// Any key of an open object
    AnyKey,
    Placeholder(PlaceholderPattern),
}

impl fmt::Display for PatternSegment {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PatternSegment::Name(name) => write!(f, "{}", name),
            PatternSegment::AnyIndex => write!(f, "<n>"),
            PatternSegment::AnyKey => write!(f, "<key>"),
            PatternSegment::Placeholder(PlaceholderPattern::Bare) => write!(f, "$"),
            PatternSegment::Placeholder(PlaceholderPattern::Unfiltered) => write!(f, "$[]"),
            PatternSegment::Placeholder(PlaceholderPattern::AnyIdentifier) => write!(f, "$[<id>]"),
        }
    }
}

/// An enumerated path, possibly with wildcards
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct PathPattern {
    segments: Vec<PatternSegment>,
}

impl PathPattern {
    pub fn segments(&self) -> &[PatternSegment] {
        &self.segments
    }

    pub fn len(&self) -> usize {
        self.segments.len()
    }

    pub fn is_empty(&self) -> bool {
        self.segments.is_empty()
    }

    /// True if the concrete path is an instance of this pattern.
    pub fn matches(&self, path: &FieldPath) -> bool {
        self.segments.len() == path.len()
            && self
                .segments
                .iter()
                .zip(path.segments())
                .all(|(pattern, segment)| match (pattern, segment) {
                    (PatternSegment::Name(a), PathSegment::Name(b)) => a == b,
                    (PatternSegment::AnyIndex, PathSegment::Index(_)) => true,
                    (PatternSegment::AnyKey, PathSegment::Name(_) | PathSegment::Index(_)) => true,
                    (PatternSegment::Placeholder(p), PathSegment::Placeholder(q)) => matches!(
                        (p, q),
                        (PlaceholderPattern::Bare, Placeholder::Bare)
                            | (PlaceholderPattern::Unfiltered, Placeholder::Unfiltered)
                            | (PlaceholderPattern::AnyIdentifier, Placeholder::Identified(_))
                    ),
                    _ => false,
                })
    }

    /// A concrete path matching this pattern
    pub fn instantiate(&self) -> FieldPath {
        let segments = self
            .segments
            .iter()
            .map(|segment| match segment {
                PatternSegment::Name(name) => PathSegment::Name(name.clone()),
                PatternSegment::AnyIndex => PathSegment::Index(0),
                PatternSegment::AnyKey => PathSegment::Name("anyKey".to_string()),
                PatternSegment::Placeholder(PlaceholderPattern::Bare) => {
                    PathSegment::Placeholder(Placeholder::Bare)
                }
                PatternSegment::Placeholder(PlaceholderPattern::Unfiltered) => {
                    PathSegment::Placeholder(Placeholder::Unfiltered)
                }
                PatternSegment::Placeholder(PlaceholderPattern::AnyIdentifier) => {
                    PathSegment::Placeholder(Placeholder::Identified("elem".to_string()))
                }
            })
            .collect();
        FieldPath::from_segments(segments)
    }
}

impl fmt::Display for PathPattern {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (i, segment) in self.segments.iter().enumerate() {
            if i > 0 {
                write!(f, ".")?;
            }
            write!(f, "{}", segment)?;
        }
        Ok(())
    }
}

struct Enumerator {
    options: ResolveOptions,
    out: IndexSet<PathPattern>,
}

impl Enumerator {
    fn emit(&mut self, prefix: &[PatternSegment], segment: PatternSegment) -> Vec<PatternSegment> {
        let mut segments = prefix.to_vec();
        segments.push(segment);
        self.out.insert(PathPattern {
            segments: segments.clone(),
        });
        segments
    }

    fn visit(&mut self, node: &SchemaNode, prefix: &[PatternSegment], depth: usize) {
        if depth >= self.options.max_depth {
            return;
        }
        match node {
            SchemaNode::Object(object) => {
                for (name, child) in object.fields() {
                    let path = self.emit(prefix, PatternSegment::Name(name.to_string()));
                    self.visit(child, &path, depth + 1);
                }
                if let Some(additional) = object.additional() {
                    let path = self.emit(prefix, PatternSegment::AnyKey);
                    self.visit(additional, &path, depth + 1);
                }
            }
            SchemaNode::Array(element) => {
                if prefix.is_empty() {
                    return;
                }
                let path = self.emit(prefix, PatternSegment::AnyIndex);
                self.visit(element, &path, depth + 1);

                if self.options.allow_placeholders {
                    for form in [
                        PlaceholderPattern::Bare,
                        PlaceholderPattern::Unfiltered,
                        PlaceholderPattern::AnyIdentifier,
                    ] {
                        let path = self.emit(prefix, PatternSegment::Placeholder(form));
                        self.visit(element, &path, depth + 1);
                    }
                }

                // Skip form: element fields are addressed through the array path.
                self.visit(element, prefix, depth + 1);
            }
            SchemaNode::Scalar(_) => {}
        }
    }
}

/// Lists every valid path into `root`, in discovery order, de-duplicated.
pub fn enumerate_paths(root: &SchemaNode, options: ResolveOptions) -> Vec<PathPattern> {
    let mut enumerator = Enumerator {
        options,
        out: IndexSet::new(),
    };
    enumerator.visit(root, &[], 0);
    enumerator.out.into_iter().collect()
}
