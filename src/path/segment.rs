//! Dot path tokens
//!
//! `a.0.b` is `Name(a) Index(0) Name(b)`. The positional operators `$`,
//! `$[]` and `$[id]` become placeholders. Array filter identifiers must
//! start with a lowercase letter and contain only letters and digits.

use std::fmt;
use std::str::FromStr;
use std::sync::OnceLock;

use regex::Regex;

use super::errors::{PathError, PathResult};

static IDENTIFIER: OnceLock<Option<Regex>> = OnceLock::new();

/// True if `text` is a valid array filter identifier.
pub fn is_identifier(text: &str) -> bool {
    IDENTIFIER
        .get_or_init(|| Regex::new(r"^[a-z][a-zA-Z0-9]*$").ok())
        .as_ref()
        .map_or(false, |re| re.is_match(text))
}

/// Positional array token
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Placeholder {
    /// `$`: the first element matched by the query
    Bare,
    /// `$[]`: every element
    Unfiltered,
    /// `$[id]`: elements matched by the named array filter
    Identified(String),
}

impl fmt::Display for Placeholder {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Placeholder::Bare => write!(f, "$"),
            Placeholder::Unfiltered => write!(f, "$[]"),
            Placeholder::Identified(id) => write!(f, "$[{}]", id),
        }
    }
}

/// One token of a dot path
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum PathSegment {
    Name(String),
    Index(usize),
    Placeholder(Placeholder),
}

impl PathSegment {
    fn parse(path: &str, text: &str) -> PathResult<Self> {
        let malformed = |reason: &str| PathError::MalformedPath {
            path: path.to_string(),
            reason: reason.to_string(),
        };

        if text.is_empty() {
            return Err(malformed("empty segment"));
        }
        if text == "$" {
            return Ok(PathSegment::Placeholder(Placeholder::Bare));
        }
        if text == "$[]" {
            return Ok(PathSegment::Placeholder(Placeholder::Unfiltered));
        }
        if let Some(inner) = text.strip_prefix("$[").and_then(|t| t.strip_suffix(']')) {
            if is_identifier(inner) {
                return Ok(PathSegment::Placeholder(Placeholder::Identified(inner.to_string())));
            }
            return Err(malformed(&format!("invalid array filter identifier '{}'", inner)));
        }
        if text.starts_with('$') {
            return Err(malformed(&format!("segment '{}' starts with '$'", text)));
        }
        if text.bytes().all(|b| b.is_ascii_digit()) {
            if let Ok(index) = text.parse::<usize>() {
                return Ok(PathSegment::Index(index));
            }
        }
        Ok(PathSegment::Name(text.to_string()))
    }

    pub fn is_placeholder(&self) -> bool {
        matches!(self, PathSegment::Placeholder(_))
    }
}

impl fmt::Display for PathSegment {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PathSegment::Name(name) => write!(f, "{}", name),
            PathSegment::Index(index) => write!(f, "{}", index),
            PathSegment::Placeholder(placeholder) => write!(f, "{}", placeholder),
        }
    }
}

/// A tokenized dot path
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct FieldPath {
    segments: Vec<PathSegment>,
}

impl FieldPath {
    /// Tokenizes a dot path.
    pub fn parse(text: &str) -> PathResult<Self> {
        if text.is_empty() {
            return Err(PathError::MalformedPath {
                path: String::new(),
                reason: "empty path".to_string(),
            });
        }
        let segments = text
            .split('.')
            .map(|part| PathSegment::parse(text, part))
            .collect::<PathResult<Vec<_>>>()?;
        Ok(Self { segments })
    }

    pub fn from_segments(segments: Vec<PathSegment>) -> Self {
        Self { segments }
    }

    pub fn segments(&self) -> &[PathSegment] {
        &self.segments
    }

    pub fn len(&self) -> usize {
        self.segments.len()
    }

    pub fn is_empty(&self) -> bool {
        self.segments.is_empty()
    }

    pub fn has_placeholder(&self) -> bool {
        self.segments.iter().any(PathSegment::is_placeholder)
    }

    /// Top-level field name, if the path starts with a name
    pub fn head(&self) -> Option<&str> {
        match self.segments.first() {
            Some(PathSegment::Name(name)) => Some(name),
            _ => None,
        }
    }

    /// True if `self` equals `other` or is one of its ancestors.
    pub fn is_prefix_of(&self, other: &FieldPath) -> bool {
        self.segments.len() <= other.segments.len()
            && self.segments.iter().zip(&other.segments).all(|(a, b)| a == b)
    }
}

impl FromStr for FieldPath {
    type Err = PathError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        FieldPath::parse(s)
    }
}

impl fmt::Display for FieldPath {
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

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_names_and_indices() {
        let path = FieldPath::parse("roles.0.name").unwrap();
        assert_eq!(
            path.segments(),
            &[
                PathSegment::Name("roles".into()),
                PathSegment::Index(0),
                PathSegment::Name("name".into()),
            ]
        );
        assert_eq!(path.to_string(), "roles.0.name");
    }

    #[test]
    fn test_parse_placeholders() {
        let path = FieldPath::parse("a.$.b.$[].c.$[elem]").unwrap();
        assert_eq!(path.segments()[1], PathSegment::Placeholder(Placeholder::Bare));
        assert_eq!(path.segments()[3], PathSegment::Placeholder(Placeholder::Unfiltered));
        assert_eq!(
            path.segments()[5],
            PathSegment::Placeholder(Placeholder::Identified("elem".into()))
        );
        assert!(path.has_placeholder());
        assert_eq!(path.to_string(), "a.$.b.$[].c.$[elem]");
    }

    #[test]
    fn test_rejects_malformed() {
        assert!(matches!(FieldPath::parse(""), Err(PathError::MalformedPath { .. })));
        assert!(matches!(FieldPath::parse("a..b"), Err(PathError::MalformedPath { .. })));
        assert!(matches!(FieldPath::parse("a.$[Bad]"), Err(PathError::MalformedPath { .. })));
        assert!(matches!(FieldPath::parse("$name"), Err(PathError::MalformedPath { .. })));
    }

    #[test]
    fn test_identifier_rules() {
        assert!(is_identifier("elem"));
        assert!(is_identifier("x1Y"));
        assert!(!is_identifier("1x"));
        assert!(!is_identifier("Elem"));
        assert!(!is_identifier("el_em"));
    }

    #[test]
    fn test_prefix() {
        let a = FieldPath::parse("a").unwrap();
        let ab = FieldPath::parse("a.b").unwrap();
        let ac = FieldPath::parse("ac").unwrap();
        assert!(a.is_prefix_of(&ab));
        assert!(!ab.is_prefix_of(&a));
        assert!(!a.is_prefix_of(&ac));
    }
}
