//! Value-type capabilities
//!
//! A capability is a predicate over schema nodes. Operators name the
//! capability their target field must have.

use std::fmt;

use crate::schema::{ScalarKind, SchemaNode};

use super::geo;

/// Classification of a schema node used to gate operators
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Capability {
    Any,
    Numeric,
    /// Integer-capable numerics
    Integer,
    StringLike,
    /// Dates and timestamps
    Date,
    ArrayOf(&'static Capability),
    /// Legacy `[lng, lat]` pair or GeoJSON point object
    GeoPoint,
    /// GeoJSON point object only
    GeoJsonPoint,
    /// Any GeoJSON geometry object or legacy pair
    GeoShape,
}

impl Capability {
    /// True if `node` has this capability.
    pub fn admits(&self, node: &SchemaNode) -> bool {
        let kind = node.scalar_kind();
        match self {
            Capability::Any => true,
            Capability::Numeric => kind.map_or(false, |k| k.is_numeric()),
            Capability::Integer => kind.map_or(false, |k| k.is_integer()),
            Capability::StringLike => kind == Some(ScalarKind::String),
            Capability::Date => matches!(kind, Some(ScalarKind::Date | ScalarKind::Timestamp)),
            Capability::ArrayOf(inner) => node.as_array().map_or(false, |e| inner.admits(e)),
            Capability::GeoPoint => {
                geo::is_coordinate_pair_node(node) || geo::is_geojson_point_node(node)
            }
            Capability::GeoJsonPoint => geo::is_geojson_point_node(node),
            Capability::GeoShape => geo::is_geojson_node(node) || geo::is_coordinate_pair_node(node),
        }
    }
}

impl fmt::Display for Capability {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Capability::Any => write!(f, "any"),
            Capability::Numeric => write!(f, "numeric"),
            Capability::Integer => write!(f, "integer"),
            Capability::StringLike => write!(f, "string"),
            Capability::Date => write!(f, "date"),
            Capability::ArrayOf(inner) => write!(f, "array<{}>", inner),
            Capability::GeoPoint => write!(f, "geo point"),
            Capability::GeoJsonPoint => write!(f, "GeoJSON point"),
            Capability::GeoShape => write!(f, "GeoJSON shape"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schema::ObjectNode;

    #[test]
    fn test_scalar_capabilities() {
        assert!(Capability::Numeric.admits(&SchemaNode::double()));
        assert!(!Capability::Integer.admits(&SchemaNode::double()));
        assert!(Capability::Integer.admits(&SchemaNode::number()));
        assert!(Capability::StringLike.admits(&SchemaNode::string()));
        assert!(!Capability::StringLike.admits(&SchemaNode::array(SchemaNode::string())));
        assert!(Capability::Date.admits(&SchemaNode::scalar(ScalarKind::Timestamp)));
    }

    #[test]
    fn test_unknown_only_admits_any() {
        let unknown = SchemaNode::unknown();
        assert!(Capability::Any.admits(&unknown));
        assert!(!Capability::Numeric.admits(&unknown));
        assert!(!Capability::StringLike.admits(&unknown));
    }

    #[test]
    fn test_array_capabilities() {
        let ints = SchemaNode::array(SchemaNode::int());
        assert!(Capability::ArrayOf(&Capability::Any).admits(&ints));
        assert!(Capability::ArrayOf(&Capability::Integer).admits(&ints));
        assert!(!Capability::Integer.admits(&ints));
    }

    #[test]
    fn test_geo_capabilities() {
        let pair = SchemaNode::array(SchemaNode::number());
        let point = SchemaNode::object(
            ObjectNode::new()
                .with_field("type", SchemaNode::string())
                .with_field("coordinates", SchemaNode::array(SchemaNode::number())),
        );
        assert!(Capability::GeoPoint.admits(&pair));
        assert!(Capability::GeoPoint.admits(&point));
        assert!(Capability::GeoJsonPoint.admits(&point));
        assert!(!Capability::GeoJsonPoint.admits(&pair));
        assert!(!Capability::GeoShape.admits(&SchemaNode::string()));
    }

    #[test]
    fn test_display() {
        assert_eq!(Capability::ArrayOf(&Capability::Integer).to_string(), "array<integer>");
    }
}
