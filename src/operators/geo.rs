//! GeoJSON shape detection
//!
//! Schema side: which nodes look like GeoJSON geometries or legacy
//! coordinate pairs. Value side: which literals are valid geo arguments.

use serde_json::Value;

use crate::schema::{ScalarKind, SchemaNode};

/// GeoJSON geometry type names
pub const GEOMETRY_TYPES: &[&str] = &[
    "Point",
    "MultiPoint",
    "LineString",
    "MultiLineString",
    "Polygon",
    "MultiPolygon",
    "GeometryCollection",
];

fn is_numeric_scalar(node: &SchemaNode) -> bool {
    node.scalar_kind().map_or(false, |kind| kind.is_numeric())
}

/// `number[]`, the legacy `[lng, lat]` form
pub fn is_coordinate_pair_node(node: &SchemaNode) -> bool {
    node.as_array().map_or(false, |element| is_numeric_scalar(element))
}

/// Object with a string `type` and array `coordinates` or `geometries`
pub fn is_geojson_node(node: &SchemaNode) -> bool {
    let Some(object) = node.as_object() else {
        return false;
    };
    let typed = object
        .declared("type")
        .map_or(false, |t| t.scalar_kind() == Some(ScalarKind::String));
    let shaped = ["coordinates", "geometries"]
        .iter()
        .any(|name| object.declared(name).map_or(false, |n| n.as_array().is_some()));
    typed && shaped
}

/// GeoJSON object whose coordinates are a single position
pub fn is_geojson_point_node(node: &SchemaNode) -> bool {
    is_geojson_node(node)
        && node
            .as_object()
            .and_then(|object| object.declared("coordinates"))
            .map_or(false, |coordinates| is_coordinate_pair_node(coordinates))
}

fn is_number_array(value: &Value, min: usize) -> bool {
    value
        .as_array()
        .map_or(false, |items| items.len() >= min && items.iter().all(Value::is_number))
}

/// `[lng, lat]` literal
pub fn is_coordinate_pair(value: &Value) -> bool {
    is_number_array(value, 2)
}

/// GeoJSON geometry literal of any type
pub fn is_geometry(value: &Value) -> bool {
    let Some(map) = value.as_object() else {
        return false;
    };
    let Some(kind) = map.get("type").and_then(Value::as_str) else {
        return false;
    };
    match kind {
        "Point" => map.get("coordinates").map_or(false, is_coordinate_pair),
        "GeometryCollection" => map
            .get("geometries")
            .and_then(Value::as_array)
            .map_or(false, |items| items.iter().all(is_geometry)),
        other if GEOMETRY_TYPES.contains(&other) => {
            map.get("coordinates").map_or(false, Value::is_array)
        }
        _ => false,
    }
}

/// GeoJSON point literal
pub fn is_point(value: &Value) -> bool {
    is_geometry(value) && value.get("type").and_then(Value::as_str) == Some("Point")
}

/// GeoJSON Polygon or MultiPolygon literal
pub fn is_polygon(value: &Value) -> bool {
    is_geometry(value)
        && matches!(
            value.get("type").and_then(Value::as_str),
            Some("Polygon" | "MultiPolygon")
        )
}

/// Legacy `$geoWithin` shapes: `$box`, `$polygon`, `$center`, `$centerSphere`
pub fn is_legacy_shape(key: &str, value: &Value) -> bool {
    let Some(items) = value.as_array() else {
        return false;
    };
    match key {
        "$box" => items.len() == 2 && items.iter().all(is_coordinate_pair),
        "$polygon" => items.len() >= 3 && items.iter().all(is_coordinate_pair),
        "$center" | "$centerSphere" => {
            items.len() == 2 && is_coordinate_pair(&items[0]) && items[1].is_number()
        }
        _ => false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schema::ObjectNode;
    use serde_json::json;

    fn point_node() -> SchemaNode {
        SchemaNode::object(
            ObjectNode::new()
                .with_field("type", SchemaNode::string())
                .with_field("coordinates", SchemaNode::array(SchemaNode::number())),
        )
    }

    fn polygon_node() -> SchemaNode {
        SchemaNode::object(
            ObjectNode::new()
                .with_field("type", SchemaNode::string())
                .with_field(
                    "coordinates",
                    SchemaNode::array(SchemaNode::array(SchemaNode::array(SchemaNode::number()))),
                ),
        )
    }

    #[test]
    fn test_node_shapes() {
        assert!(is_geojson_point_node(&point_node()));
        assert!(is_geojson_node(&polygon_node()));
        assert!(!is_geojson_point_node(&polygon_node()));
        assert!(is_coordinate_pair_node(&SchemaNode::array(SchemaNode::double())));
        assert!(!is_coordinate_pair_node(&SchemaNode::array(SchemaNode::string())));
        assert!(!is_geojson_node(&SchemaNode::string()));
    }

    #[test]
    fn test_value_shapes() {
        assert!(is_point(&json!({"type": "Point", "coordinates": [1.0, 2.0]})));
        assert!(!is_point(&json!({"type": "Point", "coordinates": "here"})));
        assert!(is_polygon(&json!({"type": "Polygon", "coordinates": [[[0, 0], [1, 1], [0, 1], [0, 0]]]})));
        assert!(!is_geometry(&json!({"type": "Blob", "coordinates": []})));
        assert!(is_legacy_shape("$box", &json!([[0, 0], [1, 1]])));
        assert!(is_legacy_shape("$center", &json!([[0, 0], 5])));
        assert!(!is_legacy_shape("$polygon", &json!([[0, 0], [1, 1]])));
    }
}
