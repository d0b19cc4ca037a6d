//! Query (filter) operator table
//!
//! Each field-level operator names the capability its target field needs
//! and the shape of its argument. Root-level operators live apart, since
//! they do not address a field.

use crate::schema::SchemaNode;

use super::capability::Capability;

/// Expected argument shape of a field-level filter operator
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FilterArgument {
    /// A value of the field's type
    FieldValue,
    /// A value of the field's type, or a regex for string fields
    FieldValueOrPattern,
    /// Array of values of the field's type (or regexes for strings)
    FieldValues,
    Bool,
    /// BSON alias, code, or array of those
    TypeSpec,
    /// Non-negative integer
    Count,
    /// Array of element values
    ElementValues,
    /// Filter applied to each element
    ElementFilter,
    /// String or regex literal
    Pattern,
    /// Regex flags drawn from `imxsu`
    RegexOptions,
    /// `[divisor, remainder]` with a non-zero divisor
    ModPair,
    /// Bit positions, numeric mask or binData
    BitMask,
    /// `$geometry` polygon or a legacy shape
    GeoWithin,
    /// `$geometry` of any GeoJSON type
    Geometry,
    /// Point plus optional distance bounds
    Near,
    /// Non-negative number
    Distance,
    /// Aggregation expression
    Expression,
    /// Opaque JSON schema object
    JsonSchema,
    /// `{}`
    EmptyObject,
    /// Operator object, or regex on strings
    Negation,
}

/// One field-level filter operator
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FilterOperator {
    pub name: &'static str,
    pub capability: Capability,
    pub argument: FilterArgument,
}

const fn op(name: &'static str, capability: Capability, argument: FilterArgument) -> FilterOperator {
    FilterOperator {
        name,
        capability,
        argument,
    }
}

use Capability as C;
use FilterArgument as A;

static FILTER_OPERATORS: &[FilterOperator] = &[
    // Comparison
    op("$eq", C::Any, A::FieldValue),
    op("$ne", C::Any, A::FieldValueOrPattern),
    op("$gt", C::Any, A::FieldValue),
    op("$gte", C::Any, A::FieldValue),
    op("$lt", C::Any, A::FieldValue),
    op("$lte", C::Any, A::FieldValue),
    op("$in", C::Any, A::FieldValues),
    op("$nin", C::Any, A::FieldValues),
    // Element
    op("$exists", C::Any, A::Bool),
    op("$type", C::Any, A::TypeSpec),
    // Array
    op("$size", C::ArrayOf(&C::Any), A::Count),
    op("$all", C::ArrayOf(&C::Any), A::ElementValues),
    op("$elemMatch", C::ArrayOf(&C::Any), A::ElementFilter),
    // Evaluation
    op("$regex", C::StringLike, A::Pattern),
    op("$options", C::StringLike, A::RegexOptions),
    op("$mod", C::Numeric, A::ModPair),
    op("$expr", C::Any, A::Expression),
    op("$jsonSchema", C::Any, A::JsonSchema),
    op("$rand", C::Any, A::EmptyObject),
    // Bitwise
    op("$bitsAllClear", C::Integer, A::BitMask),
    op("$bitsAllSet", C::Integer, A::BitMask),
    op("$bitsAnyClear", C::Integer, A::BitMask),
    op("$bitsAnySet", C::Integer, A::BitMask),
    // Geospatial
    op("$geoWithin", C::GeoShape, A::GeoWithin),
    op("$geoIntersects", C::GeoShape, A::Geometry),
    op("$near", C::GeoPoint, A::Near),
    op("$nearSphere", C::GeoJsonPoint, A::Near),
    op("$maxDistance", C::GeoPoint, A::Distance),
    op("$minDistance", C::GeoPoint, A::Distance),
    // Logical
    op("$not", C::Any, A::Negation),
];

/// Operators valid only at the top level of a filter document
pub const ROOT_FILTER_OPERATORS: &[&str] = &[
    "$and",
    "$or",
    "$nor",
    "$text",
    "$where",
    "$comment",
    "$expr",
    "$jsonSchema",
];

pub fn filter_operator(name: &str) -> Option<&'static FilterOperator> {
    FILTER_OPERATORS.iter().find(|entry| entry.name == name)
}

pub fn filter_operators() -> &'static [FilterOperator] {
    FILTER_OPERATORS
}

/// Field-level operators applicable to `node`
pub fn filter_operators_for(node: &SchemaNode) -> Vec<&'static str> {
    FILTER_OPERATORS
        .iter()
        .filter(|entry| entry.capability.admits(node))
        .map(|entry| entry.name)
        .collect()
}
