//! Aggregation expression operator table
//!
//! Entries declare argument shape and a return rule. Argument shapes are
//! checked structurally; the return rule tells the inferencer how to
//! derive the result type from the argument types.

use crate::schema::ScalarKind;

/// Operator family
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExprCategory {
    Array,
    Boolean,
    Conditional,
    Date,
    Numeric,
    Object,
    String,
    Type,
    Variable,
    Literal,
}

/// Argument shape
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExprArgs {
    /// One expression; a one-element array is unwrapped
    Single,
    /// Array of expressions with bounded arity
    List { min: usize, max: Option<usize> },
    /// One expression or an array with bounded arity
    SingleOrList { min: usize, max: Option<usize> },
    /// Object with named arguments
    Named {
        required: &'static [&'static str],
        optional: &'static [&'static str],
    },
    /// Date expression or `{date, timezone}`
    DateOrNamed,
    /// `[if, then, else]` or `{if, then, else}`
    Cond,
    /// `{branches: [{case, then}], default?}`
    Switch,
    /// `{year, ...}` or `{isoWeekYear, ...}`
    DateFromParts,
    /// Field name string or named arguments
    StringOrNamed {
        required: &'static [&'static str],
        optional: &'static [&'static str],
    },
    /// `{}`
    EmptyObject,
    /// Unevaluated value
    Literal,
}

/// How the result type is derived
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExprReturn {
    Scalar(ScalarKind),
    /// Array of the given scalar
    ArrayOf(ScalarKind),
    /// Array of unknown elements
    UnknownArray,
    /// Same array type as the input argument
    SameArray,
    /// Element type of the input array
    ArrayElement,
    /// Common type of the candidate results
    Common,
    /// Array of the `in` expression type
    MapIn,
    /// Type of the `in` expression
    In,
    /// Merge of object arguments
    MergeObjects,
    /// Object of numeric date parts
    DateParts,
    /// `{match, idx, captures}`
    RegexFind,
    /// Array of `{match, idx, captures}`
    RegexFindAll,
    /// Array of `{k, v}`
    ObjectToArray,
    /// Open object of unknown values
    OpenObject,
    /// Scalar named by the `to` argument
    Convert,
    /// Type of the literal argument
    Literal,
    Unknown,
}

/// One expression operator
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ExprOperator {
    pub name: &'static str,
    pub category: ExprCategory,
    pub args: ExprArgs,
    pub returns: ExprReturn,
}

const fn op(name: &'static str, category: ExprCategory, args: ExprArgs, returns: ExprReturn) -> ExprOperator {
    ExprOperator {
        name,
        category,
        args,
        returns,
    }
}

const fn list(min: usize, max: usize) -> ExprArgs {
    ExprArgs::List { min, max: Some(max) }
}

const fn variadic(min: usize) -> ExprArgs {
    ExprArgs::List { min, max: None }
}

const fn named(required: &'static [&'static str], optional: &'static [&'static str]) -> ExprArgs {
    ExprArgs::Named { required, optional }
}

use ExprArgs::{Cond, DateFromParts, DateOrNamed, EmptyObject, Single, Switch};
use ExprCategory as K;
use ExprReturn as R;
use ScalarKind as S;

const NUM: ExprReturn = R::Scalar(S::Number);
const BOOL: ExprReturn = R::Scalar(S::Bool);
const STR: ExprReturn = R::Scalar(S::String);
const DATE: ExprReturn = R::Scalar(S::Date);

static EXPR_OPERATORS: &[ExprOperator] = &[
    // Array
    op("$arrayElemAt", K::Array, list(2, 2), R::ArrayElement),
    op("$arrayToObject", K::Array, Single, R::OpenObject),
    op("$concatArrays", K::Array, variadic(0), R::SameArray),
    op("$filter", K::Array, named(&["input", "cond"], &["as", "limit"]), R::SameArray),
    op("$first", K::Array, Single, R::ArrayElement),
    op("$last", K::Array, Single, R::ArrayElement),
    op("$firstN", K::Array, named(&["input", "n"], &[]), R::SameArray),
    op("$lastN", K::Array, named(&["input", "n"], &[]), R::SameArray),
    op("$maxN", K::Array, named(&["input", "n"], &[]), R::SameArray),
    op("$minN", K::Array, named(&["input", "n"], &[]), R::SameArray),
    op("$indexOfArray", K::Array, list(2, 4), NUM),
    op("$isArray", K::Array, Single, BOOL),
    op("$map", K::Array, named(&["input", "in"], &["as"]), R::MapIn),
    op("$objectToArray", K::Array, Single, R::ObjectToArray),
    op("$range", K::Array, list(2, 3), R::ArrayOf(S::Number)),
    op("$reduce", K::Array, named(&["input", "initialValue", "in"], &[]), R::In),
    op("$reverseArray", K::Array, Single, R::SameArray),
    op("$size", K::Array, Single, NUM),
    op("$slice", K::Array, list(2, 3), R::SameArray),
    op("$sortArray", K::Array, named(&["input", "sortBy"], &[]), R::SameArray),
    op("$zip", K::Array, named(&["inputs"], &["useLongestLength", "defaults"]), R::UnknownArray),
    op("$in", K::Array, list(2, 2), BOOL),
    op("$allElementsTrue", K::Array, Single, BOOL),
    op("$anyElementTrue", K::Array, Single, BOOL),
    op("$setDifference", K::Array, list(2, 2), R::SameArray),
    op("$setIntersection", K::Array, variadic(0), R::SameArray),
    op("$setUnion", K::Array, variadic(0), R::SameArray),
    op("$setEquals", K::Array, variadic(2), BOOL),
    op("$setIsSubset", K::Array, list(2, 2), BOOL),
    // Boolean and comparison
    op("$and", K::Boolean, variadic(0), BOOL),
    op("$or", K::Boolean, variadic(0), BOOL),
    op("$not", K::Boolean, Single, BOOL),
    op("$eq", K::Boolean, list(2, 2), BOOL),
    op("$ne", K::Boolean, list(2, 2), BOOL),
    op("$gt", K::Boolean, list(2, 2), BOOL),
    op("$gte", K::Boolean, list(2, 2), BOOL),
    op("$lt", K::Boolean, list(2, 2), BOOL),
    op("$lte", K::Boolean, list(2, 2), BOOL),
    op("$isNumber", K::Boolean, Single, BOOL),
    op("$regexMatch", K::Boolean, named(&["input", "regex"], &["options"]), BOOL),
    op("$toBool", K::Boolean, Single, BOOL),
    // Conditional
    op("$cond", K::Conditional, Cond, R::Common),
    op("$ifNull", K::Conditional, variadic(2), R::Common),
    op("$switch", K::Conditional, Switch, R::Common),
    // Date
    op("$dateAdd", K::Date, named(&["startDate", "unit", "amount"], &["timezone"]), DATE),
    op("$dateSubtract", K::Date, named(&["startDate", "unit", "amount"], &["timezone"]), DATE),
    op("$dateFromParts", K::Date, DateFromParts, DATE),
    op(
        "$dateFromString",
        K::Date,
        named(&["dateString"], &["format", "timezone", "onError", "onNull"]),
        DATE,
    ),
    op(
        "$dateTrunc",
        K::Date,
        named(&["date", "unit"], &["binSize", "timezone", "startOfWeek"]),
        DATE,
    ),
    op("$toDate", K::Date, Single, DATE),
    op("$dateToParts", K::Date, named(&["date"], &["timezone", "iso8601"]), R::DateParts),
    op(
        "$dateDiff",
        K::Date,
        named(&["startDate", "endDate", "unit"], &["timezone", "startOfWeek"]),
        NUM,
    ),
    op("$dayOfMonth", K::Date, DateOrNamed, NUM),
    op("$dayOfWeek", K::Date, DateOrNamed, NUM),
    op("$dayOfYear", K::Date, DateOrNamed, NUM),
    op("$hour", K::Date, DateOrNamed, NUM),
    op("$isoDayOfWeek", K::Date, DateOrNamed, NUM),
    op("$isoWeek", K::Date, DateOrNamed, NUM),
    op("$isoWeekYear", K::Date, DateOrNamed, NUM),
    op("$millisecond", K::Date, DateOrNamed, NUM),
    op("$minute", K::Date, DateOrNamed, NUM),
    op("$month", K::Date, DateOrNamed, NUM),
    op("$second", K::Date, DateOrNamed, NUM),
    op("$week", K::Date, DateOrNamed, NUM),
    op("$year", K::Date, DateOrNamed, NUM),
    // Numeric
    op("$abs", K::Numeric, Single, NUM),
    op("$add", K::Numeric, variadic(0), NUM),
    op("$avg", K::Numeric, ExprArgs::SingleOrList { min: 0, max: None }, NUM),
    op("$ceil", K::Numeric, Single, NUM),
    op("$cmp", K::Numeric, list(2, 2), NUM),
    op("$divide", K::Numeric, list(2, 2), NUM),
    op("$exp", K::Numeric, Single, NUM),
    op("$floor", K::Numeric, Single, NUM),
    op("$ln", K::Numeric, Single, NUM),
    op("$log", K::Numeric, list(2, 2), NUM),
    op("$log10", K::Numeric, Single, NUM),
    op("$max", K::Numeric, ExprArgs::SingleOrList { min: 0, max: None }, R::Common),
    op("$min", K::Numeric, ExprArgs::SingleOrList { min: 0, max: None }, R::Common),
    op("$mod", K::Numeric, list(2, 2), NUM),
    op("$multiply", K::Numeric, variadic(0), NUM),
    op("$pow", K::Numeric, list(2, 2), NUM),
    op("$rand", K::Numeric, EmptyObject, NUM),
    op("$round", K::Numeric, ExprArgs::SingleOrList { min: 1, max: Some(2) }, NUM),
    op("$sqrt", K::Numeric, Single, NUM),
    op("$stdDevPop", K::Numeric, ExprArgs::SingleOrList { min: 0, max: None }, NUM),
    op("$stdDevSamp", K::Numeric, ExprArgs::SingleOrList { min: 0, max: None }, NUM),
    op("$subtract", K::Numeric, list(2, 2), NUM),
    op("$sum", K::Numeric, ExprArgs::SingleOrList { min: 0, max: None }, NUM),
    op("$trunc", K::Numeric, ExprArgs::SingleOrList { min: 1, max: Some(2) }, NUM),
    op("$sin", K::Numeric, Single, NUM),
    op("$cos", K::Numeric, Single, NUM),
    op("$tan", K::Numeric, Single, NUM),
    op("$asin", K::Numeric, Single, NUM),
    op("$acos", K::Numeric, Single, NUM),
    op("$atan", K::Numeric, Single, NUM),
    op("$atan2", K::Numeric, list(2, 2), NUM),
    op("$degreesToRadians", K::Numeric, Single, NUM),
    op("$radiansToDegrees", K::Numeric, Single, NUM),
    op("$indexOfBytes", K::Numeric, list(2, 4), NUM),
    op("$indexOfCP", K::Numeric, list(2, 4), NUM),
    op("$strcasecmp", K::Numeric, list(2, 2), NUM),
    op("$strLenBytes", K::Numeric, Single, NUM),
    op("$strLenCP", K::Numeric, Single, NUM),
    op("$toDecimal", K::Numeric, Single, R::Scalar(S::Decimal)),
    op("$toDouble", K::Numeric, Single, R::Scalar(S::Double)),
    op("$toInt", K::Numeric, Single, R::Scalar(S::Int)),
    op("$toLong", K::Numeric, Single, R::Scalar(S::Long)),
    op("$convert", K::Type, named(&["input", "to"], &["onError", "onNull"]), R::Convert),
    // Object
    op("$getField", K::Object, ExprArgs::StringOrNamed { required: &["field"], optional: &["input"] }, R::Unknown),
    op("$mergeObjects", K::Object, ExprArgs::SingleOrList { min: 0, max: None }, R::MergeObjects),
    op("$setField", K::Object, named(&["field", "input", "value"], &[]), R::OpenObject),
    op("$regexFind", K::Object, named(&["input", "regex"], &["options"]), R::RegexFind),
    op("$regexFindAll", K::Object, named(&["input", "regex"], &["options"]), R::RegexFindAll),
    // String
    op("$concat", K::String, variadic(0), STR),
    op("$dateToString", K::String, named(&["date"], &["format", "timezone", "onNull"]), STR),
    op("$ltrim", K::String, named(&["input"], &["chars"]), STR),
    op("$rtrim", K::String, named(&["input"], &["chars"]), STR),
    op("$trim", K::String, named(&["input"], &["chars"]), STR),
    op("$replaceAll", K::String, named(&["input", "find", "replacement"], &[]), STR),
    op("$replaceOne", K::String, named(&["input", "find", "replacement"], &[]), STR),
    op("$split", K::String, list(2, 2), R::ArrayOf(S::String)),
    op("$substr", K::String, list(3, 3), STR),
    op("$substrBytes", K::String, list(3, 3), STR),
    op("$substrCP", K::String, list(3, 3), STR),
    op("$toLower", K::String, Single, STR),
    op("$toUpper", K::String, Single, STR),
    op("$toString", K::String, Single, STR),
    // Type
    op("$toObjectId", K::Type, Single, R::Scalar(S::ObjectId)),
    op("$type", K::Type, Single, STR),
    // Variable
    op("$let", K::Variable, named(&["vars", "in"], &[]), R::In),
    // Literal
    op("$literal", K::Literal, ExprArgs::Literal, R::Literal),
];

pub fn expr_operator(name: &str) -> Option<&'static ExprOperator> {
    EXPR_OPERATORS.iter().find(|entry| entry.name == name)
}

pub fn expr_operators() -> &'static [ExprOperator] {
    EXPR_OPERATORS
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_names_are_unique() {
        let mut names: Vec<_> = expr_operators().iter().map(|e| e.name).collect();
        names.sort_unstable();
        names.dedup();
        assert_eq!(names.len(), expr_operators().len());
    }

    #[test]
    fn test_lookup() {
        let entry = expr_operator("$dateToParts").unwrap();
        assert_eq!(entry.returns, ExprReturn::DateParts);
        assert_eq!(entry.category, ExprCategory::Date);
        assert_eq!(expr_operator("$type").unwrap().returns, ExprReturn::Scalar(ScalarKind::String));
        assert!(expr_operator("$nope").is_none());
    }

    #[test]
    fn test_conditionals_return_common_type() {
        for name in ["$cond", "$ifNull", "$switch"] {
            assert_eq!(expr_operator(name).unwrap().returns, ExprReturn::Common);
        }
    }
}
