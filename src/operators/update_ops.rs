//! Update operator table

use super::capability::Capability;

/// Expected payload shape of an update operator
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UpdatePayload {
    /// A value of the target's type
    Value,
    /// A complete value of the target's type
    InsertValue,
    /// Any numeric literal
    Number,
    /// `{and|or|xor: <int>}`
    Bitwise,
    /// `true` or `{$type: "date"|"timestamp"}`
    CurrentDate,
    /// `""`, `1` or a boolean
    UnsetMarker,
    /// Destination path of the same type
    RenameTarget,
    /// Element value or `{$each, $position, $slice, $sort}`
    Push,
    /// Element value or `{$each}`
    AddToSet,
    /// Element value or a filter over elements
    Pull,
    /// Array of element values
    PullAll,
    /// `1` or `-1`
    Pop,
}

/// One update operator
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct UpdateOperator {
    pub name: &'static str,
    pub capability: Capability,
    /// Target paths may contain `$`, `$[]` or `$[id]`
    pub allow_placeholders: bool,
    /// Target field must be optional
    pub removes_field: bool,
    pub payload: UpdatePayload,
}

const fn op(
    name: &'static str,
    capability: Capability,
    allow_placeholders: bool,
    removes_field: bool,
    payload: UpdatePayload,
) -> UpdateOperator {
    UpdateOperator {
        name,
        capability,
        allow_placeholders,
        removes_field,
        payload,
    }
}

use Capability as C;
use UpdatePayload as P;

static UPDATE_OPERATORS: &[UpdateOperator] = &[
    op("$set", C::Any, true, false, P::Value),
    op("$setOnInsert", C::Any, false, false, P::InsertValue),
    op("$inc", C::Numeric, true, false, P::Number),
    op("$mul", C::Numeric, true, false, P::Number),
    op("$min", C::Numeric, true, false, P::Number),
    op("$max", C::Numeric, true, false, P::Number),
    op("$bit", C::Integer, true, false, P::Bitwise),
    op("$currentDate", C::Date, true, false, P::CurrentDate),
    op("$unset", C::Any, true, true, P::UnsetMarker),
    op("$rename", C::Any, false, true, P::RenameTarget),
    op("$push", C::ArrayOf(&C::Any), false, false, P::Push),
    op("$addToSet", C::ArrayOf(&C::Any), false, false, P::AddToSet),
    op("$pull", C::ArrayOf(&C::Any), false, false, P::Pull),
    op("$pullAll", C::ArrayOf(&C::Any), false, false, P::PullAll),
    op("$pop", C::ArrayOf(&C::Any), false, false, P::Pop),
];

pub fn update_operator(name: &str) -> Option<&'static UpdateOperator> {
    UPDATE_OPERATORS.iter().find(|entry| entry.name == name)
}

pub fn update_operators() -> &'static [UpdateOperator] {
    UPDATE_OPERATORS
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_array_operators_reject_placeholders() {
        for name in ["$push", "$addToSet", "$pull", "$pullAll", "$pop"] {
            let entry = update_operator(name).unwrap();
            assert!(!entry.allow_placeholders, "{}", name);
            assert_eq!(entry.capability, Capability::ArrayOf(&Capability::Any));
        }
    }

    #[test]
    fn test_removing_operators() {
        let removing: Vec<_> = update_operators()
            .iter()
            .filter(|e| e.removes_field)
            .map(|e| e.name)
            .collect();
        assert_eq!(removing, vec!["$unset", "$rename"]);
    }

    #[test]
    fn test_set_on_insert_has_no_placeholders() {
        assert!(!update_operator("$setOnInsert").unwrap().allow_placeholders);
        assert!(update_operator("$set").unwrap().allow_placeholders);
    }
}
