//! Accumulator table for `$group`, `$bucket` and `$setWindowFields`

/// Argument shape of an accumulator
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AccumulatorArgs {
    /// A single expression
    Expression,
    /// `{}`
    EmptyObject,
    /// Object with named arguments
    Named {
        required: &'static [&'static str],
        optional: &'static [&'static str],
    },
}

/// Output type rule
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AccumulatorOutput {
    Number,
    /// Array of the inner expression type
    ArrayOfInner,
    /// The inner expression type
    Inner,
}

/// One accumulator
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Accumulator {
    pub name: &'static str,
    pub args: AccumulatorArgs,
    /// Named argument holding the inner expression; `None` means the
    /// whole argument is the expression.
    pub inner: Option<&'static str>,
    pub output: AccumulatorOutput,
    /// Only valid inside `$setWindowFields`
    pub window_only: bool,
}

const fn acc(
    name: &'static str,
    args: AccumulatorArgs,
    inner: Option<&'static str>,
    output: AccumulatorOutput,
    window_only: bool,
) -> Accumulator {
    Accumulator {
        name,
        args,
        inner,
        output,
        window_only,
    }
}

const fn named(required: &'static [&'static str], optional: &'static [&'static str]) -> AccumulatorArgs {
    AccumulatorArgs::Named { required, optional }
}

use AccumulatorArgs::{EmptyObject, Expression};
use AccumulatorOutput::{ArrayOfInner, Inner, Number};

static ACCUMULATORS: &[Accumulator] = &[
    acc("$sum", Expression, None, Number, false),
    acc("$avg", Expression, None, Number, false),
    acc("$stdDevPop", Expression, None, Number, false),
    acc("$stdDevSamp", Expression, None, Number, false),
    acc("$count", EmptyObject, None, Number, false),
    acc("$push", Expression, None, ArrayOfInner, false),
    acc("$addToSet", Expression, None, ArrayOfInner, false),
    acc("$first", Expression, None, Inner, false),
    acc("$last", Expression, None, Inner, false),
    acc("$min", Expression, None, Inner, false),
    acc("$max", Expression, None, Inner, false),
    acc("$mergeObjects", Expression, None, Inner, false),
    acc("$firstN", named(&["input", "n"], &[]), Some("input"), ArrayOfInner, false),
    acc("$lastN", named(&["input", "n"], &[]), Some("input"), ArrayOfInner, false),
    acc("$minN", named(&["input", "n"], &[]), Some("input"), ArrayOfInner, false),
    acc("$maxN", named(&["input", "n"], &[]), Some("input"), ArrayOfInner, false),
    acc("$top", named(&["output", "sortBy"], &[]), Some("output"), Inner, false),
    acc("$bottom", named(&["output", "sortBy"], &[]), Some("output"), Inner, false),
    acc("$topN", named(&["output", "n", "sortBy"], &[]), Some("output"), ArrayOfInner, false),
    acc("$bottomN", named(&["output", "n", "sortBy"], &[]), Some("output"), ArrayOfInner, false),
    // Window functions
    acc("$rank", EmptyObject, None, Number, true),
    acc("$denseRank", EmptyObject, None, Number, true),
    acc("$documentNumber", EmptyObject, None, Number, true),
    acc("$shift", named(&["output", "by"], &["default"]), Some("output"), Inner, true),
    acc("$derivative", named(&["input"], &["unit"]), Some("input"), Number, true),
    acc("$integral", named(&["input"], &["unit"]), Some("input"), Number, true),
    acc("$expMovingAvg", named(&["input"], &["N", "alpha"]), Some("input"), Number, true),
    acc("$covariancePop", Expression, None, Number, true),
    acc("$covarianceSamp", Expression, None, Number, true),
    acc("$locf", Expression, None, Inner, true),
    acc("$linearFill", Expression, None, Number, true),
];

pub fn accumulator(name: &str) -> Option<&'static Accumulator> {
    ACCUMULATORS.iter().find(|entry| entry.name == name)
}

pub fn accumulators() -> &'static [Accumulator] {
    ACCUMULATORS
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_group_accumulators() {
        let sum = accumulator("$sum").unwrap();
        assert_eq!(sum.output, AccumulatorOutput::Number);
        assert!(!sum.window_only);
        let top_n = accumulator("$topN").unwrap();
        assert_eq!(top_n.inner, Some("output"));
        assert_eq!(top_n.output, AccumulatorOutput::ArrayOfInner);
    }

    #[test]
    fn test_window_only() {
        assert!(accumulator("$rank").unwrap().window_only);
        assert!(accumulator("$shift").unwrap().window_only);
        assert!(accumulator("$concat").is_none());
    }
}
