//! Built-in operators and functions.
//!
//! Eagerly computed functions implement [`EagerEvaluator`](super::base::EagerEvaluator)
//! and are wrapped in [`Eager`](super::base::Eager) to join a plan; the
//! others stream their results.
pub mod aggregate;
pub mod arithmetic;
pub mod basic;
pub mod cast;
pub mod compare;
pub mod constructors;
pub mod helpers;
pub mod json;
pub mod misc;
pub mod sequences;
pub mod strings;

pub use aggregate::{Avg, Extremum, Sum};
pub use arithmetic::{Arithmetic, ArithmeticOp, arithmetic, numeric_op};
pub use basic::{Concat, Constant, GlobalVariable, IfThenElse, LocalVariable, Range};
pub use cast::{CastAs, CastableAs, cast_atomic, is_castable};
pub use compare::{ComparisonOp, ValueComparison, compare_atomic, value_compare};
pub use constructors::{AttributeConstructor, ConstructorName, ElementConstructor, TextConstructor};
pub use json::{ArrayConstructor, Keys, Members, ObjectConstructor};
pub use misc::{CurrentDateTime, ErrorFn, ImplicitTimezone};
pub use sequences::{
    BooleanFn, Count, DistinctValues, Empty, Exists, IndexOf, InsertBefore, Not, Subsequence,
};
pub use strings::{
    CaseMap, CompareFn, Data, LocalName, Name, NodeName, StringConcat, StringFn, StringJoin,
    StringLength, StringTest, Substring, SubstringMatch,
};
