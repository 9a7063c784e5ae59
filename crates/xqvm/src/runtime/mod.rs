//! Pull-based runtime: registers, frames, the iterator protocol and the
//! iterators that make up query plans.
pub mod base;
pub mod collation;
pub mod context;
pub mod factory;
pub mod flwor;
pub mod frame;
pub mod functions;
pub mod iterator;
pub mod paths;
pub mod plan;
pub mod register;

pub use base::{Eager, EagerEvaluator, Lifecycle};
pub use collation::{
    CodepointCollation, Collation, CollationRegistry, SimpleAccentCollation, SimpleCaseAccentCollation, SimpleCaseCollation,
};
pub use context::{DynamicContext, DynamicContextBuilder};
pub use factory::NodeFactory;
pub use flwor::{
    Binding, BoxedTuple, CountTuple, EmptyOrder, FlworIterator, ForTuple, LetTuple, OrderByTuple, OrderSpec,
    SortDirection, TupleIterator, UnitTuple, WhereTuple,
};
pub use frame::Frame;
pub use iterator::{BoxedIterator, RuntimeIterator, drain_items, drain_to_value, with_open};
pub use paths::{Axis, AxisStep, NameTest, NodeTest, SortDistinctNodes, sort_distinct};
pub use plan::{QueryPlan, ResultStream};
pub use register::{GlobalRegister, LocalRegister, RegisterAllocator, RegisterSet};
