//! The tagged value encoding and its zero-copy views.
pub mod atomic;
pub(crate) mod codec;
pub mod decimal;
pub mod item;
pub mod json;
pub mod node_ref;
pub mod nodes;
pub mod pointable;
pub mod pool;
pub mod sequence;
pub mod storage;
pub mod tag;
pub mod tree;
pub mod value;

pub use atomic::{AtomicValue, IntegerKind};
pub use decimal::Decimal;
pub use item::Item;
pub use json::{ArrayPointable, ObjectPointable};
pub use node_ref::NodeRef;
pub use nodes::{
    AttributeNodePointable, CodedQNamePointable, Dictionary, DocumentNodePointable, ElementFlags,
    ElementNodePointable, NameResolver, NodeChunk, NodeKind, NodeLayout, NodePointable,
    NodeTreeFlags, NodeTreePointable, PINodePointable, TextOrCommentNodePointable,
};
pub use pointable::{Pointable, TaggedValue, TaggedValuePointable};
pub use pool::{PointablePool, Poolable, Pooled};
pub use sequence::{SequenceCursor, SequencePointable};
pub use storage::ValueStorage;
pub use tag::ValueTag;
pub use value::{NodeData, Value};
