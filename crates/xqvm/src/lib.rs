//! Core of an XQuery-style engine: a tagged binary value format with
//! zero-copy views and builders, and a pull-based runtime that executes
//! compiled iterator plans over it.
//!
//! ```
//! use xqvm::datamodel::tree::{elem, text};
//! use xqvm::{Item, Value};
//!
//! let node = Value::Node(elem("greeting").child(text("hi")).build());
//! let item = Item::from_value(node.to_tagged().unwrap()).unwrap();
//! assert_eq!(item.as_node().unwrap().string_value().unwrap(), "hi");
//! ```
pub mod builders;
pub mod consts;
pub mod datamodel;
pub mod error;
pub mod names;
pub mod runtime;

pub use datamodel::{AtomicValue, Item, NodeRef, TaggedValue, Value, ValueTag};
pub use error::{Error, ErrorCode, Result};
pub use names::{NameCache, QName};
pub use runtime::{DynamicContext, DynamicContextBuilder, Frame, QueryPlan, RegisterAllocator, ResultStream, RuntimeIterator};
