use super::atomic::AtomicValue;
use super::node_ref::NodeRef;
use super::pointable::TaggedValue;
use super::tag::ValueTag;
use crate::error::{Error, Result};

/// Unit flowing between iterators: a frozen value or a node inside a tree.
#[derive(Debug, Clone, PartialEq)]
pub enum Item {
    Value(TaggedValue),
    Node(NodeRef),
}

impl Item {
    /// `NodeTree` values become a [`NodeRef`] at their root.
    pub fn from_value(value: TaggedValue) -> Result<Self> {
        if value.tag() == ValueTag::NodeTree {
            NodeRef::root(value).map(Item::Node)
        } else {
            Ok(Item::Value(value))
        }
    }

    /// Tag of the value, or of the node kind for nodes.
    pub fn tag(&self) -> ValueTag {
        match self {
            Item::Value(v) => v.tag(),
            Item::Node(n) => n.kind().tag(),
        }
    }

    pub fn is_node(&self) -> bool {
        matches!(self, Item::Node(_))
    }

    pub fn as_node(&self) -> Option<&NodeRef> {
        match self {
            Item::Node(n) => Some(n),
            Item::Value(_) => None,
        }
    }

    pub fn as_value(&self) -> Option<&TaggedValue> {
        match self {
            Item::Value(v) => Some(v),
            Item::Node(_) => None,
        }
    }

    /// Encoded form; nodes are materialized as node trees.
    pub fn to_value(&self) -> Result<TaggedValue> {
        match self {
            Item::Value(v) => Ok(v.clone()),
            Item::Node(n) => n.materialize(),
        }
    }

    pub fn into_value(self) -> Result<TaggedValue> {
        match self {
            Item::Value(v) => Ok(v),
            Item::Node(n) => n.materialize(),
        }
    }

    /// Decodes an atomic item. Nodes need atomization first.
    pub fn atomic(&self) -> Result<AtomicValue> {
        match self {
            Item::Value(v) => AtomicValue::decode(&v.pointable()),
            Item::Node(n) => Err(Error::type_mismatch("atomic value", n.kind().tag())),
        }
    }
}

impl From<NodeRef> for Item {
    fn from(n: NodeRef) -> Self {
        Item::Node(n)
    }
}
