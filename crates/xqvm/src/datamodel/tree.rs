//! Fluent construction of [`NodeData`] trees, mostly for tests and fixtures.
//!
//! ```
//! use xqvm::datamodel::tree::{attr, doc, elem, text};
//! let d = doc()
//!     .child(elem("root").attr(attr("id", "1")).child(text("hello")))
//!     .build();
//! assert_eq!(d.string_value(), "hello");
//! ```
use super::atomic::AtomicValue;
use super::nodes::NodeKind;
use super::value::{NodeData, Value};
use crate::names::QName;

#[derive(Debug, Clone)]
pub struct NodeBuilder {
    node: NodeData,
}

impl NodeBuilder {
    fn new(kind: NodeKind, name: Option<QName>) -> Self {
        let mut node = NodeData::new(kind);
        node.name = name;
        Self { node }
    }

    pub fn child(mut self, child: impl Into<NodeData>) -> Self {
        self.node.children.push(child.into());
        self
    }

    pub fn children<I: IntoIterator<Item = NodeData>>(mut self, it: I) -> Self {
        self.node.children.extend(it);
        self
    }

    pub fn attr(mut self, attr: NodeData) -> Self {
        debug_assert!(attr.kind == NodeKind::Attribute);
        self.node.attributes.push(attr);
        self
    }

    pub fn namespace(mut self, prefix: &str, uri: &str) -> Self {
        self.node.namespaces.push((prefix.into(), uri.into()));
        self
    }

    pub fn typed(mut self, type_name: QName) -> Self {
        self.node.type_name = Some(type_name);
        self
    }

    pub fn build(self) -> NodeData {
        self.node
    }
}

impl From<NodeBuilder> for NodeData {
    fn from(b: NodeBuilder) -> Self {
        b.build()
    }
}

pub fn doc() -> NodeBuilder {
    NodeBuilder::new(NodeKind::Document, None)
}

pub fn elem(name: &str) -> NodeBuilder {
    NodeBuilder::new(NodeKind::Element, Some(QName::parse(name, "")))
}

pub fn elem_ns(uri: &str, name: &str) -> NodeBuilder {
    NodeBuilder::new(NodeKind::Element, Some(QName::parse(name, uri)))
}

pub fn text(v: &str) -> NodeData {
    leaf(NodeKind::Text, None, v)
}

pub fn comment(v: &str) -> NodeData {
    leaf(NodeKind::Comment, None, v)
}

pub fn pi(target: &str, data: &str) -> NodeData {
    leaf(NodeKind::ProcessingInstruction, Some(QName::local(target)), data)
}

/// Attribute with an `xs:untypedAtomic` value.
pub fn attr(name: &str, v: &str) -> NodeData {
    attr_typed(name, AtomicValue::untyped(v))
}

pub fn attr_typed(name: &str, v: AtomicValue) -> NodeData {
    let mut node = NodeData::new(NodeKind::Attribute);
    node.name = Some(QName::parse(name, ""));
    node.value = Some(Box::new(Value::Atomic(v)));
    node
}

fn leaf(kind: NodeKind, name: Option<QName>, v: &str) -> NodeData {
    let mut node = NodeData::new(kind);
    node.name = name;
    node.content = Some(v.to_owned());
    node
}
