//! Computed element, attribute and text constructors.
//!
//! Content nodes are deep-copied through [`NodeData`], so names are resolved
//! against their source tree and interned again into the new tree's
//! dictionary.
use super::helpers::{atomize, atomize_one};
use crate::datamodel::{AtomicValue, Item, NodeData, NodeKind, TaggedValue, Value};
use crate::error::{Error, ErrorCode, Result};
use crate::names::QName;
use crate::runtime::base::EagerEvaluator;
use crate::runtime::frame::Frame;
use crate::runtime::iterator::{BoxedIterator, drain_items};

/// Name of a constructed node: fixed, or computed from an expression.
#[derive(Debug)]
pub enum ConstructorName {
    Fixed(QName),
    Computed(BoxedIterator),
}

impl ConstructorName {
    fn resolve(&self, frame: &mut Frame<'_>) -> Result<QName> {
        match self {
            ConstructorName::Fixed(q) => Ok(q.clone()),
            ConstructorName::Computed(it) => match atomize_one(it.as_ref(), frame)? {
                AtomicValue::QName(q) => Ok(q),
                AtomicValue::String(s) | AtomicValue::UntypedAtomic(s) if !s.is_empty() => {
                    Ok(QName::parse(&s, ""))
                }
                other => Err(Error::new(
                    ErrorCode::XPTY0004,
                    format!("{:?} is not a valid node name", other.tag()),
                )),
            },
        }
    }
}

impl From<QName> for ConstructorName {
    fn from(q: QName) -> Self {
        ConstructorName::Fixed(q)
    }
}

/// Space-joined string values of atomized items.
fn joined(items: &[Item]) -> Result<String> {
    let mut out = String::new();
    for (i, item) in items.iter().enumerate() {
        if i > 0 {
            out.push(' ');
        }
        out.push_str(&atomize(item)?.string_value());
    }
    Ok(out)
}

fn push_text(children: &mut Vec<NodeData>, s: &str) {
    if s.is_empty() {
        return;
    }
    if let Some(last) = children.last_mut()
        && last.kind == NodeKind::Text
    {
        last.content.get_or_insert_with(String::new).push_str(s);
        return;
    }
    let mut text = NodeData::new(NodeKind::Text);
    text.content = Some(s.to_owned());
    children.push(text);
}

/// Fills `element` from its content sequence: attributes first, adjacent
/// atomic values joined into text, nodes copied, documents unwrapped.
fn fill_content(element: &mut NodeData, items: Vec<Item>, frame: &Frame<'_>) -> Result<()> {
    let cache = frame.ctx().name_cache();
    let mut pending: Vec<Item> = Vec::new();
    for item in items {
        let node = match item {
            Item::Value(_) => {
                pending.push(item);
                continue;
            }
            Item::Node(node) => node,
        };
        if !pending.is_empty() {
            push_text(&mut element.children, &joined(&pending)?);
            pending.clear();
        }
        let copy = NodeData::decode(&node, cache)?;
        match copy.kind {
            NodeKind::Attribute => {
                if !element.children.is_empty() {
                    return Err(Error::new(
                        ErrorCode::XPTY0004,
                        "attribute node after other element content",
                    ));
                }
                let name = copy.name.clone();
                element.attributes.retain(|a| a.name != name);
                element.attributes.push(copy);
            }
            NodeKind::Document => {
                for child in copy.children {
                    add_child(element, child);
                }
            }
            _ => add_child(element, copy),
        }
    }
    if !pending.is_empty() {
        push_text(&mut element.children, &joined(&pending)?);
    }
    Ok(())
}

fn add_child(element: &mut NodeData, child: NodeData) {
    match (child.kind, child.content.as_deref()) {
        (NodeKind::Text, Some(s)) => push_text(&mut element.children, s),
        (NodeKind::Text, None) => {}
        _ => element.children.push(child),
    }
}

fn create(frame: &Frame<'_>, node: &NodeData) -> Result<TaggedValue> {
    let ctx = frame.ctx();
    ctx.nodes().create(node, frame.pool(), ctx.name_cache())
}

/// `element name { content }`
#[derive(Debug)]
pub struct ElementConstructor {
    name: ConstructorName,
    namespaces: Vec<(String, String)>,
    content: BoxedIterator,
}

impl ElementConstructor {
    pub fn new(name: impl Into<ConstructorName>, content: BoxedIterator) -> Self {
        Self {
            name: name.into(),
            namespaces: Vec::new(),
            content,
        }
    }

    /// Adds an in-scope namespace declaration.
    pub fn with_namespace(mut self, prefix: &str, uri: &str) -> Self {
        self.namespaces.push((prefix.to_owned(), uri.to_owned()));
        self
    }
}

impl EagerEvaluator for ElementConstructor {
    fn evaluate(&self, frame: &mut Frame<'_>) -> Result<TaggedValue> {
        let mut element = NodeData::new(NodeKind::Element);
        element.name = Some(self.name.resolve(frame)?);
        element.namespaces = self
            .namespaces
            .iter()
            .map(|(p, u)| (p.as_str().into(), u.as_str().into()))
            .collect();
        let items = drain_items(self.content.as_ref(), frame)?;
        fill_content(&mut element, items, frame)?;
        create(frame, &element)
    }
}

/// `attribute name { content }` with an `xs:untypedAtomic` value.
#[derive(Debug)]
pub struct AttributeConstructor {
    name: ConstructorName,
    content: BoxedIterator,
}

impl AttributeConstructor {
    pub fn new(name: impl Into<ConstructorName>, content: BoxedIterator) -> Self {
        Self {
            name: name.into(),
            content,
        }
    }
}

impl EagerEvaluator for AttributeConstructor {
    fn evaluate(&self, frame: &mut Frame<'_>) -> Result<TaggedValue> {
        let mut attr = NodeData::new(NodeKind::Attribute);
        attr.name = Some(self.name.resolve(frame)?);
        let items = drain_items(self.content.as_ref(), frame)?;
        attr.value = Some(Box::new(Value::Atomic(AtomicValue::untyped(joined(&items)?))));
        create(frame, &attr)
    }
}

/// `text { content }`; empty content constructs nothing.
#[derive(Debug)]
pub struct TextConstructor {
    content: BoxedIterator,
}

impl TextConstructor {
    pub fn new(content: BoxedIterator) -> Self {
        Self { content }
    }
}

impl EagerEvaluator for TextConstructor {
    fn evaluate(&self, frame: &mut Frame<'_>) -> Result<TaggedValue> {
        let items = drain_items(self.content.as_ref(), frame)?;
        if items.is_empty() {
            return Ok(TaggedValue::empty_sequence());
        }
        let mut text = NodeData::new(NodeKind::Text);
        text.content = Some(joined(&items)?);
        create(frame, &text)
    }
}
