//! Owned, exhaustively matchable decoding of tagged values.
use super::atomic::AtomicValue;
use super::json::{ArrayPointable, ObjectPointable};
use super::node_ref::NodeRef;
use super::nodes::{NameResolver, NodeChunk, NodeKind, NodeLayout, NodePointable, NodeTreePointable};
use super::pointable::{TaggedValue, TaggedValuePointable};
use super::sequence::SequencePointable;
use super::storage::ValueStorage;
use super::tag::ValueTag;
use crate::builders::atomic::write_atomic;
use crate::builders::nodes::{NodeTreeOptions, write_tree};
use crate::builders::{ArrayBuilder, ObjectBuilder, SequenceBuilder};
use crate::error::Result;
use crate::names::{NameCache, QName};
use compact_str::CompactString;
use core::fmt;

#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    Atomic(AtomicValue),
    /// Never holds exactly one item once decoded (singleton flattening).
    Sequence(Vec<Value>),
    Node(NodeData),
    Array(Vec<Value>),
    Object(Vec<(String, Value)>),
}

impl Value {
    pub fn empty() -> Self {
        Value::Sequence(Vec::new())
    }

    /// Decodes names through the tree dictionaries only; trees coded against a
    /// name cache need [`Value::decode_with`].
    pub fn decode(v: &TaggedValuePointable<'_>) -> Result<Self> {
        Self::decode_with(v, &NameCache::new())
    }

    pub fn decode_with(v: &TaggedValuePointable<'_>, cache: &NameCache) -> Result<Self> {
        let tag = v.tag()?;
        match tag {
            ValueTag::Sequence => SequencePointable::new(v)?
                .iter()
                .map(|e| Self::decode_with(&e?, cache))
                .collect::<Result<_>>()
                .map(Value::Sequence),
            ValueTag::Array => {
                let array = ArrayPointable::new(v)?;
                (0..array.entry_count())
                    .map(|i| Self::decode_with(&array.entry(i)?, cache))
                    .collect::<Result<_>>()
                    .map(Value::Array)
            }
            ValueTag::Object => {
                let object = ObjectPointable::new(v)?;
                (0..object.entry_count())
                    .map(|i| {
                        Ok((
                            object.key(i)?.to_owned(),
                            Self::decode_with(&object.value(i)?, cache)?,
                        ))
                    })
                    .collect::<Result<_>>()
                    .map(Value::Object)
            }
            ValueTag::NodeTree => {
                let tree = NodeTreePointable::new(v)?;
                let resolver = tree.resolver(cache);
                let root = NodePointable::new(&tree.root()?, tree.layout())?;
                NodeData::decode_pointable(&root, tree.layout(), &resolver, cache).map(Value::Node)
            }
            ValueTag::Document
            | ValueTag::Element
            | ValueTag::Attribute
            | ValueTag::Text
            | ValueTag::Comment
            | ValueTag::ProcessingInstruction => {
                let layout = NodeLayout::default();
                let node = NodePointable::new(v, layout)?;
                NodeData::decode_pointable(&node, layout, &NameResolver::new(None, cache), cache)
                    .map(Value::Node)
            }
            _ => AtomicValue::decode(v).map(Value::Atomic),
        }
    }

    pub fn decode_value(v: &TaggedValue) -> Result<Self> {
        Self::decode(&v.pointable())
    }

    /// Writes the value through the builders. Nodes become self-contained
    /// trees with a dictionary.
    pub fn write_to(&self, out: &mut ValueStorage) -> Result<()> {
        match self {
            Value::Atomic(a) => write_atomic(out, a),
            Value::Sequence(items) => {
                let mut seq = SequenceBuilder::new();
                let mut scratch = ValueStorage::new();
                for item in items {
                    scratch.reset();
                    item.write_to(&mut scratch)?;
                    seq.add_item(&scratch.pointable_from(0)?)?;
                }
                seq.finish(out)
            }
            Value::Node(node) => {
                let tree = write_tree(node, &NodeTreeOptions::default(), None)?;
                out.put_slice(tree.as_bytes());
                Ok(())
            }
            Value::Array(members) => {
                let mut array = ArrayBuilder::new();
                let mut scratch = ValueStorage::new();
                for member in members {
                    scratch.reset();
                    member.write_to(&mut scratch)?;
                    array.add_item(&scratch.pointable_from(0)?)?;
                }
                array.finish(out)
            }
            Value::Object(entries) => {
                let mut object = ObjectBuilder::new();
                let mut scratch = ValueStorage::new();
                for (key, value) in entries {
                    scratch.reset();
                    value.write_to(&mut scratch)?;
                    object.add_item(key, &scratch.pointable_from(0)?)?;
                }
                object.finish(out)
            }
        }
    }

    pub fn to_tagged(&self) -> Result<TaggedValue> {
        let mut out = ValueStorage::new();
        self.write_to(&mut out)?;
        out.freeze()
    }
}

impl From<AtomicValue> for Value {
    fn from(a: AtomicValue) -> Self {
        Value::Atomic(a)
    }
}

impl From<NodeData> for Value {
    fn from(n: NodeData) -> Self {
        Value::Node(n)
    }
}

/// Decoded node with resolved names.
///
/// Processing instructions keep their target as the local part of `name`.
#[derive(Debug, Clone, PartialEq)]
pub struct NodeData {
    pub kind: NodeKind,
    pub name: Option<QName>,
    pub type_name: Option<QName>,
    pub node_id: Option<i32>,
    /// `(prefix, uri)` declarations of elements.
    pub namespaces: Vec<(CompactString, CompactString)>,
    pub attributes: Vec<NodeData>,
    pub children: Vec<NodeData>,
    /// Text, comment and PI content.
    pub content: Option<String>,
    /// Typed value of attributes.
    pub value: Option<Box<Value>>,
}

impl NodeData {
    pub fn new(kind: NodeKind) -> Self {
        Self {
            kind,
            name: None,
            type_name: None,
            node_id: None,
            namespaces: Vec::new(),
            attributes: Vec::new(),
            children: Vec::new(),
            content: None,
            value: None,
        }
    }

    pub fn decode(node: &NodeRef, cache: &NameCache) -> Result<Self> {
        let resolver = node.resolver(cache)?;
        Self::decode_pointable(&node.node()?, node.layout(), &resolver, cache)
    }

    fn decode_pointable(
        node: &NodePointable<'_>,
        layout: NodeLayout,
        names: &NameResolver<'_>,
        cache: &NameCache,
    ) -> Result<Self> {
        let mut data = Self::new(node.kind());
        data.node_id = node.local_node_id()?;
        let decode_chunk = |chunk: Option<NodeChunk<'_>>| -> Result<Vec<NodeData>> {
            let Some(chunk) = chunk else {
                return Ok(Vec::new());
            };
            (0..chunk.entry_count())
                .map(|i| {
                    let child = NodePointable::new(&chunk.entry(i)?, layout)?;
                    Self::decode_pointable(&child, layout, names, cache)
                })
                .collect()
        };
        match node {
            NodePointable::Document(d) => {
                data.children = decode_chunk(Some(d.content()?))?;
            }
            NodePointable::Element(e) => {
                data.name = Some(names.resolve(e.name()?)?);
                data.type_name = e.type_name()?.map(|t| names.resolve(t)).transpose()?;
                for i in 0..e.namespace_count()? {
                    let (prefix, uri) = e.namespace(i)?;
                    data.namespaces
                        .push((names.resolve_str(prefix)?.into(), names.resolve_str(uri)?.into()));
                }
                data.attributes = decode_chunk(e.attributes()?)?;
                data.children = decode_chunk(e.children()?)?;
            }
            NodePointable::Attribute(a) => {
                data.name = Some(names.resolve(a.name()?)?);
                data.type_name = a.type_name()?.map(|t| names.resolve(t)).transpose()?;
                data.value = Some(Box::new(Value::decode_with(&a.value()?, cache)?));
            }
            NodePointable::Text(t) | NodePointable::Comment(t) => {
                data.content = Some(t.value()?.to_owned());
            }
            NodePointable::ProcessingInstruction(pi) => {
                data.name = Some(QName::local(pi.target()?));
                data.content = Some(pi.content()?.to_owned());
            }
        }
        Ok(data)
    }

    /// Concatenated descendant text, or the node's own content.
    pub fn string_value(&self) -> String {
        match self.kind {
            NodeKind::Document | NodeKind::Element => {
                let mut out = String::new();
                let mut stack: Vec<&NodeData> = self.children.iter().rev().collect();
                while let Some(n) = stack.pop() {
                    match n.kind {
                        NodeKind::Text => out.push_str(n.content.as_deref().unwrap_or_default()),
                        NodeKind::Element => stack.extend(n.children.iter().rev()),
                        _ => {}
                    }
                }
                out
            }
            NodeKind::Attribute => match (&self.value, &self.content) {
                (Some(v), _) => v.to_string(),
                (None, c) => c.clone().unwrap_or_default(),
            },
            _ => self.content.clone().unwrap_or_default(),
        }
    }
}

fn escape(s: &str, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    for c in s.chars() {
        match c {
            '<' => f.write_str("&lt;")?,
            '&' => f.write_str("&amp;")?,
            '"' => f.write_str("&quot;")?,
            c => write!(f, "{c}")?,
        }
    }
    Ok(())
}

impl fmt::Display for NodeData {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = self.name.as_ref().map(ToString::to_string).unwrap_or_default();
        match self.kind {
            NodeKind::Document => self.children.iter().try_for_each(|c| write!(f, "{c}")),
            NodeKind::Element => {
                write!(f, "<{name}")?;
                for (prefix, uri) in &self.namespaces {
                    if prefix.is_empty() {
                        write!(f, " xmlns=\"{uri}\"")?;
                    } else {
                        write!(f, " xmlns:{prefix}=\"{uri}\"")?;
                    }
                }
                for a in &self.attributes {
                    write!(f, " {a}")?;
                }
                if self.children.is_empty() {
                    return f.write_str("/>");
                }
                f.write_str(">")?;
                for c in &self.children {
                    write!(f, "{c}")?;
                }
                write!(f, "</{name}>")
            }
            NodeKind::Attribute => {
                write!(f, "{name}=\"")?;
                escape(&self.string_value(), f)?;
                f.write_str("\"")
            }
            NodeKind::Text => escape(self.content.as_deref().unwrap_or_default(), f),
            NodeKind::Comment => write!(f, "<!--{}-->", self.content.as_deref().unwrap_or_default()),
            NodeKind::ProcessingInstruction => {
                write!(f, "<?{name} {}?>", self.content.as_deref().unwrap_or_default())
            }
        }
    }
}

fn write_list(f: &mut fmt::Formatter<'_>, open: &str, items: &[Value], close: &str) -> fmt::Result {
    f.write_str(open)?;
    for (i, item) in items.iter().enumerate() {
        if i > 0 {
            f.write_str(", ")?;
        }
        write!(f, "{item}")?;
    }
    f.write_str(close)
}

/// Debug rendering only; serialization is the caller's business.
impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Atomic(AtomicValue::String(s)) => write!(f, "{s:?}"),
            Value::Atomic(a) => f.write_str(&a.string_value()),
            Value::Sequence(items) => write_list(f, "(", items, ")"),
            Value::Node(n) => write!(f, "{n}"),
            Value::Array(items) => write_list(f, "[", items, "]"),
            Value::Object(entries) => {
                f.write_str("{")?;
                for (i, (k, v)) in entries.iter().enumerate() {
                    if i > 0 {
                        f.write_str(", ")?;
                    }
                    write!(f, "{k:?}: {v}")?;
                }
                f.write_str("}")
            }
        }
    }
}
