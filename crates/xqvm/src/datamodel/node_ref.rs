use super::atomic::AtomicValue;
use super::nodes::{NameResolver, NodeChunk, NodeKind, NodeLayout, NodePointable, NodeTreePointable};
use super::pointable::{TaggedValue, TaggedValuePointable};
use super::tag::ValueTag;
use crate::error::{Error, Result};
use crate::names::{NameCache, NameCode, QName};
use bytes::{BufMut, BytesMut};
use core::cmp::Ordering;
use core::fmt;
use smallvec::SmallVec;
use std::hash::{DefaultHasher, Hash, Hasher};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) struct NodeSpan {
    start: usize,
    len: usize,
}

/// A node addressed inside a shared, frozen node tree.
///
/// Carries the chain of ancestor positions so `parent` and the reverse axes
/// need no back-pointers in the encoding.
#[derive(Clone)]
pub struct NodeRef {
    tree: TaggedValue,
    layout: NodeLayout,
    tree_id: Option<i32>,
    kind: NodeKind,
    node: NodeSpan,
    ancestors: SmallVec<[NodeSpan; 8]>,
}

impl NodeRef {
    /// The root node of a `NodeTree` value.
    pub fn root(tree: TaggedValue) -> Result<Self> {
        let (layout, tree_id, kind, node) = {
            let ntp = NodeTreePointable::new(&tree.pointable())?;
            let root = ntp.root()?;
            let tag = root.tag()?;
            let kind = NodeKind::from_tag(tag).ok_or_else(|| Error::type_mismatch("node", tag))?;
            (
                ntp.layout(),
                ntp.tree_id(),
                kind,
                NodeSpan {
                    start: root.start(),
                    len: root.len(),
                },
            )
        };
        Ok(Self {
            tree,
            layout,
            tree_id,
            kind,
            node,
            ancestors: SmallVec::new(),
        })
    }

    pub(crate) fn descend(&self, start: usize, len: usize) -> Result<Self> {
        let view = TaggedValuePointable::new(self.tree.as_bytes(), start, len)?;
        let tag = view.tag()?;
        let kind = NodeKind::from_tag(tag).ok_or_else(|| Error::type_mismatch("node", tag))?;
        let mut ancestors = self.ancestors.clone();
        ancestors.push(self.node);
        Ok(Self {
            tree: self.tree.clone(),
            layout: self.layout,
            tree_id: self.tree_id,
            kind,
            node: NodeSpan { start, len },
            ancestors,
        })
    }

    pub fn tree(&self) -> &TaggedValue {
        &self.tree
    }

    pub fn tree_id(&self) -> Option<i32> {
        self.tree_id
    }

    pub fn layout(&self) -> NodeLayout {
        self.layout
    }

    pub fn kind(&self) -> NodeKind {
        self.kind
    }

    pub fn depth(&self) -> usize {
        self.ancestors.len()
    }

    /// Byte offset of the node inside its tree; equals pre-order position.
    pub fn offset(&self) -> usize {
        self.node.start
    }

    pub fn pointable(&self) -> TaggedValuePointable<'_> {
        // span was validated against the same buffer at construction
        TaggedValuePointable::new(self.tree.as_bytes(), self.node.start, self.node.len)
            .unwrap_or_default()
    }

    pub fn node(&self) -> Result<NodePointable<'_>> {
        NodePointable::new(&self.pointable(), self.layout)
    }

    pub fn tree_pointable(&self) -> Result<NodeTreePointable<'_>> {
        NodeTreePointable::new(&self.tree.pointable())
    }

    pub fn resolver<'s>(&'s self, cache: &'s NameCache) -> Result<NameResolver<'s>> {
        Ok(self.tree_pointable()?.resolver(cache))
    }

    pub fn parent(&self) -> Option<NodeRef> {
        let mut ancestors = self.ancestors.clone();
        let node = ancestors.pop()?;
        let view = TaggedValuePointable::new(self.tree.as_bytes(), node.start, node.len).ok()?;
        let kind = NodeKind::from_tag(view.tag().ok()?)?;
        Some(Self {
            tree: self.tree.clone(),
            layout: self.layout,
            tree_id: self.tree_id,
            kind,
            node,
            ancestors,
        })
    }

    pub fn children_chunk(&self) -> Result<Option<NodeChunk<'_>>> {
        self.node()?.children()
    }

    pub fn attributes_chunk(&self) -> Result<Option<NodeChunk<'_>>> {
        self.node()?.attributes()
    }

    pub fn child_count(&self) -> Result<usize> {
        Ok(self.children_chunk()?.map_or(0, |c| c.entry_count()))
    }

    pub fn attribute_count(&self) -> Result<usize> {
        Ok(self.attributes_chunk()?.map_or(0, |c| c.entry_count()))
    }

    /// The `i`th child, read straight from the children chunk.
    pub fn child(&self, i: usize) -> Result<NodeRef> {
        self.chunk_entry(self.children_chunk()?, i)
    }

    pub fn attribute(&self, i: usize) -> Result<NodeRef> {
        self.chunk_entry(self.attributes_chunk()?, i)
    }

    fn chunk_entry(&self, chunk: Option<NodeChunk<'_>>, i: usize) -> Result<NodeRef> {
        let chunk = chunk.ok_or_else(|| Error::system(format!("node has no entry {i}")))?;
        let (start, len) = chunk.entry_range(i)?;
        self.descend(start, len)
    }

    /// Position of this node among its parent's children; `None` for roots
    /// and attributes.
    pub fn child_index(&self) -> Result<Option<usize>> {
        if self.kind == NodeKind::Attribute {
            return Ok(None);
        }
        let Some(parent) = self.ancestors.last() else {
            return Ok(None);
        };
        let view = TaggedValuePointable::new(self.tree.as_bytes(), parent.start, parent.len)?;
        let Some(chunk) = NodePointable::new(&view, self.layout)?.children()? else {
            return Ok(None);
        };
        let (mut lo, mut hi) = (0, chunk.entry_count());
        while lo < hi {
            let mid = lo + (hi - lo) / 2;
            let (start, _) = chunk.entry_range(mid)?;
            match start.cmp(&self.node.start) {
                Ordering::Less => lo = mid + 1,
                Ordering::Greater => hi = mid,
                Ordering::Equal => return Ok(Some(mid)),
            }
        }
        Ok(None)
    }

    pub fn children(&self) -> Result<Vec<NodeRef>> {
        (0..self.child_count()?).map(|i| self.child(i)).collect()
    }

    pub fn attributes(&self) -> Result<Vec<NodeRef>> {
        (0..self.attribute_count()?).map(|i| self.attribute(i)).collect()
    }

    pub fn name_code(&self) -> Result<Option<NameCode>> {
        self.node()?.name()
    }

    pub fn name(&self, cache: &NameCache) -> Result<Option<QName>> {
        match self.name_code()? {
            Some(code) => self.resolver(cache)?.resolve(code).map(Some),
            None => Ok(None),
        }
    }

    /// `(namespace uri, local name)` of elements and attributes.
    pub fn expanded_name<'s>(&'s self, cache: &'s NameCache) -> Result<Option<(&'s str, &'s str)>> {
        let Some(code) = self.name_code()? else {
            return Ok(None);
        };
        let resolver = self.resolver(cache)?;
        Ok(Some((resolver.resolve_str(code.uri)?, resolver.resolve_str(code.local)?)))
    }

    /// Concatenated text of all descendant text nodes, or the node's own content.
    pub fn string_value(&self) -> Result<String> {
        match self.node()? {
            NodePointable::Text(t) | NodePointable::Comment(t) => Ok(t.value()?.to_owned()),
            NodePointable::ProcessingInstruction(pi) => Ok(pi.content()?.to_owned()),
            NodePointable::Attribute(a) => {
                let v = a.value()?;
                if v.tag()?.is_string_like() {
                    Ok(v.string()?.to_owned())
                } else {
                    Ok(AtomicValue::decode(&v)?.string_value())
                }
            }
            node @ (NodePointable::Document(_) | NodePointable::Element(_)) => {
                let mut out = String::new();
                let mut stack: SmallVec<[(NodeChunk<'_>, usize); 16]> = SmallVec::new();
                if let Some(chunk) = node.children()? {
                    stack.push((chunk, 0));
                }
                while let Some((chunk, next)) = stack.last_mut() {
                    if *next >= chunk.entry_count() {
                        stack.pop();
                        continue;
                    }
                    let entry = chunk.entry(*next)?;
                    *next += 1;
                    match NodePointable::new(&entry, self.layout)? {
                        NodePointable::Text(t) => out.push_str(t.value()?),
                        NodePointable::Element(e) => {
                            if let Some(children) = e.children()? {
                                stack.push((children, 0));
                            }
                        }
                        _ => {}
                    }
                }
                Ok(out)
            }
        }
    }

    /// Same underlying tree: the same buffer, or equal bytes under the same tree id.
    pub fn same_tree(&self, other: &NodeRef) -> bool {
        let (a, b) = (self.tree.as_bytes(), other.tree.as_bytes());
        core::ptr::eq(a, b) || (self.tree_id.is_some() && self.tree_id == other.tree_id && a == b)
    }

    pub fn is_same_node(&self, other: &NodeRef) -> bool {
        self.node.start == other.node.start && self.same_tree(other)
    }

    fn tree_hash(&self) -> u64 {
        let mut h = DefaultHasher::new();
        self.tree.as_bytes().hash(&mut h);
        h.finish()
    }

    fn tree_address(&self) -> usize {
        self.tree.as_bytes().as_ptr() as usize
    }

    /// Strict total order: byte offset within a tree; tree id, tree hash and
    /// buffer address across trees.
    pub fn compare_document_order(&self, other: &NodeRef) -> Ordering {
        if self.same_tree(other) {
            return self.node.start.cmp(&other.node.start);
        }
        self.tree_id
            .cmp(&other.tree_id)
            .then_with(|| self.tree_hash().cmp(&other.tree_hash()))
            .then_with(|| self.tree_address().cmp(&other.tree_address()))
            .then_with(|| self.tree.len().cmp(&other.tree.len()))
    }

    /// The node as a standalone `NodeTree` value. The root is shared as is;
    /// inner nodes are copied together with the tree header and dictionary.
    pub fn materialize(&self) -> Result<TaggedValue> {
        if self.ancestors.is_empty() {
            return Ok(self.tree.clone());
        }
        let tree = self.tree_pointable()?;
        let preamble = tree.preamble();
        let node = self.pointable().as_slice();
        let mut buf = BytesMut::with_capacity(1 + preamble.len() + node.len());
        buf.put_u8(ValueTag::NodeTree.code());
        buf.put_slice(preamble);
        buf.put_slice(node);
        TaggedValue::from_bytes(buf.freeze())
    }
}

impl PartialEq for NodeRef {
    fn eq(&self, other: &Self) -> bool {
        self.is_same_node(other)
    }
}

impl Eq for NodeRef {}

impl fmt::Debug for NodeRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("NodeRef")
            .field("kind", &self.kind)
            .field("tree_id", &self.tree_id)
            .field("offset", &self.node.start)
            .field("depth", &self.ancestors.len())
            .finish()
    }
}
