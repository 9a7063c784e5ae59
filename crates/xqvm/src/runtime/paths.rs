//! Axis steps and document order.
use super::base::Lifecycle;
use super::frame::Frame;
use super::functions::helpers::require_node;
use super::iterator::{BoxedIterator, RuntimeIterator};
use super::register::{LocalRegister, RegisterAllocator};
use crate::datamodel::{Item, NodeKind, NodeRef};
use crate::error::{Error, Result};
use crate::names::NameCache;
use compact_str::CompactString;
use core::ops::Range;
use smallvec::SmallVec;
use std::collections::VecDeque;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Axis {
    Child,
    Descendant,
    DescendantOrSelf,
    Attribute,
    SelfAxis,
    Parent,
    Ancestor,
    AncestorOrSelf,
    FollowingSibling,
    PrecedingSibling,
}

impl Axis {
    /// Reverse axes yield nearest nodes first.
    pub fn is_reverse(self) -> bool {
        matches!(
            self,
            Axis::Parent | Axis::Ancestor | Axis::AncestorOrSelf | Axis::PrecedingSibling
        )
    }

    fn principal_kind(self) -> NodeKind {
        match self {
            Axis::Attribute => NodeKind::Attribute,
            _ => NodeKind::Element,
        }
    }
}

/// Name test; `None` parts are wildcards.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct NameTest {
    pub uri: Option<CompactString>,
    pub local: Option<CompactString>,
}

impl NameTest {
    /// `*`
    pub fn any() -> Self {
        Self::default()
    }

    /// Name in no namespace.
    pub fn local(local: &str) -> Self {
        Self {
            uri: Some(CompactString::default()),
            local: Some(local.into()),
        }
    }

    pub fn ns(uri: &str, local: &str) -> Self {
        Self {
            uri: Some(uri.into()),
            local: Some(local.into()),
        }
    }

    /// `prefix:*` once the prefix is bound.
    pub fn any_local(uri: &str) -> Self {
        Self {
            uri: Some(uri.into()),
            local: None,
        }
    }

    /// `*:local`
    pub fn any_namespace(local: &str) -> Self {
        Self {
            uri: None,
            local: Some(local.into()),
        }
    }

    pub fn matches(&self, uri: &str, local: &str) -> bool {
        self.uri.as_deref().is_none_or(|u| u == uri) && self.local.as_deref().is_none_or(|l| l == local)
    }

    fn matches_node(&self, node: &NodeRef, cache: &NameCache) -> Result<bool> {
        Ok(match node.expanded_name(cache)? {
            Some((uri, local)) => self.matches(uri, local),
            None => false,
        })
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum NodeTest {
    /// `node()`
    AnyKind,
    /// `element()`, `text()`, `comment()` and friends.
    Kind(NodeKind),
    /// A name test against the axis' principal node kind.
    Name(NameTest),
    /// `element(name)`, `attribute(name)`
    KindNamed(NodeKind, NameTest),
}

impl NodeTest {
    fn matches(&self, axis: Axis, node: &NodeRef, cache: &NameCache) -> Result<bool> {
        match self {
            NodeTest::AnyKind => Ok(true),
            NodeTest::Kind(kind) => Ok(node.kind() == *kind),
            NodeTest::Name(name) => {
                if node.kind() != axis.principal_kind() {
                    return Ok(false);
                }
                name.matches_node(node, cache)
            }
            NodeTest::KindNamed(kind, name) => {
                if node.kind() != *kind {
                    return Ok(false);
                }
                name.matches_node(node, cache)
            }
        }
    }
}

/// Walks one chunk of a parent node by index, descending into a single
/// entry per pull.
#[derive(Debug)]
struct ChunkCursor {
    parent: NodeRef,
    attributes: bool,
    range: Range<usize>,
    reverse: bool,
}

impl ChunkCursor {
    fn children(parent: NodeRef) -> Result<Self> {
        let range = 0..parent.child_count()?;
        Ok(Self {
            parent,
            attributes: false,
            range,
            reverse: false,
        })
    }

    fn attributes(parent: NodeRef) -> Result<Self> {
        let range = 0..parent.attribute_count()?;
        Ok(Self {
            parent,
            attributes: true,
            range,
            reverse: false,
        })
    }

    fn next(&mut self) -> Result<Option<NodeRef>> {
        let i = if self.reverse {
            self.range.next_back()
        } else {
            self.range.next()
        };
        match i {
            Some(i) if self.attributes => self.parent.attribute(i).map(Some),
            Some(i) => self.parent.child(i).map(Some),
            None => Ok(None),
        }
    }
}

/// Candidates of the axis for one context node.
#[derive(Debug)]
enum AxisCursor {
    /// `self` and `parent`: at most one node.
    Single(Option<NodeRef>),
    /// The next ancestor to yield; its parent follows.
    Ancestors(Option<NodeRef>),
    Chunk(ChunkCursor),
    Descendants {
        pending: Option<NodeRef>,
        stack: SmallVec<[ChunkCursor; 16]>,
    },
}

impl AxisCursor {
    fn new(axis: Axis, node: &NodeRef) -> Result<Self> {
        Ok(match axis {
            Axis::Child => AxisCursor::Chunk(ChunkCursor::children(node.clone())?),
            Axis::Attribute => AxisCursor::Chunk(ChunkCursor::attributes(node.clone())?),
            Axis::SelfAxis => AxisCursor::Single(Some(node.clone())),
            Axis::Parent => AxisCursor::Single(node.parent()),
            Axis::Ancestor => AxisCursor::Ancestors(node.parent()),
            Axis::AncestorOrSelf => AxisCursor::Ancestors(Some(node.clone())),
            Axis::FollowingSibling | Axis::PrecedingSibling => siblings(axis, node)?,
            Axis::Descendant | Axis::DescendantOrSelf => {
                let pending = (axis == Axis::DescendantOrSelf).then(|| node.clone());
                let mut stack = SmallVec::new();
                stack.push(ChunkCursor::children(node.clone())?);
                AxisCursor::Descendants { pending, stack }
            }
        })
    }

    fn next(&mut self) -> Result<Option<NodeRef>> {
        match self {
            AxisCursor::Single(node) => Ok(node.take()),
            AxisCursor::Ancestors(cur) => {
                let next = cur.as_ref().and_then(NodeRef::parent);
                Ok(core::mem::replace(cur, next))
            }
            AxisCursor::Chunk(chunk) => chunk.next(),
            AxisCursor::Descendants { pending, stack } => {
                if let Some(node) = pending.take() {
                    return Ok(Some(node));
                }
                while let Some(top) = stack.last_mut() {
                    let Some(node) = top.next()? else {
                        stack.pop();
                        continue;
                    };
                    if node.kind() == NodeKind::Element {
                        stack.push(ChunkCursor::children(node.clone())?);
                    }
                    return Ok(Some(node));
                }
                Ok(None)
            }
        }
    }
}

fn siblings(axis: Axis, node: &NodeRef) -> Result<AxisCursor> {
    let (Some(at), Some(parent)) = (node.child_index()?, node.parent()) else {
        return Ok(AxisCursor::Single(None));
    };
    let count = parent.child_count()?;
    let (range, reverse) = match axis {
        Axis::FollowingSibling => (at + 1..count, false),
        _ => (0..at, true),
    };
    Ok(AxisCursor::Chunk(ChunkCursor {
        parent,
        attributes: false,
        range,
        reverse,
    }))
}

/// `input/axis::test`, evaluated per input node without reordering.
///
/// Results follow input order and axis direction; wrap the step in
/// [`SortDistinctNodes`] for path semantics.
#[derive(Debug)]
pub struct AxisStep {
    input: BoxedIterator,
    axis: Axis,
    test: NodeTest,
    life: Lifecycle,
    cursor: LocalRegister<AxisCursor>,
}

impl AxisStep {
    pub fn new(alloc: &mut RegisterAllocator, input: BoxedIterator, axis: Axis, test: NodeTest) -> Self {
        Self {
            input,
            axis,
            test,
            life: Lifecycle::new(alloc),
            cursor: alloc.local(),
        }
    }

    pub fn axis(&self) -> Axis {
        self.axis
    }
}

impl RuntimeIterator for AxisStep {
    fn open(&self, frame: &mut Frame<'_>) -> Result<()> {
        self.life.begin(frame);
        self.cursor.clear(frame);
        self.input.open(frame)
    }

    fn next(&self, frame: &mut Frame<'_>) -> Result<Option<Item>> {
        let cache = frame.ctx().name_cache();
        loop {
            if let Some(cursor) = self.cursor.get_mut(frame) {
                if let Some(node) = cursor.next()? {
                    if self.test.matches(self.axis, &node, cache)? {
                        return Ok(Some(Item::Node(node)));
                    }
                    continue;
                }
                self.cursor.clear(frame);
            }
            let Some(item) = self.input.next(frame)? else {
                return Ok(None);
            };
            let cursor = AxisCursor::new(self.axis, require_node(&item)?)?;
            self.cursor.set(frame, cursor);
        }
    }

    fn close(&self, frame: &mut Frame<'_>) {
        if self.life.end(frame) {
            self.cursor.clear(frame);
            self.input.close(frame);
        }
    }
}

/// Sorts its input nodes into document order and drops duplicates.
///
/// The input is drained on the first `next`; atomic items are `XPTY0004`.
#[derive(Debug)]
pub struct SortDistinctNodes {
    input: BoxedIterator,
    life: Lifecycle,
    buffer: LocalRegister<VecDeque<NodeRef>>,
}

impl SortDistinctNodes {
    pub fn new(alloc: &mut RegisterAllocator, input: BoxedIterator) -> Self {
        Self {
            input,
            life: Lifecycle::new(alloc),
            buffer: alloc.local(),
        }
    }

    fn fill(&self, frame: &mut Frame<'_>) -> Result<VecDeque<NodeRef>> {
        let mut nodes = Vec::new();
        while let Some(item) = self.input.next(frame)? {
            match item {
                Item::Node(n) => nodes.push(n),
                Item::Value(v) => return Err(Error::type_mismatch("node", v.tag())),
            }
        }
        Ok(sort_distinct(nodes).into())
    }
}

/// Document order without duplicates.
pub fn sort_distinct(mut nodes: Vec<NodeRef>) -> Vec<NodeRef> {
    nodes.sort_by(NodeRef::compare_document_order);
    nodes.dedup_by(|a, b| a.is_same_node(b));
    nodes
}

impl RuntimeIterator for SortDistinctNodes {
    fn open(&self, frame: &mut Frame<'_>) -> Result<()> {
        self.life.begin(frame);
        self.buffer.clear(frame);
        self.input.open(frame)
    }

    fn next(&self, frame: &mut Frame<'_>) -> Result<Option<Item>> {
        if !self.buffer.is_set(frame) {
            let nodes = self.fill(frame)?;
            self.buffer.set(frame, nodes);
        }
        Ok(self
            .buffer
            .get_mut(frame)
            .and_then(VecDeque::pop_front)
            .map(Item::Node))
    }

    fn close(&self, frame: &mut Frame<'_>) {
        if self.life.end(frame) {
            self.buffer.clear(frame);
            self.input.close(frame);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    #[rstest]
    #[case(NameTest::any(), "urn:a", "x", true)]
    #[case(NameTest::local("x"), "", "x", true)]
    #[case(NameTest::local("x"), "urn:a", "x", false)]
    #[case(NameTest::ns("urn:a", "x"), "urn:a", "x", true)]
    #[case(NameTest::any_local("urn:a"), "urn:a", "y", true)]
    #[case(NameTest::any_local("urn:a"), "urn:b", "y", false)]
    #[case(NameTest::any_namespace("y"), "urn:b", "y", true)]
    #[case(NameTest::any_namespace("y"), "urn:b", "z", false)]
    fn name_test_wildcards(#[case] test: NameTest, #[case] uri: &str, #[case] local: &str, #[case] expected: bool) {
        assert_eq!(test.matches(uri, local), expected);
    }

    #[rstest]
    fn reverse_axes() {
        assert!(Axis::Ancestor.is_reverse());
        assert!(Axis::PrecedingSibling.is_reverse());
        assert!(!Axis::Descendant.is_reverse());
        assert!(!Axis::FollowingSibling.is_reverse());
    }
}
