//! Views over encoded node trees.
//!
//! A node tree is `[NodeTree][header]{tree-id?}{dictionary?}{root}`. The
//! header bits decide which optional fields every node inside the tree
//! carries, so node views take the tree's [`NodeLayout`] alongside their bytes.
use super::codec;
use super::pointable::TaggedValuePointable;
use super::sequence::Slotted;
use super::tag::ValueTag;
use crate::error::{Error, Result};
use crate::names::{NameCache, NameCode, QName};
use bitflags::bitflags;
use core::cmp::Ordering;

bitflags! {
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
    pub struct NodeTreeFlags: u8 {
        const NODE_ID = 1 << 0;
        const DICTIONARY = 1 << 1;
        const TYPE = 1 << 2;
    }
}

bitflags! {
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
    pub struct ElementFlags: u8 {
        const NS_CHUNK = 1 << 0;
        const ATTRIBUTES_CHUNK = 1 << 1;
        const CHILDREN_CHUNK = 1 << 2;
    }
}

/// Optional per-node fields, fixed for a whole tree.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct NodeLayout {
    pub node_ids: bool,
    pub types: bool,
}

impl NodeLayout {
    pub fn from_flags(flags: NodeTreeFlags) -> Self {
        Self {
            node_ids: flags.contains(NodeTreeFlags::NODE_ID),
            types: flags.contains(NodeTreeFlags::TYPE),
        }
    }

    fn id_len(self) -> usize {
        if self.node_ids { 4 } else { 0 }
    }

    fn type_len(self) -> usize {
        if self.types { NameCode::ENCODED_LEN } else { 0 }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum NodeKind {
    Document,
    Element,
    Attribute,
    Text,
    Comment,
    ProcessingInstruction,
}

impl NodeKind {
    pub const fn from_tag(tag: ValueTag) -> Option<Self> {
        Some(match tag {
            ValueTag::Document => NodeKind::Document,
            ValueTag::Element => NodeKind::Element,
            ValueTag::Attribute => NodeKind::Attribute,
            ValueTag::Text => NodeKind::Text,
            ValueTag::Comment => NodeKind::Comment,
            ValueTag::ProcessingInstruction => NodeKind::ProcessingInstruction,
            _ => return None,
        })
    }

    pub const fn tag(self) -> ValueTag {
        match self {
            NodeKind::Document => ValueTag::Document,
            NodeKind::Element => ValueTag::Element,
            NodeKind::Attribute => ValueTag::Attribute,
            NodeKind::Text => ValueTag::Text,
            NodeKind::Comment => ValueTag::Comment,
            NodeKind::ProcessingInstruction => ValueTag::ProcessingInstruction,
        }
    }
}

/// Three consecutive `i32` name codes.
#[derive(Debug, Clone, Copy)]
pub struct CodedQNamePointable<'a> {
    bytes: &'a [u8],
    start: usize,
}

impl<'a> CodedQNamePointable<'a> {
    pub fn new(bytes: &'a [u8], start: usize) -> Result<Self> {
        if start + NameCode::ENCODED_LEN > bytes.len() {
            return Err(Error::truncated(start, NameCode::ENCODED_LEN));
        }
        Ok(Self { bytes, start })
    }

    pub fn prefix_code(&self) -> Result<i32> {
        codec::read_i32(self.bytes, self.start)
    }

    pub fn namespace_code(&self) -> Result<i32> {
        codec::read_i32(self.bytes, self.start + 4)
    }

    pub fn local_code(&self) -> Result<i32> {
        codec::read_i32(self.bytes, self.start + 8)
    }

    pub fn code(&self) -> Result<NameCode> {
        Ok(NameCode {
            prefix: self.prefix_code()?,
            uri: self.namespace_code()?,
            local: self.local_code()?,
        })
    }
}

fn read_name(bytes: &[u8], at: usize) -> Result<NameCode> {
    CodedQNamePointable::new(bytes, at)?.code()
}

/// The string dictionary embedded in a node tree.
#[derive(Debug, Clone, Copy)]
pub struct Dictionary<'a> {
    bytes: &'a [u8],
    start: usize,
    size: usize,
    count: usize,
}

impl<'a> Dictionary<'a> {
    /// `start` addresses the dictionary's size field.
    pub fn new(bytes: &'a [u8], start: usize) -> Result<Self> {
        let size = codec::read_len(bytes, start)?;
        let count = codec::read_len(bytes, start + 4)?;
        if start + size > bytes.len() || 8 + 8 * count > size {
            return Err(Error::system("dictionary extends past its tree"));
        }
        Ok(Self {
            bytes,
            start,
            size,
            count,
        })
    }

    pub fn encoded_len(&self) -> usize {
        self.size
    }

    pub fn entry_count(&self) -> usize {
        self.count
    }

    fn data_start(&self) -> usize {
        self.start + 8 + 8 * self.count
    }

    pub fn string(&self, idx: i32) -> Result<&'a str> {
        let i = usize::try_from(idx)
            .ok()
            .filter(|&i| i < self.count)
            .ok_or_else(|| {
                Error::system(format!("dictionary index {idx} not within [0, {})", self.count))
            })?;
        let offset = if i == 0 {
            0
        } else {
            codec::read_len(self.bytes, self.start + 8 + 4 * (i - 1))?
        };
        codec::read_str(self.bytes, self.data_start() + offset).map(|(s, _)| s)
    }

    /// Binary search through the sorted index array.
    pub fn lookup(&self, s: &str) -> Result<Option<i32>> {
        let sorted = self.start + 8 + 4 * self.count;
        let (mut lo, mut hi) = (0, self.count);
        while lo < hi {
            let mid = lo + (hi - lo) / 2;
            let idx = codec::read_i32(self.bytes, sorted + 4 * mid)?;
            match self.string(idx)?.cmp(s) {
                Ordering::Equal => return Ok(Some(idx)),
                Ordering::Less => lo = mid + 1,
                Ordering::Greater => hi = mid,
            }
        }
        Ok(None)
    }
}

/// Maps name codes to strings through a tree dictionary, falling back to the
/// global name cache for trees without one.
#[derive(Debug, Clone, Copy)]
pub struct NameResolver<'a> {
    dictionary: Option<Dictionary<'a>>,
    cache: &'a NameCache,
}

impl<'a> NameResolver<'a> {
    pub fn new(dictionary: Option<Dictionary<'a>>, cache: &'a NameCache) -> Self {
        Self { dictionary, cache }
    }

    pub fn resolve_str(&self, code: i32) -> Result<&'a str> {
        match &self.dictionary {
            Some(d) => d.string(code),
            None => self
                .cache
                .string(code)
                .ok_or_else(|| Error::system(format!("name code {code} not in name cache"))),
        }
    }

    pub fn resolve(&self, code: NameCode) -> Result<QName> {
        Ok(QName::new(
            self.resolve_str(code.prefix)?,
            self.resolve_str(code.uri)?,
            self.resolve_str(code.local)?,
        ))
    }
}

#[derive(Debug, Clone, Copy)]
pub struct NodeTreePointable<'a> {
    value: TaggedValuePointable<'a>,
    flags: NodeTreeFlags,
    tree_id: Option<i32>,
    dictionary: Option<Dictionary<'a>>,
    root_start: usize,
}

impl<'a> NodeTreePointable<'a> {
    pub fn new(value: &TaggedValuePointable<'a>) -> Result<Self> {
        value.expect_tag(ValueTag::NodeTree)?;
        let bytes = value.backing();
        let mut at = value.body_start();
        let raw = codec::read_u8(bytes, at)?;
        let flags = NodeTreeFlags::from_bits(raw)
            .ok_or_else(|| Error::system(format!("unknown node tree header bits {raw:#04x}")))?;
        at += 1;
        let tree_id = if flags.contains(NodeTreeFlags::NODE_ID) {
            let id = codec::read_i32(bytes, at)?;
            at += 4;
            Some(id)
        } else {
            None
        };
        let dictionary = if flags.contains(NodeTreeFlags::DICTIONARY) {
            let d = Dictionary::new(bytes, at)?;
            at += d.encoded_len();
            Some(d)
        } else {
            None
        };
        if at >= value.end() {
            return Err(Error::system("node tree without root node"));
        }
        Ok(Self {
            value: *value,
            flags,
            tree_id,
            dictionary,
            root_start: at,
        })
    }

    pub fn flags(&self) -> NodeTreeFlags {
        self.flags
    }

    pub fn node_id_exists(&self) -> bool {
        self.flags.contains(NodeTreeFlags::NODE_ID)
    }

    pub fn dictionary_exists(&self) -> bool {
        self.flags.contains(NodeTreeFlags::DICTIONARY)
    }

    pub fn type_exists(&self) -> bool {
        self.flags.contains(NodeTreeFlags::TYPE)
    }

    pub fn layout(&self) -> NodeLayout {
        NodeLayout::from_flags(self.flags)
    }

    pub fn tree_id(&self) -> Option<i32> {
        self.tree_id
    }

    pub fn dictionary(&self) -> Option<Dictionary<'a>> {
        self.dictionary
    }

    pub fn dictionary_entry_count(&self) -> usize {
        self.dictionary.map_or(0, |d| d.entry_count())
    }

    pub fn string(&self, idx: i32) -> Result<&'a str> {
        self.dictionary
            .ok_or_else(|| Error::system("node tree has no dictionary"))?
            .string(idx)
    }

    pub fn lookup_string(&self, s: &str) -> Result<Option<i32>> {
        match &self.dictionary {
            Some(d) => d.lookup(s),
            None => Ok(None),
        }
    }

    pub fn resolver(&self, cache: &'a NameCache) -> NameResolver<'a> {
        NameResolver::new(self.dictionary, cache)
    }

    pub fn root(&self) -> Result<TaggedValuePointable<'a>> {
        TaggedValuePointable::new(
            self.value.backing(),
            self.root_start,
            self.value.end() - self.root_start,
        )
    }

    /// Header, tree id and dictionary: everything between the tag and the root.
    pub(crate) fn preamble(&self) -> &'a [u8] {
        &self.value.backing()[self.value.body_start()..self.root_start]
    }
}

/// Attribute or children chunk: `count {slot}* {tagged node bytes}`.
#[derive(Debug, Clone, Copy)]
pub struct NodeChunk<'a> {
    slotted: Slotted<'a>,
}

impl<'a> NodeChunk<'a> {
    pub(crate) fn new(bytes: &'a [u8], start: usize) -> Result<Self> {
        Ok(Self {
            slotted: Slotted::new(bytes, start)?,
        })
    }

    pub fn entry_count(&self) -> usize {
        self.slotted.count()
    }

    pub fn entry(&self, i: usize) -> Result<TaggedValuePointable<'a>> {
        self.slotted.entry(i)
    }

    pub fn entry_range(&self, i: usize) -> Result<(usize, usize)> {
        self.slotted.entry_range(i)
    }

    pub fn encoded_len(&self) -> usize {
        self.slotted.encoded_len()
    }
}

#[derive(Debug, Clone, Copy)]
pub struct ElementNodePointable<'a> {
    value: TaggedValuePointable<'a>,
    layout: NodeLayout,
    flags: ElementFlags,
    ns_at: Option<usize>,
    attributes_at: Option<usize>,
    children_at: Option<usize>,
}

impl<'a> ElementNodePointable<'a> {
    pub fn new(value: &TaggedValuePointable<'a>, layout: NodeLayout) -> Result<Self> {
        value.expect_tag(ValueTag::Element)?;
        let bytes = value.backing();
        let raw = codec::read_u8(bytes, value.body_start())?;
        let flags = ElementFlags::from_bits(raw)
            .ok_or_else(|| Error::system(format!("unknown element header bits {raw:#04x}")))?;
        let mut at = value.body_start() + 1 + NameCode::ENCODED_LEN + layout.type_len() + layout.id_len();
        let ns_at = if flags.contains(ElementFlags::NS_CHUNK) {
            let count = codec::read_len(bytes, at)?;
            let here = at;
            at += 4 + 8 * count;
            Some(here)
        } else {
            None
        };
        let attributes_at = if flags.contains(ElementFlags::ATTRIBUTES_CHUNK) {
            let here = at;
            at += NodeChunk::new(bytes, at)?.encoded_len();
            Some(here)
        } else {
            None
        };
        let children_at = flags.contains(ElementFlags::CHILDREN_CHUNK).then_some(at);
        Ok(Self {
            value: *value,
            layout,
            flags,
            ns_at,
            attributes_at,
            children_at,
        })
    }

    pub fn flags(&self) -> ElementFlags {
        self.flags
    }

    fn name_at(&self) -> usize {
        self.value.body_start() + 1
    }

    pub fn name(&self) -> Result<NameCode> {
        read_name(self.value.backing(), self.name_at())
    }

    pub fn type_name(&self) -> Result<Option<NameCode>> {
        if !self.layout.types {
            return Ok(None);
        }
        read_name(self.value.backing(), self.name_at() + NameCode::ENCODED_LEN).map(Some)
    }

    pub fn local_node_id(&self) -> Result<Option<i32>> {
        if !self.layout.node_ids {
            return Ok(None);
        }
        let at = self.name_at() + NameCode::ENCODED_LEN + self.layout.type_len();
        codec::read_i32(self.value.backing(), at).map(Some)
    }

    pub fn namespace_count(&self) -> Result<usize> {
        match self.ns_at {
            Some(at) => codec::read_len(self.value.backing(), at),
            None => Ok(0),
        }
    }

    /// `(prefix code, uri code)` of namespace declaration `i`.
    pub fn namespace(&self, i: usize) -> Result<(i32, i32)> {
        let count = self.namespace_count()?;
        let at = self
            .ns_at
            .filter(|_| i < count)
            .ok_or_else(|| Error::system(format!("namespace {i} out of range ({count})")))?;
        let pair = at + 4 + 8 * i;
        Ok((
            codec::read_i32(self.value.backing(), pair)?,
            codec::read_i32(self.value.backing(), pair + 4)?,
        ))
    }

    pub fn attributes(&self) -> Result<Option<NodeChunk<'a>>> {
        self.attributes_at
            .map(|at| NodeChunk::new(self.value.backing(), at))
            .transpose()
    }

    pub fn children(&self) -> Result<Option<NodeChunk<'a>>> {
        self.children_at
            .map(|at| NodeChunk::new(self.value.backing(), at))
            .transpose()
    }
}

#[derive(Debug, Clone, Copy)]
pub struct AttributeNodePointable<'a> {
    value: TaggedValuePointable<'a>,
    layout: NodeLayout,
}

impl<'a> AttributeNodePointable<'a> {
    pub fn new(value: &TaggedValuePointable<'a>, layout: NodeLayout) -> Result<Self> {
        value.expect_tag(ValueTag::Attribute)?;
        Ok(Self {
            value: *value,
            layout,
        })
    }

    pub fn name(&self) -> Result<NameCode> {
        read_name(self.value.backing(), self.value.body_start())
    }

    pub fn type_name(&self) -> Result<Option<NameCode>> {
        if !self.layout.types {
            return Ok(None);
        }
        read_name(
            self.value.backing(),
            self.value.body_start() + NameCode::ENCODED_LEN,
        )
        .map(Some)
    }

    pub fn local_node_id(&self) -> Result<Option<i32>> {
        if !self.layout.node_ids {
            return Ok(None);
        }
        let at = self.value.body_start() + NameCode::ENCODED_LEN + self.layout.type_len();
        codec::read_i32(self.value.backing(), at).map(Some)
    }

    /// The attribute's tagged value.
    pub fn value(&self) -> Result<TaggedValuePointable<'a>> {
        let at = self.value.body_start()
            + NameCode::ENCODED_LEN
            + self.layout.type_len()
            + self.layout.id_len();
        TaggedValuePointable::new(self.value.backing(), at, self.value.end().saturating_sub(at))
    }
}

#[derive(Debug, Clone, Copy)]
pub struct DocumentNodePointable<'a> {
    value: TaggedValuePointable<'a>,
    layout: NodeLayout,
}

impl<'a> DocumentNodePointable<'a> {
    pub fn new(value: &TaggedValuePointable<'a>, layout: NodeLayout) -> Result<Self> {
        value.expect_tag(ValueTag::Document)?;
        Ok(Self {
            value: *value,
            layout,
        })
    }

    pub fn local_node_id(&self) -> Result<Option<i32>> {
        if !self.layout.node_ids {
            return Ok(None);
        }
        codec::read_i32(self.value.backing(), self.value.body_start()).map(Some)
    }

    pub fn content(&self) -> Result<NodeChunk<'a>> {
        NodeChunk::new(
            self.value.backing(),
            self.value.body_start() + self.layout.id_len(),
        )
    }
}

/// Text and comment nodes share one layout.
#[derive(Debug, Clone, Copy)]
pub struct TextOrCommentNodePointable<'a> {
    value: TaggedValuePointable<'a>,
    layout: NodeLayout,
}

impl<'a> TextOrCommentNodePointable<'a> {
    pub fn new(value: &TaggedValuePointable<'a>, layout: NodeLayout) -> Result<Self> {
        let tag = value.tag()?;
        if !matches!(tag, ValueTag::Text | ValueTag::Comment) {
            return Err(Error::type_mismatch("text or comment node", tag));
        }
        Ok(Self {
            value: *value,
            layout,
        })
    }

    pub fn local_node_id(&self) -> Result<Option<i32>> {
        if !self.layout.node_ids {
            return Ok(None);
        }
        codec::read_i32(self.value.backing(), self.value.body_start()).map(Some)
    }

    pub fn value(&self) -> Result<&'a str> {
        codec::read_str(
            self.value.backing(),
            self.value.body_start() + self.layout.id_len(),
        )
        .map(|(s, _)| s)
    }
}

#[derive(Debug, Clone, Copy)]
pub struct PINodePointable<'a> {
    value: TaggedValuePointable<'a>,
    layout: NodeLayout,
}

impl<'a> PINodePointable<'a> {
    pub fn new(value: &TaggedValuePointable<'a>, layout: NodeLayout) -> Result<Self> {
        value.expect_tag(ValueTag::ProcessingInstruction)?;
        Ok(Self {
            value: *value,
            layout,
        })
    }

    pub fn local_node_id(&self) -> Result<Option<i32>> {
        if !self.layout.node_ids {
            return Ok(None);
        }
        codec::read_i32(self.value.backing(), self.value.body_start()).map(Some)
    }

    pub fn target(&self) -> Result<&'a str> {
        codec::read_str(
            self.value.backing(),
            self.value.body_start() + self.layout.id_len(),
        )
        .map(|(s, _)| s)
    }

    pub fn content(&self) -> Result<&'a str> {
        let at = self.value.body_start() + self.layout.id_len();
        let skip = codec::encoded_str_len(self.value.backing(), at)?;
        codec::read_str(self.value.backing(), at + skip).map(|(s, _)| s)
    }
}

/// Any node view, dispatched on the tag.
#[derive(Debug, Clone, Copy)]
pub enum NodePointable<'a> {
    Document(DocumentNodePointable<'a>),
    Element(ElementNodePointable<'a>),
    Attribute(AttributeNodePointable<'a>),
    Text(TextOrCommentNodePointable<'a>),
    Comment(TextOrCommentNodePointable<'a>),
    ProcessingInstruction(PINodePointable<'a>),
}

impl<'a> NodePointable<'a> {
    pub fn new(value: &TaggedValuePointable<'a>, layout: NodeLayout) -> Result<Self> {
        let tag = value.tag()?;
        Ok(match tag {
            ValueTag::Document => NodePointable::Document(DocumentNodePointable::new(value, layout)?),
            ValueTag::Element => NodePointable::Element(ElementNodePointable::new(value, layout)?),
            ValueTag::Attribute => {
                NodePointable::Attribute(AttributeNodePointable::new(value, layout)?)
            }
            ValueTag::Text => NodePointable::Text(TextOrCommentNodePointable::new(value, layout)?),
            ValueTag::Comment => {
                NodePointable::Comment(TextOrCommentNodePointable::new(value, layout)?)
            }
            ValueTag::ProcessingInstruction => {
                NodePointable::ProcessingInstruction(PINodePointable::new(value, layout)?)
            }
            other => return Err(Error::type_mismatch("node", other)),
        })
    }

    pub fn kind(&self) -> NodeKind {
        match self {
            NodePointable::Document(_) => NodeKind::Document,
            NodePointable::Element(_) => NodeKind::Element,
            NodePointable::Attribute(_) => NodeKind::Attribute,
            NodePointable::Text(_) => NodeKind::Text,
            NodePointable::Comment(_) => NodeKind::Comment,
            NodePointable::ProcessingInstruction(_) => NodeKind::ProcessingInstruction,
        }
    }

    pub fn local_node_id(&self) -> Result<Option<i32>> {
        match self {
            NodePointable::Document(n) => n.local_node_id(),
            NodePointable::Element(n) => n.local_node_id(),
            NodePointable::Attribute(n) => n.local_node_id(),
            NodePointable::Text(n) | NodePointable::Comment(n) => n.local_node_id(),
            NodePointable::ProcessingInstruction(n) => n.local_node_id(),
        }
    }

    /// Name code of elements and attributes.
    pub fn name(&self) -> Result<Option<NameCode>> {
        match self {
            NodePointable::Element(n) => n.name().map(Some),
            NodePointable::Attribute(n) => n.name().map(Some),
            _ => Ok(None),
        }
    }

    /// Children of elements and the content of documents.
    pub fn children(&self) -> Result<Option<NodeChunk<'a>>> {
        match self {
            NodePointable::Document(n) => n.content().map(Some),
            NodePointable::Element(n) => n.children(),
            _ => Ok(None),
        }
    }

    pub fn attributes(&self) -> Result<Option<NodeChunk<'a>>> {
        match self {
            NodePointable::Element(n) => n.attributes(),
            _ => Ok(None),
        }
    }
}
