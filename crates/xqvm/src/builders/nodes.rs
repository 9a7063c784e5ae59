//! Node and node-tree builders.
//!
//! Nested content (namespace declarations, attributes, children) is collected
//! into scratch areas between a `start_*_chunk` / `end_*_chunk` pair and copied
//! behind the node header on `finish`. Every builder writes into a
//! caller-owned [`ValueStorage`].
use super::SlottedArea;
use super::atomic::put_str;
use super::dictionary::DictionaryBuilder;
use crate::consts::XS;
use crate::datamodel::pool::{PointablePool, Poolable};
use crate::datamodel::value::NodeData;
use crate::datamodel::{
    ElementFlags, NodeKind, NodeLayout, NodeTreeFlags, TaggedValue, TaggedValuePointable,
    ValueStorage, ValueTag,
};
use crate::error::{Error, Result};
use crate::names::{NameCache, NameCode, NameEncoder, QName};

/// Which optional parts a node tree carries.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct NodeTreeOptions {
    /// Document-scoped dictionary; without it names are global cache codes.
    pub dictionary: bool,
    pub node_ids: bool,
    pub types: bool,
    /// Required when `node_ids` is set.
    pub tree_id: Option<i32>,
}

impl Default for NodeTreeOptions {
    fn default() -> Self {
        Self {
            dictionary: true,
            node_ids: false,
            types: false,
            tree_id: None,
        }
    }
}

impl NodeTreeOptions {
    pub fn flags(&self) -> NodeTreeFlags {
        let mut flags = NodeTreeFlags::empty();
        flags.set(NodeTreeFlags::NODE_ID, self.node_ids);
        flags.set(NodeTreeFlags::DICTIONARY, self.dictionary);
        flags.set(NodeTreeFlags::TYPE, self.types);
        flags
    }

    pub fn layout(&self) -> NodeLayout {
        NodeLayout::from_flags(self.flags())
    }
}

/// Assembles `[NodeTree][header]{tree-id?}{dictionary?}{root}`.
#[derive(Debug, Default)]
pub struct NodeTreeBuilder {
    options: NodeTreeOptions,
    dictionary: DictionaryBuilder,
    root: ValueStorage,
}

impl Poolable for NodeTreeBuilder {
    fn reset(&mut self) {
        NodeTreeBuilder::reset(self, NodeTreeOptions::default());
    }
}

impl NodeTreeBuilder {
    pub fn new(options: NodeTreeOptions) -> Self {
        Self {
            options,
            ..Self::default()
        }
    }

    pub fn reset(&mut self, options: NodeTreeOptions) {
        self.options = options;
        self.dictionary.reset();
        self.root.reset();
    }

    pub fn options(&self) -> &NodeTreeOptions {
        &self.options
    }

    pub fn dictionary_mut(&mut self) -> &mut DictionaryBuilder {
        &mut self.dictionary
    }

    /// Where the single root node is written.
    pub fn root_area(&mut self) -> &mut ValueStorage {
        &mut self.root
    }

    /// Dictionary and root area at once, for writers that intern names while
    /// writing the root.
    pub fn parts(&mut self) -> (&mut DictionaryBuilder, &mut ValueStorage) {
        (&mut self.dictionary, &mut self.root)
    }

    pub fn finish(&mut self, out: &mut ValueStorage) -> Result<()> {
        if self.root.is_empty() {
            return Err(Error::system("node tree without root node"));
        }
        out.put_u8(ValueTag::NodeTree.code());
        out.put_u8(self.options.flags().bits());
        if self.options.node_ids {
            let id = self
                .options
                .tree_id
                .ok_or_else(|| Error::system("node ids requested without a tree id"))?;
            out.put_i32(id);
        }
        if self.options.dictionary {
            self.dictionary.write(out)?;
        }
        out.put_slice(self.root.as_slice());
        Ok(())
    }
}

fn put_name(out: &mut ValueStorage, name: NameCode) {
    out.put_i32(name.prefix);
    out.put_i32(name.uri);
    out.put_i32(name.local);
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
enum ElementPart {
    Header,
    Namespaces,
    Attributes,
    Children,
}

/// `[Element][header]{name}{type?}{node-id?}{ns?}{attributes?}{children?}`.
#[derive(Debug)]
pub struct ElementNodeBuilder {
    layout: NodeLayout,
    name: Option<NameCode>,
    type_name: Option<NameCode>,
    node_id: Option<i32>,
    flags: ElementFlags,
    part: ElementPart,
    open: bool,
    namespaces: Vec<(i32, i32)>,
    attributes: SlottedArea,
    children: SlottedArea,
}

impl Default for ElementNodeBuilder {
    fn default() -> Self {
        Self {
            layout: NodeLayout::default(),
            name: None,
            type_name: None,
            node_id: None,
            flags: ElementFlags::empty(),
            part: ElementPart::Header,
            open: false,
            namespaces: Vec::new(),
            attributes: SlottedArea::default(),
            children: SlottedArea::default(),
        }
    }
}

impl Poolable for ElementNodeBuilder {
    fn reset(&mut self) {
        ElementNodeBuilder::reset(self, NodeLayout::default());
    }
}

impl ElementNodeBuilder {
    pub fn new(layout: NodeLayout) -> Self {
        Self {
            layout,
            ..Self::default()
        }
    }

    pub fn reset(&mut self, layout: NodeLayout) {
        self.layout = layout;
        self.name = None;
        self.type_name = None;
        self.node_id = None;
        self.flags = ElementFlags::empty();
        self.part = ElementPart::Header;
        self.open = false;
        self.namespaces.clear();
        self.attributes.reset();
        self.children.reset();
    }

    pub fn set_name(&mut self, name: NameCode) {
        self.name = Some(name);
    }

    pub fn set_type(&mut self, type_name: NameCode) {
        self.type_name = Some(type_name);
    }

    pub fn set_local_node_id(&mut self, id: i32) {
        self.node_id = Some(id);
    }

    fn start(&mut self, part: ElementPart, flag: ElementFlags) -> Result<()> {
        if self.open || part <= self.part {
            return Err(Error::system(format!(
                "element chunk {part:?} started out of order after {:?}",
                self.part
            )));
        }
        self.part = part;
        self.open = true;
        self.flags.insert(flag);
        Ok(())
    }

    fn expect_open(&self, part: ElementPart) -> Result<()> {
        if self.open && self.part == part {
            Ok(())
        } else {
            Err(Error::system(format!("element chunk {part:?} is not open")))
        }
    }

    fn end(&mut self, part: ElementPart) -> Result<()> {
        self.expect_open(part)?;
        self.open = false;
        Ok(())
    }

    pub fn start_namespace_chunk(&mut self) -> Result<()> {
        self.start(ElementPart::Namespaces, ElementFlags::NS_CHUNK)
    }

    pub fn add_namespace(&mut self, prefix: i32, uri: i32) -> Result<()> {
        self.expect_open(ElementPart::Namespaces)?;
        self.namespaces.push((prefix, uri));
        Ok(())
    }

    pub fn end_namespace_chunk(&mut self) -> Result<()> {
        self.end(ElementPart::Namespaces)
    }

    pub fn start_attribute_chunk(&mut self) -> Result<()> {
        self.start(ElementPart::Attributes, ElementFlags::ATTRIBUTES_CHUNK)
    }

    /// Scratch area for the next attribute node; close it with
    /// [`ElementNodeBuilder::end_attribute`].
    pub fn attribute_area(&mut self) -> &mut ValueStorage {
        self.attributes.data_mut()
    }

    pub fn end_attribute(&mut self) -> Result<()> {
        self.expect_open(ElementPart::Attributes)?;
        self.attributes.end_entry()
    }

    /// Copies an already encoded attribute node.
    pub fn add_attribute(&mut self, node: &TaggedValuePointable<'_>) -> Result<()> {
        self.expect_open(ElementPart::Attributes)?;
        self.attributes.push_entry(node.as_slice())
    }

    pub fn end_attribute_chunk(&mut self) -> Result<()> {
        self.end(ElementPart::Attributes)
    }

    pub fn start_children_chunk(&mut self) -> Result<()> {
        self.start(ElementPart::Children, ElementFlags::CHILDREN_CHUNK)
    }

    pub fn child_area(&mut self) -> &mut ValueStorage {
        self.children.data_mut()
    }

    pub fn end_child(&mut self) -> Result<()> {
        self.expect_open(ElementPart::Children)?;
        self.children.end_entry()
    }

    pub fn add_child(&mut self, node: &TaggedValuePointable<'_>) -> Result<()> {
        self.expect_open(ElementPart::Children)?;
        self.children.push_entry(node.as_slice())
    }

    pub fn end_children_chunk(&mut self) -> Result<()> {
        self.end(ElementPart::Children)
    }

    pub fn finish(&mut self, out: &mut ValueStorage) -> Result<()> {
        if self.open {
            return Err(Error::system(format!(
                "element finished with chunk {:?} still open",
                self.part
            )));
        }
        let name = self
            .name
            .ok_or_else(|| Error::system("element without a name"))?;
        out.put_u8(ValueTag::Element.code());
        out.put_u8(self.flags.bits());
        put_name(out, name);
        if self.layout.types {
            let type_name = self
                .type_name
                .ok_or_else(|| Error::system("element type required by tree layout"))?;
            put_name(out, type_name);
        }
        if self.layout.node_ids {
            let id = self
                .node_id
                .ok_or_else(|| Error::system("element node id required by tree layout"))?;
            out.put_i32(id);
        }
        if self.flags.contains(ElementFlags::NS_CHUNK) {
            let count = i32::try_from(self.namespaces.len())
                .map_err(|_| Error::system("too many namespace declarations"))?;
            out.put_i32(count);
            for &(prefix, uri) in &self.namespaces {
                out.put_i32(prefix);
                out.put_i32(uri);
            }
        }
        if self.flags.contains(ElementFlags::ATTRIBUTES_CHUNK) {
            self.attributes.write(out)?;
        }
        if self.flags.contains(ElementFlags::CHILDREN_CHUNK) {
            self.children.write(out)?;
        }
        Ok(())
    }
}

/// `[Attribute]{name}{type?}{node-id?}{tagged value}`.
#[derive(Debug, Default)]
pub struct AttributeNodeBuilder {
    layout: NodeLayout,
    name: Option<NameCode>,
    type_name: Option<NameCode>,
    node_id: Option<i32>,
    value: ValueStorage,
}

impl Poolable for AttributeNodeBuilder {
    fn reset(&mut self) {
        AttributeNodeBuilder::reset(self, NodeLayout::default());
    }
}

impl AttributeNodeBuilder {
    pub fn reset(&mut self, layout: NodeLayout) {
        self.layout = layout;
        self.name = None;
        self.type_name = None;
        self.node_id = None;
        self.value.reset();
    }

    pub fn set_name(&mut self, name: NameCode) {
        self.name = Some(name);
    }

    pub fn set_type(&mut self, type_name: NameCode) {
        self.type_name = Some(type_name);
    }

    pub fn set_local_node_id(&mut self, id: i32) {
        self.node_id = Some(id);
    }

    /// Area receiving the attribute's single tagged value.
    pub fn value_area(&mut self) -> &mut ValueStorage {
        &mut self.value
    }

    pub fn set_value(&mut self, value: &TaggedValuePointable<'_>) {
        self.value.reset();
        self.value.put_slice(value.as_slice());
    }

    pub fn finish(&mut self, out: &mut ValueStorage) -> Result<()> {
        let name = self
            .name
            .ok_or_else(|| Error::system("attribute without a name"))?;
        if self.value.is_empty() {
            return Err(Error::system("attribute without a value"));
        }
        out.put_u8(ValueTag::Attribute.code());
        put_name(out, name);
        if self.layout.types {
            let type_name = self
                .type_name
                .ok_or_else(|| Error::system("attribute type required by tree layout"))?;
            put_name(out, type_name);
        }
        if self.layout.node_ids {
            let id = self
                .node_id
                .ok_or_else(|| Error::system("attribute node id required by tree layout"))?;
            out.put_i32(id);
        }
        out.put_slice(self.value.as_slice());
        Ok(())
    }
}

/// `[Document]{node-id?}{content}`.
#[derive(Debug, Default)]
pub struct DocumentNodeBuilder {
    layout: NodeLayout,
    node_id: Option<i32>,
    content: SlottedArea,
}

impl Poolable for DocumentNodeBuilder {
    fn reset(&mut self) {
        DocumentNodeBuilder::reset(self, NodeLayout::default());
    }
}

impl DocumentNodeBuilder {
    pub fn reset(&mut self, layout: NodeLayout) {
        self.layout = layout;
        self.node_id = None;
        self.content.reset();
    }

    pub fn set_local_node_id(&mut self, id: i32) {
        self.node_id = Some(id);
    }

    pub fn child_area(&mut self) -> &mut ValueStorage {
        self.content.data_mut()
    }

    pub fn end_child(&mut self) -> Result<()> {
        self.content.end_entry()
    }

    pub fn add_child(&mut self, node: &TaggedValuePointable<'_>) -> Result<()> {
        self.content.push_entry(node.as_slice())
    }

    pub fn finish(&mut self, out: &mut ValueStorage) -> Result<()> {
        out.put_u8(ValueTag::Document.code());
        if self.layout.node_ids {
            let id = self
                .node_id
                .ok_or_else(|| Error::system("document node id required by tree layout"))?;
            out.put_i32(id);
        }
        self.content.write(out)
    }
}

/// Text, comment and processing-instruction nodes.
#[derive(Debug)]
pub struct LeafNodeBuilder {
    kind: NodeKind,
    layout: NodeLayout,
    node_id: Option<i32>,
    target: String,
    value: String,
}

impl Default for LeafNodeBuilder {
    fn default() -> Self {
        Self {
            kind: NodeKind::Text,
            layout: NodeLayout::default(),
            node_id: None,
            target: String::new(),
            value: String::new(),
        }
    }
}

impl Poolable for LeafNodeBuilder {
    fn reset(&mut self) {
        LeafNodeBuilder::reset(self, NodeKind::Text, NodeLayout::default());
    }
}

impl LeafNodeBuilder {
    pub fn reset(&mut self, kind: NodeKind, layout: NodeLayout) {
        self.kind = kind;
        self.layout = layout;
        self.node_id = None;
        self.target.clear();
        self.value.clear();
    }

    pub fn set_local_node_id(&mut self, id: i32) {
        self.node_id = Some(id);
    }

    /// Processing-instruction target; ignored for text and comments.
    pub fn set_target(&mut self, target: &str) {
        self.target.clear();
        self.target.push_str(target);
    }

    pub fn set_value(&mut self, value: &str) {
        self.value.clear();
        self.value.push_str(value);
    }

    pub fn finish(&mut self, out: &mut ValueStorage) -> Result<()> {
        if !matches!(
            self.kind,
            NodeKind::Text | NodeKind::Comment | NodeKind::ProcessingInstruction
        ) {
            return Err(Error::type_mismatch("leaf node kind", self.kind.tag()));
        }
        out.put_u8(self.kind.tag().code());
        if self.layout.node_ids {
            let id = self
                .node_id
                .ok_or_else(|| Error::system("node id required by tree layout"))?;
            out.put_i32(id);
        }
        if self.kind == NodeKind::ProcessingInstruction {
            put_str(out, &self.target)?;
        }
        put_str(out, &self.value)
    }
}

/// Hands out global codes for names already in the cache.
struct CacheCodes<'a>(&'a NameCache);

impl NameEncoder for CacheCodes<'_> {
    fn encode_str(&mut self, s: &str) -> Result<i32> {
        self.0
            .find_str(s)
            .ok_or_else(|| Error::system(format!("name part {s:?} is not in the name cache")))
    }
}

/// Writes decoded [`NodeData`] as a node tree, recycling builders through a pool.
///
/// Node ids are assigned in pre-order (element, its attributes, its children)
/// starting at zero.
#[derive(Debug, Clone)]
pub struct NodeTreeWriter<'a> {
    pool: PointablePool,
    cache: Option<&'a NameCache>,
}

impl<'a> NodeTreeWriter<'a> {
    pub fn new(pool: PointablePool, cache: Option<&'a NameCache>) -> Self {
        Self { pool, cache }
    }

    pub fn write(
        &self,
        out: &mut ValueStorage,
        node: &NodeData,
        options: &NodeTreeOptions,
    ) -> Result<()> {
        let mut tree = self.pool.borrow::<NodeTreeBuilder>();
        tree.reset(*options);
        let layout = options.layout();
        let mut next_id = 0;
        if options.dictionary {
            let (dictionary, root) = tree.parts();
            self.write_node(root, node, layout, dictionary, &mut next_id)?;
        } else {
            let cache = self
                .cache
                .ok_or_else(|| Error::system("node tree without dictionary needs a name cache"))?;
            let mut codes = CacheCodes(cache);
            self.write_node(tree.root_area(), node, layout, &mut codes, &mut next_id)?;
        }
        tree.finish(out)
    }

    pub fn build(&self, node: &NodeData, options: &NodeTreeOptions) -> Result<TaggedValue> {
        let mut out = self.pool.borrow::<ValueStorage>();
        self.write(&mut out, node, options)?;
        out.freeze()
    }

    fn write_node(
        &self,
        out: &mut ValueStorage,
        node: &NodeData,
        layout: NodeLayout,
        names: &mut dyn NameEncoder,
        next_id: &mut i32,
    ) -> Result<()> {
        let id = *next_id;
        *next_id = next_id
            .checked_add(1)
            .ok_or_else(|| Error::system("node id space exhausted"))?;
        match node.kind {
            NodeKind::Document => {
                let mut b = self.pool.borrow::<DocumentNodeBuilder>();
                b.reset(layout);
                b.set_local_node_id(id);
                for child in &node.children {
                    self.write_node(b.child_area(), child, layout, names, next_id)?;
                    b.end_child()?;
                }
                b.finish(out)
            }
            NodeKind::Element => {
                let mut b = self.pool.borrow::<ElementNodeBuilder>();
                b.reset(layout);
                b.set_name(names.encode(required_name(node)?)?);
                if layout.types {
                    let untyped = QName::new("xs", XS, "untyped");
                    b.set_type(names.encode(node.type_name.as_ref().unwrap_or(&untyped))?);
                }
                b.set_local_node_id(id);
                if !node.namespaces.is_empty() {
                    b.start_namespace_chunk()?;
                    for (prefix, uri) in &node.namespaces {
                        b.add_namespace(names.encode_str(prefix)?, names.encode_str(uri)?)?;
                    }
                    b.end_namespace_chunk()?;
                }
                if !node.attributes.is_empty() {
                    b.start_attribute_chunk()?;
                    for attr in &node.attributes {
                        if attr.kind != NodeKind::Attribute {
                            return Err(Error::type_mismatch("attribute node", attr.kind.tag()));
                        }
                        self.write_node(b.attribute_area(), attr, layout, names, next_id)?;
                        b.end_attribute()?;
                    }
                    b.end_attribute_chunk()?;
                }
                if !node.children.is_empty() {
                    b.start_children_chunk()?;
                    for child in &node.children {
                        self.write_node(b.child_area(), child, layout, names, next_id)?;
                        b.end_child()?;
                    }
                    b.end_children_chunk()?;
                }
                b.finish(out)
            }
            NodeKind::Attribute => {
                let mut b = self.pool.borrow::<AttributeNodeBuilder>();
                b.reset(layout);
                b.set_name(names.encode(required_name(node)?)?);
                if layout.types {
                    let untyped = QName::new("xs", XS, "untypedAtomic");
                    b.set_type(names.encode(node.type_name.as_ref().unwrap_or(&untyped))?);
                }
                b.set_local_node_id(id);
                match &node.value {
                    Some(value) => value.write_to(b.value_area())?,
                    None => super::atomic::write_string_like(
                        b.value_area(),
                        ValueTag::UntypedAtomic,
                        node.content.as_deref().unwrap_or_default(),
                    )?,
                }
                b.finish(out)
            }
            kind @ (NodeKind::Text | NodeKind::Comment | NodeKind::ProcessingInstruction) => {
                let mut b = self.pool.borrow::<LeafNodeBuilder>();
                b.reset(kind, layout);
                b.set_local_node_id(id);
                if kind == NodeKind::ProcessingInstruction {
                    b.set_target(&required_name(node)?.local);
                }
                b.set_value(node.content.as_deref().unwrap_or_default());
                b.finish(out)
            }
        }
    }
}

fn required_name(node: &NodeData) -> Result<&QName> {
    node.name
        .as_ref()
        .ok_or_else(|| Error::system(format!("{:?} node without a name", node.kind)))
}

/// One-shot [`NodeTreeWriter::build`] with a private pool.
pub fn write_tree(
    node: &NodeData,
    options: &NodeTreeOptions,
    cache: Option<&NameCache>,
) -> Result<TaggedValue> {
    NodeTreeWriter::new(PointablePool::new(), cache).build(node, options)
}
