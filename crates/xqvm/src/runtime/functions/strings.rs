//! String functions and name accessors.
use super::helpers::{atomic_item, atomize, atomize_optional, atomize_one, optional_node};
use super::sequences::number;
use crate::datamodel::{AtomicValue, Item, NodePointable, NodeRef, TaggedValue};
use crate::error::{Error, ErrorCode, Result};
use crate::names::{NameCache, QName};
use crate::runtime::base::{EagerEvaluator, Lifecycle};
use crate::runtime::frame::Frame;
use crate::runtime::iterator::{BoxedIterator, RuntimeIterator, with_open};
use crate::runtime::register::RegisterAllocator;
use core::cmp::Ordering;
use smallvec::SmallVec;

/// `fn:data`: atomizes item by item.
#[derive(Debug)]
pub struct Data {
    input: BoxedIterator,
    life: Lifecycle,
}

impl Data {
    pub fn new(alloc: &mut RegisterAllocator, input: BoxedIterator) -> Self {
        Self {
            input,
            life: Lifecycle::new(alloc),
        }
    }
}

impl RuntimeIterator for Data {
    fn open(&self, frame: &mut Frame<'_>) -> Result<()> {
        self.life.begin(frame);
        self.input.open(frame)
    }

    fn next(&self, frame: &mut Frame<'_>) -> Result<Option<Item>> {
        match self.input.next(frame)? {
            Some(Item::Node(node)) => {
                let value = atomize(&Item::Node(node))?;
                atomic_item(frame, &value).map(Some)
            }
            other => Ok(other),
        }
    }

    fn close(&self, frame: &mut Frame<'_>) {
        if self.life.end(frame) {
            self.input.close(frame);
        }
    }

    fn skip(&self, frame: &mut Frame<'_>, n: usize) -> Result<usize> {
        self.input.skip(frame, n)
    }
}

/// String value of zero or one item; the empty sequence gives `""`.
fn string_of(it: &dyn RuntimeIterator, frame: &mut Frame<'_>) -> Result<String> {
    with_open(it, frame, |it, frame| {
        let Some(first) = it.next(frame)? else {
            return Ok(String::new());
        };
        if it.next(frame)?.is_some() {
            return Err(Error::new(
                ErrorCode::XPTY0004,
                "a sequence of more than one item is not allowed here",
            ));
        }
        match first {
            Item::Node(n) => n.string_value(),
            Item::Value(v) => Ok(AtomicValue::decode(&v.pointable())?.string_value()),
        }
    })
}

/// `fn:string`
#[derive(Debug)]
pub struct StringFn {
    input: BoxedIterator,
}

impl StringFn {
    pub fn new(input: BoxedIterator) -> Self {
        Self { input }
    }
}

impl EagerEvaluator for StringFn {
    fn evaluate(&self, frame: &mut Frame<'_>) -> Result<TaggedValue> {
        let s = string_of(self.input.as_ref(), frame)?;
        frame.ctx().atomics().string(&s)
    }
}

/// `fn:string-length`, in characters.
#[derive(Debug)]
pub struct StringLength {
    input: BoxedIterator,
}

impl StringLength {
    pub fn new(input: BoxedIterator) -> Self {
        Self { input }
    }
}

impl EagerEvaluator for StringLength {
    fn evaluate(&self, frame: &mut Frame<'_>) -> Result<TaggedValue> {
        let s = string_of(self.input.as_ref(), frame)?;
        let n = i64::try_from(s.chars().count()).unwrap_or(i64::MAX);
        frame.ctx().atomics().integer(n)
    }
}

/// `fn:concat`; empty arguments count as `""`.
#[derive(Debug)]
pub struct StringConcat {
    args: Vec<BoxedIterator>,
}

impl StringConcat {
    pub fn new(args: Vec<BoxedIterator>) -> Self {
        Self { args }
    }
}

impl EagerEvaluator for StringConcat {
    fn evaluate(&self, frame: &mut Frame<'_>) -> Result<TaggedValue> {
        let mut out = String::new();
        for arg in &self.args {
            if let Some(v) = atomize_optional(arg.as_ref(), frame)? {
                out.push_str(&v.string_value());
            }
        }
        frame.ctx().atomics().string(&out)
    }
}

/// How [`StringTest`] matches its search string.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum TestOp {
    Contains,
    StartsWith,
    EndsWith,
}

/// `fn:contains`, `fn:starts-with` and `fn:ends-with` under an optional
/// collation. Matching runs on collation keys; an empty search string
/// always matches.
#[derive(Debug)]
pub struct StringTest {
    op: TestOp,
    input: BoxedIterator,
    search: BoxedIterator,
    collation: Option<String>,
}

impl StringTest {
    fn with_op(op: TestOp, input: BoxedIterator, search: BoxedIterator) -> Self {
        Self {
            op,
            input,
            search,
            collation: None,
        }
    }

    pub fn contains(input: BoxedIterator, search: BoxedIterator) -> Self {
        Self::with_op(TestOp::Contains, input, search)
    }

    pub fn starts_with(input: BoxedIterator, search: BoxedIterator) -> Self {
        Self::with_op(TestOp::StartsWith, input, search)
    }

    pub fn ends_with(input: BoxedIterator, search: BoxedIterator) -> Self {
        Self::with_op(TestOp::EndsWith, input, search)
    }

    pub fn with_collation(mut self, uri: impl Into<String>) -> Self {
        self.collation = Some(uri.into());
        self
    }
}

impl EagerEvaluator for StringTest {
    fn evaluate(&self, frame: &mut Frame<'_>) -> Result<TaggedValue> {
        let collation = frame.ctx().collation(self.collation.as_deref())?;
        let s = string_of(self.input.as_ref(), frame)?;
        let search = string_of(self.search.as_ref(), frame)?;
        let (s, search) = (collation.key(&s), collation.key(&search));
        let found = match self.op {
            TestOp::Contains => s.contains(search.as_ref()),
            TestOp::StartsWith => s.starts_with(search.as_ref()),
            TestOp::EndsWith => s.ends_with(search.as_ref()),
        };
        Ok(TaggedValue::boolean(found))
    }
}

/// `fn:substring-before` and `fn:substring-after`, by codepoints.
#[derive(Debug)]
pub struct SubstringMatch {
    input: BoxedIterator,
    search: BoxedIterator,
    after: bool,
}

impl SubstringMatch {
    pub fn before(input: BoxedIterator, search: BoxedIterator) -> Self {
        Self {
            input,
            search,
            after: false,
        }
    }

    pub fn after(input: BoxedIterator, search: BoxedIterator) -> Self {
        Self {
            input,
            search,
            after: true,
        }
    }
}

impl EagerEvaluator for SubstringMatch {
    fn evaluate(&self, frame: &mut Frame<'_>) -> Result<TaggedValue> {
        let s = string_of(self.input.as_ref(), frame)?;
        let search = string_of(self.search.as_ref(), frame)?;
        let out = match s.find(&search) {
            Some(at) if self.after => &s[at + search.len()..],
            Some(at) => &s[..at],
            None => "",
        };
        frame.ctx().atomics().string(out)
    }
}

/// XPath rounding: halves go towards positive infinity.
fn round_half_up(v: f64) -> f64 {
    (v + 0.5).floor()
}

/// Characters at 1-based positions `p` with `start <= p < start + length`
/// after rounding; NaN bounds select nothing.
#[allow(clippy::cast_precision_loss)]
pub(crate) fn substring(s: &str, start: f64, length: Option<f64>) -> String {
    let first = round_half_up(start);
    let end = length.map_or(f64::INFINITY, |l| first + round_half_up(l));
    s.chars()
        .enumerate()
        .filter(|(i, _)| {
            let p = (*i + 1) as f64;
            p >= first && p < end
        })
        .map(|(_, c)| c)
        .collect()
}

/// `fn:substring($input, $start, $length?)`
#[derive(Debug)]
pub struct Substring {
    input: BoxedIterator,
    start: BoxedIterator,
    length: Option<BoxedIterator>,
}

impl Substring {
    pub fn new(input: BoxedIterator, start: BoxedIterator, length: Option<BoxedIterator>) -> Self {
        Self { input, start, length }
    }
}

impl EagerEvaluator for Substring {
    fn evaluate(&self, frame: &mut Frame<'_>) -> Result<TaggedValue> {
        let s = string_of(self.input.as_ref(), frame)?;
        let start = number(atomize_one(self.start.as_ref(), frame)?)?;
        let length = match &self.length {
            Some(len) => Some(number(atomize_one(len.as_ref(), frame)?)?),
            None => None,
        };
        frame.ctx().atomics().string(&substring(&s, start, length))
    }
}

/// `fn:upper-case` and `fn:lower-case`.
#[derive(Debug)]
pub struct CaseMap {
    input: BoxedIterator,
    upper: bool,
}

impl CaseMap {
    pub fn upper(input: BoxedIterator) -> Self {
        Self { input, upper: true }
    }

    pub fn lower(input: BoxedIterator) -> Self {
        Self { input, upper: false }
    }
}

impl EagerEvaluator for CaseMap {
    fn evaluate(&self, frame: &mut Frame<'_>) -> Result<TaggedValue> {
        let s = string_of(self.input.as_ref(), frame)?;
        let mapped = if self.upper { s.to_uppercase() } else { s.to_lowercase() };
        frame.ctx().atomics().string(&mapped)
    }
}

/// `fn:string-join($input, $separator?)`
#[derive(Debug)]
pub struct StringJoin {
    input: BoxedIterator,
    separator: Option<BoxedIterator>,
}

impl StringJoin {
    pub fn new(input: BoxedIterator, separator: Option<BoxedIterator>) -> Self {
        Self { input, separator }
    }
}

impl EagerEvaluator for StringJoin {
    fn evaluate(&self, frame: &mut Frame<'_>) -> Result<TaggedValue> {
        let separator = match &self.separator {
            Some(sep) => string_of(sep.as_ref(), frame)?,
            None => String::new(),
        };
        let parts = with_open(self.input.as_ref(), frame, |it, frame| {
            let mut parts: SmallVec<[String; 8]> = SmallVec::new();
            while let Some(item) = it.next(frame)? {
                parts.push(atomize(&item)?.string_value());
            }
            Ok(parts)
        })?;
        frame.ctx().atomics().string(&parts.join(&separator))
    }
}

/// `fn:compare($a, $b, $collation?)`: `-1`, `0` or `1`, empty when either
/// side is empty.
#[derive(Debug)]
pub struct CompareFn {
    left: BoxedIterator,
    right: BoxedIterator,
    collation: Option<String>,
}

impl CompareFn {
    pub fn new(left: BoxedIterator, right: BoxedIterator) -> Self {
        Self {
            left,
            right,
            collation: None,
        }
    }

    pub fn with_collation(mut self, uri: impl Into<String>) -> Self {
        self.collation = Some(uri.into());
        self
    }
}

impl EagerEvaluator for CompareFn {
    fn evaluate(&self, frame: &mut Frame<'_>) -> Result<TaggedValue> {
        let ctx = frame.ctx();
        let collation = ctx.collation(self.collation.as_deref())?;
        let Some(a) = atomize_optional(self.left.as_ref(), frame)? else {
            return Ok(TaggedValue::empty_sequence());
        };
        let Some(b) = atomize_optional(self.right.as_ref(), frame)? else {
            return Ok(TaggedValue::empty_sequence());
        };
        let n = match collation.compare(&a.string_value(), &b.string_value()) {
            Ordering::Less => -1,
            Ordering::Equal => 0,
            Ordering::Greater => 1,
        };
        ctx.atomics().integer(n)
    }
}

/// Name of elements, attributes and processing instructions.
pub(crate) fn node_qname(node: &NodeRef, cache: &NameCache) -> Result<Option<QName>> {
    match node.node()? {
        NodePointable::ProcessingInstruction(pi) => Ok(Some(QName::local(pi.target()?))),
        NodePointable::Element(_) | NodePointable::Attribute(_) => node.name(cache),
        _ => Ok(None),
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum NamePart {
    Local,
    Lexical,
}

#[derive(Debug)]
struct NameString {
    input: BoxedIterator,
    part: NamePart,
}

impl NameString {
    fn evaluate(&self, frame: &mut Frame<'_>) -> Result<TaggedValue> {
        let ctx = frame.ctx();
        let name = match optional_node(self.input.as_ref(), frame)? {
            Some(node) => node_qname(&node, ctx.name_cache())?,
            None => None,
        };
        let s = match (name, self.part) {
            (None, _) => String::new(),
            (Some(q), NamePart::Local) => q.local.to_string(),
            (Some(q), NamePart::Lexical) => q.to_string(),
        };
        ctx.atomics().string(&s)
    }
}

/// `fn:local-name`
#[derive(Debug)]
pub struct LocalName(NameString);

impl LocalName {
    pub fn new(input: BoxedIterator) -> Self {
        Self(NameString {
            input,
            part: NamePart::Local,
        })
    }
}

impl EagerEvaluator for LocalName {
    fn evaluate(&self, frame: &mut Frame<'_>) -> Result<TaggedValue> {
        self.0.evaluate(frame)
    }
}

/// `fn:name`
#[derive(Debug)]
pub struct Name(NameString);

impl Name {
    pub fn new(input: BoxedIterator) -> Self {
        Self(NameString {
            input,
            part: NamePart::Lexical,
        })
    }
}

impl EagerEvaluator for Name {
    fn evaluate(&self, frame: &mut Frame<'_>) -> Result<TaggedValue> {
        self.0.evaluate(frame)
    }
}

/// `fn:node-name`: an `xs:QName`, or empty for unnamed nodes.
#[derive(Debug)]
pub struct NodeName {
    input: BoxedIterator,
}

impl NodeName {
    pub fn new(input: BoxedIterator) -> Self {
        Self { input }
    }
}

impl EagerEvaluator for NodeName {
    fn evaluate(&self, frame: &mut Frame<'_>) -> Result<TaggedValue> {
        let ctx = frame.ctx();
        let Some(node) = optional_node(self.input.as_ref(), frame)? else {
            return Ok(TaggedValue::empty_sequence());
        };
        match node_qname(&node, ctx.name_cache())? {
            Some(q) => ctx.atomics().qname(&q),
            None => Ok(TaggedValue::empty_sequence()),
        }
    }
}
