use super::codec;
use super::tag::ValueTag;
use crate::error::{Error, Result};
use bytes::Bytes;
use core::fmt;

/// Non-owning view of `len` bytes at `start` inside a backing slice.
///
/// Views are plain `Copy` values; re-targeting one with [`Pointable::set`] is
/// the hot-loop way of walking encoded data.
#[derive(Clone, Copy, Default, PartialEq, Eq)]
pub struct Pointable<'a> {
    bytes: &'a [u8],
    start: usize,
    len: usize,
}

impl<'a> Pointable<'a> {
    pub const fn empty() -> Self {
        Self {
            bytes: &[],
            start: 0,
            len: 0,
        }
    }

    pub fn new(bytes: &'a [u8], start: usize, len: usize) -> Result<Self> {
        let mut p = Self::empty();
        p.set(bytes, start, len)?;
        Ok(p)
    }

    pub fn whole(bytes: &'a [u8]) -> Self {
        Self {
            bytes,
            start: 0,
            len: bytes.len(),
        }
    }

    /// Re-targets the view. Out-of-bounds ranges are rejected and leave the view unchanged.
    pub fn set(&mut self, bytes: &'a [u8], start: usize, len: usize) -> Result<()> {
        let in_bounds = start
            .checked_add(len)
            .is_some_and(|end| end <= bytes.len());
        if !in_bounds {
            return Err(Error::system(format!(
                "view [{start}, +{len}) outside backing array of {} bytes",
                bytes.len()
            )));
        }
        self.bytes = bytes;
        self.start = start;
        self.len = len;
        Ok(())
    }

    pub fn set_pointable(&mut self, other: &Pointable<'a>) {
        *self = *other;
    }

    pub fn backing(&self) -> &'a [u8] {
        self.bytes
    }

    pub fn start(&self) -> usize {
        self.start
    }

    pub fn len(&self) -> usize {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    pub fn as_slice(&self) -> &'a [u8] {
        &self.bytes[self.start..self.start + self.len]
    }
}

impl fmt::Debug for Pointable<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Pointable")
            .field("start", &self.start)
            .field("len", &self.len)
            .finish_non_exhaustive()
    }
}

/// View of a tag-prefixed value.
#[derive(Clone, Copy, Default, PartialEq, Eq)]
pub struct TaggedValuePointable<'a> {
    inner: Pointable<'a>,
}

impl<'a> TaggedValuePointable<'a> {
    pub fn new(bytes: &'a [u8], start: usize, len: usize) -> Result<Self> {
        let inner = Pointable::new(bytes, start, len)?;
        if inner.is_empty() {
            return Err(Error::system("tagged value without tag byte"));
        }
        Ok(Self { inner })
    }

    pub fn whole(bytes: &'a [u8]) -> Result<Self> {
        Self::new(bytes, 0, bytes.len())
    }

    pub fn set(&mut self, bytes: &'a [u8], start: usize, len: usize) -> Result<()> {
        if len == 0 {
            return Err(Error::system("tagged value without tag byte"));
        }
        self.inner.set(bytes, start, len)
    }

    pub fn set_pointable(&mut self, other: &TaggedValuePointable<'a>) {
        *self = *other;
    }

    pub fn tag(&self) -> Result<ValueTag> {
        ValueTag::try_from(codec::read_u8(self.inner.bytes, self.inner.start)?)
    }

    /// Fails with `XPTY0004` unless the value carries `expected`.
    pub fn expect_tag(&self, expected: ValueTag) -> Result<()> {
        let tag = self.tag()?;
        if tag == expected {
            Ok(())
        } else {
            Err(Error::type_mismatch(&format!("{expected:?}"), tag))
        }
    }

    pub fn pointable(&self) -> Pointable<'a> {
        self.inner
    }

    pub fn backing(&self) -> &'a [u8] {
        self.inner.bytes
    }

    pub fn start(&self) -> usize {
        self.inner.start
    }

    pub fn len(&self) -> usize {
        self.inner.len
    }

    pub fn is_empty(&self) -> bool {
        self.inner.is_empty()
    }

    pub fn as_slice(&self) -> &'a [u8] {
        self.inner.as_slice()
    }

    /// Offset of the first body byte inside the backing slice.
    pub(crate) fn body_start(&self) -> usize {
        self.inner.start + 1
    }

    pub(crate) fn end(&self) -> usize {
        self.inner.start + self.inner.len
    }
}

impl fmt::Debug for TaggedValuePointable<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TaggedValuePointable")
            .field("tag", &self.tag().ok())
            .field("start", &self.inner.start)
            .field("len", &self.inner.len)
            .finish()
    }
}

/// Owned, frozen encoding of one value (tag byte included).
///
/// Cloning and slicing share the underlying buffer.
#[derive(Clone, PartialEq, Eq, Hash)]
pub struct TaggedValue {
    bytes: Bytes,
    tag: ValueTag,
}

static EMPTY_SEQUENCE: [u8; 5] = [ValueTag::Sequence as u8, 0, 0, 0, 0];
static TRUE: [u8; 2] = [ValueTag::Boolean as u8, 1];
static FALSE: [u8; 2] = [ValueTag::Boolean as u8, 0];

impl TaggedValue {
    pub fn from_bytes(bytes: Bytes) -> Result<Self> {
        let first = *bytes
            .first()
            .ok_or_else(|| Error::system("tagged value without tag byte"))?;
        Ok(Self {
            tag: ValueTag::try_from(first)?,
            bytes,
        })
    }

    pub fn empty_sequence() -> Self {
        Self {
            bytes: Bytes::from_static(&EMPTY_SEQUENCE),
            tag: ValueTag::Sequence,
        }
    }

    pub fn boolean(b: bool) -> Self {
        Self {
            bytes: Bytes::from_static(if b { &TRUE } else { &FALSE }),
            tag: ValueTag::Boolean,
        }
    }

    pub fn tag(&self) -> ValueTag {
        self.tag
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.bytes
    }

    pub fn len(&self) -> usize {
        self.bytes.len()
    }

    /// Always false: every value holds at least its tag.
    pub fn is_empty(&self) -> bool {
        self.bytes.is_empty()
    }

    pub fn is_empty_sequence(&self) -> bool {
        self.tag == ValueTag::Sequence && self.bytes.get(1..5) == Some(&[0, 0, 0, 0][..])
    }

    pub fn pointable(&self) -> TaggedValuePointable<'_> {
        TaggedValuePointable {
            inner: Pointable::whole(&self.bytes),
        }
    }

    /// Zero-copy sub-value, e.g. one entry of a sequence.
    pub fn slice(&self, start: usize, len: usize) -> Result<Self> {
        Pointable::new(&self.bytes, start, len)?;
        Self::from_bytes(self.bytes.slice(start..start + len))
    }

    /// Zero-copy sub-value addressed by a view into this value's own bytes.
    pub fn slice_view(&self, view: &TaggedValuePointable<'_>) -> Result<Self> {
        if !core::ptr::eq(view.backing(), self.as_bytes()) {
            return Err(Error::system("view does not point into this value"));
        }
        self.slice(view.start(), view.len())
    }

    pub fn bytes(&self) -> &Bytes {
        &self.bytes
    }

    pub fn into_bytes(self) -> Bytes {
        self.bytes
    }

    /// Copies the bytes a view addresses into a new owned value.
    pub fn copy_from(view: &TaggedValuePointable<'_>) -> Result<Self> {
        Self::from_bytes(Bytes::copy_from_slice(view.as_slice()))
    }
}

impl fmt::Debug for TaggedValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "TaggedValue({:?}, {} bytes)", self.tag, self.bytes.len())
    }
}
