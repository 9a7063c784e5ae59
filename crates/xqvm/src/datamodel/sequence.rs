use super::codec;
use super::item::Item;
use super::pointable::{TaggedValue, TaggedValuePointable};
use super::tag::ValueTag;
use crate::error::{Error, Result};

/// The `count:i32 {slot:i32}*count {data}` layout shared by sequences,
/// arrays, objects and node chunks.
#[derive(Debug, Clone, Copy)]
pub(crate) struct Slotted<'a> {
    bytes: &'a [u8],
    start: usize,
    count: usize,
    data_start: usize,
    end: usize,
}

impl<'a> Slotted<'a> {
    /// `start` addresses the count field.
    pub(crate) fn new(bytes: &'a [u8], start: usize) -> Result<Self> {
        let count = codec::read_len(bytes, start)?;
        let data_start = count
            .checked_mul(4)
            .and_then(|n| n.checked_add(start + 4))
            .ok_or_else(|| Error::system("slot table overflow"))?;
        let data_len = if count == 0 {
            0
        } else {
            codec::read_len(bytes, data_start - 4)?
        };
        let end = data_start
            .checked_add(data_len)
            .filter(|&end| end <= bytes.len())
            .ok_or_else(|| Error::truncated(data_start, data_len))?;
        Ok(Self {
            bytes,
            start,
            count,
            data_start,
            end,
        })
    }

    pub(crate) fn count(&self) -> usize {
        self.count
    }

    /// Cumulative end offset of entry `i`, relative to the data area.
    pub(crate) fn slot(&self, i: usize) -> Result<usize> {
        if i >= self.count {
            return Err(Error::system(format!("slot {i} out of range ({})", self.count)));
        }
        codec::read_len(self.bytes, self.start + 4 + 4 * i)
    }

    pub(crate) fn data_len(&self) -> usize {
        self.end - self.data_start
    }

    /// Absolute `(start, len)` of entry `i` inside the backing slice.
    pub(crate) fn entry_range(&self, i: usize) -> Result<(usize, usize)> {
        let begin = if i == 0 { 0 } else { self.slot(i - 1)? };
        let end = self.slot(i)?;
        if end < begin || end > self.data_len() {
            return Err(Error::system(format!("slot table corrupt at entry {i}")));
        }
        Ok((self.data_start + begin, end - begin))
    }

    pub(crate) fn entry(&self, i: usize) -> Result<TaggedValuePointable<'a>> {
        let (start, len) = self.entry_range(i)?;
        TaggedValuePointable::new(self.bytes, start, len)
    }

    pub(crate) fn bytes(&self) -> &'a [u8] {
        self.bytes
    }

    /// Total encoded size including the count field.
    pub(crate) fn encoded_len(&self) -> usize {
        self.end - self.start
    }
}

/// View of a `Sequence`-tagged value.
#[derive(Debug, Clone, Copy)]
pub struct SequencePointable<'a> {
    slotted: Slotted<'a>,
}

impl<'a> SequencePointable<'a> {
    pub fn new(value: &TaggedValuePointable<'a>) -> Result<Self> {
        value.expect_tag(ValueTag::Sequence)?;
        let slotted = Slotted::new(value.backing(), value.body_start())?;
        if slotted.end > value.end() {
            return Err(Error::system("sequence extends past its view"));
        }
        Ok(Self { slotted })
    }

    pub fn entry_count(&self) -> usize {
        self.slotted.count()
    }

    pub fn is_empty(&self) -> bool {
        self.slotted.count() == 0
    }

    pub fn entry(&self, i: usize) -> Result<TaggedValuePointable<'a>> {
        self.slotted.entry(i)
    }

    /// Re-targets `out` at entry `i` without constructing a new view.
    pub fn entry_into(&self, i: usize, out: &mut TaggedValuePointable<'a>) -> Result<()> {
        let (start, len) = self.slotted.entry_range(i)?;
        out.set(self.slotted.bytes(), start, len)
    }

    pub(crate) fn entry_range(&self, i: usize) -> Result<(usize, usize)> {
        self.slotted.entry_range(i)
    }

    pub fn slot(&self, i: usize) -> Result<usize> {
        self.slotted.slot(i)
    }

    pub fn data_len(&self) -> usize {
        self.slotted.data_len()
    }

    pub fn iter(&self) -> SequenceEntries<'a> {
        SequenceEntries {
            seq: *self,
            next: 0,
        }
    }
}

pub struct SequenceEntries<'a> {
    seq: SequencePointable<'a>,
    next: usize,
}

impl<'a> Iterator for SequenceEntries<'a> {
    type Item = Result<TaggedValuePointable<'a>>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.next >= self.seq.entry_count() {
            return None;
        }
        let i = self.next;
        self.next += 1;
        Some(self.seq.entry(i))
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        let n = self.seq.entry_count() - self.next;
        (n, Some(n))
    }
}

/// Owned walk over the items of a value: the entries of a sequence, or the
/// value itself when it is a single item.
#[derive(Debug, Clone)]
pub struct SequenceCursor {
    value: TaggedValue,
    next: usize,
    count: usize,
}

impl SequenceCursor {
    pub fn new(value: TaggedValue) -> Result<Self> {
        let count = if value.tag() == ValueTag::Sequence {
            SequencePointable::new(&value.pointable())?.entry_count()
        } else {
            1
        };
        Ok(Self {
            value,
            next: 0,
            count,
        })
    }

    pub fn remaining(&self) -> usize {
        self.count - self.next
    }

    pub fn next_value(&mut self) -> Result<Option<TaggedValue>> {
        if self.next >= self.count {
            return Ok(None);
        }
        let i = self.next;
        self.next += 1;
        if self.value.tag() != ValueTag::Sequence {
            return Ok(Some(self.value.clone()));
        }
        let (start, len) = SequencePointable::new(&self.value.pointable())?.entry_range(i)?;
        self.value.slice(start, len).map(Some)
    }

    pub fn next_item(&mut self) -> Result<Option<Item>> {
        self.next_value()?.map(Item::from_value).transpose()
    }

    /// Advances by up to `n` items; returns how many could not be skipped.
    pub fn skip(&mut self, n: usize) -> usize {
        let k = n.min(self.remaining());
        self.next += k;
        n - k
    }
}
