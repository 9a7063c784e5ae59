use super::SlottedArea;
use crate::datamodel::pool::Poolable;
use crate::datamodel::{
    Item, SequencePointable, TaggedValue, TaggedValuePointable, ValueStorage, ValueTag,
};
use crate::error::{Error, Result};

/// Builds `Sequence` values with singleton flattening and splicing.
#[derive(Debug, Default)]
pub struct SequenceBuilder {
    area: SlottedArea,
}

impl Poolable for SequenceBuilder {
    fn reset(&mut self) {
        SequenceBuilder::reset(self);
    }
}

impl SequenceBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn reset(&mut self) {
        self.area.reset();
    }

    /// Number of entries added so far.
    pub fn len(&self) -> usize {
        self.area.count()
    }

    pub fn is_empty(&self) -> bool {
        self.area.count() == 0
    }

    /// Appends a value; the entries of a sequence are spliced in.
    pub fn add_item(&mut self, item: &TaggedValuePointable<'_>) -> Result<()> {
        if item.tag()? == ValueTag::Sequence {
            let seq = SequencePointable::new(item)?;
            for entry in seq.iter() {
                self.area.push_entry(entry?.as_slice())?;
            }
            return Ok(());
        }
        self.area.push_entry(item.as_slice())
    }

    pub fn add_value(&mut self, value: &TaggedValue) -> Result<()> {
        self.add_item(&value.pointable())
    }

    /// Nodes are materialized as node trees.
    pub fn add(&mut self, item: &Item) -> Result<()> {
        match item {
            Item::Value(v) => self.add_value(v),
            Item::Node(n) => self.add_value(&n.materialize()?),
        }
    }

    /// Scratch area for writing one non-sequence item in place; close it with
    /// [`SequenceBuilder::end_item`].
    pub fn item_area(&mut self) -> &mut ValueStorage {
        self.area.data_mut()
    }

    pub fn end_item(&mut self) -> Result<()> {
        self.area.end_entry()
    }

    /// Writes the sequence, or the lone item itself when there is exactly one.
    pub fn finish(&mut self, out: &mut ValueStorage) -> Result<()> {
        if self.area.count() == 1 {
            let only = self
                .area
                .entry(0)
                .ok_or_else(|| Error::system("sequence slot table corrupt"))?;
            out.put_slice(only);
            return Ok(());
        }
        out.put_u8(ValueTag::Sequence.code());
        self.area.write(out)
    }

    /// Finishes into a fresh buffer and freezes it.
    pub fn build(&mut self) -> Result<TaggedValue> {
        let mut out = ValueStorage::new();
        self.finish(&mut out)?;
        out.freeze()
    }
}
