use super::codec;
use super::pointable::TaggedValuePointable;
use super::sequence::Slotted;
use super::tag::ValueTag;
use crate::error::{Error, Result};

/// View of an `Array`: the sequence layout without singleton flattening.
#[derive(Debug, Clone, Copy)]
pub struct ArrayPointable<'a> {
    slotted: Slotted<'a>,
}

impl<'a> ArrayPointable<'a> {
    pub fn new(value: &TaggedValuePointable<'a>) -> Result<Self> {
        value.expect_tag(ValueTag::Array)?;
        Ok(Self {
            slotted: Slotted::new(value.backing(), value.body_start())?,
        })
    }

    pub fn entry_count(&self) -> usize {
        self.slotted.count()
    }

    pub fn entry(&self, i: usize) -> Result<TaggedValuePointable<'a>> {
        self.slotted.entry(i)
    }
}

/// View of an `Object`: entries are a length-prefixed key followed by a tagged value.
#[derive(Debug, Clone, Copy)]
pub struct ObjectPointable<'a> {
    slotted: Slotted<'a>,
}

impl<'a> ObjectPointable<'a> {
    pub fn new(value: &TaggedValuePointable<'a>) -> Result<Self> {
        value.expect_tag(ValueTag::Object)?;
        Ok(Self {
            slotted: Slotted::new(value.backing(), value.body_start())?,
        })
    }

    pub fn entry_count(&self) -> usize {
        self.slotted.count()
    }

    pub fn key(&self, i: usize) -> Result<&'a str> {
        let (start, _) = self.slotted.entry_range(i)?;
        codec::read_str(self.slotted.bytes(), start).map(|(s, _)| s)
    }

    pub fn value(&self, i: usize) -> Result<TaggedValuePointable<'a>> {
        let (start, len) = self.value_range(i)?;
        TaggedValuePointable::new(self.slotted.bytes(), start, len)
    }

    pub(crate) fn value_range(&self, i: usize) -> Result<(usize, usize)> {
        let (start, len) = self.slotted.entry_range(i)?;
        let key_len = codec::encoded_str_len(self.slotted.bytes(), start)?;
        if key_len >= len {
            return Err(Error::system(format!("object entry {i} has no value")));
        }
        Ok((start + key_len, len - key_len))
    }

    /// Value of the first entry with `key`.
    pub fn get(&self, key: &str) -> Result<Option<TaggedValuePointable<'a>>> {
        for i in 0..self.entry_count() {
            if self.key(i)? == key {
                return self.value(i).map(Some);
            }
        }
        Ok(None)
    }

    pub fn keys(&self) -> impl Iterator<Item = Result<&'a str>> + '_ {
        (0..self.entry_count()).map(|i| self.key(i))
    }
}
