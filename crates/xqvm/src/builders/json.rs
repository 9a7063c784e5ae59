use super::SlottedArea;
use super::atomic::put_str;
use crate::datamodel::pool::Poolable;
use crate::datamodel::{Item, TaggedValue, TaggedValuePointable, ValueStorage, ValueTag};
use crate::error::Result;

/// Builds `Array` values. Members are stored as given; a one-member array stays an array.
#[derive(Debug, Default)]
pub struct ArrayBuilder {
    area: SlottedArea,
}

impl Poolable for ArrayBuilder {
    fn reset(&mut self) {
        ArrayBuilder::reset(self);
    }
}

impl ArrayBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn reset(&mut self) {
        self.area.reset();
    }

    pub fn len(&self) -> usize {
        self.area.count()
    }

    pub fn is_empty(&self) -> bool {
        self.area.count() == 0
    }

    pub fn add_item(&mut self, member: &TaggedValuePointable<'_>) -> Result<()> {
        self.area.push_entry(member.as_slice())
    }

    pub fn add(&mut self, member: &Item) -> Result<()> {
        let value = member.to_value()?;
        self.add_item(&value.pointable())
    }

    pub fn finish(&mut self, out: &mut ValueStorage) -> Result<()> {
        out.put_u8(ValueTag::Array.code());
        self.area.write(out)
    }

    pub fn build(&mut self) -> Result<TaggedValue> {
        let mut out = ValueStorage::new();
        self.finish(&mut out)?;
        out.freeze()
    }
}

/// Builds `Object` values from key/value pairs.
#[derive(Debug, Default)]
pub struct ObjectBuilder {
    area: SlottedArea,
}

impl Poolable for ObjectBuilder {
    fn reset(&mut self) {
        ObjectBuilder::reset(self);
    }
}

impl ObjectBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn reset(&mut self) {
        self.area.reset();
    }

    pub fn len(&self) -> usize {
        self.area.count()
    }

    pub fn is_empty(&self) -> bool {
        self.area.count() == 0
    }

    pub fn add_item(&mut self, key: &str, value: &TaggedValuePointable<'_>) -> Result<()> {
        let data = self.area.data_mut();
        put_str(data, key)?;
        data.put_slice(value.as_slice());
        self.area.end_entry()
    }

    pub fn finish(&mut self, out: &mut ValueStorage) -> Result<()> {
        out.put_u8(ValueTag::Object.code());
        self.area.write(out)
    }

    pub fn build(&mut self) -> Result<TaggedValue> {
        let mut out = ValueStorage::new();
        self.finish(&mut out)?;
        out.freeze()
    }
}
