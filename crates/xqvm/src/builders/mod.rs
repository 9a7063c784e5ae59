//! Writers for the tagged value encoding.
//!
//! Composite builders collect entries into an internal scratch area and copy
//! it behind the slot table on `finish`, so the output buffer only ever sees
//! finished bytes. Every builder is reusable after `reset`.
pub mod atomic;
pub mod dictionary;
pub mod json;
pub mod nodes;
pub mod sequence;

pub use atomic::{AtomicValueFactory, write_atomic};
pub use dictionary::DictionaryBuilder;
pub use json::{ArrayBuilder, ObjectBuilder};
pub use nodes::{
    AttributeNodeBuilder, DocumentNodeBuilder, ElementNodeBuilder, LeafNodeBuilder,
    NodeTreeBuilder, NodeTreeOptions, NodeTreeWriter, write_tree,
};
pub use sequence::SequenceBuilder;

use crate::consts::MAX_DATA_LEN;
use crate::datamodel::ValueStorage;
use crate::error::{Error, Result};

/// `count {slot}* {data}` under construction.
#[derive(Debug, Default)]
pub(crate) struct SlottedArea {
    slots: Vec<i32>,
    data: ValueStorage,
}

impl SlottedArea {
    pub(crate) fn reset(&mut self) {
        self.slots.clear();
        self.data.reset();
    }

    pub(crate) fn count(&self) -> usize {
        self.slots.len()
    }

    pub(crate) fn data_mut(&mut self) -> &mut ValueStorage {
        &mut self.data
    }

    /// Records everything written to the data area since the last entry as one entry.
    pub(crate) fn end_entry(&mut self) -> Result<()> {
        let len = self.data.len();
        let slot = i32::try_from(len).map_err(|_| {
            Error::system(format!(
                "composite data area of {len} bytes exceeds {MAX_DATA_LEN}"
            ))
        })?;
        self.slots.push(slot);
        Ok(())
    }

    pub(crate) fn push_entry(&mut self, bytes: &[u8]) -> Result<()> {
        self.data.put_slice(bytes);
        self.end_entry()
    }

    pub(crate) fn entry(&self, i: usize) -> Option<&[u8]> {
        let end = usize::try_from(*self.slots.get(i)?).ok()?;
        let begin = match i {
            0 => 0,
            _ => usize::try_from(self.slots[i - 1]).ok()?,
        };
        self.data.as_slice().get(begin..end)
    }

    pub(crate) fn write(&self, out: &mut ValueStorage) -> Result<()> {
        let count = i32::try_from(self.slots.len())
            .map_err(|_| Error::system("too many entries for one composite"))?;
        out.put_i32(count);
        for &slot in &self.slots {
            out.put_i32(slot);
        }
        out.put_slice(self.data.as_slice());
        Ok(())
    }
}
