use crate::datamodel::codec;
use crate::datamodel::pool::Poolable;
use crate::datamodel::ValueStorage;
use crate::error::{Error, Result};
use crate::names::NameEncoder;
use core::cmp::Ordering;

/// Document-scoped string dictionary.
///
/// Entries are appended in first-seen order (their index is the code) and a
/// sorted index list is kept alongside for binary-search lookup.
#[derive(Debug, Default)]
pub struct DictionaryBuilder {
    end_offsets: Vec<i32>,
    sorted: Vec<i32>,
    data: ValueStorage,
}

impl Poolable for DictionaryBuilder {
    fn reset(&mut self) {
        DictionaryBuilder::reset(self);
    }
}

impl DictionaryBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn reset(&mut self) {
        self.end_offsets.clear();
        self.sorted.clear();
        self.data.reset();
    }

    pub fn len(&self) -> usize {
        self.end_offsets.len()
    }

    pub fn is_empty(&self) -> bool {
        self.end_offsets.is_empty()
    }

    pub fn string(&self, idx: i32) -> Result<&str> {
        let i = usize::try_from(idx)
            .ok()
            .filter(|&i| i < self.end_offsets.len())
            .ok_or_else(|| Error::system(format!("dictionary index {idx} out of range")))?;
        let start = match i {
            0 => 0,
            _ => usize::try_from(self.end_offsets[i - 1]).unwrap_or_default(),
        };
        codec::read_str(self.data.as_slice(), start).map(|(s, _)| s)
    }

    /// `Ok(index)` on a hit, `Err(insertion point)` otherwise.
    fn search(&self, s: &str) -> Result<core::result::Result<usize, usize>> {
        let (mut lo, mut hi) = (0, self.sorted.len());
        while lo < hi {
            let mid = lo + (hi - lo) / 2;
            match self.string(self.sorted[mid])?.cmp(s) {
                Ordering::Equal => return Ok(Ok(mid)),
                Ordering::Less => lo = mid + 1,
                Ordering::Greater => hi = mid,
            }
        }
        Ok(Err(lo))
    }

    pub fn find(&self, s: &str) -> Result<Option<i32>> {
        Ok(self.search(s)?.ok().map(|pos| self.sorted[pos]))
    }

    /// Index of `s`, interning it first when new.
    pub fn lookup(&mut self, s: &str) -> Result<i32> {
        let pos = match self.search(s)? {
            Ok(pos) => return Ok(self.sorted[pos]),
            Err(pos) => pos,
        };
        let idx = i32::try_from(self.end_offsets.len())
            .map_err(|_| Error::system("dictionary exhausted the i32 code space"))?;
        self.data.put_u16(codec::checked_str_len(s)?);
        self.data.put_slice(s.as_bytes());
        self.data.put_i32(idx);
        let end = i32::try_from(self.data.len())
            .map_err(|_| Error::system("dictionary data area overflow"))?;
        self.end_offsets.push(end);
        self.sorted.insert(pos, idx);
        Ok(idx)
    }

    /// `size count {end-offset}* {sorted-index}* {entry}*`; size counts itself.
    pub fn write(&self, out: &mut ValueStorage) -> Result<()> {
        let size_at = out.len();
        out.put_i32(0);
        let count = i32::try_from(self.end_offsets.len())
            .map_err(|_| Error::system("dictionary too large"))?;
        out.put_i32(count);
        for &end in &self.end_offsets {
            out.put_i32(end);
        }
        for &idx in &self.sorted {
            out.put_i32(idx);
        }
        out.put_slice(self.data.as_slice());
        let size = i32::try_from(out.len() - size_at)
            .map_err(|_| Error::system("dictionary too large"))?;
        out.patch_i32(size_at, size)
    }
}

impl NameEncoder for DictionaryBuilder {
    fn encode_str(&mut self, s: &str) -> Result<i32> {
        self.lookup(s)
    }
}
