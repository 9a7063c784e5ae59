use super::pointable::{TaggedValue, TaggedValuePointable};
use crate::error::{Error, Result};
use bytes::{BufMut, Bytes, BytesMut};

/// Growable output buffer builders write into.
///
/// [`ValueStorage::freeze`] splits the written bytes off as an immutable
/// shared value and keeps the remaining capacity for the next construction.
#[derive(Debug, Default)]
pub struct ValueStorage {
    buf: BytesMut,
}

impl ValueStorage {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            buf: BytesMut::with_capacity(capacity),
        }
    }

    pub fn reset(&mut self) {
        self.buf.clear();
    }

    pub fn len(&self) -> usize {
        self.buf.len()
    }

    pub fn is_empty(&self) -> bool {
        self.buf.is_empty()
    }

    pub fn as_slice(&self) -> &[u8] {
        &self.buf
    }

    pub fn put_u8(&mut self, v: u8) {
        self.buf.put_u8(v);
    }

    pub fn put_i8(&mut self, v: i8) {
        self.buf.put_i8(v);
    }

    pub fn put_i16(&mut self, v: i16) {
        self.buf.put_i16(v);
    }

    pub fn put_u16(&mut self, v: u16) {
        self.buf.put_u16(v);
    }

    pub fn put_i32(&mut self, v: i32) {
        self.buf.put_i32(v);
    }

    pub fn put_i64(&mut self, v: i64) {
        self.buf.put_i64(v);
    }

    pub fn put_f32(&mut self, v: f32) {
        self.buf.put_f32(v);
    }

    pub fn put_f64(&mut self, v: f64) {
        self.buf.put_f64(v);
    }

    pub fn put_slice(&mut self, bytes: &[u8]) {
        self.buf.put_slice(bytes);
    }

    /// Overwrites a previously reserved `i32` field.
    pub fn patch_i32(&mut self, at: usize, v: i32) -> Result<()> {
        let field = self
            .buf
            .get_mut(at..at + 4)
            .ok_or_else(|| Error::truncated(at, 4))?;
        field.copy_from_slice(&v.to_be_bytes());
        Ok(())
    }

    pub fn patch_u8(&mut self, at: usize, v: u8) -> Result<()> {
        let field = self.buf.get_mut(at).ok_or_else(|| Error::truncated(at, 1))?;
        *field = v;
        Ok(())
    }

    pub fn truncate(&mut self, len: usize) {
        self.buf.truncate(len);
    }

    /// View of the bytes written since `start`.
    pub fn pointable_from(&self, start: usize) -> Result<TaggedValuePointable<'_>> {
        TaggedValuePointable::new(&self.buf, start, self.buf.len().saturating_sub(start))
    }

    /// Splits off everything written so far as one frozen value.
    pub fn freeze(&mut self) -> Result<TaggedValue> {
        TaggedValue::from_bytes(self.buf.split().freeze())
    }

    pub fn take_bytes(&mut self) -> Bytes {
        self.buf.split().freeze()
    }
}
