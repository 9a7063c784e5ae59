//! Shared building blocks for iterator implementations.
use super::frame::Frame;
use super::iterator::RuntimeIterator;
use super::register::{LocalRegister, RegisterAllocator};
use crate::datamodel::{Item, SequenceCursor, TaggedValue};
use crate::error::{Error, Result};
use core::fmt;

/// Open flag of one iterator instance; makes `close` idempotent.
#[derive(Debug, Clone, Copy)]
pub struct Lifecycle {
    open: LocalRegister<bool>,
}

impl Lifecycle {
    pub fn new(alloc: &mut RegisterAllocator) -> Self {
        Self {
            open: alloc.local(),
        }
    }

    pub fn begin(&self, frame: &mut Frame<'_>) {
        self.open.set(frame, true);
    }

    pub fn is_open(&self, frame: &Frame<'_>) -> bool {
        self.open.flag(frame)
    }

    /// Marks the instance closed; `true` only for the first call after `begin`.
    pub fn end(&self, frame: &mut Frame<'_>) -> bool {
        let was_open = self.open.flag(frame);
        self.open.set(frame, false);
        was_open
    }
}

/// An expression computed in one step.
pub trait EagerEvaluator: fmt::Debug + Send + Sync {
    fn evaluate(&self, frame: &mut Frame<'_>) -> Result<TaggedValue>;
}

/// Exposes an [`EagerEvaluator`] through the pull protocol.
///
/// The first `next` evaluates; a sequence result is then walked entry by
/// entry, anything else is returned once.
#[derive(Debug)]
pub struct Eager<E> {
    inner: E,
    life: Lifecycle,
    cursor: LocalRegister<SequenceCursor>,
}

impl<E: EagerEvaluator> Eager<E> {
    pub fn new(alloc: &mut RegisterAllocator, inner: E) -> Self {
        Self {
            inner,
            life: Lifecycle::new(alloc),
            cursor: alloc.local(),
        }
    }

    pub fn inner(&self) -> &E {
        &self.inner
    }

    fn walk<'f>(&self, frame: &'f mut Frame<'_>) -> Result<&'f mut SequenceCursor> {
        if !self.cursor.is_set(frame) {
            let value = self.inner.evaluate(frame)?;
            self.cursor.set(frame, SequenceCursor::new(value)?);
        }
        self.cursor
            .get_mut(frame)
            .ok_or_else(|| Error::system("eager cursor register lost"))
    }
}

impl<E: EagerEvaluator> RuntimeIterator for Eager<E> {
    fn open(&self, frame: &mut Frame<'_>) -> Result<()> {
        self.cursor.clear(frame);
        self.life.begin(frame);
        Ok(())
    }

    fn next(&self, frame: &mut Frame<'_>) -> Result<Option<Item>> {
        self.walk(frame)?.next_item()
    }

    fn close(&self, frame: &mut Frame<'_>) {
        if self.life.end(frame) {
            self.cursor.clear(frame);
        }
    }

    fn evaluate_eagerly(&self, frame: &mut Frame<'_>) -> Result<TaggedValue> {
        self.inner.evaluate(frame)
    }

    fn skip(&self, frame: &mut Frame<'_>, n: usize) -> Result<usize> {
        Ok(self.walk(frame)?.skip(n))
    }
}
