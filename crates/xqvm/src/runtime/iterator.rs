//! The pull protocol every runtime iterator implements.
//!
//! Per frame an iterator moves `unopened -> opened -> draining -> closed`.
//! `close` is idempotent and callable after a partial `open` or an error
//! from `next`, so owners close their children on every exit path.
use super::frame::Frame;
use crate::builders::SequenceBuilder;
use crate::datamodel::{Item, TaggedValue};
use crate::error::Result;
use core::fmt;

pub trait RuntimeIterator: fmt::Debug + Send + Sync {
    fn open(&self, frame: &mut Frame<'_>) -> Result<()>;

    /// `None` at the end of the sequence.
    fn next(&self, frame: &mut Frame<'_>) -> Result<Option<Item>>;

    fn close(&self, frame: &mut Frame<'_>);

    /// The whole result as one value: opens, drains and closes.
    fn evaluate_eagerly(&self, frame: &mut Frame<'_>) -> Result<TaggedValue> {
        drain_to_value(self, frame)
    }

    /// Advances over up to `n` items of an open iterator without handing
    /// them out. Returns how many could not be skipped.
    fn skip(&self, frame: &mut Frame<'_>, n: usize) -> Result<usize> {
        for done in 0..n {
            if self.next(frame)?.is_none() {
                return Ok(n - done);
            }
        }
        Ok(0)
    }
}

pub type BoxedIterator = Box<dyn RuntimeIterator>;

/// Runs `f` against the opened iterator and closes it afterwards, also when
/// `open` or `f` fail.
pub fn with_open<I, R>(
    it: &I,
    frame: &mut Frame<'_>,
    f: impl FnOnce(&I, &mut Frame<'_>) -> Result<R>,
) -> Result<R>
where
    I: RuntimeIterator + ?Sized,
{
    let result = it.open(frame).and_then(|()| f(it, frame));
    it.close(frame);
    result
}

/// Lazy iterators' eager form: every item goes through a sequence builder.
pub fn drain_to_value<I>(it: &I, frame: &mut Frame<'_>) -> Result<TaggedValue>
where
    I: RuntimeIterator + ?Sized,
{
    let mut builder = frame.pool().borrow::<SequenceBuilder>();
    with_open(it, frame, |it, frame| {
        while let Some(item) = it.next(frame)? {
            builder.add(&item)?;
        }
        Ok(())
    })?;
    builder.build()
}

/// Collects all items, keeping node identity.
pub fn drain_items<I>(it: &I, frame: &mut Frame<'_>) -> Result<Vec<Item>>
where
    I: RuntimeIterator + ?Sized,
{
    with_open(it, frame, |it, frame| {
        let mut items = Vec::new();
        while let Some(item) = it.next(frame)? {
            items.push(item);
        }
        Ok(items)
    })
}
