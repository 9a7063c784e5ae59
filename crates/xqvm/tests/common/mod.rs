#![allow(dead_code)]

use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use xqvm::datamodel::{AtomicValue, Item, TaggedValue};
use xqvm::error::{Error, ErrorCode, Result};
use xqvm::runtime::functions::{Constant, Range};
use xqvm::runtime::{BoxedIterator, DynamicContext, Frame, Lifecycle, LocalRegister, RegisterAllocator, RuntimeIterator};

pub fn constant(alloc: &mut RegisterAllocator, value: TaggedValue) -> BoxedIterator {
    Box::new(Constant::new(alloc, value))
}

pub fn int(alloc: &mut RegisterAllocator, ctx: &DynamicContext, v: i64) -> BoxedIterator {
    constant(alloc, ctx.atomics().integer(v).unwrap())
}

pub fn string(alloc: &mut RegisterAllocator, ctx: &DynamicContext, s: &str) -> BoxedIterator {
    constant(alloc, ctx.atomics().string(s).unwrap())
}

/// `from to to`
pub fn range(alloc: &mut RegisterAllocator, ctx: &DynamicContext, from: i64, to: i64) -> BoxedIterator {
    let (a, b) = (int(alloc, ctx, from), int(alloc, ctx, to));
    Box::new(Range::new(alloc, a, b))
}

pub fn atomics(items: &[Item]) -> Vec<AtomicValue> {
    items.iter().map(|i| i.atomic().unwrap()).collect()
}

pub fn ints(values: &[i64]) -> Vec<AtomicValue> {
    values.iter().copied().map(AtomicValue::integer).collect()
}

/// Effective `open`/`close` calls seen by a [`Tracked`].
#[derive(Debug, Default)]
pub struct Calls {
    opens: AtomicUsize,
    closes: AtomicUsize,
}

impl Calls {
    pub fn opens(&self) -> usize {
        self.opens.load(Ordering::SeqCst)
    }

    pub fn closes(&self) -> usize {
        self.closes.load(Ordering::SeqCst)
    }
}

/// Passes items through and records opens and effective closes; optionally
/// fails on the n-th pull.
#[derive(Debug)]
pub struct Tracked {
    inner: BoxedIterator,
    calls: Arc<Calls>,
    fail_at: Option<usize>,
    pulled: LocalRegister<usize>,
    life: Lifecycle,
}

impl Tracked {
    pub fn new(alloc: &mut RegisterAllocator, inner: BoxedIterator) -> (Self, Arc<Calls>) {
        let calls = Arc::new(Calls::default());
        let tracked = Self {
            inner,
            calls: Arc::clone(&calls),
            fail_at: None,
            pulled: alloc.local(),
            life: Lifecycle::new(alloc),
        };
        (tracked, calls)
    }

    /// The pull with 0-based index `n` fails with `FOER0000`.
    pub fn failing_at(mut self, n: usize) -> Self {
        self.fail_at = Some(n);
        self
    }
}

impl RuntimeIterator for Tracked {
    fn open(&self, frame: &mut Frame<'_>) -> Result<()> {
        self.calls.opens.fetch_add(1, Ordering::SeqCst);
        self.life.begin(frame);
        self.pulled.set(frame, 0);
        self.inner.open(frame)
    }

    fn next(&self, frame: &mut Frame<'_>) -> Result<Option<Item>> {
        let n = self.pulled.get(frame).copied().unwrap_or(0);
        self.pulled.set(frame, n + 1);
        if self.fail_at == Some(n) {
            return Err(Error::new(ErrorCode::FOER0000, "injected failure"));
        }
        self.inner.next(frame)
    }

    fn close(&self, frame: &mut Frame<'_>) {
        if self.life.end(frame) {
            self.calls.closes.fetch_add(1, Ordering::SeqCst);
            self.inner.close(frame);
        }
    }
}
