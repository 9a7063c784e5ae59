//! Tuple streams of FLWOR expressions.
//!
//! A tuple is the set of variable registers bound by the clauses so far.
//! Every chain starts with [`UnitTuple`]; [`FlworIterator`] turns the final
//! tuple stream into items by running the return expression once per tuple.
use super::base::Lifecycle;
use super::frame::Frame;
use super::functions::compare::compare_atomic;
use super::functions::helpers::{atomic_item, atomize, effective_boolean_value};
use super::iterator::{BoxedIterator, RuntimeIterator, drain_items};
use super::register::{LocalRegister, RegisterAllocator};
use crate::datamodel::{AtomicValue, Item};
use crate::error::{Error, ErrorCode, Result};
use core::cmp::Ordering;
use core::fmt;
use std::collections::VecDeque;

/// Value of a bound variable.
pub type Binding = Vec<Item>;

pub trait TupleIterator: fmt::Debug + Send + Sync {
    fn open(&self, frame: &mut Frame<'_>) -> Result<()>;

    /// Binds the next tuple; `false` at the end.
    fn next(&self, frame: &mut Frame<'_>) -> Result<bool>;

    fn close(&self, frame: &mut Frame<'_>);
}

pub type BoxedTuple = Box<dyn TupleIterator>;

fn bind_one(frame: &mut Frame<'_>, var: LocalRegister<Binding>, item: Item) {
    match var.get_mut(frame) {
        Some(binding) => {
            binding.clear();
            binding.push(item);
        }
        None => var.set(frame, vec![item]),
    }
}

/// Exactly one empty tuple.
#[derive(Debug)]
pub struct UnitTuple {
    life: Lifecycle,
    done: LocalRegister<bool>,
}

impl UnitTuple {
    pub fn new(alloc: &mut RegisterAllocator) -> Self {
        Self {
            life: Lifecycle::new(alloc),
            done: alloc.local(),
        }
    }
}

impl TupleIterator for UnitTuple {
    fn open(&self, frame: &mut Frame<'_>) -> Result<()> {
        self.life.begin(frame);
        self.done.set(frame, false);
        Ok(())
    }

    fn next(&self, frame: &mut Frame<'_>) -> Result<bool> {
        if self.done.flag(frame) {
            return Ok(false);
        }
        self.done.set(frame, true);
        Ok(true)
    }

    fn close(&self, frame: &mut Frame<'_>) {
        self.life.end(frame);
    }
}

/// `for $var at $pos in seq`.
#[derive(Debug)]
pub struct ForTuple {
    input: BoxedTuple,
    seq: BoxedIterator,
    var: LocalRegister<Binding>,
    position: Option<LocalRegister<Binding>>,
    life: Lifecycle,
    seq_open: LocalRegister<bool>,
    counter: LocalRegister<i64>,
}

impl ForTuple {
    pub fn new(
        alloc: &mut RegisterAllocator,
        input: BoxedTuple,
        var: LocalRegister<Binding>,
        seq: BoxedIterator,
    ) -> Self {
        Self {
            input,
            seq,
            var,
            position: None,
            life: Lifecycle::new(alloc),
            seq_open: alloc.local(),
            counter: alloc.local(),
        }
    }

    /// Also binds the 1-based position of the item.
    pub fn with_position(mut self, position: LocalRegister<Binding>) -> Self {
        self.position = Some(position);
        self
    }
}

impl TupleIterator for ForTuple {
    fn open(&self, frame: &mut Frame<'_>) -> Result<()> {
        self.life.begin(frame);
        self.seq_open.set(frame, false);
        self.input.open(frame)
    }

    fn next(&self, frame: &mut Frame<'_>) -> Result<bool> {
        loop {
            if !self.seq_open.flag(frame) {
                if !self.input.next(frame)? {
                    return Ok(false);
                }
                // flag first: close must reach a partially opened sequence
                self.seq_open.set(frame, true);
                self.counter.set(frame, 0);
                self.seq.open(frame)?;
            }
            match self.seq.next(frame)? {
                Some(item) => {
                    bind_one(frame, self.var, item);
                    if let Some(position) = self.position {
                        let pos = self.counter.get(frame).copied().unwrap_or(0) + 1;
                        self.counter.set(frame, pos);
                        let item = atomic_item(frame, &AtomicValue::integer(pos))?;
                        bind_one(frame, position, item);
                    }
                    return Ok(true);
                }
                None => {
                    self.seq.close(frame);
                    self.seq_open.set(frame, false);
                }
            }
        }
    }

    fn close(&self, frame: &mut Frame<'_>) {
        if !self.life.end(frame) {
            return;
        }
        if self.seq_open.flag(frame) {
            self.seq.close(frame);
            self.seq_open.set(frame, false);
        }
        self.var.clear(frame);
        self.input.close(frame);
    }
}

/// `let $var := expr`.
#[derive(Debug)]
pub struct LetTuple {
    input: BoxedTuple,
    expr: BoxedIterator,
    var: LocalRegister<Binding>,
    life: Lifecycle,
}

impl LetTuple {
    pub fn new(
        alloc: &mut RegisterAllocator,
        input: BoxedTuple,
        var: LocalRegister<Binding>,
        expr: BoxedIterator,
    ) -> Self {
        Self {
            input,
            expr,
            var,
            life: Lifecycle::new(alloc),
        }
    }
}

impl TupleIterator for LetTuple {
    fn open(&self, frame: &mut Frame<'_>) -> Result<()> {
        self.life.begin(frame);
        self.input.open(frame)
    }

    fn next(&self, frame: &mut Frame<'_>) -> Result<bool> {
        if !self.input.next(frame)? {
            return Ok(false);
        }
        let items = drain_items(self.expr.as_ref(), frame)?;
        self.var.set(frame, items);
        Ok(true)
    }

    fn close(&self, frame: &mut Frame<'_>) {
        if self.life.end(frame) {
            self.var.clear(frame);
            self.input.close(frame);
        }
    }
}

/// `where cond`.
#[derive(Debug)]
pub struct WhereTuple {
    input: BoxedTuple,
    condition: BoxedIterator,
    life: Lifecycle,
}

impl WhereTuple {
    pub fn new(alloc: &mut RegisterAllocator, input: BoxedTuple, condition: BoxedIterator) -> Self {
        Self {
            input,
            condition,
            life: Lifecycle::new(alloc),
        }
    }
}

impl TupleIterator for WhereTuple {
    fn open(&self, frame: &mut Frame<'_>) -> Result<()> {
        self.life.begin(frame);
        self.input.open(frame)
    }

    fn next(&self, frame: &mut Frame<'_>) -> Result<bool> {
        while self.input.next(frame)? {
            if effective_boolean_value(self.condition.as_ref(), frame)? {
                return Ok(true);
            }
        }
        Ok(false)
    }

    fn close(&self, frame: &mut Frame<'_>) {
        if self.life.end(frame) {
            self.input.close(frame);
        }
    }
}

/// `count $var`.
#[derive(Debug)]
pub struct CountTuple {
    input: BoxedTuple,
    var: LocalRegister<Binding>,
    counter: LocalRegister<i64>,
    life: Lifecycle,
}

impl CountTuple {
    pub fn new(alloc: &mut RegisterAllocator, input: BoxedTuple, var: LocalRegister<Binding>) -> Self {
        Self {
            input,
            var,
            counter: alloc.local(),
            life: Lifecycle::new(alloc),
        }
    }
}

impl TupleIterator for CountTuple {
    fn open(&self, frame: &mut Frame<'_>) -> Result<()> {
        self.life.begin(frame);
        self.counter.set(frame, 0);
        self.input.open(frame)
    }

    fn next(&self, frame: &mut Frame<'_>) -> Result<bool> {
        if !self.input.next(frame)? {
            return Ok(false);
        }
        let n = self.counter.get(frame).copied().unwrap_or(0) + 1;
        self.counter.set(frame, n);
        let item = atomic_item(frame, &AtomicValue::integer(n))?;
        bind_one(frame, self.var, item);
        Ok(true)
    }

    fn close(&self, frame: &mut Frame<'_>) {
        if self.life.end(frame) {
            self.input.close(frame);
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SortDirection {
    #[default]
    Ascending,
    Descending,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum EmptyOrder {
    #[default]
    Least,
    Greatest,
}

/// One `order by` key.
#[derive(Debug)]
pub struct OrderSpec {
    pub key: BoxedIterator,
    pub direction: SortDirection,
    pub empty: EmptyOrder,
    pub collation: Option<String>,
}

impl OrderSpec {
    pub fn new(key: BoxedIterator) -> Self {
        Self {
            key,
            direction: SortDirection::default(),
            empty: EmptyOrder::default(),
            collation: None,
        }
    }

    pub fn descending(mut self) -> Self {
        self.direction = SortDirection::Descending;
        self
    }

    pub fn empty_greatest(mut self) -> Self {
        self.empty = EmptyOrder::Greatest;
        self
    }

    pub fn collation(mut self, uri: impl Into<String>) -> Self {
        self.collation = Some(uri.into());
        self
    }
}

/// An atomized `order by` key.
#[derive(Debug)]
enum SortKey {
    Empty,
    NaN,
    Value(AtomicValue),
}

impl SortKey {
    /// `()` and NaN sit below every value under `empty least`, above them under
    /// `empty greatest`; NaN always lies between `()` and the values.
    fn rank(&self, empty: EmptyOrder) -> u8 {
        match (self, empty) {
            (SortKey::Empty, EmptyOrder::Least) | (SortKey::Value(_), EmptyOrder::Greatest) => 0,
            (SortKey::NaN, _) => 1,
            (SortKey::Value(_), EmptyOrder::Least) | (SortKey::Empty, EmptyOrder::Greatest) => 2,
        }
    }
}

struct TupleRow {
    keys: Vec<SortKey>,
    bindings: Vec<Option<Binding>>,
}

/// Materialized, sorted tuples waiting to be replayed.
#[derive(Default)]
pub struct TupleBuffer {
    rows: VecDeque<TupleRow>,
}

impl fmt::Debug for TupleBuffer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TupleBuffer")
            .field("rows", &self.rows.len())
            .finish()
    }
}

/// `order by`: sorts the whole input stream, then replays it.
///
/// `vars` lists every variable bound upstream; each tuple snapshots them and
/// restores them on replay.
#[derive(Debug)]
pub struct OrderByTuple {
    input: BoxedTuple,
    specs: Vec<OrderSpec>,
    vars: Vec<LocalRegister<Binding>>,
    buffer: LocalRegister<TupleBuffer>,
    life: Lifecycle,
}

impl OrderByTuple {
    pub fn new(
        alloc: &mut RegisterAllocator,
        input: BoxedTuple,
        specs: Vec<OrderSpec>,
        vars: Vec<LocalRegister<Binding>>,
    ) -> Self {
        Self {
            input,
            specs,
            vars,
            buffer: alloc.local(),
            life: Lifecycle::new(alloc),
        }
    }

    fn sort_key(&self, spec: &OrderSpec, frame: &mut Frame<'_>) -> Result<SortKey> {
        let items = drain_items(spec.key.as_ref(), frame)?;
        match items.as_slice() {
            [] => Ok(SortKey::Empty),
            [one] => match atomize(one)? {
                AtomicValue::Double(d) if d.is_nan() => Ok(SortKey::NaN),
                AtomicValue::Float(f) if f.is_nan() => Ok(SortKey::NaN),
                AtomicValue::UntypedAtomic(s) => Ok(SortKey::Value(AtomicValue::String(s))),
                key => Ok(SortKey::Value(key)),
            },
            _ => Err(Error::new(
                ErrorCode::XPTY0004,
                "order by key must be zero or one item",
            )),
        }
    }

    fn materialize(&self, frame: &mut Frame<'_>) -> Result<TupleBuffer> {
        let mut rows = Vec::new();
        while self.input.next(frame)? {
            let keys = self
                .specs
                .iter()
                .map(|spec| self.sort_key(spec, frame))
                .collect::<Result<Vec<_>>>()?;
            let bindings = self.vars.iter().map(|v| v.get(frame).cloned()).collect();
            rows.push(TupleRow { keys, bindings });
        }
        tracing::debug!(tuples = rows.len(), keys = self.specs.len(), "order by materialized");

        let ctx = frame.ctx();
        let collations = self
            .specs
            .iter()
            .map(|s| ctx.collation(s.collation.as_deref()))
            .collect::<Result<Vec<_>>>()?;
        let tz = ctx.implicit_timezone();
        let mut failure = None;
        rows.sort_by(|a, b| {
            for (i, spec) in self.specs.iter().enumerate() {
                let ord = match (&a.keys[i], &b.keys[i]) {
                    (SortKey::Value(x), SortKey::Value(y)) => {
                        match compare_atomic(x, y, collations[i].as_ref(), tz) {
                            Ok(o) => o.unwrap_or(Ordering::Equal),
                            Err(e) => {
                                failure.get_or_insert(e);
                                Ordering::Equal
                            }
                        }
                    }
                    (x, y) => x.rank(spec.empty).cmp(&y.rank(spec.empty)),
                };
                let ord = match spec.direction {
                    SortDirection::Ascending => ord,
                    SortDirection::Descending => ord.reverse(),
                };
                if ord != Ordering::Equal {
                    return ord;
                }
            }
            Ordering::Equal
        });
        if let Some(e) = failure {
            return Err(e);
        }
        Ok(TupleBuffer { rows: rows.into() })
    }
}

impl TupleIterator for OrderByTuple {
    fn open(&self, frame: &mut Frame<'_>) -> Result<()> {
        self.life.begin(frame);
        self.buffer.clear(frame);
        self.input.open(frame)
    }

    fn next(&self, frame: &mut Frame<'_>) -> Result<bool> {
        if !self.buffer.is_set(frame) {
            let buffer = self.materialize(frame)?;
            self.buffer.set(frame, buffer);
        }
        let Some(row) = self.buffer.get_mut(frame).and_then(|b| b.rows.pop_front()) else {
            return Ok(false);
        };
        for (var, binding) in self.vars.iter().zip(row.bindings) {
            match binding {
                Some(b) => var.set(frame, b),
                None => var.clear(frame),
            }
        }
        Ok(true)
    }

    fn close(&self, frame: &mut Frame<'_>) {
        if self.life.end(frame) {
            self.buffer.clear(frame);
            self.input.close(frame);
        }
    }
}

/// Runs `ret` for every tuple and concatenates the results.
#[derive(Debug)]
pub struct FlworIterator {
    tuples: BoxedTuple,
    ret: BoxedIterator,
    ret_open: LocalRegister<bool>,
    life: Lifecycle,
}

impl FlworIterator {
    pub fn new(alloc: &mut RegisterAllocator, tuples: BoxedTuple, ret: BoxedIterator) -> Self {
        Self {
            tuples,
            ret,
            ret_open: alloc.local(),
            life: Lifecycle::new(alloc),
        }
    }
}

impl RuntimeIterator for FlworIterator {
    fn open(&self, frame: &mut Frame<'_>) -> Result<()> {
        self.life.begin(frame);
        self.ret_open.set(frame, false);
        self.tuples.open(frame)
    }

    fn next(&self, frame: &mut Frame<'_>) -> Result<Option<Item>> {
        loop {
            if !self.ret_open.flag(frame) {
                if !self.tuples.next(frame)? {
                    return Ok(None);
                }
                self.ret_open.set(frame, true);
                self.ret.open(frame)?;
            }
            if let Some(item) = self.ret.next(frame)? {
                return Ok(Some(item));
            }
            self.ret.close(frame);
            self.ret_open.set(frame, false);
        }
    }

    fn close(&self, frame: &mut Frame<'_>) {
        if !self.life.end(frame) {
            return;
        }
        if self.ret_open.flag(frame) {
            self.ret.close(frame);
            self.ret_open.set(frame, false);
        }
        self.tuples.close(frame);
    }
}
