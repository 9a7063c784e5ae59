//! Sequence functions: `fn:count`, `fn:empty`, `fn:exists`, `fn:boolean`,
//! `fn:not`, `fn:subsequence`, `fn:distinct-values`, `fn:index-of` and
//! `fn:insert-before`.
use super::compare::{ComparisonOp, value_compare};
use super::helpers::{atomize, atomize_one, effective_boolean_value, parse_double};
use crate::builders::SequenceBuilder;
use crate::datamodel::{AtomicValue, Item, TaggedValue};
use crate::error::{Error, Result};
use crate::runtime::base::{EagerEvaluator, Lifecycle};
use crate::runtime::collation::Collation;
use crate::runtime::frame::Frame;
use crate::runtime::iterator::{BoxedIterator, RuntimeIterator, drain_items, with_open};
use chrono::FixedOffset;
use crate::runtime::register::{LocalRegister, RegisterAllocator};

/// `fn:count`; never materializes its argument.
#[derive(Debug)]
pub struct Count {
    input: BoxedIterator,
}

impl Count {
    pub fn new(input: BoxedIterator) -> Self {
        Self { input }
    }
}

impl EagerEvaluator for Count {
    fn evaluate(&self, frame: &mut Frame<'_>) -> Result<TaggedValue> {
        let n = with_open(self.input.as_ref(), frame, |it, frame| {
            let missed = it.skip(frame, usize::MAX)?;
            Ok(usize::MAX - missed)
        })?;
        let n = i64::try_from(n).map_err(|_| Error::system("count exceeds xs:integer"))?;
        frame.ctx().atomics().integer(n)
    }
}

fn has_items(input: &BoxedIterator, frame: &mut Frame<'_>) -> Result<bool> {
    with_open(input.as_ref(), frame, |it, frame| Ok(it.next(frame)?.is_some()))
}

/// `fn:empty`
#[derive(Debug)]
pub struct Empty {
    input: BoxedIterator,
}

impl Empty {
    pub fn new(input: BoxedIterator) -> Self {
        Self { input }
    }
}

impl EagerEvaluator for Empty {
    fn evaluate(&self, frame: &mut Frame<'_>) -> Result<TaggedValue> {
        Ok(TaggedValue::boolean(!has_items(&self.input, frame)?))
    }
}

/// `fn:exists`
#[derive(Debug)]
pub struct Exists {
    input: BoxedIterator,
}

impl Exists {
    pub fn new(input: BoxedIterator) -> Self {
        Self { input }
    }
}

impl EagerEvaluator for Exists {
    fn evaluate(&self, frame: &mut Frame<'_>) -> Result<TaggedValue> {
        Ok(TaggedValue::boolean(has_items(&self.input, frame)?))
    }
}

/// `fn:boolean`
#[derive(Debug)]
pub struct BooleanFn {
    input: BoxedIterator,
}

impl BooleanFn {
    pub fn new(input: BoxedIterator) -> Self {
        Self { input }
    }
}

impl EagerEvaluator for BooleanFn {
    fn evaluate(&self, frame: &mut Frame<'_>) -> Result<TaggedValue> {
        effective_boolean_value(self.input.as_ref(), frame).map(TaggedValue::boolean)
    }
}

/// `fn:not`
#[derive(Debug)]
pub struct Not {
    input: BoxedIterator,
}

impl Not {
    pub fn new(input: BoxedIterator) -> Self {
        Self { input }
    }
}

impl EagerEvaluator for Not {
    fn evaluate(&self, frame: &mut Frame<'_>) -> Result<TaggedValue> {
        effective_boolean_value(self.input.as_ref(), frame).map(|b| TaggedValue::boolean(!b))
    }
}

/// Equality used by `fn:distinct-values` and `fn:index-of`: untyped values
/// compare as strings, NaN equals NaN and incomparable values are unequal.
fn same_value(a: &AtomicValue, b: &AtomicValue, collation: &dyn Collation, tz: FixedOffset) -> Result<bool> {
    fn as_string(v: &AtomicValue) -> Option<AtomicValue> {
        match v {
            AtomicValue::UntypedAtomic(s) => Some(AtomicValue::String(s.clone())),
            _ => None,
        }
    }
    fn nan(v: &AtomicValue) -> bool {
        matches!(v, AtomicValue::Double(d) if d.is_nan()) || matches!(v, AtomicValue::Float(f) if f.is_nan())
    }
    if nan(a) || nan(b) {
        return Ok(nan(a) && nan(b));
    }
    let (a2, b2) = (as_string(a), as_string(b));
    match value_compare(
        ComparisonOp::Eq,
        a2.as_ref().unwrap_or(a),
        b2.as_ref().unwrap_or(b),
        collation,
        tz,
    ) {
        Ok(eq) => Ok(eq),
        Err(e) if e.is_system() => Err(e),
        Err(_) => Ok(false),
    }
}

/// `fn:distinct-values($input, $collation?)`, keeping first occurrences in order.
#[derive(Debug)]
pub struct DistinctValues {
    input: BoxedIterator,
    collation: Option<String>,
}

impl DistinctValues {
    pub fn new(input: BoxedIterator) -> Self {
        Self {
            input,
            collation: None,
        }
    }

    pub fn with_collation(mut self, uri: impl Into<String>) -> Self {
        self.collation = Some(uri.into());
        self
    }
}

impl EagerEvaluator for DistinctValues {
    fn evaluate(&self, frame: &mut Frame<'_>) -> Result<TaggedValue> {
        let ctx = frame.ctx();
        let collation = ctx.collation(self.collation.as_deref())?;
        let tz = ctx.implicit_timezone();
        let mut seen: Vec<AtomicValue> = Vec::new();
        with_open(self.input.as_ref(), frame, |it, frame| {
            while let Some(item) = it.next(frame)? {
                let v = atomize(&item)?;
                let mut duplicate = false;
                for s in &seen {
                    if same_value(s, &v, collation.as_ref(), tz)? {
                        duplicate = true;
                        break;
                    }
                }
                if !duplicate {
                    seen.push(v);
                }
            }
            Ok(())
        })?;
        let mut out = frame.pool().borrow::<SequenceBuilder>();
        for v in &seen {
            out.add_value(&ctx.atomics().create(v)?)?;
        }
        out.build()
    }
}

/// `fn:index-of($input, $search, $collation?)`: 1-based positions.
#[derive(Debug)]
pub struct IndexOf {
    input: BoxedIterator,
    search: BoxedIterator,
    collation: Option<String>,
}

impl IndexOf {
    pub fn new(input: BoxedIterator, search: BoxedIterator) -> Self {
        Self {
            input,
            search,
            collation: None,
        }
    }

    pub fn with_collation(mut self, uri: impl Into<String>) -> Self {
        self.collation = Some(uri.into());
        self
    }
}

impl EagerEvaluator for IndexOf {
    fn evaluate(&self, frame: &mut Frame<'_>) -> Result<TaggedValue> {
        let ctx = frame.ctx();
        let collation = ctx.collation(self.collation.as_deref())?;
        let tz = ctx.implicit_timezone();
        let search = atomize_one(self.search.as_ref(), frame)?;
        let mut out = frame.pool().borrow::<SequenceBuilder>();
        with_open(self.input.as_ref(), frame, |it, frame| {
            let mut position: i64 = 0;
            while let Some(item) = it.next(frame)? {
                position += 1;
                if same_value(&atomize(&item)?, &search, collation.as_ref(), tz)? {
                    out.add_value(&ctx.atomics().integer(position)?)?;
                }
            }
            Ok(())
        })?;
        out.build()
    }
}

/// `fn:insert-before($target, $position, $inserts)`. Positions below 1
/// insert at the front, past the end append.
#[derive(Debug)]
pub struct InsertBefore {
    target: BoxedIterator,
    position: BoxedIterator,
    inserts: BoxedIterator,
}

impl InsertBefore {
    pub fn new(target: BoxedIterator, position: BoxedIterator, inserts: BoxedIterator) -> Self {
        Self {
            target,
            position,
            inserts,
        }
    }
}

impl EagerEvaluator for InsertBefore {
    #[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss, clippy::cast_precision_loss)]
    fn evaluate(&self, frame: &mut Frame<'_>) -> Result<TaggedValue> {
        let position = number(atomize_one(self.position.as_ref(), frame)?)?.floor();
        let at = if position.is_nan() || position <= 1.0 {
            0
        } else if position >= usize::MAX as f64 {
            usize::MAX
        } else {
            position as usize - 1
        };
        let target = drain_items(self.target.as_ref(), frame)?;
        let inserts = drain_items(self.inserts.as_ref(), frame)?;
        let at = at.min(target.len());
        let mut out = frame.pool().borrow::<SequenceBuilder>();
        for item in target[..at].iter().chain(&inserts).chain(&target[at..]) {
            out.add(item)?;
        }
        out.build()
    }
}

/// Numeric argument as `xs:double`.
#[allow(clippy::cast_precision_loss)]
pub(crate) fn number(v: AtomicValue) -> Result<f64> {
    match v {
        AtomicValue::Integer(_, i) => Ok(i as f64),
        AtomicValue::Decimal(d) => Ok(d.to_f64()),
        AtomicValue::Float(f) => Ok(f64::from(f)),
        AtomicValue::Double(d) => Ok(d),
        AtomicValue::UntypedAtomic(s) => parse_double(&s),
        other => Err(Error::type_mismatch("numeric", other.tag())),
    }
}

/// Items still to hand out; `None` is unbounded.
#[derive(Debug, Clone, Copy)]
struct Window {
    remaining: Option<u64>,
}

/// `fn:subsequence($input, $start, $length?)` with `xs:double` rounding.
///
/// Leading items are passed over with `skip`.
#[derive(Debug)]
pub struct Subsequence {
    input: BoxedIterator,
    start: BoxedIterator,
    length: Option<BoxedIterator>,
    life: Lifecycle,
    window: LocalRegister<Window>,
}

impl Subsequence {
    pub fn new(
        alloc: &mut RegisterAllocator,
        input: BoxedIterator,
        start: BoxedIterator,
        length: Option<BoxedIterator>,
    ) -> Self {
        Self {
            input,
            start,
            length,
            life: Lifecycle::new(alloc),
            window: alloc.local(),
        }
    }

    #[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss, clippy::cast_precision_loss)]
    fn window(&self, frame: &mut Frame<'_>) -> Result<Window> {
        if let Some(w) = self.window.get(frame) {
            return Ok(*w);
        }
        let start = number(atomize_one(self.start.as_ref(), frame)?)?.round();
        let end = match &self.length {
            Some(len) => Some(start + number(atomize_one(len.as_ref(), frame)?)?.round()),
            None => None,
        };
        let window = if start.is_nan() || end.is_some_and(|e| e.is_nan() || e <= 1.0 || e <= start) {
            Window { remaining: Some(0) }
        } else {
            let first = start.max(1.0);
            if first > 1.0 {
                let lead = if first >= u64::MAX as f64 { u64::MAX } else { first as u64 - 1 };
                let lead = usize::try_from(lead).unwrap_or(usize::MAX);
                self.input.skip(frame, lead)?;
            }
            Window {
                remaining: end.map(|e| {
                    let n = e - first;
                    if n >= u64::MAX as f64 { u64::MAX } else { n as u64 }
                }),
            }
        };
        self.window.set(frame, window);
        Ok(window)
    }
}

impl RuntimeIterator for Subsequence {
    fn open(&self, frame: &mut Frame<'_>) -> Result<()> {
        self.life.begin(frame);
        self.window.clear(frame);
        self.input.open(frame)
    }

    fn next(&self, frame: &mut Frame<'_>) -> Result<Option<Item>> {
        let mut w = self.window(frame)?;
        match w.remaining {
            Some(0) => return Ok(None),
            Some(n) => w.remaining = Some(n - 1),
            None => {}
        }
        self.window.set(frame, w);
        self.input.next(frame)
    }

    fn close(&self, frame: &mut Frame<'_>) {
        if self.life.end(frame) {
            self.window.clear(frame);
            self.input.close(frame);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::runtime::DynamicContext;
    use crate::runtime::base::Eager;
    use crate::runtime::functions::basic::{Concat, Constant, Range};
    use crate::runtime::iterator::drain_items;
    use rstest::rstest;

    fn int(alloc: &mut RegisterAllocator, ctx: &DynamicContext, v: i64) -> BoxedIterator {
        Box::new(Constant::new(alloc, ctx.atomics().integer(v).unwrap()))
    }

    fn double(alloc: &mut RegisterAllocator, ctx: &DynamicContext, v: f64) -> BoxedIterator {
        Box::new(Constant::new(alloc, ctx.atomics().double(v).unwrap()))
    }

    fn range(alloc: &mut RegisterAllocator, ctx: &DynamicContext, a: i64, b: i64) -> BoxedIterator {
        let (from, to) = (int(alloc, ctx, a), int(alloc, ctx, b));
        Box::new(Range::new(alloc, from, to))
    }

    #[rstest]
    fn count_a_large_range() {
        let ctx = DynamicContext::default();
        let mut alloc = RegisterAllocator::new();
        let input = range(&mut alloc, &ctx, 1, 5_000_000_000);
        let count = Eager::new(&mut alloc, Count::new(input));
        let mut frame = Frame::new(&ctx, alloc.local_count(), alloc.global_count());
        let items = drain_items(&count, &mut frame).unwrap();
        assert_eq!(items[0].atomic().unwrap(), AtomicValue::integer(5_000_000_000));
    }

    #[rstest]
    #[case(2.0, Some(3.0), vec![2, 3, 4])]
    #[case(0.0, Some(3.0), vec![1, 2])]
    #[case(1.5, Some(2.0), vec![2, 3])]
    #[case(4.0, None, vec![4, 5])]
    #[case(f64::NAN, None, vec![])]
    #[case(-1.0, Some(f64::INFINITY), vec![1, 2, 3, 4, 5])]
    fn subsequence_rounding(#[case] start: f64, #[case] length: Option<f64>, #[case] expected: Vec<i64>) {
        let ctx = DynamicContext::default();
        let mut alloc = RegisterAllocator::new();
        let input = range(&mut alloc, &ctx, 1, 5);
        let start = double(&mut alloc, &ctx, start);
        let length = length.map(|l| double(&mut alloc, &ctx, l));
        let sub = Subsequence::new(&mut alloc, input, start, length);
        let mut frame = Frame::new(&ctx, alloc.local_count(), alloc.global_count());
        let got: Vec<AtomicValue> = drain_items(&sub, &mut frame)
            .unwrap()
            .iter()
            .map(|i| i.atomic().unwrap())
            .collect();
        let expected: Vec<AtomicValue> = expected.into_iter().map(AtomicValue::integer).collect();
        assert_eq!(got, expected);
    }

    #[rstest]
    #[case(0, true)]
    #[case(1, false)]
    fn empty_and_not(#[case] to: i64, #[case] empty: bool) {
        let ctx = DynamicContext::default();
        let mut alloc = RegisterAllocator::new();
        let input = range(&mut alloc, &ctx, 1, to);
        let it = Eager::new(&mut alloc, Empty::new(input));
        let mut frame = Frame::new(&ctx, alloc.local_count(), alloc.global_count());
        let items = drain_items(&it, &mut frame).unwrap();
        assert_eq!(items[0].atomic().unwrap(), AtomicValue::Boolean(empty));
    }

    fn values(alloc: &mut RegisterAllocator, ctx: &DynamicContext, vs: &[AtomicValue]) -> BoxedIterator {
        let parts: Vec<BoxedIterator> = vs
            .iter()
            .map(|v| Box::new(Constant::new(alloc, ctx.atomics().create(v).unwrap())) as BoxedIterator)
            .collect();
        Box::new(Concat::new(alloc, parts))
    }

    fn eval(ctx: &DynamicContext, mut alloc: RegisterAllocator, e: impl EagerEvaluator) -> Vec<AtomicValue> {
        let it = Eager::new(&mut alloc, e);
        let mut frame = Frame::new(ctx, alloc.local_count(), alloc.global_count());
        drain_items(&it, &mut frame)
            .unwrap()
            .iter()
            .map(|i| i.atomic().unwrap())
            .collect()
    }

    #[rstest]
    fn distinct_values_keeps_first_occurrences() {
        use AtomicValue as A;
        let ctx = DynamicContext::default();
        let mut alloc = RegisterAllocator::new();
        let input = values(
            &mut alloc,
            &ctx,
            &[
                A::integer(1),
                A::Double(1.0),
                A::string("a"),
                A::untyped("a"),
                A::Double(f64::NAN),
                A::Float(f32::NAN),
                A::string("1"),
            ],
        );
        let got = eval(&ctx, alloc, DistinctValues::new(input));
        assert_eq!(got.len(), 4);
        assert_eq!(got[0], A::integer(1));
        assert_eq!(got[1], A::string("a"));
        assert!(matches!(got[2], A::Double(d) if d.is_nan()));
        assert_eq!(got[3], A::string("1"));
    }

    #[rstest]
    fn distinct_values_under_a_case_blind_collation() {
        let ctx = DynamicContext::default();
        let mut alloc = RegisterAllocator::new();
        let input = values(&mut alloc, &ctx, &[AtomicValue::string("Ab"), AtomicValue::string("aB")]);
        let distinct = DistinctValues::new(input).with_collation(crate::consts::SIMPLE_CASE_URI);
        assert_eq!(eval(&ctx, alloc, distinct), vec![AtomicValue::string("Ab")]);
    }

    #[rstest]
    #[case(AtomicValue::integer(2), vec![2, 4])]
    #[case(AtomicValue::string("2"), vec![])]
    #[case(AtomicValue::integer(9), vec![])]
    fn index_of_positions(#[case] search: AtomicValue, #[case] expected: Vec<i64>) {
        let ctx = DynamicContext::default();
        let mut alloc = RegisterAllocator::new();
        let input = values(
            &mut alloc,
            &ctx,
            &[
                AtomicValue::integer(1),
                AtomicValue::Decimal(crate::datamodel::Decimal::from_i64(2)),
                AtomicValue::string("x"),
                AtomicValue::Double(2.0),
            ],
        );
        let search = values(&mut alloc, &ctx, &[search]);
        let got = eval(&ctx, alloc, IndexOf::new(input, search));
        let expected: Vec<AtomicValue> = expected.into_iter().map(AtomicValue::integer).collect();
        assert_eq!(got, expected);
    }

    #[rstest]
    #[case(-3.0, vec![10, 11, 1, 2, 3])]
    #[case(2.0, vec![1, 10, 11, 2, 3])]
    #[case(2.7, vec![1, 10, 11, 2, 3])]
    #[case(4.0, vec![1, 2, 3, 10, 11])]
    #[case(100.0, vec![1, 2, 3, 10, 11])]
    fn insert_before_positions(#[case] position: f64, #[case] expected: Vec<i64>) {
        let ctx = DynamicContext::default();
        let mut alloc = RegisterAllocator::new();
        let target = range(&mut alloc, &ctx, 1, 3);
        let position = double(&mut alloc, &ctx, position);
        let inserts = range(&mut alloc, &ctx, 10, 11);
        let got = eval(&ctx, alloc, InsertBefore::new(target, position, inserts));
        let expected: Vec<AtomicValue> = expected.into_iter().map(AtomicValue::integer).collect();
        assert_eq!(got, expected);
    }
}
