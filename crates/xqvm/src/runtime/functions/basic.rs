//! Literals, sequence construction, variables and conditionals.
use super::helpers::{atomize_optional, cast_error, effective_boolean_value};
use crate::datamodel::{AtomicValue, Item, SequenceCursor, TaggedValue};
use crate::error::{Error, ErrorCode, Result};
use crate::runtime::base::Lifecycle;
use crate::runtime::flwor::Binding;
use crate::runtime::frame::Frame;
use crate::runtime::iterator::{BoxedIterator, RuntimeIterator};
use crate::runtime::register::{GlobalRegister, LocalRegister, RegisterAllocator};

/// A literal value, walked item by item.
#[derive(Debug)]
pub struct Constant {
    value: TaggedValue,
    life: Lifecycle,
    cursor: LocalRegister<SequenceCursor>,
}

impl Constant {
    pub fn new(alloc: &mut RegisterAllocator, value: TaggedValue) -> Self {
        Self {
            value,
            life: Lifecycle::new(alloc),
            cursor: alloc.local(),
        }
    }

    pub fn value(&self) -> &TaggedValue {
        &self.value
    }

    fn cursor<'f>(&self, frame: &'f mut Frame<'_>) -> Result<&'f mut SequenceCursor> {
        self.cursor
            .get_mut(frame)
            .ok_or_else(|| Error::system("constant read before open"))
    }
}

impl RuntimeIterator for Constant {
    fn open(&self, frame: &mut Frame<'_>) -> Result<()> {
        self.life.begin(frame);
        let cursor = SequenceCursor::new(self.value.clone())?;
        self.cursor.set(frame, cursor);
        Ok(())
    }

    fn next(&self, frame: &mut Frame<'_>) -> Result<Option<Item>> {
        self.cursor(frame)?.next_item()
    }

    fn close(&self, frame: &mut Frame<'_>) {
        if self.life.end(frame) {
            self.cursor.clear(frame);
        }
    }

    fn evaluate_eagerly(&self, _frame: &mut Frame<'_>) -> Result<TaggedValue> {
        Ok(self.value.clone())
    }

    fn skip(&self, frame: &mut Frame<'_>, n: usize) -> Result<usize> {
        Ok(self.cursor(frame)?.skip(n))
    }
}

/// `(a, b, c)`: the inputs one after another, each opened only when reached.
#[derive(Debug)]
pub struct Concat {
    inputs: Vec<BoxedIterator>,
    life: Lifecycle,
    current: LocalRegister<usize>,
    current_open: LocalRegister<bool>,
}

impl Concat {
    pub fn new(alloc: &mut RegisterAllocator, inputs: Vec<BoxedIterator>) -> Self {
        Self {
            inputs,
            life: Lifecycle::new(alloc),
            current: alloc.local(),
            current_open: alloc.local(),
        }
    }

    fn index(&self, frame: &Frame<'_>) -> usize {
        self.current.get(frame).copied().unwrap_or(0)
    }

    /// The input to read from, opened; `None` when all are used up.
    fn active(&self, frame: &mut Frame<'_>) -> Result<Option<&BoxedIterator>> {
        let idx = self.index(frame);
        let Some(input) = self.inputs.get(idx) else {
            return Ok(None);
        };
        if !self.current_open.flag(frame) {
            self.current_open.set(frame, true);
            input.open(frame)?;
        }
        Ok(Some(input))
    }

    fn advance(&self, frame: &mut Frame<'_>) {
        let idx = self.index(frame);
        if let Some(input) = self.inputs.get(idx) {
            input.close(frame);
        }
        self.current_open.set(frame, false);
        self.current.set(frame, idx + 1);
    }
}

impl RuntimeIterator for Concat {
    fn open(&self, frame: &mut Frame<'_>) -> Result<()> {
        self.life.begin(frame);
        self.current.set(frame, 0);
        self.current_open.set(frame, false);
        Ok(())
    }

    fn next(&self, frame: &mut Frame<'_>) -> Result<Option<Item>> {
        while let Some(input) = self.active(frame)? {
            if let Some(item) = input.next(frame)? {
                return Ok(Some(item));
            }
            self.advance(frame);
        }
        Ok(None)
    }

    fn close(&self, frame: &mut Frame<'_>) {
        if !self.life.end(frame) {
            return;
        }
        if self.current_open.flag(frame) {
            if let Some(input) = self.inputs.get(self.index(frame)) {
                input.close(frame);
            }
            self.current_open.set(frame, false);
        }
    }

    fn skip(&self, frame: &mut Frame<'_>, mut n: usize) -> Result<usize> {
        while n > 0 {
            let Some(input) = self.active(frame)? else {
                break;
            };
            n = input.skip(frame, n)?;
            if n > 0 {
                self.advance(frame);
            }
        }
        Ok(n)
    }
}

#[derive(Debug, Clone, Copy)]
struct RangeState {
    next: i64,
    last: i64,
    exhausted: bool,
}

/// `from to to`, computed arithmetically.
#[derive(Debug)]
pub struct Range {
    from: BoxedIterator,
    to: BoxedIterator,
    life: Lifecycle,
    state: LocalRegister<RangeState>,
}

fn range_bound(v: Option<AtomicValue>) -> Result<Option<i64>> {
    match v {
        None => Ok(None),
        Some(AtomicValue::Integer(_, i)) => Ok(Some(i)),
        Some(AtomicValue::UntypedAtomic(s)) => s
            .trim()
            .parse::<i64>()
            .map(Some)
            .map_err(|_| cast_error(&s, "xs:integer")),
        Some(other) => Err(Error::new(
            ErrorCode::XPTY0004,
            format!("range bound must be an integer, found {:?}", other.tag()),
        )),
    }
}

impl Range {
    pub fn new(alloc: &mut RegisterAllocator, from: BoxedIterator, to: BoxedIterator) -> Self {
        Self {
            from,
            to,
            life: Lifecycle::new(alloc),
            state: alloc.local(),
        }
    }

    fn state(&self, frame: &mut Frame<'_>) -> Result<RangeState> {
        if let Some(state) = self.state.get(frame) {
            return Ok(*state);
        }
        let from = range_bound(atomize_optional(self.from.as_ref(), frame)?)?;
        let to = range_bound(atomize_optional(self.to.as_ref(), frame)?)?;
        let state = match (from, to) {
            (Some(next), Some(last)) => RangeState {
                next,
                last,
                exhausted: next > last,
            },
            _ => RangeState {
                next: 0,
                last: 0,
                exhausted: true,
            },
        };
        self.state.set(frame, state);
        Ok(state)
    }
}

impl RuntimeIterator for Range {
    fn open(&self, frame: &mut Frame<'_>) -> Result<()> {
        self.life.begin(frame);
        self.state.clear(frame);
        Ok(())
    }

    fn next(&self, frame: &mut Frame<'_>) -> Result<Option<Item>> {
        let mut state = self.state(frame)?;
        if state.exhausted {
            return Ok(None);
        }
        let current = state.next;
        match current.checked_add(1) {
            Some(n) if current < state.last => state.next = n,
            _ => state.exhausted = true,
        }
        self.state.set(frame, state);
        let item = frame.ctx().atomics().integer(current)?;
        Ok(Some(Item::Value(item)))
    }

    fn close(&self, frame: &mut Frame<'_>) {
        if self.life.end(frame) {
            self.state.clear(frame);
        }
    }

    fn skip(&self, frame: &mut Frame<'_>, n: usize) -> Result<usize> {
        let mut state = self.state(frame)?;
        if state.exhausted {
            return Ok(n);
        }
        let remaining = u64::try_from(i128::from(state.last) - i128::from(state.next) + 1).unwrap_or(u64::MAX);
        let wanted = u64::try_from(n).unwrap_or(u64::MAX);
        if wanted >= remaining {
            state.exhausted = true;
            state.next = state.last;
            self.state.set(frame, state);
            return Ok(usize::try_from(wanted - remaining).unwrap_or(usize::MAX));
        }
        // wanted < remaining, so the sum stays within [next, last]
        state.next = i64::try_from(i128::from(state.next) + i128::from(wanted)).unwrap_or(state.last);
        self.state.set(frame, state);
        Ok(0)
    }
}

/// Reads a bound variable item by item.
#[derive(Debug)]
pub struct LocalVariable {
    var: LocalRegister<Binding>,
    life: Lifecycle,
    position: LocalRegister<usize>,
}

impl LocalVariable {
    pub fn new(alloc: &mut RegisterAllocator, var: LocalRegister<Binding>) -> Self {
        Self {
            var,
            life: Lifecycle::new(alloc),
            position: alloc.local(),
        }
    }
}

/// Reads a prolog variable item by item.
#[derive(Debug)]
pub struct GlobalVariable {
    var: GlobalRegister<Binding>,
    life: Lifecycle,
    position: LocalRegister<usize>,
}

impl GlobalVariable {
    pub fn new(alloc: &mut RegisterAllocator, var: GlobalRegister<Binding>) -> Self {
        Self {
            var,
            life: Lifecycle::new(alloc),
            position: alloc.local(),
        }
    }
}

fn unbound(index: usize) -> Error {
    Error::system(format!("variable register {index} read while unbound"))
}

macro_rules! variable_iterator {
    ($name:ident) => {
        impl RuntimeIterator for $name {
            fn open(&self, frame: &mut Frame<'_>) -> Result<()> {
                self.life.begin(frame);
                self.position.set(frame, 0);
                Ok(())
            }

            fn next(&self, frame: &mut Frame<'_>) -> Result<Option<Item>> {
                let pos = self.position.get(frame).copied().unwrap_or(0);
                let binding = self.var.get(frame).ok_or_else(|| unbound(self.var.index()))?;
                let item = binding.get(pos).cloned();
                if item.is_some() {
                    self.position.set(frame, pos + 1);
                }
                Ok(item)
            }

            fn close(&self, frame: &mut Frame<'_>) {
                self.life.end(frame);
            }

            fn skip(&self, frame: &mut Frame<'_>, n: usize) -> Result<usize> {
                let pos = self.position.get(frame).copied().unwrap_or(0);
                let len = self.var.get(frame).ok_or_else(|| unbound(self.var.index()))?.len();
                let k = n.min(len.saturating_sub(pos));
                self.position.set(frame, pos + k);
                Ok(n - k)
            }
        }
    };
}

variable_iterator!(LocalVariable);
variable_iterator!(GlobalVariable);

/// `if (cond) then a else b`. The condition is evaluated on the first `next`.
#[derive(Debug)]
pub struct IfThenElse {
    condition: BoxedIterator,
    then_branch: BoxedIterator,
    else_branch: BoxedIterator,
    life: Lifecycle,
    chosen: LocalRegister<bool>,
}

impl IfThenElse {
    pub fn new(
        alloc: &mut RegisterAllocator,
        condition: BoxedIterator,
        then_branch: BoxedIterator,
        else_branch: BoxedIterator,
    ) -> Self {
        Self {
            condition,
            then_branch,
            else_branch,
            life: Lifecycle::new(alloc),
            chosen: alloc.local(),
        }
    }

    fn branch(&self, then: bool) -> &BoxedIterator {
        if then { &self.then_branch } else { &self.else_branch }
    }

    fn chosen(&self, frame: &mut Frame<'_>) -> Result<&BoxedIterator> {
        if let Some(then) = self.chosen.get(frame).copied() {
            return Ok(self.branch(then));
        }
        let then = effective_boolean_value(self.condition.as_ref(), frame)?;
        self.chosen.set(frame, then);
        let branch = self.branch(then);
        branch.open(frame)?;
        Ok(branch)
    }
}

impl RuntimeIterator for IfThenElse {
    fn open(&self, frame: &mut Frame<'_>) -> Result<()> {
        self.life.begin(frame);
        self.chosen.clear(frame);
        Ok(())
    }

    fn next(&self, frame: &mut Frame<'_>) -> Result<Option<Item>> {
        self.chosen(frame)?.next(frame)
    }

    fn close(&self, frame: &mut Frame<'_>) {
        if !self.life.end(frame) {
            return;
        }
        if let Some(then) = self.chosen.take(frame) {
            self.branch(then).close(frame);
        }
    }

    fn skip(&self, frame: &mut Frame<'_>, n: usize) -> Result<usize> {
        self.chosen(frame)?.skip(frame, n)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::runtime::DynamicContext;
    use crate::runtime::iterator::drain_items;
    use rstest::{fixture, rstest};

    #[fixture]
    fn ctx() -> DynamicContext {
        DynamicContext::default()
    }

    fn ints(items: &[Item]) -> Vec<i64> {
        items.iter().map(|i| i.atomic().unwrap()).map(|a| match a {
            AtomicValue::Integer(_, v) => v,
            other => panic!("not an integer: {other:?}"),
        }).collect()
    }

    fn lit(alloc: &mut RegisterAllocator, ctx: &DynamicContext, v: i64) -> BoxedIterator {
        Box::new(Constant::new(alloc, ctx.atomics().integer(v).unwrap()))
    }

    #[rstest]
    #[case(1, 5, vec![1, 2, 3, 4, 5])]
    #[case(3, 3, vec![3])]
    #[case(5, 1, vec![])]
    fn range_items(ctx: DynamicContext, #[case] from: i64, #[case] to: i64, #[case] expected: Vec<i64>) {
        let mut alloc = RegisterAllocator::new();
        let (a, b) = (lit(&mut alloc, &ctx, from), lit(&mut alloc, &ctx, to));
        let range = Range::new(&mut alloc, a, b);
        let mut frame = Frame::new(&ctx, alloc.local_count(), alloc.global_count());
        assert_eq!(ints(&drain_items(&range, &mut frame).unwrap()), expected);
    }

    #[rstest]
    fn range_skip_is_arithmetic(ctx: DynamicContext) {
        let mut alloc = RegisterAllocator::new();
        let (a, b) = (lit(&mut alloc, &ctx, 1), lit(&mut alloc, &ctx, i64::MAX));
        let range = Range::new(&mut alloc, a, b);
        let mut frame = Frame::new(&ctx, alloc.local_count(), alloc.global_count());
        range.open(&mut frame).unwrap();
        assert_eq!(range.skip(&mut frame, 1_000_000_000).unwrap(), 0);
        let next = range.next(&mut frame).unwrap().unwrap();
        assert_eq!(ints(&[next]), vec![1_000_000_001]);
        range.close(&mut frame);
    }

    #[rstest]
    fn concat_skips_across_inputs(ctx: DynamicContext) {
        let mut alloc = RegisterAllocator::new();
        let inputs = vec![lit(&mut alloc, &ctx, 1), lit(&mut alloc, &ctx, 2), lit(&mut alloc, &ctx, 3)];
        let concat = Concat::new(&mut alloc, inputs);
        let mut frame = Frame::new(&ctx, alloc.local_count(), alloc.global_count());
        concat.open(&mut frame).unwrap();
        assert_eq!(concat.skip(&mut frame, 2).unwrap(), 0);
        let rest = concat.next(&mut frame).unwrap().unwrap();
        assert_eq!(ints(&[rest]), vec![3]);
        assert!(concat.next(&mut frame).unwrap().is_none());
        assert_eq!(concat.skip(&mut frame, 4).unwrap(), 4);
        concat.close(&mut frame);
    }

    #[rstest]
    #[case(true, vec![1])]
    #[case(false, vec![2])]
    fn if_picks_one_branch(ctx: DynamicContext, #[case] cond: bool, #[case] expected: Vec<i64>) {
        let mut alloc = RegisterAllocator::new();
        let c = Box::new(Constant::new(&mut alloc, TaggedValue::boolean(cond)));
        let (t, e) = (lit(&mut alloc, &ctx, 1), lit(&mut alloc, &ctx, 2));
        let it = IfThenElse::new(&mut alloc, c, t, e);
        let mut frame = Frame::new(&ctx, alloc.local_count(), alloc.global_count());
        assert_eq!(ints(&drain_items(&it, &mut frame).unwrap()), expected);
    }

    #[rstest]
    fn unbound_variable_is_system_error(ctx: DynamicContext) {
        let mut alloc = RegisterAllocator::new();
        let var = alloc.local::<Binding>();
        let it = LocalVariable::new(&mut alloc, var);
        let mut frame = Frame::new(&ctx, alloc.local_count(), alloc.global_count());
        let err = drain_items(&it, &mut frame).unwrap_err();
        assert!(err.is_system());
    }
}
