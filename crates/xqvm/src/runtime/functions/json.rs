//! Array and object constructors, `jn:keys` and `jn:members`.
use super::helpers::atomize_one;
use crate::builders::{ArrayBuilder, ObjectBuilder, SequenceBuilder};
use crate::datamodel::{ArrayPointable, Item, ObjectPointable, TaggedValue, ValueTag};
use crate::error::{Error, ErrorCode, Result};
use crate::runtime::base::EagerEvaluator;
use crate::runtime::frame::Frame;
use crate::runtime::iterator::{BoxedIterator, with_open};
use std::collections::HashSet;

/// `[a, b, c]`: every member expression becomes one member.
#[derive(Debug)]
pub struct ArrayConstructor {
    members: Vec<BoxedIterator>,
}

impl ArrayConstructor {
    pub fn new(members: Vec<BoxedIterator>) -> Self {
        Self { members }
    }
}

impl EagerEvaluator for ArrayConstructor {
    fn evaluate(&self, frame: &mut Frame<'_>) -> Result<TaggedValue> {
        let mut builder = frame.pool().borrow::<ArrayBuilder>();
        for member in &self.members {
            let value = member.evaluate_eagerly(frame)?;
            builder.add_item(&value.pointable())?;
        }
        builder.build()
    }
}

/// `{ k: v, ... }`; keys are atomized to strings and must be distinct.
#[derive(Debug)]
pub struct ObjectConstructor {
    pairs: Vec<(BoxedIterator, BoxedIterator)>,
}

impl ObjectConstructor {
    pub fn new(pairs: Vec<(BoxedIterator, BoxedIterator)>) -> Self {
        Self { pairs }
    }
}

impl EagerEvaluator for ObjectConstructor {
    fn evaluate(&self, frame: &mut Frame<'_>) -> Result<TaggedValue> {
        let mut builder = frame.pool().borrow::<ObjectBuilder>();
        let mut seen = HashSet::with_capacity(self.pairs.len());
        for (key, value) in &self.pairs {
            let key = atomize_one(key.as_ref(), frame)?.string_value();
            if !seen.insert(key.clone()) {
                return Err(Error::new(
                    ErrorCode::XPTY0004,
                    format!("duplicate object key {key:?}"),
                ));
            }
            let value = value.evaluate_eagerly(frame)?;
            builder.add_item(&key, &value.pointable())?;
        }
        builder.build()
    }
}

/// Runs `f` on every item of `input`, collecting what it adds into one sequence.
fn collect_over(
    input: &BoxedIterator,
    frame: &mut Frame<'_>,
    mut f: impl FnMut(&TaggedValue, &mut SequenceBuilder, &Frame<'_>) -> Result<()>,
) -> Result<TaggedValue> {
    let mut out = frame.pool().borrow::<SequenceBuilder>();
    with_open(input.as_ref(), frame, |it, frame| {
        while let Some(item) = it.next(frame)? {
            if let Item::Value(v) = &item {
                f(v, &mut *out, frame)?;
            }
        }
        Ok(())
    })?;
    out.build()
}

/// `jn:keys`: the keys of every object in the input; other items are ignored.
#[derive(Debug)]
pub struct Keys {
    input: BoxedIterator,
}

impl Keys {
    pub fn new(input: BoxedIterator) -> Self {
        Self { input }
    }
}

impl EagerEvaluator for Keys {
    fn evaluate(&self, frame: &mut Frame<'_>) -> Result<TaggedValue> {
        collect_over(&self.input, frame, |v, out, frame| {
            if v.tag() != ValueTag::Object {
                return Ok(());
            }
            let object = ObjectPointable::new(&v.pointable())?;
            for key in object.keys() {
                let key = frame.ctx().atomics().string(key?)?;
                out.add_value(&key)?;
            }
            Ok(())
        })
    }
}

/// `jn:members`: the members of every array in the input, flattened.
#[derive(Debug)]
pub struct Members {
    input: BoxedIterator,
}

impl Members {
    pub fn new(input: BoxedIterator) -> Self {
        Self { input }
    }
}

impl EagerEvaluator for Members {
    fn evaluate(&self, frame: &mut Frame<'_>) -> Result<TaggedValue> {
        collect_over(&self.input, frame, |v, out, _| {
            if v.tag() != ValueTag::Array {
                return Ok(());
            }
            let array = ArrayPointable::new(&v.pointable())?;
            for i in 0..array.entry_count() {
                out.add_item(&array.entry(i)?)?;
            }
            Ok(())
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::datamodel::{AtomicValue, Value};
    use crate::runtime::DynamicContext;
    use crate::runtime::base::Eager;
    use crate::runtime::functions::basic::{Constant, Range};
    use crate::runtime::iterator::{RuntimeIterator, drain_items};
    use crate::runtime::register::RegisterAllocator;
    use rstest::rstest;

    fn string(alloc: &mut RegisterAllocator, ctx: &DynamicContext, s: &str) -> BoxedIterator {
        Box::new(Constant::new(alloc, ctx.atomics().string(s).unwrap()))
    }

    fn int(alloc: &mut RegisterAllocator, ctx: &DynamicContext, v: i64) -> BoxedIterator {
        Box::new(Constant::new(alloc, ctx.atomics().integer(v).unwrap()))
    }

    #[rstest]
    fn members_flatten_sequence_members() {
        let ctx = DynamicContext::default();
        let mut alloc = RegisterAllocator::new();
        let (a, b) = (int(&mut alloc, &ctx, 1), int(&mut alloc, &ctx, 3));
        let range: BoxedIterator = Box::new(Range::new(&mut alloc, a, b));
        let single = string(&mut alloc, &ctx, "x");
        let array = Box::new(Eager::new(&mut alloc, ArrayConstructor::new(vec![range, single])));
        let members = Eager::new(&mut alloc, Members::new(array));
        let mut frame = Frame::new(&ctx, alloc.local_count(), alloc.global_count());
        let got: Vec<AtomicValue> = drain_items(&members, &mut frame)
            .unwrap()
            .iter()
            .map(|i| i.atomic().unwrap())
            .collect();
        assert_eq!(
            got,
            vec![
                AtomicValue::integer(1),
                AtomicValue::integer(2),
                AtomicValue::integer(3),
                AtomicValue::string("x")
            ]
        );
    }

    #[rstest]
    fn object_keys_in_insertion_order() {
        let ctx = DynamicContext::default();
        let mut alloc = RegisterAllocator::new();
        let pairs = vec![
            (string(&mut alloc, &ctx, "b"), int(&mut alloc, &ctx, 1)),
            (string(&mut alloc, &ctx, "a"), int(&mut alloc, &ctx, 2)),
        ];
        let object = Eager::new(&mut alloc, ObjectConstructor::new(pairs));
        let mut frame = Frame::new(&ctx, alloc.local_count(), alloc.global_count());
        let value = object.evaluate_eagerly(&mut frame).unwrap();
        let decoded = Value::decode_value(&value).unwrap();
        assert_eq!(
            decoded,
            Value::Object(vec![
                ("b".into(), Value::Atomic(AtomicValue::integer(1))),
                ("a".into(), Value::Atomic(AtomicValue::integer(2))),
            ])
        );
    }

    #[rstest]
    fn duplicate_keys_fail() {
        let ctx = DynamicContext::default();
        let mut alloc = RegisterAllocator::new();
        let pairs = vec![
            (string(&mut alloc, &ctx, "k"), int(&mut alloc, &ctx, 1)),
            (string(&mut alloc, &ctx, "k"), int(&mut alloc, &ctx, 2)),
        ];
        let object = Eager::new(&mut alloc, ObjectConstructor::new(pairs));
        let mut frame = Frame::new(&ctx, alloc.local_count(), alloc.global_count());
        assert_eq!(object.evaluate_eagerly(&mut frame).unwrap_err().code, ErrorCode::XPTY0004);
    }
}
