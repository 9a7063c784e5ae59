//! `fn:sum`, `fn:avg`, `fn:min` and `fn:max`.
use super::arithmetic::{ArithmeticOp, arithmetic};
use super::cast::cast_atomic;
use super::compare::compare_atomic;
use super::helpers::{atomize, atomize_optional, parse_double};
use crate::datamodel::{AtomicValue, TaggedValue, ValueTag};
use crate::error::{Error, ErrorCode, Result};
use crate::runtime::base::EagerEvaluator;
use crate::runtime::frame::Frame;
use crate::runtime::iterator::{BoxedIterator, with_open};
use chrono::FixedOffset;
use core::cmp::Ordering;

/// `XPTY0004` from mixing operand types becomes `FORG0006` for aggregates.
fn invalid_argument(function: &str, e: Error) -> Error {
    if e.code == ErrorCode::XPTY0004 {
        Error::new(ErrorCode::FORG0006, format!("{function}: {}", e.message))
    } else {
        e
    }
}

fn untyped_to_double(v: AtomicValue) -> Result<AtomicValue> {
    match v {
        AtomicValue::UntypedAtomic(s) => parse_double(&s).map(AtomicValue::Double),
        other => Ok(other),
    }
}

fn summable(v: &AtomicValue) -> bool {
    v.is_numeric() || matches!(v, AtomicValue::YearMonthDuration(_) | AtomicValue::DayTimeDuration(_))
}

/// Running sum and count of the atomized input; `None` when it is empty.
fn total(
    function: &str,
    input: &BoxedIterator,
    frame: &mut Frame<'_>,
    tz: FixedOffset,
) -> Result<Option<(AtomicValue, i64)>> {
    with_open(input.as_ref(), frame, |it, frame| {
        let mut acc: Option<AtomicValue> = None;
        let mut count = 0i64;
        while let Some(item) = it.next(frame)? {
            let v = untyped_to_double(atomize(&item)?)?;
            if !summable(&v) {
                return Err(Error::new(
                    ErrorCode::FORG0006,
                    format!("{function}: {:?} is neither numeric nor a duration", v.tag()),
                ));
            }
            acc = Some(match acc {
                None => v,
                Some(a) => arithmetic(ArithmeticOp::Add, a, v, tz).map_err(|e| invalid_argument(function, e))?,
            });
            count += 1;
        }
        Ok(acc.map(|a| (a, count)))
    })
}

/// `fn:sum($input, $zero?)`: integer `0` for an empty input unless `$zero`
/// says otherwise.
#[derive(Debug)]
pub struct Sum {
    input: BoxedIterator,
    zero: Option<BoxedIterator>,
}

impl Sum {
    pub fn new(input: BoxedIterator, zero: Option<BoxedIterator>) -> Self {
        Self { input, zero }
    }
}

impl EagerEvaluator for Sum {
    fn evaluate(&self, frame: &mut Frame<'_>) -> Result<TaggedValue> {
        let ctx = frame.ctx();
        if let Some((sum, _)) = total("fn:sum", &self.input, frame, ctx.implicit_timezone())? {
            return ctx.atomics().create(&sum);
        }
        match &self.zero {
            None => ctx.atomics().integer(0),
            Some(zero) => match atomize_optional(zero.as_ref(), frame)? {
                Some(v) => ctx.atomics().create(&v),
                None => Ok(TaggedValue::empty_sequence()),
            },
        }
    }
}

/// `fn:avg`; the empty sequence for an empty input.
#[derive(Debug)]
pub struct Avg {
    input: BoxedIterator,
}

impl Avg {
    pub fn new(input: BoxedIterator) -> Self {
        Self { input }
    }
}

impl EagerEvaluator for Avg {
    fn evaluate(&self, frame: &mut Frame<'_>) -> Result<TaggedValue> {
        let ctx = frame.ctx();
        let tz = ctx.implicit_timezone();
        let Some((sum, count)) = total("fn:avg", &self.input, frame, tz)? else {
            return Ok(TaggedValue::empty_sequence());
        };
        let avg = arithmetic(ArithmeticOp::Div, sum, AtomicValue::integer(count), tz)?;
        ctx.atomics().create(&avg)
    }
}

/// Rank of a numeric type in the promotion order.
fn numeric_rank(tag: ValueTag) -> Option<u8> {
    match tag {
        t if t.is_integer() => Some(0),
        ValueTag::Decimal => Some(1),
        ValueTag::Float => Some(2),
        ValueTag::Double => Some(3),
        _ => None,
    }
}

fn is_nan(v: &AtomicValue) -> bool {
    match v {
        AtomicValue::Double(d) => d.is_nan(),
        AtomicValue::Float(f) => f.is_nan(),
        _ => false,
    }
}

/// `fn:min` and `fn:max` under an optional collation.
///
/// Untyped values compare as doubles, NaN wins outright, and a numeric
/// result takes the widest numeric type seen in the input.
#[derive(Debug)]
pub struct Extremum {
    input: BoxedIterator,
    keep: Ordering,
    collation: Option<String>,
}

impl Extremum {
    pub fn min(input: BoxedIterator) -> Self {
        Self {
            input,
            keep: Ordering::Less,
            collation: None,
        }
    }

    pub fn max(input: BoxedIterator) -> Self {
        Self {
            input,
            keep: Ordering::Greater,
            collation: None,
        }
    }

    pub fn with_collation(mut self, uri: impl Into<String>) -> Self {
        self.collation = Some(uri.into());
        self
    }

    fn name(&self) -> &'static str {
        if self.keep == Ordering::Less { "fn:min" } else { "fn:max" }
    }
}

impl EagerEvaluator for Extremum {
    fn evaluate(&self, frame: &mut Frame<'_>) -> Result<TaggedValue> {
        let ctx = frame.ctx();
        let collation = ctx.collation(self.collation.as_deref())?;
        let tz = ctx.implicit_timezone();
        let name = self.name();
        let best = with_open(self.input.as_ref(), frame, |it, frame| {
            let mut best: Option<AtomicValue> = None;
            let mut widest: Option<u8> = None;
            while let Some(item) = it.next(frame)? {
                let v = untyped_to_double(atomize(&item)?)?;
                if let Some(r) = numeric_rank(v.tag()) {
                    widest = Some(widest.map_or(r, |w| w.max(r)));
                }
                best = Some(match best {
                    None => {
                        // rejects types without an ordering even for one item
                        compare_atomic(&v, &v, collation.as_ref(), tz).map_err(|e| invalid_argument(name, e))?;
                        v
                    }
                    Some(b) if is_nan(&b) => b,
                    Some(b) => {
                        let ord = compare_atomic(&v, &b, collation.as_ref(), tz)
                            .map_err(|e| invalid_argument(name, e))?;
                        match ord {
                            None => v,
                            Some(o) if o == self.keep => v,
                            Some(_) => b,
                        }
                    }
                });
            }
            Ok(best.map(|b| (b, widest)))
        })?;
        let Some((best, widest)) = best else {
            return Ok(TaggedValue::empty_sequence());
        };
        let best = match widest {
            Some(3) => cast_atomic(&best, ValueTag::Double)?,
            Some(2) => cast_atomic(&best, ValueTag::Float)?,
            Some(1) => cast_atomic(&best, ValueTag::Decimal)?,
            _ => best,
        };
        ctx.atomics().create(&best)
    }
}
