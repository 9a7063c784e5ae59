//! Value comparison (`eq ne lt le gt ge`) and the ordering used by `order by`.
use super::helpers::{atomize_optional, parse_double};
use crate::datamodel::{AtomicValue, Decimal, TaggedValue};
use crate::error::{Error, ErrorCode, Result};
use crate::runtime::base::EagerEvaluator;
use crate::runtime::collation::Collation;
use crate::runtime::frame::Frame;
use crate::runtime::iterator::BoxedIterator;
use chrono::{FixedOffset, NaiveDate, NaiveDateTime, NaiveTime, TimeDelta};
use core::cmp::Ordering;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ComparisonOp {
    Eq,
    Ne,
    Lt,
    Le,
    Gt,
    Ge,
}

impl ComparisonOp {
    /// Whether the operator holds for `ord`; unordered operands (NaN) only satisfy `ne`.
    pub fn holds(self, ord: Option<Ordering>) -> bool {
        match ord {
            None => self == ComparisonOp::Ne,
            Some(o) => match self {
                ComparisonOp::Eq => o == Ordering::Equal,
                ComparisonOp::Ne => o != Ordering::Equal,
                ComparisonOp::Lt => o == Ordering::Less,
                ComparisonOp::Le => o != Ordering::Greater,
                ComparisonOp::Gt => o == Ordering::Greater,
                ComparisonOp::Ge => o != Ordering::Less,
            },
        }
    }

    fn is_equality(self) -> bool {
        matches!(self, ComparisonOp::Eq | ComparisonOp::Ne)
    }
}

enum Numeric {
    Int(i64),
    Dec(Decimal),
    Dbl(f64),
}

fn numeric(v: &AtomicValue) -> Option<Numeric> {
    Some(match v {
        AtomicValue::Integer(_, i) => Numeric::Int(*i),
        AtomicValue::Decimal(d) => Numeric::Dec(*d),
        AtomicValue::Float(f) => Numeric::Dbl(f64::from(*f)),
        AtomicValue::Double(d) => Numeric::Dbl(*d),
        _ => return None,
    })
}

fn compare_numeric(a: Numeric, b: Numeric) -> Option<Ordering> {
    match (a, b) {
        (Numeric::Int(x), Numeric::Int(y)) => Some(x.cmp(&y)),
        (Numeric::Int(x), Numeric::Dec(y)) => Some(Decimal::from_i64(x).cmp(&y)),
        (Numeric::Dec(x), Numeric::Int(y)) => Some(x.cmp(&Decimal::from_i64(y))),
        (Numeric::Dec(x), Numeric::Dec(y)) => Some(x.cmp(&y)),
        (x, y) => to_f64(x).partial_cmp(&to_f64(y)),
    }
}

#[allow(clippy::cast_precision_loss)]
fn to_f64(n: Numeric) -> f64 {
    match n {
        Numeric::Int(i) => i as f64,
        Numeric::Dec(d) => d.to_f64(),
        Numeric::Dbl(d) => d,
    }
}

fn is_stringish(v: &AtomicValue) -> Option<&str> {
    match v {
        AtomicValue::String(s) | AtomicValue::AnyUri(s) | AtomicValue::UntypedAtomic(s) => Some(s),
        _ => None,
    }
}

/// Absent timezones take the implicit one.
pub(crate) fn to_utc(value: &NaiveDateTime, tz: Option<FixedOffset>, implicit: FixedOffset) -> NaiveDateTime {
    let offset = tz.unwrap_or(implicit);
    *value - TimeDelta::seconds(i64::from(offset.local_minus_utc()))
}

fn reference_date() -> NaiveDate {
    NaiveDate::from_ymd_opt(1972, 12, 31).unwrap_or_default()
}

fn time_instant(t: &NaiveTime, tz: Option<FixedOffset>, implicit: FixedOffset) -> NaiveDateTime {
    to_utc(&reference_date().and_time(*t), tz, implicit)
}

fn not_comparable(a: &AtomicValue, b: &AtomicValue) -> Error {
    Error::new(
        ErrorCode::XPTY0004,
        format!("cannot compare {:?} with {:?}", a.tag(), b.tag()),
    )
}

/// Order of two atomic values; `None` when unordered (NaN involved).
///
/// `xs:untypedAtomic` compares as a string against strings and as a double
/// against numbers. `null` sorts before every other value.
pub fn compare_atomic(
    a: &AtomicValue,
    b: &AtomicValue,
    collation: &dyn Collation,
    implicit_tz: FixedOffset,
) -> Result<Option<Ordering>> {
    use AtomicValue as A;
    match (a, b) {
        (A::Null, A::Null) => return Ok(Some(Ordering::Equal)),
        (A::Null, _) => return Ok(Some(Ordering::Less)),
        (_, A::Null) => return Ok(Some(Ordering::Greater)),
        _ => {}
    }
    if let (Some(x), Some(y)) = (is_stringish(a), is_stringish(b)) {
        return Ok(Some(collation.compare(x, y)));
    }
    match (a, b, numeric(a), numeric(b)) {
        (_, _, Some(x), Some(y)) => return Ok(compare_numeric(x, y)),
        (A::UntypedAtomic(s), _, None, Some(y)) => {
            return Ok(compare_numeric(Numeric::Dbl(parse_double(s)?), y));
        }
        (_, A::UntypedAtomic(s), Some(x), None) => {
            return Ok(compare_numeric(x, Numeric::Dbl(parse_double(s)?)));
        }
        _ => {}
    }
    Ok(Some(match (a, b) {
        (A::Boolean(x), A::Boolean(y)) => x.cmp(y),
        (A::DateTime { value: x, tz: tx }, A::DateTime { value: y, tz: ty }) => {
            to_utc(x, *tx, implicit_tz).cmp(&to_utc(y, *ty, implicit_tz))
        }
        (A::Date { date: x, tz: tx }, A::Date { date: y, tz: ty }) => {
            let midnight = NaiveTime::default();
            to_utc(&x.and_time(midnight), *tx, implicit_tz)
                .cmp(&to_utc(&y.and_time(midnight), *ty, implicit_tz))
        }
        (A::Time { time: x, tz: tx }, A::Time { time: y, tz: ty }) => {
            time_instant(x, *tx, implicit_tz).cmp(&time_instant(y, *ty, implicit_tz))
        }
        (A::YearMonthDuration(x), A::YearMonthDuration(y)) => x.cmp(y),
        (A::DayTimeDuration(x), A::DayTimeDuration(y)) => x.cmp(y),
        _ => return Err(not_comparable(a, b)),
    }))
}

fn duration_parts(v: &AtomicValue) -> Option<(i32, i64)> {
    match v {
        AtomicValue::Duration { months, millis } => Some((*months, *millis)),
        AtomicValue::YearMonthDuration(m) => Some((*m, 0)),
        AtomicValue::DayTimeDuration(ms) => Some((0, *ms)),
        _ => None,
    }
}

/// Applies a value comparison operator to two atomic values.
pub fn value_compare(
    op: ComparisonOp,
    a: &AtomicValue,
    b: &AtomicValue,
    collation: &dyn Collation,
    implicit_tz: FixedOffset,
) -> Result<bool> {
    if op.is_equality() {
        let equal = match (a, b) {
            (AtomicValue::QName(x), AtomicValue::QName(y)) => Some(x.matches_expanded(y)),
            _ => match (duration_parts(a), duration_parts(b)) {
                (Some(x), Some(y)) => Some(x == y),
                _ => None,
            },
        };
        if let Some(equal) = equal {
            return Ok(equal == (op == ComparisonOp::Eq));
        }
    }
    Ok(op.holds(compare_atomic(a, b, collation, implicit_tz)?))
}

/// `left op right`; the empty sequence when either side is empty.
#[derive(Debug)]
pub struct ValueComparison {
    op: ComparisonOp,
    left: BoxedIterator,
    right: BoxedIterator,
    collation: Option<String>,
}

impl ValueComparison {
    pub fn new(op: ComparisonOp, left: BoxedIterator, right: BoxedIterator) -> Self {
        Self {
            op,
            left,
            right,
            collation: None,
        }
    }

    pub fn with_collation(mut self, uri: impl Into<String>) -> Self {
        self.collation = Some(uri.into());
        self
    }
}

impl EagerEvaluator for ValueComparison {
    fn evaluate(&self, frame: &mut Frame<'_>) -> Result<TaggedValue> {
        let Some(a) = atomize_optional(self.left.as_ref(), frame)? else {
            return Ok(TaggedValue::empty_sequence());
        };
        let Some(b) = atomize_optional(self.right.as_ref(), frame)? else {
            return Ok(TaggedValue::empty_sequence());
        };
        let ctx = frame.ctx();
        let collation = ctx.collation(self.collation.as_deref())?;
        let result = value_compare(self.op, &a, &b, collation.as_ref(), ctx.implicit_timezone())?;
        Ok(TaggedValue::boolean(result))
    }
}
