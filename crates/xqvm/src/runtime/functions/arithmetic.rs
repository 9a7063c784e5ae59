//! Arithmetic operators over numbers, durations and date/time values.
use super::compare::to_utc;
use super::helpers::{atomize_optional, parse_double};
use crate::datamodel::{AtomicValue, Decimal, TaggedValue};
use crate::error::{Error, ErrorCode, Result};
use crate::runtime::base::EagerEvaluator;
use crate::runtime::frame::Frame;
use crate::runtime::iterator::BoxedIterator;
use chrono::{FixedOffset, Months, NaiveDateTime, NaiveTime, TimeDelta};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ArithmeticOp {
    Add,
    Sub,
    Mul,
    Div,
    IDiv,
    Mod,
}

impl ArithmeticOp {
    fn symbol(self) -> &'static str {
        match self {
            ArithmeticOp::Add => "+",
            ArithmeticOp::Sub => "-",
            ArithmeticOp::Mul => "*",
            ArithmeticOp::Div => "div",
            ArithmeticOp::IDiv => "idiv",
            ArithmeticOp::Mod => "mod",
        }
    }
}

/// Numeric operand after promotion; variants are in promotion order.
#[derive(Debug, Clone, Copy)]
enum Num {
    Int(i64),
    Dec(Decimal),
    Float(f32),
    Double(f64),
}

impl Num {
    fn of(v: &AtomicValue) -> Option<Num> {
        Some(match v {
            AtomicValue::Integer(_, i) => Num::Int(*i),
            AtomicValue::Decimal(d) => Num::Dec(*d),
            AtomicValue::Float(f) => Num::Float(*f),
            AtomicValue::Double(d) => Num::Double(*d),
            _ => return None,
        })
    }

    fn rank(self) -> u8 {
        match self {
            Num::Int(_) => 0,
            Num::Dec(_) => 1,
            Num::Float(_) => 2,
            Num::Double(_) => 3,
        }
    }

    #[allow(clippy::cast_precision_loss)]
    fn to_f64(self) -> f64 {
        match self {
            Num::Int(i) => i as f64,
            Num::Dec(d) => d.to_f64(),
            Num::Float(f) => f64::from(f),
            Num::Double(d) => d,
        }
    }

    #[allow(clippy::cast_possible_truncation)]
    fn promote(self, rank: u8) -> Num {
        match (self, rank) {
            (Num::Int(i), 1) => Num::Dec(Decimal::from_i64(i)),
            (n, 2) => Num::Float(n.to_f64() as f32),
            (n, 3) => Num::Double(n.to_f64()),
            (n, _) => n,
        }
    }
}

fn overflow(op: ArithmeticOp) -> Error {
    Error::new(ErrorCode::FOAR0002, format!("numeric overflow in {}", op.symbol()))
}

fn division_by_zero() -> Error {
    Error::new(ErrorCode::FOAR0001, "division by zero")
}

#[allow(clippy::cast_precision_loss, clippy::cast_possible_truncation)]
fn integer_result(op: ArithmeticOp, v: f64) -> Result<AtomicValue> {
    if v.is_finite() && v >= i64::MIN as f64 && v < i64::MAX as f64 {
        Ok(AtomicValue::integer(v.trunc() as i64))
    } else {
        Err(overflow(op))
    }
}

fn integer_op(op: ArithmeticOp, a: i64, b: i64) -> Result<AtomicValue> {
    let checked = match op {
        ArithmeticOp::Add => a.checked_add(b),
        ArithmeticOp::Sub => a.checked_sub(b),
        ArithmeticOp::Mul => a.checked_mul(b),
        ArithmeticOp::Div => {
            return Decimal::from_i64(a)
                .checked_div(Decimal::from_i64(b))
                .map(AtomicValue::Decimal)
                .ok_or_else(|| if b == 0 { division_by_zero() } else { overflow(op) });
        }
        ArithmeticOp::IDiv | ArithmeticOp::Mod if b == 0 => return Err(division_by_zero()),
        ArithmeticOp::IDiv => a.checked_div(b),
        ArithmeticOp::Mod => a.checked_rem(b),
    };
    checked.map(AtomicValue::integer).ok_or_else(|| overflow(op))
}

fn decimal_op(op: ArithmeticOp, a: Decimal, b: Decimal) -> Result<AtomicValue> {
    if matches!(op, ArithmeticOp::Div | ArithmeticOp::IDiv | ArithmeticOp::Mod) && b.is_zero() {
        return Err(division_by_zero());
    }
    let result = match op {
        ArithmeticOp::Add => a.checked_add(b),
        ArithmeticOp::Sub => a.checked_sub(b),
        ArithmeticOp::Mul => a.checked_mul(b),
        ArithmeticOp::Div => a.checked_div(b),
        ArithmeticOp::IDiv => {
            return a
                .checked_div(b)
                .map(|q| AtomicValue::integer(q.trunc()))
                .ok_or_else(|| overflow(op));
        }
        ArithmeticOp::Mod => a
            .checked_div(b)
            .map(|q| Decimal::from_i64(q.trunc()))
            .and_then(|q| b.checked_mul(q))
            .and_then(|p| a.checked_sub(p)),
    };
    result.map(AtomicValue::Decimal).ok_or_else(|| overflow(op))
}

fn float_op(op: ArithmeticOp, a: f64, b: f64) -> f64 {
    match op {
        ArithmeticOp::Add => a + b,
        ArithmeticOp::Sub => a - b,
        ArithmeticOp::Mul => a * b,
        ArithmeticOp::Div => a / b,
        ArithmeticOp::IDiv => (a / b).trunc(),
        ArithmeticOp::Mod => a % b,
    }
}

/// `a op b` with numeric promotion integer, decimal, float, double.
pub fn numeric_op(op: ArithmeticOp, a: &AtomicValue, b: &AtomicValue) -> Result<AtomicValue> {
    let (Some(x), Some(y)) = (Num::of(a), Num::of(b)) else {
        return Err(operand_error(op, a, b));
    };
    let rank = x.rank().max(y.rank());
    match (x.promote(rank), y.promote(rank)) {
        (Num::Int(x), Num::Int(y)) => integer_op(op, x, y),
        (Num::Dec(x), Num::Dec(y)) => decimal_op(op, x, y),
        (x, y) if op == ArithmeticOp::IDiv => {
            let (x, y) = (x.to_f64(), y.to_f64());
            if y == 0.0 {
                return Err(division_by_zero());
            }
            integer_result(op, x / y)
        }
        #[allow(clippy::cast_possible_truncation)]
        (Num::Float(x), Num::Float(y)) => {
            Ok(AtomicValue::Float(float_op(op, f64::from(x), f64::from(y)) as f32))
        }
        (x, y) => Ok(AtomicValue::Double(float_op(op, x.to_f64(), y.to_f64()))),
    }
}

fn operand_error(op: ArithmeticOp, a: &AtomicValue, b: &AtomicValue) -> Error {
    Error::new(
        ErrorCode::XPTY0004,
        format!("{:?} {} {:?} is not defined", a.tag(), op.symbol(), b.tag()),
    )
}

#[allow(clippy::cast_possible_truncation, clippy::cast_precision_loss)]
fn scale_i64(v: i64, factor: f64, op: ArithmeticOp) -> Result<i64> {
    let r = (v as f64 * factor).round();
    if r.is_finite() && r >= i64::MIN as f64 && r < i64::MAX as f64 {
        Ok(r as i64)
    } else {
        Err(overflow(op))
    }
}

fn scale_months(v: i32, factor: f64, op: ArithmeticOp) -> Result<i32> {
    i32::try_from(scale_i64(i64::from(v), factor, op)?).map_err(|_| overflow(op))
}

fn months(n: i32) -> Months {
    Months::new(n.unsigned_abs())
}

fn shift_months(dt: NaiveDateTime, n: i32, op: ArithmeticOp) -> Result<NaiveDateTime> {
    let shifted = if n >= 0 {
        dt.checked_add_months(months(n))
    } else {
        dt.checked_sub_months(months(n))
    };
    shifted.ok_or_else(|| overflow(op))
}

fn millis(ms: i64, op: ArithmeticOp) -> Result<TimeDelta> {
    TimeDelta::try_milliseconds(ms).ok_or_else(|| overflow(op))
}

fn shift_millis(dt: NaiveDateTime, ms: i64, op: ArithmeticOp) -> Result<NaiveDateTime> {
    dt.checked_add_signed(millis(ms, op)?)
        .ok_or_else(|| overflow(op))
}

fn millis_between(a: NaiveDateTime, b: NaiveDateTime) -> i64 {
    (a - b).num_milliseconds()
}

/// Arithmetic on durations and date/time values; `None` when neither operand
/// is one.
fn temporal_op(
    op: ArithmeticOp,
    a: &AtomicValue,
    b: &AtomicValue,
    implicit: FixedOffset,
) -> Result<Option<AtomicValue>> {
    use AtomicValue as A;
    use ArithmeticOp as O;
    let neg = |v: i64| if op == O::Sub { v.checked_neg() } else { Some(v) };
    let signed = |m: i32| if op == O::Sub { m.checked_neg() } else { Some(m) };
    Ok(Some(match (op, a, b) {
        (O::Add | O::Sub, A::DayTimeDuration(x), A::DayTimeDuration(y)) => A::DayTimeDuration(
            neg(*y).and_then(|y| x.checked_add(y)).ok_or_else(|| overflow(op))?,
        ),
        (O::Add | O::Sub, A::YearMonthDuration(x), A::YearMonthDuration(y)) => {
            A::YearMonthDuration(signed(*y).and_then(|y| x.checked_add(y)).ok_or_else(|| overflow(op))?)
        }
        (O::Mul, A::DayTimeDuration(d), n) | (O::Mul, n, A::DayTimeDuration(d)) if n.is_numeric() => {
            A::DayTimeDuration(scale_i64(*d, factor(n)?, op)?)
        }
        (O::Mul, A::YearMonthDuration(m), n) | (O::Mul, n, A::YearMonthDuration(m)) if n.is_numeric() => {
            A::YearMonthDuration(scale_months(*m, factor(n)?, op)?)
        }
        (O::Div, A::DayTimeDuration(d), n) if n.is_numeric() => {
            A::DayTimeDuration(scale_i64(*d, 1.0 / factor(n)?, op)?)
        }
        (O::Div, A::YearMonthDuration(m), n) if n.is_numeric() => {
            A::YearMonthDuration(scale_months(*m, 1.0 / factor(n)?, op)?)
        }
        (O::Div, A::DayTimeDuration(x), A::DayTimeDuration(y)) => duration_ratio(*x, *y, op)?,
        (O::Div, A::YearMonthDuration(x), A::YearMonthDuration(y)) => {
            duration_ratio(i64::from(*x), i64::from(*y), op)?
        }
        (O::Sub, A::DateTime { value: x, tz: tx }, A::DateTime { value: y, tz: ty }) => {
            A::DayTimeDuration(millis_between(to_utc(x, *tx, implicit), to_utc(y, *ty, implicit)))
        }
        (O::Sub, A::Date { date: x, tz: tx }, A::Date { date: y, tz: ty }) => {
            let (x, y) = (x.and_time(NaiveTime::default()), y.and_time(NaiveTime::default()));
            A::DayTimeDuration(millis_between(to_utc(&x, *tx, implicit), to_utc(&y, *ty, implicit)))
        }
        (O::Sub, A::Time { time: x, tz: tx }, A::Time { time: y, tz: ty }) => {
            let day = chrono::NaiveDate::default();
            let (x, y) = (day.and_time(*x), day.and_time(*y));
            A::DayTimeDuration(millis_between(to_utc(&x, *tx, implicit), to_utc(&y, *ty, implicit)))
        }
        (O::Add | O::Sub, A::DateTime { value, tz }, A::DayTimeDuration(ms)) => A::DateTime {
            value: shift_millis(*value, neg(*ms).ok_or_else(|| overflow(op))?, op)?,
            tz: *tz,
        },
        (O::Add, A::DayTimeDuration(ms), A::DateTime { value, tz }) => A::DateTime {
            value: shift_millis(*value, *ms, op)?,
            tz: *tz,
        },
        (O::Add | O::Sub, A::DateTime { value, tz }, A::YearMonthDuration(m)) => A::DateTime {
            value: shift_months(*value, signed(*m).ok_or_else(|| overflow(op))?, op)?,
            tz: *tz,
        },
        (O::Add, A::YearMonthDuration(m), A::DateTime { value, tz }) => A::DateTime {
            value: shift_months(*value, *m, op)?,
            tz: *tz,
        },
        (O::Add | O::Sub, A::Date { date, tz }, A::DayTimeDuration(ms)) => A::Date {
            date: shift_millis(date.and_time(NaiveTime::default()), neg(*ms).ok_or_else(|| overflow(op))?, op)?
                .date(),
            tz: *tz,
        },
        (O::Add | O::Sub, A::Date { date, tz }, A::YearMonthDuration(m)) => A::Date {
            date: shift_months(
                date.and_time(NaiveTime::default()),
                signed(*m).ok_or_else(|| overflow(op))?,
                op,
            )?
            .date(),
            tz: *tz,
        },
        (O::Add | O::Sub, A::Time { time, tz }, A::DayTimeDuration(ms)) => {
            let delta = millis(neg(*ms).ok_or_else(|| overflow(op))?, op)?;
            A::Time {
                time: time.overflowing_add_signed(delta).0,
                tz: *tz,
            }
        }
        _ => return Ok(None),
    }))
}

fn factor(n: &AtomicValue) -> Result<f64> {
    let f = match Num::of(n) {
        Some(n) => n.to_f64(),
        None => return Err(Error::type_mismatch("numeric", n.tag())),
    };
    if f.is_nan() {
        return Err(Error::new(ErrorCode::FOAR0002, "duration scaled by NaN"));
    }
    Ok(f)
}

fn duration_ratio(x: i64, y: i64, op: ArithmeticOp) -> Result<AtomicValue> {
    if y == 0 {
        return Err(division_by_zero());
    }
    Decimal::from_i64(x)
        .checked_div(Decimal::from_i64(y))
        .map(AtomicValue::Decimal)
        .ok_or_else(|| overflow(op))
}

fn untyped_to_double(v: AtomicValue) -> Result<AtomicValue> {
    match v {
        AtomicValue::UntypedAtomic(s) => parse_double(&s).map(AtomicValue::Double),
        other => Ok(other),
    }
}

/// `a op b` on two atomized operands.
pub fn arithmetic(op: ArithmeticOp, a: AtomicValue, b: AtomicValue, implicit: FixedOffset) -> Result<AtomicValue> {
    let (a, b) = (untyped_to_double(a)?, untyped_to_double(b)?);
    if a.is_numeric() && b.is_numeric() {
        return numeric_op(op, &a, &b);
    }
    temporal_op(op, &a, &b, implicit)?.ok_or_else(|| operand_error(op, &a, &b))
}

/// `left op right`; an empty operand gives the empty sequence.
#[derive(Debug)]
pub struct Arithmetic {
    op: ArithmeticOp,
    left: BoxedIterator,
    right: BoxedIterator,
}

impl Arithmetic {
    pub fn new(op: ArithmeticOp, left: BoxedIterator, right: BoxedIterator) -> Self {
        Self { op, left, right }
    }
}

impl EagerEvaluator for Arithmetic {
    fn evaluate(&self, frame: &mut Frame<'_>) -> Result<TaggedValue> {
        let Some(a) = atomize_optional(self.left.as_ref(), frame)? else {
            return Ok(TaggedValue::empty_sequence());
        };
        let Some(b) = atomize_optional(self.right.as_ref(), frame)? else {
            return Ok(TaggedValue::empty_sequence());
        };
        let ctx = frame.ctx();
        let result = arithmetic(self.op, a, b, ctx.implicit_timezone())?;
        ctx.atomics().create(&result)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;
    use rstest::rstest;

    fn utc() -> FixedOffset {
        FixedOffset::east_opt(0).unwrap()
    }

    fn int(v: i64) -> AtomicValue {
        AtomicValue::integer(v)
    }

    fn dec(s: &str) -> AtomicValue {
        AtomicValue::Decimal(Decimal::parse(s).unwrap())
    }

    #[rstest]
    #[case(ArithmeticOp::Add, int(2), int(3), int(5))]
    #[case(ArithmeticOp::Div, int(7), int(2), dec("3.5"))]
    #[case(ArithmeticOp::IDiv, int(-7), int(2), int(-3))]
    #[case(ArithmeticOp::Mod, int(-7), int(2), int(-1))]
    #[case(ArithmeticOp::Add, int(1), dec("0.5"), dec("1.5"))]
    #[case(ArithmeticOp::Mul, dec("1.5"), AtomicValue::Double(2.0), AtomicValue::Double(3.0))]
    #[case(ArithmeticOp::Add, AtomicValue::Float(1.5), int(1), AtomicValue::Float(2.5))]
    #[case(ArithmeticOp::Add, AtomicValue::untyped("2"), int(1), AtomicValue::Double(3.0))]
    fn numeric_promotion(
        #[case] op: ArithmeticOp,
        #[case] a: AtomicValue,
        #[case] b: AtomicValue,
        #[case] expected: AtomicValue,
    ) {
        assert_eq!(arithmetic(op, a, b, utc()).unwrap(), expected);
    }

    #[rstest]
    #[case(ArithmeticOp::Div, int(1), int(0), ErrorCode::FOAR0001)]
    #[case(ArithmeticOp::IDiv, dec("1"), dec("0"), ErrorCode::FOAR0001)]
    #[case(ArithmeticOp::Add, int(i64::MAX), int(1), ErrorCode::FOAR0002)]
    #[case(ArithmeticOp::Add, int(1), AtomicValue::Boolean(true), ErrorCode::XPTY0004)]
    #[case(ArithmeticOp::Add, int(1), AtomicValue::untyped("x"), ErrorCode::FORG0001)]
    fn arithmetic_errors(
        #[case] op: ArithmeticOp,
        #[case] a: AtomicValue,
        #[case] b: AtomicValue,
        #[case] code: ErrorCode,
    ) {
        assert_eq!(arithmetic(op, a, b, utc()).unwrap_err().code, code);
    }

    #[rstest]
    #[case(AtomicValue::DateTime {
        value: NaiveDate::from_ymd_opt(2024, 1, 1).unwrap().and_hms_opt(0, 0, 0).unwrap(),
        tz: None,
    })]
    #[case(AtomicValue::Date { date: NaiveDate::from_ymd_opt(2024, 1, 1).unwrap(), tz: None })]
    #[case(AtomicValue::Time { time: NaiveTime::from_hms_opt(12, 0, 0).unwrap(), tz: None })]
    fn out_of_range_day_time_duration_overflows(#[case] start: AtomicValue) {
        let dur = AtomicValue::DayTimeDuration(i64::MIN);
        for op in [ArithmeticOp::Add, ArithmeticOp::Sub] {
            let err = arithmetic(op, start.clone(), dur.clone(), utc()).unwrap_err();
            assert_eq!(err.code, ErrorCode::FOAR0002);
        }
    }

    #[rstest]
    fn double_division_by_zero_is_infinite() {
        let r = arithmetic(ArithmeticOp::Div, AtomicValue::Double(1.0), int(0), utc()).unwrap();
        assert_eq!(r, AtomicValue::Double(f64::INFINITY));
    }

    #[rstest]
    fn date_time_difference() {
        let at = |h| AtomicValue::DateTime {
            value: NaiveDate::from_ymd_opt(2024, 1, 1).unwrap().and_hms_opt(h, 0, 0).unwrap(),
            tz: Some(utc()),
        };
        let r = arithmetic(ArithmeticOp::Sub, at(12), at(10), utc()).unwrap();
        assert_eq!(r, AtomicValue::DayTimeDuration(2 * 3_600_000));
    }

    #[rstest]
    fn month_arithmetic_clamps_day() {
        let d = AtomicValue::Date {
            date: NaiveDate::from_ymd_opt(2024, 1, 31).unwrap(),
            tz: None,
        };
        let r = arithmetic(ArithmeticOp::Add, d, AtomicValue::YearMonthDuration(1), utc()).unwrap();
        assert_eq!(
            r,
            AtomicValue::Date {
                date: NaiveDate::from_ymd_opt(2024, 2, 29).unwrap(),
                tz: None
            }
        );
    }

    #[rstest]
    #[case(ArithmeticOp::Mul, AtomicValue::DayTimeDuration(1000), AtomicValue::Double(2.5), AtomicValue::DayTimeDuration(2500))]
    #[case(ArithmeticOp::Div, AtomicValue::YearMonthDuration(12), int(4), AtomicValue::YearMonthDuration(3))]
    #[case(ArithmeticOp::Div, AtomicValue::DayTimeDuration(3000), AtomicValue::DayTimeDuration(1000), dec("3"))]
    #[case(ArithmeticOp::Sub, AtomicValue::YearMonthDuration(5), AtomicValue::YearMonthDuration(7), AtomicValue::YearMonthDuration(-2))]
    fn durations(
        #[case] op: ArithmeticOp,
        #[case] a: AtomicValue,
        #[case] b: AtomicValue,
        #[case] expected: AtomicValue,
    ) {
        assert_eq!(arithmetic(op, a, b, utc()).unwrap(), expected);
    }
}
