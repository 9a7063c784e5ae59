//! `cast as` and `castable as` between the atomic types of the value format.
//!
//! Lexical forms follow XML Schema: surrounding whitespace is stripped,
//! timezones are `Z` or `±hh:mm`, durations are `-?PnYnMnDTnHnMnS`.
use super::helpers::{atomize, cast_error, parse_double};
use crate::datamodel::{AtomicValue, Decimal, IntegerKind, Item, TaggedValue, ValueTag};
use crate::error::{Error, ErrorCode, Result};
use crate::names::QName;
use crate::runtime::base::EagerEvaluator;
use crate::runtime::frame::Frame;
use crate::runtime::iterator::{BoxedIterator, drain_items};
use chrono::{FixedOffset, NaiveDate, NaiveDateTime, NaiveTime, Timelike};

const MILLIS_PER_DAY: i64 = 86_400_000;

fn type_name(tag: ValueTag) -> &'static str {
    match tag {
        ValueTag::String => "xs:string",
        ValueTag::UntypedAtomic => "xs:untypedAtomic",
        ValueTag::AnyUri => "xs:anyURI",
        ValueTag::Boolean => "xs:boolean",
        ValueTag::Decimal => "xs:decimal",
        ValueTag::Float => "xs:float",
        ValueTag::Double => "xs:double",
        ValueTag::QName => "xs:QName",
        ValueTag::DateTime => "xs:dateTime",
        ValueTag::Date => "xs:date",
        ValueTag::Time => "xs:time",
        ValueTag::Duration => "xs:duration",
        ValueTag::YearMonthDuration => "xs:yearMonthDuration",
        ValueTag::DayTimeDuration => "xs:dayTimeDuration",
        ValueTag::Null => "js:null",
        t if t.is_integer() => "xs:integer",
        _ => "a non-atomic type",
    }
}

fn not_castable(from: &AtomicValue, target: ValueTag) -> Error {
    Error::new(
        ErrorCode::XPTY0004,
        format!("{:?} cannot be cast to {}", from.tag(), type_name(target)),
    )
}

fn lexical(s: &str) -> &str {
    s.trim_matches(|c: char| matches!(c, ' ' | '\t' | '\n' | '\r'))
}

/// Casts one atomic value to the atomic type `target`.
///
/// `XPTY0004` for type pairs without a cast, `FORG0001` for invalid lexical
/// forms or out-of-range integers, `FOCA0002` and `FOCA0003` for NaN,
/// infinities and values too large for an integer type.
pub fn cast_atomic(value: &AtomicValue, target: ValueTag) -> Result<AtomicValue> {
    use AtomicValue as A;
    if !target.is_atomic() {
        return Err(Error::type_mismatch("atomic target type", target));
    }
    if value.tag() == target {
        return Ok(value.clone());
    }
    if let Some(kind) = IntegerKind::from_tag(target) {
        return to_integer(value, kind);
    }
    let text = match value {
        A::String(s) | A::UntypedAtomic(s) => Some(lexical(s)),
        _ => None,
    };
    Ok(match target {
        ValueTag::String => A::String(value.string_value()),
        ValueTag::UntypedAtomic => A::UntypedAtomic(value.string_value()),
        ValueTag::AnyUri => match value {
            A::String(s) | A::UntypedAtomic(s) => A::AnyUri(lexical(s).to_owned()),
            _ => return Err(not_castable(value, target)),
        },
        ValueTag::Boolean => match (value, text) {
            (_, Some("true" | "1")) => A::Boolean(true),
            (_, Some("false" | "0")) => A::Boolean(false),
            (_, Some(s)) => return Err(cast_error(s, "xs:boolean")),
            (A::Integer(_, i), _) => A::Boolean(*i != 0),
            (A::Decimal(d), _) => A::Boolean(!d.is_zero()),
            (A::Float(f), _) => A::Boolean(!(*f == 0.0 || f.is_nan())),
            (A::Double(d), _) => A::Boolean(!(*d == 0.0 || d.is_nan())),
            _ => return Err(not_castable(value, target)),
        },
        ValueTag::Double => A::Double(to_double(value, target)?),
        #[allow(clippy::cast_possible_truncation)]
        ValueTag::Float => A::Float(to_double(value, target)? as f32),
        ValueTag::Decimal => A::Decimal(to_decimal(value)?),
        ValueTag::QName => match text {
            Some(s) => A::QName(parse_qname(s)?),
            None => return Err(not_castable(value, target)),
        },
        ValueTag::DateTime => match (value, text) {
            (_, Some(s)) => {
                let (value, tz) = parse_date_time(s)?;
                A::DateTime { value, tz }
            }
            (A::Date { date, tz }, _) => A::DateTime {
                value: date.and_time(NaiveTime::default()),
                tz: *tz,
            },
            _ => return Err(not_castable(value, target)),
        },
        ValueTag::Date => match (value, text) {
            (_, Some(s)) => {
                let (date, tz) = parse_date(s)?;
                A::Date { date, tz }
            }
            (A::DateTime { value, tz }, _) => A::Date {
                date: value.date(),
                tz: *tz,
            },
            _ => return Err(not_castable(value, target)),
        },
        ValueTag::Time => match (value, text) {
            (_, Some(s)) => {
                let (time, tz) = parse_time(s)?;
                A::Time { time, tz }
            }
            (A::DateTime { value, tz }, _) => A::Time {
                time: value.time(),
                tz: *tz,
            },
            _ => return Err(not_castable(value, target)),
        },
        ValueTag::Duration | ValueTag::YearMonthDuration | ValueTag::DayTimeDuration => {
            let (months, millis) = match (value, text) {
                (_, Some(s)) => parse_duration(s, target)?,
                (A::Duration { months, millis }, _) => (*months, *millis),
                (A::YearMonthDuration(m), _) => (*m, 0),
                (A::DayTimeDuration(ms), _) => (0, *ms),
                _ => return Err(not_castable(value, target)),
            };
            match target {
                ValueTag::YearMonthDuration => A::YearMonthDuration(months),
                ValueTag::DayTimeDuration => A::DayTimeDuration(millis),
                _ => A::Duration { months, millis },
            }
        }
        _ => return Err(not_castable(value, target)),
    })
}

/// Whether `cast_atomic` would succeed. Engine failures still propagate.
pub fn is_castable(value: &AtomicValue, target: ValueTag) -> Result<bool> {
    match cast_atomic(value, target) {
        Ok(_) => Ok(true),
        Err(e) if e.is_system() => Err(e),
        Err(_) => Ok(false),
    }
}

#[allow(clippy::cast_precision_loss)]
fn to_double(value: &AtomicValue, target: ValueTag) -> Result<f64> {
    match value {
        AtomicValue::String(s) | AtomicValue::UntypedAtomic(s) => parse_double(s),
        AtomicValue::Integer(_, i) => Ok(*i as f64),
        AtomicValue::Decimal(d) => Ok(d.to_f64()),
        AtomicValue::Float(f) => Ok(f64::from(*f)),
        AtomicValue::Double(d) => Ok(*d),
        AtomicValue::Boolean(b) => Ok(if *b { 1.0 } else { 0.0 }),
        other => Err(not_castable(other, target)),
    }
}

fn finite(v: f64, target: &str) -> Result<f64> {
    if v.is_finite() {
        Ok(v)
    } else {
        Err(Error::new(
            ErrorCode::FOCA0002,
            format!("{} cannot be cast to {target}", AtomicValue::Double(v)),
        ))
    }
}

fn to_decimal(value: &AtomicValue) -> Result<Decimal> {
    let too_large = || Error::new(ErrorCode::FOCA0003, "value too large for xs:decimal");
    match value {
        AtomicValue::String(s) | AtomicValue::UntypedAtomic(s) => {
            Decimal::parse(lexical(s)).ok_or_else(|| cast_error(s, "xs:decimal"))
        }
        AtomicValue::Integer(_, i) => Ok(Decimal::from_i64(*i)),
        AtomicValue::Float(f) => Decimal::from_f64(finite(f64::from(*f), "xs:decimal")?).ok_or_else(too_large),
        AtomicValue::Double(d) => Decimal::from_f64(finite(*d, "xs:decimal")?).ok_or_else(too_large),
        AtomicValue::Boolean(b) => Ok(Decimal::from_i64(i64::from(*b))),
        other => Err(not_castable(other, ValueTag::Decimal)),
    }
}

#[allow(clippy::cast_precision_loss, clippy::cast_possible_truncation)]
fn to_integer(value: &AtomicValue, kind: IntegerKind) -> Result<AtomicValue> {
    let v = match value {
        AtomicValue::Integer(_, i) => *i,
        AtomicValue::Decimal(d) => d.trunc(),
        AtomicValue::Float(_) | AtomicValue::Double(_) => {
            let f = finite(to_double(value, kind.tag())?, "xs:integer")?.trunc();
            if f < i64::MIN as f64 || f >= i64::MAX as f64 {
                return Err(Error::new(ErrorCode::FOCA0003, "value too large for xs:integer"));
            }
            f as i64
        }
        AtomicValue::Boolean(b) => i64::from(*b),
        AtomicValue::String(s) | AtomicValue::UntypedAtomic(s) => parse_integer(lexical(s))?,
        other => return Err(not_castable(other, kind.tag())),
    };
    Ok(AtomicValue::Integer(kind, kind.check(v)?))
}

fn parse_integer(s: &str) -> Result<i64> {
    let digits = s.strip_prefix(['+', '-']).unwrap_or(s);
    if digits.is_empty() || !digits.bytes().all(|b| b.is_ascii_digit()) {
        return Err(cast_error(s, "xs:integer"));
    }
    s.parse::<i64>()
        .map_err(|_| Error::new(ErrorCode::FOCA0003, format!("{s} is too large for xs:integer")))
}

fn is_ncname(s: &str) -> bool {
    let mut chars = s.chars();
    chars
        .next()
        .is_some_and(|c| c.is_alphabetic() || c == '_')
        && chars.all(|c| c.is_alphanumeric() || matches!(c, '_' | '-' | '.'))
}

/// Only unprefixed names resolve without in-scope namespaces.
fn parse_qname(s: &str) -> Result<QName> {
    if s.contains(':') {
        return Err(Error::new(
            ErrorCode::FORG0001,
            format!("no namespace binding for the prefix of {s:?}"),
        ));
    }
    if !is_ncname(s) {
        return Err(cast_error(s, "xs:QName"));
    }
    Ok(QName::local(s))
}

/// Splits a trailing `Z` or `±hh:mm`.
fn split_timezone(s: &str) -> Result<(&str, Option<FixedOffset>)> {
    if let Some(rest) = s.strip_suffix('Z') {
        return Ok((rest, FixedOffset::east_opt(0)));
    }
    let bytes = s.as_bytes();
    let n = bytes.len();
    if n < 6 || !matches!(bytes[n - 6], b'+' | b'-') || bytes[n - 3] != b':' {
        return Ok((s, None));
    }
    let (rest, tz) = s.split_at(n - 6);
    let invalid = || cast_error(s, "a timezone");
    let hours: i32 = tz[1..3].parse().map_err(|_| invalid())?;
    let minutes: i32 = tz[4..6].parse().map_err(|_| invalid())?;
    if hours > 14 || minutes > 59 || (hours == 14 && minutes > 0) {
        return Err(invalid());
    }
    let secs = (hours * 60 + minutes) * 60;
    let secs = if bytes[n - 6] == b'-' { -secs } else { secs };
    Ok((rest, FixedOffset::east_opt(secs)))
}

fn parse_date(s: &str) -> Result<(NaiveDate, Option<FixedOffset>)> {
    let (body, tz) = split_timezone(s)?;
    let date = NaiveDate::parse_from_str(body, "%Y-%m-%d").map_err(|_| cast_error(s, "xs:date"))?;
    Ok((date, tz))
}

fn parse_clock(body: &str, s: &str) -> Result<NaiveTime> {
    let time = NaiveTime::parse_from_str(body, "%H:%M:%S%.f").map_err(|_| cast_error(s, "xs:time"))?;
    // the value space keeps milliseconds
    Ok(time.with_nanosecond(time.nanosecond() / 1_000_000 * 1_000_000).unwrap_or(time))
}

fn parse_time(s: &str) -> Result<(NaiveTime, Option<FixedOffset>)> {
    let (body, tz) = split_timezone(s)?;
    Ok((parse_clock(body, s)?, tz))
}

fn parse_date_time(s: &str) -> Result<(NaiveDateTime, Option<FixedOffset>)> {
    let (body, tz) = split_timezone(s)?;
    let (date, time) = body.split_once('T').ok_or_else(|| cast_error(s, "xs:dateTime"))?;
    let date = NaiveDate::parse_from_str(date, "%Y-%m-%d").map_err(|_| cast_error(s, "xs:dateTime"))?;
    Ok((date.and_time(parse_clock(time, s)?), tz))
}

/// `(months, milliseconds)` of a duration literal. The subtypes reject the
/// components outside their value space.
fn parse_duration(s: &str, target: ValueTag) -> Result<(i32, i64)> {
    let invalid = || cast_error(s, type_name(target));
    let overflow = || Error::new(ErrorCode::FOAR0002, format!("{s} overflows {}", type_name(target)));
    let (negative, rest) = match s.strip_prefix('-') {
        Some(rest) => (true, rest),
        None => (false, s),
    };
    let rest = rest.strip_prefix('P').ok_or_else(invalid)?;
    let (date_part, time_part) = match rest.split_once('T') {
        Some((_, "")) => return Err(invalid()),
        Some((d, t)) => (d, Some(t)),
        None => (rest, None),
    };
    let mut months: i64 = 0;
    let mut millis: i64 = 0;
    let mut seen = false;
    for (designators, part, time) in [("YMD", date_part, false), ("HMS", time_part.unwrap_or(""), true)] {
        let mut allowed = designators;
        let mut number = String::new();
        for c in part.chars() {
            if c.is_ascii_digit() || (time && c == '.') {
                number.push(c);
                continue;
            }
            let at = allowed.find(c).ok_or_else(invalid)?;
            allowed = &allowed[at + 1..];
            if number.is_empty() {
                return Err(invalid());
            }
            seen = true;
            let amount = component(&number, c, time).ok_or_else(invalid)?;
            let (total, scale) = match (time, c) {
                (false, 'Y') => (&mut months, 12),
                (false, 'M') => (&mut months, 1),
                (false, _) => (&mut millis, MILLIS_PER_DAY),
                (true, 'H') => (&mut millis, 3_600_000),
                (true, 'M') => (&mut millis, 60_000),
                (true, _) => (&mut millis, 1),
            };
            *total = amount
                .checked_mul(scale)
                .and_then(|v| total.checked_add(v))
                .ok_or_else(overflow)?;
            number.clear();
        }
        if !number.is_empty() {
            return Err(invalid());
        }
    }
    if !seen {
        return Err(invalid());
    }
    match target {
        ValueTag::YearMonthDuration if millis != 0 => return Err(invalid()),
        ValueTag::DayTimeDuration if months != 0 => return Err(invalid()),
        _ => {}
    }
    let months = i32::try_from(months).map_err(|_| overflow())?;
    Ok(if negative { (-months, -millis) } else { (months, millis) })
}

/// Integer amount of one component; seconds are returned in milliseconds.
fn component(number: &str, designator: char, time: bool) -> Option<i64> {
    if time && designator == 'S' {
        let (whole, frac) = number.split_once('.').unwrap_or((number, ""));
        if whole.is_empty() || frac.contains('.') || !frac.bytes().all(|b| b.is_ascii_digit()) {
            return None;
        }
        let frac: String = frac.chars().chain("000".chars()).take(3).collect();
        return whole
            .parse::<i64>()
            .ok()?
            .checked_mul(1000)?
            .checked_add(frac.parse::<i64>().ok()?);
    }
    if number.contains('.') {
        return None;
    }
    number.parse().ok()
}

/// Atomized operand of a cast: `None` for the empty sequence, an error for
/// more than one item.
fn cast_operand(items: &[Item]) -> Result<Option<AtomicValue>> {
    match items {
        [] => Ok(None),
        [one] => atomize(one).map(Some),
        _ => Err(Error::new(
            ErrorCode::XPTY0004,
            "cast operand must be zero or one item",
        )),
    }
}

/// `$input cast as T` or `T?` when `allow_empty`.
#[derive(Debug)]
pub struct CastAs {
    input: BoxedIterator,
    target: ValueTag,
    allow_empty: bool,
}

impl CastAs {
    pub fn new(input: BoxedIterator, target: ValueTag) -> Self {
        Self {
            input,
            target,
            allow_empty: false,
        }
    }

    /// `cast as T?`
    pub fn optional(mut self) -> Self {
        self.allow_empty = true;
        self
    }
}

impl EagerEvaluator for CastAs {
    fn evaluate(&self, frame: &mut Frame<'_>) -> Result<TaggedValue> {
        let items = drain_items(self.input.as_ref(), frame)?;
        let Some(value) = cast_operand(&items)? else {
            if self.allow_empty {
                return Ok(TaggedValue::empty_sequence());
            }
            return Err(Error::new(
                ErrorCode::XPTY0004,
                format!("empty sequence cannot be cast to {}", type_name(self.target)),
            ));
        };
        let cast = cast_atomic(&value, self.target)?;
        frame.ctx().atomics().create(&cast)
    }
}

/// `$input castable as T` (or `T?`); never raises a cast error.
#[derive(Debug)]
pub struct CastableAs {
    input: BoxedIterator,
    target: ValueTag,
    allow_empty: bool,
}

impl CastableAs {
    pub fn new(input: BoxedIterator, target: ValueTag) -> Self {
        Self {
            input,
            target,
            allow_empty: false,
        }
    }

    pub fn optional(mut self) -> Self {
        self.allow_empty = true;
        self
    }
}

impl EagerEvaluator for CastableAs {
    fn evaluate(&self, frame: &mut Frame<'_>) -> Result<TaggedValue> {
        let items = drain_items(self.input.as_ref(), frame)?;
        let castable = match items.as_slice() {
            [] => self.allow_empty,
            [one] => match atomize(one) {
                Ok(value) => is_castable(&value, self.target)?,
                Err(e) if e.is_system() => return Err(e),
                Err(_) => false,
            },
            _ => false,
        };
        Ok(TaggedValue::boolean(castable))
    }
}
