use super::codec;
use super::decimal::Decimal;
use super::pointable::TaggedValuePointable;
use super::tag::ValueTag;
use crate::consts::NO_TIMEZONE;
use crate::error::{Error, ErrorCode, Result};
use crate::names::QName;
use chrono::{Datelike, FixedOffset, NaiveDate, NaiveDateTime, NaiveTime, Timelike};
use core::fmt;

/// The integer-derived types sharing the `Integer` value space.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum IntegerKind {
    Integer,
    NonPositiveInteger,
    NegativeInteger,
    Long,
    Int,
    Short,
    Byte,
    NonNegativeInteger,
    UnsignedLong,
    UnsignedInt,
    UnsignedShort,
    UnsignedByte,
    PositiveInteger,
}

impl IntegerKind {
    pub const fn tag(self) -> ValueTag {
        use IntegerKind as K;
        match self {
            K::Integer => ValueTag::Integer,
            K::NonPositiveInteger => ValueTag::NonPositiveInteger,
            K::NegativeInteger => ValueTag::NegativeInteger,
            K::Long => ValueTag::Long,
            K::Int => ValueTag::Int,
            K::Short => ValueTag::Short,
            K::Byte => ValueTag::Byte,
            K::NonNegativeInteger => ValueTag::NonNegativeInteger,
            K::UnsignedLong => ValueTag::UnsignedLong,
            K::UnsignedInt => ValueTag::UnsignedInt,
            K::UnsignedShort => ValueTag::UnsignedShort,
            K::UnsignedByte => ValueTag::UnsignedByte,
            K::PositiveInteger => ValueTag::PositiveInteger,
        }
    }

    pub const fn from_tag(tag: ValueTag) -> Option<Self> {
        use IntegerKind as K;
        Some(match tag {
            ValueTag::Integer => K::Integer,
            ValueTag::NonPositiveInteger => K::NonPositiveInteger,
            ValueTag::NegativeInteger => K::NegativeInteger,
            ValueTag::Long => K::Long,
            ValueTag::Int => K::Int,
            ValueTag::Short => K::Short,
            ValueTag::Byte => K::Byte,
            ValueTag::NonNegativeInteger => K::NonNegativeInteger,
            ValueTag::UnsignedLong => K::UnsignedLong,
            ValueTag::UnsignedInt => K::UnsignedInt,
            ValueTag::UnsignedShort => K::UnsignedShort,
            ValueTag::UnsignedByte => K::UnsignedByte,
            ValueTag::PositiveInteger => K::PositiveInteger,
            _ => return None,
        })
    }

    /// Inclusive value range. Unsigned long is capped by its `i64` storage.
    pub const fn bounds(self) -> (i64, i64) {
        use IntegerKind as K;
        match self {
            K::Integer | K::Long => (i64::MIN, i64::MAX),
            K::NonPositiveInteger => (i64::MIN, 0),
            K::NegativeInteger => (i64::MIN, -1),
            K::NonNegativeInteger | K::UnsignedLong => (0, i64::MAX),
            K::PositiveInteger => (1, i64::MAX),
            K::Int => (i32::MIN as i64, i32::MAX as i64),
            K::Short => (i16::MIN as i64, i16::MAX as i64),
            K::Byte => (i8::MIN as i64, i8::MAX as i64),
            K::UnsignedInt => (0, u32::MAX as i64),
            K::UnsignedShort => (0, u16::MAX as i64),
            K::UnsignedByte => (0, u8::MAX as i64),
        }
    }

    pub fn check(self, v: i64) -> Result<i64> {
        let (lo, hi) = self.bounds();
        if (lo..=hi).contains(&v) {
            Ok(v)
        } else {
            Err(Error::new(
                ErrorCode::FORG0001,
                format!("{v} is out of range for {:?}", self.tag()),
            ))
        }
    }
}

/// Owned decoding of one atomic value.
#[derive(Debug, Clone, PartialEq)]
pub enum AtomicValue {
    String(String),
    UntypedAtomic(String),
    AnyUri(String),
    Boolean(bool),
    Integer(IntegerKind, i64),
    Decimal(Decimal),
    Float(f32),
    Double(f64),
    QName(QName),
    DateTime {
        value: NaiveDateTime,
        tz: Option<FixedOffset>,
    },
    Date {
        date: NaiveDate,
        tz: Option<FixedOffset>,
    },
    Time {
        time: NaiveTime,
        tz: Option<FixedOffset>,
    },
    Duration {
        months: i32,
        millis: i64,
    },
    YearMonthDuration(i32),
    DayTimeDuration(i64),
    Null,
}

impl AtomicValue {
    pub const fn integer(v: i64) -> Self {
        AtomicValue::Integer(IntegerKind::Integer, v)
    }

    pub fn string(s: impl Into<String>) -> Self {
        AtomicValue::String(s.into())
    }

    pub fn untyped(s: impl Into<String>) -> Self {
        AtomicValue::UntypedAtomic(s.into())
    }

    pub fn tag(&self) -> ValueTag {
        match self {
            AtomicValue::String(_) => ValueTag::String,
            AtomicValue::UntypedAtomic(_) => ValueTag::UntypedAtomic,
            AtomicValue::AnyUri(_) => ValueTag::AnyUri,
            AtomicValue::Boolean(_) => ValueTag::Boolean,
            AtomicValue::Integer(kind, _) => kind.tag(),
            AtomicValue::Decimal(_) => ValueTag::Decimal,
            AtomicValue::Float(_) => ValueTag::Float,
            AtomicValue::Double(_) => ValueTag::Double,
            AtomicValue::QName(_) => ValueTag::QName,
            AtomicValue::DateTime { .. } => ValueTag::DateTime,
            AtomicValue::Date { .. } => ValueTag::Date,
            AtomicValue::Time { .. } => ValueTag::Time,
            AtomicValue::Duration { .. } => ValueTag::Duration,
            AtomicValue::YearMonthDuration(_) => ValueTag::YearMonthDuration,
            AtomicValue::DayTimeDuration(_) => ValueTag::DayTimeDuration,
            AtomicValue::Null => ValueTag::Null,
        }
    }

    pub fn decode(v: &TaggedValuePointable<'_>) -> Result<Self> {
        let tag = v.tag()?;
        Ok(match tag {
            ValueTag::String => AtomicValue::String(v.string()?.to_owned()),
            ValueTag::UntypedAtomic => AtomicValue::UntypedAtomic(v.string()?.to_owned()),
            ValueTag::AnyUri => AtomicValue::AnyUri(v.string()?.to_owned()),
            ValueTag::Boolean => AtomicValue::Boolean(v.boolean()?),
            ValueTag::Decimal => AtomicValue::Decimal(v.decimal()?),
            ValueTag::Float => AtomicValue::Float(v.float()?),
            ValueTag::Double => AtomicValue::Double(v.double()?),
            ValueTag::QName => AtomicValue::QName(v.qname()?),
            ValueTag::DateTime => {
                let (value, tz) = v.date_time()?;
                AtomicValue::DateTime { value, tz }
            }
            ValueTag::Date => {
                let (date, tz) = v.date()?;
                AtomicValue::Date { date, tz }
            }
            ValueTag::Time => {
                let (time, tz) = v.time()?;
                AtomicValue::Time { time, tz }
            }
            ValueTag::Duration => {
                let (months, millis) = v.duration()?;
                AtomicValue::Duration { months, millis }
            }
            ValueTag::YearMonthDuration => AtomicValue::YearMonthDuration(v.year_month_duration()?),
            ValueTag::DayTimeDuration => AtomicValue::DayTimeDuration(v.day_time_duration()?),
            ValueTag::Null => AtomicValue::Null,
            ValueTag::Integer
            | ValueTag::NonPositiveInteger
            | ValueTag::NegativeInteger
            | ValueTag::Long
            | ValueTag::Int
            | ValueTag::Short
            | ValueTag::Byte
            | ValueTag::NonNegativeInteger
            | ValueTag::UnsignedLong
            | ValueTag::UnsignedInt
            | ValueTag::UnsignedShort
            | ValueTag::UnsignedByte
            | ValueTag::PositiveInteger => {
                let kind = IntegerKind::from_tag(tag)
                    .ok_or_else(|| Error::type_mismatch("integer", tag))?;
                AtomicValue::Integer(kind, v.integer()?)
            }
            ValueTag::Sequence
            | ValueTag::Document
            | ValueTag::Element
            | ValueTag::Attribute
            | ValueTag::Text
            | ValueTag::Comment
            | ValueTag::ProcessingInstruction
            | ValueTag::NodeTree
            | ValueTag::Array
            | ValueTag::Object => return Err(Error::type_mismatch("atomic value", tag)),
        })
    }

    pub fn is_numeric(&self) -> bool {
        self.tag().is_numeric()
    }

    /// Canonical lexical form.
    pub fn string_value(&self) -> String {
        match self {
            AtomicValue::String(s) | AtomicValue::UntypedAtomic(s) | AtomicValue::AnyUri(s) => {
                s.clone()
            }
            AtomicValue::Boolean(b) => b.to_string(),
            AtomicValue::Integer(_, i) => i.to_string(),
            AtomicValue::Decimal(d) => d.to_string(),
            AtomicValue::Float(f) => format_double(f64::from(*f)),
            AtomicValue::Double(d) => format_double(*d),
            AtomicValue::QName(q) => q.to_string(),
            AtomicValue::DateTime { value, tz } => format!(
                "{}T{}{}",
                value.date().format("%Y-%m-%d"),
                format_time(value.time()),
                format_tz(*tz)
            ),
            AtomicValue::Date { date, tz } => format!("{}{}", date.format("%Y-%m-%d"), format_tz(*tz)),
            AtomicValue::Time { time, tz } => format!("{}{}", format_time(*time), format_tz(*tz)),
            AtomicValue::Duration { months, millis } => format_duration(*months, *millis, "PT0S"),
            AtomicValue::YearMonthDuration(m) => format_duration(*m, 0, "P0M"),
            AtomicValue::DayTimeDuration(ms) => format_duration(0, *ms, "PT0S"),
            AtomicValue::Null => "null".to_owned(),
        }
    }
}

impl fmt::Display for AtomicValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.string_value())
    }
}

pub(crate) fn format_double(v: f64) -> String {
    if v.is_nan() {
        return "NaN".to_owned();
    }
    if v.is_infinite() {
        return if v > 0.0 { "INF" } else { "-INF" }.to_owned();
    }
    if v == 0.0 {
        return if v.is_sign_negative() { "-0" } else { "0" }.to_owned();
    }
    if (1e-6..1e6).contains(&v.abs()) {
        return format!("{v}");
    }
    let s = format!("{v:E}");
    match s.split_once('E') {
        Some((mantissa, exp)) if !mantissa.contains('.') => format!("{mantissa}.0E{exp}"),
        _ => s,
    }
}

fn format_time(t: NaiveTime) -> String {
    let millis = t.nanosecond() / 1_000_000;
    let base = t.format("%H:%M:%S").to_string();
    if millis == 0 {
        base
    } else {
        let frac = format!("{millis:03}");
        format!("{base}.{}", frac.trim_end_matches('0'))
    }
}

fn format_tz(tz: Option<FixedOffset>) -> String {
    match tz {
        None => String::new(),
        Some(off) if off.local_minus_utc() == 0 => "Z".to_owned(),
        Some(off) => {
            let secs = off.local_minus_utc();
            let sign = if secs < 0 { '-' } else { '+' };
            let mins = secs.abs() / 60;
            format!("{sign}{:02}:{:02}", mins / 60, mins % 60)
        }
    }
}

fn format_duration(months: i32, millis: i64, zero: &str) -> String {
    if months == 0 && millis == 0 {
        return zero.to_owned();
    }
    let negative = months < 0 || millis < 0;
    let months = months.unsigned_abs();
    let millis = millis.unsigned_abs();
    let mut out = String::from(if negative { "-P" } else { "P" });
    let (years, months) = (months / 12, months % 12);
    if years > 0 {
        out.push_str(&format!("{years}Y"));
    }
    if months > 0 {
        out.push_str(&format!("{months}M"));
    }
    let days = millis / 86_400_000;
    let rest = millis % 86_400_000;
    if days > 0 {
        out.push_str(&format!("{days}D"));
    }
    if rest > 0 {
        out.push('T');
        let (hours, minutes) = (rest / 3_600_000, rest / 60_000 % 60);
        let (seconds, frac) = (rest / 1000 % 60, rest % 1000);
        if hours > 0 {
            out.push_str(&format!("{hours}H"));
        }
        if minutes > 0 {
            out.push_str(&format!("{minutes}M"));
        }
        if seconds > 0 || frac > 0 {
            if frac > 0 {
                let f = format!("{frac:03}");
                out.push_str(&format!("{seconds}.{}S", f.trim_end_matches('0')));
            } else {
                out.push_str(&format!("{seconds}S"));
            }
        }
    }
    out
}

fn read_tz(bytes: &[u8], at: usize) -> Result<Option<FixedOffset>> {
    let hours = codec::read_i8(bytes, at)?;
    let minutes = codec::read_i8(bytes, at + 1)?;
    if hours == NO_TIMEZONE {
        return Ok(None);
    }
    let secs = (i32::from(hours) * 60 + i32::from(minutes)) * 60;
    FixedOffset::east_opt(secs)
        .map(Some)
        .ok_or_else(|| Error::system(format!("timezone offset {hours}:{minutes} out of range")))
}

fn make_time(hour: u8, minute: u8, millis: i32) -> Result<NaiveTime> {
    let millis = u32::try_from(millis).map_err(|_| Error::system("negative millisecond field"))?;
    NaiveTime::from_hms_milli_opt(u32::from(hour), u32::from(minute), millis / 1000, millis % 1000)
        .ok_or_else(|| Error::system(format!("invalid time {hour}:{minute}+{millis}ms")))
}

fn make_date(year: i16, month: u8, day: u8) -> Result<NaiveDate> {
    NaiveDate::from_ymd_opt(i32::from(year), u32::from(month), u32::from(day))
        .ok_or_else(|| Error::system(format!("invalid date {year}-{month}-{day}")))
}

/// Millisecond-of-minute field of the date/time encodings.
pub(crate) fn millis_of_minute(t: &NaiveTime) -> i32 {
    // at most 60_999 with a leap second
    i32::try_from(t.second() * 1000 + t.nanosecond() / 1_000_000).unwrap_or(i32::MAX)
}

pub(crate) fn date_fields(d: &NaiveDate) -> Result<(i16, u8, u8)> {
    let year = i16::try_from(d.year())
        .map_err(|_| Error::new(ErrorCode::FORG0001, format!("year {} not encodable", d.year())))?;
    // month and day always fit in a byte
    Ok((year, d.month() as u8, d.day() as u8))
}

/// Typed accessors. Each checks the tag before reading.
impl<'a> TaggedValuePointable<'a> {
    fn body_of(&self, tag: ValueTag) -> Result<usize> {
        self.expect_tag(tag)?;
        Ok(self.body_start())
    }

    pub fn boolean(&self) -> Result<bool> {
        Ok(codec::read_u8(self.backing(), self.body_of(ValueTag::Boolean)?)? != 0)
    }

    /// Any integer-family tag, widened to `i64`.
    pub fn integer(&self) -> Result<i64> {
        let tag = self.tag()?;
        let at = self.body_start();
        let b = self.backing();
        match tag.integer_width() {
            Some(8) => codec::read_i64(b, at),
            Some(4) => codec::read_i32(b, at).map(i64::from),
            Some(2) => codec::read_i16(b, at).map(i64::from),
            Some(1) => codec::read_i8(b, at).map(i64::from),
            _ => Err(Error::type_mismatch("integer", tag)),
        }
    }

    pub fn double(&self) -> Result<f64> {
        codec::read_f64(self.backing(), self.body_of(ValueTag::Double)?)
    }

    pub fn float(&self) -> Result<f32> {
        codec::read_f32(self.backing(), self.body_of(ValueTag::Float)?)
    }

    pub fn decimal(&self) -> Result<Decimal> {
        let at = self.body_of(ValueTag::Decimal)?;
        let scale = codec::read_u8(self.backing(), at)?;
        Decimal::new(codec::read_i64(self.backing(), at + 1)?, scale)
    }

    /// Body of `String`, `UntypedAtomic` or `AnyUri`.
    pub fn string(&self) -> Result<&'a str> {
        let tag = self.tag()?;
        if !tag.is_string_like() {
            return Err(Error::type_mismatch("string", tag));
        }
        codec::read_str(self.backing(), self.body_start()).map(|(s, _)| s)
    }

    pub fn qname(&self) -> Result<QName> {
        let mut at = self.body_of(ValueTag::QName)?;
        let b = self.backing();
        let (prefix, n) = codec::read_str(b, at)?;
        at += n;
        let (uri, n) = codec::read_str(b, at)?;
        at += n;
        let (local, _) = codec::read_str(b, at)?;
        Ok(QName::new(prefix, uri, local))
    }

    pub fn date_time(&self) -> Result<(NaiveDateTime, Option<FixedOffset>)> {
        let at = self.body_of(ValueTag::DateTime)?;
        let b = self.backing();
        let date = make_date(
            codec::read_i16(b, at)?,
            codec::read_u8(b, at + 2)?,
            codec::read_u8(b, at + 3)?,
        )?;
        let time = make_time(
            codec::read_u8(b, at + 4)?,
            codec::read_u8(b, at + 5)?,
            codec::read_i32(b, at + 6)?,
        )?;
        Ok((NaiveDateTime::new(date, time), read_tz(b, at + 10)?))
    }

    pub fn date(&self) -> Result<(NaiveDate, Option<FixedOffset>)> {
        let at = self.body_of(ValueTag::Date)?;
        let b = self.backing();
        let date = make_date(
            codec::read_i16(b, at)?,
            codec::read_u8(b, at + 2)?,
            codec::read_u8(b, at + 3)?,
        )?;
        Ok((date, read_tz(b, at + 4)?))
    }

    pub fn time(&self) -> Result<(NaiveTime, Option<FixedOffset>)> {
        let at = self.body_of(ValueTag::Time)?;
        let b = self.backing();
        let time = make_time(
            codec::read_u8(b, at)?,
            codec::read_u8(b, at + 1)?,
            codec::read_i32(b, at + 2)?,
        )?;
        Ok((time, read_tz(b, at + 6)?))
    }

    pub fn duration(&self) -> Result<(i32, i64)> {
        let at = self.body_of(ValueTag::Duration)?;
        Ok((
            codec::read_i32(self.backing(), at)?,
            codec::read_i64(self.backing(), at + 4)?,
        ))
    }

    pub fn year_month_duration(&self) -> Result<i32> {
        codec::read_i32(self.backing(), self.body_of(ValueTag::YearMonthDuration)?)
    }

    pub fn day_time_duration(&self) -> Result<i64> {
        codec::read_i64(self.backing(), self.body_of(ValueTag::DayTimeDuration)?)
    }
}
