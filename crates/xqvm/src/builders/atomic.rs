use crate::consts::NO_TIMEZONE;
use crate::datamodel::atomic::{date_fields, millis_of_minute};
use crate::datamodel::codec::checked_str_len;
use crate::datamodel::{AtomicValue, Decimal, IntegerKind, TaggedValue, ValueStorage, ValueTag};
use crate::error::{Error, Result};
use crate::names::QName;
use chrono::{FixedOffset, NaiveDate, NaiveDateTime, NaiveTime, Timelike};

/// Writes `len:u16` + UTF-8. Longer strings are a system error.
pub(crate) fn put_str(out: &mut ValueStorage, s: &str) -> Result<()> {
    out.put_u16(checked_str_len(s)?);
    out.put_slice(s.as_bytes());
    Ok(())
}

fn put_tz(out: &mut ValueStorage, tz: Option<FixedOffset>) -> Result<()> {
    match tz {
        None => {
            out.put_i8(NO_TIMEZONE);
            out.put_i8(NO_TIMEZONE);
        }
        Some(off) => {
            let minutes = off.local_minus_utc() / 60;
            let hours = i8::try_from(minutes / 60)
                .map_err(|_| Error::system("timezone hours out of range"))?;
            let mins = i8::try_from(minutes % 60)
                .map_err(|_| Error::system("timezone minutes out of range"))?;
            out.put_i8(hours);
            out.put_i8(mins);
        }
    }
    Ok(())
}

fn put_time_fields(out: &mut ValueStorage, t: &NaiveTime) {
    // hour and minute always fit in a byte
    out.put_u8(t.hour() as u8);
    out.put_u8(t.minute() as u8);
    out.put_i32(millis_of_minute(t));
}

pub fn write_string_like(out: &mut ValueStorage, tag: ValueTag, s: &str) -> Result<()> {
    if !tag.is_string_like() {
        return Err(Error::type_mismatch("string-like tag", tag));
    }
    let len = checked_str_len(s)?;
    out.put_u8(tag.code());
    out.put_u16(len);
    out.put_slice(s.as_bytes());
    Ok(())
}

pub fn write_boolean(out: &mut ValueStorage, b: bool) {
    out.put_u8(ValueTag::Boolean.code());
    out.put_u8(u8::from(b));
}

/// Writes `v` at the width of `kind` after a range check.
pub fn write_integer(out: &mut ValueStorage, kind: IntegerKind, v: i64) -> Result<()> {
    let v = kind.check(v)?;
    let tag = kind.tag();
    out.put_u8(tag.code());
    // the range check above guarantees each narrowing fits
    match tag.integer_width() {
        Some(1) => out.put_i8(v as i8),
        Some(2) => out.put_i16(v as i16),
        Some(4) => out.put_i32(v as i32),
        _ => out.put_i64(v),
    }
    Ok(())
}

pub fn write_decimal(out: &mut ValueStorage, d: Decimal) {
    out.put_u8(ValueTag::Decimal.code());
    out.put_u8(d.scale());
    out.put_i64(d.unscaled());
}

pub fn write_double(out: &mut ValueStorage, v: f64) {
    out.put_u8(ValueTag::Double.code());
    out.put_f64(v);
}

pub fn write_float(out: &mut ValueStorage, v: f32) {
    out.put_u8(ValueTag::Float.code());
    out.put_f32(v);
}

pub fn write_qname(out: &mut ValueStorage, q: &QName) -> Result<()> {
    out.put_u8(ValueTag::QName.code());
    put_str(out, &q.prefix)?;
    put_str(out, &q.uri)?;
    put_str(out, &q.local)
}

pub fn write_date_time(
    out: &mut ValueStorage,
    value: &NaiveDateTime,
    tz: Option<FixedOffset>,
) -> Result<()> {
    let (year, month, day) = date_fields(&value.date())?;
    out.put_u8(ValueTag::DateTime.code());
    out.put_i16(year);
    out.put_u8(month);
    out.put_u8(day);
    put_time_fields(out, &value.time());
    put_tz(out, tz)
}

pub fn write_date(out: &mut ValueStorage, date: &NaiveDate, tz: Option<FixedOffset>) -> Result<()> {
    let (year, month, day) = date_fields(date)?;
    out.put_u8(ValueTag::Date.code());
    out.put_i16(year);
    out.put_u8(month);
    out.put_u8(day);
    put_tz(out, tz)
}

pub fn write_time(out: &mut ValueStorage, time: &NaiveTime, tz: Option<FixedOffset>) -> Result<()> {
    out.put_u8(ValueTag::Time.code());
    put_time_fields(out, time);
    put_tz(out, tz)
}

pub fn write_duration(out: &mut ValueStorage, months: i32, millis: i64) {
    out.put_u8(ValueTag::Duration.code());
    out.put_i32(months);
    out.put_i64(millis);
}

pub fn write_year_month_duration(out: &mut ValueStorage, months: i32) {
    out.put_u8(ValueTag::YearMonthDuration.code());
    out.put_i32(months);
}

pub fn write_day_time_duration(out: &mut ValueStorage, millis: i64) {
    out.put_u8(ValueTag::DayTimeDuration.code());
    out.put_i64(millis);
}

pub fn write_null(out: &mut ValueStorage) {
    out.put_u8(ValueTag::Null.code());
}

/// Writes any atomic value.
pub fn write_atomic(out: &mut ValueStorage, value: &AtomicValue) -> Result<()> {
    match value {
        AtomicValue::String(s) => write_string_like(out, ValueTag::String, s),
        AtomicValue::UntypedAtomic(s) => write_string_like(out, ValueTag::UntypedAtomic, s),
        AtomicValue::AnyUri(s) => write_string_like(out, ValueTag::AnyUri, s),
        AtomicValue::Boolean(b) => {
            write_boolean(out, *b);
            Ok(())
        }
        AtomicValue::Integer(kind, v) => write_integer(out, *kind, *v),
        AtomicValue::Decimal(d) => {
            write_decimal(out, *d);
            Ok(())
        }
        AtomicValue::Float(f) => {
            write_float(out, *f);
            Ok(())
        }
        AtomicValue::Double(d) => {
            write_double(out, *d);
            Ok(())
        }
        AtomicValue::QName(q) => write_qname(out, q),
        AtomicValue::DateTime { value, tz } => write_date_time(out, value, *tz),
        AtomicValue::Date { date, tz } => write_date(out, date, *tz),
        AtomicValue::Time { time, tz } => write_time(out, time, *tz),
        AtomicValue::Duration { months, millis } => {
            write_duration(out, *months, *millis);
            Ok(())
        }
        AtomicValue::YearMonthDuration(m) => {
            write_year_month_duration(out, *m);
            Ok(())
        }
        AtomicValue::DayTimeDuration(ms) => {
            write_day_time_duration(out, *ms);
            Ok(())
        }
        AtomicValue::Null => {
            write_null(out);
            Ok(())
        }
    }
}

/// Produces frozen atomic values. Stateless, so one instance is shared
/// read-only through the dynamic context.
#[derive(Debug, Clone, Copy, Default)]
pub struct AtomicValueFactory;

impl AtomicValueFactory {
    pub fn new() -> Self {
        Self
    }

    fn frozen(capacity: usize, write: impl FnOnce(&mut ValueStorage) -> Result<()>) -> Result<TaggedValue> {
        let mut out = ValueStorage::with_capacity(capacity);
        write(&mut out)?;
        out.freeze()
    }

    pub fn create(&self, value: &AtomicValue) -> Result<TaggedValue> {
        Self::frozen(16, |out| write_atomic(out, value))
    }

    pub fn boolean(&self, b: bool) -> TaggedValue {
        TaggedValue::boolean(b)
    }

    pub fn integer(&self, v: i64) -> Result<TaggedValue> {
        Self::frozen(9, |out| write_integer(out, IntegerKind::Integer, v))
    }

    pub fn double(&self, v: f64) -> Result<TaggedValue> {
        Self::frozen(9, |out| {
            write_double(out, v);
            Ok(())
        })
    }

    pub fn decimal(&self, d: Decimal) -> Result<TaggedValue> {
        Self::frozen(10, |out| {
            write_decimal(out, d);
            Ok(())
        })
    }

    pub fn string(&self, s: &str) -> Result<TaggedValue> {
        Self::frozen(3 + s.len(), |out| write_string_like(out, ValueTag::String, s))
    }

    pub fn untyped(&self, s: &str) -> Result<TaggedValue> {
        Self::frozen(3 + s.len(), |out| write_string_like(out, ValueTag::UntypedAtomic, s))
    }

    pub fn qname(&self, q: &QName) -> Result<TaggedValue> {
        Self::frozen(16, |out| write_qname(out, q))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorCode;
    use rstest::rstest;

    #[rstest]
    fn string_limit_is_system_error() {
        let long = "x".repeat(usize::from(u16::MAX) + 1);
        let err = AtomicValueFactory.string(&long).unwrap_err();
        assert_eq!(err.code, ErrorCode::SYSE0001);
        assert!(AtomicValueFactory.string(&long[1..]).is_ok());
    }

    #[rstest]
    #[case(IntegerKind::Byte, -5, &[31, 0xfb])]
    #[case(IntegerKind::UnsignedShort, 65_535, &[35, 0, 0, 0xff, 0xff])]
    #[case(IntegerKind::Integer, 1, &[25, 0, 0, 0, 0, 0, 0, 0, 1])]
    fn integer_widths_on_the_wire(#[case] kind: IntegerKind, #[case] v: i64, #[case] bytes: &[u8]) {
        let mut out = ValueStorage::new();
        write_integer(&mut out, kind, v).unwrap();
        assert_eq!(out.as_slice(), bytes);
    }

    #[rstest]
    fn missing_timezone_marker() {
        let mut out = ValueStorage::new();
        let date = NaiveDate::from_ymd_opt(2020, 1, 2).unwrap();
        write_date(&mut out, &date, None).unwrap();
        assert_eq!(out.as_slice(), &[16, 0x07, 0xe4, 1, 2, 127, 127]);
    }
}
