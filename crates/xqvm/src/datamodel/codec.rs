//! Bounds-checked big-endian reads used by every typed view.
use crate::consts::MAX_STRING_LEN;
use crate::error::{Error, Result};

fn array<const N: usize>(bytes: &[u8], at: usize) -> Result<[u8; N]> {
    at.checked_add(N)
        .and_then(|end| bytes.get(at..end))
        .and_then(|s| <[u8; N]>::try_from(s).ok())
        .ok_or_else(|| Error::truncated(at, N))
}

pub(crate) fn read_u8(bytes: &[u8], at: usize) -> Result<u8> {
    bytes.get(at).copied().ok_or_else(|| Error::truncated(at, 1))
}

pub(crate) fn read_i8(bytes: &[u8], at: usize) -> Result<i8> {
    Ok(i8::from_be_bytes(array(bytes, at)?))
}

pub(crate) fn read_i16(bytes: &[u8], at: usize) -> Result<i16> {
    Ok(i16::from_be_bytes(array(bytes, at)?))
}

pub(crate) fn read_u16(bytes: &[u8], at: usize) -> Result<u16> {
    Ok(u16::from_be_bytes(array(bytes, at)?))
}

pub(crate) fn read_i32(bytes: &[u8], at: usize) -> Result<i32> {
    Ok(i32::from_be_bytes(array(bytes, at)?))
}

pub(crate) fn read_i64(bytes: &[u8], at: usize) -> Result<i64> {
    Ok(i64::from_be_bytes(array(bytes, at)?))
}

pub(crate) fn read_f32(bytes: &[u8], at: usize) -> Result<f32> {
    Ok(f32::from_be_bytes(array(bytes, at)?))
}

pub(crate) fn read_f64(bytes: &[u8], at: usize) -> Result<f64> {
    Ok(f64::from_be_bytes(array(bytes, at)?))
}

/// Reads a non-negative `i32` count or offset as `usize`.
pub(crate) fn read_len(bytes: &[u8], at: usize) -> Result<usize> {
    let v = read_i32(bytes, at)?;
    usize::try_from(v).map_err(|_| Error::system(format!("negative length {v} at offset {at}")))
}

/// Reads a `len:u16` prefixed UTF-8 string, returning it and its encoded size.
pub(crate) fn read_str(bytes: &[u8], at: usize) -> Result<(&str, usize)> {
    let len = usize::from(read_u16(bytes, at)?);
    let start = at + 2;
    let raw = bytes
        .get(start..start + len)
        .ok_or_else(|| Error::truncated(start, len))?;
    Ok((std::str::from_utf8(raw)?, 2 + len))
}

pub(crate) fn encoded_str_len(bytes: &[u8], at: usize) -> Result<usize> {
    Ok(2 + usize::from(read_u16(bytes, at)?))
}

/// Length check shared by every string writer.
pub(crate) fn checked_str_len(s: &str) -> Result<u16> {
    if s.len() > MAX_STRING_LEN {
        return Err(Error::system(format!(
            "string of {} bytes exceeds the encodable maximum of {MAX_STRING_LEN}",
            s.len()
        )));
    }
    u16::try_from(s.len()).map_err(|_| Error::system("string length overflow"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorCode;
    use rstest::rstest;

    #[rstest]
    fn reads_are_big_endian() {
        let bytes = [0x00, 0x00, 0x01, 0x02, 0xff];
        assert_eq!(read_i32(&bytes, 0).unwrap(), 0x0102);
        assert_eq!(read_u16(&bytes, 2).unwrap(), 0x0102);
        assert_eq!(read_i8(&bytes, 4).unwrap(), -1);
    }

    #[rstest]
    fn out_of_bounds_is_system_error() {
        let err = read_i64(&[1, 2, 3], 0).unwrap_err();
        assert_eq!(err.code, ErrorCode::SYSE0001);
        assert!(read_u8(&[], usize::MAX).is_err());
        assert!(read_i32(&[0; 8], usize::MAX - 1).is_err());
    }

    #[rstest]
    fn strings_are_length_prefixed() {
        let bytes = [0, 3, b'a', b'b', b'c', 9];
        let (s, n) = read_str(&bytes, 0).unwrap();
        assert_eq!((s, n), ("abc", 5));
        assert!(read_str(&[0, 9, b'a'], 0).is_err());
    }
}
