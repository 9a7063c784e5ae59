use crate::consts::MAX_DECIMAL_SCALE;
use crate::error::{Error, Result};
use core::cmp::Ordering;
use core::fmt;

const POW10: [i128; 37] = {
    let mut table = [1i128; 37];
    let mut i = 1;
    while i < 37 {
        table[i] = table[i - 1] * 10;
        i += 1;
    }
    table
};

/// Fixed-point decimal: `unscaled / 10^scale`.
#[derive(Debug, Clone, Copy)]
pub struct Decimal {
    unscaled: i64,
    scale: u8,
}

impl Decimal {
    pub const ZERO: Decimal = Decimal {
        unscaled: 0,
        scale: 0,
    };

    pub fn new(unscaled: i64, scale: u8) -> Result<Self> {
        if scale > MAX_DECIMAL_SCALE {
            return Err(Error::system(format!("decimal scale {scale} exceeds {MAX_DECIMAL_SCALE}")));
        }
        Ok(Self { unscaled, scale })
    }

    pub const fn from_i64(v: i64) -> Self {
        Self {
            unscaled: v,
            scale: 0,
        }
    }

    pub const fn unscaled(self) -> i64 {
        self.unscaled
    }

    pub const fn scale(self) -> u8 {
        self.scale
    }

    pub const fn is_zero(self) -> bool {
        self.unscaled == 0
    }

    /// Strips trailing fractional zeros.
    #[must_use]
    pub fn normalized(self) -> Self {
        let mut d = self;
        while d.scale > 0 && d.unscaled % 10 == 0 {
            d.unscaled /= 10;
            d.scale -= 1;
        }
        d
    }

    fn from_i128(mut unscaled: i128, mut scale: u8) -> Option<Self> {
        while scale > MAX_DECIMAL_SCALE || (scale > 0 && unscaled % 10 == 0) {
            unscaled /= 10;
            scale -= 1;
        }
        Some(Self {
            unscaled: i64::try_from(unscaled).ok()?,
            scale,
        })
    }

    fn aligned(self, other: Self) -> (i128, i128, u8) {
        let scale = self.scale.max(other.scale);
        let a = i128::from(self.unscaled) * POW10[usize::from(scale - self.scale)];
        let b = i128::from(other.unscaled) * POW10[usize::from(scale - other.scale)];
        (a, b, scale)
    }

    pub fn checked_add(self, other: Self) -> Option<Self> {
        let (a, b, scale) = self.aligned(other);
        Self::from_i128(a.checked_add(b)?, scale)
    }

    pub fn checked_sub(self, other: Self) -> Option<Self> {
        let (a, b, scale) = self.aligned(other);
        Self::from_i128(a.checked_sub(b)?, scale)
    }

    pub fn checked_mul(self, other: Self) -> Option<Self> {
        let product = i128::from(self.unscaled).checked_mul(i128::from(other.unscaled))?;
        Self::from_i128(product, self.scale + other.scale)
    }

    /// Truncating division with up to 18 fractional digits. `None` on a zero
    /// divisor or when the quotient does not fit.
    pub fn checked_div(self, other: Self) -> Option<Self> {
        if other.is_zero() {
            return None;
        }
        let den = i128::from(other.unscaled) * POW10[usize::from(self.scale)];
        for scale in (0..=MAX_DECIMAL_SCALE).rev() {
            let shift = usize::from(other.scale + scale);
            let Some(num) = i128::from(self.unscaled).checked_mul(POW10[shift]) else {
                continue;
            };
            if let Some(d) = Self::from_i128(num / den, scale) {
                return Some(d);
            }
        }
        None
    }

    /// Integer part, truncated toward zero.
    pub fn trunc(self) -> i64 {
        let div = POW10[usize::from(self.scale)];
        // |unscaled| / 10^scale always fits back into i64
        i64::try_from(i128::from(self.unscaled) / div).unwrap_or(0)
    }

    #[allow(clippy::cast_precision_loss)]
    pub fn to_f64(self) -> f64 {
        self.unscaled as f64 / 10f64.powi(i32::from(self.scale))
    }

    pub fn from_f64(v: f64) -> Option<Self> {
        if !v.is_finite() {
            return None;
        }
        Self::parse(&format!("{v}"))
    }

    /// Parses `[+-]digits[.digits]`.
    pub fn parse(s: &str) -> Option<Self> {
        let s = s.trim();
        let (negative, digits) = match s.as_bytes().first()? {
            b'-' => (true, &s[1..]),
            b'+' => (false, &s[1..]),
            _ => (false, s),
        };
        let (int_part, frac_part) = digits.split_once('.').unwrap_or((digits, ""));
        if int_part.is_empty() && frac_part.is_empty() {
            return None;
        }
        let mut unscaled: i128 = 0;
        for b in int_part.bytes().chain(frac_part.bytes()) {
            if !b.is_ascii_digit() {
                return None;
            }
            unscaled = unscaled.checked_mul(10)?.checked_add(i128::from(b - b'0'))?;
        }
        let mut scale = u8::try_from(frac_part.len()).ok()?;
        while scale > MAX_DECIMAL_SCALE {
            unscaled /= 10;
            scale -= 1;
        }
        Self::from_i128(if negative { -unscaled } else { unscaled }, scale)
    }
}

impl PartialEq for Decimal {
    fn eq(&self, other: &Self) -> bool {
        self.cmp(other) == Ordering::Equal
    }
}

impl Eq for Decimal {}

impl PartialOrd for Decimal {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for Decimal {
    fn cmp(&self, other: &Self) -> Ordering {
        let (a, b, _) = self.aligned(*other);
        a.cmp(&b)
    }
}

impl fmt::Display for Decimal {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let d = self.normalized();
        if d.scale == 0 {
            return write!(f, "{}", d.unscaled);
        }
        let digits = d.unscaled.unsigned_abs().to_string();
        let scale = usize::from(d.scale);
        let sign = if d.unscaled < 0 { "-" } else { "" };
        if digits.len() > scale {
            let (int, frac) = digits.split_at(digits.len() - scale);
            write!(f, "{sign}{int}.{frac}")
        } else {
            write!(f, "{sign}0.{}{digits}", "0".repeat(scale - digits.len()))
        }
    }
}

impl From<i64> for Decimal {
    fn from(v: i64) -> Self {
        Self::from_i64(v)
    }
}
