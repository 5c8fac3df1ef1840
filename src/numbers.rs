//! Canonical byte form for numbers.
//!
//! `3`, `3.0` and `30e-1` are the same number with different text. Pattern
//! numbers are compiled under both their text and a fixed-width canonical
//! form, and numeric event values are looked up under both, so equal numbers
//! match whatever their spelling.
//!
//! The canonical form is `#` followed by `(n + 1e9) * 1e6` zero-padded to
//! 16 digits. The `#` keeps it apart from any literal value text. Only
//! numbers the form holds exactly get one: at most 6 decimal places once
//! trailing zeros are dropped, so two different numbers never share a form.

use crate::QuaminaError;

/// Largest magnitude with a canonical form.
pub const MAX_MAGNITUDE: u64 = 1_000_000_000;

/// Decimal places kept in the canonical form.
pub const FRACTION_DIGITS: i32 = 6;

/// Mantissa digits allowed.
pub const MAX_DIGITS: usize = 18;

pub const CANONICAL_MARKER: u8 = b'#';

const CANONICAL_WIDTH: usize = 16;

/// `MAX_MAGNITUDE` scaled by `10^FRACTION_DIGITS`.
const OFFSET: u128 = 1_000_000_000_000_000;

/// A JSON number split into sign, mantissa digits and a power of ten.
struct Decimal {
    negative: bool,
    digits: String,
    exponent: i64,
}

fn split_decimal(s: &str) -> Option<Decimal> {
    let (negative, rest) = match s.strip_prefix('-') {
        Some(rest) => (true, rest),
        None => (false, s),
    };
    let (mantissa, exp) = match rest.find(['e', 'E']) {
        Some(at) => (&rest[..at], Some(&rest[at + 1..])),
        None => (rest, None),
    };
    let (int_part, frac_part) = match mantissa.split_once('.') {
        Some((int_part, frac_part)) => (int_part, frac_part),
        None => (mantissa, ""),
    };
    let all_digits = |part: &str| part.bytes().all(|b| b.is_ascii_digit());
    if int_part.is_empty() || !all_digits(int_part) || !all_digits(frac_part) {
        return None;
    }
    if mantissa.contains('.') && frac_part.is_empty() {
        return None;
    }

    let mut exponent = match exp {
        None => 0,
        Some(exp) => {
            let unsigned = exp.strip_prefix(['+', '-']).unwrap_or(exp);
            if unsigned.is_empty() || !all_digits(unsigned) {
                return None;
            }
            // anything this long is far out of range either way
            let clamped = if unsigned.len() > 6 { "999999" } else { unsigned };
            let value: i64 = clamped.parse().ok()?;
            if exp.starts_with('-') {
                -value
            } else {
                value
            }
        }
    };
    exponent -= frac_part.len() as i64;

    Some(Decimal {
        negative,
        digits: format!("{int_part}{frac_part}"),
        exponent,
    })
}

/// Canonical bytes for a number's text.
///
/// Fails with `InvalidNumber` when the text isn't a number, lies outside
/// the representable range or has more decimal places than the form keeps.
pub fn canonicalize(text: &[u8]) -> Result<Vec<u8>, QuaminaError> {
    let s = std::str::from_utf8(text).map_err(|_| QuaminaError::InvalidUtf8)?;
    let invalid = |reason: &str| QuaminaError::InvalidNumber {
        value: s.to_string(),
        reason: reason.to_string(),
    };

    let decimal = split_decimal(s).ok_or_else(|| invalid("not a number"))?;
    if decimal.digits.len() > MAX_DIGITS {
        return Err(invalid("more than 18 digits"));
    }
    let mantissa: u128 = decimal
        .digits
        .parse()
        .map_err(|_| invalid("not a number"))?;

    let shift = decimal.exponent + FRACTION_DIGITS as i64;
    let scaled = if mantissa == 0 {
        0
    } else if shift >= 0 {
        // mantissa >= 1, so a shift past 16 digits overshoots the range
        if shift > CANONICAL_WIDTH as i64 {
            return Err(invalid("magnitude exceeds 1e9"));
        }
        mantissa * 10u128.pow(shift as u32)
    } else {
        let divisor = match u32::try_from(-shift) {
            Ok(places) if places <= MAX_DIGITS as u32 => 10u128.pow(places),
            _ => return Err(invalid("more than 6 decimal places")),
        };
        if mantissa % divisor != 0 {
            return Err(invalid("more than 6 decimal places"));
        }
        mantissa / divisor
    };
    if scaled > OFFSET {
        return Err(invalid("magnitude exceeds 1e9"));
    }

    let shifted = if decimal.negative {
        OFFSET - scaled
    } else {
        OFFSET + scaled
    };
    let mut out = Vec::with_capacity(CANONICAL_WIDTH + 1);
    out.push(CANONICAL_MARKER);
    out.extend_from_slice(format!("{shifted:0width$}", width = CANONICAL_WIDTH).as_bytes());
    Ok(out)
}

/// Canonical bytes for an event value, or `None` when it has none.
pub fn canonical_or_none(text: &[u8]) -> Option<Vec<u8>> {
    canonicalize(text).ok()
}

/// Whether a value could be a JSON number. Strings start with a quote and
/// literals with a letter, so the first byte decides.
#[inline]
pub fn looks_numeric(val: &[u8]) -> bool {
    matches!(val.first(), Some(b'-' | b'0'..=b'9'))
}
