use std::borrow::Cow;

use anyhow::Result;

use crate::error::err_type;

use super::Value;

/// Parse a number at the start of `s`: decimal, `0x` hex, `0b` binary or octal
/// with a leading zero, optionally preceded by `-`. Returns the value and the
/// number of bytes consumed (0 when `s` does not start with a number).
pub fn str2nr(s: &(impl AsRef<[u8]> + ?Sized)) -> (i64, usize) {
    let bytes = s.as_ref();
    let mut i = 0;
    let negative = bytes.first() == Some(&b'-');
    if negative {
        i += 1;
    }
    if !bytes.get(i).is_some_and(u8::is_ascii_digit) {
        return (0, 0);
    }

    let (radix, start) = match (bytes[i], bytes.get(i + 1).copied()) {
        (b'0', Some(b'x' | b'X')) if bytes.get(i + 2).is_some_and(u8::is_ascii_hexdigit) => (16, i + 2),
        (b'0', Some(b'b' | b'B')) if bytes.get(i + 2).is_some_and(|b| matches!(b, b'0' | b'1')) => (2, i + 2),
        (b'0', Some(d)) if d.is_ascii_digit() => {
            // Octal only when every following digit is an octal digit.
            let run = bytes[i..].iter().take_while(|b| b.is_ascii_digit()).count();
            if bytes[i..i + run].iter().all(|b| (b'0'..=b'7').contains(b)) {
                (8, i + 1)
            } else {
                (10, i)
            }
        }
        _ => (10, i),
    };

    let mut end = start;
    let mut value: u64 = 0;
    while let Some(&b) = bytes.get(end) {
        let digit = match (b as char).to_digit(radix) {
            Some(d) => d as u64,
            None => break,
        };
        value = value.saturating_mul(radix as u64).saturating_add(digit);
        end += 1;
    }

    let n = if negative {
        if value > i64::MAX as u64 { i64::MIN } else { -(value as i64) }
    } else {
        value.min(i64::MAX as u64) as i64
    };
    (n, end)
}

impl Value {
    /// Numeric value; Strings convert from their leading number.
    pub fn to_number(&self) -> Result<i64> {
        match self {
            Value::Number(n) => Ok(*n),
            Value::String(s) => Ok(str2nr(s).0),
            Value::List(_) => err_type("Using a List as a Number"),
            Value::Dict(_) => err_type("Using a Dictionary as a Number"),
            Value::Funcref(_) => err_type("Using a Funcref as a Number"),
        }
    }

    /// String value as text; Numbers convert to decimal. Bytes that are not
    /// UTF-8 read as U+FFFD.
    pub fn to_str(&self) -> Result<Cow<'_, str>> {
        match self {
            Value::Number(n) => {
                let mut buf = itoa::Buffer::new();
                Ok(Cow::Owned(buf.format(*n).to_string()))
            }
            Value::String(s) => Ok(String::from_utf8_lossy(s)),
            Value::List(_) => err_type("Using a List as a String"),
            Value::Dict(_) => err_type("Using a Dictionary as a String"),
            Value::Funcref(_) => err_type("Using a Funcref as a String"),
        }
    }

    /// String value as the bytes it holds.
    pub fn to_bytes(&self) -> Result<Cow<'_, [u8]>> {
        match self {
            Value::String(s) => Ok(Cow::Borrowed(s.as_slice())),
            _ => Ok(match self.to_str()? {
                Cow::Borrowed(s) => Cow::Borrowed(s.as_bytes()),
                Cow::Owned(s) => Cow::Owned(s.into_bytes()),
            }),
        }
    }

    #[inline]
    pub fn is_truthy(&self) -> Result<bool> {
        Ok(self.to_number()? != 0)
    }
}
