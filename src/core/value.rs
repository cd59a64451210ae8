//! Purpose: Owned scalar values exchanged through `get_value`/`get_values` and in-memory sources.
//! Exports: `Value`, `Decimal`.
//! Role: The kind-tagged variant behind every generic accessor and every coercion.
//! Invariants: `Value::Null` is the only null sentinel; every other variant has exactly one kind.
//! Invariants: Coercions are lossless widenings; anything else is `InvalidCast`.
use std::borrow::Cow;
use std::fmt;
use std::str::FromStr;

use time::{Duration, OffsetDateTime};
use uuid::Uuid;

use crate::core::catalog::LogicalKind;
use crate::core::error::{Error, ErrorKind};

/// Fixed-point number: a signed 96-bit magnitude scaled by `10^-scale`.
#[derive(Clone, Copy, Debug, Default, Eq, Hash, PartialEq)]
pub struct Decimal {
    mantissa: i128,
    scale: u8,
}

impl Decimal {
    pub const MAX_SCALE: u8 = 28;
    pub const MAX_MANTISSA: i128 = (1 << 96) - 1;
    pub const ZERO: Decimal = Decimal {
        mantissa: 0,
        scale: 0,
    };

    pub fn new(mantissa: i128, scale: u8) -> Result<Self, Error> {
        if scale > Self::MAX_SCALE {
            return Err(Error::new(ErrorKind::Overflow)
                .with_message(format!("decimal scale {scale} exceeds {}", Self::MAX_SCALE)));
        }
        if mantissa.unsigned_abs() > Self::MAX_MANTISSA as u128 {
            return Err(Error::new(ErrorKind::Overflow)
                .with_message(format!("decimal mantissa {mantissa} exceeds 96 bits")));
        }
        Ok(Self { mantissa, scale })
    }

    pub fn mantissa(&self) -> i128 {
        self.mantissa
    }

    pub fn scale(&self) -> u8 {
        self.scale
    }

    pub fn is_negative(&self) -> bool {
        self.mantissa < 0
    }
}

impl fmt::Display for Decimal {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let digits = self.mantissa.unsigned_abs().to_string();
        let sign = if self.mantissa < 0 { "-" } else { "" };
        let scale = self.scale as usize;
        if scale == 0 {
            return write!(f, "{sign}{digits}");
        }
        if digits.len() > scale {
            let (int, frac) = digits.split_at(digits.len() - scale);
            write!(f, "{sign}{int}.{frac}")
        } else {
            write!(f, "{sign}0.{digits:0>scale$}")
        }
    }
}

impl FromStr for Decimal {
    type Err = Error;

    fn from_str(text: &str) -> Result<Self, Self::Err> {
        let invalid = || {
            Error::new(ErrorKind::InvalidCast).with_message(format!("invalid decimal '{text}'"))
        };
        let (negative, unsigned) = match text.strip_prefix('-') {
            Some(rest) => (true, rest),
            None => (false, text.strip_prefix('+').unwrap_or(text)),
        };
        let (int, frac) = unsigned.split_once('.').unwrap_or((unsigned, ""));
        if int.is_empty() && frac.is_empty() {
            return Err(invalid());
        }
        if !int.bytes().chain(frac.bytes()).all(|b| b.is_ascii_digit()) {
            return Err(invalid());
        }
        let scale = u8::try_from(frac.len()).map_err(|_| invalid())?;
        let mut mantissa: i128 = 0;
        for digit in int.bytes().chain(frac.bytes()) {
            mantissa = mantissa
                .checked_mul(10)
                .and_then(|m| m.checked_add(i128::from(digit - b'0')))
                .ok_or_else(invalid)?;
        }
        Decimal::new(if negative { -mantissa } else { mantissa }, scale)
    }
}

/// `found` is `None` for a null value.
pub(crate) fn cast_error(found: Option<LogicalKind>, target: LogicalKind) -> Error {
    let message = match found {
        Some(kind) => format!("unable to cast {} value to {}", kind.name(), target.name()),
        None => format!("unable to cast null value to {}", target.name()),
    };
    Error::new(ErrorKind::InvalidCast).with_message(message)
}

#[derive(Clone, Debug, PartialEq)]
pub enum Value {
    Null,
    Boolean(bool),
    Byte(u8),
    ByteSequence(Vec<u8>),
    Char(char),
    CharSequence(Vec<char>),
    Timestamp(OffsetDateTime),
    FixedPoint(Decimal),
    Double(f64),
    Single(f32),
    Guid(Uuid),
    Int32(i32),
    Int64(i64),
    Int16(i16),
    Text(String),
    Duration(Duration),
}

impl Value {
    pub fn kind(&self) -> Option<LogicalKind> {
        let kind = match self {
            Value::Null => return None,
            Value::Boolean(_) => LogicalKind::Boolean,
            Value::Byte(_) => LogicalKind::Byte,
            Value::ByteSequence(_) => LogicalKind::ByteSequence,
            Value::Char(_) => LogicalKind::Char,
            Value::CharSequence(_) => LogicalKind::CharSequence,
            Value::Timestamp(_) => LogicalKind::Timestamp,
            Value::FixedPoint(_) => LogicalKind::FixedPoint,
            Value::Double(_) => LogicalKind::Double,
            Value::Single(_) => LogicalKind::Single,
            Value::Guid(_) => LogicalKind::Guid,
            Value::Int32(_) => LogicalKind::Int32,
            Value::Int64(_) => LogicalKind::Int64,
            Value::Int16(_) => LogicalKind::Int16,
            Value::Text(_) => LogicalKind::Text,
            Value::Duration(_) => LogicalKind::Duration,
        };
        Some(kind)
    }

    pub fn is_null(&self) -> bool {
        matches!(self, Value::Null)
    }

    fn cast_error(&self, target: LogicalKind) -> Error {
        cast_error(self.kind(), target)
    }

    pub fn as_boolean(&self) -> Result<bool, Error> {
        match self {
            Value::Boolean(v) => Ok(*v),
            _ => Err(self.cast_error(LogicalKind::Boolean)),
        }
    }

    pub fn as_byte(&self) -> Result<u8, Error> {
        match self {
            Value::Byte(v) => Ok(*v),
            _ => Err(self.cast_error(LogicalKind::Byte)),
        }
    }

    pub fn as_char(&self) -> Result<char, Error> {
        match self {
            Value::Char(v) => Ok(*v),
            _ => Err(self.cast_error(LogicalKind::Char)),
        }
    }

    pub fn as_timestamp(&self) -> Result<OffsetDateTime, Error> {
        match self {
            Value::Timestamp(v) => Ok(*v),
            _ => Err(self.cast_error(LogicalKind::Timestamp)),
        }
    }

    pub fn as_decimal(&self) -> Result<Decimal, Error> {
        let mantissa = match self {
            Value::FixedPoint(v) => return Ok(*v),
            Value::Byte(v) => i128::from(*v),
            Value::Int16(v) => i128::from(*v),
            Value::Int32(v) => i128::from(*v),
            Value::Int64(v) => i128::from(*v),
            _ => return Err(self.cast_error(LogicalKind::FixedPoint)),
        };
        Decimal::new(mantissa, 0)
    }

    pub fn as_double(&self) -> Result<f64, Error> {
        match self {
            Value::Double(v) => Ok(*v),
            Value::Single(v) => Ok(f64::from(*v)),
            _ => Err(self.cast_error(LogicalKind::Double)),
        }
    }

    pub fn as_single(&self) -> Result<f32, Error> {
        match self {
            Value::Single(v) => Ok(*v),
            _ => Err(self.cast_error(LogicalKind::Single)),
        }
    }

    pub fn as_guid(&self) -> Result<Uuid, Error> {
        match self {
            Value::Guid(v) => Ok(*v),
            _ => Err(self.cast_error(LogicalKind::Guid)),
        }
    }

    pub fn as_int16(&self) -> Result<i16, Error> {
        match self {
            Value::Int16(v) => Ok(*v),
            Value::Byte(v) => Ok(i16::from(*v)),
            _ => Err(self.cast_error(LogicalKind::Int16)),
        }
    }

    pub fn as_int32(&self) -> Result<i32, Error> {
        match self {
            Value::Int32(v) => Ok(*v),
            Value::Int16(v) => Ok(i32::from(*v)),
            Value::Byte(v) => Ok(i32::from(*v)),
            _ => Err(self.cast_error(LogicalKind::Int32)),
        }
    }

    pub fn as_int64(&self) -> Result<i64, Error> {
        match self {
            Value::Int64(v) => Ok(*v),
            Value::Int32(v) => Ok(i64::from(*v)),
            Value::Int16(v) => Ok(i64::from(*v)),
            Value::Byte(v) => Ok(i64::from(*v)),
            _ => Err(self.cast_error(LogicalKind::Int64)),
        }
    }

    pub fn as_duration(&self) -> Result<Duration, Error> {
        match self {
            Value::Duration(v) => Ok(*v),
            _ => Err(self.cast_error(LogicalKind::Duration)),
        }
    }

    pub fn as_text(&self) -> Result<Cow<'_, str>, Error> {
        match self {
            Value::Text(v) => Ok(Cow::Borrowed(v.as_str())),
            Value::Char(v) => Ok(Cow::Owned(v.to_string())),
            Value::CharSequence(v) => Ok(Cow::Owned(v.iter().collect())),
            _ => Err(self.cast_error(LogicalKind::Text)),
        }
    }

    pub fn as_byte_sequence(&self) -> Result<&[u8], Error> {
        match self {
            Value::ByteSequence(v) => Ok(v.as_slice()),
            _ => Err(self.cast_error(LogicalKind::ByteSequence)),
        }
    }

    pub fn as_char_sequence(&self) -> Result<Cow<'_, [char]>, Error> {
        match self {
            Value::CharSequence(v) => Ok(Cow::Borrowed(v.as_slice())),
            Value::Text(v) => Ok(Cow::Owned(v.chars().collect())),
            _ => Err(self.cast_error(LogicalKind::CharSequence)),
        }
    }

    pub fn into_text(self) -> Result<String, Error> {
        match self {
            Value::Text(v) => Ok(v),
            other => other.as_text().map(Cow::into_owned),
        }
    }

    pub fn into_byte_sequence(self) -> Result<Vec<u8>, Error> {
        match self {
            Value::ByteSequence(v) => Ok(v),
            other => Err(other.cast_error(LogicalKind::ByteSequence)),
        }
    }

    pub fn into_char_sequence(self) -> Result<Vec<char>, Error> {
        match self {
            Value::CharSequence(v) => Ok(v),
            other => other.as_char_sequence().map(Cow::into_owned),
        }
    }
}

macro_rules! value_from {
    ($($ty:ty => $variant:ident),* $(,)?) => {
        $(
            impl From<$ty> for Value {
                fn from(value: $ty) -> Self {
                    Value::$variant(value)
                }
            }
        )*
    };
}

value_from! {
    bool => Boolean,
    u8 => Byte,
    Vec<u8> => ByteSequence,
    char => Char,
    Vec<char> => CharSequence,
    OffsetDateTime => Timestamp,
    Decimal => FixedPoint,
    f64 => Double,
    f32 => Single,
    Uuid => Guid,
    i32 => Int32,
    i64 => Int64,
    i16 => Int16,
    String => Text,
    Duration => Duration,
}

impl From<&str> for Value {
    fn from(value: &str) -> Self {
        Value::Text(value.to_string())
    }
}

impl<T: Into<Value>> From<Option<T>> for Value {
    fn from(value: Option<T>) -> Self {
        value.map_or(Value::Null, Into::into)
    }
}
