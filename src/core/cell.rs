//! Purpose: Reusable per-column slot holding one decoded value of the current row.
//! Exports: `Cell`.
//! Role: The reader keeps one `Cell` per column and refills it for every row.
//! Invariants: Fixed-size kinds live inline in the slot; no heap allocation on set.
//! Invariants: Variable-size kinds reuse the cell's own buffers; `clear` keeps their capacity.
use std::borrow::Cow;

use time::{Duration, OffsetDateTime};
use uuid::Uuid;

use crate::core::catalog::LogicalKind;
use crate::core::error::Error;
use crate::core::value::{cast_error, Decimal, Value};

#[derive(Clone, Copy, Debug, Default)]
enum Slot {
    #[default]
    Null,
    Boolean(bool),
    Byte(u8),
    ByteSequence,
    Char(char),
    CharSequence,
    Timestamp(OffsetDateTime),
    FixedPoint(Decimal),
    Double(f64),
    Single(f32),
    Guid(Uuid),
    Int32(i32),
    Int64(i64),
    Int16(i16),
    Text,
    Duration(Duration),
}

#[derive(Debug, Default)]
pub struct Cell {
    slot: Slot,
    bytes: Vec<u8>,
    chars: Vec<char>,
    text: String,
}

macro_rules! scalar_access {
    ($($get:ident, $set:ident, $ty:ty, $variant:ident, $coerce:path;)*) => {
        $(
            pub fn $set(&mut self, value: $ty) {
                self.slot = Slot::$variant(value);
            }

            pub fn $get(&self) -> Result<$ty, Error> {
                match self.slot {
                    Slot::$variant(value) => Ok(value),
                    _ => self.fallback(LogicalKind::$variant, $coerce),
                }
            }
        )*
    };
}

impl Cell {
    pub fn clear(&mut self) {
        self.slot = Slot::Null;
    }

    pub fn is_null(&self) -> bool {
        matches!(self.slot, Slot::Null)
    }

    pub fn kind(&self) -> Option<LogicalKind> {
        let kind = match self.slot {
            Slot::Null => return None,
            Slot::Boolean(_) => LogicalKind::Boolean,
            Slot::Byte(_) => LogicalKind::Byte,
            Slot::ByteSequence => LogicalKind::ByteSequence,
            Slot::Char(_) => LogicalKind::Char,
            Slot::CharSequence => LogicalKind::CharSequence,
            Slot::Timestamp(_) => LogicalKind::Timestamp,
            Slot::FixedPoint(_) => LogicalKind::FixedPoint,
            Slot::Double(_) => LogicalKind::Double,
            Slot::Single(_) => LogicalKind::Single,
            Slot::Guid(_) => LogicalKind::Guid,
            Slot::Int32(_) => LogicalKind::Int32,
            Slot::Int64(_) => LogicalKind::Int64,
            Slot::Int16(_) => LogicalKind::Int16,
            Slot::Text => LogicalKind::Text,
            Slot::Duration(_) => LogicalKind::Duration,
        };
        Some(kind)
    }

    scalar_access! {
        boolean, set_boolean, bool, Boolean, Value::as_boolean;
        byte, set_byte, u8, Byte, Value::as_byte;
        char, set_char, char, Char, Value::as_char;
        timestamp, set_timestamp, OffsetDateTime, Timestamp, Value::as_timestamp;
        decimal, set_decimal, Decimal, FixedPoint, Value::as_decimal;
        double, set_double, f64, Double, Value::as_double;
        single, set_single, f32, Single, Value::as_single;
        guid, set_guid, Uuid, Guid, Value::as_guid;
        int32, set_int32, i32, Int32, Value::as_int32;
        int64, set_int64, i64, Int64, Value::as_int64;
        int16, set_int16, i16, Int16, Value::as_int16;
        duration, set_duration, Duration, Duration, Value::as_duration;
    }

    /// Marks the cell as a byte sequence and hands out its emptied buffer.
    pub fn byte_sequence_mut(&mut self) -> &mut Vec<u8> {
        self.slot = Slot::ByteSequence;
        self.bytes.clear();
        &mut self.bytes
    }

    pub fn char_sequence_mut(&mut self) -> &mut Vec<char> {
        self.slot = Slot::CharSequence;
        self.chars.clear();
        &mut self.chars
    }

    pub fn text_mut(&mut self) -> &mut String {
        self.slot = Slot::Text;
        self.text.clear();
        &mut self.text
    }

    pub fn byte_sequence(&self) -> Result<&[u8], Error> {
        match self.slot {
            Slot::ByteSequence => Ok(&self.bytes),
            _ => Err(cast_error(self.kind(), LogicalKind::ByteSequence)),
        }
    }

    pub fn char_sequence(&self) -> Result<Cow<'_, [char]>, Error> {
        match self.slot {
            Slot::CharSequence => Ok(Cow::Borrowed(&self.chars)),
            Slot::Text => Ok(Cow::Owned(self.text.chars().collect())),
            _ => Err(cast_error(self.kind(), LogicalKind::CharSequence)),
        }
    }

    pub fn text(&self) -> Result<Cow<'_, str>, Error> {
        match self.slot {
            Slot::Text => Ok(Cow::Borrowed(&self.text)),
            Slot::Char(value) => Ok(Cow::Owned(value.to_string())),
            Slot::CharSequence => Ok(Cow::Owned(self.chars.iter().collect())),
            _ => Err(cast_error(self.kind(), LogicalKind::Text)),
        }
    }

    /// Owned copy of the stored value; `Value::Null` for an empty cell.
    pub fn value(&self) -> Value {
        match self.slot {
            Slot::Null => Value::Null,
            Slot::Boolean(v) => Value::Boolean(v),
            Slot::Byte(v) => Value::Byte(v),
            Slot::ByteSequence => Value::ByteSequence(self.bytes.clone()),
            Slot::Char(v) => Value::Char(v),
            Slot::CharSequence => Value::CharSequence(self.chars.clone()),
            Slot::Timestamp(v) => Value::Timestamp(v),
            Slot::FixedPoint(v) => Value::FixedPoint(v),
            Slot::Double(v) => Value::Double(v),
            Slot::Single(v) => Value::Single(v),
            Slot::Guid(v) => Value::Guid(v),
            Slot::Int32(v) => Value::Int32(v),
            Slot::Int64(v) => Value::Int64(v),
            Slot::Int16(v) => Value::Int16(v),
            Slot::Text => Value::Text(self.text.clone()),
            Slot::Duration(v) => Value::Duration(v),
        }
    }

    /// Mismatched scalar reads go through the `Value` widening rules. Variable-size
    /// kinds never widen into a scalar, so they fail without copying their buffer.
    fn fallback<T>(
        &self,
        target: LogicalKind,
        coerce: impl FnOnce(&Value) -> Result<T, Error>,
    ) -> Result<T, Error> {
        match self.slot {
            Slot::ByteSequence | Slot::CharSequence | Slot::Text => {
                Err(cast_error(self.kind(), target))
            }
            _ => coerce(&self.value()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::Cell;
    use crate::core::catalog::LogicalKind;
    use crate::core::error::ErrorKind;
    use crate::core::value::Value;

    #[test]
    fn clear_keeps_buffer_capacity() {
        let mut cell = Cell::default();
        cell.byte_sequence_mut().extend_from_slice(&[1u8; 64]);
        let capacity = cell.bytes.capacity();
        cell.clear();
        assert!(cell.is_null());
        assert_eq!(cell.bytes.capacity(), capacity);
        assert!(cell.byte_sequence_mut().is_empty());
    }

    #[test]
    fn exact_reads_return_the_stored_value() {
        let mut cell = Cell::default();
        cell.set_int64(-9);
        assert_eq!(cell.kind(), Some(LogicalKind::Int64));
        assert_eq!(cell.int64().expect("int64"), -9);

        cell.text_mut().push_str("hello");
        assert_eq!(cell.text().expect("text"), "hello");
        assert_eq!(cell.value(), Value::Text("hello".to_string()));
    }

    #[test]
    fn mismatched_reads_widen_or_fail() {
        let mut cell = Cell::default();
        cell.set_int16(300);
        assert_eq!(cell.int32().expect("widen"), 300);
        assert_eq!(cell.int64().expect("widen"), 300);
        let err = cell.byte().expect_err("narrowing");
        assert_eq!(err.kind(), ErrorKind::InvalidCast);

        cell.char_sequence_mut().extend("abc".chars());
        assert_eq!(cell.text().expect("text"), "abc");
        let err = cell.int32().expect_err("should fail");
        assert_eq!(err.kind(), ErrorKind::InvalidCast);
    }

    #[test]
    fn null_cells_fail_every_typed_read() {
        let cell = Cell::default();
        assert_eq!(cell.value(), Value::Null);
        assert_eq!(cell.text().expect_err("null").kind(), ErrorKind::InvalidCast);
        assert_eq!(cell.boolean().expect_err("null").kind(), ErrorKind::InvalidCast);
        assert_eq!(
            cell.byte_sequence().expect_err("null").kind(),
            ErrorKind::InvalidCast
        );
    }
}
