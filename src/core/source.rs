//! Purpose: Forward-only, multi-result tabular cursor abstraction.
//! Exports: `TabularSource`.
//! Role: Writer input and reader output; any live cursor can implement it.
//! Invariants: Rows are pulled one at a time; results advance only forward.
//! Invariants: Typed getters fail with `InvalidCast` on null or on a non-widening kind.
use std::borrow::Cow;

use time::{Duration, OffsetDateTime};
use uuid::Uuid;

use crate::core::catalog::RuntimeType;
use crate::core::error::Error;
use crate::core::value::{Decimal, Value};

/// A cursor positioned at its first result, before its first row.
///
/// Only the schema, navigation, null test and [`TabularSource::get_value`] are
/// required. The typed getters default to coercing `get_value`; implementers
/// holding decoded values override them to skip the intermediate copy.
pub trait TabularSource {
    fn field_count(&self) -> Result<usize, Error>;

    fn column_name(&self, ordinal: usize) -> Result<&str, Error>;

    fn column_type(&self, ordinal: usize) -> Result<RuntimeType, Error>;

    /// Moves to the next result, discarding unread rows of the current one.
    fn next_result(&mut self) -> Result<bool, Error>;

    /// Loads the next row of the current result.
    fn read(&mut self) -> Result<bool, Error>;

    fn is_null(&self, ordinal: usize) -> Result<bool, Error>;

    fn records_affected(&self) -> Result<i32, Error>;

    /// Owned copy of a value of the current row; `Value::Null` when absent.
    fn get_value(&self, ordinal: usize) -> Result<Value, Error>;

    fn get_boolean(&self, ordinal: usize) -> Result<bool, Error> {
        self.get_value(ordinal)?.as_boolean()
    }

    fn get_byte(&self, ordinal: usize) -> Result<u8, Error> {
        self.get_value(ordinal)?.as_byte()
    }

    fn get_byte_sequence(&self, ordinal: usize) -> Result<Cow<'_, [u8]>, Error> {
        self.get_value(ordinal)?.into_byte_sequence().map(Cow::Owned)
    }

    fn get_char(&self, ordinal: usize) -> Result<char, Error> {
        self.get_value(ordinal)?.as_char()
    }

    fn get_char_sequence(&self, ordinal: usize) -> Result<Cow<'_, [char]>, Error> {
        self.get_value(ordinal)?.into_char_sequence().map(Cow::Owned)
    }

    fn get_timestamp(&self, ordinal: usize) -> Result<OffsetDateTime, Error> {
        self.get_value(ordinal)?.as_timestamp()
    }

    fn get_decimal(&self, ordinal: usize) -> Result<Decimal, Error> {
        self.get_value(ordinal)?.as_decimal()
    }

    fn get_double(&self, ordinal: usize) -> Result<f64, Error> {
        self.get_value(ordinal)?.as_double()
    }

    fn get_single(&self, ordinal: usize) -> Result<f32, Error> {
        self.get_value(ordinal)?.as_single()
    }

    fn get_guid(&self, ordinal: usize) -> Result<Uuid, Error> {
        self.get_value(ordinal)?.as_guid()
    }

    fn get_int32(&self, ordinal: usize) -> Result<i32, Error> {
        self.get_value(ordinal)?.as_int32()
    }

    fn get_int64(&self, ordinal: usize) -> Result<i64, Error> {
        self.get_value(ordinal)?.as_int64()
    }

    fn get_int16(&self, ordinal: usize) -> Result<i16, Error> {
        self.get_value(ordinal)?.as_int16()
    }

    fn get_text(&self, ordinal: usize) -> Result<Cow<'_, str>, Error> {
        self.get_value(ordinal)?.into_text().map(Cow::Owned)
    }

    fn get_duration(&self, ordinal: usize) -> Result<Duration, Error> {
        self.get_value(ordinal)?.as_duration()
    }
}

#[cfg(test)]
mod tests {
    use super::TabularSource;
    use crate::core::catalog::{LogicalKind, RuntimeType};
    use crate::core::error::{Error, ErrorKind};
    use crate::core::value::Value;

    /// Single-row cursor that only implements the required methods.
    struct OneRow {
        values: Vec<Value>,
        loaded: bool,
    }

    impl TabularSource for OneRow {
        fn field_count(&self) -> Result<usize, Error> {
            Ok(self.values.len())
        }

        fn column_name(&self, _ordinal: usize) -> Result<&str, Error> {
            Ok("c")
        }

        fn column_type(&self, ordinal: usize) -> Result<RuntimeType, Error> {
            let kind = self.values[ordinal].kind().unwrap_or(LogicalKind::Text);
            Ok(kind.runtime_type())
        }

        fn next_result(&mut self) -> Result<bool, Error> {
            Ok(false)
        }

        fn read(&mut self) -> Result<bool, Error> {
            let first = !self.loaded;
            self.loaded = true;
            Ok(first)
        }

        fn is_null(&self, ordinal: usize) -> Result<bool, Error> {
            Ok(self.values[ordinal].is_null())
        }

        fn records_affected(&self) -> Result<i32, Error> {
            Ok(-1)
        }

        fn get_value(&self, ordinal: usize) -> Result<Value, Error> {
            Ok(self.values[ordinal].clone())
        }
    }

    #[test]
    fn default_getters_coerce_through_values() {
        let mut source = OneRow {
            values: vec![Value::Int16(7), Value::Text("hi".into()), Value::Null],
            loaded: false,
        };
        assert!(source.read().expect("read"));
        assert_eq!(source.get_int64(0).expect("widen"), 7);
        assert_eq!(source.get_text(1).expect("text"), "hi");
        assert_eq!(
            source.get_char_sequence(1).expect("chars").as_ref(),
            &['h', 'i']
        );
        let err = source.get_text(2).expect_err("null");
        assert_eq!(err.kind(), ErrorKind::InvalidCast);
        let err = source.get_byte_sequence(1).expect_err("mismatch");
        assert_eq!(err.kind(), ErrorKind::InvalidCast);
        assert!(!source.read().expect("read"));
    }
}
