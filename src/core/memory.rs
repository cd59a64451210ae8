//! Purpose: Owned multi-result table that behaves like a live cursor.
//! Exports: `MemoryResult`, `MemorySource`.
//! Role: Writer input for the CLI and tests.
//! Invariants: Every non-null value matches its column's kind; rows match the column count.
use std::borrow::Cow;

use crate::core::catalog::{kind_of, RuntimeType};
use crate::core::error::{Error, ErrorKind};
use crate::core::source::TabularSource;
use crate::core::value::Value;

#[derive(Clone, Debug)]
struct MemoryColumn {
    name: String,
    runtime_type: RuntimeType,
}

/// One result: an ordered column list and its rows.
#[derive(Clone, Debug, Default)]
pub struct MemoryResult {
    columns: Vec<MemoryColumn>,
    rows: Vec<Vec<Value>>,
}

impl MemoryResult {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn column<T: 'static>(self, name: impl Into<String>) -> Self {
        self.column_of(name, RuntimeType::of::<T>())
    }

    /// Columns of unsupported types are accepted here and rejected by the writer.
    pub fn column_of(mut self, name: impl Into<String>, runtime_type: RuntimeType) -> Self {
        self.columns.push(MemoryColumn {
            name: name.into(),
            runtime_type,
        });
        self
    }

    pub fn row(mut self, values: Vec<Value>) -> Result<Self, Error> {
        if values.len() != self.columns.len() {
            return Err(Error::new(ErrorKind::InvalidOperation).with_message(format!(
                "row has {} values for {} columns",
                values.len(),
                self.columns.len()
            )));
        }
        for (ordinal, (value, column)) in values.iter().zip(&self.columns).enumerate() {
            if value.is_null() {
                continue;
            }
            let expected = kind_of(column.runtime_type).ok();
            if value.kind() != expected {
                return Err(Error::new(ErrorKind::InvalidCast)
                    .with_message(format!(
                        "value of kind {:?} does not match column '{}' of type {}",
                        value.kind(),
                        column.name,
                        column.runtime_type
                    ))
                    .with_ordinal(ordinal));
            }
        }
        self.rows.push(values);
        Ok(self)
    }

    pub fn column_count(&self) -> usize {
        self.columns.len()
    }

    pub fn row_count(&self) -> usize {
        self.rows.len()
    }
}

/// Cursor over owned results, positioned at the first result before its first row.
#[derive(Clone, Debug, Default)]
pub struct MemorySource {
    results: Vec<MemoryResult>,
    records_affected: i32,
    result: usize,
    next_row: usize,
    current: Option<usize>,
}

impl MemorySource {
    pub fn new(results: Vec<MemoryResult>) -> Self {
        Self {
            results,
            records_affected: -1,
            ..Self::default()
        }
    }

    pub fn with_records_affected(mut self, records_affected: i32) -> Self {
        self.records_affected = records_affected;
        self
    }

    fn current_result(&self) -> Option<&MemoryResult> {
        self.results.get(self.result)
    }

    fn column(&self, ordinal: usize) -> Result<&MemoryColumn, Error> {
        self.current_result()
            .and_then(|result| result.columns.get(ordinal))
            .ok_or_else(|| out_of_range(ordinal))
    }

    fn cell(&self, ordinal: usize) -> Result<&Value, Error> {
        let row = self
            .current
            .and_then(|row| self.current_result().map(|result| &result.rows[row]))
            .ok_or_else(|| {
                Error::new(ErrorKind::InvalidOperation).with_message("no row is loaded")
            })?;
        row.get(ordinal).ok_or_else(|| out_of_range(ordinal))
    }
}

fn out_of_range(ordinal: usize) -> Error {
    Error::new(ErrorKind::IndexOutOfRange)
        .with_message("column ordinal out of range")
        .with_ordinal(ordinal)
}

impl TabularSource for MemorySource {
    fn field_count(&self) -> Result<usize, Error> {
        Ok(self.current_result().map_or(0, MemoryResult::column_count))
    }

    fn column_name(&self, ordinal: usize) -> Result<&str, Error> {
        Ok(&self.column(ordinal)?.name)
    }

    fn column_type(&self, ordinal: usize) -> Result<RuntimeType, Error> {
        Ok(self.column(ordinal)?.runtime_type)
    }

    fn next_result(&mut self) -> Result<bool, Error> {
        self.current = None;
        self.next_row = 0;
        if self.result < self.results.len() {
            self.result += 1;
        }
        Ok(self.result < self.results.len())
    }

    fn read(&mut self) -> Result<bool, Error> {
        let rows = self.current_result().map_or(0, MemoryResult::row_count);
        if self.next_row < rows {
            self.current = Some(self.next_row);
            self.next_row += 1;
            return Ok(true);
        }
        self.current = None;
        Ok(false)
    }

    fn is_null(&self, ordinal: usize) -> Result<bool, Error> {
        Ok(self.cell(ordinal)?.is_null())
    }

    fn records_affected(&self) -> Result<i32, Error> {
        Ok(self.records_affected)
    }

    fn get_value(&self, ordinal: usize) -> Result<Value, Error> {
        self.cell(ordinal).cloned()
    }

    fn get_byte_sequence(&self, ordinal: usize) -> Result<Cow<'_, [u8]>, Error> {
        self.cell(ordinal)?.as_byte_sequence().map(Cow::Borrowed)
    }

    fn get_char_sequence(&self, ordinal: usize) -> Result<Cow<'_, [char]>, Error> {
        self.cell(ordinal)?.as_char_sequence()
    }

    fn get_text(&self, ordinal: usize) -> Result<Cow<'_, str>, Error> {
        self.cell(ordinal)?.as_text()
    }
}
