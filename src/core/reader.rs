//! Purpose: Parse a version 1 stream back into a forward-only tabular cursor.
//! Exports: `ReaderOptions`, `StreamReader`.
//! Role: Backs `api::deserialize`; implements `TabularSource` over any `Read`.
//! Invariants: Input is consumed strictly forward; a result's columns are parsed before its rows.
//! Invariants: `close` drops the byte source; `dispose` also drops metadata and buffers.
//! Invariants: Exhaustion is sticky; `read`/`next_result` keep returning false without error.
use std::borrow::Cow;
use std::io::Read;

use time::{Duration, OffsetDateTime};
use uuid::Uuid;

use crate::core::bcl;
use crate::core::catalog::{LogicalKind, RuntimeType};
use crate::core::cell::Cell;
use crate::core::column::{find_ordinal, ColumnDescriptor, SchemaTable};
use crate::core::error::{Error, ErrorKind};
use crate::core::frame::{self, MAX_FIELD_LEN_ABS, STREAM_VERSION};
use crate::core::source::TabularSource;
use crate::core::value::{Decimal, Value};
use crate::core::wire::{ReadGroup, WireReader};

#[derive(Clone, Debug)]
pub struct ReaderOptions {
    /// Largest length-delimited payload accepted before allocation.
    pub max_field_len: usize,
}

impl Default for ReaderOptions {
    fn default() -> Self {
        Self {
            max_field_len: MAX_FIELD_LEN_ABS,
        }
    }
}

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
enum Position {
    /// The key of the next record has been consumed.
    BeforeRow,
    EndOfResult,
    EndOfStream,
}

pub struct StreamReader<R: Read> {
    wire: Option<WireReader<R>>,
    columns: Vec<ColumnDescriptor>,
    cells: Vec<Cell>,
    cells_ready: bool,
    row_loaded: bool,
    position: Position,
    result_group: Option<ReadGroup>,
    records_group: Option<ReadGroup>,
    records_affected: i32,
    schema: Option<SchemaTable>,
    scratch: String,
    closed: bool,
    disposed: bool,
}

fn open_wire<R: Read>(wire: &mut Option<WireReader<R>>) -> Result<&mut WireReader<R>, Error> {
    wire.as_mut()
        .ok_or_else(|| Error::new(ErrorKind::ClosedReader).with_message("reader is closed"))
}

impl<R: Read> StreamReader<R> {
    /// Parses the stream header and the first result's column list.
    pub fn new(source: R, options: &ReaderOptions) -> Result<Self, Error> {
        let max_field_len = options.max_field_len.min(MAX_FIELD_LEN_ABS);
        let mut reader = Self {
            wire: Some(WireReader::new(source, max_field_len)),
            columns: Vec::new(),
            cells: Vec::new(),
            cells_ready: false,
            row_loaded: false,
            position: Position::EndOfStream,
            result_group: None,
            records_group: None,
            records_affected: -1,
            schema: None,
            scratch: String::new(),
            closed: false,
            disposed: false,
        };

        let mut version = None;
        loop {
            let wire = open_wire(&mut reader.wire)?;
            let start = wire.position();
            match wire.read_field()? {
                frame::VERSION => {
                    let value = wire.read_uint64()?;
                    if value != STREAM_VERSION {
                        return Err(Error::malformed(format!(
                            "unsupported stream version {value}; expected {STREAM_VERSION}"
                        ))
                        .with_offset(start));
                    }
                    version = Some(value);
                }
                frame::RECORDS_AFFECTED => reader.records_affected = wire.read_int32()?,
                field @ (0 | frame::RESULT) => {
                    if version.is_none() {
                        return Err(Error::malformed("stream does not start with a version")
                            .with_offset(start));
                    }
                    if field == frame::RESULT {
                        reader.enter_result()?;
                    } else {
                        tracing::debug!("stream holds no results");
                    }
                    break;
                }
                _ => wire.skip_field()?,
            }
        }
        Ok(reader)
    }

    /// Enters the result whose key was just read and parses its column list.
    fn enter_result(&mut self) -> Result<(), Error> {
        let wire = open_wire(&mut self.wire)?;
        self.result_group = Some(wire.start_group()?);

        let start = wire.position();
        let field = wire.read_field()?;
        if field != frame::COLUMNS {
            return Err(Error::malformed(format!(
                "expected column list (field {}), found field {field}",
                frame::COLUMNS
            ))
            .with_offset(start));
        }
        let list = wire.start_group()?;
        let mut columns = Vec::new();
        loop {
            match wire.read_field()? {
                0 => break,
                frame::COLUMN => {
                    let column = read_column(wire, columns.len())?;
                    columns.push(column);
                }
                _ => wire.skip_field()?,
            }
        }
        wire.end_group(list)?;

        let start = wire.position();
        match wire.read_field()? {
            frame::RECORDS => {
                self.records_group = Some(wire.start_group()?);
                self.position = next_record(wire)?;
            }
            // A result without a record list holds no rows.
            0 => self.position = Position::EndOfResult,
            other => {
                return Err(Error::malformed(format!(
                    "expected record list (field {}), found field {other}",
                    frame::RECORDS
                ))
                .with_offset(start));
            }
        }

        tracing::debug!(columns = columns.len(), "parsed column list");
        self.columns = columns;
        self.cells_ready = false;
        self.row_loaded = false;
        self.schema = None;
        Ok(())
    }

    fn leave_result(&mut self) -> Result<(), Error> {
        let wire = open_wire(&mut self.wire)?;
        if let Some(group) = self.records_group.take() {
            wire.end_group(group)?;
        }
        if let Some(group) = self.result_group.take() {
            wire.end_group(group)?;
        }
        Ok(())
    }

    fn check_open(&self) -> Result<(), Error> {
        if self.disposed {
            return Err(Error::new(ErrorKind::DisposedReader).with_message("reader is disposed"));
        }
        if self.closed {
            return Err(Error::new(ErrorKind::ClosedReader).with_message("reader is closed"));
        }
        Ok(())
    }

    fn column(&self, ordinal: usize) -> Result<&ColumnDescriptor, Error> {
        self.check_open()?;
        self.columns.get(ordinal).ok_or_else(|| out_of_range(ordinal, self.columns.len()))
    }

    fn cell(&self, ordinal: usize) -> Result<&Cell, Error> {
        self.check_open()?;
        if !self.row_loaded {
            return Err(Error::new(ErrorKind::InvalidOperation)
                .with_message("no row is loaded; call read first"));
        }
        self.cells
            .get(ordinal)
            .ok_or_else(|| out_of_range(ordinal, self.columns.len()))
    }

    /// Copies part of a byte sequence value into `buffer`. With no buffer, returns
    /// the value's full length.
    pub fn get_bytes(
        &self,
        ordinal: usize,
        field_offset: i64,
        buffer: Option<&mut [u8]>,
        buffer_offset: i32,
        length: i32,
    ) -> Result<i64, Error> {
        let cell = self.cell(ordinal)?;
        check_range_args(ordinal, field_offset, length)?;
        let source = cell.byte_sequence()?;
        copy_range(source, field_offset, buffer, buffer_offset, length)
    }

    /// Character counterpart of [`StreamReader::get_bytes`].
    pub fn get_chars(
        &self,
        ordinal: usize,
        field_offset: i64,
        buffer: Option<&mut [char]>,
        buffer_offset: i32,
        length: i32,
    ) -> Result<i64, Error> {
        let cell = self.cell(ordinal)?;
        check_range_args(ordinal, field_offset, length)?;
        let source = cell.char_sequence()?;
        copy_range(&*source, field_offset, buffer, buffer_offset, length)
    }

    /// Fills `values` in ordinal order and returns how many were written.
    pub fn get_values(&self, values: Option<&mut [Value]>) -> Result<usize, Error> {
        let values = values.ok_or_else(|| {
            Error::new(ErrorKind::ArgumentMissing).with_message("values buffer is required")
        })?;
        self.check_open()?;
        let count = values.len().min(self.columns.len());
        for (ordinal, slot) in values.iter_mut().take(count).enumerate() {
            *slot = self.cell(ordinal)?.value();
        }
        Ok(count)
    }

    pub fn get_ordinal(&self, name: &str) -> Result<usize, Error> {
        self.check_open()?;
        find_ordinal(&self.columns, name)
    }

    pub fn get_name(&self, ordinal: usize) -> Result<&str, Error> {
        Ok(self.column(ordinal)?.name())
    }

    pub fn get_field_type(&self, ordinal: usize) -> Result<RuntimeType, Error> {
        Ok(self.column(ordinal)?.runtime_type())
    }

    pub fn get_data_type_name(&self, ordinal: usize) -> Result<&'static str, Error> {
        Ok(self.column(ordinal)?.kind().name())
    }

    pub fn get_kind(&self, ordinal: usize) -> Result<LogicalKind, Error> {
        Ok(self.column(ordinal)?.kind())
    }

    pub fn value_by_name(&self, name: &str) -> Result<Value, Error> {
        let ordinal = self.get_ordinal(name)?;
        Ok(self.cell(ordinal)?.value())
    }

    /// False once `next_result` has run past the last result.
    pub fn has_result(&self) -> bool {
        !self.closed && self.position != Position::EndOfStream
    }

    pub fn columns(&self) -> &[ColumnDescriptor] {
        &self.columns
    }

    /// Schema of the current result; cached until the result changes.
    pub fn schema_table(&mut self) -> Result<&SchemaTable, Error> {
        self.check_open()?;
        let columns = &self.columns;
        Ok(self
            .schema
            .get_or_insert_with(|| SchemaTable::from_columns(columns)))
    }

    /// Nesting depth of the current row; results are always flat.
    pub fn depth(&self) -> Result<usize, Error> {
        self.check_open()?;
        Ok(0)
    }

    pub fn is_closed(&self) -> bool {
        self.closed
    }

    pub fn is_disposed(&self) -> bool {
        self.disposed
    }

    /// Releases the byte source; later accessors fail with `ClosedReader`.
    pub fn close(&mut self) {
        if self.closed {
            return;
        }
        self.wire = None;
        self.result_group = None;
        self.records_group = None;
        self.row_loaded = false;
        self.closed = true;
        tracing::debug!("reader closed");
    }

    pub fn dispose(&mut self) {
        if self.disposed {
            return;
        }
        self.close();
        self.columns = Vec::new();
        self.cells = Vec::new();
        self.schema = None;
        self.scratch = String::new();
        self.disposed = true;
    }
}

impl<R: Read> TabularSource for StreamReader<R> {
    fn field_count(&self) -> Result<usize, Error> {
        self.check_open()?;
        Ok(self.columns.len())
    }

    fn column_name(&self, ordinal: usize) -> Result<&str, Error> {
        self.get_name(ordinal)
    }

    fn column_type(&self, ordinal: usize) -> Result<RuntimeType, Error> {
        self.get_field_type(ordinal)
    }

    fn next_result(&mut self) -> Result<bool, Error> {
        self.check_open()?;
        self.row_loaded = false;
        if self.position == Position::EndOfStream {
            return Ok(false);
        }

        let wire = open_wire(&mut self.wire)?;
        let mut skipped = 0u64;
        while self.position == Position::BeforeRow {
            wire.skip_field()?;
            self.position = next_record(wire)?;
            skipped += 1;
        }
        if skipped > 0 {
            tracing::debug!(rows = skipped, "discarded unread rows");
        }
        self.leave_result()?;

        loop {
            let wire = open_wire(&mut self.wire)?;
            match wire.read_field()? {
                frame::RESULT => {
                    self.enter_result()?;
                    return Ok(true);
                }
                0 => break,
                _ => wire.skip_field()?,
            }
        }
        tracing::debug!("end of stream");
        self.position = Position::EndOfStream;
        self.columns.clear();
        self.cells_ready = false;
        self.schema = None;
        Ok(false)
    }

    fn read(&mut self) -> Result<bool, Error> {
        self.check_open()?;
        self.row_loaded = false;
        if self.position != Position::BeforeRow {
            return Ok(false);
        }

        if self.cells_ready {
            self.cells.iter_mut().for_each(Cell::clear);
        } else {
            self.cells.clear();
            self.cells.resize_with(self.columns.len(), Cell::default);
            self.cells_ready = true;
        }

        let wire = open_wire(&mut self.wire)?;
        let record = wire.start_group()?;
        loop {
            let field = wire.read_field()?;
            if field == 0 {
                break;
            }
            let ordinal = frame::ordinal_of(field);
            match (self.columns.get(ordinal), self.cells.get_mut(ordinal)) {
                (Some(column), Some(cell)) => {
                    read_value(wire, column.kind(), cell, &mut self.scratch)
                        .map_err(|err| err.with_ordinal(ordinal))?;
                }
                _ => {
                    tracing::debug!(field, "skipping value without a column");
                    wire.skip_field()?;
                }
            }
        }
        wire.end_group(record)?;
        self.position = next_record(wire)?;
        self.row_loaded = true;
        tracing::trace!(columns = self.columns.len(), "read row");
        Ok(true)
    }

    fn is_null(&self, ordinal: usize) -> Result<bool, Error> {
        Ok(self.cell(ordinal)?.is_null())
    }

    fn records_affected(&self) -> Result<i32, Error> {
        self.check_open()?;
        Ok(self.records_affected)
    }

    fn get_value(&self, ordinal: usize) -> Result<Value, Error> {
        Ok(self.cell(ordinal)?.value())
    }

    fn get_boolean(&self, ordinal: usize) -> Result<bool, Error> {
        self.cell(ordinal)?.boolean()
    }

    fn get_byte(&self, ordinal: usize) -> Result<u8, Error> {
        self.cell(ordinal)?.byte()
    }

    fn get_byte_sequence(&self, ordinal: usize) -> Result<Cow<'_, [u8]>, Error> {
        self.cell(ordinal)?.byte_sequence().map(Cow::Borrowed)
    }

    fn get_char(&self, ordinal: usize) -> Result<char, Error> {
        self.cell(ordinal)?.char()
    }

    fn get_char_sequence(&self, ordinal: usize) -> Result<Cow<'_, [char]>, Error> {
        self.cell(ordinal)?.char_sequence()
    }

    fn get_timestamp(&self, ordinal: usize) -> Result<OffsetDateTime, Error> {
        self.cell(ordinal)?.timestamp()
    }

    fn get_decimal(&self, ordinal: usize) -> Result<Decimal, Error> {
        self.cell(ordinal)?.decimal()
    }

    fn get_double(&self, ordinal: usize) -> Result<f64, Error> {
        self.cell(ordinal)?.double()
    }

    fn get_single(&self, ordinal: usize) -> Result<f32, Error> {
        self.cell(ordinal)?.single()
    }

    fn get_guid(&self, ordinal: usize) -> Result<Uuid, Error> {
        self.cell(ordinal)?.guid()
    }

    fn get_int32(&self, ordinal: usize) -> Result<i32, Error> {
        self.cell(ordinal)?.int32()
    }

    fn get_int64(&self, ordinal: usize) -> Result<i64, Error> {
        self.cell(ordinal)?.int64()
    }

    fn get_int16(&self, ordinal: usize) -> Result<i16, Error> {
        self.cell(ordinal)?.int16()
    }

    fn get_text(&self, ordinal: usize) -> Result<Cow<'_, str>, Error> {
        self.cell(ordinal)?.text()
    }

    fn get_duration(&self, ordinal: usize) -> Result<Duration, Error> {
        self.cell(ordinal)?.duration()
    }
}

fn out_of_range(ordinal: usize, count: usize) -> Error {
    Error::new(ErrorKind::IndexOutOfRange)
        .with_message(format!("column ordinal must be less than {count}"))
        .with_ordinal(ordinal)
}

/// Reads up to the next record key inside the record list, skipping unknown fields.
fn next_record<R: Read>(wire: &mut WireReader<R>) -> Result<Position, Error> {
    loop {
        match wire.read_field()? {
            0 => return Ok(Position::EndOfResult),
            frame::RECORD => return Ok(Position::BeforeRow),
            field => {
                tracing::debug!(field, "skipping unknown field in record list");
                wire.skip_field()?;
            }
        }
    }
}

fn read_column<R: Read>(wire: &mut WireReader<R>, ordinal: usize) -> Result<ColumnDescriptor, Error> {
    let start = wire.position();
    let group = wire.start_group()?;
    let mut name = None;
    let mut kind = None;
    loop {
        match wire.read_field()? {
            0 => break,
            frame::COLUMN_NAME => name = Some(wire.read_string()?),
            frame::COLUMN_KIND => kind = Some(LogicalKind::from_tag(wire.read_uint64()?)?),
            _ => wire.skip_field()?,
        }
    }
    wire.end_group(group)?;

    let malformed = |message: &str| {
        Error::malformed(message)
            .with_ordinal(ordinal)
            .with_offset(start)
    };
    let name = name
        .filter(|name| !name.is_empty())
        .ok_or_else(|| malformed("column has no name"))?;
    let kind = kind.ok_or_else(|| malformed("column has no kind"))?;
    Ok(ColumnDescriptor::new(name, ordinal, kind))
}

fn read_value<R: Read>(
    wire: &mut WireReader<R>,
    kind: LogicalKind,
    cell: &mut Cell,
    scratch: &mut String,
) -> Result<(), Error> {
    let start = wire.position();
    match kind {
        LogicalKind::Boolean => cell.set_boolean(wire.read_bool()?),
        LogicalKind::Byte => {
            let value = wire.read_uint64()?;
            let value = u8::try_from(value).map_err(|_| {
                Error::malformed(format!("byte value {value} out of range")).with_offset(start)
            })?;
            cell.set_byte(value);
        }
        LogicalKind::ByteSequence => wire.read_bytes_into(cell.byte_sequence_mut())?,
        LogicalKind::Char => cell.set_char(decode_char(wire.read_int64()?, start)?),
        LogicalKind::CharSequence => {
            wire.read_string_into(scratch)?;
            cell.char_sequence_mut().extend(scratch.chars());
        }
        LogicalKind::Timestamp => cell.set_timestamp(bcl::read_timestamp(wire)?),
        LogicalKind::FixedPoint => cell.set_decimal(bcl::read_decimal(wire)?),
        LogicalKind::Double => cell.set_double(wire.read_double()?),
        LogicalKind::Single => cell.set_single(wire.read_float()?),
        LogicalKind::Guid => cell.set_guid(bcl::read_guid(wire)?),
        LogicalKind::Int32 => cell.set_int32(wire.read_int32()?),
        LogicalKind::Int64 => cell.set_int64(wire.read_int64()?),
        LogicalKind::Int16 => {
            let value = wire.read_int64()?;
            let value = i16::try_from(value).map_err(|_| {
                Error::malformed(format!("int16 value {value} out of range")).with_offset(start)
            })?;
            cell.set_int16(value);
        }
        LogicalKind::Text => wire.read_string_into(cell.text_mut())?,
        LogicalKind::Duration => cell.set_duration(bcl::read_duration(wire)?),
    }
    Ok(())
}

/// Negative values are sign-extended UTF-16 units; the rest are code points.
fn decode_char(value: i64, offset: u64) -> Result<char, Error> {
    let code = match value {
        -0x8000..=-1 => u32::from(value as i16 as u16),
        0..=0x10FFFF => value as u32,
        _ => {
            return Err(Error::malformed(format!("char value {value} out of range")).with_offset(offset));
        }
    };
    char::from_u32(code).ok_or_else(|| {
        Error::malformed(format!("char value {code:#x} is not a unicode scalar value")).with_offset(offset)
    })
}

fn check_range_args(ordinal: usize, field_offset: i64, length: i32) -> Result<(), Error> {
    if field_offset < 0 {
        return Err(Error::new(ErrorKind::InvalidOperation)
            .with_message(format!("field offset {field_offset} is negative"))
            .with_ordinal(ordinal));
    }
    if length < 0 {
        return Err(Error::new(ErrorKind::IndexOutOfRange)
            .with_message(format!("length {length} is negative"))
            .with_ordinal(ordinal));
    }
    Ok(())
}

fn copy_range<T: Copy>(
    source: &[T],
    field_offset: i64,
    destination: Option<&mut [T]>,
    buffer_offset: i32,
    length: i32,
) -> Result<i64, Error> {
    let Some(destination) = destination else {
        return Ok(source.len() as i64);
    };
    let buffer_offset = usize::try_from(buffer_offset)
        .ok()
        .filter(|offset| *offset < destination.len())
        .ok_or_else(|| {
            Error::new(ErrorKind::IndexOutOfRange).with_message(format!(
                "buffer offset {buffer_offset} is outside a destination of length {}",
                destination.len()
            ))
        })?;
    let start = match usize::try_from(field_offset) {
        Ok(start) if start < source.len() => start,
        _ => return Ok(0),
    };
    let count = (length as usize).min(source.len() - start);
    if count + buffer_offset > destination.len() {
        return Err(Error::new(ErrorKind::IndexOutOfRange).with_message(format!(
            "copying {count} elements at offset {buffer_offset} overruns a destination of length {}",
            destination.len()
        )));
    }
    destination[buffer_offset..buffer_offset + count].copy_from_slice(&source[start..start + count]);
    Ok(count as i64)
}
