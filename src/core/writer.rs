//! Purpose: Drain a tabular cursor into a version 1 stream.
//! Exports: `WriterOptions`, `write_stream`.
//! Role: Backs `api::serialize`; single pass over every result and row.
//! Invariants: Column descriptors for a result are derived before any of it is written.
//! Invariants: Null values are written as absent fields; every other value as its kind's encoding.
use std::io::Write;

use prost::encoding::WireType;

use crate::core::bcl;
use crate::core::catalog::{kind_of, LogicalKind};
use crate::core::column::ColumnDescriptor;
use crate::core::error::{Error, ErrorKind};
use crate::core::frame::{self, DEFAULT_FLUSH_THRESHOLD, STREAM_VERSION};
use crate::core::source::TabularSource;
use crate::core::wire::WireWriter;

#[derive(Clone, Debug)]
pub struct WriterOptions {
    /// Bytes buffered before they are handed to the sink.
    pub flush_threshold: usize,
}

impl Default for WriterOptions {
    fn default() -> Self {
        Self {
            flush_threshold: DEFAULT_FLUSH_THRESHOLD,
        }
    }
}

/// Writes every remaining result of `source` to `sink` and returns the sink.
pub fn write_stream<W, S>(sink: W, source: &mut S, options: &WriterOptions) -> Result<W, Error>
where
    W: Write,
    S: TabularSource + ?Sized,
{
    let mut wire = WireWriter::new(sink, options.flush_threshold.max(1));
    wire.write_tag(frame::VERSION, WireType::Varint);
    wire.write_varint(STREAM_VERSION);
    wire.write_tag(frame::RECORDS_AFFECTED, WireType::Varint);
    wire.write_int32(source.records_affected()?);

    let mut text = String::new();
    let mut result_index = 0usize;
    loop {
        let columns = describe_columns(source)?;
        let result = wire.start_group(frame::RESULT);
        write_columns(&mut wire, &columns)?;

        let records = wire.start_group(frame::RECORDS);
        let mut rows = 0u64;
        while source.read()? {
            let record = wire.start_group(frame::RECORD);
            for column in &columns {
                if source.is_null(column.ordinal())? {
                    continue;
                }
                write_value(&mut wire, source, column, &mut text)?;
            }
            wire.end_group(record)?;
            wire.flush_if_needed()?;
            rows += 1;
            tracing::trace!(result = result_index, row = rows, "wrote row");
        }
        wire.end_group(records)?;
        wire.end_group(result)?;
        tracing::debug!(
            result = result_index,
            columns = columns.len(),
            rows,
            "wrote result"
        );

        result_index += 1;
        if !source.next_result()? {
            break;
        }
    }
    wire.finish()
}

fn describe_columns<S: TabularSource + ?Sized>(source: &S) -> Result<Vec<ColumnDescriptor>, Error> {
    let count = source.field_count()?;
    let mut columns = Vec::with_capacity(count);
    for ordinal in 0..count {
        let name = source.column_name(ordinal)?;
        if name.is_empty() {
            return Err(Error::new(ErrorKind::InvalidOperation)
                .with_message("column name is empty")
                .with_ordinal(ordinal));
        }
        let runtime_type = source.column_type(ordinal)?;
        let kind = kind_of(runtime_type).map_err(|err| err.with_ordinal(ordinal))?;
        frame::value_field(ordinal)?;
        columns.push(ColumnDescriptor::new(name, ordinal, kind));
    }
    Ok(columns)
}

fn write_columns<W: Write>(wire: &mut WireWriter<W>, columns: &[ColumnDescriptor]) -> Result<(), Error> {
    let list = wire.start_group(frame::COLUMNS);
    for column in columns {
        let entry = wire.start_group(frame::COLUMN);
        wire.write_tag(frame::COLUMN_NAME, WireType::LengthDelimited);
        wire.write_str(column.name())?;
        wire.write_tag(frame::COLUMN_KIND, WireType::Varint);
        wire.write_varint(column.kind().tag());
        wire.end_group(entry)?;
    }
    wire.end_group(list)
}

fn write_value<W, S>(
    wire: &mut WireWriter<W>,
    source: &S,
    column: &ColumnDescriptor,
    text: &mut String,
) -> Result<(), Error>
where
    W: Write,
    S: TabularSource + ?Sized,
{
    let ordinal = column.ordinal();
    let field = frame::value_field(ordinal)?;
    match column.kind() {
        LogicalKind::Boolean => {
            let value = source.get_boolean(ordinal)?;
            wire.write_tag(field, WireType::Varint);
            wire.write_varint(u64::from(value));
        }
        LogicalKind::Byte => {
            let value = source.get_byte(ordinal)?;
            wire.write_tag(field, WireType::Varint);
            wire.write_varint(u64::from(value));
        }
        LogicalKind::ByteSequence => {
            let value = source.get_byte_sequence(ordinal)?;
            wire.write_tag(field, WireType::LengthDelimited);
            wire.write_bytes(&value)?;
        }
        LogicalKind::Char => {
            let value = source.get_char(ordinal)?;
            wire.write_tag(field, WireType::Varint);
            match u16::try_from(u32::from(value)) {
                // BMP code points travel as a sign-extended UTF-16 unit.
                Ok(unit) => wire.write_int32(i32::from(unit as i16)),
                Err(_) => wire.write_varint(u64::from(u32::from(value))),
            }
        }
        LogicalKind::CharSequence => {
            let value = source.get_char_sequence(ordinal)?;
            text.clear();
            text.extend(value.iter());
            wire.write_tag(field, WireType::LengthDelimited);
            wire.write_str(text)?;
        }
        LogicalKind::Timestamp => {
            let value = source.get_timestamp(ordinal)?;
            bcl::write_timestamp(wire, field, value)?;
        }
        LogicalKind::FixedPoint => {
            let value = source.get_decimal(ordinal)?;
            bcl::write_decimal(wire, field, value)?;
        }
        LogicalKind::Double => {
            let value = source.get_double(ordinal)?;
            wire.write_tag(field, WireType::SixtyFourBit);
            wire.write_fixed64(value.to_bits());
        }
        LogicalKind::Single => {
            let value = source.get_single(ordinal)?;
            wire.write_tag(field, WireType::ThirtyTwoBit);
            wire.write_fixed32(value.to_bits());
        }
        LogicalKind::Guid => {
            let value = source.get_guid(ordinal)?;
            bcl::write_guid(wire, field, value)?;
        }
        LogicalKind::Int32 => {
            let value = source.get_int32(ordinal)?;
            wire.write_tag(field, WireType::Varint);
            wire.write_int32(value);
        }
        LogicalKind::Int64 => {
            let value = source.get_int64(ordinal)?;
            wire.write_tag(field, WireType::Varint);
            wire.write_int64(value);
        }
        LogicalKind::Int16 => {
            let value = source.get_int16(ordinal)?;
            wire.write_tag(field, WireType::Varint);
            wire.write_int32(i32::from(value));
        }
        LogicalKind::Text => {
            let value = source.get_text(ordinal)?;
            wire.write_tag(field, WireType::LengthDelimited);
            wire.write_str(&value)?;
        }
        LogicalKind::Duration => {
            let value = source.get_duration(ordinal)?;
            bcl::write_duration(wire, field, value)?;
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::{write_stream, WriterOptions};
    use crate::core::catalog::RuntimeType;
    use crate::core::error::ErrorKind;
    use crate::core::memory::{MemoryResult, MemorySource};
    use crate::core::value::Value;

    fn encode(source: &mut MemorySource) -> Vec<u8> {
        write_stream(Vec::new(), source, &WriterOptions::default()).expect("write")
    }

    #[test]
    fn layout_matches_version_one() {
        let result = MemoryResult::new()
            .column::<i32>("a")
            .row(vec![Value::Int32(1)])
            .expect("row");
        let mut source = MemorySource::new(vec![result]).with_records_affected(1);
        let bytes = encode(&mut source);
        let expected = [
            0x08, 0x01, // version 1
            0x10, 0x01, // records affected 1
            0x1B, // result start
            0x0B, // column list start
            0x0B, // column start
            0x0A, 0x01, b'a', // name
            0x10, 0x0B, // kind Int32
            0x0C, // column end
            0x0C, // column list end
            0x0B, // record list start
            0x0B, // record start
            0x08, 0x01, // ordinal 0 = 1
            0x0C, // record end
            0x0C, // record list end
            0x1C, // result end
        ];
        assert_eq!(bytes, expected);
    }

    #[test]
    fn null_values_are_omitted() {
        let result = MemoryResult::new()
            .column::<String>("a")
            .column::<String>("b")
            .row(vec![Value::Null, Value::Null])
            .expect("row");
        let mut source = MemorySource::new(vec![result]);
        let bytes = encode(&mut source);
        // record list holding one record with no fields
        assert!(bytes.windows(4).any(|w| w == [0x0B, 0x0B, 0x0C, 0x0C]));
    }

    #[test]
    fn unsupported_column_type_aborts_before_writing() {
        let result = MemoryResult::new()
            .column::<i32>("ok")
            .column_of("bad", RuntimeType::of::<u64>());
        let mut source = MemorySource::new(vec![result]);
        let mut sink = Vec::new();
        let err = write_stream(&mut sink, &mut source, &WriterOptions::default())
            .expect_err("should fail");
        assert_eq!(err.kind(), ErrorKind::TypeNotSupported);
        assert_eq!(err.ordinal(), Some(1));
        assert!(err.message().expect("message").contains("u64"));
        assert!(sink.is_empty());
    }

    #[test]
    fn empty_column_names_are_rejected() {
        let result = MemoryResult::new().column::<i32>("");
        let mut source = MemorySource::new(vec![result]);
        let err = write_stream(Vec::new(), &mut source, &WriterOptions::default())
            .expect_err("should fail");
        assert_eq!(err.kind(), ErrorKind::InvalidOperation);
    }

    #[test]
    fn small_flush_threshold_still_produces_identical_bytes() {
        let build = || {
            let mut result = MemoryResult::new().column::<String>("t");
            for i in 0..50 {
                result = result.row(vec![Value::Text(format!("row {i}"))]).expect("row");
            }
            MemorySource::new(vec![result])
        };
        let large = encode(&mut build());
        let small = write_stream(Vec::new(), &mut build(), &WriterOptions { flush_threshold: 1 })
            .expect("write");
        assert_eq!(large, small);
    }

    #[test]
    fn sink_failures_surface_as_io() {
        struct Broken;
        impl std::io::Write for Broken {
            fn write(&mut self, _buf: &[u8]) -> std::io::Result<usize> {
                Err(std::io::Error::new(std::io::ErrorKind::BrokenPipe, "closed"))
            }
            fn flush(&mut self) -> std::io::Result<()> {
                Ok(())
            }
        }
        let result = MemoryResult::new().column::<i32>("a");
        let mut source = MemorySource::new(vec![result]);
        let err = write_stream(Broken, &mut source, &WriterOptions::default())
            .err()
            .expect("should fail");
        assert_eq!(err.kind(), ErrorKind::Io);
    }
}
