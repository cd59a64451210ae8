// Cursor contract tests for the stream reader: bounds, lifecycle, copies and metadata.
use std::io::{self, Read};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use tabwire::api::{
    self, ErrorKind, LogicalKind, MemoryResult, MemorySource, ReaderOptions, StreamReader,
    TabularSource, Value, UNKNOWN_COLUMN_SIZE,
};

fn encode(results: Vec<MemoryResult>) -> Vec<u8> {
    api::serialize(Vec::new(), &mut MemorySource::new(results)).expect("serialize")
}

fn people() -> Vec<u8> {
    let result = MemoryResult::new()
        .column::<i32>("id")
        .column::<String>("name")
        .column::<Vec<u8>>("photo")
        .column::<Vec<char>>("initials")
        .row(vec![
            Value::Int32(1),
            Value::from("Ada"),
            Value::ByteSequence(b"bytes min".to_vec()),
            Value::CharSequence(vec!['A', 'L']),
        ])
        .expect("row")
        .row(vec![Value::Int32(2), Value::Null, Value::Null, Value::Null])
        .expect("row");
    encode(vec![result])
}

struct TrackedSource {
    bytes: io::Cursor<Vec<u8>>,
    dropped: Arc<AtomicBool>,
}

impl Read for TrackedSource {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        self.bytes.read(buf)
    }
}

impl Drop for TrackedSource {
    fn drop(&mut self) {
        self.dropped.store(true, Ordering::SeqCst);
    }
}

fn tracked(bytes: Vec<u8>) -> (StreamReader<TrackedSource>, Arc<AtomicBool>) {
    let dropped = Arc::new(AtomicBool::new(false));
    let source = TrackedSource {
        bytes: io::Cursor::new(bytes),
        dropped: Arc::clone(&dropped),
    };
    (api::deserialize(source).expect("deserialize"), dropped)
}

#[test]
fn ordinal_equal_to_field_count_is_out_of_range() {
    let bytes = people();
    let mut reader = api::deserialize(bytes.as_slice()).expect("deserialize");
    assert!(reader.read().expect("read"));
    let count = reader.field_count().expect("count");
    assert_eq!(count, 4);

    let err = reader.get_value(count).expect_err("should fail");
    assert_eq!(err.kind(), ErrorKind::IndexOutOfRange);
    assert_eq!(err.ordinal(), Some(count));
    assert_eq!(reader.get_name(count).expect_err("should fail").kind(), ErrorKind::IndexOutOfRange);
    assert_eq!(reader.is_null(count).expect_err("should fail").kind(), ErrorKind::IndexOutOfRange);
    assert_eq!(
        reader.get_field_type(count).expect_err("should fail").kind(),
        ErrorKind::IndexOutOfRange
    );
    assert!(reader.get_value(count - 1).is_ok());
}

#[test]
fn row_accessors_need_a_loaded_row() {
    let bytes = people();
    let mut reader = api::deserialize(bytes.as_slice()).expect("deserialize");
    let err = reader.get_int32(0).expect_err("before read");
    assert_eq!(err.kind(), ErrorKind::InvalidOperation);
    // Column metadata is available without a row.
    assert_eq!(reader.get_name(1).expect("name"), "name");

    while reader.read().expect("read") {}
    let err = reader.get_int32(0).expect_err("after exhaustion");
    assert_eq!(err.kind(), ErrorKind::InvalidOperation);
}

#[test]
fn exhaustion_is_idempotent() {
    let bytes = people();
    let mut reader = api::deserialize(bytes.as_slice()).expect("deserialize");
    while reader.read().expect("read") {}
    for _ in 0..3 {
        assert!(!reader.read().expect("read"));
    }
    for _ in 0..3 {
        assert!(!reader.next_result().expect("next"));
        assert!(!reader.read().expect("read"));
    }
    assert!(!reader.has_result());
    assert_eq!(reader.field_count().expect("count"), 0);
}

#[test]
fn next_result_discards_unread_rows() {
    let mut first = MemoryResult::new().column::<i64>("n");
    for n in 0..50 {
        first = first.row(vec![Value::Int64(n)]).expect("row");
    }
    let second = MemoryResult::new()
        .column::<bool>("flag")
        .row(vec![Value::Boolean(true)])
        .expect("row");
    let bytes = encode(vec![first, second]);

    let mut reader = api::deserialize(bytes.as_slice()).expect("deserialize");
    assert!(reader.read().expect("read"));
    assert_eq!(reader.get_int64(0).expect("n"), 0);
    assert!(reader.next_result().expect("next"));
    assert_eq!(reader.get_kind(0).expect("kind"), LogicalKind::Boolean);
    assert!(reader.read().expect("read"));
    assert!(reader.get_boolean(0).expect("flag"));
}

#[test]
fn null_cells_read_as_null_and_refuse_typed_access() {
    let bytes = people();
    let mut reader = api::deserialize(bytes.as_slice()).expect("deserialize");
    assert!(reader.read().expect("read"));
    assert!(reader.read().expect("read"));
    assert!(!reader.is_null(0).expect("id"));
    for ordinal in 1..4 {
        assert!(reader.is_null(ordinal).expect("null"));
        assert_eq!(reader.get_value(ordinal).expect("value"), Value::Null);
    }
    assert_eq!(reader.get_text(1).expect_err("should fail").kind(), ErrorKind::InvalidCast);
    assert_eq!(
        reader.get_bytes(2, 0, None, 0, 0).expect_err("should fail").kind(),
        ErrorKind::InvalidCast
    );
}

#[test]
fn mismatched_accessors_widen_or_fail() {
    let result = MemoryResult::new()
        .column::<i16>("small")
        .column::<f32>("single")
        .column::<char>("letter")
        .row(vec![Value::Int16(-7), Value::Single(0.5), Value::Char('q')])
        .expect("row");
    let bytes = encode(vec![result]);
    let mut reader = api::deserialize(bytes.as_slice()).expect("deserialize");
    assert!(reader.read().expect("read"));

    assert_eq!(reader.get_int32(0).expect("widen"), -7);
    assert_eq!(reader.get_int64(0).expect("widen"), -7);
    assert_eq!(reader.get_double(1).expect("widen"), 0.5);
    assert_eq!(reader.get_text(2).expect("char as text"), "q");

    assert_eq!(reader.get_byte(0).expect_err("narrow").kind(), ErrorKind::InvalidCast);
    assert_eq!(reader.get_guid(1).expect_err("unrelated").kind(), ErrorKind::InvalidCast);
    let err = reader.get_boolean(2).expect_err("unrelated");
    assert_eq!(err.kind(), ErrorKind::InvalidCast);
    assert!(err.message().expect("message").contains("Char"));
}

#[test]
fn get_bytes_length_and_copy() {
    let bytes = people();
    let mut reader = api::deserialize(bytes.as_slice()).expect("deserialize");
    assert!(reader.read().expect("read"));

    assert_eq!(reader.get_bytes(2, 0, None, 0, 0).expect("length"), 9);
    // A length query ignores offsets that would be invalid for a copy.
    assert_eq!(reader.get_bytes(2, 100, None, -5, 0).expect("length"), 9);

    let mut buffer = [0u8; 12];
    assert_eq!(reader.get_bytes(2, 6, Some(&mut buffer[..]), 3, 100).expect("tail"), 3);
    assert_eq!(&buffer[3..6], b"min");
    assert_eq!(buffer[..3], [0, 0, 0]);

    let err = reader.get_bytes(2, -1, Some(&mut buffer[..]), 0, 1).expect_err("should fail");
    assert_eq!(err.kind(), ErrorKind::InvalidOperation);
    let err = reader.get_bytes(2, 0, Some(&mut buffer[..]), 0, -1).expect_err("should fail");
    assert_eq!(err.kind(), ErrorKind::IndexOutOfRange);
    let err = reader.get_bytes(2, 0, Some(&mut buffer[..]), 12, 1).expect_err("should fail");
    assert_eq!(err.kind(), ErrorKind::IndexOutOfRange);
    let err = reader.get_bytes(2, 0, Some(&mut buffer[..]), 4, 9).expect_err("should fail");
    assert_eq!(err.kind(), ErrorKind::IndexOutOfRange);
}

#[test]
fn get_bytes_checks_in_order() {
    let bytes = people();
    let mut reader = api::deserialize(bytes.as_slice()).expect("deserialize");
    assert!(reader.read().expect("read"));
    let mut buffer = [0u8; 4];

    // A bad ordinal wins over a bad offset.
    let err = reader.get_bytes(9, -1, Some(&mut buffer[..]), 0, 1).expect_err("should fail");
    assert_eq!(err.kind(), ErrorKind::IndexOutOfRange);
    assert_eq!(err.ordinal(), Some(9));
    // A negative field offset wins over a negative length.
    let err = reader.get_bytes(2, -1, Some(&mut buffer[..]), 0, -1).expect_err("should fail");
    assert_eq!(err.kind(), ErrorKind::InvalidOperation);
    // A negative length wins over a wrong kind.
    let err = reader.get_bytes(0, 0, Some(&mut buffer[..]), 0, -1).expect_err("should fail");
    assert_eq!(err.kind(), ErrorKind::IndexOutOfRange);
    let err = reader.get_bytes(0, 0, Some(&mut buffer[..]), 0, 1).expect_err("should fail");
    assert_eq!(err.kind(), ErrorKind::InvalidCast);
}

#[test]
fn get_chars_mirrors_get_bytes() {
    let bytes = people();
    let mut reader = api::deserialize(bytes.as_slice()).expect("deserialize");
    assert!(reader.read().expect("read"));

    assert_eq!(reader.get_chars(3, 0, None, 0, 0).expect("length"), 2);
    let mut buffer = ['-'; 3];
    assert_eq!(reader.get_chars(3, 0, Some(&mut buffer[..]), 1, 2).expect("copy"), 2);
    assert_eq!(buffer, ['-', 'A', 'L']);
    assert_eq!(reader.get_chars(3, 2, Some(&mut buffer[..]), 0, 1).expect("past end"), 0);

    // Text columns are readable as characters too.
    assert_eq!(reader.get_chars(1, 1, Some(&mut buffer[..]), 0, 3).expect("text"), 2);
    assert_eq!(buffer[..2], ['d', 'a']);
}

#[test]
fn get_values_fills_what_fits() {
    let bytes = people();
    let mut reader = api::deserialize(bytes.as_slice()).expect("deserialize");
    assert!(reader.read().expect("read"));

    let err = reader.get_values(None).expect_err("should fail");
    assert_eq!(err.kind(), ErrorKind::ArgumentMissing);

    let mut short = vec![Value::Null; 2];
    assert_eq!(reader.get_values(Some(short.as_mut_slice())).expect("short"), 2);
    assert_eq!(short, vec![Value::Int32(1), Value::from("Ada")]);

    let mut long = vec![Value::Boolean(false); 6];
    assert_eq!(reader.get_values(Some(long.as_mut_slice())).expect("long"), 4);
    assert_eq!(long[3], Value::CharSequence(vec!['A', 'L']));
    assert_eq!(long[4], Value::Boolean(false));
}

#[test]
fn names_resolve_to_ordinals() {
    let bytes = people();
    let mut reader = api::deserialize(bytes.as_slice()).expect("deserialize");
    assert_eq!(reader.get_ordinal("photo").expect("ordinal"), 2);
    let err = reader.get_ordinal("NAME").expect_err("exact match only");
    assert_eq!(err.kind(), ErrorKind::IndexOutOfRange);
    let err = reader.get_ordinal("missing").expect_err("should fail");
    assert_eq!(err.kind(), ErrorKind::IndexOutOfRange);
    assert!(err.message().expect("message").contains("missing"));

    assert!(reader.read().expect("read"));
    assert_eq!(reader.value_by_name("id").expect("value"), Value::Int32(1));
    assert_eq!(reader.get_data_type_name(3).expect("type name"), "CharSequence");
}

#[test]
fn schema_table_describes_and_caches() {
    let bytes = people();
    let mut reader = api::deserialize(bytes.as_slice()).expect("deserialize");
    let first = reader.schema_table().expect("schema").clone();
    assert_eq!(first.table_name, "SchemaTable");
    assert_eq!(first.len(), 4);
    let column = &first.columns[1];
    assert_eq!(column.column_name, "name");
    assert_eq!(column.column_ordinal, 1);
    assert_eq!(column.column_size, UNKNOWN_COLUMN_SIZE);
    assert_eq!(column.data_type_name, "Text");

    let again = reader.schema_table().expect("schema");
    assert_eq!(again, &first);
    assert_eq!(reader.depth().expect("depth"), 0);
}

#[test]
fn close_releases_the_source() {
    let (mut reader, dropped) = tracked(people());
    assert!(reader.read().expect("read"));
    assert!(!dropped.load(Ordering::SeqCst));

    reader.close();
    assert!(dropped.load(Ordering::SeqCst));
    assert!(reader.is_closed());
    reader.close();

    assert_eq!(reader.read().expect_err("should fail").kind(), ErrorKind::ClosedReader);
    assert_eq!(reader.next_result().expect_err("should fail").kind(), ErrorKind::ClosedReader);
    assert_eq!(reader.field_count().expect_err("should fail").kind(), ErrorKind::ClosedReader);
    assert_eq!(reader.get_int32(0).expect_err("should fail").kind(), ErrorKind::ClosedReader);
    assert_eq!(reader.depth().expect_err("should fail").kind(), ErrorKind::ClosedReader);
    assert_eq!(
        reader.records_affected().expect_err("should fail").kind(),
        ErrorKind::ClosedReader
    );
    assert!(!reader.has_result());
}

#[test]
fn dispose_is_reported_after_close() {
    let (mut reader, dropped) = tracked(people());
    reader.dispose();
    assert!(dropped.load(Ordering::SeqCst));
    assert!(reader.is_closed());
    assert!(reader.is_disposed());
    reader.dispose();

    assert_eq!(reader.read().expect_err("should fail").kind(), ErrorKind::DisposedReader);
    assert_eq!(reader.get_name(0).expect_err("should fail").kind(), ErrorKind::DisposedReader);
    assert_eq!(
        reader.schema_table().expect_err("should fail").kind(),
        ErrorKind::DisposedReader
    );
    assert_eq!(reader.depth().expect_err("should fail").kind(), ErrorKind::DisposedReader);
    assert_eq!(
        reader.records_affected().expect_err("should fail").kind(),
        ErrorKind::DisposedReader
    );
    assert!(reader.columns().is_empty());
}

#[test]
fn dropping_the_reader_releases_the_source() {
    let (reader, dropped) = tracked(people());
    drop(reader);
    assert!(dropped.load(Ordering::SeqCst));
}

#[test]
fn field_length_cap_rejects_larger_payloads() {
    let result = MemoryResult::new()
        .column::<Vec<u8>>("blob")
        .row(vec![Value::ByteSequence(vec![0xAB; 64])])
        .expect("row");
    let bytes = encode(vec![result]);

    let options = ReaderOptions { max_field_len: 16 };
    let mut reader = api::deserialize_with(bytes.as_slice(), &options).expect("deserialize");
    assert_eq!(reader.column_name(0).expect("name"), "blob");
    let err = reader.read().expect_err("should fail");
    assert_eq!(err.kind(), ErrorKind::MalformedStream);
    assert_eq!(err.ordinal(), Some(0));

    let options = ReaderOptions { max_field_len: 64 };
    let mut reader = api::deserialize_with(bytes.as_slice(), &options).expect("deserialize");
    assert!(reader.read().expect("read"));
    assert_eq!(reader.get_byte_sequence(0).expect("blob").len(), 64);
}

#[test]
fn truncated_stream_is_malformed() {
    let bytes = people();
    let truncated = &bytes[..bytes.len() - 6];
    let mut reader = api::deserialize(truncated).expect("header survives");
    let mut outcome = Ok(true);
    while let Ok(true) = outcome {
        outcome = reader.read();
    }
    let err = match outcome {
        Ok(_) => reader.next_result().expect_err("should fail"),
        Err(err) => err,
    };
    assert_eq!(err.kind(), ErrorKind::MalformedStream);
}
