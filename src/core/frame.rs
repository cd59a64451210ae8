// Stream layout: field numbers, stream version, and size limits shared by writer and reader.
use crate::core::error::{Error, ErrorKind};

pub const STREAM_VERSION: u64 = 1;
pub const MAX_FIELD_LEN_ABS: usize = 256 * 1024 * 1024;
pub const DEFAULT_FLUSH_THRESHOLD: usize = 8 * 1024;
pub const MAX_NESTING_DEPTH: usize = 100;

/// Top-level fields.
pub const VERSION: u32 = 1;
pub const RECORDS_AFFECTED: u32 = 2;
pub const RESULT: u32 = 3;

/// Fields inside a result group. The column list and the record list share
/// field 1 and are distinguished by position.
pub const COLUMNS: u32 = 1;
pub const RECORDS: u32 = 1;

/// Fields inside the column list and a column entry.
pub const COLUMN: u32 = 1;
pub const COLUMN_NAME: u32 = 1;
pub const COLUMN_KIND: u32 = 2;

/// Field inside the record list.
pub const RECORD: u32 = 1;

/// Field number carrying the value of the column at `ordinal` inside a record.
pub fn value_field(ordinal: usize) -> Result<u32, Error> {
    u32::try_from(ordinal)
        .ok()
        .and_then(|ordinal| ordinal.checked_add(1))
        .filter(|field| *field <= prost::encoding::MAX_TAG)
        .ok_or_else(|| {
            Error::new(ErrorKind::Overflow)
                .with_message("column ordinal exceeds the largest field number")
                .with_ordinal(ordinal)
        })
}

/// Inverse of [`value_field`]; `field` is never 0 once a tag has been read.
pub fn ordinal_of(field: u32) -> usize {
    (field as usize).saturating_sub(1)
}
