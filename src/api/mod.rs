//! Purpose: Define the stable public Rust API boundary for tabwire.
//! Exports: `serialize`, `deserialize`, cursor and value types.
//! Role: Public, additive-only surface; hides wire-level modules.
//! Invariants: This module is the only public path most callers need.
//! Invariants: `serialize` drains the source; `deserialize` reads lazily.
use std::io::{Read, Write};

pub use crate::core::catalog::{kind_of, LogicalKind, RuntimeType};
pub use crate::core::column::{
    ColumnDescriptor, SchemaColumn, SchemaTable, SCHEMA_TABLE_NAME, UNKNOWN_COLUMN_SIZE,
};
#[doc(hidden)]
pub use crate::core::error::to_exit_code;
pub use crate::core::error::{Error, ErrorKind};
pub use crate::core::memory::{MemoryResult, MemorySource};
pub use crate::core::reader::{ReaderOptions, StreamReader};
pub use crate::core::source::TabularSource;
pub use crate::core::value::{Decimal, Value};
pub use crate::core::writer::{write_stream, WriterOptions};

/// Writes every result of `source` to `sink` and returns the flushed sink.
pub fn serialize<W, S>(sink: W, source: &mut S) -> Result<W, Error>
where
    W: Write,
    S: TabularSource + ?Sized,
{
    write_stream(sink, source, &WriterOptions::default())
}

/// Opens a stream; the header and first column list are parsed eagerly.
pub fn deserialize<R: Read>(source: R) -> Result<StreamReader<R>, Error> {
    StreamReader::new(source, &ReaderOptions::default())
}

pub fn deserialize_with<R: Read>(
    source: R,
    options: &ReaderOptions,
) -> Result<StreamReader<R>, Error> {
    StreamReader::new(source, options)
}
