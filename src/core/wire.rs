//! Purpose: Streaming tag/length/value primitives over `std::io` sinks and sources.
//! Exports: `WireWriter`, `WireReader`, `WriteGroup`, `ReadGroup`.
//! Role: The only module that touches raw bytes; writer and reader speak fields and groups.
//! Invariants: Keys and varints are protobuf-compatible (`prost::encoding`).
//! Invariants: Groups are balanced; a token closes exactly the group that produced it.
//! Invariants: Length-delimited payloads are capped by `max_field_len` before allocation.
use std::io::{self, BufRead, BufReader, Read, Write};

use prost::encoding::{self, WireType};

use crate::core::error::{Error, ErrorKind};
use crate::core::frame::MAX_NESTING_DEPTH;

const MAX_VARINT_LEN: usize = 10;

/// Open group handle returned by [`WireWriter::start_group`].
#[must_use]
#[derive(Debug)]
pub struct WriteGroup {
    field: u32,
    depth: usize,
}

pub struct WireWriter<W: Write> {
    sink: W,
    scratch: Vec<u8>,
    flush_threshold: usize,
    open_groups: usize,
}

impl<W: Write> WireWriter<W> {
    pub fn new(sink: W, flush_threshold: usize) -> Self {
        Self {
            sink,
            scratch: Vec::with_capacity(flush_threshold.min(64 * 1024)),
            flush_threshold,
            open_groups: 0,
        }
    }

    pub fn write_tag(&mut self, field: u32, wire_type: WireType) {
        encoding::encode_key(field, wire_type, &mut self.scratch);
    }

    pub fn write_varint(&mut self, value: u64) {
        encoding::encode_varint(value, &mut self.scratch);
    }

    /// Negative values are sign-extended to ten bytes, as protobuf `int32` is.
    pub fn write_int32(&mut self, value: i32) {
        self.write_varint(i64::from(value) as u64);
    }

    pub fn write_int64(&mut self, value: i64) {
        self.write_varint(value as u64);
    }

    pub fn write_sint64(&mut self, value: i64) {
        self.write_varint(((value << 1) ^ (value >> 63)) as u64);
    }

    pub fn write_fixed32(&mut self, value: u32) {
        self.scratch.extend_from_slice(&value.to_le_bytes());
    }

    pub fn write_fixed64(&mut self, value: u64) {
        self.scratch.extend_from_slice(&value.to_le_bytes());
    }

    pub fn write_bytes(&mut self, bytes: &[u8]) -> Result<(), Error> {
        self.write_varint(bytes.len() as u64);
        if bytes.len() >= self.flush_threshold {
            // Large payloads bypass the scratch buffer.
            self.flush_scratch()?;
            return self.sink.write_all(bytes).map_err(Error::io);
        }
        self.scratch.extend_from_slice(bytes);
        Ok(())
    }

    pub fn write_str(&mut self, value: &str) -> Result<(), Error> {
        self.write_bytes(value.as_bytes())
    }

    pub fn start_group(&mut self, field: u32) -> WriteGroup {
        self.write_tag(field, WireType::StartGroup);
        self.open_groups += 1;
        WriteGroup {
            field,
            depth: self.open_groups,
        }
    }

    pub fn end_group(&mut self, group: WriteGroup) -> Result<(), Error> {
        if group.depth != self.open_groups {
            return Err(Error::new(ErrorKind::InvalidOperation).with_message(format!(
                "group {} closed at depth {} while depth {} is open",
                group.field, group.depth, self.open_groups
            )));
        }
        self.write_tag(group.field, WireType::EndGroup);
        self.open_groups -= 1;
        Ok(())
    }

    /// Hands buffered bytes to the sink once the scratch buffer passes the threshold.
    pub fn flush_if_needed(&mut self) -> Result<(), Error> {
        if self.scratch.len() >= self.flush_threshold {
            self.flush_scratch()?;
        }
        Ok(())
    }

    pub fn finish(mut self) -> Result<W, Error> {
        if self.open_groups != 0 {
            return Err(Error::new(ErrorKind::InvalidOperation)
                .with_message(format!("{} group(s) left open", self.open_groups)));
        }
        self.flush_scratch()?;
        self.sink.flush().map_err(Error::io)?;
        Ok(self.sink)
    }

    fn flush_scratch(&mut self) -> Result<(), Error> {
        if self.scratch.is_empty() {
            return Ok(());
        }
        self.sink.write_all(&self.scratch).map_err(Error::io)?;
        self.scratch.clear();
        Ok(())
    }
}

/// Open nested structure handle returned by [`WireReader::start_group`].
#[must_use]
#[derive(Debug)]
pub struct ReadGroup {
    depth: usize,
}

#[derive(Clone, Copy, Debug)]
enum FrameEnd {
    /// Terminated by an end-group key with this field number.
    Group(u32),
    /// Terminated at this absolute byte position.
    Limit(u64),
}

#[derive(Debug)]
struct Frame {
    end: FrameEnd,
    closed: bool,
}

pub struct WireReader<R: Read> {
    source: BufReader<R>,
    position: u64,
    field: u32,
    wire_type: Option<WireType>,
    frames: Vec<Frame>,
    max_field_len: usize,
}

impl<R: Read> WireReader<R> {
    pub fn new(source: R, max_field_len: usize) -> Self {
        Self {
            source: BufReader::new(source),
            position: 0,
            field: 0,
            wire_type: None,
            frames: Vec::new(),
            max_field_len,
        }
    }

    /// Byte offset of the next unread byte.
    pub fn position(&self) -> u64 {
        self.position
    }

    pub fn wire_type(&self) -> Option<WireType> {
        self.wire_type
    }

    /// Reads the next key and returns its field number. Returns 0 at the end of
    /// the enclosing group (or at end of input at the top level); repeated calls
    /// at that point keep returning 0.
    pub fn read_field(&mut self) -> Result<u32, Error> {
        if let Some(frame) = self.frames.last_mut() {
            if frame.closed {
                self.wire_type = None;
                return Ok(0);
            }
            if let FrameEnd::Limit(end) = frame.end {
                if self.position > end {
                    return Err(Error::malformed("nested structure overran its length")
                        .with_offset(self.position));
                }
                if self.position == end {
                    frame.closed = true;
                    self.wire_type = None;
                    return Ok(0);
                }
            }
        }

        let start = self.position;
        let Some(key) = self.read_varint_raw()? else {
            if self.frames.is_empty() {
                self.wire_type = None;
                return Ok(0);
            }
            return Err(Error::malformed("unexpected end of stream inside nested structure")
                .with_offset(start));
        };
        let key = u32::try_from(key)
            .map_err(|_| Error::malformed(format!("invalid key {key}")).with_offset(start))?;
        let wire_type = WireType::try_from(u64::from(key & 0x7)).map_err(|err| {
            Error::malformed(format!("invalid wire type {}", key & 0x7))
                .with_offset(start)
                .with_source(err)
        })?;
        let field = key >> 3;
        if field == 0 {
            return Err(Error::malformed("field number 0 is reserved").with_offset(start));
        }

        if wire_type == WireType::EndGroup {
            return match self.frames.last_mut() {
                Some(Frame {
                    end: FrameEnd::Group(open),
                    closed,
                }) if *open == field => {
                    *closed = true;
                    self.wire_type = None;
                    Ok(0)
                }
                Some(Frame {
                    end: FrameEnd::Group(open),
                    ..
                }) => Err(Error::malformed(format!(
                    "end of group {field} found while group {open} is open"
                ))
                .with_offset(start)),
                _ => Err(Error::malformed(format!("unexpected end of group {field}"))
                    .with_offset(start)),
            };
        }

        self.field = field;
        self.wire_type = Some(wire_type);
        Ok(field)
    }

    /// Enters the nested structure whose key was just read. Accepts both group
    /// framing and a length-delimited sub-message.
    pub fn start_group(&mut self) -> Result<ReadGroup, Error> {
        if self.frames.len() >= MAX_NESTING_DEPTH {
            return Err(Error::malformed(format!(
                "nesting deeper than {MAX_NESTING_DEPTH} levels"
            ))
            .with_offset(self.position));
        }
        let end = match self.wire_type {
            Some(WireType::StartGroup) => FrameEnd::Group(self.field),
            Some(WireType::LengthDelimited) => {
                let len = self.read_len()?;
                FrameEnd::Limit(self.position + len as u64)
            }
            other => {
                return Err(Error::malformed(format!(
                    "expected nested structure for field {}, found {other:?}",
                    self.field
                ))
                .with_offset(self.position));
            }
        };
        self.frames.push(Frame { end, closed: false });
        self.wire_type = None;
        Ok(ReadGroup {
            depth: self.frames.len(),
        })
    }

    /// Leaves a nested structure, skipping any fields that were not read.
    pub fn end_group(&mut self, group: ReadGroup) -> Result<(), Error> {
        if group.depth != self.frames.len() {
            return Err(Error::new(ErrorKind::InvalidOperation).with_message(format!(
                "nested structure closed at depth {} while depth {} is open",
                group.depth,
                self.frames.len()
            )));
        }
        loop {
            let field = self.read_field()?;
            if field == 0 {
                break;
            }
            tracing::debug!(field, offset = self.position, "skipping unknown field");
            self.skip_field()?;
        }
        self.frames.pop();
        self.wire_type = None;
        Ok(())
    }

    pub fn skip_field(&mut self) -> Result<(), Error> {
        match self.wire_type {
            Some(WireType::Varint) => {
                self.read_varint()?;
            }
            Some(WireType::SixtyFourBit) => self.skip_bytes(8)?,
            Some(WireType::ThirtyTwoBit) => self.skip_bytes(4)?,
            Some(WireType::LengthDelimited) => {
                let len = self.read_len()?;
                self.skip_bytes(len as u64)?;
            }
            Some(WireType::StartGroup) => {
                let group = self.start_group()?;
                self.end_group(group)?;
            }
            Some(WireType::EndGroup) | None => {
                return Err(Error::new(ErrorKind::InvalidOperation)
                    .with_message("no field is pending to skip"));
            }
        }
        self.wire_type = None;
        Ok(())
    }

    pub fn expect_wire_type(&self, expected: WireType) -> Result<(), Error> {
        if self.wire_type == Some(expected) {
            return Ok(());
        }
        Err(Error::malformed(format!(
            "field {} expected wire type {expected:?}, found {:?}",
            self.field, self.wire_type
        ))
        .with_offset(self.position))
    }

    pub fn read_uint64(&mut self) -> Result<u64, Error> {
        self.expect_wire_type(WireType::Varint)?;
        self.read_varint()
    }

    pub fn read_uint32(&mut self) -> Result<u32, Error> {
        let start = self.position;
        let value = self.read_uint64()?;
        u32::try_from(value).map_err(|_| {
            Error::malformed(format!("varint {value} does not fit in 32 bits")).with_offset(start)
        })
    }

    /// Truncates to the low 32 bits, as protobuf `int32` decoding does.
    pub fn read_int32(&mut self) -> Result<i32, Error> {
        Ok(self.read_uint64()? as i32)
    }

    pub fn read_int64(&mut self) -> Result<i64, Error> {
        Ok(self.read_uint64()? as i64)
    }

    pub fn read_sint64(&mut self) -> Result<i64, Error> {
        let value = self.read_uint64()?;
        Ok(((value >> 1) as i64) ^ -((value & 1) as i64))
    }

    pub fn read_bool(&mut self) -> Result<bool, Error> {
        let start = self.position;
        match self.read_uint64()? {
            0 => Ok(false),
            1 => Ok(true),
            other => Err(Error::malformed(format!("invalid boolean value {other}"))
                .with_offset(start)),
        }
    }

    pub fn read_fixed32(&mut self) -> Result<u32, Error> {
        self.expect_wire_type(WireType::ThirtyTwoBit)?;
        let mut buf = [0u8; 4];
        self.read_exact(&mut buf)?;
        Ok(u32::from_le_bytes(buf))
    }

    pub fn read_fixed64(&mut self) -> Result<u64, Error> {
        self.expect_wire_type(WireType::SixtyFourBit)?;
        let mut buf = [0u8; 8];
        self.read_exact(&mut buf)?;
        Ok(u64::from_le_bytes(buf))
    }

    pub fn read_double(&mut self) -> Result<f64, Error> {
        Ok(f64::from_bits(self.read_fixed64()?))
    }

    pub fn read_float(&mut self) -> Result<f32, Error> {
        Ok(f32::from_bits(self.read_fixed32()?))
    }

    /// Replaces the contents of `out`, reusing its allocation.
    pub fn read_bytes_into(&mut self, out: &mut Vec<u8>) -> Result<(), Error> {
        self.expect_wire_type(WireType::LengthDelimited)?;
        let len = self.read_len()?;
        out.clear();
        let read = (&mut self.source)
            .take(len as u64)
            .read_to_end(out)
            .map_err(Error::from_io)?;
        self.position += read as u64;
        if read != len {
            return Err(Error::malformed(format!(
                "length-delimited field truncated: expected {len} bytes, found {read}"
            ))
            .with_offset(self.position));
        }
        Ok(())
    }

    /// Replaces the contents of `out` with UTF-8 text, reusing its allocation.
    pub fn read_string_into(&mut self, out: &mut String) -> Result<(), Error> {
        let start = self.position;
        let mut bytes = std::mem::take(out).into_bytes();
        self.read_bytes_into(&mut bytes)?;
        *out = String::from_utf8(bytes).map_err(|err| {
            Error::malformed("text is not valid utf-8")
                .with_offset(start)
                .with_source(err)
        })?;
        Ok(())
    }

    pub fn read_string(&mut self) -> Result<String, Error> {
        let mut out = String::new();
        self.read_string_into(&mut out)?;
        Ok(out)
    }

    fn read_len(&mut self) -> Result<usize, Error> {
        let start = self.position;
        let len = self.read_varint()?;
        match usize::try_from(len) {
            Ok(len) if len <= self.max_field_len => Ok(len),
            _ => Err(Error::malformed(format!(
                "length-delimited field of {len} bytes exceeds the {} byte limit",
                self.max_field_len
            ))
            .with_offset(start)),
        }
    }

    fn read_varint(&mut self) -> Result<u64, Error> {
        let start = self.position;
        self.read_varint_raw()?
            .ok_or_else(|| Error::malformed("unexpected end of stream").with_offset(start))
    }

    /// `None` when input ends before the first byte.
    fn read_varint_raw(&mut self) -> Result<Option<u64>, Error> {
        let start = self.position;
        let mut bytes = [0u8; MAX_VARINT_LEN];
        let mut len = 0;
        loop {
            let Some(byte) = self.read_byte()? else {
                if len == 0 {
                    return Ok(None);
                }
                return Err(Error::malformed("truncated varint").with_offset(start));
            };
            if len == MAX_VARINT_LEN {
                return Err(Error::malformed("varint longer than 10 bytes").with_offset(start));
            }
            bytes[len] = byte;
            len += 1;
            if byte & 0x80 == 0 {
                break;
            }
        }
        let mut buf = &bytes[..len];
        encoding::decode_varint(&mut buf).map(Some).map_err(|err| {
            Error::malformed("invalid varint")
                .with_offset(start)
                .with_source(err)
        })
    }

    fn read_byte(&mut self) -> Result<Option<u8>, Error> {
        let byte = {
            let buf = self.source.fill_buf().map_err(Error::from_io)?;
            match buf.first() {
                Some(byte) => *byte,
                None => return Ok(None),
            }
        };
        self.source.consume(1);
        self.position += 1;
        Ok(Some(byte))
    }

    fn read_exact(&mut self, buf: &mut [u8]) -> Result<(), Error> {
        let start = self.position;
        self.source
            .read_exact(buf)
            .map_err(|err| Error::from_io(err).with_offset(start))?;
        self.position += buf.len() as u64;
        Ok(())
    }

    fn skip_bytes(&mut self, len: u64) -> Result<(), Error> {
        let start = self.position;
        let skipped = io::copy(&mut (&mut self.source).take(len), &mut io::sink())
            .map_err(Error::from_io)?;
        self.position += skipped;
        if skipped != len {
            return Err(Error::malformed(format!(
                "field truncated: expected {len} bytes, found {skipped}"
            ))
            .with_offset(start));
        }
        Ok(())
    }
}
