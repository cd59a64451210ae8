//! Purpose: Nested encodings for timestamps, durations, decimals, and guids.
//! Exports: `write_timestamp`, `read_timestamp`, `write_duration`, `read_duration`,
//! `write_decimal`, `read_decimal`, `write_guid`, `read_guid`.
//! Role: Value codecs for the four kinds that do not fit a single scalar field.
//! Invariants: Writers emit group framing; readers accept group or length-delimited framing.
//! Invariants: Zero-valued inner fields are omitted on write and default to zero on read.
use std::io::{Read, Write};

use prost::encoding::WireType;
use time::{Duration, OffsetDateTime, PrimitiveDateTime, UtcOffset};
use uuid::Uuid;

use crate::core::error::{Error, ErrorKind};
use crate::core::value::Decimal;
use crate::core::wire::{WireReader, WireWriter};

const TICKS_PER_MILLISECOND: i64 = 10_000;
const TICKS_PER_SECOND: i64 = 1_000 * TICKS_PER_MILLISECOND;
const TICKS_PER_MINUTE: i64 = 60 * TICKS_PER_SECOND;
const TICKS_PER_HOUR: i64 = 60 * TICKS_PER_MINUTE;
const TICKS_PER_DAY: i64 = 24 * TICKS_PER_HOUR;
const NANOS_PER_TICK: i128 = 100;

const SPAN_VALUE: u32 = 1;
const SPAN_SCALE: u32 = 2;

const DECIMAL_LO: u32 = 1;
const DECIMAL_HI: u32 = 2;
const DECIMAL_SIGN_SCALE: u32 = 3;

const GUID_LO: u32 = 1;
const GUID_HI: u32 = 2;

pub const MAX_TIMESTAMP: OffsetDateTime = PrimitiveDateTime::MAX.assume_utc();
pub const MIN_TIMESTAMP: OffsetDateTime = PrimitiveDateTime::MIN.assume_utc();

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
enum Scale {
    Days,
    Hours,
    Minutes,
    Seconds,
    Milliseconds,
    Ticks,
    MinMax,
}

impl Scale {
    fn code(self) -> u64 {
        match self {
            Scale::Days => 0,
            Scale::Hours => 1,
            Scale::Minutes => 2,
            Scale::Seconds => 3,
            Scale::Milliseconds => 4,
            Scale::Ticks => 5,
            Scale::MinMax => 15,
        }
    }

    fn from_code(code: u64) -> Result<Self, Error> {
        Ok(match code {
            0 => Scale::Days,
            1 => Scale::Hours,
            2 => Scale::Minutes,
            3 => Scale::Seconds,
            4 => Scale::Milliseconds,
            5 => Scale::Ticks,
            15 => Scale::MinMax,
            other => return Err(Error::malformed(format!("unknown time scale {other}"))),
        })
    }

    fn ticks(self) -> i64 {
        match self {
            Scale::Days => TICKS_PER_DAY,
            Scale::Hours => TICKS_PER_HOUR,
            Scale::Minutes => TICKS_PER_MINUTE,
            Scale::Seconds => TICKS_PER_SECOND,
            Scale::Milliseconds => TICKS_PER_MILLISECOND,
            Scale::Ticks | Scale::MinMax => 1,
        }
    }
}

/// Coarsest scale that represents `ticks` exactly.
fn coarsest(ticks: i64) -> (i64, Scale) {
    for scale in [
        Scale::Days,
        Scale::Hours,
        Scale::Minutes,
        Scale::Seconds,
        Scale::Milliseconds,
    ] {
        if ticks % scale.ticks() == 0 {
            return (ticks / scale.ticks(), scale);
        }
    }
    (ticks, Scale::Ticks)
}

fn write_span<W: Write>(writer: &mut WireWriter<W>, field: u32, value: i64, scale: Scale) -> Result<(), Error> {
    let group = writer.start_group(field);
    if value != 0 {
        writer.write_tag(SPAN_VALUE, WireType::Varint);
        writer.write_sint64(value);
    }
    if scale != Scale::Days {
        writer.write_tag(SPAN_SCALE, WireType::Varint);
        writer.write_varint(scale.code());
    }
    writer.end_group(group)
}

enum Span {
    Ticks(i64),
    Max,
    Min,
}

fn read_span<R: Read>(reader: &mut WireReader<R>) -> Result<Span, Error> {
    let start = reader.position();
    let group = reader.start_group()?;
    let mut value = 0i64;
    let mut scale = Scale::Days;
    loop {
        match reader.read_field()? {
            0 => break,
            SPAN_VALUE => value = reader.read_sint64()?,
            SPAN_SCALE => scale = Scale::from_code(reader.read_uint64()?)?,
            _ => reader.skip_field()?,
        }
    }
    reader.end_group(group)?;
    match scale {
        Scale::MinMax => match value {
            1 => Ok(Span::Max),
            -1 => Ok(Span::Min),
            other => Err(Error::malformed(format!("invalid min/max marker {other}")).with_offset(start)),
        },
        scale => value.checked_mul(scale.ticks()).map(Span::Ticks).ok_or_else(|| {
            Error::new(ErrorKind::Overflow)
                .with_message(format!("time span {value} at scale {scale:?} overflows 64-bit ticks"))
                .with_offset(start)
        }),
    }
}

pub fn write_timestamp<W: Write>(writer: &mut WireWriter<W>, field: u32, value: OffsetDateTime) -> Result<(), Error> {
    if value == MAX_TIMESTAMP {
        return write_span(writer, field, 1, Scale::MinMax);
    }
    if value == MIN_TIMESTAMP {
        return write_span(writer, field, -1, Scale::MinMax);
    }
    // Readers decode in UTC; an offset can push the instant past the UTC range.
    if value.checked_to_offset(UtcOffset::UTC).is_none() {
        return Err(Error::new(ErrorKind::Overflow)
            .with_message(format!("timestamp {value} has no representable UTC instant")));
    }
    let ticks = value.unix_timestamp_nanos().div_euclid(NANOS_PER_TICK);
    let ticks = i64::try_from(ticks).map_err(|_| {
        Error::new(ErrorKind::Overflow).with_message(format!("timestamp {value} overflows 64-bit ticks"))
    })?;
    let (value, scale) = coarsest(ticks);
    write_span(writer, field, value, scale)
}

pub fn read_timestamp<R: Read>(reader: &mut WireReader<R>) -> Result<OffsetDateTime, Error> {
    let start = reader.position();
    match read_span(reader)? {
        Span::Max => Ok(MAX_TIMESTAMP),
        Span::Min => Ok(MIN_TIMESTAMP),
        Span::Ticks(ticks) => OffsetDateTime::from_unix_timestamp_nanos(i128::from(ticks) * NANOS_PER_TICK)
            .map_err(|err| {
                Error::new(ErrorKind::Overflow)
                    .with_message(format!("timestamp of {ticks} ticks is out of range"))
                    .with_offset(start)
                    .with_source(err)
            }),
    }
}

/// Sub-tick precision is truncated toward zero.
pub fn write_duration<W: Write>(writer: &mut WireWriter<W>, field: u32, value: Duration) -> Result<(), Error> {
    if value == Duration::MAX {
        return write_span(writer, field, 1, Scale::MinMax);
    }
    if value == Duration::MIN {
        return write_span(writer, field, -1, Scale::MinMax);
    }
    let ticks = i64::try_from(value.whole_nanoseconds() / NANOS_PER_TICK).map_err(|_| {
        Error::new(ErrorKind::Overflow).with_message(format!("duration {value} overflows 64-bit ticks"))
    })?;
    let (value, scale) = coarsest(ticks);
    write_span(writer, field, value, scale)
}

pub fn read_duration<R: Read>(reader: &mut WireReader<R>) -> Result<Duration, Error> {
    Ok(match read_span(reader)? {
        Span::Max => Duration::MAX,
        Span::Min => Duration::MIN,
        Span::Ticks(ticks) => Duration::new(
            ticks / TICKS_PER_SECOND,
            ((ticks % TICKS_PER_SECOND) * NANOS_PER_TICK as i64) as i32,
        ),
    })
}

pub fn write_decimal<W: Write>(writer: &mut WireWriter<W>, field: u32, value: Decimal) -> Result<(), Error> {
    let magnitude = value.mantissa().unsigned_abs();
    let lo = magnitude as u64;
    let hi = (magnitude >> 64) as u32;
    let sign_scale = (u64::from(value.scale()) << 1) | u64::from(value.is_negative());

    let group = writer.start_group(field);
    if lo != 0 {
        writer.write_tag(DECIMAL_LO, WireType::Varint);
        writer.write_varint(lo);
    }
    if hi != 0 {
        writer.write_tag(DECIMAL_HI, WireType::Varint);
        writer.write_varint(u64::from(hi));
    }
    if sign_scale != 0 {
        writer.write_tag(DECIMAL_SIGN_SCALE, WireType::Varint);
        writer.write_varint(sign_scale);
    }
    writer.end_group(group)
}

pub fn read_decimal<R: Read>(reader: &mut WireReader<R>) -> Result<Decimal, Error> {
    let start = reader.position();
    let group = reader.start_group()?;
    let (mut lo, mut hi, mut sign_scale) = (0u64, 0u32, 0u64);
    loop {
        match reader.read_field()? {
            0 => break,
            DECIMAL_LO => lo = reader.read_uint64()?,
            DECIMAL_HI => hi = reader.read_uint32()?,
            DECIMAL_SIGN_SCALE => sign_scale = reader.read_uint64()?,
            _ => reader.skip_field()?,
        }
    }
    reader.end_group(group)?;

    let scale = sign_scale >> 1;
    if scale > u64::from(Decimal::MAX_SCALE) {
        return Err(Error::malformed(format!("decimal scale {scale} exceeds {}", Decimal::MAX_SCALE))
            .with_offset(start));
    }
    let magnitude = (i128::from(hi) << 64) | i128::from(lo);
    let mantissa = if sign_scale & 1 == 1 { -magnitude } else { magnitude };
    Decimal::new(mantissa, scale as u8).map_err(|err| err.with_offset(start))
}

pub fn write_guid<W: Write>(writer: &mut WireWriter<W>, field: u32, value: Uuid) -> Result<(), Error> {
    let group = writer.start_group(field);
    if !value.is_nil() {
        let raw = u128::from_le_bytes(value.to_bytes_le());
        writer.write_tag(GUID_LO, WireType::SixtyFourBit);
        writer.write_fixed64(raw as u64);
        writer.write_tag(GUID_HI, WireType::SixtyFourBit);
        writer.write_fixed64((raw >> 64) as u64);
    }
    writer.end_group(group)
}

pub fn read_guid<R: Read>(reader: &mut WireReader<R>) -> Result<Uuid, Error> {
    let group = reader.start_group()?;
    let (mut lo, mut hi) = (0u64, 0u64);
    loop {
        match reader.read_field()? {
            0 => break,
            GUID_LO => lo = reader.read_fixed64()?,
            GUID_HI => hi = reader.read_fixed64()?,
            _ => reader.skip_field()?,
        }
    }
    reader.end_group(group)?;
    let raw = (u128::from(hi) << 64) | u128::from(lo);
    Ok(Uuid::from_bytes_le(raw.to_le_bytes()))
}
