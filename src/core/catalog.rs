//! Purpose: Map the fifteen logical kinds to wire tags and to Rust runtime types.
//! Exports: `LogicalKind`, `RuntimeType`, `kind_of`.
//! Role: Writer resolves column types through `kind_of`; reader resolves tags through `LogicalKind::from_tag`.
//! Invariants: The mapping is total and bijective over the supported set; tables are immutable.
use std::any::{type_name, TypeId};
use std::fmt;
use std::hash::{Hash, Hasher};

use time::{Duration, OffsetDateTime};
use uuid::Uuid;

use crate::core::error::{Error, ErrorKind};
use crate::core::value::Decimal;

#[derive(Clone, Copy, Debug, Eq, Hash, PartialEq, PartialOrd, Ord)]
pub enum LogicalKind {
    Boolean,
    Byte,
    ByteSequence,
    Char,
    CharSequence,
    Timestamp,
    FixedPoint,
    Double,
    Single,
    Guid,
    Int32,
    Int64,
    Int16,
    Text,
    Duration,
}

impl LogicalKind {
    pub const ALL: [LogicalKind; 15] = [
        LogicalKind::Boolean,
        LogicalKind::Byte,
        LogicalKind::ByteSequence,
        LogicalKind::Char,
        LogicalKind::CharSequence,
        LogicalKind::Timestamp,
        LogicalKind::FixedPoint,
        LogicalKind::Double,
        LogicalKind::Single,
        LogicalKind::Guid,
        LogicalKind::Int32,
        LogicalKind::Int64,
        LogicalKind::Int16,
        LogicalKind::Text,
        LogicalKind::Duration,
    ];

    /// Wire tag carried in a column entry.
    pub fn tag(self) -> u64 {
        match self {
            LogicalKind::Boolean => 1,
            LogicalKind::Byte => 2,
            LogicalKind::ByteSequence => 3,
            LogicalKind::Char => 4,
            LogicalKind::CharSequence => 5,
            LogicalKind::Timestamp => 6,
            LogicalKind::FixedPoint => 7,
            LogicalKind::Double => 8,
            LogicalKind::Single => 9,
            LogicalKind::Guid => 10,
            LogicalKind::Int32 => 11,
            LogicalKind::Int64 => 12,
            LogicalKind::Int16 => 13,
            LogicalKind::Text => 14,
            LogicalKind::Duration => 15,
        }
    }

    pub fn from_tag(tag: u64) -> Result<Self, Error> {
        Self::ALL
            .into_iter()
            .find(|kind| kind.tag() == tag)
            .ok_or_else(|| Error::malformed(format!("undefined kind tag {tag}; expected 1..=15")))
    }

    pub fn name(self) -> &'static str {
        match self {
            LogicalKind::Boolean => "Boolean",
            LogicalKind::Byte => "Byte",
            LogicalKind::ByteSequence => "ByteSequence",
            LogicalKind::Char => "Char",
            LogicalKind::CharSequence => "CharSequence",
            LogicalKind::Timestamp => "Timestamp",
            LogicalKind::FixedPoint => "FixedPoint",
            LogicalKind::Double => "Double",
            LogicalKind::Single => "Single",
            LogicalKind::Guid => "Guid",
            LogicalKind::Int32 => "Int32",
            LogicalKind::Int64 => "Int64",
            LogicalKind::Int16 => "Int16",
            LogicalKind::Text => "Text",
            LogicalKind::Duration => "Duration",
        }
    }

    /// Case-insensitive inverse of [`LogicalKind::name`].
    pub fn from_name(name: &str) -> Option<Self> {
        Self::ALL
            .into_iter()
            .find(|kind| kind.name().eq_ignore_ascii_case(name))
    }

    pub fn runtime_type(self) -> RuntimeType {
        match self {
            LogicalKind::Boolean => RuntimeType::of::<bool>(),
            LogicalKind::Byte => RuntimeType::of::<u8>(),
            LogicalKind::ByteSequence => RuntimeType::of::<Vec<u8>>(),
            LogicalKind::Char => RuntimeType::of::<char>(),
            LogicalKind::CharSequence => RuntimeType::of::<Vec<char>>(),
            LogicalKind::Timestamp => RuntimeType::of::<OffsetDateTime>(),
            LogicalKind::FixedPoint => RuntimeType::of::<Decimal>(),
            LogicalKind::Double => RuntimeType::of::<f64>(),
            LogicalKind::Single => RuntimeType::of::<f32>(),
            LogicalKind::Guid => RuntimeType::of::<Uuid>(),
            LogicalKind::Int32 => RuntimeType::of::<i32>(),
            LogicalKind::Int64 => RuntimeType::of::<i64>(),
            LogicalKind::Int16 => RuntimeType::of::<i16>(),
            LogicalKind::Text => RuntimeType::of::<String>(),
            LogicalKind::Duration => RuntimeType::of::<Duration>(),
        }
    }
}

impl fmt::Display for LogicalKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// A column's Rust type, identified by `TypeId` and named for diagnostics.
#[derive(Clone, Copy, Debug)]
pub struct RuntimeType {
    id: TypeId,
    name: &'static str,
}

impl RuntimeType {
    pub fn of<T: 'static>() -> Self {
        Self {
            id: TypeId::of::<T>(),
            name: type_name::<T>(),
        }
    }

    pub fn id(&self) -> TypeId {
        self.id
    }

    pub fn name(&self) -> &'static str {
        self.name
    }
}

impl PartialEq for RuntimeType {
    fn eq(&self, other: &Self) -> bool {
        self.id == other.id
    }
}

impl Eq for RuntimeType {}

impl Hash for RuntimeType {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.id.hash(state);
    }
}

impl fmt::Display for RuntimeType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name)
    }
}

pub fn kind_of(runtime_type: RuntimeType) -> Result<LogicalKind, Error> {
    LogicalKind::ALL
        .into_iter()
        .find(|kind| kind.runtime_type() == runtime_type)
        .ok_or_else(|| {
            let supported = LogicalKind::ALL
                .iter()
                .map(|kind| kind.runtime_type().name())
                .collect::<Vec<_>>()
                .join(", ");
            Error::new(ErrorKind::TypeNotSupported).with_message(format!(
                "type {} is not supported; supported types: {supported}",
                runtime_type.name()
            ))
        })
}

#[cfg(test)]
mod tests {
    use super::{kind_of, LogicalKind, RuntimeType};
    use crate::core::error::ErrorKind;
    use std::collections::HashSet;

    #[test]
    fn tags_round_trip_for_every_kind() {
        let mut tags = HashSet::new();
        for kind in LogicalKind::ALL {
            assert!(tags.insert(kind.tag()));
            assert_eq!(LogicalKind::from_tag(kind.tag()).expect("tag"), kind);
            assert_eq!(kind_of(kind.runtime_type()).expect("kind"), kind);
            assert_eq!(LogicalKind::from_name(&kind.name().to_lowercase()), Some(kind));
        }
        assert_eq!(tags.len(), 15);
    }

    #[test]
    fn undefined_tags_are_malformed() {
        for tag in [0, 16, u64::MAX] {
            let err = LogicalKind::from_tag(tag).expect_err("should fail");
            assert_eq!(err.kind(), ErrorKind::MalformedStream);
        }
    }

    #[test]
    fn unsupported_type_lists_supported_names() {
        let err = kind_of(RuntimeType::of::<u32>()).expect_err("should fail");
        assert_eq!(err.kind(), ErrorKind::TypeNotSupported);
        let message = err.message().expect("message");
        assert!(message.contains("u32"));
        assert!(message.contains("alloc::string::String"));
        assert!(message.contains("uuid::Uuid"));
        assert!(message.contains("time::duration::Duration"));
    }

    #[test]
    fn runtime_types_compare_by_identity() {
        assert_eq!(RuntimeType::of::<i32>(), LogicalKind::Int32.runtime_type());
        assert_ne!(RuntimeType::of::<i32>(), RuntimeType::of::<i64>());
        assert_eq!(RuntimeType::of::<bool>().name(), "bool");
    }
}
