use std::error::Error as StdError;
use std::fmt;
use std::io;

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum ErrorKind {
    /// Unusable command-line arguments or input documents.
    Usage,
    ArgumentMissing,
    TypeNotSupported,
    MalformedStream,
    ClosedReader,
    DisposedReader,
    IndexOutOfRange,
    InvalidOperation,
    InvalidCast,
    Overflow,
    Io,
}

#[derive(Debug)]
pub struct Error {
    kind: ErrorKind,
    message: Option<String>,
    ordinal: Option<usize>,
    offset: Option<u64>,
    source: Option<Box<dyn StdError + Send + Sync>>,
}

impl Error {
    pub fn new(kind: ErrorKind) -> Self {
        Self {
            kind,
            message: None,
            ordinal: None,
            offset: None,
            source: None,
        }
    }

    pub fn kind(&self) -> ErrorKind {
        self.kind
    }

    pub fn message(&self) -> Option<&str> {
        self.message.as_deref()
    }

    pub fn ordinal(&self) -> Option<usize> {
        self.ordinal
    }

    pub fn offset(&self) -> Option<u64> {
        self.offset
    }

    pub fn with_message(mut self, message: impl Into<String>) -> Self {
        self.message = Some(message.into());
        self
    }

    pub fn with_ordinal(mut self, ordinal: usize) -> Self {
        self.ordinal = Some(ordinal);
        self
    }

    pub fn with_offset(mut self, offset: u64) -> Self {
        self.offset = Some(offset);
        self
    }

    pub fn with_source(mut self, source: impl StdError + Send + Sync + 'static) -> Self {
        self.source = Some(Box::new(source));
        self
    }

    pub(crate) fn malformed(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::MalformedStream).with_message(message)
    }

    pub(crate) fn io(err: io::Error) -> Self {
        Self::new(ErrorKind::Io).with_source(err)
    }

    /// Wraps a sink/source failure. Truncation surfaces as a malformed stream,
    /// everything else keeps the original `io::Error` as the source.
    pub(crate) fn from_io(err: io::Error) -> Self {
        if err.kind() == io::ErrorKind::UnexpectedEof {
            return Self::malformed("unexpected end of stream").with_source(err);
        }
        Self::new(ErrorKind::Io).with_source(err)
    }
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:?}", self.kind)?;
        if let Some(message) = &self.message {
            write!(f, ": {message}")?;
        }
        if let Some(ordinal) = self.ordinal {
            write!(f, " (ordinal: {ordinal})")?;
        }
        if let Some(offset) = self.offset {
            write!(f, " (offset: {offset})")?;
        }
        if self.message.is_none() {
            if let Some(source) = &self.source {
                write!(f, ": {source}")?;
            }
        }
        Ok(())
    }
}

impl StdError for Error {
    fn source(&self) -> Option<&(dyn StdError + 'static)> {
        self.source
            .as_ref()
            .map(|source| source.as_ref() as &(dyn StdError + 'static))
    }
}

pub fn to_exit_code(kind: ErrorKind) -> i32 {
    match kind {
        ErrorKind::Usage => 1,
        ErrorKind::ArgumentMissing => 2,
        ErrorKind::TypeNotSupported => 3,
        ErrorKind::MalformedStream => 4,
        ErrorKind::ClosedReader => 5,
        ErrorKind::DisposedReader => 6,
        ErrorKind::IndexOutOfRange => 7,
        ErrorKind::InvalidOperation => 8,
        ErrorKind::InvalidCast => 9,
        ErrorKind::Overflow => 10,
        ErrorKind::Io => 11,
    }
}

#[cfg(test)]
mod tests {
    use super::{to_exit_code, Error, ErrorKind};
    use std::error::Error as _;
    use std::io;

    #[test]
    fn exit_code_mapping_is_stable() {
        let cases = [
            (ErrorKind::Usage, 1),
            (ErrorKind::ArgumentMissing, 2),
            (ErrorKind::TypeNotSupported, 3),
            (ErrorKind::MalformedStream, 4),
            (ErrorKind::ClosedReader, 5),
            (ErrorKind::DisposedReader, 6),
            (ErrorKind::IndexOutOfRange, 7),
            (ErrorKind::InvalidOperation, 8),
            (ErrorKind::InvalidCast, 9),
            (ErrorKind::Overflow, 10),
            (ErrorKind::Io, 11),
        ];

        for (kind, code) in cases {
            assert_eq!(to_exit_code(kind), code);
        }
    }

    #[test]
    fn display_includes_context() {
        let err = Error::new(ErrorKind::IndexOutOfRange)
            .with_message("ordinal out of range")
            .with_ordinal(3)
            .with_offset(17);
        assert_eq!(
            err.to_string(),
            "IndexOutOfRange: ordinal out of range (ordinal: 3) (offset: 17)"
        );
    }

    #[test]
    fn truncation_is_reported_as_malformed() {
        let err = Error::from_io(io::Error::new(io::ErrorKind::UnexpectedEof, "eof"));
        assert_eq!(err.kind(), ErrorKind::MalformedStream);
        assert!(err.source().is_some());

        let err = Error::from_io(io::Error::new(io::ErrorKind::BrokenPipe, "pipe"));
        assert_eq!(err.kind(), ErrorKind::Io);
        assert_eq!(err.to_string(), "Io: pipe");
    }
}
