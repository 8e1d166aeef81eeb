//! Error types.
//!
//! Four families reach the caller: configuration (buffer or environment
//! unusable), parse (the only output of a failed parse), evaluation
//! (the runtime rejected the document) and protocol (the buffer or context
//! protocol was violated; always fatal).

use std::fmt;

use thiserror::Error;

use crate::span::Location;

/// Top-level error returned by every public operation.
#[derive(Debug, Error)]
pub enum Error {
    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error(transparent)]
    Parse(#[from] ParseError),

    #[error("evaluation failed: {0}")]
    Evaluation(String),

    #[error(transparent)]
    Protocol(#[from] ProtocolError),
}

impl Error {
    /// Protocol violations indicate a bug on one side of the call boundary
    /// and must not be retried.
    pub fn is_fatal(&self) -> bool {
        matches!(self, Error::Protocol(_))
    }

    pub fn kind(&self) -> ErrorKind {
        match self {
            Error::Config(_) => ErrorKind::Config,
            Error::Parse(_) => ErrorKind::Parse,
            Error::Evaluation(_) => ErrorKind::Evaluation,
            Error::Protocol(_) => ErrorKind::Protocol,
        }
    }

    pub fn as_parse(&self) -> Option<&ParseError> {
        match self {
            Error::Parse(e) => Some(e),
            _ => None,
        }
    }
}

/// Stable numeric classification, shared with the C ABI.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum ErrorKind {
    Config = 1,
    Parse = 2,
    Evaluation = 3,
    Protocol = 4,
}

/// The buffer or environment cannot be used.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ConfigError {
    #[error("source is {len} bytes; at most {max} bytes can be addressed by event offsets")]
    SourceTooLarge { len: usize, max: usize },

    #[error("event buffer is not zero-copy capable: {reason}")]
    NotZeroCopy { reason: String },

    #[error("event buffer byte order must be the native byte order")]
    ByteOrderMismatch,

    #[error("invalid value {value:?} for {name}")]
    InvalidSetting { name: &'static str, value: String },
}

/// The buffer or context protocol was violated.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ProtocolError {
    #[error("no previous successful parse to fetch a result from")]
    NoPreviousAttempt,

    #[error("fetched result has {actual} cells but {expected} were announced")]
    SizeMismatch { expected: usize, actual: usize },

    #[error("execution context teardown failed with status {status}")]
    Teardown { status: i32 },

    #[error("execution context {id} was already used for an evaluation")]
    ContextReused { id: u64 },

    #[error("malformed result envelope: {reason}")]
    MalformedEnvelope { reason: String },

    #[error("malformed event at cell {index}: {reason}")]
    MalformedEvent { index: usize, reason: &'static str },
}

/// A structured parse failure.
///
/// Immutable once created; a failed parse produces no events.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParseError {
    pub location: Location,
    pub message: String,
    pub filename: Option<String>,
}

impl ParseError {
    pub fn new(location: Location, message: impl Into<String>) -> Self {
        Self { location, message: message.into(), filename: None }
    }

    pub fn with_filename(mut self, filename: Option<&str>) -> Self {
        self.filename = filename.map(str::to_owned);
        self
    }

    #[inline]
    pub fn offset(&self) -> u32 {
        self.location.offset
    }

    #[inline]
    pub fn line(&self) -> u32 {
        self.location.line
    }

    #[inline]
    pub fn column(&self) -> u32 {
        self.location.column
    }
}

impl fmt::Display for ParseError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if let Some(name) = &self.filename {
            write!(f, "{}:", name)?;
        }
        write!(
            f,
            "{}:{}: {} (offset {})",
            self.location.line, self.location.column, self.message, self.location.offset
        )
    }
}

impl std::error::Error for ParseError {}

#[cfg(test)]
mod tests {
    use super::*;

    fn location() -> Location {
        Location { offset: 2, line: 1, column: 3 }
    }

    #[test]
    fn test_parse_error_display() {
        let err = ParseError::new(location(), "mapping values are not allowed here");
        assert_eq!(err.to_string(), "1:3: mapping values are not allowed here (offset 2)");

        let err = err.with_filename(Some("doc.ys"));
        assert_eq!(err.to_string(), "doc.ys:1:3: mapping values are not allowed here (offset 2)");
    }

    #[test]
    fn test_kind_and_fatality() {
        let parse: Error = ParseError::new(location(), "x").into();
        assert_eq!(parse.kind(), ErrorKind::Parse);
        assert!(!parse.is_fatal());
        assert_eq!(parse.as_parse().map(ParseError::column), Some(3));

        let protocol: Error = ProtocolError::NoPreviousAttempt.into();
        assert_eq!(protocol.kind(), ErrorKind::Protocol);
        assert!(protocol.is_fatal());

        let config: Error = ConfigError::ByteOrderMismatch.into();
        assert_eq!(config.kind() as u8, 1);
    }
}
