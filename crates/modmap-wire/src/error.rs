//! Framing-level error and status types.

use std::io;

use thiserror::Error;

/// Errors raised by the framing codec.
#[derive(Debug, Error)]
pub enum WireError {
    /// A line violated the quoting grammar. The raw text of the
    /// offending line is preserved for diagnostic responses; the lexer
    /// has already advanced past it.
    #[error("malformed line: {raw}")]
    MalformedLine {
        /// Original text of the line, continuation marker stripped.
        raw: String,
    },

    /// Bytes arrived after a batch's final newline in the same read.
    /// The buffer has been truncated back to the complete batch.
    #[error("data follows the batch terminator")]
    TrailingData,

    /// A batch handed over directly did not end at a line terminator.
    #[error("batch does not end at a line terminator")]
    UnterminatedBatch,

    /// Transport failure other than the retriable would-block and
    /// interrupted conditions.
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),
}

/// Specialized `Result` for framing operations.
pub type WireResult<T> = std::result::Result<T, WireError>;

/// Outcome of one nonblocking read attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReadStatus {
    /// The buffer holds one complete batch.
    Complete,
    /// More input is required; retry when the stream is readable.
    NeedMore,
    /// The read was interrupted by a signal; retry immediately.
    Interrupted,
    /// The peer closed the stream.
    Eof,
}

/// Outcome of one nonblocking write attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WriteStatus {
    /// The whole buffer has been flushed and reset.
    Complete,
    /// Some bytes remain; retry when the stream is writable.
    NeedMore,
    /// The write was interrupted by a signal; retry immediately.
    Interrupted,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = WireError::MalformedLine {
            raw: "BAD 'line".to_string(),
        };
        assert_eq!(format!("{}", err), "malformed line: BAD 'line");

        let err = WireError::TrailingData;
        assert_eq!(format!("{}", err), "data follows the batch terminator");
    }

    #[test]
    fn test_io_conversion() {
        let io_err = io::Error::new(io::ErrorKind::BrokenPipe, "pipe");
        let err = WireError::from(io_err);
        assert!(matches!(err, WireError::Io(_)));
    }
}
