//! Unified error type for mediascope.
//!
//! All crates funnel their failures into [`Error`]. Per-file errors are
//! caught at the batch boundary and recorded on the item that caused them;
//! they never abort a batch.

use std::fmt;
use std::time::Duration;

/// Classified diagnostic-parse failures.
///
/// The parser inspects the diagnostic text for known failure substrings
/// before attempting pattern extraction, so the caller can present an
/// actionable message instead of a generic one.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ParseErrorKind {
    /// The backend reported invalid or corrupted input data.
    CorruptedInput,
    /// The backend has no decoder for one of the file's codecs.
    MissingDecoder,
    /// No stream markers were present in the diagnostic text at all.
    NoStreams,
}

impl fmt::Display for ParseErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ParseErrorKind::CorruptedInput => {
                write!(f, "the file appears to be corrupted or is not a media file")
            }
            ParseErrorKind::MissingDecoder => {
                write!(f, "no decoder is available for one of the file's codecs")
            }
            ParseErrorKind::NoStreams => {
                write!(f, "no media streams were found in the file")
            }
        }
    }
}

/// Unified error type covering all failure modes in mediascope.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// Input failed validation (empty file, unrecognized extension).
    /// Fatal for the file, reported immediately, never retried.
    #[error("Validation error: {0}")]
    Validation(String),

    /// A backend failed to initialize. Fatal for the whole session.
    #[error("Backend load error [{backend}]: {message}")]
    BackendLoad {
        /// Backend that failed to come up.
        backend: String,
        /// Actionable description keyed on the underlying cause.
        message: String,
    },

    /// A backend write failed even after bounded retries.
    #[error("Write error after {attempts} attempts: {message}")]
    Write {
        /// Number of attempts made before giving up.
        attempts: u32,
        /// Description of the last failure.
        message: String,
    },

    /// An operation exceeded its hard deadline.
    #[error("{operation} timed out after {elapsed:?}")]
    Timeout {
        /// The operation that was cut off ("probe", "export", "write").
        operation: String,
        /// How long it ran before the deadline fired.
        elapsed: Duration,
    },

    /// Diagnostic text could not be turned into a metadata record.
    #[error("Parse error: {kind}")]
    Parse {
        /// The classified failure.
        kind: ParseErrorKind,
    },

    /// Both the native export path and its single fallback failed.
    #[error("Export failed for stream {stream}: {message}")]
    ExportFallbackExhausted {
        /// Index of the stream that could not be exported.
        stream: u32,
        /// Description of the final failure.
        message: String,
    },

    /// A backend operation failed (execute, read-back, missing output).
    #[error("Backend error [{backend}]: {message}")]
    Backend {
        /// Name of the backend.
        backend: String,
        /// Human-readable error description.
        message: String,
    },

    /// An I/O operation failed.
    #[error("IO error: {source}")]
    Io {
        /// The underlying I/O error.
        #[from]
        source: std::io::Error,
    },

    /// Catch-all for unexpected internal errors.
    #[error("Internal error: {0}")]
    Internal(String),
}

impl Error {
    /// Convenience constructor for [`Error::Validation`].
    pub fn validation(msg: impl Into<String>) -> Self {
        Error::Validation(msg.into())
    }

    /// Convenience constructor for [`Error::BackendLoad`].
    pub fn backend_load(backend: impl Into<String>, message: impl Into<String>) -> Self {
        Error::BackendLoad {
            backend: backend.into(),
            message: message.into(),
        }
    }

    /// Convenience constructor for [`Error::Backend`].
    pub fn backend(backend: impl Into<String>, message: impl Into<String>) -> Self {
        Error::Backend {
            backend: backend.into(),
            message: message.into(),
        }
    }

    /// Convenience constructor for [`Error::Timeout`].
    pub fn timeout(operation: impl Into<String>, elapsed: Duration) -> Self {
        Error::Timeout {
            operation: operation.into(),
            elapsed,
        }
    }

    /// Convenience constructor for [`Error::Parse`].
    pub fn parse(kind: ParseErrorKind) -> Self {
        Error::Parse { kind }
    }

    /// Convenience constructor for [`Error::Internal`].
    pub fn internal(msg: impl Into<String>) -> Self {
        Error::Internal(msg.into())
    }

    /// Whether this error poisons the whole session rather than one file.
    pub fn is_session_fatal(&self) -> bool {
        matches!(self, Error::BackendLoad { .. })
    }
}

/// Result alias using the crate-level [`Error`].
pub type Result<T> = std::result::Result<T, Error>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn validation_display() {
        let err = Error::validation("file is empty");
        assert_eq!(err.to_string(), "Validation error: file is empty");
        assert!(!err.is_session_fatal());
    }

    #[test]
    fn backend_load_display() {
        let err = Error::backend_load("ffmpeg", "not found in PATH");
        assert_eq!(
            err.to_string(),
            "Backend load error [ffmpeg]: not found in PATH"
        );
        assert!(err.is_session_fatal());
    }

    #[test]
    fn write_display() {
        let err = Error::Write {
            attempts: 3,
            message: "scratch dir vanished".into(),
        };
        assert_eq!(
            err.to_string(),
            "Write error after 3 attempts: scratch dir vanished"
        );
    }

    #[test]
    fn timeout_display() {
        let err = Error::timeout("probe", Duration::from_secs(90));
        assert_eq!(err.to_string(), "probe timed out after 90s");
    }

    #[test]
    fn parse_kinds_display() {
        let err = Error::parse(ParseErrorKind::NoStreams);
        assert!(err.to_string().contains("no media streams"));

        let err = Error::parse(ParseErrorKind::CorruptedInput);
        assert!(err.to_string().contains("corrupted"));

        let err = Error::parse(ParseErrorKind::MissingDecoder);
        assert!(err.to_string().contains("decoder"));
    }

    #[test]
    fn export_exhausted_display() {
        let err = Error::ExportFallbackExhausted {
            stream: 2,
            message: "copy and re-encode both failed".into(),
        };
        assert_eq!(
            err.to_string(),
            "Export failed for stream 2: copy and re-encode both failed"
        );
    }

    #[test]
    fn io_from_std() {
        let io_err = std::io::Error::new(std::io::ErrorKind::NotFound, "file missing");
        let err = Error::from(io_err);
        assert!(matches!(err, Error::Io { .. }));
    }

    #[test]
    fn result_alias() {
        fn ok_fn() -> Result<i32> {
            Ok(7)
        }
        assert_eq!(ok_fn().unwrap(), 7);
    }
}
