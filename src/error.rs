//! Custom error types for the sequencer.
//!
//! `SequenceError` is the single error type surfaced by parsing and running a
//! procedure. Using the `thiserror` crate, it gives a consistent way to report
//! everything from malformed procedure text to instruments that never settle.
//!
//! ## Error Hierarchy
//!
//! - **`Parse`**: the procedure text is malformed. Wraps a [`ParseError`] that
//!   names the offending source line.
//! - **`UndefinedVariable`**: a `$name` reference was used before anything bound it.
//! - **`InstrumentNotFound`**: a command named an instrument the rack does not hold.
//! - **`Timeout`**: `WAIT_STABLE` did not observe a settled value in time. Kept as
//!   its own variant so callers can special-case "instrument did not settle".
//! - **`Instrument`**: the driver behind an instrument facade returned an error.
//! - **`InvalidArgument`**: a command was constructed with values it cannot run with.
//! - **`Storage`**: the persistence collaborator failed to write readings.
//! - **`FeatureNotEnabled`**: functionality compiled out via feature flags.
//! - **`Io`**: reading a procedure file failed.

use std::fmt;
use thiserror::Error;

/// Convenience alias for results using the sequencer error type.
pub type SeqResult<T> = std::result::Result<T, SequenceError>;

/// Errors raised while parsing or running a procedure.
#[derive(Error, Debug)]
pub enum SequenceError {
    /// Malformed procedure text
    #[error(transparent)]
    Parse(#[from] ParseError),

    /// `$name` used before it was bound
    #[error("Undefined variable: ${name}")]
    UndefinedVariable {
        /// Variable name without the `$`
        name: String,
    },

    /// The rack has no instrument with this name
    #[error("Instrument '{name}' not found in rack")]
    InstrumentNotFound {
        /// Requested rack name
        name: String,
    },

    /// `WAIT_STABLE` ran out of time
    #[error("{instrument}.{parameter} did not stabilize within {timeout_secs}s")]
    Timeout {
        /// Rack name
        instrument: String,
        /// Polled parameter
        parameter: String,
        /// Configured timeout
        timeout_secs: f64,
    },

    /// A driver call failed
    #[error("Instrument '{instrument}' failed during {operation}: {source}")]
    Instrument {
        /// Rack name
        instrument: String,
        /// Facade operation, e.g. `read_value`
        operation: String,
        /// Driver error
        #[source]
        source: anyhow::Error,
    },

    /// A command value the runtime cannot use
    #[error("Invalid argument: {0}")]
    InvalidArgument(String),

    /// The reading writer failed
    #[error("Failed to save data to '{destination}': {source}")]
    Storage {
        /// Requested destination
        destination: String,
        /// Writer error
        #[source]
        source: anyhow::Error,
    },

    /// Functionality compiled out
    #[error("Feature '{0}' is not enabled. Please build with --features {0}")]
    FeatureNotEnabled(String),

    /// Reading a procedure file failed
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl SequenceError {
    /// True when the failure is a `WAIT_STABLE` timeout.
    pub fn is_timeout(&self) -> bool {
        matches!(self, SequenceError::Timeout { .. })
    }

    pub(crate) fn instrument(
        instrument: &str,
        operation: impl Into<String>,
        source: anyhow::Error,
    ) -> Self {
        SequenceError::Instrument {
            instrument: instrument.to_string(),
            operation: operation.into(),
            source,
        }
    }
}

/// Parse error pointing at a line of the procedure source.
#[derive(Debug, Clone, PartialEq, Error)]
#[error("Parse error at line {line}: {kind} (`{text}`)")]
pub struct ParseError {
    /// 1-based line number in the procedure file (0 when no line applies)
    pub line: usize,
    /// The offending line, trimmed
    pub text: String,
    /// Category of parse error
    pub kind: ParseErrorKind,
}

/// Category of parse error.
#[derive(Debug, Clone, PartialEq)]
pub enum ParseErrorKind {
    /// First token is not a known command keyword
    UnknownKeyword(String),
    /// Keyword recognised but its arguments do not match the grammar
    InvalidSyntax {
        /// Canonical keyword, e.g. `RECORD`
        keyword: String,
        /// What the sub-grammar rejected
        reason: String,
    },
    /// LOOP with no matching END before end of input
    UnterminatedLoop,
    /// END with no enclosing LOOP
    StrayTerminator,
    /// The procedure has no `[SEQUENCE]` section
    MissingSequenceSection,
}

impl fmt::Display for ParseErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ParseErrorKind::UnknownKeyword(keyword) => write!(f, "unknown command '{}'", keyword),
            ParseErrorKind::InvalidSyntax { keyword, reason } => {
                write!(f, "invalid {} syntax: {}", keyword, reason)
            }
            ParseErrorKind::UnterminatedLoop => write!(f, "unterminated loop (LOOP without matching END)"),
            ParseErrorKind::StrayTerminator => write!(f, "stray terminator (END without matching LOOP)"),
            ParseErrorKind::MissingSequenceSection => write!(f, "missing [SEQUENCE] section"),
        }
    }
}

impl ParseError {
    /// Create a parse error for `text` at `line`.
    pub fn new(line: usize, text: &str, kind: ParseErrorKind) -> Self {
        Self {
            line,
            text: text.trim().to_string(),
            kind,
        }
    }

    /// Create an "invalid syntax" error for `keyword`.
    pub fn invalid_syntax(line: usize, text: &str, keyword: &str, reason: impl Into<String>) -> Self {
        Self::new(
            line,
            text,
            ParseErrorKind::InvalidSyntax {
                keyword: keyword.to_string(),
                reason: reason.into(),
            },
        )
    }
}
