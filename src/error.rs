//! Error types shared by the session components.

use std::io;
use thiserror::Error;

/// Why the screen size could not be established.
#[derive(Error, Debug)]
pub enum GeometryError {
    #[error("direct size query unavailable: {0}")]
    Unavailable(#[source] io::Error),

    #[error("terminal reported a degenerate size ({rows}x{columns})")]
    Degenerate { rows: u16, columns: u16 },

    #[error("short write while querying cursor position ({written} of {expected} bytes)")]
    ShortWrite { written: usize, expected: usize },

    #[error("failed to write cursor query: {0}")]
    Write(#[source] io::Error),

    #[error("failed to read cursor position report: {0}")]
    Read(#[source] io::Error),

    #[error("cursor position report does not start with ESC [")]
    BadPrefix,

    #[error("cursor position report is malformed: {0:?}")]
    Malformed(String),
}

#[derive(Error, Debug)]
pub enum Error {
    /// Getting or setting terminal attributes failed.
    #[error("{op}: {source}")]
    TerminalControl {
        op: &'static str,
        #[source]
        source: io::Error,
    },

    #[error("window size: {0}")]
    Geometry(#[from] GeometryError),

    /// Non-interrupt read or write failure.
    #[error("{op}: {source}")]
    Io {
        op: &'static str,
        #[source]
        source: io::Error,
    },

    #[error("terminated by signal")]
    Signal,

    #[error("configuration: {0}")]
    Config(String),
}

impl Error {
    pub(crate) fn control(op: &'static str, source: io::Error) -> Self {
        Error::TerminalControl { op, source }
    }

    pub(crate) fn io(op: &'static str, source: io::Error) -> Self {
        Error::Io { op, source }
    }
}

pub type Result<T> = std::result::Result<T, Error>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_diagnostic_names_operation_and_reason() {
        let err = Error::control("tcgetattr", io::Error::from_raw_os_error(25));
        let msg = err.to_string();
        assert!(msg.starts_with("tcgetattr: "), "{}", msg);

        let err = Error::io("read", io::Error::new(io::ErrorKind::BrokenPipe, "gone"));
        assert_eq!(err.to_string(), "read: gone");
    }

    #[test]
    fn test_geometry_error_wraps() {
        let err: Error = GeometryError::BadPrefix.into();
        assert_eq!(
            err.to_string(),
            "window size: cursor position report does not start with ESC ["
        );
    }
}
