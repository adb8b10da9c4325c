//! Error types for panegrid.

use std::fmt;
use std::io;

/// Result type alias for panegrid operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Error type for panegrid operations.
#[derive(Debug)]
pub enum Error {
    /// I/O error from a terminal driver.
    Io(io::Error),
    /// Invalid colour description (e.g., unknown name).
    InvalidColour(String),
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Io(e) => write!(f, "I/O error: {e}"),
            Self::InvalidColour(s) => write!(f, "invalid colour description: {s}"),
        }
    }
}

impl std::error::Error for Error {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Self::Io(e) => Some(e),
            _ => None,
        }
    }
}

impl From<io::Error> for Error {
    fn from(e: io::Error) -> Self {
        Self::Io(e)
    }
}
