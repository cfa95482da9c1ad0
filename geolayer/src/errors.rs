use backtrace::Backtrace;
use std::error::Error;
use std::fmt::{Debug, Display, Formatter};
use std::result::Result;

use crate::common::{atomic, Atomic};

/// Error kinds for geometry layer operations.
///
/// Each kind describes one category of failure so callers can react to the
/// category without parsing messages.
///
/// # Examples
///
/// ```rust,ignore
/// use geolayer::errors::{GeoError, ErrorKind, GeoResult};
///
/// fn example() -> GeoResult<()> {
///     Err(GeoError::new("No such layer 'roads'", ErrorKind::NotFound))
/// }
/// ```
#[derive(Debug, PartialEq, Eq, Clone)]
pub enum ErrorKind {
    /// Duplicate layer name, unknown encoder or index kind, missing or invalid config
    ConfigurationError,
    /// Malformed or shape-mismatched geometry payload during encode or decode
    EncodingError,
    /// Unrecognized coordinate or geometry input shape
    ConversionError,
    /// Unrecognized coordinate reference system name
    UnsupportedCrs,
    /// Operation against a nonexistent layer or entry
    NotFound,
    /// Structural index mutation that would break the tree invariants
    IndexError,
    /// Commit conflict or use of a finished transaction
    TransactionError,
    /// Operation against a closed store
    StoreClosed,
    /// Generic IO error
    IOError,
    /// Persisted data failed validation
    FileCorrupted,
    /// Internal error
    InternalError,
}

impl Display for ErrorKind {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            ErrorKind::ConfigurationError => write!(f, "Configuration error"),
            ErrorKind::EncodingError => write!(f, "Encoding error"),
            ErrorKind::ConversionError => write!(f, "Conversion error"),
            ErrorKind::UnsupportedCrs => write!(f, "Unsupported CRS"),
            ErrorKind::NotFound => write!(f, "Not found"),
            ErrorKind::IndexError => write!(f, "Index error"),
            ErrorKind::TransactionError => write!(f, "Transaction error"),
            ErrorKind::StoreClosed => write!(f, "Store closed"),
            ErrorKind::IOError => write!(f, "IO error"),
            ErrorKind::FileCorrupted => write!(f, "File corrupted"),
            ErrorKind::InternalError => write!(f, "Internal error"),
        }
    }
}

/// Error type for all geometry layer operations.
///
/// `GeoError` carries a message naming the offending input, an [`ErrorKind`],
/// an optional cause and the backtrace captured at construction.
///
/// # Examples
///
/// ```rust,ignore
/// use geolayer::errors::{GeoError, ErrorKind};
///
/// let cause = GeoError::new("Invalid WKT: POINT(1)", ErrorKind::EncodingError);
/// let err = GeoError::new_with_cause("Cannot add geometry", ErrorKind::IndexError, cause);
/// ```
#[derive(Clone)]
pub struct GeoError {
    message: String,
    error_kind: ErrorKind,
    cause: Option<Box<GeoError>>,
    backtrace: Atomic<Backtrace>,
}

impl GeoError {
    /// Creates a new `GeoError` with the specified message and error kind.
    pub fn new(message: &str, error_kind: ErrorKind) -> Self {
        GeoError {
            message: message.to_string(),
            error_kind,
            cause: None,
            backtrace: atomic(Backtrace::new_unresolved()),
        }
    }

    /// Creates a new `GeoError` chained to the error that caused it.
    pub fn new_with_cause(message: &str, error_kind: ErrorKind, cause: GeoError) -> Self {
        GeoError {
            message: message.to_string(),
            error_kind,
            cause: Some(Box::new(cause)),
            backtrace: atomic(Backtrace::new_unresolved()),
        }
    }

    pub fn message(&self) -> &str {
        &self.message
    }

    pub fn kind(&self) -> &ErrorKind {
        &self.error_kind
    }

    pub fn cause(&self) -> Option<&GeoError> {
        self.cause.as_deref()
    }
}

impl Display for GeoError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.message)
    }
}

impl Debug for GeoError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match &self.cause {
            Some(cause) => write!(f, "{}\nCaused by: {:?}", self.message, cause),
            None => {
                let mut backtrace = self.backtrace.write();
                backtrace.resolve();
                write!(f, "{}\n{:?}", self.message, backtrace)
            }
        }
    }
}

impl Error for GeoError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match &self.cause {
            Some(cause) => Some(cause.as_ref()),
            None => None,
        }
    }
}

/// Shorthand for `Result<T, GeoError>`.
pub type GeoResult<T> = Result<T, GeoError>;

impl From<std::io::Error> for GeoError {
    fn from(err: std::io::Error) -> Self {
        let error_kind = match err.kind() {
            std::io::ErrorKind::InvalidData | std::io::ErrorKind::UnexpectedEof => {
                ErrorKind::FileCorrupted
            }
            _ => ErrorKind::IOError,
        };
        GeoError::new(&format!("IO error: {}", err), error_kind)
    }
}

impl From<std::num::ParseFloatError> for GeoError {
    fn from(err: std::num::ParseFloatError) -> Self {
        GeoError::new(&format!("Invalid number: {}", err), ErrorKind::EncodingError)
    }
}
