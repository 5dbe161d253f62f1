use backtrace::Backtrace;
use serde::{de, ser};
use std::error::Error;
use std::fmt::{Debug, Display, Formatter};
use std::result::Result;

use crate::common::{atomic, Atomic, ReadExecutor};

/// Error kinds for LokiDB operations.
///
/// Each kind names one category of failure so callers can match on it
/// instead of parsing messages.
///
/// # Examples
///
/// ```rust,ignore
/// use lokidb::errors::{LokiError, ErrorKind, LokiResult};
///
/// fn example() -> LokiResult<()> {
///     Err(LokiError::new("Index not found", ErrorKind::IndexNotFound))
/// }
/// ```
#[derive(Debug, PartialEq, Eq, Clone)]
pub enum ErrorKind {
    // Constraint errors
    /// A unique index already holds the key for a different document
    DuplicateKey,

    // Document identity errors
    /// The document does not carry an id issued by this collection,
    /// or its id is no longer present
    UnsyncedDocument,
    /// The document cannot be stored as given (e.g. it already carries an id on insert)
    InvalidDocument,

    // Query errors
    /// An unknown `$operator` appeared in a query
    InvalidOperator,
    /// The query is structurally malformed (wrong operand type, bad regex, ...)
    InvalidQuery,

    // Index errors
    /// No index exists for the requested field
    IndexNotFound,
    /// The index is stale and must be rebuilt before it can be read
    DirtyIndex,

    // Catalog errors
    /// Collection does not exist
    CollectionNotFound,
    /// A collection with the same name already exists
    CollectionAlreadyExists,
    /// Dynamic view does not exist
    ViewNotFound,
    /// A dynamic view with the same name already exists
    ViewAlreadyExists,
    /// Named transform does not exist
    TransformNotFound,
    /// A transform with the same name already exists
    TransformAlreadyExists,
    /// A dynamic view has no filter with the requested uid
    FilterNotFound,

    // Serialization and persistence errors
    /// Snapshot could not be encoded or decoded
    EncodingError,
    /// The persistence adapter reported a failure
    PersistenceError,
    /// No persistence adapter is configured
    AdapterNotConfigured,

    // Event errors
    /// An event listener or the event bus failed
    EventError,

    /// Internal error (usually indicates a bug)
    InternalError,
}

impl Display for ErrorKind {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            ErrorKind::DuplicateKey => write!(f, "Duplicate key"),
            ErrorKind::UnsyncedDocument => write!(f, "Unsynced document"),
            ErrorKind::InvalidDocument => write!(f, "Invalid document"),
            ErrorKind::InvalidOperator => write!(f, "Invalid operator"),
            ErrorKind::InvalidQuery => write!(f, "Invalid query"),
            ErrorKind::IndexNotFound => write!(f, "Index not found"),
            ErrorKind::DirtyIndex => write!(f, "Dirty index"),
            ErrorKind::CollectionNotFound => write!(f, "Collection not found"),
            ErrorKind::CollectionAlreadyExists => write!(f, "Collection already exists"),
            ErrorKind::ViewNotFound => write!(f, "Dynamic view not found"),
            ErrorKind::ViewAlreadyExists => write!(f, "Dynamic view already exists"),
            ErrorKind::TransformNotFound => write!(f, "Transform not found"),
            ErrorKind::TransformAlreadyExists => write!(f, "Transform already exists"),
            ErrorKind::FilterNotFound => write!(f, "Filter not found"),
            ErrorKind::EncodingError => write!(f, "Encoding error"),
            ErrorKind::PersistenceError => write!(f, "Persistence error"),
            ErrorKind::AdapterNotConfigured => write!(f, "Adapter not configured"),
            ErrorKind::EventError => write!(f, "Event error"),
            ErrorKind::InternalError => write!(f, "Internal error"),
        }
    }
}

/// Custom LokiDB error type.
///
/// `LokiError` carries a message, an [ErrorKind], an optional cause and the
/// backtrace captured at construction.
///
/// # Examples
///
/// ```rust,ignore
/// use lokidb::errors::{LokiError, ErrorKind};
///
/// let cause = LokiError::new("adapter offline", ErrorKind::PersistenceError);
/// let err = LokiError::new_with_cause("Save failed", ErrorKind::PersistenceError, cause);
/// ```
#[derive(Clone)]
pub struct LokiError {
    message: String,
    error_kind: ErrorKind,
    cause: Option<Box<LokiError>>,
    backtrace: Atomic<Backtrace>,
}

impl LokiError {
    /// Creates a new `LokiError` with the specified message and error kind.
    pub fn new(message: &str, error_kind: ErrorKind) -> Self {
        LokiError {
            message: message.to_string(),
            error_kind,
            cause: None,
            backtrace: atomic(Backtrace::new()),
        }
    }

    /// Creates a new `LokiError` wrapping a cause.
    pub fn new_with_cause(message: &str, error_kind: ErrorKind, cause: LokiError) -> Self {
        LokiError {
            message: message.to_string(),
            error_kind,
            cause: Some(Box::new(cause)),
            backtrace: atomic(Backtrace::new()),
        }
    }

    pub fn message(&self) -> &str {
        &self.message
    }

    pub fn kind(&self) -> &ErrorKind {
        &self.error_kind
    }

    pub fn cause(&self) -> Option<&LokiError> {
        self.cause.as_deref()
    }
}

impl Display for LokiError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.message)
    }
}

impl Debug for LokiError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match &self.cause {
            Some(cause) => write!(f, "{} ({})\nCaused by: {:?}", self.message, self.error_kind, cause),
            None => write!(
                f,
                "{} ({})\n{:?}",
                self.message,
                self.error_kind,
                self.backtrace.read_with(|bt| bt.clone())
            ),
        }
    }
}

impl Error for LokiError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match &self.cause {
            Some(cause) => Some(cause.as_ref()),
            None => None,
        }
    }
}

/// A result type alias for LokiDB operations.
pub type LokiResult<T> = Result<T, LokiError>;

impl de::Error for LokiError {
    fn custom<T: Display>(msg: T) -> Self {
        LokiError::new(&msg.to_string(), ErrorKind::EncodingError)
    }
}

impl ser::Error for LokiError {
    fn custom<T: Display>(msg: T) -> Self {
        LokiError::new(&msg.to_string(), ErrorKind::EncodingError)
    }
}

impl From<serde_json::Error> for LokiError {
    fn from(err: serde_json::Error) -> Self {
        LokiError::new(
            &format!("Snapshot encoding error: {}", err),
            ErrorKind::EncodingError,
        )
    }
}

impl From<regex::Error> for LokiError {
    fn from(err: regex::Error) -> Self {
        LokiError::new(
            &format!("Invalid regular expression: {}", err),
            ErrorKind::InvalidQuery,
        )
    }
}

impl From<std::io::Error> for LokiError {
    fn from(err: std::io::Error) -> Self {
        LokiError::new(&format!("IO error: {}", err), ErrorKind::PersistenceError)
    }
}

impl From<std::string::FromUtf8Error> for LokiError {
    fn from(err: std::string::FromUtf8Error) -> Self {
        LokiError::new(
            &format!("UTF-8 encoding error: {}", err),
            ErrorKind::EncodingError,
        )
    }
}
