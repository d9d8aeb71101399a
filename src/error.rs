use thiserror::Error;

/// Misuse of the incremental event writer.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum BufferError {
    #[error("an event is already open; call end_event() first")]
    EventInProgress,

    #[error("no event is open")]
    NoOpenEvent,

    #[error("closing a {found} while the innermost open container is a {expected}")]
    MismatchedContainer {
        expected: &'static str,
        found: &'static str,
    },

    #[error("value inside an object needs a key")]
    KeyRequired,

    #[error("array elements cannot be named (got key {0:?})")]
    UnexpectedKey(String),

    #[error("{0} nested container(s) still open")]
    UnclosedContainer(usize),

    #[error("buffer holds {len} bytes, limit is {limit}")]
    Full { len: usize, limit: usize },

    #[error("cached buffer is not a valid batch document: {0}")]
    CorruptCache(String),
}

#[derive(Debug, Error)]
pub enum CacheError {
    #[error("cache io error at {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },
}

#[derive(Debug, Error)]
pub enum TransportError {
    #[error("request timed out")]
    Timeout,

    #[error("network error: {0}")]
    Network(String),

    #[error("http client could not be built: {0}")]
    Client(String),
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("config file not found: {path}")]
    FileNotFound { path: String },

    #[error("failed to parse config {path}: {message}")]
    ParseError { path: String, message: String },

    #[error("invalid value for {field}: {message}")]
    ValidationFailed { field: String, message: String },
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CurrencyError {
    #[error("currency code cannot be empty")]
    EmptyCode,

    #[error("unknown currency code: {0}")]
    UnknownCode(String),

    #[error("invalid currency table: {0}")]
    InvalidTable(String),
}
