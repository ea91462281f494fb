/// Category of a collaborator error. Lets the engine tell a missing
/// stream apart from a flaky network call or a malformed record.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    /// Invalid configuration, permanent. Fails startup.
    Config,
    /// I/O or network error reported by an upstream service.
    Io,
    /// Record could not be decoded or encoded.
    Format,
    /// The requested stream, shard or table does not exist.
    NotFound,
    /// Logical error (invalid state, generic).
    Logic,
}

impl std::fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ErrorKind::Config => f.write_str("config"),
            ErrorKind::Io => f.write_str("io"),
            ErrorKind::Format => f.write_str("format"),
            ErrorKind::NotFound => f.write_str("not found"),
            ErrorKind::Logic => f.write_str("logic"),
        }
    }
}

/// Unified error type returned by every collaborator trait method
/// (`StreamDirectory`, `ShardIterator`, `RecordDecoder`, `RecordSink`).
///
/// `?` works on the I/O and JSON errors collaborators run into; SDK and
/// HTTP errors are mapped explicitly by each backend.
#[derive(Clone)]
pub struct StreamError {
    kind: ErrorKind,
    message: String,
}

impl StreamError {
    fn of(kind: ErrorKind, msg: impl Into<String>) -> Self {
        Self { kind, message: msg.into() }
    }

    /// Invalid state reported by a collaborator.
    pub fn new(msg: impl Into<String>) -> Self {
        Self::of(ErrorKind::Logic, msg)
    }

    pub fn config(msg: impl Into<String>) -> Self {
        Self::of(ErrorKind::Config, msg)
    }

    pub fn io(msg: impl Into<String>) -> Self {
        Self::of(ErrorKind::Io, msg)
    }

    pub fn format_err(msg: impl Into<String>) -> Self {
        Self::of(ErrorKind::Format, msg)
    }

    pub fn not_found(msg: impl Into<String>) -> Self {
        Self::of(ErrorKind::NotFound, msg)
    }

    pub fn kind(&self) -> ErrorKind {
        self.kind
    }

    pub fn message(&self) -> &str {
        &self.message
    }
}

impl std::fmt::Debug for StreamError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "[{}] {}", self.kind, self.message)
    }
}

impl std::fmt::Display for StreamError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.message)
    }
}

impl std::error::Error for StreamError {}

impl From<std::io::Error> for StreamError {
    fn from(e: std::io::Error) -> Self {
        let kind = match e.kind() {
            std::io::ErrorKind::NotFound => ErrorKind::NotFound,
            std::io::ErrorKind::InvalidData => ErrorKind::Format,
            _ => ErrorKind::Io,
        };
        Self::of(kind, e.to_string())
    }
}

impl From<serde_json::Error> for StreamError {
    fn from(e: serde_json::Error) -> Self {
        let kind = if e.is_io() { ErrorKind::Io } else { ErrorKind::Format };
        Self::of(kind, e.to_string())
    }
}
