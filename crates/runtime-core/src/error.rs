//! The one error shape every backend operation returns.

use std::error::Error as StdError;
use std::fmt;

/// Boxed source error carried inside a [`RuntimeError`].
pub type BoxError = Box<dyn StdError + Send + Sync + 'static>;

/// Broad classification of a runtime failure.
///
/// The kind decides the default retry hint: connectivity problems are
/// worth retrying, lookup and validation failures are not.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    /// The bot, task or run does not exist in the backend.
    NotFound,
    /// A bot with the same id already exists.
    AlreadyExists,
    /// The container engine could not be reached.
    Connection,
    /// An engine call exceeded its deadline.
    Timeout,
    /// The engine accepted the request and reported a failure.
    Engine,
    /// Backend or workload configuration is invalid.
    InvalidConfig,
    /// Local filesystem operation failed (config files, workspaces).
    Io,
    /// Anything that does not fit the buckets above.
    Internal,
}

impl ErrorKind {
    /// Default retry hint for this kind.
    fn default_retryable(self) -> bool {
        matches!(self, Self::Connection | Self::Timeout)
    }

    fn as_str(self) -> &'static str {
        match self {
            Self::NotFound => "not found",
            Self::AlreadyExists => "already exists",
            Self::Connection => "connection failed",
            Self::Timeout => "timed out",
            Self::Engine => "engine error",
            Self::InvalidConfig => "invalid configuration",
            Self::Io => "io error",
            Self::Internal => "internal error",
        }
    }
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Error returned by every runtime, backtest and download operation.
///
/// Carries the failing operation name, the workload id when one was in
/// play, a [`kind`](ErrorKind), the underlying cause, and a retryable
/// flag so callers can apply retry policy without string matching.
pub struct RuntimeError {
    op: &'static str,
    bot_id: Option<String>,
    kind: ErrorKind,
    message: Option<String>,
    source: Option<BoxError>,
    retryable: bool,
}

impl RuntimeError {
    /// New error for `op` with the kind's default retry hint.
    pub fn new(op: &'static str, kind: ErrorKind) -> Self {
        Self {
            op,
            bot_id: None,
            kind,
            message: None,
            source: None,
            retryable: kind.default_retryable(),
        }
    }

    /// Lookup miss for a bot/task/run id. Never retryable.
    pub fn not_found(op: &'static str, bot_id: impl Into<String>) -> Self {
        Self::new(op, ErrorKind::NotFound).with_bot(bot_id)
    }

    /// Invalid backend or workload configuration. Never retryable.
    pub fn invalid_config(op: &'static str, message: impl Into<String>) -> Self {
        Self::new(op, ErrorKind::InvalidConfig).with_message(message)
    }

    /// Internal invariant failure.
    pub fn internal(op: &'static str, message: impl Into<String>) -> Self {
        Self::new(op, ErrorKind::Internal).with_message(message)
    }

    /// Attach the workload id the operation was acting on.
    pub fn with_bot(mut self, bot_id: impl Into<String>) -> Self {
        self.bot_id = Some(bot_id.into());
        self
    }

    /// Attach a human-readable detail line.
    pub fn with_message(mut self, message: impl Into<String>) -> Self {
        self.message = Some(message.into());
        self
    }

    /// Attach the underlying cause.
    pub fn with_source(mut self, source: impl Into<BoxError>) -> Self {
        self.source = Some(source.into());
        self
    }

    /// Override the kind-derived retry hint.
    pub fn with_retryable(mut self, retryable: bool) -> Self {
        self.retryable = retryable;
        self
    }

    /// Operation that failed, e.g. `"create_bot"`.
    pub fn op(&self) -> &'static str {
        self.op
    }

    /// Workload id the operation was acting on, when known.
    pub fn bot_id(&self) -> Option<&str> {
        self.bot_id.as_deref()
    }

    /// Failure classification.
    pub fn kind(&self) -> ErrorKind {
        self.kind
    }

    /// Whether retrying the same call may succeed.
    pub fn is_retryable(&self) -> bool {
        self.retryable
    }

    /// True for lookup misses.
    pub fn is_not_found(&self) -> bool {
        self.kind == ErrorKind::NotFound
    }
}

impl fmt::Display for RuntimeError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} failed", self.op)?;
        if let Some(bot_id) = &self.bot_id {
            write!(f, " for bot {}", bot_id)?;
        }
        write!(f, ": {}", self.kind)?;
        if let Some(message) = &self.message {
            write!(f, ": {}", message)?;
        }
        Ok(())
    }
}

impl fmt::Debug for RuntimeError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RuntimeError")
            .field("op", &self.op)
            .field("bot_id", &self.bot_id)
            .field("kind", &self.kind)
            .field("message", &self.message)
            .field("source", &self.source)
            .field("retryable", &self.retryable)
            .finish()
    }
}

impl StdError for RuntimeError {
    fn source(&self) -> Option<&(dyn StdError + 'static)> {
        self.source
            .as_deref()
            .map(|source| source as &(dyn StdError + 'static))
    }
}
