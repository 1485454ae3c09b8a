//! Error types and error handling strategy for procsync.
//!
//! Error handling follows these principles:
//!
//! - Errors are explicit and typed (no stringly-typed errors)
//! - Constructors and destroy operations return [`Result`]
//! - Steady-state operations (`lock`, `signal`, `post`) panic on system
//!   errors: a failed syscall there means the primitive was destroyed or its
//!   memory corrupted, which is not recoverable locally
//! - Timeouts are ordinary outcomes, not failures: `try_lock` and the
//!   `*_timeout` family report them as `bool`

use core::fmt;
use std::sync::Arc;

/// The kind of error.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    /// Named object does not exist (open-existing on an absent name).
    NotExist,
    /// Named object already exists (create-exclusive collided).
    AlreadyExists,
    /// Mode or ownership mismatch on an existing object.
    PermissionDenied,
    /// Bad flag combination, zero-size region, invalid name or offset.
    InvalidArgument,
    /// The condition-variable waiter table is full.
    TooManyWaiters,
    /// A bounded wait elapsed before the condition held.
    TimedOut,
    /// Underlying syscall failure, with context.
    System,
}

/// The main error type for procsync operations.
///
/// Carries a kind, optional context text, and an optional source error, so
/// that failures render as a chain from outermost operation to innermost
/// syscall ("creating shm region: mmap failed: ENOMEM").
#[derive(Debug, Clone)]
pub struct Error {
    kind: ErrorKind,
    context: Option<String>,
    source: Option<Arc<dyn std::error::Error + Send + Sync>>,
}

impl Error {
    /// Creates a new error with the given kind.
    #[must_use]
    pub const fn new(kind: ErrorKind) -> Self {
        Self {
            kind,
            context: None,
            source: None,
        }
    }

    /// Returns the error kind.
    #[must_use]
    pub const fn kind(&self) -> ErrorKind {
        self.kind
    }

    /// Returns true if this error reports an elapsed deadline.
    #[must_use]
    pub const fn is_timeout(&self) -> bool {
        matches!(self.kind, ErrorKind::TimedOut)
    }

    /// Returns true if this error reports a missing named object.
    #[must_use]
    pub const fn is_not_exist(&self) -> bool {
        matches!(self.kind, ErrorKind::NotExist)
    }

    /// Returns true if this error reports a create-exclusive collision.
    #[must_use]
    pub const fn is_already_exists(&self) -> bool {
        matches!(self.kind, ErrorKind::AlreadyExists)
    }

    /// Adds context text to the error.
    #[must_use]
    pub fn with_context(mut self, ctx: impl Into<String>) -> Self {
        self.context = Some(ctx.into());
        self
    }

    /// Adds a source error to the chain.
    #[must_use]
    pub fn with_source(mut self, source: impl std::error::Error + Send + Sync + 'static) -> Self {
        self.source = Some(Arc::new(source));
        self
    }

    /// Creates an error from an OS errno value, mapping the well-known codes
    /// onto their kinds and wrapping everything else as [`ErrorKind::System`].
    #[must_use]
    pub fn from_errno(errno: i32) -> Self {
        let kind = match errno {
            libc::ENOENT => ErrorKind::NotExist,
            libc::EEXIST => ErrorKind::AlreadyExists,
            libc::EACCES | libc::EPERM => ErrorKind::PermissionDenied,
            libc::EINVAL => ErrorKind::InvalidArgument,
            libc::ETIMEDOUT | libc::EAGAIN => ErrorKind::TimedOut,
            _ => ErrorKind::System,
        };
        Self::new(kind).with_source(std::io::Error::from_raw_os_error(errno))
    }

    /// Creates an error from the calling thread's current errno.
    #[must_use]
    pub fn last_os_error() -> Self {
        let err = std::io::Error::last_os_error();
        Self::from_errno(err.raw_os_error().unwrap_or(0))
    }
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if let Some(ctx) = &self.context {
            write!(f, "{ctx}")?;
        } else {
            write!(f, "{:?}", self.kind)?;
        }
        if let Some(source) = &self.source {
            write!(f, ": {source}")?;
        }
        Ok(())
    }
}

impl std::error::Error for Error {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        self.source.as_ref().map(|e| e.as_ref() as _)
    }
}

impl From<std::io::Error> for Error {
    fn from(err: std::io::Error) -> Self {
        match err.raw_os_error() {
            Some(errno) => Self::from_errno(errno),
            None => {
                let kind = match err.kind() {
                    std::io::ErrorKind::NotFound => ErrorKind::NotExist,
                    std::io::ErrorKind::AlreadyExists => ErrorKind::AlreadyExists,
                    std::io::ErrorKind::PermissionDenied => ErrorKind::PermissionDenied,
                    std::io::ErrorKind::InvalidInput => ErrorKind::InvalidArgument,
                    _ => ErrorKind::System,
                };
                Self::new(kind).with_source(err)
            }
        }
    }
}

/// Extension trait for adding context to Results.
pub trait ResultExt<T> {
    /// Attach a context string on error.
    fn context(self, ctx: impl Into<String>) -> Result<T>;
    /// Attach context computed lazily on error.
    fn with_context<F: FnOnce() -> String>(self, f: F) -> Result<T>;
}

impl<T, E: Into<Error>> ResultExt<T> for core::result::Result<T, E> {
    fn context(self, ctx: impl Into<String>) -> Result<T> {
        self.map_err(|e| {
            let inner = e.into();
            Error::new(inner.kind()).with_context(ctx).with_source(inner)
        })
    }

    fn with_context<F: FnOnce() -> String>(self, f: F) -> Result<T> {
        self.map_err(|e| {
            let inner = e.into();
            Error::new(inner.kind()).with_context(f()).with_source(inner)
        })
    }
}

/// A specialized Result type for procsync operations.
pub type Result<T> = core::result::Result<T, Error>;
