//! Error types for IPsec control-plane and codec operations.

use std::io;
use std::time::Duration;

/// Result type for xfrmlink operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Errors that can occur during control-plane or codec operations.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// I/O error from socket operations.
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    /// JSON serialization error.
    #[cfg(feature = "output")]
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// Kernel returned an error code.
    #[error("kernel error: {message} (errno {errno})")]
    Kernel {
        /// The errno value from the kernel.
        errno: i32,
        /// Human-readable error message.
        message: String,
    },

    /// Kernel error with operation context.
    #[error("{operation}: {message} (errno {errno})")]
    KernelWithContext {
        /// The operation that failed.
        operation: String,
        /// The errno value from the kernel.
        errno: i32,
        /// Human-readable error message.
        message: String,
    },

    /// Buffer shorter than the structure it should hold.
    #[error("message truncated: expected {expected} bytes, got {actual}")]
    Truncated {
        /// Expected length.
        expected: usize,
        /// Actual bytes available.
        actual: usize,
    },

    /// Invalid message format.
    #[error("invalid message: {0}")]
    InvalidMessage(String),

    /// Invalid attribute or extension format.
    #[error("invalid attribute: {0}")]
    InvalidAttribute(String),

    /// Parse error from the extension parser.
    #[error("parse error: {0}")]
    Parse(String),

    /// Algorithm descriptor rejected before reaching the kernel.
    #[error("invalid algorithm: {0}")]
    InvalidAlgorithm(String),

    /// No free SPI in the requested range.
    #[error("no free SPI in range 0x{min:08x}-0x{max:08x}")]
    RangeExhausted {
        /// Lower bound of the range.
        min: u32,
        /// Upper bound of the range.
        max: u32,
    },

    /// No reply arrived within the connection timeout.
    #[error("timed out after {0:?} waiting for a reply")]
    Timeout(Duration),
}

/// Transport-independent classification of an [`Error`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    /// Delete or update target absent.
    NotFound,
    /// Duplicate SA id or policy key on a strict add.
    AlreadyExists,
    /// Unrecognized algorithm name or unsupported key length.
    InvalidAlgorithm,
    /// No free SPI in the requested range.
    RangeExhausted,
    /// Malformed or truncated wire data.
    Format,
    /// No route for the outbound packet.
    Unreachable,
    /// An enforcing policy exists but no SA matches it.
    Blocked,
    /// Missing privileges.
    PermissionDenied,
    /// No reply within the configured timeout.
    Timeout,
    /// Anything else.
    Other,
}

impl ErrorKind {
    /// Classify a positive errno value.
    pub fn from_errno(errno: i32) -> Self {
        match errno {
            libc::ENOENT | libc::ESRCH => Self::NotFound,
            libc::EEXIST => Self::AlreadyExists,
            libc::ENOSYS => Self::InvalidAlgorithm,
            libc::EAGAIN => Self::Blocked,
            libc::ENETUNREACH | libc::EHOSTUNREACH => Self::Unreachable,
            libc::EPERM | libc::EACCES => Self::PermissionDenied,
            libc::ETIMEDOUT => Self::Timeout,
            _ => Self::Other,
        }
    }
}

impl Error {
    /// Create a kernel error from an errno value.
    ///
    /// Netlink carries errors as negative errno values, so the sign is flipped.
    pub fn from_errno(errno: i32) -> Self {
        let message = io::Error::from_raw_os_error(-errno).to_string();
        Self::Kernel {
            errno: -errno,
            message,
        }
    }

    /// Create a kernel error with operation context.
    pub fn from_errno_with_context(errno: i32, operation: impl Into<String>) -> Self {
        let message = io::Error::from_raw_os_error(-errno).to_string();
        Self::KernelWithContext {
            operation: operation.into(),
            errno: -errno,
            message,
        }
    }

    /// Add context to this error.
    ///
    /// Wraps kernel errors with operation context. Other errors are returned unchanged.
    pub fn with_context(self, operation: impl Into<String>) -> Self {
        match self {
            Self::Kernel { errno, message } => Self::KernelWithContext {
                operation: operation.into(),
                errno,
                message,
            },
            other => other,
        }
    }

    /// Classify this error.
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::Kernel { errno, .. } | Self::KernelWithContext { errno, .. } => {
                ErrorKind::from_errno(*errno)
            }
            Self::Io(e) => match e.raw_os_error() {
                Some(errno) => ErrorKind::from_errno(errno),
                None if e.kind() == io::ErrorKind::TimedOut => ErrorKind::Timeout,
                None => ErrorKind::Other,
            },
            Self::Truncated { .. }
            | Self::InvalidMessage(_)
            | Self::InvalidAttribute(_)
            | Self::Parse(_) => ErrorKind::Format,
            Self::InvalidAlgorithm(_) => ErrorKind::InvalidAlgorithm,
            Self::RangeExhausted { .. } => ErrorKind::RangeExhausted,
            Self::Timeout(_) => ErrorKind::Timeout,
            #[cfg(feature = "output")]
            Self::Json(_) => ErrorKind::Other,
        }
    }

    /// Check if this is a "not found" error (ENOENT, ESRCH).
    pub fn is_not_found(&self) -> bool {
        self.kind() == ErrorKind::NotFound
    }

    /// Check if this is a permission error (EPERM, EACCES).
    pub fn is_permission_denied(&self) -> bool {
        self.kind() == ErrorKind::PermissionDenied
    }

    /// Check if this is an "already exists" error (EEXIST).
    pub fn is_already_exists(&self) -> bool {
        self.kind() == ErrorKind::AlreadyExists
    }

    /// Check if this is a malformed-input error.
    pub fn is_format(&self) -> bool {
        self.kind() == ErrorKind::Format
    }

    /// Get the errno value if this is a kernel or OS error.
    pub fn errno(&self) -> Option<i32> {
        match self {
            Self::Kernel { errno, .. } | Self::KernelWithContext { errno, .. } => Some(*errno),
            Self::Io(e) => e.raw_os_error(),
            _ => None,
        }
    }
}
