//! The unified error type for catalog operations.
//!
//! Every fallible operation in the workspace returns [`Result`]. The variants
//! mirror the status kinds the catalog reports to its callers; subsystem
//! errors are converted into one of them at the boundary where enough context
//! exists to pick the right kind.

use snafu::Snafu;

/// Unified result type for catalog operations.
pub type Result<T, E = Error> = std::result::Result<T, E>;

/// Top-level error type for catalog operations.
#[derive(Debug, Snafu)]
#[snafu(visibility(pub))]
pub enum Error {
    /// A requested artifact does not exist.
    #[snafu(display("Not found: {message}"))]
    NotFound {
        /// Error description.
        message: String,
    },

    /// Persisted state is damaged or does not match expectations.
    #[snafu(display("Corruption: {message}"))]
    Corruption {
        /// Error description.
        message: String,
    },

    /// The caller supplied configuration or arguments that cannot be used.
    #[snafu(display("Invalid argument: {message}"))]
    InvalidArgument {
        /// Error description.
        message: String,
    },

    /// A runtime failure, including injected faults.
    #[snafu(display("Runtime error: {message}"))]
    RuntimeError {
        /// Error description.
        message: String,
    },

    /// An operation did not complete within its budget.
    #[snafu(display("Timed out: {message}"))]
    TimedOut {
        /// Error description.
        message: String,
    },

    /// An operation was attempted in a state that does not allow it.
    #[snafu(display("Illegal state: {message}"))]
    IllegalState {
        /// Error description.
        message: String,
    },

    /// The target component is not running or still starting up.
    #[snafu(display("Service unavailable: {message}"))]
    ServiceUnavailable {
        /// Error description.
        message: String,
    },

    /// An I/O error from the filesystem.
    #[snafu(display("I/O error: {message}: {source}"))]
    Io {
        /// What the catalog was doing when the error occurred.
        message: String,
        /// The underlying I/O error.
        source: std::io::Error,
    },
}

impl Error {
    /// Builds a `NotFound` error.
    pub fn not_found(message: impl Into<String>) -> Self {
        Error::NotFound { message: message.into() }
    }

    /// Builds a `Corruption` error.
    pub fn corruption(message: impl Into<String>) -> Self {
        Error::Corruption { message: message.into() }
    }

    /// Builds an `InvalidArgument` error.
    pub fn invalid_argument(message: impl Into<String>) -> Self {
        Error::InvalidArgument { message: message.into() }
    }

    /// Builds a `RuntimeError`.
    pub fn runtime_error(message: impl Into<String>) -> Self {
        Error::RuntimeError { message: message.into() }
    }

    /// Builds a `TimedOut` error.
    pub fn timed_out(message: impl Into<String>) -> Self {
        Error::TimedOut { message: message.into() }
    }

    /// Builds an `IllegalState` error.
    pub fn illegal_state(message: impl Into<String>) -> Self {
        Error::IllegalState { message: message.into() }
    }

    /// Builds a `ServiceUnavailable` error.
    pub fn service_unavailable(message: impl Into<String>) -> Self {
        Error::ServiceUnavailable { message: message.into() }
    }

    /// True if this is a `NotFound` error.
    pub fn is_not_found(&self) -> bool {
        matches!(self, Error::NotFound { .. })
    }

    /// True if this is a `Corruption` error.
    pub fn is_corruption(&self) -> bool {
        matches!(self, Error::Corruption { .. })
    }

    /// True if this is an `InvalidArgument` error.
    pub fn is_invalid_argument(&self) -> bool {
        matches!(self, Error::InvalidArgument { .. })
    }

    /// True if this is a `TimedOut` error.
    pub fn is_timed_out(&self) -> bool {
        matches!(self, Error::TimedOut { .. })
    }

    /// True if this is an `IllegalState` error.
    pub fn is_illegal_state(&self) -> bool {
        matches!(self, Error::IllegalState { .. })
    }

    /// True if this is a `RuntimeError`.
    pub fn is_runtime_error(&self) -> bool {
        matches!(self, Error::RuntimeError { .. })
    }

    /// True if this is a `ServiceUnavailable` error.
    pub fn is_service_unavailable(&self) -> bool {
        matches!(self, Error::ServiceUnavailable { .. })
    }

    /// Returns the same error with `prefix: ` prepended to its message.
    ///
    /// The variant is preserved so callers can still match on the kind after
    /// context has been layered on.
    #[must_use]
    pub fn prepend(self, prefix: impl AsRef<str>) -> Self {
        let prefix = prefix.as_ref();
        match self {
            Error::NotFound { message } => {
                Error::NotFound { message: format!("{prefix}: {message}") }
            }
            Error::Corruption { message } => {
                Error::Corruption { message: format!("{prefix}: {message}") }
            }
            Error::InvalidArgument { message } => {
                Error::InvalidArgument { message: format!("{prefix}: {message}") }
            }
            Error::RuntimeError { message } => {
                Error::RuntimeError { message: format!("{prefix}: {message}") }
            }
            Error::TimedOut { message } => {
                Error::TimedOut { message: format!("{prefix}: {message}") }
            }
            Error::IllegalState { message } => {
                Error::IllegalState { message: format!("{prefix}: {message}") }
            }
            Error::ServiceUnavailable { message } => {
                Error::ServiceUnavailable { message: format!("{prefix}: {message}") }
            }
            Error::Io { message, source } => {
                Error::Io { message: format!("{prefix}: {message}"), source }
            }
        }
    }
}

impl From<std::io::Error> for Error {
    fn from(source: std::io::Error) -> Self {
        Error::Io { message: "filesystem operation failed".to_string(), source }
    }
}

/// Extension trait for layering context onto error messages.
pub trait ResultExt<T> {
    /// Prepends `prefix` to the error message, preserving the error kind.
    fn prepend(self, prefix: impl AsRef<str>) -> Result<T>;
}

impl<T> ResultExt<T> for Result<T> {
    fn prepend(self, prefix: impl AsRef<str>) -> Result<T> {
        self.map_err(|e| e.prepend(prefix))
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;

    #[test]
    fn test_prepend_preserves_kind() {
        let err = Error::not_found("tablet abc").prepend("Unable to load metadata");
        assert!(err.is_not_found());
        assert_eq!(err.to_string(), "Not found: Unable to load metadata: tablet abc");
    }

    #[test]
    fn test_result_ext_prepend() {
        let result: Result<()> = Err(Error::corruption("bad schema"));
        let err = result.prepend("Load failed").unwrap_err();
        assert!(err.is_corruption());
        assert!(err.to_string().contains("Load failed: bad schema"));
    }

    #[test]
    fn test_predicates() {
        assert!(Error::timed_out("x").is_timed_out());
        assert!(Error::illegal_state("x").is_illegal_state());
        assert!(Error::invalid_argument("x").is_invalid_argument());
        assert!(!Error::runtime_error("x").is_timed_out());
    }
}
