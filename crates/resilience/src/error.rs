//! Error taxonomy shared by every primitive in the toolkit.
//!
//! [`ResilienceError`] is generic over the wrapped operation's error type so
//! the original failure is always preserved as the error source. Primitives
//! that add their own failure modes (timeouts, open circuits, exhausted
//! polling) express them as dedicated variants rather than strings.

use std::path::PathBuf;
use std::time::Duration;

use thiserror::Error;

//==============================================================================
// Configuration Errors
//==============================================================================

/// Errors raised while building or loading configuration
#[derive(Debug, Error)]
pub enum ConfigError {
    /// A configuration value is out of range
    #[error("Invalid configuration: {message}")]
    Invalid { message: String },

    /// The primitive needs a tokio runtime and none is running
    #[error("{component} must be created from within a tokio runtime")]
    MissingRuntime { component: &'static str },

    /// The configuration file could not be read
    #[error("Failed to read configuration file {}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// The configuration document could not be parsed
    #[error("Failed to parse configuration: {message}")]
    Parse { message: String },
}

impl ConfigError {
    pub(crate) fn invalid(message: impl Into<String>) -> Self {
        Self::Invalid { message: message.into() }
    }
}

/// Configuration result type
pub type ConfigResult<T> = Result<T, ConfigError>;

//==============================================================================
// Resilience Errors
//==============================================================================

/// Errors produced by the resilience primitives
///
/// `E` is the error type of the wrapped operation. It is carried unchanged in
/// [`ResilienceError::OperationFailed`] so callers can always get back to the
/// underlying failure.
#[derive(Debug, Error)]
pub enum ResilienceError<E>
where
    E: std::error::Error + Send + Sync + 'static,
{
    /// Circuit breaker is open and still cooling down
    #[error("Circuit breaker is open, rejecting calls")]
    CircuitOpen,

    /// The operation did not settle before the timer fired
    #[error("{message}")]
    Timeout { message: String, timeout: Duration },

    /// Polling ran out of attempts before the condition held
    #[error("Polling condition not met after {attempts} attempts")]
    PollExceeded { attempts: u32 },

    /// The operation panicked or its task was dropped before completing
    #[error("Operation aborted: {reason}")]
    Aborted { reason: String },

    /// The underlying operation failed
    #[error("Operation failed")]
    OperationFailed {
        #[source]
        source: E,
    },
}

/// Result type for resilience operations
pub type ResilienceResult<T, E> = Result<T, ResilienceError<E>>;

impl<E> ResilienceError<E>
where
    E: std::error::Error + Send + Sync + 'static,
{
    /// Whether the call was rejected by an open circuit
    pub const fn is_circuit_open(&self) -> bool {
        matches!(self, Self::CircuitOpen)
    }

    /// Whether the call lost a race against its timeout
    pub const fn is_timeout(&self) -> bool {
        matches!(self, Self::Timeout { .. })
    }

    /// Whether polling exhausted its attempts
    pub const fn is_poll_exceeded(&self) -> bool {
        matches!(self, Self::PollExceeded { .. })
    }

    /// Borrow the wrapped operation error, if this is an operation failure
    pub const fn operation_error(&self) -> Option<&E> {
        match self {
            Self::OperationFailed { source } => Some(source),
            _ => None,
        }
    }

    /// Take the wrapped operation error, if this is an operation failure
    pub fn into_operation_error(self) -> Option<E> {
        match self {
            Self::OperationFailed { source } => Some(source),
            _ => None,
        }
    }

    /// Convert the wrapped operation error, keeping every other variant
    pub fn map_operation<F, E2>(self, f: F) -> ResilienceError<E2>
    where
        F: FnOnce(E) -> E2,
        E2: std::error::Error + Send + Sync + 'static,
    {
        match self {
            Self::CircuitOpen => ResilienceError::CircuitOpen,
            Self::Timeout { message, timeout } => ResilienceError::Timeout { message, timeout },
            Self::PollExceeded { attempts } => ResilienceError::PollExceeded { attempts },
            Self::Aborted { reason } => ResilienceError::Aborted { reason },
            Self::OperationFailed { source } => {
                ResilienceError::OperationFailed { source: f(source) }
            }
        }
    }
}

impl<E> ResilienceError<ResilienceError<E>>
where
    E: std::error::Error + Send + Sync + 'static,
{
    /// Collapse one level of nesting produced by stacking primitives
    ///
    /// `with_timeout(breaker.execute(op))` yields
    /// `ResilienceError<ResilienceError<E>>`; flattening surfaces the inner
    /// error (for example `CircuitOpen`) directly.
    pub fn flatten(self) -> ResilienceError<E> {
        match self {
            Self::OperationFailed { source } => source,
            Self::CircuitOpen => ResilienceError::CircuitOpen,
            Self::Timeout { message, timeout } => ResilienceError::Timeout { message, timeout },
            Self::PollExceeded { attempts } => ResilienceError::PollExceeded { attempts },
            Self::Aborted { reason } => ResilienceError::Aborted { reason },
        }
    }
}
