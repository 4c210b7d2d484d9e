//! Shared error currency for the Prism workspace.
//!
//! Every crate defines its own domain error enum and converts it into [`CoreError`]
//! at the boundary, the same pattern the teacher codebase uses for
//! `SwitchError -> SparkError`. `CoreError` is intentionally thin: a stable string
//! code, a human message, an [`ErrorKind`] classification that downstream retry and
//! health logic can switch on mechanically, and an optional boxed cause.

use std::fmt;

/// Domain-level classification of an error, independent of which crate raised it.
///
/// Mirrors §7 of the specification exactly: these six kinds drive every retry,
/// health-propagation, and "is this fatal" decision in the runtime.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    /// Malformed config, unknown driver, missing required slot field. Non-retryable.
    Config,
    /// A slot's required interfaces are not met by the chosen driver. Non-retryable.
    SlotUnsatisfied,
    /// Command received in an incompatible lifecycle state. Non-retryable for that
    /// command; the stream stays open.
    InvalidState,
    /// Temporary backend failure. Retryable, subject to a retry budget.
    Transient,
    /// Unrecoverable. Triggers a transition to `Failed`.
    Fatal,
    /// Operation aborted due to Stop or a timeout.
    Cancelled,
}

impl ErrorKind {
    /// Whether the pattern-level retry budget should be consulted for this kind.
    pub fn is_retryable(self) -> bool {
        matches!(self, ErrorKind::Transient)
    }

    pub fn as_str(self) -> &'static str {
        match self {
            ErrorKind::Config => "config",
            ErrorKind::SlotUnsatisfied => "slot_unsatisfied",
            ErrorKind::InvalidState => "invalid_state",
            ErrorKind::Transient => "transient",
            ErrorKind::Fatal => "fatal",
            ErrorKind::Cancelled => "cancelled",
        }
    }
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// The stable, cross-crate error type. Analogous to `spark_core::error::CoreError`.
#[derive(Debug)]
pub struct CoreError {
    code: &'static str,
    message: String,
    kind: ErrorKind,
    /// Slot this error is attached to, if any (propagation policy in §7:
    /// "Driver-level errors are wrapped with slot context before surfacing").
    slot: Option<&'static str>,
    cause: Option<Box<dyn std::error::Error + Send + Sync + 'static>>,
}

impl CoreError {
    pub fn new(code: &'static str, kind: ErrorKind, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
            kind,
            slot: None,
            cause: None,
        }
    }

    pub fn config(code: &'static str, message: impl Into<String>) -> Self {
        Self::new(code, ErrorKind::Config, message)
    }

    pub fn slot_unsatisfied(slot: &'static str, missing_interface: impl Into<String>) -> Self {
        Self::new(
            "slot.unsatisfied",
            ErrorKind::SlotUnsatisfied,
            format!(
                "slot `{slot}` is missing required interface `{}`",
                missing_interface.into()
            ),
        )
        .with_slot(slot)
    }

    pub fn invalid_state(code: &'static str, message: impl Into<String>) -> Self {
        Self::new(code, ErrorKind::InvalidState, message)
    }

    pub fn transient(code: &'static str, message: impl Into<String>) -> Self {
        Self::new(code, ErrorKind::Transient, message)
    }

    pub fn fatal(code: &'static str, message: impl Into<String>) -> Self {
        Self::new(code, ErrorKind::Fatal, message)
    }

    pub fn cancelled(code: &'static str) -> Self {
        Self::new(code, ErrorKind::Cancelled, "operation cancelled")
    }

    pub fn with_slot(mut self, slot: &'static str) -> Self {
        self.slot = Some(slot);
        self
    }

    pub fn with_cause(mut self, cause: impl std::error::Error + Send + Sync + 'static) -> Self {
        self.cause = Some(Box::new(cause));
        self
    }

    pub fn code(&self) -> &'static str {
        self.code
    }

    pub fn kind(&self) -> ErrorKind {
        self.kind
    }

    pub fn slot(&self) -> Option<&'static str> {
        self.slot
    }

    pub fn message(&self) -> &str {
        &self.message
    }
}

impl fmt::Display for CoreError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.slot {
            Some(slot) => write!(f, "[{}] ({slot}) {}: {}", self.code, self.kind, self.message),
            None => write!(f, "[{}] {}: {}", self.code, self.kind, self.message),
        }
    }
}

impl std::error::Error for CoreError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        self.cause
            .as_ref()
            .map(|c| c.as_ref() as &(dyn std::error::Error + 'static))
    }
}

pub type Result<T> = std::result::Result<T, CoreError>;
