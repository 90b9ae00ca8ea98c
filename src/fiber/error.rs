//! Fiber error types

use super::frame::{DialogId, ResumeAfter, ValueType};
use thiserror::Error;

/// A dialog routine broke the call/wait/done contract
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum Violation {
    #[error("dialog routine returned without calling call, wait or done")]
    NoTerminal,
    #[error("dialog routine performed more than one of call, wait or done")]
    MultipleTerminals,
    #[error("start routine received a value instead of the initiation sentinel")]
    UnexpectedInitiationValue,
    #[error("turn exceeded {0} steps without settling on a wait")]
    StepLimitExceeded(usize),
}

/// Errors that abort a turn.
///
/// A failed turn never commits: the stack stays exactly as it was before the
/// turn started.
#[derive(Debug, Error)]
pub enum FiberError {
    #[error("protocol violation: {0}")]
    ProtocolViolation(#[from] Violation),
    #[error("invalid state: {0}")]
    InvalidState(String),
    #[error("type mismatch: frame expects {expected}, got {actual}")]
    TypeMismatch {
        expected: ValueType,
        actual: ValueType,
    },
    #[error("no dialog registered as '{0}'")]
    UnknownDialog(DialogId),
    #[error("dialog '{dialog}' has no resume handler '{handler}'")]
    UnknownHandler {
        dialog: DialogId,
        handler: ResumeAfter,
    },
    #[error("dialog state: {0}")]
    State(#[from] serde_json::Error),
    #[error("dialog failed: {0}")]
    Dialog(String),
    #[error("connector failed to send message: {0}")]
    Connector(String),
}

impl FiberError {
    pub fn invalid_state(message: impl Into<String>) -> Self {
        Self::InvalidState(message.into())
    }

    pub fn dialog(message: impl Into<String>) -> Self {
        Self::Dialog(message.into())
    }

    /// Check if this failure is the dialog's fault rather than the caller's
    pub fn is_protocol_violation(&self) -> bool {
        matches!(self, Self::ProtocolViolation(_))
    }
}

pub type FiberResult<T> = Result<T, FiberError>;
