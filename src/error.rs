//! Error taxonomy for task execution.
//!
//! Device work is split into two failure tiers. A [`TaskHalt`] with
//! [`HaltDisposition::Skip`] means the task stopped before any destructive
//! change was made to the device, so the record is auto-confirmed and no
//! operator attention is required. A halt with [`HaltDisposition::Fail`]
//! means a destructive step (boot configuration, reload) may have landed,
//! so the task stays unconfirmed until an operator acknowledges it.
//!
//! Everything else (collaborator bugs, broken invariants) travels as
//! [`ExecutionError::Internal`] and is surfaced by the worker boundary as a
//! generic failure with the `fail-unknown` reason.

use serde::{Deserialize, Serialize};

use crate::record::FailReason;

/// Whether a halt happened before or after the first destructive step.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum HaltDisposition {
    /// Pre-destructive stop. Safe to retry, auto-confirmed.
    Skip,
    /// Post-destructive stop. Needs operator acknowledgement.
    Fail,
}

impl std::fmt::Display for HaltDisposition {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            HaltDisposition::Skip => write!(f, "skip"),
            HaltDisposition::Fail => write!(f, "fail"),
        }
    }
}

/// Typed control-flow signal that stops a task with a classified outcome.
///
/// Raised exactly once per task, at the point of first unrecoverable
/// trouble, and caught at the worker boundary.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("{reason}: {message}")]
pub struct TaskHalt {
    pub disposition: HaltDisposition,
    pub reason: FailReason,
    pub message: String,
}

impl TaskHalt {
    pub fn skip(reason: FailReason, message: impl Into<String>) -> Self {
        Self {
            disposition: HaltDisposition::Skip,
            reason,
            message: message.into(),
        }
    }

    pub fn fail(reason: FailReason, message: impl Into<String>) -> Self {
        Self {
            disposition: HaltDisposition::Fail,
            reason,
            message: message.into(),
        }
    }

    pub fn is_skip(&self) -> bool {
        self.disposition == HaltDisposition::Skip
    }
}

/// Error type threaded through every execution step.
#[derive(Debug, thiserror::Error)]
pub enum ExecutionError {
    /// Classified halt, carries the terminal status already written to the
    /// task record.
    #[error(transparent)]
    Halted(#[from] TaskHalt),
    /// Anything the taxonomy does not recognize; mapped to `fail-unknown`
    /// by the worker.
    #[error(transparent)]
    Internal(#[from] anyhow::Error),
}

impl ExecutionError {
    pub fn halt(&self) -> Option<&TaskHalt> {
        match self {
            ExecutionError::Halted(halt) => Some(halt),
            ExecutionError::Internal(_) => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn halt_display_includes_reason_and_message() {
        let halt = TaskHalt::skip(FailReason::FailCheck, "No Golden Image");
        assert_eq!(halt.to_string(), "fail-check: No Golden Image");
        assert!(halt.is_skip());
    }

    #[test]
    fn internal_errors_carry_no_halt() {
        let err = ExecutionError::from(anyhow::anyhow!("boom"));
        assert!(err.halt().is_none());

        let err = ExecutionError::from(TaskHalt::fail(FailReason::FailUpgrade, "lost"));
        assert_eq!(err.halt().map(|h| h.disposition), Some(HaltDisposition::Fail));
    }
}
