//! Per-execution phase machine
//!
//! ```text
//! Pending → Validating → Rejected                       (terminal)
//!                      → Authorized → Executing → Succeeded (terminal)
//!                                               → Failed    (terminal)
//!                                               → TimedOut  (terminal)
//! ```
//!
//! `Rejected` and `TimedOut` both surface as failed results; only `Rejected`
//! carries a validation-class message.

use crate::errors::{Result, SandboxError};
use serde::{Deserialize, Serialize};

/// Phase of a single execution
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ExecutionPhase {
    /// Request received
    Pending,

    /// Tool lookup, parameter and path checks
    Validating,

    /// Refused before any tool behavior ran (terminal)
    Rejected,

    /// All checks passed
    Authorized,

    /// Tool behavior in flight
    Executing,

    /// Tool behavior completed (terminal)
    Succeeded,

    /// Tool behavior returned an error (terminal)
    Failed,

    /// Time bound elapsed (terminal)
    TimedOut,
}

/// Events driving phase transitions
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PhaseEvent {
    Begin,
    Reject,
    Authorize,
    Dispatch,
    Complete,
    Fail,
    Expire,
}

impl ExecutionPhase {
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            ExecutionPhase::Rejected
                | ExecutionPhase::Succeeded
                | ExecutionPhase::Failed
                | ExecutionPhase::TimedOut
        )
    }

    /// Attempt a transition; terminal phases accept no further events
    pub fn transition(&self, event: PhaseEvent) -> Result<ExecutionPhase> {
        use ExecutionPhase::*;
        use PhaseEvent::*;

        let next = match (self, event) {
            (Pending, Begin) => Validating,
            (Validating, Reject) => Rejected,
            (Validating, Authorize) => Authorized,
            (Authorized, Dispatch) => Executing,
            (Executing, Complete) => Succeeded,
            (Executing, Fail) => Failed,
            (Executing, Expire) => TimedOut,
            (from, event) => {
                return Err(SandboxError::InvalidTransition {
                    from: format!("{:?}", from),
                    event: format!("{:?}", event),
                });
            }
        };

        Ok(next)
    }

    /// Event that ends an in-flight execution with `error`
    pub fn failure_event(&self, error: &SandboxError) -> PhaseEvent {
        match (self, error) {
            (ExecutionPhase::Executing, SandboxError::Timeout { .. }) => PhaseEvent::Expire,
            (ExecutionPhase::Executing, _) => PhaseEvent::Fail,
            _ => PhaseEvent::Reject,
        }
    }
}
