//! The experiment lifecycle validator: the single source of truth for
//! which mutating action is legal in which status. Callers ask
//! [`ensure_allowed`] before mutating and [`apply`] to compute the next
//! status; persistence performs the actual transition as a
//! compare-and-set so concurrent callers cannot both win.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::domain::experiment::ExperimentStatus;
use crate::errors::DomainError;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ExperimentAction {
    Submit,
    Approve,
    Reject,
    StartSimulation,
    Complete,
    Fail,
}

impl ExperimentAction {
    pub fn verb(&self) -> &'static str {
        match self {
            Self::Submit => "submit",
            Self::Approve => "approve",
            Self::Reject => "reject",
            Self::StartSimulation => "start simulation for",
            Self::Complete => "complete",
            Self::Fail => "fail",
        }
    }

    /// Statuses from which this action may be taken.
    pub fn allowed_sources(&self) -> &'static [ExperimentStatus] {
        match self {
            Self::Submit => &[ExperimentStatus::Draft],
            Self::Approve | Self::Reject => &[ExperimentStatus::PendingApproval],
            Self::StartSimulation => &[ExperimentStatus::Approved],
            Self::Complete | Self::Fail => &[ExperimentStatus::Running],
        }
    }

    pub fn target(&self) -> ExperimentStatus {
        match self {
            Self::Submit => ExperimentStatus::PendingApproval,
            Self::Approve => ExperimentStatus::Approved,
            Self::Reject => ExperimentStatus::Rejected,
            Self::StartSimulation => ExperimentStatus::Running,
            Self::Complete => ExperimentStatus::Completed,
            Self::Fail => ExperimentStatus::Failed,
        }
    }
}

impl fmt::Display for ExperimentAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.verb())
    }
}

/// Fails with the full (current, action, allowed) triple so callers can
/// build precise messages without re-deriving the transition table.
pub fn ensure_allowed(
    current: ExperimentStatus,
    action: ExperimentAction,
) -> Result<(), DomainError> {
    let allowed = action.allowed_sources();
    if allowed.contains(&current) {
        return Ok(());
    }

    Err(DomainError::InvalidState { current, action, allowed: allowed.to_vec() })
}

/// Validates and returns the target status. The status change is the
/// only mutation this module sanctions; audit and persistence belong to
/// the caller.
pub fn apply(
    current: ExperimentStatus,
    action: ExperimentAction,
) -> Result<ExperimentStatus, DomainError> {
    ensure_allowed(current, action)?;
    Ok(action.target())
}
