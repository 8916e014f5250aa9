use thiserror::Error;

use crate::domain::experiment::ExperimentStatus;
use crate::lifecycle::ExperimentAction;

/// Client-correctable failures raised by the validators and the engine.
/// None of these represent internal faults.
#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum DomainError {
    #[error(
        "cannot {action} experiment in state {current}; allowed source states: {}",
        join_labels(.allowed)
    )]
    InvalidState {
        current: ExperimentStatus,
        action: ExperimentAction,
        allowed: Vec<ExperimentStatus>,
    },
    #[error("invalid guardrail configuration: {reason}")]
    InvalidGuardrail { reason: String },
    #[error("guardrail violation: {reason}")]
    GuardrailViolation { reason: String },
    #[error("missing reference data: {reason}")]
    MissingReferenceData { reason: String },
    #[error("missing prerequisite: {reason}")]
    MissingPrerequisite { reason: String },
    #[error("unsupported lever kind: {kind}")]
    UnsupportedLeverKind { kind: String },
    #[error("domain invariant violation: {0}")]
    InvariantViolation(String),
}

fn join_labels(allowed: &[ExperimentStatus]) -> String {
    allowed.iter().map(|status| status.label()).collect::<Vec<_>>().join(", ")
}

#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum ApplicationError {
    #[error(transparent)]
    Domain(#[from] DomainError),
    #[error("persistence failure: {0}")]
    Persistence(String),
    #[error("configuration failure: {0}")]
    Configuration(String),
}

impl ApplicationError {
    /// True when the caller can fix the request (different action,
    /// missing configuration, out-of-range numbers) rather than retry.
    pub fn is_client_correctable(&self) -> bool {
        matches!(self, Self::Domain(_))
    }
}

#[cfg(test)]
mod tests {
    use crate::domain::experiment::ExperimentStatus;
    use crate::lifecycle::ExperimentAction;

    use super::{ApplicationError, DomainError};

    #[test]
    fn invalid_state_message_names_action_state_and_allowed_sources() {
        let error = DomainError::InvalidState {
            current: ExperimentStatus::Approved,
            action: ExperimentAction::Submit,
            allowed: vec![ExperimentStatus::Draft],
        };

        let message = error.to_string();
        assert!(message.contains("submit"), "message: {message}");
        assert!(message.contains("APPROVED"), "message: {message}");
        assert!(message.contains("DRAFT"), "message: {message}");
    }

    #[test]
    fn domain_errors_are_client_correctable() {
        let wrapped = ApplicationError::from(DomainError::MissingPrerequisite {
            reason: "experiment has no lever".to_string(),
        });
        assert!(wrapped.is_client_correctable());
        assert!(!ApplicationError::Persistence("lock timeout".to_string())
            .is_client_correctable());
    }
}
