use thiserror::Error;

use crate::compliance::RuleViolation;
use crate::domain::crossing::CrossingStatus;
use crate::domain::declaration::DeclarationType;
use crate::domain::operation::{InspectionType, OperationId};
use crate::lifecycle::catalog::OperationStatus;

/// Business-rule failures of the engine. None of these are retried by the
/// engine itself; retries, if any, belong to the caller.
#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum DomainError {
    #[error("operation is in terminal state {}", .status.label())]
    TerminalState { status: OperationStatus },
    #[error("invalid status transition from {} to {}", .from.label(), .to.label())]
    InvalidTransition { from: OperationStatus, to: OperationStatus },
    #[error("compliance validation failed with {} violation(s)", .violations.len())]
    Compliance { violations: Vec<RuleViolation> },
    #[error("compliance gate unavailable: {reason}")]
    GateUnavailable { reason: String },
    #[error("operation {operation_id} has no {} declaration", .missing.label())]
    MissingDeclaration { operation_id: OperationId, missing: DeclarationType },
    #[error("operation {operation_id} already has a {} declaration", .declaration_type.label())]
    DuplicateDeclaration { operation_id: OperationId, declaration_type: DeclarationType },
    #[error("crossing result is {} and cannot be resolved", .status.as_str())]
    InvalidCrossingState { status: CrossingStatus },
    #[error("crossing result is already resolved; pass force to replace it")]
    CrossingAlreadyResolved,
    #[error("valuation form is already finalized")]
    AlreadyFinalized,
    #[error("GATT adjustment does not apply to inspection type {}", inspection_label(.inspection_type))]
    GattNotApplicable { inspection_type: Option<InspectionType> },
    #[error("validation failed: {0}")]
    Validation(String),
}

fn inspection_label(inspection_type: &Option<InspectionType>) -> &'static str {
    inspection_type.map(|inspection| inspection.as_str()).unwrap_or("none")
}

impl DomainError {
    /// Stable machine-readable kind, carried end-to-end in API error
    /// payloads instead of being re-derived from the message text.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::TerminalState { .. } => "TERMINAL_STATE",
            Self::InvalidTransition { .. } => "INVALID_TRANSITION",
            Self::Compliance { .. } => "COMPLIANCE_FAILED",
            Self::GateUnavailable { .. } => "GATE_UNAVAILABLE",
            Self::MissingDeclaration { .. } => "MISSING_DECLARATION",
            Self::DuplicateDeclaration { .. } => "DUPLICATE_DECLARATION",
            Self::InvalidCrossingState { .. } => "INVALID_STATE",
            Self::CrossingAlreadyResolved => "CROSSING_RESOLVED",
            Self::AlreadyFinalized => "ALREADY_FINALIZED",
            Self::GattNotApplicable { .. } => "GATT_NOT_APPLICABLE",
            Self::Validation(_) => "VALIDATION_ERROR",
        }
    }
}

/// Failures of the orchestration layer around the engine.
#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum ApplicationError {
    #[error(transparent)]
    Domain(#[from] DomainError),
    #[error("{resource} {id} not found")]
    NotFound { resource: &'static str, id: String },
    #[error("operation {operation_id} was modified concurrently; retry with fresh state")]
    ConcurrentModification { operation_id: OperationId },
    #[error("persistence failure: {0}")]
    Persistence(String),
}

impl ApplicationError {
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Domain(domain) => domain.kind(),
            Self::NotFound { .. } => "NOT_FOUND",
            Self::ConcurrentModification { .. } => "CONCURRENT_MODIFICATION",
            Self::Persistence(_) => "PERSISTENCE_FAILURE",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::{ApplicationError, DomainError};
    use crate::compliance::{RuleCode, RuleViolation};
    use crate::domain::operation::OperationId;
    use crate::lifecycle::catalog::OperationStatus;

    #[test]
    fn invalid_transition_message_uses_human_readable_labels() {
        let error = DomainError::InvalidTransition {
            from: OperationStatus::Draft,
            to: OperationStatus::SubmittedToCustoms,
        };
        assert_eq!(
            error.to_string(),
            "invalid status transition from Draft to Submitted to customs"
        );
        assert_eq!(error.kind(), "INVALID_TRANSITION");
    }

    #[test]
    fn compliance_error_keeps_all_violations() {
        let error = DomainError::Compliance {
            violations: vec![
                RuleViolation::new(RuleCode::DocumentBlocked, "invoice blocked"),
                RuleViolation::new(RuleCode::DocumentObserved, "packing list observed"),
            ],
        };
        assert_eq!(error.kind(), "COMPLIANCE_FAILED");
        assert!(error.to_string().contains("2 violation(s)"));
    }

    #[test]
    fn application_error_kind_passes_domain_kind_through() {
        let error = ApplicationError::from(DomainError::AlreadyFinalized);
        assert_eq!(error.kind(), "ALREADY_FINALIZED");

        let conflict = ApplicationError::ConcurrentModification {
            operation_id: OperationId("OP-9".to_string()),
        };
        assert_eq!(conflict.kind(), "CONCURRENT_MODIFICATION");
    }
}
