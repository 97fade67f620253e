use chrono::Utc;
use tracing::warn;

use crate::audit::{AuditCategory, AuditContext, AuditEvent, AuditOutcome, AuditSink};
use crate::compliance::{ComplianceGate, ComplianceReport, GateError};
use crate::domain::operation::{Operation, StatusHistoryEntry};
use crate::errors::DomainError;
use crate::lifecycle::catalog::OperationStatus;

/// One requested status change, with the audit identity of the caller.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct TransitionRequest {
    pub target: OperationStatus,
    pub actor: String,
    pub comment: Option<String>,
    pub source_ip: Option<String>,
}

impl TransitionRequest {
    pub fn new(target: OperationStatus, actor: impl Into<String>) -> Self {
        Self { target, actor: actor.into(), comment: None, source_ip: None }
    }

    pub fn with_comment(mut self, comment: impl Into<String>) -> Self {
        self.comment = Some(comment.into());
        self
    }

    pub fn with_source_ip(mut self, source_ip: impl Into<String>) -> Self {
        self.source_ip = Some(source_ip.into());
        self
    }
}

/// A validated, uncommitted transition: the mutated operation, the history
/// entry to append, and what the gate had to say. The service layer persists
/// both atomically.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct TransitionOutcome {
    pub operation: Operation,
    pub history_entry: StatusHistoryEntry,
    pub gate_report: Option<ComplianceReport>,
    pub gate_skipped: bool,
}

/// Validates and executes a single lifecycle transition.
///
/// The gate verdict is the primary guard: a failing report blocks the
/// transition with every violation attached. An *unreachable* gate does not
/// block when `fail_open` is set — brokerage operations keep moving and the
/// skip is logged and recorded on the outcome.
#[derive(Clone, Debug)]
pub struct StatusTransitionEngine<G> {
    gate: G,
    fail_open: bool,
}

impl<G> StatusTransitionEngine<G>
where
    G: ComplianceGate,
{
    pub fn new(gate: G) -> Self {
        Self { gate, fail_open: true }
    }

    pub fn with_fail_open(mut self, fail_open: bool) -> Self {
        self.fail_open = fail_open;
        self
    }

    pub async fn request_transition(
        &self,
        operation: &Operation,
        request: &TransitionRequest,
    ) -> Result<TransitionOutcome, DomainError> {
        if operation.status.is_terminal() {
            return Err(DomainError::TerminalState { status: operation.status });
        }
        if !operation.status.can_transition_to(request.target) {
            return Err(DomainError::InvalidTransition {
                from: operation.status,
                to: request.target,
            });
        }

        let (gate_report, gate_skipped) =
            match self.gate.validate(operation, request.target).await {
                Ok(report) if report.passed => (Some(report), false),
                Ok(report) => {
                    return Err(DomainError::Compliance { violations: report.violations });
                }
                Err(error) if self.fail_open => {
                    warn!(
                        event_name = "lifecycle.gate_skipped",
                        operation_id = %operation.id,
                        target = request.target.as_str(),
                        error = %error,
                        "compliance gate unreachable; proceeding fail-open"
                    );
                    (None, true)
                }
                Err(GateError::Unavailable(reason)) => {
                    return Err(DomainError::GateUnavailable { reason });
                }
                Err(GateError::InvalidResponse(reason)) => {
                    return Err(DomainError::GateUnavailable { reason });
                }
            };

        let now = Utc::now();
        let mut updated = operation.clone();
        updated.status = request.target;
        updated.updated_at = now;

        let history_entry = StatusHistoryEntry {
            operation_id: operation.id.clone(),
            previous_status: operation.status,
            new_status: request.target,
            actor: request.actor.clone(),
            comment: request.comment.clone(),
            source_ip: request.source_ip.clone(),
            occurred_at: now,
        };

        Ok(TransitionOutcome { operation: updated, history_entry, gate_report, gate_skipped })
    }

    pub async fn request_transition_with_audit<S>(
        &self,
        operation: &Operation,
        request: &TransitionRequest,
        sink: &S,
        audit: &AuditContext,
    ) -> Result<TransitionOutcome, DomainError>
    where
        S: AuditSink + ?Sized,
    {
        let result = self.request_transition(operation, request).await;
        match &result {
            Ok(outcome) => {
                sink.emit(
                    AuditEvent::new(
                        Some(operation.id.clone()),
                        audit.correlation_id.clone(),
                        "lifecycle.transition_applied",
                        AuditCategory::Lifecycle,
                        audit.actor.clone(),
                        AuditOutcome::Success,
                    )
                    .with_metadata("from", outcome.history_entry.previous_status.as_str())
                    .with_metadata("to", outcome.history_entry.new_status.as_str())
                    .with_metadata("gate_skipped", outcome.gate_skipped.to_string()),
                );
            }
            Err(error) => {
                sink.emit(
                    AuditEvent::new(
                        Some(operation.id.clone()),
                        audit.correlation_id.clone(),
                        "lifecycle.transition_rejected",
                        AuditCategory::Lifecycle,
                        audit.actor.clone(),
                        AuditOutcome::Rejected,
                    )
                    .with_metadata("target", request.target.as_str())
                    .with_metadata("error", error.to_string()),
                );
            }
        }
        result
    }
}
