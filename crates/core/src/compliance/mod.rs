//! Contract for the external compliance rule engine.
//!
//! The gate is consulted before every status transition commits. Rule codes
//! arrive over the wire as strings; they decode into a closed variant type
//! with an explicit `Unknown` fallback so an unrecognized code is carried
//! through verbatim instead of being dropped or mistranslated.

use std::collections::HashMap;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::domain::operation::Operation;
use crate::lifecycle::catalog::OperationStatus;

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RuleCode {
    DocumentationIncomplete,
    DocumentBlocked,
    DocumentObserved,
    DocumentRequiresReplacement,
    ApprovalMissingTechnical,
    ApprovalMissingFinal,
    #[serde(untagged)]
    Unknown(String),
}

impl RuleCode {
    pub fn as_str(&self) -> &str {
        match self {
            Self::DocumentationIncomplete => "documentation_incomplete",
            Self::DocumentBlocked => "document_blocked",
            Self::DocumentObserved => "document_observed",
            Self::DocumentRequiresReplacement => "document_requires_replacement",
            Self::ApprovalMissingTechnical => "approval_missing_technical",
            Self::ApprovalMissingFinal => "approval_missing_final",
            Self::Unknown(code) => code,
        }
    }

    /// Total decode: codes this build does not know become `Unknown`.
    pub fn parse(value: &str) -> Self {
        match value.trim().to_ascii_lowercase().as_str() {
            "documentation_incomplete" => Self::DocumentationIncomplete,
            "document_blocked" => Self::DocumentBlocked,
            "document_observed" => Self::DocumentObserved,
            "document_requires_replacement" => Self::DocumentRequiresReplacement,
            "approval_missing_technical" => Self::ApprovalMissingTechnical,
            "approval_missing_final" => Self::ApprovalMissingFinal,
            _ => Self::Unknown(value.trim().to_string()),
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct RuleViolation {
    pub code: RuleCode,
    pub message: String,
}

impl RuleViolation {
    pub fn new(code: RuleCode, message: impl Into<String>) -> Self {
        Self { code, message: message.into() }
    }
}

/// Verdict of the rule engine for one candidate transition.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ComplianceReport {
    pub passed: bool,
    pub violations: Vec<RuleViolation>,
}

impl ComplianceReport {
    pub fn passing() -> Self {
        Self { passed: true, violations: Vec::new() }
    }

    pub fn failing(violations: Vec<RuleViolation>) -> Self {
        Self { passed: false, violations }
    }
}

/// Transport-level failure of the rule engine. The transition engine treats
/// this per its fail-open policy; it is never a rule violation.
#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum GateError {
    #[error("compliance gate unavailable: {0}")]
    Unavailable(String),
    #[error("compliance gate returned an unusable response: {0}")]
    InvalidResponse(String),
}

#[async_trait]
pub trait ComplianceGate: Send + Sync {
    async fn validate(
        &self,
        operation: &Operation,
        target: OperationStatus,
    ) -> Result<ComplianceReport, GateError>;
}

#[async_trait]
impl<T> ComplianceGate for std::sync::Arc<T>
where
    T: ComplianceGate + ?Sized,
{
    async fn validate(
        &self,
        operation: &Operation,
        target: OperationStatus,
    ) -> Result<ComplianceReport, GateError> {
        (**self).validate(operation, target).await
    }
}

/// In-process gate with pre-configured verdicts, keyed by target status.
/// Used by tests and demo fixtures; unknown targets pass.
#[derive(Clone, Debug, Default)]
pub struct StaticComplianceGate {
    verdicts: HashMap<&'static str, Vec<RuleViolation>>,
    unavailable: Option<String>,
}

impl StaticComplianceGate {
    pub fn passing() -> Self {
        Self::default()
    }

    pub fn with_violations(mut self, target: OperationStatus, violations: Vec<RuleViolation>) -> Self {
        self.verdicts.insert(target.as_str(), violations);
        self
    }

    /// Simulates a gate outage for every validation call.
    pub fn unavailable(reason: impl Into<String>) -> Self {
        Self { verdicts: HashMap::new(), unavailable: Some(reason.into()) }
    }
}

#[async_trait]
impl ComplianceGate for StaticComplianceGate {
    async fn validate(
        &self,
        _operation: &Operation,
        target: OperationStatus,
    ) -> Result<ComplianceReport, GateError> {
        if let Some(reason) = &self.unavailable {
            return Err(GateError::Unavailable(reason.clone()));
        }

        match self.verdicts.get(target.as_str()) {
            Some(violations) if !violations.is_empty() => {
                Ok(ComplianceReport::failing(violations.clone()))
            }
            _ => Ok(ComplianceReport::passing()),
        }
    }
}

#[cfg(test)]
mod tests {
    use chrono::Utc;

    use super::{RuleCode, RuleViolation, StaticComplianceGate};
    use crate::compliance::ComplianceGate;
    use crate::domain::operation::{Operation, OperationId};
    use crate::lifecycle::catalog::OperationStatus;

    fn operation(status: OperationStatus) -> Operation {
        let now = Utc::now();
        Operation {
            id: OperationId("OP-1".to_string()),
            reference: "IMP-2026-0001".to_string(),
            client_name: "Acme Importers".to_string(),
            status,
            inspection_type: None,
            version: 1,
            created_at: now,
            updated_at: now,
        }
    }

    #[test]
    fn rule_code_round_trips_known_codes() {
        for code in [
            RuleCode::DocumentationIncomplete,
            RuleCode::DocumentBlocked,
            RuleCode::DocumentObserved,
            RuleCode::DocumentRequiresReplacement,
            RuleCode::ApprovalMissingTechnical,
            RuleCode::ApprovalMissingFinal,
        ] {
            assert_eq!(RuleCode::parse(code.as_str()), code);
        }
    }

    #[test]
    fn unknown_rule_code_is_carried_through_verbatim() {
        let code = RuleCode::parse("tariff_heading_mismatch");
        assert_eq!(code, RuleCode::Unknown("tariff_heading_mismatch".to_string()));
        assert_eq!(code.as_str(), "tariff_heading_mismatch");
    }

    #[tokio::test]
    async fn static_gate_fails_configured_target_and_passes_others() {
        let gate = StaticComplianceGate::passing().with_violations(
            OperationStatus::DocumentationComplete,
            vec![RuleViolation::new(
                RuleCode::DocumentationIncomplete,
                "2 of 5 required documents missing",
            )],
        );
        let operation = operation(OperationStatus::Draft);

        let blocked = gate
            .validate(&operation, OperationStatus::DocumentationComplete)
            .await
            .expect("gate reachable");
        assert!(!blocked.passed);
        assert_eq!(blocked.violations.len(), 1);

        let clear =
            gate.validate(&operation, OperationStatus::Cancelled).await.expect("gate reachable");
        assert!(clear.passed);
        assert!(clear.violations.is_empty());
    }
}
