use chrono::Utc;

use crate::domain::crossing::{CrossingResult, CrossingStatus};
use crate::errors::DomainError;

/// Records the manual resolution of a discrepancy crossing result.
///
/// One-way: only a `Discrepancy` result can be resolved, the comment is
/// mandatory, and there is no unresolve operation.
#[derive(Clone, Debug, Default)]
pub struct CrossingResolutionWorkflow;

impl CrossingResolutionWorkflow {
    pub fn new() -> Self {
        Self
    }

    pub fn resolve(
        &self,
        result: CrossingResult,
        resolver: &str,
        comment: &str,
    ) -> Result<CrossingResult, DomainError> {
        if result.status != CrossingStatus::Discrepancy {
            return Err(DomainError::InvalidCrossingState { status: result.status });
        }

        let comment = comment.trim();
        if comment.is_empty() {
            return Err(DomainError::Validation(
                "a resolution comment is required".to_string(),
            ));
        }

        let mut resolved = result;
        resolved.status = CrossingStatus::Resolved;
        resolved.resolved_by = Some(resolver.to_string());
        resolved.resolution_comment = Some(comment.to_string());
        resolved.resolved_at = Some(Utc::now());
        Ok(resolved)
    }
}
