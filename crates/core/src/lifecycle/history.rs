//! Replay of the append-only status history log.
//!
//! The history is the audit trail of record: folding it from the initial
//! state must reconstruct the operation's current status, and every recorded
//! edge must be legal in the catalog. A mismatch means the log was tampered
//! with or a writer bypassed the transition engine.

use thiserror::Error;

use crate::domain::operation::StatusHistoryEntry;
use crate::lifecycle::catalog::OperationStatus;

#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum HistoryReplayError {
    #[error("history entry {index} expects previous status {} but replay reached {}", .recorded.label(), .reached.label())]
    ChainMismatch { index: usize, recorded: OperationStatus, reached: OperationStatus },
    #[error("history entry {index} records an illegal edge from {} to {}", .from.label(), .to.label())]
    IllegalEdge { index: usize, from: OperationStatus, to: OperationStatus },
}

/// Folds the ordered history into the final status. An empty history is a
/// freshly created operation, still in `Draft`.
pub fn replay(entries: &[StatusHistoryEntry]) -> Result<OperationStatus, HistoryReplayError> {
    let mut current = OperationStatus::Draft;

    for (index, entry) in entries.iter().enumerate() {
        if entry.previous_status != current {
            return Err(HistoryReplayError::ChainMismatch {
                index,
                recorded: entry.previous_status,
                reached: current,
            });
        }
        if !entry.previous_status.can_transition_to(entry.new_status) {
            return Err(HistoryReplayError::IllegalEdge {
                index,
                from: entry.previous_status,
                to: entry.new_status,
            });
        }
        current = entry.new_status;
    }

    Ok(current)
}
