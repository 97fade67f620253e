pub mod catalog;
pub mod engine;
pub mod history;

pub use catalog::OperationStatus;
pub use engine::{StatusTransitionEngine, TransitionOutcome, TransitionRequest};
pub use history::{replay, HistoryReplayError};
