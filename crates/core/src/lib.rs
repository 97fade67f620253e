pub mod audit;
pub mod compliance;
pub mod config;
pub mod crossing;
pub mod domain;
pub mod errors;
pub mod lifecycle;
pub mod valuation;

pub use compliance::{
    ComplianceGate, ComplianceReport, GateError, RuleCode, RuleViolation, StaticComplianceGate,
};
pub use crossing::{CrossingConfig, CrossingResolutionWorkflow, DeclarationCrossingEngine};
pub use domain::crossing::{
    CrossingResult, CrossingResultId, CrossingStatus, Discrepancy, DiscrepancyField,
};
pub use domain::declaration::{Declaration, DeclarationId, DeclarationType, TariffLine};
pub use domain::gatt::{GattForm, GattFormId};
pub use domain::operation::{InspectionType, Operation, OperationId, StatusHistoryEntry};
pub use errors::{ApplicationError, DomainError};
pub use lifecycle::{OperationStatus, StatusTransitionEngine, TransitionOutcome, TransitionRequest};
pub use valuation::{
    requires_gatt_adjustment, round_currency, DeclarationDerivation, GattAdjustmentCalculator,
};
