//! Request-scoped orchestration around the engines.
//!
//! Every mutating entry point serializes per operation: the lock map hands
//! out one `tokio::Mutex` per operation id, and repository commits are
//! additionally guarded by the optimistic version token, so a writer that
//! lost the race surfaces `ConcurrentModification` instead of clobbering.

use std::collections::HashMap;
use std::sync::{Arc, Mutex as StdMutex};

use chrono::Utc;
use rust_decimal::Decimal;
use tracing::info;
use uuid::Uuid;

use despacho_core::audit::{AuditCategory, AuditContext, AuditEvent, AuditOutcome, AuditSink};
use despacho_core::compliance::{ComplianceGate, ComplianceReport};
use despacho_core::crossing::{CrossingResolutionWorkflow, DeclarationCrossingEngine};
use despacho_core::domain::crossing::{CrossingResult, CrossingStatus};
use despacho_core::domain::declaration::{
    Declaration, DeclarationId, DeclarationType, TariffLine,
};
use despacho_core::domain::gatt::{GattForm, GattFormId};
use despacho_core::domain::operation::{
    InspectionType, Operation, OperationId, StatusHistoryEntry,
};
use despacho_core::errors::{ApplicationError, DomainError};
use despacho_core::lifecycle::catalog::OperationStatus;
use despacho_core::lifecycle::engine::{StatusTransitionEngine, TransitionRequest};
use despacho_core::valuation::{
    requires_gatt_adjustment, DeclarationDerivation, GattAdjustmentCalculator,
};
use despacho_db::repositories::{
    CrossingRepository, DeclarationRepository, GattFormRepository, OperationRepository,
    RepositoryError,
};

/// Identity and correlation of the caller, threaded into history entries and
/// audit events.
#[derive(Clone, Debug)]
pub struct RequestContext {
    pub actor: String,
    pub correlation_id: String,
    pub source_ip: Option<String>,
}

impl RequestContext {
    pub fn new(actor: impl Into<String>, correlation_id: impl Into<String>) -> Self {
        Self { actor: actor.into(), correlation_id: correlation_id.into(), source_ip: None }
    }

    pub fn with_source_ip(mut self, source_ip: impl Into<String>) -> Self {
        self.source_ip = Some(source_ip.into());
        self
    }

    fn audit(&self, operation_id: &OperationId) -> AuditContext {
        AuditContext::new(
            Some(operation_id.clone()),
            self.correlation_id.clone(),
            self.actor.clone(),
        )
    }
}

#[derive(Clone, Debug)]
pub struct CreateOperationInput {
    pub reference: String,
    pub client_name: String,
    pub inspection_type: Option<InspectionType>,
}

#[derive(Clone, Debug)]
pub struct TariffLineInput {
    pub line_number: u32,
    pub tariff_code: String,
    pub quantity: Decimal,
    pub unit_value: Decimal,
    pub total_value: Decimal,
    pub tax_rate: Decimal,
    pub tax_amount: Decimal,
}

#[derive(Clone, Debug)]
pub struct DeclarationIntakeInput {
    pub declaration_type: DeclarationType,
    pub fob_value: Decimal,
    pub freight_value: Decimal,
    pub total_taxes: Decimal,
    pub gatt_method: Option<String>,
    pub lines: Vec<TariffLineInput>,
}

#[derive(Clone, Debug)]
pub struct GattFormInput {
    pub commercial_links: bool,
    pub commissions: Decimal,
    pub unrecorded_transport: Decimal,
    pub adjustment_amount: Decimal,
    pub justification: String,
}

/// One async mutex per operation id; entries are created on first use and
/// live for the process lifetime.
#[derive(Default)]
struct OperationLocks {
    locks: StdMutex<HashMap<String, Arc<tokio::sync::Mutex<()>>>>,
}

impl OperationLocks {
    async fn acquire(&self, operation_id: &OperationId) -> tokio::sync::OwnedMutexGuard<()> {
        let lock = {
            let mut locks = match self.locks.lock() {
                Ok(locks) => locks,
                Err(poisoned) => poisoned.into_inner(),
            };
            Arc::clone(locks.entry(operation_id.0.clone()).or_default())
        };
        lock.lock_owned().await
    }
}

pub struct OperationService {
    operations: Arc<dyn OperationRepository>,
    declarations: Arc<dyn DeclarationRepository>,
    crossings: Arc<dyn CrossingRepository>,
    gatt_forms: Arc<dyn GattFormRepository>,
    gate: Arc<dyn ComplianceGate>,
    transition_engine: StatusTransitionEngine<Arc<dyn ComplianceGate>>,
    crossing_engine: DeclarationCrossingEngine,
    resolution: CrossingResolutionWorkflow,
    calculator: GattAdjustmentCalculator,
    audit: Arc<dyn AuditSink>,
    locks: OperationLocks,
}

impl OperationService {
    pub fn new(
        operations: Arc<dyn OperationRepository>,
        declarations: Arc<dyn DeclarationRepository>,
        crossings: Arc<dyn CrossingRepository>,
        gatt_forms: Arc<dyn GattFormRepository>,
        gate: Arc<dyn ComplianceGate>,
        audit: Arc<dyn AuditSink>,
        fail_open: bool,
    ) -> Self {
        let transition_engine =
            StatusTransitionEngine::new(Arc::clone(&gate)).with_fail_open(fail_open);
        Self {
            operations,
            declarations,
            crossings,
            gatt_forms,
            gate,
            transition_engine,
            crossing_engine: DeclarationCrossingEngine::new(),
            resolution: CrossingResolutionWorkflow::new(),
            calculator: GattAdjustmentCalculator::new(),
            audit,
            locks: OperationLocks::default(),
        }
    }

    pub async fn create_operation(
        &self,
        input: CreateOperationInput,
        context: &RequestContext,
    ) -> Result<Operation, ApplicationError> {
        let now = Utc::now();
        let operation = Operation {
            id: OperationId(Uuid::new_v4().to_string()),
            reference: input.reference,
            client_name: input.client_name,
            status: OperationStatus::Draft,
            inspection_type: input.inspection_type,
            version: 1,
            created_at: now,
            updated_at: now,
        };

        self.operations.create(operation.clone()).await.map_err(map_repository_error)?;
        info!(
            event_name = "lifecycle.operation_created",
            operation_id = %operation.id,
            correlation_id = %context.correlation_id,
            actor = %context.actor,
            "operation created in draft"
        );
        Ok(operation)
    }

    pub async fn get_operation(&self, id: &OperationId) -> Result<Operation, ApplicationError> {
        self.operations
            .find_by_id(id)
            .await
            .map_err(map_repository_error)?
            .ok_or_else(|| ApplicationError::NotFound { resource: "operation", id: id.0.clone() })
    }

    pub async fn list_history(
        &self,
        id: &OperationId,
    ) -> Result<Vec<StatusHistoryEntry>, ApplicationError> {
        self.get_operation(id).await?;
        self.operations.list_history(id).await.map_err(map_repository_error)
    }

    pub async fn change_status(
        &self,
        id: &OperationId,
        target: OperationStatus,
        comment: Option<String>,
        context: &RequestContext,
    ) -> Result<Operation, ApplicationError> {
        let _guard = self.locks.acquire(id).await;

        let operation = self.get_operation(id).await?;
        let mut request = TransitionRequest::new(target, context.actor.clone());
        if let Some(comment) = comment {
            request = request.with_comment(comment);
        }
        if let Some(source_ip) = &context.source_ip {
            request = request.with_source_ip(source_ip.clone());
        }

        let outcome = self
            .transition_engine
            .request_transition_with_audit(
                &operation,
                &request,
                self.audit.as_ref(),
                &context.audit(id),
            )
            .await
            .map_err(ApplicationError::Domain)?;

        let committed = self
            .operations
            .update_with_version(outcome.operation, operation.version)
            .await
            .map_err(map_repository_error)?;
        self.operations
            .append_history(outcome.history_entry)
            .await
            .map_err(map_repository_error)?;

        Ok(committed)
    }

    /// Pass-through probe of the compliance gate. Unlike a transition, a
    /// probe has nothing to fail open into, so an unreachable gate surfaces
    /// `GATE_UNAVAILABLE`.
    pub async fn validate_compliance(
        &self,
        id: &OperationId,
        target: OperationStatus,
    ) -> Result<ComplianceReport, ApplicationError> {
        let operation = self.get_operation(id).await?;
        self.gate
            .validate(&operation, target)
            .await
            .map_err(|error| DomainError::GateUnavailable { reason: error.to_string() }.into())
    }

    pub async fn intake_declaration(
        &self,
        id: &OperationId,
        input: DeclarationIntakeInput,
        context: &RequestContext,
    ) -> Result<Declaration, ApplicationError> {
        let _guard = self.locks.acquire(id).await;

        let operation = self.get_operation(id).await?;
        let existing = self
            .declarations
            .find_by_type(id, input.declaration_type)
            .await
            .map_err(map_repository_error)?;
        if existing.is_some() {
            return Err(DomainError::DuplicateDeclaration {
                operation_id: id.clone(),
                declaration_type: input.declaration_type,
            }
            .into());
        }

        let derived = DeclarationDerivation::from_fob_and_freight(
            input.fob_value,
            input.freight_value,
        );
        let now = Utc::now();
        let declaration = Declaration {
            id: DeclarationId(Uuid::new_v4().to_string()),
            operation_id: operation.id.clone(),
            declaration_type: input.declaration_type,
            fob_value: input.fob_value,
            freight_value: input.freight_value,
            insurance_value: derived.insurance_value,
            cif_value: derived.cif_value,
            taxable_base: derived.taxable_base,
            total_taxes: input.total_taxes,
            gatt_method: input.gatt_method,
            lines: input
                .lines
                .into_iter()
                .map(|line| TariffLine {
                    line_number: line.line_number,
                    tariff_code: line.tariff_code,
                    quantity: line.quantity,
                    unit_value: line.unit_value,
                    total_value: line.total_value,
                    tax_rate: line.tax_rate,
                    tax_amount: line.tax_amount,
                })
                .collect(),
            created_at: now,
            updated_at: now,
        };

        self.declarations.save(declaration.clone()).await.map_err(map_repository_error)?;
        self.audit.emit(
            AuditEvent::new(
                Some(id.clone()),
                context.correlation_id.clone(),
                "declaration.intake_recorded",
                AuditCategory::Persistence,
                context.actor.clone(),
                AuditOutcome::Success,
            )
            .with_metadata("declaration_type", declaration.declaration_type.as_str())
            .with_metadata("cif_value", declaration.cif_value.to_string()),
        );
        Ok(declaration)
    }

    pub async fn execute_crossing(
        &self,
        id: &OperationId,
        force: bool,
        context: &RequestContext,
    ) -> Result<CrossingResult, ApplicationError> {
        let _guard = self.locks.acquire(id).await;

        self.get_operation(id).await?;
        let preliminary = self
            .declarations
            .find_by_type(id, DeclarationType::Preliminary)
            .await
            .map_err(map_repository_error)?
            .ok_or_else(|| DomainError::MissingDeclaration {
                operation_id: id.clone(),
                missing: DeclarationType::Preliminary,
            })?;
        let final_declaration = self
            .declarations
            .find_by_type(id, DeclarationType::Final)
            .await
            .map_err(map_repository_error)?
            .ok_or_else(|| DomainError::MissingDeclaration {
                operation_id: id.clone(),
                missing: DeclarationType::Final,
            })?;

        let existing = self.crossings.find_by_operation(id).await.map_err(map_repository_error)?;
        if let Some(existing) = &existing {
            if existing.status == CrossingStatus::Resolved && !force {
                return Err(DomainError::CrossingAlreadyResolved.into());
            }
        }

        let result = self
            .crossing_engine
            .execute(&preliminary, &final_declaration)
            .map_err(ApplicationError::Domain)?;
        self.crossings.replace(result.clone()).await.map_err(map_repository_error)?;

        self.audit.emit(
            AuditEvent::new(
                Some(id.clone()),
                context.correlation_id.clone(),
                "crossing.executed",
                AuditCategory::Crossing,
                context.actor.clone(),
                AuditOutcome::Success,
            )
            .with_metadata("status", result.status.as_str())
            .with_metadata("discrepancies", result.discrepancies.len().to_string())
            .with_metadata("forced", force.to_string()),
        );
        Ok(result)
    }

    pub async fn resolve_crossing(
        &self,
        id: &OperationId,
        comment: &str,
        context: &RequestContext,
    ) -> Result<CrossingResult, ApplicationError> {
        let _guard = self.locks.acquire(id).await;

        self.get_operation(id).await?;
        let existing = self
            .crossings
            .find_by_operation(id)
            .await
            .map_err(map_repository_error)?
            .ok_or_else(|| ApplicationError::NotFound {
                resource: "crossing result",
                id: id.0.clone(),
            })?;

        let resolved = self
            .resolution
            .resolve(existing, &context.actor, comment)
            .map_err(ApplicationError::Domain)?;
        self.crossings.replace(resolved.clone()).await.map_err(map_repository_error)?;

        self.audit.emit(
            AuditEvent::new(
                Some(id.clone()),
                context.correlation_id.clone(),
                "crossing.resolved",
                AuditCategory::Crossing,
                context.actor.clone(),
                AuditOutcome::Success,
            )
            .with_metadata("resolved_by", context.actor.clone()),
        );
        Ok(resolved)
    }

    pub async fn get_crossing(
        &self,
        id: &OperationId,
    ) -> Result<CrossingResult, ApplicationError> {
        self.get_operation(id).await?;
        self.crossings
            .find_by_operation(id)
            .await
            .map_err(map_repository_error)?
            .ok_or_else(|| ApplicationError::NotFound {
                resource: "crossing result",
                id: id.0.clone(),
            })
    }

    pub async fn save_gatt_form(
        &self,
        id: &OperationId,
        input: GattFormInput,
        context: &RequestContext,
    ) -> Result<GattForm, ApplicationError> {
        let _guard = self.locks.acquire(id).await;

        let operation = self.get_operation(id).await?;
        if !requires_gatt_adjustment(operation.inspection_type) {
            return Err(DomainError::GattNotApplicable {
                inspection_type: operation.inspection_type,
            }
            .into());
        }

        let final_declaration = self
            .declarations
            .find_by_type(id, DeclarationType::Final)
            .await
            .map_err(map_repository_error)?
            .ok_or_else(|| DomainError::MissingDeclaration {
                operation_id: id.clone(),
                missing: DeclarationType::Final,
            })?;

        let existing = self.gatt_forms.find_by_operation(id).await.map_err(map_repository_error)?;
        if existing.as_ref().is_some_and(GattForm::is_finalized) {
            return Err(DomainError::AlreadyFinalized.into());
        }

        let adjusted_taxable_base = self.calculator.compute_adjusted_base(
            final_declaration.taxable_base,
            input.commissions,
            input.unrecorded_transport,
            input.adjustment_amount,
        );

        let now = Utc::now();
        let form = GattForm {
            id: GattFormId(Uuid::new_v4().to_string()),
            operation_id: operation.id.clone(),
            declaration_id: final_declaration.id.clone(),
            commercial_links: input.commercial_links,
            commissions: input.commissions,
            unrecorded_transport: input.unrecorded_transport,
            adjustment_amount: input.adjustment_amount,
            justification: input.justification,
            adjusted_taxable_base,
            completed_at: Some(now),
            created_at: now,
        };

        self.gatt_forms.save(form.clone()).await.map_err(map_repository_error)?;
        self.audit.emit(
            AuditEvent::new(
                Some(id.clone()),
                context.correlation_id.clone(),
                "valuation.gatt_form_completed",
                AuditCategory::Valuation,
                context.actor.clone(),
                AuditOutcome::Success,
            )
            .with_metadata("adjusted_taxable_base", adjusted_taxable_base.to_string()),
        );
        Ok(form)
    }
}

fn map_repository_error(error: RepositoryError) -> ApplicationError {
    match error {
        RepositoryError::VersionConflict(operation_id) => {
            ApplicationError::ConcurrentModification { operation_id }
        }
        other => ApplicationError::Persistence(other.to_string()),
    }
}
