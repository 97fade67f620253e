//! Deterministic demo dataset for local development and smoke checks.
//!
//! Seeds one operation that has walked the lifecycle to SubmittedToCustoms,
//! with a preliminary and a final declaration that cross with known
//! discrepancies (CIF and one tariff line quantity).

use chrono::Utc;
use rust_decimal::Decimal;

use despacho_core::domain::declaration::{
    Declaration, DeclarationId, DeclarationType, TariffLine,
};
use despacho_core::domain::operation::{
    InspectionType, Operation, OperationId, StatusHistoryEntry,
};
use despacho_core::lifecycle::catalog::OperationStatus;

use crate::repositories::{
    DeclarationRepository, OperationRepository, RepositoryError, SqlDeclarationRepository,
    SqlOperationRepository,
};
use crate::DbPool;

pub const SEED_OPERATION_ID: &str = "OP-DEMO-0001";

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct SeedResult {
    pub operation_id: OperationId,
    pub declarations: usize,
    pub history_entries: usize,
}

pub async fn seed_demo_dataset(pool: &DbPool) -> Result<SeedResult, RepositoryError> {
    let operations = SqlOperationRepository::new(pool.clone());
    let declarations = SqlDeclarationRepository::new(pool.clone());

    let operation_id = OperationId(SEED_OPERATION_ID.to_string());
    if operations.find_by_id(&operation_id).await?.is_some() {
        return Ok(SeedResult { operation_id, declarations: 0, history_entries: 0 });
    }

    let now = Utc::now();
    operations
        .create(Operation {
            id: operation_id.clone(),
            reference: "IMP-2026-0147".to_string(),
            client_name: "Andina Trading SA".to_string(),
            status: OperationStatus::SubmittedToCustoms,
            inspection_type: Some(InspectionType::Visual),
            version: 1,
            created_at: now,
            updated_at: now,
        })
        .await?;

    let walked = [
        (OperationStatus::Draft, OperationStatus::DocumentationComplete),
        (OperationStatus::DocumentationComplete, OperationStatus::InReview),
        (OperationStatus::InReview, OperationStatus::PreliquidationReview),
        (OperationStatus::PreliquidationReview, OperationStatus::AnalystAssigned),
        (OperationStatus::AnalystAssigned, OperationStatus::DeclarationInProgress),
        (OperationStatus::DeclarationInProgress, OperationStatus::SubmittedToCustoms),
    ];
    for (previous, new) in walked {
        operations
            .append_history(StatusHistoryEntry {
                operation_id: operation_id.clone(),
                previous_status: previous,
                new_status: new,
                actor: "seed".to_string(),
                comment: None,
                source_ip: None,
                occurred_at: now,
            })
            .await?;
    }

    declarations
        .save(declaration(
            "DEC-DEMO-0001",
            &operation_id,
            DeclarationType::Preliminary,
            Decimal::new(100_000, 2),
            Decimal::new(120_000, 2),
            Decimal::new(10, 0),
        ))
        .await?;
    declarations
        .save(declaration(
            "DEC-DEMO-0002",
            &operation_id,
            DeclarationType::Final,
            Decimal::new(100_000, 2),
            Decimal::new(125_000, 2),
            Decimal::new(12, 0),
        ))
        .await?;

    Ok(SeedResult { operation_id, declarations: 2, history_entries: walked.len() })
}

fn declaration(
    id: &str,
    operation_id: &OperationId,
    declaration_type: DeclarationType,
    fob: Decimal,
    cif: Decimal,
    line_quantity: Decimal,
) -> Declaration {
    let now = Utc::now();
    Declaration {
        id: DeclarationId(id.to_string()),
        operation_id: operation_id.clone(),
        declaration_type,
        fob_value: fob,
        freight_value: Decimal::new(18_000, 2),
        insurance_value: Decimal::new(2_000, 2),
        cif_value: cif,
        taxable_base: cif,
        total_taxes: Decimal::new(22_500, 2),
        gatt_method: Some("transaction_value".to_string()),
        lines: vec![TariffLine {
            line_number: 1,
            tariff_code: "8471.30.00".to_string(),
            quantity: line_quantity,
            unit_value: Decimal::new(10_000, 2),
            total_value: Decimal::new(100_000, 2),
            tax_rate: Decimal::new(1_800, 2),
            tax_amount: Decimal::new(18_000, 2),
        }],
        created_at: now,
        updated_at: now,
    }
}

#[cfg(test)]
mod tests {
    use despacho_core::domain::operation::OperationId;
    use despacho_core::lifecycle::history::replay;
    use despacho_core::lifecycle::catalog::OperationStatus;

    use super::{seed_demo_dataset, SEED_OPERATION_ID};
    use crate::repositories::{OperationRepository, SqlOperationRepository};
    use crate::{connect_with_settings, migrations};

    #[tokio::test]
    async fn seed_is_idempotent_and_replayable() {
        let pool = connect_with_settings("sqlite::memory:", 1, 30).await.expect("connect");
        migrations::run_pending(&pool).await.expect("migrations");

        let first = seed_demo_dataset(&pool).await.expect("first seed");
        assert_eq!(first.declarations, 2);
        assert_eq!(first.history_entries, 6);

        let second = seed_demo_dataset(&pool).await.expect("second seed");
        assert_eq!(second.declarations, 0, "re-seeding must not duplicate data");

        let history = SqlOperationRepository::new(pool.clone())
            .list_history(&OperationId(SEED_OPERATION_ID.to_string()))
            .await
            .expect("history");
        assert_eq!(replay(&history), Ok(OperationStatus::SubmittedToCustoms));
    }
}
