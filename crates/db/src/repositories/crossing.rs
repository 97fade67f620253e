use sqlx::Row;

use despacho_core::domain::crossing::{
    CrossingResult, CrossingResultId, CrossingStatus, Discrepancy, DiscrepancyField,
};
use despacho_core::domain::declaration::DeclarationId;
use despacho_core::domain::operation::OperationId;

use super::declaration::{parse_decimal, parse_timestamp};
use super::{CrossingRepository, RepositoryError};
use crate::DbPool;

pub struct SqlCrossingRepository {
    pool: DbPool,
}

impl SqlCrossingRepository {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }
}

fn row_to_discrepancy(row: &sqlx::sqlite::SqliteRow) -> Result<Discrepancy, RepositoryError> {
    let field_str: String =
        row.try_get("field").map_err(|e| RepositoryError::Decode(e.to_string()))?;
    let line_number: Option<i64> =
        row.try_get("line_number").map_err(|e| RepositoryError::Decode(e.to_string()))?;
    let preliminary_value: String =
        row.try_get("preliminary_value").map_err(|e| RepositoryError::Decode(e.to_string()))?;
    let final_value: String =
        row.try_get("final_value").map_err(|e| RepositoryError::Decode(e.to_string()))?;
    let difference: String =
        row.try_get("difference").map_err(|e| RepositoryError::Decode(e.to_string()))?;
    let description: String =
        row.try_get("description").map_err(|e| RepositoryError::Decode(e.to_string()))?;

    let field = DiscrepancyField::parse(&field_str)
        .ok_or_else(|| RepositoryError::Decode(format!("unknown discrepancy field `{field_str}`")))?;

    Ok(Discrepancy {
        field,
        line_number: line_number.map(|number| number as u32),
        preliminary_value,
        final_value,
        difference: parse_decimal(&difference)?,
        description,
    })
}

fn row_to_result(
    row: &sqlx::sqlite::SqliteRow,
    discrepancies: Vec<Discrepancy>,
) -> Result<CrossingResult, RepositoryError> {
    let id: String = row.try_get("id").map_err(|e| RepositoryError::Decode(e.to_string()))?;
    let operation_id: String =
        row.try_get("operation_id").map_err(|e| RepositoryError::Decode(e.to_string()))?;
    let preliminary_declaration_id: String = row
        .try_get("preliminary_declaration_id")
        .map_err(|e| RepositoryError::Decode(e.to_string()))?;
    let final_declaration_id: String = row
        .try_get("final_declaration_id")
        .map_err(|e| RepositoryError::Decode(e.to_string()))?;
    let status_str: String =
        row.try_get("status").map_err(|e| RepositoryError::Decode(e.to_string()))?;
    let resolved_by: Option<String> =
        row.try_get("resolved_by").map_err(|e| RepositoryError::Decode(e.to_string()))?;
    let resolution_comment: Option<String> =
        row.try_get("resolution_comment").map_err(|e| RepositoryError::Decode(e.to_string()))?;
    let resolved_at: Option<String> =
        row.try_get("resolved_at").map_err(|e| RepositoryError::Decode(e.to_string()))?;
    let executed_at: String =
        row.try_get("executed_at").map_err(|e| RepositoryError::Decode(e.to_string()))?;

    let status = CrossingStatus::parse(&status_str)
        .ok_or_else(|| RepositoryError::Decode(format!("unknown crossing status `{status_str}`")))?;
    let resolved_at = match resolved_at {
        Some(raw) => Some(parse_timestamp(&raw)?),
        None => None,
    };

    Ok(CrossingResult {
        id: CrossingResultId(id),
        operation_id: OperationId(operation_id),
        preliminary_declaration_id: DeclarationId(preliminary_declaration_id),
        final_declaration_id: DeclarationId(final_declaration_id),
        status,
        discrepancies,
        resolved_by,
        resolution_comment,
        resolved_at,
        executed_at: parse_timestamp(&executed_at)?,
    })
}

#[async_trait::async_trait]
impl CrossingRepository for SqlCrossingRepository {
    async fn find_by_operation(
        &self,
        operation_id: &OperationId,
    ) -> Result<Option<CrossingResult>, RepositoryError> {
        let row = sqlx::query(
            "SELECT id, operation_id, preliminary_declaration_id, final_declaration_id,
                    status, resolved_by, resolution_comment, resolved_at, executed_at
             FROM crossing_result WHERE operation_id = ?",
        )
        .bind(&operation_id.0)
        .fetch_optional(&self.pool)
        .await?;

        let Some(row) = row else {
            return Ok(None);
        };

        let id: String = row.try_get("id").map_err(|e| RepositoryError::Decode(e.to_string()))?;
        let discrepancy_rows: Vec<sqlx::sqlite::SqliteRow> = sqlx::query(
            "SELECT field, line_number, preliminary_value, final_value, difference, description
             FROM crossing_discrepancy
             WHERE crossing_result_id = ?
             ORDER BY position ASC",
        )
        .bind(&id)
        .fetch_all(&self.pool)
        .await?;

        let discrepancies =
            discrepancy_rows.iter().map(row_to_discrepancy).collect::<Result<Vec<_>, _>>()?;
        Ok(Some(row_to_result(&row, discrepancies)?))
    }

    async fn replace(&self, result: CrossingResult) -> Result<(), RepositoryError> {
        let mut tx = self.pool.begin().await?;

        // one current result per operation; discrepancy rows cascade
        sqlx::query("DELETE FROM crossing_result WHERE operation_id = ?")
            .bind(&result.operation_id.0)
            .execute(&mut *tx)
            .await?;

        sqlx::query(
            "INSERT INTO crossing_result (id, operation_id, preliminary_declaration_id,
                                          final_declaration_id, status, resolved_by,
                                          resolution_comment, resolved_at, executed_at)
             VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?)",
        )
        .bind(&result.id.0)
        .bind(&result.operation_id.0)
        .bind(&result.preliminary_declaration_id.0)
        .bind(&result.final_declaration_id.0)
        .bind(result.status.as_str())
        .bind(&result.resolved_by)
        .bind(&result.resolution_comment)
        .bind(result.resolved_at.map(|timestamp| timestamp.to_rfc3339()))
        .bind(result.executed_at.to_rfc3339())
        .execute(&mut *tx)
        .await?;

        for (position, discrepancy) in result.discrepancies.iter().enumerate() {
            sqlx::query(
                "INSERT INTO crossing_discrepancy (crossing_result_id, position, field,
                                                   line_number, preliminary_value, final_value,
                                                   difference, description)
                 VALUES (?, ?, ?, ?, ?, ?, ?, ?)",
            )
            .bind(&result.id.0)
            .bind(position as i64)
            .bind(discrepancy.field.as_str())
            .bind(discrepancy.line_number.map(|number| number as i64))
            .bind(&discrepancy.preliminary_value)
            .bind(&discrepancy.final_value)
            .bind(discrepancy.difference.to_string())
            .bind(&discrepancy.description)
            .execute(&mut *tx)
            .await?;
        }

        tx.commit().await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use chrono::Utc;
    use rust_decimal::Decimal;

    use despacho_core::domain::crossing::{
        CrossingResult, CrossingResultId, CrossingStatus, Discrepancy, DiscrepancyField,
    };
    use despacho_core::domain::declaration::{Declaration, DeclarationId, DeclarationType};
    use despacho_core::domain::operation::{Operation, OperationId};
    use despacho_core::lifecycle::catalog::OperationStatus;

    use super::SqlCrossingRepository;
    use crate::repositories::{
        CrossingRepository, DeclarationRepository, OperationRepository, SqlDeclarationRepository,
        SqlOperationRepository,
    };
    use crate::{connect_with_settings, migrations};

    async fn setup() -> sqlx::SqlitePool {
        let pool = connect_with_settings("sqlite::memory:", 1, 30).await.expect("connect");
        migrations::run_pending(&pool).await.expect("migrations");

        let now = Utc::now();
        SqlOperationRepository::new(pool.clone())
            .create(Operation {
                id: OperationId("OP-1".to_string()),
                reference: "IMP-2026-0001".to_string(),
                client_name: "Acme Importers".to_string(),
                status: OperationStatus::SubmittedToCustoms,
                inspection_type: None,
                version: 1,
                created_at: now,
                updated_at: now,
            })
            .await
            .expect("insert operation");

        let declarations = SqlDeclarationRepository::new(pool.clone());
        for (id, declaration_type) in
            [("D-1", DeclarationType::Preliminary), ("D-2", DeclarationType::Final)]
        {
            declarations
                .save(Declaration {
                    id: DeclarationId(id.to_string()),
                    operation_id: OperationId("OP-1".to_string()),
                    declaration_type,
                    fob_value: Decimal::new(100_000, 2),
                    freight_value: Decimal::new(15_000, 2),
                    insurance_value: Decimal::new(2_000, 2),
                    cif_value: Decimal::new(117_000, 2),
                    taxable_base: Decimal::new(117_000, 2),
                    total_taxes: Decimal::new(21_060, 2),
                    gatt_method: None,
                    lines: Vec::new(),
                    created_at: now,
                    updated_at: now,
                })
                .await
                .expect("insert declaration");
        }

        pool
    }

    fn sample_result(id: &str, status: CrossingStatus) -> CrossingResult {
        let discrepancies = if status == CrossingStatus::Discrepancy {
            vec![Discrepancy {
                field: DiscrepancyField::CifValue,
                line_number: None,
                preliminary_value: "1170.00".to_string(),
                final_value: "1220.00".to_string(),
                difference: Decimal::new(5_000, 2),
                description: "CIF value differs between declarations".to_string(),
            }]
        } else {
            Vec::new()
        };

        CrossingResult {
            id: CrossingResultId(id.to_string()),
            operation_id: OperationId("OP-1".to_string()),
            preliminary_declaration_id: DeclarationId("D-1".to_string()),
            final_declaration_id: DeclarationId("D-2".to_string()),
            status,
            discrepancies,
            resolved_by: None,
            resolution_comment: None,
            resolved_at: None,
            executed_at: Utc::now(),
        }
    }

    #[tokio::test]
    async fn replace_and_find_round_trips_discrepancies() {
        let pool = setup().await;
        let repo = SqlCrossingRepository::new(pool);

        repo.replace(sample_result("CR-1", CrossingStatus::Discrepancy))
            .await
            .expect("replace");

        let found = repo
            .find_by_operation(&OperationId("OP-1".to_string()))
            .await
            .expect("find")
            .expect("result exists");
        assert_eq!(found.status, CrossingStatus::Discrepancy);
        assert_eq!(found.discrepancies.len(), 1);
        assert_eq!(found.discrepancies[0].field, DiscrepancyField::CifValue);
        assert_eq!(found.discrepancies[0].difference, Decimal::new(5_000, 2));
    }

    #[tokio::test]
    async fn replace_discards_the_previous_result() {
        let pool = setup().await;
        let repo = SqlCrossingRepository::new(pool.clone());

        repo.replace(sample_result("CR-1", CrossingStatus::Discrepancy))
            .await
            .expect("first replace");
        repo.replace(sample_result("CR-2", CrossingStatus::Match)).await.expect("second replace");

        let found = repo
            .find_by_operation(&OperationId("OP-1".to_string()))
            .await
            .expect("find")
            .expect("result exists");
        assert_eq!(found.id.0, "CR-2");
        assert_eq!(found.status, CrossingStatus::Match);
        assert!(found.discrepancies.is_empty());

        let orphaned: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM crossing_discrepancy")
            .fetch_one(&pool)
            .await
            .expect("count discrepancies");
        assert_eq!(orphaned, 0, "old discrepancy rows should cascade away");
    }

    #[tokio::test]
    async fn resolution_fields_round_trip() {
        let pool = setup().await;
        let repo = SqlCrossingRepository::new(pool);

        let mut result = sample_result("CR-1", CrossingStatus::Discrepancy);
        result.status = CrossingStatus::Resolved;
        result.resolved_by = Some("analyst-7".to_string());
        result.resolution_comment = Some("amended invoice received".to_string());
        result.resolved_at = Some(Utc::now());
        repo.replace(result).await.expect("replace");

        let found = repo
            .find_by_operation(&OperationId("OP-1".to_string()))
            .await
            .expect("find")
            .expect("result exists");
        assert_eq!(found.status, CrossingStatus::Resolved);
        assert_eq!(found.resolved_by.as_deref(), Some("analyst-7"));
        assert!(found.resolved_at.is_some());
    }
}
