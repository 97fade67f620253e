use sqlx::Row;

use despacho_core::domain::declaration::DeclarationId;
use despacho_core::domain::gatt::{GattForm, GattFormId};
use despacho_core::domain::operation::OperationId;

use super::declaration::{parse_decimal, parse_timestamp};
use super::{GattFormRepository, RepositoryError};
use crate::DbPool;

pub struct SqlGattFormRepository {
    pool: DbPool,
}

impl SqlGattFormRepository {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }
}

fn row_to_form(row: &sqlx::sqlite::SqliteRow) -> Result<GattForm, RepositoryError> {
    let id: String = row.try_get("id").map_err(|e| RepositoryError::Decode(e.to_string()))?;
    let operation_id: String =
        row.try_get("operation_id").map_err(|e| RepositoryError::Decode(e.to_string()))?;
    let declaration_id: String =
        row.try_get("declaration_id").map_err(|e| RepositoryError::Decode(e.to_string()))?;
    let commercial_links: i64 =
        row.try_get("commercial_links").map_err(|e| RepositoryError::Decode(e.to_string()))?;
    let commissions: String =
        row.try_get("commissions").map_err(|e| RepositoryError::Decode(e.to_string()))?;
    let unrecorded_transport: String = row
        .try_get("unrecorded_transport")
        .map_err(|e| RepositoryError::Decode(e.to_string()))?;
    let adjustment_amount: String =
        row.try_get("adjustment_amount").map_err(|e| RepositoryError::Decode(e.to_string()))?;
    let justification: String =
        row.try_get("justification").map_err(|e| RepositoryError::Decode(e.to_string()))?;
    let adjusted_taxable_base: String = row
        .try_get("adjusted_taxable_base")
        .map_err(|e| RepositoryError::Decode(e.to_string()))?;
    let completed_at: Option<String> =
        row.try_get("completed_at").map_err(|e| RepositoryError::Decode(e.to_string()))?;
    let created_at: String =
        row.try_get("created_at").map_err(|e| RepositoryError::Decode(e.to_string()))?;

    let completed_at = match completed_at {
        Some(raw) => Some(parse_timestamp(&raw)?),
        None => None,
    };

    Ok(GattForm {
        id: GattFormId(id),
        operation_id: OperationId(operation_id),
        declaration_id: DeclarationId(declaration_id),
        commercial_links: commercial_links != 0,
        commissions: parse_decimal(&commissions)?,
        unrecorded_transport: parse_decimal(&unrecorded_transport)?,
        adjustment_amount: parse_decimal(&adjustment_amount)?,
        justification,
        adjusted_taxable_base: parse_decimal(&adjusted_taxable_base)?,
        completed_at,
        created_at: parse_timestamp(&created_at)?,
    })
}

#[async_trait::async_trait]
impl GattFormRepository for SqlGattFormRepository {
    async fn find_by_operation(
        &self,
        operation_id: &OperationId,
    ) -> Result<Option<GattForm>, RepositoryError> {
        let row = sqlx::query(
            "SELECT id, operation_id, declaration_id, commercial_links, commissions,
                    unrecorded_transport, adjustment_amount, justification,
                    adjusted_taxable_base, completed_at, created_at
             FROM gatt_form WHERE operation_id = ?",
        )
        .bind(&operation_id.0)
        .fetch_optional(&self.pool)
        .await?;

        match row {
            Some(ref r) => Ok(Some(row_to_form(r)?)),
            None => Ok(None),
        }
    }

    async fn save(&self, form: GattForm) -> Result<(), RepositoryError> {
        sqlx::query(
            "INSERT INTO gatt_form (id, operation_id, declaration_id, commercial_links,
                                    commissions, unrecorded_transport, adjustment_amount,
                                    justification, adjusted_taxable_base, completed_at, created_at)
             VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
             ON CONFLICT(operation_id) DO UPDATE SET
                 commercial_links = excluded.commercial_links,
                 commissions = excluded.commissions,
                 unrecorded_transport = excluded.unrecorded_transport,
                 adjustment_amount = excluded.adjustment_amount,
                 justification = excluded.justification,
                 adjusted_taxable_base = excluded.adjusted_taxable_base,
                 completed_at = excluded.completed_at",
        )
        .bind(&form.id.0)
        .bind(&form.operation_id.0)
        .bind(&form.declaration_id.0)
        .bind(form.commercial_links as i64)
        .bind(form.commissions.to_string())
        .bind(form.unrecorded_transport.to_string())
        .bind(form.adjustment_amount.to_string())
        .bind(&form.justification)
        .bind(form.adjusted_taxable_base.to_string())
        .bind(form.completed_at.map(|timestamp| timestamp.to_rfc3339()))
        .bind(form.created_at.to_rfc3339())
        .execute(&self.pool)
        .await?;

        Ok(())
    }
}
