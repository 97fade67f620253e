use std::str::FromStr;

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use sqlx::Row;

use despacho_core::domain::declaration::{
    Declaration, DeclarationId, DeclarationType, TariffLine,
};
use despacho_core::domain::operation::OperationId;

use super::{DeclarationRepository, RepositoryError};
use crate::DbPool;

pub struct SqlDeclarationRepository {
    pool: DbPool,
}

impl SqlDeclarationRepository {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }

    async fn load_lines(
        &self,
        declaration_id: &DeclarationId,
    ) -> Result<Vec<TariffLine>, RepositoryError> {
        let rows: Vec<sqlx::sqlite::SqliteRow> = sqlx::query(
            "SELECT line_number, tariff_code, quantity, unit_value, total_value, tax_rate, tax_amount
             FROM tariff_line
             WHERE declaration_id = ?
             ORDER BY line_number ASC",
        )
        .bind(&declaration_id.0)
        .fetch_all(&self.pool)
        .await?;

        rows.iter().map(row_to_line).collect::<Result<Vec<_>, _>>()
    }
}

pub(crate) fn parse_decimal(raw: &str) -> Result<Decimal, RepositoryError> {
    Decimal::from_str(raw)
        .map_err(|error| RepositoryError::Decode(format!("bad decimal `{raw}`: {error}")))
}

pub(crate) fn parse_timestamp(raw: &str) -> Result<DateTime<Utc>, RepositoryError> {
    DateTime::parse_from_rfc3339(raw)
        .map(|timestamp| timestamp.with_timezone(&Utc))
        .map_err(|error| RepositoryError::Decode(format!("bad timestamp `{raw}`: {error}")))
}

fn row_to_line(row: &sqlx::sqlite::SqliteRow) -> Result<TariffLine, RepositoryError> {
    let line_number: i64 =
        row.try_get("line_number").map_err(|e| RepositoryError::Decode(e.to_string()))?;
    let tariff_code: String =
        row.try_get("tariff_code").map_err(|e| RepositoryError::Decode(e.to_string()))?;
    let quantity: String =
        row.try_get("quantity").map_err(|e| RepositoryError::Decode(e.to_string()))?;
    let unit_value: String =
        row.try_get("unit_value").map_err(|e| RepositoryError::Decode(e.to_string()))?;
    let total_value: String =
        row.try_get("total_value").map_err(|e| RepositoryError::Decode(e.to_string()))?;
    let tax_rate: String =
        row.try_get("tax_rate").map_err(|e| RepositoryError::Decode(e.to_string()))?;
    let tax_amount: String =
        row.try_get("tax_amount").map_err(|e| RepositoryError::Decode(e.to_string()))?;

    Ok(TariffLine {
        line_number: line_number as u32,
        tariff_code,
        quantity: parse_decimal(&quantity)?,
        unit_value: parse_decimal(&unit_value)?,
        total_value: parse_decimal(&total_value)?,
        tax_rate: parse_decimal(&tax_rate)?,
        tax_amount: parse_decimal(&tax_amount)?,
    })
}

fn row_to_declaration(
    row: &sqlx::sqlite::SqliteRow,
    lines: Vec<TariffLine>,
) -> Result<Declaration, RepositoryError> {
    let id: String = row.try_get("id").map_err(|e| RepositoryError::Decode(e.to_string()))?;
    let operation_id: String =
        row.try_get("operation_id").map_err(|e| RepositoryError::Decode(e.to_string()))?;
    let type_str: String =
        row.try_get("declaration_type").map_err(|e| RepositoryError::Decode(e.to_string()))?;
    let fob_value: String =
        row.try_get("fob_value").map_err(|e| RepositoryError::Decode(e.to_string()))?;
    let freight_value: String =
        row.try_get("freight_value").map_err(|e| RepositoryError::Decode(e.to_string()))?;
    let insurance_value: String =
        row.try_get("insurance_value").map_err(|e| RepositoryError::Decode(e.to_string()))?;
    let cif_value: String =
        row.try_get("cif_value").map_err(|e| RepositoryError::Decode(e.to_string()))?;
    let taxable_base: String =
        row.try_get("taxable_base").map_err(|e| RepositoryError::Decode(e.to_string()))?;
    let total_taxes: String =
        row.try_get("total_taxes").map_err(|e| RepositoryError::Decode(e.to_string()))?;
    let gatt_method: Option<String> =
        row.try_get("gatt_method").map_err(|e| RepositoryError::Decode(e.to_string()))?;
    let created_at: String =
        row.try_get("created_at").map_err(|e| RepositoryError::Decode(e.to_string()))?;
    let updated_at: String =
        row.try_get("updated_at").map_err(|e| RepositoryError::Decode(e.to_string()))?;

    let declaration_type = DeclarationType::parse(&type_str)
        .ok_or_else(|| RepositoryError::Decode(format!("unknown declaration type `{type_str}`")))?;

    Ok(Declaration {
        id: DeclarationId(id),
        operation_id: OperationId(operation_id),
        declaration_type,
        fob_value: parse_decimal(&fob_value)?,
        freight_value: parse_decimal(&freight_value)?,
        insurance_value: parse_decimal(&insurance_value)?,
        cif_value: parse_decimal(&cif_value)?,
        taxable_base: parse_decimal(&taxable_base)?,
        total_taxes: parse_decimal(&total_taxes)?,
        gatt_method,
        lines,
        created_at: parse_timestamp(&created_at)?,
        updated_at: parse_timestamp(&updated_at)?,
    })
}

const SELECT_DECLARATION: &str = "SELECT id, operation_id, declaration_type, fob_value,
        freight_value, insurance_value, cif_value, taxable_base, total_taxes,
        gatt_method, created_at, updated_at
 FROM declaration";

#[async_trait::async_trait]
impl DeclarationRepository for SqlDeclarationRepository {
    async fn find_by_id(
        &self,
        id: &DeclarationId,
    ) -> Result<Option<Declaration>, RepositoryError> {
        let row = sqlx::query(&format!("{SELECT_DECLARATION} WHERE id = ?"))
            .bind(&id.0)
            .fetch_optional(&self.pool)
            .await?;

        match row {
            Some(ref r) => {
                let lines = self.load_lines(id).await?;
                Ok(Some(row_to_declaration(r, lines)?))
            }
            None => Ok(None),
        }
    }

    async fn find_by_type(
        &self,
        operation_id: &OperationId,
        declaration_type: DeclarationType,
    ) -> Result<Option<Declaration>, RepositoryError> {
        let row = sqlx::query(&format!(
            "{SELECT_DECLARATION} WHERE operation_id = ? AND declaration_type = ?"
        ))
        .bind(&operation_id.0)
        .bind(declaration_type.as_str())
        .fetch_optional(&self.pool)
        .await?;

        match row {
            Some(ref r) => {
                let id: String =
                    r.try_get("id").map_err(|e| RepositoryError::Decode(e.to_string()))?;
                let lines = self.load_lines(&DeclarationId(id)).await?;
                Ok(Some(row_to_declaration(r, lines)?))
            }
            None => Ok(None),
        }
    }

    async fn list_for_operation(
        &self,
        operation_id: &OperationId,
    ) -> Result<Vec<Declaration>, RepositoryError> {
        let rows: Vec<sqlx::sqlite::SqliteRow> = sqlx::query(&format!(
            "{SELECT_DECLARATION} WHERE operation_id = ? ORDER BY declaration_type ASC"
        ))
        .bind(&operation_id.0)
        .fetch_all(&self.pool)
        .await?;

        let mut declarations = Vec::with_capacity(rows.len());
        for row in &rows {
            let id: String =
                row.try_get("id").map_err(|e| RepositoryError::Decode(e.to_string()))?;
            let lines = self.load_lines(&DeclarationId(id)).await?;
            declarations.push(row_to_declaration(row, lines)?);
        }
        Ok(declarations)
    }

    async fn save(&self, declaration: Declaration) -> Result<(), RepositoryError> {
        let mut tx = self.pool.begin().await?;

        sqlx::query(
            "INSERT INTO declaration (id, operation_id, declaration_type, fob_value,
                                      freight_value, insurance_value, cif_value, taxable_base,
                                      total_taxes, gatt_method, created_at, updated_at)
             VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
             ON CONFLICT(id) DO UPDATE SET
                 fob_value = excluded.fob_value,
                 freight_value = excluded.freight_value,
                 insurance_value = excluded.insurance_value,
                 cif_value = excluded.cif_value,
                 taxable_base = excluded.taxable_base,
                 total_taxes = excluded.total_taxes,
                 gatt_method = excluded.gatt_method,
                 updated_at = excluded.updated_at",
        )
        .bind(&declaration.id.0)
        .bind(&declaration.operation_id.0)
        .bind(declaration.declaration_type.as_str())
        .bind(declaration.fob_value.to_string())
        .bind(declaration.freight_value.to_string())
        .bind(declaration.insurance_value.to_string())
        .bind(declaration.cif_value.to_string())
        .bind(declaration.taxable_base.to_string())
        .bind(declaration.total_taxes.to_string())
        .bind(&declaration.gatt_method)
        .bind(declaration.created_at.to_rfc3339())
        .bind(declaration.updated_at.to_rfc3339())
        .execute(&mut *tx)
        .await?;

        sqlx::query("DELETE FROM tariff_line WHERE declaration_id = ?")
            .bind(&declaration.id.0)
            .execute(&mut *tx)
            .await?;

        for line in &declaration.lines {
            sqlx::query(
                "INSERT INTO tariff_line (declaration_id, line_number, tariff_code, quantity,
                                          unit_value, total_value, tax_rate, tax_amount)
                 VALUES (?, ?, ?, ?, ?, ?, ?, ?)",
            )
            .bind(&declaration.id.0)
            .bind(line.line_number as i64)
            .bind(&line.tariff_code)
            .bind(line.quantity.to_string())
            .bind(line.unit_value.to_string())
            .bind(line.total_value.to_string())
            .bind(line.tax_rate.to_string())
            .bind(line.tax_amount.to_string())
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

    use despacho_core::domain::declaration::{
        Declaration, DeclarationId, DeclarationType, TariffLine,
    };
    use despacho_core::domain::operation::{Operation, OperationId};
    use despacho_core::lifecycle::catalog::OperationStatus;

    use super::SqlDeclarationRepository;
    use crate::repositories::{DeclarationRepository, OperationRepository, SqlOperationRepository};
    use crate::{connect_with_settings, migrations};

    async fn setup() -> sqlx::SqlitePool {
        let pool = connect_with_settings("sqlite::memory:", 1, 30).await.expect("connect");
        migrations::run_pending(&pool).await.expect("migrations");
        pool
    }

    async fn insert_operation(pool: &sqlx::SqlitePool, operation_id: &str) {
        let repo = SqlOperationRepository::new(pool.clone());
        let now = Utc::now();
        repo.create(Operation {
            id: OperationId(operation_id.to_string()),
            reference: "IMP-2026-0001".to_string(),
            client_name: "Acme Importers".to_string(),
            status: OperationStatus::DeclarationInProgress,
            inspection_type: None,
            version: 1,
            created_at: now,
            updated_at: now,
        })
        .await
        .expect("insert parent operation");
    }

    fn sample_declaration(
        id: &str,
        operation_id: &str,
        declaration_type: DeclarationType,
    ) -> Declaration {
        let now = Utc::now();
        Declaration {
            id: DeclarationId(id.to_string()),
            operation_id: OperationId(operation_id.to_string()),
            declaration_type,
            fob_value: Decimal::new(100_000, 2),
            freight_value: Decimal::new(15_000, 2),
            insurance_value: Decimal::new(2_000, 2),
            cif_value: Decimal::new(117_000, 2),
            taxable_base: Decimal::new(117_000, 2),
            total_taxes: Decimal::new(21_060, 2),
            gatt_method: Some("transaction_value".to_string()),
            lines: vec![
                TariffLine {
                    line_number: 1,
                    tariff_code: "8471.30.00".to_string(),
                    quantity: Decimal::new(10, 0),
                    unit_value: Decimal::new(10_000, 2),
                    total_value: Decimal::new(100_000, 2),
                    tax_rate: Decimal::new(1_800, 2),
                    tax_amount: Decimal::new(18_000, 2),
                },
                TariffLine {
                    line_number: 2,
                    tariff_code: "8473.30.10".to_string(),
                    quantity: Decimal::new(5, 0),
                    unit_value: Decimal::new(3_400, 2),
                    total_value: Decimal::new(17_000, 2),
                    tax_rate: Decimal::new(1_800, 2),
                    tax_amount: Decimal::new(3_060, 2),
                },
            ],
            created_at: now,
            updated_at: now,
        }
    }

    #[tokio::test]
    async fn save_and_find_round_trips_lines_in_order() {
        let pool = setup().await;
        insert_operation(&pool, "OP-1").await;
        let repo = SqlDeclarationRepository::new(pool);

        let declaration = sample_declaration("D-1", "OP-1", DeclarationType::Preliminary);
        repo.save(declaration.clone()).await.expect("save");

        let found = repo
            .find_by_id(&declaration.id)
            .await
            .expect("find")
            .expect("declaration exists");
        assert_eq!(found.declaration_type, DeclarationType::Preliminary);
        assert_eq!(found.fob_value, Decimal::new(100_000, 2));
        assert_eq!(found.lines.len(), 2);
        assert_eq!(found.lines[0].line_number, 1);
        assert_eq!(found.lines[1].tariff_code, "8473.30.10");
    }

    #[tokio::test]
    async fn find_by_type_distinguishes_variants() {
        let pool = setup().await;
        insert_operation(&pool, "OP-1").await;
        let repo = SqlDeclarationRepository::new(pool);

        repo.save(sample_declaration("D-1", "OP-1", DeclarationType::Preliminary))
            .await
            .expect("save preliminary");
        repo.save(sample_declaration("D-2", "OP-1", DeclarationType::Final))
            .await
            .expect("save final");

        let preliminary = repo
            .find_by_type(&OperationId("OP-1".to_string()), DeclarationType::Preliminary)
            .await
            .expect("query")
            .expect("preliminary exists");
        assert_eq!(preliminary.id.0, "D-1");

        let listed =
            repo.list_for_operation(&OperationId("OP-1".to_string())).await.expect("list");
        assert_eq!(listed.len(), 2);
    }

    #[tokio::test]
    async fn second_declaration_of_same_type_violates_schema() {
        let pool = setup().await;
        insert_operation(&pool, "OP-1").await;
        let repo = SqlDeclarationRepository::new(pool);

        repo.save(sample_declaration("D-1", "OP-1", DeclarationType::Preliminary))
            .await
            .expect("first preliminary");
        let error = repo
            .save(sample_declaration("D-2", "OP-1", DeclarationType::Preliminary))
            .await
            .expect_err("unique (operation_id, declaration_type) must reject a second row");

        assert!(matches!(error, crate::repositories::RepositoryError::Database(_)));
    }

    #[tokio::test]
    async fn resave_replaces_tariff_lines() {
        let pool = setup().await;
        insert_operation(&pool, "OP-1").await;
        let repo = SqlDeclarationRepository::new(pool);

        let mut declaration = sample_declaration("D-1", "OP-1", DeclarationType::Preliminary);
        repo.save(declaration.clone()).await.expect("save");

        declaration.lines.truncate(1);
        declaration.taxable_base = Decimal::new(120_000, 2);
        repo.save(declaration.clone()).await.expect("resave");

        let found = repo
            .find_by_id(&declaration.id)
            .await
            .expect("find")
            .expect("declaration exists");
        assert_eq!(found.lines.len(), 1);
        assert_eq!(found.taxable_base, Decimal::new(120_000, 2));
    }
}
