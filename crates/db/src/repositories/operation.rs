use chrono::{DateTime, Utc};
use sqlx::Row;

use despacho_core::domain::operation::{
    InspectionType, Operation, OperationId, StatusHistoryEntry,
};
use despacho_core::lifecycle::catalog::OperationStatus;

use super::{OperationRepository, RepositoryError};
use crate::DbPool;

pub struct SqlOperationRepository {
    pool: DbPool,
}

impl SqlOperationRepository {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }
}

fn parse_timestamp(raw: &str) -> Result<DateTime<Utc>, RepositoryError> {
    DateTime::parse_from_rfc3339(raw)
        .map(|timestamp| timestamp.with_timezone(&Utc))
        .map_err(|error| RepositoryError::Decode(format!("bad timestamp `{raw}`: {error}")))
}

fn parse_status(raw: &str) -> Result<OperationStatus, RepositoryError> {
    OperationStatus::parse(raw)
        .ok_or_else(|| RepositoryError::Decode(format!("unknown operation status `{raw}`")))
}

fn row_to_operation(row: &sqlx::sqlite::SqliteRow) -> Result<Operation, RepositoryError> {
    let id: String = row.try_get("id").map_err(|e| RepositoryError::Decode(e.to_string()))?;
    let reference: String =
        row.try_get("reference").map_err(|e| RepositoryError::Decode(e.to_string()))?;
    let client_name: String =
        row.try_get("client_name").map_err(|e| RepositoryError::Decode(e.to_string()))?;
    let status_str: String =
        row.try_get("status").map_err(|e| RepositoryError::Decode(e.to_string()))?;
    let inspection_str: Option<String> =
        row.try_get("inspection_type").map_err(|e| RepositoryError::Decode(e.to_string()))?;
    let version: i64 =
        row.try_get("version").map_err(|e| RepositoryError::Decode(e.to_string()))?;
    let created_at_str: String =
        row.try_get("created_at").map_err(|e| RepositoryError::Decode(e.to_string()))?;
    let updated_at_str: String =
        row.try_get("updated_at").map_err(|e| RepositoryError::Decode(e.to_string()))?;

    let inspection_type = match inspection_str {
        Some(raw) => Some(InspectionType::parse(&raw).ok_or_else(|| {
            RepositoryError::Decode(format!("unknown inspection type `{raw}`"))
        })?),
        None => None,
    };

    Ok(Operation {
        id: OperationId(id),
        reference,
        client_name,
        status: parse_status(&status_str)?,
        inspection_type,
        version: version as u32,
        created_at: parse_timestamp(&created_at_str)?,
        updated_at: parse_timestamp(&updated_at_str)?,
    })
}

fn row_to_history_entry(
    row: &sqlx::sqlite::SqliteRow,
) -> Result<StatusHistoryEntry, RepositoryError> {
    let operation_id: String =
        row.try_get("operation_id").map_err(|e| RepositoryError::Decode(e.to_string()))?;
    let previous_str: String =
        row.try_get("previous_status").map_err(|e| RepositoryError::Decode(e.to_string()))?;
    let new_str: String =
        row.try_get("new_status").map_err(|e| RepositoryError::Decode(e.to_string()))?;
    let actor: String =
        row.try_get("actor").map_err(|e| RepositoryError::Decode(e.to_string()))?;
    let comment: Option<String> =
        row.try_get("comment").map_err(|e| RepositoryError::Decode(e.to_string()))?;
    let source_ip: Option<String> =
        row.try_get("source_ip").map_err(|e| RepositoryError::Decode(e.to_string()))?;
    let occurred_at_str: String =
        row.try_get("occurred_at").map_err(|e| RepositoryError::Decode(e.to_string()))?;

    Ok(StatusHistoryEntry {
        operation_id: OperationId(operation_id),
        previous_status: parse_status(&previous_str)?,
        new_status: parse_status(&new_str)?,
        actor,
        comment,
        source_ip,
        occurred_at: parse_timestamp(&occurred_at_str)?,
    })
}

#[async_trait::async_trait]
impl OperationRepository for SqlOperationRepository {
    async fn find_by_id(&self, id: &OperationId) -> Result<Option<Operation>, RepositoryError> {
        let row = sqlx::query(
            "SELECT id, reference, client_name, status, inspection_type, version,
                    created_at, updated_at
             FROM operation WHERE id = ?",
        )
        .bind(&id.0)
        .fetch_optional(&self.pool)
        .await?;

        match row {
            Some(ref r) => Ok(Some(row_to_operation(r)?)),
            None => Ok(None),
        }
    }

    async fn create(&self, operation: Operation) -> Result<(), RepositoryError> {
        sqlx::query(
            "INSERT INTO operation (id, reference, client_name, status, inspection_type,
                                    version, created_at, updated_at)
             VALUES (?, ?, ?, ?, ?, ?, ?, ?)",
        )
        .bind(&operation.id.0)
        .bind(&operation.reference)
        .bind(&operation.client_name)
        .bind(operation.status.as_str())
        .bind(operation.inspection_type.map(|inspection| inspection.as_str()))
        .bind(operation.version as i64)
        .bind(operation.created_at.to_rfc3339())
        .bind(operation.updated_at.to_rfc3339())
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    async fn update_with_version(
        &self,
        operation: Operation,
        expected_version: u32,
    ) -> Result<Operation, RepositoryError> {
        let mut committed = operation;
        committed.version = expected_version + 1;

        let result = sqlx::query(
            "UPDATE operation
             SET reference = ?, client_name = ?, status = ?, inspection_type = ?,
                 version = ?, updated_at = ?
             WHERE id = ? AND version = ?",
        )
        .bind(&committed.reference)
        .bind(&committed.client_name)
        .bind(committed.status.as_str())
        .bind(committed.inspection_type.map(|inspection| inspection.as_str()))
        .bind(committed.version as i64)
        .bind(committed.updated_at.to_rfc3339())
        .bind(&committed.id.0)
        .bind(expected_version as i64)
        .execute(&self.pool)
        .await?;

        if result.rows_affected() == 0 {
            return Err(RepositoryError::VersionConflict(committed.id));
        }

        Ok(committed)
    }

    async fn append_history(&self, entry: StatusHistoryEntry) -> Result<(), RepositoryError> {
        sqlx::query(
            "INSERT INTO operation_status_history
                 (operation_id, previous_status, new_status, actor, comment, source_ip, occurred_at)
             VALUES (?, ?, ?, ?, ?, ?, ?)",
        )
        .bind(&entry.operation_id.0)
        .bind(entry.previous_status.as_str())
        .bind(entry.new_status.as_str())
        .bind(&entry.actor)
        .bind(&entry.comment)
        .bind(&entry.source_ip)
        .bind(entry.occurred_at.to_rfc3339())
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    async fn list_history(
        &self,
        operation_id: &OperationId,
    ) -> Result<Vec<StatusHistoryEntry>, RepositoryError> {
        let rows: Vec<sqlx::sqlite::SqliteRow> = sqlx::query(
            "SELECT operation_id, previous_status, new_status, actor, comment, source_ip, occurred_at
             FROM operation_status_history
             WHERE operation_id = ?
             ORDER BY id ASC",
        )
        .bind(&operation_id.0)
        .fetch_all(&self.pool)
        .await?;

        rows.iter().map(row_to_history_entry).collect::<Result<Vec<_>, _>>()
    }
}

#[cfg(test)]
mod tests {
    use chrono::Utc;

    use despacho_core::domain::operation::{
        InspectionType, Operation, OperationId, StatusHistoryEntry,
    };
    use despacho_core::lifecycle::catalog::OperationStatus;
    use despacho_core::lifecycle::history::replay;

    use super::SqlOperationRepository;
    use crate::repositories::{OperationRepository, RepositoryError};
    use crate::{connect_with_settings, migrations};

    async fn setup() -> sqlx::SqlitePool {
        let pool = connect_with_settings("sqlite::memory:", 1, 30).await.expect("connect");
        migrations::run_pending(&pool).await.expect("migrations");
        pool
    }

    fn sample_operation(id: &str) -> Operation {
        let now = Utc::now();
        Operation {
            id: OperationId(id.to_string()),
            reference: "IMP-2026-0001".to_string(),
            client_name: "Acme Importers".to_string(),
            status: OperationStatus::Draft,
            inspection_type: Some(InspectionType::Visual),
            version: 1,
            created_at: now,
            updated_at: now,
        }
    }

    #[tokio::test]
    async fn create_and_find_round_trip() {
        let pool = setup().await;
        let repo = SqlOperationRepository::new(pool);
        let operation = sample_operation("OP-1");

        repo.create(operation.clone()).await.expect("create");
        let found =
            repo.find_by_id(&operation.id).await.expect("find").expect("operation exists");

        assert_eq!(found.id, operation.id);
        assert_eq!(found.status, OperationStatus::Draft);
        assert_eq!(found.inspection_type, Some(InspectionType::Visual));
        assert_eq!(found.version, 1);
    }

    #[tokio::test]
    async fn update_with_matching_version_bumps_the_token() {
        let pool = setup().await;
        let repo = SqlOperationRepository::new(pool);
        let operation = sample_operation("OP-1");
        repo.create(operation.clone()).await.expect("create");

        let mut changed = operation.clone();
        changed.status = OperationStatus::DocumentationComplete;
        let committed =
            repo.update_with_version(changed, 1).await.expect("version 1 should commit");

        assert_eq!(committed.version, 2);
        let found =
            repo.find_by_id(&operation.id).await.expect("find").expect("operation exists");
        assert_eq!(found.status, OperationStatus::DocumentationComplete);
        assert_eq!(found.version, 2);
    }

    #[tokio::test]
    async fn update_with_stale_version_is_a_conflict() {
        let pool = setup().await;
        let repo = SqlOperationRepository::new(pool);
        let operation = sample_operation("OP-1");
        repo.create(operation.clone()).await.expect("create");

        let mut first = operation.clone();
        first.status = OperationStatus::DocumentationComplete;
        repo.update_with_version(first, 1).await.expect("first writer commits");

        let mut second = operation.clone();
        second.status = OperationStatus::Cancelled;
        let error = repo
            .update_with_version(second, 1)
            .await
            .expect_err("stale version must conflict");

        assert!(matches!(error, RepositoryError::VersionConflict(_)));
    }

    #[tokio::test]
    async fn history_appends_in_order_and_replays() {
        let pool = setup().await;
        let repo = SqlOperationRepository::new(pool);
        let operation = sample_operation("OP-1");
        repo.create(operation.clone()).await.expect("create");

        let steps = [
            (OperationStatus::Draft, OperationStatus::DocumentationComplete),
            (OperationStatus::DocumentationComplete, OperationStatus::InReview),
            (OperationStatus::InReview, OperationStatus::PendingCorrection),
        ];
        for (previous, new) in steps {
            repo.append_history(StatusHistoryEntry {
                operation_id: operation.id.clone(),
                previous_status: previous,
                new_status: new,
                actor: "broker-1".to_string(),
                comment: None,
                source_ip: Some("10.1.2.3".to_string()),
                occurred_at: Utc::now(),
            })
            .await
            .expect("append history");
        }

        let history = repo.list_history(&operation.id).await.expect("list history");
        assert_eq!(history.len(), 3);
        assert_eq!(history[0].previous_status, OperationStatus::Draft);
        assert_eq!(history[2].new_status, OperationStatus::PendingCorrection);
        assert_eq!(replay(&history), Ok(OperationStatus::PendingCorrection));
    }
}
