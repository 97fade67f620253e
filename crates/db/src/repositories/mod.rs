use async_trait::async_trait;
use thiserror::Error;

use despacho_core::domain::crossing::CrossingResult;
use despacho_core::domain::declaration::{Declaration, DeclarationId, DeclarationType};
use despacho_core::domain::gatt::GattForm;
use despacho_core::domain::operation::{Operation, OperationId, StatusHistoryEntry};

pub mod crossing;
pub mod declaration;
pub mod gatt;
pub mod memory;
pub mod operation;

pub use crossing::SqlCrossingRepository;
pub use declaration::SqlDeclarationRepository;
pub use gatt::SqlGattFormRepository;
pub use memory::{
    InMemoryCrossingRepository, InMemoryDeclarationRepository, InMemoryGattFormRepository,
    InMemoryOperationRepository,
};
pub use operation::SqlOperationRepository;

#[derive(Debug, Error)]
pub enum RepositoryError {
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),
    #[error("decode error: {0}")]
    Decode(String),
    #[error("operation {0} was updated by another writer")]
    VersionConflict(OperationId),
}

#[async_trait]
pub trait OperationRepository: Send + Sync {
    async fn find_by_id(&self, id: &OperationId) -> Result<Option<Operation>, RepositoryError>;

    async fn create(&self, operation: Operation) -> Result<(), RepositoryError>;

    /// Commits a mutation guarded by the optimistic version token: the row is
    /// updated only if its stored version still equals `expected_version`,
    /// and the committed version becomes `expected_version + 1`. A stale
    /// token surfaces `VersionConflict`.
    async fn update_with_version(
        &self,
        operation: Operation,
        expected_version: u32,
    ) -> Result<Operation, RepositoryError>;

    async fn append_history(&self, entry: StatusHistoryEntry) -> Result<(), RepositoryError>;

    async fn list_history(
        &self,
        operation_id: &OperationId,
    ) -> Result<Vec<StatusHistoryEntry>, RepositoryError>;
}

#[async_trait]
pub trait DeclarationRepository: Send + Sync {
    async fn find_by_id(&self, id: &DeclarationId)
        -> Result<Option<Declaration>, RepositoryError>;

    async fn find_by_type(
        &self,
        operation_id: &OperationId,
        declaration_type: DeclarationType,
    ) -> Result<Option<Declaration>, RepositoryError>;

    async fn list_for_operation(
        &self,
        operation_id: &OperationId,
    ) -> Result<Vec<Declaration>, RepositoryError>;

    async fn save(&self, declaration: Declaration) -> Result<(), RepositoryError>;
}

#[async_trait]
pub trait CrossingRepository: Send + Sync {
    /// The current crossing result of an operation; at most one exists.
    async fn find_by_operation(
        &self,
        operation_id: &OperationId,
    ) -> Result<Option<CrossingResult>, RepositoryError>;

    /// Replaces the operation's crossing result (and its discrepancy rows)
    /// with the given one.
    async fn replace(&self, result: CrossingResult) -> Result<(), RepositoryError>;
}

#[async_trait]
pub trait GattFormRepository: Send + Sync {
    async fn find_by_operation(
        &self,
        operation_id: &OperationId,
    ) -> Result<Option<GattForm>, RepositoryError>;

    async fn save(&self, form: GattForm) -> Result<(), RepositoryError>;
}
