use std::collections::HashMap;

use tokio::sync::RwLock;

use despacho_core::domain::crossing::CrossingResult;
use despacho_core::domain::declaration::{Declaration, DeclarationId, DeclarationType};
use despacho_core::domain::gatt::GattForm;
use despacho_core::domain::operation::{Operation, OperationId, StatusHistoryEntry};

use super::{
    CrossingRepository, DeclarationRepository, GattFormRepository, OperationRepository,
    RepositoryError,
};

#[derive(Default)]
pub struct InMemoryOperationRepository {
    operations: RwLock<HashMap<String, Operation>>,
    history: RwLock<Vec<StatusHistoryEntry>>,
}

#[async_trait::async_trait]
impl OperationRepository for InMemoryOperationRepository {
    async fn find_by_id(&self, id: &OperationId) -> Result<Option<Operation>, RepositoryError> {
        let operations = self.operations.read().await;
        Ok(operations.get(&id.0).cloned())
    }

    async fn create(&self, operation: Operation) -> Result<(), RepositoryError> {
        let mut operations = self.operations.write().await;
        operations.insert(operation.id.0.clone(), operation);
        Ok(())
    }

    async fn update_with_version(
        &self,
        operation: Operation,
        expected_version: u32,
    ) -> Result<Operation, RepositoryError> {
        let mut operations = self.operations.write().await;
        let stored = operations
            .get(&operation.id.0)
            .ok_or_else(|| RepositoryError::VersionConflict(operation.id.clone()))?;
        if stored.version != expected_version {
            return Err(RepositoryError::VersionConflict(operation.id.clone()));
        }

        let mut committed = operation;
        committed.version = expected_version + 1;
        operations.insert(committed.id.0.clone(), committed.clone());
        Ok(committed)
    }

    async fn append_history(&self, entry: StatusHistoryEntry) -> Result<(), RepositoryError> {
        let mut history = self.history.write().await;
        history.push(entry);
        Ok(())
    }

    async fn list_history(
        &self,
        operation_id: &OperationId,
    ) -> Result<Vec<StatusHistoryEntry>, RepositoryError> {
        let history = self.history.read().await;
        Ok(history.iter().filter(|entry| &entry.operation_id == operation_id).cloned().collect())
    }
}

#[derive(Default)]
pub struct InMemoryDeclarationRepository {
    declarations: RwLock<HashMap<String, Declaration>>,
}

#[async_trait::async_trait]
impl DeclarationRepository for InMemoryDeclarationRepository {
    async fn find_by_id(
        &self,
        id: &DeclarationId,
    ) -> Result<Option<Declaration>, RepositoryError> {
        let declarations = self.declarations.read().await;
        Ok(declarations.get(&id.0).cloned())
    }

    async fn find_by_type(
        &self,
        operation_id: &OperationId,
        declaration_type: DeclarationType,
    ) -> Result<Option<Declaration>, RepositoryError> {
        let declarations = self.declarations.read().await;
        Ok(declarations
            .values()
            .find(|declaration| {
                &declaration.operation_id == operation_id
                    && declaration.declaration_type == declaration_type
            })
            .cloned())
    }

    async fn list_for_operation(
        &self,
        operation_id: &OperationId,
    ) -> Result<Vec<Declaration>, RepositoryError> {
        let declarations = self.declarations.read().await;
        let mut listed: Vec<Declaration> = declarations
            .values()
            .filter(|declaration| &declaration.operation_id == operation_id)
            .cloned()
            .collect();
        listed.sort_by_key(|declaration| declaration.declaration_type.as_str());
        Ok(listed)
    }

    async fn save(&self, declaration: Declaration) -> Result<(), RepositoryError> {
        let mut declarations = self.declarations.write().await;
        declarations.insert(declaration.id.0.clone(), declaration);
        Ok(())
    }
}

#[derive(Default)]
pub struct InMemoryCrossingRepository {
    results: RwLock<HashMap<String, CrossingResult>>,
}

#[async_trait::async_trait]
impl CrossingRepository for InMemoryCrossingRepository {
    async fn find_by_operation(
        &self,
        operation_id: &OperationId,
    ) -> Result<Option<CrossingResult>, RepositoryError> {
        let results = self.results.read().await;
        Ok(results.get(&operation_id.0).cloned())
    }

    async fn replace(&self, result: CrossingResult) -> Result<(), RepositoryError> {
        let mut results = self.results.write().await;
        results.insert(result.operation_id.0.clone(), result);
        Ok(())
    }
}

#[derive(Default)]
pub struct InMemoryGattFormRepository {
    forms: RwLock<HashMap<String, GattForm>>,
}

#[async_trait::async_trait]
impl GattFormRepository for InMemoryGattFormRepository {
    async fn find_by_operation(
        &self,
        operation_id: &OperationId,
    ) -> Result<Option<GattForm>, RepositoryError> {
        let forms = self.forms.read().await;
        Ok(forms.get(&operation_id.0).cloned())
    }

    async fn save(&self, form: GattForm) -> Result<(), RepositoryError> {
        let mut forms = self.forms.write().await;
        forms.insert(form.operation_id.0.clone(), form);
        Ok(())
    }
}
