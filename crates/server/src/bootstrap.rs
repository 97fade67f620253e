use std::sync::Arc;

use anyhow::Context;
use tracing::info;

use despacho_core::audit::InMemoryAuditSink;
use despacho_core::compliance::{ComplianceGate, StaticComplianceGate};
use despacho_core::config::AppConfig;
use despacho_db::repositories::{
    SqlCrossingRepository, SqlDeclarationRepository, SqlGattFormRepository, SqlOperationRepository,
};
use despacho_db::{connect_from_config, migrations, DbPool};
use despacho_gate::HttpComplianceGate;

use crate::service::OperationService;

pub struct AppContext {
    pub config: AppConfig,
    pub db_pool: DbPool,
    pub service: Arc<OperationService>,
}

pub async fn bootstrap_with_config(config: AppConfig) -> anyhow::Result<AppContext> {
    let db_pool =
        connect_from_config(&config.database).await.context("database connection failed")?;

    migrations::run_pending(&db_pool).await.context("database migration failed")?;

    let gate: Arc<dyn ComplianceGate> = if config.gate.base_url.is_some() {
        Arc::new(
            HttpComplianceGate::from_config(&config.gate)
                .map_err(|error| anyhow::anyhow!("compliance gate setup failed: {error}"))?,
        )
    } else {
        info!(
            event_name = "system.gate.in_process",
            correlation_id = "bootstrap",
            "no gate.base_url configured; using the in-process pass-through gate"
        );
        Arc::new(StaticComplianceGate::passing())
    };

    let service = Arc::new(OperationService::new(
        Arc::new(SqlOperationRepository::new(db_pool.clone())),
        Arc::new(SqlDeclarationRepository::new(db_pool.clone())),
        Arc::new(SqlCrossingRepository::new(db_pool.clone())),
        Arc::new(SqlGattFormRepository::new(db_pool.clone())),
        gate,
        Arc::new(InMemoryAuditSink::default()),
        config.gate.fail_open,
    ));

    Ok(AppContext { config, db_pool, service })
}
