use crate::commands::CommandResult;
use despacho_core::config::{AppConfig, LoadOptions};
use despacho_db::{connect_from_config, migrations, seed_demo_dataset};

pub fn run() -> CommandResult {
    let config = match AppConfig::load(LoadOptions::default()) {
        Ok(config) => config,
        Err(error) => {
            return CommandResult::failure(
                "seed",
                "config_validation",
                format!("configuration issue: {error}"),
                2,
            );
        }
    };

    let runtime = match tokio::runtime::Builder::new_current_thread().enable_all().build() {
        Ok(runtime) => runtime,
        Err(error) => {
            return CommandResult::failure(
                "seed",
                "runtime_init",
                format!("failed to initialize async runtime: {error}"),
                3,
            );
        }
    };

    let result = runtime.block_on(async {
        let pool = connect_from_config(&config.database)
            .await
            .map_err(|error| ("db_connectivity", error.to_string(), 4u8))?;

        migrations::run_pending(&pool)
            .await
            .map_err(|error| ("migration", error.to_string(), 5u8))?;

        let seeded = seed_demo_dataset(&pool)
            .await
            .map_err(|error| ("seed_execution", error.to_string(), 6u8))?;

        pool.close().await;
        Ok::<despacho_db::SeedResult, (&'static str, String, u8)>(seeded)
    });

    match result {
        Ok(seeded) if seeded.declarations == 0 => CommandResult::success(
            "seed",
            format!("demo dataset already present for operation {}", seeded.operation_id),
        ),
        Ok(seeded) => CommandResult::success(
            "seed",
            format!(
                "demo dataset loaded: operation {} with {} declarations and {} history entries",
                seeded.operation_id, seeded.declarations, seeded.history_entries
            ),
        ),
        Err((error_class, message, exit_code)) => {
            CommandResult::failure("seed", error_class, message, exit_code)
        }
    }
}
