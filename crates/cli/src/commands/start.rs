use crate::commands::CommandResult;
use despacho_core::config::{AppConfig, LoadOptions};
use despacho_db::connect_from_config;

/// Startup preflight: configuration loads and the database accepts a
/// connection. Does not mutate anything.
pub fn run() -> CommandResult {
    let config = match AppConfig::load(LoadOptions::default()) {
        Ok(config) => config,
        Err(error) => {
            return CommandResult::failure(
                "start",
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
                "start",
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
        pool.close().await;
        Ok::<(), (&'static str, String, u8)>(())
    });

    match result {
        Ok(()) => CommandResult::success(
            "start",
            format!(
                "preflight passed; server would bind {}:{}",
                config.server.bind_address, config.server.port
            ),
        ),
        Err((error_class, message, exit_code)) => {
            CommandResult::failure("start", error_class, message, exit_code)
        }
    }
}
