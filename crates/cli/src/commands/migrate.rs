use crate::commands::{
    current_thread_runtime, CommandResult, EXIT_CONFIG, EXIT_CONNECTIVITY, EXIT_MIGRATION,
    EXIT_RUNTIME,
};
use ocbot_core::config::{AppConfig, LoadOptions, StorageBackend};
use ocbot_db::{connect_with_settings, migrations};

pub fn run() -> CommandResult {
    let config = match AppConfig::load(LoadOptions::default()) {
        Ok(config) => config,
        Err(error) => {
            return CommandResult::failure(
                "migrate",
                "config_validation",
                format!("configuration issue: {error}"),
                EXIT_CONFIG,
            );
        }
    };

    let url = match config.storage.backend() {
        StorageBackend::Database { url } => url,
        StorageBackend::Mongo { .. } => {
            return CommandResult::success(
                "migrate",
                "mongodb installation store needs no migrations; collections are created on first write",
            );
        }
        StorageBackend::JsonFile { directory } => {
            return CommandResult::success(
                "migrate",
                format!(
                    "no database configured; JSON file store at `{}` needs no migrations",
                    directory.display()
                ),
            );
        }
    };

    let runtime = match current_thread_runtime() {
        Ok(runtime) => runtime,
        Err(error) => {
            return CommandResult::failure(
                "migrate",
                "runtime_init",
                format!("failed to initialize async runtime: {error}"),
                EXIT_RUNTIME,
            );
        }
    };

    let result = runtime.block_on(async {
        let pool =
            connect_with_settings(&url, config.storage.max_connections, config.storage.timeout_secs)
                .await
                .map_err(|error| ("db_connectivity", error.to_string(), EXIT_CONNECTIVITY))?;
        migrations::run_pending(&pool)
            .await
            .map_err(|error| ("migration", error.to_string(), EXIT_MIGRATION))?;
        pool.close().await;
        Ok::<(), (&'static str, String, u8)>(())
    });

    match result {
        Ok(()) => CommandResult::success("migrate", "applied pending migrations"),
        Err((error_class, message, exit_code)) => {
            CommandResult::failure("migrate", error_class, message, exit_code)
        }
    }
}
