use std::sync::Arc;

use thiserror::Error;
use tracing::info;

use ocbot_core::config::{StorageBackend, StorageConfig};

use crate::migrations;
use crate::repositories::{
    InstallationRepository, JsonFileInstallationRepository, MongoInstallationRepository,
    RepositoryError, SqlInstallationRepository,
};

#[derive(Debug, Error)]
pub enum StorageError {
    #[error("database connection failed: {0}")]
    DatabaseConnect(#[source] sqlx::Error),
    #[error("database migration failed: {0}")]
    Migration(#[from] sqlx::migrate::MigrateError),
    #[error(transparent)]
    Repository(#[from] RepositoryError),
}

/// Opens the installation store selected by `config`: a migrated SQLite
/// database or a MongoDB database when a URL is set, otherwise the JSON file
/// directory.
pub async fn open_installation_store(
    config: &StorageConfig,
) -> Result<Arc<dyn InstallationRepository>, StorageError> {
    match config.backend() {
        StorageBackend::Database { url } => {
            let pool =
                crate::connect_with_settings(&url, config.max_connections, config.timeout_secs)
                    .await
                    .map_err(StorageError::DatabaseConnect)?;
            migrations::run_pending(&pool).await?;
            info!(event_name = "db.storage.opened", backend = "sqlite", "installation store ready");
            Ok(Arc::new(SqlInstallationRepository::new(pool)))
        }
        StorageBackend::Mongo { url } => {
            let repository = MongoInstallationRepository::connect(&url).await?;
            info!(
                event_name = "db.storage.opened",
                backend = "mongodb",
                database = repository.database_name(),
                "installation store ready"
            );
            Ok(Arc::new(repository))
        }
        StorageBackend::JsonFile { directory } => {
            let repository = JsonFileInstallationRepository::open(&directory).await?;
            info!(
                event_name = "db.storage.opened",
                backend = "json_file",
                directory = %directory.display(),
                "installation store ready"
            );
            Ok(Arc::new(repository))
        }
    }
}

#[cfg(test)]
mod tests {
    use ocbot_core::config::StorageConfig;

    use super::open_installation_store;

    fn storage(database_url: Option<&str>, json_file_store: std::path::PathBuf) -> StorageConfig {
        StorageConfig {
            database_url: database_url.map(str::to_string),
            json_file_store,
            max_connections: 1,
            timeout_secs: 5,
        }
    }

    #[tokio::test]
    async fn json_directory_is_used_without_database_url() {
        let dir = tempfile::tempdir().expect("tempdir");
        let store_dir = dir.path().join("store");

        let store = open_installation_store(&storage(None, store_dir.clone()))
            .await
            .expect("open json store");

        assert_eq!(store.backend_name(), "json_file");
        assert!(store_dir.join("teams").is_dir());
        store.ping().await.expect("ping");
    }

    #[tokio::test]
    async fn mongodb_url_selects_the_mongo_store_without_connecting() {
        let dir = tempfile::tempdir().expect("tempdir");
        let url = "mongodb://127.0.0.1:1/heroku_abc?serverSelectionTimeoutMS=200";

        let store = open_installation_store(&storage(Some(url), dir.path().join("unused")))
            .await
            .expect("open mongo store");

        assert_eq!(store.backend_name(), "mongodb");
        assert!(!dir.path().join("unused").exists());
    }

    #[tokio::test]
    async fn sqlite_url_opens_migrated_database() {
        let dir = tempfile::tempdir().expect("tempdir");
        let url = format!("sqlite://{}", dir.path().join("ocbot.db").display());

        let store = open_installation_store(&storage(Some(&url), dir.path().join("unused")))
            .await
            .expect("open sqlite store");

        assert_eq!(store.backend_name(), "sqlite");
        assert!(store.list_installations().await.expect("list").is_empty());
    }
}
