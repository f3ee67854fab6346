pub mod connection;
pub mod migrations;
pub mod repositories;
pub mod storage;

pub use connection::{connect_with_settings, DbPool};
pub use repositories::{
    InMemoryInstallationRepository, InstallationRepository, JsonFileInstallationRepository,
    MongoInstallationRepository, RepositoryError, SqlInstallationRepository,
};
pub use storage::{open_installation_store, StorageError};
