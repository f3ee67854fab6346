pub mod config;
pub mod directory;
pub mod domain;
pub mod errors;
pub mod records;

pub use directory::{DirectoryError, DirectoryService, EventListing, RecordDirectory};
pub use domain::installation::{Installation, OAuthState, TeamId};
pub use domain::record::{Record, RecordId};
pub use errors::{ApplicationError, InterfaceError};
pub use records::{
    InMemoryRecordStore, RecordFilter, RecordQuery, RecordStore, RecordStoreError,
    UnconfiguredRecordStore,
};
