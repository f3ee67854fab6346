//! Record-store seam.
//!
//! The bot only ever reads: one filtered page from a named table and view.
//! Filters are typed so user text never reaches the store's query language
//! unescaped; each backend renders [`RecordFilter`] its own way.

use std::collections::HashMap;

use async_trait::async_trait;
use thiserror::Error;
use tokio::sync::RwLock;

use crate::domain::record::Record;

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum RecordFilter {
    /// Case-sensitive substring match against a field's text.
    Contains { field: String, needle: String },
}

impl RecordFilter {
    pub fn contains(field: impl Into<String>, needle: impl Into<String>) -> Self {
        Self::Contains { field: field.into(), needle: needle.into() }
    }

    pub fn matches(&self, record: &Record) -> bool {
        match self {
            Self::Contains { field, needle } => {
                record.text(field).is_some_and(|text| text.contains(needle.as_str()))
            }
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct RecordQuery {
    pub table: String,
    pub view: Option<String>,
    pub filter: Option<RecordFilter>,
    pub max_records: Option<u32>,
}

impl RecordQuery {
    pub fn table(table: impl Into<String>) -> Self {
        Self { table: table.into(), view: None, filter: None, max_records: None }
    }

    pub fn view(mut self, view: impl Into<String>) -> Self {
        self.view = Some(view.into());
        self
    }

    pub fn filter(mut self, filter: RecordFilter) -> Self {
        self.filter = Some(filter);
        self
    }

    pub fn max_records(mut self, max_records: u32) -> Self {
        self.max_records = Some(max_records);
        self
    }
}

#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum RecordStoreError {
    #[error("record store is not configured: {0}")]
    NotConfigured(String),
    #[error("record store request failed: {0}")]
    Request(String),
    #[error("record store returned {status}: {message}")]
    Status { status: u16, message: String },
    #[error("record store response could not be decoded: {0}")]
    Decode(String),
}

#[async_trait]
pub trait RecordStore: Send + Sync {
    /// Returns the first page of records for `query`, in store order.
    async fn first_page(&self, query: &RecordQuery) -> Result<Vec<Record>, RecordStoreError>;
}

/// Stand-in used when credentials are absent, so startup does not fail and
/// each lookup reports why it cannot run.
pub struct UnconfiguredRecordStore {
    reason: String,
}

impl UnconfiguredRecordStore {
    pub fn new(reason: impl Into<String>) -> Self {
        Self { reason: reason.into() }
    }
}

#[async_trait]
impl RecordStore for UnconfiguredRecordStore {
    async fn first_page(&self, _query: &RecordQuery) -> Result<Vec<Record>, RecordStoreError> {
        Err(RecordStoreError::NotConfigured(self.reason.clone()))
    }
}

/// Tables held in memory. Views are ignored; filters are evaluated locally.
#[derive(Default)]
pub struct InMemoryRecordStore {
    tables: RwLock<HashMap<String, Vec<Record>>>,
    queries: RwLock<Vec<RecordQuery>>,
}

impl InMemoryRecordStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn insert(&self, table: &str, record: Record) {
        let mut tables = self.tables.write().await;
        tables.entry(table.to_string()).or_default().push(record);
    }

    /// Queries seen so far, oldest first.
    pub async fn queries(&self) -> Vec<RecordQuery> {
        self.queries.read().await.clone()
    }
}

#[async_trait]
impl RecordStore for InMemoryRecordStore {
    async fn first_page(&self, query: &RecordQuery) -> Result<Vec<Record>, RecordStoreError> {
        self.queries.write().await.push(query.clone());

        let tables = self.tables.read().await;
        let rows = tables.get(&query.table).map(Vec::as_slice).unwrap_or_default();
        let limit = query.max_records.map(|limit| limit as usize).unwrap_or(usize::MAX);

        Ok(rows
            .iter()
            .filter(|record| query.filter.as_ref().map_or(true, |filter| filter.matches(record)))
            .take(limit)
            .cloned()
            .collect())
    }
}
