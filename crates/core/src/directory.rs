//! Community directory lookups (events, mentees, mentors) over a [`RecordStore`].

use std::sync::Arc;

use async_trait::async_trait;
use thiserror::Error;
use tracing::debug;

use crate::domain::record::Record;
use crate::records::{RecordFilter, RecordQuery, RecordStore, RecordStoreError};

pub const EVENTS_TABLE: &str = "Events";
pub const MENTEES_TABLE: &str = "Mentees";
pub const MENTORS_TABLE: &str = "Mentors";
pub const MAIN_VIEW: &str = "Main View";

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct EventListing {
    pub name: String,
    pub notes: String,
    pub channel: String,
}

impl EventListing {
    pub fn line(&self) -> String {
        format!("{}: {}, {}", self.name, self.notes, self.channel)
    }
}

#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum DirectoryError {
    #[error(transparent)]
    Store(#[from] RecordStoreError),
}

#[async_trait]
pub trait DirectoryService: Send + Sync {
    /// Events that carry notes, in store order.
    async fn events(&self) -> Result<Vec<EventListing>, DirectoryError>;

    /// Slack handles (without `@`) of mentees whose language list contains `language`.
    async fn mentees_for(&self, language: &str) -> Result<Vec<String>, DirectoryError>;

    /// Slack handles (without `@`) of mentors whose skillsets contain `language`.
    async fn mentors_for(&self, language: &str) -> Result<Vec<String>, DirectoryError>;
}

#[async_trait]
impl<T> DirectoryService for Arc<T>
where
    T: DirectoryService + ?Sized,
{
    async fn events(&self) -> Result<Vec<EventListing>, DirectoryError> {
        (**self).events().await
    }

    async fn mentees_for(&self, language: &str) -> Result<Vec<String>, DirectoryError> {
        (**self).mentees_for(language).await
    }

    async fn mentors_for(&self, language: &str) -> Result<Vec<String>, DirectoryError> {
        (**self).mentors_for(language).await
    }
}

pub struct RecordDirectory {
    store: Arc<dyn RecordStore>,
}

impl RecordDirectory {
    pub fn new(store: Arc<dyn RecordStore>) -> Self {
        Self { store }
    }

    async fn handles(
        &self,
        table: &str,
        filter_field: &str,
        handle_field: &str,
        language: &str,
    ) -> Result<Vec<String>, DirectoryError> {
        let query = RecordQuery::table(table)
            .view(MAIN_VIEW)
            .filter(RecordFilter::contains(filter_field, language));
        let records = self.store.first_page(&query).await?;

        Ok(records
            .iter()
            .filter_map(|record| {
                let handle = record.text(handle_field).filter(|handle| !handle.is_empty());
                if handle.is_none() {
                    debug!(
                        event_name = "directory.handle_missing",
                        table,
                        record_id = %record.id.0,
                        field = handle_field,
                        "record has no slack handle; skipping"
                    );
                }
                handle
            })
            .collect())
    }
}

#[async_trait]
impl DirectoryService for RecordDirectory {
    async fn events(&self) -> Result<Vec<EventListing>, DirectoryError> {
        let query = RecordQuery::table(EVENTS_TABLE).view(MAIN_VIEW);
        let records = self.store.first_page(&query).await?;
        Ok(records.iter().filter_map(event_listing).collect())
    }

    async fn mentees_for(&self, language: &str) -> Result<Vec<String>, DirectoryError> {
        self.handles(MENTEES_TABLE, "Language", "Slack User", language).await
    }

    async fn mentors_for(&self, language: &str) -> Result<Vec<String>, DirectoryError> {
        self.handles(MENTORS_TABLE, "Skillsets", "Slack Name", language).await
    }
}

fn event_listing(record: &Record) -> Option<EventListing> {
    let Some(notes) = record.text("Notes").filter(|notes| !notes.is_empty()) else {
        debug!(
            event_name = "directory.events.notes_missing",
            record_id = %record.id.0,
            "event has no notes; skipping"
        );
        return None;
    };

    Some(EventListing {
        name: record.text("Name").unwrap_or_default(),
        notes,
        channel: record.text("Channel").unwrap_or_default(),
    })
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use super::{DirectoryService, RecordDirectory, MAIN_VIEW};
    use crate::domain::record::Record;
    use crate::records::{InMemoryRecordStore, RecordFilter, RecordQuery};

    #[tokio::test]
    async fn events_skip_rows_without_notes_and_keep_order() {
        let store = Arc::new(InMemoryRecordStore::new());
        store
            .insert(
                "Events",
                Record::new("rec1")
                    .with_field("Name", "Rust Night")
                    .with_field("Notes", "Bring a laptop")
                    .with_field("Channel", "#rust"),
            )
            .await;
        store.insert("Events", Record::new("rec2").with_field("Name", "Draft event")).await;
        store
            .insert(
                "Events",
                Record::new("rec3").with_field("Name", "Go Meetup").with_field("Notes", "Pizza"),
            )
            .await;

        let directory = RecordDirectory::new(store.clone());
        let events = directory.events().await.expect("events lookup should succeed");

        let lines = events.iter().map(|event| event.line()).collect::<Vec<_>>();
        assert_eq!(lines, vec!["Rust Night: Bring a laptop, #rust", "Go Meetup: Pizza, "]);
        assert_eq!(store.queries().await, vec![RecordQuery::table("Events").view(MAIN_VIEW)]);
    }

    #[tokio::test]
    async fn mentors_are_filtered_by_skillsets() {
        let store = Arc::new(InMemoryRecordStore::new());
        store
            .insert(
                "Mentors",
                Record::new("rec1").with_field("Skillsets", "Go, Rust").with_field("Slack Name", "abc"),
            )
            .await;
        store
            .insert(
                "Mentors",
                Record::new("rec2").with_field("Skillsets", "Python").with_field("Slack Name", "py"),
            )
            .await;

        let directory = RecordDirectory::new(store.clone());
        let mentors = directory.mentors_for("Go").await.expect("mentor lookup should succeed");

        assert_eq!(mentors, vec!["abc"]);
        let queries = store.queries().await;
        assert_eq!(queries[0].filter, Some(RecordFilter::contains("Skillsets", "Go")));
    }

    #[tokio::test]
    async fn mentees_without_handles_are_skipped() {
        let store = Arc::new(InMemoryRecordStore::new());
        store
            .insert(
                "Mentees",
                Record::new("rec1").with_field("Language", "Rust").with_field("Slack User", "crab"),
            )
            .await;
        store.insert("Mentees", Record::new("rec2").with_field("Language", "Rust")).await;

        let directory = RecordDirectory::new(store);
        let mentees = directory.mentees_for("Rust").await.expect("mentee lookup should succeed");

        assert_eq!(mentees, vec!["crab"]);
    }
}
