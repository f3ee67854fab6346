//! Airtable-backed [`RecordStore`](ocbot_core::records::RecordStore).

pub mod client;
pub mod formula;

pub use client::{record_store_from_config, AirtableClient};
