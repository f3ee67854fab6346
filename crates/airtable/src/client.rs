use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;
use secrecy::{ExposeSecret, SecretString};
use serde::Deserialize;
use tracing::{debug, info, warn};
use url::Url;

use ocbot_core::config::AirtableConfig;
use ocbot_core::domain::record::Record;
use ocbot_core::records::{RecordQuery, RecordStore, RecordStoreError, UnconfiguredRecordStore};

use crate::formula;

#[derive(Debug, Deserialize)]
struct ListRecordsResponse {
    #[serde(default)]
    records: Vec<Record>,
    #[serde(default)]
    offset: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ErrorEnvelope {
    error: ErrorBody,
}

#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum ErrorBody {
    Detailed {
        #[serde(rename = "type")]
        kind: String,
        #[serde(default)]
        message: Option<String>,
    },
    Code(String),
}

impl ErrorBody {
    fn describe(self) -> String {
        match self {
            Self::Detailed { kind, message: Some(message) } => format!("{kind}: {message}"),
            Self::Detailed { kind, message: None } => kind,
            Self::Code(code) => code,
        }
    }
}

/// Reads one base of the Airtable REST API.
#[derive(Clone)]
pub struct AirtableClient {
    http: Client,
    api_url: Url,
    api_key: SecretString,
    base_id: String,
}

impl AirtableClient {
    pub fn new(
        api_url: &str,
        api_key: SecretString,
        base_id: impl Into<String>,
        timeout: Duration,
    ) -> Result<Self, RecordStoreError> {
        let api_url = Url::parse(api_url)
            .map_err(|error| RecordStoreError::Request(format!("invalid api url: {error}")))?;
        let http = Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|error| RecordStoreError::Request(error.to_string()))?;

        Ok(Self { http, api_url, api_key, base_id: base_id.into() })
    }

    pub fn from_config(config: &AirtableConfig) -> Result<Option<Self>, RecordStoreError> {
        let (Some(api_key), Some(base_id)) = (&config.api_key, &config.base_id) else {
            return Ok(None);
        };
        if !config.is_configured() {
            return Ok(None);
        }

        Self::new(
            &config.api_url,
            api_key.clone(),
            base_id.trim(),
            Duration::from_secs(config.timeout_secs),
        )
        .map(Some)
    }

    pub fn base_id(&self) -> &str {
        &self.base_id
    }

    fn table_url(&self, table: &str) -> Result<Url, RecordStoreError> {
        let mut url = self.api_url.clone();
        url.path_segments_mut()
            .map_err(|()| RecordStoreError::Request("api url cannot be a base".to_string()))?
            .pop_if_empty()
            .extend(["v0", self.base_id.as_str(), table]);
        Ok(url)
    }
}

/// The configured Airtable client, or a store that explains what is missing.
pub fn record_store_from_config(
    config: &AirtableConfig,
) -> Result<Arc<dyn RecordStore>, RecordStoreError> {
    match AirtableClient::from_config(config)? {
        Some(client) => {
            info!(
                event_name = "airtable.client.ready",
                base_id = client.base_id(),
                "airtable record store configured"
            );
            Ok(Arc::new(client))
        }
        None => {
            warn!(
                event_name = "airtable.client.unconfigured",
                "AIRTABLE_API_KEY or AIRTABLE_BASE is not set; directory lookups will fail"
            );
            Ok(Arc::new(UnconfiguredRecordStore::new(
                "AIRTABLE_API_KEY and AIRTABLE_BASE must be set",
            )))
        }
    }
}

#[async_trait]
impl RecordStore for AirtableClient {
    async fn first_page(&self, query: &RecordQuery) -> Result<Vec<Record>, RecordStoreError> {
        let url = self.table_url(&query.table)?;

        let mut params = Vec::new();
        if let Some(view) = &query.view {
            params.push(("view", view.clone()));
        }
        if let Some(filter) = &query.filter {
            params.push(("filterByFormula", formula::render(filter)));
        }
        if let Some(max_records) = query.max_records {
            params.push(("maxRecords", max_records.to_string()));
        }

        let response = self
            .http
            .get(url)
            .bearer_auth(self.api_key.expose_secret())
            .query(&params)
            .send()
            .await
            .map_err(|error| RecordStoreError::Request(error.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            let message = serde_json::from_str::<ErrorEnvelope>(&body)
                .map(|envelope| envelope.error.describe())
                .unwrap_or(body);
            return Err(RecordStoreError::Status { status: status.as_u16(), message });
        }

        let page = response
            .json::<ListRecordsResponse>()
            .await
            .map_err(|error| RecordStoreError::Decode(error.to_string()))?;

        debug!(
            event_name = "airtable.records.page",
            table = %query.table,
            records = page.records.len(),
            more_pages = page.offset.is_some(),
            "fetched first page"
        );
        Ok(page.records)
    }
}
