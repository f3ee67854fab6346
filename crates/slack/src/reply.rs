use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;
use serde::Serialize;
use thiserror::Error;
use tokio::sync::Mutex;

use crate::blocks::Block;
use crate::commands::Reply;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum ReplyError {
    #[error("reply request failed: {0}")]
    Request(String),
    #[error("reply endpoint returned {status}: {body}")]
    Status { status: u16, body: String },
}

/// Body posted to a slash command's `response_url`.
#[derive(Debug, Serialize)]
pub struct ResponsePayload<'a> {
    pub response_type: &'static str,
    pub text: &'a str,
    #[serde(skip_serializing_if = "no_blocks")]
    pub blocks: &'a [Block],
}

fn no_blocks(blocks: &&[Block]) -> bool {
    blocks.is_empty()
}

impl<'a> From<&'a Reply> for ResponsePayload<'a> {
    fn from(reply: &'a Reply) -> Self {
        Self {
            response_type: reply.visibility.response_type(),
            text: &reply.message.fallback_text,
            blocks: &reply.message.blocks,
        }
    }
}

#[async_trait]
pub trait ReplySender: Send + Sync {
    async fn send(&self, response_url: &str, reply: &Reply) -> Result<(), ReplyError>;
}

pub struct ResponseUrlReplier {
    http: Client,
}

impl ResponseUrlReplier {
    pub fn new(timeout: Duration) -> Result<Self, ReplyError> {
        let http = Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|error| ReplyError::Request(error.to_string()))?;
        Ok(Self { http })
    }
}

#[async_trait]
impl ReplySender for ResponseUrlReplier {
    async fn send(&self, response_url: &str, reply: &Reply) -> Result<(), ReplyError> {
        let response = self
            .http
            .post(response_url)
            .json(&ResponsePayload::from(reply))
            .send()
            .await
            .map_err(|error| ReplyError::Request(error.to_string()))?;

        let status = response.status();
        if status.is_success() {
            return Ok(());
        }
        let body = response.text().await.unwrap_or_default();
        Err(ReplyError::Status { status: status.as_u16(), body })
    }
}

/// Keeps every reply in memory instead of posting it.
#[derive(Default)]
pub struct RecordingReplySender {
    sent: Mutex<Vec<(String, Reply)>>,
}

impl RecordingReplySender {
    pub fn new() -> Self {
        Self::default()
    }

    /// `(response_url, reply)` pairs, oldest first.
    pub async fn sent(&self) -> Vec<(String, Reply)> {
        self.sent.lock().await.clone()
    }
}

#[async_trait]
impl ReplySender for RecordingReplySender {
    async fn send(&self, response_url: &str, reply: &Reply) -> Result<(), ReplyError> {
        self.sent.lock().await.push((response_url.to_owned(), reply.clone()));
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::ResponsePayload;
    use crate::blocks::{self, MessageBuilder, SECTION_TEXT_LIMIT};
    use crate::commands::Reply;

    #[test]
    fn public_reply_serializes_in_channel_with_blocks() {
        let reply = Reply::public(blocks::mentors_message("Go", &["abc".to_owned()]));
        let payload = serde_json::to_value(ResponsePayload::from(&reply)).expect("serialize");

        assert_eq!(
            payload,
            json!({
                "response_type": "in_channel",
                "text": "*Mentors for Go:*\n@abc",
                "blocks": [{
                    "type": "section",
                    "block_id": "mentors.list.v1",
                    "text": { "type": "mrkdwn", "text": "*Mentors for Go:*\n@abc" }
                }]
            })
        );
    }

    #[test]
    fn oversized_private_reply_omits_blocks() {
        let text = "y".repeat(SECTION_TEXT_LIMIT + 10);
        let reply = Reply::private(
            MessageBuilder::new(text.clone())
                .section("long.v1", |section| {
                    section.plain(text.clone());
                })
                .build(),
        );
        let payload = serde_json::to_value(ResponsePayload::from(&reply)).expect("serialize");

        assert_eq!(payload["response_type"], "ephemeral");
        assert!(payload.get("blocks").is_none());
    }
}
