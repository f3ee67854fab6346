use std::sync::Arc;

use secrecy::SecretString;
use tracing::{info, warn};

use ocbot_core::directory::DirectoryService;

use crate::commands::{BotCommand, CommandRouter, SlashCommandPayload};
use crate::reply::{ReplyError, ReplySender};
use crate::verification;

#[derive(Debug, PartialEq, Eq)]
pub enum HandleOutcome {
    /// Verification token mismatch; nothing was queried or sent.
    Rejected,
    Replied { sent: usize },
    /// Delivery stopped at the first failed reply.
    ReplyFailed { sent: usize, error: ReplyError },
}

/// Runs one verified slash command to completion: route, then post each
/// reply to the command's `response_url` in order.
pub struct SlashCommandHandler {
    verification_token: SecretString,
    router: CommandRouter<Arc<dyn DirectoryService>>,
    replies: Arc<dyn ReplySender>,
}

impl SlashCommandHandler {
    pub fn new(
        verification_token: SecretString,
        directory: Arc<dyn DirectoryService>,
        replies: Arc<dyn ReplySender>,
    ) -> Self {
        Self { verification_token, router: CommandRouter::new(directory), replies }
    }

    pub async fn handle(&self, payload: SlashCommandPayload, correlation_id: &str) -> HandleOutcome {
        if !verification::token_matches(&self.verification_token, &payload.token) {
            warn!(
                event_name = "slack.command.token_mismatch",
                correlation_id,
                team_id = %payload.team_id,
                command = %payload.command,
                "verification token mismatch; dropping command"
            );
            return HandleOutcome::Rejected;
        }

        let command = BotCommand::classify(&payload.command, &payload.text);
        info!(
            event_name = "slack.command.received",
            correlation_id,
            team_id = %payload.team_id,
            user_id = %payload.user_id,
            command = command.name(),
            "slash command accepted"
        );

        let replies = self.router.replies_for(&command, correlation_id).await;
        let mut sent = 0;
        for reply in &replies {
            if let Err(error) = self.replies.send(&payload.response_url, reply).await {
                warn!(
                    event_name = "slack.reply.failed",
                    correlation_id,
                    sent,
                    remaining = replies.len() - sent,
                    error = %error,
                    "reply delivery failed; abandoning remaining replies"
                );
                return HandleOutcome::ReplyFailed { sent, error };
            }
            sent += 1;
        }

        HandleOutcome::Replied { sent }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use async_trait::async_trait;
    use secrecy::SecretString;

    use ocbot_core::directory::{DirectoryService, RecordDirectory};
    use ocbot_core::domain::record::Record;
    use ocbot_core::records::InMemoryRecordStore;

    use super::{HandleOutcome, SlashCommandHandler};
    use crate::commands::{Reply, ReplyVisibility, SlashCommandPayload};
    use crate::reply::{RecordingReplySender, ReplyError, ReplySender};

    struct FailingReplySender;

    #[async_trait]
    impl ReplySender for FailingReplySender {
        async fn send(&self, _response_url: &str, _reply: &Reply) -> Result<(), ReplyError> {
            Err(ReplyError::Status { status: 404, body: "expired_url".to_owned() })
        }
    }

    fn payload(token: &str, command: &str, text: &str) -> SlashCommandPayload {
        SlashCommandPayload {
            token: token.to_owned(),
            team_id: "T1".to_owned(),
            user_id: "U1".to_owned(),
            command: command.to_owned(),
            text: text.to_owned(),
            response_url: "https://hooks.slack.test/commands/1".to_owned(),
            ..SlashCommandPayload::default()
        }
    }

    fn handler(
        store: Arc<InMemoryRecordStore>,
        replies: Arc<dyn ReplySender>,
    ) -> SlashCommandHandler {
        let directory: Arc<dyn DirectoryService> = Arc::new(RecordDirectory::new(store));
        SlashCommandHandler::new(SecretString::from("secret-token".to_owned()), directory, replies)
    }

    #[tokio::test]
    async fn mismatched_token_sends_nothing_and_queries_nothing() {
        let store = Arc::new(InMemoryRecordStore::new());
        let replies = Arc::new(RecordingReplySender::new());
        let handler = handler(store.clone(), replies.clone());

        let outcome = handler.handle(payload("wrong", "/oc", "events"), "req-1").await;

        assert_eq!(outcome, HandleOutcome::Rejected);
        assert!(replies.sent().await.is_empty());
        assert!(store.queries().await.is_empty());
    }

    #[tokio::test]
    async fn mentees_reply_is_posted_to_response_url() {
        let store = Arc::new(InMemoryRecordStore::new());
        store
            .insert(
                "Mentees",
                Record::new("rec1").with_field("Language", "Rust, Go").with_field("Slack User", "crab"),
            )
            .await;
        store
            .insert(
                "Mentees",
                Record::new("rec2").with_field("Language", "rust").with_field("Slack User", "lower"),
            )
            .await;
        let replies = Arc::new(RecordingReplySender::new());
        let handler = handler(store, replies.clone());

        let outcome = handler.handle(payload("secret-token", "/mentees", "Rust"), "req-2").await;

        assert_eq!(outcome, HandleOutcome::Replied { sent: 1 });
        let sent = replies.sent().await;
        assert_eq!(sent.len(), 1);
        assert_eq!(sent[0].0, "https://hooks.slack.test/commands/1");
        assert_eq!(sent[0].1.visibility, ReplyVisibility::Public);
        assert_eq!(sent[0].1.text(), "*Mentees requesting Rust:*\n@crab");
    }

    #[tokio::test]
    async fn unknown_commands_still_require_the_token() {
        let replies = Arc::new(RecordingReplySender::new());
        let handler = handler(Arc::new(InMemoryRecordStore::new()), replies.clone());

        let outcome = handler.handle(payload("nope", "/weather", ""), "req-3").await;

        assert_eq!(outcome, HandleOutcome::Rejected);
        assert!(replies.sent().await.is_empty());
    }

    #[tokio::test]
    async fn delivery_failure_is_reported() {
        let handler = handler(Arc::new(InMemoryRecordStore::new()), Arc::new(FailingReplySender));

        let outcome = handler.handle(payload("secret-token", "/echo", "hi"), "req-4").await;

        assert_eq!(
            outcome,
            HandleOutcome::ReplyFailed {
                sent: 0,
                error: ReplyError::Status { status: 404, body: "expired_url".to_owned() },
            }
        );
    }
}
