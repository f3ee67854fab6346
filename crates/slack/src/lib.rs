//! Slack slash-command interface for ocbot.
//!
//! - **Commands** (`commands`) - payload parsing, `/echo`, `/oc`, `/mentees`, `/mentors` routing
//! - **Handler** (`handler`) - token check, routing, ordered reply delivery
//! - **Replies** (`reply`) - `response_url` posting
//! - **Verification** (`verification`) - verification token and request signatures
//! - **OAuth** (`oauth`) - "Add to Slack" authorize URL and code exchange
//! - **Block Kit** (`blocks`) - reply message builders
//!
//! # Architecture
//!
//! ```text
//! POST /slack/receive → SlashCommandHandler → CommandRouter → DirectoryService
//!                              ↓
//!                   ReplySender ← Block Kit reply
//! ```

pub mod blocks;
pub mod commands;
pub mod handler;
pub mod oauth;
pub mod reply;
pub mod verification;
