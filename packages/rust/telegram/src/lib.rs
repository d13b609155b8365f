//! Telegram Bot API access for SiteBot.
//!
//! - [`TelegramClient`]: `sendMessage`, `setWebhook`, `deleteWebhook`, `getUpdates`
//! - [`Update`] and friends: the inbound payload subset the bot reads
//! - [`Messenger`]: the outbound seam the dispatcher talks to

mod client;
pub mod types;

use async_trait::async_trait;
use sitebot_shared::Result;

pub use client::{BotApiConfig, TelegramClient};
pub use types::{ApiResponse, Chat, Message, Update, chat_id_from_value};

/// Anything that can deliver a text reply to a chat.
#[async_trait]
pub trait Messenger: Send + Sync {
    async fn send_message(&self, chat_id: i64, text: &str) -> Result<()>;
}
