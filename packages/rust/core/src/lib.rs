//! Core conversation logic for SiteBot.
//!
//! - [`enrichment`]: company lookup and the page-text + record blob format
//! - [`reply`]: prompt construction and the chat-completion seam
//! - [`store`]: fetch, clean, enrich, persist
//! - [`pipeline`]: one message in, one reply out

pub mod enrichment;
pub mod messages;
pub mod pipeline;
pub mod reply;
pub mod store;

pub use enrichment::{InfoEnricher, OfflineEnricher, YandexEnricher, build_enricher};
pub use pipeline::Pipeline;
pub use reply::{ChatMessage, ChatModel, OpenAiChat, ReplyGenerator};
pub use store::ConversationStore;
