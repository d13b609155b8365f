//! Message pipeline: classify → store → generate.
//!
//! [`Pipeline::respond`] turns one inbound message into exactly one reply
//! text. Every failure is mapped to a user-facing message here, so callers
//! only have to deliver the result.

use std::sync::Arc;

use tracing::{debug, instrument, warn};

use sitebot_fetcher::PageFetcher;
use sitebot_intent::{Intent, classify};
use sitebot_shared::{AppConfig, ConversationId, SiteBotError};
use sitebot_storage::Storage;

use crate::enrichment::build_enricher;
use crate::messages;
use crate::reply::{ChatModel, OpenAiChat, ReplyGenerator};
use crate::store::ConversationStore;

#[derive(Clone)]
pub struct Pipeline {
    store: ConversationStore,
    generator: ReplyGenerator,
}

impl Pipeline {
    pub fn new(store: ConversationStore, generator: ReplyGenerator) -> Self {
        Self { store, generator }
    }

    /// Wire up storage, fetcher, company lookup and reply model from config.
    pub async fn from_config(config: &AppConfig) -> sitebot_shared::Result<Self> {
        let db_path = config.database.resolved_path()?;
        let storage = Arc::new(Storage::open(&db_path).await?);

        let fetcher = PageFetcher::new(&config.fetch)?;
        let enricher = build_enricher(&config.enrichment)?;
        let model = OpenAiChat::from_config(&config.openai)?
            .map(|chat| Arc::new(chat) as Arc<dyn ChatModel>);

        Ok(Self::new(
            ConversationStore::new(storage, fetcher, enricher),
            ReplyGenerator::new(model),
        ))
    }

    /// Produce the reply for one message.
    #[instrument(skip_all, fields(conversation_id = %conversation_id))]
    pub async fn respond(&self, conversation_id: ConversationId, text: Option<&str>) -> String {
        let intent = classify(text);
        debug!(?intent, "message classified");

        match intent {
            Intent::EmptyCommand => messages::GREETING.to_string(),

            Intent::SiteMention { url, query } => {
                let ctx = match self.store.save(conversation_id, &url).await {
                    Ok(ctx) => ctx,
                    Err(e) => return failure_reply(&e),
                };
                match query {
                    Some(question) => self.generator.answer(&ctx, &question).await,
                    None => self.generator.overview(&ctx).await,
                }
            }

            Intent::QueryOnly { text } => match self.store.get_latest(conversation_id).await {
                Ok(Some(ctx)) => self.generator.answer(&ctx, &text).await,
                Ok(None) => messages::NO_SITE_YET.to_string(),
                Err(e) => failure_reply(&e),
            },
        }
    }
}

/// Map a stage failure to its reply text.
fn failure_reply(err: &SiteBotError) -> String {
    warn!(error = %err, "message handling failed");
    match err {
        SiteBotError::Validation { .. } => messages::INVALID_SITE,
        SiteBotError::Storage(_) => messages::STORAGE_FAILED,
        _ => messages::PROCESSING_FAILED,
    }
    .to_string()
}
