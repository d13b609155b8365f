//! Update dispatch shared by the webhook server and the long-poll loop.

use std::sync::Arc;

use tracing::{debug, instrument, warn};

use sitebot_core::{Pipeline, messages};
use sitebot_shared::ConversationId;
use sitebot_telegram::{Messenger, Update};

/// Runs updates through the pipeline and delivers the replies.
#[derive(Clone)]
pub struct Dispatcher {
    pipeline: Arc<Pipeline>,
    messenger: Arc<dyn Messenger>,
}

impl Dispatcher {
    pub fn new(pipeline: Arc<Pipeline>, messenger: Arc<dyn Messenger>) -> Self {
        Self {
            pipeline,
            messenger,
        }
    }

    /// Handle one update end to end. Updates without a chat are dropped.
    #[instrument(skip_all, fields(update_id = update.update_id))]
    pub async fn handle_update(&self, update: &Update) {
        let Some(chat_id) = update.chat_id() else {
            debug!("update without chat, ignoring");
            return;
        };

        let reply = match update.text() {
            Some(text) => {
                self.pipeline
                    .respond(ConversationId(chat_id), Some(text))
                    .await
            }
            None => messages::TEXT_ONLY.to_string(),
        };

        self.send(chat_id, &reply).await;
    }

    /// Tell a chat its message could not be processed.
    pub async fn reply_failure(&self, chat_id: i64) {
        self.send(chat_id, messages::PROCESSING_FAILED).await;
    }

    async fn send(&self, chat_id: i64, text: &str) {
        if let Err(e) = self.messenger.send_message(chat_id, text).await {
            warn!(chat_id, error = %e, "failed to deliver reply");
        }
    }
}
