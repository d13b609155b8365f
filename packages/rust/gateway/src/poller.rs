//! Long-poll transport: `getUpdates` in a loop, one task per update.

use std::future::Future;
use std::time::Duration;

use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use sitebot_shared::Result;
use sitebot_telegram::TelegramClient;

use crate::dispatch::Dispatcher;

/// Pause before polling again after a failed `getUpdates`.
const RETRY_PAUSE: Duration = Duration::from_secs(1);

pub struct Poller {
    client: TelegramClient,
    dispatcher: Dispatcher,
    timeout_secs: u64,
    /// Highest update id handed to the dispatcher so far.
    last_update_id: Option<i64>,
}

impl Poller {
    pub fn new(client: TelegramClient, dispatcher: Dispatcher, timeout_secs: u64) -> Self {
        Self {
            client,
            dispatcher,
            timeout_secs,
            last_update_id: None,
        }
    }

    pub fn last_update_id(&self) -> Option<i64> {
        self.last_update_id
    }

    /// Fetch one batch and spawn a handler per update.
    ///
    /// The offset advances past the whole batch before any handler finishes,
    /// so a slow reply never causes a redelivery.
    pub async fn poll_once(&mut self) -> Result<Vec<JoinHandle<()>>> {
        let offset = self.last_update_id.map(|id| id + 1);
        let updates = self.client.get_updates(offset, self.timeout_secs).await?;

        if let Some(max_id) = updates.iter().map(|u| u.update_id).max() {
            self.last_update_id = Some(self.last_update_id.map_or(max_id, |id| id.max(max_id)));
        }
        if !updates.is_empty() {
            debug!(count = updates.len(), last_update_id = ?self.last_update_id, "updates received");
        }

        let handles = updates
            .into_iter()
            .map(|update| {
                let dispatcher = self.dispatcher.clone();
                tokio::spawn(async move { dispatcher.handle_update(&update).await })
            })
            .collect();
        Ok(handles)
    }

    /// Remove any webhook, then poll until `shutdown` resolves.
    pub async fn run<F>(mut self, shutdown: F) -> Result<()>
    where
        F: Future<Output = ()>,
    {
        // getUpdates is refused while a webhook is registered
        match self.client.delete_webhook().await {
            Ok(_) => info!("webhook removed, polling for updates"),
            Err(e) => warn!(error = %e, "could not remove webhook, polling anyway"),
        }

        tokio::pin!(shutdown);
        loop {
            tokio::select! {
                _ = &mut shutdown => break,
                result = self.poll_once() => {
                    if let Err(e) = result {
                        warn!(error = %e, "polling failed");
                        tokio::select! {
                            _ = &mut shutdown => break,
                            _ = tokio::time::sleep(RETRY_PAUSE) => {}
                        }
                    }
                }
            }
        }

        info!(last_update_id = ?self.last_update_id, "polling stopped");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use sitebot_core::messages;
    use sitebot_telegram::BotApiConfig;
    use wiremock::matchers::{body_partial_json, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    use crate::testing::{FakeMessenger, test_dispatcher};

    fn test_client(server: &MockServer) -> TelegramClient {
        TelegramClient::new(BotApiConfig {
            token: "t".into(),
            api_base: server.uri(),
            parse_mode: "HTML".into(),
        })
        .unwrap()
    }

    #[tokio::test]
    async fn offset_advances_past_batch() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/bott/getUpdates"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "ok": true,
                "result": [
                    {"update_id": 7, "message": {"chat": {"id": 2}}},
                    {"update_id": 5, "message": {"chat": {"id": 1}, "text": "/start"}}
                ]
            })))
            .up_to_n_times(1)
            .mount(&server)
            .await;
        Mock::given(method("POST"))
            .and(path("/bott/getUpdates"))
            .and(body_partial_json(json!({"offset": 8})))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({"ok": true, "result": []})))
            .mount(&server)
            .await;

        let (dispatcher, messenger) = test_dispatcher(FakeMessenger::default()).await;
        let mut poller = Poller::new(test_client(&server), dispatcher, 0);

        let handles = poller.poll_once().await.unwrap();
        assert_eq!(handles.len(), 2);
        assert_eq!(poller.last_update_id(), Some(7));
        for handle in handles {
            handle.await.unwrap();
        }

        let mut sent = messenger.sent();
        sent.sort();
        assert_eq!(
            sent,
            vec![
                (1, messages::GREETING.to_string()),
                (2, messages::TEXT_ONLY.to_string()),
            ]
        );

        // the follow-up poll only matches with offset 8
        let handles = poller.poll_once().await.unwrap();
        assert!(handles.is_empty());
        assert_eq!(poller.last_update_id(), Some(7));
    }

    #[tokio::test]
    async fn failed_poll_keeps_offset() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(409).set_body_json(json!({
                "ok": false,
                "description": "Conflict: can't use getUpdates method while webhook is active"
            })))
            .mount(&server)
            .await;

        let (dispatcher, _) = test_dispatcher(FakeMessenger::default()).await;
        let mut poller = Poller::new(test_client(&server), dispatcher, 0);
        assert!(poller.poll_once().await.is_err());
        assert_eq!(poller.last_update_id(), None);
    }

    #[tokio::test]
    async fn run_deletes_webhook_and_stops_on_shutdown() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/bott/deleteWebhook"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({"ok": true, "result": true})))
            .expect(1)
            .mount(&server)
            .await;
        Mock::given(method("POST"))
            .and(path("/bott/getUpdates"))
            .respond_with(
                ResponseTemplate::new(200)
                    .set_body_json(json!({"ok": true, "result": []}))
                    .set_delay(Duration::from_millis(50)),
            )
            .mount(&server)
            .await;

        let (dispatcher, _) = test_dispatcher(FakeMessenger::default()).await;
        let poller = Poller::new(test_client(&server), dispatcher, 0);
        let result = poller
            .run(tokio::time::sleep(Duration::from_millis(200)))
            .await;
        assert!(result.is_ok());
    }
}
