//! HTTP client for the Telegram Bot API.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;
use serde::de::DeserializeOwned;
use serde_json::{Value, json};
use tracing::{debug, instrument};

use sitebot_shared::{Result, SiteBotError, TelegramConfig, require_secret};

use crate::Messenger;
use crate::types::{ApiResponse, Update};

/// Default timeout for non-polling calls.
const REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

/// Slack added on top of the long-poll timeout for the HTTP request itself.
const POLL_GRACE: Duration = Duration::from_secs(10);

/// Connection settings for the Bot API.
#[derive(Debug, Clone)]
pub struct BotApiConfig {
    pub token: String,
    pub api_base: String,
    pub parse_mode: String,
}

impl BotApiConfig {
    /// Build from the `[telegram]` section, reading the token from its env var.
    pub fn from_config(config: &TelegramConfig) -> Result<Self> {
        Ok(Self {
            token: require_secret(&config.token_env, "Telegram bot token")?,
            api_base: config.api_base.trim_end_matches('/').to_string(),
            parse_mode: config.parse_mode.clone(),
        })
    }
}

/// Thin Bot API client. Cheap to clone.
#[derive(Debug, Clone)]
pub struct TelegramClient {
    config: BotApiConfig,
    client: Client,
}

impl TelegramClient {
    pub fn new(config: BotApiConfig) -> Result<Self> {
        let client = Client::builder()
            .timeout(REQUEST_TIMEOUT)
            .build()
            .map_err(|e| SiteBotError::Network(format!("failed to build HTTP client: {e}")))?;
        Ok(Self { config, client })
    }

    /// Send `text` to `chat_id` with the configured parse mode.
    ///
    /// Replies are plain text, so under the HTML parse mode `&`, `<` and `>`
    /// are escaped and reach the user verbatim.
    #[instrument(skip_all, fields(chat_id = chat_id))]
    pub async fn send_message(&self, chat_id: i64, text: &str) -> Result<()> {
        let parse_mode = self.config.parse_mode.as_str();
        let text = if parse_mode.eq_ignore_ascii_case("html") {
            escape_html(text)
        } else {
            text.to_string()
        };

        let mut body = json!({ "chat_id": chat_id, "text": text });
        if !parse_mode.is_empty() {
            body["parse_mode"] = Value::String(parse_mode.to_string());
        }
        let _: Value = self.call("sendMessage", &body, None).await?;
        debug!(len = text.len(), "message sent");
        Ok(())
    }

    /// Register `url` as the webhook, subscribing to messages only.
    pub async fn set_webhook(&self, url: &str) -> Result<bool> {
        let body = json!({ "url": url, "allowed_updates": ["message"] });
        self.call("setWebhook", &body, None).await
    }

    /// Remove any registered webhook.
    pub async fn delete_webhook(&self) -> Result<bool> {
        self.call("deleteWebhook", &json!({}), None).await
    }

    /// Long-poll for updates newer than `offset`.
    pub async fn get_updates(&self, offset: Option<i64>, timeout_secs: u64) -> Result<Vec<Update>> {
        let mut body = json!({ "timeout": timeout_secs, "allowed_updates": ["message"] });
        if let Some(offset) = offset {
            body["offset"] = json!(offset);
        }
        let request_timeout = Duration::from_secs(timeout_secs) + POLL_GRACE;
        self.call("getUpdates", &body, Some(request_timeout)).await
    }

    /// POST a method call and unwrap the `{ok, result}` envelope.
    async fn call<T: DeserializeOwned>(
        &self,
        method: &str,
        body: &Value,
        timeout: Option<Duration>,
    ) -> Result<T> {
        // the URL embeds the token, so it is never logged
        let url = format!("{}/bot{}/{method}", self.config.api_base, self.config.token);

        let mut request = self.client.post(&url).json(body);
        if let Some(timeout) = timeout {
            request = request.timeout(timeout);
        }

        let response = request
            .send()
            .await
            .map_err(|e| SiteBotError::Network(format!("{method}: {}", e.without_url())))?;
        let status = response.status();

        let envelope: ApiResponse<T> = response.json().await.map_err(|e| {
            SiteBotError::Messaging(format!("{method}: HTTP {status}, unreadable body: {}", e.without_url()))
        })?;

        if !envelope.ok {
            return Err(SiteBotError::Messaging(format!(
                "{method}: {}",
                envelope.description.as_deref().unwrap_or("request rejected")
            )));
        }

        envelope
            .result
            .ok_or_else(|| SiteBotError::Messaging(format!("{method}: response without result")))
    }
}

#[async_trait]
impl Messenger for TelegramClient {
    async fn send_message(&self, chat_id: i64, text: &str) -> Result<()> {
        TelegramClient::send_message(self, chat_id, text).await
    }
}

/// Escape the characters Telegram's HTML parse mode treats as markup.
fn escape_html(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    for c in text.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            _ => out.push(c),
        }
    }
    out
}
