//! Reply generation through an OpenAI-compatible chat-completion API.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use tracing::{debug, instrument, warn};
use url::Url;

use sitebot_shared::{
    CompanyInfo, ConversationContext, OpenAiConfig, Result, SiteBotError, secret_from_env,
};

use crate::enrichment::{site_domain, split_enriched_text};
use crate::messages;

/// Page text longer than this is cut before it goes into a prompt.
pub const MAX_PROMPT_CONTEXT_CHARS: usize = 12_000;

// ---------------------------------------------------------------------------
// Chat model seam
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChatMessage {
    pub role: String,
    pub content: String,
}

impl ChatMessage {
    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: "user".into(),
            content: content.into(),
        }
    }
}

/// A chat-completion backend returning the first choice's text.
#[async_trait]
pub trait ChatModel: Send + Sync {
    async fn complete(&self, messages: &[ChatMessage]) -> Result<String>;
}

// ---------------------------------------------------------------------------
// OpenAI
// ---------------------------------------------------------------------------

#[derive(Debug, Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    messages: &'a [ChatMessage],
}

#[derive(Debug, Deserialize)]
struct ChatResponse {
    #[serde(default)]
    choices: Vec<Choice>,
}

#[derive(Debug, Deserialize)]
struct Choice {
    message: ChoiceMessage,
}

#[derive(Debug, Deserialize)]
struct ChoiceMessage {
    #[serde(default)]
    content: Option<String>,
}

/// `POST {base_url}/chat/completions` client.
pub struct OpenAiChat {
    client: Client,
    endpoint: String,
    model: String,
    api_key: String,
    organization: Option<String>,
}

impl OpenAiChat {
    pub fn new(config: &OpenAiConfig, api_key: String, organization: Option<String>) -> Result<Self> {
        let client = Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()
            .map_err(|e| SiteBotError::Network(format!("failed to build HTTP client: {e}")))?;

        Ok(Self {
            client,
            endpoint: format!("{}/chat/completions", config.base_url.trim_end_matches('/')),
            model: config.model.clone(),
            api_key,
            organization,
        })
    }

    /// Build from config, or `None` when no API key is set.
    pub fn from_config(config: &OpenAiConfig) -> Result<Option<Self>> {
        let Some(api_key) = secret_from_env(&config.api_key_env) else {
            return Ok(None);
        };
        let organization = secret_from_env(&config.organization_env);
        Self::new(config, api_key, organization).map(Some)
    }
}

#[async_trait]
impl ChatModel for OpenAiChat {
    #[instrument(skip_all, fields(model = %self.model))]
    async fn complete(&self, messages: &[ChatMessage]) -> Result<String> {
        let mut request = self
            .client
            .post(&self.endpoint)
            .bearer_auth(&self.api_key)
            .json(&ChatRequest {
                model: &self.model,
                messages,
            });
        if let Some(org) = &self.organization {
            request = request.header("OpenAI-Organization", org);
        }

        let response = request
            .send()
            .await
            .map_err(|e| SiteBotError::Network(format!("chat completion: {e}")))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(SiteBotError::Generation(format!("HTTP {status}: {body}")));
        }

        let body: ChatResponse = response
            .json()
            .await
            .map_err(|e| SiteBotError::Generation(format!("unreadable response: {e}")))?;

        body.choices
            .into_iter()
            .next()
            .and_then(|choice| choice.message.content)
            .ok_or_else(|| SiteBotError::Generation("response without choices".into()))
    }
}

// ---------------------------------------------------------------------------
// Generator
// ---------------------------------------------------------------------------

/// Builds overview and Q&A prompts from stored context and runs them.
///
/// Never fails: missing context, a missing model and model errors all map to
/// fixed reply texts.
#[derive(Clone)]
pub struct ReplyGenerator {
    model: Option<Arc<dyn ChatModel>>,
}

impl ReplyGenerator {
    pub fn new(model: Option<Arc<dyn ChatModel>>) -> Self {
        if model.is_none() {
            warn!("no reply model configured, replies will report the service as unavailable");
        }
        Self { model }
    }

    /// Introduce the company behind the stored site.
    #[instrument(skip_all, fields(website = %ctx.website))]
    pub async fn overview(&self, ctx: &ConversationContext) -> String {
        let Some(prompt) = PromptContext::from_context(ctx) else {
            return messages::INSUFFICIENT_INFO.to_string();
        };
        self.run(overview_prompt(&prompt)).await
    }

    /// Answer `question` about the company behind the stored site.
    #[instrument(skip_all, fields(website = %ctx.website))]
    pub async fn answer(&self, ctx: &ConversationContext, question: &str) -> String {
        let Some(prompt) = PromptContext::from_context(ctx) else {
            return messages::INSUFFICIENT_INFO.to_string();
        };
        self.run(answer_prompt(&prompt, question)).await
    }

    async fn run(&self, prompt: String) -> String {
        let Some(model) = &self.model else {
            return messages::SERVICE_UNAVAILABLE.to_string();
        };

        debug!(prompt_len = prompt.len(), "requesting reply");
        match model.complete(&[ChatMessage::user(prompt)]).await {
            Ok(text) => text,
            Err(e) => {
                warn!(error = %e, "reply generation failed");
                messages::GENERATION_FAILED.to_string()
            }
        }
    }
}

// ---------------------------------------------------------------------------
// Prompts
// ---------------------------------------------------------------------------

/// Stored context taken apart for interpolation.
struct PromptContext {
    page_text: String,
    domain: String,
    company: Option<CompanyInfo>,
}

impl PromptContext {
    /// `None` when there is no page text to work with.
    fn from_context(ctx: &ConversationContext) -> Option<Self> {
        let (page_text, company) = split_enriched_text(&ctx.enriched_text);
        if page_text.trim().is_empty() {
            return None;
        }

        let domain = Url::parse(&ctx.website)
            .ok()
            .and_then(|url| site_domain(&url).map(str::to_string))
            .unwrap_or_else(|| ctx.website.clone());

        Some(Self {
            page_text: truncate_chars(&page_text, MAX_PROMPT_CONTEXT_CHARS),
            domain,
            company,
        })
    }

    fn name(&self) -> &str {
        self.company
            .as_ref()
            .and_then(CompanyInfo::known_name)
            .unwrap_or_default()
    }

    fn description(&self) -> &str {
        self.company
            .as_ref()
            .map(|c| c.description.as_str())
            .unwrap_or_default()
    }

    fn services(&self) -> String {
        self.company
            .as_ref()
            .map(|c| c.services.join(", "))
            .unwrap_or_default()
    }
}

fn overview_prompt(ctx: &PromptContext) -> String {
    format!(
        r#"Роль:
Ты — AI-консультант компании и общаешься дружелюбно и естественно.

Контекст: "{page}"

Дополнительные сведения о компании:
Название: {name}
Описание: {description}
Услуги: {services}

Задача:
1. Представься AI-консультантом компании.
2. Опиши компанию живо и по делу, в 2-3 предложениях.
3. Перечисли 3-5 ключевых услуг или продуктов простым списком.
4. Заверши дружелюбным предложением помочь.

Пример тона:
"Привет! Я — AI-консультант компании [название].

Мы — [короткое описание, ценности и подход компании].

Чем можем быть полезны:
• [услуга 1]
• [услуга 2]
• [услуга 3]

Готов ответить на ваши вопросы о компании. Чем могу помочь?"

Если название компании не указано, найди его в контексте. Если найти не удалось, используй домен сайта: {domain}
"#,
        page = ctx.page_text,
        name = ctx.name(),
        description = ctx.description(),
        services = ctx.services(),
        domain = ctx.domain,
    )
}

fn answer_prompt(ctx: &PromptContext, question: &str) -> String {
    let who = match ctx.name() {
        "" => format!("(название возьми из контекста, иначе используй домен {})", ctx.domain),
        name => name.to_string(),
    };

    format!(
        r#"Роль:
Ты — дружелюбный AI-консультант компании {who}.
Отвечай ТОЛЬКО на вопросы о компании, её услугах и продуктах.

Контекст о компании:
{page}

Дополнительные сведения о компании:
Название: {name}
Описание: {description}
Услуги: {services}

Вопрос: {question}

Как отвечать:
1. Дружелюбно и разговорно, как настоящий консультант компании.
2. Опирайся на факты из контекста, но излагай их своими словами.
3. Коротко и по существу, не больше 3 предложений.
4. Если в контексте нет нужных сведений, честно и вежливо скажи об этом.

Важно:
- Не отвечай на вопросы, не связанные с компанией (политика, другие компании, личные темы).
- Даже отказ должен звучать естественно, как от живого консультанта.
"#,
        page = ctx.page_text,
        name = ctx.name(),
        description = ctx.description(),
        services = ctx.services(),
    )
}

/// Cut `text` to at most `max_chars` characters, marking the cut.
fn truncate_chars(text: &str, max_chars: usize) -> String {
    match text.char_indices().nth(max_chars) {
        Some((byte_idx, _)) => format!("{}\n\n[... текст сайта сокращён ...]", &text[..byte_idx]),
        None => text.to_string(),
    }
}
