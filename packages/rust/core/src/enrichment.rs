//! Company information lookup.
//!
//! Two [`InfoEnricher`] implementations are chosen at startup:
//! [`YandexEnricher`] asks a Yandex foundation model for a JSON description of
//! the company behind a site, [`OfflineEnricher`] derives a minimal record from
//! the domain alone. Neither ever fails: problems degrade to stub records.
//!
//! The record travels with the cleaned page text as one blob, appended after
//! [`COMPANY_INFO_MARKER`]; [`split_enriched_text`] takes it apart again.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use tracing::{debug, info, instrument, warn};
use url::Url;

use sitebot_shared::{
    CompanyInfo, EnrichmentConfig, EnrichmentMode, Result, SiteBotError, secret_from_env,
};

/// Tag separating page text from the serialized company record.
pub const COMPANY_INFO_MARKER: &str = "COMPANY_INFO: ";

/// Search phrase used when looking up the company behind a site.
pub const COMPANY_LOOKUP_QUERY: &str = "информация о компании";

const SYSTEM_PROMPT: &str = "You are a research assistant that extracts accurate information \
about companies from search results.";

// Stub descriptions, one per failure kind.
const STUB_NO_CREDENTIALS: &str =
    "Не удалось получить информацию о компании: отсутствуют учетные данные API.";
const STUB_EMPTY_ANSWER: &str = "Информация о компании не найдена.";
const STUB_NETWORK: &str = "Ошибка сетевого запроса при обращении к API.";
const STUB_UNEXPECTED: &str = "Непредвиденная ошибка при получении информации о компании.";

const OFFLINE_DESCRIPTION: &str =
    "Подробная информация о компании недоступна, ответ основан на содержимом сайта.";

// ---------------------------------------------------------------------------
// Trait
// ---------------------------------------------------------------------------

/// Looks up structured facts about the company behind a website.
#[async_trait]
pub trait InfoEnricher: Send + Sync {
    /// Short name for logs.
    fn name(&self) -> &'static str;

    /// Produce a company record for `site`. Never fails; degrades to a stub.
    async fn enrich(&self, site: &Url, query: &str) -> CompanyInfo;
}

/// Pick the enricher for the configured mode.
///
/// `auto` uses Yandex when both credentials are present and falls back to
/// offline otherwise. `yandex` always uses Yandex, answering with the
/// missing-credentials stub when they are absent.
pub fn build_enricher(config: &EnrichmentConfig) -> Result<Arc<dyn InfoEnricher>> {
    let api_key = secret_from_env(&config.api_key_env);
    let folder_id = secret_from_env(&config.folder_id_env);

    let enricher: Arc<dyn InfoEnricher> = match config.mode {
        EnrichmentMode::Offline => Arc::new(OfflineEnricher),
        EnrichmentMode::Auto if api_key.is_none() || folder_id.is_none() => {
            info!("Yandex credentials not set, using offline company lookup");
            Arc::new(OfflineEnricher)
        }
        EnrichmentMode::Auto | EnrichmentMode::Yandex => {
            Arc::new(YandexEnricher::new(config, api_key, folder_id)?)
        }
    };

    info!(enricher = enricher.name(), "company lookup ready");
    Ok(enricher)
}

// ---------------------------------------------------------------------------
// Yandex
// ---------------------------------------------------------------------------

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct CompletionRequest<'a> {
    model_uri: String,
    completion_options: CompletionOptions,
    messages: [PromptMessage<'a>; 2],
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct CompletionOptions {
    stream: bool,
    temperature: f32,
    max_tokens: u32,
}

#[derive(Debug, Serialize)]
struct PromptMessage<'a> {
    role: &'a str,
    text: String,
}

#[derive(Debug, Default, Deserialize)]
struct CompletionResponse {
    #[serde(default)]
    result: Option<CompletionResult>,
}

#[derive(Debug, Default, Deserialize)]
struct CompletionResult {
    #[serde(default)]
    alternatives: Vec<Alternative>,
}

#[derive(Debug, Default, Deserialize)]
struct Alternative {
    #[serde(default)]
    message: Option<AlternativeMessage>,
}

#[derive(Debug, Default, Deserialize)]
struct AlternativeMessage {
    #[serde(default)]
    text: String,
}

impl CompletionResponse {
    fn first_text(&self) -> &str {
        self.result
            .as_ref()
            .and_then(|r| r.alternatives.first())
            .and_then(|a| a.message.as_ref())
            .map(|m| m.text.as_str())
            .unwrap_or_default()
    }
}

/// Company lookup through the Yandex foundation-model completion API.
pub struct YandexEnricher {
    client: Client,
    endpoint: String,
    model: String,
    temperature: f32,
    max_tokens: u32,
    api_key: Option<String>,
    folder_id: Option<String>,
}

impl YandexEnricher {
    pub fn new(
        config: &EnrichmentConfig,
        api_key: Option<String>,
        folder_id: Option<String>,
    ) -> Result<Self> {
        let client = Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()
            .map_err(|e| SiteBotError::Network(format!("failed to build HTTP client: {e}")))?;

        Ok(Self {
            client,
            endpoint: config.endpoint.clone(),
            model: config.model.clone(),
            temperature: config.temperature,
            max_tokens: config.max_tokens,
            api_key,
            folder_id,
        })
    }

    fn request_body(&self, folder_id: &str, search_query: &str) -> CompletionRequest<'static> {
        CompletionRequest {
            model_uri: format!("gpt://{folder_id}/{}", self.model),
            completion_options: CompletionOptions {
                stream: false,
                temperature: self.temperature,
                max_tokens: self.max_tokens,
            },
            messages: [
                PromptMessage {
                    role: "system",
                    text: SYSTEM_PROMPT.to_string(),
                },
                PromptMessage {
                    role: "user",
                    text: format!(
                        "Search the web for: {search_query}\n\n\
                         Find the following information about the company: company name, \
                         description, services offered, contact information. Format as JSON."
                    ),
                },
            ],
        }
    }
}

#[async_trait]
impl InfoEnricher for YandexEnricher {
    fn name(&self) -> &'static str {
        "yandex"
    }

    #[instrument(skip_all, fields(site = %site))]
    async fn enrich(&self, site: &Url, query: &str) -> CompanyInfo {
        let (Some(api_key), Some(folder_id)) = (&self.api_key, &self.folder_id) else {
            warn!("Yandex credentials missing");
            return CompanyInfo::stub(STUB_NO_CREDENTIALS);
        };

        let search_query = match site_domain(site) {
            Some(domain) => format!("{query} site:{domain}"),
            None => query.to_string(),
        };
        debug!(%search_query, "requesting company lookup");

        let response = match self
            .client
            .post(&self.endpoint)
            .header("Authorization", format!("Api-Key {api_key}"))
            .header("x-folder-id", folder_id)
            .json(&self.request_body(folder_id, &search_query))
            .send()
            .await
        {
            Ok(response) => response,
            Err(e) => {
                warn!(error = %e, "company lookup request failed");
                return CompanyInfo::stub(STUB_NETWORK);
            }
        };

        let status = response.status();
        if !status.is_success() {
            warn!(%status, "company lookup rejected");
            return CompanyInfo::stub(format!(
                "Ошибка при запросе к API: {}",
                status.as_u16()
            ));
        }

        let body: CompletionResponse = match response.json().await {
            Ok(body) => body,
            Err(e) => {
                warn!(error = %e, "company lookup response unreadable");
                return CompanyInfo::stub(STUB_UNEXPECTED);
            }
        };

        let info = parse_answer(body.first_text());
        debug!(company = %info.company_name, "company lookup finished");
        info
    }
}

/// Turn the model's free-text answer into a record.
fn parse_answer(answer: &str) -> CompanyInfo {
    if answer.trim().is_empty() {
        return CompanyInfo::stub(STUB_EMPTY_ANSWER);
    }

    match extract_json_object(answer) {
        Some(value) => CompanyInfo::from_value(&value),
        None => {
            debug!("no JSON object in answer, keeping raw text");
            CompanyInfo::stub(answer)
        }
    }
}

/// Find a JSON object inside free text.
///
/// Tries the first balanced `{...}` span first, then the widest span from the
/// first `{` to the last `}`.
fn extract_json_object(text: &str) -> Option<serde_json::Value> {
    let start = text.find('{')?;

    let balanced = balanced_object_end(&text[start..]).map(|len| &text[start..start + len]);
    let widest = text.rfind('}').filter(|&end| end > start).map(|end| &text[start..=end]);

    [balanced, widest]
        .into_iter()
        .flatten()
        .filter_map(|candidate| serde_json::from_str::<serde_json::Value>(candidate).ok())
        .find(serde_json::Value::is_object)
}

/// Byte length of the balanced object starting at `text[0] == '{'`.
fn balanced_object_end(text: &str) -> Option<usize> {
    let mut depth = 0usize;
    let mut in_string = false;
    let mut escaped = false;

    for (i, c) in text.char_indices() {
        if in_string {
            match c {
                _ if escaped => escaped = false,
                '\\' => escaped = true,
                '"' => in_string = false,
                _ => {}
            }
            continue;
        }
        match c {
            '"' => in_string = true,
            '{' => depth += 1,
            '}' => {
                depth = depth.checked_sub(1)?;
                if depth == 0 {
                    return Some(i + 1);
                }
            }
            _ => {}
        }
    }
    None
}

// ---------------------------------------------------------------------------
// Offline
// ---------------------------------------------------------------------------

/// Lookup that never leaves the process: the company is named after its domain.
pub struct OfflineEnricher;

#[async_trait]
impl InfoEnricher for OfflineEnricher {
    fn name(&self) -> &'static str {
        "offline"
    }

    async fn enrich(&self, site: &Url, _query: &str) -> CompanyInfo {
        let company_name = site_domain(site)
            .and_then(|domain| domain.split('.').next())
            .map(capitalize)
            .filter(|name| !name.is_empty())
            .unwrap_or_else(|| sitebot_shared::UNKNOWN_COMPANY.to_string());

        CompanyInfo {
            company_name,
            ..CompanyInfo::stub(OFFLINE_DESCRIPTION)
        }
    }
}

// ---------------------------------------------------------------------------
// Blob encoding
// ---------------------------------------------------------------------------

/// Append the serialized record to the cleaned page text.
pub fn append_company_info(page_text: &str, info: &CompanyInfo) -> Result<String> {
    let json = serde_json::to_string(info)
        .map_err(|e| SiteBotError::parse(format!("company record: {e}")))?;
    Ok(format!("{page_text}\n\n{COMPANY_INFO_MARKER}{json}"))
}

/// Split a stored blob back into page text and company record.
///
/// The last marker followed by a valid JSON object wins, so page text that
/// happens to contain the marker itself is left intact. Blobs without a
/// record come back whole with `None`.
pub fn split_enriched_text(blob: &str) -> (String, Option<CompanyInfo>) {
    for (idx, _) in blob.rmatch_indices(COMPANY_INFO_MARKER) {
        let tail = &blob[idx + COMPANY_INFO_MARKER.len()..];

        let info = serde_json::from_str::<CompanyInfo>(tail).ok().or_else(|| {
            serde_json::from_str::<serde_json::Value>(tail)
                .ok()
                .filter(serde_json::Value::is_object)
                .map(|value| CompanyInfo::from_value(&value))
        });

        if let Some(info) = info {
            let head = &blob[..idx];
            let page_text = head.strip_suffix("\n\n").unwrap_or(head);
            return (page_text.to_string(), Some(info));
        }
    }

    (blob.to_string(), None)
}

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

/// Host of `site` without a leading `www.`.
pub(crate) fn site_domain(site: &Url) -> Option<&str> {
    let host = site.host_str()?;
    Some(host.strip_prefix("www.").unwrap_or(host))
}

fn capitalize(word: &str) -> String {
    let mut chars = word.chars();
    match chars.next() {
        Some(first) => first.to_uppercase().chain(chars).collect(),
        None => String::new(),
    }
}
