//! Application configuration for SiteBot.
//!
//! User config lives at `~/.sitebot/sitebot.toml`.
//! CLI flags override config file values, which override defaults.
//! Secrets are never stored in the file: each section names the environment
//! variable that holds its credential.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::error::{Result, SiteBotError};

/// Default configuration file name.
const CONFIG_FILE_NAME: &str = "sitebot.toml";

/// Default config directory name under the user's home.
const CONFIG_DIR_NAME: &str = ".sitebot";

// ---------------------------------------------------------------------------
// Config structs (matching sitebot.toml schema)
// ---------------------------------------------------------------------------

/// Top-level application config, deserialized from TOML.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AppConfig {
    /// Telegram Bot API settings.
    #[serde(default)]
    pub telegram: TelegramConfig,

    /// Webhook HTTP server settings.
    #[serde(default)]
    pub server: ServerConfig,

    /// Conversation database.
    #[serde(default)]
    pub database: DatabaseConfig,

    /// Website fetching.
    #[serde(default)]
    pub fetch: FetchConfig,

    /// Reply generation (OpenAI-compatible chat completions).
    #[serde(default)]
    pub openai: OpenAiConfig,

    /// Company lookup.
    #[serde(default)]
    pub enrichment: EnrichmentConfig,
}

/// `[telegram]` section.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TelegramConfig {
    /// Name of the env var holding the bot token.
    #[serde(default = "default_token_env")]
    pub token_env: String,

    /// Bot API base URL.
    #[serde(default = "default_telegram_api_base")]
    pub api_base: String,

    /// Public base URL the platform should push updates to (webhook mode).
    #[serde(default)]
    pub webhook_url: Option<String>,

    /// Route the webhook handler is mounted on.
    #[serde(default = "default_webhook_path")]
    pub webhook_path: String,

    /// Markup mode for outgoing messages.
    #[serde(default = "default_parse_mode")]
    pub parse_mode: String,

    /// Long-poll timeout for `getUpdates`.
    #[serde(default = "default_poll_timeout")]
    pub poll_timeout_secs: u64,
}

impl Default for TelegramConfig {
    fn default() -> Self {
        Self {
            token_env: default_token_env(),
            api_base: default_telegram_api_base(),
            webhook_url: None,
            webhook_path: default_webhook_path(),
            parse_mode: default_parse_mode(),
            poll_timeout_secs: default_poll_timeout(),
        }
    }
}

impl TelegramConfig {
    /// Full callback URL registered with the platform, if a base URL is set.
    pub fn webhook_callback_url(&self) -> Option<String> {
        let base = self.webhook_url.as_deref()?.trim().trim_end_matches('/');
        if base.is_empty() {
            return None;
        }
        let path = self.webhook_path.trim_start_matches('/');
        Some(format!("{base}/{path}"))
    }
}

fn default_token_env() -> String {
    "TELEGRAM_BOT_TOKEN".into()
}
fn default_telegram_api_base() -> String {
    "https://api.telegram.org".into()
}
fn default_webhook_path() -> String {
    "/webhook".into()
}
fn default_parse_mode() -> String {
    "HTML".into()
}
fn default_poll_timeout() -> u64 {
    30
}

/// `[server]` section.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    #[serde(default = "default_host")]
    pub host: String,

    #[serde(default = "default_port")]
    pub port: u16,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
        }
    }
}

fn default_host() -> String {
    "0.0.0.0".into()
}
fn default_port() -> u16 {
    8000
}

/// `[database]` section.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DatabaseConfig {
    /// Path to the libSQL database file. A leading `~/` expands to home.
    #[serde(default = "default_db_path")]
    pub path: String,
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            path: default_db_path(),
        }
    }
}

impl DatabaseConfig {
    /// The database path with `~/` expanded.
    pub fn resolved_path(&self) -> Result<PathBuf> {
        expand_home(&self.path)
    }
}

fn default_db_path() -> String {
    "~/.sitebot/sitebot.db".into()
}

/// `[fetch]` section.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FetchConfig {
    /// Per-request timeout for page downloads.
    #[serde(default = "default_fetch_timeout")]
    pub timeout_secs: u64,

    /// Responses larger than this are treated as unavailable.
    #[serde(default = "default_max_body_bytes")]
    pub max_body_bytes: u64,

    /// Allow fetching loopback/private addresses.
    #[serde(default)]
    pub allow_private_hosts: bool,
}

impl Default for FetchConfig {
    fn default() -> Self {
        Self {
            timeout_secs: default_fetch_timeout(),
            max_body_bytes: default_max_body_bytes(),
            allow_private_hosts: false,
        }
    }
}

fn default_fetch_timeout() -> u64 {
    10
}
fn default_max_body_bytes() -> u64 {
    5 * 1024 * 1024
}

/// `[openai]` section.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OpenAiConfig {
    /// Name of the env var holding the API key.
    #[serde(default = "default_openai_key_env")]
    pub api_key_env: String,

    /// Name of the env var holding the optional organization id.
    #[serde(default = "default_openai_org_env")]
    pub organization_env: String,

    /// API base URL (anything OpenAI-compatible).
    #[serde(default = "default_openai_base_url")]
    pub base_url: String,

    /// Chat model used for replies.
    #[serde(default = "default_openai_model")]
    pub model: String,

    #[serde(default = "default_openai_timeout")]
    pub timeout_secs: u64,
}

impl Default for OpenAiConfig {
    fn default() -> Self {
        Self {
            api_key_env: default_openai_key_env(),
            organization_env: default_openai_org_env(),
            base_url: default_openai_base_url(),
            model: default_openai_model(),
            timeout_secs: default_openai_timeout(),
        }
    }
}

fn default_openai_key_env() -> String {
    "OPENAI_API_KEY".into()
}
fn default_openai_org_env() -> String {
    "OPENAI_ORGANIZATION".into()
}
fn default_openai_base_url() -> String {
    "https://api.openai.com/v1".into()
}
fn default_openai_model() -> String {
    "gpt-4o-mini".into()
}
fn default_openai_timeout() -> u64 {
    60
}

/// Which company lookup implementation to run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EnrichmentMode {
    /// Yandex when credentials are present, offline otherwise.
    #[default]
    Auto,
    /// Always call the Yandex completion API.
    Yandex,
    /// Derive a stub from the domain name only.
    Offline,
}

/// `[enrichment]` section.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EnrichmentConfig {
    #[serde(default)]
    pub mode: EnrichmentMode,

    /// Name of the env var holding the Yandex API key.
    #[serde(default = "default_yandex_key_env")]
    pub api_key_env: String,

    /// Name of the env var holding the Yandex folder id.
    #[serde(default = "default_yandex_folder_env")]
    pub folder_id_env: String,

    /// Completion endpoint.
    #[serde(default = "default_yandex_endpoint")]
    pub endpoint: String,

    /// Model name; the model URI is `gpt://<folder>/<model>`.
    #[serde(default = "default_yandex_model")]
    pub model: String,

    #[serde(default = "default_temperature")]
    pub temperature: f32,

    #[serde(default = "default_max_tokens")]
    pub max_tokens: u32,

    #[serde(default = "default_enrichment_timeout")]
    pub timeout_secs: u64,
}

impl Default for EnrichmentConfig {
    fn default() -> Self {
        Self {
            mode: EnrichmentMode::default(),
            api_key_env: default_yandex_key_env(),
            folder_id_env: default_yandex_folder_env(),
            endpoint: default_yandex_endpoint(),
            model: default_yandex_model(),
            temperature: default_temperature(),
            max_tokens: default_max_tokens(),
            timeout_secs: default_enrichment_timeout(),
        }
    }
}

fn default_yandex_key_env() -> String {
    "YANDEX_API_KEY".into()
}
fn default_yandex_folder_env() -> String {
    "YANDEX_FOLDERID".into()
}
fn default_yandex_endpoint() -> String {
    "https://llm.api.cloud.yandex.net/foundationModels/v1/completion".into()
}
fn default_yandex_model() -> String {
    "yandexgpt-lite".into()
}
fn default_temperature() -> f32 {
    0.6
}
fn default_max_tokens() -> u32 {
    1500
}
fn default_enrichment_timeout() -> u64 {
    30
}

// ---------------------------------------------------------------------------
// Config loading
// ---------------------------------------------------------------------------

/// Get the path to the config directory (`~/.sitebot/`).
pub fn config_dir() -> Result<PathBuf> {
    let home =
        dirs::home_dir().ok_or_else(|| SiteBotError::config("could not determine home directory"))?;
    Ok(home.join(CONFIG_DIR_NAME))
}

/// Get the path to the config file (`~/.sitebot/sitebot.toml`).
pub fn config_file_path() -> Result<PathBuf> {
    Ok(config_dir()?.join(CONFIG_FILE_NAME))
}

/// Load the application config from disk. Returns defaults if the file does not exist.
pub fn load_config() -> Result<AppConfig> {
    let path = config_file_path()?;

    if !path.exists() {
        tracing::debug!(?path, "config file not found, using defaults");
        return Ok(AppConfig::default());
    }

    load_config_from(&path)
}

/// Load the application config from a specific file path.
pub fn load_config_from(path: &Path) -> Result<AppConfig> {
    let content = std::fs::read_to_string(path).map_err(|e| SiteBotError::io(path, e))?;

    toml::from_str(&content)
        .map_err(|e| SiteBotError::config(format!("failed to parse {}: {e}", path.display())))
}

/// Create the config directory and write a default config file.
/// Returns the path to the created file.
pub fn init_config() -> Result<PathBuf> {
    let dir = config_dir()?;
    std::fs::create_dir_all(&dir).map_err(|e| SiteBotError::io(&dir, e))?;

    let path = dir.join(CONFIG_FILE_NAME);
    let config = AppConfig::default();
    let content =
        toml::to_string_pretty(&config).map_err(|e| SiteBotError::config(e.to_string()))?;

    std::fs::write(&path, content).map_err(|e| SiteBotError::io(&path, e))?;
    tracing::info!(?path, "created default config file");

    Ok(path)
}

/// Read an optional secret from the named env var. Empty values count as unset.
pub fn secret_from_env(var_name: &str) -> Option<String> {
    std::env::var(var_name)
        .ok()
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}

/// Read a required secret from the named env var.
pub fn require_secret(var_name: &str, what: &str) -> Result<String> {
    secret_from_env(var_name).ok_or_else(|| {
        SiteBotError::config(format!(
            "{what} not found. Set the {var_name} environment variable."
        ))
    })
}

/// Expand a leading `~/` to the user's home directory.
fn expand_home(path: &str) -> Result<PathBuf> {
    match path.strip_prefix("~/") {
        Some(rest) => {
            let home = dirs::home_dir()
                .ok_or_else(|| SiteBotError::config("could not determine home directory"))?;
            Ok(home.join(rest))
        }
        None => Ok(PathBuf::from(path)),
    }
}
