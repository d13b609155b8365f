//! Shared types, error model, and configuration for SiteBot.
//!
//! This crate is the foundation depended on by all other SiteBot crates.
//! It provides:
//! - [`SiteBotError`]: the unified error type
//! - Domain types ([`ConversationId`], [`ConversationContext`], [`CompanyInfo`])
//! - Configuration ([`AppConfig`] and its sections, config loading)

pub mod config;
pub mod error;
pub mod types;

// Re-export public API at crate root for ergonomic imports.
pub use config::{
    AppConfig, DatabaseConfig, EnrichmentConfig, EnrichmentMode, FetchConfig, OpenAiConfig,
    ServerConfig, TelegramConfig, config_dir, config_file_path, init_config, load_config,
    load_config_from, require_secret, secret_from_env,
};
pub use error::{Result, SiteBotError};
pub use types::{CompanyInfo, ConversationContext, ConversationId, UNKNOWN_COMPANY};
