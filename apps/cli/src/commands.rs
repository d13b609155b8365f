//! CLI command definitions, routing, and tracing setup.

use std::future::Future;
use std::path::PathBuf;
use std::sync::Arc;

use axum::Router;
use clap::{Parser, Subcommand};
use color_eyre::eyre::{Result, eyre};
use sitebot_core::Pipeline;
use sitebot_gateway::{Dispatcher, Poller, router, serve};
use sitebot_shared::{AppConfig, init_config, load_config, load_config_from};
use sitebot_storage::Storage;
use sitebot_telegram::{BotApiConfig, TelegramClient};
use tokio::net::TcpListener;
use tracing::{info, warn};

// ---------------------------------------------------------------------------
// CLI structure
// ---------------------------------------------------------------------------

/// SiteBot: answer questions about a website from Telegram.
#[derive(Parser)]
#[command(
    name = "sitebot",
    version,
    about = "Telegram bot that reads a website and answers questions about it.",
    long_about = None,
)]
pub(crate) struct Cli {
    /// Config file (defaults to ~/.sitebot/sitebot.toml).
    #[arg(long, global = true, env = "SITEBOT_CONFIG")]
    pub config: Option<PathBuf>,

    /// Log format: text (default) or json.
    #[arg(long, default_value = "text", global = true)]
    pub log_format: LogFormat,

    /// Verbosity level (-v, -vv).
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    pub verbose: u8,

    #[command(subcommand)]
    pub command: Command,
}

/// Log output format.
#[derive(Clone, Debug, clap::ValueEnum)]
pub(crate) enum LogFormat {
    Text,
    Json,
}

/// Top-level CLI subcommands.
#[derive(Subcommand)]
pub(crate) enum Command {
    /// Run the webhook server.
    Serve {
        /// Bind address (overrides [server] host).
        #[arg(long)]
        host: Option<String>,

        /// Bind port (overrides [server] port).
        #[arg(short, long)]
        port: Option<u16>,

        /// Do not register the webhook on startup.
        #[arg(long)]
        no_register: bool,
    },

    /// Receive updates by long polling instead of a webhook.
    Poll,

    /// Webhook registration with the Bot API.
    Webhook {
        #[command(subcommand)]
        action: WebhookAction,
    },

    /// Database maintenance.
    Db {
        #[command(subcommand)]
        action: DbAction,
    },

    /// Configuration management.
    Config {
        /// Config subcommand.
        #[command(subcommand)]
        action: ConfigAction,
    },

    /// Print how a message would be classified.
    Classify {
        /// Message text, as a user would send it.
        text: String,
    },
}

/// Webhook subcommands.
#[derive(Subcommand)]
pub(crate) enum WebhookAction {
    /// Register the webhook (URL from config unless given).
    Set {
        #[arg(long)]
        url: Option<String>,
    },
    /// Remove the registered webhook.
    Delete,
    /// Delete, then register again.
    Reset {
        #[arg(long)]
        url: Option<String>,
    },
}

/// Database subcommands.
#[derive(Subcommand)]
pub(crate) enum DbAction {
    /// Create the database and apply migrations.
    Init,
}

/// Config subcommands.
#[derive(Subcommand)]
pub(crate) enum ConfigAction {
    /// Initialize config file with defaults.
    Init,
    /// Show resolved configuration.
    Show,
}

// ---------------------------------------------------------------------------
// Tracing setup
// ---------------------------------------------------------------------------

/// Initialize tracing based on CLI flags.
pub(crate) fn init_tracing(cli: &Cli) {
    use tracing_subscriber::{EnvFilter, fmt};

    let filter = match cli.verbose {
        0 => "sitebot=info",
        1 => "sitebot=debug,tower_http=debug",
        _ => "sitebot=trace,tower_http=trace",
    };

    let env_filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(filter));

    match cli.log_format {
        LogFormat::Text => {
            fmt()
                .with_env_filter(env_filter)
                .with_target(false)
                .init();
        }
        LogFormat::Json => {
            fmt()
                .json()
                .with_env_filter(env_filter)
                .init();
        }
    }
}

// ---------------------------------------------------------------------------
// Command dispatch
// ---------------------------------------------------------------------------

/// Run the CLI command.
pub(crate) async fn run(cli: Cli) -> Result<()> {
    let config_path = cli.config;
    match cli.command {
        Command::Serve {
            host,
            port,
            no_register,
        } => {
            let config = resolve_config(config_path.as_ref())?;
            cmd_serve(config, host, port, no_register).await
        }
        Command::Poll => cmd_poll(resolve_config(config_path.as_ref())?).await,
        Command::Webhook { action } => {
            let config = resolve_config(config_path.as_ref())?;
            match action {
                WebhookAction::Set { url } => cmd_webhook_set(&config, url).await,
                WebhookAction::Delete => cmd_webhook_delete(&config).await,
                WebhookAction::Reset { url } => {
                    cmd_webhook_delete(&config).await?;
                    cmd_webhook_set(&config, url).await
                }
            }
        }
        Command::Db {
            action: DbAction::Init,
        } => cmd_db_init(&resolve_config(config_path.as_ref())?).await,
        Command::Config { action } => match action {
            ConfigAction::Init => cmd_config_init().await,
            ConfigAction::Show => cmd_config_show(config_path.as_ref()).await,
        },
        Command::Classify { text } => cmd_classify(&text),
    }
}

fn resolve_config(path: Option<&PathBuf>) -> Result<AppConfig> {
    let config = match path {
        Some(path) => load_config_from(path)?,
        None => load_config()?,
    };
    Ok(config)
}

fn telegram_client(config: &AppConfig) -> Result<TelegramClient> {
    Ok(TelegramClient::new(BotApiConfig::from_config(&config.telegram)?)?)
}

async fn build_dispatcher(config: &AppConfig, client: &TelegramClient) -> Result<Dispatcher> {
    let pipeline = Pipeline::from_config(config).await?;
    Ok(Dispatcher::new(Arc::new(pipeline), Arc::new(client.clone())))
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        warn!(error = %e, "failed to listen for ctrl-c");
        std::future::pending::<()>().await;
    }
    info!("shutdown requested");
}

// ---------------------------------------------------------------------------
// Command handlers
// ---------------------------------------------------------------------------

async fn cmd_serve(
    config: AppConfig,
    host: Option<String>,
    port: Option<u16>,
    no_register: bool,
) -> Result<()> {
    let client = telegram_client(&config)?;
    let dispatcher = build_dispatcher(&config, &client).await?;

    let host = host.unwrap_or_else(|| config.server.host.clone());
    let port = port.unwrap_or(config.server.port);
    let listener = TcpListener::bind((host.as_str(), port)).await?;

    let callback_url = if no_register {
        None
    } else {
        let url = config.telegram.webhook_callback_url();
        if url.is_none() {
            warn!("telegram.webhook_url not set, webhook not registered");
        }
        url
    };

    let app = router(dispatcher, &config.telegram.webhook_path);
    serve_with_webhook(&client, callback_url, listener, app, shutdown_signal()).await
}

/// Register the webhook (when a URL is given), serve until `shutdown`, then
/// remove the registration again.
async fn serve_with_webhook<F>(
    client: &TelegramClient,
    callback_url: Option<String>,
    listener: TcpListener,
    app: Router,
    shutdown: F,
) -> Result<()>
where
    F: Future<Output = ()> + Send + 'static,
{
    if let Some(url) = &callback_url {
        client.set_webhook(url).await?;
        info!(%url, "webhook registered");
    }

    let result = serve(listener, app, shutdown).await;

    if callback_url.is_some() {
        match client.delete_webhook().await {
            Ok(_) => info!("webhook removed"),
            Err(e) => warn!(error = %e, "failed to remove webhook"),
        }
    }

    Ok(result?)
}

async fn cmd_poll(config: AppConfig) -> Result<()> {
    let client = telegram_client(&config)?;
    let dispatcher = build_dispatcher(&config, &client).await?;
    let poller = Poller::new(client, dispatcher, config.telegram.poll_timeout_secs);
    poller.run(shutdown_signal()).await?;
    Ok(())
}

async fn cmd_webhook_set(config: &AppConfig, url: Option<String>) -> Result<()> {
    let url = url
        .or_else(|| config.telegram.webhook_callback_url())
        .ok_or_else(|| eyre!("no webhook URL: pass --url or set telegram.webhook_url"))?;

    let client = telegram_client(config)?;
    client.set_webhook(&url).await?;
    println!("Webhook set: {url}");
    Ok(())
}

async fn cmd_webhook_delete(config: &AppConfig) -> Result<()> {
    let client = telegram_client(config)?;
    client.delete_webhook().await?;
    println!("Webhook deleted");
    Ok(())
}

async fn cmd_db_init(config: &AppConfig) -> Result<()> {
    let path = config.database.resolved_path()?;
    let storage = Storage::open(&path).await?;
    println!(
        "Database ready at: {} (schema v{})",
        path.display(),
        storage.schema_version().await
    );
    Ok(())
}

async fn cmd_config_init() -> Result<()> {
    let path = init_config()?;
    println!("Config initialized at: {}", path.display());
    Ok(())
}

async fn cmd_config_show(path: Option<&PathBuf>) -> Result<()> {
    let config = resolve_config(path)?;
    let toml_str = toml::to_string_pretty(&config)?;
    println!("{toml_str}");
    Ok(())
}

fn cmd_classify(text: &str) -> Result<()> {
    let intent = sitebot_intent::classify(Some(text));
    println!("{}", serde_json::to_string_pretty(&intent)?);
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use wiremock::matchers::{body_partial_json, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn bot_client(server: &MockServer) -> TelegramClient {
        TelegramClient::new(BotApiConfig {
            token: "t".into(),
            api_base: server.uri(),
            parse_mode: "HTML".into(),
        })
        .unwrap()
    }

    async fn mount_webhook_calls(server: &MockServer, expected: u64) {
        Mock::given(method("POST"))
            .and(path("/bott/setWebhook"))
            .and(body_partial_json(json!({"url": "https://bot.example.com/webhook"})))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({"ok": true, "result": true})))
            .expect(expected)
            .mount(server)
            .await;
        Mock::given(method("POST"))
            .and(path("/bott/deleteWebhook"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({"ok": true, "result": true})))
            .expect(expected)
            .mount(server)
            .await;
    }

    #[tokio::test]
    async fn serve_registers_then_removes_webhook() {
        let server = MockServer::start().await;
        mount_webhook_calls(&server, 1).await;

        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        serve_with_webhook(
            &bot_client(&server),
            Some("https://bot.example.com/webhook".into()),
            listener,
            Router::new(),
            async {},
        )
        .await
        .unwrap();
    }

    #[tokio::test]
    async fn serve_without_url_leaves_webhook_alone() {
        let server = MockServer::start().await;
        mount_webhook_calls(&server, 0).await;

        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        serve_with_webhook(&bot_client(&server), None, listener, Router::new(), async {})
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn failed_registration_aborts_serve() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/bott/setWebhook"))
            .respond_with(ResponseTemplate::new(400).set_body_json(json!({
                "ok": false,
                "description": "Bad Request: bad webhook: HTTPS url must be provided for webhook"
            })))
            .mount(&server)
            .await;

        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let result = serve_with_webhook(
            &bot_client(&server),
            Some("http://insecure.example.com/webhook".into()),
            listener,
            Router::new(),
            async {},
        )
        .await;
        assert!(result.is_err());
    }

    #[test]
    fn parses_global_flags_after_subcommand() {
        let cli = Cli::try_parse_from(["sitebot", "poll", "-vv", "--log-format", "json"]).unwrap();
        assert_eq!(cli.verbose, 2);
        assert!(matches!(cli.log_format, LogFormat::Json));
        assert!(matches!(cli.command, Command::Poll));
    }

    #[test]
    fn parses_webhook_reset_with_url() {
        let cli = Cli::try_parse_from([
            "sitebot",
            "webhook",
            "reset",
            "--url",
            "https://bot.example.com/webhook",
        ])
        .unwrap();
        match cli.command {
            Command::Webhook {
                action: WebhookAction::Reset { url },
            } => assert_eq!(url.as_deref(), Some("https://bot.example.com/webhook")),
            _ => panic!("expected webhook reset"),
        }
    }

    #[test]
    fn missing_config_file_is_an_error() {
        let path = PathBuf::from("/nonexistent/sitebot.toml");
        assert!(resolve_config(Some(&path)).is_err());
    }
}
