use clap::Parser;
use std::path::PathBuf;
use std::process;
use tracing::{error, info};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};
use vlanwarden::config::{
    Config, FileConfig, Verbosity, DEFAULT_DATABASE_FILE, DEFAULT_HOST, DEFAULT_PORT,
};

/// vlanwarden - MAC-auth RADIUS server with Telegram operator approval
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
#[command(name = "vlanwarden")]
struct Cli {
    /// Host to listen on
    #[arg(long, env = "VW_HOST")]
    host: Option<String>,

    /// Port to listen on
    #[arg(long, env = "VW_PORT")]
    port: Option<u16>,

    /// Shared secret for RADIUS packet authentication
    #[arg(long, env = "VW_RADIUS_SECRET")]
    radius_secret: Option<String>,

    /// Telegram bot token
    #[arg(long, env = "VW_TELEGRAM_TOKEN")]
    telegram_token: Option<String>,

    /// Telegram chat ids allowed to use the bot (repeatable or comma-separated)
    #[arg(long = "telegram-chat-ids", env = "VW_TELEGRAM_CHAT_IDS", value_delimiter = ',')]
    telegram_chat_ids: Vec<i64>,

    /// Path to the device registry file
    #[arg(long, env = "VW_DATABASE_FILE")]
    database_file: Option<PathBuf>,

    /// Increase verbosity (-v access logs, -vv debug)
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,

    /// Only log errors
    #[arg(short, long, env = "VW_QUIET", conflicts_with = "verbose")]
    quiet: bool,

    /// Optional YAML config file supplying defaults for the flags
    #[arg(short, long, env = "VW_CONFIG")]
    config: Option<PathBuf>,
}

impl Cli {
    /// Flags and environment win over the config file, which wins over
    /// the built-in defaults.
    fn into_config(self) -> Result<Config, vlanwarden::ConfigError> {
        let file = match &self.config {
            Some(path) => FileConfig::load(path)?,
            None => FileConfig::default(),
        };

        let quiet = self.quiet || file.quiet.unwrap_or(false);
        let verbose = if self.verbose > 0 {
            self.verbose
        } else {
            file.verbose.unwrap_or(0)
        };
        let chat_ids = if self.telegram_chat_ids.is_empty() {
            file.telegram_chat_ids.unwrap_or_default()
        } else {
            self.telegram_chat_ids
        };

        Ok(Config {
            host: self
                .host
                .or(file.host)
                .unwrap_or_else(|| DEFAULT_HOST.to_string()),
            port: self.port.or(file.port).unwrap_or(DEFAULT_PORT),
            radius_secret: self.radius_secret.or(file.radius_secret).unwrap_or_default(),
            telegram_token: self
                .telegram_token
                .or(file.telegram_token)
                .unwrap_or_default(),
            telegram_chat_ids: chat_ids,
            database_file: self
                .database_file
                .or(file.database_file)
                .unwrap_or_else(|| PathBuf::from(DEFAULT_DATABASE_FILE)),
            verbosity: Verbosity::from_flags(quiet, verbose),
        })
    }
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    let config = match cli.into_config() {
        Ok(config) => config,
        Err(e) => {
            eprintln!("configuration error: {e}");
            process::exit(1);
        }
    };

    tracing_subscriber::registry()
        .with(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new(config.verbosity.env_filter())),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    if let Err(e) = config.validate() {
        error!("invalid configuration: {e}");
        process::exit(1);
    }

    info!("vlanwarden v{}", env!("CARGO_PKG_VERSION"));
    info!(
        addr = %config.addr(),
        database = %config.database_file.display(),
        chats = config.telegram_chat_ids.len(),
        "starting"
    );

    if let Err(e) = vlanwarden::serve(config).await {
        error!("server error: {e}");
        process::exit(1);
    }
}
