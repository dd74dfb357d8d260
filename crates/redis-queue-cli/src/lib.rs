//! # redis-queue CLI
//!
//! Command-line interface for the redis-queue message queue.
//!
//! This module provides CLI commands for:
//! - Producing messages (immediate, prioritized, delayed, batched)
//! - Consuming and acknowledging messages
//! - Inspecting and purging a queue
//! - Checking store connectivity
//! - Running the end-to-end producer/consumer walkthrough

use clap::{CommandFactory, Parser, Subcommand};
use redis_queue::{
    MessageId, PendingMessage, Priority, QueueClient, QueueClientFactory, QueueConfig, QueueError,
    ReceivedMessage, RedisConfig, Score, StoreConfig,
};
use serde::Serialize;
use std::path::{Path, PathBuf};
use tracing::{debug, info};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

/// Prefix for environment variable overrides, e.g. `REDIS_QUEUE__QUEUE_NAME`
pub const ENV_PREFIX: &str = "REDIS_QUEUE";

// ============================================================================
// CLI Structure
// ============================================================================

/// redis-queue CLI - Priority and delayed message queue over Redis
#[derive(Parser, Debug)]
#[command(name = "redis-queue")]
#[command(version = env!("CARGO_PKG_VERSION"))]
#[command(about = "Priority and delayed message queue over Redis")]
#[command(
    long_about = "redis-queue sends, receives and inspects messages in a Redis sorted-set queue with priorities and delayed delivery"
)]
pub struct Cli {
    /// Configuration file path (TOML, YAML or JSON)
    #[arg(short, long, env = "REDIS_QUEUE_CONFIG")]
    pub config: Option<PathBuf>,

    /// Logging level
    #[arg(short, long, default_value = "warn")]
    pub log_level: String,

    /// Enable JSON logging
    #[arg(long)]
    pub json_logs: bool,

    /// Queue name, overriding configuration
    #[arg(short, long, global = true)]
    pub queue: Option<String>,

    /// Backing store, overriding configuration
    #[arg(long, global = true)]
    pub store: Option<StoreKind>,

    /// Redis host, overriding configuration
    #[arg(long, global = true)]
    pub host: Option<String>,

    /// Redis port, overriding configuration
    #[arg(long, global = true)]
    pub port: Option<u16>,

    /// Output format
    #[arg(short, long, global = true, default_value = "text")]
    pub format: OutputFormat,

    /// Subcommand to execute
    #[command(subcommand)]
    pub command: Commands,
}

/// Available CLI commands
#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Send a message, eligible immediately
    Send {
        /// Message payload
        payload: String,

        /// Priority; higher is received first
        #[arg(short, long, default_value = "0")]
        priority: u32,
    },

    /// Send a message that becomes eligible after a delay
    SendDelayed {
        /// Message payload
        payload: String,

        /// Delay in seconds
        #[arg(short, long)]
        delay_secs: u64,
    },

    /// Send several messages in order
    SendBatch {
        /// Message payloads
        #[arg(required = true)]
        payloads: Vec<String>,

        /// Priority applied to every message in the batch
        #[arg(short, long, default_value = "0")]
        priority: u32,
    },

    /// Receive the next eligible message
    Receive {
        /// Seconds to wait for a message; defaults to the configured timeout
        #[arg(short, long)]
        timeout_secs: Option<u64>,

        /// Acknowledge the message once received
        #[arg(long)]
        ack: bool,
    },

    /// Record a message as completed
    Ack {
        /// Message id to acknowledge
        message_id: String,
    },

    /// Show the number of pending messages
    Length,

    /// Show eligible messages in the order they would be received
    Peek {
        /// Maximum number of messages to show
        #[arg(short = 'n', long, default_value = "10")]
        limit: usize,
    },

    /// Remove an eligible pending message by id
    Cancel {
        /// Message id to cancel
        message_id: String,
    },

    /// Remove every pending message
    Purge,

    /// Check store connectivity
    Health,

    /// Show the resolved configuration
    Config {
        /// Serialization format
        #[arg(long, default_value = "yaml")]
        as_format: ConfigFormat,
    },

    /// Run a producer/consumer walkthrough against the queue
    Demo {
        /// Delay for the delayed message, in seconds
        #[arg(short, long, default_value = "5")]
        delay_secs: u64,
    },

    /// Generate shell completions
    Completions {
        /// Shell to generate completions for
        #[arg(value_enum)]
        shell: clap_complete::Shell,
    },
}

/// Backing store choice on the command line
#[derive(Clone, Copy, Debug, PartialEq, Eq, clap::ValueEnum)]
pub enum StoreKind {
    /// Redis server
    Redis,
    /// Process-local store; contents vanish when the command exits
    Memory,
}

/// Output format options
#[derive(Clone, Copy, Debug, PartialEq, Eq, clap::ValueEnum)]
pub enum OutputFormat {
    /// Human-readable text
    Text,
    /// JSON output
    Json,
}

/// Configuration format options
#[derive(Clone, Copy, Debug, PartialEq, Eq, clap::ValueEnum)]
pub enum ConfigFormat {
    /// YAML format
    Yaml,
    /// JSON format
    Json,
    /// TOML format
    Toml,
}

// ============================================================================
// CLI Error Types
// ============================================================================

/// CLI-specific errors
#[derive(Debug, thiserror::Error)]
pub enum CliError {
    #[error("Configuration error: {0}")]
    Configuration(#[from] ConfigError),

    #[error("Queue error: {0}")]
    Queue(#[from] QueueError),

    #[error("Invalid argument: {arg} - {message}")]
    InvalidArgument { arg: String, message: String },

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl CliError {
    /// Process exit code for this error
    pub fn exit_code(&self) -> i32 {
        match self {
            Self::Configuration(_) => 1,
            Self::Queue(QueueError::ConfigurationError(_)) => 1,
            Self::Queue(QueueError::ValidationError(_)) => 3,
            Self::Queue(_) => 2,
            Self::InvalidArgument { .. } => 3,
            Self::Io(_) => 4,
        }
    }
}

/// Configuration-related errors
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Configuration file not found: {path}")]
    FileNotFound { path: PathBuf },

    #[error("Invalid configuration: {0}")]
    Load(#[from] config::ConfigError),

    #[error("Validation error: {0}")]
    Validation(#[from] QueueError),

    #[error("Cannot render configuration: {message}")]
    Render { message: String },

    #[error("Cannot initialize logging: {message}")]
    Logging { message: String },
}

// ============================================================================
// Output Types
// ============================================================================

/// A message as printed by the CLI
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct MessageView {
    pub id: String,
    pub payload: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub priority: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub eligible_at: Option<String>,
}

impl MessageView {
    fn new(message_id: &MessageId, payload: &str, score: Score) -> Self {
        let (priority, eligible_at) = match score {
            Score::Priority(priority) => (Some(priority.value()), None),
            Score::EligibleAt(at) => (None, Some(at.to_string())),
        };

        Self {
            id: message_id.as_str().to_string(),
            payload: payload.to_string(),
            priority,
            eligible_at,
        }
    }

    fn text(&self) -> String {
        match (&self.priority, &self.eligible_at) {
            (Some(priority), _) => format!("{}  {}  (priority {})", self.id, self.payload, priority),
            (None, Some(at)) => format!("{}  {}  (delayed until {})", self.id, self.payload, at),
            (None, None) => format!("{}  {}", self.id, self.payload),
        }
    }
}

impl From<&ReceivedMessage> for MessageView {
    fn from(message: &ReceivedMessage) -> Self {
        Self::new(&message.message_id, &message.payload, message.score)
    }
}

impl From<&PendingMessage> for MessageView {
    fn from(message: &PendingMessage) -> Self {
        Self::new(&message.message_id, &message.payload, message.score)
    }
}

/// Writes command results to stdout in the selected format
pub struct Output {
    format: OutputFormat,
}

impl Output {
    pub fn new(format: OutputFormat) -> Self {
        Self { format }
    }

    fn emit<T: Serialize>(&self, value: &T, text: impl FnOnce() -> String) -> Result<(), CliError> {
        match self.format {
            OutputFormat::Text => println!("{}", text()),
            OutputFormat::Json => {
                let json = serde_json::to_string(value).map_err(std::io::Error::from)?;
                println!("{}", json);
            }
        }
        Ok(())
    }
}

// ============================================================================
// Main Entry Point
// ============================================================================

/// Main CLI entry point
pub async fn run_cli() -> Result<(), CliError> {
    let cli = Cli::parse();

    initialize_logging(&cli)?;

    if let Commands::Completions { shell } = cli.command {
        return execute_completions_command(shell);
    }

    let config = load_configuration(&cli)?;
    let output = Output::new(cli.format);

    if let Commands::Config { as_format } = cli.command {
        return execute_config_command(&config, as_format);
    }

    let client = QueueClientFactory::create_client(config.clone()).await?;
    execute_queue_command(cli.command, client.as_ref(), &config, &output).await
}

/// Initialize logging based on CLI arguments; `RUST_LOG` wins over `--log-level`
pub fn initialize_logging(cli: &Cli) -> Result<(), CliError> {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .or_else(|_| tracing_subscriber::EnvFilter::try_new(&cli.log_level))
        .map_err(|e| CliError::InvalidArgument {
            arg: "log-level".to_string(),
            message: e.to_string(),
        })?;

    let registry = tracing_subscriber::registry().with(filter);
    let result = if cli.json_logs {
        registry
            .with(tracing_subscriber::fmt::layer().json().with_writer(std::io::stderr))
            .try_init()
    } else {
        registry
            .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
            .try_init()
    };

    result.map_err(|e| {
        ConfigError::Logging {
            message: e.to_string(),
        }
        .into()
    })
}

/// Resolve queue configuration.
///
/// Sources, later ones overriding earlier ones:
///  1. Built-in defaults
///  2. The file given by `--config` / `REDIS_QUEUE_CONFIG`, format by extension
///  3. Environment variables prefixed `REDIS_QUEUE__` (double-underscore separator),
///     e.g. `REDIS_QUEUE__STORE__TYPE=redis REDIS_QUEUE__STORE__PORT=6380`
///  4. Command-line flags
pub fn load_configuration(cli: &Cli) -> Result<QueueConfig, ConfigError> {
    let mut config = load_layered_config(cli.config.as_deref())?;
    apply_overrides(&mut config, cli);
    config.validate()?;

    debug!(
        queue = %config.queue_name,
        store = %config.store.store_type(),
        "Resolved configuration"
    );
    Ok(config)
}

fn load_layered_config(path: Option<&Path>) -> Result<QueueConfig, ConfigError> {
    let mut builder = config::Config::builder();

    if let Some(path) = path {
        if !path.exists() {
            return Err(ConfigError::FileNotFound {
                path: path.to_path_buf(),
            });
        }
        builder = builder.add_source(config::File::from(path).required(true));
        info!(path = %path.display(), "Loading configuration from file");
    }

    let config = builder
        .add_source(
            config::Environment::with_prefix(ENV_PREFIX)
                .separator("__")
                .try_parsing(true),
        )
        .build()?;

    Ok(config.try_deserialize()?)
}

/// Apply command-line flags on top of file and environment configuration
pub fn apply_overrides(config: &mut QueueConfig, cli: &Cli) {
    if let Some(queue) = &cli.queue {
        config.queue_name = queue.clone();
    }

    match cli.store {
        Some(StoreKind::Memory) => {
            config.store = StoreConfig::InMemory(Default::default());
        }
        Some(StoreKind::Redis) if !matches!(config.store, StoreConfig::Redis(_)) => {
            config.store = StoreConfig::Redis(RedisConfig::default());
        }
        _ => {}
    }

    if let StoreConfig::Redis(redis) = &mut config.store {
        if let Some(host) = &cli.host {
            redis.host = host.clone();
        }
        if let Some(port) = cli.port {
            redis.port = port;
        }
    }
}

// ============================================================================
// Command Implementations
// ============================================================================

/// Execute a command that talks to the queue
pub async fn execute_queue_command(
    command: Commands,
    client: &dyn QueueClient,
    config: &QueueConfig,
    output: &Output,
) -> Result<(), CliError> {
    match command {
        Commands::Send { payload, priority } => {
            let priority = parse_priority(priority)?;
            let id = client.enqueue_with_priority(&payload, priority).await?;
            info!(queue = %client.queue_name(), message_id = %id, priority = %priority, "Sent message");
            output.emit(&id, || id.to_string())
        }
        Commands::SendDelayed {
            payload,
            delay_secs,
        } => {
            let delay = seconds("delay-secs", delay_secs)?;
            let id = client.enqueue_delayed(&payload, delay).await?;
            info!(queue = %client.queue_name(), message_id = %id, delay_secs, "Sent delayed message");
            output.emit(&id, || id.to_string())
        }
        Commands::SendBatch { payloads, priority } => {
            let priority = parse_priority(priority)?;
            let items: Vec<(String, Priority)> =
                payloads.into_iter().map(|p| (p, priority)).collect();
            let ids = client.enqueue_batch_prioritized(&items).await?;
            info!(queue = %client.queue_name(), count = ids.len(), "Sent batch");
            output.emit(&ids, || {
                ids.iter()
                    .map(|id| id.to_string())
                    .collect::<Vec<_>>()
                    .join("\n")
            })
        }
        Commands::Receive { timeout_secs, ack } => {
            let timeout = match timeout_secs {
                Some(secs) => seconds("timeout-secs", secs)?,
                None => config.default_receive_timeout().map_err(QueueError::from)?,
            };

            match client.receive(timeout).await? {
                Some(message) => {
                    if ack {
                        client.acknowledge(&message.message_id).await?;
                    }
                    let view = MessageView::from(&message);
                    output.emit(&view, || view.text())
                }
                None => output.emit(&Option::<MessageView>::None, || {
                    "No message received within timeout.".to_string()
                }),
            }
        }
        Commands::Ack { message_id } => {
            let id = parse_message_id(&message_id)?;
            client.acknowledge(&id).await?;
            output.emit(&id, || format!("Acknowledged {}", id))
        }
        Commands::Length => {
            let length = client.queue_length().await?;
            output.emit(&length, || format!("Queue length: {}", length))
        }
        Commands::Peek { limit } => {
            let views: Vec<MessageView> = client
                .peek(limit)
                .await?
                .iter()
                .map(MessageView::from)
                .collect();
            output.emit(&views, || {
                if views.is_empty() {
                    "No eligible messages.".to_string()
                } else {
                    views
                        .iter()
                        .map(MessageView::text)
                        .collect::<Vec<_>>()
                        .join("\n")
                }
            })
        }
        Commands::Cancel { message_id } => {
            let id = parse_message_id(&message_id)?;
            // Only eligible entries are visible to peek, so only they can be found by id
            let length = usize::try_from(client.queue_length().await?).unwrap_or(usize::MAX);
            let pending = client.peek(length).await?;
            let cancelled = match pending.iter().find(|m| m.message_id == id) {
                Some(message) => client.cancel(message).await?,
                None => false,
            };
            output.emit(&cancelled, || {
                if cancelled {
                    format!("Cancelled {}", id)
                } else {
                    format!("No eligible message {}", id)
                }
            })
        }
        Commands::Purge => {
            let removed = client.purge().await?;
            info!(queue = %client.queue_name(), removed, "Purged queue");
            output.emit(&removed, || format!("Removed {} message(s)", removed))
        }
        Commands::Health => {
            client.health_check().await?;
            output.emit(&"ok", || {
                format!("{} store is reachable", client.store_type())
            })
        }
        Commands::Demo { delay_secs } => execute_demo_command(client, delay_secs, output).await,
        Commands::Config { .. } | Commands::Completions { .. } => Err(CliError::InvalidArgument {
            arg: "command".to_string(),
            message: "does not use a queue client".to_string(),
        }),
    }
}

/// Producer/consumer walkthrough: two prioritized messages, one delayed
pub async fn execute_demo_command(
    client: &dyn QueueClient,
    delay_secs: u64,
    output: &Output,
) -> Result<(), CliError> {
    let delay = seconds("delay-secs", delay_secs)?;
    let receive_timeout = chrono::Duration::seconds(5);
    let delayed_timeout = delay
        .checked_add(&receive_timeout)
        .ok_or_else(|| CliError::InvalidArgument {
            arg: "delay-secs".to_string(),
            message: format!("{} seconds is out of range", delay_secs),
        })?;

    client
        .enqueue_with_priority("High priority message", parse_priority(1)?)
        .await?;
    client.enqueue("Normal message").await?;
    client.enqueue_delayed("Delayed message", delay).await?;
    info!(queue = %client.queue_name(), delay_secs, "Demo messages sent");

    let mut received = Vec::new();
    for timeout in [receive_timeout, receive_timeout, delayed_timeout] {
        if let Some(message) = client.receive(timeout).await? {
            client.acknowledge(&message.message_id).await?;
            received.push(MessageView::from(&message));
        }
    }

    let length = client.queue_length().await?;

    #[derive(Serialize)]
    struct DemoReport<'a> {
        received: &'a [MessageView],
        queue_length: u64,
    }

    let report = DemoReport {
        received: &received,
        queue_length: length,
    };
    output.emit(&report, || {
        let mut lines: Vec<String> = received
            .iter()
            .map(|view| format!("Received message: {}, ID: {}", view.payload, view.id))
            .collect();
        lines.push(format!("Queue length: {}", length));
        lines.join("\n")
    })
}

/// Print the resolved configuration
fn execute_config_command(config: &QueueConfig, format: ConfigFormat) -> Result<(), CliError> {
    println!("{}", render_config(config, format)?);
    Ok(())
}

/// Serialize configuration in the requested format
pub fn render_config(config: &QueueConfig, format: ConfigFormat) -> Result<String, ConfigError> {
    let render_error = |message: String| ConfigError::Render { message };

    match format {
        ConfigFormat::Yaml => serde_yaml::to_string(config).map_err(|e| render_error(e.to_string())),
        ConfigFormat::Json => {
            serde_json::to_string_pretty(config).map_err(|e| render_error(e.to_string()))
        }
        ConfigFormat::Toml => toml::to_string_pretty(config).map_err(|e| render_error(e.to_string())),
    }
}

/// Execute completions command
fn execute_completions_command(shell: clap_complete::Shell) -> Result<(), CliError> {
    let mut command = Cli::command();
    let name = command.get_name().to_string();
    clap_complete::generate(shell, &mut command, name, &mut std::io::stdout());
    Ok(())
}

fn parse_priority(value: u32) -> Result<Priority, CliError> {
    Priority::new(value).map_err(|e| CliError::InvalidArgument {
        arg: "priority".to_string(),
        message: e.to_string(),
    })
}

fn parse_message_id(value: &str) -> Result<MessageId, CliError> {
    value.parse().map_err(|e: redis_queue::ValidationError| CliError::InvalidArgument {
        arg: "message-id".to_string(),
        message: e.to_string(),
    })
}

fn seconds(arg: &str, secs: u64) -> Result<chrono::Duration, CliError> {
    i64::try_from(secs)
        .ok()
        .and_then(chrono::Duration::try_seconds)
        .ok_or_else(|| CliError::InvalidArgument {
            arg: arg.to_string(),
            message: format!("{} seconds is out of range", secs),
        })
}

#[cfg(test)]
#[path = "lib_tests.rs"]
mod tests;
