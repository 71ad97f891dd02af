//! # Hybrid Queue CLI
//!
//! Command-line access to a hybrid queue:
//! - Creating the queue and its overflow container
//! - Sending single items or whole files of items
//! - Receiving messages as JSON, leases included
//! - Deleting a message from a previously printed lease
//! - Showing the resolved configuration
//!
//! Configuration is layered: `/etc/hybrid-queue/config`, then
//! `./config/hybrid-queue`, then the file named by `--config` or
//! `HQ_CONFIG_FILE`, then `HQ__`-prefixed environment variables
//! (`HQ__BACKEND__TYPE=azure`).

use chrono::Duration;
use clap::{Parser, Subcommand, ValueEnum};
use hybrid_queue_core::{
    AddOptions, Cancellation, CancellationSource, HybridMessage, HybridQueue, HybridQueueConfig,
    HybridQueueError, HybridQueueFactory, MessageLease, OverflowCleanup, OverflowId, QueuePayload,
    ValidationError,
};
use serde::Serialize;
use serde_json::Value;
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

#[cfg(test)]
#[path = "lib_tests.rs"]
mod tests;

/// Environment variable naming an explicit configuration file
pub const CONFIG_FILE_ENV: &str = "HQ_CONFIG_FILE";

/// Prefix of configuration environment variables
pub const ENV_PREFIX: &str = "HQ";

// ============================================================================
// CLI Structure
// ============================================================================

/// Hybrid queue CLI - size-unbounded messages over a size-limited queue
#[derive(Debug, Parser)]
#[command(name = "hybrid-queue")]
#[command(version = env!("CARGO_PKG_VERSION"))]
#[command(about = "Send and receive messages of any size through a hybrid queue")]
pub struct Cli {
    /// Configuration file path
    #[arg(short, long, env = CONFIG_FILE_ENV)]
    pub config: Option<PathBuf>,

    /// Logging level, used when RUST_LOG is not set
    #[arg(short, long, default_value = "warn")]
    pub log_level: String,

    /// Enable JSON logging
    #[arg(long)]
    pub json_logs: bool,

    /// Create the queue and container before running the command
    #[arg(long)]
    pub ensure_resources: bool,

    /// Subcommand to execute
    #[command(subcommand)]
    pub command: Commands,
}

/// Available CLI commands
#[derive(Debug, Subcommand)]
pub enum Commands {
    /// Create the overflow container and the queue if they are missing
    Setup,

    /// Send one item
    Send {
        /// Item to send; read from --file when omitted
        body: Option<String>,

        /// Read the item from a file
        #[arg(short, long, conflicts_with = "body")]
        file: Option<PathBuf>,

        /// How to interpret the item
        #[arg(long = "as", value_enum, default_value = "text")]
        payload: PayloadFormat,

        /// Store the item in the overflow container regardless of size
        #[arg(long)]
        force_overflow: bool,

        /// Seconds the message stays invisible after being sent
        #[arg(long)]
        delay: Option<u64>,

        /// Message lifetime in seconds
        #[arg(long)]
        ttl: Option<u64>,
    },

    /// Send every non-empty line of a file as one item
    SendBatch {
        /// File with one item per line
        file: PathBuf,

        /// How to interpret each line
        #[arg(long = "as", value_enum, default_value = "text")]
        payload: PayloadFormat,

        /// Items sent concurrently per group; the configured size when omitted
        #[arg(short, long)]
        batch_size: Option<usize>,

        /// Store every item in the overflow container regardless of size
        #[arg(long)]
        force_overflow: bool,
    },

    /// Receive messages and print them as JSON
    Receive {
        /// Maximum number of messages (1-32); the configured value when omitted
        #[arg(short, long)]
        max: Option<u32>,

        /// Seconds received messages stay invisible to other readers
        #[arg(long)]
        visibility_timeout: Option<u64>,

        /// How to interpret message contents
        #[arg(long = "as", value_enum, default_value = "text")]
        payload: PayloadFormat,

        /// Delete each message after printing it
        #[arg(long)]
        delete: bool,
    },

    /// Delete a message using the lease printed by `receive`
    Delete {
        message_id: String,

        pop_receipt: String,

        /// Overflow object to delete with the message
        #[arg(long)]
        overflow_id: Option<String>,
    },

    /// Show the resolved configuration
    Config {
        /// Output format for configuration
        #[arg(short, long, value_enum, default_value = "yaml")]
        format: ConfigFormat,
    },
}

/// How items are read from and written to the command line
#[derive(Clone, Copy, Debug, PartialEq, Eq, ValueEnum)]
pub enum PayloadFormat {
    /// Plain text
    Text,
    /// A JSON document
    Json,
}

/// Configuration format options
#[derive(Clone, Copy, Debug, PartialEq, Eq, ValueEnum)]
pub enum ConfigFormat {
    Yaml,
    Json,
}

// ============================================================================
// Error Types
// ============================================================================

/// CLI-specific errors
#[derive(Debug, thiserror::Error)]
pub enum CliError {
    #[error("Configuration error: {0}")]
    Configuration(#[from] ConfigError),

    #[error("Queue operation failed: {0}")]
    Queue(#[from] HybridQueueError),

    #[error("Invalid argument: {arg} - {message}")]
    InvalidArgument { arg: String, message: String },

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Output error: {0}")]
    Output(String),

    #[error("Logging setup failed: {message}")]
    Logging { message: String },
}

impl CliError {
    /// Process exit code for this error
    pub fn exit_code(&self) -> i32 {
        match self {
            Self::Configuration(_) => 1,
            Self::Queue(HybridQueueError::Cancelled) => 130,
            Self::Queue(e) if e.is_transient() => 3,
            Self::Queue(_) => 2,
            Self::InvalidArgument { .. } => 4,
            Self::Io(_) => 5,
            Self::Output(_) | Self::Logging { .. } => 6,
        }
    }

    fn invalid_argument(arg: &str, message: impl Into<String>) -> Self {
        Self::InvalidArgument {
            arg: arg.to_string(),
            message: message.into(),
        }
    }
}

/// Configuration-related errors
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Configuration file not found: {path}")]
    FileNotFound { path: PathBuf },

    #[error("Failed to load configuration: {0}")]
    Load(#[from] config::ConfigError),

    #[error("Invalid configuration: {0}")]
    Validation(#[source] HybridQueueError),
}

// ============================================================================
// Configuration Loading
// ============================================================================

/// Load and validate the layered configuration
///
/// Every layer is optional except an explicitly named file. Later layers
/// override earlier ones.
pub fn load_configuration(explicit: Option<&Path>) -> Result<HybridQueueConfig, ConfigError> {
    let mut builder = config::Config::builder()
        .add_source(config::File::with_name("/etc/hybrid-queue/config").required(false))
        .add_source(config::File::with_name("config/hybrid-queue").required(false));

    if let Some(path) = explicit {
        if !path.exists() {
            return Err(ConfigError::FileNotFound {
                path: path.to_path_buf(),
            });
        }
        info!(path = %path.display(), "Loading configuration from explicit path");
        builder = builder.add_source(config::File::from(path).required(true));
    }

    let config: HybridQueueConfig = builder
        .add_source(
            config::Environment::with_prefix(ENV_PREFIX)
                .separator("__")
                .try_parsing(true),
        )
        .build()?
        .try_deserialize()?;

    config.validate().map_err(ConfigError::Validation)?;
    debug!(queue = %config.queue_name, backend = config.backend.kind(), "Configuration loaded");
    Ok(config)
}

// ============================================================================
// Output
// ============================================================================

/// One received message as printed by `receive`
#[derive(Debug, Serialize)]
pub struct ReceivedOutput {
    #[serde(flatten)]
    pub lease: MessageLease,
    pub dequeue_count: u32,
    pub inserted_at: String,
    pub content: Value,
}

impl ReceivedOutput {
    fn from_message<T>(message: HybridMessage<T>, to_value: impl FnOnce(T) -> Value) -> Self {
        let dequeue_count = message.dequeue_count();
        let inserted_at = message.inserted_at().to_string();
        let (content, lease) = message.into_parts();
        Self {
            lease,
            dequeue_count,
            inserted_at,
            content: to_value(content),
        }
    }
}

/// Result of a send, as printed by `send`
#[derive(Debug, Serialize)]
pub struct SendOutput {
    pub queue: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub overflow_id: Option<String>,
}

fn print_json<T: Serialize>(value: &T) -> Result<(), CliError> {
    let text = serde_json::to_string_pretty(value).map_err(|e| CliError::Output(e.to_string()))?;
    println!("{}", text);
    Ok(())
}

fn render_config(config: &HybridQueueConfig, format: ConfigFormat) -> Result<String, CliError> {
    match format {
        ConfigFormat::Yaml => {
            serde_yaml::to_string(config).map_err(|e| CliError::Output(e.to_string()))
        }
        ConfigFormat::Json => {
            serde_json::to_string_pretty(config).map_err(|e| CliError::Output(e.to_string()))
        }
    }
}

// ============================================================================
// Main Entry Point
// ============================================================================

/// Parse arguments from the process and run the selected command
pub async fn run_cli() -> Result<(), CliError> {
    let cli = Cli::parse();
    initialize_logging(&cli)?;
    run(cli).await
}

/// Run an already parsed command line
pub async fn run(cli: Cli) -> Result<(), CliError> {
    let config = load_configuration(cli.config.as_deref())?;

    if let Commands::Config { format } = cli.command {
        println!("{}", render_config(&config, format)?);
        return Ok(());
    }

    let queue = HybridQueueFactory::build(&config)?;
    let source = CancellationSource::new();
    spawn_interrupt_handler(source.clone());
    let cancel = source.token();

    if cli.ensure_resources && !matches!(cli.command, Commands::Setup) {
        queue.setup(config.log_each_creation, &cancel).await?;
    }

    match cli.command {
        Commands::Setup => execute_setup_command(&queue, &config, &cancel).await,
        Commands::Send {
            body,
            file,
            payload,
            force_overflow,
            delay,
            ttl,
        } => {
            let item = read_item(body, file.as_deref())?;
            let mut options = AddOptions::new().with_force_overflow(force_overflow);
            if let Some(delay) = delay {
                options = options.with_initial_visibility_delay(seconds("delay", delay)?);
            }
            if let Some(ttl) = ttl {
                options = options.with_time_to_live(seconds("ttl", ttl)?);
            }
            execute_send_command(&queue, item, payload, &options, &cancel).await
        }
        Commands::SendBatch {
            file,
            payload,
            batch_size,
            force_overflow,
        } => {
            let options = AddOptions::new().with_force_overflow(force_overflow);
            let batch_size = batch_size.unwrap_or(config.batch_size);
            execute_send_batch_command(&queue, &file, payload, batch_size, &options, &cancel).await
        }
        Commands::Receive {
            max,
            visibility_timeout,
            payload,
            delete,
        } => {
            let visibility_timeout = match visibility_timeout {
                Some(secs) => Some(seconds("visibility-timeout", secs)?),
                None => config.visibility_timeout(),
            };
            let max = max.unwrap_or(config.max_messages);
            execute_receive_command(&queue, max, visibility_timeout, payload, delete, &cancel).await
        }
        Commands::Delete {
            message_id,
            pop_receipt,
            overflow_id,
        } => execute_delete_command(&queue, &message_id, &pop_receipt, overflow_id, &cancel).await,
        Commands::Config { .. } => Ok(()),
    }
}

/// Initialize logging based on CLI arguments
///
/// Logs go to stderr so that command output on stdout stays machine readable.
fn initialize_logging(cli: &Cli) -> Result<(), CliError> {
    let filter =
        EnvFilter::try_from_default_env().or_else(|_| EnvFilter::try_new(&cli.log_level));
    let filter = filter.map_err(|e| CliError::Logging {
        message: e.to_string(),
    })?;

    let json_layer = cli.json_logs.then(|| {
        tracing_subscriber::fmt::layer()
            .json()
            .with_writer(std::io::stderr)
    });
    let text_layer =
        (!cli.json_logs).then(|| tracing_subscriber::fmt::layer().with_writer(std::io::stderr));

    tracing_subscriber::registry()
        .with(filter)
        .with(json_layer)
        .with(text_layer)
        .try_init()
        .map_err(|e| CliError::Logging {
            message: e.to_string(),
        })
}

fn spawn_interrupt_handler(source: CancellationSource) {
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            warn!("Interrupt received, cancelling");
            source.cancel();
        }
    });
}

fn seconds(arg: &str, value: u64) -> Result<Duration, CliError> {
    i64::try_from(value)
        .ok()
        .and_then(Duration::try_seconds)
        .ok_or_else(|| CliError::invalid_argument(arg, "number of seconds is too large"))
}

fn read_item(body: Option<String>, file: Option<&Path>) -> Result<String, CliError> {
    match (body, file) {
        (Some(body), _) => Ok(body),
        (None, Some(path)) => Ok(std::fs::read_to_string(path)?),
        (None, None) => Err(CliError::invalid_argument(
            "body",
            "either a body or --file is required",
        )),
    }
}

fn parse_json(arg: &str, text: &str) -> Result<Value, CliError> {
    serde_json::from_str(text).map_err(|e| CliError::invalid_argument(arg, e.to_string()))
}

// ============================================================================
// Command Implementations
// ============================================================================

async fn execute_setup_command(
    queue: &HybridQueue,
    config: &HybridQueueConfig,
    cancel: &Cancellation,
) -> Result<(), CliError> {
    let report = queue.setup(config.log_each_creation, cancel).await?;
    print_json(&serde_json::json!({
        "queue": queue.queue_name().as_str(),
        "container": queue.container_name().as_str(),
        "queue_created": report.queue_created,
        "container_created": report.container_created,
    }))
}

async fn execute_send_command(
    queue: &HybridQueue,
    item: String,
    payload: PayloadFormat,
    options: &AddOptions,
    cancel: &Cancellation,
) -> Result<(), CliError> {
    let overflow_id = match payload {
        PayloadFormat::Text => queue.add(&item, options, cancel).await?,
        PayloadFormat::Json => {
            let value = parse_json("body", &item)?;
            queue.add(&value, options, cancel).await?
        }
    };

    info!(overflow_id = ?overflow_id, "Item sent");
    print_json(&SendOutput {
        queue: queue.queue_name().to_string(),
        overflow_id: overflow_id.map(|id| id.to_string()),
    })
}

async fn execute_send_batch_command(
    queue: &HybridQueue,
    file: &Path,
    payload: PayloadFormat,
    batch_size: usize,
    options: &AddOptions,
    cancel: &Cancellation,
) -> Result<(), CliError> {
    let contents = std::fs::read_to_string(file)?;
    let lines: Vec<&str> = contents.lines().filter(|l| !l.trim().is_empty()).collect();

    let report = match payload {
        PayloadFormat::Text => {
            let items: Vec<String> = lines.iter().map(|l| l.to_string()).collect();
            queue.add_many(&items, options, batch_size, cancel).await?
        }
        PayloadFormat::Json => {
            let items = lines
                .iter()
                .enumerate()
                .map(|(index, line)| parse_json(&format!("line {}", index + 1), line))
                .collect::<Result<Vec<_>, _>>()?;
            queue.add_many(&items, options, batch_size, cancel).await?
        }
    };

    print_json(&serde_json::json!({
        "queue": queue.queue_name().as_str(),
        "items": report.items(),
        "groups": report.group_sizes,
    }))
}

async fn execute_receive_command(
    queue: &HybridQueue,
    max: u32,
    visibility_timeout: Option<Duration>,
    payload: PayloadFormat,
    delete: bool,
    cancel: &Cancellation,
) -> Result<(), CliError> {
    let outputs = match payload {
        PayloadFormat::Text => {
            receive_as::<String>(queue, max, visibility_timeout, delete, cancel, Value::String)
                .await?
        }
        PayloadFormat::Json => {
            receive_as::<Value>(queue, max, visibility_timeout, delete, cancel, |v| v).await?
        }
    };
    print_json(&outputs)
}

async fn receive_as<T: QueuePayload>(
    queue: &HybridQueue,
    max: u32,
    visibility_timeout: Option<Duration>,
    delete: bool,
    cancel: &Cancellation,
    to_value: fn(T) -> Value,
) -> Result<Vec<ReceivedOutput>, CliError> {
    let messages = queue.receive::<T>(max, visibility_timeout, cancel).await?;
    debug!(count = messages.len(), "Received messages");

    let mut outputs = Vec::with_capacity(messages.len());
    for message in messages {
        if delete {
            report_cleanup(queue.delete(&message, cancel).await?);
        }
        outputs.push(ReceivedOutput::from_message(message, to_value));
    }
    Ok(outputs)
}

async fn execute_delete_command(
    queue: &HybridQueue,
    message_id: &str,
    pop_receipt: &str,
    overflow_id: Option<String>,
    cancel: &Cancellation,
) -> Result<(), CliError> {
    let lease = parse_lease(message_id, pop_receipt, overflow_id.as_deref())?;
    let cleanup = queue.delete_lease(&lease, cancel).await?;
    report_cleanup(cleanup.clone());

    print_json(&serde_json::json!({
        "message_id": lease.message_id.to_string(),
        "overflow_cleanup": cleanup_label(&cleanup),
    }))
}

fn parse_lease(
    message_id: &str,
    pop_receipt: &str,
    overflow_id: Option<&str>,
) -> Result<MessageLease, CliError> {
    let message_id = message_id
        .parse()
        .map_err(|e: ValidationError| {
            CliError::invalid_argument("message_id", e.to_string())
        })?;
    let pop_receipt = pop_receipt
        .parse()
        .map_err(|e: ValidationError| {
            CliError::invalid_argument("pop_receipt", e.to_string())
        })?;
    let overflow_id = overflow_id
        .map(|id| {
            OverflowId::parse(id)
                .ok_or_else(|| CliError::invalid_argument("overflow_id", "not a UUID"))
        })
        .transpose()?;

    Ok(MessageLease::new(message_id, pop_receipt, overflow_id))
}

fn cleanup_label(cleanup: &OverflowCleanup) -> &'static str {
    match cleanup {
        OverflowCleanup::NotApplicable => "not_applicable",
        OverflowCleanup::Deleted => "deleted",
        OverflowCleanup::Missing => "missing",
        OverflowCleanup::Failed { .. } => "failed",
    }
}

fn report_cleanup(cleanup: OverflowCleanup) {
    if !cleanup.is_clean() {
        warn!(cleanup = ?cleanup, "Overflow object was not cleaned up");
    }
}
