//! MiniMQ command line client
//!
//! Publishes single messages or listens on topics, printing every delivery
//! as a JSON line on stdout.

use clap::{Parser, Subcommand};
use minimq::observability::init_default_logging;
use minimq::{ClientConfig, Consumer, MessageContext, Producer};
use serde_json::{json, Value};
use std::path::{Path, PathBuf};
use std::process;
use tracing::{error, info};

/// Client for the MiniMQ message broker
#[derive(Parser)]
#[command(name = "minimq")]
#[command(about = "Publish to and consume from a MiniMQ broker")]
#[command(version)]
struct Cli {
    /// Configuration file path
    #[arg(short, long, value_name = "FILE")]
    config: Option<PathBuf>,

    /// Broker host, or a URL such as tcp://broker:5677
    #[arg(long, global = true)]
    host: Option<String>,

    /// Broker port
    #[arg(long, global = true)]
    port: Option<u16>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Publish one JSON message
    Send {
        #[arg(short, long)]
        topic: String,
        /// Message body; must be valid JSON
        #[arg(short, long)]
        message: String,
    },
    /// Poll topics and print each delivered message until interrupted
    Listen {
        /// Topic to listen on; repeat for several topics
        #[arg(short, long = "topic", required = true)]
        topics: Vec<String>,
    },
    /// Validate the effective configuration
    Config {
        /// Print the effective configuration as TOML
        #[arg(long)]
        show: bool,
    },
}

const DEFAULT_CONFIG_PATHS: [&str; 2] = ["minimq.toml", "config/minimq.toml"];

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    init_default_logging();

    let config = match load_configuration(&cli) {
        Ok(config) => config,
        Err(e) => {
            error!("Failed to load configuration: {}", e);
            process::exit(1);
        }
    };

    let result = match cli.command {
        Commands::Send { topic, message } => send_message(&config, &topic, &message).await,
        Commands::Listen { topics } => listen(&config, topics).await,
        Commands::Config { show } => handle_config_command(&config, show),
    };

    if let Err(e) = result {
        error!("Command failed: {}", e);
        process::exit(1);
    }
}

/// File (explicit or default location), then environment, then flags
fn load_configuration(cli: &Cli) -> Result<ClientConfig, Box<dyn std::error::Error>> {
    let mut config = match &cli.config {
        Some(path) => {
            info!("Loading configuration from: {}", path.display());
            ClientConfig::load_from_file(path)?
        }
        None => match DEFAULT_CONFIG_PATHS.iter().map(Path::new).find(|p| p.exists()) {
            Some(path) => {
                info!("Loading configuration from: {}", path.display());
                ClientConfig::load_from_file(path)?
            }
            None => ClientConfig::default(),
        },
    };

    config.apply_env_overrides()?;
    if let Some(host) = &cli.host {
        config.broker.host = host.clone();
    }
    if let Some(port) = cli.port {
        config.broker.port = port;
    }

    config.validate()?;
    Ok(config)
}

async fn send_message(
    config: &ClientConfig,
    topic: &str,
    message: &str,
) -> Result<(), Box<dyn std::error::Error>> {
    let message: Value = serde_json::from_str(message)?;
    let producer = Producer::new(config)?;

    producer.send(topic, &message).await?;
    info!(topic = %topic, addr = %producer.address(), "Message sent");
    Ok(())
}

async fn listen(config: &ClientConfig, topics: Vec<String>) -> Result<(), Box<dyn std::error::Error>> {
    let mut consumer = Consumer::new(config)?;

    for topic in topics {
        consumer.register_fn(topic, |message: Value, ctx: MessageContext| async move {
            let line = json!({
                "topic": ctx.topic(),
                "message_id": ctx.message_id(),
                "message": message,
            });
            println!("{line}");
            Ok(())
        })?;
    }

    consumer.start(true).await;

    let metrics = serde_json::to_string(&consumer.metrics())?;
    info!(metrics = %metrics, "Listener statistics");
    Ok(())
}

fn handle_config_command(config: &ClientConfig, show: bool) -> Result<(), Box<dyn std::error::Error>> {
    if show {
        println!("{}", toml::to_string_pretty(config)?);
    }

    info!(addr = %config.broker.address()?, "Configuration is valid");
    Ok(())
}
