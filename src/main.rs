//! NGSI LoRa Agent - Main Entry Point

use clap::{Parser, Subcommand};
use ngsi_lora_agent::agent::renewal::spawn_renewal_task;
use ngsi_lora_agent::agent::Agent;
use ngsi_lora_agent::api::ApiServer;
use ngsi_lora_agent::broker::{ContextBroker, HttpBrokerClient};
use ngsi_lora_agent::config::AgentConfig;
use ngsi_lora_agent::converter::GenericConverter;
use ngsi_lora_agent::notify::NotificationRouter;
use ngsi_lora_agent::observability::init_default_logging;
use ngsi_lora_agent::provider::{DeviceProvider, HttpDeviceProvider};
use ngsi_lora_agent::registry::{DeviceRegistry, InMemoryDeviceRegistry};
use ngsi_lora_agent::transport::{MqttLink, UplinkTransport};
use std::path::PathBuf;
use std::process;
use std::sync::Arc;
use std::time::Duration;
use tokio::signal;
use tracing::{error, info};

/// NGSI agent bridging LoRa devices to a FIWARE context broker
#[derive(Parser)]
#[command(name = "ngsi-lora-agent")]
#[command(about = "NGSI agent bridging LoRa devices to a FIWARE context broker")]
#[command(version)]
struct Cli {
    /// Configuration file path
    #[arg(short, long, value_name = "FILE")]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run the agent
    Run,
    /// Validate configuration
    Config {
        /// Show current configuration
        #[arg(long)]
        show: bool,
    },
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    init_default_logging();

    info!("Starting ngsi-lora-agent v{}", env!("CARGO_PKG_VERSION"));

    let config = match load_configuration(&cli.config) {
        Ok(config) => config,
        Err(e) => {
            error!("Failed to load configuration: {}", e);
            process::exit(1);
        }
    };

    let result = match cli.command {
        Commands::Run => run_agent(config).await,
        Commands::Config { show } => handle_config_command(config, show),
    };

    if let Err(e) = result {
        error!("Command failed: {}", e);
        process::exit(1);
    }

    info!("Application shutdown complete");
}

fn load_configuration(
    config_path: &Option<PathBuf>,
) -> Result<AgentConfig, Box<dyn std::error::Error>> {
    match config_path {
        Some(path) => {
            info!("Loading configuration from: {}", path.display());
            Ok(AgentConfig::load_from_file(path)?)
        }
        None => {
            // Try default locations
            let default_paths = vec!["agent.toml", "config/agent.toml"];

            for path_str in default_paths {
                let path = PathBuf::from(path_str);
                if path.exists() {
                    info!("Loading configuration from: {}", path.display());
                    return Ok(AgentConfig::load_from_file(&path)?);
                }
            }

            Err("No configuration file found. Provide one with -c/--config or create agent.toml"
                .into())
        }
    }
}

async fn run_agent(config: AgentConfig) -> Result<(), Box<dyn std::error::Error>> {
    info!("Application starting with agent ID: {}", config.agent.id);

    let registry: Arc<dyn DeviceRegistry> = Arc::new(InMemoryDeviceRegistry::new());
    let broker: Arc<dyn ContextBroker> = Arc::new(HttpBrokerClient::new(
        config.broker.clone(),
        &config.agent.local_url,
    )?);
    let provider: Arc<dyn DeviceProvider> = Arc::new(HttpDeviceProvider::new(&config.provider)?);

    let api_key = config.mqtt_api_key()?;
    let (link, events) = MqttLink::new(config.mqtt.clone(), api_key)?;
    let transport: Arc<dyn UplinkTransport> = Arc::new(link);

    let agent = Arc::new(Agent::new(
        registry.clone(),
        broker.clone(),
        provider,
        transport,
        Duration::from_secs(config.agent.reconnect_delay_secs),
    ));

    agent.start(Arc::new(GenericConverter::new())).await?;

    let event_loop = Arc::clone(&agent).run(events);
    let renewal = spawn_renewal_task(
        registry.clone(),
        broker.clone(),
        Duration::from_secs(config.agent.renewal_interval_secs),
    );

    let router = Arc::new(NotificationRouter::new(
        Arc::clone(&agent),
        registry,
        broker,
    ));
    let server = ApiServer::new(Arc::clone(&agent), router, config.agent.http_port);
    let http = tokio::spawn(server.run());

    info!("Agent is running and waiting for device messages on MQTT...");

    // Graceful shutdown on SIGINT or SIGTERM
    let mut sigint = signal::unix::signal(signal::unix::SignalKind::interrupt())?;
    let mut sigterm = signal::unix::signal(signal::unix::SignalKind::terminate())?;
    tokio::select! {
        _ = sigint.recv() => {
            info!("Received SIGINT, shutting down gracefully...");
        }
        _ = sigterm.recv() => {
            info!("Received SIGTERM, shutting down gracefully...");
        }
    }

    info!("Application shutdown initiated");
    http.abort();
    renewal.abort();
    if let Err(e) = agent.stop().await {
        error!("Error during shutdown: {}", e);
    }
    event_loop.abort();

    Ok(())
}

fn handle_config_command(
    config: AgentConfig,
    show: bool,
) -> Result<(), Box<dyn std::error::Error>> {
    config.validate()?;
    println!("Configuration is valid");
    if show {
        println!("{}", toml::to_string_pretty(&config)?);
    }
    Ok(())
}
