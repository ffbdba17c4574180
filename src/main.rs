//! FleetLink - Remote device management agent
//!
//! Connects to a FleetLink management server and executes the commands it
//! sends: app lifecycle, package installs, shell, volume, power.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use clap::{Parser, Subcommand};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use fleetlink::config::{self, Config, ConfigStore};
use fleetlink::device::{DeviceControl, DeviceInfo, HostDevice};
use fleetlink::handlers::{register_defaults, HandlerRegistry};
use fleetlink::network::{ConnectionManager, ConnectorOptions};
use fleetlink::protocol;
use fleetlink::session::{ProtocolSession, SessionExit};

/// FleetLink - remote device management agent
#[derive(Parser)]
#[command(name = "fleetlink")]
#[command(author = "FleetLink Contributors")]
#[command(version = "0.1.0")]
#[command(about = "Agent that connects a device to a FleetLink management server", long_about = None)]
struct Cli {
    /// Path to configuration file
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// Increase log verbosity (-v debug, -vv trace)
    #[arg(short, long, global = true, action = clap::ArgAction::Count)]
    verbose: u8,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run the agent
    Run {
        /// Server host to connect to (overrides the config file)
        #[arg(short, long)]
        server: Option<String>,

        /// Server port
        #[arg(short, long)]
        port: Option<u16>,
    },

    /// Show current configuration
    Config {
        /// Generate sample configuration
        #[arg(long)]
        generate: bool,

        /// Output path for generated config
        #[arg(short, long)]
        output: Option<PathBuf>,
    },

    /// Show system information
    Info,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    // Initialize logging; RUST_LOG wins over the verbosity flags
    let default_filter = match cli.verbose {
        0 => "info",
        1 => "debug",
        _ => "trace",
    };
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_filter));

    tracing_subscriber::registry()
        .with(fmt::layer())
        .with(filter)
        .init();

    let config_path = Config::resolve_path(cli.config.clone());

    match cli.command {
        Commands::Run { server, port } => {
            run_agent(&config_path, server, port).await?;
        }
        Commands::Config { generate, output } => {
            if generate {
                let sample = config::generate_sample_config();
                if let Some(path) = output {
                    std::fs::write(&path, &sample)?;
                    println!("Configuration written to: {}", path.display());
                } else {
                    println!("{}", sample);
                }
            } else {
                let config = Config::load_or_default(&config_path)?;
                println!("# {}", config_path.display());
                print!("{}", toml::to_string_pretty(&config)?);
            }
        }
        Commands::Info => {
            print_system_info();
        }
    }

    Ok(())
}

/// Run the agent until it is told to stop.
///
/// Each loop iteration is one session against the configured server. A
/// server-pushed reconfiguration ends the session with a restart request
/// and the next iteration picks up the new settings from disk.
async fn run_agent(
    config_path: &Path,
    mut server_override: Option<String>,
    mut port_override: Option<u16>,
) -> anyhow::Result<()> {
    loop {
        let mut config = Config::load_or_default(config_path)?;
        let serial = config.ensure_serial();
        config.save(config_path)?;

        // CLI overrides apply to the first session only; reconfiguration
        // through the server wins afterwards.
        if let Some(host) = server_override.take() {
            config.server.host = host;
        }
        if let Some(port) = port_override.take() {
            config.server.port = port;
        }

        let info = DeviceInfo::new(config.device.model.clone(), serial.clone());
        let device: Arc<dyn DeviceControl> = Arc::new(HostDevice::new(
            info,
            config.agent.apps_dir.clone(),
            config.agent.allow_power_commands,
        ));

        let store = ConfigStore::new(config.clone(), config_path.to_path_buf());
        let mut registry = HandlerRegistry::new();
        register_defaults(&mut registry, device.clone(), store);
        tracing::info!("Registered {} command handlers", registry.len());

        let options = ConnectorOptions::new(config.server.host.clone(), config.server.port);
        let mut manager = ConnectionManager::new(options);
        let events = manager.take_event_receiver().unwrap();

        let session = ProtocolSession::new(Arc::new(manager), events, registry, device);
        let handle = session.handle();

        tracing::info!(
            "Starting session against {}:{} as '{}' ({})",
            config.server.host,
            config.server.port,
            config.device.model,
            serial
        );

        println!("\n========================================");
        println!("  FleetLink Agent Running");
        println!("========================================");
        println!("  Device: {} ({})", config.device.model, serial);
        println!("  Server: {}:{}", config.server.host, config.server.port);
        println!("========================================");
        println!("\nPress Ctrl+C to stop.\n");

        let mut session_task = tokio::spawn(session.run());

        let exit = tokio::select! {
            result = &mut session_task => result?,
            _ = tokio::signal::ctrl_c() => {
                println!("\nShutting down...");
                handle.request_shutdown().await;
                session_task.await?
            }
        };

        match exit {
            SessionExit::Restart => {
                tracing::info!("Session restart requested, reloading configuration");
            }
            SessionExit::Shutdown => {
                tracing::info!("Agent stopped");
                return Ok(());
            }
        }
    }
}

/// Print system information
fn print_system_info() {
    let model = hostname::get()
        .map(|h| h.to_string_lossy().to_string())
        .unwrap_or_else(|_| "unknown".to_string());

    println!("FleetLink Agent Information");
    println!("===========================\n");

    println!("Device model: {}", model);
    println!("Config file: {}", Config::default_path().display());
    println!("App library: {}", HostDevice::default_apps_dir().display());

    println!("\nClient Version: {}", protocol::CLIENT_VERSION);
    println!("Default Port: {}", protocol::DEFAULT_PORT);
}
