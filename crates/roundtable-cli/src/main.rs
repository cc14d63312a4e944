use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::signal;
use tokio::sync::broadcast;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};
use tracing_subscriber::EnvFilter;

use roundtable_core::{
    EventBus, HttpBackend, Room, RoomEvent, TurnError, TurnOrchestrator, TurnReport,
};

mod config;

use config::RoundtableConfig;

#[derive(Parser)]
#[command(name = "roundtable")]
#[command(version)]
#[command(about = "Roundtable, a group chat with several AI agents")]
struct Cli {
    /// Path to config file
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// Enable debug logging
    #[arg(short, long, global = true)]
    debug: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Initialize config directory and default config
    Init,

    /// Show current configuration
    Config,

    /// List the agents in the configured room
    Agents,

    /// Send one message to the room and print the replies
    Ask {
        /// The message to send; use @name to address an agent
        message: String,
    },

    /// Interactive chat in the configured room
    Chat,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // Set up logging
    let filter = if cli.debug { "debug" } else { "info" };
    let env_filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(filter));
    tracing_subscriber::fmt()
        .with_env_filter(env_filter)
        .with_writer(std::io::stderr)
        .init();

    match cli.command {
        Commands::Init => cmd_init().await,
        Commands::Config => cmd_config(&cli.config).await,
        Commands::Agents => cmd_agents(&cli.config).await,
        Commands::Ask { message } => cmd_ask(&cli.config, &message).await,
        Commands::Chat => cmd_chat(&cli.config).await,
    }
}

async fn cmd_init() -> Result<()> {
    let config_dir = config::config_dir();
    tokio::fs::create_dir_all(&config_dir)
        .await
        .with_context(|| format!("Failed to create config dir: {}", config_dir.display()))?;

    let config_path = config_dir.join("config.toml");
    if config_path.exists() {
        warn!("Config already exists at {}", config_path.display());
    } else {
        let default_config = include_str!("../../../config/default.toml");
        tokio::fs::write(&config_path, default_config).await?;
        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            tokio::fs::set_permissions(&config_path, std::fs::Permissions::from_mode(0o600))
                .await?;
        }
        info!("Created default config at {}", config_path.display());
    }

    println!("Roundtable initialized at {}", config_dir.display());
    println!(
        "Edit {} to point at your backend and configure agents.",
        config_path.display()
    );
    Ok(())
}

async fn cmd_config(config_path: &Option<PathBuf>) -> Result<()> {
    let mut cfg = RoundtableConfig::load(config_path)?;
    if !cfg.backend.api_key.is_empty() {
        cfg.backend.api_key = "(set)".to_string();
    }
    println!("{}", toml::to_string_pretty(&cfg)?);
    Ok(())
}

async fn cmd_agents(config_path: &Option<PathBuf>) -> Result<()> {
    let cfg = RoundtableConfig::load(config_path)?;
    println!("Room: {} ({})", cfg.room.name, cfg.room.id);
    if cfg.room.agents.is_empty() {
        println!("  No agents configured.");
        return Ok(());
    }
    for agent in &cfg.room.agents {
        println!(
            "  @{:<16} trigger={:<9} personality={} length={}",
            agent.name, agent.trigger, agent.personality, agent.response_length
        );
    }
    Ok(())
}

/// Everything a session needs: the room, its orchestrator and who is typing
struct Session {
    room: Room,
    orchestrator: TurnOrchestrator,
    display_name: String,
}

impl Session {
    fn build(cfg: &RoundtableConfig, cancel: CancellationToken) -> Result<Self> {
        // The orchestrator enforces the per-call limit; the client only needs a backstop
        let timeout = match cfg.backend.timeout_secs {
            0 => Duration::from_secs(3600),
            secs => Duration::from_secs(secs + 5),
        };
        let backend = HttpBackend::new(&cfg.backend.base_url, &cfg.backend.api_key, timeout)
            .context("Failed to create backend client")?;
        info!("Using backend at {}", backend.endpoint());

        let room = Room::new(&cfg.room.id, &cfg.room.name, cfg.room.agents.clone())
            .context("Invalid agent roster")?;
        let orchestrator =
            TurnOrchestrator::new(Arc::new(backend), cfg.backend.orchestrator_config())
                .with_event_bus(EventBus::default())
                .with_cancellation(cancel);

        Ok(Self {
            room,
            orchestrator,
            display_name: cfg.user.display_name.clone(),
        })
    }

    async fn send(&self, text: &str) -> Result<TurnReport, TurnError> {
        self.orchestrator
            .send(&self.room, text, &self.display_name)
            .await
    }
}

/// Print transient progress while a turn runs
fn spawn_progress_printer(mut rx: broadcast::Receiver<RoomEvent>) -> tokio::task::JoinHandle<()> {
    tokio::spawn(async move {
        loop {
            match rx.recv().await {
                Ok(RoomEvent::AgentThinking { agent_name, .. }) => {
                    eprintln!("  {} is thinking...", agent_name);
                }
                Ok(RoomEvent::AgentFailed { notice, error, .. }) => {
                    eprintln!("  ! {}", notice);
                    debug!("Failure detail: {}", error);
                }
                Ok(event) => debug!("Event: {}", event.name()),
                Err(broadcast::error::RecvError::Lagged(n)) => {
                    warn!("Progress printer lagged by {} events", n);
                }
                Err(broadcast::error::RecvError::Closed) => break,
            }
        }
    })
}

fn print_report(report: &TurnReport) {
    if let Some(notice) = &report.notice {
        println!("{}", notice);
    }
    for reply in &report.replies {
        println!("\n{}: {}", reply.sender, reply.content);
    }
    if report.cancelled {
        println!("(turn cancelled)");
    }
}

async fn cmd_ask(config_path: &Option<PathBuf>, message: &str) -> Result<()> {
    let cfg = RoundtableConfig::load(config_path)?;
    let cancel = CancellationToken::new();
    let session = Session::build(&cfg, cancel.clone())?;
    let printer = spawn_progress_printer(session.orchestrator.events().subscribe());

    let report = tokio::select! {
        report = session.send(message) => report?,
        _ = signal::ctrl_c() => {
            info!("Received Ctrl+C, abandoning turn");
            cancel.cancel();
            printer.abort();
            return Ok(());
        }
    };

    print_report(&report);
    printer.abort();
    Ok(())
}

async fn cmd_chat(config_path: &Option<PathBuf>) -> Result<()> {
    let cfg = RoundtableConfig::load(config_path)?;
    let cancel = CancellationToken::new();
    let session = Session::build(&cfg, cancel.clone())?;
    let printer = spawn_progress_printer(session.orchestrator.events().subscribe());

    println!(
        "Joined '{}' as {}. Agents: {}",
        session.room.name(),
        session.display_name,
        cfg.room
            .agents
            .iter()
            .map(|a| format!("@{}", a.name))
            .collect::<Vec<_>>()
            .join(", ")
    );
    println!("Type a message, or /quit to leave.");

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    loop {
        let line = tokio::select! {
            line = lines.next_line() => line?,
            _ = signal::ctrl_c() => {
                info!("Received Ctrl+C, shutting down...");
                cancel.cancel();
                break;
            }
        };
        let Some(line) = line else { break };
        let text = line.trim();
        if text.is_empty() {
            continue;
        }
        if text == "/quit" || text == "/exit" {
            break;
        }

        let outcome = tokio::select! {
            outcome = session.send(text) => outcome,
            _ = signal::ctrl_c() => {
                info!("Received Ctrl+C, shutting down...");
                cancel.cancel();
                break;
            }
        };
        match outcome {
            Ok(report) => print_report(&report),
            Err(e) => eprintln!("  ! {}", e),
        }
    }

    printer.abort();
    println!("Left '{}' ({} messages).", session.room.name(), session.room.message_count().await);
    Ok(())
}
