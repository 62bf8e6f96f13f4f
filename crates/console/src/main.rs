//! PanelConsole
//!
//! Terminal client for the live consoles of panel-hosted game servers.

use std::io::IsTerminal;
use std::path::PathBuf;
use std::time::Duration;

use anyhow::Context;
use clap::{Parser, Subcommand};
use console::config::{default_config_path, Config};
use console::logging::{init_logging, LogOptions};
use console::render::LineRenderer;
use console::{ConsoleEvent, ConsoleManager, PanelClient, SendError};
use protocol::{format_uptime, format_usage, ServerAction, ServerId, ServerInfo};
use tokio::io::AsyncBufReadExt;
use tokio::sync::broadcast::error::RecvError;

/// Typing this line leaves the console.
const QUIT_COMMAND: &str = "/quit";

/// How long to wait for the console task to wind down on exit.
const SHUTDOWN_GRACE: Duration = Duration::from_secs(2);

/// PanelConsole - live game-server console client.
#[derive(Parser, Debug)]
#[command(name = "panel-console")]
#[command(version, about, long_about = None)]
pub struct Cli {
    /// Path to configuration file
    #[arg(short, long, global = true, value_name = "FILE")]
    pub config: Option<PathBuf>,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// Panel origin, e.g. https://panel.example.com (overrides config)
    #[arg(long, global = true, value_name = "URL")]
    pub panel_url: Option<String>,

    /// API token (overrides config)
    #[arg(long, global = true, value_name = "TOKEN")]
    pub token: Option<String>,

    /// Log to stderr instead of the log file
    #[arg(long, global = true)]
    pub log_stderr: bool,

    /// Subcommand to execute
    #[command(subcommand)]
    pub command: Commands,
}

/// Available commands.
#[derive(Subcommand, Debug, Clone)]
pub enum Commands {
    /// Attach to a server's live console
    Console {
        /// Server ID
        server_id: String,

        /// Disable coloured output
        #[arg(long)]
        no_color: bool,
    },

    /// Start a server
    Start {
        /// Server ID
        server_id: String,
    },

    /// Stop a server
    Stop {
        /// Server ID
        server_id: String,
    },

    /// Restart a server
    Restart {
        /// Server ID
        server_id: String,
    },

    /// Kill a server process
    Kill {
        /// Server ID
        server_id: String,
    },

    /// Show resource usage of a server
    Stats {
        /// Server ID
        server_id: String,

        /// Output in JSON format
        #[arg(long)]
        json: bool,
    },

    /// Show a server's details
    Info {
        /// Server ID
        server_id: String,

        /// Output in JSON format
        #[arg(long)]
        json: bool,
    },

    /// Inspect or create the configuration file
    #[command(subcommand)]
    Config(ConfigCommands),
}

/// Subcommands for configuration management.
#[derive(Subcommand, Debug, Clone)]
pub enum ConfigCommands {
    /// Print the effective configuration
    Show,

    /// Write a configuration file with default values
    Init {
        /// Overwrite an existing file
        #[arg(long, short)]
        force: bool,
    },

    /// Print the configuration file path
    Path,
}

impl Commands {
    fn action(&self) -> Option<(ServerAction, &str)> {
        match self {
            Commands::Start { server_id } => Some((ServerAction::Start, server_id.as_str())),
            Commands::Stop { server_id } => Some((ServerAction::Stop, server_id.as_str())),
            Commands::Restart { server_id } => Some((ServerAction::Restart, server_id.as_str())),
            Commands::Kill { server_id } => Some((ServerAction::Kill, server_id.as_str())),
            _ => None,
        }
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let config_path = cli.config.clone().unwrap_or_else(default_config_path);
    let mut config = Config::load(&config_path)?;
    config.apply_env_overrides();
    if let Some(url) = &cli.panel_url {
        config.panel.url = url.clone();
    }
    if let Some(token) = &cli.token {
        config.panel.token = Some(token.clone());
    }

    // Keep the guard alive so buffered log lines are flushed on exit.
    let _log_guard = init_logging(&LogOptions {
        level: config.logging.level.clone(),
        verbose: cli.verbose,
        directory: config.logging.directory.clone(),
        to_stderr: cli.log_stderr,
    })?;
    tracing::info!(config = %config_path.display(), "PanelConsole starting");

    if !matches!(cli.command, Commands::Config(_)) {
        config.validate()?;
    }

    match cli.command {
        Commands::Console {
            server_id,
            no_color,
        } => {
            let server_id = ServerId::new(server_id)?;
            run_console(&config, server_id, config.console.color && !no_color).await?;
        }
        Commands::Stats { server_id, json } => {
            let server_id = ServerId::new(server_id)?;
            let client = panel_client(&config)?;
            let stats = client
                .stats(&server_id)
                .await
                .with_context(|| format!("Failed to fetch stats for server {}", server_id))?;

            if json {
                println!("{}", serde_json::to_string_pretty(&stats)?);
            } else {
                // Limits come from the server record; defaults apply if it is unavailable.
                let info = match client.server(&server_id).await {
                    Ok(info) => info,
                    Err(e) => {
                        tracing::warn!(server = %server_id, error = %e, "Failed to fetch server limits");
                        ServerInfo::default()
                    }
                };
                println!("Server {}", server_id);
                println!("  CPU:     {:.1}%", stats.cpu);
                println!(
                    "  Memory:  {}",
                    format_usage(stats.memory_used, info.memory_limit())
                );
                println!(
                    "  Disk:    {}",
                    format_usage(stats.disk_used, info.disk_limit())
                );
                println!("  Uptime:  {}", format_uptime(stats.uptime));
                if let Some(status) = &stats.status {
                    println!("  Status:  {}", status);
                }
            }
        }
        Commands::Info { server_id, json } => {
            let server_id = ServerId::new(server_id)?;
            let info = panel_client(&config)?
                .server(&server_id)
                .await
                .with_context(|| format!("Failed to fetch server {}", server_id))?;

            if json {
                println!("{}", serde_json::to_string_pretty(&info)?);
            } else {
                println!("{} ({})", info.name, info.id);
                println!("  Game:    {}", info.game);
                println!("  Status:  {}", info.status);
                println!("  Port:    {}", info.port);
                println!("  Memory:  {} MB", info.memory);
                if let Some(disk) = info.disk {
                    println!("  Disk:    {} MB", disk);
                }
                if let Some(host) = &info.host {
                    println!("  Host:    {}", host);
                }
            }
        }
        ref cmd @ (Commands::Start { .. }
        | Commands::Stop { .. }
        | Commands::Restart { .. }
        | Commands::Kill { .. }) => {
            if let Some((action, server_id)) = cmd.action() {
                run_action(&config, action, server_id).await?;
            }
        }
        Commands::Config(ref cmd) => run_config_command(cmd, &config, &config_path)?,
    }

    Ok(())
}

async fn run_action(config: &Config, action: ServerAction, server_id: &str) -> anyhow::Result<()> {
    let server_id = ServerId::new(server_id)?;
    let client = panel_client(config)?;

    println!("Server {} is {}...", server_id, action.progress_label());
    let message = client
        .action(&server_id, action)
        .await
        .with_context(|| format!("Failed to {} server {}", action, server_id))?;
    if !message.is_empty() {
        println!("{}", message);
    }
    Ok(())
}

fn panel_client(config: &Config) -> anyhow::Result<PanelClient> {
    Ok(PanelClient::with_timeout(config.origin()?, config.request_timeout())?
        .with_token(config.panel.token.clone()))
}

fn run_config_command(
    cmd: &ConfigCommands,
    config: &Config,
    path: &std::path::Path,
) -> anyhow::Result<()> {
    match cmd {
        ConfigCommands::Show => {
            let mut shown = config.clone();
            if shown.panel.token.is_some() {
                shown.panel.token = Some("********".to_string());
            }
            print!("{}", shown.to_toml()?);
            if let Err(e) = config.validate() {
                eprintln!("Warning: {}", e);
            }
        }
        ConfigCommands::Init { force } => {
            if path.exists() && !force {
                anyhow::bail!(
                    "Config file already exists: {} (use --force to overwrite)",
                    path.display()
                );
            }
            Config::default().save(path)?;
            println!("Wrote {}", path.display());
        }
        ConfigCommands::Path => {
            println!("{}", path.display());
        }
    }
    Ok(())
}

/// Attaches to one console until `/quit`, end of input or Ctrl-C.
async fn run_console(config: &Config, server_id: ServerId, color: bool) -> anyhow::Result<()> {
    let origin = config.origin()?;
    let manager = ConsoleManager::new(config.websocket_config(), origin, config.session_options());
    let (console, mut events) = manager.open(server_id.clone())?;

    let renderer = LineRenderer::new(color && std::io::stdout().is_terminal());
    let mut input = tokio::io::BufReader::new(tokio::io::stdin()).lines();
    let ctrl_c = tokio::signal::ctrl_c();
    tokio::pin!(ctrl_c);

    eprintln!(
        "Console for server {} on {}. Type {} to leave.",
        server_id,
        manager.origin(),
        QUIT_COMMAND
    );

    loop {
        tokio::select! {
            event = events.recv() => match event {
                Ok(ConsoleEvent::Line(line)) => {
                    renderer.write_line(&mut std::io::stdout().lock(), &line)?;
                }
                Ok(ConsoleEvent::StateChanged(state)) => {
                    tracing::debug!(server_id = %server_id, state = %state, "Console state changed");
                }
                Ok(ConsoleEvent::Stopped) | Err(RecvError::Closed) => break,
                Err(RecvError::Lagged(skipped)) => {
                    eprintln!("({} lines skipped)", skipped);
                }
            },
            line = input.next_line() => match line.context("Failed to read stdin")? {
                Some(text) if text.trim() == QUIT_COMMAND => break,
                Some(text) => match console.send(text).await {
                    Ok(()) | Err(SendError::EmptyCommand) => {}
                    Err(SendError::NotConnected) => eprintln!("cannot send: not connected"),
                    Err(e) => eprintln!("cannot send: {}", e),
                },
                None => break,
            },
            _ = &mut ctrl_c => break,
        }
    }

    manager.close_all().await;

    // Print whatever the console produced before it stopped.
    let drain = async {
        loop {
            match events.recv().await {
                Ok(ConsoleEvent::Line(line)) => {
                    let _ = renderer.write_line(&mut std::io::stdout().lock(), &line);
                }
                Ok(ConsoleEvent::StateChanged(_)) | Err(RecvError::Lagged(_)) => {}
                Ok(ConsoleEvent::Stopped) | Err(RecvError::Closed) => break,
            }
        }
    };
    if tokio::time::timeout(SHUTDOWN_GRACE, drain).await.is_err() {
        tracing::warn!(server_id = %server_id, "Console did not stop in time");
    }

    Ok(())
}
