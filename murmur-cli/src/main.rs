use anyhow::{Context, Result};
use chrono::Utc;
use clap::{Parser, Subcommand};
use murmur_core::prelude::*;
use std::path::PathBuf;
use std::sync::Arc;
use tokio::io::{AsyncBufReadExt, BufReader};
use tracing_subscriber::EnvFilter;

mod console;

use console::{EchoAgent, parse_line};

#[derive(Parser)]
#[command(name = "murmur")]
#[command(about = "Murmur engagement and memory core CLI", long_about = None)]
struct Cli {
    /// Configuration file (defaults to murmur.toml, MURMUR_CONFIG_PATH and MURMUR_* overrides)
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Chat with an echo agent over stdin; prefix a line with @ to address it
    Chat {
        /// Source platform recorded on every message
        #[arg(long, default_value = "console")]
        source: String,

        /// Scope id within the source
        #[arg(long)]
        scope: Option<String>,

        /// Sender name for stdin lines
        #[arg(long, default_value = "you")]
        sender: String,

        /// Also answer spontaneous turns
        #[arg(long)]
        chatty: bool,
    },

    /// Inspect the long-term memory log
    Memory {
        #[command(subcommand)]
        action: MemoryAction,
    },

    /// Inspect persisted engagement state
    Engagement {
        #[command(subcommand)]
        action: EngagementAction,
    },

    /// Show version information
    Version,
}

#[derive(Subcommand)]
enum MemoryAction {
    /// Print the most recent records of a scope
    Tail {
        /// Scope key, e.g. qq_group:42
        #[arg(short, long)]
        scope: String,

        /// Number of records
        #[arg(short, default_value_t = 20)]
        n: usize,

        /// Print raw JSON lines
        #[arg(long)]
        json: bool,
    },

    /// List every scope present in the log
    Scopes,
}

#[derive(Subcommand)]
enum EngagementAction {
    /// Show the current state of a scope
    Show {
        /// Scope key, e.g. qq_group:42
        #[arg(short, long)]
        scope: String,
    },

    /// List scopes with persisted state
    List,

    /// Return a scope to idle
    Reset {
        #[arg(short, long)]
        scope: String,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let cli = Cli::parse();

    match cli.command {
        Commands::Version => {
            println!("murmur v{}", murmur_core::VERSION);
            Ok(())
        }
        command => {
            let config = load_config(cli.config.as_deref())?;
            run(command, config).await
        }
    }
}

fn load_config(path: Option<&std::path::Path>) -> Result<MurmurConfig> {
    match path {
        Some(path) => MurmurConfig::from_file(path)
            .with_context(|| format!("loading config from {}", path.display())),
        None => MurmurConfig::load().context("loading config"),
    }
}

async fn run(command: Commands, config: MurmurConfig) -> Result<()> {
    match command {
        Commands::Chat {
            source,
            scope,
            sender,
            chatty,
        } => chat(&config, &source, scope.as_deref(), &sender, chatty).await,
        Commands::Memory { action } => memory(&config, action).await,
        Commands::Engagement { action } => engagement(&config, action).await,
        Commands::Version => Ok(()),
    }
}

async fn chat(
    config: &MurmurConfig,
    source: &str,
    scope: Option<&str>,
    sender: &str,
    chatty: bool,
) -> Result<()> {
    let orchestrator = Orchestrator::from_config(config, Arc::new(EchoAgent::new(chatty))).await?;
    let agent_name = &config.workflow.agent_name;

    eprintln!(
        "chatting in {} (prefix a line with @ to address {}, ctrl-d to quit)",
        scope_key(source, scope),
        agent_name
    );

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    while let Some(line) = lines.next_line().await? {
        let event = parse_line(&line, source, scope, sender);
        if let Some(reply) = orchestrator.process_event(event).await {
            println!("{}> {}", agent_name, reply);
        }
    }

    Ok(())
}

async fn memory(config: &MurmurConfig, action: MemoryAction) -> Result<()> {
    let log = JsonlMemoryLog::open(&config.memory.log_path).await?;

    match action {
        MemoryAction::Tail { scope, n, json } => {
            for record in log.read_tail(&scope, n).await? {
                if json {
                    println!("{}", serde_json::to_string(&record)?);
                } else {
                    let marker = if record.directed_at_agent { "@" } else { " " };
                    println!(
                        "{} {}{}: {}",
                        record.timestamp.format("%Y-%m-%d %H:%M:%S"),
                        marker,
                        record.sender,
                        record.content
                    );
                }
            }
        }
        MemoryAction::Scopes => {
            for scope in log.scopes().await? {
                println!("{}", scope);
            }
        }
    }

    Ok(())
}

async fn engagement(config: &MurmurConfig, action: EngagementAction) -> Result<()> {
    let store: Arc<dyn EngagementStore> = match &config.store {
        StoreConfig::Sqlite { path } => Arc::new(SqliteEngagementStore::open(path)?),
        StoreConfig::Memory => {
            anyhow::bail!("engagement store is process-local; nothing is persisted to inspect")
        }
    };

    match action {
        EngagementAction::Show { scope } => {
            let state = EngagementState::new(config.engagement.clone(), store);
            let record = state.snapshot(&scope, Utc::now()).await;
            print_record(&scope, &record, config.engagement.max_heartbeat);
        }
        EngagementAction::List => {
            for scope in store.scopes().await? {
                println!("{}", scope);
            }
        }
        EngagementAction::Reset { scope } => {
            let state = EngagementState::new(config.engagement.clone(), store);
            state.reset(&scope, Utc::now()).await;
            println!("{} reset to idle", scope);
        }
    }

    Ok(())
}

fn print_record(scope: &str, record: &EngagementRecord, max_heartbeat: f64) {
    println!("Scope:      {}", scope);
    println!("Phase:      {}", record.phase());
    println!("Heartbeat:  {:.1} / {:.1}", record.heartbeat, max_heartbeat);
    if record.is_tense {
        if let Some(origin) = record.origin {
            println!("Origin:     {}", origin.as_str());
        }
        if let Some(expiry) = record.tense_expiry {
            println!("Expires:    {}", expiry.to_rfc3339());
        }
        if !record.focus.is_empty() {
            println!("Focus:      {}", record.focus);
        }
    }
    println!("Updated:    {}", record.updated_at.to_rfc3339());
}
