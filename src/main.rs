//! WolfElect - Leader Election over a Coordination Store
//!
//! Command line host for election candidates.

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use clap::{Parser, Subcommand};
use serde::Serialize;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use wolfelect::config::{LoggingConfig, WolfElectConfig};
use wolfelect::election::{Candidate, CandidateKey, ElectionOutcome, ElectionState, ElectionStateMachine};
use wolfelect::error::{Error, Result};
use wolfelect::store::{MemoryStore, SessionId};

/// WolfElect - Leader Election over a Coordination Store
#[derive(Parser)]
#[command(name = "wolfelect")]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Path to configuration file
    #[arg(short, long, default_value = "wolfelect.toml")]
    config: PathBuf,

    /// Log level (trace, debug, info, warn, error); overrides the config file
    #[arg(short, long)]
    log_level: Option<String>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Initialize a new configuration file
    Init {
        /// Output path for configuration file
        #[arg(short, long, default_value = "wolfelect.toml")]
        output: PathBuf,

        /// Node ID
        #[arg(long)]
        node_id: Option<String>,
    },

    /// Validate configuration file
    Validate,

    /// Show node information
    Info,

    /// Run a group of candidates against an in-process store
    Simulate {
        /// Number of candidates
        #[arg(short = 'n', long, default_value_t = 3)]
        candidates: usize,

        /// Expire the local candidate's session after the first election
        #[arg(long)]
        expire: bool,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // Logging settings come from the config file when it is readable
    let logging = WolfElectConfig::from_file(&cli.config)
        .map(|c| c.logging)
        .unwrap_or_default();
    let level = cli.log_level.clone().unwrap_or(logging.level.clone());
    init_logging(&level, &logging);

    match cli.command {
        Commands::Init { output, node_id } => run_init(output, node_id),
        Commands::Validate => run_validate(cli.config),
        Commands::Info => run_info(cli.config),
        Commands::Simulate { candidates, expire } => {
            run_simulate(&cli.config, candidates, expire).await
        }
    }
}

/// Initialize logging
fn init_logging(level: &str, logging: &LoggingConfig) {
    let env_filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| level.into());

    let registry = tracing_subscriber::registry().with(env_filter);
    if logging.format == "json" {
        registry.with(tracing_subscriber::fmt::layer().json()).init();
    } else {
        registry.with(tracing_subscriber::fmt::layer()).init();
    }
}

/// Generate a default configuration file
fn run_init(output: PathBuf, node_id: Option<String>) -> Result<()> {
    let id_line = match node_id {
        Some(id) => format!("id = \"{}\"", id),
        None => "# id = \"node-1\"  # random per process when unset".to_string(),
    };

    let config_content = format!(
        r#"# WolfElect Configuration
# Generated configuration file

[node]
{id_line}

[store]
endpoints = "localhost:2181,localhost:2182,localhost:2183"
session_timeout_ms = 10000

[election]
root = "/election"
prefix = "p_"

[logging]
level = "info"
format = "pretty"
"#
    );

    // Make sure what we write is loadable
    WolfElectConfig::from_str(&config_content)?;
    std::fs::write(&output, config_content)?;
    println!("✓ Configuration written to {}", output.display());
    Ok(())
}

/// Validate configuration file
fn run_validate(config_path: PathBuf) -> Result<()> {
    match WolfElectConfig::from_file(&config_path) {
        Ok(config) => {
            println!("✓ Configuration is valid");
            println!("  Endpoints: {}", config.endpoints().join(", "));
            println!("  Election Root: {}", config.election.root);
            Ok(())
        }
        Err(e) => {
            eprintln!("✗ Configuration error: {}", e);
            Err(e)
        }
    }
}

/// Show node information
fn run_info(config_path: PathBuf) -> Result<()> {
    let config = WolfElectConfig::from_file(&config_path)?;

    println!("WolfElect Node Information");
    println!("==========================");
    println!();
    println!("Node ID:          {}", config.node.id.as_deref().unwrap_or("(random per process)"));
    println!();
    println!("Store Configuration:");
    println!("  Endpoints:      {:?}", config.endpoints());
    println!("  Session:        {} ms", config.store.session_timeout_ms);
    println!();
    println!("Election Configuration:");
    println!("  Root:           {}", config.election.root);
    println!("  Prefix:         {}", config.election.prefix);

    Ok(())
}

/// One simulated candidate process
struct Member {
    identity: String,
    session: SessionId,
    machine: Arc<ElectionStateMachine>,
    handle: tokio::task::JoinHandle<Result<ElectionOutcome>>,
}

#[derive(Serialize)]
struct MemberStatus {
    identity: String,
    session: SessionId,
    key: Option<CandidateKey>,
    #[serde(flatten)]
    state: ElectionState,
}

/// How long a simulated election may take to settle
const SETTLE_TIMEOUT: Duration = Duration::from_secs(5);

async fn snapshot(members: &[Member]) -> Vec<MemberStatus> {
    let mut statuses = Vec::with_capacity(members.len());
    for member in members {
        statuses.push(MemberStatus {
            identity: member.identity.clone(),
            session: member.session,
            key: member.machine.candidate_key().await,
            state: member.machine.state().await,
        });
    }
    statuses
}

async fn print_snapshot(round: usize, members: &[Member]) -> Result<()> {
    let statuses = snapshot(members).await;
    let json = serde_json::to_string_pretty(&statuses)
        .map_err(|e| Error::Internal(format!("failed to encode status: {}", e)))?;
    println!("--- round {} ---\n{}", round, json);
    Ok(())
}

async fn wait_for_leader(members: &[Member]) -> Result<usize> {
    tokio::time::timeout(SETTLE_TIMEOUT, async {
        loop {
            for (i, member) in members.iter().enumerate() {
                if member.machine.is_leader().await {
                    return i;
                }
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
    })
    .await
    .map_err(|_| Error::Internal(format!("no leader elected within {:?}", SETTLE_TIMEOUT)))
}

/// Run a group of candidates against an in-process store
async fn run_simulate(config_path: &Path, candidates: usize, expire: bool) -> Result<()> {
    if candidates == 0 {
        return Err(Error::Config("at least one candidate is required".into()));
    }

    let config = if config_path.exists() {
        WolfElectConfig::from_file(config_path)?
    } else {
        tracing::info!("No configuration at {:?}, using defaults", config_path);
        WolfElectConfig::default()
    };
    let base_id = config.node_id();
    let store = MemoryStore::new();

    let mut members = Vec::with_capacity(candidates);
    for i in 0..candidates {
        let (client, events) = store.connect().await;
        let session = client.session_id();
        let identity = format!("{}-{}", base_id, i);

        let announce = identity.clone();
        let candidate = Candidate::with_identity(Arc::new(client), events, &config.election, identity.clone())
            .on_leader(move |key| tracing::info!("{} acquired leadership as {}", announce, key));
        let machine = candidate.state_machine();
        let handle = tokio::spawn(candidate.run());

        members.push(Member {
            identity,
            session,
            machine,
            handle,
        });
    }

    wait_for_leader(&members).await?;
    print_snapshot(0, &members).await?;

    if expire {
        let local = members.swap_remove(0);
        tracing::warn!("Expiring session {} of {}", local.session, local.identity);
        store.expire(local.session).await;

        let outcome = local
            .handle
            .await
            .map_err(|e| Error::Internal(format!("candidate task failed: {}", e)))??;
        tracing::error!("Session expired, exiting with status {}", outcome.exit_code());
        std::process::exit(outcome.exit_code());
    }

    // Retire leaders one at a time until one candidate is left
    for round in 1..candidates {
        let leader = wait_for_leader(&members).await?;
        let retired = &members[leader];
        tracing::info!("Retiring leader {} (session {})", retired.identity, retired.session);
        store.expire(retired.session).await;

        let mut state = retired.machine.subscribe();
        tokio::time::timeout(SETTLE_TIMEOUT, state.wait_for(|s| s.is_terminal()))
            .await
            .map_err(|_| Error::Internal(format!("{} did not observe expiry", retired.identity)))?
            .map_err(|_| Error::Internal("state channel closed".into()))?;

        let next = wait_for_leader(&members).await?;
        tracing::info!("Leadership passed to {}", members[next].identity);
        print_snapshot(round, &members).await?;
    }

    for member in members {
        member.handle.abort();
    }
    Ok(())
}
