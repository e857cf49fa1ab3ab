//! Noesis CLI entry point.

use std::process::ExitCode;
use std::sync::Arc;

use clap::{Parser, Subcommand};
use tracing::{error, info};

use noesis::application::interrupts::InterruptChannel;
use noesis::application::lifecycle::LifecycleController;
use noesis::domain::models::budget::BudgetAmounts;
use noesis::domain::models::event::{InterruptKind, SpawnRequest};
use noesis::infrastructure::config::ConfigLoader;
use noesis::infrastructure::hardware::{HardwareMonitor, PressureEvent};
use noesis::infrastructure::http::{HttpEmbedding, HttpToolHost, HttpVault};
use noesis::infrastructure::logging;

const EXIT_OK: u8 = 0;
const EXIT_CONFIG: u8 = 64;
const EXIT_VAULT_UNREACHABLE: u8 = 65;
const EXIT_EMBED_UNREACHABLE: u8 = 66;
const EXIT_INTERRUPTED: u8 = 130;

#[derive(Parser)]
#[command(name = "noesis", about = "Tiered cognitive kernel for autonomous research agents", version)]
struct Cli {
    /// Path to a YAML config file (defaults to ./noesis.yaml).
    #[arg(long, global = true)]
    config: Option<std::path::PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Write a default noesis.yaml into the current directory.
    Init {
        /// Overwrite an existing file.
        #[arg(long)]
        force: bool,
    },

    /// Spawn one agent and run it to epoch close.
    Run {
        /// The macro-objective for this epoch.
        #[arg(long)]
        objective: String,

        /// Cognitive profile id, fetched from the Vault.
        #[arg(long, default_value = "default")]
        profile: String,

        /// Token grant for the epoch.
        #[arg(long, default_value_t = 100_000)]
        budget_tokens: u64,

        /// Embedding dimension expected from the backend.
        #[arg(long, default_value_t = 384)]
        embed_dim: usize,
    },
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();

    // Init needs no endpoints; handle it before configuration loads.
    if let Commands::Init { force } = &cli.command {
        return init_config(*force);
    }

    let config = match cli
        .config
        .as_ref()
        .map_or_else(ConfigLoader::load, ConfigLoader::load_from_file)
    {
        Ok(config) => config,
        Err(err) => {
            eprintln!("configuration error: {err:#}");
            return ExitCode::from(EXIT_CONFIG);
        }
    };

    let _log_guard = match logging::init(&config.logging, None) {
        Ok(guard) => guard,
        Err(err) => {
            eprintln!("logging setup failed: {err:#}");
            return ExitCode::from(EXIT_CONFIG);
        }
    };

    match cli.command {
        Commands::Init { .. } => unreachable!("handled before configuration loads"),
        Commands::Run { objective, profile, budget_tokens, embed_dim } => {
            run_agent(config, objective, profile, budget_tokens, embed_dim).await
        }
    }
}

fn init_config(force: bool) -> ExitCode {
    let path = std::path::Path::new("noesis.yaml");
    if path.exists() && !force {
        eprintln!("noesis.yaml already exists (use --force to overwrite)");
        return ExitCode::from(EXIT_CONFIG);
    }
    let template = match serde_yaml::to_string(&noesis::KernelConfig::default()) {
        Ok(template) => template,
        Err(err) => {
            eprintln!("failed to render default config: {err}");
            return ExitCode::from(EXIT_CONFIG);
        }
    };
    match std::fs::write(path, template) {
        Ok(()) => {
            println!("wrote noesis.yaml");
            ExitCode::from(EXIT_OK)
        }
        Err(err) => {
            eprintln!("failed to write noesis.yaml: {err}");
            ExitCode::from(EXIT_CONFIG)
        }
    }
}

async fn run_agent(
    config: noesis::KernelConfig,
    objective: String,
    profile: String,
    budget_tokens: u64,
    embed_dim: usize,
) -> ExitCode {
    // Wire the external dependencies.
    let vault = match HttpVault::new(&config.endpoints.vault_url) {
        Ok(vault) => Arc::new(vault),
        Err(err) => {
            error!(error = %err, "failed to build vault client");
            return ExitCode::from(EXIT_CONFIG);
        }
    };
    if let Err(err) = vault.ping().await {
        error!(error = %err, "vault unreachable at startup");
        return ExitCode::from(EXIT_VAULT_UNREACHABLE);
    }

    let embedding = match HttpEmbedding::new(&config.endpoints.embed_url, embed_dim) {
        Ok(embedding) => Arc::new(embedding),
        Err(err) => {
            error!(error = %err, "failed to build embedding client");
            return ExitCode::from(EXIT_CONFIG);
        }
    };
    if let Err(err) = embedding.ping().await {
        error!(error = %err, "embedding backend unreachable at startup");
        return ExitCode::from(EXIT_EMBED_UNREACHABLE);
    }

    let tool_host = match HttpToolHost::new(&config.endpoints.tool_host_url, &config.rate_limit) {
        Ok(host) => Arc::new(host),
        Err(err) => {
            error!(error = %err, "failed to build tool host client");
            return ExitCode::from(EXIT_CONFIG);
        }
    };

    // Pressure probe runs for the life of the process.
    let monitor = Arc::new(HardwareMonitor::new(config.pressure.clone()));
    let _probe = Arc::clone(&monitor).start();

    let spawn = SpawnRequest::new(profile, objective, BudgetAmounts::tokens(budget_tokens));
    let (interrupt_handle, interrupts) = InterruptChannel::new();

    // Ctrl-C maps to the terminate interrupt; a second one aborts hard.
    let ctrlc_handle = interrupt_handle.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            ctrlc_handle.send(InterruptKind::Terminate);
        }
    });

    let mut controller =
        LifecycleController::new(config, vault, tool_host, embedding);

    // Memory pressure drives the cache eviction pass.
    let cache = controller.cache();
    let mut pressure_rx = monitor.subscribe();
    tokio::spawn(async move {
        loop {
            match pressure_rx.recv().await {
                Ok(PressureEvent::EvictRequested { target_bytes }) => {
                    cache.pressure_evict(target_bytes).await;
                }
                Ok(PressureEvent::Status(_)) => {}
                // A lagged subscriber just missed samples; keep listening.
                Err(tokio::sync::broadcast::error::RecvError::Lagged(_)) => {}
                Err(tokio::sync::broadcast::error::RecvError::Closed) => break,
            }
        }
    });

    match controller.run_lifecycle(spawn, interrupts).await {
        Ok(outcome) => {
            info!(
                vault_id = %outcome.vault_id,
                exhausted = outcome.summary.budget_exhausted,
                "agent reached final state"
            );
            if outcome.interrupted {
                ExitCode::from(EXIT_INTERRUPTED)
            } else {
                ExitCode::from(EXIT_OK)
            }
        }
        Err(err) => {
            error!(error = %err, "lifecycle failed");
            ExitCode::from(1)
        }
    }
}
