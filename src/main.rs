//! Binary entrypoint for the Agora CLI.
//!
//! Commands:
//! - `start [--bind <addr>]` - run the server
//! - `init` - write a starter `agora.toml`
//! - `status [--json]` - print a configuration summary and the stored account count
//!
//! See the library crate docs for module-level details: `agora::`.
use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use log::info;
use std::sync::Arc;

use agora::clock::SystemClock;
use agora::config::Config;
use agora::server::Server;
use agora::state::{ServerState, StateSettings};
use agora::storage::open_backend;
use agora::user::PasswordService;

#[derive(Parser)]
#[command(name = "agora")]
#[command(about = "Authoritative server for a shared multi-room virtual space")]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Configuration file path (can be used before or after subcommand)
    #[arg(short, long, default_value = "agora.toml", global = true)]
    config: String,

    /// Verbose logging (-v, -vv for more; may appear before or after subcommand)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    verbose: u8,
}

#[derive(Subcommand)]
enum Commands {
    /// Start the server
    Start {
        /// Listen address, overriding `server.bind`
        #[arg(short, long)]
        bind: Option<String>,
    },
    /// Write a default configuration file
    Init,
    /// Show configuration and storage summary
    Status {
        /// Print the summary as JSON
        #[arg(long)]
        json: bool,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    match cli.command {
        Commands::Start { bind } => {
            let mut config = Config::load(&cli.config).await?;
            init_logging(&Some(config.clone()), cli.verbose);
            if let Some(bind) = bind {
                config.server.bind = bind;
            }
            info!("Starting Agora v{}", env!("CARGO_PKG_VERSION"));
            let state = open_state(&config)?;
            let server = Server::bind(&config, state).await?;
            server.run().await?;
        }
        Commands::Init => {
            init_logging(&None, cli.verbose);
            if tokio::fs::metadata(&cli.config).await.is_ok() {
                anyhow::bail!("{} already exists; refusing to overwrite", cli.config);
            }
            Config::create_default(&cli.config).await?;
            info!("Configuration file created at {}", cli.config);
        }
        Commands::Status { json } => {
            let config = Config::load(&cli.config).await?;
            init_logging(&Some(config.clone()), cli.verbose);
            let (_, stored) = open_backend(&config.storage).context("opening storage")?;
            if json {
                let payload = serde_json::json!({
                    "bind": config.server.bind,
                    "max_frame_size": config.server.max_frame_size,
                    "backend": config.storage.backend,
                    "data_dir": config.storage.data_dir,
                    "owner": config.owner,
                    "accounts": stored.account_count(),
                    "worlds": stored.worlds.len(),
                    "bot": config.bot.enabled.then(|| config.bot.name.clone()),
                });
                println!("{}", payload);
            } else {
                println!("Agora v{}", env!("CARGO_PKG_VERSION"));
                println!("  bind:        {}", config.server.bind);
                println!("  frame size:  {} bytes", config.server.max_frame_size);
                println!(
                    "  storage:     {:?} at {}",
                    config.storage.backend, config.storage.data_dir
                );
                println!("  owner:       {}", config.owner.as_deref().unwrap_or("-"));
                println!("  accounts:    {}", stored.account_count());
                println!("  worlds:      {}", stored.worlds.len());
            }
        }
    }

    Ok(())
}

/// Hydrate the server state from storage and create the configured worlds.
fn open_state(config: &Config) -> Result<ServerState> {
    let (store, stored) = open_backend(&config.storage).context("opening storage")?;
    let mut state = ServerState::new(
        StateSettings::from_config(config),
        store,
        Arc::new(SystemClock),
    )
    .with_passwords(PasswordService::from_config(config.security.as_ref()));
    state.restore(stored);
    for seed in &config.worlds {
        state
            .seed_world(&seed.name, seed.map)
            .with_context(|| format!("seeding world {}", seed.name))?;
    }
    Ok(state)
}

fn init_logging(config: &Option<Config>, verbosity: u8) {
    use std::io::Write;
    let mut builder = env_logger::Builder::new();
    let configured = config
        .as_ref()
        .and_then(|c| c.logging.level.parse::<log::LevelFilter>().ok())
        .unwrap_or(log::LevelFilter::Info);
    // CLI verbosity overrides config
    let base_level = match verbosity {
        0 => configured,
        1 => log::LevelFilter::Debug,
        _ => log::LevelFilter::Trace,
    };
    builder.filter_level(base_level);

    let log_file = config
        .as_ref()
        .and_then(|c| c.logging.file.clone())
        .and_then(|path| {
            std::fs::OpenOptions::new()
                .create(true)
                .append(true)
                .open(path)
                .ok()
        });
    match log_file {
        Some(f) => {
            let file = std::sync::Mutex::new(f);
            // Only echo to the console when someone is watching it
            let is_tty = atty::is(atty::Stream::Stdout);
            builder.format(move |fmt, record| {
                let ts = chrono::Utc::now().format("%Y-%m-%dT%H:%M:%SZ");
                let line = format!(
                    "{} [{}] {}: {}",
                    ts,
                    record.level(),
                    record.target(),
                    record.args()
                );
                if let Ok(mut guard) = file.lock() {
                    let _ = writeln!(guard, "{}", line);
                }
                if is_tty {
                    writeln!(fmt, "{}", line)
                } else {
                    Ok(())
                }
            });
        }
        None => {
            builder.format(|fmt, record| {
                let ts = chrono::Utc::now().format("%Y-%m-%dT%H:%M:%SZ");
                writeln!(
                    fmt,
                    "{} [{}] {}: {}",
                    ts,
                    record.level(),
                    record.target(),
                    record.args()
                )
            });
        }
    }
    let _ = builder.try_init();
}
