//! Binary entrypoint for the Realmkeep world service.
//!
//! Commands:
//! - `init` - write a starter `config.toml`
//! - `start` - load the world from the store and run the abandonment worker until Ctrl-C
//! - `status` - print counts of stored sites, role rows and alliances
//!
//! See the library crate docs for module-level details: `realmkeep::`.
use std::time::Duration;

use anyhow::Result;
use clap::{Parser, Subcommand};
use log::{info, warn};

use realmkeep::config::Config;
use realmkeep::metrics;
use realmkeep::server::GameServices;
use realmkeep::storage::WorldStore;
use realmkeep::territory::spawn_abandon_worker;

#[derive(Parser)]
#[command(name = "realmkeep")]
#[command(about = "Shared world state for chat channels, territory and construction")]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Configuration file path (can be used before or after subcommand)
    #[arg(short, long, default_value = "config.toml", global = true)]
    config: String,

    /// Verbose logging (-v, -vv for more; may appear before or after subcommand)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    verbose: u8,
}

#[derive(Subcommand)]
enum Commands {
    /// Load the world and run until interrupted
    Start,
    /// Write a default configuration file
    Init,
    /// Show stored world statistics
    Status,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    match cli.command {
        Commands::Init => {
            init_logging(&None, cli.verbose);
            Config::create_default(&cli.config).await?;
            info!("Configuration file created at {}", cli.config);
        }
        Commands::Start => {
            let config = Config::load(&cli.config).await?;
            init_logging(&Some(config.clone()), cli.verbose);
            info!(
                "Starting {} (realmkeep v{})",
                config.server.name,
                env!("CARGO_PKG_VERSION")
            );

            let store = WorldStore::open(&config.storage.data_dir)?;
            let services = GameServices::open(&config, store.clone())?;
            let worker = spawn_abandon_worker(
                services.territory.clone(),
                Duration::from_millis(config.build.abandon_poll_ms),
            );

            tokio::signal::ctrl_c().await?;
            info!("Shutdown requested");
            worker.shutdown().await;
            if let Err(e) = store.flush() {
                warn!("Final store flush failed: {}", e);
            }
            let m = metrics::snapshot();
            info!(
                "Session totals: chat={} dropped={} builds={} relinquishes={} abandoned={} stale={} write_failures={}",
                m.chat_messages,
                m.chat_dropped,
                m.constructions,
                m.relinquishes,
                m.abandons_executed,
                m.abandons_skipped,
                m.storage_write_failures
            );
        }
        Commands::Status => {
            let config = Config::load(&cli.config).await?;
            init_logging(&Some(config.clone()), cli.verbose);
            let store = WorldStore::open(&config.storage.data_dir)?;
            println!("Realmkeep Status:");
            println!("  Server: {}", config.server.name);
            println!("  Data directory: {}", config.storage.data_dir);
            println!(
                "  Map: {}x{}",
                config.world.width, config.world.height
            );
            println!("  Stored sites: {}", store.site_count());
            println!("  Role attributes: {}", store.role_attribute_count());
            println!("  Alliances: {}", store.alliance_count());
        }
    }

    Ok(())
}

fn init_logging(config: &Option<Config>, verbosity: u8) {
    use std::io::Write;
    let mut builder = env_logger::Builder::new();
    // CLI verbosity overrides the configured level
    let configured = config
        .as_ref()
        .and_then(|cfg| cfg.logging.level.parse::<log::LevelFilter>().ok())
        .unwrap_or(log::LevelFilter::Info);
    let level = match verbosity {
        0 => configured,
        1 => log::LevelFilter::Debug,
        _ => log::LevelFilter::Trace,
    };
    builder.filter_level(level);

    let log_file = config
        .as_ref()
        .and_then(|cfg| cfg.logging.file.as_ref())
        .and_then(|path| {
            std::fs::OpenOptions::new()
                .create(true)
                .append(true)
                .open(path)
                .ok()
        });

    match log_file {
        Some(file) => {
            let file = std::sync::Mutex::new(file);
            // Echo to the console only when attached to a terminal
            let is_tty = atty::is(atty::Stream::Stdout);
            builder.format(move |fmt, record| {
                let ts = chrono::Utc::now().format("%Y-%m-%dT%H:%M:%SZ");
                let line = format!("{} [{}] {}", ts, record.level(), record.args());
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
                writeln!(
                    fmt,
                    "{} [{}] {}",
                    chrono::Utc::now().format("%Y-%m-%dT%H:%M:%SZ"),
                    record.level(),
                    record.args()
                )
            });
        }
    }
    let _ = builder.try_init();
}
