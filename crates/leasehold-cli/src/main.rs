// # leasehold - store inspection tool
//
// Thin integration layer only. This binary is responsible for:
// 1. Parsing command-line arguments
// 2. Initializing tracing
// 3. Populating the store registry
// 4. Opening the selected store and running one read-only query, or the
//    schema migration that opening a durable store implies
//
// All allocation and storage rules live in leasehold-core.

use std::net::Ipv4Addr;
use std::process::ExitCode;

use anyhow::Result;
use clap::{Parser, Subcommand};
use leasehold_core::{Binding, Deadline, StoreConfig, StoreRegistry};
use tracing::{Level, error, info};
use tracing_subscriber::FmtSubscriber;

/// Exit codes for different termination scenarios
///
/// These codes follow systemd conventions:
/// - 0: success
/// - 1: configuration or startup error
/// - 2: runtime error
#[derive(Debug, Clone, Copy)]
enum CliExitCode {
    Success = 0,
    ConfigError = 1,
    RuntimeError = 2,
}

impl From<CliExitCode> for ExitCode {
    fn from(code: CliExitCode) -> Self {
        ExitCode::from(code as u8)
    }
}

#[derive(Parser)]
#[command(
    name = "leasehold",
    version,
    about = "Inspect and maintain leasehold binding stores"
)]
struct Cli {
    /// Path to a durable store file
    #[arg(long, global = true)]
    store: Option<String>,

    /// Log level: trace, debug, info, warn, error
    #[arg(long, global = true, default_value = "warn")]
    log_level: String,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// List every binding in the store
    List,

    /// Show the binding for one address
    Show { address: Ipv4Addr },

    /// Open a durable store, running any pending schema migrations
    Migrate,
}

fn main() -> ExitCode {
    let cli = Cli::parse();

    let log_level = match cli.log_level.to_lowercase().as_str() {
        "trace" => Level::TRACE,
        "debug" => Level::DEBUG,
        "info" => Level::INFO,
        "warn" => Level::WARN,
        "error" => Level::ERROR,
        other => {
            eprintln!("Invalid log level: {other}");
            return CliExitCode::ConfigError.into();
        }
    };

    let subscriber = FmtSubscriber::builder().with_max_level(log_level).finish();
    if let Err(e) = tracing::subscriber::set_global_default(subscriber) {
        eprintln!("Failed to set tracing subscriber: {e}");
        return CliExitCode::ConfigError.into();
    }

    let Some(path) = cli.store else {
        eprintln!("--store <path> is required");
        return CliExitCode::ConfigError.into();
    };

    let rt = match tokio::runtime::Builder::new_multi_thread().enable_all().build() {
        Ok(runtime) => runtime,
        Err(e) => {
            error!("Failed to create tokio runtime: {e}");
            return CliExitCode::RuntimeError.into();
        }
    };

    rt.block_on(async {
        match run(path, cli.command).await {
            Ok(()) => CliExitCode::Success,
            Err(e) => {
                error!("{e:#}");
                CliExitCode::RuntimeError
            }
        }
    })
    .into()
}

fn print_binding(binding: &Binding) {
    let kind = if binding.leased { "lease" } else { "reservation" };
    println!(
        "{}\t{}\t{}\t{}",
        binding.address,
        binding.client_id,
        kind,
        binding.expiration.to_rfc3339()
    );
}

async fn run(path: String, command: Command) -> Result<()> {
    // explicit registration at process start; no module-load side effects
    let registry = StoreRegistry::with_builtins();

    // opening a durable store runs the migration chain before anything else
    let store = registry.create(&StoreConfig::Durable { path }).await?;

    match command {
        Command::Migrate => {
            info!("store opened, schema is current");
        }
        Command::List => {
            let addresses = store.list_addresses(Deadline::none()).await?;
            info!(count = addresses.len(), "bindings on file");
            for address in addresses {
                let binding = store.find_by_address(address, Deadline::none()).await?;
                print_binding(&binding);
            }
        }
        Command::Show { address } => {
            let binding = store.find_by_address(address, Deadline::none()).await?;
            print_binding(&binding);
        }
    }

    Ok(())
}
