//! credman - universal Git credential helper

mod commands;

use clap::{Parser, Subcommand};
use credman_core::CoreError;
use std::process::ExitCode;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

#[derive(Parser)]
#[command(name = "git-credential-credman")]
#[command(author, version, about = "Git credential helper with OAuth support", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Produce a credential for the request on standard input
    Get,

    /// Persist a credential Git has just used successfully
    Store,

    /// Discard a credential Git has just seen rejected
    Erase,

    /// Install credman as Git's credential helper
    Configure {
        /// Edit the system Git configuration instead of the global one
        #[arg(long)]
        system: bool,
    },

    /// Remove credman from Git's credential helper configuration
    Unconfigure {
        /// Edit the system Git configuration instead of the global one
        #[arg(long)]
        system: bool,
    },

    /// Print version and platform information
    Version,
}

#[tokio::main]
async fn main() -> ExitCode {
    init_tracing();

    let cli = Cli::parse();
    let result = match cli.command {
        Commands::Get => commands::get().await,
        Commands::Store => commands::store().await,
        Commands::Erase => commands::erase().await,
        Commands::Configure { system } => commands::configure(system),
        Commands::Unconfigure { system } => commands::unconfigure(system),
        Commands::Version => commands::version(),
    };

    match result {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            // A single fatal line for Git's console; the chain shows up in
            // trace output only.
            eprintln!("fatal: {e}");
            tracing::debug!("error chain: {e:?}");
            let code = e
                .downcast_ref::<CoreError>()
                .map(CoreError::exit_code)
                .unwrap_or(1);
            ExitCode::from(code)
        }
    }
}

/// Logging goes to stderr only: standard output belongs to the credential
/// protocol. `GCM_TRACE` turns on debug-level tracing.
fn init_tracing() {
    let trace_enabled = std::env::var("GCM_TRACE")
        .map(|v| !matches!(v.to_ascii_lowercase().as_str(), "" | "0" | "false" | "no" | "off"))
        .unwrap_or(false);

    let filter = if trace_enabled {
        EnvFilter::new("debug")
    } else {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn"))
    };

    tracing_subscriber::registry()
        .with(filter)
        .with(
            tracing_subscriber::fmt::layer()
                .with_target(false)
                .with_writer(std::io::stderr),
        )
        .init();
}
