//! agentlab - multi-tenant agent experiment server
//!
//! Usage:
//!   agentlab serve                      → start the HTTP API on port 8000
//!   agentlab serve --config lab.toml    → with a config file
//!   agentlab config                     → print the effective (redacted) settings
//!   agentlab version                    → show version

use agentlab_core::config::{AuthMode, BindMode};
use agentlab_core::Settings;
use clap::{Parser, Subcommand};
use std::path::{Path, PathBuf};
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter, Layer};

const DEFAULT_LOG_FILTER: &str = "agentlab=info,agentlab_core=info,agentlab_store=info,\
agentlab_frameworks=info,agentlab_engine=info,agentlab_gateway=info,tower_http=info";

#[derive(Parser)]
#[command(
    name = "agentlab",
    about = "Agent playground: configure framework agents and run experiments",
    version = env!("CARGO_PKG_VERSION")
)]
struct Cli {
    #[command(subcommand)]
    command: Option<Commands>,

    /// Path to the config file (TOML). Missing file means defaults.
    #[arg(short, long, global = true, default_value = "agentlab.toml")]
    config: PathBuf,
}

#[derive(Subcommand)]
enum Commands {
    /// Start the HTTP API server
    Serve {
        #[arg(short, long)]
        port: Option<u16>,
        /// Bind mode: lan or loopback
        #[arg(short, long)]
        bind: Option<String>,
        /// Disable authentication (every request acts as the local user)
        #[arg(long, default_value_t = false)]
        no_auth: bool,
        /// Persist state to this JSON snapshot file
        #[arg(long)]
        snapshot: Option<PathBuf>,
        /// Emit logs as JSON lines
        #[arg(long, default_value_t = false)]
        log_json: bool,
        /// Also write daily-rotated JSON logs to this directory
        #[arg(long)]
        log_dir: Option<PathBuf>,
    },
    /// Print the effective settings with secrets masked
    Config {
        #[arg(long, default_value_t = false)]
        json: bool,
    },
    /// Show version
    Version,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    match cli.command {
        Some(Commands::Serve { port, bind, no_auth, snapshot, log_json, log_dir }) => {
            let _guard = init_tracing(log_json, log_dir.as_deref())?;

            let mut settings = Settings::load(&cli.config)?.apply_env()?;
            if let Some(port) = port {
                settings.server.port = port;
            }
            if let Some(bind) = bind {
                settings.server.bind = match bind.as_str() {
                    "loopback" | "localhost" | "127.0.0.1" => BindMode::Loopback,
                    _ => BindMode::Lan,
                };
            }
            if no_auth {
                settings.auth.mode = AuthMode::None;
            }
            if snapshot.is_some() {
                settings.store.snapshot_path = snapshot;
            }

            agentlab_gateway::start_server(settings).await?;
        }

        Some(Commands::Config { json }) => {
            let settings = Settings::load(&cli.config)?.apply_env()?.redacted();
            if json {
                println!("{}", serde_json::to_string_pretty(&settings)?);
            } else {
                print!("{}", toml::to_string_pretty(&settings)?);
            }
        }

        Some(Commands::Version) | None => {
            println!("agentlab v{}", env!("CARGO_PKG_VERSION"));
        }
    }

    Ok(())
}

/// Console logging plus an optional rolling JSON file. The returned guard
/// must live as long as the process to flush the file writer.
fn init_tracing(json: bool, log_dir: Option<&Path>) -> anyhow::Result<Option<WorkerGuard>> {
    let console = if json {
        fmt::layer().json().boxed()
    } else {
        fmt::layer().boxed()
    };

    let (file, guard) = match log_dir {
        Some(dir) => {
            std::fs::create_dir_all(dir)?;
            let appender = tracing_appender::rolling::daily(dir, "agentlab.log");
            let (writer, guard) = tracing_appender::non_blocking(appender);
            (Some(fmt::layer().json().with_ansi(false).with_writer(writer)), Some(guard))
        }
        None => (None, None),
    };

    tracing_subscriber::registry()
        .with(console)
        .with(file)
        .with(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| DEFAULT_LOG_FILTER.into()),
        )
        .init();
    Ok(guard)
}
