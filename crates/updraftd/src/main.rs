//! updraftd: the Updraft update server.
//!
//! Single binary that assembles the state store, the event registration
//! pipeline and the REST API.
//!
//! # Usage
//!
//! ```text
//! updraftd serve --config /etc/updraft/updraft.toml --port 8000
//! updraftd check-config --config /etc/updraft/updraft.toml
//! updraftd default-config > updraft.toml
//! ```

use std::net::SocketAddr;
use std::path::{Path, PathBuf};

use anyhow::Context;
use clap::{Parser, Subcommand};
use tracing::info;
use tracing_subscriber::EnvFilter;
use updraft_core::{LoggingConfig, UpdraftConfig};

#[derive(Parser)]
#[command(name = "updraftd", about = "Updraft update server")]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Run the update server.
    Serve {
        /// Path to updraft.toml. Defaults apply when omitted.
        #[arg(long)]
        config: Option<PathBuf>,

        /// Port to listen on (overrides server.port).
        #[arg(long)]
        port: Option<u16>,

        /// Data directory for persistent state (overrides server.data_dir).
        #[arg(long)]
        data_dir: Option<PathBuf>,

        /// Halt a group's rollout when its first update fails
        /// (overrides rollout.disable_updates_on_failed_rollout).
        #[arg(long)]
        disable_updates_on_failed_rollout: bool,
    },
    /// Parse and validate a configuration file.
    CheckConfig {
        #[arg(long)]
        config: PathBuf,
    },
    /// Print the default configuration as TOML.
    DefaultConfig,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    match cli.command {
        Command::Serve {
            config,
            port,
            data_dir,
            disable_updates_on_failed_rollout,
        } => {
            let mut config = load_config(config.as_deref())?;
            if let Some(port) = port {
                config.server.port = port;
            }
            if let Some(data_dir) = data_dir {
                config.server.data_dir = data_dir;
            }
            if disable_updates_on_failed_rollout {
                config.rollout.disable_updates_on_failed_rollout = true;
            }
            config.validate()?;
            init_tracing(&config.logging)?;
            run_server(config).await
        }
        Command::CheckConfig { config } => {
            let config = load_config(Some(&config))?;
            config.validate()?;
            println!("configuration ok");
            Ok(())
        }
        Command::DefaultConfig => {
            print!("{}", UpdraftConfig::default().to_toml_string()?);
            Ok(())
        }
    }
}

fn load_config(path: Option<&Path>) -> anyhow::Result<UpdraftConfig> {
    match path {
        Some(path) => UpdraftConfig::from_file(path)
            .with_context(|| format!("failed to load config from {}", path.display())),
        None => Ok(UpdraftConfig::default()),
    }
}

/// `RUST_LOG` wins over the configured level.
fn init_tracing(logging: &LoggingConfig) -> anyhow::Result<()> {
    let filter = match EnvFilter::try_from_default_env() {
        Ok(filter) => filter,
        Err(_) => EnvFilter::try_new(&logging.level)?,
    };
    let builder = tracing_subscriber::fmt().with_env_filter(filter);
    if logging.json {
        builder.json().init();
    } else {
        builder.init();
    }
    Ok(())
}

async fn run_server(config: UpdraftConfig) -> anyhow::Result<()> {
    info!("Updraft daemon starting");

    std::fs::create_dir_all(&config.server.data_dir).with_context(|| {
        format!(
            "failed to create data dir {}",
            config.server.data_dir.display()
        )
    })?;
    let db_path = config.server.data_dir.join("updraft.redb");

    let store = updraft_state::StateStore::open(&db_path)?;
    info!(path = ?db_path, "state store opened");

    info!(
        disable_updates_on_failed_rollout = config.rollout.disable_updates_on_failed_rollout,
        reboot_completion_apps = ?config.rollout.reboot_completion_apps,
        "rollout policy loaded"
    );

    let router = updraft_api::build_router(store, config.rollout);
    let addr = SocketAddr::from(([0, 0, 0, 0], config.server.port));

    info!(%addr, "API server starting");

    let listener = tokio::net::TcpListener::bind(addr).await?;

    axum::serve(listener, router)
        .with_graceful_shutdown(async {
            if let Err(e) = tokio::signal::ctrl_c().await {
                tracing::error!(error = %e, "failed to listen for shutdown signal");
                std::future::pending::<()>().await;
            }
            info!("shutdown signal received");
        })
        .await?;

    info!("Updraft daemon stopped");
    Ok(())
}
