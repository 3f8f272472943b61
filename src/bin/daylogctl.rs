//! Administration tool for the daily log shard store.
//!
//! `bootstrap` runs the one-time cluster setup; `provision` is the daily
//! cron entrypoint (today + tomorrow per tenant); `status` checks the
//! replica set. Exit status: 0 healthy, 1 one or more tenant failures,
//! 2 fatal.

use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;

use chrono::{Duration, Utc};
use clap::{Parser, Subcommand};
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

use daylog::bootstrap::Bootstrapper;
use daylog::provision::Provisioner;
use daylog::store::{LogStore, MongoStore};
use daylog::Config;

const EXIT_HEALTHY: u8 = 0;
const EXIT_PARTIAL: u8 = 1;
const EXIT_FATAL: u8 = 2;

#[derive(Parser)]
#[command(name = "daylogctl")]
#[command(about = "Daily log shard administration", long_about = None)]
struct Cli {
    /// Path to the TOML configuration file.
    #[arg(short, long, default_value = "daylog.toml")]
    config: PathBuf,

    /// Connection URI override.
    #[arg(long, env = "DAYLOG_URI")]
    uri: Option<String>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run the idempotent cluster bootstrap sequence.
    Bootstrap,
    /// Ensure shards exist for today and (by default) tomorrow.
    Provision {
        /// Skip pre-creating tomorrow's shards.
        #[arg(long)]
        today_only: bool,
    },
    /// Report replica-set member states.
    Status,
}

#[tokio::main]
async fn main() -> ExitCode {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| "info".into()))
        .init();

    let cli = Cli::parse();
    match run(cli).await {
        Ok(code) => code,
        Err(e) => {
            error!(error = %e, "fatal");
            ExitCode::from(EXIT_FATAL)
        }
    }
}

async fn run(cli: Cli) -> anyhow::Result<ExitCode> {
    let mut config = Config::from_path(&cli.config)?;
    if let Some(uri) = cli.uri {
        config.uri = uri;
    }

    let store = Arc::new(MongoStore::connect(&config.uri).await?);

    match cli.command {
        Commands::Bootstrap => {
            Bootstrapper::new(store, config).run().await?;
            Ok(ExitCode::from(EXIT_HEALTHY))
        }
        Commands::Provision { today_only } => {
            let today = Utc::now().date_naive();
            let mut dates = vec![today];
            if !today_only {
                dates.push(today + Duration::days(1));
            }
            let provisioner = Provisioner::new(store, config.schema());
            let report = provisioner.run(&config.tenants, &dates).await;
            info!(
                created = report.created.len(),
                already_existed = report.already_existed.len(),
                failed = report.failures.len(),
                "provisioning run finished"
            );
            for failure in &report.failures {
                error!(tenant = %failure.tenant, error = %failure.error, "tenant failed");
            }
            if report.is_healthy() {
                Ok(ExitCode::from(EXIT_HEALTHY))
            } else {
                Ok(ExitCode::from(EXIT_PARTIAL))
            }
        }
        Commands::Status => {
            let status = store.replica_set_status().await?;
            for member in &status.members {
                let role = match member.state {
                    1 => "PRIMARY",
                    2 => "SECONDARY",
                    _ => "OTHER",
                };
                println!("{}  {}", member.name, role);
            }
            match status.primary() {
                Some(primary) => {
                    info!(primary = %primary.name, "replica set healthy");
                    Ok(ExitCode::from(EXIT_HEALTHY))
                }
                None => {
                    error!("no primary elected");
                    Ok(ExitCode::from(EXIT_FATAL))
                }
            }
        }
    }
}
