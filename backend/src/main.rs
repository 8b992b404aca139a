//! Penalty engine entry point: one subcommand per periodic batch.
//!
//! An external scheduler invokes `check` once per day, and `sweep` and
//! `reconcile` on their own cadence. Each run builds its adapters, executes a
//! single batch and exits.
#![cfg_attr(not(any(test, doctest)), deny(clippy::unwrap_used))]
#![cfg_attr(not(any(test, doctest)), deny(clippy::expect_used))]

use std::ffi::OsString;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use clap::{Parser, Subcommand};
use color_eyre::eyre::{Context, Result};
use mockable::{Clock, DefaultClock};
use ortho_config::OrthoConfig;
use tracing::{info, warn};
use tracing_subscriber::{EnvFilter, fmt};

use penalty_engine::config::EngineSettings;
use penalty_engine::domain::ports::NoOpMissNotifier;
use penalty_engine::domain::{PenaltyEngine, PenaltyEnginePorts};
use penalty_engine::outbound::persistence::{
    DbPool, DieselHabitRepository, DieselPenaltyRepository, DieselUserProfileRepository,
    DieselVerificationRepository, PoolConfig, run_pending_migrations,
};
use penalty_engine::outbound::stripe::StripeHttpProcessor;

/// `penalty-engine` command arguments.
#[derive(Debug, Parser)]
#[command(
    name = "penalty-engine",
    about = "Detect missed habits, record penalties and collect payments",
    version
)]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Detect yesterday's misses, record penalties and charge them.
    Check {
        /// Evaluate as of this RFC 3339 instant instead of now.
        #[arg(long = "as-of", value_name = "instant")]
        as_of: Option<DateTime<Utc>>,
    },
    /// Retry failed charges whose retry interval has elapsed.
    Sweep {
        /// Evaluate eligibility at this RFC 3339 instant instead of now.
        #[arg(long = "now", value_name = "instant")]
        now: Option<DateTime<Utc>>,
    },
    /// Mirror processor status onto penalties left in `processing`.
    Reconcile,
    /// Apply pending database migrations.
    Migrate,
}

#[tokio::main]
async fn main() -> Result<()> {
    color_eyre::install()?;
    if let Err(e) = fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .json()
        .try_init()
    {
        warn!(error = %e, "tracing init failed");
    }

    let cli = Cli::parse();
    let settings = load_settings()?;

    match cli.command {
        Command::Migrate => migrate(&settings).await,
        command => run_batch(&settings, command).await,
    }
}

/// Settings come from the environment and config files only; the subcommand
/// owns the process arguments.
fn load_settings() -> Result<EngineSettings> {
    EngineSettings::load_from_iter([OsString::from("penalty-engine")])
        .wrap_err("failed to load engine settings")
}

async fn migrate(settings: &EngineSettings) -> Result<()> {
    let database_url = settings.database_url()?;
    let applied = run_pending_migrations(&database_url)
        .await
        .wrap_err("migration run failed")?;
    info!(applied, "migrate finished");
    Ok(())
}

async fn run_batch(settings: &EngineSettings, command: Command) -> Result<()> {
    let clock: Arc<dyn Clock> = Arc::new(DefaultClock);
    let engine = build_engine(settings, clock.clone()).await?;

    match command {
        Command::Check { as_of } => {
            let as_of = as_of.unwrap_or_else(|| clock.utc());
            let report = engine
                .run_penalty_check(as_of)
                .await
                .wrap_err("penalty check failed")?;
            info!(?report, "check command finished");
        }
        Command::Sweep { now } => {
            let now = now.unwrap_or_else(|| clock.utc());
            let report = engine
                .run_retry_sweep(now)
                .await
                .wrap_err("retry sweep failed")?;
            info!(?report, "sweep command finished");
        }
        Command::Reconcile => {
            let report = engine
                .run_reconcile(clock.utc())
                .await
                .wrap_err("reconcile failed")?;
            info!(?report, "reconcile command finished");
        }
        Command::Migrate => {}
    }
    Ok(())
}

async fn build_engine(settings: &EngineSettings, clock: Arc<dyn Clock>) -> Result<PenaltyEngine> {
    let database_url = settings.database_url()?;
    let pool_config = PoolConfig::new(database_url)
        .with_max_size(settings.pool_size())
        .with_connection_timeout(settings.http_timeout());
    let pool = DbPool::new(pool_config)
        .await
        .wrap_err("failed to create database pool")?;

    let processor = StripeHttpProcessor::new(
        settings.stripe_api_base()?,
        settings.stripe_secret_key()?,
        settings.http_timeout(),
    )
    .wrap_err("failed to build Stripe client")?;

    let ports = PenaltyEnginePorts {
        habits: Arc::new(DieselHabitRepository::new(pool.clone())),
        verifications: Arc::new(DieselVerificationRepository::new(pool.clone())),
        profiles: Arc::new(DieselUserProfileRepository::new(pool.clone())),
        penalties: Arc::new(DieselPenaltyRepository::new(pool)),
        processor: Arc::new(processor),
        notifier: Arc::new(NoOpMissNotifier),
    };
    Ok(PenaltyEngine::new(ports, clock, settings.engine_config()))
}
