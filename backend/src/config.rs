//! Engine configuration loaded via OrthoConfig.
//!
//! Apart from the retry cap every field is optional and accessors supply
//! the defaults. Environment variables use the `PENALTY_ENGINE_` prefix, e.g.
//! `PENALTY_ENGINE_MAX_RETRIES=5`.

use std::fmt;
use std::time::Duration;

use chrono::TimeDelta;
use ortho_config::OrthoConfig;
use serde::Deserialize;
use url::Url;
use zeroize::Zeroizing;

use crate::domain::{
    PaymentOrchestratorConfig, PenaltyEngineConfig, ReconcileConfig, RetryPolicy,
};
use crate::outbound::stripe::STRIPE_API_BASE;

const DEFAULT_CURRENCY: &str = "usd";
const DEFAULT_HTTP_TIMEOUT_SECS: u64 = 30;
const DEFAULT_RETRY_INTERVAL_HOURS: u64 = 24;
const DEFAULT_RECONCILE_GRACE_MINUTES: u64 = 60;
const DEFAULT_STALE_AFTER_HOURS: u64 = 48;
const DEFAULT_MAX_CONCURRENCY: usize = 8;
const DEFAULT_BATCH_LIMIT: usize = 500;
const DEFAULT_POOL_SIZE: u32 = 10;
/// Longest configurable time window: one hundred years.
const MAX_WINDOW_MINUTES: u64 = 100 * 366 * 24 * 60;

/// Environment variable consulted when no engine-specific URL is set.
pub const DATABASE_URL_FALLBACK: &str = "DATABASE_URL";

/// Required settings that were not supplied or could not be parsed.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum SettingsError {
    #[error("no database URL: set PENALTY_ENGINE_DATABASE_URL or DATABASE_URL")]
    MissingDatabaseUrl,
    #[error("no Stripe secret key: set PENALTY_ENGINE_STRIPE_SECRET_KEY")]
    MissingStripeSecretKey,
    #[error("invalid Stripe API base '{value}': {message}")]
    InvalidStripeApiBase { value: String, message: String },
}

/// Configuration for the batch commands.
#[derive(Clone, Deserialize, OrthoConfig)]
#[ortho_config(prefix = "PENALTY_ENGINE")]
pub struct EngineSettings {
    /// PostgreSQL connection string.
    pub database_url: Option<String>,
    /// Stripe secret key used as the bearer token.
    pub stripe_secret_key: Option<String>,
    /// Stripe API origin; defaults to the production API.
    pub stripe_api_base: Option<String>,
    /// ISO currency code for every charge.
    pub currency: Option<String>,
    /// Timeout for each processor HTTP call, in seconds.
    pub http_timeout_secs: Option<u64>,
    /// Failed attempts after which a penalty is no longer retried.
    #[ortho_config(default = 3)]
    pub max_retries: u32,
    pub retry_interval_hours: Option<u64>,
    /// Minimum age of a `processing` penalty before reconcile polls it.
    pub reconcile_grace_minutes: Option<u64>,
    /// Age after which an unresolved intent is flagged for manual review.
    pub stale_after_hours: Option<u64>,
    pub max_concurrency: Option<usize>,
    /// Maximum rows per retry or reconcile batch.
    pub batch_limit: Option<usize>,
    pub pool_size: Option<u32>,
}

impl fmt::Debug for EngineSettings {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EngineSettings")
            .field("database_url", &self.database_url.as_ref().map(|_| "<set>"))
            .field(
                "stripe_secret_key",
                &self.stripe_secret_key.as_ref().map(|_| "<redacted>"),
            )
            .field("stripe_api_base", &self.stripe_api_base)
            .field("currency", &self.currency)
            .field("http_timeout_secs", &self.http_timeout_secs)
            .field("max_retries", &self.max_retries)
            .field("retry_interval_hours", &self.retry_interval_hours)
            .field("reconcile_grace_minutes", &self.reconcile_grace_minutes)
            .field("stale_after_hours", &self.stale_after_hours)
            .field("max_concurrency", &self.max_concurrency)
            .field("batch_limit", &self.batch_limit)
            .field("pool_size", &self.pool_size)
            .finish()
    }
}

fn hours(value: u64) -> TimeDelta {
    minutes(value.saturating_mul(60))
}

fn minutes(value: u64) -> TimeDelta {
    let clamped = value.min(MAX_WINDOW_MINUTES);
    i64::try_from(clamped)
        .ok()
        .and_then(TimeDelta::try_minutes)
        .unwrap_or(TimeDelta::MAX)
}

impl EngineSettings {
    /// Database URL, falling back to `DATABASE_URL`.
    pub fn database_url(&self) -> Result<String, SettingsError> {
        self.database_url
            .clone()
            .filter(|url| !url.trim().is_empty())
            .or_else(|| std::env::var(DATABASE_URL_FALLBACK).ok())
            .filter(|url| !url.trim().is_empty())
            .ok_or(SettingsError::MissingDatabaseUrl)
    }

    /// Stripe secret key, wiped from memory when dropped.
    pub fn stripe_secret_key(&self) -> Result<Zeroizing<String>, SettingsError> {
        self.stripe_secret_key
            .as_deref()
            .map(str::trim)
            .filter(|key| !key.is_empty())
            .map(|key| Zeroizing::new(key.to_owned()))
            .ok_or(SettingsError::MissingStripeSecretKey)
    }

    pub fn stripe_api_base(&self) -> Result<Url, SettingsError> {
        let value = self.stripe_api_base.as_deref().unwrap_or(STRIPE_API_BASE);
        Url::parse(value).map_err(|err| SettingsError::InvalidStripeApiBase {
            value: value.to_owned(),
            message: err.to_string(),
        })
    }

    pub fn currency(&self) -> String {
        self.currency
            .as_deref()
            .map(str::trim)
            .filter(|currency| !currency.is_empty())
            .unwrap_or(DEFAULT_CURRENCY)
            .to_ascii_lowercase()
    }

    pub fn http_timeout(&self) -> Duration {
        Duration::from_secs(self.http_timeout_secs.unwrap_or(DEFAULT_HTTP_TIMEOUT_SECS))
    }

    pub fn max_retries(&self) -> u32 {
        self.max_retries
    }

    pub fn retry_interval(&self) -> TimeDelta {
        hours(
            self.retry_interval_hours
                .unwrap_or(DEFAULT_RETRY_INTERVAL_HOURS),
        )
    }

    pub fn reconcile_grace(&self) -> TimeDelta {
        minutes(
            self.reconcile_grace_minutes
                .unwrap_or(DEFAULT_RECONCILE_GRACE_MINUTES),
        )
    }

    pub fn stale_after(&self) -> TimeDelta {
        hours(self.stale_after_hours.unwrap_or(DEFAULT_STALE_AFTER_HOURS))
    }

    /// Concurrency bound, never below one.
    pub fn max_concurrency(&self) -> usize {
        self.max_concurrency
            .unwrap_or(DEFAULT_MAX_CONCURRENCY)
            .max(1)
    }

    pub fn batch_limit(&self) -> usize {
        self.batch_limit.unwrap_or(DEFAULT_BATCH_LIMIT).max(1)
    }

    pub fn pool_size(&self) -> u32 {
        self.pool_size.unwrap_or(DEFAULT_POOL_SIZE)
    }

    /// Assemble the engine configuration from these settings.
    pub fn engine_config(&self) -> PenaltyEngineConfig {
        let http_timeout = self.http_timeout();
        PenaltyEngineConfig {
            orchestrator: PaymentOrchestratorConfig {
                currency: self.currency(),
                charge_timeout: http_timeout,
            },
            retry: RetryPolicy {
                max_retries: self.max_retries(),
                interval: self.retry_interval(),
            },
            reconcile: ReconcileConfig {
                grace: self.reconcile_grace(),
                stale_after: self.stale_after(),
                lookup_timeout: http_timeout,
            },
            max_concurrency: self.max_concurrency(),
            batch_limit: self.batch_limit(),
        }
    }
}
