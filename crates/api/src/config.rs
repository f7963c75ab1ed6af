//! Server configuration, loaded from environment variables.

use anyhow::Context;

#[derive(Debug, Clone)]
pub struct Config {
    pub bind_address: String,
    /// Shared secret for webhook signature verification. May be empty in
    /// dev; the webhook endpoint then refuses all deliveries with a
    /// configuration error instead of accepting unsigned input.
    pub webhook_secret: String,
    pub invite_ttl_days: i64,
    pub trial_days: i64,
    /// Interval of the in-process invite expiry sweep.
    pub sweep_interval_secs: u64,
    /// Suggested client poll cadence for the pending-invites projection.
    /// Explicit configuration, surfaced in the response envelope.
    pub poll_interval_secs: u64,
    pub poll_jitter_secs: u64,
    pub allowed_origins: Vec<String>,
}

fn env_or(key: &str, default: &str) -> String {
    std::env::var(key).unwrap_or_else(|_| default.to_string())
}

fn env_parse<T: std::str::FromStr>(key: &str, default: T) -> anyhow::Result<T>
where
    T::Err: std::error::Error + Send + Sync + 'static,
{
    match std::env::var(key) {
        Ok(raw) => raw
            .trim()
            .parse::<T>()
            .with_context(|| format!("invalid {key}")),
        Err(_) => Ok(default),
    }
}

impl Config {
    pub fn from_env() -> anyhow::Result<Self> {
        Ok(Self {
            bind_address: env_or("BIND_ADDRESS", "0.0.0.0:8080"),
            webhook_secret: env_or("BILLING_WEBHOOK_SECRET", ""),
            invite_ttl_days: env_parse("INVITE_TTL_DAYS", 7)?,
            trial_days: env_parse("TRIAL_DAYS", 14)?,
            sweep_interval_secs: env_parse("INVITE_SWEEP_INTERVAL_SECS", 300)?,
            poll_interval_secs: env_parse("PENDING_INVITES_POLL_SECS", 30)?,
            poll_jitter_secs: env_parse("PENDING_INVITES_POLL_JITTER_SECS", 5)?,
            allowed_origins: env_or(
                "ALLOWED_ORIGINS",
                "http://localhost:3000,http://127.0.0.1:3000",
            )
            .split(',')
            .map(|s| s.trim().to_string())
            .filter(|s| !s.is_empty())
            .collect(),
        })
    }
}
