use std::time::Duration;

/// Runtime configuration, loaded from environment variables.
///
/// Settlement tuning values (staleness window, attempt ceiling, janitor
/// cadence) are deployment choices, not contract constants, so they all
/// carry env overrides.
#[derive(Debug, Clone)]
pub struct Config {
    pub database_url: String,
    pub bind_address: String,

    /// JSON-RPC gateway for the escrow ledger contract
    pub ledger_rpc_url: String,

    /// Match-hosting provider control plane
    pub provider_api_url: String,
    pub provider_api_key: String,

    /// Shared secret expected in the webhook Authorization header
    pub webhook_secret: String,

    /// A lock older than this is considered abandoned and re-acquirable
    pub lock_staleness: Duration,
    /// Ceiling on settlement attempts before operator intervention
    pub max_settlement_attempts: i32,
    /// Pull-path poll interval
    pub janitor_interval: Duration,
    /// Non-terminal records younger than this are "plausibly in progress"
    pub stuck_grace: Duration,
    /// Receipt polling cadence and total budget while awaiting confirmation
    pub confirm_poll: Duration,
    pub confirm_budget: Duration,
}

impl Config {
    pub fn from_env() -> Self {
        Self {
            database_url: std::env::var("DATABASE_URL")
                .unwrap_or_else(|_| "postgresql://localhost/arena".to_string()),
            bind_address: std::env::var("BIND_ADDRESS")
                .unwrap_or_else(|_| "0.0.0.0:8080".to_string()),
            ledger_rpc_url: std::env::var("LEDGER_RPC_URL")
                .unwrap_or_else(|_| "http://localhost:8545".to_string()),
            provider_api_url: std::env::var("PROVIDER_API_URL")
                .unwrap_or_else(|_| "https://api.matchhosting.example".to_string()),
            provider_api_key: std::env::var("PROVIDER_API_KEY").unwrap_or_default(),
            webhook_secret: std::env::var("WEBHOOK_SECRET").unwrap_or_default(),
            lock_staleness: Duration::from_secs(env_u64("LOCK_STALENESS_SECS", 120)),
            max_settlement_attempts: env_u64("MAX_SETTLEMENT_ATTEMPTS", 10) as i32,
            janitor_interval: Duration::from_secs(env_u64("JANITOR_INTERVAL_SECS", 30)),
            stuck_grace: Duration::from_secs(env_u64("STUCK_GRACE_SECS", 600)),
            confirm_poll: Duration::from_secs(env_u64("CONFIRM_POLL_SECS", 2)),
            confirm_budget: Duration::from_secs(env_u64("CONFIRM_BUDGET_SECS", 60)),
        }
    }
}

fn env_u64(name: &str, default: u64) -> u64 {
    std::env::var(name)
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(default)
}
