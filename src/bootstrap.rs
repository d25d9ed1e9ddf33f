use sqlx::{postgres::PgPoolOptions, PgPool};
use std::{sync::Arc, time::Duration};
use tracing::info;

use crate::{
    api::handler::AppState,
    config::Config,
    error::AppResult,
    ledger::{HttpLedgerClient, HttpReceiptOracle, LedgerClient, ReceiptOracle},
    matches::{MatchStore, PgMatchStore},
    provider::{HostingProvider, HttpHostingProvider},
    settlement::{
        ExecutorConfig, Janitor, LockManager, Reconciler, SettlementExecutor, SettlementPipeline,
    },
};

pub async fn initialize_app_state(config: &Config) -> AppResult<AppState> {
    info!("Initializing application components ...");

    let pool = initialize_database(&config.database_url).await?;

    let store: Arc<dyn MatchStore> = Arc::new(PgMatchStore::new(pool.clone()));
    let ledger: Arc<dyn LedgerClient> =
        Arc::new(HttpLedgerClient::new(config.ledger_rpc_url.clone()));
    let receipts: Arc<dyn ReceiptOracle> =
        Arc::new(HttpReceiptOracle::new(config.ledger_rpc_url.clone()));
    let provider: Arc<dyn HostingProvider> = Arc::new(HttpHostingProvider::new(
        config.provider_api_url.clone(),
        config.provider_api_key.clone(),
    ));
    info!("✅ Ledger gateway at {}", config.ledger_rpc_url);

    let reconciler = Reconciler::new(store.clone(), ledger.clone(), receipts.clone());
    let locks = LockManager::new(
        store.clone(),
        config.lock_staleness,
        config.max_settlement_attempts,
    );
    let executor = SettlementExecutor::new(
        store.clone(),
        ledger.clone(),
        receipts.clone(),
        provider.clone(),
        ExecutorConfig {
            confirm_poll: config.confirm_poll,
            confirm_budget: config.confirm_budget,
        },
    );
    let pipeline = Arc::new(SettlementPipeline::new(
        store.clone(),
        reconciler,
        locks,
        executor,
    ));

    // Pull path: converges matches whose webhooks never arrived
    let janitor = Janitor::new(
        store.clone(),
        provider,
        pipeline.clone(),
        config.janitor_interval,
        config.stuck_grace,
    );
    tokio::spawn(janitor.run());
    info!("✅ Settlement janitor spawned");

    Ok(AppState {
        store,
        ledger,
        pipeline,
        webhook_secret: config.webhook_secret.clone(),
    })
}

async fn initialize_database(database_url: &str) -> AppResult<PgPool> {
    info!("📊 Connecting to database...");

    let pool = PgPoolOptions::new()
        .max_connections(50)
        .min_connections(5)
        .acquire_timeout(Duration::from_secs(30))
        .idle_timeout(Duration::from_secs(600))
        .max_lifetime(Duration::from_secs(1800))
        .connect(database_url)
        .await?;

    info!("🔄 Running database migrations...");
    sqlx::migrate!("./migrations").run(&pool).await?;

    info!("✓ Database initialized");
    Ok(pool)
}
