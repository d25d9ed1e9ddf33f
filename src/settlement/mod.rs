//! The settlement reconciliation core: every path that can finalize a match
//! funnels through Reconciler → LockManager → SettlementExecutor.

pub mod executor;
pub mod janitor;
pub mod lock;
pub mod pipeline;
pub mod reconciler;

#[cfg(test)]
pub(crate) mod mock;

pub use executor::{ExecutorConfig, SettlementExecutor};
pub use janitor::Janitor;
pub use lock::LockManager;
pub use pipeline::{SettlementDecision, SettlementPipeline};
pub use reconciler::Reconciler;
