pub mod client;
pub mod keys;
pub mod receipts;

pub use client::{HttpLedgerClient, LedgerClient, LedgerMatch};
pub use receipts::{HttpReceiptOracle, ReceiptOracle, TxStatus};
