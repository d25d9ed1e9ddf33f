pub mod client;

pub use client::{HostingProvider, HttpHostingProvider, ProviderMatchStatus};
