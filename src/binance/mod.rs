pub mod client;

// Re-export the client for convenient access (e.g. `use crate::binance::FuturesClient`).
pub use client::FuturesClient;
