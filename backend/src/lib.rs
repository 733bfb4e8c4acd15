//! Pair monitoring service: environment configuration, market data
//! collaborators and the statistics refresh that feed the monitors.

pub mod config;
pub mod error;
pub mod feed;
pub mod stats;
pub mod window_store;
