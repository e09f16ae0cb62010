//! Burn/mint bridge relayer - Library interface
//!
//! Watches `TokensBurned` on the listened chain and relays a sponsored
//! `mint` for each burn to the paired chain. Modules are public for the
//! binary and the integration tests.

pub mod config;
pub mod contracts;
pub mod db;
pub mod invocation;
pub mod metrics;
pub mod redact;
pub mod server;
pub mod types;
pub mod watcher;
pub mod writers;
