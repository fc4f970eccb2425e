//! Sentinel daemon library.
//!
//! Exposes the daemon's modules for integration testing.
//! In production, `sentinel-daemon` is used as a binary (main.rs).

pub mod api;
pub mod cli;
pub mod health;
pub mod logging;
pub mod metrics_server;
pub mod orchestrator;
