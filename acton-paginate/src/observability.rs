//! Structured logging setup

use tracing_subscriber::EnvFilter;

use crate::{
    config::Config,
    error::{Error, Result},
};

/// Install a JSON `tracing` subscriber filtered by `service.log_level`
///
/// Accepts any `EnvFilter` directive (`debug`, `acton_paginate=trace,info`);
/// an unparsable level falls back to `info`. Fails if a global subscriber is
/// already installed.
pub fn init_tracing(config: &Config) -> Result<()> {
    let filter = EnvFilter::try_new(&config.service.log_level)
        .unwrap_or_else(|_| EnvFilter::new("info"));

    tracing_subscriber::fmt()
        .json()
        .with_env_filter(filter)
        .try_init()
        .map_err(|e| Error::Internal(format!("Failed to initialize tracing: {}", e)))?;

    tracing::info!("Tracing initialized for service: {}", config.service.name);

    Ok(())
}
