//! Logging setup for hosts embedding the broker

use crate::error::{BrokerError, Result};

/// Install a global `fmt` subscriber
///
/// `RUST_LOG` wins over `default_filter` when set. Fails if a global
/// subscriber is already installed.
pub fn init_tracing(default_filter: &str) -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(default_filter)),
        )
        .try_init()
        .map_err(|e| {
            BrokerError::Configuration(format!("Failed to install tracing subscriber: {}", e))
        })
}
