//! Telemetry initialisation for the backfill binary.
//!
//! One JSON object per event on stdout, with event fields flattened to the top
//! level so `batch` and `rows_affected` can be filtered on directly.
//! `RUST_LOG` overrides the configured level.
//!
//! # Telemetry invariants
//!
//! - **No plaintext, ciphertext or credentials** may appear in any log field.

use anyhow::Result;
use tracing_subscriber::EnvFilter;

/// Install the global JSON subscriber at `log_level`.
///
/// # Errors
///
/// Returns an error if a global subscriber is already installed.
pub fn init(log_level: &str) -> Result<()> {
    let filter = match EnvFilter::try_from_default_env() {
        Ok(filter) => filter,
        Err(_) => EnvFilter::try_new(log_level)
            .map_err(|e| anyhow::anyhow!("invalid log level {log_level:?}: {e}"))?,
    };

    tracing_subscriber::fmt()
        .json()
        .flatten_event(true)
        .with_env_filter(filter)
        .try_init()
        .map_err(|e| anyhow::anyhow!("failed to install backfill tracing subscriber: {e}"))
}
