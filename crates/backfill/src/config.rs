//! Configuration loading and validation for the backfill binary.
//!
//! All values are read from `BACKFILL_`-prefixed environment variables at
//! startup. List values are comma separated, e.g.
//! `BACKFILL_WRITE_COLUMNS=first_name_encrypted,last_name_encrypted`.

use anyhow::{Context, Result};
use base64::{engine::general_purpose::STANDARD, Engine as _};
use fieldcrypt::cryptor::local::KEY_LEN;
use fieldcrypt::MigrationOptions;
use serde::Deserialize;

const ENV_PREFIX: &str = "BACKFILL";

/// Validated backfill configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    /// Rows read and written per batch.
    #[serde(default = "default_batch_size")]
    pub batch_size: usize,

    /// Columns loaded for each row. Unset loads every column.
    #[serde(default)]
    pub read_columns: Option<Vec<String>>,

    /// Columns written back for each row. Unset writes the full row.
    #[serde(default)]
    pub write_columns: Option<Vec<String>>,

    /// Log every committed batch at `info`.
    #[serde(default)]
    pub verbose: bool,

    /// Tracing log level (e.g. `"info"`, `"debug"`).
    #[serde(default = "default_log_level")]
    pub log_level: String,

    /// Rows inserted before the first migration pass.
    #[serde(default = "default_seed_rows")]
    pub seed_rows: usize,

    /// Base64 AES-256 key for the local cryptor. A fresh key is generated when unset.
    #[serde(default)]
    pub local_key: Option<String>,

    /// Deadline for every cryptor call made during the run, in seconds.
    #[serde(default = "default_run_timeout")]
    pub run_timeout_secs: u64,

    /// Bearer token the cryptor requires on every call.
    #[serde(default)]
    pub access_token: Option<String>,
}

fn default_batch_size() -> usize {
    fieldcrypt::migration::DEFAULT_BATCH_SIZE
}
fn default_log_level() -> String {
    "info".into()
}
fn default_seed_rows() -> usize {
    24
}
fn default_run_timeout() -> u64 {
    300
}

fn environment() -> config::Environment {
    config::Environment::with_prefix(ENV_PREFIX)
        .try_parsing(true)
        .list_separator(",")
        .with_list_parse_key("read_columns")
        .with_list_parse_key("write_columns")
}

impl Config {
    /// Load and validate configuration from environment variables.
    ///
    /// # Errors
    ///
    /// Returns an error if a variable cannot be parsed or fails validation.
    pub fn from_env() -> Result<Self> {
        Self::load(environment())
    }

    fn load(source: config::Environment) -> Result<Self> {
        let cfg = config::Config::builder()
            .add_source(source)
            .build()
            .context("failed to build configuration from environment")?;

        let c: Config = cfg
            .try_deserialize()
            .context("failed to deserialise configuration")?;

        c.validate()?;
        Ok(c)
    }

    /// Validate all fields, returning a descriptive error on the first failure.
    fn validate(&self) -> Result<()> {
        if self.batch_size == 0 {
            anyhow::bail!("BACKFILL_BATCH_SIZE must be > 0");
        }
        if self.run_timeout_secs == 0 {
            anyhow::bail!("BACKFILL_RUN_TIMEOUT_SECS must be > 0");
        }
        ensure_columns(self.read_columns.as_deref(), "BACKFILL_READ_COLUMNS")?;
        ensure_columns(self.write_columns.as_deref(), "BACKFILL_WRITE_COLUMNS")?;
        if self.read_columns.is_some() && self.write_columns.is_none() {
            anyhow::bail!("BACKFILL_READ_COLUMNS requires BACKFILL_WRITE_COLUMNS");
        }
        if let Some(token) = &self.access_token {
            if token.trim().is_empty() {
                anyhow::bail!("BACKFILL_ACCESS_TOKEN must not be empty when set");
            }
        }
        self.key_bytes()?;
        Ok(())
    }

    /// The decoded local key, if one is configured.
    ///
    /// # Errors
    ///
    /// Returns an error if the key is not base64 or not [`KEY_LEN`] bytes long.
    pub fn key_bytes(&self) -> Result<Option<Vec<u8>>> {
        let Some(encoded) = &self.local_key else {
            return Ok(None);
        };
        let key = STANDARD
            .decode(encoded.trim())
            .context("BACKFILL_LOCAL_KEY must be base64")?;
        if key.len() != KEY_LEN {
            anyhow::bail!("BACKFILL_LOCAL_KEY must decode to {KEY_LEN} bytes, got {}", key.len());
        }
        Ok(Some(key))
    }

    pub fn migration_options(&self) -> MigrationOptions {
        let mut options = MigrationOptions::new()
            .with_batch_size(self.batch_size)
            .with_verbose(self.verbose);
        if let Some(columns) = &self.read_columns {
            options = options.with_read_columns(columns.iter().cloned());
        }
        if let Some(columns) = &self.write_columns {
            options = options.with_write_columns(columns.iter().cloned());
        }
        options
    }
}

fn ensure_columns(columns: Option<&[String]>, name: &str) -> Result<()> {
    match columns {
        Some(columns) if columns.iter().any(|c| c.trim().is_empty()) => {
            anyhow::bail!("{name} must not contain empty column names")
        }
        _ => Ok(()),
    }
}
