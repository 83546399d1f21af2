//! Tunables for a single migration run.

use serde::Deserialize;

use super::MigrationError;

pub const DEFAULT_BATCH_SIZE: usize = 10;

fn default_batch_size() -> usize {
    DEFAULT_BATCH_SIZE
}

/// Batch size and column projections for [`migrate`](super::migrate).
///
/// Deserializable so a binary can load it straight from its configuration
/// source; every field has a default.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct MigrationOptions {
    #[serde(default = "default_batch_size")]
    pub batch_size: usize,

    /// Columns loaded for each row. `None` loads every column.
    ///
    /// Requires `write_columns`: records built from a partial read carry
    /// defaults in every column that was not loaded.
    #[serde(default)]
    pub read_columns: Option<Vec<String>>,

    /// Columns written back for each row. `None` writes the full row.
    #[serde(default)]
    pub write_columns: Option<Vec<String>>,

    /// Log per-batch progress at `info` instead of `debug`.
    #[serde(default)]
    pub verbose: bool,
}

impl Default for MigrationOptions {
    fn default() -> Self {
        Self {
            batch_size: DEFAULT_BATCH_SIZE,
            read_columns: None,
            write_columns: None,
            verbose: false,
        }
    }
}

impl MigrationOptions {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_batch_size(mut self, batch_size: usize) -> Self {
        self.batch_size = batch_size;
        self
    }

    pub fn with_read_columns<I, S>(mut self, columns: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.read_columns = Some(columns.into_iter().map(Into::into).collect());
        self
    }

    pub fn with_write_columns<I, S>(mut self, columns: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.write_columns = Some(columns.into_iter().map(Into::into).collect());
        self
    }

    pub fn with_verbose(mut self, verbose: bool) -> Self {
        self.verbose = verbose;
        self
    }

    /// # Errors
    ///
    /// - [`MigrationError::InvalidBatchSize`] when `batch_size` is zero.
    /// - [`MigrationError::ReadProjectionWithoutWriteProjection`] when
    ///   `read_columns` is set and `write_columns` is not.
    pub fn validate(&self) -> Result<(), MigrationError> {
        if self.batch_size == 0 {
            return Err(MigrationError::InvalidBatchSize);
        }
        if self.read_columns.is_some() && self.write_columns.is_none() {
            return Err(MigrationError::ReadProjectionWithoutWriteProjection);
        }
        Ok(())
    }
}
