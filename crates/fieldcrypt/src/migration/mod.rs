//! Batched, re-runnable row migration.
//!
//! [`migrate`] walks a table in primary-key order `batch_size` rows at a time,
//! applies a caller transform to each decoded record and writes every batch
//! back in one atomic store call. Encryption happens as a side effect of that
//! write whenever the transform fills a column carrying a
//! [`FieldSerializer`](crate::serializer::FieldSerializer).
//!
//! # Re-running
//!
//! The engine keeps no progress of its own. A run that stops early leaves
//! every earlier batch committed; to resume, call [`migrate`] again with a
//! filter that only matches rows still needing the transform, for example
//! `Filter::is_null("encrypted_text")`. A filter that does not exclude
//! migrated rows will transform them a second time.

pub mod options;

pub use options::{MigrationOptions, DEFAULT_BATCH_SIZE};

use std::fmt;

use thiserror::Error;
use tracing::{debug, info, warn};

use crate::cryptor::CallContext;
use crate::store::{Filter, Key, Record, StoreError, Table};

/// Where a migration run is, or where it stopped.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MigrationPhase {
    Idle,
    Reading(usize),
    Transforming(usize),
    Writing(usize),
    Done,
    Failed,
}

impl fmt::Display for MigrationPhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            MigrationPhase::Idle => f.write_str("idle"),
            MigrationPhase::Reading(n) => write!(f, "reading batch {n}"),
            MigrationPhase::Transforming(n) => write!(f, "transforming batch {n}"),
            MigrationPhase::Writing(n) => write!(f, "writing batch {n}"),
            MigrationPhase::Done => f.write_str("done"),
            MigrationPhase::Failed => f.write_str("failed"),
        }
    }
}

#[derive(Debug, Error)]
pub enum MigrationError {
    #[error("batch size must be positive")]
    InvalidBatchSize,

    /// A read projection without a write projection would overwrite every
    /// column that was not loaded.
    #[error("read_columns requires write_columns")]
    ReadProjectionWithoutWriteProjection,

    /// A batch could not be read or written. Earlier batches stay committed.
    #[error("migration stopped while {phase}")]
    Batch {
        batch: usize,
        phase: MigrationPhase,
        #[source]
        source: StoreError,
    },
}

/// Outcome of one [`migrate`] call.
#[derive(Debug)]
#[must_use]
pub struct MigrationReport {
    /// Rows written by every committed batch.
    pub rows_affected: u64,
    /// Number of committed batches.
    pub batches: usize,
    /// The error that stopped the run, if it did not finish.
    pub error: Option<MigrationError>,
}

impl MigrationReport {
    pub fn is_success(&self) -> bool {
        self.error.is_none()
    }

    /// The rows affected, or the error that stopped the run.
    pub fn into_result(self) -> Result<u64, MigrationError> {
        match self.error {
            None => Ok(self.rows_affected),
            Some(err) => Err(err),
        }
    }
}

/// Progress through the table for a single run.
struct BatchCursor {
    after: Option<Key>,
    rows_affected: u64,
    batches: usize,
    phase: MigrationPhase,
}

impl BatchCursor {
    fn new() -> Self {
        Self {
            after: None,
            rows_affected: 0,
            batches: 0,
            phase: MigrationPhase::Idle,
        }
    }

    fn next_batch(&self) -> usize {
        self.batches + 1
    }

    fn commit(&mut self, written: u64, last_key: Option<Key>) {
        self.rows_affected += written;
        self.batches += 1;
        self.after = last_key;
    }

    fn finish(mut self, table: &str) -> MigrationReport {
        self.phase = MigrationPhase::Done;
        info!(
            table,
            phase = %self.phase,
            batches = self.batches,
            rows_affected = self.rows_affected,
            "migration finished"
        );
        MigrationReport {
            rows_affected: self.rows_affected,
            batches: self.batches,
            error: None,
        }
    }

    fn fail(self, table: &str, source: StoreError) -> MigrationReport {
        let batch = self.next_batch();
        warn!(
            table,
            batch,
            phase = %MigrationPhase::Failed,
            failed_while = %self.phase,
            rows_affected = self.rows_affected,
            error = %source,
            "migration stopped"
        );
        MigrationReport {
            rows_affected: self.rows_affected,
            batches: self.batches,
            error: Some(MigrationError::Batch {
                batch,
                phase: self.phase,
                source,
            }),
        }
    }
}

/// Run `transform` over every row of `table` matching `filter`.
///
/// Batches are processed strictly one after another: read, transform, then a
/// single atomic write. A batch shorter than `batch_size` ends the run.
///
/// Never returns an error directly. Invalid options, or a read or write
/// failure, are reported in [`MigrationReport::error`] together with the rows
/// already committed.
pub async fn migrate<T, F>(
    table: &Table<T>,
    ctx: &CallContext,
    filter: &Filter,
    mut transform: F,
    options: &MigrationOptions,
) -> MigrationReport
where
    T: Record,
    F: FnMut(&mut T),
{
    if let Err(err) = options.validate() {
        return MigrationReport {
            rows_affected: 0,
            batches: 0,
            error: Some(err),
        };
    }

    let table_name = table.schema().name();
    let mut cursor = BatchCursor::new();

    loop {
        let batch = cursor.next_batch();

        cursor.phase = MigrationPhase::Reading(batch);
        let page = match table
            .read_batch(
                ctx,
                filter,
                cursor.after.as_ref(),
                options.batch_size,
                options.read_columns.as_deref(),
            )
            .await
        {
            Ok(page) => page,
            Err(err) => return cursor.fail(table_name, err),
        };
        let fetched = page.records.len();
        if fetched == 0 {
            break;
        }

        cursor.phase = MigrationPhase::Transforming(batch);
        let mut records = page.records;
        records.iter_mut().for_each(&mut transform);

        cursor.phase = MigrationPhase::Writing(batch);
        let written = match table
            .save_batch(ctx, &records, options.write_columns.as_deref())
            .await
        {
            Ok(written) => written,
            Err(err) => return cursor.fail(table_name, err),
        };
        cursor.commit(written, page.last_key);

        let rows_affected = cursor.rows_affected;
        if options.verbose {
            info!(table = table_name, batch, rows = written, rows_affected, "batch committed");
        } else {
            debug!(table = table_name, batch, rows = written, rows_affected, "batch committed");
        }

        if fetched < options.batch_size {
            break;
        }
    }

    cursor.finish(table_name)
}
