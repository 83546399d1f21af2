//! `backfill`: seeds a `users` table and migrates its plaintext name columns
//! into encrypted ones, twice, to show a re-run only touches new rows.
//!
//! Startup sequence:
//! 1. Load and validate [`Config`] from environment variables.
//! 2. Initialise the tracing subscriber.
//! 3. Build the cryptor and the [`FieldSerializer`].
//! 4. Open the in-memory store and the `users` table.
//! 5. Build the run's [`CallContext`]: token, deadline, Ctrl-C cancellation.
//! 6. Seed, migrate, top up, migrate again.
//! 7. Read a row back through the serializer.

mod config;
mod telemetry;
mod users;

use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use fieldcrypt::store::{Filter, MemoryStore};
use fieldcrypt::{migrate, CallContext, FieldSerializer, LocalCryptor};
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use config::Config;

#[tokio::main]
async fn main() -> Result<()> {
    // -----------------------------------------------------------------------
    // 1. Configuration
    // -----------------------------------------------------------------------
    let cfg = Config::from_env().map_err(|e| {
        // Telemetry is not yet up; write to stderr directly.
        eprintln!("ERROR: configuration invalid: {e:#}");
        e
    })?;

    // -----------------------------------------------------------------------
    // 2. Telemetry
    // -----------------------------------------------------------------------
    telemetry::init(&cfg.log_level)?;
    info!(
        version = env!("CARGO_PKG_VERSION"),
        batch_size = cfg.batch_size,
        seed_rows = cfg.seed_rows,
        "backfill starting"
    );

    // -----------------------------------------------------------------------
    // 3. Cryptor
    // -----------------------------------------------------------------------
    let cryptor = match cfg.key_bytes()? {
        Some(key) => LocalCryptor::new(&key).context("failed to load BACKFILL_LOCAL_KEY")?,
        None => {
            warn!("BACKFILL_LOCAL_KEY not set; using a throwaway key");
            LocalCryptor::generate()
        }
    };
    let cryptor = match &cfg.access_token {
        Some(token) => cryptor.with_required_token(token.clone()),
        None => cryptor,
    };
    let serializer = FieldSerializer::new(Arc::new(cryptor));

    // -----------------------------------------------------------------------
    // 4. Store
    // -----------------------------------------------------------------------
    let store = MemoryStore::new();
    let table = users::table(Arc::new(store.clone()), &serializer)
        .context("failed to build users table")?;

    // -----------------------------------------------------------------------
    // 5. Call context
    // -----------------------------------------------------------------------
    let cancel = CancellationToken::new();
    let _ctrl_c = tokio::spawn({
        let cancel = cancel.clone();
        async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                warn!("interrupt received; cancelling outstanding cryptor calls");
                cancel.cancel();
            }
        }
    });
    let mut ctx = CallContext::new()
        .with_timeout(Duration::from_secs(cfg.run_timeout_secs))
        .with_cancellation(cancel);
    if let Some(token) = &cfg.access_token {
        ctx = ctx.with_token(token.clone());
    }

    // -----------------------------------------------------------------------
    // 6. Seed and migrate
    // -----------------------------------------------------------------------
    let options = cfg.migration_options();
    let pending = users::unencrypted();

    users::seed(&table, &ctx, 1, cfg.seed_rows)
        .await
        .context("failed to seed users")?;
    let first = migrate(&table, &ctx, &pending, users::encrypt_names, &options)
        .await
        .into_result()
        .context("first migration pass failed")?;
    info!(table = users::TABLE, rows_affected = first, "first pass complete");

    let top_up = cfg.seed_rows * 3 / 4;
    users::seed(&table, &ctx, cfg.seed_rows as i64 + 1, top_up)
        .await
        .context("failed to add users")?;
    let second = migrate(&table, &ctx, &pending, users::encrypt_names, &options)
        .await
        .into_result()
        .context("second migration pass failed")?;
    info!(table = users::TABLE, rows_affected = second, "second pass complete");

    // -----------------------------------------------------------------------
    // 7. Verify
    // -----------------------------------------------------------------------
    let remaining = table.find(&ctx, &pending).await?.len();
    let sample = table.first(&ctx, &Filter::All).await?;
    let round_trips = sample.as_ref().map_or(true, |u| {
        u.first_name_encrypted.as_deref() == Some(u.first_name.as_str())
            && u.last_name_encrypted.as_deref() == Some(u.last_name.as_str())
    });
    info!(
        table = users::TABLE,
        rows = store.row_count(users::TABLE).await,
        remaining,
        round_trips,
        "backfill finished"
    );
    if remaining > 0 || !round_trips {
        anyhow::bail!("backfill verification failed: {remaining} rows still unmigrated");
    }

    Ok(())
}
