//! Private Files Vault - Bulk Workflows
//!
//! Ingest, unlock, catalog load, decode and export over many items at once.
//! Each workflow wraps a single-item [`Vault`] operation and runs it through
//! the batch pipeline; progress arrives on the returned handle.

use std::path::PathBuf;
use std::sync::Arc;

use secrecy::{ExposeSecret, SecretString};

use crate::error::VaultResult;
use crate::item::VaultItem;
use crate::pipeline::{run_batch, BatchHandle, BatchOutcome, BatchStatus};
use crate::vault::{ExportOptions, Vault};

/// Ingest result with the containers that need another password split off
#[derive(Debug)]
pub struct IngestReport {
    pub status: BatchStatus,
    pub processed: Vec<VaultItem>,
    pub failed: Vec<VaultItem>,
    /// Containers sealed under a password other than the vault's; feed
    /// them to [`unlock`] once the user supplies it
    pub foreign: Vec<VaultItem>,
    pub fault: Option<String>,
}

impl From<BatchOutcome<VaultItem>> for IngestReport {
    fn from(outcome: BatchOutcome<VaultItem>) -> Self {
        let (foreign, failed) = outcome
            .failed
            .into_iter()
            .partition(VaultItem::needs_password);

        Self {
            status: outcome.status,
            processed: outcome.processed,
            failed,
            foreign,
            fault: outcome.fault,
        }
    }
}

/// Add user-supplied files and folders to the vault
pub fn ingest(vault: &Arc<Vault>, paths: Vec<PathBuf>) -> BatchHandle<VaultItem> {
    let items = paths.into_iter().map(VaultItem::from_input).collect();
    let worker = Arc::clone(vault);

    log::info!("Ingest started");
    run_batch(items, vault.config(), move |item: &mut VaultItem| {
        let result = worker.ingest_one(item);
        item.set_needs_password(matches!(&result, Err(e) if e.needs_password_retry()));
        result
    })
}

/// Retry foreign containers with a user-supplied password
pub fn unlock(
    vault: &Arc<Vault>,
    items: Vec<VaultItem>,
    password: SecretString,
) -> BatchHandle<VaultItem> {
    let worker = Arc::clone(vault);

    log::info!("Unlock of {} items started", items.len());
    run_batch(items, vault.config(), move |item: &mut VaultItem| {
        let result = worker.unlock_one(item, password.expose_secret());
        item.set_needs_password(matches!(&result, Err(e) if e.needs_password_retry()));
        result
    })
}

/// Rebuild items from the catalog. Entries whose container is missing or
/// has no readable footer are kept and flagged as corrupted.
pub fn load_catalog(vault: &Arc<Vault>) -> VaultResult<BatchHandle<VaultItem>> {
    let items: Vec<VaultItem> = vault
        .catalog()
        .list_all()?
        .iter()
        .map(VaultItem::from_entry)
        .collect();

    log::info!("Loading {} catalog entries", items.len());
    Ok(run_batch(items, vault.config(), |item: &mut VaultItem| {
        let readable = match item.at_rest().path().map(PathBuf::from) {
            Some(path) => item.try_load_footer(&path),
            None => false,
        };
        item.set_corrupted(!readable);
        item.at_rest_mut().invalidate();
        Ok(())
    }))
}

/// Decrypt items into their recovered working copies
pub fn decode(vault: &Arc<Vault>, items: Vec<VaultItem>) -> BatchHandle<VaultItem> {
    let worker = Arc::clone(vault);

    run_batch(items, vault.config(), move |item: &mut VaultItem| {
        worker.decode_one(item).map(|_| ())
    })
}

/// Export items per `options`
pub fn export(
    vault: &Arc<Vault>,
    items: Vec<VaultItem>,
    options: ExportOptions,
) -> BatchHandle<VaultItem> {
    let worker = Arc::clone(vault);

    log::info!("Export of {} items ({:?}) started", items.len(), options.mode);
    run_batch(items, vault.config(), move |item: &mut VaultItem| {
        worker.export_one(item, &options).map(|_| ())
    })
}
