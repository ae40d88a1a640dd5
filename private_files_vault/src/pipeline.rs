//! Private Files Vault - Batch Pipeline
//!
//! Applies one operation to many items. The input is cut into packages of
//! `package_size` items, processed strictly one after another on a
//! background thread. Each package is cut again into chunks of
//! `parallelism` items; a chunk runs one worker per item and is waited for
//! as a whole before the next chunk starts.
//!
//! A failing (or panicking) operation only fails its own item. The batch
//! itself fails only when the packaging loop breaks.
//!
//! There is no cancellation: paused/stopped are labels, and workers that
//! have started always run to completion.

use std::panic::{self, AssertUnwindSafe};
use std::thread::{self, JoinHandle};

use crossbeam_channel::{bounded, Receiver, Sender};
use parking_lot::Mutex;

use crate::config::VaultConfig;
use crate::error::{VaultError, VaultResult};
use crate::item::{ItemStatus, VaultItem};

/// Something the pipeline can drive
pub trait PipelineItem: Send {
    /// Stable identifier used in progress events
    fn id(&self) -> String;
    fn set_status(&mut self, status: ItemStatus);
    fn set_error(&mut self, error: Option<String>);
}

impl PipelineItem for VaultItem {
    fn id(&self) -> String {
        VaultItem::id(self).to_string()
    }

    fn set_status(&mut self, status: ItemStatus) {
        VaultItem::set_status(self, status);
    }

    fn set_error(&mut self, error: Option<String>) {
        VaultItem::set_error(self, error);
    }
}

/// Whole-batch result
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BatchStatus {
    /// The loop ran to the end (individual items may still have failed)
    Processed,
    /// The loop itself faulted
    Failed,
}

/// Progress reported while a batch runs
#[derive(Debug)]
pub enum BatchEvent<T> {
    /// An item entered `Processing`, or finished as `Processed` / `Failed`
    Item {
        ordinal: usize,
        id: String,
        status: ItemStatus,
        error: Option<String>,
    },
    /// A package completed; its items are handed back in input order
    Package {
        index: usize,
        processed: Vec<T>,
        failed: Vec<T>,
    },
    /// Always the last event
    Finished {
        status: BatchStatus,
        fault: Option<String>,
    },
}

/// Everything a batch produced
#[derive(Debug)]
pub struct BatchOutcome<T> {
    pub status: BatchStatus,
    pub processed: Vec<T>,
    pub failed: Vec<T>,
    pub fault: Option<String>,
}

impl<T> BatchOutcome<T> {
    pub fn is_processed(&self) -> bool {
        self.status == BatchStatus::Processed
    }
}

/// Handle to a running batch
pub struct BatchHandle<T> {
    events: Receiver<BatchEvent<T>>,
    thread: Option<JoinHandle<()>>,
}

impl<T> BatchHandle<T> {
    /// Live event stream. Events are delivered in order; package N is
    /// reported before package N+1 starts.
    pub fn events(&self) -> &Receiver<BatchEvent<T>> {
        &self.events
    }

    /// Drain the remaining events and collect the outcome
    pub fn wait(mut self) -> BatchOutcome<T> {
        let mut outcome = BatchOutcome {
            status: BatchStatus::Failed,
            processed: Vec::new(),
            failed: Vec::new(),
            fault: None,
        };
        let mut finished = false;

        for event in self.events.iter() {
            match event {
                BatchEvent::Item { .. } => {}
                BatchEvent::Package {
                    processed, failed, ..
                } => {
                    outcome.processed.extend(processed);
                    outcome.failed.extend(failed);
                }
                BatchEvent::Finished { status, fault } => {
                    outcome.status = status;
                    outcome.fault = fault;
                    finished = true;
                    break;
                }
            }
        }

        if let Some(thread) = self.thread.take() {
            if thread.join().is_err() && outcome.fault.is_none() {
                outcome.fault = Some("batch thread panicked".into());
                outcome.status = BatchStatus::Failed;
            }
        }

        if !finished && outcome.fault.is_none() {
            outcome.fault = Some("batch ended without completion".into());
        }

        outcome
    }
}

/// Start a batch on a background thread
pub fn run_batch<T, F>(mut items: Vec<T>, config: &VaultConfig, op: F) -> BatchHandle<T>
where
    T: PipelineItem + 'static,
    F: Fn(&mut T) -> VaultResult<()> + Send + Sync + 'static,
{
    let package_size = config.package_size();
    let parallelism = config.parallelism();

    let (tx, rx) = bounded(package_size);

    for item in items.iter_mut() {
        item.set_status(ItemStatus::Queued);
        item.set_error(None);
    }

    let loop_tx = tx.clone();
    let spawned = thread::Builder::new()
        .name("vault-batch".into())
        .spawn(move || {
            let result = panic::catch_unwind(AssertUnwindSafe(|| {
                package_loop(items, package_size, parallelism, &op, &loop_tx)
            }));

            let (status, fault) = match result {
                Ok(Ok(())) => (BatchStatus::Processed, None),
                Ok(Err(e)) => (BatchStatus::Failed, Some(e.to_string())),
                Err(panic) => (BatchStatus::Failed, Some(panic_message(panic.as_ref()))),
            };

            log::info!("Batch finished: {:?}", status);
            let _ = loop_tx.send(BatchEvent::Finished { status, fault });
        });

    let thread = match spawned {
        Ok(handle) => Some(handle),
        Err(e) => {
            log::warn!("Could not start batch thread: {}", e);
            let _ = tx.send(BatchEvent::Finished {
                status: BatchStatus::Failed,
                fault: Some(VaultError::PipelineFault(e.to_string()).to_string()),
            });
            None
        }
    };

    BatchHandle { events: rx, thread }
}

/// Run a batch and block until it completes
pub fn run_batch_blocking<T, F>(items: Vec<T>, config: &VaultConfig, op: F) -> BatchOutcome<T>
where
    T: PipelineItem + 'static,
    F: Fn(&mut T) -> VaultResult<()> + Send + Sync + 'static,
{
    run_batch(items, config, op).wait()
}

fn package_loop<T, F>(
    items: Vec<T>,
    package_size: usize,
    parallelism: usize,
    op: &F,
    tx: &Sender<BatchEvent<T>>,
) -> VaultResult<()>
where
    T: PipelineItem,
    F: Fn(&mut T) -> VaultResult<()> + Sync,
{
    let total = items.len();
    log::info!(
        "Batch of {} items (packages of {}, chunks of {})",
        total,
        package_size,
        parallelism
    );

    let mut pending = items.into_iter().enumerate().peekable();
    let mut index = 0;

    while pending.peek().is_some() {
        let package: Vec<(usize, T)> = pending.by_ref().take(package_size).collect();

        // Shared by every worker of the package
        let processed = Mutex::new(Vec::with_capacity(package.len()));
        let failed = Mutex::new(Vec::new());

        let mut package = package.into_iter().peekable();
        while package.peek().is_some() {
            let chunk: Vec<(usize, T)> = package.by_ref().take(parallelism).collect();
            run_chunk(chunk, op, tx, &processed, &failed)?;
        }

        let mut processed = processed.into_inner();
        let mut failed = failed.into_inner();
        processed.sort_by_key(|(ordinal, _)| *ordinal);
        failed.sort_by_key(|(ordinal, _)| *ordinal);

        log::info!(
            "Package {} done: {} processed, {} failed",
            index,
            processed.len(),
            failed.len()
        );

        tx.send(BatchEvent::Package {
            index,
            processed: processed.into_iter().map(|(_, item)| item).collect(),
            failed: failed.into_iter().map(|(_, item)| item).collect(),
        })
        .map_err(|_| VaultError::PipelineFault("progress receiver dropped".into()))?;

        index += 1;
    }

    Ok(())
}

fn run_chunk<T, F>(
    chunk: Vec<(usize, T)>,
    op: &F,
    tx: &Sender<BatchEvent<T>>,
    processed: &Mutex<Vec<(usize, T)>>,
    failed: &Mutex<Vec<(usize, T)>>,
) -> VaultResult<()>
where
    T: PipelineItem,
    F: Fn(&mut T) -> VaultResult<()> + Sync,
{
    thread::scope(|scope| -> VaultResult<()> {
        let mut workers = Vec::with_capacity(chunk.len());

        for (ordinal, item) in chunk {
            let worker = thread::Builder::new()
                .name(format!("vault-worker-{}", ordinal))
                .spawn_scoped(scope, move || {
                    let (ordinal, item, ok) = run_item(ordinal, item, op, tx);
                    if ok {
                        processed.lock().push((ordinal, item));
                    } else {
                        failed.lock().push((ordinal, item));
                    }
                })
                .map_err(|e| VaultError::PipelineFault(format!("worker spawn failed: {}", e)))?;
            workers.push(worker);
        }

        for worker in workers {
            worker
                .join()
                .map_err(|_| VaultError::PipelineFault("worker thread panicked".into()))?;
        }
        Ok(())
    })
}

fn run_item<T, F>(
    ordinal: usize,
    mut item: T,
    op: &F,
    tx: &Sender<BatchEvent<T>>,
) -> (usize, T, bool)
where
    T: PipelineItem,
    F: Fn(&mut T) -> VaultResult<()>,
{
    let id = item.id();
    item.set_status(ItemStatus::Processing);
    let _ = tx.send(BatchEvent::Item {
        ordinal,
        id: id.clone(),
        status: ItemStatus::Processing,
        error: None,
    });

    let result = match panic::catch_unwind(AssertUnwindSafe(|| op(&mut item))) {
        Ok(result) => result.map_err(|e| e.to_string()),
        Err(panic) => Err(format!("operation panicked: {}", panic_message(panic.as_ref()))),
    };

    let (status, error) = match result {
        Ok(()) => (ItemStatus::Processed, None),
        Err(e) => {
            log::debug!("Item {} failed: {}", id, e);
            (ItemStatus::Failed, Some(e))
        }
    };

    item.set_status(status);
    item.set_error(error.clone());
    let _ = tx.send(BatchEvent::Item {
        ordinal,
        id,
        status,
        error,
    });

    (ordinal, item, status == ItemStatus::Processed)
}

fn panic_message(panic: &(dyn std::any::Any + Send)) -> String {
    if let Some(s) = panic.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = panic.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic".into()
    }
}
