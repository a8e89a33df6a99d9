//! Unattended masking across many independent images.
//!
//! Each item runs detect, select-all, and final compositing on its own. A failing item is
//! recorded in its outcome and never stops the others, and outcomes always come back in
//! submission order regardless of how many workers ran them.

use std::{
    fs,
    path::PathBuf,
    sync::atomic::{AtomicUsize, Ordering},
};

use log::{info, warn};
use rayon::prelude::*;
use thiserror::Error;

use facecloak_utils::{config::BatchSettings, timing_guard};

use crate::compositor::MaskConfig;
use crate::error::MaskError;
use crate::masker::{FaceMasker, MaskedImage};

/// Where an item's bytes come from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BatchSource {
    Bytes(Vec<u8>),
    /// Read lazily by the worker that processes the item.
    Path(PathBuf),
}

/// Lifecycle of a batch item.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum BatchStatus {
    #[default]
    Pending,
    Done,
    Failed,
}

/// One image submitted to a batch.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BatchItem {
    pub label: String,
    pub source: BatchSource,
    pub status: BatchStatus,
}

impl BatchItem {
    pub fn from_bytes(label: impl Into<String>, bytes: Vec<u8>) -> Self {
        Self {
            label: label.into(),
            source: BatchSource::Bytes(bytes),
            status: BatchStatus::Pending,
        }
    }

    pub fn from_path(path: impl Into<PathBuf>) -> Self {
        let path = path.into();
        Self {
            label: path.display().to_string(),
            source: BatchSource::Path(path),
            status: BatchStatus::Pending,
        }
    }

    fn load(&self) -> Result<std::borrow::Cow<'_, [u8]>, MaskError> {
        match &self.source {
            BatchSource::Bytes(bytes) => Ok(bytes.as_slice().into()),
            BatchSource::Path(path) => fs::read(path).map(Into::into).map_err(|err| {
                MaskError::InvalidImage(format!("failed to read {}: {err}", path.display()))
            }),
        }
    }
}

/// The failure of one item inside a batch.
#[derive(Debug, Error)]
#[error("batch item {index} ({label}) failed: {error}")]
pub struct BatchItemFailure {
    pub index: usize,
    pub label: String,
    #[source]
    pub error: MaskError,
}

/// Final state of one batch item.
#[derive(Debug)]
pub struct BatchOutcome {
    pub index: usize,
    pub label: String,
    pub status: BatchStatus,
    pub result: Result<MaskedImage, BatchItemFailure>,
}

/// Progress snapshot passed to the batch callback after each item.
#[derive(Debug, Clone, Copy)]
pub struct BatchProgress<'a> {
    pub completed: usize,
    pub total: usize,
    pub label: &'a str,
    pub status: BatchStatus,
}

/// Worker configuration.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BatchOptions {
    /// Items processed concurrently; 1 runs them strictly one after another.
    pub workers: usize,
}

impl Default for BatchOptions {
    fn default() -> Self {
        (&BatchSettings::default()).into()
    }
}

impl From<&BatchSettings> for BatchOptions {
    fn from(settings: &BatchSettings) -> Self {
        Self {
            workers: settings.workers.max(1),
        }
    }
}

/// All outcomes of a batch, in submission order.
#[derive(Debug, Default)]
pub struct BatchReport {
    pub outcomes: Vec<BatchOutcome>,
}

impl BatchReport {
    pub fn len(&self) -> usize {
        self.outcomes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.outcomes.is_empty()
    }

    pub fn succeeded(&self) -> usize {
        self.outcomes
            .iter()
            .filter(|outcome| outcome.status == BatchStatus::Done)
            .count()
    }

    pub fn failed(&self) -> usize {
        self.outcomes
            .iter()
            .filter(|outcome| outcome.status == BatchStatus::Failed)
            .count()
    }

    pub fn failures(&self) -> impl Iterator<Item = &BatchItemFailure> {
        self.outcomes
            .iter()
            .filter_map(|outcome| outcome.result.as_ref().err())
    }
}

/// Callback invoked once per finished item, possibly from a worker thread.
pub type ProgressFn<'a> = dyn Fn(BatchProgress<'_>) + Send + Sync + 'a;

/// Mask every face in every item with one fixed mask configuration.
pub fn process_batch(
    masker: &FaceMasker,
    items: Vec<BatchItem>,
    mask: &MaskConfig,
    options: &BatchOptions,
    progress: Option<&ProgressFn<'_>>,
) -> BatchReport {
    let _guard = timing_guard("facecloak_core::batch", log::Level::Info);
    let total = items.len();
    let completed = AtomicUsize::new(0);

    let run = |(index, item): (usize, BatchItem)| {
        let outcome = process_item(masker, index, item, mask);
        let done = completed.fetch_add(1, Ordering::SeqCst) + 1;
        if let Some(callback) = progress {
            callback(BatchProgress {
                completed: done,
                total,
                label: &outcome.label,
                status: outcome.status,
            });
        }
        outcome
    };

    let outcomes: Vec<BatchOutcome> = if options.workers <= 1 || total <= 1 {
        items.into_iter().enumerate().map(run).collect()
    } else {
        match rayon::ThreadPoolBuilder::new()
            .num_threads(options.workers)
            .build()
        {
            Ok(pool) => pool.install(|| items.into_par_iter().enumerate().map(run).collect()),
            Err(err) => {
                warn!("Falling back to sequential batch; worker pool unavailable: {err}");
                items.into_iter().enumerate().map(run).collect()
            }
        }
    };

    let report = BatchReport { outcomes };
    info!(
        "Batch finished: {} succeeded, {} failed, {} total",
        report.succeeded(),
        report.failed(),
        report.len()
    );
    report
}

fn process_item(
    masker: &FaceMasker,
    index: usize,
    mut item: BatchItem,
    mask: &MaskConfig,
) -> BatchOutcome {
    let _guard = timing_guard(format!("facecloak_core::batch_item[{index}]"), log::Level::Debug);
    let result = item
        .load()
        .and_then(|bytes| masker.mask_all(&bytes, mask));

    item.status = if result.is_ok() {
        BatchStatus::Done
    } else {
        BatchStatus::Failed
    };
    let result = match result {
        Ok(masked) => {
            info!(
                "[{}] {}: masked {} face(s)",
                index,
                item.label,
                masked.masked.len()
            );
            Ok(masked)
        }
        Err(error) => {
            warn!("[{}] {}: {}", index, item.label, error);
            Err(BatchItemFailure {
                index,
                label: item.label.clone(),
                error,
            })
        }
    };

    BatchOutcome {
        index,
        label: item.label,
        status: item.status,
        result,
    }
}
