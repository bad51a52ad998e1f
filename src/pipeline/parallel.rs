//! Bounded worker pool for [`Pipeline::convert`] (feature `parallel`).
//!
//! Files are independent, so each Rayon task runs the full per-file
//! conversion.  `par_iter().map().collect()` writes every result into the
//! slot of its input index, which keeps outcomes in input order no matter
//! which worker finishes first.  A cancelled slot stays `None`.

use std::path::Path;
use std::sync::atomic::{AtomicUsize, Ordering};

use rayon::prelude::*;

use super::{ConversionOutcome, Pipeline, PipelineError, Progress, ProgressObserver};

pub(super) fn convert_all(
    pipeline: &Pipeline,
    paths:    &[&Path],
    observer: &dyn ProgressObserver,
    jobs:     usize,
) -> Result<(Vec<ConversionOutcome>, bool), PipelineError> {
    let pool = rayon::ThreadPoolBuilder::new()
        .num_threads(jobs)
        .build()
        .map_err(|e| PipelineError::WorkerPool(e.to_string()))?;

    let total = paths.len();
    let done  = AtomicUsize::new(0);
    let cancel = pipeline.cancel_token();

    let slots: Vec<Option<ConversionOutcome>> = pool.install(|| {
        paths
            .par_iter()
            .map(|&path| {
                if cancel.is_cancelled() {
                    return None;
                }
                let outcome = pipeline.convert_one(path);
                let index = done.fetch_add(1, Ordering::SeqCst) + 1;
                observer.on_progress(&Progress { index, total, path });
                Some(outcome)
            })
            .collect()
    });

    let cancelled = slots.iter().any(Option::is_none);
    Ok((slots.into_iter().flatten().collect(), cancelled))
}
