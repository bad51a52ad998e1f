//! Batch conversion: classify → transform → atomic write, one file at a time.
//!
//! ```no_run
//! use xcode::pipeline::{ConvertOptions, Direction, NoProgress, Pipeline};
//!
//! let opts = ConvertOptions {
//!     key:    Some("secret".into()),
//!     suffix: Some(".x".into()),
//!     ..ConvertOptions::new(Direction::Encode)
//! };
//! let result = Pipeline::new(opts).convert(&["a.p", "b.p"], &NoProgress)?;
//! println!("{}", result.summary());
//! # Ok::<(), Box<dyn std::error::Error>>(())
//! ```
//!
//! Per-file problems become [`ConversionOutcome::Failed`] and never stop the
//! batch.  The only fatal error is an output directory that cannot be created.

use std::ffi::OsString;
use std::fs::{self, File, Permissions};
use std::io::{self, Seek, SeekFrom};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use log::{debug, info, warn};
use serde::Serialize;
use thiserror::Error;

use crate::header::{self, FileState, InvalidReason};
use crate::key::{EncryptionKey, KeyWarning};
use crate::report::BatchSummary;
use crate::stream::{decode_stream, encode_stream, XcodeError};

#[cfg(feature = "parallel")]
mod parallel;

// ── Options ───────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Direction {
    Encode,
    Decode,
}

impl Direction {
    /// The file state this direction produces.
    fn is_target(self, state: &FileState) -> bool {
        matches!(
            (self, state),
            (Direction::Encode, FileState::Encoded) | (Direction::Decode, FileState::Plain)
        )
    }
}

/// Configuration for [`Pipeline::new`].
#[derive(Debug, Clone)]
pub struct ConvertOptions {
    /// Raw user key; normalized by [`EncryptionKey::normalize`].
    pub key:        Option<String>,
    pub direction:  Direction,
    /// Appended to every output file name.
    pub suffix:     Option<String>,
    /// Common output directory; created before the batch if missing.
    pub output_dir: Option<PathBuf>,
    /// Worker count.  Values above 1 need the `parallel` feature.
    pub jobs:       usize,
}

impl ConvertOptions {
    pub fn new(direction: Direction) -> Self {
        Self { direction, ..Self::default() }
    }
}

impl Default for ConvertOptions {
    fn default() -> Self {
        Self {
            key:        None,
            direction:  Direction::Encode,
            suffix:     None,
            output_dir: None,
            jobs:       1,
        }
    }
}

// ── Outcomes ──────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SkipReason {
    /// Encoding an encoded file, or decoding a plain one.
    AlreadyInTargetState,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum ConversionOutcome {
    Converted { source: PathBuf, destination: PathBuf },
    Skipped   { source: PathBuf, reason: SkipReason },
    Failed    { source: PathBuf, cause: String },
}

impl ConversionOutcome {
    pub fn source(&self) -> &Path {
        match self {
            ConversionOutcome::Converted { source, .. }
            | ConversionOutcome::Skipped { source, .. }
            | ConversionOutcome::Failed { source, .. } => source,
        }
    }

    pub fn is_converted(&self) -> bool {
        matches!(self, ConversionOutcome::Converted { .. })
    }

    pub fn is_skipped(&self) -> bool {
        matches!(self, ConversionOutcome::Skipped { .. })
    }

    pub fn is_failed(&self) -> bool {
        matches!(self, ConversionOutcome::Failed { .. })
    }
}

/// Ordered outcomes of one batch.
#[derive(Debug, Clone)]
pub struct BatchResult {
    /// One entry per processed file, in input order.
    pub outcomes:  Vec<ConversionOutcome>,
    /// Set when the batch stopped early on a [`CancelToken`].
    pub cancelled: bool,
    pub elapsed:   Duration,
}

impl BatchResult {
    pub fn summary(&self) -> BatchSummary {
        BatchSummary::from_outcomes(&self.outcomes, self.cancelled, self.elapsed)
    }
}

// ── Errors ────────────────────────────────────────────────────────────────────

/// Cause of a [`ConversionOutcome::Failed`].
#[derive(Error, Debug)]
pub enum ConversionError {
    #[error("file looks encoded but its header is invalid: {0}")]
    InvalidHeader(InvalidReason),
    #[error("path has no file name")]
    NoFileName,
    #[error(transparent)]
    Codec(#[from] XcodeError),
    #[error("IO error: {0}")]
    Io(#[from] io::Error),
}

/// Batch-level failure: nothing could be processed.
#[derive(Error, Debug)]
pub enum PipelineError {
    #[error("cannot create output directory {}: {source}", .path.display())]
    OutputDirectory { path: PathBuf, source: io::Error },
    #[error("cannot start worker pool: {0}")]
    WorkerPool(String),
}

// ── Progress and cancellation ─────────────────────────────────────────────────

/// Reported once per finished file, whatever its outcome.
#[derive(Debug, Clone, Copy)]
pub struct Progress<'a> {
    /// Files finished so far, including this one.
    pub index: usize,
    pub total: usize,
    pub path:  &'a Path,
}

pub trait ProgressObserver: Sync {
    fn on_progress(&self, progress: &Progress<'_>);
}

impl<F> ProgressObserver for F
where
    F: Fn(&Progress<'_>) + Sync,
{
    fn on_progress(&self, progress: &Progress<'_>) {
        self(progress)
    }
}

/// Observer that ignores every report.
pub struct NoProgress;

impl ProgressObserver for NoProgress {
    fn on_progress(&self, _: &Progress<'_>) {}
}

/// Cooperative cancellation flag, checked between files.
#[derive(Debug, Clone, Default)]
pub struct CancelToken(Arc<AtomicBool>);

impl CancelToken {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}

// ── Destination naming ────────────────────────────────────────────────────────

/// `{output_dir or source dir}/{file name}{suffix}`.  `None` when `source`
/// has no file name (e.g. `..`).
pub fn destination_for(source: &Path, suffix: Option<&str>, output_dir: Option<&Path>) -> Option<PathBuf> {
    let mut name: OsString = source.file_name()?.to_owned();
    if let Some(s) = suffix {
        name.push(s);
    }
    let dir = match output_dir {
        Some(d) => d,
        None    => source.parent().unwrap_or_else(|| Path::new("")),
    };
    Some(dir.join(name))
}

/// Write `destination` through a temporary file in the same directory that is
/// renamed into place only once `fill` succeeded.
fn write_atomically<F>(
    destination: &Path,
    permissions: Option<Permissions>,
    fill:        F,
) -> Result<(), ConversionError>
where
    F: FnOnce(&mut File) -> Result<(), XcodeError>,
{
    let dir = match destination.parent() {
        Some(p) if !p.as_os_str().is_empty() => p,
        _ => Path::new("."),
    };
    let mut tmp = tempfile::Builder::new()
        .prefix(".xcode-")
        .suffix(".tmp")
        .tempfile_in(dir)?;

    fill(tmp.as_file_mut())?;
    tmp.as_file().sync_all()?;
    if let Some(perms) = permissions {
        fs::set_permissions(tmp.path(), perms)?;
    }
    tmp.persist(destination).map_err(|e| e.error)?;
    Ok(())
}

/// Follow `destination` when it is an existing symlink, so the rename
/// replaces the link target rather than the link.
fn resolve_destination(destination: &Path) -> io::Result<PathBuf> {
    match fs::symlink_metadata(destination) {
        Ok(meta) if meta.file_type().is_symlink() => fs::canonicalize(destination),
        _ => Ok(destination.to_owned()),
    }
}

// ── Pipeline ──────────────────────────────────────────────────────────────────

pub struct Pipeline {
    opts:     ConvertOptions,
    key:      EncryptionKey,
    warnings: Vec<KeyWarning>,
    cancel:   CancelToken,
}

impl Pipeline {
    pub fn new(mut opts: ConvertOptions) -> Self {
        let normalized = EncryptionKey::normalize(opts.key.as_deref());
        // Empty strings mean "not set", as on the command line.
        opts.suffix = opts.suffix.filter(|s| !s.is_empty());
        opts.output_dir = opts.output_dir.filter(|d| !d.as_os_str().is_empty());
        Self {
            opts,
            key:      normalized.key,
            warnings: normalized.warnings,
            cancel:   CancelToken::new(),
        }
    }

    pub fn with_cancel_token(mut self, token: CancelToken) -> Self {
        self.cancel = token;
        self
    }

    pub fn cancel_token(&self) -> CancelToken {
        self.cancel.clone()
    }

    pub fn key(&self) -> &EncryptionKey {
        &self.key
    }

    pub fn key_warnings(&self) -> &[KeyWarning] {
        &self.warnings
    }

    pub fn options(&self) -> &ConvertOptions {
        &self.opts
    }

    pub fn destination_for(&self, source: &Path) -> Option<PathBuf> {
        destination_for(source, self.opts.suffix.as_deref(), self.opts.output_dir.as_deref())
    }

    fn prepare_output_dir(&self) -> Result<(), PipelineError> {
        if let Some(dir) = &self.opts.output_dir {
            if !dir.is_dir() {
                info!("Creating directory : {}.", dir.display());
                fs::create_dir_all(dir).map_err(|source| PipelineError::OutputDirectory {
                    path: dir.clone(),
                    source,
                })?;
            }
        }
        Ok(())
    }

    /// Convert every file in `paths`.  Outcomes come back in input order.
    pub fn convert<P: AsRef<Path>>(
        &self,
        paths:    &[P],
        observer: &dyn ProgressObserver,
    ) -> Result<BatchResult, PipelineError> {
        let started = Instant::now();
        self.prepare_output_dir()?;

        let paths: Vec<&Path> = paths.iter().map(AsRef::as_ref).collect();
        info!("Processing {} files.", paths.len());

        let (outcomes, cancelled) = self.run(&paths, observer)?;
        if cancelled {
            warn!("Cancelled after {} of {} files.", outcomes.len(), paths.len());
        }
        Ok(BatchResult { outcomes, cancelled, elapsed: started.elapsed() })
    }

    #[cfg(feature = "parallel")]
    fn run(
        &self,
        paths:    &[&Path],
        observer: &dyn ProgressObserver,
    ) -> Result<(Vec<ConversionOutcome>, bool), PipelineError> {
        if self.opts.jobs > 1 {
            return parallel::convert_all(self, paths, observer, self.opts.jobs);
        }
        Ok(self.run_sequential(paths, observer))
    }

    #[cfg(not(feature = "parallel"))]
    fn run(
        &self,
        paths:    &[&Path],
        observer: &dyn ProgressObserver,
    ) -> Result<(Vec<ConversionOutcome>, bool), PipelineError> {
        if self.opts.jobs > 1 {
            debug!("built without the `parallel` feature; using one worker");
        }
        Ok(self.run_sequential(paths, observer))
    }

    fn run_sequential(
        &self,
        paths:    &[&Path],
        observer: &dyn ProgressObserver,
    ) -> (Vec<ConversionOutcome>, bool) {
        let total = paths.len();
        let mut outcomes = Vec::with_capacity(total);
        for (i, &path) in paths.iter().enumerate() {
            if self.cancel.is_cancelled() {
                return (outcomes, true);
            }
            outcomes.push(self.convert_one(path));
            observer.on_progress(&Progress { index: i + 1, total, path });
        }
        (outcomes, false)
    }

    /// Process a single file.  Never fails; errors become `Failed`.
    pub fn convert_one(&self, source: &Path) -> ConversionOutcome {
        let result = self
            .destination_for(source)
            .ok_or(ConversionError::NoFileName)
            .and_then(|dest| self.try_convert(source, &dest).map(|skip| (dest, skip)));

        match result {
            Ok((destination, None)) => {
                debug!("{} >> {}", source.display(), destination.display());
                ConversionOutcome::Converted { source: source.to_owned(), destination }
            }
            Ok((_, Some(reason))) => {
                debug!("{} already in target state, skipped", source.display());
                ConversionOutcome::Skipped { source: source.to_owned(), reason }
            }
            Err(e) => {
                warn!("{}: {e}", source.display());
                ConversionOutcome::Failed { source: source.to_owned(), cause: e.to_string() }
            }
        }
    }

    fn try_convert(&self, source: &Path, destination: &Path) -> Result<Option<SkipReason>, ConversionError> {
        let mut input = File::open(source)?;
        let state = header::detect_reader(&mut input)?;

        if self.opts.direction.is_target(&state) {
            return Ok(Some(SkipReason::AlreadyInTargetState));
        }
        if let FileState::Invalid(reason) = state {
            return Err(ConversionError::InvalidHeader(reason));
        }

        input.seek(SeekFrom::Start(0))?;
        let meta = input.metadata()?;
        let key = &self.key;
        let target = resolve_destination(destination)?;

        write_atomically(&target, Some(meta.permissions()), |out| {
            let written = match self.opts.direction {
                Direction::Encode => encode_stream(key, &mut input, meta.len(), out),
                Direction::Decode => decode_stream(key, &mut input, out),
            };
            written.map(|_| ())
        })?;
        Ok(None)
    }
}
