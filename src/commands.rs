//! Command surface behind the `xcode` binary.
//!
//! Each command writes its results to `out` and returns an [`ExitStatus`];
//! diagnostics go through `log`.

use std::fs::File;
use std::io::{self, Write};
use std::path::{Path, PathBuf};

use clap::Args;
use log::{debug, error, info};

use crate::classify::classify_with_progress;
use crate::header::{detect, FileHeader, FileState, HEADER_LEN};
use crate::pipeline::{
    BatchResult, CancelToken, ConvertOptions, Direction, Pipeline, Progress,
};
use crate::report::{write_outcomes, BatchSummary, Report};

/// Process exit status.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExitStatus {
    /// Normal completion, including batches with some failed files.
    Success,
    /// There were files and not a single one could be processed.
    AllFailed,
    /// The batch could not start (e.g. output directory not creatable).
    Fatal,
    Cancelled,
}

impl ExitStatus {
    pub fn code(self) -> i32 {
        match self {
            ExitStatus::Success   => 0,
            ExitStatus::AllFailed => 1,
            ExitStatus::Fatal     => 2,
            ExitStatus::Cancelled => 130,
        }
    }

    pub fn from_summary(summary: &BatchSummary) -> Self {
        if summary.cancelled {
            ExitStatus::Cancelled
        } else if summary.all_failed() {
            ExitStatus::AllFailed
        } else {
            ExitStatus::Success
        }
    }
}

/// Options shared by `encrypt` and `decrypt`.
#[derive(Debug, Clone, Default, Args)]
pub struct ConversionArgs {
    /// The encryption key (max 8 ASCII characters). Defaults to "Progress".
    #[arg(short, long, env = "XCODE_KEY", hide_env_values = true)]
    pub key: Option<String>,
    /// A suffix to append to each processed file name.
    #[arg(short, long)]
    pub suffix: Option<String>,
    /// Write every processed file into this directory (created if missing).
    #[arg(short, long = "output-directory", value_name = "DIR")]
    pub output_directory: Option<PathBuf>,
    /// Number of files processed concurrently.
    #[arg(short, long, default_value_t = 1)]
    pub jobs: usize,
    /// Print a JSON report instead of one line per converted file.
    #[arg(long)]
    pub json: bool,
}

impl ConversionArgs {
    pub fn to_options(&self, direction: Direction) -> ConvertOptions {
        ConvertOptions {
            key:        self.key.clone(),
            direction,
            suffix:     self.suffix.clone(),
            output_dir: self.output_directory.clone(),
            jobs:       self.jobs.max(1),
        }
    }
}

pub fn encrypt<P: AsRef<Path>>(
    files:  &[P],
    args:   &ConversionArgs,
    cancel: &CancelToken,
    out:    &mut dyn Write,
) -> io::Result<ExitStatus> {
    run_conversion(Direction::Encode, files, args, cancel, out)
}

pub fn decrypt<P: AsRef<Path>>(
    files:  &[P],
    args:   &ConversionArgs,
    cancel: &CancelToken,
    out:    &mut dyn Write,
) -> io::Result<ExitStatus> {
    run_conversion(Direction::Decode, files, args, cancel, out)
}

fn log_progress(p: &Progress<'_>) {
    debug!("[{}/{}] {}", p.index, p.total, p.path.display());
}

fn run_conversion<P: AsRef<Path>>(
    direction: Direction,
    files:     &[P],
    args:      &ConversionArgs,
    cancel:    &CancelToken,
    out:       &mut dyn Write,
) -> io::Result<ExitStatus> {
    let pipeline = Pipeline::new(args.to_options(direction)).with_cancel_token(cancel.clone());

    let result: BatchResult = match pipeline.convert(files, &log_progress) {
        Ok(r) => r,
        Err(e) => {
            error!("{e}");
            return Ok(ExitStatus::Fatal);
        }
    };

    if args.json {
        writeln!(out, "{}", Report::new(&result).to_json()?)?;
    } else {
        write_outcomes(out, &result.outcomes)?;
    }

    let summary = result.summary();
    info!("A total of {} files were converted.", summary.converted);
    info!("{summary}");
    Ok(ExitStatus::from_summary(&summary))
}

/// Print encoded files, or plain ones when `list_decrypted` is set.
pub fn list<P: AsRef<Path>>(
    files:          &[P],
    list_decrypted: bool,
    out:            &mut dyn Write,
) -> io::Result<ExitStatus> {
    info!("Starting the analyze on {} files.", files.len());
    let c = classify_with_progress(files, &log_progress);

    let selected = if list_decrypted { &c.plain } else { &c.encoded };
    for path in selected {
        writeln!(out, "{}", path.display())?;
    }

    info!(
        "A total of {} files are {}.",
        selected.len(),
        if list_decrypted { "decrypted" } else { "encrypted" }
    );
    if !c.invalid.is_empty() {
        info!("{} files could not be classified.", c.invalid.len());
    }
    Ok(ExitStatus::Success)
}

/// Print the header fields of one file.
pub fn info(file: &Path, out: &mut dyn Write) -> io::Result<ExitStatus> {
    let state = detect(file)?;
    writeln!(out, "── XCODE file ───────────────────────────────────────────")?;
    writeln!(out, "  Path            {}", file.display())?;

    match state {
        FileState::Plain => {
            writeln!(out, "  State           plain")?;
            Ok(ExitStatus::Success)
        }
        FileState::Invalid(reason) => {
            writeln!(out, "  State           invalid ({reason})")?;
            Ok(ExitStatus::AllFailed)
        }
        FileState::Encoded => {
            let header = FileHeader::read(File::open(file)?)
                .map_err(|e| io::Error::new(io::ErrorKind::InvalidData, e))?;
            writeln!(out, "  State           encoded")?;
            writeln!(out, "  Version         {}", header.version)?;
            writeln!(out, "  Key fingerprint {:04x}", header.key_fingerprint)?;
            writeln!(out, "  Payload length  {} B", header.payload_len)?;
            writeln!(out, "  Header          {} ({HEADER_LEN} B)", hex::encode(header.to_bytes()))?;
            Ok(ExitStatus::Success)
        }
    }
}
