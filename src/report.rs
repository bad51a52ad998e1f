//! Batch summaries and result rendering.
//!
//! Everything here writes to an explicit sink; nothing prints on its own.

use std::fmt;
use std::io::{self, Write};
use std::time::Duration;

use serde::Serialize;

use crate::pipeline::{BatchResult, ConversionOutcome};

/// Counts derived from a batch's outcomes.  Never persisted.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
pub struct BatchSummary {
    pub total:      usize,
    pub converted:  usize,
    pub skipped:    usize,
    pub failed:     usize,
    pub cancelled:  bool,
    pub elapsed_ms: u64,
}

impl BatchSummary {
    pub fn from_outcomes(outcomes: &[ConversionOutcome], cancelled: bool, elapsed: Duration) -> Self {
        let mut s = BatchSummary {
            total: outcomes.len(),
            cancelled,
            elapsed_ms: elapsed.as_millis() as u64,
            ..Default::default()
        };
        for o in outcomes {
            match o {
                ConversionOutcome::Converted { .. } => s.converted += 1,
                ConversionOutcome::Skipped { .. }   => s.skipped += 1,
                ConversionOutcome::Failed { .. }    => s.failed += 1,
            }
        }
        s
    }

    /// True when there was work and every file failed.
    pub fn all_failed(&self) -> bool {
        self.total > 0 && self.failed == self.total
    }
}

impl fmt::Display for BatchSummary {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} file(s): {} converted, {} skipped, {} failed in {} ms{}",
            self.total,
            self.converted,
            self.skipped,
            self.failed,
            self.elapsed_ms,
            if self.cancelled { " (cancelled)" } else { "" },
        )
    }
}

/// Machine-readable batch report.
#[derive(Debug, Serialize)]
pub struct Report<'a> {
    pub summary:  BatchSummary,
    pub outcomes: &'a [ConversionOutcome],
}

impl<'a> Report<'a> {
    pub fn new(result: &'a BatchResult) -> Self {
        Self { summary: result.summary(), outcomes: &result.outcomes }
    }

    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string_pretty(self)
    }
}

/// One `source >> destination` line per converted file and one
/// `source !! cause` line per failed file.  Skipped files are not listed.
pub fn write_outcomes(out: &mut dyn Write, outcomes: &[ConversionOutcome]) -> io::Result<()> {
    for o in outcomes {
        match o {
            ConversionOutcome::Converted { source, destination } => {
                writeln!(out, "{} >> {}", source.display(), destination.display())?
            }
            ConversionOutcome::Failed { source, cause } => {
                writeln!(out, "{} !! {cause}", source.display())?
            }
            ConversionOutcome::Skipped { .. } => {}
        }
    }
    Ok(())
}
