//! Read-only partition of files by XCODE state.

use std::path::{Path, PathBuf};

use log::warn;
use serde::Serialize;

use crate::header::{detect, FileState};
use crate::pipeline::{NoProgress, Progress, ProgressObserver};

/// Every input path lands in exactly one list, in input order.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct Classification {
    pub encoded: Vec<PathBuf>,
    pub plain:   Vec<PathBuf>,
    /// Unreadable files and files with a truncated or corrupt header.
    pub invalid: Vec<PathBuf>,
}

impl Classification {
    pub fn len(&self) -> usize {
        self.encoded.len() + self.plain.len() + self.invalid.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

pub fn classify<P: AsRef<Path>>(paths: &[P]) -> Classification {
    classify_with_progress(paths, &NoProgress)
}

pub fn classify_with_progress<P: AsRef<Path>>(
    paths:    &[P],
    observer: &dyn ProgressObserver,
) -> Classification {
    let total = paths.len();
    let mut out = Classification::default();
    for (i, path) in paths.iter().enumerate() {
        let path = path.as_ref();
        match detect(path) {
            Ok(FileState::Encoded) => out.encoded.push(path.to_owned()),
            Ok(FileState::Plain)   => out.plain.push(path.to_owned()),
            Ok(FileState::Invalid(reason)) => {
                warn!("{}: {reason}", path.display());
                out.invalid.push(path.to_owned());
            }
            Err(e) => {
                warn!("{}: {e}", path.display());
                out.invalid.push(path.to_owned());
            }
        }
        observer.on_progress(&Progress { index: i + 1, total, path });
    }
    out
}
