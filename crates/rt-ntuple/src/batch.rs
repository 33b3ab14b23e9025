//! Running one job per input file on the rayon pool.

use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};

use rand::SeedableRng;
use rand::rngs::StdRng;
use rayon::prelude::*;
use serde::Serialize;

use crate::error::{NtupleError, Result};

/// What a per-file job did when it did not fail.
#[derive(Debug, Clone, PartialEq)]
pub enum FileOutcome {
    /// Output files written for this input.
    Written(Vec<PathBuf>),
    /// Input deliberately left alone, with the reason.
    Skipped(String),
}

/// Summary of a batch, in input order.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct BatchReport {
    /// Inputs that produced output.
    pub processed: Vec<PathBuf>,
    /// Inputs skipped, with reasons.
    pub skipped: Vec<(PathBuf, String)>,
    /// Inputs that failed, with the error message.
    pub failed: Vec<(PathBuf, String)>,
}

impl BatchReport {
    /// Whether every input either produced output or was skipped.
    pub fn is_success(&self) -> bool {
        self.failed.is_empty()
    }

    /// Total number of inputs seen.
    pub fn total(&self) -> usize {
        self.processed.len() + self.skipped.len() + self.failed.len()
    }
}

/// Run `job(index, path)` for every file in parallel.
///
/// `index` is the file's position in `files`, which callers use to derive
/// per-file seeds. A failing file is logged and recorded; the others keep
/// going. An [`NtupleError::Abort`] stops files that have not started yet
/// and is returned after the running ones finish.
pub fn run_batch<F>(files: &[PathBuf], job: F) -> Result<BatchReport>
where
    F: Fn(usize, &Path) -> Result<FileOutcome> + Sync,
{
    let aborted = AtomicBool::new(false);

    let results: Vec<Option<Result<FileOutcome>>> = files
        .par_iter()
        .enumerate()
        .map(|(i, path)| {
            if aborted.load(Ordering::Relaxed) {
                return None;
            }
            log::info!("processing {}", path.display());
            let res = job(i, path);
            if matches!(&res, Err(e) if e.is_abort()) {
                aborted.store(true, Ordering::Relaxed);
            }
            Some(res)
        })
        .collect();

    let mut report = BatchReport::default();
    let mut abort = None;
    for (path, res) in files.iter().zip(results) {
        match res {
            Some(Ok(FileOutcome::Written(outputs))) => {
                log::debug!("{} -> {} output(s)", path.display(), outputs.len());
                report.processed.push(path.clone());
            }
            Some(Ok(FileOutcome::Skipped(reason))) => {
                log::info!("skipped {}: {reason}", path.display());
                report.skipped.push((path.clone(), reason));
            }
            Some(Err(e)) if e.is_abort() => {
                log::error!("{}: {e}", path.display());
                abort.get_or_insert(e);
            }
            Some(Err(e)) => {
                log::error!("{}: {e}", path.display());
                report.failed.push((path.clone(), e.to_string()));
            }
            None => report.skipped.push((path.clone(), "batch aborted".to_string())),
        }
    }

    match abort {
        Some(e) => Err(e),
        None => Ok(report),
    }
}

/// RNG for the file at `index`: `seed + index` when seeded, OS entropy otherwise.
///
/// Seeding per file keeps outputs identical for any thread count.
pub fn file_rng(seed: Option<u64>, index: usize) -> StdRng {
    match seed {
        Some(s) => StdRng::seed_from_u64(s.wrapping_add(index as u64)),
        None => StdRng::from_os_rng(),
    }
}
