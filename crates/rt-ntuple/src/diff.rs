//! Comparing two directories of ntuples file by file.
//!
//! Files are paired by name and then checked in order: presence on both
//! sides, readability, the tree, its branch and entry counts, the mean of
//! one variable, and finally size and content hash. The first failing check
//! is reported.

use std::collections::BTreeMap;
use std::fmt::Write as _;
use std::fs::File;
use std::path::{Path, PathBuf};

use rayon::prelude::*;
use rt_root::{Histogram1D, RootError};
use sha2::{Digest, Sha256};

use crate::discover::{FileFilter, file_name, list_inputs};
use crate::error::{NtupleError, Result};
use crate::io::{InputFile, TableInfo};
use crate::naming::natural_cmp;

/// Number of bins of the histogram whose mean is compared.
pub const MEAN_BINS: usize = 100;

const LEFT: &str = "left";
const RIGHT: &str = "right";

/// What to compare and how to pair names.
#[derive(Debug, Clone, PartialEq)]
pub struct DiffParams {
    /// Tree looked up in both files.
    pub tree: String,
    /// Variable whose mean is compared.
    pub variable: String,
    /// Lower edge of the histogram range.
    pub min: f64,
    /// Upper edge of the histogram range.
    pub max: f64,
    /// Stem suffix dropped from left file names before pairing.
    pub ignore_left_suffix: String,
    /// Stem suffix dropped from right file names before pairing.
    pub ignore_right_suffix: String,
}

impl Default for DiffParams {
    fn default() -> Self {
        Self {
            tree: "bdttree".into(),
            variable: "nVert".into(),
            min: 0.0,
            max: 100.0,
            ignore_left_suffix: String::new(),
            ignore_right_suffix: String::new(),
        }
    }
}

impl DiffParams {
    /// The histogram range must be usable.
    pub fn validate(&self) -> Result<()> {
        Histogram1D::new(MEAN_BINS, self.min, self.max)?;
        Ok(())
    }
}

/// Verdict for one paired name.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct DiffEntry {
    /// Pairing key (file name after suffix removal).
    pub key: String,
    /// File on the left, if any.
    pub left: Option<PathBuf>,
    /// File on the right, if any.
    pub right: Option<PathBuf>,
    /// First difference found; `None` when the files match.
    pub message: Option<String>,
    /// Note kept alongside the message (branch-count difference).
    pub additional: Option<String>,
}

impl DiffEntry {
    /// Text printed after `key: `, or `None` for a match.
    pub fn text(&self) -> Option<String> {
        self.message.as_ref().map(|m| match &self.additional {
            Some(extra) => format!("{m}; {extra}"),
            None => m.clone(),
        })
    }
}

/// All verdicts, in natural key order.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct DiffReport {
    /// One entry per paired name.
    pub entries: Vec<DiffEntry>,
}

impl DiffReport {
    /// One `key: message` line per entry; matches only with `show_matches`.
    pub fn render(&self, show_matches: bool) -> String {
        let mut out = String::new();
        for e in &self.entries {
            match e.text() {
                Some(text) => {
                    let _ = writeln!(out, "{}: {text}", e.key);
                }
                None if show_matches => {
                    let _ = writeln!(out, "{}: Matches on both sides", e.key);
                }
                None => {}
            }
        }
        out
    }

    /// Whether every pair matched.
    pub fn all_match(&self) -> bool {
        self.entries.iter().all(|e| e.message.is_none())
    }
}

/// Pairing key for `name`: `suffix` removed from the part before the first dot.
pub fn pairing_key(name: &str, suffix: &str) -> String {
    if suffix.is_empty() {
        return name.to_string();
    }
    let (head, rest) = match name.find('.') {
        Some(dot) => name.split_at(dot),
        None => (name, ""),
    };
    match head.strip_suffix(suffix) {
        Some(stripped) => format!("{stripped}{rest}"),
        None => name.to_string(),
    }
}

fn collect_side(
    pairs: &mut BTreeMap<String, DiffEntry>,
    dir: &Path,
    suffix: &str,
    left: bool,
) -> Result<()> {
    // pairing is by full name, so `x.root` and `x.parquet` stay apart
    for path in list_inputs(dir, &FileFilter::none())? {
        let key = pairing_key(&file_name(&path), suffix);
        let entry = pairs.entry(key.clone()).or_insert_with(|| DiffEntry { key, ..Default::default() });
        let slot = if left { &mut entry.left } else { &mut entry.right };
        if let Some(first) = slot.as_ref() {
            log::warn!(
                "{} pairs under the same name as {}, ignoring it",
                path.display(),
                first.display()
            );
        } else {
            *slot = Some(path);
        }
    }
    Ok(())
}

enum Probe {
    Unreadable,
    NoTree,
    Tree(InputFile, TableInfo),
}

fn probe(path: &Path, tree: &str) -> Probe {
    let file = match InputFile::open(path) {
        Ok(f) => f,
        Err(e) => {
            log::debug!("{}: {e}", path.display());
            return Probe::Unreadable;
        }
    };
    match file.table_info(tree) {
        Ok(info) => Probe::Tree(file, info),
        Err(NtupleError::Root(RootError::TreeNotFound(_) | RootError::KeyNotFound(_))) => {
            Probe::NoTree
        }
        Err(e) => {
            log::debug!("{}: {e}", path.display());
            Probe::Unreadable
        }
    }
}

fn variable_mean(file: &InputFile, params: &DiffParams) -> Result<f64> {
    let table = file.read_table(&params.tree, Some(std::slice::from_ref(&params.variable)))?;
    let mut h = Histogram1D::new(MEAN_BINS, params.min, params.max)?;
    for x in table.column_f64(&params.variable)? {
        h.fill(x);
    }
    Ok(h.mean())
}

/// Tree-level checks. Sets `message`/`additional` on the first difference.
fn compare_trees(entry: &mut DiffEntry, left: &Path, right: &Path, params: &DiffParams) {
    let (l, r) = match (probe(left, &params.tree), probe(right, &params.tree)) {
        (Probe::Unreadable, Probe::Unreadable) => {
            entry.message = Some("Unable to open any of the two root files.".into());
            return;
        }
        (_, Probe::Unreadable) => {
            entry.message = Some(format!("Unable to open the {RIGHT} root file."));
            return;
        }
        (Probe::Unreadable, _) => {
            entry.message = Some(format!("Unable to open the {LEFT} root file."));
            return;
        }
        (Probe::NoTree, Probe::NoTree) => {
            entry.message =
                Some(format!("Unable to find the {} tree for any of the files.", params.tree));
            return;
        }
        (_, Probe::NoTree) => {
            entry.message =
                Some(format!("Unable to find the {} tree for the {RIGHT} file.", params.tree));
            return;
        }
        (Probe::NoTree, _) => {
            entry.message =
                Some(format!("Unable to find the {} tree for the {LEFT} file.", params.tree));
            return;
        }
        (Probe::Tree(lf, li), Probe::Tree(rf, ri)) => ((lf, li), (rf, ri)),
    };
    let ((left_file, left_info), (right_file, right_info)) = (l, r);

    let (lb, rb) = (left_info.columns.len(), right_info.columns.len());
    if lb > rb {
        entry.additional = Some(format!(
            "More branches found on the {LEFT} file, maybe {RIGHT} file is a skim? ({lb} vs {rb})"
        ));
    } else if lb < rb {
        entry.additional = Some(format!(
            "More branches found on the {RIGHT} file, maybe {LEFT} file is a skim? ({rb} vs {lb})"
        ));
    }

    let (le, re) = (left_info.n_rows, right_info.n_rows);
    if le > re {
        entry.message = Some(format!(
            "More events found on the {LEFT} file, maybe {RIGHT} file is filtered? ({le} vs {re})"
        ));
        return;
    } else if le < re {
        entry.message = Some(format!(
            "More events found on the {RIGHT} file, maybe {LEFT} file is filtered? ({re} vs {le})"
        ));
        return;
    } else if le == 0 {
        entry.message = Some("There are no events in any file.".into());
        return;
    }

    let var = &params.variable;
    match (left_info.column(var).is_some(), right_info.column(var).is_some()) {
        (false, false) => {
            entry.message = Some(format!(
                "Unable to find the {var} variable for any of the files. Maybe it was skimmed out?"
            ));
            return;
        }
        (true, false) => {
            entry.message = Some(format!(
                "Unable to find the {var} variable for the {RIGHT} file. Maybe it was skimmed out?"
            ));
            return;
        }
        (false, true) => {
            entry.message = Some(format!(
                "Unable to find the {var} variable for the {LEFT} file. Maybe it was skimmed out?"
            ));
            return;
        }
        (true, true) => {}
    }

    let means = variable_mean(&left_file, params)
        .and_then(|lm| variable_mean(&right_file, params).map(|rm| (lm, rm)));
    match means {
        Ok((lm, rm)) if lm != rm => {
            entry.message = Some(format!(
                "The mean of the {var} variable does not match between the two files, they are different. {LEFT}: {lm:?}; {RIGHT}: {rm:?}"
            ));
            entry.additional = None;
        }
        Ok(_) => {
            // a branch-count note on otherwise equal trees becomes the verdict
            entry.message = entry.additional.take();
        }
        Err(e) => {
            entry.message = Some(format!("Unable to read the {var} variable: {e}"));
        }
    }
}

fn sha256_file(path: &Path) -> Result<Vec<u8>> {
    let mut hasher = Sha256::new();
    let mut file = File::open(path)?;
    std::io::copy(&mut file, &mut hasher)?;
    Ok(hasher.finalize().to_vec())
}

/// Byte-level checks, run only when nothing else differs.
fn compare_bytes(entry: &mut DiffEntry, left: &Path, right: &Path) -> Result<()> {
    let ls = std::fs::metadata(left)?.len();
    let rs = std::fs::metadata(right)?.len();
    if ls != rs {
        entry.message = Some(format!(
            "The file size does not match between the two files, they are different. {LEFT}: {ls}; {RIGHT}: {rs}"
        ));
        return Ok(());
    }
    if sha256_file(left)? != sha256_file(right)? {
        entry.message =
            Some("The file hashes do not match between the two files, they are different.".into());
    }
    Ok(())
}

fn compare_pair(mut entry: DiffEntry, params: &DiffParams) -> DiffEntry {
    // every entry is created from a file on at least one side
    let (Some(left), Some(right)) = (entry.left.clone(), entry.right.clone()) else {
        let missing = if entry.left.is_some() { RIGHT } else { LEFT };
        entry.message = Some(format!("This file does not exist on the {missing}"));
        return entry;
    };

    log::debug!("checking file {}", entry.key);
    compare_trees(&mut entry, &left, &right, params);
    if entry.message.is_none()
        && let Err(e) = compare_bytes(&mut entry, &left, &right)
    {
        entry.message = Some(format!("Unable to compare the file contents: {e}"));
    }
    entry
}

/// Compare every file of `left_dir` with its counterpart in `right_dir`.
pub fn diff_dirs(left_dir: &Path, right_dir: &Path, params: &DiffParams) -> Result<DiffReport> {
    params.validate()?;
    let mut pairs = BTreeMap::new();
    log::info!("loading all the file names from {}", left_dir.display());
    collect_side(&mut pairs, left_dir, &params.ignore_left_suffix, true)?;
    log::info!("loading all the file names from {}", right_dir.display());
    collect_side(&mut pairs, right_dir, &params.ignore_right_suffix, false)?;

    let mut entries: Vec<DiffEntry> =
        pairs.into_values().collect::<Vec<_>>().into_par_iter().map(|e| compare_pair(e, params)).collect();
    entries.sort_by(|a, b| natural_cmp(&a.key, &b.key));
    Ok(DiffReport { entries })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn pairing_key_strips_stem_suffix() {
        assert_eq!(pairing_key("TTbar_skim.root", "_skim"), "TTbar.root");
        assert_eq!(pairing_key("TTbar.root", "_skim"), "TTbar.root");
        assert_eq!(pairing_key("a_skim.tar.root", "_skim"), "a.tar.root");
        assert_eq!(pairing_key("x_skim.root", ""), "x_skim.root");
    }

    #[test]
    fn render_orders_and_appends() {
        let report = DiffReport {
            entries: vec![
                DiffEntry { key: "a.root".into(), ..Default::default() },
                DiffEntry {
                    key: "b.root".into(),
                    message: Some("More events found".into()),
                    additional: Some("More branches found".into()),
                    ..Default::default()
                },
            ],
        };
        assert_eq!(report.render(false), "b.root: More events found; More branches found\n");
        assert_eq!(
            report.render(true),
            "a.root: Matches on both sides\nb.root: More events found; More branches found\n"
        );
        assert!(!report.all_match());
    }

    #[test]
    fn bad_range_rejected() {
        let p = DiffParams { min: 5.0, max: 5.0, ..Default::default() };
        assert!(p.validate().is_err());
    }
}
