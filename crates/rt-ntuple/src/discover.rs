//! Finding input files in a directory.

use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};

use crate::error::{NtupleError, Result};
use crate::io::InputFormat;
use crate::naming::natural_cmp;

/// Skip rules applied to file names during discovery.
#[derive(Debug, Clone, Default)]
pub struct FileFilter {
    /// File stems to skip (e.g. `puWeights`).
    pub skip_stems: Vec<String>,
    /// File name prefixes to skip (e.g. `Data`).
    pub skip_prefixes: Vec<String>,
}

impl FileFilter {
    /// Accept everything.
    pub fn none() -> Self {
        Self::default()
    }

    /// Also skip files with this stem.
    pub fn skip_stem(mut self, stem: impl Into<String>) -> Self {
        self.skip_stems.push(stem.into());
        self
    }

    /// Also skip files whose name starts with this prefix.
    pub fn skip_prefix(mut self, prefix: impl Into<String>) -> Self {
        self.skip_prefixes.push(prefix.into());
        self
    }

    /// Whether `path` passes the skip rules.
    pub fn accepts(&self, path: &Path) -> bool {
        let name = path.file_name().and_then(|s| s.to_str()).unwrap_or_default();
        let stem = path.file_stem().and_then(|s| s.to_str()).unwrap_or_default();
        !self.skip_stems.iter().any(|s| s == stem)
            && !self.skip_prefixes.iter().any(|p| name.starts_with(p.as_str()))
    }
}

/// Every `.root` / `.parquet` regular file directly in `dir`, in natural order.
pub fn list_inputs(dir: &Path, filter: &FileFilter) -> Result<Vec<PathBuf>> {
    let mut out = Vec::new();
    for entry in fs::read_dir(dir)? {
        let entry = entry?;
        if !entry.file_type()?.is_file() {
            continue;
        }
        let path = entry.path();
        if InputFormat::from_path(&path).is_none() {
            continue;
        }
        if !filter.accepts(&path) {
            log::debug!("skipping {}", path.display());
            continue;
        }
        out.push(path);
    }
    out.sort_by(|a, b| natural_cmp(&file_name(a), &file_name(b)));
    Ok(out)
}

/// [`list_inputs`] for tools that write `<stem>.parquet` per input.
///
/// Two inputs sharing a stem (`a.root` and `a.parquet`) would write the same
/// output, so that is an error.
pub fn discover_inputs(dir: &Path, filter: &FileFilter) -> Result<Vec<PathBuf>> {
    let out = list_inputs(dir, filter)?;
    let mut seen: HashMap<String, &PathBuf> = HashMap::new();
    for path in &out {
        if let Some(first) = seen.insert(file_stem(path), path) {
            return Err(NtupleError::Input(format!(
                "{} and {} share a file stem",
                first.display(),
                path.display()
            )));
        }
    }
    Ok(out)
}

/// The `.root` or `.parquet` file in `dir` with the given stem, if any.
pub fn find_by_stem(dir: &Path, stem: &str) -> Option<PathBuf> {
    ["root", "parquet"]
        .iter()
        .map(|ext| dir.join(format!("{stem}.{ext}")))
        .find(|p| p.is_file())
}

/// Refuse to write outputs into the directory the inputs come from.
///
/// Outputs are `<stem>.parquet`, so writing next to Parquet inputs would
/// overwrite them.
pub fn ensure_distinct_dirs(input: &Path, output: &Path) -> Result<()> {
    let a = fs::canonicalize(input)?;
    let b = fs::canonicalize(output)?;
    if a == b {
        return Err(NtupleError::Config(format!(
            "output directory {} is the input directory",
            output.display()
        )));
    }
    Ok(())
}

pub(crate) fn file_name(path: &Path) -> String {
    path.file_name().map(|s| s.to_string_lossy().into_owned()).unwrap_or_default()
}

pub(crate) fn file_stem(path: &Path) -> String {
    path.file_stem().map(|s| s.to_string_lossy().into_owned()).unwrap_or_default()
}
