//! Skimming: keep a chosen set of branches, optionally subsample, fix
//! sentinel values and rename.
//!
//! The job is described by a YAML file:
//!
//! ```yaml
//! seed: 42
//! input_ttree: bdttree
//! output_ttree: bdttree
//! do_reinterpret: true
//! filter: false          # or a number of events to keep
//! branches:
//!   Met: {rename: false, reinterpret: false}
//!   Jet1Pt: {rename: LeadingJetPt, reinterpret: 0}
//! ```

use std::collections::HashSet;
use std::path::Path;

use rand::seq::index;
use rt_root::LeafKind;
use serde::Deserialize;

use crate::batch::{BatchReport, FileOutcome, file_rng, run_batch};
use crate::config::{false_or, load_yaml, ordered_map};
use crate::discover::{FileFilter, discover_inputs, ensure_distinct_dirs};
use crate::error::{NtupleError, Result};
use crate::io::{InputFile, MAX_ZSTD_LEVEL, output_file, write_table};
use crate::table::{Column, ColumnData, EventTable};

/// Value marking "not computed" in the input ntuples.
pub const SENTINEL: f64 = -9999.0;

/// What to do with one kept branch.
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
pub struct BranchSpec {
    /// New name in the output, or `false` to keep the name.
    #[serde(default, deserialize_with = "false_or")]
    pub rename: Option<String>,
    /// Replacement for [`SENTINEL`] values, or `false`.
    #[serde(default, deserialize_with = "false_or")]
    pub reinterpret: Option<f64>,
}

/// A parsed skim job.
#[derive(Debug, Clone, Deserialize)]
pub struct SkimConfig {
    /// Base seed for subsampling; OS entropy when absent.
    #[serde(default)]
    pub seed: Option<u64>,
    /// Tree read from each input.
    pub input_ttree: String,
    /// Tree name given to each output.
    pub output_ttree: String,
    /// Replace sentinel values in branches that set `reinterpret`.
    #[serde(default)]
    pub do_reinterpret: bool,
    /// Keep this many randomly chosen events, or `false` for all.
    #[serde(default, deserialize_with = "false_or")]
    pub filter: Option<usize>,
    /// Branches to keep, in output order.
    #[serde(deserialize_with = "ordered_map")]
    pub branches: Vec<(String, BranchSpec)>,
}

impl SkimConfig {
    /// Parse and validate a YAML job file.
    pub fn from_yaml_file(path: &Path) -> Result<Self> {
        let cfg: Self = load_yaml(path)?;
        cfg.validate()?;
        Ok(cfg)
    }

    /// Check the job is self-consistent.
    pub fn validate(&self) -> Result<()> {
        if self.input_ttree.is_empty() || self.output_ttree.is_empty() {
            return Err(NtupleError::Config("tree names must not be empty".into()));
        }
        if self.branches.is_empty() {
            return Err(NtupleError::Config("no branches to keep".into()));
        }
        let mut seen = HashSet::new();
        for (name, spec) in &self.branches {
            let out = self.output_name(name, spec);
            if out.is_empty() {
                return Err(NtupleError::Config(format!("branch '{name}' renamed to empty name")));
            }
            if !seen.insert(out) {
                return Err(NtupleError::Config(format!("two branches would be written as '{out}'")));
            }
        }
        Ok(())
    }

    fn output_name<'a>(&self, name: &'a str, spec: &'a BranchSpec) -> &'a str {
        spec.rename.as_deref().unwrap_or(name)
    }
}

fn skimmable(kind: Option<LeafKind>) -> bool {
    matches!(kind, Some(LeafKind::F32 | LeafKind::F64 | LeafKind::U32 | LeafKind::U64))
}

/// Skim one input file into `out_dir`.
pub fn skim_file(cfg: &SkimConfig, input: &Path, out_dir: &Path, index: usize) -> Result<FileOutcome> {
    let file = InputFile::open(input)?;
    let info = file.table_info(&cfg.input_ttree)?;
    log::debug!("{}: started with {} events", input.display(), info.n_rows);

    let mut keep: Vec<&(String, BranchSpec)> = Vec::new();
    for entry in &cfg.branches {
        match info.column(&entry.0) {
            None => log::error!("{}: branch '{}' not found", input.display(), entry.0),
            Some(c) if !c.readable || !skimmable(c.kind) => {
                log::error!("Unknown branch type for branch {}, type: {}", c.name, c.type_name)
            }
            Some(_) => keep.push(entry),
        }
    }
    if keep.is_empty() {
        return Err(NtupleError::Input(format!(
            "none of the requested branches can be skimmed from '{}'",
            cfg.input_ttree
        )));
    }

    let names: Vec<String> = keep.iter().map(|(n, _)| n.clone()).collect();
    let mut table = file.read_table(&cfg.input_ttree, Some(&names))?;

    if let Some(n) = cfg.filter {
        table = subsample(&table, n, &mut file_rng(cfg.seed, index))?;
        log::debug!("{}: filtered into {n} events", input.display());
    }

    let mut out = EventTable::new(cfg.output_ttree.clone());
    for (name, spec) in keep {
        let mut data = table
            .column(name)
            .map(|c| c.data.clone())
            .ok_or_else(|| NtupleError::Table(format!("column '{name}' vanished")))?;
        if cfg.do_reinterpret
            && let Some(value) = spec.reinterpret
        {
            replace_sentinel(&mut data, value);
        }
        out.push_column(Column::new(cfg.output_name(name, spec), data))?;
    }

    let path = output_file(out_dir, input);
    write_table(&path, &out, MAX_ZSTD_LEVEL)?;
    Ok(FileOutcome::Written(vec![path]))
}

/// `n` distinct rows chosen uniformly at random, kept in input order.
pub fn subsample(table: &EventTable, n: usize, rng: &mut impl rand::Rng) -> Result<EventTable> {
    let rows = table.n_rows();
    if n > rows {
        return Err(NtupleError::Input(format!("cannot keep {n} of {rows} events")));
    }
    let mut idx = index::sample(rng, rows, n).into_vec();
    idx.sort_unstable();
    table.take_rows(&idx)
}

/// Replace every [`SENTINEL`] in a float column. Integer columns cannot hold it.
pub fn replace_sentinel(data: &mut ColumnData, value: f64) {
    match data {
        ColumnData::F32(v) => {
            for x in v.iter_mut().filter(|x| f64::from(**x) == SENTINEL) {
                *x = value as f32;
            }
        }
        ColumnData::F64(v) => {
            for x in v.iter_mut().filter(|x| **x == SENTINEL) {
                *x = value;
            }
        }
        _ => {}
    }
}

/// Skim every input in `input_dir`.
pub fn run_skim(cfg: &SkimConfig, input_dir: &Path, out_dir: &Path) -> Result<BatchReport> {
    ensure_distinct_dirs(input_dir, out_dir)?;
    let files = discover_inputs(input_dir, &FileFilter::none())?;
    log::info!("skimming {} file(s) from {}", files.len(), input_dir.display());
    run_batch(&files, |i, path| skim_file(cfg, path, out_dir, i))
}
