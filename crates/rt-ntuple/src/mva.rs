//! Applying trained BDTs to ntuples, and checking one against stored values.

use std::path::{Path, PathBuf};

use rt_root::Histogram1D;
use serde::{Deserialize, Serialize};

use crate::batch::{BatchReport, FileOutcome, run_batch};
use crate::config::{load_yaml, ordered_map};
use crate::discover::{FileFilter, discover_inputs, ensure_distinct_dirs};
use crate::error::{NtupleError, Result};
use crate::io::{DEFAULT_ZSTD_LEVEL, InputFile, output_file, write_table};
use crate::table::{Column, ColumnData, EventTable};
use crate::tmva::TmvaBdt;

/// One MVA entry of the YAML list.
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
pub struct MvaSpec {
    /// Input branches, in the order the BDT was trained with.
    #[serde(default)]
    pub variables: Vec<String>,
    /// Weight file, relative to the weight directory unless absolute.
    #[serde(default)]
    pub weights: PathBuf,
}

/// Named MVAs, in output column order.
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(transparent)]
pub struct MvaList {
    /// `(name, spec)` pairs.
    #[serde(deserialize_with = "ordered_map")]
    pub entries: Vec<(String, MvaSpec)>,
}

impl MvaList {
    /// Parse a YAML MVA list.
    pub fn from_yaml_file(path: &Path) -> Result<Self> {
        let list: Self = load_yaml(path)?;
        if list.entries.is_empty() {
            return Err(NtupleError::Config("no MVAs listed".into()));
        }
        for (name, spec) in &list.entries {
            if spec.variables.is_empty() || spec.weights.as_os_str().is_empty() {
                return Err(NtupleError::Config(format!(
                    "MVA '{name}' needs both variables and weights"
                )));
            }
        }
        Ok(list)
    }
}

/// A BDT ready to evaluate, with the branches it reads.
#[derive(Debug, Clone)]
pub struct BookedMva {
    /// Output column name.
    pub name: String,
    /// Input branch names.
    pub variables: Vec<String>,
    /// The forest.
    pub bdt: TmvaBdt,
}

/// `weights` as given when absolute, otherwise under `weight_dir`.
pub fn resolve_weights(weights: &Path, weight_dir: &Path) -> PathBuf {
    if weights.is_absolute() { weights.to_path_buf() } else { weight_dir.join(weights) }
}

/// Load every weight file of the list.
pub fn book_mvas(list: &MvaList, weight_dir: &Path) -> Result<Vec<BookedMva>> {
    list.entries
        .iter()
        .map(|(name, spec)| {
            let path = resolve_weights(&spec.weights, weight_dir);
            log::info!("booking MVA '{name}' from {}", path.display());
            let bdt = TmvaBdt::from_file(&path)?;
            bdt.check_variables(&spec.variables)?;
            Ok(BookedMva { name: name.clone(), variables: spec.variables.clone(), bdt })
        })
        .collect()
}

/// Evaluate `bdt` on every row, reading `variables` from `table` as `f32`.
pub fn evaluate_rows(table: &EventTable, variables: &[String], bdt: &TmvaBdt) -> Result<Vec<f64>> {
    let columns = variables
        .iter()
        .map(|v| table.column_f64(v))
        .collect::<Result<Vec<_>>>()?;
    let mut row = vec![0f32; columns.len()];
    Ok((0..table.n_rows())
        .map(|i| {
            for (slot, col) in row.iter_mut().zip(&columns) {
                *slot = col[i] as f32;
            }
            bdt.evaluate(&row)
        })
        .collect())
}

fn needed_columns(mvas: &[BookedMva]) -> Vec<String> {
    let mut out: Vec<String> = Vec::new();
    for v in mvas.iter().flat_map(|m| &m.variables) {
        if !out.contains(v) {
            out.push(v.clone());
        }
    }
    out
}

/// One `f32` column per MVA for the rows of `table`.
pub fn apply_mvas(table: &EventTable, mvas: &[BookedMva]) -> Result<EventTable> {
    let mut out = EventTable::new(table.tree_name.clone());
    for m in mvas {
        let values = evaluate_rows(table, &m.variables, &m.bdt)?;
        let data = ColumnData::F32(values.into_iter().map(|v| v as f32).collect());
        out.push_column(Column::new(m.name.clone(), data))?;
    }
    Ok(out)
}

fn apply_file(mvas: &[BookedMva], input: &Path, out_dir: &Path, tree: &str) -> Result<FileOutcome> {
    let columns = needed_columns(mvas);
    let table = InputFile::open(input)?.read_table(tree, Some(&columns))?;
    log::debug!("computing {} MVA(s) for {} events", mvas.len(), table.n_rows());
    let out = apply_mvas(&table, mvas)?;
    let path = output_file(out_dir, input);
    write_table(&path, &out, DEFAULT_ZSTD_LEVEL)?;
    Ok(FileOutcome::Written(vec![path]))
}

/// Compute every MVA for each input of `input_dir`.
pub fn run_apply_mva(
    mvas: &[BookedMva],
    input_dir: &Path,
    out_dir: &Path,
    tree: &str,
) -> Result<BatchReport> {
    ensure_distinct_dirs(input_dir, out_dir)?;
    let files = discover_inputs(input_dir, &FileFilter::none())?;
    run_batch(&files, |_, path| apply_file(mvas, path, out_dir, tree))
}

/// Variable list for `test-mva`.
#[derive(Debug, Clone, Deserialize)]
pub struct VariableList {
    /// Input branches, in training order.
    pub variables: Vec<String>,
}

/// A histogram written as a JSON artifact.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct HistogramArtifact {
    /// Histogram name (also the file stem).
    pub name: String,
    /// Human-readable title.
    pub title: String,
    /// Bin edges, one more than the contents.
    pub edges: Vec<f64>,
    /// Bin contents.
    pub contents: Vec<f64>,
    /// Sum of weights below the range.
    pub underflow: f64,
    /// Sum of weights at or above the range.
    pub overflow: f64,
    /// Number of fills.
    pub entries: u64,
    /// In-range mean.
    pub mean: f64,
}

impl HistogramArtifact {
    /// Snapshot of a histogram.
    pub fn new(name: &str, title: &str, h: &Histogram1D) -> Self {
        Self {
            name: name.to_string(),
            title: title.to_string(),
            edges: h.bin_edges(),
            contents: h.contents().to_vec(),
            underflow: h.underflow(),
            overflow: h.overflow(),
            entries: h.entries(),
            mean: h.mean(),
        }
    }

    /// Write `<dir>/<name>.json`.
    pub fn write(&self, dir: &Path) -> Result<PathBuf> {
        let path = dir.join(format!("{}.json", self.name));
        std::fs::write(&path, serde_json::to_string_pretty(self)?)?;
        Ok(path)
    }
}

/// Inputs of a `test-mva` run.
#[derive(Debug, Clone)]
pub struct TestMvaParams {
    /// Tree to read.
    pub tree: String,
    /// Branch holding previously computed values; empty to skip the comparison.
    pub variable_name: String,
}

/// Histograms produced by a `test-mva` run.
#[derive(Debug, Clone, PartialEq)]
pub struct TestMvaResult {
    /// Computed output, 2000 bins over [-1, 1].
    pub mva: HistogramArtifact,
    /// Computed minus stored, 2000 bins over [-1e-7, 1e-7].
    pub diff: Option<HistogramArtifact>,
}

/// Evaluate `bdt` on `table` and histogram the output (and its difference
/// to the stored branch, when one is named).
pub fn test_mva(
    table: &EventTable,
    variables: &[String],
    bdt: &TmvaBdt,
    variable_name: &str,
) -> Result<TestMvaResult> {
    bdt.check_variables(variables)?;
    let computed = evaluate_rows(table, variables, bdt)?;

    let mut mva_hist = Histogram1D::new(2000, -1.0, 1.0)?;
    for &v in &computed {
        mva_hist.fill(v);
    }

    let diff = if variable_name.is_empty() {
        None
    } else {
        // the stored branch went through a float
        let stored = table.column_f64(variable_name)?;
        let mut h = Histogram1D::new(2000, -1e-7, 1e-7)?;
        for (c, s) in computed.iter().zip(&stored) {
            h.fill(c - f64::from(*s as f32));
        }
        Some(HistogramArtifact::new("diff_mva_hist", "MVA Difference Histogram", &h))
    };

    Ok(TestMvaResult { mva: HistogramArtifact::new("mva_hist", "MVA Histogram", &mva_hist), diff })
}

/// Run `test-mva` on one file and write the JSON artifacts into `out_dir`.
pub fn run_test_mva(
    input: &Path,
    weight_file: &Path,
    variable_file: &Path,
    out_dir: &Path,
    params: &TestMvaParams,
) -> Result<Vec<PathBuf>> {
    let vars: VariableList = load_yaml(variable_file).map_err(|e| {
        NtupleError::Config(format!("The yaml file does not contain any variable information ({e})"))
    })?;
    let bdt = TmvaBdt::from_file(weight_file)?;

    let mut columns = vars.variables.clone();
    if !params.variable_name.is_empty() && !columns.contains(&params.variable_name) {
        columns.push(params.variable_name.clone());
    }
    let table = InputFile::open(input)?.read_table(&params.tree, Some(&columns))?;
    let result = test_mva(&table, &vars.variables, &bdt, &params.variable_name)?;

    let mut written = vec![result.mva.write(out_dir)?];
    if let Some(diff) = &result.diff {
        written.push(diff.write(out_dir)?);
    }
    Ok(written)
}
