//! Applying named cuts, with an optional shared prefilter.

use std::collections::HashSet;
use std::path::{Path, PathBuf};

use rt_root::CompiledExpr;
use serde::Deserialize;

use crate::batch::{BatchReport, FileOutcome, run_batch};
use crate::config::load_json;
use crate::discover::{FileFilter, discover_inputs, ensure_distinct_dirs};
use crate::error::{NtupleError, Result};
use crate::io::{DEFAULT_ZSTD_LEVEL, InputFile, output_file, write_table};
use crate::table::EventTable;

/// Directory receiving prefiltered tables.
pub const PREFILTER_DIR: &str = "Prefilter";

/// One named cut.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct Cut {
    /// Output sub-directory name.
    pub name: String,
    /// Selection expression.
    pub expression: String,
}

/// A parsed selection job.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct SelectionConfig {
    /// Applied before every cut; its result is also written out.
    #[serde(default)]
    pub prefilter: Option<String>,
    /// Cuts, each written to its own directory.
    #[serde(default)]
    pub cuts: Vec<Cut>,
}

impl SelectionConfig {
    /// Parse and validate a JSON job file.
    pub fn from_json_file(path: &Path) -> Result<Self> {
        let cfg: Self = load_json(path)?;
        cfg.validate()?;
        Ok(cfg)
    }

    /// Check names and compile every expression once.
    pub fn validate(&self) -> Result<()> {
        self.compile().map(|_| ())
    }

    fn compile(&self) -> Result<CompiledSelections> {
        let prefilter = self.prefilter.as_deref().map(CompiledExpr::compile).transpose()?;
        let mut names = HashSet::new();
        let mut cuts = Vec::with_capacity(self.cuts.len());
        for cut in &self.cuts {
            let n = cut.name.as_str();
            if n.is_empty() || n == "." || n == ".." || n.contains(['/', '\\']) {
                return Err(NtupleError::Config(format!("cut name '{n}' is not a directory name")));
            }
            if !names.insert(n) {
                return Err(NtupleError::Config(format!("cut '{n}' defined twice")));
            }
            if prefilter.is_some() && n == PREFILTER_DIR {
                return Err(NtupleError::Config(format!(
                    "cut name '{n}' clashes with the prefilter output"
                )));
            }
            cuts.push((cut.name.clone(), CompiledExpr::compile(&cut.expression)?));
        }
        Ok(CompiledSelections { prefilter, cuts })
    }
}

struct CompiledSelections {
    prefilter: Option<CompiledExpr>,
    cuts: Vec<(String, CompiledExpr)>,
}

/// Rows of `table` passing `expr`.
pub fn selection_mask(table: &EventTable, expr: &CompiledExpr) -> Result<Vec<bool>> {
    let columns = expr
        .required_branches
        .iter()
        .map(|name| table.column_f64(name))
        .collect::<Result<Vec<_>>>()?;
    let views: Vec<&[f64]> = columns.iter().map(Vec::as_slice).collect();
    Ok(expr.eval_mask(&views, table.n_rows()))
}

/// Keep the rows of `table` passing `expr`.
pub fn apply_selection(table: &EventTable, expr: &CompiledExpr) -> Result<EventTable> {
    table.filter_mask(&selection_mask(table, expr)?)
}

fn select_file(
    sel: &CompiledSelections,
    input: &Path,
    out_dir: &Path,
    tree: &str,
) -> Result<FileOutcome> {
    let file = InputFile::open(input)?;
    let mut table = file.read_table(tree, None)?;
    log::debug!("{}: started with {} events", input.display(), table.n_rows());

    let mut written: Vec<PathBuf> = Vec::new();
    if let Some(pre) = &sel.prefilter {
        table = apply_selection(&table, pre)?;
        log::debug!("filtered down to {} events with the prefilter", table.n_rows());
        let path = output_file(&out_dir.join(PREFILTER_DIR), input);
        write_table(&path, &table, DEFAULT_ZSTD_LEVEL)?;
        written.push(path);
    }

    for (name, expr) in &sel.cuts {
        let selected = apply_selection(&table, expr)?;
        log::debug!("got {} events for selection {name}", selected.n_rows());
        let path = output_file(&out_dir.join(name), input);
        write_table(&path, &selected, DEFAULT_ZSTD_LEVEL)?;
        written.push(path);
    }
    Ok(FileOutcome::Written(written))
}

/// Apply the selections to every input in `input_dir` except `puWeights`.
pub fn run_selections(
    cfg: &SelectionConfig,
    input_dir: &Path,
    out_dir: &Path,
    tree: &str,
) -> Result<BatchReport> {
    ensure_distinct_dirs(input_dir, out_dir)?;
    let sel = cfg.compile()?;
    if sel.prefilter.is_some() {
        std::fs::create_dir_all(out_dir.join(PREFILTER_DIR))?;
    }
    for (name, _) in &sel.cuts {
        std::fs::create_dir_all(out_dir.join(name))?;
    }

    let files = discover_inputs(input_dir, &FileFilter::none().skip_stem("puWeights"))?;
    run_batch(&files, |_, path| select_file(&sel, path, out_dir, tree))
}
