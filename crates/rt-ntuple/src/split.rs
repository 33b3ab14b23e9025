//! Random train/test split of simulated samples.

use std::path::Path;

use rand::seq::index;

use crate::batch::{BatchReport, FileOutcome, file_rng, run_batch};
use crate::discover::{FileFilter, discover_inputs, ensure_distinct_dirs};
use crate::error::{NtupleError, Result};
use crate::io::{DEFAULT_ZSTD_LEVEL, InputFile, output_file, write_table};
use crate::table::{Column, ColumnData, EventTable};

/// Column holding the weight that restores the full-sample normalisation.
pub const SPLIT_FACTOR: &str = "splitFactor";

/// Split proportions and seed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SplitParams {
    /// Relative share of training events.
    pub train_factor: u32,
    /// Relative share of testing events.
    pub test_factor: u32,
    /// Base seed; OS entropy when absent.
    pub seed: Option<u64>,
}

impl Default for SplitParams {
    fn default() -> Self {
        Self { train_factor: 1, test_factor: 1, seed: None }
    }
}

impl SplitParams {
    /// Both factors must be positive.
    pub fn validate(&self) -> Result<()> {
        if self.train_factor == 0 || self.test_factor == 0 {
            return Err(NtupleError::Config("train and test factors must be positive".into()));
        }
        Ok(())
    }

    /// `floor(n * train / (train + test))`.
    pub fn train_events(&self, n: usize) -> usize {
        let total = u128::from(self.train_factor) + u128::from(self.test_factor);
        (n as u128 * u128::from(self.train_factor) / total) as usize
    }

    fn weights(&self) -> (f32, f32) {
        let total = self.train_factor as f32 + self.test_factor as f32;
        (total / self.train_factor as f32, total / self.test_factor as f32)
    }
}

/// Split `table` into (train, test), each with a `splitFactor` column.
pub fn split_table(
    table: &EventTable,
    params: &SplitParams,
    rng: &mut impl rand::Rng,
) -> Result<(EventTable, EventTable)> {
    let n = table.n_rows();
    let n_train = params.train_events(n);
    log::debug!("splitting into {n_train} events for training and {} for testing", n - n_train);

    let mut is_train = vec![false; n];
    for i in index::sample(rng, n, n_train) {
        is_train[i] = true;
    }
    let is_test: Vec<bool> = is_train.iter().map(|&t| !t).collect();

    let (w_train, w_test) = params.weights();
    let mut train = table.filter_mask(&is_train)?;
    let rows = train.n_rows();
    train.replace_column(Column::new(SPLIT_FACTOR, ColumnData::F32(vec![w_train; rows])))?;
    let mut test = table.filter_mask(&is_test)?;
    let rows = test.n_rows();
    test.replace_column(Column::new(SPLIT_FACTOR, ColumnData::F32(vec![w_test; rows])))?;
    Ok((train, test))
}

fn split_file(
    params: &SplitParams,
    input: &Path,
    out_dir: &Path,
    tree: &str,
    index: usize,
) -> Result<FileOutcome> {
    let table = InputFile::open(input)?.read_table(tree, None)?;
    log::debug!("{}: started with {} events", input.display(), table.n_rows());
    let (train, test) = split_table(&table, params, &mut file_rng(params.seed, index))?;

    let train_path = output_file(&out_dir.join("Train"), input);
    let test_path = output_file(&out_dir.join("Test"), input);
    write_table(&train_path, &train, DEFAULT_ZSTD_LEVEL)?;
    write_table(&test_path, &test, DEFAULT_ZSTD_LEVEL)?;
    Ok(FileOutcome::Written(vec![train_path, test_path]))
}

/// Split every simulated sample of `input_dir` into `<out>/Train` and `<out>/Test`.
///
/// `puWeights` and files whose name starts with `Data` are left out.
pub fn run_split(
    params: &SplitParams,
    input_dir: &Path,
    out_dir: &Path,
    tree: &str,
) -> Result<BatchReport> {
    params.validate()?;
    ensure_distinct_dirs(input_dir, out_dir)?;
    std::fs::create_dir_all(out_dir.join("Train"))?;
    std::fs::create_dir_all(out_dir.join("Test"))?;

    let filter = FileFilter::none().skip_stem("puWeights").skip_prefix("Data");
    let files = discover_inputs(input_dir, &filter)?;
    run_batch(&files, |i, path| split_file(params, path, out_dir, tree, i))
}
