//! Tagging events with a train/test split made on an earlier pass.
//!
//! Every input event is looked up by `(Run, LumiSec, Event)` among the
//! events of the matching files in the train and test directories, and
//! gets `isTrain`/`isTest` flags from the one it matches.

use std::collections::HashMap;
use std::path::{Path, PathBuf};

use crate::batch::{BatchReport, FileOutcome, run_batch};
use crate::discover::{FileFilter, discover_inputs, ensure_distinct_dirs, file_name, file_stem, find_by_stem};
use crate::error::{NtupleError, Result};
use crate::io::{DEFAULT_ZSTD_LEVEL, InputFile, output_file, write_table};
use crate::table::{Column, ColumnData, EventTable};

const ID_COLUMNS: [&str; 3] = ["Run", "LumiSec", "Event"];

/// Directories and tree names for a pre-split pass.
#[derive(Debug, Clone)]
pub struct PresplitParams {
    /// Train outputs of the earlier split.
    pub train_dir: PathBuf,
    /// Test outputs of the earlier split.
    pub test_dir: PathBuf,
    /// Tree read from the inputs and written to the outputs.
    pub tree: String,
    /// Tree read from the train/test files.
    pub split_tree: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
struct EventId {
    run: u64,
    lumi: u64,
    event: u64,
}

/// Which split a cached id came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Origin {
    /// Training split.
    Train,
    /// Testing split.
    Test,
}

/// Cached ids of the train and test events of one sample.
#[derive(Debug, Default)]
pub struct SplitIndex {
    ids: HashMap<EventId, (usize, Origin)>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Lookup {
    Unmatched,
    Train,
    Test,
    Ambiguous(usize),
}

impl SplitIndex {
    fn insert(&mut self, id: EventId, origin: Origin) {
        self.ids.entry(id).and_modify(|(n, _)| *n += 1).or_insert((1, origin));
    }

    /// Add every event of a table tagged with its origin.
    pub fn extend(&mut self, table: &EventTable, origin: Origin) -> Result<()> {
        for id in event_ids(table)? {
            self.insert(id, origin);
        }
        Ok(())
    }

    /// Number of distinct ids.
    pub fn len(&self) -> usize {
        self.ids.len()
    }

    /// Whether nothing was cached.
    pub fn is_empty(&self) -> bool {
        self.ids.is_empty()
    }

    fn lookup(&self, id: &EventId) -> Lookup {
        match self.ids.get(id) {
            None => Lookup::Unmatched,
            Some((1, Origin::Train)) => Lookup::Train,
            Some((1, Origin::Test)) => Lookup::Test,
            Some((n, _)) => Lookup::Ambiguous(*n),
        }
    }
}

fn id_column(table: &EventTable, name: &str) -> Result<Vec<u64>> {
    let col = table
        .column(name)
        .ok_or_else(|| NtupleError::Table(format!("no '{name}' column in '{}'", table.tree_name)))?;
    match &col.data {
        ColumnData::U8(v) => Ok(v.iter().map(|&x| u64::from(x)).collect()),
        ColumnData::U16(v) => Ok(v.iter().map(|&x| u64::from(x)).collect()),
        ColumnData::U32(v) => Ok(v.iter().map(|&x| u64::from(x)).collect()),
        ColumnData::U64(v) => Ok(v.clone()),
        ColumnData::I16(v) => non_negative(name, v.iter().map(|&x| i64::from(x))),
        ColumnData::I32(v) => non_negative(name, v.iter().map(|&x| i64::from(x))),
        ColumnData::I64(v) => non_negative(name, v.iter().copied()),
        other => Err(NtupleError::Input(format!(
            "'{name}' must be an integer column, found {}",
            other.kind().type_name()
        ))),
    }
}

fn non_negative(name: &str, values: impl Iterator<Item = i64>) -> Result<Vec<u64>> {
    values
        .map(|x| u64::try_from(x).map_err(|_| NtupleError::Input(format!("negative {name} value {x}"))))
        .collect()
}

fn event_ids(table: &EventTable) -> Result<Vec<EventId>> {
    let run = id_column(table, "Run")?;
    let lumi = id_column(table, "LumiSec")?;
    let event = id_column(table, "Event")?;
    Ok(run
        .into_iter()
        .zip(lumi)
        .zip(event)
        .map(|((run, lumi), event)| EventId { run, lumi, event })
        .collect())
}

/// Outcome of tagging one table.
#[derive(Debug, Clone, PartialEq)]
pub enum Tagging {
    /// Id columns plus `isTrain`/`isTest`.
    Tagged(EventTable),
    /// Some event matched both splits: the sample was not split before.
    NotSplit,
}

/// Tag every row of `input` against `index`.
///
/// More than two matches for one event means the cached ids are corrupt,
/// which aborts the batch.
pub fn tag_events(input: &EventTable, index: &SplitIndex) -> Result<Tagging> {
    let ids = event_ids(input)?;
    let mut is_train = Vec::with_capacity(ids.len());
    let mut is_test = Vec::with_capacity(ids.len());
    for (i, id) in ids.iter().enumerate() {
        if i % 1000 == 0 {
            log::trace!("processing event {i}");
        }
        let (train, test) = match index.lookup(id) {
            Lookup::Unmatched => (0, 0),
            Lookup::Train => (1, 0),
            Lookup::Test => (0, 1),
            Lookup::Ambiguous(2) => return Ok(Tagging::NotSplit),
            Lookup::Ambiguous(n) => {
                return Err(NtupleError::Abort(format!(
                    "{n} matches for run {} lumi {} event {}, more than expected",
                    id.run, id.lumi, id.event
                )));
            }
        };
        is_train.push(train);
        is_test.push(test);
    }

    let mut out = input.select_columns(&["Run", "Event", "LumiSec"])?;
    out.push_column(Column::new("isTrain", ColumnData::U8(is_train)))?;
    out.push_column(Column::new("isTest", ColumnData::U8(is_test)))?;
    Ok(Tagging::Tagged(out))
}

fn presplit_file(params: &PresplitParams, input: &Path, out_dir: &Path) -> Result<FileOutcome> {
    let stem = file_stem(input);
    let Some(train_file) = find_by_stem(&params.train_dir, &stem) else {
        log::warn!("The pre-split train file for {} does not exist, skipping it", file_name(input));
        return Ok(FileOutcome::Skipped("no pre-split train file".into()));
    };
    let Some(test_file) = find_by_stem(&params.test_dir, &stem) else {
        log::warn!("The pre-split test file for {} does not exist, skipping it", file_name(input));
        return Ok(FileOutcome::Skipped("no pre-split test file".into()));
    };

    let columns: Vec<String> = ID_COLUMNS.iter().map(|s| s.to_string()).collect();
    let mut index = SplitIndex::default();
    let train = InputFile::open(&train_file)?.read_table(&params.split_tree, Some(&columns))?;
    index.extend(&train, Origin::Train)?;
    let test = InputFile::open(&test_file)?.read_table(&params.split_tree, Some(&columns))?;
    index.extend(&test, Origin::Test)?;
    log::debug!("cached {} pre-split ids", index.len());

    let table = InputFile::open(input)?.read_table(&params.tree, Some(&columns))?;
    log::debug!("there are {} events to split", table.n_rows());

    let path = output_file(out_dir, input);
    match tag_events(&table, &index)? {
        Tagging::Tagged(out) => {
            write_table(&path, &out, DEFAULT_ZSTD_LEVEL)?;
            Ok(FileOutcome::Written(vec![path]))
        }
        Tagging::NotSplit => {
            log::warn!(
                "The file {} was not split in the previous split, skipping it",
                file_name(input)
            );
            if path.exists() {
                std::fs::remove_file(&path)?;
            }
            Ok(FileOutcome::Skipped("not split in the previous split".into()))
        }
    }
}

/// Tag every simulated sample of `input_dir`; `Data*` files are left out.
pub fn run_presplit(params: &PresplitParams, input_dir: &Path, out_dir: &Path) -> Result<BatchReport> {
    ensure_distinct_dirs(input_dir, out_dir)?;
    let files = discover_inputs(input_dir, &FileFilter::none().skip_prefix("Data"))?;
    run_batch(&files, |_, path| presplit_file(params, path, out_dir))
}
