//! root-tools CLI

mod paths;

use std::path::PathBuf;

use anyhow::{Context, Result, bail};
use clap::{Parser, Subcommand};
use rt_ntuple::diff::{DiffParams, diff_dirs};
use rt_ntuple::io::InputFile;
use rt_ntuple::mva::{MvaList, TestMvaParams, book_mvas, run_apply_mva, run_test_mva};
use rt_ntuple::presplit::{PresplitParams, run_presplit};
use rt_ntuple::selection::{SelectionConfig, run_selections};
use rt_ntuple::skim::{SkimConfig, run_skim};
use rt_ntuple::split::{SplitParams, run_split};
use rt_ntuple::{BatchReport, NtupleError};
use rt_root::RootError;

/// Full log destination for `--log-file`.
const LOG_FILE: &str = "logging.log";

#[derive(Parser)]
#[command(name = "root-tools")]
#[command(about = "root-tools - batch operations over directories of flat ntuples")]
#[command(version)]
struct Cli {
    /// Log verbosity level (trace, debug, info, warn, error)
    #[arg(long, global = true, default_value = "warn")]
    log_level: tracing::Level,

    /// Write the full log (all levels, no colours) to `logging.log` instead.
    #[arg(long, global = true)]
    log_file: bool,

    /// Threads (0 = auto).
    #[arg(long, global = true, default_value = "1")]
    threads: usize,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Keep, rename and subsample branches as described by a YAML job
    Skim {
        /// Directory with the input ntuples
        #[arg(short, long)]
        input: PathBuf,

        /// Directory receiving the skimmed ntuples
        #[arg(short, long)]
        output: PathBuf,

        /// Skim job (YAML)
        #[arg(short, long)]
        yaml: PathBuf,
    },

    /// Apply a prefilter and named cuts from a JSON file
    Select {
        /// Directory with the input ntuples
        #[arg(short, long)]
        input: PathBuf,

        /// Directory receiving one sub-directory per cut
        #[arg(short, long)]
        output: PathBuf,

        /// Selections (JSON)
        #[arg(short, long)]
        json: PathBuf,

        /// Tree to select from
        #[arg(short, long, default_value = "bdttree")]
        tree: String,
    },

    /// Randomly split every sample into Train/ and Test/
    Split {
        /// Directory with the input ntuples
        #[arg(short, long)]
        input: PathBuf,

        /// Directory receiving Train/ and Test/
        #[arg(short, long)]
        output: PathBuf,

        /// Tree to split
        #[arg(short, long, default_value = "bdttree")]
        tree: String,

        /// Relative share of training events
        #[arg(long, default_value = "1")]
        train_factor: u32,

        /// Relative share of testing events
        #[arg(long, default_value = "1")]
        test_factor: u32,

        /// Base seed; each file uses seed + its position
        #[arg(short, long)]
        seed: Option<u64>,
    },

    /// Tag events with the train/test split of an earlier pass
    Presplit {
        /// Directory with the input ntuples
        #[arg(short, long)]
        input: PathBuf,

        /// Train outputs of the earlier split
        #[arg(long)]
        train_path: PathBuf,

        /// Test outputs of the earlier split
        #[arg(long)]
        test_path: PathBuf,

        /// Directory receiving the tagged tables
        #[arg(short, long)]
        output: PathBuf,

        /// Tree read from the inputs
        #[arg(short, long, default_value = "bdttree")]
        tree: String,

        /// Tree read from the train/test files
        #[arg(long, default_value = "bdttree")]
        split_tree: String,
    },

    /// Compare two directories of ntuples file by file
    Diff {
        /// Left directory
        #[arg(short, long)]
        left: PathBuf,

        /// Right directory
        #[arg(short, long)]
        right: PathBuf,

        /// Report file (must not exist). Defaults to stdout.
        #[arg(short, long)]
        output: Option<PathBuf>,

        /// Tree compared in both files
        #[arg(short, long, default_value = "bdttree")]
        tree: String,

        /// Variable whose mean is compared
        #[arg(short, long, default_value = "nVert")]
        variable: String,

        /// Lower edge of the mean histogram
        #[arg(long, default_value = "0.0", allow_hyphen_values = true)]
        variable_min: f64,

        /// Upper edge of the mean histogram
        #[arg(long, default_value = "100.0", allow_hyphen_values = true)]
        variable_max: f64,

        /// Also list files that match
        #[arg(short = 'm', long)]
        show_matches: bool,

        /// Stem suffix ignored on the left when pairing names
        #[arg(long, default_value = "")]
        ignore_left_suffix: String,

        /// Stem suffix ignored on the right when pairing names
        #[arg(long, default_value = "")]
        ignore_right_suffix: String,
    },

    /// Evaluate TMVA BDTs on every input
    ApplyMva {
        /// Directory with the input ntuples
        #[arg(short, long)]
        input: PathBuf,

        /// MVA list (YAML)
        #[arg(short, long)]
        mva_file: PathBuf,

        /// Directory receiving one table of MVA outputs per input
        #[arg(short, long)]
        output: PathBuf,

        /// Tree to read
        #[arg(short, long, default_value = "bdttree")]
        tree: String,

        /// Base directory for relative weight paths
        #[arg(short, long, default_value = ".")]
        weight_path: PathBuf,
    },

    /// Histogram a BDT on one file and compare it with a stored branch
    TestMva {
        /// Input ntuple
        #[arg(short, long)]
        input: PathBuf,

        /// TMVA weight file
        #[arg(short, long)]
        weight_file: PathBuf,

        /// Variable list (YAML, `variables: [...]`)
        #[arg(short = 'y', long)]
        variable_file: PathBuf,

        /// Directory receiving the histogram artifacts
        #[arg(short, long)]
        output: PathBuf,

        /// Tree to read
        #[arg(short, long, default_value = "bdttree")]
        tree: String,

        /// Branch with previously computed values; empty to skip the comparison
        #[arg(short, long, default_value = "BDT")]
        variable_name: String,
    },

    /// List the keys of a file and the branches of one tree (pretty JSON)
    Inspect {
        /// ROOT or Parquet file
        #[arg(short, long)]
        input: PathBuf,

        /// Tree whose branches are listed
        #[arg(short, long, default_value = "bdttree")]
        tree: String,
    },
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    init_logging(cli.log_level, cli.log_file)?;
    if cli.threads > 0 {
        // Best-effort; if a global pool already exists, keep going.
        let _ = rayon::ThreadPoolBuilder::new().num_threads(cli.threads).build_global();
    }

    match cli.command {
        Commands::Skim { input, output, yaml } => cmd_skim(&input, &output, &yaml),
        Commands::Select { input, output, json, tree } => cmd_select(&input, &output, &json, &tree),
        Commands::Split { input, output, tree, train_factor, test_factor, seed } => {
            let params = SplitParams { train_factor, test_factor, seed };
            cmd_split(&input, &output, &tree, &params)
        }
        Commands::Presplit { input, train_path, test_path, output, tree, split_tree } => {
            let params = PresplitParams { train_dir: train_path, test_dir: test_path, tree, split_tree };
            cmd_presplit(&input, &output, &params)
        }
        Commands::Diff {
            left,
            right,
            output,
            tree,
            variable,
            variable_min,
            variable_max,
            show_matches,
            ignore_left_suffix,
            ignore_right_suffix,
        } => {
            let params = DiffParams {
                tree,
                variable,
                min: variable_min,
                max: variable_max,
                ignore_left_suffix,
                ignore_right_suffix,
            };
            cmd_diff(&left, &right, output.as_ref(), &params, show_matches)
        }
        Commands::ApplyMva { input, mva_file, output, tree, weight_path } => {
            cmd_apply_mva(&input, &mva_file, &output, &tree, &weight_path)
        }
        Commands::TestMva { input, weight_file, variable_file, output, tree, variable_name } => {
            let params = TestMvaParams { tree, variable_name };
            cmd_test_mva(&input, &weight_file, &variable_file, &output, &params)
        }
        Commands::Inspect { input, tree } => cmd_inspect(&input, &tree),
    }
}

fn init_logging(level: tracing::Level, log_file: bool) -> Result<()> {
    if log_file {
        let file = std::fs::File::create(LOG_FILE).with_context(|| format!("create {LOG_FILE}"))?;
        tracing_subscriber::fmt()
            .with_max_level(tracing::Level::TRACE)
            .with_ansi(false)
            .with_writer(std::sync::Mutex::new(file))
            .init();
    } else {
        tracing_subscriber::fmt()
            .with_max_level(level)
            .with_target(false)
            .with_writer(std::io::stderr)
            .init();
    }
    Ok(())
}

fn cmd_skim(input: &PathBuf, output: &PathBuf, yaml: &PathBuf) -> Result<()> {
    paths::existing_dir(input, "input path")?;
    paths::existing_dir(output, "output path")?;
    paths::existing_file(yaml, "yaml file")?;

    let cfg = SkimConfig::from_yaml_file(yaml)?;
    tracing::info!(branches = cfg.branches.len(), filter = ?cfg.filter, "skim job loaded");
    finish_batch(run_skim(&cfg, input, output)?)
}

fn cmd_select(input: &PathBuf, output: &PathBuf, json: &PathBuf, tree: &str) -> Result<()> {
    paths::existing_dir(input, "input path")?;
    paths::existing_dir(output, "output path")?;
    paths::existing_file(json, "json file")?;

    let cfg = SelectionConfig::from_json_file(json)?;
    tracing::info!(cuts = cfg.cuts.len(), prefilter = cfg.prefilter.is_some(), "selections loaded");
    finish_batch(run_selections(&cfg, input, output, tree)?)
}

fn cmd_split(input: &PathBuf, output: &PathBuf, tree: &str, params: &SplitParams) -> Result<()> {
    paths::existing_dir(input, "input path")?;
    paths::existing_dir(output, "output path")?;
    params.validate()?;

    finish_batch(run_split(params, input, output, tree)?)
}

fn cmd_presplit(input: &PathBuf, output: &PathBuf, params: &PresplitParams) -> Result<()> {
    paths::existing_dir(input, "input path")?;
    paths::existing_dir(&params.train_dir, "train path")?;
    paths::existing_dir(&params.test_dir, "test path")?;
    paths::existing_dir(output, "output path")?;

    finish_batch(run_presplit(params, input, output)?)
}

fn cmd_diff(
    left: &PathBuf,
    right: &PathBuf,
    output: Option<&PathBuf>,
    params: &DiffParams,
    show_matches: bool,
) -> Result<()> {
    paths::existing_dir(left, "left path")?;
    paths::existing_dir(right, "right path")?;
    if let Some(path) = output {
        paths::new_file(path, "output file")?;
    }

    let report = diff_dirs(left, right, params)?;
    let text = report.render(show_matches);
    if let Some(path) = output {
        std::fs::write(path, text).with_context(|| format!("write {}", path.display()))?;
    } else {
        print!("{text}");
    }
    tracing::info!(pairs = report.entries.len(), all_match = report.all_match(), "diff complete");
    Ok(())
}

fn cmd_apply_mva(
    input: &PathBuf,
    mva_file: &PathBuf,
    output: &PathBuf,
    tree: &str,
    weight_path: &PathBuf,
) -> Result<()> {
    paths::existing_dir(input, "input path")?;
    paths::existing_dir(output, "output path")?;
    paths::existing_file(mva_file, "mva file")?;
    paths::existing_dir(weight_path, "weight path")?;

    let list = MvaList::from_yaml_file(mva_file)?;
    let booked = book_mvas(&list, weight_path)?;
    tracing::info!(mvas = booked.len(), "MVAs booked");
    finish_batch(run_apply_mva(&booked, input, output, tree)?)
}

fn cmd_test_mva(
    input: &PathBuf,
    weight_file: &PathBuf,
    variable_file: &PathBuf,
    output: &PathBuf,
    params: &TestMvaParams,
) -> Result<()> {
    paths::existing_file(input, "input file")?;
    paths::existing_file(weight_file, "weight file")?;
    paths::existing_file(variable_file, "variable file")?;
    paths::existing_dir(output, "output path")?;

    let written = run_test_mva(input, weight_file, variable_file, output, params)?;
    write_json(serde_json::json!({ "written": written }))
}

fn cmd_inspect(input: &PathBuf, tree: &str) -> Result<()> {
    paths::existing_file(input, "input file")?;

    let file = InputFile::open(input)?;
    let keys: Vec<serde_json::Value> = match &file {
        InputFile::Root(root) => root
            .list_keys()?
            .into_iter()
            .map(|k| serde_json::json!({ "name": k.name, "class": k.class_name, "cycle": k.cycle }))
            .collect(),
        InputFile::Parquet { .. } => Vec::new(),
    };
    let tree_json = match file.table_info(tree) {
        Ok(info) => {
            let branches: Vec<serde_json::Value> = info
                .columns
                .iter()
                .map(|c| serde_json::json!({ "name": c.name, "type": c.type_name, "scalar": c.readable }))
                .collect();
            serde_json::json!({ "name": info.tree_name, "entries": info.n_rows, "branches": branches })
        }
        Err(NtupleError::Root(RootError::TreeNotFound(_) | RootError::KeyNotFound(_))) => {
            tracing::warn!(tree, "tree not found");
            serde_json::Value::Null
        }
        Err(e) => return Err(e.into()),
    };

    write_json(serde_json::json!({
        "path": input.display().to_string(),
        "keys": keys,
        "tree": tree_json,
    }))
}

fn finish_batch(report: BatchReport) -> Result<()> {
    tracing::info!(
        processed = report.processed.len(),
        skipped = report.skipped.len(),
        failed = report.failed.len(),
        "batch complete"
    );
    write_json(serde_json::to_value(&report)?)?;
    if !report.is_success() {
        bail!("{} of {} file(s) failed", report.failed.len(), report.total());
    }
    Ok(())
}

fn write_json(value: serde_json::Value) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(&value)?);
    Ok(())
}
