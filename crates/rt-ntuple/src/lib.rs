//! # rt-ntuple
//!
//! Batch operations over directories of flat ntuples.
//!
//! Inputs are `.root` files (read natively through `rt-root`) or Parquet
//! tables written by these same tools; every output is Parquet. Each tool
//! is a plain function over an input directory that returns a
//! [`BatchReport`]:
//!
//! - [`skim::run_skim`]: keep, rename and subsample branches
//! - [`selection::run_selections`]: apply a prefilter and named cuts
//! - [`split::run_split`]: random train/test split
//! - [`presplit::run_presplit`]: tag events with an earlier split
//! - [`mva::run_apply_mva`]: evaluate TMVA BDTs
//! - [`diff::diff_dirs`]: compare two directories file by file

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod batch;
pub mod config;
pub mod diff;
pub mod discover;
pub mod error;
pub mod io;
pub mod mva;
pub mod naming;
pub mod presplit;
pub mod selection;
pub mod skim;
pub mod split;
pub mod table;
pub mod tmva;

pub use batch::{BatchReport, FileOutcome, run_batch};
pub use discover::{FileFilter, discover_inputs, list_inputs};
pub use error::{NtupleError, Result};
pub use io::{InputFile, read_table, write_table};
pub use naming::natural_cmp;
pub use table::{Column, ColumnData, EventTable};
pub use tmva::TmvaBdt;
