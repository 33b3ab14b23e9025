//! # rt-root
//!
//! Native reader for flat TTrees stored in `.root` files.
//!
//! Reads key lists, TTree/TBranch metadata and scalar branch data without a
//! ROOT installation. Supports zlib, LZ4, ZSTD and XZ compressed records.
//! Also carries the selection-expression engine and the 1D histogram used by
//! the batch tools.
//!
//! ## Example
//!
//! ```no_run
//! use rt_root::RootFile;
//!
//! let f = RootFile::open("ntuple.root").unwrap();
//! for key in f.list_keys().unwrap() {
//!     println!("{} ({})", key.name, key.class_name);
//! }
//! let tree = f.get_tree("bdttree").unwrap();
//! let met = f.read_branch(&tree, "Met").unwrap().to_f64();
//! println!("{} entries, first Met {:?}", tree.entries, met.first());
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]

mod basket;
pub mod branch;
pub mod decompress;
pub mod directory;
pub mod error;
pub mod expr;
pub mod file;
pub mod histogram;
pub mod key;
mod objects;
pub mod rbuffer;
pub mod tree;

pub use branch::BranchData;
pub use error::{Result, RootError};
pub use expr::CompiledExpr;
pub use file::RootFile;
pub use histogram::Histogram1D;
pub use key::KeyInfo;
pub use tree::{BranchInfo, LeafKind, Tree};
