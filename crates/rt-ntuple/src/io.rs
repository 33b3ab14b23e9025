//! Reading event tables from `.root` or `.parquet` files, writing Parquet.
//!
//! ROOT inputs go through the native reader in `rt-root`. Parquet inputs are
//! the files these tools write themselves, so tools can be chained: the tree
//! name travels in the Arrow schema metadata under [`TREE_NAME_KEY`].

use std::collections::HashMap;
use std::fs::File;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use arrow::array::{
    Array, ArrayRef, AsArray, BooleanArray, Float32Array, Float64Array, Int8Array, Int16Array,
    Int32Array, Int64Array, UInt8Array, UInt16Array, UInt32Array, UInt64Array,
};
use arrow::datatypes::{
    DataType, Field, Float32Type, Float64Type, Int8Type, Int16Type, Int32Type, Int64Type, Schema,
    UInt8Type, UInt16Type, UInt32Type, UInt64Type,
};
use arrow::record_batch::RecordBatch;
use parquet::arrow::arrow_reader::{ArrowReaderMetadata, ParquetRecordBatchReaderBuilder};
use parquet::arrow::{ArrowWriter, ProjectionMask};
use parquet::basic::{Compression, ZstdLevel};
use parquet::file::properties::WriterProperties;
use rt_root::{LeafKind, RootError, RootFile};

use crate::error::{NtupleError, Result};
use crate::table::{Column, ColumnData, EventTable};

/// Schema metadata key holding the tree name of a Parquet table.
pub const TREE_NAME_KEY: &str = "tree_name";

/// ZSTD level used unless a tool asks for more.
pub const DEFAULT_ZSTD_LEVEL: i32 = 3;

/// Highest ZSTD level, used for skims.
pub const MAX_ZSTD_LEVEL: i32 = 9;

/// Input file formats the tools understand.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InputFormat {
    /// A ROOT file holding a TTree.
    Root,
    /// A Parquet table written by these tools.
    Parquet,
}

impl InputFormat {
    /// Format from the file extension, if supported.
    pub fn from_path(path: &Path) -> Option<Self> {
        match path.extension().and_then(|e| e.to_str()) {
            Some("root") => Some(InputFormat::Root),
            Some("parquet") => Some(InputFormat::Parquet),
            _ => None,
        }
    }
}

/// Per-column metadata, without reading any values.
#[derive(Debug, Clone, PartialEq)]
pub struct ColumnInfo {
    /// Column (branch) name.
    pub name: String,
    /// Decoded kind, when the column holds plain scalars.
    pub kind: Option<LeafKind>,
    /// ROOT typedef name (e.g. `Float_t`), or the raw type description.
    pub type_name: String,
    /// Whether [`InputFile::read_table`] can load it.
    pub readable: bool,
}

/// Shape of one tree in an input file.
#[derive(Debug, Clone, PartialEq)]
pub struct TableInfo {
    /// Tree name.
    pub tree_name: String,
    /// Number of entries.
    pub n_rows: u64,
    /// All columns, readable or not.
    pub columns: Vec<ColumnInfo>,
}

impl TableInfo {
    /// Look up a column by name.
    pub fn column(&self, name: &str) -> Option<&ColumnInfo> {
        self.columns.iter().find(|c| c.name == name)
    }
}

/// An opened input file of either format.
#[derive(Debug)]
pub enum InputFile {
    /// ROOT file.
    Root(RootFile),
    /// Parquet file with its footer already parsed.
    Parquet {
        /// Location on disk.
        path: PathBuf,
        /// Parsed footer and Arrow schema.
        metadata: ArrowReaderMetadata,
    },
}

impl InputFile {
    /// Open a file, picking the format from its extension.
    pub fn open(path: &Path) -> Result<Self> {
        match InputFormat::from_path(path) {
            Some(InputFormat::Root) => Ok(InputFile::Root(RootFile::open(path)?)),
            Some(InputFormat::Parquet) => {
                let file = File::open(path)?;
                let metadata = ArrowReaderMetadata::load(&file, Default::default())?;
                Ok(InputFile::Parquet { path: path.to_path_buf(), metadata })
            }
            None => Err(NtupleError::Input(format!(
                "{}: expected a .root or .parquet file",
                path.display()
            ))),
        }
    }

    /// Column list and entry count of `tree`.
    ///
    /// Fails with [`RootError::TreeNotFound`] when the file holds no such tree.
    pub fn table_info(&self, tree: &str) -> Result<TableInfo> {
        match self {
            InputFile::Root(f) => {
                let t = f.get_tree(tree)?;
                let columns = t
                    .branches
                    .iter()
                    .map(|b| ColumnInfo {
                        name: b.name.clone(),
                        kind: b.leaf_kind,
                        type_name: b.type_name().to_string(),
                        readable: b.is_scalar(),
                    })
                    .collect();
                Ok(TableInfo { tree_name: t.name.clone(), n_rows: t.entries, columns })
            }
            InputFile::Parquet { metadata, .. } => {
                check_tree_name(metadata.schema(), tree)?;
                let columns = metadata
                    .schema()
                    .fields()
                    .iter()
                    .map(|f| {
                        let kind = kind_of(f.data_type());
                        ColumnInfo {
                            name: f.name().clone(),
                            kind,
                            type_name: kind
                                .map(|k| k.type_name().to_string())
                                .unwrap_or_else(|| f.data_type().to_string()),
                            readable: kind.is_some(),
                        }
                    })
                    .collect();
                let n_rows = u64::try_from(metadata.metadata().file_metadata().num_rows())
                    .map_err(|_| NtupleError::Input("negative row count in footer".into()))?;
                Ok(TableInfo { tree_name: tree.to_string(), n_rows, columns })
            }
        }
    }

    /// Load `tree` into memory.
    ///
    /// With `columns = None` every readable column is loaded and the rest are
    /// skipped with a debug log. Named columns must exist and be readable.
    pub fn read_table(&self, tree: &str, columns: Option<&[String]>) -> Result<EventTable> {
        match self {
            InputFile::Root(f) => read_root(f, tree, columns),
            InputFile::Parquet { path, metadata } => read_parquet(path, metadata, tree, columns),
        }
    }
}

/// Open `path` and load `tree`. See [`InputFile::read_table`].
pub fn read_table(path: &Path, tree: &str, columns: Option<&[String]>) -> Result<EventTable> {
    InputFile::open(path)?.read_table(tree, columns)
}

/// Open `path` and describe `tree`. See [`InputFile::table_info`].
pub fn inspect_table(path: &Path, tree: &str) -> Result<TableInfo> {
    InputFile::open(path)?.table_info(tree)
}

fn read_root(f: &RootFile, tree: &str, columns: Option<&[String]>) -> Result<EventTable> {
    let t = f.get_tree(tree)?;
    let mut table = EventTable::new(tree);
    match columns {
        Some(names) => {
            for name in names {
                let data = f.read_branch(&t, name)?;
                table.push_column(Column::new(name.clone(), data))?;
            }
        }
        None => {
            for b in &t.branches {
                if !b.is_scalar() {
                    log::debug!(
                        "{}: skipping branch '{}' ({})",
                        f.path().display(),
                        b.name,
                        b.unsupported_reason().unwrap_or_default()
                    );
                    continue;
                }
                let data = f.read_branch(&t, &b.name)?;
                table.push_column(Column::new(b.name.clone(), data))?;
            }
        }
    }
    if table.n_columns() == 0 {
        log::debug!("{}: tree '{tree}' has no readable columns", f.path().display());
    }
    Ok(table)
}

fn read_parquet(
    path: &Path,
    metadata: &ArrowReaderMetadata,
    tree: &str,
    columns: Option<&[String]>,
) -> Result<EventTable> {
    let schema = metadata.schema();
    check_tree_name(schema, tree)?;

    let wanted: Vec<usize> = match columns {
        Some(names) => names
            .iter()
            .map(|name| {
                let idx = schema
                    .index_of(name)
                    .map_err(|_| RootError::BranchNotFound(name.clone()))?;
                if kind_of(schema.field(idx).data_type()).is_none() {
                    return Err(NtupleError::Input(format!(
                        "{}: column '{name}' has unsupported type {}",
                        path.display(),
                        schema.field(idx).data_type()
                    )));
                }
                Ok(idx)
            })
            .collect::<Result<_>>()?,
        None => schema
            .fields()
            .iter()
            .enumerate()
            .filter_map(|(i, f)| {
                if kind_of(f.data_type()).is_some() {
                    Some(i)
                } else {
                    log::debug!(
                        "{}: skipping column '{}' ({})",
                        path.display(),
                        f.name(),
                        f.data_type()
                    );
                    None
                }
            })
            .collect(),
    };

    let mut table = EventTable::new(tree);
    if wanted.is_empty() {
        return Ok(table);
    }

    let file = File::open(path)?;
    let builder = ParquetRecordBatchReaderBuilder::new_with_metadata(file, metadata.clone());
    let mask = ProjectionMask::roots(builder.parquet_schema(), wanted.iter().copied());
    let reader = builder.with_projection(mask).build()?;
    let batches = reader.collect::<std::result::Result<Vec<_>, _>>()?;

    // The projection keeps file order; callers get the order they asked for.
    let mut data: HashMap<String, ColumnData> = HashMap::new();
    for &idx in &wanted {
        let field = schema.field(idx);
        let mut col = empty_for(field.data_type())?;
        for batch in &batches {
            let arr = batch.column_by_name(field.name()).ok_or_else(|| {
                NtupleError::Input(format!("column '{}' missing from batch", field.name()))
            })?;
            append_array(&mut col, arr.as_ref())?;
        }
        data.insert(field.name().clone(), col);
    }
    for &idx in &wanted {
        let name = schema.field(idx).name();
        if let Some(col) = data.remove(name) {
            table.push_column(Column::new(name.clone(), col))?;
        }
    }
    Ok(table)
}

fn check_tree_name(schema: &Schema, tree: &str) -> Result<()> {
    match schema.metadata().get(TREE_NAME_KEY) {
        Some(stored) if stored != tree => {
            Err(RootError::TreeNotFound(format!("{tree} (table holds '{stored}')")).into())
        }
        _ => Ok(()),
    }
}

fn kind_of(dt: &DataType) -> Option<LeafKind> {
    let kind = match dt {
        DataType::Float32 => LeafKind::F32,
        DataType::Float64 => LeafKind::F64,
        DataType::Int8 => LeafKind::I8,
        DataType::UInt8 => LeafKind::U8,
        DataType::Int16 => LeafKind::I16,
        DataType::UInt16 => LeafKind::U16,
        DataType::Int32 => LeafKind::I32,
        DataType::UInt32 => LeafKind::U32,
        DataType::Int64 => LeafKind::I64,
        DataType::UInt64 => LeafKind::U64,
        DataType::Boolean => LeafKind::Bool,
        _ => return None,
    };
    Some(kind)
}

fn data_type(kind: LeafKind) -> DataType {
    match kind {
        LeafKind::F32 => DataType::Float32,
        LeafKind::F64 => DataType::Float64,
        LeafKind::I8 => DataType::Int8,
        LeafKind::U8 => DataType::UInt8,
        LeafKind::I16 => DataType::Int16,
        LeafKind::U16 => DataType::UInt16,
        LeafKind::I32 => DataType::Int32,
        LeafKind::U32 => DataType::UInt32,
        LeafKind::I64 => DataType::Int64,
        LeafKind::U64 => DataType::UInt64,
        LeafKind::Bool => DataType::Boolean,
    }
}

fn empty_for(dt: &DataType) -> Result<ColumnData> {
    kind_of(dt)
        .map(ColumnData::empty)
        .ok_or_else(|| NtupleError::Input(format!("unsupported column type {dt}")))
}

fn append_array(col: &mut ColumnData, arr: &dyn Array) -> Result<()> {
    if arr.null_count() > 0 {
        return Err(NtupleError::Input("null values are not supported".into()));
    }
    match col {
        ColumnData::F32(v) => v.extend_from_slice(arr.as_primitive::<Float32Type>().values()),
        ColumnData::F64(v) => v.extend_from_slice(arr.as_primitive::<Float64Type>().values()),
        ColumnData::I8(v) => v.extend_from_slice(arr.as_primitive::<Int8Type>().values()),
        ColumnData::U8(v) => v.extend_from_slice(arr.as_primitive::<UInt8Type>().values()),
        ColumnData::I16(v) => v.extend_from_slice(arr.as_primitive::<Int16Type>().values()),
        ColumnData::U16(v) => v.extend_from_slice(arr.as_primitive::<UInt16Type>().values()),
        ColumnData::I32(v) => v.extend_from_slice(arr.as_primitive::<Int32Type>().values()),
        ColumnData::U32(v) => v.extend_from_slice(arr.as_primitive::<UInt32Type>().values()),
        ColumnData::I64(v) => v.extend_from_slice(arr.as_primitive::<Int64Type>().values()),
        ColumnData::U64(v) => v.extend_from_slice(arr.as_primitive::<UInt64Type>().values()),
        ColumnData::Bool(v) => v.extend(arr.as_boolean().values().iter()),
    }
    Ok(())
}

fn to_array(data: &ColumnData) -> ArrayRef {
    match data {
        ColumnData::F32(v) => Arc::new(Float32Array::from(v.clone())),
        ColumnData::F64(v) => Arc::new(Float64Array::from(v.clone())),
        ColumnData::I8(v) => Arc::new(Int8Array::from(v.clone())),
        ColumnData::U8(v) => Arc::new(UInt8Array::from(v.clone())),
        ColumnData::I16(v) => Arc::new(Int16Array::from(v.clone())),
        ColumnData::U16(v) => Arc::new(UInt16Array::from(v.clone())),
        ColumnData::I32(v) => Arc::new(Int32Array::from(v.clone())),
        ColumnData::U32(v) => Arc::new(UInt32Array::from(v.clone())),
        ColumnData::I64(v) => Arc::new(Int64Array::from(v.clone())),
        ColumnData::U64(v) => Arc::new(UInt64Array::from(v.clone())),
        ColumnData::Bool(v) => Arc::new(BooleanArray::from(v.clone())),
    }
}

/// Convert a table into a single Arrow record batch.
pub fn to_record_batch(table: &EventTable) -> Result<RecordBatch> {
    if table.n_columns() == 0 {
        return Err(NtupleError::Table(format!("tree '{}' has no columns", table.tree_name)));
    }
    let fields: Vec<Field> = table
        .columns()
        .iter()
        .map(|c| Field::new(c.name.clone(), data_type(c.data.kind()), false))
        .collect();
    let metadata = HashMap::from([(TREE_NAME_KEY.to_string(), table.tree_name.clone())]);
    let schema = Arc::new(Schema::new_with_metadata(fields, metadata));
    let arrays: Vec<ArrayRef> = table.columns().iter().map(|c| to_array(&c.data)).collect();
    Ok(RecordBatch::try_new(schema, arrays)?)
}

/// Write a table as a ZSTD-compressed Parquet file.
pub fn write_table(path: &Path, table: &EventTable, zstd_level: i32) -> Result<()> {
    let batch = to_record_batch(table)?;
    let props = WriterProperties::builder()
        .set_compression(Compression::ZSTD(ZstdLevel::try_new(zstd_level)?))
        .build();

    let file = File::create(path)?;
    let mut writer = ArrowWriter::try_new(file, batch.schema(), Some(props))?;
    writer.write(&batch)?;
    writer.close()?;
    log::debug!("wrote {} rows of '{}' to {}", table.n_rows(), table.tree_name, path.display());
    Ok(())
}

/// `<out_dir>/<stem of input>.parquet`.
pub fn output_file(out_dir: &Path, input: &Path) -> PathBuf {
    let stem = input.file_stem().map(|s| s.to_string_lossy()).unwrap_or_default();
    out_dir.join(format!("{stem}.parquet"))
}
