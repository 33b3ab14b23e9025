//! TFile header parsing and top-level ROOT file interface.

use std::fs;
use std::ops::Deref;
use std::path::{Path, PathBuf};

use crate::branch::{BranchData, read_branch_data};
use crate::directory::{Directory, DirectoryRecord};
use crate::error::{Result, RootError};
use crate::key::{Key, KeyInfo};
use crate::objects;
use crate::rbuffer::RBuffer;
use crate::tree::Tree;

const ROOT_MAGIC: &[u8; 4] = b"root";

/// Backing storage for the file bytes.
enum Bytes {
    Owned(Vec<u8>),
    Mapped(memmap2::Mmap),
}

impl Deref for Bytes {
    type Target = [u8];

    #[inline]
    fn deref(&self) -> &[u8] {
        match self {
            Bytes::Owned(v) => v,
            Bytes::Mapped(m) => m,
        }
    }
}

/// Parsed ROOT file header.
#[derive(Debug, Clone, Copy)]
struct FileHeader {
    /// Whether the file uses 64-bit seek pointers (version >= 1000000).
    is_large: bool,
    /// Key list of the top directory.
    top: DirectoryRecord,
}

/// A ROOT file opened for reading trees.
pub struct RootFile {
    data: Bytes,
    header: FileHeader,
    path: PathBuf,
}

impl std::fmt::Debug for RootFile {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RootFile")
            .field("path", &self.path)
            .field("len", &self.data.len())
            .field("is_large", &self.header.is_large)
            .finish()
    }
}

impl RootFile {
    /// Open and parse a ROOT file from disk using memory mapping.
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref().to_path_buf();
        let file = fs::File::open(&path)?;
        // SAFETY: the mapping is read-only; files being rewritten underneath
        // a running batch are outside what this reader supports.
        let mmap = unsafe { memmap2::Mmap::map(&file)? };
        Self::from_bytes_source(Bytes::Mapped(mmap), path)
    }

    /// Parse a ROOT file held in memory.
    pub fn from_bytes(data: Vec<u8>, path: impl Into<PathBuf>) -> Result<Self> {
        Self::from_bytes_source(Bytes::Owned(data), path.into())
    }

    fn from_bytes_source(data: Bytes, path: PathBuf) -> Result<Self> {
        if data.len() < 64 || &data[0..4] != ROOT_MAGIC {
            return Err(RootError::BadMagic);
        }
        let header = parse_header(&data)?;
        log::debug!(
            "opened {} ({} bytes, {} seeks)",
            path.display(),
            data.len(),
            if header.is_large { "64-bit" } else { "32-bit" }
        );
        Ok(Self { data, header, path })
    }

    /// Path this file was opened from.
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// List all keys in the top-level directory.
    pub fn list_keys(&self) -> Result<Vec<KeyInfo>> {
        let dir = self.top_directory()?;
        Ok(dir.keys().iter().map(KeyInfo::from).collect())
    }

    /// Whether an object exists at `path` (`"dir/name"` style).
    pub fn has_key(&self, path: &str) -> Result<bool> {
        match self.resolve(path) {
            Ok(_) => Ok(true),
            Err(RootError::KeyNotFound(_)) => Ok(false),
            Err(e) => Err(e),
        }
    }

    /// Read a TTree by path, e.g. `"bdttree"` or `"nominal/bdttree"`.
    pub fn get_tree(&self, path: &str) -> Result<Tree> {
        let key = match self.resolve(path) {
            Ok(key) => key,
            Err(RootError::KeyNotFound(_)) => {
                return Err(RootError::TreeNotFound(path.to_string()));
            }
            Err(e) => return Err(e),
        };
        if key.class_name != "TTree" {
            return Err(RootError::TreeNotFound(format!("'{path}' is {} not TTree", key.class_name)));
        }
        let payload = key.read_payload(&self.data)?;
        objects::read_ttree(&payload, key.key_len as usize)
    }

    /// Read all entries of a scalar branch.
    pub fn read_branch(&self, tree: &Tree, name: &str) -> Result<BranchData> {
        let info =
            tree.find_branch(name).ok_or_else(|| RootError::BranchNotFound(name.to_string()))?;
        read_branch_data(&self.data, info, tree.entries, self.header.is_large)
    }

    /// Size of the file in bytes.
    pub fn len(&self) -> usize {
        self.data.len()
    }

    /// Whether the file is empty (never true for a parsed file).
    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    fn top_directory(&self) -> Result<Directory> {
        Directory::read(&self.data, self.header.top, self.header.is_large)
    }

    fn resolve(&self, path: &str) -> Result<Key> {
        let parts: Vec<&str> = path.split('/').filter(|s| !s.is_empty()).collect();
        let Some((last, dirs)) = parts.split_last() else {
            return Err(RootError::KeyNotFound(path.to_string()));
        };

        let mut dir = self.top_directory()?;
        for &part in dirs {
            let key = dir
                .find_key(part)
                .ok_or_else(|| RootError::KeyNotFound(format!("{part} (in path {path})")))?;
            if !key.is_directory() {
                return Err(RootError::Deserialization(format!(
                    "'{part}' is not a directory (class: {})",
                    key.class_name
                )));
            }
            let payload = key.read_payload(&self.data)?;
            dir = Directory::read_from_payload(&payload, &self.data, self.header.is_large)?;
        }

        dir.find_key(last).cloned().ok_or_else(|| RootError::KeyNotFound(path.to_string()))
    }
}

/// Parse the file header and the top directory record.
///
/// ```text
/// offset  size  field
///    0      4   magic "root"
///    4      4   fVersion
///    8      4   fBEGIN
///   12    4|8   fEND
///  ...    4|8   fSeekFree
///           4   fNbytesFree
///           4   nfree
///           4   fNbytesName
/// ```
/// The TDirectory record of the top directory sits at `fBEGIN + fNbytesName`.
fn parse_header(data: &[u8]) -> Result<FileHeader> {
    let mut r = RBuffer::new(data);
    r.skip(4)?;

    let version = r.read_u32()?;
    let is_large = version >= 1_000_000;
    let begin = r.read_u32()? as usize;
    if is_large {
        r.skip(16)?;
    } else {
        r.skip(8)?;
    }
    let _nbytes_free = r.read_u32()?;
    let _nfree = r.read_u32()?;
    let nbytes_name = r.read_u32()? as usize;

    let dir_offset = begin + nbytes_name;
    if dir_offset >= data.len() {
        return Err(RootError::Deserialization("TDirectory offset past end of file".into()));
    }
    r.set_pos(dir_offset)?;
    let top = DirectoryRecord::read(&mut r)?;

    Ok(FileHeader { is_large, top })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rejects_non_root_bytes() {
        assert!(matches!(RootFile::from_bytes(vec![0u8; 100], "x"), Err(RootError::BadMagic)));
        assert!(matches!(RootFile::from_bytes(b"root".to_vec(), "x"), Err(RootError::BadMagic)));
    }

    #[test]
    fn directory_offset_past_end() {
        let mut bytes = vec![0u8; 64];
        bytes[..4].copy_from_slice(b"root");
        bytes[4..8].copy_from_slice(&62_400u32.to_be_bytes());
        bytes[8..12].copy_from_slice(&100u32.to_be_bytes());
        assert!(matches!(
            RootFile::from_bytes(bytes, "x"),
            Err(RootError::Deserialization(_))
        ));
    }
}
