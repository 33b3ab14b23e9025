//! TKey parsing: the record header ROOT uses to locate objects.

use crate::decompress::decompress;
use crate::error::{Result, RootError};
use crate::rbuffer::RBuffer;

/// A parsed TKey record.
#[derive(Debug, Clone)]
pub struct Key {
    /// Total number of bytes in compressed object + key header.
    pub n_bytes: u32,
    /// Version of the key class (> 1000 means 64-bit seeks).
    pub version: u16,
    /// Uncompressed object length.
    pub obj_len: u32,
    /// Length of the key header itself.
    pub key_len: u16,
    /// Cycle number within the directory.
    pub cycle: u16,
    /// Absolute position of this key in the file.
    pub seek_key: u64,
    /// Class name of the stored object.
    pub class_name: String,
    /// Object name.
    pub name: String,
    /// Object title.
    pub title: String,
}

/// Public info about a key (for `list_keys()`).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct KeyInfo {
    /// Object name.
    pub name: String,
    /// Object class name (e.g. "TTree", "TDirectoryFile").
    pub class_name: String,
    /// Cycle number.
    pub cycle: u16,
}

impl From<&Key> for KeyInfo {
    fn from(key: &Key) -> Self {
        Self { name: key.name.clone(), class_name: key.class_name.clone(), cycle: key.cycle }
    }
}

impl Key {
    /// Read a TKey from the buffer at the current position.
    pub fn read(r: &mut RBuffer, is_large: bool) -> Result<Self> {
        let n_bytes = r.read_u32()?;
        let version = r.read_u16()?;
        let obj_len = r.read_u32()?;
        let _datime = r.read_u32()?;
        let key_len = r.read_u16()?;
        let cycle = r.read_u16()?;

        let seek_key = if version > 1000 || is_large {
            let sk = r.read_u64()?;
            let _seek_pdir = r.read_u64()?;
            sk
        } else {
            let sk = r.read_u32()? as u64;
            let _seek_pdir = r.read_u32()?;
            sk
        };

        let class_name = r.read_string()?;
        let name = r.read_string()?;
        let title = r.read_string()?;

        Ok(Key { n_bytes, version, obj_len, key_len, cycle, seek_key, class_name, name, title })
    }

    /// Whether the directory-style class names denote a subdirectory.
    pub fn is_directory(&self) -> bool {
        self.class_name == "TDirectoryFile" || self.class_name == "TDirectory"
    }

    /// Read and decompress this key's object payload from raw file bytes.
    pub fn read_payload(&self, data: &[u8]) -> Result<Vec<u8>> {
        let seek = self.seek_key as usize;
        let end = seek + self.n_bytes as usize;
        if end > data.len() {
            return Err(RootError::BufferUnderflow {
                offset: seek,
                need: self.n_bytes as usize,
                have: data.len().saturating_sub(seek),
            });
        }
        let key_len = self.key_len as usize;
        if key_len > self.n_bytes as usize {
            return Err(RootError::Deserialization(format!(
                "key '{}' header length {} exceeds record size {}",
                self.name, key_len, self.n_bytes
            )));
        }

        let stored = &data[seek + key_len..end];
        if self.obj_len as usize == stored.len() {
            Ok(stored.to_vec())
        } else {
            decompress(stored, self.obj_len as usize)
        }
    }
}
