//! TDirectory parsing and key-list navigation.

use crate::error::Result;
use crate::key::Key;
use crate::rbuffer::RBuffer;

/// Location of a directory's key list, as stored in its TDirectory record.
#[derive(Debug, Clone, Copy)]
pub struct DirectoryRecord {
    /// Absolute offset of the key list.
    pub seek_keys: u64,
    /// Number of bytes in the key list.
    pub nbytes_keys: u32,
}

impl DirectoryRecord {
    /// Parse a TDirectory streamer at the reader's current position.
    pub fn read(r: &mut RBuffer) -> Result<Self> {
        let version = r.read_u16()?;
        let _datime_c = r.read_u32()?;
        let _datime_m = r.read_u32()?;
        let nbytes_keys = r.read_u32()?;
        let _nbytes_name = r.read_u32()?;

        let seek_keys = if version > 1000 {
            let _seek_dir = r.read_u64()?;
            let _seek_parent = r.read_u64()?;
            r.read_u64()?
        } else {
            let _seek_dir = r.read_u32()?;
            let _seek_parent = r.read_u32()?;
            r.read_u32()? as u64
        };

        Ok(Self { seek_keys, nbytes_keys })
    }
}

/// A parsed directory: the ordered list of its TKeys.
#[derive(Debug, Clone, Default)]
pub struct Directory {
    keys: Vec<Key>,
}

impl Directory {
    /// Read the key list described by `record` from the raw file bytes.
    ///
    /// The key list starts with a TKey header for the list itself, then
    /// a u32 `nkeys`, followed by `nkeys` TKey records.
    pub fn read(file_data: &[u8], record: DirectoryRecord, is_large: bool) -> Result<Self> {
        if record.seek_keys == 0 {
            return Ok(Self::default());
        }

        let mut r = RBuffer::new(file_data);
        r.set_pos(record.seek_keys as usize)?;

        let _list_key = Key::read(&mut r, is_large)?;
        let nkeys = r.read_u32()? as usize;

        let mut keys = Vec::with_capacity(nkeys.min(4096));
        for _ in 0..nkeys {
            keys.push(Key::read(&mut r, is_large)?);
        }
        Ok(Self { keys })
    }

    /// Read a subdirectory from the decompressed payload of a TDirectoryFile key.
    pub fn read_from_payload(payload: &[u8], file_data: &[u8], is_large: bool) -> Result<Self> {
        let record = DirectoryRecord::read(&mut RBuffer::new(payload))?;
        Self::read(file_data, record, is_large)
    }

    /// Access the list of keys.
    pub fn keys(&self) -> &[Key] {
        &self.keys
    }

    /// Find a key by name, returning the highest cycle.
    pub fn find_key(&self, name: &str) -> Option<&Key> {
        self.keys.iter().filter(|k| k.name == name).max_by_key(|k| k.cycle)
    }
}
