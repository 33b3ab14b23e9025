//! Basket (compressed data block) reading for TTree branches.

use crate::error::{Result, RootError};
use crate::key::Key;
use crate::rbuffer::RBuffer;

/// A decompressed basket.
#[derive(Debug)]
pub(crate) struct Basket {
    /// Number of entries stored in the basket (`fNevBuf`).
    pub n_entries: usize,
    /// Decompressed payload. Fixed-size leaves use the leading
    /// `n_entries * elem_size` bytes; anything after that is the entry offset table.
    pub payload: Vec<u8>,
}

/// Read and decompress the basket whose key starts at `seek`.
///
/// A basket key is a TKey followed by the TBasket header fields,
/// all covered by `fKeylen`.
pub(crate) fn read_basket(file_data: &[u8], seek: u64, is_large: bool) -> Result<Basket> {
    let pos = usize::try_from(seek)
        .map_err(|_| RootError::Deserialization(format!("basket seek {seek} too large")))?;
    if pos >= file_data.len() {
        return Err(RootError::BufferUnderflow { offset: pos, need: 1, have: 0 });
    }

    let mut r = RBuffer::new(file_data);
    r.set_pos(pos)?;
    let key = Key::read(&mut r, is_large)?;

    let _basket_ver = r.read_u16()?;
    let _buffer_size = r.read_i32()?;
    let _nev_buf_size = r.read_i32()?;
    let nev_buf = r.read_i32()?;
    let _last = r.read_i32()?;
    let _flag = r.read_u8()?;

    let n_entries = usize::try_from(nev_buf)
        .map_err(|_| RootError::Deserialization(format!("negative basket entry count {nev_buf}")))?;

    let payload = key.read_payload(file_data)?;
    Ok(Basket { n_entries, payload })
}

/// The leading fixed-size data of a basket payload.
pub(crate) fn fixed_data(basket: &Basket, elem_size: usize) -> Result<&[u8]> {
    let need = basket.n_entries * elem_size;
    if need > basket.payload.len() {
        return Err(RootError::BufferUnderflow {
            offset: 0,
            need,
            have: basket.payload.len(),
        });
    }
    Ok(&basket.payload[..need])
}
