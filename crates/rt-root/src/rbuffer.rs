//! Cursor over ROOT's big-endian serialization format.

use crate::error::{Result, RootError};

/// `kByteCountMask`: set on the leading u32 of a streamed object that carries a byte count.
pub(crate) const K_BYTE_COUNT_MASK: u32 = 0x4000_0000;

/// A cursor-based reader over a byte slice.
pub struct RBuffer<'a> {
    data: &'a [u8],
    pos: usize,
}

impl<'a> RBuffer<'a> {
    /// Create a new reader over the given bytes.
    pub fn new(data: &'a [u8]) -> Self {
        Self { data, pos: 0 }
    }

    /// Current read position.
    #[inline]
    pub fn pos(&self) -> usize {
        self.pos
    }

    /// Total length of the underlying buffer.
    #[inline]
    pub fn len(&self) -> usize {
        self.data.len()
    }

    /// Whether the buffer is empty.
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    /// Remaining bytes from the current position.
    #[inline]
    pub fn remaining(&self) -> usize {
        self.data.len().saturating_sub(self.pos)
    }

    /// Set the read position absolutely.
    pub fn set_pos(&mut self, pos: usize) -> Result<()> {
        if pos > self.data.len() {
            return Err(RootError::BufferUnderflow {
                offset: self.pos,
                need: pos.saturating_sub(self.pos),
                have: self.remaining(),
            });
        }
        self.pos = pos;
        Ok(())
    }

    /// Skip `n` bytes forward.
    pub fn skip(&mut self, n: usize) -> Result<()> {
        self.ensure(n)?;
        self.pos += n;
        Ok(())
    }

    /// Read a sub-slice of `n` bytes, advancing the cursor.
    pub fn read_bytes(&mut self, n: usize) -> Result<&'a [u8]> {
        self.ensure(n)?;
        let slice = &self.data[self.pos..self.pos + n];
        self.pos += n;
        Ok(slice)
    }

    fn read_array<const N: usize>(&mut self) -> Result<[u8; N]> {
        let b = self.read_bytes(N)?;
        let mut out = [0u8; N];
        out.copy_from_slice(b);
        Ok(out)
    }

    /// Read a single byte.
    pub fn read_u8(&mut self) -> Result<u8> {
        Ok(self.read_array::<1>()?[0])
    }

    /// Read a single signed byte.
    pub fn read_i8(&mut self) -> Result<i8> {
        Ok(i8::from_be_bytes(self.read_array()?))
    }

    /// Read a one-byte boolean.
    pub fn read_bool(&mut self) -> Result<bool> {
        Ok(self.read_u8()? != 0)
    }

    /// Read a big-endian u16.
    pub fn read_u16(&mut self) -> Result<u16> {
        Ok(u16::from_be_bytes(self.read_array()?))
    }

    /// Read a big-endian i16.
    pub fn read_i16(&mut self) -> Result<i16> {
        Ok(i16::from_be_bytes(self.read_array()?))
    }

    /// Read a big-endian u32.
    pub fn read_u32(&mut self) -> Result<u32> {
        Ok(u32::from_be_bytes(self.read_array()?))
    }

    /// Read a big-endian i32.
    pub fn read_i32(&mut self) -> Result<i32> {
        Ok(i32::from_be_bytes(self.read_array()?))
    }

    /// Read a big-endian u64.
    pub fn read_u64(&mut self) -> Result<u64> {
        Ok(u64::from_be_bytes(self.read_array()?))
    }

    /// Read a big-endian i64.
    pub fn read_i64(&mut self) -> Result<i64> {
        Ok(i64::from_be_bytes(self.read_array()?))
    }

    /// Read a big-endian f32.
    pub fn read_f32(&mut self) -> Result<f32> {
        Ok(f32::from_be_bytes(self.read_array()?))
    }

    /// Read a big-endian f64.
    pub fn read_f64(&mut self) -> Result<f64> {
        Ok(f64::from_be_bytes(self.read_array()?))
    }

    /// Read a ROOT-encoded string.
    ///
    /// Format: length byte (if < 255), or 255 + u32 length, then the bytes.
    pub fn read_string(&mut self) -> Result<String> {
        let first = self.read_u8()?;
        let len = if first == 255 { self.read_u32()? as usize } else { first as usize };
        if len == 0 {
            return Ok(String::new());
        }
        let bytes = self.read_bytes(len)?;
        Ok(String::from_utf8_lossy(bytes).into_owned())
    }

    /// Read a NUL-terminated C string (used for class names in object arrays).
    pub fn read_cstring(&mut self) -> Result<String> {
        let rest = &self.data[self.pos..];
        let nul = rest.iter().position(|&b| b == 0).ok_or(RootError::BufferUnderflow {
            offset: self.pos,
            need: rest.len() + 1,
            have: rest.len(),
        })?;
        let s = String::from_utf8_lossy(&rest[..nul]).into_owned();
        self.pos += nul + 1;
        Ok(s)
    }

    /// Read a streamer version header.
    ///
    /// Returns `(version, end_pos)` where `end_pos` is the absolute position
    /// where the streamed object ends (`None` without a byte-count header).
    /// The byte count spans from right after the leading u32 to the end of
    /// the object, so it includes the version u16.
    pub fn read_version(&mut self) -> Result<(u16, Option<usize>)> {
        let start = self.pos;
        let raw = self.read_u32()?;
        if raw & K_BYTE_COUNT_MASK != 0 {
            let byte_count = (raw & !K_BYTE_COUNT_MASK) as usize;
            let version = self.read_u16()?;
            Ok((version, Some(start + 4 + byte_count)))
        } else {
            self.pos = start;
            let version = self.read_u16()?;
            Ok((version, None))
        }
    }

    /// Skip a versioned object by jumping to its byte-count end.
    pub fn skip_versioned(&mut self) -> Result<()> {
        let (_ver, end) = self.read_version()?;
        match end {
            Some(end_pos) => self.set_pos(end_pos),
            None => Err(RootError::Deserialization(format!(
                "cannot skip object without byte count at {}",
                self.pos
            ))),
        }
    }

    /// Read a `TObject` header: version + fUniqueID + fBits.
    pub fn read_tobject(&mut self) -> Result<(u32, u32)> {
        let _ver = self.read_u16()?;
        let unique_id = self.read_u32()?;
        let bits = self.read_u32()?;
        if bits & 0x0000_0010 != 0 {
            // kIsReferenced: a 2-byte process id follows
            self.skip(2)?;
        }
        Ok((unique_id, bits))
    }

    /// Read a `TNamed`: TObject + fName + fTitle.
    pub fn read_tnamed(&mut self) -> Result<(String, String)> {
        let (_ver, end) = self.read_version()?;
        self.read_tobject()?;
        let name = self.read_string()?;
        let title = self.read_string()?;
        if let Some(end_pos) = end {
            self.set_pos(end_pos)?;
        }
        Ok((name, title))
    }

    fn ensure(&self, n: usize) -> Result<()> {
        if self.pos + n > self.data.len() {
            return Err(RootError::BufferUnderflow {
                offset: self.pos,
                need: n,
                have: self.remaining(),
            });
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn big_endian_basket_values() {
        // one Float_t, one UInt_t and one ULong64_t entry, as a basket stores them
        let mut data = Vec::new();
        data.extend_from_slice(&(-9999.0f32).to_be_bytes());
        data.extend_from_slice(&7u32.to_be_bytes());
        data.extend_from_slice(&123_456_789_012u64.to_be_bytes());
        let mut r = RBuffer::new(&data);
        assert_eq!(r.read_f32().unwrap(), -9999.0);
        assert_eq!(r.read_u32().unwrap(), 7);
        assert_eq!(r.read_u64().unwrap(), 123_456_789_012);
        assert!(r.read_u8().is_err());
        assert_eq!(r.remaining(), 0);
    }

    #[test]
    fn read_string_short_and_long() {
        let mut r = RBuffer::new(b"\x07bdttree");
        assert_eq!(r.read_string().unwrap(), "bdttree");

        let mut long = vec![255u8];
        long.extend_from_slice(&300u32.to_be_bytes());
        long.extend(std::iter::repeat_n(b'x', 300));
        let mut r = RBuffer::new(&long);
        assert_eq!(r.read_string().unwrap().len(), 300);
        assert_eq!(RBuffer::new(&[0]).read_string().unwrap(), "");
    }

    #[test]
    fn read_cstring_stops_at_nul() {
        let data = b"TLeafF\0rest";
        let mut r = RBuffer::new(data);
        assert_eq!(r.read_cstring().unwrap(), "TLeafF");
        assert_eq!(r.pos(), 7);
        assert!(RBuffer::new(b"abc").read_cstring().is_err());
    }

    #[test]
    fn versions_with_and_without_byte_count() {
        // kByteCountMask set: 12 bytes follow the count, version 20 is one of them
        let mut data = 0x4000_000cu32.to_be_bytes().to_vec();
        data.extend_from_slice(&20u16.to_be_bytes());
        data.extend_from_slice(&[0u8; 10]);
        let mut r = RBuffer::new(&data);
        assert_eq!(r.read_version().unwrap(), (20, Some(16)));

        let mut r = RBuffer::new(&[0x00, 0x06, 0xff]);
        assert_eq!(r.read_version().unwrap(), (6, None));
        assert_eq!(r.remaining(), 1);
    }

    #[test]
    fn underflow_is_reported() {
        let mut r = RBuffer::new(&[0u8; 3]);
        match r.read_u32() {
            Err(RootError::BufferUnderflow { offset, need, have }) => {
                assert_eq!((offset, need, have), (0, 4, 3));
            }
            other => panic!("unexpected: {other:?}"),
        }
    }
}
