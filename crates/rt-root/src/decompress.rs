//! Inflating compressed ROOT records.
//!
//! A compressed record is a run of blocks, each led by a 9-byte header: a
//! two-letter algorithm tag, one method byte, then the compressed and the
//! uncompressed block sizes as 24-bit little-endian integers. Large baskets
//! span several blocks.

use std::io::Read;

use crate::error::{Result, RootError};

const HEADER_LEN: usize = 9;
/// xxhash64 prefix ROOT puts in front of every LZ4 block. Not verified.
const LZ4_CHECKSUM_LEN: usize = 8;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Algorithm {
    Zlib,
    Lz4,
    Zstd,
    Xz,
}

impl Algorithm {
    fn from_tag(tag: [u8; 2]) -> Result<Self> {
        match &tag {
            b"ZL" => Ok(Self::Zlib),
            b"L4" => Ok(Self::Lz4),
            b"ZS" => Ok(Self::Zstd),
            b"XZ" => Ok(Self::Xz),
            _ => Err(RootError::Decompression(format!(
                "unknown compression tag {:?}",
                String::from_utf8_lossy(&tag)
            ))),
        }
    }

    fn inflate(self, payload: &[u8], size: usize) -> Result<Vec<u8>> {
        let mut out = Vec::with_capacity(size);
        let res = match self {
            Self::Zlib => flate2::read::ZlibDecoder::new(payload).read_to_end(&mut out).map(drop),
            Self::Zstd => ruzstd::decoding::StreamingDecoder::new(payload)
                .map_err(|e| std::io::Error::other(e.to_string()))
                .and_then(|mut d| d.read_to_end(&mut out))
                .map(drop),
            Self::Xz => lzma_rs::xz_decompress(&mut std::io::BufReader::new(payload), &mut out)
                .map_err(|e| std::io::Error::other(e.to_string())),
            Self::Lz4 => {
                let body = payload.get(LZ4_CHECKSUM_LEN..).ok_or_else(|| {
                    RootError::Decompression("LZ4 block shorter than its checksum".into())
                })?;
                out = lz4_flex::decompress(body, size)
                    .map_err(|e| RootError::Decompression(format!("{self:?}: {e}")))?;
                Ok(())
            }
        };
        res.map_err(|e| RootError::Decompression(format!("{self:?}: {e}")))?;
        Ok(out)
    }
}

struct BlockHeader {
    algorithm: Algorithm,
    compressed: usize,
    uncompressed: usize,
}

fn le24(b: [u8; 3]) -> usize {
    usize::from(b[0]) | usize::from(b[1]) << 8 | usize::from(b[2]) << 16
}

fn parse_header(h: &[u8; HEADER_LEN]) -> Result<BlockHeader> {
    Ok(BlockHeader {
        algorithm: Algorithm::from_tag([h[0], h[1]])?,
        compressed: le24([h[3], h[4], h[5]]),
        uncompressed: le24([h[6], h[7], h[8]]),
    })
}

/// Inflate the blocks of `src` into exactly `expected_len` bytes.
pub fn decompress(src: &[u8], expected_len: usize) -> Result<Vec<u8>> {
    let mut out = Vec::with_capacity(expected_len);
    let mut rest = src;

    while out.len() < expected_len {
        let Some((head, tail)) = rest.split_first_chunk::<HEADER_LEN>() else {
            break;
        };
        let header = parse_header(head)?;
        if header.compressed > tail.len() {
            return Err(RootError::Decompression(format!(
                "block of {} bytes truncated to {}",
                header.compressed,
                tail.len()
            )));
        }
        let (payload, next) = tail.split_at(header.compressed);
        let block = header.algorithm.inflate(payload, header.uncompressed)?;
        if block.len() != header.uncompressed {
            return Err(RootError::Decompression(format!(
                "{:?} block inflated to {} bytes instead of {}",
                header.algorithm,
                block.len(),
                header.uncompressed
            )));
        }
        out.extend(block);
        rest = next;
    }

    if out.len() != expected_len {
        return Err(RootError::Decompression(format!(
            "record inflated to {} bytes instead of {expected_len}",
            out.len()
        )));
    }
    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    fn block(tag: &[u8; 2], payload: &[u8], raw_len: usize) -> Vec<u8> {
        let mut b = tag.to_vec();
        b.push(1);
        b.extend_from_slice(&(payload.len() as u32).to_le_bytes()[..3]);
        b.extend_from_slice(&(raw_len as u32).to_le_bytes()[..3]);
        b.extend_from_slice(payload);
        b
    }

    fn zlib(raw: &[u8]) -> Vec<u8> {
        let mut enc = flate2::write::ZlibEncoder::new(Vec::new(), flate2::Compression::best());
        enc.write_all(raw).unwrap();
        enc.finish().unwrap()
    }

    fn basket_bytes(n: u32) -> Vec<u8> {
        (0..n).flat_map(|i| (i as f32 * 0.5).to_be_bytes()).collect()
    }

    #[test]
    fn sizes_are_little_endian() {
        assert_eq!(le24([0x34, 0x12, 0x00]), 0x1234);
        assert_eq!(le24([0x00, 0x00, 0x01]), 1 << 16);
    }

    #[test]
    fn zlib_record_over_several_blocks() {
        let raw = basket_bytes(300);
        let (a, b) = raw.split_at(512);
        let mut src = block(b"ZL", &zlib(a), a.len());
        src.extend(block(b"ZL", &zlib(b), b.len()));
        assert_eq!(decompress(&src, raw.len()).unwrap(), raw);
    }

    #[test]
    fn lz4_checksum_prefix_is_skipped() {
        let raw = basket_bytes(64);
        let mut payload = vec![0xab; LZ4_CHECKSUM_LEN];
        payload.extend(lz4_flex::compress(&raw));
        assert_eq!(decompress(&block(b"L4", &payload, raw.len()), raw.len()).unwrap(), raw);
        assert!(decompress(&block(b"L4", &[1, 2], 4), 4).is_err());
    }

    #[test]
    fn xz_record() {
        let raw = basket_bytes(40);
        let mut payload = Vec::new();
        lzma_rs::xz_compress(&mut std::io::BufReader::new(&raw[..]), &mut payload).unwrap();
        assert_eq!(decompress(&block(b"XZ", &payload, raw.len()), raw.len()).unwrap(), raw);
    }

    #[test]
    fn bad_records_are_rejected() {
        let raw = basket_bytes(8);
        let good = block(b"ZL", &zlib(&raw), raw.len());

        let unknown = block(b"CS", &[0; 4], 4);
        assert!(matches!(decompress(&unknown, 4), Err(RootError::Decompression(_))));
        assert!(decompress(&good[..good.len() - 3], raw.len()).is_err());
        assert!(decompress(&good, raw.len() + 1).is_err());
        assert!(decompress(&[], 10).is_err());
    }
}
