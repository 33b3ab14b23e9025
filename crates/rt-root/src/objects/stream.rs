//! Object-reference bookkeeping for streamed object arrays.
//!
//! ROOT writes polymorphic members (`TObjArray` elements, object pointers)
//! with a small tag protocol:
//! - `kNewClassTag (0xFFFFFFFF)` introduces a class name as a C string
//! - `kClassMask (0x80000000) | offset` references a class introduced earlier
//! - `kByteCountMask (0x40000000)` wraps the element with a byte count
//! - a tag without `kClassMask` is null (0) or a reference to an earlier object
//!
//! Class offsets are measured from the start of the key record, so the
//! key header length is added to buffer positions, plus `kMapOffset`.

use std::collections::HashMap;

use crate::error::{Result, RootError};
use crate::rbuffer::{K_BYTE_COUNT_MASK, RBuffer};

const K_NEW_CLASS_TAG: u32 = 0xFFFF_FFFF;
const K_CLASS_MASK: u32 = 0x8000_0000;
const K_MAP_OFFSET: usize = 2;

/// Placeholder for classes introduced inside objects that were skipped.
pub(crate) const UNKNOWN_CLASS: &str = "<unknown>";

/// Header of one polymorphic element.
#[derive(Debug)]
pub(crate) enum AnyObject {
    /// Null pointer.
    Null,
    /// Reference to an object streamed earlier in the buffer.
    Reference,
    /// A new object of `class_name`; `end` is where its bytes stop, if known.
    Object { class_name: String, end: Option<usize> },
}

/// A reader that tracks class tags across a whole key payload.
pub(crate) struct ObjectStream<'a> {
    pub(crate) r: RBuffer<'a>,
    displacement: usize,
    classes: HashMap<usize, String>,
}

impl<'a> ObjectStream<'a> {
    /// `key_len` is the header length of the key the payload was read from.
    pub(crate) fn new(payload: &'a [u8], key_len: usize) -> Self {
        Self { r: RBuffer::new(payload), displacement: key_len, classes: HashMap::new() }
    }

    /// Read the tag header of a polymorphic element.
    pub(crate) fn read_any(&mut self) -> Result<AnyObject> {
        let beg = self.r.pos();
        let first = self.r.read_u32()?;

        let (tag, tag_pos, end) = if first & K_BYTE_COUNT_MASK != 0 && first != K_NEW_CLASS_TAG {
            let byte_count = (first & !K_BYTE_COUNT_MASK) as usize;
            let tag_pos = self.r.pos();
            (self.r.read_u32()?, tag_pos, Some(beg + 4 + byte_count))
        } else {
            (first, beg, None)
        };

        if tag & K_CLASS_MASK == 0 {
            return Ok(if tag == 0 { AnyObject::Null } else { AnyObject::Reference });
        }

        let class_name = if tag == K_NEW_CLASS_TAG {
            let name = self.r.read_cstring()?;
            if end.is_some() {
                self.classes.insert(tag_pos + self.displacement + K_MAP_OFFSET, name.clone());
            }
            name
        } else {
            let offset = (tag & !K_CLASS_MASK) as usize;
            match self.classes.get(&offset) {
                Some(name) => name.clone(),
                None => {
                    log::debug!("class reference {offset} not registered (tag={tag:#010x})");
                    UNKNOWN_CLASS.to_string()
                }
            }
        };

        Ok(AnyObject::Object { class_name, end })
    }

    /// Jump past an element whose contents are not needed.
    pub(crate) fn skip_to(&mut self, end: Option<usize>, what: &str) -> Result<()> {
        match end {
            Some(end) => self.r.set_pos(end),
            None => Err(RootError::Deserialization(format!(
                "cannot skip {what} streamed without byte count"
            ))),
        }
    }

    /// Read a `TObjArray` header and return `(element count, end position)`.
    pub(crate) fn read_objarray_header(&mut self) -> Result<(usize, usize)> {
        let (_ver, end) = self.r.read_version()?;
        let end = end
            .ok_or_else(|| RootError::Deserialization("TObjArray missing byte count".into()))?;
        self.r.read_tobject()?;
        let _name = self.r.read_string()?;
        let count = self.r.read_i32()?;
        let _low_bound = self.r.read_i32()?;
        let count = usize::try_from(count).map_err(|_| {
            RootError::Deserialization(format!("negative TObjArray size {count}"))
        })?;
        Ok((count, end))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn new_class_then_reference() {
        let key_len = 60usize;
        let mut buf = Vec::new();
        // element 1: byte count + new class "TLeafF" + 4 payload bytes
        let body1: Vec<u8> =
            [&K_NEW_CLASS_TAG.to_be_bytes()[..], b"TLeafF\0", &[0, 0, 0, 0]].concat();
        buf.extend_from_slice(&(K_BYTE_COUNT_MASK | body1.len() as u32).to_be_bytes());
        let tag_pos = buf.len();
        buf.extend_from_slice(&body1);
        // element 2: byte count + reference to the class above
        let class_ref = K_CLASS_MASK | (tag_pos + key_len + K_MAP_OFFSET) as u32;
        let body2: Vec<u8> = [&class_ref.to_be_bytes()[..], &[9, 9]].concat();
        buf.extend_from_slice(&(K_BYTE_COUNT_MASK | body2.len() as u32).to_be_bytes());
        buf.extend_from_slice(&body2);
        // element 3: null
        buf.extend_from_slice(&0u32.to_be_bytes());

        let mut s = ObjectStream::new(&buf, key_len);
        let AnyObject::Object { class_name, end } = s.read_any().unwrap() else {
            panic!("expected object")
        };
        assert_eq!(class_name, "TLeafF");
        s.skip_to(end, "leaf").unwrap();

        let AnyObject::Object { class_name, end } = s.read_any().unwrap() else {
            panic!("expected object")
        };
        assert_eq!(class_name, "TLeafF");
        s.skip_to(end, "leaf").unwrap();

        assert!(matches!(s.read_any().unwrap(), AnyObject::Null));
        assert_eq!(s.r.remaining(), 0);
    }

    #[test]
    fn unknown_reference_is_tolerated() {
        let mut buf = Vec::new();
        buf.extend_from_slice(&(K_BYTE_COUNT_MASK | 4).to_be_bytes());
        buf.extend_from_slice(&(K_CLASS_MASK | 1234).to_be_bytes());
        let mut s = ObjectStream::new(&buf, 0);
        match s.read_any().unwrap() {
            AnyObject::Object { class_name, end } => {
                assert_eq!(class_name, UNKNOWN_CLASS);
                assert_eq!(end, Some(8));
            }
            other => panic!("unexpected {other:?}"),
        }
    }
}
