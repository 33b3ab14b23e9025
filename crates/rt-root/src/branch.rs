//! Decoding scalar branches into typed columns.

use crate::basket::{fixed_data, read_basket};
use crate::error::{Result, RootError};
use crate::tree::{BranchInfo, LeafKind};

/// Values of one scalar branch, in entry order.
#[derive(Debug, Clone, PartialEq)]
pub enum BranchData {
    /// `Float_t`
    F32(Vec<f32>),
    /// `Double_t`
    F64(Vec<f64>),
    /// `Char_t`
    I8(Vec<i8>),
    /// `UChar_t`
    U8(Vec<u8>),
    /// `Short_t`
    I16(Vec<i16>),
    /// `UShort_t`
    U16(Vec<u16>),
    /// `Int_t`
    I32(Vec<i32>),
    /// `UInt_t`
    U32(Vec<u32>),
    /// `Long64_t`
    I64(Vec<i64>),
    /// `ULong64_t`
    U64(Vec<u64>),
    /// `Bool_t`
    Bool(Vec<bool>),
}

macro_rules! for_each_variant {
    ($value:expr, $v:ident => $body:expr) => {
        match $value {
            BranchData::F32($v) => $body,
            BranchData::F64($v) => $body,
            BranchData::I8($v) => $body,
            BranchData::U8($v) => $body,
            BranchData::I16($v) => $body,
            BranchData::U16($v) => $body,
            BranchData::I32($v) => $body,
            BranchData::U32($v) => $body,
            BranchData::I64($v) => $body,
            BranchData::U64($v) => $body,
            BranchData::Bool($v) => $body,
        }
    };
}

impl BranchData {
    /// An empty column of the given kind.
    pub fn empty(kind: LeafKind) -> Self {
        match kind {
            LeafKind::F32 => BranchData::F32(Vec::new()),
            LeafKind::F64 => BranchData::F64(Vec::new()),
            LeafKind::I8 => BranchData::I8(Vec::new()),
            LeafKind::U8 => BranchData::U8(Vec::new()),
            LeafKind::I16 => BranchData::I16(Vec::new()),
            LeafKind::U16 => BranchData::U16(Vec::new()),
            LeafKind::I32 => BranchData::I32(Vec::new()),
            LeafKind::U32 => BranchData::U32(Vec::new()),
            LeafKind::I64 => BranchData::I64(Vec::new()),
            LeafKind::U64 => BranchData::U64(Vec::new()),
            LeafKind::Bool => BranchData::Bool(Vec::new()),
        }
    }

    /// The leaf kind these values came from.
    pub fn kind(&self) -> LeafKind {
        match self {
            BranchData::F32(_) => LeafKind::F32,
            BranchData::F64(_) => LeafKind::F64,
            BranchData::I8(_) => LeafKind::I8,
            BranchData::U8(_) => LeafKind::U8,
            BranchData::I16(_) => LeafKind::I16,
            BranchData::U16(_) => LeafKind::U16,
            BranchData::I32(_) => LeafKind::I32,
            BranchData::U32(_) => LeafKind::U32,
            BranchData::I64(_) => LeafKind::I64,
            BranchData::U64(_) => LeafKind::U64,
            BranchData::Bool(_) => LeafKind::Bool,
        }
    }

    /// Number of entries.
    pub fn len(&self) -> usize {
        for_each_variant!(self, v => v.len())
    }

    /// Whether there are no entries.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Value at `i` widened to `f64`.
    pub fn get_f64(&self, i: usize) -> Option<f64> {
        match self {
            BranchData::Bool(v) => v.get(i).map(|&b| f64::from(u8::from(b))),
            BranchData::F32(v) => v.get(i).map(|&x| f64::from(x)),
            BranchData::F64(v) => v.get(i).copied(),
            BranchData::I8(v) => v.get(i).map(|&x| f64::from(x)),
            BranchData::U8(v) => v.get(i).map(|&x| f64::from(x)),
            BranchData::I16(v) => v.get(i).map(|&x| f64::from(x)),
            BranchData::U16(v) => v.get(i).map(|&x| f64::from(x)),
            BranchData::I32(v) => v.get(i).map(|&x| f64::from(x)),
            BranchData::U32(v) => v.get(i).map(|&x| f64::from(x)),
            BranchData::I64(v) => v.get(i).map(|&x| x as f64),
            BranchData::U64(v) => v.get(i).map(|&x| x as f64),
        }
    }

    /// All values widened to `f64`.
    pub fn to_f64(&self) -> Vec<f64> {
        (0..self.len()).filter_map(|i| self.get_f64(i)).collect()
    }

    /// Keep the first `n` entries.
    pub fn truncate(&mut self, n: usize) {
        for_each_variant!(self, v => v.truncate(n))
    }

    /// Gather the entries at `indices`, in the order given.
    ///
    /// Out-of-range indices are skipped.
    pub fn take(&self, indices: &[usize]) -> Self {
        macro_rules! gather {
            ($variant:ident, $v:expr) => {
                BranchData::$variant(indices.iter().filter_map(|&i| $v.get(i).copied()).collect())
            };
        }
        match self {
            BranchData::F32(v) => gather!(F32, v),
            BranchData::F64(v) => gather!(F64, v),
            BranchData::I8(v) => gather!(I8, v),
            BranchData::U8(v) => gather!(U8, v),
            BranchData::I16(v) => gather!(I16, v),
            BranchData::U16(v) => gather!(U16, v),
            BranchData::I32(v) => gather!(I32, v),
            BranchData::U32(v) => gather!(U32, v),
            BranchData::I64(v) => gather!(I64, v),
            BranchData::U64(v) => gather!(U64, v),
            BranchData::Bool(v) => gather!(Bool, v),
        }
    }

    /// Keep the entries whose mask value is `true`.
    ///
    /// Entries past the end of `mask` are dropped.
    pub fn filter(&self, mask: &[bool]) -> Self {
        let indices: Vec<usize> =
            mask.iter().enumerate().filter_map(|(i, &keep)| keep.then_some(i)).collect();
        self.take(&indices)
    }

    fn extend_from_be(&mut self, bytes: &[u8]) {
        macro_rules! decode {
            ($v:expr, $t:ty) => {
                $v.extend(
                    bytes
                        .chunks_exact(std::mem::size_of::<$t>())
                        .map(|c| <$t>::from_be_bytes(c.try_into().unwrap_or_default())),
                )
            };
        }
        match self {
            BranchData::F32(v) => decode!(v, f32),
            BranchData::F64(v) => decode!(v, f64),
            BranchData::I8(v) => decode!(v, i8),
            BranchData::U8(v) => v.extend_from_slice(bytes),
            BranchData::I16(v) => decode!(v, i16),
            BranchData::U16(v) => decode!(v, u16),
            BranchData::I32(v) => decode!(v, i32),
            BranchData::U32(v) => decode!(v, u32),
            BranchData::I64(v) => decode!(v, i64),
            BranchData::U64(v) => decode!(v, u64),
            BranchData::Bool(v) => v.extend(bytes.iter().map(|&b| b != 0)),
        }
    }
}

/// Read every basket of a scalar branch.
///
/// The result holds exactly `tree_entries` values; baskets that hold more
/// (never the case for well-formed files) are truncated.
pub(crate) fn read_branch_data(
    file_data: &[u8],
    info: &BranchInfo,
    tree_entries: u64,
    is_large: bool,
) -> Result<BranchData> {
    if let Some(reason) = info.unsupported_reason() {
        return Err(RootError::UnsupportedBranch { name: info.name.clone(), reason });
    }
    let kind = info.leaf_kind.ok_or_else(|| RootError::UnsupportedBranch {
        name: info.name.clone(),
        reason: "no primitive leaf".into(),
    })?;
    let elem_size = kind.byte_size();

    let expected = usize::try_from(tree_entries)
        .map_err(|_| RootError::Deserialization(format!("entry count {tree_entries} too large")))?;
    let mut out = BranchData::empty(kind);

    for (i, &seek) in info.basket_seek.iter().enumerate() {
        if out.len() >= expected {
            break;
        }
        let basket = read_basket(file_data, seek, is_large)?;
        let data = fixed_data(&basket, elem_size)?;
        log::trace!(
            "branch '{}' basket {i}: {} entries from seek {seek}",
            info.name,
            basket.n_entries
        );
        out.extend_from_be(data);
    }

    if out.len() < expected {
        return Err(RootError::Deserialization(format!(
            "branch '{}': baskets on disk hold {} entries, tree has {}",
            info.name,
            out.len(),
            expected
        )));
    }
    out.truncate(expected);
    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn decode_big_endian() {
        let mut d = BranchData::empty(LeafKind::F32);
        let bytes: Vec<u8> = [1.5f32, -2.0].iter().flat_map(|x| x.to_be_bytes()).collect();
        d.extend_from_be(&bytes);
        assert_eq!(d, BranchData::F32(vec![1.5, -2.0]));

        let mut d = BranchData::empty(LeafKind::U64);
        d.extend_from_be(&u64::MAX.to_be_bytes());
        assert_eq!(d.get_f64(0), Some(u64::MAX as f64));

        let mut d = BranchData::empty(LeafKind::Bool);
        d.extend_from_be(&[0, 1, 2]);
        assert_eq!(d.to_f64(), vec![0.0, 1.0, 1.0]);
    }

    #[test]
    fn truncate_and_kind() {
        let mut d = BranchData::I16(vec![1, 2, 3]);
        d.truncate(2);
        assert_eq!(d.len(), 2);
        assert_eq!(d.kind(), LeafKind::I16);
        assert!(BranchData::empty(LeafKind::F64).is_empty());
    }

    #[test]
    fn take_and_filter() {
        let d = BranchData::U32(vec![10, 11, 12, 13]);
        assert_eq!(d.take(&[3, 0, 9]), BranchData::U32(vec![13, 10]));
        assert_eq!(d.filter(&[true, false, true]), BranchData::U32(vec![10, 12]));
        assert!(d.filter(&[]).is_empty());
    }
}
