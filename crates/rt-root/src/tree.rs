//! Public types for TTree branch metadata.

/// Leaf data type, from the TLeaf class and its `fIsUnsigned` flag.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum LeafKind {
    /// `TLeafF`: 32-bit float.
    F32,
    /// `TLeafD`: 64-bit float.
    F64,
    /// `TLeafB`: 8-bit signed integer.
    I8,
    /// `TLeafB` unsigned.
    U8,
    /// `TLeafS`: 16-bit signed integer.
    I16,
    /// `TLeafS` unsigned.
    U16,
    /// `TLeafI`: 32-bit signed integer.
    I32,
    /// `TLeafI` unsigned.
    U32,
    /// `TLeafL`: 64-bit signed integer.
    I64,
    /// `TLeafL` unsigned.
    U64,
    /// `TLeafO`: boolean (1 byte).
    Bool,
}

impl LeafKind {
    /// Map a TLeaf class name and signedness to a kind.
    pub fn from_class(class_name: &str, is_unsigned: bool) -> Option<Self> {
        let kind = match (class_name, is_unsigned) {
            ("TLeafF", _) => LeafKind::F32,
            ("TLeafD", _) => LeafKind::F64,
            ("TLeafB", false) => LeafKind::I8,
            ("TLeafB", true) => LeafKind::U8,
            ("TLeafS", false) => LeafKind::I16,
            ("TLeafS", true) => LeafKind::U16,
            ("TLeafI", false) => LeafKind::I32,
            ("TLeafI", true) => LeafKind::U32,
            ("TLeafL", false) => LeafKind::I64,
            ("TLeafL", true) => LeafKind::U64,
            ("TLeafO", _) => LeafKind::Bool,
            _ => return None,
        };
        Some(kind)
    }

    /// Size in bytes of one element.
    pub fn byte_size(self) -> usize {
        match self {
            LeafKind::I8 | LeafKind::U8 | LeafKind::Bool => 1,
            LeafKind::I16 | LeafKind::U16 => 2,
            LeafKind::F32 | LeafKind::I32 | LeafKind::U32 => 4,
            LeafKind::F64 | LeafKind::I64 | LeafKind::U64 => 8,
        }
    }

    /// ROOT's typedef name for this kind (what `TLeaf::GetTypeName` reports).
    pub fn type_name(self) -> &'static str {
        match self {
            LeafKind::F32 => "Float_t",
            LeafKind::F64 => "Double_t",
            LeafKind::I8 => "Char_t",
            LeafKind::U8 => "UChar_t",
            LeafKind::I16 => "Short_t",
            LeafKind::U16 => "UShort_t",
            LeafKind::I32 => "Int_t",
            LeafKind::U32 => "UInt_t",
            LeafKind::I64 => "Long64_t",
            LeafKind::U64 => "ULong64_t",
            LeafKind::Bool => "Bool_t",
        }
    }
}

/// Metadata for a single TBranch in a TTree.
#[derive(Debug, Clone)]
pub struct BranchInfo {
    /// Branch name.
    pub name: String,
    /// Streamed class of the branch (`TBranch`, `TBranchElement`, ...).
    pub class_name: String,
    /// Class of the first leaf (`TLeafF`, ...), if any.
    pub leaf_class: Option<String>,
    /// Decoded leaf kind, when the leaf class is a primitive one.
    pub leaf_kind: Option<LeafKind>,
    /// Number of leaves attached to the branch.
    pub n_leaves: usize,
    /// Fixed element count of the first leaf (`fLen`).
    pub leaf_len: i32,
    /// Whether the first leaf is counted by another leaf (variable length).
    pub has_leaf_count: bool,
    /// Entry-offset table length (non-zero for variable-size payloads).
    pub entry_offset_len: i32,
    /// Total number of entries in this branch.
    pub entries: u64,
    /// Compressed byte sizes for each written basket.
    pub basket_bytes: Vec<u32>,
    /// First entry of each written basket.
    pub basket_entry: Vec<u64>,
    /// Absolute file offsets for each written basket.
    pub basket_seek: Vec<u64>,
}

impl BranchInfo {
    /// Reason this branch cannot be read as a flat scalar column, if any.
    pub fn unsupported_reason(&self) -> Option<String> {
        if self.class_name != "TBranch" {
            return Some(format!("branch class {} is not a plain TBranch", self.class_name));
        }
        if self.n_leaves != 1 {
            return Some(format!("{} leaves (expected exactly 1)", self.n_leaves));
        }
        if self.leaf_kind.is_none() {
            return Some(format!(
                "leaf class {} is not a primitive type",
                self.leaf_class.as_deref().unwrap_or("<none>")
            ));
        }
        if self.has_leaf_count || self.leaf_len != 1 {
            return Some("array leaf".to_string());
        }
        None
    }

    /// Whether this branch holds exactly one primitive value per entry.
    pub fn is_scalar(&self) -> bool {
        self.unsupported_reason().is_none()
    }

    /// ROOT type name of the leaf (`Float_t`, ...), or the leaf class if non-primitive.
    pub fn type_name(&self) -> &str {
        match (self.leaf_kind, &self.leaf_class) {
            (Some(kind), _) => kind.type_name(),
            (None, Some(class)) => class.as_str(),
            (None, None) => "",
        }
    }

    /// Number of baskets written to disk.
    pub fn n_baskets(&self) -> usize {
        self.basket_seek.len()
    }
}

/// A parsed TTree with branch metadata.
#[derive(Debug, Clone)]
pub struct Tree {
    /// Tree name.
    pub name: String,
    /// Total number of entries.
    pub entries: u64,
    /// Top-level branches in declaration order.
    pub branches: Vec<BranchInfo>,
}

impl Tree {
    /// Find a branch by name.
    pub fn find_branch(&self, name: &str) -> Option<&BranchInfo> {
        self.branches.iter().find(|b| b.name == name)
    }

    /// Whether a branch with this name exists.
    pub fn has_branch(&self, name: &str) -> bool {
        self.find_branch(name).is_some()
    }

    /// List all branch names.
    pub fn branch_names(&self) -> Vec<&str> {
        self.branches.iter().map(|b| b.name.as_str()).collect()
    }

    /// Number of top-level branches (`TTree::GetNbranches`).
    pub fn n_branches(&self) -> usize {
        self.branches.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn branch(class: &str, leaf: Option<(&str, bool)>, len: i32) -> BranchInfo {
        BranchInfo {
            name: "b".into(),
            class_name: class.into(),
            leaf_class: leaf.map(|(c, _)| c.to_string()),
            leaf_kind: leaf.and_then(|(c, u)| LeafKind::from_class(c, u)),
            n_leaves: usize::from(leaf.is_some()),
            leaf_len: len,
            has_leaf_count: false,
            entry_offset_len: 0,
            entries: 0,
            basket_bytes: vec![],
            basket_entry: vec![],
            basket_seek: vec![],
        }
    }

    #[test]
    fn unsigned_flag_selects_kind() {
        assert_eq!(LeafKind::from_class("TLeafI", true), Some(LeafKind::U32));
        assert_eq!(LeafKind::from_class("TLeafI", false), Some(LeafKind::I32));
        assert_eq!(LeafKind::from_class("TLeafL", true).unwrap().type_name(), "ULong64_t");
        assert_eq!(LeafKind::from_class("TLeafElement", false), None);
    }

    #[test]
    fn scalar_detection() {
        assert!(branch("TBranch", Some(("TLeafF", false)), 1).is_scalar());
        assert!(!branch("TBranch", Some(("TLeafF", false)), 4).is_scalar());
        assert!(!branch("TBranchElement", Some(("TLeafElement", false)), 1).is_scalar());
        assert!(!branch("TBranch", None, 1).is_scalar());
        assert_eq!(branch("TBranch", Some(("TLeafC", false)), 1).type_name(), "TLeafC");
    }
}
