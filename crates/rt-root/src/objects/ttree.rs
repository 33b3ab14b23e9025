//! TTree and TBranch binary deserialization from ROOT streamer format.

use crate::error::{Result, RootError};
use crate::objects::stream::{AnyObject, ObjectStream};
use crate::tree::{BranchInfo, LeafKind, Tree};

/// Read a TTree from a decompressed TKey payload.
///
/// `key_len` is the header length of the key holding the tree; class
/// references inside the payload are offsets from the key start.
pub(crate) fn read_ttree(payload: &[u8], key_len: usize) -> Result<Tree> {
    let mut s = ObjectStream::new(payload, key_len);

    let (tree_ver, tree_end) = s.r.read_version()?;
    let tree_end =
        tree_end.ok_or_else(|| RootError::Deserialization("TTree missing byte count".into()))?;
    if tree_ver < 16 {
        return Err(RootError::Deserialization(format!(
            "TTree streamer version {tree_ver} is too old"
        )));
    }

    let (name, _title) = s.r.read_tnamed()?;

    // TAttLine, TAttFill, TAttMarker
    s.r.skip_versioned()?;
    s.r.skip_versioned()?;
    s.r.skip_versioned()?;

    let entries = s.r.read_i64()?; // fEntries
    let _tot_bytes = s.r.read_i64()?;
    let _zip_bytes = s.r.read_i64()?;
    let _saved_bytes = s.r.read_i64()?;
    if tree_ver >= 18 {
        let _flushed_bytes = s.r.read_i64()?;
    }

    let _weight = s.r.read_f64()?;
    let _timer_interval = s.r.read_i32()?;
    let _scan_field = s.r.read_i32()?;
    let _update = s.r.read_i32()?;
    if tree_ver >= 18 {
        let _default_entry_offset_len = s.r.read_i32()?;
    }
    let n_cluster_range = if tree_ver >= 19 { s.r.read_i32()?.max(0) as usize } else { 0 };

    let _max_entries = s.r.read_i64()?;
    let _max_entry_loop = s.r.read_i64()?;
    let _max_virtual_size = s.r.read_i64()?;
    let _auto_save = s.r.read_i64()?;
    if tree_ver >= 18 {
        let _auto_flush = s.r.read_i64()?;
    }
    let _estimate = s.r.read_i64()?;

    if tree_ver >= 19 {
        // fClusterRangeEnd, fClusterSize: a one-byte array marker, then the values
        for _ in 0..2 {
            s.r.read_u8()?;
            s.r.skip(8 * n_cluster_range)?;
        }
    }
    if tree_ver >= 20 {
        // fIOFeatures
        s.r.skip_versioned()?;
    }

    let branches = read_branch_array(&mut s)?;

    s.r.set_pos(tree_end)?;
    let entries = u64::try_from(entries)
        .map_err(|_| RootError::Deserialization(format!("negative entry count {entries}")))?;
    Ok(Tree { name, entries, branches })
}

/// Read `fBranches`. Non-`TBranch` elements are listed with their class
/// name only, so callers can report them as unreadable.
fn read_branch_array(s: &mut ObjectStream) -> Result<Vec<BranchInfo>> {
    let (count, arr_end) = s.read_objarray_header()?;
    let mut branches = Vec::with_capacity(count.min(4096));

    for _ in 0..count {
        let (class_name, end) = match s.read_any()? {
            AnyObject::Null | AnyObject::Reference => continue,
            AnyObject::Object { class_name, end } => (class_name, end),
        };

        if class_name == "TBranch" {
            let mut branch = read_tbranch(s)?;
            branch.class_name = class_name;
            branches.push(branch);
        } else {
            log::debug!("branch of class {class_name} listed without contents");
            let name = peek_branch_name(s)?;
            branches.push(BranchInfo {
                name,
                class_name,
                leaf_class: None,
                leaf_kind: None,
                n_leaves: 0,
                leaf_len: 0,
                has_leaf_count: false,
                entry_offset_len: 0,
                entries: 0,
                basket_bytes: Vec::new(),
                basket_entry: Vec::new(),
                basket_seek: Vec::new(),
            });
        }
        s.skip_to(end, "branch")?;
    }

    s.r.set_pos(arr_end)?;
    Ok(branches)
}

/// Every branch class starts with its own version header wrapping a
/// TBranch, whose first member is the TNamed.
fn peek_branch_name(s: &mut ObjectStream) -> Result<String> {
    let _outer = s.r.read_version()?;
    let _tbranch = s.r.read_version()?;
    let (name, _title) = s.r.read_tnamed()?;
    Ok(name)
}

/// Per-branch summary of the first leaf in `fLeaves`.
struct LeafSummary {
    n_leaves: usize,
    class_name: Option<String>,
    kind: Option<LeafKind>,
    len: i32,
    has_count: bool,
}

fn read_tbranch(s: &mut ObjectStream) -> Result<BranchInfo> {
    let (branch_ver, branch_end) = s.r.read_version()?;
    let branch_end = branch_end
        .ok_or_else(|| RootError::Deserialization("TBranch missing byte count".into()))?;

    let (name, _title) = s.r.read_tnamed()?;
    s.r.skip_versioned()?; // TAttFill

    let _compress = s.r.read_i32()?;
    let _basket_size = s.r.read_i32()?;
    let entry_offset_len = s.r.read_i32()?;
    let write_basket = s.r.read_i32()?.max(0) as usize;
    let _entry_number = s.r.read_i64()?;
    if branch_ver >= 13 {
        // fIOFeatures
        s.r.skip_versioned()?;
    }
    let _offset = s.r.read_i32()?;
    let max_baskets = s.r.read_i32()?.max(0) as usize;
    let _split_level = s.r.read_i32()?;
    let entries = s.r.read_i64()?.max(0) as u64;
    if branch_ver >= 11 {
        let _first_entry = s.r.read_i64()?;
    }
    let _tot_bytes = s.r.read_i64()?;
    let _zip_bytes = s.r.read_i64()?;

    // fBranches: sub-branches only occur on split objects.
    let (n_sub, sub_end) = s.read_objarray_header()?;
    if n_sub > 0 {
        log::debug!("branch '{name}' has {n_sub} sub-branches; ignoring them");
    }
    s.r.set_pos(sub_end)?;

    let leaves = read_leaf_array(s)?;

    // fBaskets
    s.r.skip_versioned()?;

    if write_basket > max_baskets {
        return Err(RootError::Deserialization(format!(
            "branch '{name}': fWriteBasket {write_basket} > fMaxBaskets {max_baskets}"
        )));
    }

    s.r.read_u8()?;
    let mut basket_bytes = Vec::with_capacity(write_basket);
    for i in 0..max_baskets {
        let v = s.r.read_i32()?;
        if i < write_basket {
            basket_bytes.push(v.max(0) as u32);
        }
    }

    s.r.read_u8()?;
    let mut basket_entry = Vec::with_capacity(write_basket);
    for i in 0..max_baskets {
        let v = s.r.read_i64()?;
        if i < write_basket {
            basket_entry.push(v.max(0) as u64);
        }
    }

    s.r.read_u8()?;
    let mut basket_seek = Vec::with_capacity(write_basket);
    for i in 0..max_baskets {
        let v = s.r.read_i64()?;
        if i < write_basket {
            basket_seek.push(v.max(0) as u64);
        }
    }

    s.r.set_pos(branch_end)?;

    Ok(BranchInfo {
        name,
        class_name: "TBranch".to_string(),
        leaf_class: leaves.class_name,
        leaf_kind: leaves.kind,
        n_leaves: leaves.n_leaves,
        leaf_len: leaves.len,
        has_leaf_count: leaves.has_count,
        entry_offset_len,
        entries,
        basket_bytes,
        basket_entry,
        basket_seek,
    })
}

fn read_leaf_array(s: &mut ObjectStream) -> Result<LeafSummary> {
    let (count, arr_end) = s.read_objarray_header()?;
    let mut summary =
        LeafSummary { n_leaves: 0, class_name: None, kind: None, len: 0, has_count: false };

    for _ in 0..count {
        let (class_name, end) = match s.read_any()? {
            AnyObject::Null | AnyObject::Reference => continue,
            AnyObject::Object { class_name, end } => (class_name, end),
        };
        summary.n_leaves += 1;

        if summary.n_leaves == 1 {
            let _leaf_ver = s.r.read_version()?;
            let (len, is_unsigned, has_count) = read_tleaf(s)?;
            summary.kind = LeafKind::from_class(&class_name, is_unsigned);
            summary.class_name = Some(class_name);
            summary.len = len;
            summary.has_count = has_count;
        }
        s.skip_to(end, "leaf")?;
    }

    s.r.set_pos(arr_end)?;
    Ok(summary)
}

/// Read the TLeaf base: returns `(fLen, fIsUnsigned, has fLeafCount)`.
fn read_tleaf(s: &mut ObjectStream) -> Result<(i32, bool, bool)> {
    let (_ver, end) = s.r.read_version()?;
    let _named = s.r.read_tnamed()?;
    let len = s.r.read_i32()?;
    let _len_type = s.r.read_i32()?;
    let _offset = s.r.read_i32()?;
    let _is_range = s.r.read_bool()?;
    let is_unsigned = s.r.read_bool()?;
    let has_count = match s.read_any()? {
        AnyObject::Null => false,
        AnyObject::Reference => true,
        AnyObject::Object { end: count_end, .. } => {
            if count_end.is_some() {
                s.skip_to(count_end, "leaf count")?;
            }
            true
        }
    };
    if let Some(end) = end {
        s.r.set_pos(end)?;
    }
    Ok((len, is_unsigned, has_count))
}
