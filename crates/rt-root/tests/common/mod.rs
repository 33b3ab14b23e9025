//! Synthetic ROOT file builder for tests.
//!
//! Writes the small-file (32-bit seek) layout with uncompressed or
//! zlib-compressed records: a file header, the top directory, baskets,
//! TTree keys and key lists. Shared with the other crates' test suites
//! through `#[path]` includes.
#![allow(dead_code)]

use std::collections::HashMap;
use std::io::Write;

const BYTE_COUNT: u32 = 0x4000_0000;
const NEW_CLASS: u32 = 0xFFFF_FFFF;
const CLASS_MASK: u32 = 0x8000_0000;
const BEGIN: usize = 100;

/// Column values for one scalar branch.
#[derive(Debug, Clone)]
pub enum Values {
    F32(Vec<f32>),
    F64(Vec<f64>),
    I8(Vec<i8>),
    U8(Vec<u8>),
    I16(Vec<i16>),
    U16(Vec<u16>),
    I32(Vec<i32>),
    U32(Vec<u32>),
    I64(Vec<i64>),
    U64(Vec<u64>),
    Bool(Vec<bool>),
}

impl Values {
    fn len(&self) -> usize {
        match self {
            Values::F32(v) => v.len(),
            Values::F64(v) => v.len(),
            Values::I8(v) => v.len(),
            Values::U8(v) => v.len(),
            Values::I16(v) => v.len(),
            Values::U16(v) => v.len(),
            Values::I32(v) => v.len(),
            Values::U32(v) => v.len(),
            Values::I64(v) => v.len(),
            Values::U64(v) => v.len(),
            Values::Bool(v) => v.len(),
        }
    }

    /// `(leaf class, unsigned, element size)`
    fn leaf(&self) -> (&'static str, bool, usize) {
        match self {
            Values::F32(_) => ("TLeafF", false, 4),
            Values::F64(_) => ("TLeafD", false, 8),
            Values::I8(_) => ("TLeafB", false, 1),
            Values::U8(_) => ("TLeafB", true, 1),
            Values::I16(_) => ("TLeafS", false, 2),
            Values::U16(_) => ("TLeafS", true, 2),
            Values::I32(_) => ("TLeafI", false, 4),
            Values::U32(_) => ("TLeafI", true, 4),
            Values::I64(_) => ("TLeafL", false, 8),
            Values::U64(_) => ("TLeafL", true, 8),
            Values::Bool(_) => ("TLeafO", false, 1),
        }
    }

    fn be_bytes(&self, range: std::ops::Range<usize>) -> Vec<u8> {
        match self {
            Values::F32(v) => v[range].iter().flat_map(|x| x.to_be_bytes()).collect(),
            Values::F64(v) => v[range].iter().flat_map(|x| x.to_be_bytes()).collect(),
            Values::I8(v) => v[range].iter().flat_map(|x| x.to_be_bytes()).collect(),
            Values::U8(v) => v[range].to_vec(),
            Values::I16(v) => v[range].iter().flat_map(|x| x.to_be_bytes()).collect(),
            Values::U16(v) => v[range].iter().flat_map(|x| x.to_be_bytes()).collect(),
            Values::I32(v) => v[range].iter().flat_map(|x| x.to_be_bytes()).collect(),
            Values::U32(v) => v[range].iter().flat_map(|x| x.to_be_bytes()).collect(),
            Values::I64(v) => v[range].iter().flat_map(|x| x.to_be_bytes()).collect(),
            Values::U64(v) => v[range].iter().flat_map(|x| x.to_be_bytes()).collect(),
            Values::Bool(v) => v[range].iter().map(|&b| u8::from(b)).collect(),
        }
    }
}

/// One branch of a fixture tree.
#[derive(Debug, Clone)]
pub enum Branch {
    /// A plain single-leaf TBranch.
    Scalar { name: String, values: Values },
    /// A TBranch whose leaf holds `len` values per entry (metadata only).
    FixedArray { name: String, len: i32 },
    /// A TBranchElement (metadata only).
    Element { name: String },
}

impl Branch {
    pub fn scalar(name: &str, values: Values) -> Self {
        Branch::Scalar { name: name.to_string(), values }
    }
}

/// A tree to place in the file.
#[derive(Debug, Clone)]
pub struct TreeSpec {
    pub name: String,
    pub dir: Option<String>,
    pub cycle: u16,
    pub entries: usize,
    pub branches: Vec<Branch>,
    /// Entries per basket.
    pub basket_entries: usize,
}

impl TreeSpec {
    /// A top-level tree. `entries` is taken from the first scalar branch.
    pub fn new(name: &str, branches: Vec<Branch>) -> Self {
        let entries = branches
            .iter()
            .find_map(|b| match b {
                Branch::Scalar { values, .. } => Some(values.len()),
                _ => None,
            })
            .unwrap_or(0);
        Self {
            name: name.to_string(),
            dir: None,
            cycle: 1,
            entries,
            branches,
            basket_entries: 1000,
        }
    }

    pub fn in_dir(mut self, dir: &str) -> Self {
        self.dir = Some(dir.to_string());
        self
    }

    pub fn cycle(mut self, cycle: u16) -> Self {
        self.cycle = cycle;
        self
    }

    pub fn basket_entries(mut self, n: usize) -> Self {
        self.basket_entries = n.max(1);
        self
    }
}

/// Builds a whole file.
#[derive(Debug, Default)]
pub struct FileBuilder {
    trees: Vec<TreeSpec>,
    /// Extra top-level keys: `(class, name)` with an empty payload.
    others: Vec<(String, String)>,
    compress: bool,
}

impl FileBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn tree(mut self, tree: TreeSpec) -> Self {
        self.trees.push(tree);
        self
    }

    pub fn other_key(mut self, class: &str, name: &str) -> Self {
        self.others.push((class.to_string(), name.to_string()));
        self
    }

    /// Zlib-compress records when that makes them smaller.
    pub fn compressed(mut self) -> Self {
        self.compress = true;
        self
    }

    pub fn build(&self) -> Vec<u8> {
        let mut f = Out::default();

        // file header
        f.bytes(b"root");
        f.u32(62_400);
        f.u32(BEGIN as u32);
        let end_at = f.u32_placeholder(); // fEND
        f.u32(0); // fSeekFree
        f.u32(0); // fNbytesFree
        f.u32(0); // nfree
        let nbytes_name_at = f.u32_placeholder();
        f.u8(4); // fUnits
        f.u32(if self.compress { 101 } else { 0 });
        f.u32(0); // fSeekInfo
        f.u32(0); // fNbytesInfo
        f.bytes(&[0u8; 18]);
        f.pad_to(BEGIN);

        // top-level TFile key + name + directory record
        let header = key_header(0, 0, 0, 1, BEGIN, 0, "TFile", "fixture.root", "");
        f.bytes(&header);
        f.string("fixture.root");
        f.string("");
        let nbytes_name = f.len() - BEGIN;
        f.patch_u32(nbytes_name_at, nbytes_name as u32);
        let top_record = f.len();
        write_dir_record(&mut f, 0, 0);
        f.pad_to(top_record + 42);

        let mut top_keys: Vec<Vec<u8>> = Vec::new();
        let mut dir_keys: HashMap<String, Vec<Vec<u8>>> = HashMap::new();
        let mut dir_order: Vec<String> = Vec::new();

        for tree in &self.trees {
            let header = self.write_tree(&mut f, tree);
            match &tree.dir {
                None => top_keys.push(header),
                Some(dir) => {
                    if !dir_keys.contains_key(dir) {
                        dir_order.push(dir.clone());
                    }
                    dir_keys.entry(dir.clone()).or_default().push(header);
                }
            }
        }

        for (class, name) in &self.others {
            let seek = f.len();
            let header = key_header(0, 0, 0, 1, seek, BEGIN, class, name, "");
            let n = header.len();
            let header = key_header(n as u32, 0, n as u16, 1, seek, BEGIN, class, name, "");
            f.bytes(&header);
            top_keys.push(header);
        }

        for dir in &dir_order {
            let (seek_keys, nbytes_keys) = write_key_list(&mut f, dir, &dir_keys[dir]);
            let mut rec = Out::default();
            write_dir_record(&mut rec, seek_keys, nbytes_keys);
            let seek = f.len();
            let header = self.write_record(&mut f, seek, "TDirectoryFile", dir, 1, rec.buf);
            top_keys.push(header);
        }

        let (seek_keys, nbytes_keys) = write_key_list(&mut f, "fixture.root", &top_keys);
        // nbytes_keys sits at +10 and seek_keys at +26 of the small record
        f.patch_u32(top_record + 10, nbytes_keys);
        f.patch_u32(top_record + 26, seek_keys as u32);
        let end = f.len();
        f.patch_u32(end_at, end as u32);
        f.buf
    }

    /// Write baskets, then the TTree key. Returns the tree's key header.
    fn write_tree(&self, f: &mut Out, tree: &TreeSpec) -> Vec<u8> {
        let mut layouts = Vec::new();
        for branch in &tree.branches {
            let mut layout = BasketLayout::default();
            if let Branch::Scalar { name, values } = branch {
                let (_, _, size) = values.leaf();
                let mut start = 0;
                while start < values.len() {
                    let stop = (start + tree.basket_entries).min(values.len());
                    let data = values.be_bytes(start..stop);
                    let seek = f.len();
                    let n_bytes =
                        self.write_basket(f, seek, name, &tree.name, stop - start, size, data);
                    layout.bytes.push(n_bytes);
                    layout.entry.push(start as i64);
                    layout.seek.push(seek as i64);
                    start = stop;
                }
            }
            layouts.push(layout);
        }

        let key_len = key_header(0, 0, 0, tree.cycle, 0, 0, "TTree", &tree.name, "").len();
        let payload = tree_payload(tree, &layouts, key_len);
        let seek = f.len();
        self.write_record(f, seek, "TTree", &tree.name, tree.cycle, payload)
    }

    #[allow(clippy::too_many_arguments)]
    fn write_basket(
        &self,
        f: &mut Out,
        seek: usize,
        branch: &str,
        tree: &str,
        n_entries: usize,
        elem_size: usize,
        data: Vec<u8>,
    ) -> u32 {
        let base = key_header(0, 0, 0, 1, seek, BEGIN, "TBasket", branch, tree);
        let key_len = base.len() + 19;
        let obj_len = data.len();
        let stored = self.maybe_compress(data);
        let n_bytes = key_len + stored.len();

        let mut header = key_header(
            n_bytes as u32,
            obj_len as u32,
            key_len as u16,
            1,
            seek,
            BEGIN,
            "TBasket",
            branch,
            tree,
        );
        let mut extra = Out::default();
        extra.u16(3); // TBasket version
        extra.u32(32_000); // fBufferSize
        extra.u32(elem_size as u32); // fNevBufSize
        extra.u32(n_entries as u32); // fNevBuf
        extra.u32((key_len + obj_len) as u32); // fLast
        extra.u8(0); // flag
        header.extend_from_slice(&extra.buf);
        f.bytes(&header);
        f.bytes(&stored);
        n_bytes as u32
    }

    /// Write a key record at `seek`. Returns the key header bytes.
    fn write_record(
        &self,
        f: &mut Out,
        seek: usize,
        class: &str,
        name: &str,
        cycle: u16,
        payload: Vec<u8>,
    ) -> Vec<u8> {
        let key_len = key_header(0, 0, 0, cycle, seek, BEGIN, class, name, "").len();
        let obj_len = payload.len();
        let stored = self.maybe_compress(payload);
        let header = key_header(
            (key_len + stored.len()) as u32,
            obj_len as u32,
            key_len as u16,
            cycle,
            seek,
            BEGIN,
            class,
            name,
            "",
        );
        f.bytes(&header);
        f.bytes(&stored);
        header
    }

    fn maybe_compress(&self, data: Vec<u8>) -> Vec<u8> {
        if !self.compress || data.is_empty() {
            return data;
        }
        let mut enc = flate2::write::ZlibEncoder::new(Vec::new(), flate2::Compression::best());
        enc.write_all(&data).unwrap();
        let z = enc.finish().unwrap();
        if z.len() + 9 >= data.len() || data.len() > 0xFF_FFFF {
            return data;
        }
        let mut out = Vec::with_capacity(z.len() + 9);
        out.extend_from_slice(b"ZL");
        out.push(8);
        out.extend_from_slice(&(z.len() as u32).to_le_bytes()[..3]);
        out.extend_from_slice(&(data.len() as u32).to_le_bytes()[..3]);
        out.extend_from_slice(&z);
        out
    }
}

/// Write a temporary `.root` file into `dir` and return its path.
pub fn write_file(dir: &std::path::Path, name: &str, builder: &FileBuilder) -> std::path::PathBuf {
    let path = dir.join(name);
    std::fs::write(&path, builder.build()).unwrap();
    path
}

#[derive(Default)]
struct BasketLayout {
    bytes: Vec<u32>,
    entry: Vec<i64>,
    seek: Vec<i64>,
}

#[derive(Default)]
struct Out {
    buf: Vec<u8>,
}

impl Out {
    fn len(&self) -> usize {
        self.buf.len()
    }
    fn bytes(&mut self, b: &[u8]) {
        self.buf.extend_from_slice(b);
    }
    fn u8(&mut self, v: u8) {
        self.buf.push(v);
    }
    fn u16(&mut self, v: u16) {
        self.bytes(&v.to_be_bytes());
    }
    fn i16(&mut self, v: i16) {
        self.bytes(&v.to_be_bytes());
    }
    fn u32(&mut self, v: u32) {
        self.bytes(&v.to_be_bytes());
    }
    fn i32(&mut self, v: i32) {
        self.bytes(&v.to_be_bytes());
    }
    fn i64(&mut self, v: i64) {
        self.bytes(&v.to_be_bytes());
    }
    fn f32(&mut self, v: f32) {
        self.bytes(&v.to_be_bytes());
    }
    fn f64(&mut self, v: f64) {
        self.bytes(&v.to_be_bytes());
    }
    fn string(&mut self, s: &str) {
        assert!(s.len() < 255);
        self.u8(s.len() as u8);
        self.bytes(s.as_bytes());
    }
    fn cstring(&mut self, s: &str) {
        self.bytes(s.as_bytes());
        self.u8(0);
    }
    fn pad_to(&mut self, n: usize) {
        if self.buf.len() < n {
            self.buf.resize(n, 0);
        }
    }
    fn u32_placeholder(&mut self) -> usize {
        let at = self.len();
        self.u32(0);
        at
    }
    fn patch_u32(&mut self, at: usize, v: u32) {
        self.buf[at..at + 4].copy_from_slice(&v.to_be_bytes());
    }
    /// Close a byte-count opened with `u32_placeholder`.
    fn close_count(&mut self, at: usize) {
        let n = self.len() - at - 4;
        self.patch_u32(at, n as u32 | BYTE_COUNT);
    }
    fn versioned(&mut self, version: u16, body: impl FnOnce(&mut Self)) {
        let at = self.u32_placeholder();
        self.u16(version);
        body(self);
        self.close_count(at);
    }
    fn tobject(&mut self) {
        self.u16(1);
        self.u32(0);
        self.u32(0x0300_0000);
    }
    fn tnamed(&mut self, name: &str, title: &str) {
        self.versioned(1, |o| {
            o.tobject();
            o.string(name);
            o.string(title);
        });
    }
}

#[allow(clippy::too_many_arguments)]
fn key_header(
    n_bytes: u32,
    obj_len: u32,
    key_len: u16,
    cycle: u16,
    seek: usize,
    seek_pdir: usize,
    class: &str,
    name: &str,
    title: &str,
) -> Vec<u8> {
    let mut o = Out::default();
    o.u32(n_bytes);
    o.u16(4);
    o.u32(obj_len);
    o.u32(0); // datime
    o.u16(key_len);
    o.u16(cycle);
    o.u32(seek as u32);
    o.u32(seek_pdir as u32);
    o.string(class);
    o.string(name);
    o.string(title);
    o.buf
}

fn write_dir_record(o: &mut Out, seek_keys: usize, nbytes_keys: u32) {
    o.u16(5);
    o.u32(0); // fDatimeC
    o.u32(0); // fDatimeM
    o.u32(nbytes_keys);
    o.u32(0); // fNbytesName
    o.u32(BEGIN as u32); // fSeekDir
    o.u32(0); // fSeekParent
    o.u32(seek_keys as u32);
}

/// Write a key list record; returns `(seek, n_bytes)`.
fn write_key_list(f: &mut Out, dir_name: &str, headers: &[Vec<u8>]) -> (usize, u32) {
    let seek = f.len();
    let body_len = 4 + headers.iter().map(Vec::len).sum::<usize>();
    let key_len = key_header(0, 0, 0, 1, seek, BEGIN, "TFile", dir_name, "").len();
    let n_bytes = (key_len + body_len) as u32;
    let header = key_header(
        n_bytes,
        body_len as u32,
        key_len as u16,
        1,
        seek,
        BEGIN,
        "TFile",
        dir_name,
        "",
    );
    f.bytes(&header);
    f.u32(headers.len() as u32);
    for h in headers {
        f.bytes(h);
    }
    (seek, n_bytes)
}

/// Streams objects into a key payload with ROOT's class-tag bookkeeping.
struct PayloadWriter {
    out: Out,
    key_len: usize,
    classes: HashMap<String, u32>,
}

impl PayloadWriter {
    fn class_tag(&mut self, class: &str) {
        if let Some(&offset) = self.classes.get(class) {
            self.out.u32(CLASS_MASK | offset);
        } else {
            let tag_pos = self.out.len();
            self.out.u32(NEW_CLASS);
            self.out.cstring(class);
            self.classes.insert(class.to_string(), (tag_pos + self.key_len + 2) as u32);
        }
    }

    fn objarray(&mut self, count: usize, mut element: impl FnMut(&mut Self, usize)) {
        let at = self.out.u32_placeholder();
        self.out.u16(3);
        self.out.tobject();
        self.out.string("");
        self.out.i32(count as i32);
        self.out.i32(0);
        for i in 0..count {
            element(self, i);
        }
        self.out.close_count(at);
    }

    /// One byte-counted, class-tagged array element.
    fn element(&mut self, class: &str, body: impl FnOnce(&mut Self)) {
        let at = self.out.u32_placeholder();
        self.class_tag(class);
        body(self);
        self.out.close_count(at);
    }

    fn versioned(&mut self, version: u16, body: impl FnOnce(&mut Self)) {
        let at = self.out.u32_placeholder();
        self.out.u16(version);
        body(self);
        self.out.close_count(at);
    }
}

fn tree_payload(tree: &TreeSpec, layouts: &[BasketLayout], key_len: usize) -> Vec<u8> {
    let mut w = PayloadWriter { out: Out::default(), key_len, classes: HashMap::new() };
    let entries = tree.entries as i64;

    w.versioned(20, |w| {
        w.out.tnamed(&tree.name, "fixture tree");
        w.out.versioned(2, |o| {
            o.i16(602);
            o.i16(1);
            o.i16(1);
        });
        w.out.versioned(2, |o| {
            o.i16(0);
            o.i16(1001);
        });
        w.out.versioned(2, |o| {
            o.i16(1);
            o.i16(1);
            o.f32(1.0);
        });
        w.out.i64(entries); // fEntries
        w.out.i64(0); // fTotBytes
        w.out.i64(0); // fZipBytes
        w.out.i64(0); // fSavedBytes
        w.out.i64(0); // fFlushedBytes
        w.out.f64(1.0); // fWeight
        w.out.i32(0); // fTimerInterval
        w.out.i32(25); // fScanField
        w.out.i32(0); // fUpdate
        w.out.i32(1000); // fDefaultEntryOffsetLen
        w.out.i32(0); // fNClusterRange
        w.out.i64(1_000_000_000_000); // fMaxEntries
        w.out.i64(1_000_000_000_000); // fMaxEntryLoop
        w.out.i64(0); // fMaxVirtualSize
        w.out.i64(-300_000_000); // fAutoSave
        w.out.i64(-30_000_000); // fAutoFlush
        w.out.i64(1_000_000); // fEstimate
        w.out.u8(0); // fClusterRangeEnd
        w.out.u8(0); // fClusterSize
        w.out.versioned(1, |o| o.u8(0)); // fIOFeatures

        w.objarray(tree.branches.len(), |w, i| {
            write_branch(w, &tree.branches[i], &layouts[i], entries);
        });

        // fLeaves, fAliases, ... follow in real files; the reader stops at fBranches
        w.objarray(0, |_, _| {});
    });

    w.out.buf
}

fn write_branch(w: &mut PayloadWriter, branch: &Branch, layout: &BasketLayout, entries: i64) {
    match branch {
        Branch::Element { name } => {
            w.element("TBranchElement", |w| {
                w.versioned(10, |w| {
                    w.versioned(13, |w| {
                        w.out.tnamed(name, "");
                        w.out.bytes(&[0u8; 16]);
                    });
                    w.out.string("SomeClass");
                    w.out.bytes(&[0u8; 8]);
                });
            });
        }
        Branch::Scalar { name, values } => {
            let (class, unsigned, size) = values.leaf();
            tbranch(w, name, layout, entries, class, unsigned, size, 1);
        }
        Branch::FixedArray { name, len } => {
            tbranch(w, name, layout, entries, "TLeafF", false, 4, *len);
        }
    }
}

#[allow(clippy::too_many_arguments)]
fn tbranch(
    w: &mut PayloadWriter,
    name: &str,
    layout: &BasketLayout,
    entries: i64,
    leaf_class: &str,
    unsigned: bool,
    size: usize,
    leaf_len: i32,
) {
    let n_baskets = layout.seek.len();
    // one unused slot, as ROOT over-allocates the basket tables
    let max_baskets = n_baskets + 1;
    let title = format!("{name}/F");

    w.element("TBranch", |w| {
        w.versioned(13, |w| {
            w.out.tnamed(name, &title);
            w.out.versioned(2, |o| {
                o.i16(0);
                o.i16(1001);
            });
            w.out.i32(101); // fCompress
            w.out.i32(32_000); // fBasketSize
            w.out.i32(0); // fEntryOffsetLen
            w.out.i32(n_baskets as i32); // fWriteBasket
            w.out.i64(entries); // fEntryNumber
            w.out.versioned(1, |o| o.u8(0)); // fIOFeatures
            w.out.i32(0); // fOffset
            w.out.i32(max_baskets as i32); // fMaxBaskets
            w.out.i32(99); // fSplitLevel
            w.out.i64(entries); // fEntries
            w.out.i64(0); // fFirstEntry
            w.out.i64(0); // fTotBytes
            w.out.i64(0); // fZipBytes

            w.objarray(0, |_, _| {}); // fBranches
            w.objarray(1, |w, _| {
                w.element(leaf_class, |w| {
                    w.versioned(1, |w| {
                        w.versioned(2, |w| {
                            w.out.tnamed(name, name);
                            w.out.i32(leaf_len); // fLen
                            w.out.i32(size as i32); // fLenType
                            w.out.i32(0); // fOffset
                            w.out.u8(0); // fIsRange
                            w.out.u8(u8::from(unsigned)); // fIsUnsigned
                            w.out.u32(0); // fLeafCount
                        });
                        // fMinimum, fMaximum
                        w.out.bytes(&vec![0u8; 2 * size]);
                    });
                });
            });
            w.objarray(0, |_, _| {}); // fBaskets

            w.out.u8(1);
            for i in 0..max_baskets {
                w.out.i32(layout.bytes.get(i).map_or(0, |&b| b as i32));
            }
            w.out.u8(1);
            for i in 0..max_baskets {
                w.out.i64(layout.entry.get(i).copied().unwrap_or(entries));
            }
            w.out.u8(1);
            for i in 0..max_baskets {
                w.out.i64(layout.seek.get(i).copied().unwrap_or(0));
            }
            w.out.string(""); // fFileName
        });
    });
}
