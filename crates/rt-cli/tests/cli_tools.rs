#[path = "../../rt-root/tests/common/mod.rs"]
mod root_fixture;

use std::path::{Path, PathBuf};
use std::process::{Command, Output};
use std::time::{SystemTime, UNIX_EPOCH};

use root_fixture::{Branch, FileBuilder, TreeSpec, Values};

fn bin_path() -> PathBuf {
    PathBuf::from(env!("CARGO_BIN_EXE_root-tools"))
}

fn tmp_dir(name: &str) -> PathBuf {
    let nanos = SystemTime::now().duration_since(UNIX_EPOCH).unwrap().as_nanos();
    let p = std::env::temp_dir().join(format!("root-tools-{}-{}-{}", name, std::process::id(), nanos));
    std::fs::create_dir_all(&p).unwrap();
    p
}

fn run(args: &[&str]) -> Output {
    Command::new(bin_path())
        .args(args)
        .output()
        .unwrap_or_else(|e| panic!("failed to run {:?}: {}", bin_path(), e))
}

fn s(p: &Path) -> &str {
    p.to_str().unwrap()
}

fn stdout_json(out: &Output) -> serde_json::Value {
    serde_json::from_slice(&out.stdout)
        .unwrap_or_else(|e| panic!("stdout is not JSON ({e}): {}", String::from_utf8_lossy(&out.stdout)))
}

fn sample(n: usize) -> FileBuilder {
    FileBuilder::new().tree(TreeSpec::new(
        "bdttree",
        vec![
            Branch::scalar("Run", Values::U32(vec![1; n])),
            Branch::scalar("LumiSec", Values::U32(vec![7; n])),
            Branch::scalar("Event", Values::U64((0..n as u64).collect())),
            Branch::scalar("Met", Values::F32((0..n).map(|i| 10.0 * i as f32).collect())),
            Branch::scalar("nVert", Values::F64((0..n).map(|i| (i % 30) as f64).collect())),
        ],
    ))
}

#[test]
fn skim_writes_parquet_and_reports() {
    let input = tmp_dir("skim_in");
    let output = tmp_dir("skim_out");
    root_fixture::write_file(&input, "A.root", &sample(20));
    root_fixture::write_file(&input, "B.root", &sample(4));
    let yaml = input.join("skim.yaml");
    std::fs::write(
        &yaml,
        "seed: 1\ninput_ttree: bdttree\noutput_ttree: bdttree\nfilter: 5\nbranches:\n  Met: {rename: MET}\n",
    )
    .unwrap();

    let out = run(&["skim", "-i", s(&input), "-o", s(&output), "-y", s(&yaml)]);
    // B has fewer events than the filter
    assert!(!out.status.success());
    let report = stdout_json(&out);
    assert_eq!(report["processed"].as_array().unwrap().len(), 1);
    assert_eq!(report["failed"].as_array().unwrap().len(), 1);
    assert!(String::from_utf8_lossy(&out.stderr).contains("1 of 2 file(s) failed"));

    let table = rt_ntuple::read_table(&output.join("A.parquet"), "bdttree", None).unwrap();
    assert_eq!(table.column_names(), vec!["MET"]);
    assert_eq!(table.n_rows(), 5);

    std::fs::remove_dir_all(&input).ok();
    std::fs::remove_dir_all(&output).ok();
}

#[test]
fn select_and_split_chain_through_parquet() {
    let input = tmp_dir("chain_in");
    let selected = tmp_dir("chain_sel");
    let split = tmp_dir("chain_split");
    root_fixture::write_file(&input, "Sig.root", &sample(40));
    let json = input.join("cuts.json");
    std::fs::write(&json, r#"{"cuts": [{"name": "HighMet", "expression": "Met >= 100"}]}"#).unwrap();

    let out = run(&["select", "-i", s(&input), "-o", s(&selected), "-j", s(&json)]);
    assert!(out.status.success(), "select failed: stderr={}", String::from_utf8_lossy(&out.stderr));
    let cut_dir = selected.join("HighMet");
    assert!(cut_dir.join("Sig.parquet").exists());

    let out = run(&[
        "split",
        "-i",
        s(&cut_dir),
        "-o",
        s(&split),
        "--train-factor",
        "3",
        "--test-factor",
        "1",
        "-s",
        "5",
        "--threads",
        "2",
    ]);
    assert!(out.status.success(), "split failed: stderr={}", String::from_utf8_lossy(&out.stderr));

    let train = rt_ntuple::read_table(&split.join("Train/Sig.parquet"), "bdttree", None).unwrap();
    let test = rt_ntuple::read_table(&split.join("Test/Sig.parquet"), "bdttree", None).unwrap();
    // 30 events pass Met >= 100
    assert_eq!(train.n_rows(), 22);
    assert_eq!(test.n_rows(), 8);
    assert!(train.has_column("splitFactor"));

    for d in [input, selected, split] {
        std::fs::remove_dir_all(d).ok();
    }
}

#[test]
fn diff_writes_report_file_once() {
    let left = tmp_dir("diff_left");
    let right = tmp_dir("diff_right");
    let scratch = tmp_dir("diff_out");
    root_fixture::write_file(&left, "A.root", &sample(10));
    root_fixture::write_file(&right, "A.root", &sample(10));
    root_fixture::write_file(&left, "B.root", &sample(10));
    root_fixture::write_file(&right, "B.root", &sample(8));
    let report = scratch.join("report.txt");

    let out = run(&["diff", "-l", s(&left), "-r", s(&right), "-o", s(&report), "-m"]);
    assert!(out.status.success(), "diff failed: stderr={}", String::from_utf8_lossy(&out.stderr));
    let text = std::fs::read_to_string(&report).unwrap();
    assert_eq!(
        text,
        "A.root: Matches on both sides\nB.root: More events found on the left file, maybe right file is filtered? (10 vs 8)\n"
    );

    let out = run(&["diff", "-l", s(&left), "-r", s(&right), "-o", s(&report)]);
    assert!(!out.status.success());
    assert!(String::from_utf8_lossy(&out.stderr).contains("already exists"));

    let out = run(&["diff", "-l", s(&left), "-r", s(&right)]);
    assert!(out.status.success());
    assert_eq!(
        String::from_utf8_lossy(&out.stdout),
        "B.root: More events found on the left file, maybe right file is filtered? (10 vs 8)\n"
    );

    for d in [left, right, scratch] {
        std::fs::remove_dir_all(d).ok();
    }
}

#[test]
fn inspect_lists_keys_and_branches() {
    let dir = tmp_dir("inspect");
    let builder = sample(3)
        .tree(TreeSpec::new(
            "other",
            vec![
                Branch::scalar("x", Values::I16(vec![1, 2])),
                Branch::FixedArray { name: "arr".into(), len: 3 },
            ],
        ))
        .other_key("TH1F", "h");
    let path = root_fixture::write_file(&dir, "f.root", &builder);

    let out = run(&["inspect", "-i", s(&path), "-t", "other"]);
    assert!(out.status.success(), "inspect failed: stderr={}", String::from_utf8_lossy(&out.stderr));
    let v = stdout_json(&out);
    let keys: Vec<&str> = v["keys"].as_array().unwrap().iter().map(|k| k["name"].as_str().unwrap()).collect();
    assert!(keys.contains(&"bdttree") && keys.contains(&"other") && keys.contains(&"h"));
    assert_eq!(v["tree"]["entries"], 2);
    let branches = v["tree"]["branches"].as_array().unwrap();
    assert_eq!(branches[0]["name"], "x");
    assert_eq!(branches[0]["scalar"], true);
    assert_eq!(branches[1]["name"], "arr");
    assert_eq!(branches[1]["scalar"], false);

    let out = run(&["inspect", "-i", s(&path), "-t", "missing"]);
    assert!(out.status.success());
    assert!(stdout_json(&out)["tree"].is_null());

    std::fs::remove_dir_all(&dir).ok();
}

#[test]
fn bad_paths_are_rejected() {
    let dir = tmp_dir("paths");
    let file = dir.join("x.yaml");
    std::fs::write(&file, "x: 1\n").unwrap();

    let out = run(&["skim", "-i", s(&dir.join("nope")), "-o", s(&dir), "-y", s(&file)]);
    assert!(!out.status.success());
    assert!(String::from_utf8_lossy(&out.stderr).contains("does not exist"));

    let out = run(&["skim", "-i", s(&dir), "-o", s(&file), "-y", s(&file)]);
    assert!(!out.status.success());
    assert!(String::from_utf8_lossy(&out.stderr).contains("not a directory"));

    let out = run(&["select", "-i", s(&dir), "-o", s(&dir), "-j", s(&dir)]);
    assert!(!out.status.success());
    assert!(String::from_utf8_lossy(&out.stderr).contains("not a file"));

    let out = run(&["split", "-i", s(&dir), "-o", s(&dir), "--train-factor", "0"]);
    assert!(!out.status.success());

    std::fs::remove_dir_all(&dir).ok();
}
