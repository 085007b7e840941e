//! FileCheck-style tests for text IR files
//!
//! Each file under `tests/filecheck` names its compile options on a
//! `; RUN:` line and is matched against its CHECK directives.

use std::fs;
use std::path::Path;

use vec4c::test_ir::{TestRunner, TestSpec};

/// Run one file through the compiler and validate its CHECK directives.
fn run_filecheck_test(file: &str) {
    let _ = env_logger::builder().is_test(true).try_init();
    let path = Path::new(env!("CARGO_MANIFEST_DIR")).join("tests/filecheck").join(file);
    let contents = fs::read_to_string(&path).unwrap_or_else(|e| panic!("Failed to read {}: {}", path.display(), e));

    let spec = TestSpec::parse(&contents).unwrap_or_else(|e| panic!("Failed to parse test spec from {file}: {e}"));

    let runner = TestRunner::new(false);
    runner.run_test(&spec).unwrap_or_else(|e| panic!("Test {file} failed: {e}"));
}

#[test]
fn cmod_fusion_filecheck() {
    run_filecheck_test("cmod_fusion.vir");
}

#[test]
fn dead_flag_filecheck() {
    run_filecheck_test("dead_flag.vir");
}

#[test]
fn redundant_filecheck() {
    run_filecheck_test("redundant.vir");
}

#[test]
fn loop_filecheck() {
    run_filecheck_test("loop.vir");
}

#[test]
fn spill_filecheck() {
    run_filecheck_test("spill.vir");
}

#[test]
fn out_of_registers_filecheck() {
    run_filecheck_test("out_of_registers.vir");
}

#[test]
fn pull_constants_filecheck() {
    run_filecheck_test("pull_constants.vir");
}

/// Every file in the directory has a test above.
#[test]
fn all_files_are_listed() {
    let dir = Path::new(env!("CARGO_MANIFEST_DIR")).join("tests/filecheck");
    let mut files: Vec<String> = fs::read_dir(&dir)
        .unwrap()
        .map(|entry| entry.unwrap().file_name().to_string_lossy().into_owned())
        .filter(|name| name.ends_with(".vir"))
        .collect();
    files.sort();
    assert_eq!(
        files,
        [
            "cmod_fusion.vir",
            "dead_flag.vir",
            "loop.vir",
            "out_of_registers.vir",
            "pull_constants.vir",
            "redundant.vir",
            "spill.vir",
        ]
    );
}
