use std::path::{Path, PathBuf};
use std::process::Command;

use tempfile::TempDir;

fn write(dir: &TempDir, name: &str, contents: &str) -> PathBuf {
    let path = dir.path().join(name);
    std::fs::write(&path, contents).unwrap();
    path
}

fn weaver(args: &[&str]) -> (String, String, bool) {
    let output = Command::new(env!("CARGO_BIN_EXE_weaver"))
        .args(args)
        .env_remove("RUST_LOG")
        .output()
        .expect("failed to execute weaver");

    let stdout = String::from_utf8_lossy(&output.stdout).to_string();
    let stderr = String::from_utf8_lossy(&output.stderr).to_string();
    (stdout, stderr, output.status.success())
}

fn path_str(path: &Path) -> &str {
    path.to_str().unwrap()
}

const HELLO: &str = r#"[
    {"ImmediateInt": 104}, {"Syscall": 7},
    {"ImmediateInt": 105}, {"Syscall": 7},
    {"ImmediateInt": 10}, {"Syscall": 7}
]"#;

#[test]
fn test_run_prints_emitted_characters() {
    let dir = TempDir::new().unwrap();
    let file = write(&dir, "hello.json", HELLO);
    let (stdout, stderr, success) = weaver(&["run", path_str(&file)]);
    assert!(success, "run should succeed, stderr:\n{}", stderr);
    assert_eq!(stdout, "hi\n");
}

#[test]
fn test_run_prints_final_stack() {
    let dir = TempDir::new().unwrap();
    let file = write(
        &dir,
        "add.json",
        r#"[{"ImmediateInt": 40}, {"ImmediateInt": 2}, "AddI", {"ImmediateDouble": 1.5}]"#,
    );
    let (stdout, _, success) = weaver(&["run", path_str(&file), "--stack"]);
    assert!(success);
    assert_eq!(stdout, "stack: [42, 1.5]\n");
}

#[test]
fn test_run_fault_exits_with_failure() {
    let dir = TempDir::new().unwrap();
    let file = write(
        &dir,
        "div.json",
        r#"[{"ImmediateInt": 1}, {"ImmediateInt": 0}, "DivI"]"#,
    );
    let (_, stderr, success) = weaver(&["run", path_str(&file)]);
    assert!(!success);
    assert!(
        stderr.contains("error: fault at instruction 2: division by zero"),
        "stderr:\n{}",
        stderr
    );
}

#[test]
fn test_strict_syscalls_flag() {
    let dir = TempDir::new().unwrap();
    let file = write(&dir, "unknown.json", r#"[{"Syscall": 42}]"#);

    let (_, _, success) = weaver(&["run", path_str(&file)]);
    assert!(success, "unknown syscalls are ignored by default");

    let (_, stderr, success) = weaver(&["run", path_str(&file), "--strict-syscalls"]);
    assert!(!success);
    assert!(stderr.contains("unknown syscall code 42"), "stderr:\n{}", stderr);
}

#[test]
fn test_budget_stops_infinite_loop() {
    let dir = TempDir::new().unwrap();
    let file = write(&dir, "spin.json", r#"[{"Jmp": 0}]"#);
    let (_, stderr, success) = weaver(&["run", path_str(&file), "--budget", "1000"]);
    assert!(!success);
    assert!(stderr.contains("budget of 1000 exhausted"), "stderr:\n{}", stderr);
}

#[test]
fn test_config_file_sets_world() {
    let dir = TempDir::new().unwrap();
    let config = write(
        &dir,
        "weaver.toml",
        r#"
[runtime]
gc_interval = 8

[world]
mana = 33
"#,
    );
    let file = write(&dir, "mana.json", r#"[{"Syscall": 1}]"#);
    let (stdout, stderr, success) = weaver(&[
        "run",
        path_str(&file),
        "--config",
        path_str(&config),
        "--stack",
    ]);
    assert!(success, "stderr:\n{}", stderr);
    assert_eq!(stdout, "stack: [33]\n");
}

#[test]
fn test_bad_config_is_reported() {
    let dir = TempDir::new().unwrap();
    let config = write(&dir, "bad.toml", "[runtime]\nno_such_key = 1\n");
    let file = write(&dir, "empty.json", "[]");
    let (_, stderr, success) = weaver(&["run", path_str(&file), "--config", path_str(&config)]);
    assert!(!success);
    assert!(stderr.starts_with("error:"), "stderr:\n{}", stderr);
}

#[test]
fn test_assemble_then_run_bytecode() {
    let dir = TempDir::new().unwrap();
    let json = write(&dir, "hello.json", HELLO);
    let out = dir.path().join("hello.wvbc");

    let (stdout, _, success) = weaver(&["assemble", path_str(&json), path_str(&out)]);
    assert!(success);
    assert!(stdout.contains("wrote 6 instructions"));
    assert!(std::fs::read(&out).unwrap().starts_with(b"WVBC"));

    let (stdout, _, success) = weaver(&["run", path_str(&out)]);
    assert!(success);
    assert_eq!(stdout, "hi\n");
}

#[test]
fn test_disasm_listing() {
    let dir = TempDir::new().unwrap();
    let file = write(
        &dir,
        "prog.json",
        r#"[{"ImmediateInt": 3}, {"AllocA": "Double"}, "LenA", {"Jmp": 0}]"#,
    );
    let (stdout, _, success) = weaver(&["disasm", path_str(&file)]);
    assert!(success);
    let lines: Vec<&str> = stdout.lines().collect();
    assert_eq!(
        lines,
        [
            "0000  ImmediateInt 3",
            "0001  AllocA double",
            "0002  LenA",
            "0003  Jmp 0"
        ]
    );
}

#[test]
fn test_check_reports_bad_branch() {
    let dir = TempDir::new().unwrap();
    let good = write(&dir, "good.json", HELLO);
    let (stdout, _, success) = weaver(&["check", path_str(&good)]);
    assert!(success);
    assert_eq!(stdout, "No problems found.\n");

    let bad = write(&dir, "bad.json", r#"[{"ImmediateInt": 0}, {"Brz": 9}]"#);
    let (stdout, _, success) = weaver(&["check", path_str(&bad)]);
    assert!(!success);
    assert!(stdout.starts_with("error: 0001: Brz target 9"), "stdout:\n{}", stdout);
}

#[test]
fn test_invalid_input_file() {
    let dir = TempDir::new().unwrap();
    let file = write(&dir, "junk.json", "not a program");
    let (_, stderr, success) = weaver(&["run", path_str(&file)]);
    assert!(!success);
    assert!(stderr.contains("invalid program"), "stderr:\n{}", stderr);

    let (_, stderr, success) = weaver(&["run", "/nonexistent/spell.json"]);
    assert!(!success);
    assert!(stderr.contains("failed to read"), "stderr:\n{}", stderr);
}
