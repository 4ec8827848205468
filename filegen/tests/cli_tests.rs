use assert_cmd::Command;
use predicates::prelude::PredicateBooleanExt;

#[test]
fn test_help_runs() {
    Command::cargo_bin("filegen")
        .unwrap()
        .arg("--help")
        .assert()
        .success()
        .stdout(predicates::str::contains("Generation options"));
}

#[test]
fn test_generates_exact_sizes() {
    let dir = tempfile::tempdir().unwrap();
    let root = dir.path().join("files");
    Command::cargo_bin("filegen")
        .unwrap()
        .args([root.to_str().unwrap(), "3", "10M"])
        .assert()
        .success()
        .stdout(
            predicates::str::contains("test_file_3").and(predicates::str::contains("30.00 MiB")),
        );
    for idx in 1..=3 {
        let metadata = std::fs::metadata(root.join(format!("test_file_{idx}"))).unwrap();
        assert_eq!(metadata.len(), 10_485_760);
    }
    assert_eq!(
        std::fs::read(root.join("test_file_1")).unwrap(),
        std::fs::read(root.join("test_file_3")).unwrap()
    );
}

#[test]
fn test_json_output() {
    let dir = tempfile::tempdir().unwrap();
    let output = Command::cargo_bin("filegen")
        .unwrap()
        .args([dir.path().to_str().unwrap(), "2", "64K", "--json", "--chunk-size", "4K"])
        .output()
        .unwrap();
    assert!(output.status.success());
    let json: serde_json::Value = serde_json::from_slice(&output.stdout).unwrap();
    assert_eq!(json["files_succeeded"], 2);
    assert_eq!(json["total_bytes"], 2 * 64 * 1024);
    assert_eq!(json["files"][0]["strategy"], "generate");
}

#[test]
fn test_seed_changes_content() {
    let dir = tempfile::tempdir().unwrap();
    let first = dir.path().join("first");
    let second = dir.path().join("second");
    for (root, seed) in [(&first, "1"), (&second, "2")] {
        Command::cargo_bin("filegen")
            .unwrap()
            .args([root.to_str().unwrap(), "1", "4K", "--seed", seed])
            .assert()
            .success();
    }
    assert_ne!(
        std::fs::read(first.join("test_file_1")).unwrap(),
        std::fs::read(second.join("test_file_1")).unwrap()
    );
}

#[test]
fn test_invalid_size_rejected() {
    let dir = tempfile::tempdir().unwrap();
    Command::cargo_bin("filegen")
        .unwrap()
        .args([dir.path().to_str().unwrap(), "1", "lots"])
        .assert()
        .failure()
        .stderr(predicates::str::contains("invalid size"));
}

#[test]
fn test_zero_files_rejected() {
    let dir = tempfile::tempdir().unwrap();
    Command::cargo_bin("filegen")
        .unwrap()
        .args([dir.path().to_str().unwrap(), "0", "1K"])
        .assert()
        .failure()
        .code(1)
        .stderr(predicates::str::contains("number of files"));
}
