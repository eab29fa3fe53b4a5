use std::fs;

use assert_cmd::Command;
use predicates::prelude::*;

fn treearc() -> Command {
    Command::cargo_bin("treearc").unwrap()
}

fn source_tree() -> tempfile::TempDir {
    let src = tempfile::tempdir().unwrap();
    fs::write(src.path().join("a.txt"), "hello").unwrap();
    fs::create_dir(src.path().join("sub")).unwrap();
    fs::write(src.path().join("sub/b.txt"), "world!").unwrap();
    fs::write(src.path().join("skip.tmp"), "junk").unwrap();
    src
}

#[test]
fn zip_list_unzip() {
    let src = source_tree();
    let work = tempfile::tempdir().unwrap();
    let archive = work.path().join("out.zip");
    let dest = work.path().join("out");

    treearc()
        .arg("zip")
        .args(["-l", "9", "-x", "*.tmp"])
        .arg(src.path())
        .arg(&archive)
        .assert()
        .success()
        .stdout(predicate::str::contains("2 files"));

    treearc()
        .arg("list")
        .arg(&archive)
        .assert()
        .success()
        .stdout(predicate::str::contains("a.txt").and(predicate::str::contains("sub/b.txt")))
        .stdout(predicate::str::contains("skip.tmp").not());

    treearc()
        .arg("unzip")
        .arg(&archive)
        .arg(&dest)
        .assert()
        .success();
    assert_eq!(fs::read_to_string(dest.join("sub/b.txt")).unwrap(), "world!");
}

#[test]
fn tarball_inferred_from_extension() {
    let src = source_tree();
    let work = tempfile::tempdir().unwrap();
    let archive = work.path().join("out.tar.gz");
    let dest = work.path().join("out");

    treearc()
        .arg("create")
        .arg(src.path())
        .arg(&archive)
        .assert()
        .success();
    assert_eq!(&fs::read(&archive).unwrap()[..2], &[0x1f, 0x8b]);

    treearc()
        .args(["list", "-v"])
        .arg(&archive)
        .assert()
        .success()
        .stdout(predicate::str::contains("skip.tmp"));

    treearc()
        .arg("extract")
        .arg(&archive)
        .arg(&dest)
        .assert()
        .success()
        .stdout(predicate::str::contains("3 files extracted"));
    assert_eq!(fs::read_to_string(dest.join("a.txt")).unwrap(), "hello");
}

#[test]
fn corrupt_zip_fails() {
    let work = tempfile::tempdir().unwrap();
    let archive = work.path().join("bad.zip");
    fs::write(&archive, "definitely not a zip file at all").unwrap();

    treearc()
        .arg("unzip")
        .arg(&archive)
        .arg(work.path().join("out"))
        .assert()
        .failure()
        .stderr(predicate::str::contains("End of Central Directory"));
}
