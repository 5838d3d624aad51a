//! CLI test cases.
//!
//! Tests which actually OCR something need Poppler's `pdftocairo` and
//! `tesseract` on the `PATH`, so they're ignored by default.

use std::process::Command;

use assert_cmd::prelude::*;
use predicates::prelude::*;

/// A two-page PDF reading "Hello" and "World".
static HELLO_PDF: &str = "tests/fixtures/hello.pdf";

/// What we print when called with the wrong arguments.
static USAGE: &str = "Usage: pdf-ocr <pdf_path>\n";

/// Create a new `Command` with our binary.
fn cmd() -> Command {
    Command::cargo_bin("pdf-ocr").unwrap()
}

#[test]
fn test_help() {
    cmd().arg("--help").assert().success();
}

#[test]
fn test_version() {
    cmd().arg("--version").assert().success();
}

#[test]
fn test_no_arguments_prints_usage() {
    cmd()
        .assert()
        .code(1)
        .stdout(USAGE)
        .stderr(predicate::str::contains("OCR_ERROR").not());
}

#[test]
fn test_two_arguments_prints_usage() {
    cmd()
        .arg(HELLO_PDF)
        .arg(HELLO_PDF)
        .assert()
        .code(1)
        .stdout(USAGE);
}

#[test]
fn test_missing_file_reports_ocr_error() {
    cmd()
        .arg("tests/fixtures/does-not-exist.pdf")
        .assert()
        .code(1)
        .stdout(predicate::str::is_empty())
        .stderr(predicate::str::starts_with("OCR_ERROR: "))
        .stderr(predicate::str::contains("does-not-exist.pdf"));
}

#[test]
fn test_non_pdf_reports_ocr_error() {
    cmd()
        .arg("Cargo.toml")
        .assert()
        .code(1)
        .stdout(predicate::str::is_empty())
        .stderr(predicate::str::starts_with("OCR_ERROR: "));
}

#[test]
fn test_error_is_a_single_line() {
    let output = cmd().arg("tests/fixtures").output().unwrap();
    assert_eq!(output.status.code(), Some(1));
    let stderr = String::from_utf8(output.stderr).unwrap();
    assert!(stderr.starts_with("OCR_ERROR: "), "{stderr:?}");
    assert_eq!(stderr.trim_end().lines().count(), 1, "{stderr:?}");
}

#[test]
#[ignore = "Requires poppler-utils and tesseract to be installed"]
fn test_ocr_two_page_pdf() {
    let output = cmd().arg(HELLO_PDF).output().unwrap();
    assert!(output.status.success());
    let stdout = String::from_utf8(output.stdout).unwrap();
    let pages = stdout.trim_end().split("\n\n").collect::<Vec<_>>();
    assert_eq!(pages.len(), 2, "{stdout:?}");
    assert!(pages[0].contains("Hello"), "{stdout:?}");
    assert!(pages[1].contains("World"), "{stdout:?}");
}

#[test]
#[ignore = "Requires poppler-utils and tesseract to be installed"]
fn test_ocr_with_several_jobs() {
    cmd()
        .args(["--jobs", "2"])
        .arg(HELLO_PDF)
        .assert()
        .success()
        .stdout(predicate::str::contains("Hello"))
        .stdout(predicate::str::contains("World"));
}
