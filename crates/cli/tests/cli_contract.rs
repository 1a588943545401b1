use assert_cmd::cargo::cargo_bin_cmd;
use lopdf::{dictionary, Document, Object};
use predicates::prelude::*;
use serde_json::Value;
use std::path::{Path, PathBuf};
use tempfile::TempDir;

fn write_pdf(dir: &Path, name: &str, page_sizes: &[(i64, i64)]) -> PathBuf {
    let mut doc = Document::with_version("1.5");
    let pages_id = doc.new_object_id();

    let kids: Vec<Object> = page_sizes
        .iter()
        .map(|&(width, height)| {
            let page_id = doc.add_object(dictionary! {
                "Type" => "Page",
                "Parent" => pages_id,
                "MediaBox" => vec![
                    Object::Integer(0),
                    Object::Integer(0),
                    Object::Integer(width),
                    Object::Integer(height),
                ],
            });
            Object::Reference(page_id)
        })
        .collect();

    let count = kids.len() as i64;
    doc.objects.insert(
        pages_id,
        Object::Dictionary(dictionary! {
            "Type" => "Pages",
            "Kids" => kids,
            "Count" => count,
        }),
    );
    let catalog_id = doc.add_object(dictionary! {
        "Type" => "Catalog",
        "Pages" => pages_id,
    });
    doc.trailer.set("Root", catalog_id);

    let path = dir.join(name);
    doc.save(&path).expect("fixture PDF should be written");
    path
}

fn fixtures() -> (TempDir, PathBuf) {
    let temp = tempfile::tempdir().expect("temp dir should be created");
    let pdf = write_pdf(temp.path(), "issue.pdf", &[(200, 300), (400, 300), (200, 300)]);
    (temp, pdf)
}

fn json_lines(stdout: &[u8]) -> Vec<Value> {
    String::from_utf8_lossy(stdout)
        .lines()
        .map(|line| serde_json::from_str(line).expect("each line should be json"))
        .collect()
}

fn indices(value: &Value) -> Vec<u64> {
    value.as_array().expect("array").iter().filter_map(Value::as_u64).collect()
}

#[test]
fn info_emits_page_count_and_first_page_size() {
    let (_temp, pdf) = fixtures();

    let output = cargo_bin_cmd!("folio")
        .arg("info")
        .arg(&pdf)
        .assert()
        .success()
        .get_output()
        .stdout
        .clone();

    let value: Value = serde_json::from_slice(&output).expect("stdout should contain valid json");
    assert_eq!(value["page_count"], 3);
    assert_eq!(value["first_page_size_pt"]["width"], 200.0);
    assert_eq!(value["first_page_size_pt"]["height"], 300.0);
}

#[test]
fn render_writes_jpeg_at_requested_scale() {
    let (temp, pdf) = fixtures();
    let output_path = temp.path().join("out").join("page-2.jpg");

    cargo_bin_cmd!("folio")
        .arg("render")
        .arg(&pdf)
        .arg("--page")
        .arg("2")
        .arg("--scale")
        .arg("0.5")
        .arg("--output")
        .arg(&output_path)
        .assert()
        .success()
        .stdout(predicate::str::contains("page-2.jpg"));

    let image = image::open(&output_path).expect("output should be a readable image");
    assert_eq!((image.width(), image.height()), (200, 150));
}

#[test]
fn render_rejects_pages_outside_document() {
    let (_temp, pdf) = fixtures();

    cargo_bin_cmd!("folio")
        .arg("render")
        .arg(&pdf)
        .arg("--page")
        .arg("9")
        .assert()
        .failure()
        .stderr(predicate::str::contains("failed to render page"));

    cargo_bin_cmd!("folio")
        .arg("render")
        .arg(&pdf)
        .arg("--page")
        .arg("0")
        .assert()
        .failure()
        .stderr(predicate::str::contains("1-based"));
}

#[test]
fn info_fails_for_missing_file() {
    let temp = tempfile::tempdir().expect("temp dir should be created");

    cargo_bin_cmd!("folio")
        .arg("info")
        .arg(temp.path().join("missing.pdf"))
        .assert()
        .failure()
        .stderr(predicate::str::contains("file does not exist"));
}

#[test]
fn info_fails_for_invalid_pdf() {
    let temp = tempfile::tempdir().expect("temp dir should be created");
    let path = temp.path().join("invalid.pdf");
    std::fs::write(&path, b"this is not a pdf").expect("fixture should be written");

    cargo_bin_cmd!("folio")
        .arg("info")
        .arg(&path)
        .assert()
        .failure()
        .stderr(predicate::str::contains("failed to open PDF"));
}

#[test]
fn info_fails_for_encrypted_marker_pdf() {
    let temp = tempfile::tempdir().expect("temp dir should be created");
    let path = temp.path().join("encrypted.pdf");
    std::fs::write(&path, b"%PDF-1.5\ntrailer << /Encrypt 5 0 R >>\n%%EOF\n")
        .expect("fixture should be written");

    cargo_bin_cmd!("folio")
        .arg("info")
        .arg(&path)
        .assert()
        .failure()
        .stderr(predicate::str::contains("encrypted PDFs are not supported"));
}

#[test]
fn simulate_keeps_resident_pages_inside_window() {
    let output = cargo_bin_cmd!("folio")
        .args(["simulate", "--pages", "20", "--capacity", "10", "--look-ahead", "3"])
        .args(["--navigate", "15"])
        .assert()
        .success()
        .get_output()
        .stdout
        .clone();

    let lines = json_lines(&output);
    assert_eq!(lines.len(), 3);

    assert_eq!(indices(&lines[0]["resident"]), (1..=10).collect::<Vec<_>>());

    let settled = &lines[1];
    assert_eq!(settled["cursor"], 15);
    let resident = indices(&settled["resident"]);
    assert!((13..=18).all(|index| resident.contains(&index)));
    assert!(resident.iter().all(|index| (11..=20).contains(index)));

    assert_eq!(lines[2]["capacity"], 10);
    assert!(lines[2]["cache"]["evictions"].as_u64().expect("evictions") >= 1);
    let hit_rate = lines[2]["hit_rate"].as_f64().expect("hit rate");
    assert!((0.0..=1.0).contains(&hit_rate));
}

#[test]
fn simulate_reports_failed_pages() {
    let output = cargo_bin_cmd!("folio")
        .args(["simulate", "--pages", "12", "--fail", "2,3", "--navigate", "5"])
        .assert()
        .success()
        .get_output()
        .stdout
        .clone();

    let lines = json_lines(&output);
    assert_eq!(indices(&lines[0]["failed"]), vec![2, 3]);
}

#[test]
fn simulate_rejects_capacity_below_window() {
    cargo_bin_cmd!("folio")
        .args(["simulate", "--capacity", "3", "--navigate", "2"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("cannot hold"));
}

#[test]
fn config_prints_effective_settings() {
    let temp = tempfile::tempdir().expect("temp dir should be created");
    let path = temp.path().join("viewer.toml");
    std::fs::write(&path, "capacity = 12\n").expect("config should be written");

    cargo_bin_cmd!("folio")
        .arg("config")
        .arg("--config")
        .arg(&path)
        .env("FOLIO_LOOK_AHEAD", "4")
        .assert()
        .success()
        .stdout(predicate::str::contains("capacity = 12"))
        .stdout(predicate::str::contains("look_ahead = 4"));
}
