mod common;

use std::fs;

use assert_cmd::cargo::cargo_bin_cmd;
use facecloak_utils::checkerboard;
use serde_json::Value;
use tempfile::tempdir;

use common::{assert_failure_mentions, face_record, write_checkerboard, write_faces_file};

#[test]
fn select_replays_events_without_a_model() {
    let work_dir = tempdir().expect("tempdir");
    let image = write_checkerboard(work_dir.path(), "group.png");
    let faces = write_faces_file(
        work_dir.path(),
        &image,
        (64, 48),
        vec![face_record(0, (0, 0, 40, 40)), face_record(1, (10, 10, 20, 20))],
    );

    let mut cmd = cargo_bin_cmd!("facecloak");
    let output = cmd
        .current_dir(work_dir.path())
        .args(["select", "--faces"])
        .arg(&faces)
        .args(["--event", "none", "--event", "pen@15,15"])
        .output()
        .expect("run select");
    assert_cli_success!(output, "select should succeed");

    let report: Value = serde_json::from_slice(&output.stdout).expect("selection JSON");
    assert_eq!(report["selected"], serde_json::json!([0]));
    assert_eq!(report["state"]["0"], Value::Bool(true));
    assert_eq!(report["state"]["1"], Value::Bool(false));
}

#[test]
fn select_rejects_unknown_face_ids() {
    let work_dir = tempdir().expect("tempdir");
    let image = write_checkerboard(work_dir.path(), "group.png");
    let faces = write_faces_file(
        work_dir.path(),
        &image,
        (64, 48),
        vec![face_record(0, (0, 0, 40, 40))],
    );

    let mut cmd = cargo_bin_cmd!("facecloak");
    let output = cmd
        .current_dir(work_dir.path())
        .args(["select", "--faces"])
        .arg(&faces)
        .args(["--event", "pen:9"])
        .output()
        .expect("run CLI");
    assert_failure_mentions(&output, "unknown face id 9");
}

#[test]
fn mask_blurs_only_selected_faces() {
    let work_dir = tempdir().expect("tempdir");
    let image = write_checkerboard(work_dir.path(), "group.png");
    let faces = write_faces_file(
        work_dir.path(),
        &image,
        (64, 48),
        vec![
            face_record(0, (40, 20, 60, 44)),
            face_record(1, (4, 4, 24, 24)),
        ],
    );
    let out_path = work_dir.path().join("masked.png");

    let mut cmd = cargo_bin_cmd!("facecloak");
    let output = cmd
        .current_dir(work_dir.path())
        .args(["mask", "--input"])
        .arg(&image)
        .arg("--faces")
        .arg(&faces)
        .args(["--selected", "1", "--mode", "blur", "--output"])
        .arg(&out_path)
        .output()
        .expect("run mask");
    assert_cli_success!(output, "mask should succeed");

    let summary: Value = serde_json::from_slice(&output.stdout).expect("summary JSON");
    assert_eq!(summary["masked"], serde_json::json!([1]));
    assert_eq!(summary["faces"], Value::from(2));

    let original = checkerboard(64, 48, 4);
    let masked = image::open(&out_path).expect("open output").to_rgb8();
    assert_eq!(masked.dimensions(), (64, 48));

    let inside_selected = |x: u32, y: u32| (4..24).contains(&x) && (4..24).contains(&y);
    let mut changed = 0;
    for (x, y, pixel) in masked.enumerate_pixels() {
        if inside_selected(x, y) {
            if pixel != original.get_pixel(x, y) {
                changed += 1;
            }
        } else {
            assert_eq!(pixel, original.get_pixel(x, y), "pixel ({x}, {y}) changed");
        }
    }
    assert!(changed > 0, "selected face should be blurred");
}

#[test]
fn mask_output_extension_picks_encoder() {
    let work_dir = tempdir().expect("tempdir");
    let image = write_checkerboard(work_dir.path(), "group.png");
    let faces = write_faces_file(
        work_dir.path(),
        &image,
        (64, 48),
        vec![face_record(0, (8, 8, 32, 32))],
    );
    let out_path = work_dir.path().join("masked.jpg");

    let mut cmd = cargo_bin_cmd!("facecloak");
    cmd.current_dir(work_dir.path())
        .args(["mask", "--mode", "blur", "--input"])
        .arg(&image)
        .arg("--faces")
        .arg(&faces)
        .arg("--output")
        .arg(&out_path)
        .assert()
        .success();

    let bytes = fs::read(&out_path).expect("read output");
    assert_eq!(&bytes[..2], &[0xFF, 0xD8], "expected a JPEG stream");
}

#[test]
fn mask_rejects_records_from_another_image() {
    let work_dir = tempdir().expect("tempdir");
    let image = write_checkerboard(work_dir.path(), "group.png");
    let faces = write_faces_file(
        work_dir.path(),
        &image,
        (64, 48),
        vec![face_record(0, (50, 30, 80, 60))],
    );

    let mut cmd = cargo_bin_cmd!("facecloak");
    let output = cmd
        .current_dir(work_dir.path())
        .args(["mask", "--mode", "blur", "--input"])
        .arg(&image)
        .arg("--faces")
        .arg(&faces)
        .arg("--output")
        .arg(work_dir.path().join("masked.png"))
        .output()
        .expect("run CLI");
    assert_failure_mentions(&output, "stale session");
    assert!(!work_dir.path().join("masked.png").exists());
}

#[test]
fn detect_fails_when_model_is_missing() {
    let work_dir = tempdir().expect("tempdir");
    let image = write_checkerboard(work_dir.path(), "group.png");

    let mut cmd = cargo_bin_cmd!("facecloak");
    let output = cmd
        .current_dir(work_dir.path())
        .args(["detect", "--model", "missing.onnx", "--input"])
        .arg(&image)
        .output()
        .expect("run CLI");
    assert_failure_mentions(&output, "model unavailable");
}

#[test]
fn batch_fails_when_model_is_missing() {
    let work_dir = tempdir().expect("tempdir");
    write_checkerboard(work_dir.path(), "a.png");
    write_checkerboard(work_dir.path(), "b.png");

    let mut cmd = cargo_bin_cmd!("facecloak");
    let output = cmd
        .current_dir(work_dir.path())
        .args(["batch", "--model", "missing.onnx", "--input"])
        .arg(work_dir.path())
        .output()
        .expect("run CLI");
    assert_failure_mentions(&output, "model unavailable");
}

#[test]
fn detect_writes_one_entry_per_image() {
    let model = require_model!();
    let work_dir = tempdir().expect("tempdir");
    let image = write_checkerboard(work_dir.path(), "pattern.png");
    let json_path = work_dir.path().join("faces.json");

    let mut cmd = cargo_bin_cmd!("facecloak");
    cmd.current_dir(work_dir.path())
        .arg("detect")
        .arg("--model")
        .arg(&model)
        .arg("--input")
        .arg(&image)
        .arg("--json")
        .arg(&json_path)
        .assert()
        .success();

    let payload: Value =
        serde_json::from_str(&fs::read_to_string(&json_path).expect("read JSON")).expect("JSON");
    let entries = payload.as_array().expect("array of images");
    assert_eq!(entries.len(), 1);
    assert_eq!(entries[0]["width"], Value::from(64));
    assert_eq!(entries[0]["height"], Value::from(48));
    assert!(entries[0]["faces"].is_array());
}
