use std::fs;
use std::path::Path;
use std::process::{Command, Output};

use tempfile::TempDir;

const GOLDEN_CENTRE: [f64; 3] = [
    0.489_056_907_758_424_53,
    0.160_869_281_022_103_13,
    0.012_870_641_978_016_788,
];

fn emberwall(config_dir: &Path, args: &[&str]) -> Output {
    Command::new(env!("CARGO_BIN_EXE_emberwall"))
        .env("EMBERWALL_CONFIG_DIR", config_dir)
        .env_remove("EMBERWALL_CONFIG")
        .env("RUST_LOG", "warn")
        .args(args)
        .output()
        .expect("failed to run emberwall")
}

#[test]
fn sample_prints_golden_centre_colour() {
    let root = TempDir::new().unwrap();
    let output = emberwall(
        root.path(),
        &["sample", "--size", "800x600", "--pixel", "400,300", "--json"],
    );
    assert!(output.status.success(), "{output:?}");

    let report: serde_json::Value = serde_json::from_slice(&output.stdout).unwrap();
    let color = &report["color"];
    for (channel, expected) in ["r", "g", "b"].into_iter().zip(GOLDEN_CENTRE) {
        let actual = color[channel].as_f64().unwrap();
        assert!(
            (actual - expected).abs() < 1e-9,
            "{channel}: {actual} != {expected}"
        );
    }
    assert_eq!(report["size"], serde_json::json!([800, 600]));
}

#[test]
fn sample_text_output_is_stable() {
    let root = TempDir::new().unwrap();
    let first = emberwall(root.path(), &["sample"]);
    let second = emberwall(root.path(), &["sample"]);
    assert!(first.status.success());
    let text = String::from_utf8(first.stdout).unwrap();
    assert!(text.starts_with("rgb(0.489057, 0.160869, 0.012871)"), "{text}");
    assert_eq!(text.as_bytes(), second.stdout.as_slice());
}

#[test]
fn default_export_uses_cpu_reference() {
    let root = TempDir::new().unwrap();
    let target = root.path().join("shots").join("ember.png");
    let output = emberwall(
        root.path(),
        &[
            "export",
            target.to_str().unwrap(),
            "--size",
            "48x27",
            "--time",
            "1.5",
        ],
    );
    assert!(output.status.success(), "{output:?}");

    let bytes = fs::read(&target).unwrap();
    assert_eq!(&bytes[..8], b"\x89PNG\r\n\x1a\n");
    let stdout = String::from_utf8(output.stdout).unwrap();
    assert!(stdout.contains("48x27"), "{stdout}");
    assert!(stdout.contains("(cpu)"), "{stdout}");
}

#[test]
fn unknown_export_backend_is_rejected() {
    let root = TempDir::new().unwrap();
    let target = root.path().join("never.png");
    let output = emberwall(
        root.path(),
        &["export", target.to_str().unwrap(), "--backend", "metal"],
    );
    assert!(!output.status.success());
    assert!(!target.exists());
    let stderr = String::from_utf8(output.stderr).unwrap();
    assert!(stderr.contains("cpu, gpu, or auto"), "{stderr}");
}

#[test]
fn oversized_export_fails_without_writing() {
    let root = TempDir::new().unwrap();
    let target = root.path().join("huge.png");
    let output = emberwall(
        root.path(),
        &["export", target.to_str().unwrap(), "--size", "70000x70000"],
    );
    assert!(!output.status.success());
    assert!(!target.exists());
    let stderr = String::from_utf8(output.stderr).unwrap();
    assert!(stderr.contains("exceeds"), "{stderr}");
}

#[test]
fn config_check_accepts_valid_and_rejects_invalid_files() {
    let root = TempDir::new().unwrap();
    let valid = root.path().join("valid.toml");
    fs::write(
        &valid,
        "version = 1\n\n[palette]\nstart = \"#102030\"\nend = [1.0, 0.5, 0.0]\n\n[animation]\nfps = 30\n",
    )
    .unwrap();
    let output = emberwall(root.path(), &["config", "check", valid.to_str().unwrap()]);
    assert!(output.status.success(), "{output:?}");
    let stdout = String::from_utf8(output.stdout).unwrap();
    assert!(stdout.contains("#102030 -> #ff8000"), "{stdout}");

    let invalid = root.path().join("invalid.toml");
    fs::write(&invalid, "version = 1\n\n[animation]\nspeed = -2.0\n").unwrap();
    let output = emberwall(root.path(), &["config", "check", invalid.to_str().unwrap()]);
    assert!(!output.status.success());
    let stderr = String::from_utf8(output.stderr).unwrap();
    assert!(stderr.contains("animation.speed"), "{stderr}");
}

#[test]
fn config_where_reports_override_directory() {
    let root = TempDir::new().unwrap();
    let output = emberwall(root.path(), &["config", "where"]);
    assert!(output.status.success());
    let stdout = String::from_utf8(output.stdout).unwrap();
    assert!(stdout.contains(&root.path().display().to_string()));
    assert!(stdout.contains("missing, using defaults"));
}

#[test]
fn palette_from_config_dir_tints_samples() {
    let root = TempDir::new().unwrap();
    fs::write(
        root.path().join("emberwall.toml"),
        "version = 1\n\n[palette]\nstart = \"#000000\"\nend = \"#000000\"\n",
    )
    .unwrap();
    let output = emberwall(root.path(), &["sample", "--json"]);
    assert!(output.status.success(), "{output:?}");
    let report: serde_json::Value = serde_json::from_slice(&output.stdout).unwrap();
    assert_eq!(report["color"]["hex"], "#000000");
}
