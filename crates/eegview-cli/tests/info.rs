use assert_cmd::cargo::cargo_bin_cmd;
use eegview_lib::SessionSummary;
use std::error::Error;
use std::path::PathBuf;

fn fixture(name: &str) -> String {
    let root = PathBuf::from(env!("CARGO_MANIFEST_DIR"))
        .parent()
        .and_then(|p| p.parent())
        .expect("workspace root")
        .join("test_data")
        .join(name);
    root.to_string_lossy().to_string()
}

#[test]
fn info_reports_unicorn_session() -> Result<(), Box<dyn Error>> {
    let mut cmd = cargo_bin_cmd!("eegview");
    cmd.args(["info", "--input", &fixture("unicorn_sample.csv")]);
    let out = cmd.assert().success().get_output().stdout.clone();
    let summary: SessionSummary = serde_json::from_slice(&out)?;
    assert_eq!(
        summary.channels,
        vec!["Fz", "C3", "Cz", "C4", "Pz", "PO7", "Oz", "PO8"]
    );
    assert_eq!(summary.sampling_rate_hz, 250.0);
    assert_eq!(summary.rows, 10);
    assert!((summary.duration_s - 0.04).abs() < 1e-12);
    assert!(summary.warnings.is_empty());
    Ok(())
}

#[test]
fn info_honours_layout_file_and_rate_override() -> Result<(), Box<dyn Error>> {
    let mut cmd = cargo_bin_cmd!("eegview");
    cmd.args([
        "info",
        "--input",
        &fixture("timestamped.csv"),
        "--layout",
        &fixture("timestamped_layout.toml"),
    ]);
    let out = cmd.assert().success().get_output().stdout.clone();
    let summary: SessionSummary = serde_json::from_slice(&out)?;
    assert_eq!(summary.channels, vec!["Fz", "Cz"]);
    assert_eq!(summary.auxiliary, vec!["marker"]);
    assert!((summary.sampling_rate_hz - 250.0).abs() < 1e-6);
    assert_eq!(summary.start_timestamp, Some(0.0));
    assert_eq!(summary.warnings.len(), 1);

    let mut cmd = cargo_bin_cmd!("eegview");
    cmd.args([
        "info",
        "--input",
        &fixture("timestamped.csv"),
        "--layout",
        &fixture("timestamped_layout.toml"),
        "--rate",
        "500",
    ]);
    let out = cmd.assert().success().get_output().stdout.clone();
    let summary: SessionSummary = serde_json::from_slice(&out)?;
    assert_eq!(summary.sampling_rate_hz, 500.0);
    Ok(())
}

#[test]
fn malformed_files_exit_non_zero() {
    let cases = [
        ("ragged.csv", "ragged data at line 3"),
        ("empty.csv", "file contains no rows"),
        ("header_only.csv", "session contains no samples"),
        ("duplicate_labels.csv", "duplicate channel label 'Cz'"),
        ("missing.csv", "file not found"),
    ];
    for (name, message) in cases {
        let mut cmd = cargo_bin_cmd!("eegview");
        cmd.args(["info", "--device", "generic", "--input", &fixture(name)]);
        let out = cmd.assert().failure().get_output().stderr.clone();
        let stderr = String::from_utf8_lossy(&out);
        assert!(stderr.contains(message), "{name}: {stderr}");
    }
}

#[test]
fn zero_rate_override_is_a_session_error() {
    let mut cmd = cargo_bin_cmd!("eegview");
    cmd.args(["info", "--input", &fixture("unicorn_sample.csv"), "--rate", "0"]);
    let out = cmd.assert().failure().get_output().stderr.clone();
    let stderr = String::from_utf8_lossy(&out);
    assert!(stderr.contains("sampling rate must be positive, got 0"), "{stderr}");
}
