//! `oxen config-hash` hashes the canonicalized, deep-merged YAML layers —
//! same layers in the same order must yield the same hash regardless of
//! key ordering inside each file.

use std::io::Write;

fn write_temp(contents: &str) -> tempfile::NamedTempFile {
    let mut f = tempfile::Builder::new().suffix(".yaml").tempfile().unwrap();
    f.write_all(contents.as_bytes()).unwrap();
    f
}

fn first_line(bytes: &[u8]) -> String {
    String::from_utf8_lossy(bytes).lines().next().unwrap_or_default().to_string()
}

#[test]
fn same_content_different_key_order_hashes_equal() {
    let a = write_temp("queue:\n  db_table: oxen_queue\n  extra_fields: [\"tenant\"]\n");
    let b = write_temp("queue:\n  extra_fields: [\"tenant\"]\n  db_table: oxen_queue\n");

    let out_a = assert_cmd::Command::cargo_bin("oxen")
        .unwrap()
        .args(["config-hash", a.path().to_str().unwrap()])
        .output()
        .unwrap();
    let out_b = assert_cmd::Command::cargo_bin("oxen")
        .unwrap()
        .args(["config-hash", b.path().to_str().unwrap()])
        .output()
        .unwrap();

    assert!(out_a.status.success());
    assert!(out_b.status.success());

    let hash_a = first_line(&out_a.stdout);
    let hash_b = first_line(&out_b.stdout);
    assert_eq!(hash_a, hash_b, "canonicalized hash must not depend on key order");
    assert!(hash_a.starts_with("config_hash="));
}

#[test]
fn later_layer_overrides_earlier_layer() {
    let base = write_temp("queue:\n  db_table: oxen_queue\n  fastest_polling_rate_ms: 100\n");
    let overlay = write_temp("queue:\n  fastest_polling_rate_ms: 250\n");

    let out = assert_cmd::Command::cargo_bin("oxen")
        .unwrap()
        .args([
            "config-hash",
            base.path().to_str().unwrap(),
            overlay.path().to_str().unwrap(),
        ])
        .output()
        .unwrap();
    assert!(out.status.success());

    let stdout = String::from_utf8(out.stdout).unwrap();
    assert!(stdout.contains("\"fastest_polling_rate_ms\":250"));
    assert!(stdout.contains("\"db_table\":\"oxen_queue\""));
}
