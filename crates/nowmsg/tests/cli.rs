#![cfg(feature = "cli")]

use std::process::{Command, Output};

use serde_json::Value;

fn nowmsg(args: &[&str]) -> Output {
    Command::new(env!("CARGO_BIN_EXE_nowmsg"))
        .args(args)
        .output()
        .expect("nowmsg binary should run")
}

fn json_stdout(output: &Output) -> Value {
    serde_json::from_slice(&output.stdout).unwrap_or_else(|err| {
        panic!(
            "stdout should be json ({err}): {}",
            String::from_utf8_lossy(&output.stdout)
        )
    })
}

#[test]
fn version_prints_package_version() {
    let output = nowmsg(&["version"]);
    assert!(output.status.success());
    let stdout = String::from_utf8_lossy(&output.stdout);
    assert_eq!(stdout.trim(), format!("nowmsg {}", env!("CARGO_PKG_VERSION")));
}

#[test]
fn encode_int_produces_little_endian_frame() {
    let output = nowmsg(&["encode", "--type", "int", "1234", "--format", "json"]);
    assert!(output.status.success());

    let json = json_stdout(&output);
    assert_eq!(json["tag"], "int");
    assert_eq!(json["len"], 0);
    assert_eq!(json["is_array"], false);
    assert_eq!(json["size"], 244);
    let hex = json["hex"].as_str().expect("hex field");
    assert!(hex.starts_with("4e4d0000d2040000"), "hex was {hex}");
    assert_eq!(hex.len(), 244 * 2);
}

#[test]
fn encoded_frame_decodes_back() {
    let encoded = nowmsg(&[
        "encode", "--type", "short", "3", "-4", "5", "--format", "json",
    ]);
    assert!(encoded.status.success());
    let hex = json_stdout(&encoded)["hex"]
        .as_str()
        .expect("hex field")
        .to_string();

    let decoded = nowmsg(&["decode", &hex, "--format", "json"]);
    assert!(decoded.status.success());
    let json = json_stdout(&decoded);
    assert_eq!(json["tag"], "short");
    assert_eq!(json["len"], 3);
    assert_eq!(json["is_array"], true);
    assert_eq!(json["hex"], hex.as_str());
}

#[test]
fn truncated_frame_is_invalid_data() {
    let output = nowmsg(&["decode", "4e4d"]);
    assert_eq!(output.status.code(), Some(60));
    assert!(String::from_utf8_lossy(&output.stderr).contains("decode failed"));
}

#[test]
fn non_hex_input_is_usage_error() {
    let output = nowmsg(&["decode", "not-hex"]);
    assert_eq!(output.status.code(), Some(64));
}

#[test]
fn oversized_array_is_rejected() {
    let values: Vec<String> = (0..31).map(|i| i.to_string()).collect();
    let mut args = vec!["encode", "--type", "int"];
    args.extend(values.iter().map(String::as_str));

    let output = nowmsg(&args);
    assert_eq!(output.status.code(), Some(60));
}

#[test]
fn unknown_type_is_rejected() {
    let output = nowmsg(&["encode", "--type", "string", "x"]);
    assert!(!output.status.success());
}

#[test]
fn simulate_delivers_every_send() {
    let output = nowmsg(&["simulate", "--count", "3", "--format", "json"]);
    assert!(
        output.status.success(),
        "stderr: {}",
        String::from_utf8_lossy(&output.stderr)
    );

    let json = json_stdout(&output);
    assert_eq!(json["delivered"], 3);
    assert_eq!(json["failed"], 0);
    assert_eq!(json["channel"], 6);
    assert_eq!(json["receiver"], "AA:BB:CC:DD:EE:FF");
    assert_eq!(json["peers"][0]["id"], 7);

    let received = json["received"].as_array().expect("received list");
    assert_eq!(received.len(), 3);
    assert_eq!(received[0]["type"], "int");
    assert_eq!(received[0]["value"], 1234);
    assert_eq!(received[2]["value"], 1236);
}

#[test]
fn simulate_without_completions_times_out() {
    let output = nowmsg(&[
        "simulate",
        "--count",
        "1",
        "--completion",
        "silent",
        "--timeout",
        "50ms",
        "--format",
        "json",
    ]);
    assert_eq!(output.status.code(), Some(124));
    assert_eq!(json_stdout(&output)["delivered"], 0);
}

#[test]
fn simulate_rejects_out_of_range_channel() {
    let output = nowmsg(&["simulate", "--channel", "14"]);
    assert_eq!(output.status.code(), Some(64));
}
