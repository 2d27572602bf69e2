// Copyright 2025 Schelling Point Labs Inc
// SPDX-License-Identifier: AGPL-3.0-only

use sftpgate_logging::{init_to_file, Level, LogFormat};

// Installs the global subscriber, so it gets a test binary of its own
#[test]
fn test_init_to_file_creates_directories_and_appends() {
    let dir = tempfile::tempdir().expect("tempdir");
    let log_path = dir.path().join("logs").join("nested").join("sftpgate-server.log");

    init_to_file("file-logging", Level::INFO, LogFormat::Json, &log_path)
        .expect("file logging initializes");
    assert!(log_path.parent().expect("parent").is_dir());

    tracing::warn!(remote = "192.0.2.7:22", "session error");

    let contents = std::fs::read_to_string(&log_path).expect("log file");
    let line = contents.lines().last().expect("one log line");
    let event: serde_json::Value = serde_json::from_str(line).expect("json log line");
    assert_eq!(event["level"], "WARN");
    assert_eq!(event["fields"]["message"], "session error");
    assert_eq!(event["fields"]["remote"], "192.0.2.7:22");

    // A second init reopens the file for append and then refuses to
    // replace the installed subscriber
    assert!(init_to_file("file-logging", Level::INFO, LogFormat::Json, &log_path).is_err());
    let reread = std::fs::read_to_string(&log_path).expect("log file");
    assert_eq!(reread, contents);
}
