// Copyright 2025 Schelling Point Labs Inc
// SPDX-License-Identifier: AGPL-3.0-only

use sftpgate_proto::*;

#[test]
fn test_plain_operations_validate() {
    let ops = vec![
        Operation::Open {
            path: "/upload/report.csv".into(),
            flags: "w".into(),
            attrs: FileAttributes::default(),
        },
        Operation::Rename {
            path: "/a".into(),
            target_path: "/b".into(),
        },
        Operation::Realpath { path: "".into() },
        Operation::Read {
            handle: HandleId::new(1).to_bytes(),
            offset: 0,
            len: 32768,
        },
    ];
    for op in &ops {
        assert!(validate_operation(op).is_ok(), "{:?} should validate", op);
    }
}

#[test]
fn test_nul_in_any_path_is_rejected() {
    let op = Operation::Rename {
        path: "/ok".into(),
        target_path: "/bad\0name".into(),
    };
    assert_eq!(validate_operation(&op), Err(ValidationError::NulInPath));
}

#[test]
fn test_overlong_path_is_rejected() {
    let op = Operation::Stat {
        path: "a".repeat(MAX_PATH_LEN + 1),
    };
    assert_eq!(
        validate_operation(&op),
        Err(ValidationError::PathTooLong {
            len: MAX_PATH_LEN + 1
        })
    );
}

#[test]
fn test_extended_requires_a_name() {
    let op = Operation::Extended {
        request: String::new(),
        data: vec![],
    };
    assert_eq!(validate_operation(&op), Err(ValidationError::EmptyExtendedName));
}

#[test]
fn test_status_codes_serialize_as_wire_names() {
    let json = serde_json::to_string(&StatusCode::PermissionDenied).unwrap();
    assert_eq!(json, "\"PERMISSION_DENIED\"");
    let method: AuthMethod = serde_json::from_str("\"publickey\"").unwrap();
    assert_eq!(method, AuthMethod::PublicKey);
}

#[test]
fn test_operation_verbs() {
    let op = Operation::Symlink {
        link_path: "/l".into(),
        target_path: "/t".into(),
    };
    assert_eq!(op.verb(), Verb::Symlink);
    assert_eq!(op.paths(), vec!["/l", "/t"]);
}
