// Copyright 2025 Schelling Point Labs Inc
// SPDX-License-Identifier: AGPL-3.0-only

//! Structural validation for decoded operations

use crate::messages::*;
use thiserror::Error;

/// Longest path accepted from a client
pub const MAX_PATH_LEN: usize = 4096;

/// Validation error
#[derive(Error, Debug, PartialEq, Eq)]
pub enum ValidationError {
    #[error("path contains a NUL byte")]
    NulInPath,
    #[error("path is {len} bytes, limit is {}", MAX_PATH_LEN)]
    PathTooLong { len: usize },
    #[error("extended request name is empty")]
    EmptyExtendedName,
}

/// Validate a decoded operation before it reaches the dispatcher
///
/// Only checks what the transport cannot be trusted to have checked: path
/// arguments must be representable as filesystem paths.
pub fn validate_operation(operation: &Operation) -> Result<(), ValidationError> {
    for path in operation.paths() {
        validate_path(path)?;
    }
    if let Operation::Extended { request, .. } = operation {
        if request.is_empty() {
            return Err(ValidationError::EmptyExtendedName);
        }
    }
    Ok(())
}

pub fn validate_path(path: &str) -> Result<(), ValidationError> {
    if path.len() > MAX_PATH_LEN {
        return Err(ValidationError::PathTooLong { len: path.len() });
    }
    if path.contains('\0') {
        return Err(ValidationError::NulInPath);
    }
    Ok(())
}
