// Copyright 2025 Schelling Point Labs Inc
// SPDX-License-Identifier: AGPL-3.0-only

//! sftpgate protocol boundary: decoded call types and validation
//!
//! This crate defines the values exchanged between an SFTP transport (which
//! owns packet framing and the SSH layer) and the sftpgate dispatcher: decoded
//! operations going in, status/handle/attribute/name/data replies coming out.

pub mod messages;
pub mod validation;

// Re-export key types
pub use messages::{
    AddressFamily,
    AuthMethod,
    AuthRequest,
    AuthResult,
    FileAttributes,
    HandleId,
    NameEntry,
    // Decoded requests and their replies
    Operation,
    RemoteInfo,
    Reply,
    StatusCode,
    Verb,
    S_IFDIR,
    S_IFLNK,
    S_IFMT,
    S_IFREG,
};
pub use validation::*;
