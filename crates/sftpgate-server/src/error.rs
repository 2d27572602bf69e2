// Copyright 2025 Schelling Point Labs Inc
// SPDX-License-Identifier: AGPL-3.0-only

//! Server error types

use sftpgate_core::GateError;
use std::path::PathBuf;

/// Server result type
pub type ServerResult<T> = Result<T, ServerError>;

#[derive(Debug, thiserror::Error)]
pub enum ServerError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Invalid configuration in {path}: {source}")]
    Config {
        path: PathBuf,
        #[source]
        source: toml::de::Error,
    },

    #[error("Invalid configuration: {0}")]
    ConfigSyntax(#[from] toml::de::Error),

    #[error("Host key {path} unusable: {reason}")]
    HostKey { path: PathBuf, reason: String },

    #[error(transparent)]
    Gate(#[from] GateError),
}
