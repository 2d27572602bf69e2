// Copyright 2025 Schelling Point Labs Inc
// SPDX-License-Identifier: AGPL-3.0-only

//! Server configuration

use crate::error::{ServerError, ServerResult};
use serde::{Deserialize, Serialize};
use sftpgate_core::GateConfig;
use sftpgate_logging::LoggingArgs;
use std::net::SocketAddr;
use std::path::{Path, PathBuf};

/// Server configuration, loaded from a TOML file
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case", default)]
pub struct ServerConfig {
    /// Address to listen on
    pub bind_addr: SocketAddr,

    /// Private host key handed to the transport during the handshake
    pub host_key_path: PathBuf,

    /// Connections served at once; further clients wait in the accept queue
    pub max_connections: usize,

    /// Failed authentication attempts allowed before the connection is dropped
    pub max_auth_attempts: u32,

    pub gate: GateConfig,

    pub logging: LoggingArgs,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind_addr: SocketAddr::from(([127, 0, 0, 1], 2022)),
            host_key_path: PathBuf::from("/etc/sftpgate/ssh_host_ed25519_key"),
            max_connections: 64,
            max_auth_attempts: 6,
            gate: GateConfig::default(),
            logging: LoggingArgs::default(),
        }
    }
}

impl ServerConfig {
    /// Read a config file; absent keys keep their defaults
    pub fn load(path: &Path) -> ServerResult<Self> {
        let content = std::fs::read_to_string(path)?;
        toml::from_str(&content).map_err(|source| ServerError::Config {
            path: path.to_path_buf(),
            source,
        })
    }

    pub fn from_toml_str(content: &str) -> ServerResult<Self> {
        Ok(toml::from_str(content)?)
    }
}
