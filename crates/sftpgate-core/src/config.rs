// Copyright 2025 Schelling Point Labs Inc
// SPDX-License-Identifier: AGPL-3.0-only

//! Gate configuration, read-only once the gate is built

use serde::{Deserialize, Serialize};
use sftpgate_proto::AuthMethod;

/// Default cap on bytes returned by a single read
pub const DEFAULT_MAX_READ_LEN: u32 = 256 * 1024;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case", default)]
pub struct GateConfig {
    /// Authentication methods offered to clients; anything else is rejected
    /// before interceptors or the auth policy see it
    pub accepted_methods: Vec<AuthMethod>,

    /// Outcome of an authentication attempt nobody decided on
    pub allow_unhandled_auth: bool,

    /// Upper bound on the length of one read reply
    pub max_read_len: u32,
}

impl Default for GateConfig {
    fn default() -> Self {
        Self {
            accepted_methods: vec![AuthMethod::Password, AuthMethod::PublicKey],
            allow_unhandled_auth: true,
            max_read_len: DEFAULT_MAX_READ_LEN,
        }
    }
}

impl GateConfig {
    pub fn accepts(&self, method: AuthMethod) -> bool {
        self.accepted_methods.contains(&method)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_accept_password_and_publickey() {
        let config = GateConfig::default();
        assert!(config.accepts(AuthMethod::Password));
        assert!(config.accepts(AuthMethod::PublicKey));
        assert!(!config.accepts(AuthMethod::None));
        assert!(config.allow_unhandled_auth);
        assert_eq!(config.max_read_len, DEFAULT_MAX_READ_LEN);
    }

    #[test]
    fn partial_toml_fills_defaults() {
        let config: GateConfig = toml::from_str(
            r#"
            accepted-methods = ["keyboard-interactive"]
            "#,
        )
        .expect("parse gate config");
        assert_eq!(config.accepted_methods, vec![AuthMethod::KeyboardInteractive]);
        assert!(config.allow_unhandled_auth);
        assert_eq!(config.max_read_len, DEFAULT_MAX_READ_LEN);
    }
}
