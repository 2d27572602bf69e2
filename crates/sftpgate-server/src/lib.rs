// Copyright 2025 Schelling Point Labs Inc
// SPDX-License-Identifier: AGPL-3.0-only

//! Network side of sftpgate: a TCP accept loop that hands each connection to
//! a pluggable SSH/SFTP transport and drives the resulting session through a
//! [`sftpgate_core::Gate`].

pub mod config;
pub mod error;
pub mod host_key;
pub mod policy;
pub mod server;
pub mod transport;

pub use config::ServerConfig;
pub use error::{ServerError, ServerResult};
pub use host_key::HostKey;
pub use policy::JailedFsPolicy;
pub use server::{serve_connection, Server};
pub use transport::{Acceptor, ClientMessage, SftpConnection};
