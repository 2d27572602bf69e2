// Copyright 2025 Schelling Point Labs Inc
// SPDX-License-Identifier: AGPL-3.0-only

//! Boundary to the SSH transport and SFTP packet codec
//!
//! The codec is supplied by the integrator: an [`Acceptor`] performs the
//! handshake on a raw TCP stream and yields an [`SftpConnection`] that
//! speaks in decoded messages.

use crate::host_key::HostKey;
use async_trait::async_trait;
use sftpgate_proto::{AuthRequest, AuthResult, Operation, Reply};
use std::net::SocketAddr;
use tokio::net::TcpStream;

/// A decoded message from the client
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum ClientMessage {
    Auth(AuthRequest),
    Request { id: u32, operation: Operation },
}

/// One established transport connection
#[async_trait]
pub trait SftpConnection: Send {
    /// Client identification string from the version exchange
    fn client_ident(&self) -> &str;

    /// Next message, or `None` once the client has closed the connection
    async fn next_message(&mut self) -> anyhow::Result<Option<ClientMessage>>;

    async fn send_auth_result(&mut self, result: AuthResult) -> anyhow::Result<()>;

    /// Send the reply for request `id`
    async fn send_reply(&mut self, id: u32, reply: Reply) -> anyhow::Result<()>;

    async fn shutdown(&mut self) -> anyhow::Result<()> {
        Ok(())
    }
}

/// Turns accepted TCP streams into SFTP connections
#[async_trait]
pub trait Acceptor: Send + Sync {
    async fn handshake(
        &self,
        stream: TcpStream,
        peer: SocketAddr,
        host_key: &HostKey,
    ) -> anyhow::Result<Box<dyn SftpConnection>>;
}
