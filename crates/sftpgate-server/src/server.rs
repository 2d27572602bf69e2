// Copyright 2025 Schelling Point Labs Inc
// SPDX-License-Identifier: AGPL-3.0-only

//! Accept loop and per-connection driver

use crate::config::ServerConfig;
use crate::error::ServerResult;
use crate::host_key::HostKey;
use crate::transport::{Acceptor, ClientMessage, SftpConnection};
use sftpgate_core::proto::{RemoteInfo, Reply, StatusCode};
use sftpgate_core::{AuthAttempt, Gate, GateError, Session};
use sftpgate_logging::{session_span, SessionSpanExt};
use std::future::Future;
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::net::TcpListener;
use tokio::sync::Semaphore;
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn, Instrument};

/// SFTP server bound to a listening socket
pub struct Server {
    config: ServerConfig,
    gate: Arc<Gate>,
    host_key: Arc<HostKey>,
    listener: TcpListener,
}

impl Server {
    /// Load the host key and bind the listener
    pub async fn bind(config: ServerConfig, gate: Arc<Gate>) -> ServerResult<Self> {
        let host_key = HostKey::load(&config.host_key_path)?;
        Self::bind_with_key(config, gate, host_key).await
    }

    pub async fn bind_with_key(
        config: ServerConfig,
        gate: Arc<Gate>,
        host_key: HostKey,
    ) -> ServerResult<Self> {
        let listener = TcpListener::bind(config.bind_addr).await?;
        info!(
            addr = %listener.local_addr()?,
            max_connections = config.max_connections,
            "SFTP server listening"
        );
        Ok(Self {
            config,
            gate,
            host_key: Arc::new(host_key),
            listener,
        })
    }

    pub fn local_addr(&self) -> ServerResult<SocketAddr> {
        Ok(self.listener.local_addr()?)
    }

    /// Serve until the process is stopped
    pub async fn run<A>(self, acceptor: A) -> ServerResult<()>
    where
        A: Acceptor + 'static,
    {
        self.run_until(acceptor, std::future::pending()).await
    }

    /// Serve until `shutdown` completes. Open connections are then told to
    /// stop reading requests and are awaited until their teardown is done.
    pub async fn run_until<A, F>(self, acceptor: A, shutdown: F) -> ServerResult<()>
    where
        A: Acceptor + 'static,
        F: Future<Output = ()>,
    {
        let acceptor = Arc::new(acceptor);
        let permits = Arc::new(Semaphore::new(self.config.max_connections.max(1)));
        let mut connections = JoinSet::new();
        let stopping = CancellationToken::new();
        tokio::pin!(shutdown);

        loop {
            let permit = tokio::select! {
                _ = &mut shutdown => break,
                permit = permits.clone().acquire_owned() => match permit {
                    Ok(permit) => permit,
                    Err(_) => break,
                },
            };

            let (stream, peer) = tokio::select! {
                _ = &mut shutdown => break,
                accepted = self.listener.accept() => match accepted {
                    Ok(accepted) => accepted,
                    Err(err) => {
                        warn!(error = %err, "accept failed");
                        continue;
                    }
                },
            };

            let gate = self.gate.clone();
            let acceptor = acceptor.clone();
            let host_key = self.host_key.clone();
            let max_auth_attempts = self.config.max_auth_attempts;
            let cancel = stopping.child_token();
            connections.spawn(async move {
                let _permit = permit;
                let handshake = tokio::select! {
                    _ = cancel.cancelled() => return,
                    handshake = acceptor.handshake(stream, peer, &host_key) => handshake,
                };
                match handshake {
                    Ok(conn) => {
                        serve_connection(gate, conn, peer, max_auth_attempts, cancel).await
                    }
                    Err(err) => {
                        debug!(peer = %peer, error = %err, "handshake failed");
                        let err = GateError::Transport(err.to_string());
                        gate.report_error(None, &err).await;
                    }
                }
            });

            // Reap finished connections so the set does not grow unbounded
            while let Some(joined) = connections.try_join_next() {
                if let Err(err) = joined {
                    error!(error = %err, "connection task panicked");
                }
            }
        }

        info!(open = connections.len(), "SFTP server shutting down");
        stopping.cancel();
        while let Some(joined) = connections.join_next().await {
            if let Err(err) = joined {
                error!(error = %err, "connection task panicked");
            }
        }
        Ok(())
    }
}

/// Drive one transport connection from admission to teardown. Once `cancel`
/// fires, no further request is read and the session is torn down.
pub async fn serve_connection(
    gate: Arc<Gate>,
    mut conn: Box<dyn SftpConnection>,
    peer: SocketAddr,
    max_auth_attempts: u32,
    cancel: CancellationToken,
) {
    let remote = RemoteInfo::new(peer, conn.client_ident());
    let span = session_span(&remote, &remote.client_ident);
    async move {
        if gate.accept(&remote).await.is_err() {
            shutdown(conn.as_mut()).await;
            return;
        }

        let authenticated =
            authenticate(&gate, conn.as_mut(), &remote, max_auth_attempts, &cancel).await;
        let Some(mut session) = authenticated else {
            shutdown(conn.as_mut()).await;
            return;
        };
        tracing::Span::current().record_user(session.username());

        if let Err(err) = operate(&mut session, conn.as_mut(), &cancel).await {
            gate.report_error(Some(&remote), &err).await;
        }

        session.close().await;
        shutdown(conn.as_mut()).await;
    }
    .instrument(span)
    .await
}

async fn authenticate(
    gate: &Arc<Gate>,
    conn: &mut dyn SftpConnection,
    remote: &RemoteInfo,
    max_auth_attempts: u32,
    cancel: &CancellationToken,
) -> Option<Session> {
    let mut failures = 0u32;
    loop {
        let next = tokio::select! {
            _ = cancel.cancelled() => {
                debug!("server stopping before authentication finished");
                return None;
            }
            next = conn.next_message() => next,
        };
        let message = match next {
            Ok(Some(message)) => message,
            Ok(None) => {
                debug!("client left before authenticating");
                return None;
            }
            Err(err) => {
                let err = GateError::Transport(err.to_string());
                gate.report_error(Some(remote), &err).await;
                return None;
            }
        };

        let attempt = match message {
            ClientMessage::Auth(attempt) => attempt,
            ClientMessage::Request { id, operation } => {
                debug!(verb = %operation.verb(), "request before authentication");
                let refused = Reply::from(StatusCode::PermissionDenied);
                if let Err(err) = conn.send_reply(id, refused).await {
                    let err = GateError::Transport(err.to_string());
                    gate.report_error(Some(remote), &err).await;
                    return None;
                }
                continue;
            }
        };

        let outcome = gate.authenticate(remote, attempt).await;
        if let Err(err) = conn.send_auth_result(outcome.result()).await {
            let err = GateError::Transport(err.to_string());
            gate.report_error(Some(remote), &err).await;
            if let AuthAttempt::Accepted(session) = outcome {
                session.close().await;
            }
            return None;
        }
        match outcome {
            AuthAttempt::Accepted(session) => return Some(session),
            AuthAttempt::Rejected(_) => {
                failures += 1;
                if failures >= max_auth_attempts {
                    info!(failures, "too many failed authentication attempts");
                    return None;
                }
            }
        }
    }
}

async fn operate(
    session: &mut Session,
    conn: &mut dyn SftpConnection,
    cancel: &CancellationToken,
) -> Result<(), GateError> {
    loop {
        let next = tokio::select! {
            _ = cancel.cancelled() => {
                debug!("server stopping, ending session");
                return Ok(());
            }
            next = conn.next_message() => next,
        };
        let message = next.map_err(|err| GateError::Transport(err.to_string()))?;
        let (id, reply) = match message {
            None => return Ok(()),
            Some(ClientMessage::Request { id, operation }) => {
                (id, session.dispatch(operation).await)
            }
            Some(ClientMessage::Auth(_)) => {
                debug!("ignoring authentication request on an established session");
                continue;
            }
        };
        conn.send_reply(id, reply)
            .await
            .map_err(|err| GateError::Transport(err.to_string()))?;
    }
}

async fn shutdown(conn: &mut dyn SftpConnection) {
    if let Err(err) = conn.shutdown().await {
        debug!(error = %err, "transport shutdown failed");
    }
}
