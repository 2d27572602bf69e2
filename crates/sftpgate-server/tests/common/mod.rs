// Copyright 2025 Schelling Point Labs Inc
// SPDX-License-Identifier: AGPL-3.0-only
#![allow(dead_code)]

use std::net::SocketAddr;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use sftpgate_core::proto::{AuthMethod, AuthRequest, AuthResult, Operation, RemoteInfo, Reply};
use sftpgate_core::{
    AuthResponse, ConnectionDecision, GateError, ListingResponse, MutationResponse,
    OpenReadResponse, OpenWriteResponse, PolicyHandler, RealpathResponse, Request, SessionInfo,
    StatResponse,
};
use sftpgate_server::{ClientMessage, SftpConnection};
use tokio::sync::mpsc;

/// What the server sent back over a scripted connection
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Sent {
    Auth(AuthResult),
    Reply(u32, Reply),
    Shutdown,
}

/// In-memory transport driven by a test
pub struct ScriptedConnection {
    ident: String,
    inbound: mpsc::UnboundedReceiver<anyhow::Result<ClientMessage>>,
    outbound: mpsc::UnboundedSender<Sent>,
}

/// Test side of a [`ScriptedConnection`]
pub struct Client {
    pub inbound: mpsc::UnboundedSender<anyhow::Result<ClientMessage>>,
    pub outbound: mpsc::UnboundedReceiver<Sent>,
}

pub fn scripted(ident: &str) -> (Box<dyn SftpConnection>, Client) {
    let (in_tx, in_rx) = mpsc::unbounded_channel();
    let (out_tx, out_rx) = mpsc::unbounded_channel();
    let conn = ScriptedConnection {
        ident: ident.to_string(),
        inbound: in_rx,
        outbound: out_tx,
    };
    (
        Box::new(conn),
        Client {
            inbound: in_tx,
            outbound: out_rx,
        },
    )
}

#[async_trait]
impl SftpConnection for ScriptedConnection {
    fn client_ident(&self) -> &str {
        &self.ident
    }

    async fn next_message(&mut self) -> anyhow::Result<Option<ClientMessage>> {
        match self.inbound.recv().await {
            Some(message) => message.map(Some),
            None => Ok(None),
        }
    }

    async fn send_auth_result(&mut self, result: AuthResult) -> anyhow::Result<()> {
        self.outbound.send(Sent::Auth(result))?;
        Ok(())
    }

    async fn send_reply(&mut self, id: u32, reply: Reply) -> anyhow::Result<()> {
        self.outbound.send(Sent::Reply(id, reply))?;
        Ok(())
    }

    async fn shutdown(&mut self) -> anyhow::Result<()> {
        let _ = self.outbound.send(Sent::Shutdown);
        Ok(())
    }
}

impl Client {
    pub fn auth(&self, username: &str, password: &str) {
        self.push(ClientMessage::Auth(AuthRequest {
            method: AuthMethod::Password,
            username: username.into(),
            password: Some(password.into()),
        }));
    }

    pub fn request(&self, id: u32, operation: Operation) {
        self.push(ClientMessage::Request { id, operation });
    }

    pub fn break_transport(&self) {
        self.inbound
            .send(Err(anyhow::anyhow!("connection reset by peer")))
            .expect("connection open");
    }

    /// Close the client's sending half; the server sees end of stream
    pub fn hang_up(&mut self) {
        self.inbound = mpsc::unbounded_channel().0;
    }

    fn push(&self, message: ClientMessage) {
        self.inbound.send(Ok(message)).expect("connection open");
    }

    pub async fn next(&mut self) -> Sent {
        self.outbound.recv().await.expect("server still connected")
    }

    pub async fn reply(&mut self, id: u32) -> Reply {
        match self.next().await {
            Sent::Reply(got, reply) if got == id => reply,
            other => panic!("expected reply {id}, got {:?}", other),
        }
    }

    pub async fn handle(&mut self, id: u32) -> Vec<u8> {
        match self.reply(id).await {
            Reply::Handle(handle) => handle,
            other => panic!("expected a handle, got {:?}", other),
        }
    }
}

pub fn peer() -> SocketAddr {
    "192.0.2.44:40404".parse().expect("addr")
}

/// Wraps another policy, counting lifecycle events and optionally
/// refusing every connection
pub struct Lifecycle<P> {
    pub inner: P,
    pub reject_connections: bool,
    pub connections: AtomicUsize,
    pub disconnects: Mutex<Vec<SessionInfo>>,
    pub errors: Mutex<Vec<String>>,
}

impl<P> Lifecycle<P> {
    pub fn new(inner: P) -> Arc<Self> {
        Arc::new(Self {
            inner,
            reject_connections: false,
            connections: AtomicUsize::new(0),
            disconnects: Mutex::new(Vec::new()),
            errors: Mutex::new(Vec::new()),
        })
    }

    pub fn rejecting(inner: P) -> Arc<Self> {
        Arc::new(Self {
            inner,
            reject_connections: true,
            connections: AtomicUsize::new(0),
            disconnects: Mutex::new(Vec::new()),
            errors: Mutex::new(Vec::new()),
        })
    }

    pub fn connections(&self) -> usize {
        self.connections.load(Ordering::SeqCst)
    }

    pub fn disconnects(&self) -> Vec<SessionInfo> {
        self.disconnects.lock().expect("disconnects lock").clone()
    }

    pub fn errors(&self) -> Vec<String> {
        self.errors.lock().expect("errors lock").clone()
    }
}

#[async_trait]
impl<P: PolicyHandler> PolicyHandler for Lifecycle<P> {
    async fn on_connection(&self, _remote: &RemoteInfo) -> Option<ConnectionDecision> {
        self.connections.fetch_add(1, Ordering::SeqCst);
        if self.reject_connections {
            Some(ConnectionDecision::Reject)
        } else {
            None
        }
    }

    async fn on_auth(&self, request: &Request, response: &mut AuthResponse) {
        self.inner.on_auth(request, response).await
    }

    async fn rename(&self, request: &Request, response: &mut MutationResponse) {
        self.inner.rename(request, response).await
    }

    async fn remove(&self, request: &Request, response: &mut MutationResponse) {
        self.inner.remove(request, response).await
    }

    async fn mkdir(&self, request: &Request, response: &mut MutationResponse) {
        self.inner.mkdir(request, response).await
    }

    async fn rmdir(&self, request: &Request, response: &mut MutationResponse) {
        self.inner.rmdir(request, response).await
    }

    async fn setstat(&self, request: &Request, response: &mut MutationResponse) {
        self.inner.setstat(request, response).await
    }

    async fn opendir(&self, request: &Request, response: &mut MutationResponse) {
        self.inner.opendir(request, response).await
    }

    async fn readdir(&self, request: &Request, response: &mut ListingResponse) {
        self.inner.readdir(request, response).await
    }

    async fn close(&self, request: &Request, response: &mut MutationResponse) {
        self.inner.close(request, response).await
    }

    async fn realpath(&self, request: &Request, response: &mut RealpathResponse) {
        self.inner.realpath(request, response).await
    }

    async fn stat(&self, request: &Request, response: &mut StatResponse) {
        self.inner.stat(request, response).await
    }

    async fn lstat(&self, request: &Request, response: &mut StatResponse) {
        self.inner.lstat(request, response).await
    }

    async fn fstat(&self, request: &Request, response: &mut StatResponse) {
        self.inner.fstat(request, response).await
    }

    async fn read(&self, request: &Request, response: &mut OpenReadResponse) {
        self.inner.read(request, response).await
    }

    async fn write(&self, request: &Request, response: &mut OpenWriteResponse) {
        self.inner.write(request, response).await
    }

    async fn on_disconnect(&self, session: &SessionInfo) {
        self.disconnects
            .lock()
            .expect("disconnects lock")
            .push(session.clone());
    }

    async fn on_error(&self, _remote: Option<&RemoteInfo>, error: &GateError) {
        self.errors.lock().expect("errors lock").push(error.to_string());
    }
}
