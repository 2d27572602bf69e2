// Copyright 2025 Schelling Point Labs Inc
// SPDX-License-Identifier: AGPL-3.0-only
#![allow(dead_code)]

use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use sftpgate_core::proto::{
    AuthMethod, AuthRequest, FileAttributes, NameEntry, Operation, RemoteInfo, Reply,
};
use sftpgate_core::{
    AuthAttempt, AuthResponse, Gate, GateConfig, GateError, Interceptor, ListingResponse,
    MutationResponse, Next, OpenReadResponse, OpenWriteResponse, PolicyHandler, RealpathResponse,
    Request, Response, Session, SessionInfo, StatFields, StatResponse,
};

pub fn remote() -> RemoteInfo {
    RemoteInfo::new("203.0.113.9:51022".parse().expect("addr"), "SSH-2.0-OpenSSH_9.6")
}

pub fn password(username: &str) -> AuthRequest {
    AuthRequest {
        method: AuthMethod::Password,
        username: username.into(),
        password: Some("hunter2".into()),
    }
}

/// Policy rooted at a temp directory that records which handlers ran
pub struct JailPolicy {
    pub root: PathBuf,
    pub listing: Mutex<Vec<NameEntry>>,
    pub events: Mutex<Vec<String>>,
    pub deny_close: AtomicBool,
    pub disconnects: AtomicUsize,
    pub errors: AtomicUsize,
}

impl JailPolicy {
    pub fn new(root: &Path) -> Arc<Self> {
        Arc::new(Self {
            root: root.to_path_buf(),
            listing: Mutex::new(Vec::new()),
            events: Mutex::new(Vec::new()),
            deny_close: AtomicBool::new(false),
            disconnects: AtomicUsize::new(0),
            errors: AtomicUsize::new(0),
        })
    }

    pub fn set_listing(&self, names: &[&str]) {
        *self.listing.lock().expect("listing lock") = names
            .iter()
            .map(|name| NameEntry::new(*name, FileAttributes::default()))
            .collect();
    }

    pub fn events(&self) -> Vec<String> {
        self.events.lock().expect("events lock").clone()
    }

    pub fn count(&self, event: &str) -> usize {
        self.events().iter().filter(|e| e.as_str() == event).count()
    }

    fn record(&self, request: &Request) {
        self.events
            .lock()
            .expect("events lock")
            .push(request.event().name().to_string());
    }

    fn real(&self, request: &Request) -> String {
        let client = request.path().unwrap_or("/").trim_start_matches('/');
        self.root.join(client).to_string_lossy().into_owned()
    }
}

#[async_trait]
impl PolicyHandler for JailPolicy {
    async fn on_auth(&self, request: &Request, response: &mut AuthResponse) {
        self.record(request);
        match request.username.as_str() {
            "nobody" => {
                let _ = response.deny();
            }
            "undecided" => {}
            "alias" => {
                let _ = response.allow(Some("canonical".into()));
            }
            _ => {
                let _ = response.allow(None);
            }
        }
    }

    async fn rename(&self, request: &Request, response: &mut MutationResponse) {
        self.record(request);
        let _ = response.allow();
    }

    async fn opendir(&self, request: &Request, response: &mut MutationResponse) {
        self.record(request);
        let _ = response.allow();
    }

    async fn readdir(&self, request: &Request, response: &mut ListingResponse) {
        self.record(request);
        let listing = self.listing.lock().expect("listing lock").clone();
        let _ = response.send(listing);
    }

    async fn close(&self, request: &Request, response: &mut MutationResponse) {
        self.record(request);
        if self.deny_close.load(Ordering::SeqCst) {
            let _ = response.deny();
        }
    }

    async fn realpath(&self, request: &Request, response: &mut RealpathResponse) {
        self.record(request);
        let visible = request.path().unwrap_or("/").to_string();
        let _ = response.send(self.real(request), visible, None);
    }

    async fn stat(&self, request: &Request, response: &mut StatResponse) {
        self.record(request);
        if request.path() == Some("/missing") {
            let _ = response.not_found();
        } else {
            let _ = response.send_directory(StatFields {
                permissions: 0o755,
                ..StatFields::default()
            });
        }
    }

    async fn fstat(&self, request: &Request, response: &mut StatResponse) {
        self.record(request);
        let _ = response.send_file(StatFields {
            permissions: 0o644,
            size: 7,
            ..StatFields::default()
        });
    }

    async fn read(&self, request: &Request, response: &mut OpenReadResponse) {
        self.record(request);
        let _ = response.send_file(self.real(request));
    }

    async fn write(&self, request: &Request, response: &mut OpenWriteResponse) {
        self.record(request);
        let _ = response.receive_file(self.real(request));
    }

    async fn on_disconnect(&self, _session: &SessionInfo) {
        self.disconnects.fetch_add(1, Ordering::SeqCst);
    }

    async fn on_error(&self, _remote: Option<&RemoteInfo>, _error: &GateError) {
        self.errors.fetch_add(1, Ordering::SeqCst);
    }
}

/// Counts every request that enters the chain
#[derive(Default)]
pub struct Counter(pub AtomicUsize);

impl Counter {
    pub fn get(&self) -> usize {
        self.0.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl Interceptor for Counter {
    async fn handle(
        &self,
        request: &mut Request,
        response: &mut Response,
        next: Next<'_>,
    ) -> anyhow::Result<()> {
        self.0.fetch_add(1, Ordering::SeqCst);
        next.run(request, response).await
    }
}

pub fn gate(policy: Arc<JailPolicy>, counter: Arc<Counter>) -> Arc<Gate> {
    Gate::builder(policy)
        .shared_interceptor(counter)
        .config(GateConfig::default())
        .build()
}

pub async fn login(gate: &Arc<Gate>, username: &str) -> Session {
    match gate.authenticate(&remote(), password(username)).await {
        AuthAttempt::Accepted(session) => session,
        other => panic!("login as {} failed: {:?}", username, other),
    }
}

pub fn expect_handle(reply: Reply) -> Vec<u8> {
    match reply {
        Reply::Handle(handle) => handle,
        other => panic!("expected a handle, got {:?}", other),
    }
}

pub fn opendir(path: &str) -> Operation {
    Operation::Opendir { path: path.into() }
}

pub fn open(path: &str, flags: &str) -> Operation {
    Operation::Open {
        path: path.into(),
        flags: flags.into(),
        attrs: FileAttributes::default(),
    }
}
