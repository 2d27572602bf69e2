// Copyright 2025 Schelling Point Labs Inc
// SPDX-License-Identifier: AGPL-3.0-only

//! One-shot response facades handed to interceptors and policy handlers.
//!
//! Each facade records at most one decision. A second call is an error and
//! leaves the first decision in place.

use crate::error::{GateError, GateResult};
use crate::request::Event;
use sftpgate_proto::{FileAttributes, NameEntry, StatusCode, S_IFDIR, S_IFMT, S_IFREG};

#[derive(Debug)]
struct OneShot<T> {
    event: Event,
    value: Option<T>,
}

impl<T> OneShot<T> {
    fn new(event: Event) -> Self {
        Self { event, value: None }
    }

    fn set(&mut self, value: T) -> GateResult<()> {
        if self.value.is_some() {
            return Err(GateError::AlreadyResolved {
                event: self.event.name(),
            });
        }
        self.value = Some(value);
        Ok(())
    }
}

/// Decision on an authentication attempt
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum AuthOutcome {
    /// Accept, optionally under a different session username
    Allow(Option<String>),
    Deny,
}

#[derive(Debug)]
pub struct AuthResponse(OneShot<AuthOutcome>);

impl AuthResponse {
    pub fn new() -> Self {
        Self(OneShot::new(Event::Auth))
    }

    pub fn allow(&mut self, username: Option<String>) -> GateResult<()> {
        self.0.set(AuthOutcome::Allow(username))
    }

    pub fn deny(&mut self) -> GateResult<()> {
        self.0.set(AuthOutcome::Deny)
    }

    pub fn outcome(&self) -> Option<&AuthOutcome> {
        self.0.value.as_ref()
    }

    pub fn into_outcome(self) -> Option<AuthOutcome> {
        self.0.value
    }
}

impl Default for AuthResponse {
    fn default() -> Self {
        Self::new()
    }
}

/// Decision on a verb that either happens or does not
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum MutationOutcome {
    Allow,
    Deny,
    Fail,
    NotFound,
}

impl MutationOutcome {
    pub fn status(self) -> StatusCode {
        match self {
            MutationOutcome::Allow => StatusCode::Ok,
            MutationOutcome::Deny => StatusCode::PermissionDenied,
            MutationOutcome::Fail => StatusCode::Failure,
            MutationOutcome::NotFound => StatusCode::NoSuchFile,
        }
    }
}

/// Response for RENAME, REMOVE, MKDIR, RMDIR, SETSTAT, OPENDIR and CLOSE
#[derive(Debug)]
pub struct MutationResponse(OneShot<MutationOutcome>);

impl MutationResponse {
    pub fn new(event: Event) -> Self {
        Self(OneShot::new(event))
    }

    pub fn allow(&mut self) -> GateResult<()> {
        self.0.set(MutationOutcome::Allow)
    }

    pub fn deny(&mut self) -> GateResult<()> {
        self.0.set(MutationOutcome::Deny)
    }

    pub fn fail(&mut self) -> GateResult<()> {
        self.0.set(MutationOutcome::Fail)
    }

    pub fn not_found(&mut self) -> GateResult<()> {
        self.0.set(MutationOutcome::NotFound)
    }

    pub fn outcome(&self) -> Option<MutationOutcome> {
        self.0.value
    }

    pub fn event(&self) -> Event {
        self.0.event
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum ListingOutcome {
    Send(Vec<NameEntry>),
    Deny,
    Fail,
    NotFound,
}

/// Response for READDIR
#[derive(Debug)]
pub struct ListingResponse(OneShot<ListingOutcome>);

impl ListingResponse {
    pub fn new() -> Self {
        Self(OneShot::new(Event::Readdir))
    }

    /// Supply the complete listing; the gate pages it out one entry per reply
    pub fn send(&mut self, entries: Vec<NameEntry>) -> GateResult<()> {
        self.0.set(ListingOutcome::Send(entries))
    }

    pub fn deny(&mut self) -> GateResult<()> {
        self.0.set(ListingOutcome::Deny)
    }

    pub fn fail(&mut self) -> GateResult<()> {
        self.0.set(ListingOutcome::Fail)
    }

    pub fn not_found(&mut self) -> GateResult<()> {
        self.0.set(ListingOutcome::NotFound)
    }

    pub fn outcome(&self) -> Option<&ListingOutcome> {
        self.0.value.as_ref()
    }

    pub fn into_outcome(self) -> Option<ListingOutcome> {
        self.0.value
    }
}

impl Default for ListingResponse {
    fn default() -> Self {
        Self::new()
    }
}

/// Attributes supplied by a stat handler; the file type bits are added by
/// the gate depending on which `send_*` method is used
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct StatFields {
    pub permissions: u32,
    pub uid: u32,
    pub gid: u32,
    pub size: u64,
    pub atime: u32,
    pub mtime: u32,
}

impl StatFields {
    pub fn into_attributes(self, file_type: u32) -> FileAttributes {
        FileAttributes {
            size: Some(self.size),
            uid: Some(self.uid),
            gid: Some(self.gid),
            permissions: Some((self.permissions & !S_IFMT) | file_type),
            atime: Some(self.atime),
            mtime: Some(self.mtime),
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum StatOutcome {
    Send(FileAttributes),
    Deny,
    Fail,
    NotFound,
}

/// Response for STAT, LSTAT and FSTAT
#[derive(Debug)]
pub struct StatResponse(OneShot<StatOutcome>);

impl StatResponse {
    pub fn new(event: Event) -> Self {
        Self(OneShot::new(event))
    }

    pub fn send_file(&mut self, fields: StatFields) -> GateResult<()> {
        self.0.set(StatOutcome::Send(fields.into_attributes(S_IFREG)))
    }

    pub fn send_directory(&mut self, fields: StatFields) -> GateResult<()> {
        self.0.set(StatOutcome::Send(fields.into_attributes(S_IFDIR)))
    }

    pub fn deny(&mut self) -> GateResult<()> {
        self.0.set(StatOutcome::Deny)
    }

    pub fn fail(&mut self) -> GateResult<()> {
        self.0.set(StatOutcome::Fail)
    }

    pub fn not_found(&mut self) -> GateResult<()> {
        self.0.set(StatOutcome::NotFound)
    }

    pub fn outcome(&self) -> Option<&StatOutcome> {
        self.0.value.as_ref()
    }

    pub fn into_outcome(self) -> Option<StatOutcome> {
        self.0.value
    }

    pub fn event(&self) -> Event {
        self.0.event
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum RealpathOutcome {
    Send {
        /// Path on the server used to fetch attributes when none are given
        real_path: String,
        /// Path reported back to the client
        visible_path: String,
        attrs: Option<FileAttributes>,
    },
    Deny,
    Fail,
    NotFound,
}

/// Response for REALPATH
#[derive(Debug)]
pub struct RealpathResponse(OneShot<RealpathOutcome>);

impl RealpathResponse {
    pub fn new() -> Self {
        Self(OneShot::new(Event::Realpath))
    }

    pub fn send(
        &mut self,
        real_path: impl Into<String>,
        visible_path: impl Into<String>,
        attrs: Option<FileAttributes>,
    ) -> GateResult<()> {
        self.0.set(RealpathOutcome::Send {
            real_path: real_path.into(),
            visible_path: visible_path.into(),
            attrs,
        })
    }

    pub fn deny(&mut self) -> GateResult<()> {
        self.0.set(RealpathOutcome::Deny)
    }

    pub fn fail(&mut self) -> GateResult<()> {
        self.0.set(RealpathOutcome::Fail)
    }

    pub fn not_found(&mut self) -> GateResult<()> {
        self.0.set(RealpathOutcome::NotFound)
    }

    pub fn outcome(&self) -> Option<&RealpathOutcome> {
        self.0.value.as_ref()
    }

    pub fn into_outcome(self) -> Option<RealpathOutcome> {
        self.0.value
    }
}

impl Default for RealpathResponse {
    fn default() -> Self {
        Self::new()
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum OpenReadOutcome {
    /// Serve the file at this server path
    SendFile(String),
    Deny,
    Fail,
    NotFound,
}

/// Response for an open with read intent (READ event)
#[derive(Debug)]
pub struct OpenReadResponse(OneShot<OpenReadOutcome>);

impl OpenReadResponse {
    pub fn new() -> Self {
        Self(OneShot::new(Event::Read))
    }

    pub fn send_file(&mut self, path: impl Into<String>) -> GateResult<()> {
        self.0.set(OpenReadOutcome::SendFile(path.into()))
    }

    pub fn deny(&mut self) -> GateResult<()> {
        self.0.set(OpenReadOutcome::Deny)
    }

    pub fn fail(&mut self) -> GateResult<()> {
        self.0.set(OpenReadOutcome::Fail)
    }

    pub fn not_found(&mut self) -> GateResult<()> {
        self.0.set(OpenReadOutcome::NotFound)
    }

    pub fn outcome(&self) -> Option<&OpenReadOutcome> {
        self.0.value.as_ref()
    }

    pub fn into_outcome(self) -> Option<OpenReadOutcome> {
        self.0.value
    }
}

impl Default for OpenReadResponse {
    fn default() -> Self {
        Self::new()
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum OpenWriteOutcome {
    /// Store the upload at this server path
    ReceiveFile(String),
    Deny,
    Fail,
    NotFound,
}

/// Response for an open with write intent (WRITE event)
#[derive(Debug)]
pub struct OpenWriteResponse(OneShot<OpenWriteOutcome>);

impl OpenWriteResponse {
    pub fn new() -> Self {
        Self(OneShot::new(Event::Write))
    }

    pub fn receive_file(&mut self, path: impl Into<String>) -> GateResult<()> {
        self.0.set(OpenWriteOutcome::ReceiveFile(path.into()))
    }

    pub fn deny(&mut self) -> GateResult<()> {
        self.0.set(OpenWriteOutcome::Deny)
    }

    pub fn fail(&mut self) -> GateResult<()> {
        self.0.set(OpenWriteOutcome::Fail)
    }

    pub fn not_found(&mut self) -> GateResult<()> {
        self.0.set(OpenWriteOutcome::NotFound)
    }

    pub fn outcome(&self) -> Option<&OpenWriteOutcome> {
        self.0.value.as_ref()
    }

    pub fn into_outcome(self) -> Option<OpenWriteOutcome> {
        self.0.value
    }
}

impl Default for OpenWriteResponse {
    fn default() -> Self {
        Self::new()
    }
}

/// Any of the facades, as carried through the interceptor chain
#[derive(Debug)]
pub enum Response {
    Auth(AuthResponse),
    Mutation(MutationResponse),
    Listing(ListingResponse),
    Stat(StatResponse),
    Realpath(RealpathResponse),
    OpenRead(OpenReadResponse),
    OpenWrite(OpenWriteResponse),
}

impl Response {
    pub fn event(&self) -> Event {
        match self {
            Response::Auth(r) => r.0.event,
            Response::Mutation(r) => r.0.event,
            Response::Listing(r) => r.0.event,
            Response::Stat(r) => r.0.event,
            Response::Realpath(r) => r.0.event,
            Response::OpenRead(r) => r.0.event,
            Response::OpenWrite(r) => r.0.event,
        }
    }

    pub fn is_resolved(&self) -> bool {
        match self {
            Response::Auth(r) => r.0.value.is_some(),
            Response::Mutation(r) => r.0.value.is_some(),
            Response::Listing(r) => r.0.value.is_some(),
            Response::Stat(r) => r.0.value.is_some(),
            Response::Realpath(r) => r.0.value.is_some(),
            Response::OpenRead(r) => r.0.value.is_some(),
            Response::OpenWrite(r) => r.0.value.is_some(),
        }
    }

    /// Refuse the request whatever its verb
    pub fn deny(&mut self) -> GateResult<()> {
        match self {
            Response::Auth(r) => r.deny(),
            Response::Mutation(r) => r.deny(),
            Response::Listing(r) => r.deny(),
            Response::Stat(r) => r.deny(),
            Response::Realpath(r) => r.deny(),
            Response::OpenRead(r) => r.deny(),
            Response::OpenWrite(r) => r.deny(),
        }
    }

    /// Report a generic failure. Authentication has no failure outcome and
    /// is denied instead.
    pub fn fail(&mut self) -> GateResult<()> {
        match self {
            Response::Auth(r) => r.deny(),
            Response::Mutation(r) => r.fail(),
            Response::Listing(r) => r.fail(),
            Response::Stat(r) => r.fail(),
            Response::Realpath(r) => r.fail(),
            Response::OpenRead(r) => r.fail(),
            Response::OpenWrite(r) => r.fail(),
        }
    }

    pub fn into_auth(self) -> Option<AuthResponse> {
        match self {
            Response::Auth(r) => Some(r),
            _ => None,
        }
    }

    pub fn into_mutation(self) -> Option<MutationResponse> {
        match self {
            Response::Mutation(r) => Some(r),
            _ => None,
        }
    }

    pub fn into_listing(self) -> Option<ListingResponse> {
        match self {
            Response::Listing(r) => Some(r),
            _ => None,
        }
    }

    pub fn into_stat(self) -> Option<StatResponse> {
        match self {
            Response::Stat(r) => Some(r),
            _ => None,
        }
    }

    pub fn into_realpath(self) -> Option<RealpathResponse> {
        match self {
            Response::Realpath(r) => Some(r),
            _ => None,
        }
    }

    pub fn into_open_read(self) -> Option<OpenReadResponse> {
        match self {
            Response::OpenRead(r) => Some(r),
            _ => None,
        }
    }

    pub fn into_open_write(self) -> Option<OpenWriteResponse> {
        match self {
            Response::OpenWrite(r) => Some(r),
            _ => None,
        }
    }
}
