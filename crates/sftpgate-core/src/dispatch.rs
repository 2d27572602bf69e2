// Copyright 2025 Schelling Point Labs Inc
// SPDX-License-Identifier: AGPL-3.0-only

//! Operation dispatcher: maps each SFTP verb onto the pipeline, the handle
//! table and the file store, and turns the outcome into a reply

use crate::error::{io_status, GateError, GateResult};
use crate::handles::{HandleKind, HandleMode, HandleState};
use crate::request::{Event, Request, RequestBody};
use crate::response::{
    ListingOutcome, ListingResponse, MutationOutcome, MutationResponse, OpenReadOutcome,
    OpenReadResponse, OpenWriteOutcome, OpenWriteResponse, RealpathOutcome, RealpathResponse,
    Response, StatOutcome, StatResponse,
};
use crate::session::Session;
use sftpgate_proto::{
    validate_operation, FileAttributes, HandleId, NameEntry, Operation, Reply, StatusCode, Verb,
};
use std::io;
use tracing::{debug, warn, Instrument};

/// What an open request asks for, read from its flag string
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum OpenIntent {
    Read,
    Write,
}

impl OpenIntent {
    /// Write wins when both are present; neither is unusable
    pub fn from_flags(flags: &str) -> Option<Self> {
        if flags.contains('w') {
            Some(OpenIntent::Write)
        } else if flags.contains('r') {
            Some(OpenIntent::Read)
        } else {
            None
        }
    }
}

enum StatTarget {
    Path(String),
    Handle(Vec<u8>),
}

/// Long name reported for a resolved path
pub fn realpath_longname(owner: &str, visible_path: &str) -> String {
    format!("-rwxr-xr-x 1 {owner} {owner} 0 Jan 1 00:00 {visible_path}")
}

fn status(code: StatusCode) -> Reply {
    Reply::Status(code)
}

impl Session {
    /// Handle one decoded operation and produce exactly one reply
    pub async fn dispatch(&mut self, operation: Operation) -> Reply {
        let verb = operation.verb();
        let span = tracing::debug_span!("sftp_op", verb = %verb, user = %self.info.username);
        async move {
            if let Err(err) = validate_operation(&operation) {
                warn!(error = %err, "rejecting malformed request");
                return status(GateError::from(err).status());
            }
            let reply = self.route(operation).await;
            debug!(status = ?reply.status(), "replied");
            reply
        }
        .instrument(span)
        .await
    }

    async fn route(&mut self, operation: Operation) -> Reply {
        let verb = operation.verb();
        match operation {
            Operation::Open { path, flags, attrs } => self.open(path, flags, attrs).await,
            Operation::Close { handle } => self.close_handle(&handle).await,
            Operation::Read {
                handle,
                offset,
                len,
            } => self.read(&handle, offset, len).await,
            Operation::Write {
                handle,
                offset,
                data,
            } => self.write(&handle, offset, &data).await,
            Operation::Opendir { path } => self.opendir(path).await,
            Operation::Readdir { handle } => self.readdir(&handle).await,
            Operation::Realpath { path } => self.realpath(path).await,
            Operation::Stat { path } => self.stat(Event::Stat, StatTarget::Path(path)).await,
            Operation::Lstat { path } => self.stat(Event::Lstat, StatTarget::Path(path)).await,
            Operation::Fstat { handle } => {
                self.stat(Event::Fstat, StatTarget::Handle(handle)).await
            }
            Operation::Rename { path, target_path } => {
                self.mutation(RequestBody::Rename { path, target_path }).await
            }
            Operation::Remove { path } => self.mutation(RequestBody::Remove { path }).await,
            Operation::Mkdir { path, attrs } => {
                self.mutation(RequestBody::Mkdir { path, attrs }).await
            }
            Operation::Rmdir { path } => self.mutation(RequestBody::Rmdir { path }).await,
            Operation::Setstat { path, attrs } => {
                self.mutation(RequestBody::Setstat { path, attrs }).await
            }
            Operation::Fsetstat { .. }
            | Operation::Readlink { .. }
            | Operation::Symlink { .. }
            | Operation::Extended { .. } => unsupported(verb),
        }
    }

    /// Run a request through the interceptor chain. Faults are reported to
    /// the policy and come back as `Err`.
    async fn run_pipeline(
        &self,
        body: RequestBody,
        mut response: Response,
    ) -> GateResult<Response> {
        let mut request = Request::new(self.info.remote.clone(), self.info.username.clone(), body);
        let gate = &self.gate;
        match gate
            .pipeline
            .run(gate.policy.as_ref(), &mut request, &mut response)
            .await
        {
            Ok(()) => Ok(response),
            Err(err) => {
                warn!(event = %request.event(), error = %err, "request faulted in pipeline");
                gate.policy.on_error(Some(&self.info.remote), &err).await;
                Err(err)
            }
        }
    }

    fn issue(&mut self, state: HandleState) -> Reply {
        let path = state.path.clone();
        let mode = state.mode();
        match self.handles.allocate(state) {
            Ok(id) => {
                debug!(handle = %id, path = %path, mode = mode.as_str(), "handle issued");
                Reply::Handle(id.to_bytes())
            }
            Err(err) => {
                warn!(path = %path, error = %err, "could not issue handle");
                status(err.status())
            }
        }
    }

    fn parse_handle(raw: &[u8]) -> GateResult<HandleId> {
        HandleId::from_bytes(raw).ok_or(GateError::MalformedHandle)
    }

    fn lookup(&mut self, raw: &[u8]) -> GateResult<(HandleId, &mut HandleState)> {
        let id = Self::parse_handle(raw)?;
        let state = self.handles.get_mut(id, &self.info.username)?;
        Ok((id, state))
    }

    async fn mutation(&self, body: RequestBody) -> Reply {
        let event = body.event();
        let response = Response::Mutation(MutationResponse::new(event));
        let Ok(response) = self.run_pipeline(body, response).await else {
            return status(StatusCode::Failure);
        };
        match response.into_mutation().and_then(|r| r.outcome()) {
            Some(outcome) => status(outcome.status()),
            None => unresolved(event),
        }
    }

    async fn open(&mut self, path: String, flags: String, attrs: FileAttributes) -> Reply {
        let Some(intent) = OpenIntent::from_flags(&flags) else {
            debug!(path = %path, flags = %flags, "open flags carry neither read nor write");
            return status(StatusCode::Failure);
        };
        match intent {
            OpenIntent::Read => self.open_read(path, flags).await,
            OpenIntent::Write => self.open_write(path, flags, attrs).await,
        }
    }

    async fn open_read(&mut self, path: String, flags: String) -> Reply {
        let body = RequestBody::OpenRead {
            path: path.clone(),
            flags,
        };
        let response = Response::OpenRead(OpenReadResponse::new());
        let Ok(response) = self.run_pipeline(body, response).await else {
            return status(StatusCode::Failure);
        };
        match response.into_open_read().and_then(OpenReadResponse::into_outcome) {
            Some(OpenReadOutcome::SendFile(target)) => {
                match self.gate.store.open_read(&target).await {
                    Ok((file, size)) => {
                        let owner = self.info.username.clone();
                        self.issue(HandleState::read_file(path, target, owner, file, size))
                    }
                    Err(err) => {
                        warn!(path = %target, error = %err, "open for read failed");
                        status(io_status(&err))
                    }
                }
            }
            Some(OpenReadOutcome::Deny) => status(StatusCode::PermissionDenied),
            Some(OpenReadOutcome::Fail) => status(StatusCode::Failure),
            Some(OpenReadOutcome::NotFound) => status(StatusCode::NoSuchFile),
            None => unresolved(Event::Read),
        }
    }

    async fn open_write(&mut self, path: String, flags: String, attrs: FileAttributes) -> Reply {
        let declared_size = attrs.size;
        let body = RequestBody::OpenWrite {
            path: path.clone(),
            flags,
            attrs,
        };
        let response = Response::OpenWrite(OpenWriteResponse::new());
        let Ok(response) = self.run_pipeline(body, response).await else {
            return status(StatusCode::Failure);
        };
        match response.into_open_write().and_then(OpenWriteResponse::into_outcome) {
            Some(OpenWriteOutcome::ReceiveFile(target)) => {
                match self.gate.store.open_write(&target).await {
                    Ok(file) => {
                        let owner = self.info.username.clone();
                        self.issue(HandleState::write_file(
                            path,
                            target,
                            owner,
                            file,
                            declared_size,
                        ))
                    }
                    Err(err) => {
                        warn!(path = %target, error = %err, "open for write failed");
                        status(io_status(&err))
                    }
                }
            }
            Some(OpenWriteOutcome::Deny) => status(StatusCode::PermissionDenied),
            Some(OpenWriteOutcome::Fail) => status(StatusCode::Failure),
            Some(OpenWriteOutcome::NotFound) => status(StatusCode::NoSuchFile),
            None => unresolved(Event::Write),
        }
    }

    /// Data-plane read on a handle opened for reading. Authorization
    /// happened when the handle was opened.
    async fn read(&mut self, raw: &[u8], offset: u64, len: u32) -> Reply {
        let max_len = self.gate.config().max_read_len;
        let (id, state) = match self.lookup(raw) {
            Ok(found) => found,
            Err(err) => return status(err.status()),
        };
        let HandleKind::ReadFile { file, size } = &mut state.kind else {
            return wrong_kind(id, state.mode(), HandleMode::ReadFile);
        };
        if offset >= *size {
            return status(StatusCode::Eof);
        }
        let want = u64::from(len.min(max_len)).min(*size - offset);
        if want == 0 {
            return Reply::Data(Vec::new());
        }
        let want = usize::try_from(want).unwrap_or(usize::MAX);
        match file.read_at(offset, want).await {
            Ok(data) if data.is_empty() => status(StatusCode::Eof),
            Ok(data) => Reply::Data(data),
            Err(err) => {
                warn!(handle = %id, offset, error = %err, "read failed");
                status(StatusCode::Failure)
            }
        }
    }

    async fn write(&mut self, raw: &[u8], offset: u64, data: &[u8]) -> Reply {
        let (id, state) = match self.lookup(raw) {
            Ok(found) => found,
            Err(err) => return status(err.status()),
        };
        let HandleKind::WriteFile { file, .. } = &mut state.kind else {
            return wrong_kind(id, state.mode(), HandleMode::WriteFile);
        };
        match file.write_at(offset, data).await {
            Ok(()) => Reply::ok(),
            Err(err) => {
                warn!(handle = %id, offset, error = %err, "write failed");
                status(StatusCode::Failure)
            }
        }
    }

    async fn close_handle(&mut self, raw: &[u8]) -> Reply {
        let (id, path) = match self.lookup(raw) {
            Ok((id, state)) => (id, state.path.clone()),
            Err(err) => return status(err.status()),
        };
        let body = RequestBody::Close { handle: id, path };
        let response = Response::Mutation(MutationResponse::new(Event::Close));
        let Ok(response) = self.run_pipeline(body, response).await else {
            return status(StatusCode::Failure);
        };
        match response.into_mutation().and_then(|r| r.outcome()) {
            Some(MutationOutcome::Allow) | None => {}
            Some(refused) => return status(refused.status()),
        }

        let Some(mut state) = self.handles.release(id) else {
            return status(StatusCode::Failure);
        };
        let Some(file) = state.kind.file_mut() else {
            debug!(handle = %id, "directory handle closed");
            return Reply::ok();
        };
        match file.close().await {
            Ok(()) => {
                debug!(handle = %id, path = %state.path, "file handle closed");
                Reply::ok()
            }
            Err(err) => {
                warn!(handle = %id, path = %state.path, error = %err, "close failed");
                status(io_status(&err))
            }
        }
    }

    async fn opendir(&mut self, path: String) -> Reply {
        let body = RequestBody::Opendir { path: path.clone() };
        let response = Response::Mutation(MutationResponse::new(Event::Opendir));
        let Ok(response) = self.run_pipeline(body, response).await else {
            return status(StatusCode::Failure);
        };
        match response.into_mutation().and_then(|r| r.outcome()) {
            Some(MutationOutcome::Allow) => {
                let owner = self.info.username.clone();
                self.issue(HandleState::directory(path, owner))
            }
            Some(refused) => status(refused.status()),
            None => unresolved(Event::Opendir),
        }
    }

    async fn readdir(&mut self, raw: &[u8]) -> Reply {
        let (id, path) = {
            let (id, state) = match self.lookup(raw) {
                Ok(found) => found,
                Err(err) => return status(err.status()),
            };
            let HandleKind::Directory(pager) = &mut state.kind else {
                return wrong_kind(id, state.mode(), HandleMode::OpenDirectory);
            };
            if pager.is_primed() {
                return match pager.next_entry() {
                    Some(entry) => Reply::Name(vec![entry]),
                    None => status(StatusCode::Eof),
                };
            }
            (id, state.path.clone())
        };

        let body = RequestBody::Readdir { handle: id, path };
        let Ok(response) = self
            .run_pipeline(body, Response::Listing(ListingResponse::new()))
            .await
        else {
            return status(StatusCode::Failure);
        };
        match response.into_listing().and_then(ListingResponse::into_outcome) {
            Some(ListingOutcome::Send(entries)) => self.prime_listing(id, entries),
            Some(ListingOutcome::Deny) => status(StatusCode::PermissionDenied),
            Some(ListingOutcome::Fail) => status(StatusCode::Failure),
            Some(ListingOutcome::NotFound) => status(StatusCode::NoSuchFile),
            None => unresolved(Event::Readdir),
        }
    }

    fn prime_listing(&mut self, id: HandleId, entries: Vec<NameEntry>) -> Reply {
        let count = entries.len();
        let state = match self.handles.get_mut(id, &self.info.username) {
            Ok(state) => state,
            Err(err) => return status(err.status()),
        };
        let HandleKind::Directory(pager) = &mut state.kind else {
            return wrong_kind(id, state.mode(), HandleMode::OpenDirectory);
        };
        debug!(handle = %id, entries = count, "directory listing buffered");
        match pager.prime(entries) {
            Some(first) => Reply::Name(vec![first]),
            None => status(StatusCode::Eof),
        }
    }

    async fn realpath(&self, path: String) -> Reply {
        let Ok(response) = self
            .run_pipeline(
                RequestBody::Realpath { path },
                Response::Realpath(RealpathResponse::new()),
            )
            .await
        else {
            return status(StatusCode::Failure);
        };
        match response.into_realpath().and_then(RealpathResponse::into_outcome) {
            Some(RealpathOutcome::Send {
                real_path,
                visible_path,
                attrs,
            }) => {
                let attrs = match attrs {
                    Some(attrs) => attrs,
                    None => match self.gate.store.metadata(&real_path).await {
                        Ok(attrs) => attrs,
                        Err(err) if err.kind() == io::ErrorKind::NotFound => {
                            return status(StatusCode::NoSuchFile);
                        }
                        Err(err) => {
                            warn!(path = %real_path, error = %err, "stat of resolved path failed");
                            return status(io_status(&err));
                        }
                    },
                };
                let longname = realpath_longname(&self.info.username, &visible_path);
                Reply::Name(vec![NameEntry::with_longname(visible_path, longname, attrs)])
            }
            Some(RealpathOutcome::Deny) => status(StatusCode::PermissionDenied),
            Some(RealpathOutcome::Fail) => status(StatusCode::Failure),
            Some(RealpathOutcome::NotFound) => status(StatusCode::NoSuchFile),
            None => unresolved(Event::Realpath),
        }
    }

    async fn stat(&mut self, event: Event, target: StatTarget) -> Reply {
        let body = match (event, target) {
            (Event::Stat, StatTarget::Path(path)) => RequestBody::Stat { path },
            (Event::Lstat, StatTarget::Path(path)) => RequestBody::Lstat { path },
            (_, StatTarget::Handle(raw)) => match self.lookup(&raw) {
                Ok((handle, state)) => RequestBody::Fstat {
                    handle,
                    path: state.path.clone(),
                },
                Err(GateError::HandleOwnership { .. }) => {
                    return status(StatusCode::PermissionDenied);
                }
                Err(_) => return status(StatusCode::NoSuchFile),
            },
            (_, StatTarget::Path(path)) => RequestBody::Stat { path },
        };
        let event = body.event();
        let Ok(response) = self
            .run_pipeline(body, Response::Stat(StatResponse::new(event)))
            .await
        else {
            return status(StatusCode::Failure);
        };
        match response.into_stat().and_then(StatResponse::into_outcome) {
            Some(StatOutcome::Send(attrs)) => Reply::Attrs(attrs),
            Some(StatOutcome::Deny) => status(StatusCode::PermissionDenied),
            Some(StatOutcome::Fail) => status(StatusCode::Failure),
            Some(StatOutcome::NotFound) => status(StatusCode::NoSuchFile),
            None => unresolved(event),
        }
    }
}

fn wrong_kind(handle: HandleId, found: HandleMode, expected: HandleMode) -> Reply {
    let err = GateError::WrongHandleKind {
        handle,
        expected: expected.as_str(),
    };
    debug!(handle = %handle, mode = found.as_str(), error = %err, "handle used for the wrong verb");
    status(err.status())
}

fn unresolved(event: Event) -> Reply {
    if event.allows_when_unresolved() {
        return Reply::ok();
    }
    warn!(event = %event, "no handler resolved the request");
    status(StatusCode::Failure)
}

fn unsupported(verb: Verb) -> Reply {
    warn!(verb = %verb, "operation not implemented");
    status(StatusCode::OpUnsupported)
}
