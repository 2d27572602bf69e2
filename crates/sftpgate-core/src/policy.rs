// Copyright 2025 Schelling Point Labs Inc
// SPDX-License-Identifier: AGPL-3.0-only

//! Application policy: the terminal handlers at the end of the pipeline

use crate::error::GateError;
use crate::request::{Event, Request};
use crate::response::{
    AuthResponse, ListingResponse, MutationResponse, OpenReadResponse, OpenWriteResponse,
    RealpathResponse, Response, StatResponse,
};
use crate::session::SessionInfo;
use async_trait::async_trait;
use sftpgate_proto::RemoteInfo;

/// Verdict on an incoming connection
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ConnectionDecision {
    Accept,
    Reject,
}

/// Per-event policy handlers.
///
/// Every method has a no-op default. A handler that leaves its response
/// unresolved gets the gate's default for that event: CLOSE proceeds,
/// authentication follows `allow_unhandled_auth`, anything else fails.
#[async_trait]
pub trait PolicyHandler: Send + Sync {
    /// Called once per transport connection before authentication.
    /// `None` accepts.
    async fn on_connection(&self, _remote: &RemoteInfo) -> Option<ConnectionDecision> {
        None
    }

    async fn on_auth(&self, _request: &Request, _response: &mut AuthResponse) {}

    async fn rename(&self, _request: &Request, _response: &mut MutationResponse) {}

    async fn remove(&self, _request: &Request, _response: &mut MutationResponse) {}

    async fn mkdir(&self, _request: &Request, _response: &mut MutationResponse) {}

    async fn rmdir(&self, _request: &Request, _response: &mut MutationResponse) {}

    async fn setstat(&self, _request: &Request, _response: &mut MutationResponse) {}

    async fn opendir(&self, _request: &Request, _response: &mut MutationResponse) {}

    /// Supply the listing for a directory handle
    async fn readdir(&self, _request: &Request, _response: &mut ListingResponse) {}

    async fn close(&self, _request: &Request, _response: &mut MutationResponse) {}

    async fn realpath(&self, _request: &Request, _response: &mut RealpathResponse) {}

    async fn stat(&self, _request: &Request, _response: &mut StatResponse) {}

    async fn lstat(&self, _request: &Request, _response: &mut StatResponse) {}

    async fn fstat(&self, _request: &Request, _response: &mut StatResponse) {}

    /// A client opened a file for reading
    async fn read(&self, _request: &Request, _response: &mut OpenReadResponse) {}

    /// A client opened a file for writing
    async fn write(&self, _request: &Request, _response: &mut OpenWriteResponse) {}

    /// Called exactly once per authenticated session, after its handles
    /// have been released
    async fn on_disconnect(&self, _session: &SessionInfo) {}

    /// Called when a request faults inside the pipeline or the connection
    /// fails outside of it
    async fn on_error(&self, _remote: Option<&RemoteInfo>, _error: &GateError) {}
}

/// Hand a request to the policy method registered for its event
pub(crate) async fn deliver(
    policy: &dyn PolicyHandler,
    request: &Request,
    response: &mut Response,
) {
    match (request.event(), response) {
        (Event::Auth, Response::Auth(r)) => policy.on_auth(request, r).await,
        (Event::Rename, Response::Mutation(r)) => policy.rename(request, r).await,
        (Event::Remove, Response::Mutation(r)) => policy.remove(request, r).await,
        (Event::Mkdir, Response::Mutation(r)) => policy.mkdir(request, r).await,
        (Event::Rmdir, Response::Mutation(r)) => policy.rmdir(request, r).await,
        (Event::Setstat, Response::Mutation(r)) => policy.setstat(request, r).await,
        (Event::Opendir, Response::Mutation(r)) => policy.opendir(request, r).await,
        (Event::Close, Response::Mutation(r)) => policy.close(request, r).await,
        (Event::Readdir, Response::Listing(r)) => policy.readdir(request, r).await,
        (Event::Realpath, Response::Realpath(r)) => policy.realpath(request, r).await,
        (Event::Stat, Response::Stat(r)) => policy.stat(request, r).await,
        (Event::Lstat, Response::Stat(r)) => policy.lstat(request, r).await,
        (Event::Fstat, Response::Stat(r)) => policy.fstat(request, r).await,
        (Event::Read, Response::OpenRead(r)) => policy.read(request, r).await,
        (Event::Write, Response::OpenWrite(r)) => policy.write(request, r).await,
        (event, response) => {
            tracing::error!(
                event = %event,
                response = %response.event(),
                "request and response disagree on the event; leaving unresolved"
            );
        }
    }
}
