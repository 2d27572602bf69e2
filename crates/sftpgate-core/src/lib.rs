// Copyright 2025 Schelling Point Labs Inc
// SPDX-License-Identifier: AGPL-3.0-only

//! Session-level authorization and resource handles for an SFTP server.
//!
//! Every client operation is run through an ordered interceptor chain that
//! ends at an application [`PolicyHandler`]. The policy decides through a
//! one-shot response facade; the session then consults its handle table and
//! the [`FileStore`] to produce exactly one protocol reply.

pub mod config;
pub mod dispatch;
pub mod error;
pub mod gate;
pub mod handles;
pub mod interceptors;
pub mod pager;
pub mod pipeline;
pub mod policy;
pub mod request;
pub mod response;
pub mod session;
pub mod storage;

pub use config::GateConfig;
pub use dispatch::OpenIntent;
pub use error::{GateError, GateResult};
pub use gate::{AuthAttempt, Gate, GateBuilder};
pub use handles::{HandleKind, HandleMode, HandleState, HandleTable};
pub use interceptors::{AuditLog, ReadOnly};
pub use pager::DirectoryPager;
pub use pipeline::{Interceptor, Next, Pipeline};
pub use policy::{ConnectionDecision, PolicyHandler};
pub use request::{Event, Request, RequestBody};
pub use response::{
    AuthOutcome, AuthResponse, ListingOutcome, ListingResponse, MutationOutcome, MutationResponse,
    OpenReadOutcome, OpenReadResponse, OpenWriteOutcome, OpenWriteResponse, RealpathOutcome,
    RealpathResponse, Response, StatFields, StatOutcome, StatResponse,
};
pub use session::{Session, SessionInfo};
pub use storage::{FileHandle, FileStore, LocalFileStore};

// Re-export protocol types so policies need a single import
pub use sftpgate_proto as proto;
