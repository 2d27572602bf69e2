// Copyright 2025 Schelling Point Labs Inc
// SPDX-License-Identifier: AGPL-3.0-only

//! Error types for sftpgate core

use sftpgate_proto::{HandleId, StatusCode, ValidationError};
use std::io;

/// Core gate error type
#[derive(thiserror::Error, Debug)]
pub enum GateError {
    #[error("unknown handle {0}")]
    UnknownHandle(HandleId),
    #[error("malformed handle string")]
    MalformedHandle,
    #[error("handle {handle} belongs to another user")]
    HandleOwnership { handle: HandleId },
    #[error("handle {handle} is not a {expected} handle")]
    WrongHandleKind {
        handle: HandleId,
        expected: &'static str,
    },
    #[error("handle id space exhausted")]
    TooManyHandles,
    #[error("{event} response already resolved")]
    AlreadyResolved { event: &'static str },
    #[error("pipeline fault: {0}")]
    Pipeline(String),
    #[error("invalid request: {0}")]
    Validation(#[from] ValidationError),
    #[error("connection rejected by policy")]
    ConnectionRejected,
    #[error("transport error: {0}")]
    Transport(String),
    #[error("io error: {0}")]
    Io(#[from] io::Error),
}

impl GateError {
    /// Protocol status reported to the client for this error
    pub fn status(&self) -> StatusCode {
        match self {
            GateError::HandleOwnership { .. } => StatusCode::PermissionDenied,
            GateError::Validation(_) => StatusCode::BadMessage,
            GateError::Io(err) => io_status(err),
            GateError::UnknownHandle(_)
            | GateError::MalformedHandle
            | GateError::WrongHandleKind { .. }
            | GateError::TooManyHandles
            | GateError::AlreadyResolved { .. }
            | GateError::Pipeline(_)
            | GateError::ConnectionRejected
            | GateError::Transport(_) => StatusCode::Failure,
        }
    }
}

/// Map a filesystem error onto the closest SFTP status
pub fn io_status(err: &io::Error) -> StatusCode {
    match err.kind() {
        io::ErrorKind::NotFound => StatusCode::NoSuchFile,
        io::ErrorKind::PermissionDenied => StatusCode::PermissionDenied,
        _ => StatusCode::Failure,
    }
}

pub type GateResult<T> = Result<T, GateError>;
