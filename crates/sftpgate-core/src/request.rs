// Copyright 2025 Schelling Point Labs Inc
// SPDX-License-Identifier: AGPL-3.0-only

//! Requests as seen by interceptors and policy handlers

use sftpgate_proto::{AuthMethod, AuthRequest, FileAttributes, HandleId, RemoteInfo};
use std::fmt;

/// Named events a policy can subscribe to
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum Event {
    Auth,
    Rename,
    Remove,
    Mkdir,
    Rmdir,
    Opendir,
    Readdir,
    Close,
    Realpath,
    Stat,
    Lstat,
    Fstat,
    /// Open with read intent
    Read,
    /// Open with write intent
    Write,
    Setstat,
}

impl Event {
    pub fn name(self) -> &'static str {
        match self {
            Event::Auth => "Auth",
            Event::Rename => "RENAME",
            Event::Remove => "REMOVE",
            Event::Mkdir => "MKDIR",
            Event::Rmdir => "RMDIR",
            Event::Opendir => "OPENDIR",
            Event::Readdir => "READDIR",
            Event::Close => "CLOSE",
            Event::Realpath => "REALPATH",
            Event::Stat => "STAT",
            Event::Lstat => "LSTAT",
            Event::Fstat => "FSTAT",
            Event::Read => "READ",
            Event::Write => "WRITE",
            Event::Setstat => "SETSTAT",
        }
    }

    /// Events that change state on the server side
    pub fn is_mutation(self) -> bool {
        matches!(
            self,
            Event::Rename
                | Event::Remove
                | Event::Mkdir
                | Event::Rmdir
                | Event::Write
                | Event::Setstat
        )
    }

    /// Whether the dispatcher proceeds when no handler resolved the response.
    /// Only releasing a handle does; everything else fails.
    pub fn allows_when_unresolved(self) -> bool {
        matches!(self, Event::Close)
    }
}

impl fmt::Display for Event {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Verb-specific request payload
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum RequestBody {
    Auth(AuthRequest),
    Rename {
        path: String,
        target_path: String,
    },
    Remove {
        path: String,
    },
    Mkdir {
        path: String,
        attrs: FileAttributes,
    },
    Rmdir {
        path: String,
    },
    Opendir {
        path: String,
    },
    Readdir {
        handle: HandleId,
        /// Path the directory handle was opened on
        path: String,
    },
    Close {
        handle: HandleId,
        path: String,
    },
    Realpath {
        path: String,
    },
    Stat {
        path: String,
    },
    Lstat {
        path: String,
    },
    Fstat {
        handle: HandleId,
        path: String,
    },
    OpenRead {
        path: String,
        flags: String,
    },
    OpenWrite {
        path: String,
        flags: String,
        attrs: FileAttributes,
    },
    Setstat {
        path: String,
        attrs: FileAttributes,
    },
}

impl RequestBody {
    pub fn event(&self) -> Event {
        match self {
            RequestBody::Auth(_) => Event::Auth,
            RequestBody::Rename { .. } => Event::Rename,
            RequestBody::Remove { .. } => Event::Remove,
            RequestBody::Mkdir { .. } => Event::Mkdir,
            RequestBody::Rmdir { .. } => Event::Rmdir,
            RequestBody::Opendir { .. } => Event::Opendir,
            RequestBody::Readdir { .. } => Event::Readdir,
            RequestBody::Close { .. } => Event::Close,
            RequestBody::Realpath { .. } => Event::Realpath,
            RequestBody::Stat { .. } => Event::Stat,
            RequestBody::Lstat { .. } => Event::Lstat,
            RequestBody::Fstat { .. } => Event::Fstat,
            RequestBody::OpenRead { .. } => Event::Read,
            RequestBody::OpenWrite { .. } => Event::Write,
            RequestBody::Setstat { .. } => Event::Setstat,
        }
    }
}

/// A request flowing through the interceptor chain.
///
/// Interceptors may rewrite the body (e.g. map a client path onto a
/// different real path) before passing it on.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Request {
    pub remote: RemoteInfo,
    pub username: String,
    pub body: RequestBody,
}

impl Request {
    pub fn new(remote: RemoteInfo, username: impl Into<String>, body: RequestBody) -> Self {
        Self {
            remote,
            username: username.into(),
            body,
        }
    }

    pub fn event(&self) -> Event {
        self.body.event()
    }

    /// Primary path argument, if the verb carries one
    pub fn path(&self) -> Option<&str> {
        match &self.body {
            RequestBody::Auth(_) => None,
            RequestBody::Rename { path, .. }
            | RequestBody::Remove { path }
            | RequestBody::Mkdir { path, .. }
            | RequestBody::Rmdir { path }
            | RequestBody::Opendir { path }
            | RequestBody::Readdir { path, .. }
            | RequestBody::Close { path, .. }
            | RequestBody::Realpath { path }
            | RequestBody::Stat { path }
            | RequestBody::Lstat { path }
            | RequestBody::Fstat { path, .. }
            | RequestBody::OpenRead { path, .. }
            | RequestBody::OpenWrite { path, .. }
            | RequestBody::Setstat { path, .. } => Some(path),
        }
    }

    pub fn path_mut(&mut self) -> Option<&mut String> {
        match &mut self.body {
            RequestBody::Auth(_) => None,
            RequestBody::Rename { path, .. }
            | RequestBody::Remove { path }
            | RequestBody::Mkdir { path, .. }
            | RequestBody::Rmdir { path }
            | RequestBody::Opendir { path }
            | RequestBody::Readdir { path, .. }
            | RequestBody::Close { path, .. }
            | RequestBody::Realpath { path }
            | RequestBody::Stat { path }
            | RequestBody::Lstat { path }
            | RequestBody::Fstat { path, .. }
            | RequestBody::OpenRead { path, .. }
            | RequestBody::OpenWrite { path, .. }
            | RequestBody::Setstat { path, .. } => Some(path),
        }
    }

    pub fn target_path(&self) -> Option<&str> {
        match &self.body {
            RequestBody::Rename { target_path, .. } => Some(target_path),
            _ => None,
        }
    }

    pub fn handle(&self) -> Option<HandleId> {
        match &self.body {
            RequestBody::Readdir { handle, .. }
            | RequestBody::Close { handle, .. }
            | RequestBody::Fstat { handle, .. } => Some(*handle),
            _ => None,
        }
    }

    pub fn attrs(&self) -> Option<&FileAttributes> {
        match &self.body {
            RequestBody::Mkdir { attrs, .. }
            | RequestBody::OpenWrite { attrs, .. }
            | RequestBody::Setstat { attrs, .. } => Some(attrs),
            _ => None,
        }
    }

    pub fn flags(&self) -> Option<&str> {
        match &self.body {
            RequestBody::OpenRead { flags, .. } | RequestBody::OpenWrite { flags, .. } => {
                Some(flags)
            }
            _ => None,
        }
    }

    pub fn auth_method(&self) -> Option<AuthMethod> {
        match &self.body {
            RequestBody::Auth(auth) => Some(auth.method),
            _ => None,
        }
    }

    pub fn password(&self) -> Option<&str> {
        match &self.body {
            RequestBody::Auth(auth) => auth.password.as_deref(),
            _ => None,
        }
    }
}
