// Copyright 2025 Schelling Point Labs Inc
// SPDX-License-Identifier: AGPL-3.0-only

//! Ready-made policy serving a directory tree on the local filesystem.
//!
//! Every user is confined below a root directory (optionally a per-user
//! home inside it). Client paths are normalized before use, so `..` can
//! never climb out of the jail, and symlinks are resolved and checked
//! against the canonical jail before any filesystem call.

use async_trait::async_trait;
use sftpgate_core::proto::{AuthMethod, NameEntry, RemoteInfo};
use sftpgate_core::storage::attributes_from_metadata;
use sftpgate_core::{
    AuthResponse, GateError, ListingResponse, MutationResponse, OpenReadResponse, OpenWriteResponse,
    PolicyHandler, RealpathResponse, Request, SessionInfo, StatFields, StatResponse,
};
use std::collections::HashMap;
use std::io;
use std::path::{Component, Path, PathBuf};
use tracing::{debug, info, warn};

#[derive(Debug, Clone)]
pub struct JailedFsPolicy {
    root: PathBuf,
    per_user_homes: bool,
    passwords: HashMap<String, String>,
}

impl JailedFsPolicy {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self {
            root: root.into(),
            per_user_homes: false,
            passwords: HashMap::new(),
        }
    }

    /// Give each user their own directory `root/<username>`
    pub fn per_user_homes(mut self, enabled: bool) -> Self {
        self.per_user_homes = enabled;
        self
    }

    /// Register a password login. Once any password is registered, only
    /// registered users can log in.
    pub fn with_password(
        mut self,
        username: impl Into<String>,
        password: impl Into<String>,
    ) -> Self {
        self.passwords.insert(username.into(), password.into());
        self
    }

    fn jail_for(&self, username: &str) -> PathBuf {
        if self.per_user_homes {
            jail_join(&self.root, &normalize(username))
        } else {
            self.root.clone()
        }
    }

    async fn real_jail(&self, username: &str) -> io::Result<PathBuf> {
        tokio::fs::canonicalize(self.jail_for(username)).await
    }

    /// Host path for a client path of `request`'s user, with symlinks
    /// resolved. Unless `follow` is set the last component is left as is,
    /// for calls that act on a link itself or create a new entry.
    ///
    /// Fails with `PermissionDenied` when the resolved path lies outside
    /// the jail, and for dangling links.
    async fn confine(
        &self,
        request: &Request,
        client_path: &str,
        follow: bool,
    ) -> io::Result<PathBuf> {
        let jail = self.real_jail(&request.username).await?;
        let lexical = jail_join(&jail, &normalize(client_path));
        let resolved = if lexical == jail {
            jail.clone()
        } else if follow {
            match tokio::fs::canonicalize(&lexical).await {
                Ok(real) => real,
                Err(err) if err.kind() == io::ErrorKind::NotFound => {
                    if tokio::fs::symlink_metadata(&lexical).await.is_ok() {
                        return Err(outside_jail(&lexical));
                    }
                    resolve_parent(&lexical).await?
                }
                Err(err) => return Err(err),
            }
        } else {
            resolve_parent(&lexical).await?
        };
        if resolved.starts_with(&jail) {
            Ok(resolved)
        } else {
            Err(outside_jail(&lexical))
        }
    }

    async fn request_host_path(&self, request: &Request, follow: bool) -> io::Result<PathBuf> {
        match request.path() {
            Some(path) => self.confine(request, path, follow).await,
            None => Err(io::Error::new(io::ErrorKind::InvalidInput, "request carries no path")),
        }
    }
}

/// Collapse a client path into an absolute path without `.` or `..`
/// segments. `..` at the top stays at the top.
pub fn normalize(client_path: &str) -> String {
    let mut parts: Vec<&str> = Vec::new();
    for component in Path::new(client_path).components() {
        match component {
            Component::Normal(part) => {
                if let Some(part) = part.to_str() {
                    parts.push(part);
                }
            }
            Component::ParentDir => {
                parts.pop();
            }
            Component::RootDir | Component::CurDir | Component::Prefix(_) => {}
        }
    }
    format!("/{}", parts.join("/"))
}

fn jail_join(jail: &Path, normalized: &str) -> PathBuf {
    let relative = normalized.trim_start_matches('/');
    if relative.is_empty() {
        jail.to_path_buf()
    } else {
        jail.join(relative)
    }
}

fn display(path: &Path) -> String {
    path.to_string_lossy().into_owned()
}

fn stat_fields(meta: &std::fs::Metadata) -> StatFields {
    let attrs = attributes_from_metadata(meta);
    StatFields {
        permissions: attrs.permissions.unwrap_or(0),
        uid: attrs.uid.unwrap_or(0),
        gid: attrs.gid.unwrap_or(0),
        size: attrs.size.unwrap_or(0),
        atime: attrs.atime.unwrap_or(0),
        mtime: attrs.mtime.unwrap_or(0),
    }
}

/// Canonicalize everything but the last component of `path`
async fn resolve_parent(path: &Path) -> io::Result<PathBuf> {
    match (path.parent(), path.file_name()) {
        (Some(parent), Some(name)) => Ok(tokio::fs::canonicalize(parent).await?.join(name)),
        _ => Ok(path.to_path_buf()),
    }
}

fn outside_jail(path: &Path) -> io::Error {
    debug!(path = %path.display(), "path resolves outside the jail");
    io::Error::new(io::ErrorKind::PermissionDenied, "path resolves outside the jail")
}

/// Resolve a mutation from the outcome of a filesystem call
fn settle(response: &mut MutationResponse, request: &Request, result: io::Result<()>) {
    let resolved = match result {
        Ok(()) => response.allow(),
        Err(err) if err.kind() == io::ErrorKind::NotFound => response.not_found(),
        Err(err) if err.kind() == io::ErrorKind::PermissionDenied => response.deny(),
        Err(err) => {
            debug!(
                path = request.path().unwrap_or_default(),
                error = %err,
                event = %response.event(),
                "filesystem call failed"
            );
            response.fail()
        }
    };
    if let Err(err) = resolved {
        warn!(error = %err, "response already resolved upstream");
    }
}

fn stat_into(response: &mut StatResponse, result: io::Result<std::fs::Metadata>) {
    let resolved = match result {
        Ok(meta) if meta.is_dir() => response.send_directory(stat_fields(&meta)),
        Ok(meta) => response.send_file(stat_fields(&meta)),
        Err(err) if err.kind() == io::ErrorKind::NotFound => response.not_found(),
        Err(err) if err.kind() == io::ErrorKind::PermissionDenied => response.deny(),
        Err(_) => response.fail(),
    };
    if let Err(err) = resolved {
        warn!(error = %err, "response already resolved upstream");
    }
}

async fn set_attributes(path: &Path, request: &Request) -> io::Result<()> {
    let Some(attrs) = request.attrs() else {
        return Ok(());
    };
    if let Some(mode) = attrs.permissions {
        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            tokio::fs::set_permissions(path, std::fs::Permissions::from_mode(mode & 0o7777)).await?;
        }
        #[cfg(not(unix))]
        let _ = mode;
    }
    if let Some(size) = attrs.size {
        let file = tokio::fs::OpenOptions::new().write(true).open(path).await?;
        file.set_len(size).await?;
    }
    Ok(())
}

async fn list_directory(dir: &Path) -> io::Result<Vec<NameEntry>> {
    let mut entries = Vec::new();
    let mut reader = tokio::fs::read_dir(dir).await?;
    while let Some(entry) = reader.next_entry().await? {
        let name = entry.file_name().to_string_lossy().into_owned();
        // Entries may vanish between listing and stat
        match entry.metadata().await {
            Ok(meta) => entries.push(NameEntry::new(name, attributes_from_metadata(&meta))),
            Err(err) if err.kind() == io::ErrorKind::NotFound => continue,
            Err(err) => return Err(err),
        }
    }
    entries.sort_by(|a, b| a.filename.cmp(&b.filename));
    Ok(entries)
}

#[async_trait]
impl PolicyHandler for JailedFsPolicy {
    async fn on_auth(&self, request: &Request, response: &mut AuthResponse) {
        if self.passwords.is_empty() {
            // No credentials configured; the gate's fallback decides
            return;
        }
        let accepted = request.auth_method() == Some(AuthMethod::Password)
            && matches!(
                (self.passwords.get(&request.username), request.password()),
                (Some(expected), Some(given)) if expected == given
            );
        if !accepted {
            let _ = response.deny();
            return;
        }
        if self.per_user_homes {
            let home = self.jail_for(&request.username);
            if let Err(err) = tokio::fs::create_dir_all(&home).await {
                warn!(home = %home.display(), error = %err, "cannot create home directory");
                let _ = response.deny();
                return;
            }
        }
        let _ = response.allow(None);
    }

    async fn rename(&self, request: &Request, response: &mut MutationResponse) {
        let result = match (self.request_host_path(request, false).await, request.target_path()) {
            (Ok(from), Some(target)) => match self.confine(request, target, false).await {
                Ok(to) => tokio::fs::rename(&from, &to).await,
                Err(err) => Err(err),
            },
            (Ok(_), None) => Err(io::Error::new(io::ErrorKind::InvalidInput, "no rename target")),
            (Err(err), _) => Err(err),
        };
        settle(response, request, result);
    }

    async fn remove(&self, request: &Request, response: &mut MutationResponse) {
        let result = match self.request_host_path(request, false).await {
            Ok(path) => tokio::fs::remove_file(&path).await,
            Err(err) => Err(err),
        };
        settle(response, request, result);
    }

    async fn mkdir(&self, request: &Request, response: &mut MutationResponse) {
        let result = match self.request_host_path(request, false).await {
            Ok(path) => match tokio::fs::create_dir(&path).await {
                Ok(()) => set_attributes(&path, request).await,
                Err(err) => Err(err),
            },
            Err(err) => Err(err),
        };
        settle(response, request, result);
    }

    async fn rmdir(&self, request: &Request, response: &mut MutationResponse) {
        let result = match self.request_host_path(request, false).await {
            Ok(path) => tokio::fs::remove_dir(&path).await,
            Err(err) => Err(err),
        };
        settle(response, request, result);
    }

    async fn setstat(&self, request: &Request, response: &mut MutationResponse) {
        let result = match self.request_host_path(request, true).await {
            Ok(path) => set_attributes(&path, request).await,
            Err(err) => Err(err),
        };
        settle(response, request, result);
    }

    async fn opendir(&self, request: &Request, response: &mut MutationResponse) {
        let result = match self.request_host_path(request, true).await {
            Ok(path) => match tokio::fs::metadata(&path).await {
                Ok(meta) if meta.is_dir() => Ok(()),
                Ok(_) => Err(io::Error::other("not a directory")),
                Err(err) => Err(err),
            },
            Err(err) => Err(err),
        };
        settle(response, request, result);
    }

    async fn readdir(&self, request: &Request, response: &mut ListingResponse) {
        let listed = match self.request_host_path(request, true).await {
            Ok(path) => list_directory(&path).await,
            Err(err) => Err(err),
        };
        let resolved = match listed {
            Ok(entries) => response.send(entries),
            Err(err) if err.kind() == io::ErrorKind::NotFound => response.not_found(),
            Err(err) if err.kind() == io::ErrorKind::PermissionDenied => response.deny(),
            Err(err) => {
                debug!(path = request.path().unwrap_or_default(), error = %err, "listing failed");
                response.fail()
            }
        };
        if let Err(err) = resolved {
            warn!(error = %err, "response already resolved upstream");
        }
    }

    async fn realpath(&self, request: &Request, response: &mut RealpathResponse) {
        let client_path = request.path().unwrap_or("/");
        let jail = match self.real_jail(&request.username).await {
            Ok(jail) => jail,
            Err(_) => {
                let _ = response.fail();
                return;
            }
        };
        let real = match self.confine(request, client_path, true).await {
            Ok(real) => real,
            // Clients ask for paths they are about to create
            Err(err) if err.kind() == io::ErrorKind::NotFound => {
                jail_join(&jail, &normalize(client_path))
            }
            Err(err) if err.kind() == io::ErrorKind::PermissionDenied => {
                let _ = response.deny();
                return;
            }
            Err(_) => {
                let _ = response.fail();
                return;
            }
        };
        let visible = match real.strip_prefix(&jail) {
            Ok(relative) => normalize(&display(relative)),
            Err(_) => normalize(client_path),
        };
        let _ = response.send(display(&real), visible, None);
    }

    async fn stat(&self, request: &Request, response: &mut StatResponse) {
        let result = match self.request_host_path(request, true).await {
            Ok(path) => tokio::fs::metadata(&path).await,
            Err(err) => Err(err),
        };
        stat_into(response, result);
    }

    async fn lstat(&self, request: &Request, response: &mut StatResponse) {
        let result = match self.request_host_path(request, false).await {
            Ok(path) => tokio::fs::symlink_metadata(&path).await,
            Err(err) => Err(err),
        };
        stat_into(response, result);
    }

    async fn fstat(&self, request: &Request, response: &mut StatResponse) {
        let result = match self.request_host_path(request, true).await {
            Ok(path) => tokio::fs::metadata(&path).await,
            Err(err) => Err(err),
        };
        stat_into(response, result);
    }

    async fn read(&self, request: &Request, response: &mut OpenReadResponse) {
        let path = match self.request_host_path(request, true).await {
            Ok(path) => path,
            Err(err) => {
                let _ = match err.kind() {
                    io::ErrorKind::NotFound => response.not_found(),
                    io::ErrorKind::InvalidInput => response.fail(),
                    _ => response.deny(),
                };
                return;
            }
        };
        let resolved = match tokio::fs::metadata(&path).await {
            Ok(meta) if meta.is_dir() => response.fail(),
            Ok(_) => response.send_file(display(&path)),
            Err(err) if err.kind() == io::ErrorKind::NotFound => response.not_found(),
            Err(_) => response.deny(),
        };
        if let Err(err) = resolved {
            warn!(error = %err, "response already resolved upstream");
        }
    }

    async fn write(&self, request: &Request, response: &mut OpenWriteResponse) {
        let path = match self.request_host_path(request, true).await {
            Ok(path) => path,
            Err(err) => {
                let _ = match err.kind() {
                    io::ErrorKind::NotFound => response.not_found(),
                    io::ErrorKind::InvalidInput => response.fail(),
                    _ => response.deny(),
                };
                return;
            }
        };
        let parent_is_dir = match path.parent() {
            Some(parent) => tokio::fs::metadata(parent)
                .await
                .map(|meta| meta.is_dir())
                .unwrap_or(false),
            None => false,
        };
        let resolved = if parent_is_dir {
            response.receive_file(display(&path))
        } else {
            response.not_found()
        };
        if let Err(err) = resolved {
            warn!(error = %err, "response already resolved upstream");
        }
    }

    async fn on_disconnect(&self, session: &SessionInfo) {
        info!(user = %session.username, remote = %session.remote, "client disconnected");
    }

    async fn on_error(&self, remote: Option<&RemoteInfo>, error: &GateError) {
        match remote {
            Some(remote) => warn!(remote = %remote, error = %error, "session error"),
            None => warn!(error = %error, "session error"),
        }
    }
}
