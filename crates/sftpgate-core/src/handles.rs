// Copyright 2025 Schelling Point Labs Inc
// SPDX-License-Identifier: AGPL-3.0-only

//! Per-session table of open file and directory handles

use crate::error::{GateError, GateResult};
use crate::pager::DirectoryPager;
use crate::storage::FileHandle;
use sftpgate_proto::HandleId;
use std::collections::BTreeMap;

/// What a handle was opened for
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum HandleMode {
    OpenDirectory,
    ReadFile,
    WriteFile,
}

impl HandleMode {
    pub fn as_str(self) -> &'static str {
        match self {
            HandleMode::OpenDirectory => "directory",
            HandleMode::ReadFile => "read",
            HandleMode::WriteFile => "write",
        }
    }
}

#[derive(Debug)]
pub enum HandleKind {
    Directory(DirectoryPager),
    ReadFile {
        file: Box<dyn FileHandle>,
        /// Size recorded when the file was opened
        size: u64,
    },
    WriteFile {
        file: Box<dyn FileHandle>,
        /// Size the client declared at open, if any
        declared_size: Option<u64>,
    },
}

impl HandleKind {
    pub fn mode(&self) -> HandleMode {
        match self {
            HandleKind::Directory(_) => HandleMode::OpenDirectory,
            HandleKind::ReadFile { .. } => HandleMode::ReadFile,
            HandleKind::WriteFile { .. } => HandleMode::WriteFile,
        }
    }

    /// The descriptor behind a file handle
    pub fn file_mut(&mut self) -> Option<&mut Box<dyn FileHandle>> {
        match self {
            HandleKind::Directory(_) => None,
            HandleKind::ReadFile { file, .. } | HandleKind::WriteFile { file, .. } => Some(file),
        }
    }
}

/// One issued handle
#[derive(Debug)]
pub struct HandleState {
    /// Path as the client requested it
    pub path: String,
    /// Server path the policy resolved a file handle to
    pub real_path: Option<String>,
    /// User that opened the handle; fixed for the handle's lifetime
    pub owner: String,
    pub kind: HandleKind,
}

impl HandleState {
    pub fn directory(path: impl Into<String>, owner: impl Into<String>) -> Self {
        Self {
            path: path.into(),
            real_path: None,
            owner: owner.into(),
            kind: HandleKind::Directory(DirectoryPager::new()),
        }
    }

    pub fn read_file(
        path: impl Into<String>,
        real_path: impl Into<String>,
        owner: impl Into<String>,
        file: Box<dyn FileHandle>,
        size: u64,
    ) -> Self {
        Self {
            path: path.into(),
            real_path: Some(real_path.into()),
            owner: owner.into(),
            kind: HandleKind::ReadFile { file, size },
        }
    }

    pub fn write_file(
        path: impl Into<String>,
        real_path: impl Into<String>,
        owner: impl Into<String>,
        file: Box<dyn FileHandle>,
        declared_size: Option<u64>,
    ) -> Self {
        Self {
            path: path.into(),
            real_path: Some(real_path.into()),
            owner: owner.into(),
            kind: HandleKind::WriteFile {
                file,
                declared_size,
            },
        }
    }

    pub fn mode(&self) -> HandleMode {
        self.kind.mode()
    }
}

/// Handle table owned by a single session.
///
/// Ids come from a monotonically increasing counter and are never reissued,
/// even after release.
#[derive(Debug)]
pub struct HandleTable {
    next_id: u64,
    handles: BTreeMap<HandleId, HandleState>,
}

impl Default for HandleTable {
    fn default() -> Self {
        Self::new()
    }
}

impl HandleTable {
    pub fn new() -> Self {
        Self {
            next_id: 1,
            handles: BTreeMap::new(),
        }
    }

    #[cfg(test)]
    pub(crate) fn starting_at(next_id: u64) -> Self {
        Self {
            next_id,
            handles: BTreeMap::new(),
        }
    }

    /// Record `state` under a fresh id
    pub fn allocate(&mut self, state: HandleState) -> GateResult<HandleId> {
        let raw = u32::try_from(self.next_id).map_err(|_| GateError::TooManyHandles)?;
        self.next_id += 1;
        let id = HandleId::new(raw);
        self.handles.insert(id, state);
        Ok(id)
    }

    /// Look up a handle on behalf of `username`
    pub fn get(&self, id: HandleId, username: &str) -> GateResult<&HandleState> {
        let state = self.handles.get(&id).ok_or(GateError::UnknownHandle(id))?;
        check_owner(id, state, username)?;
        Ok(state)
    }

    pub fn get_mut(&mut self, id: HandleId, username: &str) -> GateResult<&mut HandleState> {
        let state = self
            .handles
            .get_mut(&id)
            .ok_or(GateError::UnknownHandle(id))?;
        check_owner(id, state, username)?;
        Ok(state)
    }

    /// Remove a handle, returning its state so the caller can close it
    pub fn release(&mut self, id: HandleId) -> Option<HandleState> {
        self.handles.remove(&id)
    }

    /// Remove every handle in id order
    pub fn drain(&mut self) -> Vec<(HandleId, HandleState)> {
        std::mem::take(&mut self.handles).into_iter().collect()
    }

    pub fn contains(&self, id: HandleId) -> bool {
        self.handles.contains_key(&id)
    }

    pub fn len(&self) -> usize {
        self.handles.len()
    }

    pub fn is_empty(&self) -> bool {
        self.handles.is_empty()
    }
}

fn check_owner(id: HandleId, state: &HandleState, username: &str) -> GateResult<()> {
    if state.owner != username {
        tracing::warn!(
            handle = %id,
            owner = %state.owner,
            user = %username,
            "handle used by a different user"
        );
        return Err(GateError::HandleOwnership { handle: id });
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ids_increase_and_are_never_reused() {
        let mut table = HandleTable::new();
        let a = table.allocate(HandleState::directory("/a", "alice")).expect("alloc a");
        let b = table.allocate(HandleState::directory("/b", "alice")).expect("alloc b");
        assert!(b > a);

        assert!(table.release(a).is_some());
        assert!(table.release(b).is_some());
        assert!(table.is_empty());

        let c = table.allocate(HandleState::directory("/c", "alice")).expect("alloc c");
        assert!(c > b);
        assert!(!table.contains(a));
    }

    #[test]
    fn foreign_user_is_refused() {
        let mut table = HandleTable::new();
        let id = table.allocate(HandleState::directory("/home/alice", "alice")).expect("alloc");

        assert!(table.get(id, "alice").is_ok());
        let err = table.get(id, "mallory").expect_err("foreign user");
        assert!(matches!(err, GateError::HandleOwnership { handle } if handle == id));
        assert!(matches!(
            table.get_mut(id, "mallory"),
            Err(GateError::HandleOwnership { .. })
        ));
        // A refused lookup leaves the handle in place
        assert!(table.contains(id));
    }

    #[test]
    fn unknown_id_is_reported() {
        let table = HandleTable::new();
        let err = table.get(HandleId::new(42), "alice").expect_err("unknown");
        assert!(matches!(err, GateError::UnknownHandle(id) if id == HandleId::new(42)));
    }

    #[test]
    fn drain_empties_in_id_order() {
        let mut table = HandleTable::new();
        for path in ["/x", "/y", "/z"] {
            table.allocate(HandleState::directory(path, "bob")).expect("alloc");
        }
        let drained = table.drain();
        let paths: Vec<_> = drained.iter().map(|(_, s)| s.path.as_str()).collect();
        assert_eq!(paths, vec!["/x", "/y", "/z"]);
        assert!(table.is_empty());
        assert!(table.drain().is_empty());
    }

    #[test]
    fn exhaustion_is_an_error_not_a_wrap() {
        let mut table = HandleTable::starting_at(u64::from(u32::MAX));
        let last = table.allocate(HandleState::directory("/last", "bob")).expect("last id");
        assert_eq!(last, HandleId::new(u32::MAX));
        let err = table
            .allocate(HandleState::directory("/overflow", "bob"))
            .expect_err("exhausted");
        assert!(matches!(err, GateError::TooManyHandles));
        assert_eq!(table.len(), 1);
    }
}
