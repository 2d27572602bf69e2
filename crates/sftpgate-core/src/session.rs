// Copyright 2025 Schelling Point Labs Inc
// SPDX-License-Identifier: AGPL-3.0-only

//! Authenticated session state and teardown

use crate::gate::Gate;
use crate::handles::HandleTable;
use sftpgate_proto::RemoteInfo;
use std::fmt;
use std::sync::Arc;
use tracing::{debug, info, warn};

/// Identity of an authenticated session
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct SessionInfo {
    pub remote: RemoteInfo,
    pub username: String,
}

/// One authenticated connection.
///
/// A session owns its handle table outright. Operations are taken one at a
/// time through `&mut self`, so there is no locking on the table.
pub struct Session {
    pub(crate) gate: Arc<Gate>,
    pub(crate) info: SessionInfo,
    pub(crate) handles: HandleTable,
}

impl fmt::Debug for Session {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Session")
            .field("info", &self.info)
            .field("open_handles", &self.handles.len())
            .finish()
    }
}

impl Session {
    pub(crate) fn new(gate: Arc<Gate>, remote: RemoteInfo, username: String) -> Self {
        Self {
            gate,
            info: SessionInfo { remote, username },
            handles: HandleTable::new(),
        }
    }

    pub fn info(&self) -> &SessionInfo {
        &self.info
    }

    pub fn username(&self) -> &str {
        &self.info.username
    }

    pub fn remote(&self) -> &RemoteInfo {
        &self.info.remote
    }

    pub fn handles(&self) -> &HandleTable {
        &self.handles
    }

    /// End the session: release every outstanding handle, closing file
    /// descriptors, then notify the policy. Consuming `self` makes this
    /// happen at most once.
    pub async fn close(mut self) {
        let outstanding = self.handles.drain();
        if !outstanding.is_empty() {
            debug!(
                user = %self.info.username,
                count = outstanding.len(),
                "releasing handles left open at disconnect"
            );
        }
        for (id, mut state) in outstanding {
            if let Some(file) = state.kind.file_mut() {
                if let Err(err) = file.close().await {
                    warn!(
                        handle = %id,
                        path = %state.path,
                        error = %err,
                        "close during teardown failed"
                    );
                }
            }
        }
        info!(user = %self.info.username, remote = %self.info.remote, "session ended");
        self.gate.policy.on_disconnect(&self.info).await;
    }
}
