// Copyright 2025 Schelling Point Labs Inc
// SPDX-License-Identifier: AGPL-3.0-only

//! Stock interceptors

use crate::pipeline::{Interceptor, Next};
use crate::request::Request;
use crate::response::Response;
use async_trait::async_trait;
use tracing::{debug, info};

/// Logs every request and whether it was resolved on the way back out
#[derive(Clone, Copy, Debug, Default)]
pub struct AuditLog;

#[async_trait]
impl Interceptor for AuditLog {
    async fn handle(
        &self,
        request: &mut Request,
        response: &mut Response,
        next: Next<'_>,
    ) -> anyhow::Result<()> {
        let event = request.event();
        info!(
            event = %event,
            user = %request.username,
            remote = %request.remote,
            path = request.path().unwrap_or(""),
            target = request.target_path().unwrap_or(""),
            "sftp request"
        );
        let result = next.run(request, response).await;
        debug!(event = %event, resolved = response.is_resolved(), "sftp request decided");
        result
    }
}

/// Refuses every mutating request before it reaches later stages
#[derive(Clone, Copy, Debug, Default)]
pub struct ReadOnly;

#[async_trait]
impl Interceptor for ReadOnly {
    async fn handle(
        &self,
        request: &mut Request,
        response: &mut Response,
        next: Next<'_>,
    ) -> anyhow::Result<()> {
        if request.event().is_mutation() {
            debug!(
                event = %request.event(),
                user = %request.username,
                "read-only gate refused mutation"
            );
            response.deny()?;
            return Ok(());
        }
        next.run(request, response).await
    }
}
