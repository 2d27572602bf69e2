// Copyright 2025 Schelling Point Labs Inc
// SPDX-License-Identifier: AGPL-3.0-only

//! The gate: shared configuration, interceptor chain and policy

use crate::config::GateConfig;
use crate::error::{GateError, GateResult};
use crate::pipeline::{Interceptor, Pipeline};
use crate::policy::{ConnectionDecision, PolicyHandler};
use crate::request::{Request, RequestBody};
use crate::response::{AuthOutcome, AuthResponse, Response};
use crate::session::Session;
use crate::storage::{FileStore, LocalFileStore};
use sftpgate_proto::{AuthRequest, AuthResult, RemoteInfo};
use std::fmt;
use std::sync::Arc;
use tracing::{debug, info, warn};

/// Assembles a [`Gate`]. Interceptors run in the order they are added.
pub struct GateBuilder {
    config: GateConfig,
    pipeline: Pipeline,
    policy: Arc<dyn PolicyHandler>,
    store: Arc<dyn FileStore>,
}

impl GateBuilder {
    pub fn new(policy: Arc<dyn PolicyHandler>) -> Self {
        Self {
            config: GateConfig::default(),
            pipeline: Pipeline::new(),
            policy,
            store: Arc::new(LocalFileStore),
        }
    }

    pub fn config(mut self, config: GateConfig) -> Self {
        self.config = config;
        self
    }

    pub fn store(mut self, store: Arc<dyn FileStore>) -> Self {
        self.store = store;
        self
    }

    pub fn interceptor(mut self, interceptor: impl Interceptor + 'static) -> Self {
        self.pipeline.push(Arc::new(interceptor));
        self
    }

    pub fn shared_interceptor(mut self, interceptor: Arc<dyn Interceptor>) -> Self {
        self.pipeline.push(interceptor);
        self
    }

    pub fn build(self) -> Arc<Gate> {
        info!(
            interceptors = self.pipeline.len(),
            methods = ?self.config.accepted_methods,
            "gate configured"
        );
        Arc::new(Gate {
            config: self.config,
            pipeline: self.pipeline,
            policy: self.policy,
            store: self.store,
        })
    }
}

/// Immutable once built; shared by every connection
pub struct Gate {
    config: GateConfig,
    pub(crate) pipeline: Pipeline,
    pub(crate) policy: Arc<dyn PolicyHandler>,
    pub(crate) store: Arc<dyn FileStore>,
}

impl fmt::Debug for Gate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Gate")
            .field("config", &self.config)
            .field("pipeline", &self.pipeline)
            .finish_non_exhaustive()
    }
}

/// Result of an authentication attempt
pub enum AuthAttempt {
    Accepted(Session),
    Rejected(AuthResult),
}

impl AuthAttempt {
    /// Answer to send back over the transport
    pub fn result(&self) -> AuthResult {
        match self {
            AuthAttempt::Accepted(session) => AuthResult::Accepted {
                username: session.username().to_string(),
            },
            AuthAttempt::Rejected(result) => result.clone(),
        }
    }
}

impl fmt::Debug for AuthAttempt {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AuthAttempt::Accepted(session) => {
                f.debug_tuple("Accepted").field(session.info()).finish()
            }
            AuthAttempt::Rejected(result) => f.debug_tuple("Rejected").field(result).finish(),
        }
    }
}

impl Gate {
    pub fn builder(policy: Arc<dyn PolicyHandler>) -> GateBuilder {
        GateBuilder::new(policy)
    }

    pub fn config(&self) -> &GateConfig {
        &self.config
    }

    pub fn interceptor_count(&self) -> usize {
        self.pipeline.len()
    }

    /// Connection admission, consulted once per transport connection
    pub async fn accept(&self, remote: &RemoteInfo) -> GateResult<()> {
        match self.policy.on_connection(remote).await {
            Some(ConnectionDecision::Reject) => {
                info!(remote = %remote, family = %remote.family(), "connection rejected by policy");
                Err(GateError::ConnectionRejected)
            }
            Some(ConnectionDecision::Accept) | None => {
                debug!(remote = %remote, client = %remote.client_ident, "connection accepted");
                Ok(())
            }
        }
    }

    /// Decide one authentication attempt. On success the returned session
    /// carries the final username, which cannot change afterwards.
    pub async fn authenticate(
        self: &Arc<Self>,
        remote: &RemoteInfo,
        attempt: AuthRequest,
    ) -> AuthAttempt {
        let method = attempt.method;
        if !self.config.accepts(method) {
            debug!(remote = %remote, method = %method, "authentication method not offered");
            return self.rejected();
        }

        let username = attempt.username.clone();
        let mut request =
            Request::new(remote.clone(), username.clone(), RequestBody::Auth(attempt));
        let mut response = Response::Auth(AuthResponse::new());
        if let Err(err) = self
            .pipeline
            .run(self.policy.as_ref(), &mut request, &mut response)
            .await
        {
            warn!(
                remote = %remote,
                user = %username,
                error = %err,
                "authentication pipeline failed"
            );
            self.policy.on_error(Some(remote), &err).await;
            return self.rejected();
        }

        let outcome = response.into_auth().and_then(AuthResponse::into_outcome);
        let final_name = match outcome {
            Some(AuthOutcome::Allow(renamed)) => renamed.unwrap_or(username),
            Some(AuthOutcome::Deny) => {
                info!(
                    remote = %remote,
                    user = %username,
                    method = %method,
                    "authentication denied"
                );
                return self.rejected();
            }
            None if self.config.allow_unhandled_auth => username,
            None => {
                info!(remote = %remote, user = %username, "authentication unresolved, rejecting");
                return self.rejected();
            }
        };

        info!(remote = %remote, user = %final_name, method = %method, "authenticated");
        AuthAttempt::Accepted(Session::new(self.clone(), remote.clone(), final_name))
    }

    /// Raise the `error` event for a fault outside the request pipeline,
    /// such as a broken transport
    pub async fn report_error(&self, remote: Option<&RemoteInfo>, error: &GateError) {
        match remote {
            Some(remote) => warn!(remote = %remote, error = %error, "connection error"),
            None => warn!(error = %error, "connection error"),
        }
        self.policy.on_error(remote, error).await;
    }

    fn rejected(&self) -> AuthAttempt {
        AuthAttempt::Rejected(AuthResult::Rejected {
            methods: self.config.accepted_methods.clone(),
        })
    }
}
