// Copyright 2025 Schelling Point Labs Inc
// SPDX-License-Identifier: AGPL-3.0-only

//! Ordered interceptor chain in front of the policy handlers

use crate::error::GateError;
use crate::policy::{deliver, PolicyHandler};
use crate::request::Request;
use crate::response::Response;
use async_trait::async_trait;
use futures::FutureExt;
use std::any::Any;
use std::fmt;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;

/// A middleware stage.
///
/// Calling `next.run` passes control to the following interceptor (or the
/// policy handler once the chain is exhausted). Returning without calling it
/// short-circuits the chain; whatever the interceptor did to the response
/// stands.
#[async_trait]
pub trait Interceptor: Send + Sync {
    async fn handle(
        &self,
        request: &mut Request,
        response: &mut Response,
        next: Next<'_>,
    ) -> anyhow::Result<()>;
}

/// Remainder of the chain after the current interceptor
pub struct Next<'a> {
    chain: &'a [Arc<dyn Interceptor>],
    terminal: &'a dyn PolicyHandler,
}

impl<'a> Next<'a> {
    pub async fn run(self, request: &mut Request, response: &mut Response) -> anyhow::Result<()> {
        match self.chain.split_first() {
            Some((head, rest)) => {
                let next = Next {
                    chain: rest,
                    terminal: self.terminal,
                };
                head.handle(request, response, next).await
            }
            None => {
                deliver(self.terminal, request, response).await;
                Ok(())
            }
        }
    }

    /// Interceptors still ahead of the policy handler
    pub fn remaining(&self) -> usize {
        self.chain.len()
    }
}

/// Interceptors in registration order
#[derive(Clone, Default)]
pub struct Pipeline {
    interceptors: Vec<Arc<dyn Interceptor>>,
}

impl fmt::Debug for Pipeline {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Pipeline")
            .field("interceptors", &self.interceptors.len())
            .finish()
    }
}

impl Pipeline {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, interceptor: Arc<dyn Interceptor>) {
        self.interceptors.push(interceptor);
    }

    pub fn len(&self) -> usize {
        self.interceptors.len()
    }

    pub fn is_empty(&self) -> bool {
        self.interceptors.is_empty()
    }

    /// Run one request through the chain and into `terminal`.
    ///
    /// Errors returned by an interceptor and panics anywhere in the chain are
    /// both reported as [`GateError::Pipeline`].
    pub async fn run(
        &self,
        terminal: &dyn PolicyHandler,
        request: &mut Request,
        response: &mut Response,
    ) -> Result<(), GateError> {
        let next = Next {
            chain: &self.interceptors,
            terminal,
        };
        match AssertUnwindSafe(next.run(request, response)).catch_unwind().await {
            Ok(Ok(())) => Ok(()),
            Ok(Err(err)) => Err(GateError::Pipeline(format!("{:#}", err))),
            Err(panic) => Err(GateError::Pipeline(format!(
                "handler panicked: {}",
                panic_message(&*panic)
            ))),
        }
    }
}

fn panic_message(panic: &(dyn Any + Send)) -> &str {
    if let Some(msg) = panic.downcast_ref::<&'static str>() {
        msg
    } else if let Some(msg) = panic.downcast_ref::<String>() {
        msg.as_str()
    } else {
        "non-string panic payload"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::request::{Event, RequestBody};
    use crate::response::{MutationOutcome, MutationResponse};
    use sftpgate_proto::RemoteInfo;
    use std::sync::Mutex;

    #[derive(Default)]
    struct Trace(Mutex<Vec<String>>);

    impl Trace {
        fn push(&self, entry: impl Into<String>) {
            self.0.lock().expect("trace lock").push(entry.into());
        }

        fn entries(&self) -> Vec<String> {
            self.0.lock().expect("trace lock").clone()
        }
    }

    struct Recording {
        name: &'static str,
        trace: Arc<Trace>,
        pass: bool,
    }

    #[async_trait]
    impl Interceptor for Recording {
        async fn handle(
            &self,
            request: &mut Request,
            response: &mut Response,
            next: Next<'_>,
        ) -> anyhow::Result<()> {
            self.trace.push(self.name);
            if !self.pass {
                response.deny()?;
                return Ok(());
            }
            next.run(request, response).await?;
            self.trace.push(format!("{}:after", self.name));
            Ok(())
        }
    }

    struct AllowingPolicy(Arc<Trace>);

    #[async_trait]
    impl PolicyHandler for AllowingPolicy {
        async fn remove(&self, _request: &Request, response: &mut MutationResponse) {
            self.0.push("policy");
            let _ = response.allow();
        }
    }

    struct Failing;

    #[async_trait]
    impl Interceptor for Failing {
        async fn handle(
            &self,
            _: &mut Request,
            _: &mut Response,
            _: Next<'_>,
        ) -> anyhow::Result<()> {
            anyhow::bail!("quota service unreachable")
        }
    }

    struct Panicking;

    #[async_trait]
    impl Interceptor for Panicking {
        async fn handle(
            &self,
            _: &mut Request,
            _: &mut Response,
            _: Next<'_>,
        ) -> anyhow::Result<()> {
            panic!("interceptor bug")
        }
    }

    fn remove_request() -> (Request, Response) {
        let remote = RemoteInfo::new("10.0.0.2:50000".parse().expect("addr"), "SSH-2.0-test");
        (
            Request::new(remote, "dave", RequestBody::Remove { path: "/tmp/x".into() }),
            Response::Mutation(MutationResponse::new(Event::Remove)),
        )
    }

    fn outcome(response: Response) -> Option<MutationOutcome> {
        response.into_mutation().and_then(|r| r.outcome())
    }

    #[tokio::test]
    async fn interceptors_run_in_registration_order() {
        let trace = Arc::new(Trace::default());
        let mut pipeline = Pipeline::new();
        for name in ["first", "second"] {
            pipeline.push(Arc::new(Recording {
                name,
                trace: trace.clone(),
                pass: true,
            }));
        }
        let policy = AllowingPolicy(trace.clone());
        let (mut request, mut response) = remove_request();

        pipeline
            .run(&policy, &mut request, &mut response)
            .await
            .expect("pipeline runs");

        assert_eq!(
            trace.entries(),
            vec!["first", "second", "policy", "second:after", "first:after"]
        );
        assert_eq!(outcome(response), Some(MutationOutcome::Allow));
    }

    #[tokio::test]
    async fn short_circuit_skips_later_stages() {
        let trace = Arc::new(Trace::default());
        let mut pipeline = Pipeline::new();
        pipeline.push(Arc::new(Recording {
            name: "gatekeeper",
            trace: trace.clone(),
            pass: false,
        }));
        pipeline.push(Arc::new(Recording {
            name: "unreached",
            trace: trace.clone(),
            pass: true,
        }));
        let policy = AllowingPolicy(trace.clone());
        let (mut request, mut response) = remove_request();

        pipeline
            .run(&policy, &mut request, &mut response)
            .await
            .expect("pipeline runs");

        assert_eq!(trace.entries(), vec!["gatekeeper"]);
        assert_eq!(outcome(response), Some(MutationOutcome::Deny));
    }

    #[tokio::test]
    async fn empty_chain_goes_straight_to_policy() {
        let trace = Arc::new(Trace::default());
        let pipeline = Pipeline::new();
        let policy = AllowingPolicy(trace.clone());
        let (mut request, mut response) = remove_request();

        pipeline
            .run(&policy, &mut request, &mut response)
            .await
            .expect("pipeline runs");
        assert_eq!(trace.entries(), vec!["policy"]);
    }

    #[tokio::test]
    async fn errors_and_panics_become_pipeline_faults() {
        let policy = AllowingPolicy(Arc::new(Trace::default()));

        let mut pipeline = Pipeline::new();
        pipeline.push(Arc::new(Failing));
        let (mut request, mut response) = remove_request();
        let err = pipeline
            .run(&policy, &mut request, &mut response)
            .await
            .expect_err("error propagates");
        assert!(err.to_string().contains("quota service unreachable"));
        assert!(!response.is_resolved());

        let mut pipeline = Pipeline::new();
        pipeline.push(Arc::new(Panicking));
        let (mut request, mut response) = remove_request();
        let err = pipeline
            .run(&policy, &mut request, &mut response)
            .await
            .expect_err("panic is caught");
        assert!(err.to_string().contains("interceptor bug"));
    }
}
