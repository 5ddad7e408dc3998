//! Source chain execution.
//!
//! [`SourceChainExecutor`] walks a [`SourceChain`] left to right, driving the
//! [`Capabilities`] bundle, and folds step results into an [`Outcome`].
//!
//! # Step results
//!
//! | Source | Success |
//! |--------|---------|
//! | network | response with a 2xx status |
//! | cache | stored response found (any status) |
//! | fetch handler | response with a 2xx status |
//! | race | first branch to succeed; a cache branch needs a 2xx hit |
//!
//! # Side effects
//!
//! Cache writes and the background tail of a stale-while-revalidate chain run
//! as tasks in a shared [`JoinSet`]. They never delay the outcome and are
//! awaited by [`SourceChainExecutor::drain`].

use crate::{
    Behavior, Capabilities, NetworkError, Outcome, RequestSnapshot, Response, RouterConfig,
    SourceChain, SourceKind, SourceStep,
};
use parking_lot::Mutex;
use std::future::Future;
use std::sync::Arc;
use tokio::task::{JoinError, JoinSet};

/// Result of one step, before the behavior policy is applied.
#[derive(Debug)]
enum StepResult {
    /// The step succeeded with this response.
    Success(Response),
    /// A response that does not count as success (non-2xx handler response,
    /// non-2xx cache hit inside a race).
    Unusable(Response),
    /// The network failed or answered with a non-2xx status.
    NetworkFailed {
        error: NetworkError,
        response: Option<Response>,
    },
    /// Cache miss, or the handler declined or failed.
    Miss,
}

impl StepResult {
    fn is_success(&self) -> bool {
        matches!(self, Self::Success(_))
    }

    fn response(&self) -> Option<&Response> {
        match self {
            Self::Success(r) | Self::Unusable(r) => Some(r),
            Self::NetworkFailed { response, .. } => response.as_ref(),
            Self::Miss => None,
        }
    }

    fn label(&self) -> &'static str {
        match self {
            Self::Success(_) => "success",
            Self::Unusable(_) => "unusable",
            Self::NetworkFailed { .. } => "network-error",
            Self::Miss => "miss",
        }
    }
}

/// Which side of a race a branch result came from.
#[derive(Debug, Clone, Copy)]
enum Branch {
    Network,
    Other,
}

/// Tracked background tasks.
#[derive(Debug, Default)]
struct BackgroundTasks {
    set: Mutex<JoinSet<()>>,
}

impl BackgroundTasks {
    fn spawn<F>(&self, task: F)
    where
        F: Future<Output = ()> + Send + 'static,
    {
        let mut set = self.set.lock();
        while let Some(finished) = set.try_join_next() {
            Self::report(finished);
        }
        set.spawn(task);
    }

    fn len(&self) -> usize {
        self.set.lock().len()
    }

    async fn drain(&self) {
        // Tasks may spawn more tasks, so keep taking the set until it stays empty.
        loop {
            let mut set = std::mem::take(&mut *self.set.lock());
            if set.is_empty() {
                return;
            }
            while let Some(finished) = set.join_next().await {
                Self::report(finished);
            }
        }
    }

    fn report(finished: Result<(), JoinError>) {
        if let Err(error) = finished {
            if error.is_panic() {
                tracing::warn!(%error, "background task panicked");
            }
        }
    }
}

/// Executes source chains against a capability bundle.
///
/// Cloning is cheap; clones share the background task set.
#[derive(Debug, Clone)]
pub struct SourceChainExecutor {
    capabilities: Capabilities,
    config: Arc<RouterConfig>,
    tasks: Arc<BackgroundTasks>,
}

impl SourceChainExecutor {
    /// Create an executor.
    pub fn new(capabilities: Capabilities, config: Arc<RouterConfig>) -> Self {
        Self {
            capabilities,
            config,
            tasks: Arc::default(),
        }
    }

    /// The capability bundle.
    #[must_use]
    pub fn capabilities(&self) -> &Capabilities {
        &self.capabilities
    }

    /// Number of background tasks not yet reaped.
    #[must_use]
    pub fn pending_tasks(&self) -> usize {
        self.tasks.len()
    }

    /// Wait for every background task, including tasks they spawn.
    pub async fn drain(&self) {
        self.tasks.drain().await;
    }

    /// Execute `chain` for `request`.
    ///
    /// # Behavior policy
    ///
    /// - `FinishWithSuccess`: success ends the chain; anything else falls through.
    /// - `ContinueDiscardingLatter`: success ends the chain and the remaining
    ///   steps run in the background. Anything else records the step's
    ///   response, if any, as the fallback and falls through.
    ///
    /// An exhausted chain yields the last recorded fallback, else the last network
    /// error seen, else [`Outcome::NoResult`].
    ///
    /// # Panics
    ///
    /// Must be polled inside a Tokio runtime.
    pub async fn execute(&self, chain: &SourceChain, request: &RequestSnapshot) -> Outcome {
        let steps = chain.steps();
        let mut best: Option<Response> = None;
        let mut network_error: Option<NetworkError> = None;

        for (index, step) in steps.iter().enumerate() {
            let result = self.run_step(step, request).await;
            tracing::trace!(
                step = index,
                kind = step.kind.label(),
                result = result.label(),
                "source step resolved"
            );

            match (step.behavior, result) {
                (Behavior::FinishWithSuccess, StepResult::Success(response)) => {
                    return Outcome::Response(response);
                }
                (Behavior::ContinueDiscardingLatter, StepResult::Success(response)) => {
                    let rest = &steps[index + 1..];
                    if !rest.is_empty() {
                        self.continue_in_background(rest.to_vec(), request.clone());
                    }
                    return Outcome::Response(response);
                }
                (behavior, result) => {
                    if behavior == Behavior::ContinueDiscardingLatter {
                        if let Some(response) = result.response() {
                            best = Some(response.clone());
                        }
                    }
                    if let StepResult::NetworkFailed { error, .. } = result {
                        network_error = Some(error);
                    }
                }
            }
        }

        match (best, network_error) {
            (Some(response), _) => Outcome::Response(response),
            (None, Some(error)) => Outcome::NetworkError(error),
            (None, None) => Outcome::NoResult,
        }
    }

    /// Run `steps` after the outcome is settled, for their side effects only.
    fn continue_in_background(&self, steps: Vec<SourceStep>, request: RequestSnapshot) {
        let this = self.clone();
        self.tasks.spawn(async move {
            for step in &steps {
                let result = this.run_step(step, &request).await;
                tracing::trace!(
                    kind = step.kind.label(),
                    result = result.label(),
                    "background step resolved"
                );
                if step.behavior == Behavior::FinishWithSuccess && result.is_success() {
                    break;
                }
            }
        });
    }

    async fn run_step(&self, step: &SourceStep, request: &RequestSnapshot) -> StepResult {
        match &step.kind {
            SourceKind::Network {
                update_cache_name,
                cache_error_response,
            } => {
                let result = self.fetch(request).await;
                if let (Some(cache_name), Some(response)) = (update_cache_name, result.response()) {
                    let write_errors =
                        cache_error_response.unwrap_or(self.config.cache_error_responses);
                    if response.is_ok() || write_errors {
                        self.schedule_cache_write(
                            cache_name.clone(),
                            request.clone(),
                            response.clone(),
                        );
                    }
                }
                result
            }
            SourceKind::Cache {
                cache_name,
                request_override,
            } => {
                let target = request_override.as_ref().unwrap_or(request);
                match self.lookup(cache_name.as_deref(), target).await {
                    Ok(Some(response)) => StepResult::Success(response),
                    Ok(None) => StepResult::Miss,
                    Err(error) => StepResult::NetworkFailed {
                        error,
                        response: None,
                    },
                }
            }
            SourceKind::FetchHandler { callback_id } => {
                self.invoke(request, callback_id.as_deref()).await
            }
            SourceKind::RaceNetworkAndHandler => {
                let this = self.clone();
                let req = request.clone();
                let handler = async move { this.invoke(&req, None).await };
                self.race(request, handler, "fetch-handler").await
            }
            SourceKind::RaceNetworkAndCache { cache_name } => {
                let this = self.clone();
                let req = request.clone();
                let cache_name = cache_name.clone();
                let cache = async move {
                    match this.lookup(cache_name.as_deref(), &req).await {
                        Ok(Some(response)) if response.is_ok() => StepResult::Success(response),
                        Ok(Some(response)) => StepResult::Unusable(response),
                        Ok(None) => StepResult::Miss,
                        Err(error) => StepResult::NetworkFailed {
                            error,
                            response: None,
                        },
                    }
                };
                self.race(request, cache, "cache").await
            }
        }
    }

    /// Race a network fetch against `other`.
    ///
    /// Both branches live in a [`JoinSet`] owned by this future. The first
    /// branch to succeed wins; returning, or dropping the future, aborts the
    /// other. When both fail the race fails with the network branch's error.
    async fn race<F>(
        &self,
        request: &RequestSnapshot,
        other: F,
        other_label: &'static str,
    ) -> StepResult
    where
        F: Future<Output = StepResult> + Send + 'static,
    {
        let this = self.clone();
        let req = request.clone();
        let mut branches = JoinSet::new();
        branches.spawn(async move { (Branch::Network, this.fetch(&req).await) });
        branches.spawn(async move { (Branch::Other, other.await) });

        let mut network_result = None;
        let mut other_result = None;
        while let Some(joined) = branches.join_next().await {
            let (branch, result) = match joined {
                Ok(finished) => finished,
                Err(error) => {
                    tracing::warn!(%error, "race branch did not finish");
                    continue;
                }
            };
            if result.is_success() {
                let winner = match branch {
                    Branch::Network => "network",
                    Branch::Other => other_label,
                };
                tracing::debug!(winner, "race decided");
                return result;
            }
            match branch {
                Branch::Network => network_result = Some(result),
                Branch::Other => other_result = Some(result),
            }
        }

        tracing::debug!(
            other = other_result.as_ref().map_or("aborted", StepResult::label),
            "race lost by both branches"
        );
        let error = match network_result {
            Some(StepResult::NetworkFailed { error, .. }) => error,
            Some(_) => NetworkError::Failed("no race branch succeeded".into()),
            None => NetworkError::Aborted("network branch did not finish".into()),
        };
        StepResult::NetworkFailed {
            error,
            response: None,
        }
    }

    async fn fetch(&self, request: &RequestSnapshot) -> StepResult {
        match self.timed(self.capabilities.network.fetch(request)).await {
            Ok(Ok(response)) if response.is_ok() => StepResult::Success(response),
            Ok(Ok(response)) => StepResult::NetworkFailed {
                error: NetworkError::Status(response.status),
                response: Some(response),
            },
            Ok(Err(error)) | Err(error) => StepResult::NetworkFailed {
                error,
                response: None,
            },
        }
    }

    async fn lookup(
        &self,
        cache_name: Option<&str>,
        request: &RequestSnapshot,
    ) -> Result<Option<Response>, NetworkError> {
        let cache_name = cache_name.unwrap_or(&self.config.default_cache_name);
        self.timed(self.capabilities.cache.lookup(cache_name, request))
            .await
    }

    async fn invoke(&self, request: &RequestSnapshot, callback_id: Option<&str>) -> StepResult {
        match self
            .timed(self.capabilities.handler.invoke(request, callback_id))
            .await
        {
            Ok(Ok(response)) if response.is_ok() => StepResult::Success(response),
            Ok(Ok(response)) => StepResult::Unusable(response),
            Ok(Err(error)) => {
                tracing::trace!(%error, "fetch handler produced no response");
                StepResult::Miss
            }
            Err(error) => StepResult::NetworkFailed {
                error,
                response: None,
            },
        }
    }

    async fn timed<F: Future>(&self, operation: F) -> Result<F::Output, NetworkError> {
        match self.config.operation_timeout() {
            Some(limit) => tokio::time::timeout(limit, operation)
                .await
                .map_err(|_| NetworkError::TimedOut),
            None => Ok(operation.await),
        }
    }

    fn schedule_cache_write(&self, cache_name: String, request: RequestSnapshot, response: Response) {
        let cache = Arc::clone(&self.capabilities.cache);
        self.tasks.spawn(async move {
            if let Err(error) = cache.put(&cache_name, &request, response).await {
                tracing::warn!(cache = %cache_name, %error, "cache write failed");
            }
        });
    }
}
