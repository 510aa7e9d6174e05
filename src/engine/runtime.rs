//! Routed execution runtime.
//!
//! Evaluation is fast and bounded; verification can run a solver for
//! seconds. This module provides a small, bounded, thread-based runtime
//! that routes requests into separate worker pools so a long proof never
//! delays a decision.

use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::Duration;

use crossbeam_channel::{bounded, Receiver, RecvTimeoutError, Sender, TrySendError};
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::compiler::CompiledManifest;
use crate::error::{ConfigError, GateError, GateResult, RuntimeError};
use crate::manifest::DomainManifest;
use crate::verifier::VerificationReport;

use super::{Decision, GovernanceEngine, Proposal};

/// Execution path selection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ExecutionPath {
    /// Proposal evaluation.
    Evaluation,
    /// Compilation with proofs, and verification reports.
    Verification,
}

impl ExecutionPath {
    const fn label(self) -> &'static str {
        match self {
            Self::Evaluation => "evaluation",
            Self::Verification => "verification",
        }
    }
}

/// Work accepted by [`GateRuntime`].
#[derive(Debug, Clone)]
pub enum GateRequest {
    /// Interpreted evaluation; honours temporal windows.
    Evaluate {
        /// Manifest to judge against.
        manifest: Arc<DomainManifest>,
        /// Proposal to judge.
        proposal: Proposal,
    },
    /// Vectorized evaluation against an already compiled manifest.
    EvaluateCompiled {
        /// Compiled manifest.
        compiled: Arc<CompiledManifest>,
        /// Proposal to judge.
        proposal: Proposal,
    },
    /// Compile through the engine's cache.
    Compile {
        /// Manifest to compile.
        manifest: Arc<DomainManifest>,
    },
    /// Full verification report.
    Verify {
        /// Manifest to verify.
        manifest: Arc<DomainManifest>,
    },
}

/// Result of a [`GateRequest`].
#[derive(Debug, Clone)]
pub enum GateResponse {
    /// From either evaluate request.
    Decision(Box<Decision>),
    /// From `Compile`.
    Compiled(Arc<CompiledManifest>),
    /// From `Verify`.
    Report(Box<VerificationReport>),
}

impl GateResponse {
    /// Returns the decision, if this is one.
    #[must_use]
    pub fn into_decision(self) -> Option<Decision> {
        match self {
            Self::Decision(d) => Some(*d),
            _ => None,
        }
    }

    /// Returns the verification report, if this is one.
    #[must_use]
    pub fn into_report(self) -> Option<VerificationReport> {
        match self {
            Self::Report(r) => Some(*r),
            _ => None,
        }
    }
}

/// Routes requests to an execution path.
pub trait RequestRouter: Send + Sync {
    /// Selects the execution path for the given request.
    fn route(&self, request: &GateRequest) -> ExecutionPath;
}

/// Default router.
///
/// Policy:
/// - `Evaluate` and `EvaluateCompiled` are Evaluation.
/// - `Compile` is Verification when the engine proves before compiling,
///   Evaluation otherwise.
/// - `Verify` is Verification.
#[derive(Debug, Default, Clone, Copy)]
pub struct DefaultRouter {
    compile_verifies: bool,
}

impl DefaultRouter {
    /// Router for an engine whose compiler does or does not verify.
    #[must_use]
    pub const fn new(compile_verifies: bool) -> Self {
        Self { compile_verifies }
    }
}

impl RequestRouter for DefaultRouter {
    fn route(&self, request: &GateRequest) -> ExecutionPath {
        match request {
            GateRequest::Evaluate { .. } | GateRequest::EvaluateCompiled { .. } => ExecutionPath::Evaluation,
            GateRequest::Compile { .. } if !self.compile_verifies => ExecutionPath::Evaluation,
            GateRequest::Compile { .. } | GateRequest::Verify { .. } => ExecutionPath::Verification,
        }
    }
}

/// Runtime configuration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RuntimeConfig {
    /// Number of evaluation workers.
    pub evaluation_workers: usize,
    /// Number of verification workers.
    pub verification_workers: usize,
    /// Maximum queued jobs per pool.
    pub queue_capacity: usize,
}

impl Default for RuntimeConfig {
    fn default() -> Self {
        Self {
            evaluation_workers: 2,
            verification_workers: 2,
            queue_capacity: 1024,
        }
    }
}

impl RuntimeConfig {
    /// Rejects empty pools and zero-capacity queues.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError::Invalid` naming the offending field.
    pub fn validate(&self) -> Result<(), ConfigError> {
        for (field, value) in [
            ("runtime.evaluation_workers", self.evaluation_workers),
            ("runtime.verification_workers", self.verification_workers),
            ("runtime.queue_capacity", self.queue_capacity),
        ] {
            if value == 0 {
                return Err(ConfigError::Invalid {
                    reason: format!("{field} must be at least 1"),
                });
            }
        }
        Ok(())
    }
}

enum Job {
    Execute {
        request: GateRequest,
        reply: Sender<GateResult<GateResponse>>,
    },

    #[cfg(test)]
    Sleep {
        duration: Duration,
        reply: Sender<()>,
    },
}

fn handle(engine: &GovernanceEngine, request: GateRequest) -> GateResult<GateResponse> {
    match request {
        GateRequest::Evaluate { manifest, proposal } => {
            let decision = engine.interpreted(manifest).trace_evaluate(&proposal)?;
            Ok(GateResponse::Decision(Box::new(decision)))
        }
        GateRequest::EvaluateCompiled { compiled, proposal } => {
            let decision = super::VectorizedEvaluator::new(compiled).trace_evaluate(&proposal)?;
            Ok(GateResponse::Decision(Box::new(decision)))
        }
        GateRequest::Compile { manifest } => engine.compile(&manifest).map(GateResponse::Compiled),
        GateRequest::Verify { manifest } => engine.verify(&manifest).map(|r| GateResponse::Report(Box::new(r))),
    }
}

struct WorkerPool {
    tx: Sender<Job>,
    workers: Vec<JoinHandle<()>>,
    queue_capacity: usize,
}

impl WorkerPool {
    fn start(path: ExecutionPath, workers: usize, queue_capacity: usize, engine: &Arc<GovernanceEngine>) -> GateResult<Self> {
        let workers = workers.max(1);
        let queue_capacity = queue_capacity.max(1);
        let (tx, rx) = bounded::<Job>(queue_capacity);

        let mut pool = Self {
            tx,
            workers: Vec::with_capacity(workers),
            queue_capacity,
        };
        for idx in 0..workers {
            let rx: Receiver<Job> = rx.clone();
            let engine = Arc::clone(engine);
            let thread_name = format!("rulegate-{}-{idx}", path.label());
            let spawned = thread::Builder::new().name(thread_name).spawn(move || loop {
                match rx.recv() {
                    Ok(Job::Execute { request, reply }) => {
                        let _ = reply.send(handle(&engine, request));
                    }
                    Err(_) => break,

                    #[cfg(test)]
                    Ok(Job::Sleep { duration, reply }) => {
                        thread::sleep(duration);
                        let _ = reply.send(());
                    }
                }
            });
            match spawned {
                Ok(worker) => pool.workers.push(worker),
                Err(err) => {
                    pool.shutdown();
                    return Err(GateError::internal(format!("failed to spawn {} worker: {err}", path.label())));
                }
            }
        }
        debug!(path = path.label(), workers, queue_capacity, "worker pool started");
        Ok(pool)
    }

    fn detached() -> Self {
        Self {
            tx: bounded::<Job>(1).0,
            workers: Vec::new(),
            queue_capacity: 1,
        }
    }

    fn try_submit(&self, job: Job, path: ExecutionPath) -> Result<(), RuntimeError> {
        match self.tx.try_send(job) {
            Ok(()) => Ok(()),
            Err(TrySendError::Full(_)) => Err(RuntimeError::QueueFull {
                path: path.label().to_string(),
                capacity: self.queue_capacity,
            }),
            Err(TrySendError::Disconnected(_)) => Err(RuntimeError::Disconnected {
                path: path.label().to_string(),
            }),
        }
    }

    fn shutdown(self) {
        // Closing the channel lets workers drain queued jobs, then exit.
        drop(self.tx);
        for worker in self.workers {
            let _ = worker.join();
        }
    }
}

/// Handle returned by [`GateRuntime::submit`].
pub struct ExecutionHandle {
    path: ExecutionPath,
    rx: Receiver<GateResult<GateResponse>>,
}

impl ExecutionHandle {
    /// Returns the path selected by the router.
    #[must_use]
    pub const fn path(&self) -> ExecutionPath {
        self.path
    }

    /// Waits for the request to complete.
    ///
    /// # Errors
    ///
    /// Returns the request's own error, or `RuntimeError::Disconnected` if
    /// the worker went away without replying.
    pub fn join(self) -> GateResult<GateResponse> {
        self.rx.recv().map_err(|_| {
            GateError::from(RuntimeError::Disconnected {
                path: self.path.label().to_string(),
            })
        })?
    }

    /// Waits for the request to complete with a timeout.
    ///
    /// # Errors
    ///
    /// As [`join`](Self::join), plus `RuntimeError::Timeout`.
    pub fn join_timeout(self, timeout: Duration) -> GateResult<GateResponse> {
        self.rx.recv_timeout(timeout).map_err(|err| match err {
            RecvTimeoutError::Timeout => GateError::from(RuntimeError::Timeout {
                duration_ms: u64::try_from(timeout.as_millis()).unwrap_or(u64::MAX),
            }),
            RecvTimeoutError::Disconnected => GateError::from(RuntimeError::Disconnected {
                path: self.path.label().to_string(),
            }),
        })?
    }
}

/// A routed runtime that keeps verification off the evaluation path.
pub struct GateRuntime<R: RequestRouter = DefaultRouter> {
    router: R,
    engine: Arc<GovernanceEngine>,
    evaluation: WorkerPool,
    verification: WorkerPool,
}

impl GateRuntime<DefaultRouter> {
    /// Creates a runtime with the default router, sized by the engine's
    /// runtime configuration.
    ///
    /// # Errors
    ///
    /// Returns an internal error if a worker thread cannot be spawned.
    pub fn new(engine: GovernanceEngine) -> GateResult<Self> {
        let router = DefaultRouter::new(engine.config().compiler.verify);
        Self::with_router(engine, router)
    }
}

impl<R: RequestRouter> GateRuntime<R> {
    /// Creates a runtime with a custom router.
    ///
    /// # Errors
    ///
    /// Returns an internal error if a worker thread cannot be spawned.
    pub fn with_router(engine: GovernanceEngine, router: R) -> GateResult<Self> {
        let config = engine.config().runtime.clone();
        let engine = Arc::new(engine);
        let evaluation = WorkerPool::start(
            ExecutionPath::Evaluation,
            config.evaluation_workers,
            config.queue_capacity,
            &engine,
        )?;
        let verification = match WorkerPool::start(
            ExecutionPath::Verification,
            config.verification_workers,
            config.queue_capacity,
            &engine,
        ) {
            Ok(pool) => pool,
            Err(err) => {
                evaluation.shutdown();
                return Err(err);
            }
        };
        Ok(Self {
            router,
            engine,
            evaluation,
            verification,
        })
    }

    fn pool(&self, path: ExecutionPath) -> &WorkerPool {
        match path {
            ExecutionPath::Evaluation => &self.evaluation,
            ExecutionPath::Verification => &self.verification,
        }
    }

    /// Queues a request on its routed path.
    ///
    /// # Errors
    ///
    /// Returns `RuntimeError::QueueFull` when the path's queue is at
    /// capacity, or `RuntimeError::Disconnected` if its workers are gone.
    pub fn submit(&self, request: GateRequest) -> GateResult<ExecutionHandle> {
        let path = self.router.route(&request);
        let (tx, rx) = bounded::<GateResult<GateResponse>>(1);
        self.pool(path).try_submit(Job::Execute { request, reply: tx }, path)?;
        Ok(ExecutionHandle { path, rx })
    }

    /// Runs a request on its routed path and waits for the result.
    ///
    /// # Errors
    ///
    /// As [`submit`](Self::submit) and [`ExecutionHandle::join`].
    pub fn execute(&self, request: GateRequest) -> GateResult<GateResponse> {
        self.submit(request)?.join()
    }

    /// Returns the underlying engine.
    #[must_use]
    pub fn engine(&self) -> &GovernanceEngine {
        &self.engine
    }

    #[cfg(test)]
    fn submit_sleep(&self, path: ExecutionPath, duration: Duration) -> GateResult<Receiver<()>> {
        let (tx, rx) = bounded::<()>(1);
        self.pool(path).try_submit(Job::Sleep { duration, reply: tx }, path)?;
        Ok(rx)
    }
}

impl<R: RequestRouter> Drop for GateRuntime<R> {
    fn drop(&mut self) {
        // Workers block on recv(), so joining is prompt once channels close.
        let evaluation = std::mem::replace(&mut self.evaluation, WorkerPool::detached());
        let verification = std::mem::replace(&mut self.verification, WorkerPool::detached());
        evaluation.shutdown();
        verification.shutdown();
    }
}
