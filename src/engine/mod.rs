//! Evaluation engine.
//!
//! Two evaluators judge a [`Proposal`] against a manifest and return a
//! [`Decision`]:
//!
//! - [`InterpretedEvaluator`] walks the [`DomainManifest`] rule by rule and
//!   honours temporal windows through the [`TemporalStateStore`].
//! - [`VectorizedEvaluator`] runs over a [`CompiledManifest`] and is the
//!   fast path for manifests without temporal rules.
//!
//! [`GovernanceEngine`] wires both to a compiler, verifier, compile cache and
//! state store built from one [`GateConfig`].

mod decision;
mod interpreted;
mod judge;
mod proposal;
mod vectorized;

/// Routed runtime keeping verification off the evaluation path.
pub mod runtime;

use std::sync::Arc;

use crate::compiler::{CompileCache, CompiledManifest, ManifestCompiler};
use crate::config::GateConfig;
use crate::error::GateResult;
use crate::manifest::DomainManifest;
use crate::state::TemporalStateStore;
use crate::time::{Clock, SystemClock};
use crate::verifier::{FormalVerifier, VerificationReport};

pub use decision::{Decision, DecisionId, Status, Violation};
pub use interpreted::InterpretedEvaluator;
pub use proposal::{InvalidSignal, Proposal};
pub use runtime::{
    DefaultRouter, ExecutionHandle, ExecutionPath, GateRequest, GateResponse, GateRuntime, RequestRouter,
    RuntimeConfig,
};
pub use vectorized::VectorizedEvaluator;

/// Explicitly constructed service bundle.
///
/// Owns the only mutable shared state in the pipeline (the temporal store and
/// the compile cache); nothing is global. Clone the evaluators it hands out
/// freely across threads.
///
/// # Examples
///
/// ```
/// use std::sync::Arc;
///
/// use rulegate::config::GateConfig;
/// use rulegate::engine::{GovernanceEngine, Proposal, Status};
/// use rulegate::manifest::{ConstraintSpec, ManifestBuilder, Operator};
///
/// let engine = GovernanceEngine::new(GateConfig::default()).unwrap();
/// let manifest = Arc::new(
///     ManifestBuilder::new("CREDIT")
///         .entity("age")
///         .constraint(ConstraintSpec::new("ADULT", "age", Operator::Gte, 18))
///         .build()
///         .unwrap(),
/// );
///
/// let decision = engine.evaluate(&manifest, &Proposal::new().with("age", 21)).unwrap();
/// assert_eq!(decision.status, Status::Certified);
/// ```
#[derive(Debug)]
pub struct GovernanceEngine {
    config: GateConfig,
    compiler: ManifestCompiler,
    verifier: FormalVerifier,
    state: Arc<TemporalStateStore>,
    cache: CompileCache,
}

impl GovernanceEngine {
    /// Builds an engine on the system clock.
    ///
    /// # Errors
    ///
    /// Returns `GateError::Config` if `config` does not validate.
    pub fn new(config: GateConfig) -> GateResult<Self> {
        Self::with_clock(config, Arc::new(SystemClock))
    }

    /// Builds an engine whose temporal store reads `clock`.
    ///
    /// # Errors
    ///
    /// Returns `GateError::Config` if `config` does not validate.
    pub fn with_clock(config: GateConfig, clock: Arc<dyn Clock>) -> GateResult<Self> {
        config.validate()?;
        let verifier = FormalVerifier::new(config.verifier.clone());
        Ok(Self {
            compiler: ManifestCompiler::new(verifier.clone()),
            verifier,
            state: Arc::new(TemporalStateStore::with_clock(&config.state, clock)),
            cache: CompileCache::new(),
            config,
        })
    }

    /// Configuration the engine was built from.
    #[must_use]
    pub const fn config(&self) -> &GateConfig {
        &self.config
    }

    /// Verifier used for compiles and reports.
    #[must_use]
    pub const fn verifier(&self) -> &FormalVerifier {
        &self.verifier
    }

    /// Shared temporal store fed by interpreted evaluations.
    #[must_use]
    pub const fn state(&self) -> &Arc<TemporalStateStore> {
        &self.state
    }

    /// Compiled manifests keyed by domain id.
    #[must_use]
    pub const fn cache(&self) -> &CompileCache {
        &self.cache
    }

    /// Compiles through the cache, proving consistency first when the
    /// compiler config asks for it.
    ///
    /// # Errors
    ///
    /// See [`ManifestCompiler::compile`].
    pub fn compile(&self, manifest: &DomainManifest) -> GateResult<Arc<CompiledManifest>> {
        self.compiler
            .compile_cached(&self.cache, manifest, self.config.compiler.verify)
    }

    /// Interpreted evaluator bound to this engine's temporal store.
    #[must_use]
    pub fn interpreted(&self, manifest: Arc<DomainManifest>) -> InterpretedEvaluator {
        InterpretedEvaluator::new(manifest).with_state(Arc::clone(&self.state))
    }

    /// Vectorized evaluator over the cached compiled form of `manifest`.
    ///
    /// # Errors
    ///
    /// See [`compile`](Self::compile).
    pub fn vectorized(&self, manifest: &DomainManifest) -> GateResult<VectorizedEvaluator> {
        Ok(VectorizedEvaluator::new(self.compile(manifest)?))
    }

    /// Evaluates with the vectorized path when the manifest has no temporal
    /// rules, and the interpreted path otherwise.
    ///
    /// # Errors
    ///
    /// Compile errors on the vectorized path, and evaluation faults.
    pub fn evaluate(&self, manifest: &Arc<DomainManifest>, proposal: &Proposal) -> GateResult<Decision> {
        if manifest.has_temporal_rules() {
            Ok(self.interpreted(Arc::clone(manifest)).trace_evaluate(proposal)?)
        } else {
            Ok(self.vectorized(manifest)?.trace_evaluate(proposal)?)
        }
    }

    /// Full verification report.
    ///
    /// # Errors
    ///
    /// See [`FormalVerifier::verify`].
    pub fn verify(&self, manifest: &DomainManifest) -> GateResult<VerificationReport> {
        self.verifier.verify(manifest)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::manifest::{ConstraintSpec, ManifestBuilder, Operator};
    use crate::time::ManualClock;

    #[test]
    fn test_invalid_config_rejected() {
        let mut config = GateConfig::default();
        config.runtime.evaluation_workers = 0;
        let err = GovernanceEngine::new(config).unwrap_err();
        assert!(matches!(err, crate::error::GateError::Config(_)));
    }

    #[test]
    fn test_compile_is_cached() {
        let engine = GovernanceEngine::new(GateConfig::default()).unwrap();
        let m = ManifestBuilder::new("CACHED")
            .entity("x")
            .constraint(ConstraintSpec::new("R", "x", Operator::Lt, 3))
            .build()
            .unwrap();
        let a = engine.compile(&m).unwrap();
        let b = engine.compile(&m).unwrap();
        assert!(Arc::ptr_eq(&a, &b));
        assert_eq!(engine.cache().len().unwrap(), 1);
    }

    #[test]
    fn test_temporal_manifest_feeds_state() {
        let clock = Arc::new(ManualClock::starting_now());
        let engine = GovernanceEngine::with_clock(GateConfig::default(), clock).unwrap();
        let m = Arc::new(
            ManifestBuilder::new("RATE")
                .entity("spend")
                .constraint(ConstraintSpec::new("AVG", "spend", Operator::Lte, 100).window("10m"))
                .build()
                .unwrap(),
        );
        for _ in 0..3 {
            engine.evaluate(&m, &Proposal::new().with("spend", 50)).unwrap();
        }
        assert_eq!(engine.state().len("spend").unwrap(), 3);
        let d = engine.evaluate(&m, &Proposal::new().with("spend", 600)).unwrap();
        // (50 * 3 + 600) / 4 = 187.5
        assert_eq!(d.status, Status::Rejected);
    }
}
