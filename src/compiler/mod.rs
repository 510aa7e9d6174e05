//! Manifest compiler.
//!
//! Lowers a validated [`DomainManifest`] into a [`CompiledManifest`]: dense
//! per-rule bound, severity and weight arrays plus a dependency matrix. When
//! verification is requested the manifest must first be proven consistent;
//! a contradiction or an inconclusive proof stops compilation.

mod cache;
mod compiled;

use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::error::{CompileError, GateResult};
use crate::manifest::DomainManifest;
use crate::verifier::{ConsistencyOutcome, FormalVerifier};

pub use cache::CompileCache;
pub use compiled::{CompiledManifest, ConstraintMeta, MemberSet, TestKind};

/// Compiler configuration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct CompilerConfig {
    /// Prove consistency before compiling.
    pub verify: bool,
}

impl Default for CompilerConfig {
    fn default() -> Self {
        Self { verify: true }
    }
}

/// Turns manifests into compiled artifacts.
#[derive(Debug, Clone, Default)]
pub struct ManifestCompiler {
    verifier: FormalVerifier,
}

impl ManifestCompiler {
    /// Creates a compiler that verifies with `verifier`.
    #[must_use]
    pub const fn new(verifier: FormalVerifier) -> Self {
        Self { verifier }
    }

    /// Compiles a manifest, proving consistency first when `verify` is set.
    ///
    /// Deterministic: the same manifest and flag always yield identical
    /// arrays.
    ///
    /// # Errors
    ///
    /// - `CompileError::Contradiction` if verification proves the rules inconsistent.
    /// - `CompileError::Inconclusive` if verification cannot finish.
    /// - `CompileError::TypeMismatch` if a threshold's type does not fit its operator.
    pub fn compile(&self, manifest: &DomainManifest, verify: bool) -> GateResult<CompiledManifest> {
        if verify {
            match self.verifier.verify_consistency(manifest)? {
                ConsistencyOutcome::Consistent => {}
                ConsistencyOutcome::Contradictory { explanation } => {
                    return Err(CompileError::Contradiction {
                        domain_id: manifest.domain_id().to_string(),
                        explanation,
                    }
                    .into());
                }
                ConsistencyOutcome::Inconclusive { reason } => {
                    return Err(CompileError::Inconclusive {
                        domain_id: manifest.domain_id().to_string(),
                        reason,
                    }
                    .into());
                }
            }
        }

        let compiled = CompiledManifest::build(manifest, verify)?;
        debug!(
            domain_id = %compiled.domain_id(),
            constraints = compiled.len(),
            entities = compiled.entity_names().len(),
            verified = verify,
            "manifest compiled"
        );
        Ok(compiled)
    }

    /// Compiles through `cache`, reusing an entry while the manifest
    /// fingerprint and verification flag match.
    ///
    /// # Errors
    ///
    /// Same as [`compile`](Self::compile), plus a poisoned cache lock.
    pub fn compile_cached(
        &self,
        cache: &CompileCache,
        manifest: &DomainManifest,
        verify: bool,
    ) -> GateResult<Arc<CompiledManifest>> {
        if let Some(hit) = cache.get(manifest, verify)? {
            return Ok(hit);
        }
        let compiled = Arc::new(self.compile(manifest, verify)?);
        cache.insert(Arc::clone(&compiled))?;
        Ok(compiled)
    }
}
