//! # RuleGate - Declarative Governance Rules with Proofs
//!
//! RuleGate certifies or rejects proposals (maps of entity → value) against a
//! domain manifest of threshold rules. Manifests are validated on load,
//! proven free of contradictions by a built-in solver, and compiled to dense
//! arrays for fast evaluation.
//!
//! ## Core Concepts
//!
//! - **Manifest**: entities plus rules (`GT`, `LT`, `GTE`, `LTE`, `EQ`, `IN`,
//!   `NIN`, `RANGE`, `REQUIRED`), each with a severity, a weight and optional
//!   prerequisites
//! - **Decision**: `CERTIFIED`/`REJECTED`, a weighted health score, and the
//!   violated, passed and pruned rules
//! - **Verifier**: consistency, satisfiability, dead rules, counterexamples
//! - **Temporal state**: trailing-window averages for rules with a window
//!
//! ## Usage
//!
//! ```rust
//! use std::sync::Arc;
//!
//! use rulegate::{DomainManifest, GateConfig, GovernanceEngine, Proposal, Status};
//!
//! let manifest = DomainManifest::from_json_str(r#"{
//!     "domain_id": "LENDING",
//!     "entities": ["age", "income"],
//!     "constraints": [
//!         {"id": "ADULT", "entity": "age", "operator": "GTE", "value": 18, "severity": "FATAL"},
//!         {"id": "INCOME", "entity": "income", "operator": "GT", "value": 1000,
//!          "severity": "WARNING", "conditional_on": ["ADULT"]}
//!     ]
//! }"#)?;
//!
//! let engine = GovernanceEngine::new(GateConfig::default())?;
//! let decision = engine.evaluate(&Arc::new(manifest), &Proposal::new().with("age", 16).with("income", 5000))?;
//!
//! assert_eq!(decision.status, Status::Rejected);
//! assert_eq!(decision.pruned, vec!["INCOME".to_string()]);
//! # Ok::<(), rulegate::GateError>(())
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]

// Core types
pub mod error;
pub mod time;
pub mod value;

// Manifest model and compilation
pub mod compiler;
pub mod manifest;
pub mod verifier;

// Evaluation
pub mod config;
pub mod engine;
pub mod state;

// Re-export primary types at crate root for convenience
pub use compiler::{CompileCache, CompiledManifest, ManifestCompiler};
pub use config::GateConfig;
pub use engine::{
    Decision, GateRequest, GateResponse, GateRuntime, GovernanceEngine, InterpretedEvaluator, Proposal, Status,
    VectorizedEvaluator, Violation,
};
pub use error::{GateError, GateResult};
pub use manifest::{ConstraintSpec, DomainManifest, ManifestBuilder, Operator, SeverityClass};
pub use state::TemporalStateStore;
pub use value::Value;
pub use verifier::{FormalVerifier, SafetyProperty, VerificationReport};
