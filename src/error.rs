//! Error types for RuleGate.
//!
//! All errors in RuleGate are strongly typed using thiserror.
//! Load-time and compile-time errors abort the pipeline and carry the
//! offending rule id where one exists. Per-rule evaluation problems are
//! never errors: they degrade to reported violations.

use thiserror::Error;

/// Schema and referential errors raised while building a manifest.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum ManifestValidationError {
    /// The document is not valid JSON or has the wrong shape.
    #[error("Malformed manifest document: {message}")]
    Malformed {
        /// Details.
        message: String,
    },

    /// A required field is absent or blank.
    #[error("Required field '{field}' is missing or empty")]
    MissingField {
        /// Field name.
        field: String,
    },

    /// An entity name appears twice.
    #[error("Entity '{entity}' is declared more than once")]
    DuplicateEntity {
        /// Entity name.
        entity: String,
    },

    /// A rule id appears twice.
    #[error("Rule id '{rule_id}' is declared more than once")]
    DuplicateRule {
        /// Offending rule id.
        rule_id: String,
    },

    /// A rule names an entity the manifest does not declare.
    #[error("Constraint {rule_id} uses undefined entity: {entity}")]
    UndeclaredEntity {
        /// Offending rule id.
        rule_id: String,
        /// Entity name.
        entity: String,
    },

    /// A prerequisite id names no rule.
    #[error("Constraint {rule_id} depends on unknown rule '{missing}'")]
    UnresolvedDependency {
        /// Offending rule id.
        rule_id: String,
        /// Unknown prerequisite id.
        missing: String,
    },

    /// A rule lists itself as a prerequisite.
    #[error("Constraint {rule_id} depends on itself")]
    SelfDependency {
        /// Offending rule id.
        rule_id: String,
    },

    /// Prerequisites form a cycle.
    #[error("Dependency cycle detected through rules: {}", cycle.join(" -> "))]
    DependencyCycle {
        /// Rule ids along the cycle.
        cycle: Vec<String>,
    },

    /// A threshold has the wrong shape for its operator.
    #[error("Constraint {rule_id}: operator {operator} expects {expected}, got {found}")]
    OperatorValueMismatch {
        /// Offending rule id.
        rule_id: String,
        /// Operator label.
        operator: String,
        /// What the operator accepts.
        expected: String,
        /// What the manifest supplied.
        found: String,
    },

    /// A weight is zero, negative or not finite.
    #[error("Constraint {rule_id} has invalid weight {weight}; weights must be finite and positive")]
    InvalidWeight {
        /// Offending rule id.
        rule_id: String,
        /// Supplied weight.
        weight: f64,
    },

    /// A window string does not parse.
    #[error("Constraint {rule_id} has invalid temporal window '{window}'")]
    InvalidTemporalWindow {
        /// Offending rule id.
        rule_id: String,
        /// Supplied window string.
        window: String,
    },
}

impl ManifestValidationError {
    /// Returns the rule id this error is attached to, if any.
    #[must_use]
    pub fn rule_id(&self) -> Option<&str> {
        match self {
            Self::UndeclaredEntity { rule_id, .. }
            | Self::DuplicateRule { rule_id }
            | Self::UnresolvedDependency { rule_id, .. }
            | Self::SelfDependency { rule_id }
            | Self::OperatorValueMismatch { rule_id, .. }
            | Self::InvalidWeight { rule_id, .. }
            | Self::InvalidTemporalWindow { rule_id, .. } => Some(rule_id),
            Self::DependencyCycle { cycle } => cycle.first().map(String::as_str),
            Self::Malformed { .. } | Self::MissingField { .. } | Self::DuplicateEntity { .. } => None,
        }
    }
}

/// A threshold whose type cannot be used with its operator.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("Invalid threshold value for {rule_id}: operator {operator} expects {expected}, got {found}")]
pub struct TypeMismatchError {
    /// Offending rule id.
    pub rule_id: String,
    /// Operator label.
    pub operator: String,
    /// What the operator accepts.
    pub expected: String,
    /// What the manifest supplied.
    pub found: String,
}

/// Errors raised while compiling a manifest.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum CompileError {
    /// No input satisfies every rule.
    #[error("Logic contradiction detected in domain {domain_id}: {explanation}")]
    Contradiction {
        /// Manifest domain id.
        domain_id: String,
        /// Rules that conflict.
        explanation: String,
    },

    /// The solver ran out of budget.
    #[error("Verification of domain {domain_id} was inconclusive: {reason}")]
    Inconclusive {
        /// Manifest domain id.
        domain_id: String,
        /// Details.
        reason: String,
    },

    /// A threshold type does not fit its operator.
    #[error(transparent)]
    TypeMismatch(#[from] TypeMismatchError),
}

/// Internal faults during evaluation.
///
/// These never occur for well-formed compiled manifests; soft per-rule
/// mismatches are reported as violations instead.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum EvaluationError {
    /// Compiled arrays are inconsistent.
    #[error("Compiled manifest is corrupt: {reason}")]
    CorruptArtifact {
        /// Details.
        reason: String,
    },

    /// The proposal is not a JSON object.
    #[error("Proposal is not an entity-to-value object: {reason}")]
    MalformedProposal {
        /// Details.
        reason: String,
    },

    /// The temporal store failed.
    #[error("Temporal state unavailable: {0}")]
    State(#[from] StateError),
}

/// Temporal state store failures.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum StateError {
    /// A lock was poisoned by a panicking thread.
    #[error("poisoned lock: {context}")]
    Poisoned {
        /// Which lock.
        context: &'static str,
    },
}

/// Routed runtime failures.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RuntimeError {
    /// The path queue is at capacity.
    #[error("{path} queue is full (capacity {capacity})")]
    QueueFull {
        /// Execution path label.
        path: String,
        /// Queue capacity.
        capacity: usize,
    },

    /// The path workers have shut down.
    #[error("{path} workers are disconnected")]
    Disconnected {
        /// Execution path label.
        path: String,
    },

    /// A join deadline elapsed.
    #[error("Request timed out after {duration_ms}ms")]
    Timeout {
        /// Elapsed wait.
        duration_ms: u64,
    },
}

/// Configuration errors.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ConfigError {
    /// A value is out of range or the text does not parse.
    #[error("Invalid configuration: {reason}")]
    Invalid {
        /// Details.
        reason: String,
    },

    /// The file could not be read.
    #[error("Failed to read configuration: {message}")]
    Unreadable {
        /// Details.
        message: String,
    },
}

/// Top-level error type for RuleGate.
#[derive(Debug, Error)]
pub enum GateError {
    /// Manifest validation failed.
    #[error("Manifest validation error: {0}")]
    Validation(#[from] ManifestValidationError),

    /// Compilation failed.
    #[error("Compile error: {0}")]
    Compile(#[from] CompileError),

    /// Evaluation failed.
    #[error("Evaluation error: {0}")]
    Evaluation(#[from] EvaluationError),

    /// The routed runtime failed.
    #[error("Runtime error: {0}")]
    Runtime(#[from] RuntimeError),

    /// Configuration is unusable.
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    /// Invariant violation inside the crate.
    #[error("Internal error: {message}")]
    Internal {
        /// Details.
        message: String,
    },
}

impl From<TypeMismatchError> for GateError {
    fn from(err: TypeMismatchError) -> Self {
        Self::Compile(CompileError::TypeMismatch(err))
    }
}

impl From<StateError> for GateError {
    fn from(err: StateError) -> Self {
        Self::Evaluation(EvaluationError::State(err))
    }
}

impl GateError {
    /// Creates an internal error.
    #[must_use]
    pub fn internal(message: impl Into<String>) -> Self {
        Self::Internal {
            message: message.into(),
        }
    }

    /// Returns true if this is a validation error.
    #[must_use]
    pub const fn is_validation(&self) -> bool {
        matches!(self, Self::Validation(_))
    }

    /// Returns true if this is a compile error.
    #[must_use]
    pub const fn is_compile(&self) -> bool {
        matches!(self, Self::Compile(_))
    }

    /// Returns true if this is a proven contradiction.
    #[must_use]
    pub const fn is_contradiction(&self) -> bool {
        matches!(self, Self::Compile(CompileError::Contradiction { .. }))
    }

    /// Returns true if this is an evaluation error.
    #[must_use]
    pub const fn is_evaluation(&self) -> bool {
        matches!(self, Self::Evaluation(_))
    }

    /// Returns true if this is a runtime error.
    #[must_use]
    pub const fn is_runtime(&self) -> bool {
        matches!(self, Self::Runtime(_))
    }

    /// Returns true if this error is retryable.
    #[must_use]
    pub const fn is_retryable(&self) -> bool {
        match self {
            Self::Validation(_) | Self::Config(_) => false, // Input errors won't change on retry
            Self::Compile(e) => matches!(e, CompileError::Inconclusive { .. }),
            Self::Runtime(e) => matches!(e, RuntimeError::QueueFull { .. } | RuntimeError::Timeout { .. }),
            Self::Evaluation(_) | Self::Internal { .. } => false,
        }
    }
}

/// Result type alias for RuleGate operations.
pub type GateResult<T> = Result<T, GateError>;
