use thiserror::Error;

/// Error taxonomy for the field engine.
///
/// `InvalidArgument` and `UndefinedSymbol` are raised eagerly, before any
/// stepping or integration begins. `DivisionByZero` and `DomainError` come
/// out of checked scalar evaluation; the fixed-step tracer converts them
/// into early termination, while the parametric solver wraps them into
/// `IntegrationFailure`. Grid (broadcast) evaluation never produces them —
/// singularities flow through as IEEE inf/NaN sentinels.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum EngineError {
    /// A definition, viewport, or time horizon failed eager validation.
    #[error("invalid argument: {0}")]
    InvalidArgument(String),
    /// A textual expression referenced a name outside the fixed vocabulary.
    #[error("undefined symbol `{0}`")]
    UndefinedSymbol(String),
    /// Scalar evaluation divided by zero.
    #[error("division by zero")]
    DivisionByZero,
    /// Scalar evaluation hit an undefined numeric operation.
    #[error("domain error: {0}")]
    DomainError(String),
    /// The adaptive integrator failed to produce the requested samples.
    #[error("integration failure: {0}")]
    IntegrationFailure(String),
}
