//! Error taxonomy for the agreement engine and its collaborators.

/// Failures an [`crate::evaluator::Evaluator`] can raise. Propose failures
/// abort the current attempt; validate failures are treated as a missing
/// vote (folded into the phase timeout path, never surfaced separately).
#[derive(Debug, Clone, thiserror::Error)]
pub enum EvaluatorError {
    #[error("evaluator unavailable: {0}")]
    Unavailable(String),
    #[error("evaluator call failed: {0}")]
    Failed(String),
}

/// Failures raised while routing messages through the simulated network.
#[derive(Debug, Clone, thiserror::Error)]
pub enum NetworkError {
    #[error("replica {0} is not registered")]
    UnknownReplica(String),
}

/// Failures for a single agreement round.
#[derive(Debug, Clone, thiserror::Error)]
pub enum EngineError {
    #[error("primary failed to produce a proposal: {0}")]
    PrePrepareFailed(String),
    #[error("neither a Y nor an N quorum was reached in the prepare phase")]
    QuorumNotReached,
    #[error("replicas rejected the proposal with an N quorum")]
    ProposalRejected,
    #[error("exceeded the configured retry budget after {0} view changes")]
    MaxRetriesExceeded(u32),
}
