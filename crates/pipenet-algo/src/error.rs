use pipenet_core::{PipeId, PipeNetError};
use thiserror::Error;

/// Failures reported by a cost function.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum CostError {
    /// The cost function could not size the pipe
    #[error("cost function failed for {pipe}: {message}")]
    Failed { pipe: PipeId, message: String },

    /// The cost function returned NaN or an infinite price
    #[error("cost function returned a non-finite price ({price}) for {pipe}")]
    NonFinite { pipe: PipeId, price: f64 },
}

impl CostError {
    pub fn failed(pipe: PipeId, message: impl Into<String>) -> Self {
        CostError::Failed {
            pipe,
            message: message.into(),
        }
    }

    pub fn pipe(&self) -> PipeId {
        match self {
            CostError::Failed { pipe, .. } | CostError::NonFinite { pipe, .. } => *pipe,
        }
    }
}

/// Optimizer errors
#[derive(Debug, Clone, Error)]
pub enum OptimizeError {
    /// Malformed network or decomposition invariant violation
    #[error(transparent)]
    Network(#[from] PipeNetError),

    /// Pricing a candidate failed under the abort policy
    #[error(transparent)]
    Cost(#[from] CostError),

    /// A piece's terminals cannot be connected at all
    #[error("terminals of piece {piece} are not connected")]
    Infeasible { piece: usize },

    /// Loaded pipes of a piece close a loop, so no tree can keep them all
    #[error("loaded pipes of piece {piece} form a cycle closed by {pipe}")]
    LoadedCycle { piece: usize, pipe: PipeId },

    /// Every candidate of a piece failed to price
    #[error("no candidate of piece {piece} could be priced ({failed} failed)")]
    NoPricedCandidate { piece: usize, failed: usize },

    /// Invalid optimizer configuration
    #[error("Configuration error: {0}")]
    Config(String),
}

pub type OptimizeResult<T> = Result<T, OptimizeError>;
