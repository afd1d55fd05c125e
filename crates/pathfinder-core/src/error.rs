//! Error types for path adjustment.

use thiserror::Error;

/// Ways an adjustment call can fail.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum PathfinderError {
    /// Malformed request or configuration; nothing was computed.
    #[error("Invalid input: {reason}")]
    InvalidInput { reason: String },

    /// No obstacle-free, turn-feasible path exists for a segment.
    #[error("No feasible path for segment {segment}: {reason}")]
    Infeasible { segment: usize, reason: String },

    /// The process-time budget ran out before a segment had any feasible path.
    #[error("Deadline exceeded on segment {segment} ({completed} segments resolved)")]
    DeadlineExceeded { segment: usize, completed: usize },

    /// The background planning task failed to run to completion.
    #[error("Planner worker failed: {reason}")]
    Worker { reason: String },
}

impl PathfinderError {
    pub fn invalid(reason: impl Into<String>) -> Self {
        PathfinderError::InvalidInput {
            reason: reason.into(),
        }
    }

    pub fn infeasible(segment: usize, reason: impl Into<String>) -> Self {
        PathfinderError::Infeasible {
            segment,
            reason: reason.into(),
        }
    }

    /// Stable label for logs and metrics.
    pub fn kind(&self) -> &'static str {
        match self {
            PathfinderError::InvalidInput { .. } => "invalid_input",
            PathfinderError::Infeasible { .. } => "infeasible",
            PathfinderError::DeadlineExceeded { .. } => "deadline_exceeded",
            PathfinderError::Worker { .. } => "worker",
        }
    }
}

pub type PathfinderResult<T> = Result<T, PathfinderError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn messages_carry_context() {
        let err = PathfinderError::infeasible(3, "obstacle encircles the route");
        assert_eq!(
            err.to_string(),
            "No feasible path for segment 3: obstacle encircles the route"
        );
        assert_eq!(err.kind(), "infeasible");

        let err = PathfinderError::DeadlineExceeded {
            segment: 1,
            completed: 0,
        };
        assert!(err.to_string().contains("segment 1"));
        assert_eq!(err.kind(), "deadline_exceeded");
    }
}
