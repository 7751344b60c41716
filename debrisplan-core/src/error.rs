//! Error taxonomy for a planning attempt.

use crate::formulation::StageKind;
use crate::model::{NodeId, NodeKind};
use crate::ports::{ProviderError, SolverError};

#[derive(thiserror::Error, Debug)]
/// Errors that abort a planning attempt.
///
/// None of these leave partial state behind: no matrix, report, or usage map is
/// produced once one is returned.
pub enum PlanError {
    /// At least one node category is empty.
    #[error("Missing node category: at least one {0} is required")]
    MissingNodeCategory(NodeKind),
    /// The distance provider failed for a pair; callers must discard all placed points.
    #[error("Distance unavailable from node {from} to node {to}: {source}")]
    DistanceUnavailable {
        /// Origin of the failed query.
        from: NodeId,
        /// Destination of the failed query.
        to: NodeId,
        /// Underlying provider failure.
        #[source]
        source: ProviderError,
    },
    /// Parameters do not fit the node layout or are out of range.
    #[error("Invalid parameters: {0}")]
    InvalidParameters(String),
    /// The solver found no usable assignment for a stage.
    #[error("No solution for the {stage} stage")]
    StageInfeasible {
        /// Stage that failed.
        stage: StageKind,
    },
    /// The solver backend itself failed.
    #[error("Solver failed during the {stage} stage: {source}")]
    Solver {
        /// Stage that was being solved.
        stage: StageKind,
        /// Backend error.
        #[source]
        source: SolverError,
    },
}

impl PlanError {
    /// Whether the caller must reset all placed points after this error.
    #[must_use]
    pub fn requires_reset(&self) -> bool {
        matches!(self, PlanError::DistanceUnavailable { .. })
    }
}
