//! Traits describing the external capabilities the planner depends on.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::Error as ReqwestError;

use crate::milp::{Assignment, MilpModel};
use crate::model::Coordinate;

#[derive(thiserror::Error, Debug)]
/// Errors that can occur while talking to a distance backend.
pub enum ProviderError {
    /// Network layer failed or timed out.
    #[error("Network error: {0}")]
    Network(#[from] ReqwestError),
    /// Backend answered with a non-success status.
    #[error("Unexpected HTTP status {0}")]
    Status(u16),
    /// Backend payload could not be interpreted.
    #[error("Malformed response: {0}")]
    Malformed(String),
    /// Backend answered but knows no road path between the points.
    #[error("No route between the points")]
    NoRoute,
}

#[async_trait]
/// Road-network distance and path lookups.
pub trait DistanceProvider: Send + Sync {
    /// Driving distance in kilometres from `from` to `to`.
    ///
    /// # Errors
    ///
    /// Returns a [`ProviderError`] when the lookup fails or no route exists.
    async fn distance(&self, from: Coordinate, to: Coordinate) -> Result<f64, ProviderError>;

    /// Ordered path from `from` to `to`.
    ///
    /// # Errors
    ///
    /// Returns a [`ProviderError`] when the lookup fails or no route exists.
    async fn route(&self, from: Coordinate, to: Coordinate)
    -> Result<Vec<Coordinate>, ProviderError>;
}

#[derive(thiserror::Error, Debug)]
/// Failures raised by a solver backend itself, as opposed to "no solution".
pub enum SolverError {
    /// The model could not be translated for the backend.
    #[error("Unsupported model: {0}")]
    Unsupported(String),
    /// Backend crashed or reported an internal error.
    #[error("Backend error: {0}")]
    Backend(String),
}

#[derive(Debug, Clone, Copy, PartialEq)]
/// Budget handed to the solver for one stage.
pub struct SolveLimits {
    /// Wall-clock budget.
    pub time_limit: Duration,
    /// Relative optimality gap at which the search may stop.
    pub mip_gap: Option<f64>,
}

impl Default for SolveLimits {
    fn default() -> Self {
        Self {
            time_limit: Duration::from_secs(600),
            mip_gap: None,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
/// Result of one solver invocation.
pub enum SolveOutcome {
    /// Proven optimal assignment.
    Optimal(Assignment),
    /// Feasible assignment found before the budget ran out or within the gap.
    BestFound(Assignment),
    /// The model has no feasible assignment.
    Infeasible,
    /// Nothing usable was found within the budget.
    Unknown,
}

impl SolveOutcome {
    /// Usable assignment, if any.
    #[must_use]
    pub fn assignment(&self) -> Option<&Assignment> {
        match self {
            SolveOutcome::Optimal(assignment) | SolveOutcome::BestFound(assignment) => {
                Some(assignment)
            }
            SolveOutcome::Infeasible | SolveOutcome::Unknown => None,
        }
    }

    /// Consume the outcome, keeping the assignment and whether it is proven optimal.
    #[must_use]
    pub fn into_parts(self) -> Option<(Assignment, bool)> {
        match self {
            SolveOutcome::Optimal(assignment) => Some((assignment, true)),
            SolveOutcome::BestFound(assignment) => Some((assignment, false)),
            SolveOutcome::Infeasible | SolveOutcome::Unknown => None,
        }
    }
}

/// Mixed-integer solver backend.
///
/// Calls block until the backend finishes or the time limit expires.
pub trait MilpSolver: Send + Sync {
    /// Short backend name for logs.
    fn name(&self) -> &str;

    /// Minimise `model` within `limits`.
    ///
    /// # Errors
    ///
    /// Returns a [`SolverError`] when the backend cannot run at all. "No solution" is
    /// reported through [`SolveOutcome`], not as an error.
    fn solve(&self, model: &MilpModel, limits: &SolveLimits) -> Result<SolveOutcome, SolverError>;
}
