//! Two-stage planning facade combining the distance provider, formulator, and solver.

use std::sync::Arc;
use std::time::Duration;

use tracing::{debug, info, warn};

use crate::error::PlanError;
use crate::extract::{UsageMap, extract_usage, render_report};
use crate::formulation::{Formulation, Stage, formulate};
use crate::milp::Assignment;
use crate::model::NodeSet;
use crate::network::{Network, build_network};
use crate::params::Parameters;
use crate::ports::{DistanceProvider, MilpSolver, SolveLimits};

/// Tolerance for the post-solve feasibility check.
const CHECK_TOLERANCE: f64 = 1e-4;

#[derive(Debug, Clone, Copy, PartialEq)]
/// Solver budgets and the completion slack granted to the cost stage.
pub struct PlannerSettings {
    /// Budget for the time stage.
    pub time_limits: SolveLimits,
    /// Budget for the cost stage.
    pub cost_limits: SolveLimits,
    /// Periods tolerated on top of the optimal completion measure.
    pub slack: f64,
}

impl Default for PlannerSettings {
    fn default() -> Self {
        Self {
            time_limits: SolveLimits::default(),
            cost_limits: SolveLimits::default(),
            slack: 1.0,
        }
    }
}

impl PlannerSettings {
    /// Same wall-clock budget for both stages.
    #[must_use]
    pub fn with_time_limit(mut self, limit: Duration) -> Self {
        self.time_limits.time_limit = limit;
        self.cost_limits.time_limit = limit;
        self
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
/// Objective reached by one stage.
pub struct StageSummary {
    /// Objective value as reported by the solver.
    pub objective: f64,
    /// Whether the solver proved optimality.
    pub proven_optimal: bool,
}

#[derive(Debug, Clone)]
/// Everything produced by a successful planning attempt.
pub struct Plan {
    /// Network the plan was computed on.
    pub network: Network,
    /// Completion-time stage result.
    pub time: StageSummary,
    /// Cost stage result.
    pub cost: StageSummary,
    /// Trips per ordered node pair.
    pub usage: UsageMap,
    /// Plain-text report.
    pub report: String,
}

/// Public entry point for computing clean-up plans.
pub struct Planner {
    distances: Arc<dyn DistanceProvider>,
    solver: Arc<dyn MilpSolver>,
    settings: PlannerSettings,
}

impl Planner {
    /// Create a planner bound to the given backends.
    #[must_use]
    pub fn new(
        distances: Arc<dyn DistanceProvider>,
        solver: Arc<dyn MilpSolver>,
        settings: PlannerSettings,
    ) -> Self {
        Self {
            distances,
            solver,
            settings,
        }
    }

    /// Settings in use.
    #[must_use]
    pub fn settings(&self) -> &PlannerSettings {
        &self.settings
    }

    /// Build the network for `nodes` and run both stages.
    ///
    /// `params` may omit per-node profiles; they are filled with reference values.
    /// The solver runs on the calling task and blocks it for the stage budget at most.
    ///
    /// # Errors
    ///
    /// Returns [`PlanError::MissingNodeCategory`] or [`PlanError::InvalidParameters`]
    /// before any distance query, [`PlanError::DistanceUnavailable`] when the provider
    /// fails, and [`PlanError::StageInfeasible`] or [`PlanError::Solver`] when a stage
    /// yields no assignment. The cost stage never runs after a failed time stage.
    pub async fn plan(&self, nodes: &NodeSet, params: &Parameters) -> Result<Plan, PlanError> {
        let layout = nodes.validate()?;
        let params = params.clone().fitted_to(&layout);
        params.validate(&layout)?;

        let network =
            build_network(nodes, self.distances.as_ref(), params.unreachable_distance_km).await?;

        let (time_formulation, time_assignment, time) =
            self.run_stage(&network, &params, Stage::Time, &self.settings.time_limits)?;
        let time_bound = time.objective.round();
        debug!(
            completion = time_formulation
                .vars
                .stalled
                .iter()
                .map(|&var| time_assignment.value(var))
                .sum::<f64>(),
            "Time stage assignment read"
        );

        let cost_stage = Stage::Cost {
            time_bound,
            slack: self.settings.slack,
        };
        let (cost_formulation, cost_assignment, cost) =
            self.run_stage(&network, &params, cost_stage, &self.settings.cost_limits)?;

        let usage = extract_usage(&cost_formulation, &cost_assignment);
        let report = render_report(&network, time.objective, cost.objective, &usage);
        info!(
            time = time.objective,
            cost = cost.objective,
            arcs = usage.len(),
            "Plan computed"
        );

        Ok(Plan {
            network,
            time,
            cost,
            usage,
            report,
        })
    }

    fn run_stage(
        &self,
        network: &Network,
        params: &Parameters,
        stage: Stage,
        limits: &SolveLimits,
    ) -> Result<(Formulation, Assignment, StageSummary), PlanError> {
        let kind = stage.kind();
        let formulation = formulate(network, params, stage);
        info!(
            stage = %kind,
            solver = self.solver.name(),
            variables = formulation.model.variables().len(),
            constraints = formulation.model.constraints().len(),
            "Solving stage"
        );

        let outcome = self
            .solver
            .solve(&formulation.model, limits)
            .map_err(|source| PlanError::Solver {
                stage: kind,
                source,
            })?;
        let Some((assignment, proven_optimal)) = outcome.into_parts() else {
            warn!(stage = %kind, "Stage produced no assignment");
            return Err(PlanError::StageInfeasible { stage: kind });
        };
        if !proven_optimal {
            warn!(
                stage = %kind,
                objective = assignment.objective,
                "Accepting best found assignment"
            );
        }

        let violations = formulation.model.violations(&assignment, CHECK_TOLERANCE);
        if !violations.is_empty() {
            warn!(
                stage = %kind,
                count = violations.len(),
                first = ?violations.first(),
                "Solver assignment violates the model"
            );
        }

        let summary = StageSummary {
            objective: assignment.objective,
            proven_optimal,
        };
        debug!(stage = %kind, objective = summary.objective, proven_optimal, "Stage solved");
        Ok((formulation, assignment, summary))
    }
}
