//! Solver backend: depth-first branch and bound over `microlp` linear relaxations.
//!
//! `microlp` solves the relaxation and re-optimises every child from its parent's
//! basis. The search itself runs here so it can stop at the wall-clock budget or the
//! relative gap and hand back the incumbent it holds at that point.

use std::collections::BTreeMap;
use std::time::Instant;

use microlp::{ComparisonOp, OptimizationDirection, Problem, Solution, Variable as LpVariable};
use tracing::{debug, info, warn};

use debrisplan_core::milp::{Assignment, MilpModel, Sense, VarKind};
use debrisplan_core::ports::{MilpSolver, SolveLimits, SolveOutcome, SolverError};

/// Tolerance for constraints that have no variable terms left.
const TRIVIAL_TOLERANCE: f64 = 1e-9;
/// Distance to the nearest whole number below which a value counts as integral.
const INTEGRALITY: f64 = 1e-6;
/// Nodes between two progress messages.
const PROGRESS_EVERY: usize = 2_000;

/// [`MilpSolver`] running branch and bound on `microlp` relaxations.
///
/// The search runs on the calling thread. The budget is checked before every node,
/// so a call returns at most one relaxation re-solve after the deadline. When the
/// budget or the gap stops the search, the incumbent comes back as
/// [`SolveOutcome::BestFound`].
#[derive(Debug, Clone, Copy, Default)]
pub struct MicrolpSolver;

impl MicrolpSolver {
    /// Create the solver.
    #[must_use]
    pub fn new() -> Self {
        Self
    }
}

impl MilpSolver for MicrolpSolver {
    fn name(&self) -> &str {
        "microlp"
    }

    fn solve(&self, model: &MilpModel, limits: &SolveLimits) -> Result<SolveOutcome, SolverError> {
        let started = Instant::now();
        let gap = limits.mip_gap.unwrap_or(0.0);
        if !(gap.is_finite() && gap >= 0.0) {
            return Err(SolverError::Unsupported(format!("relative gap {gap} is not usable")));
        }

        let Some(relaxation) = Relaxation::translate(model)? else {
            info!(model = model.name(), "Constant constraint cannot hold");
            return Ok(SolveOutcome::Infeasible);
        };
        let root = match relaxation.problem.solve() {
            Ok(root) => root,
            Err(microlp::Error::Infeasible | microlp::Error::Unbounded) => {
                info!(model = model.name(), "Relaxation has no bounded optimum");
                return Ok(SolveOutcome::Infeasible);
            }
            Err(other) => return Err(SolverError::Backend(other.to_string())),
        };

        let mut search = Search {
            relaxation: &relaxation,
            deadline: started.checked_add(limits.time_limit),
            gap,
            incumbent: None,
            nodes: 0,
            dropped: 0,
            gap_pruned: false,
        };
        let stop = search.run(root);

        let Search {
            incumbent,
            nodes,
            dropped,
            gap_pruned,
            ..
        } = search;
        let complete = stop.is_none() && dropped == 0;
        debug!(
            model = model.name(),
            nodes,
            dropped,
            open_bound = stop,
            elapsed_secs = started.elapsed().as_secs_f64(),
            "Branch and bound finished"
        );
        if dropped > 0 {
            warn!(
                model = model.name(),
                dropped, "Branches dropped on numerical trouble, optimality not proven"
            );
        }

        let Some(Incumbent { values, .. }) = incumbent else {
            if complete {
                info!(model = model.name(), nodes, "No integral assignment exists");
                return Ok(SolveOutcome::Infeasible);
            }
            warn!(
                model = model.name(),
                limit_secs = limits.time_limit.as_secs_f64(),
                "No integral assignment within the budget"
            );
            return Ok(SolveOutcome::Unknown);
        };

        let mut assignment = Assignment::new(0.0, values);
        assignment.objective = model.evaluate(&assignment);
        if complete && !gap_pruned {
            Ok(SolveOutcome::Optimal(assignment))
        } else {
            if stop.is_some() {
                warn!(
                    model = model.name(),
                    objective = assignment.objective,
                    limit_secs = limits.time_limit.as_secs_f64(),
                    "Budget expired, returning incumbent"
                );
            }
            Ok(SolveOutcome::BestFound(assignment))
        }
    }
}

/// The model with every integrality requirement relaxed, plus what the search needs
/// to restore them.
struct Relaxation {
    problem: Problem,
    columns: Vec<LpVariable>,
    kinds: Vec<VarKind>,
    costs: Vec<f64>,
    /// Every integral assignment has a whole objective value.
    whole_objective: bool,
}

impl Relaxation {
    /// `None` when a constraint without variables cannot hold.
    fn translate(model: &MilpModel) -> Result<Option<Self>, SolverError> {
        let mut costs = vec![0.0; model.variables().len()];
        for &(var, coefficient) in model.objective().terms() {
            let cost = costs.get_mut(var.index()).ok_or_else(|| {
                SolverError::Unsupported(format!("objective refers to unknown variable {}", var.index()))
            })?;
            *cost += coefficient;
        }

        let mut problem = Problem::new(OptimizationDirection::Minimize);
        let mut columns = Vec::with_capacity(costs.len());
        let mut kinds = Vec::with_capacity(costs.len());
        for (variable, &cost) in model.variables().iter().zip(&costs) {
            if !variable.lower.is_finite() {
                return Err(SolverError::Unsupported(format!(
                    "{} has no finite lower bound",
                    variable.name
                )));
            }
            let (lower, upper) = match variable.kind {
                VarKind::Binary => (0.0, 1.0),
                VarKind::Integer => (
                    variable.lower.ceil(),
                    variable.upper.map_or(f64::INFINITY, f64::floor),
                ),
                VarKind::Continuous => (variable.lower, variable.upper.unwrap_or(f64::INFINITY)),
            };
            columns.push(problem.add_var(cost, (lower, upper)));
            kinds.push(variable.kind);
        }

        for constraint in model.constraints() {
            let mut merged: BTreeMap<usize, f64> = BTreeMap::new();
            for &(var, coefficient) in &constraint.terms {
                *merged.entry(var.index()).or_insert(0.0) += coefficient;
            }

            let mut expr = microlp::LinearExpr::empty();
            let mut used = 0_usize;
            for (index, coefficient) in merged {
                if coefficient == 0.0 {
                    continue;
                }
                let column = columns.get(index).copied().ok_or_else(|| {
                    SolverError::Unsupported(format!(
                        "{} refers to unknown variable {index}",
                        constraint.name
                    ))
                })?;
                expr.add(column, coefficient);
                used += 1;
            }

            if used == 0 {
                let holds = match constraint.sense {
                    Sense::Le => constraint.rhs >= -TRIVIAL_TOLERANCE,
                    Sense::Ge => constraint.rhs <= TRIVIAL_TOLERANCE,
                    Sense::Eq => constraint.rhs.abs() <= TRIVIAL_TOLERANCE,
                };
                if !holds {
                    return Ok(None);
                }
                continue;
            }

            let op = match constraint.sense {
                Sense::Le => ComparisonOp::Le,
                Sense::Ge => ComparisonOp::Ge,
                Sense::Eq => ComparisonOp::Eq,
            };
            problem.add_constraint(expr, op, constraint.rhs);
        }

        let whole_objective = costs.iter().zip(&kinds).all(|(&cost, &kind)| {
            cost == 0.0 || (kind != VarKind::Continuous && (cost - cost.round()).abs() <= TRIVIAL_TOLERANCE)
        });

        Ok(Some(Self {
            problem,
            columns,
            kinds,
            costs,
            whole_objective,
        }))
    }

    fn values(&self, solution: &Solution) -> Vec<f64> {
        self.columns.iter().map(|&column| solution[column]).collect()
    }

    /// Integral variable to branch on: binaries before general integers, then the most
    /// fractional value.
    fn branching_candidate(&self, values: &[f64]) -> Option<Candidate> {
        values
            .iter()
            .zip(&self.kinds)
            .enumerate()
            .filter(|&(_, (_, &kind))| kind != VarKind::Continuous)
            .filter_map(|(index, (&value, &kind))| {
                let distance = (value - value.round()).abs();
                (distance > INTEGRALITY).then_some(Candidate {
                    index,
                    value,
                    binary: kind == VarKind::Binary,
                    distance,
                })
            })
            .max_by(|left, right| {
                left.binary
                    .cmp(&right.binary)
                    .then(left.distance.total_cmp(&right.distance))
                    // Lowest index wins ties.
                    .then(right.index.cmp(&left.index))
            })
    }

    /// Snap integral variables to whole numbers.
    fn rounded(&self, mut values: Vec<f64>) -> Vec<f64> {
        for (value, &kind) in values.iter_mut().zip(&self.kinds) {
            if kind != VarKind::Continuous {
                *value = value.round();
            }
        }
        values
    }

    fn objective_of(&self, values: &[f64]) -> f64 {
        self.costs
            .iter()
            .zip(values)
            .map(|(cost, value)| cost * value)
            .sum()
    }
}

#[derive(Debug, Clone, Copy)]
struct Candidate {
    index: usize,
    value: f64,
    binary: bool,
    distance: f64,
}

struct Node {
    bound: f64,
    solution: Solution,
}

struct Incumbent {
    objective: f64,
    values: Vec<f64>,
}

struct Search<'a> {
    relaxation: &'a Relaxation,
    deadline: Option<Instant>,
    gap: f64,
    incumbent: Option<Incumbent>,
    nodes: usize,
    /// Children lost to backend errors other than infeasibility.
    dropped: usize,
    /// Some node was discarded only because of the relative gap.
    gap_pruned: bool,
}

impl Search<'_> {
    /// Explore from `root`. Returns the lowest open bound when the budget stops the
    /// search, `None` when the tree was exhausted.
    fn run(&mut self, root: Solution) -> Option<f64> {
        let mut open = vec![Node {
            bound: root.objective(),
            solution: root,
        }];

        while let Some(node) = open.pop() {
            if self.deadline.is_some_and(|deadline| Instant::now() >= deadline) {
                let lowest = open
                    .iter()
                    .map(|pending| pending.bound)
                    .fold(node.bound, f64::min);
                return Some(lowest);
            }
            self.nodes += 1;
            if self.nodes % PROGRESS_EVERY == 0 {
                debug!(
                    nodes = self.nodes,
                    open = open.len(),
                    incumbent = self.incumbent.as_ref().map(|best| best.objective),
                    "Branch and bound progress"
                );
            }
            if !self.worth_exploring(node.bound) {
                continue;
            }

            let values = self.relaxation.values(&node.solution);
            match self.relaxation.branching_candidate(&values) {
                None => self.offer(values),
                Some(candidate) => open.extend(self.children(&node.solution, candidate)),
            }
        }
        None
    }

    /// Whether a node whose relaxation reaches `bound` can still beat the incumbent
    /// by more than the gap.
    fn worth_exploring(&mut self, bound: f64) -> bool {
        let Some(best) = self.incumbent.as_ref().map(|incumbent| incumbent.objective) else {
            return true;
        };
        let improving = if self.relaxation.whole_objective {
            best - 1.0 + INTEGRALITY
        } else {
            best - INTEGRALITY * best.abs().max(1.0)
        };
        if bound > improving {
            return false;
        }
        if bound > best - self.gap * best.abs() {
            self.gap_pruned = true;
            return false;
        }
        true
    }

    fn offer(&mut self, values: Vec<f64>) {
        let values = self.relaxation.rounded(values);
        let objective = self.relaxation.objective_of(&values);
        if self
            .incumbent
            .as_ref()
            .is_some_and(|best| objective >= best.objective)
        {
            return;
        }
        debug!(nodes = self.nodes, objective, "New incumbent");
        self.incumbent = Some(Incumbent { objective, values });
    }

    /// Both branches of `candidate` that stay feasible, the side nearer to the
    /// relaxed value last so that it is explored first.
    fn children(&mut self, parent: &Solution, candidate: Candidate) -> Vec<Node> {
        let Some(&column) = self.relaxation.columns.get(candidate.index) else {
            self.dropped += 1;
            return Vec::new();
        };
        let down = candidate.value.floor();
        let up = down + 1.0;
        let sides = if candidate.value - down < 0.5 {
            [(ComparisonOp::Ge, up), (ComparisonOp::Le, down)]
        } else {
            [(ComparisonOp::Le, down), (ComparisonOp::Ge, up)]
        };

        let mut children = Vec::with_capacity(sides.len());
        for (op, rhs) in sides {
            let branched = if candidate.binary {
                parent.clone().fix_var(column, rhs)
            } else {
                parent.clone().add_constraint([(column, 1.0)], op, rhs)
            };
            match branched {
                Ok(solution) => {
                    let bound = solution.objective();
                    if self.worth_exploring(bound) {
                        children.push(Node { bound, solution });
                    }
                }
                Err(microlp::Error::Infeasible) => {}
                Err(err) => {
                    self.dropped += 1;
                    debug!(%err, variable = candidate.index, "Branch dropped");
                }
            }
        }
        children
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use debrisplan_core::milp::LinearExpr;

    use super::*;

    fn limits() -> SolveLimits {
        SolveLimits {
            time_limit: Duration::from_secs(30),
            mip_gap: None,
        }
    }

    #[test]
    fn solves_small_covering_problem() {
        // Move 130 t with 50 t trucks (cost 7) or 40 t trucks (cost 5).
        let mut model = MilpModel::new("covering");
        let big = model.integer("big", Some(10.0));
        let small = model.integer("small", Some(10.0));
        model.ge(
            "demand",
            LinearExpr::new().term(big, 50.0).term(small, 40.0),
            130.0,
        );
        model.minimize(LinearExpr::new().term(big, 7.0).term(small, 5.0));

        let outcome = MicrolpSolver::new().solve(&model, &limits()).expect("solve");
        let SolveOutcome::Optimal(assignment) = outcome else {
            panic!("expected optimum, got {outcome:?}");
        };
        // 1 × 50 + 2 × 40 = 130 at cost 17 beats 3 × 50 at 21 and 4 × 40 at 20.
        assert!((assignment.objective - 17.0).abs() < 1e-6);
        assert!((assignment.value(big) - 1.0).abs() < 1e-9);
        assert!((assignment.value(small) - 2.0).abs() < 1e-9);
        assert!(model.violations(&assignment, 1e-6).is_empty());
    }

    #[test]
    fn duplicate_terms_are_merged() {
        let mut model = MilpModel::new("merge");
        let load = model.continuous("load");
        model.ge(
            "split",
            LinearExpr::new().term(load, 1.0).term(load, 1.0),
            10.0,
        );
        model.minimize(LinearExpr::sum([load]).constant(3.0));

        let outcome = MicrolpSolver::new().solve(&model, &limits()).expect("solve");
        let assignment = outcome.assignment().expect("optimum");
        assert!((assignment.value(load) - 5.0).abs() < 1e-6);
        assert!((assignment.objective - 8.0).abs() < 1e-6);
    }

    #[test]
    fn infeasible_model_is_reported() {
        let mut model = MilpModel::new("clash");
        let open = model.binary("open");
        model.ge("at_least_two", LinearExpr::sum([open]), 2.0);
        model.minimize(LinearExpr::sum([open]));

        let outcome = MicrolpSolver::new().solve(&model, &limits()).expect("solve");
        assert_eq!(outcome, SolveOutcome::Infeasible);
    }

    #[test]
    fn integer_infeasibility_is_proven_by_search() {
        // 2x + 2y = 3 has fractional solutions only.
        let mut model = MilpModel::new("parity");
        let left = model.integer("left", Some(5.0));
        let right = model.integer("right", Some(5.0));
        model.eq(
            "odd",
            LinearExpr::new().term(left, 2.0).term(right, 2.0),
            3.0,
        );
        model.minimize(LinearExpr::sum([left, right]));

        let outcome = MicrolpSolver::new().solve(&model, &limits()).expect("solve");
        assert_eq!(outcome, SolveOutcome::Infeasible);
    }

    #[test]
    fn constant_contradiction_short_circuits() {
        let mut model = MilpModel::new("constant");
        let open = model.binary("open");
        model.eq("impossible", LinearExpr::new().constant(1.0), 0.0);
        model.minimize(LinearExpr::sum([open]));

        let outcome = MicrolpSolver::new().solve(&model, &limits()).expect("solve");
        assert_eq!(outcome, SolveOutcome::Infeasible);
    }

    /// Pick items of weight 2 to cover an odd demand; many ties at the optimum.
    fn cover(items: usize, demand: f64) -> MilpModel {
        let mut model = MilpModel::new("cover");
        let picks: Vec<_> = (0..items)
            .map(|item| model.binary(format!("pick[{item}]")))
            .collect();
        let mut weight = LinearExpr::new();
        weight.add_all(picks.iter().copied(), 2.0);
        model.ge("demand", weight, demand);
        model.minimize(LinearExpr::sum(picks));
        model
    }

    #[test]
    fn whole_objective_prunes_ties() {
        let model = cover(12, 9.0);
        let outcome = MicrolpSolver::new().solve(&model, &limits()).expect("solve");
        let SolveOutcome::Optimal(assignment) = outcome else {
            panic!("expected optimum, got {outcome:?}");
        };
        assert!((assignment.objective - 5.0).abs() < 1e-9);
        assert!(model.violations(&assignment, 1e-6).is_empty());
    }

    #[test]
    fn expired_budget_returns_promptly() {
        let model = cover(40, 41.0);
        let instant = SolveLimits {
            time_limit: Duration::ZERO,
            mip_gap: None,
        };
        let started = Instant::now();
        let outcome = MicrolpSolver::new().solve(&model, &instant).expect("solve");
        assert!(started.elapsed() < Duration::from_secs(10));
        assert_eq!(outcome, SolveOutcome::Unknown);
    }

    #[test]
    fn gap_stops_at_first_close_incumbent() {
        // Costs 10 and 11 per unit: any cover is within 10 % of the optimum.
        let mut model = MilpModel::new("gap");
        let cheap = model.integer("cheap", Some(3.0));
        let dear = model.integer("dear", Some(3.0));
        model.ge(
            "demand",
            LinearExpr::new().term(cheap, 1.0).term(dear, 1.0),
            3.5,
        );
        model.minimize(LinearExpr::new().term(cheap, 10.0).term(dear, 11.0));

        let relaxed = SolveLimits {
            mip_gap: Some(0.15),
            ..limits()
        };
        let outcome = MicrolpSolver::new().solve(&model, &relaxed).expect("solve");
        let assignment = outcome.assignment().expect("incumbent");
        assert!(model.violations(&assignment, 1e-6).is_empty());
        assert!(assignment.objective <= 44.0 * 1.15);

        let exact = MicrolpSolver::new().solve(&model, &limits()).expect("solve");
        let SolveOutcome::Optimal(optimum) = exact else {
            panic!("expected optimum, got {exact:?}");
        };
        assert!((optimum.objective - 41.0).abs() < 1e-6);
    }

    #[test]
    fn unusable_gap_is_rejected() {
        let model = cover(2, 1.0);
        let broken = SolveLimits {
            mip_gap: Some(f64::NAN),
            ..limits()
        };
        assert!(matches!(
            MicrolpSolver::new().solve(&model, &broken),
            Err(SolverError::Unsupported(_))
        ));
    }
}
