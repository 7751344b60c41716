//! Full two-stage runs of the reference scenario on the microlp backend.
//!
//! Stages may stop at the budget; every check below holds for any feasible assignment.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;

use debrisplan_core::extract::extract_usage;
use debrisplan_core::formulation::{Echelon, Formulation, Stage, formulate};
use debrisplan_core::milp::Assignment;
use debrisplan_core::network::{DistanceMatrix, Network};
use debrisplan_core::params::{CustomerProfile, Parameters};
use debrisplan_core::{
    Coordinate, DistanceProvider, MilpSolver, NodeId, NodeSet, PlanError, Planner,
    PlannerSettings, ProviderError, SolveLimits, SolveOutcome,
};
use debrisplan_solver_microlp::MicrolpSolver;

const TOLERANCE: f64 = 1e-4;
const STAGE_BUDGET: Duration = Duration::from_secs(120);

/// Every pair is 5 km apart.
struct ConstantProvider;

#[async_trait]
impl DistanceProvider for ConstantProvider {
    async fn distance(&self, _from: Coordinate, _to: Coordinate) -> Result<f64, ProviderError> {
        Ok(5.0)
    }

    async fn route(&self, from: Coordinate, to: Coordinate) -> Result<Vec<Coordinate>, ProviderError> {
        Ok(vec![from, to])
    }
}

/// Answers the first `healthy` queries, then fails.
struct FlakyProvider {
    healthy: std::sync::atomic::AtomicUsize,
}

#[async_trait]
impl DistanceProvider for FlakyProvider {
    async fn distance(&self, _from: Coordinate, _to: Coordinate) -> Result<f64, ProviderError> {
        use std::sync::atomic::Ordering;
        let left = self.healthy.load(Ordering::SeqCst);
        if left == 0 {
            return Err(ProviderError::Status(502));
        }
        self.healthy.store(left - 1, Ordering::SeqCst);
        Ok(5.0)
    }

    async fn route(&self, from: Coordinate, to: Coordinate) -> Result<Vec<Coordinate>, ProviderError> {
        Ok(vec![from, to])
    }
}

fn scenario_nodes() -> NodeSet {
    NodeSet {
        depot: Some(Coordinate::new(50.94, 6.96)),
        customers: vec![Coordinate::new(50.95, 6.97), Coordinate::new(50.93, 6.99)],
        sites: vec![Coordinate::new(50.96, 6.93)],
        finals: vec![Coordinate::new(50.90, 7.02)],
    }
}

/// Reference scenario parameters, with site profiles filled for the scenario layout.
fn scenario_params() -> Parameters {
    let layout = scenario_nodes().validate().expect("layout");
    Parameters {
        customers: vec![
            CustomerProfile {
                mass_tonnes: 120.0,
                demolition_periods: 2,
            },
            CustomerProfile {
                mass_tonnes: 200.0,
                demolition_periods: 1,
            },
        ],
        horizon: 6,
        ..Parameters::default()
    }
    .fitted_to(&layout)
}

fn limits() -> SolveLimits {
    SolveLimits {
        time_limit: STAGE_BUDGET,
        mip_gap: None,
    }
}

fn scenario_network(params: &Parameters) -> Network {
    let nodes = scenario_nodes();
    let layout = nodes.validate().expect("layout");
    params.validate(&layout).expect("valid parameters");
    Network::from_parts(nodes.ordered(), layout, DistanceMatrix::uniform(5, 5.0)).expect("network")
}

fn solve(formulation: &Formulation) -> Assignment {
    match MicrolpSolver::new()
        .solve(&formulation.model, &limits())
        .expect("backend runs")
    {
        SolveOutcome::Optimal(assignment) | SolveOutcome::BestFound(assignment) => assignment,
        other => panic!("{} has no solution: {other:?}", formulation.model.name()),
    }
}

fn completion(formulation: &Formulation, assignment: &Assignment) -> f64 {
    formulation
        .vars
        .stalled
        .iter()
        .map(|&var| assignment.value(var))
        .sum()
}

#[test]
fn scenario_parameters_cover_every_node() {
    let layout = scenario_nodes().validate().expect("layout");
    let params = scenario_params();
    assert_eq!(params.customers.len(), layout.customer_count());
    assert_eq!(params.sites.len(), layout.site_count());
    assert!(params.validate(&layout).is_ok());

    let unfitted = Parameters {
        sites: Vec::new(),
        ..scenario_params()
    };
    assert!(matches!(
        unfitted.validate(&layout),
        Err(PlanError::InvalidParameters(_))
    ));
}

#[tokio::test]
async fn reference_scenario_produces_plan() {
    let planner = Planner::new(
        Arc::new(ConstantProvider),
        Arc::new(MicrolpSolver::new()),
        PlannerSettings::default().with_time_limit(STAGE_BUDGET),
    );
    let plan = planner
        .plan(&scenario_nodes(), &scenario_params())
        .await
        .expect("plan");

    assert!(plan.time.objective > 0.5);
    assert!(plan.time.objective <= 6.0 + TOLERANCE);
    assert!(plan.cost.objective.is_finite());
    assert!(plan.cost.objective >= 8000.0 - TOLERANCE);

    let depot_collection = plan
        .usage
        .echelon_total(Echelon::Collection, |from, _| from == NodeId::DEPOT);
    assert!(depot_collection > 0);
    // site 3 -> final 4
    assert!(plan.usage.get(NodeId(3), NodeId(4)).is_some_and(|arc| arc.transport > 0));
    assert!(plan.usage.iter().all(|(_, _, arc)| arc.total() > 0));

    assert!(plan.report.contains("Optimal time:"));
    assert!(plan.report.contains("Row 4:"));
}

#[test]
#[expect(
    clippy::cast_possible_truncation,
    clippy::cast_sign_loss,
    reason = "trip values are rounded non-negative counts"
)]
fn stages_respect_mass_inventory_and_slack() {
    let params = scenario_params();
    let network = scenario_network(&params);

    let time = formulate(&network, &params, Stage::Time);
    let time_assignment = solve(&time);
    assert!(time.model.violations(&time_assignment, TOLERANCE).is_empty());
    let best = time_assignment.objective.round();
    assert!((1.0..=6.0).contains(&best));

    let cost = formulate(
        &network,
        &params,
        Stage::Cost {
            time_bound: best,
            slack: 1.0,
        },
    );
    let assignment = solve(&cost);
    assert!(cost.model.violations(&assignment, TOLERANCE).is_empty());
    assert!(completion(&cost, &assignment) <= best + 1.0 + TOLERANCE);

    let vars = &cost.vars;
    for (customer, profile) in params.customers.iter().enumerate() {
        let shipped: f64 = vars.shipped[customer]
            .iter()
            .flatten()
            .map(|&var| assignment.value(var))
            .sum();
        assert!((shipped - profile.mass_tonnes).abs() < TOLERANCE);
    }

    let capacity = params.sites[0].capacity_tonnes;
    let open = assignment.value(vars.open[0]);
    let leftover = &vars.leftover[0];
    for &stock in leftover {
        assert!(assignment.value(stock) <= open * capacity + TOLERANCE);
    }
    assert!(assignment.value(leftover[0]).abs() < TOLERANCE);
    assert!(assignment.value(leftover[params.horizon]).abs() < TOLERANCE);

    let usage = extract_usage(&cost, &assignment);
    assert_eq!(usage, extract_usage(&cost, &assignment));
    let dispatched: u64 = params
        .periods()
        .flat_map(|period| {
            network
                .layout
                .customers()
                .chain(network.layout.sites())
                .filter_map(move |node| vars.collection.trip(0, node, period))
        })
        .map(|var| assignment.value(var).round() as u64)
        .sum();
    assert_eq!(
        usage.echelon_total(Echelon::Collection, |from, _| from == NodeId::DEPOT),
        dispatched
    );
}

#[test]
fn divisible_mass_releases_whole_tonnes() {
    let params = Parameters {
        customers: vec![
            CustomerProfile {
                mass_tonnes: 120.0,
                demolition_periods: 2,
            },
            CustomerProfile {
                mass_tonnes: 90.0,
                demolition_periods: 3,
            },
        ],
        ..scenario_params()
    };
    let network = scenario_network(&params);
    let time = formulate(&network, &params, Stage::Time);
    let assignment = solve(&time);

    for (customer, profile) in params.customers.iter().enumerate() {
        let rate = profile.release_per_period();
        assert!((rate - rate.round()).abs() < 1e-12);

        let released: f64 = time.vars.active[customer]
            .iter()
            .map(|&var| assignment.value(var) * rate)
            .sum();
        assert!((released - profile.mass_tonnes).abs() < TOLERANCE);

        let queue = &time.vars.queue[customer];
        for &backlog in queue {
            assert!(assignment.value(backlog) >= -TOLERANCE);
        }
        assert!(assignment.value(queue[params.horizon]).abs() < TOLERANCE);
    }
}

#[tokio::test]
async fn provider_failure_yields_nothing() {
    let planner = Planner::new(
        Arc::new(FlakyProvider {
            healthy: std::sync::atomic::AtomicUsize::new(9),
        }),
        Arc::new(MicrolpSolver::new()),
        PlannerSettings::default(),
    );
    let err = planner
        .plan(&scenario_nodes(), &scenario_params())
        .await
        .expect_err("provider failure");
    assert!(err.requires_reset());
    assert!(matches!(err, PlanError::DistanceUnavailable { .. }));
}
