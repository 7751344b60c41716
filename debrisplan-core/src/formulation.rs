//! Mixed-integer formulation of the clean-up plan.
//!
//! Both stages share one constraint block built by [`formulate`]; they differ only in
//! the objective and, for the cost stage, a bound on the completion measure.
//!
//! Periods run `0..=T`. Period 0 only carries initial inventories; decisions
//! (starts, trips, shipments) live in `1..=T`. Per-period vectors of decision
//! variables are stored at `period - 1`, inventory vectors at `period`.

#![expect(
    clippy::indexing_slicing,
    reason = "variable tables are sized from the layout and horizon they are indexed with"
)]

use std::fmt;
use std::ops::Range;

use tracing::debug;

use crate::milp::{LinearExpr, MilpModel, VarId};
use crate::model::{NodeId, NodeKind, NodeLayout};
use crate::network::Network;
use crate::params::{AccrualMode, Fleet, Parameters};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
/// Which of the two lexicographic stages a model belongs to.
pub enum StageKind {
    /// Minimise the number of periods the campaign is still running.
    Time,
    /// Minimise total cost within a bound on the completion measure.
    Cost,
}

impl fmt::Display for StageKind {
    fn fmt(&self, formatter: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            StageKind::Time => "time",
            StageKind::Cost => "cost",
        };
        write!(formatter, "{label}")
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
/// Stage request handed to [`formulate`].
pub enum Stage {
    /// Completion-time stage.
    Time,
    /// Cost stage bounded by `Σ stalled <= time_bound + slack`.
    Cost {
        /// Optimal completion measure of the time stage.
        time_bound: f64,
        /// Extra periods tolerated on top of `time_bound`.
        slack: f64,
    },
}

impl Stage {
    /// Stage without its parameters.
    #[must_use]
    pub fn kind(&self) -> StageKind {
        match self {
            Stage::Time => StageKind::Time,
            Stage::Cost { .. } => StageKind::Cost,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
/// One tier of the vehicle network.
pub enum Echelon {
    /// Customers and intermediate sites, served from the depot.
    Collection,
    /// Intermediate sites and final sites, served from the depot.
    Transport,
}

impl fmt::Display for Echelon {
    fn fmt(&self, formatter: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            Echelon::Collection => "collection",
            Echelon::Transport => "transport",
        };
        write!(formatter, "{label}")
    }
}

impl Echelon {
    /// The tier that loads (`lower`) and the tier that unloads (`upper`).
    #[must_use]
    pub fn tiers(self) -> (NodeKind, NodeKind) {
        match self {
            Echelon::Collection => (NodeKind::Customer, NodeKind::Site),
            Echelon::Transport => (NodeKind::Site, NodeKind::Final),
        }
    }

    fn allows(self, from: NodeKind, to: NodeKind) -> bool {
        let (lower, upper) = self.tiers();
        let member = |kind: NodeKind| kind == NodeKind::Depot || kind == lower || kind == upper;
        from != to && member(from) && member(to)
    }
}

#[derive(Debug, Clone)]
/// Integer trip-count variables of one echelon.
///
/// Only ordered pairs between distinct tiers of the echelon carry variables.
pub struct EchelonTrips {
    echelon: Echelon,
    size: usize,
    arcs: Vec<(NodeId, NodeId)>,
    lookup: Vec<Option<usize>>,
    trips: Vec<Vec<VarId>>,
}

impl EchelonTrips {
    /// Echelon these trips belong to.
    #[must_use]
    pub fn echelon(&self) -> Echelon {
        self.echelon
    }

    fn arc_index(&self, from: usize, to: usize) -> Option<usize> {
        if from >= self.size || to >= self.size {
            return None;
        }
        self.lookup.get(from * self.size + to).copied().flatten()
    }

    /// Trip variable on `from -> to` in `period` (`1..=T`).
    #[must_use]
    pub fn trip(&self, from: usize, to: usize, period: usize) -> Option<VarId> {
        let arc = self.arc_index(from, to)?;
        self.trips.get(arc)?.get(period.checked_sub(1)?).copied()
    }

    /// Every arc with its per-period trip variables.
    pub fn arcs(&self) -> impl Iterator<Item = ((NodeId, NodeId), &[VarId])> {
        self.arcs
            .iter()
            .copied()
            .zip(self.trips.iter().map(Vec::as_slice))
    }

    /// Sum of trips over `arcs` in `period`, skipping pairs outside the echelon.
    fn sum_over<I>(&self, pairs: I, period: usize, coefficient: f64, expr: &mut LinearExpr)
    where
        I: IntoIterator<Item = (usize, usize)>,
    {
        for (from, to) in pairs {
            if let Some(var) = self.trip(from, to, period) {
                expr.add_term(var, coefficient);
            }
        }
    }
}

#[derive(Debug, Clone)]
/// Handles to every decision variable of a formulation.
///
/// Customers, sites, and finals are indexed by their local position.
pub struct DecisionVars {
    /// Number of planning periods.
    pub horizon: usize,
    /// Demolition start indicator `[customer][period - 1]`.
    pub start: Vec<Vec<VarId>>,
    /// Demolition active indicator `[customer][period - 1]`.
    pub active: Vec<Vec<VarId>>,
    /// Waste still at the customer `[customer][period]`.
    pub outstanding: Vec<Vec<VarId>>,
    /// Released but not yet collected waste `[customer][period]`.
    pub queue: Vec<Vec<VarId>>,
    /// Campaign-still-running indicator `[period - 1]`.
    pub stalled: Vec<VarId>,
    /// Site opened `[site]`.
    pub open: Vec<VarId>,
    /// Inventory left at a site `[site][period]`.
    pub leftover: Vec<Vec<VarId>>,
    /// Operating-cost accumulator `[site]`.
    pub accrual: Vec<VarId>,
    /// Tonnes moved customer to site `[customer][site][period - 1]`.
    pub shipped: Vec<Vec<Vec<VarId>>>,
    /// Tonnes moved site to final site `[site][final][period - 1]`.
    pub forwarded: Vec<Vec<Vec<VarId>>>,
    /// Collection trips.
    pub collection: EchelonTrips,
    /// Transport trips.
    pub transport: EchelonTrips,
}

impl DecisionVars {
    /// Trip variables of `echelon`.
    #[must_use]
    pub fn trips(&self, echelon: Echelon) -> &EchelonTrips {
        match echelon {
            Echelon::Collection => &self.collection,
            Echelon::Transport => &self.transport,
        }
    }
}

#[derive(Debug, Clone)]
/// A model ready for the solver plus the handles needed to read its solution.
pub struct Formulation {
    /// Stage the model was built for.
    pub stage: Stage,
    /// The model itself.
    pub model: MilpModel,
    /// Variable handles.
    pub vars: DecisionVars,
}

/// Build the model for `stage`.
///
/// `params` must already be validated against `network.layout`.
#[must_use]
pub fn formulate(network: &Network, params: &Parameters, stage: Stage) -> Formulation {
    let mut model = MilpModel::new(match stage.kind() {
        StageKind::Time => "time minimisation",
        StageKind::Cost => "cost minimisation",
    });
    let vars = declare(&mut model, network, params);

    let mut builder = Builder {
        model,
        vars: &vars,
        network,
        params,
    };
    builder.site_opening();
    builder.demolition_schedule();
    builder.customer_inventory();
    builder.echelon_block(
        Echelon::Collection,
        &params.collection,
        &vars.shipped,
        params.require_daily_dispatch,
    );
    builder.site_inventory();
    builder.echelon_block(Echelon::Transport, &params.transport, &vars.forwarded, false);
    builder.mass_conservation();
    builder.completion_indicator();
    builder.operating_accrual();

    let mut model = builder.model;
    match stage {
        Stage::Time => model.minimize(LinearExpr::sum(vars.stalled.iter().copied())),
        Stage::Cost { time_bound, slack } => {
            model.le(
                "completion_bound",
                LinearExpr::sum(vars.stalled.iter().copied()),
                time_bound + slack,
            );
            model.minimize(cost_objective(&vars, network, params));
        }
    }

    debug!(
        stage = %stage.kind(),
        variables = model.variables().len(),
        constraints = model.constraints().len(),
        "Model formulated"
    );

    Formulation { stage, model, vars }
}

fn declare(model: &mut MilpModel, network: &Network, params: &Parameters) -> DecisionVars {
    let layout = &network.layout;
    let horizon = params.horizon;
    let customers = layout.customer_count();
    let sites = layout.site_count();
    let finals = layout.final_count();

    let per_customer = |model: &mut MilpModel, label: &str, binary: bool, first: usize| {
        (0..customers)
            .map(|customer| {
                (first..=horizon)
                    .map(|period| {
                        let name = format!("{label}[{customer},{period}]");
                        if binary {
                            model.binary(name)
                        } else {
                            model.continuous(name)
                        }
                    })
                    .collect::<Vec<_>>()
            })
            .collect::<Vec<Vec<VarId>>>()
    };
    let start = per_customer(model, "start", true, 1);
    let active = per_customer(model, "active", true, 1);
    let outstanding = per_customer(model, "outstanding", false, 0);
    let queue = per_customer(model, "queue", false, 0);

    let stalled = params
        .periods()
        .map(|period| model.binary(format!("stalled[{period}]")))
        .collect();

    let open = (0..sites)
        .map(|site| model.binary(format!("open[{site}]")))
        .collect();
    let leftover = (0..sites)
        .map(|site| {
            (0..=horizon)
                .map(|period| model.continuous(format!("leftover[{site},{period}]")))
                .collect::<Vec<_>>()
        })
        .collect();
    let accrual = (0..sites)
        .map(|site| model.continuous(format!("accrual[{site}]")))
        .collect();

    let flows = |model: &mut MilpModel, label: &str, origins: usize, targets: usize| {
        (0..origins)
            .map(|origin| {
                (0..targets)
                    .map(|target| {
                        params
                            .periods()
                            .map(|period| {
                                model.continuous(format!("{label}[{origin}->{target},{period}]"))
                            })
                            .collect::<Vec<_>>()
                    })
                    .collect::<Vec<_>>()
            })
            .collect::<Vec<Vec<Vec<VarId>>>>()
    };
    let shipped = flows(model, "shipped", customers, sites);
    let forwarded = flows(model, "forwarded", sites, finals);

    let collection = declare_trips(model, network, params, Echelon::Collection, &params.collection);
    let transport = declare_trips(model, network, params, Echelon::Transport, &params.transport);

    DecisionVars {
        horizon,
        start,
        active,
        outstanding,
        queue,
        stalled,
        open,
        leftover,
        accrual,
        shipped,
        forwarded,
        collection,
        transport,
    }
}

fn declare_trips(
    model: &mut MilpModel,
    network: &Network,
    params: &Parameters,
    echelon: Echelon,
    fleet: &Fleet,
) -> EchelonTrips {
    let layout = &network.layout;
    let size = layout.len();
    let budget = fleet.minutes_per_period(params.working_minutes);

    let mut arcs = Vec::new();
    let mut lookup = vec![None; size * size];
    let mut trips = Vec::new();

    for from in 0..size {
        for to in 0..size {
            let (Some(from_kind), Some(to_kind)) =
                (layout.kind_of(NodeId(from)), layout.kind_of(NodeId(to)))
            else {
                continue;
            };
            if !echelon.allows(from_kind, to_kind) {
                continue;
            }

            // Every trip spends its travel time out of the period budget.
            let minutes = fleet.travel_minutes(network.distance(NodeId(from), NodeId(to)));
            let upper = (minutes > 0.0).then(|| (budget / minutes).floor());

            if let Some(slot) = lookup.get_mut(from * size + to) {
                *slot = Some(arcs.len());
            }
            arcs.push((NodeId(from), NodeId(to)));
            trips.push(
                params
                    .periods()
                    .map(|period| {
                        model.integer(format!("trips_{echelon}[{from}->{to},{period}]"), upper)
                    })
                    .collect(),
            );
        }
    }

    EchelonTrips {
        echelon,
        size,
        arcs,
        lookup,
        trips,
    }
}

struct Builder<'a> {
    model: MilpModel,
    vars: &'a DecisionVars,
    network: &'a Network,
    params: &'a Parameters,
}

impl Builder<'_> {
    fn layout(&self) -> &NodeLayout {
        &self.network.layout
    }

    fn horizon(&self) -> usize {
        self.params.horizon
    }

    fn site_opening(&mut self) {
        let expr = LinearExpr::sum(self.vars.open.iter().copied());
        self.model.ge("min_open_site", expr, 1.0);
    }

    fn demolition_schedule(&mut self) {
        let vars = self.vars;
        for (customer, profile) in self.params.customers.iter().enumerate() {
            let starts = &vars.start[customer];
            self.model
                .eq("single_start", LinearExpr::sum(starts.iter().copied()), 1.0);

            for period in self.params.periods() {
                // Active iff the start falls inside the duration window ending here.
                let first = period.saturating_sub(profile.demolition_periods - 1).max(1);
                let mut expr = LinearExpr::new().term(vars.active[customer][period - 1], 1.0);
                expr.add_all((first..=period).map(|day| starts[day - 1]), -1.0);
                self.model.eq("active_window", expr, 0.0);
            }
        }

        for period in self.params.periods() {
            let expr = LinearExpr::sum(vars.active.iter().map(|row| row[period - 1]));
            self.model
                .le("machine_limit", expr, count(self.params.machines));
        }
    }

    fn customer_inventory(&mut self) {
        let vars = self.vars;
        let horizon = self.horizon();
        for (customer, profile) in self.params.customers.iter().enumerate() {
            let mass = profile.mass_tonnes;
            let outstanding = &vars.outstanding[customer];
            let queue = &vars.queue[customer];
            let shipped = &vars.shipped[customer];

            self.model
                .eq("outstanding_initial", LinearExpr::sum([outstanding[0]]), mass);
            self.model.eq("queue_initial", LinearExpr::sum([queue[0]]), 0.0);

            for period in self.params.periods() {
                let mut cumulative = LinearExpr::new().term(outstanding[period], 1.0);
                for per_site in shipped {
                    cumulative.add_all(per_site[..period].iter().copied(), 1.0);
                }
                self.model.eq("outstanding_balance", cumulative, mass);

                let mut release = LinearExpr::new()
                    .term(vars.active[customer][period - 1], profile.release_per_period())
                    .term(queue[period - 1], 1.0)
                    .term(queue[period], -1.0);
                release.add_all(shipped.iter().map(|per_site| per_site[period - 1]), -1.0);
                self.model.eq("queue_balance", release, 0.0);
            }

            self.model
                .eq("queue_final", LinearExpr::sum([queue[horizon]]), 0.0);

            let mut total = LinearExpr::new();
            for per_site in shipped {
                total.add_all(per_site.iter().copied(), 1.0);
            }
            self.model.eq("total_shipment", total, mass);
        }
    }

    /// Trip linkage, time budget, tour balances, and fleet cap for one echelon.
    ///
    /// `loads[lower][upper][period - 1]` is the tonnage carried on `lower -> upper`.
    fn echelon_block(
        &mut self,
        echelon: Echelon,
        fleet: &Fleet,
        loads: &[Vec<Vec<VarId>>],
        daily_dispatch: bool,
    ) {
        let vars = self.vars;
        let trips = vars.trips(echelon);
        let (lower_kind, upper_kind) = echelon.tiers();
        let lower: Range<usize> = self.layout().range(lower_kind);
        let upper: Range<usize> = self.layout().range(upper_kind);
        let depot = NodeId::DEPOT.get();
        let link_name = match echelon {
            Echelon::Collection => "collection_link",
            Echelon::Transport => "transport_link",
        };
        let [time_name, depot_name, lower_name, upper_name, fleet_name] = match echelon {
            Echelon::Collection => [
                "collection_time",
                "collection_depot_balance",
                "collection_customer_balance",
                "collection_site_balance",
                "collection_fleet",
            ],
            Echelon::Transport => [
                "transport_time",
                "transport_depot_balance",
                "transport_site_balance",
                "transport_final_balance",
                "transport_fleet",
            ],
        };

        for (origin, per_target) in lower.clone().zip(loads) {
            for (target, per_period) in upper.clone().zip(per_target) {
                for period in self.params.periods() {
                    let mut expr = LinearExpr::new().term(per_period[period - 1], 1.0);
                    if let Some(trip) = trips.trip(origin, target, period) {
                        expr.add_term(trip, -fleet.capacity_tonnes);
                    }
                    self.model.le(link_name, expr, 0.0);
                }
            }
        }

        let budget = fleet.minutes_per_period(self.params.working_minutes);
        for period in self.params.periods() {
            let mut time = LinearExpr::new();
            for ((from, to), per_period) in trips.arcs() {
                let minutes = fleet.travel_minutes(self.network.distance(from, to));
                time.add_term(per_period[period - 1], minutes);
            }
            self.model.le(time_name, time, budget);

            let mut tours = LinearExpr::new();
            trips.sum_over(lower.clone().map(|node| (depot, node)), period, 1.0, &mut tours);
            trips.sum_over(upper.clone().map(|node| (node, depot)), period, -1.0, &mut tours);
            self.model.eq(depot_name, tours, 0.0);

            for (tier, partners, name) in [
                (lower.clone(), upper.clone(), lower_name),
                (upper.clone(), lower.clone(), upper_name),
            ] {
                for node in tier {
                    let neighbours = || std::iter::once(depot).chain(partners.clone());
                    let mut balance = LinearExpr::new();
                    trips.sum_over(neighbours().map(|from| (from, node)), period, 1.0, &mut balance);
                    trips.sum_over(neighbours().map(|to| (node, to)), period, -1.0, &mut balance);
                    self.model.eq(name, balance, 0.0);
                }
            }

            let mut outbound = LinearExpr::new();
            trips.sum_over(lower.clone().map(|node| (depot, node)), period, 1.0, &mut outbound);
            self.model.le(fleet_name, outbound, count(fleet.size));

            if daily_dispatch {
                let mut dispatch = LinearExpr::new();
                trips.sum_over(
                    lower.clone().chain(upper.clone()).map(|node| (depot, node)),
                    period,
                    1.0,
                    &mut dispatch,
                );
                self.model.ge("daily_dispatch", dispatch, 1.0);
            }
        }
    }

    fn site_inventory(&mut self) {
        let vars = self.vars;
        let horizon = self.horizon();
        let kept = 1.0 - self.params.recycling_fraction;

        for (site, profile) in self.params.sites.iter().enumerate() {
            let leftover = &vars.leftover[site];
            self.model
                .eq("leftover_initial", LinearExpr::sum([leftover[0]]), 0.0);

            for period in self.params.periods() {
                let mut balance = LinearExpr::new()
                    .term(leftover[period - 1], 1.0)
                    .term(leftover[period], -1.0);
                balance.add_all(
                    vars.shipped.iter().map(|per_customer| per_customer[site][period - 1]),
                    kept,
                );
                balance.add_all(
                    vars.forwarded[site].iter().map(|per_period| per_period[period - 1]),
                    -1.0,
                );
                self.model.eq("leftover_balance", balance, 0.0);
            }

            self.model
                .eq("leftover_final", LinearExpr::sum([leftover[horizon]]), 0.0);

            for &stock in leftover {
                let gate = LinearExpr::new()
                    .term(stock, 1.0)
                    .term(vars.open[site], -profile.capacity_tonnes);
                self.model.le("site_capacity", gate, 0.0);
            }
        }
    }

    fn mass_conservation(&mut self) {
        let vars = self.vars;
        let kept = 1.0 - self.params.recycling_fraction;
        let mut expr = LinearExpr::new();
        for per_site in vars.shipped.iter().flatten() {
            expr.add_all(per_site.iter().copied(), kept);
        }
        for per_period in vars.forwarded.iter().flatten() {
            expr.add_all(per_period.iter().copied(), -1.0);
        }
        self.model.eq("mass_conservation", expr, 0.0);
    }

    fn completion_indicator(&mut self) {
        let vars = self.vars;
        for period in self.params.periods() {
            let stalled = vars.stalled[period - 1];
            // stalled >= 1 - stock / scale: forced to 1 exactly when some stock is zero.
            for (customer, profile) in self.params.customers.iter().enumerate() {
                let expr = LinearExpr::new().term(stalled, 1.0).term(
                    vars.outstanding[customer][period],
                    1.0 / profile.mass_tonnes,
                );
                self.model.ge("stalled_customer", expr, 1.0);
            }
            for (site, profile) in self.params.sites.iter().enumerate() {
                let expr = LinearExpr::new()
                    .term(stalled, 1.0)
                    .term(vars.leftover[site][period], 1.0 / profile.capacity_tonnes);
                self.model.ge("stalled_site", expr, 1.0);
            }
        }
    }

    fn operating_accrual(&mut self) {
        let vars = self.vars;
        let full = count(self.horizon() + 1);
        for (site, profile) in self.params.sites.iter().enumerate() {
            let rate = profile.operating_cost_per_period;
            let mut expr = LinearExpr::new().term(vars.accrual[site], 1.0);
            match self.params.operating_cost_accrual {
                AccrualMode::Bounded => {
                    // accrual <= (T + 2 - Σ stalled) * rate + (T + 1) * rate * (1 - open)
                    expr.add_all(vars.stalled.iter().copied(), rate);
                    expr.add_term(vars.open[site], full * rate);
                    self.model
                        .le("operating_accrual", expr, (full + 1.0) * rate + full * rate);
                }
                AccrualMode::Charged => {
                    // accrual >= Σ stalled * rate - (T + 1) * rate * (1 - open)
                    expr.add_all(vars.stalled.iter().copied(), -rate);
                    expr.add_term(vars.open[site], -full * rate);
                    self.model.ge("operating_accrual", expr, -full * rate);
                }
            }
        }
    }
}

#[expect(
    clippy::cast_precision_loss,
    reason = "machine, vehicle, and period counts are small"
)]
fn count(value: usize) -> f64 {
    value as f64
}

fn cost_objective(vars: &DecisionVars, network: &Network, params: &Parameters) -> LinearExpr {
    let mut cost = LinearExpr::new();
    for ((&open, &accrual), profile) in vars.open.iter().zip(&vars.accrual).zip(&params.sites) {
        cost.add_term(open, profile.establishment_cost);
        cost.add_term(accrual, 1.0);
    }
    for (echelon, fleet) in [
        (Echelon::Collection, &params.collection),
        (Echelon::Transport, &params.transport),
    ] {
        for ((from, to), per_period) in vars.trips(echelon).arcs() {
            let per_trip = network.distance(from, to) * fleet.cost_per_km;
            cost.add_all(per_period.iter().copied(), per_trip);
        }
    }
    cost
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::milp::{Assignment, Sense};
    use crate::model::Coordinate;
    use crate::network::DistanceMatrix;

    fn network(customers: usize, sites: usize, finals: usize, km: f64) -> Network {
        let layout = NodeLayout::new(customers, sites, finals);
        let points = vec![Coordinate::new(0.0, 0.0); layout.len()];
        Network::from_parts(points, layout, DistanceMatrix::uniform(layout.len(), km))
            .expect("consistent parts")
    }

    #[test]
    fn time_stage_minimises_stalled_periods() {
        let net = network(2, 1, 1, 5.0);
        let params = Parameters::with_defaults(&net.layout);
        let formulation = formulate(&net, &params, Stage::Time);
        let model = &formulation.model;

        let objective = model.objective();
        assert_eq!(objective.terms().len(), params.horizon);
        assert!(
            objective
                .terms()
                .iter()
                .all(|&(var, coefficient)| formulation.vars.stalled.contains(&var)
                    && (coefficient - 1.0).abs() < 1e-12)
        );
        assert_eq!(model.count_constraints("completion_bound"), 0);
        assert_eq!(model.count_constraints("single_start"), 2);
        assert_eq!(model.count_constraints("active_window"), 2 * 6);
        assert_eq!(model.count_constraints("machine_limit"), 6);
        assert_eq!(model.count_constraints("site_capacity"), 7);
        assert_eq!(model.count_constraints("stalled_customer"), 2 * 6);
        assert_eq!(model.count_constraints("stalled_site"), 6);
        assert_eq!(model.count_constraints("daily_dispatch"), 6);
        assert_eq!(model.count_constraints("mass_conservation"), 1);
    }

    #[test]
    fn stages_share_the_constraint_block() {
        let net = network(2, 2, 1, 3.0);
        let params = Parameters::with_defaults(&net.layout);
        let time = formulate(&net, &params, Stage::Time);
        let cost = formulate(
            &net,
            &params,
            Stage::Cost {
                time_bound: 3.0,
                slack: 1.0,
            },
        );

        assert_eq!(time.model.variables(), cost.model.variables());
        let shared = time.model.constraints().len();
        assert_eq!(cost.model.constraints().len(), shared + 1);
        assert_eq!(&cost.model.constraints()[..shared], time.model.constraints());

        let bound = cost.model.constraints().last().expect("bound");
        assert_eq!(bound.name, "completion_bound");
        assert_eq!(bound.sense, Sense::Le);
        assert!((bound.rhs - 4.0).abs() < 1e-12);
    }

    #[test]
    fn echelons_only_link_their_own_tiers() {
        let net = network(2, 1, 1, 5.0);
        let params = Parameters::with_defaults(&net.layout);
        let vars = formulate(&net, &params, Stage::Time).vars;

        // depot 0, customers 1-2, site 3, final 4
        assert!(vars.collection.trip(0, 1, 1).is_some());
        assert!(vars.collection.trip(1, 3, 6).is_some());
        assert!(vars.collection.trip(3, 0, 1).is_some());
        assert!(vars.collection.trip(1, 2, 1).is_none());
        assert!(vars.collection.trip(3, 4, 1).is_none());
        assert!(vars.collection.trip(0, 0, 1).is_none());
        assert!(vars.collection.trip(0, 1, 0).is_none());
        assert!(vars.collection.trip(0, 1, 7).is_none());

        assert!(vars.transport.trip(3, 4, 1).is_some());
        assert!(vars.transport.trip(4, 0, 1).is_some());
        assert!(vars.transport.trip(1, 3, 1).is_none());

        // depot<->customers (4) + depot<->site (2) + customers<->site (4)
        assert_eq!(vars.collection.arcs().count(), 10);
        // depot<->site (2) + depot<->final (2) + site<->final (2)
        assert_eq!(vars.transport.arcs().count(), 6);
    }

    #[test]
    fn trip_bounds_follow_the_time_budget() {
        let net = network(1, 1, 1, 5.0);
        let params = Parameters::with_defaults(&net.layout);
        let formulation = formulate(&net, &params, Stage::Time);
        let trip = formulation.vars.collection.trip(0, 1, 1).expect("depot to customer");
        let variable = formulation.model.variable(trip).expect("declared");
        // 5 km at 25 km/h is 12 minutes; 150 minutes fit 12 trips.
        assert_eq!(variable.upper, Some(12.0));

        let sentinel = network(1, 1, 1, params.unreachable_distance_km);
        let far = formulate(&sentinel, &params, Stage::Time);
        let trip = far.vars.transport.trip(2, 3, 1).expect("site to final");
        assert_eq!(far.model.variable(trip).expect("declared").upper, Some(0.0));
    }

    #[test]
    fn cost_objective_charges_sites_and_distance() {
        let net = network(1, 1, 1, 2.0);
        let params = Parameters::with_defaults(&net.layout);
        let formulation = formulate(
            &net,
            &params,
            Stage::Cost {
                time_bound: 2.0,
                slack: 1.0,
            },
        );
        let objective = formulation.model.objective();
        let coefficient_of = |var: VarId| {
            objective
                .terms()
                .iter()
                .filter(|(candidate, _)| *candidate == var)
                .map(|(_, coefficient)| coefficient)
                .sum::<f64>()
        };
        assert!((coefficient_of(formulation.vars.open[0]) - 8000.0).abs() < 1e-9);
        assert!((coefficient_of(formulation.vars.accrual[0]) - 1.0).abs() < 1e-9);
        let collect = formulation.vars.collection.trip(1, 2, 3).expect("customer to site");
        assert!((coefficient_of(collect) - 200.0).abs() < 1e-9);
        let haul = formulation.vars.transport.trip(2, 3, 3).expect("site to final");
        assert!((coefficient_of(haul) - 300.0).abs() < 1e-9);
    }

    #[test]
    fn empty_stock_forces_the_stalled_indicator() {
        let net = network(1, 1, 1, 5.0);
        let params = Parameters::with_defaults(&net.layout);
        let formulation = formulate(&net, &params, Stage::Time);
        let vars = &formulation.vars;
        let row = formulation
            .model
            .constraints()
            .iter()
            .find(|constraint| constraint.name == "stalled_customer")
            .expect("first customer row");

        let mut values = vec![0.0; formulation.model.variables().len()];
        let empty = Assignment::new(0.0, values.clone());
        assert!((row.violation(&empty) - 1.0).abs() < 1e-9);

        values[vars.outstanding[0][1].index()] = params.customers[0].mass_tonnes;
        assert!(row.violation(&Assignment::new(0.0, values.clone())) < 1e-9);

        values[vars.outstanding[0][1].index()] = 0.0;
        values[vars.stalled[0].index()] = 1.0;
        assert!(row.violation(&Assignment::new(0.0, values)) < 1e-9);
    }

    #[test]
    fn daily_dispatch_can_be_disabled() {
        let net = network(1, 1, 1, 2.0);
        let params = Parameters {
            require_daily_dispatch: false,
            operating_cost_accrual: AccrualMode::Charged,
            ..Parameters::with_defaults(&net.layout)
        };
        let formulation = formulate(&net, &params, Stage::Time);
        assert_eq!(formulation.model.count_constraints("daily_dispatch"), 0);
        let accrual = formulation
            .model
            .constraints()
            .iter()
            .find(|constraint| constraint.name == "operating_accrual")
            .expect("accrual constraint");
        assert_eq!(accrual.sense, Sense::Ge);
    }
}
