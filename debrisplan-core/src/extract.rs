//! Reads a solved formulation back into arc usage and a plain-text report.

use std::collections::BTreeMap;
use std::fmt;

use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::formulation::{Echelon, Formulation};
use crate::milp::Assignment;
use crate::model::NodeId;
use crate::network::Network;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
/// Trips on one ordered node pair over the whole horizon.
pub struct ArcUsage {
    /// Collection-echelon trips.
    pub collection: u64,
    /// Transport-echelon trips.
    pub transport: u64,
}

impl ArcUsage {
    /// Trips of both echelons.
    #[must_use]
    pub fn total(&self) -> u64 {
        self.collection + self.transport
    }

    fn add(&mut self, echelon: Echelon, trips: u64) {
        match echelon {
            Echelon::Collection => self.collection += trips,
            Echelon::Transport => self.transport += trips,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
/// One serialized usage entry.
pub struct UsageEntry {
    /// Origin node.
    pub from: NodeId,
    /// Destination node.
    pub to: NodeId,
    /// Trip counts.
    #[serde(flatten)]
    pub usage: ArcUsage,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(from = "Vec<UsageEntry>", into = "Vec<UsageEntry>")]
/// Aggregated vehicle trips per ordered node pair, both echelons combined.
///
/// Only pairs with a strictly positive total are present.
pub struct UsageMap {
    arcs: BTreeMap<(NodeId, NodeId), ArcUsage>,
}

impl UsageMap {
    /// Usage on `from -> to`, if any trip was made.
    #[must_use]
    pub fn get(&self, from: NodeId, to: NodeId) -> Option<ArcUsage> {
        self.arcs.get(&(from, to)).copied()
    }

    /// Total trips on `from -> to`, 0 when unused.
    #[must_use]
    pub fn total(&self, from: NodeId, to: NodeId) -> u64 {
        self.get(from, to).map_or(0, |usage| usage.total())
    }

    /// Used pairs in `(from, to)` order.
    pub fn iter(&self) -> impl Iterator<Item = (NodeId, NodeId, ArcUsage)> + '_ {
        self.arcs.iter().map(|(&(from, to), &usage)| (from, to, usage))
    }

    /// Number of used pairs.
    #[must_use]
    pub fn len(&self) -> usize {
        self.arcs.len()
    }

    /// Whether no pair is used.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.arcs.is_empty()
    }

    /// Trips of `echelon` summed over every pair matching `filter`.
    #[must_use]
    pub fn echelon_total<F>(&self, echelon: Echelon, filter: F) -> u64
    where
        F: Fn(NodeId, NodeId) -> bool,
    {
        self.iter()
            .filter(|&(from, to, _)| filter(from, to))
            .map(|(_, _, usage)| match echelon {
                Echelon::Collection => usage.collection,
                Echelon::Transport => usage.transport,
            })
            .sum()
    }
}

impl From<Vec<UsageEntry>> for UsageMap {
    fn from(entries: Vec<UsageEntry>) -> Self {
        let arcs = entries
            .into_iter()
            .filter(|entry| entry.usage.total() > 0)
            .map(|entry| ((entry.from, entry.to), entry.usage))
            .collect();
        Self { arcs }
    }
}

impl From<UsageMap> for Vec<UsageEntry> {
    fn from(map: UsageMap) -> Self {
        map.arcs
            .into_iter()
            .map(|((from, to), usage)| UsageEntry { from, to, usage })
            .collect()
    }
}

/// Sum trip counts per ordered pair over all periods, for both echelons.
///
/// Solver values are rounded to the nearest whole trip first, so numeric noise
/// never produces an entry.
#[must_use]
pub fn extract_usage(formulation: &Formulation, assignment: &Assignment) -> UsageMap {
    let mut arcs: BTreeMap<(NodeId, NodeId), ArcUsage> = BTreeMap::new();
    for echelon in [Echelon::Collection, Echelon::Transport] {
        for (pair, per_period) in formulation.vars.trips(echelon).arcs() {
            let trips: u64 = per_period
                .iter()
                .map(|&var| whole_trips(assignment.value(var)))
                .sum();
            if trips > 0 {
                arcs.entry(pair).or_default().add(echelon, trips);
            }
        }
    }
    UsageMap { arcs }
}

#[expect(
    clippy::cast_possible_truncation,
    clippy::cast_sign_loss,
    reason = "rounded and clamped to zero first; trip bounds are far below u64::MAX"
)]
fn whole_trips(value: f64) -> u64 {
    value.round().max(0.0) as u64
}

/// Plain-text report: placed points, distance matrix, both objective values, arc usage.
#[must_use]
pub fn render_report(network: &Network, time: f64, cost: f64, usage: &UsageMap) -> String {
    let mut report = String::new();
    if let Err(err) = write_report(&mut report, network, time, cost, usage) {
        warn!(%err, "Report rendering stopped early");
    }
    report
}

/// Write the report of [`render_report`] into `out`.
///
/// # Errors
///
/// Propagates the first error returned by `out`.
pub fn write_report<W: fmt::Write>(
    out: &mut W,
    network: &Network,
    time: f64,
    cost: f64,
    usage: &UsageMap,
) -> fmt::Result {
    writeln!(out, "--- NODES (lat, lon) ---")?;
    for (index, point) in network.points.iter().enumerate() {
        let kind = network
            .layout
            .kind_of(NodeId(index))
            .map_or_else(String::new, |kind| kind.to_string());
        writeln!(out, "  [{index}] {kind:<17} {point}")?;
    }

    writeln!(out, "\n--- DISTANCE MATRIX (km) ---")?;
    for (index, row) in network.distances.rows().enumerate() {
        let cells: Vec<String> = row.iter().map(|km| format!("{km:.2}")).collect();
        writeln!(out, "Row {index}: {}", cells.join("  "))?;
    }

    writeln!(out, "\n--- RESULTS ---")?;
    writeln!(out, "Optimal time: {time}")?;
    writeln!(out, "Optimal cost: {cost}")?;

    writeln!(out, "\n--- ARC USAGE (trips) ---")?;
    for (from, to, arc) in usage.iter() {
        writeln!(
            out,
            "  {from} -> {to}: {} (collection {}, transport {})",
            arc.total(),
            arc.collection,
            arc.transport
        )?;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::formulation::{Stage, formulate};
    use crate::model::{Coordinate, NodeLayout};
    use crate::network::DistanceMatrix;
    use crate::params::Parameters;

    fn setup() -> (Network, Formulation) {
        let layout = NodeLayout::new(1, 1, 1);
        let points = vec![
            Coordinate::new(0.0, 0.0),
            Coordinate::new(0.0, 0.01),
            Coordinate::new(0.01, 0.0),
            Coordinate::new(0.02, 0.0),
        ];
        let network = Network::from_parts(points, layout, DistanceMatrix::uniform(4, 2.5))
            .expect("consistent parts");
        let params = Parameters::with_defaults(&layout);
        let formulation = formulate(&network, &params, Stage::Time);
        (network, formulation)
    }

    fn assign(formulation: &Formulation, picks: &[(usize, usize, Echelon, usize, f64)]) -> Assignment {
        let mut values = vec![0.0; formulation.model.variables().len()];
        for &(from, to, echelon, period, value) in picks {
            let var = formulation
                .vars
                .trips(echelon)
                .trip(from, to, period)
                .expect("arc in echelon");
            values[var.index()] = value;
        }
        Assignment::new(0.0, values)
    }

    #[test]
    fn sums_periods_and_drops_zero_pairs() {
        let (_, formulation) = setup();
        // depot 0, customer 1, site 2, final 3
        let assignment = assign(
            &formulation,
            &[
                (0, 1, Echelon::Collection, 1, 1.0),
                (0, 1, Echelon::Collection, 2, 0.999_999),
                (1, 2, Echelon::Collection, 2, 3.0),
                (2, 0, Echelon::Collection, 2, 1.0),
                (2, 3, Echelon::Transport, 3, 2.0),
                (0, 2, Echelon::Transport, 3, 1.0),
                (0, 2, Echelon::Collection, 4, 1.0),
                (3, 0, Echelon::Transport, 3, 1e-7),
            ],
        );
        let usage = extract_usage(&formulation, &assignment);

        assert_eq!(usage.total(NodeId(0), NodeId(1)), 2);
        assert_eq!(usage.total(NodeId(1), NodeId(2)), 3);
        assert_eq!(
            usage.get(NodeId(0), NodeId(2)),
            Some(ArcUsage {
                collection: 1,
                transport: 1
            })
        );
        assert_eq!(usage.get(NodeId(3), NodeId(0)), None);
        assert_eq!(usage.len(), 5);
        assert!(usage.iter().all(|(_, _, arc)| arc.total() > 0));

        let out_of_depot =
            usage.echelon_total(Echelon::Collection, |from, _| from == NodeId::DEPOT);
        assert_eq!(out_of_depot, 3);
    }

    #[test]
    fn extraction_is_idempotent() {
        let (network, formulation) = setup();
        let assignment = assign(
            &formulation,
            &[
                (0, 1, Echelon::Collection, 1, 1.0),
                (2, 3, Echelon::Transport, 1, 4.0),
            ],
        );
        let first = extract_usage(&formulation, &assignment);
        let second = extract_usage(&formulation, &assignment);
        assert_eq!(first, second);
        assert_eq!(
            render_report(&network, 3.0, 12_345.5, &first),
            render_report(&network, 3.0, 12_345.5, &second)
        );
    }

    #[test]
    fn report_lists_points_matrix_and_objectives() {
        let (network, formulation) = setup();
        let assignment = assign(&formulation, &[(2, 3, Echelon::Transport, 1, 4.0)]);
        let usage = extract_usage(&formulation, &assignment);
        let report = render_report(&network, 3.0, 12_345.5, &usage);

        assert!(report.contains("[0] depot"));
        assert!(report.contains("(0.02000, 0.00000)"));
        assert!(report.contains("Row 0: 0.00  2.50  2.50  2.50"));
        assert!(report.contains("Optimal time: 3"));
        assert!(report.contains("Optimal cost: 12345.5"));
        assert!(report.contains("2 -> 3: 4 (collection 0, transport 4)"));
    }

    /// Accepts `room` characters, then refuses.
    struct Cramped {
        room: usize,
    }

    impl fmt::Write for Cramped {
        fn write_str(&mut self, text: &str) -> fmt::Result {
            self.room = self.room.checked_sub(text.len()).ok_or(fmt::Error)?;
            Ok(())
        }
    }

    #[test]
    fn writer_errors_are_propagated() {
        let (network, formulation) = setup();
        let assignment = assign(&formulation, &[(2, 3, Echelon::Transport, 1, 4.0)]);
        let usage = extract_usage(&formulation, &assignment);

        let mut cramped = Cramped { room: 40 };
        assert_eq!(
            write_report(&mut cramped, &network, 3.0, 10.0, &usage),
            Err(fmt::Error)
        );

        let full = render_report(&network, 3.0, 10.0, &usage);
        let mut roomy = Cramped { room: full.len() };
        assert_eq!(write_report(&mut roomy, &network, 3.0, 10.0, &usage), Ok(()));
        assert_eq!(roomy.room, 0);
    }

    #[test]
    fn serializes_as_entry_list() {
        let (_, formulation) = setup();
        let assignment = assign(&formulation, &[(1, 2, Echelon::Collection, 1, 2.0)]);
        let usage = extract_usage(&formulation, &assignment);
        let json = serde_json::to_string(&usage).expect("serialize");
        assert_eq!(json, r#"[{"from":1,"to":2,"collection":2,"transport":0}]"#);
        let back: UsageMap = serde_json::from_str(&json).expect("deserialize");
        assert_eq!(back, usage);
    }
}
