//! Assembles the indexed node set and its pairwise distance matrix.

use tracing::{debug, info, warn};

use crate::error::PlanError;
use crate::model::{Coordinate, NodeId, NodeLayout, NodeSet};
use crate::ports::{DistanceProvider, ProviderError};

#[derive(Debug, Clone, PartialEq)]
/// Dense row-major `n×n` matrix of travel distances in kilometres.
pub struct DistanceMatrix {
    size: usize,
    cells: Vec<f64>,
}

impl DistanceMatrix {
    /// Build from a full row-major cell vector.
    ///
    /// Returns `None` unless `cells.len() == size * size`.
    #[must_use]
    pub fn from_cells(size: usize, cells: Vec<f64>) -> Option<Self> {
        (cells.len() == size * size).then_some(Self { size, cells })
    }

    /// Matrix with every off-diagonal entry set to `distance`.
    #[must_use]
    pub fn uniform(size: usize, distance: f64) -> Self {
        let cells = (0..size * size)
            .map(|cell| if cell / size == cell % size { 0.0 } else { distance })
            .collect();
        Self { size, cells }
    }

    /// Number of nodes.
    #[must_use]
    pub fn len(&self) -> usize {
        self.size
    }

    /// Whether the matrix has no nodes.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.size == 0
    }

    /// Distance from `from` to `to`; out-of-range ids read as 0.
    #[must_use]
    pub fn get(&self, from: NodeId, to: NodeId) -> f64 {
        if from.get() >= self.size || to.get() >= self.size {
            return 0.0;
        }
        self.cells
            .get(from.get() * self.size + to.get())
            .copied()
            .unwrap_or(0.0)
    }

    /// Rows in node order.
    pub fn rows(&self) -> impl Iterator<Item = &[f64]> {
        self.cells.chunks(self.size.max(1))
    }
}

#[derive(Debug, Clone, PartialEq)]
/// Validated node set together with its distance matrix.
///
/// Stale as soon as the node set changes; rebuild it for every attempt.
pub struct Network {
    /// Coordinates in global index order.
    pub points: Vec<Coordinate>,
    /// Index layout.
    pub layout: NodeLayout,
    /// Pairwise distances.
    pub distances: DistanceMatrix,
}

impl Network {
    /// Assemble a network from parts already known to be consistent.
    ///
    /// # Errors
    ///
    /// Returns [`PlanError::InvalidParameters`] when the sizes disagree.
    pub fn from_parts(
        points: Vec<Coordinate>,
        layout: NodeLayout,
        distances: DistanceMatrix,
    ) -> Result<Self, PlanError> {
        if points.len() != layout.len() || distances.len() != layout.len() {
            return Err(PlanError::InvalidParameters(format!(
                "{} points and a {}-node matrix for a {}-node layout",
                points.len(),
                distances.len(),
                layout.len()
            )));
        }
        Ok(Self {
            points,
            layout,
            distances,
        })
    }

    /// Number of nodes.
    #[must_use]
    pub fn len(&self) -> usize {
        self.layout.len()
    }

    /// A network always holds the depot.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        false
    }

    /// Distance shortcut.
    #[must_use]
    pub fn distance(&self, from: NodeId, to: NodeId) -> f64 {
        self.distances.get(from, to)
    }
}

/// Validate `nodes` and query `provider` once per ordered pair.
///
/// Self pairs are 0 without a query. A [`ProviderError::NoRoute`] answer becomes
/// `unreachable_km` so the model stays feasible while never choosing that arc.
///
/// # Errors
///
/// Returns [`PlanError::MissingNodeCategory`] for an incomplete node set and
/// [`PlanError::DistanceUnavailable`] on the first failed query; no partial matrix is kept.
pub async fn build_network(
    nodes: &NodeSet,
    provider: &dyn DistanceProvider,
    unreachable_km: f64,
) -> Result<Network, PlanError> {
    let layout = nodes.validate()?;
    let points = nodes.ordered();
    let size = points.len();

    info!(nodes = size, "Building distance matrix");

    let mut cells = Vec::with_capacity(size * size);
    for (row, &origin) in points.iter().enumerate() {
        for (col, &destination) in points.iter().enumerate() {
            if row == col {
                cells.push(0.0);
                continue;
            }
            let distance = match provider.distance(origin, destination).await {
                Ok(km) if km.is_finite() && km >= 0.0 => km,
                Ok(km) => {
                    return Err(PlanError::DistanceUnavailable {
                        from: NodeId(row),
                        to: NodeId(col),
                        source: ProviderError::Malformed(format!("distance {km} km")),
                    });
                }
                Err(ProviderError::NoRoute) => {
                    warn!(from = row, to = col, "No road path, using sentinel distance");
                    unreachable_km
                }
                Err(source) => {
                    return Err(PlanError::DistanceUnavailable {
                        from: NodeId(row),
                        to: NodeId(col),
                        source,
                    });
                }
            };
            debug!(from = row, to = col, km = distance, "Distance resolved");
            cells.push(distance);
        }
    }

    let distances = DistanceMatrix { size, cells };
    Network::from_parts(points, layout, distances)
}
