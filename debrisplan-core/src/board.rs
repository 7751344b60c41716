//! Accumulates placed points before a planning attempt.

use crate::model::{Coordinate, NodeKind, NodeSet};

/// Maximum number of depots on a board.
pub const MAX_DEPOTS: usize = 1;
/// Maximum number of final disposal sites on a board.
pub const MAX_FINALS: usize = 3;

#[derive(thiserror::Error, Debug, Clone, Copy, PartialEq, Eq)]
/// Rejected placements.
pub enum PlacementError {
    /// A depot is already placed.
    #[error("Only {MAX_DEPOTS} depot can be placed")]
    DepotLimit,
    /// The final-site cap is reached.
    #[error("At most {MAX_FINALS} final disposal sites can be placed")]
    FinalLimit,
}

#[derive(Debug, Clone, Default)]
/// Placed points grouped by category.
pub struct PointBoard {
    nodes: NodeSet,
}

impl PointBoard {
    /// Empty board.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Place a point of the given kind.
    ///
    /// # Errors
    ///
    /// Returns a [`PlacementError`] when the category cap is reached; the board is unchanged.
    pub fn place(&mut self, kind: NodeKind, point: Coordinate) -> Result<(), PlacementError> {
        match kind {
            NodeKind::Depot => {
                if self.nodes.depot.is_some() {
                    return Err(PlacementError::DepotLimit);
                }
                self.nodes.depot = Some(point);
            }
            NodeKind::Customer => self.nodes.customers.push(point),
            NodeKind::Site => self.nodes.sites.push(point),
            NodeKind::Final => {
                if self.nodes.finals.len() >= MAX_FINALS {
                    return Err(PlacementError::FinalLimit);
                }
                self.nodes.finals.push(point);
            }
        }
        Ok(())
    }

    /// Number of placed points of `kind`.
    #[must_use]
    pub fn count(&self, kind: NodeKind) -> usize {
        match kind {
            NodeKind::Depot => usize::from(self.nodes.depot.is_some()),
            NodeKind::Customer => self.nodes.customers.len(),
            NodeKind::Site => self.nodes.sites.len(),
            NodeKind::Final => self.nodes.finals.len(),
        }
    }

    /// Whether nothing is placed.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.nodes == NodeSet::default()
    }

    /// Drop every placed point.
    pub fn reset(&mut self) {
        self.nodes = NodeSet::default();
    }

    /// Current placement as planner input.
    #[must_use]
    pub fn node_set(&self) -> &NodeSet {
        &self.nodes
    }
}
