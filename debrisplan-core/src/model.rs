//! Domain data structures for placed points and their global node indices.

use std::fmt;
use std::ops::Range;

use serde::{Deserialize, Serialize};

use crate::error::PlanError;

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
/// Geographic point in decimal degrees.
pub struct Coordinate {
    /// Latitude in degrees.
    pub lat: f64,
    /// Longitude in degrees.
    pub lon: f64,
}

impl Coordinate {
    /// Create a coordinate from a latitude/longitude pair.
    #[must_use]
    pub const fn new(lat: f64, lon: f64) -> Self {
        Self { lat, lon }
    }
}

impl fmt::Display for Coordinate {
    fn fmt(&self, formatter: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(formatter, "({:.5}, {:.5})", self.lat, self.lon)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
/// Role a node plays in the clean-up network.
pub enum NodeKind {
    /// Vehicle base where every tour starts and ends.
    Depot,
    /// Demolition site that generates waste.
    Customer,
    /// Temporary storage and processing site.
    Site,
    /// Final disposal destination.
    Final,
}

impl fmt::Display for NodeKind {
    fn fmt(&self, formatter: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            NodeKind::Depot => "depot",
            NodeKind::Customer => "customer",
            NodeKind::Site => "intermediate site",
            NodeKind::Final => "final site",
        };
        write!(formatter, "{label}")
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
/// Global node index; the depot is always `NodeId(0)`.
pub struct NodeId(pub usize);

impl NodeId {
    /// The depot index.
    pub const DEPOT: NodeId = NodeId(0);

    /// Raw index value.
    #[must_use]
    pub const fn get(self) -> usize {
        self.0
    }
}

impl fmt::Display for NodeId {
    fn fmt(&self, formatter: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(formatter, "{}", self.0)
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
/// Raw planner input: placed points grouped by category.
pub struct NodeSet {
    /// The single depot, if one was placed.
    #[serde(default)]
    pub depot: Option<Coordinate>,
    /// Demolition sites.
    #[serde(default)]
    pub customers: Vec<Coordinate>,
    /// Temporary storage sites.
    #[serde(default)]
    pub sites: Vec<Coordinate>,
    /// Final disposal sites.
    #[serde(default)]
    pub finals: Vec<Coordinate>,
}

impl NodeSet {
    /// Check that every category is present and derive the index layout.
    ///
    /// # Errors
    ///
    /// Returns [`PlanError::MissingNodeCategory`] naming the first empty category.
    pub fn validate(&self) -> Result<NodeLayout, PlanError> {
        if self.depot.is_none() {
            return Err(PlanError::MissingNodeCategory(NodeKind::Depot));
        }
        for (kind, count) in [
            (NodeKind::Customer, self.customers.len()),
            (NodeKind::Site, self.sites.len()),
            (NodeKind::Final, self.finals.len()),
        ] {
            if count == 0 {
                return Err(PlanError::MissingNodeCategory(kind));
            }
        }
        Ok(NodeLayout::new(
            self.customers.len(),
            self.sites.len(),
            self.finals.len(),
        ))
    }

    /// All coordinates in global index order: depot, customers, sites, finals.
    #[must_use]
    pub fn ordered(&self) -> Vec<Coordinate> {
        self.depot
            .iter()
            .chain(&self.customers)
            .chain(&self.sites)
            .chain(&self.finals)
            .copied()
            .collect()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
/// Bijection between `(kind, local index)` and global [`NodeId`].
///
/// Ranges are contiguous: `[depot][customers][sites][finals]`.
pub struct NodeLayout {
    customers: usize,
    sites: usize,
    finals: usize,
}

impl NodeLayout {
    /// Layout for the given category sizes (one depot implied).
    #[must_use]
    pub const fn new(customers: usize, sites: usize, finals: usize) -> Self {
        Self {
            customers,
            sites,
            finals,
        }
    }

    /// Total node count including the depot.
    #[must_use]
    pub const fn len(&self) -> usize {
        1 + self.customers + self.sites + self.finals
    }

    /// A layout always holds the depot.
    #[must_use]
    pub const fn is_empty(&self) -> bool {
        false
    }

    /// Number of customers.
    #[must_use]
    pub const fn customer_count(&self) -> usize {
        self.customers
    }

    /// Number of intermediate sites.
    #[must_use]
    pub const fn site_count(&self) -> usize {
        self.sites
    }

    /// Number of final sites.
    #[must_use]
    pub const fn final_count(&self) -> usize {
        self.finals
    }

    /// Global ids of all customers.
    #[must_use]
    pub fn customers(&self) -> Range<usize> {
        1..1 + self.customers
    }

    /// Global ids of all intermediate sites.
    #[must_use]
    pub fn sites(&self) -> Range<usize> {
        let start = 1 + self.customers;
        start..start + self.sites
    }

    /// Global ids of all final sites.
    #[must_use]
    pub fn finals(&self) -> Range<usize> {
        let start = 1 + self.customers + self.sites;
        start..start + self.finals
    }

    /// Global ids belonging to `kind`.
    #[must_use]
    pub fn range(&self, kind: NodeKind) -> Range<usize> {
        match kind {
            NodeKind::Depot => 0..1,
            NodeKind::Customer => self.customers(),
            NodeKind::Site => self.sites(),
            NodeKind::Final => self.finals(),
        }
    }

    /// Global id of the `local`-th node of `kind`, if it exists.
    #[must_use]
    pub fn node(&self, kind: NodeKind, local: usize) -> Option<NodeId> {
        let range = self.range(kind);
        let id = range.start + local;
        range.contains(&id).then_some(NodeId(id))
    }

    /// Category and local index of a global id.
    #[must_use]
    pub fn locate(&self, id: NodeId) -> Option<(NodeKind, usize)> {
        [
            NodeKind::Depot,
            NodeKind::Customer,
            NodeKind::Site,
            NodeKind::Final,
        ]
        .into_iter()
        .find_map(|kind| {
            let range = self.range(kind);
            range
                .contains(&id.get())
                .then(|| (kind, id.get() - range.start))
        })
    }

    /// Category of a global id.
    #[must_use]
    pub fn kind_of(&self, id: NodeId) -> Option<NodeKind> {
        self.locate(id).map(|(kind, _)| kind)
    }
}
