//! TOML scenario files: placed points, parameter overrides, and solver budgets.

use std::fs;
use std::path::Path;
use std::time::Duration;

use anyhow::{Context, Result};
use serde::Deserialize;

use debrisplan_core::board::{PlacementError, PointBoard};
use debrisplan_core::params::Parameters;
use debrisplan_core::{NodeKind, NodeSet, PlannerSettings, SolveLimits};

/// Contents of a scenario file.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct Scenario {
    /// Points in placement order per category.
    pub points: NodeSet,
    /// Overrides of the reference parameters.
    pub parameters: Parameters,
    /// Solver budgets.
    pub solver: SolverSection,
}

/// `[solver]` table.
#[derive(Debug, Clone, Copy, Deserialize)]
#[serde(default)]
pub struct SolverSection {
    /// Wall-clock budget per stage in seconds.
    pub time_limit_secs: u64,
    /// Relative gap handed to backends that support it.
    pub mip_gap: Option<f64>,
    /// Periods tolerated on top of the optimal completion measure.
    pub slack: f64,
}

impl Default for SolverSection {
    fn default() -> Self {
        let limits = SolveLimits::default();
        Self {
            time_limit_secs: limits.time_limit.as_secs(),
            mip_gap: limits.mip_gap,
            slack: PlannerSettings::default().slack,
        }
    }
}

impl SolverSection {
    /// Planner settings, with `time_limit` overriding the file when given.
    pub fn settings(&self, time_limit: Option<u64>) -> PlannerSettings {
        let limits = SolveLimits {
            time_limit: Duration::from_secs(time_limit.unwrap_or(self.time_limit_secs)),
            mip_gap: self.mip_gap,
        };
        PlannerSettings {
            time_limits: limits,
            cost_limits: limits,
            slack: self.slack,
        }
    }
}

impl Scenario {
    /// Read and parse a scenario file.
    pub fn load(path: &Path) -> Result<Self> {
        let raw = fs::read_to_string(path)
            .with_context(|| format!("reading scenario {}", path.display()))?;
        Self::parse(&raw).with_context(|| format!("parsing scenario {}", path.display()))
    }

    /// Parse scenario TOML.
    pub fn parse(raw: &str) -> Result<Self> {
        Ok(toml::from_str(raw)?)
    }

    /// Place every point on `board` in file order: depot, customers, sites, finals.
    pub fn place_on(&self, board: &mut PointBoard) -> Result<(), PlacementError> {
        let NodeSet {
            depot,
            customers,
            sites,
            finals,
        } = &self.points;
        let placements = depot
            .iter()
            .map(|&point| (NodeKind::Depot, point))
            .chain(customers.iter().map(|&point| (NodeKind::Customer, point)))
            .chain(sites.iter().map(|&point| (NodeKind::Site, point)))
            .chain(finals.iter().map(|&point| (NodeKind::Final, point)));
        for (kind, point) in placements {
            board.place(kind, point)?;
        }
        Ok(())
    }
}
