//! Core types and planning pipeline for disaster-waste clean-up logistics.
//!
//! The planner decides when each demolition site is cleared and how waste moves from
//! customers through temporary storage sites to final disposal, using a two-stage
//! mixed-integer model: minimise completion time first, then minimise cost within a
//! small slack of that time.

/// Point placement with per-category caps.
pub mod board;
/// Errors surfaced by a planning attempt.
pub mod error;
/// Solution extraction: arc usage and the plain-text report.
pub mod extract;
/// Builder for the shared constraint block and the per-stage objectives.
pub mod formulation;
/// Solver-neutral representation of a mixed-integer linear program.
pub mod milp;
/// Node categories, coordinates, and the global index layout.
pub mod model;
/// Node set assembly and the pairwise distance matrix.
pub mod network;
/// Problem parameters and their reference defaults.
pub mod params;
/// Two-stage solve procedure tying all components together.
pub mod planner;
/// Traits describing the external distance and solver capabilities.
pub mod ports;

pub use error::*;
pub use model::*;
pub use planner::*;
pub use ports::*;
