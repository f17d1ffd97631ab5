//! Incremental path coverage.
//!
//! Probes report each executed instruction as a [`CoverageNode`]. The
//! [`CoverageTracker`] keeps the append-only log of those nodes, collapses immediate
//! repeats, and checks each new node against an optional [`ExpectedPath`] supplied by
//! the engine. Nodes produced since the last [`CoverageTracker::flush_new_nodes`] are
//! what gets shipped to the engine as a coverage delta.

mod node;
mod path;
mod tracker;

pub use node::{CoverageNode, COVERAGE_NODE_SIZE};
pub use path::ExpectedPath;
pub use tracker::{CoverageStep, CoverageTracker};
