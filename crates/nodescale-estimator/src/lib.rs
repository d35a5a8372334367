//! nodescale-estimator — how many new nodes would a set of pods need?
//!
//! Given a sample node shape and the pods already known to fit it one at a
//! time, [`NodeEstimator`] packs them first-fit into simulated empty nodes
//! and reports how many were opened.

pub mod binpacking;

pub use binpacking::{Estimate, NodeEstimator};
