//! First-fit bin-packing node estimator.
//!
//! Each simulated node ("bin") starts with the sample node's allocatable
//! resources. Pods are placed in insertion order into the first bin with
//! room on every dimension (cpu, memory, pod slots); if none has room a new
//! bin is opened. The result depends only on the sample shape and the
//! order pods were added.

use std::fmt::Write as _;

use serde::Serialize;
use tracing::warn;

use nodescale_core::{NodeShape, PodSpec, Resources};

/// Result of packing the pods onto fresh nodes.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Estimate {
    /// Number of nodes opened.
    pub node_count: u32,
    /// `assignments[i]` is the node index of the i-th added pod.
    pub assignments: Vec<usize>,
    /// Human-readable packing trace.
    pub report: String,
}

/// Accumulates pods that fit a node group's shape.
#[derive(Debug, Clone, Default)]
pub struct NodeEstimator {
    pods: Vec<PodSpec>,
}

impl NodeEstimator {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add(&mut self, pod: PodSpec) {
        self.pods.push(pod);
    }

    /// Number of pods added so far.
    pub fn count(&self) -> usize {
        self.pods.len()
    }

    /// Pods added so far, in insertion order.
    pub fn fitting_pods(&self) -> &[PodSpec] {
        &self.pods
    }

    /// Sum of all pod requests.
    pub fn total_requests(&self) -> Resources {
        self.pods
            .iter()
            .fold(Resources::default(), |acc, pod| acc.saturating_add(&pod.requests()))
    }

    /// One-line summary of what has been added.
    pub fn debug(&self) -> String {
        format!(
            "estimator: {} pods, requested {}",
            self.pods.len(),
            self.total_requests()
        )
    }

    pub fn estimate(&self, node: &NodeShape) -> Estimate {
        let capacity = node.allocatable;
        let mut bins: Vec<Resources> = Vec::new();
        let mut assignments = Vec::with_capacity(self.pods.len());
        let mut report = String::new();
        let _ = writeln!(report, "packing {} pods onto {} ({capacity})", self.pods.len(), node.name);

        for pod in &self.pods {
            let request = pod.requests();
            let slot = bins.iter().position(|free| free.fits(&request));

            let index = match slot {
                Some(index) => index,
                None => {
                    if !capacity.fits(&request) {
                        warn!(pod = %pod, node = %node.name, "pod larger than an empty node, giving it a node of its own");
                    }
                    bins.push(capacity);
                    bins.len() - 1
                }
            };
            bins[index] = bins[index].saturating_sub(&request);
            assignments.push(index);

            let opened = if slot.is_none() { " (new)" } else { "" };
            let _ = writeln!(report, "  {pod} -> node {index}{opened}, left {}", bins[index]);
        }

        let node_count = bins.len() as u32;
        let _ = write!(report, "{node_count} nodes needed");

        Estimate {
            node_count,
            assignments,
            report,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    const GIB: u64 = 1 << 30;

    fn shape(cpu_millis: u64, memory_bytes: u64, pods: u32) -> NodeShape {
        NodeShape::new("sample", "aws://z/i-0", Resources::new(cpu_millis, memory_bytes, pods))
    }

    fn pod(name: &str, cpu_millis: u64, memory_bytes: u64) -> PodSpec {
        PodSpec::new("default", name, cpu_millis, memory_bytes)
    }

    #[test]
    fn empty_estimator_needs_no_nodes() {
        let estimator = NodeEstimator::new();
        let estimate = estimator.estimate(&shape(1000, GIB, 10));
        assert_eq!(estimate.node_count, 0);
        assert!(estimate.assignments.is_empty());
    }

    #[test]
    fn two_per_node_five_pods_needs_three() {
        let mut estimator = NodeEstimator::new();
        for i in 0..5 {
            estimator.add(pod(&format!("p{i}"), 500, GIB / 2));
        }
        let estimate = estimator.estimate(&shape(1000, 4 * GIB, 110));
        assert_eq!(estimate.node_count, 3);
        assert_eq!(estimate.assignments, vec![0, 0, 1, 1, 2]);
        assert_eq!(estimator.count(), 5);
        assert!(estimate.report.ends_with("3 nodes needed"));
    }

    #[test]
    fn memory_is_a_packing_dimension() {
        let mut estimator = NodeEstimator::new();
        for i in 0..3 {
            estimator.add(pod(&format!("p{i}"), 10, 3 * GIB));
        }
        assert_eq!(estimator.estimate(&shape(8000, 4 * GIB, 110)).node_count, 3);
    }

    #[test]
    fn pod_slots_are_a_packing_dimension() {
        let mut estimator = NodeEstimator::new();
        for i in 0..4 {
            estimator.add(pod(&format!("p{i}"), 1, 1));
        }
        assert_eq!(estimator.estimate(&shape(8000, 4 * GIB, 2)).node_count, 2);
    }

    #[test]
    fn first_fit_backfills_earlier_nodes() {
        let mut estimator = NodeEstimator::new();
        estimator.add(pod("big", 700, GIB));
        estimator.add(pod("big2", 700, GIB));
        estimator.add(pod("small", 300, GIB));
        let estimate = estimator.estimate(&shape(1000, 4 * GIB, 110));
        assert_eq!(estimate.assignments, vec![0, 1, 0]);
        assert_eq!(estimate.node_count, 2);
    }

    #[test]
    fn oversized_pod_gets_its_own_node() {
        let mut estimator = NodeEstimator::new();
        estimator.add(pod("huge", 5000, GIB));
        estimator.add(pod("small", 100, GIB));
        let estimate = estimator.estimate(&shape(1000, 4 * GIB, 110));
        assert_eq!(estimate.node_count, 2);
        assert_eq!(estimate.assignments, vec![0, 1]);
    }

    #[test]
    fn debug_sums_requests() {
        let mut estimator = NodeEstimator::new();
        estimator.add(pod("a", 100, GIB));
        estimator.add(pod("b", 200, GIB));
        assert_eq!(estimator.total_requests(), Resources::new(300, 2 * GIB, 2));
        assert!(estimator.debug().contains("2 pods"));
    }

    proptest! {
        #[test]
        fn estimate_is_deterministic(
            requests in proptest::collection::vec((1u64..2000, 1u64..(4 * GIB)), 0..40),
        ) {
            let mut estimator = NodeEstimator::new();
            for (i, (cpu, mem)) in requests.iter().enumerate() {
                estimator.add(pod(&format!("p{i}"), *cpu, *mem));
            }
            let node = shape(2000, 4 * GIB, 30);
            let first = estimator.estimate(&node);
            let second = estimator.clone().estimate(&node);
            prop_assert_eq!(&first, &second);
            prop_assert_eq!(first.assignments.len(), requests.len());
            prop_assert!(first.node_count as usize <= requests.len());
        }
    }
}
