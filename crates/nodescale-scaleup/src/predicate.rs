//! Scheduling predicates — can a pod run on a node of a given shape?

use nodescale_core::{NodeShape, PodSpec};
use thiserror::Error;

/// Why a pod cannot be placed on a node.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{reason}")]
pub struct PredicateFailure {
    pub reason: String,
}

impl PredicateFailure {
    pub fn new(reason: impl Into<String>) -> Self {
        Self {
            reason: reason.into(),
        }
    }
}

/// Decides whether a pod fits a node.
///
/// The engine calls this with each group's sample node, so the node stands
/// in for a freshly provisioned, empty machine of that group.
pub trait PredicateChecker: Send + Sync {
    fn check(&self, pod: &PodSpec, node: &NodeShape) -> Result<(), PredicateFailure>;
}

/// Checks the pod's node selector against the node's labels, then its
/// requests against the node's allocatable resources.
#[derive(Debug, Clone, Copy, Default)]
pub struct ResourceFitChecker;

impl PredicateChecker for ResourceFitChecker {
    fn check(&self, pod: &PodSpec, node: &NodeShape) -> Result<(), PredicateFailure> {
        for (key, wanted) in &pod.node_selector {
            match node.labels.get(key) {
                Some(value) if value == wanted => {}
                Some(value) => {
                    return Err(PredicateFailure::new(format!(
                        "node selector {key}={wanted} does not match label {key}={value}"
                    )));
                }
                None => {
                    return Err(PredicateFailure::new(format!(
                        "node selector {key}={wanted} does not match: label missing"
                    )));
                }
            }
        }

        let request = pod.requests();
        let free = node.allocatable;
        if request.cpu_millis > free.cpu_millis {
            return Err(PredicateFailure::new(format!(
                "insufficient cpu: requested {}m, allocatable {}m",
                request.cpu_millis, free.cpu_millis
            )));
        }
        if request.memory_bytes > free.memory_bytes {
            return Err(PredicateFailure::new(format!(
                "insufficient memory: requested {} bytes, allocatable {} bytes",
                request.memory_bytes, free.memory_bytes
            )));
        }
        if request.pods > free.pods {
            return Err(PredicateFailure::new("no pod slots on node"));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use nodescale_core::Resources;

    fn node() -> NodeShape {
        let mut node = NodeShape::new("n1", "aws://z/i-1", Resources::new(2000, 4 << 30, 10));
        node.labels.insert("pool".to_string(), "general".to_string());
        node
    }

    #[test]
    fn pod_within_allocatable_fits() {
        let pod = PodSpec::new("default", "web", 2000, 4 << 30);
        assert!(ResourceFitChecker.check(&pod, &node()).is_ok());
    }

    #[test]
    fn cpu_and_memory_are_checked() {
        let err = ResourceFitChecker
            .check(&PodSpec::new("default", "cpu", 2001, 1), &node())
            .unwrap_err();
        assert!(err.reason.contains("insufficient cpu"));

        let err = ResourceFitChecker
            .check(&PodSpec::new("default", "mem", 1, 5 << 30), &node())
            .unwrap_err();
        assert!(err.reason.contains("insufficient memory"));
    }

    #[test]
    fn node_without_pod_slots_rejects() {
        let mut full = node();
        full.allocatable.pods = 0;
        let pod = PodSpec::new("default", "web", 1, 1);
        assert_eq!(
            ResourceFitChecker.check(&pod, &full),
            Err(PredicateFailure::new("no pod slots on node"))
        );
    }

    #[test]
    fn node_selector_must_match_labels() {
        let mut pod = PodSpec::new("default", "gpu", 1, 1);
        pod.node_selector.insert("pool".to_string(), "gpu".to_string());
        assert!(ResourceFitChecker.check(&pod, &node()).is_err());

        pod.node_selector.insert("pool".to_string(), "general".to_string());
        assert!(ResourceFitChecker.check(&pod, &node()).is_ok());

        pod.node_selector.insert("zone".to_string(), "a".to_string());
        let err = ResourceFitChecker.check(&pod, &node()).unwrap_err();
        assert!(err.reason.contains("label missing"));
    }
}
