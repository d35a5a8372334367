//! Resource quantities, pending pods, and observed node shapes.
//!
//! These are the values the scale-up engine reasons about. A `PodSpec` is
//! an unschedulable workload unit; a `NodeShape` is one observed machine
//! whose allocatable capacity stands in for a new node of its group.

use std::collections::HashMap;
use std::fmt;

use serde::{Deserialize, Serialize};

// ── Resources ──────────────────────────────────────────────────────

/// A vector of schedulable resources.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Resources {
    /// CPU in millicores.
    #[serde(default)]
    pub cpu_millis: u64,
    /// Memory in bytes.
    #[serde(default)]
    pub memory_bytes: u64,
    /// Pod slots.
    #[serde(default)]
    pub pods: u32,
}

impl Resources {
    pub const fn new(cpu_millis: u64, memory_bytes: u64, pods: u32) -> Self {
        Self {
            cpu_millis,
            memory_bytes,
            pods,
        }
    }

    /// True if `request` fits into `self` on every dimension.
    pub fn fits(&self, request: &Resources) -> bool {
        request.cpu_millis <= self.cpu_millis
            && request.memory_bytes <= self.memory_bytes
            && request.pods <= self.pods
    }

    pub fn saturating_sub(&self, other: &Resources) -> Resources {
        Resources {
            cpu_millis: self.cpu_millis.saturating_sub(other.cpu_millis),
            memory_bytes: self.memory_bytes.saturating_sub(other.memory_bytes),
            pods: self.pods.saturating_sub(other.pods),
        }
    }

    pub fn saturating_add(&self, other: &Resources) -> Resources {
        Resources {
            cpu_millis: self.cpu_millis.saturating_add(other.cpu_millis),
            memory_bytes: self.memory_bytes.saturating_add(other.memory_bytes),
            pods: self.pods.saturating_add(other.pods),
        }
    }
}

impl fmt::Display for Resources {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "cpu={}m memory={}Mi pods={}",
            self.cpu_millis,
            self.memory_bytes / (1024 * 1024),
            self.pods
        )
    }
}

// ── Pods ───────────────────────────────────────────────────────────

/// A pending pod the scheduler could not place.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PodSpec {
    pub namespace: String,
    pub name: String,
    /// Requested cpu and memory. `pods` is forced to 1 by [`PodSpec::requests`].
    #[serde(default)]
    pub requests: Resources,
    /// Labels a node must carry for the pod to run there.
    #[serde(default)]
    pub node_selector: HashMap<String, String>,
}

impl PodSpec {
    pub fn new(namespace: &str, name: &str, cpu_millis: u64, memory_bytes: u64) -> Self {
        Self {
            namespace: namespace.to_string(),
            name: name.to_string(),
            requests: Resources::new(cpu_millis, memory_bytes, 1),
            node_selector: HashMap::new(),
        }
    }

    /// `namespace/name`, unique within a cluster.
    pub fn key(&self) -> String {
        format!("{}/{}", self.namespace, self.name)
    }

    /// Requests as consumed on a node: every pod takes one pod slot.
    pub fn requests(&self) -> Resources {
        Resources {
            pods: 1,
            ..self.requests
        }
    }
}

impl fmt::Display for PodSpec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.namespace, self.name)
    }
}

// ── Nodes ──────────────────────────────────────────────────────────

/// A machine observed in the cluster.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NodeShape {
    pub name: String,
    /// Cloud provider id, e.g. `aws://us-east-1a/i-0abc`.
    pub provider_id: String,
    pub allocatable: Resources,
    #[serde(default)]
    pub labels: HashMap<String, String>,
}

impl NodeShape {
    pub fn new(name: &str, provider_id: &str, allocatable: Resources) -> Self {
        Self {
            name: name.to_string(),
            provider_id: provider_id.to_string(),
            allocatable,
            labels: HashMap::new(),
        }
    }

    /// The scheme part of the provider id (`aws`, `gce`), if any.
    pub fn provider_scheme(&self) -> Option<&str> {
        self.provider_id.split_once("://").map(|(scheme, _)| scheme)
    }
}
