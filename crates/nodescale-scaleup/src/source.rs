//! Where a scale-up cycle gets its view of the cluster.

use std::sync::RwLock;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use nodescale_core::{NodeShape, PodSpec};

/// Observed cluster state for one cycle.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClusterSnapshot {
    #[serde(default)]
    pub nodes: Vec<NodeShape>,
    /// Pods the scheduler could not place.
    #[serde(default)]
    pub pods: Vec<PodSpec>,
}

/// Polls the cluster for pending pods and nodes.
#[async_trait]
pub trait ClusterSource: Send + Sync {
    async fn unschedulable_pods(&self) -> anyhow::Result<Vec<PodSpec>>;
    async fn nodes(&self) -> anyhow::Result<Vec<NodeShape>>;
}

/// Serves a fixed snapshot until it is replaced.
#[derive(Debug, Default)]
pub struct StaticClusterSource {
    snapshot: RwLock<ClusterSnapshot>,
}

impl StaticClusterSource {
    pub fn new(snapshot: ClusterSnapshot) -> Self {
        Self {
            snapshot: RwLock::new(snapshot),
        }
    }

    pub fn replace(&self, snapshot: ClusterSnapshot) {
        *self
            .snapshot
            .write()
            .unwrap_or_else(|poisoned| poisoned.into_inner()) = snapshot;
    }

    fn read(&self) -> ClusterSnapshot {
        self.snapshot
            .read()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .clone()
    }
}

#[async_trait]
impl ClusterSource for StaticClusterSource {
    async fn unschedulable_pods(&self) -> anyhow::Result<Vec<PodSpec>> {
        Ok(self.read().pods)
    }

    async fn nodes(&self) -> anyhow::Result<Vec<NodeShape>> {
        Ok(self.read().nodes)
    }
}
