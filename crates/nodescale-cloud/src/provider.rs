//! Cloud provider — all configured node groups of one backend.
//!
//! Group discovery for scale-up is the same for every backend: a group is
//! a candidate only if at least one observed node belongs to it, and that
//! node becomes the group's sample machine shape.

use std::collections::HashSet;
use std::sync::Arc;

use tracing::{debug, info};

use nodescale_core::{GroupId, NodeGroupSpec, NodeShape};

use crate::backend::CloudBackend;
use crate::error::{CloudError, CloudResult};
use crate::node_group::NodeGroup;

/// A node group worth considering for scale-up, with an observed member
/// whose shape stands in for a new node.
#[derive(Debug, Clone)]
pub struct NodeGroupCandidate {
    pub group: Arc<NodeGroup>,
    pub sample_node: NodeShape,
}

pub struct CloudProvider {
    backend: Arc<dyn CloudBackend>,
    groups: Vec<Arc<NodeGroup>>,
}

impl CloudProvider {
    /// Build a provider from `min:max:identifier` spec strings.
    ///
    /// Any malformed spec fails the whole build; no partially configured
    /// provider is returned.
    pub async fn build(backend: Arc<dyn CloudBackend>, specs: &[String]) -> CloudResult<Self> {
        let mut groups: Vec<Arc<NodeGroup>> = Vec::with_capacity(specs.len());
        for spec in specs {
            let parsed = NodeGroupSpec::parse(spec)?;
            let group = NodeGroup::from_spec(&parsed, backend.clone())?;
            if groups.iter().any(|g| g.group_id() == group.group_id()) {
                return Err(CloudError::DuplicateGroup(group.id()));
            }
            groups.push(Arc::new(group));
        }

        for group in &groups {
            backend.register_group(group.group_id().clone()).await;
            info!(backend = backend.name(), group = %group.debug(), "node group configured");
        }

        Ok(Self { backend, groups })
    }

    pub fn name(&self) -> &'static str {
        self.backend.name()
    }

    pub fn backend(&self) -> &Arc<dyn CloudBackend> {
        &self.backend
    }

    /// Every configured group.
    pub fn node_groups(&self) -> &[Arc<NodeGroup>] {
        &self.groups
    }

    fn group_by_id(&self, id: &GroupId) -> Option<Arc<NodeGroup>> {
        self.groups.iter().find(|g| g.group_id() == id).cloned()
    }

    /// The configured group owning `node`.
    ///
    /// Nodes of another backend resolve to `None`.
    pub async fn node_group_for_node(&self, node: &NodeShape) -> CloudResult<Option<Arc<NodeGroup>>> {
        if node.provider_scheme() != Some(self.backend.name()) {
            return Ok(None);
        }
        let resource = self.backend.parse_provider_id(&node.provider_id)?;
        let owner = self.backend.resolve_group(&resource).await?;
        Ok(owner.and_then(|id| self.group_by_id(&id)))
    }

    /// Groups with at least one member among `nodes`, in first-seen order.
    pub async fn get_node_groups(&self, nodes: &[NodeShape]) -> CloudResult<Vec<NodeGroupCandidate>> {
        let mut seen: HashSet<GroupId> = HashSet::new();
        let mut candidates = Vec::new();

        for node in nodes {
            // An unmanaged node in a configured zone costs one full cache refresh.
            let Some(group) = self.node_group_for_node(node).await? else {
                continue;
            };
            if seen.insert(group.group_id().clone()) {
                debug!(group = %group, sample = %node.name, "node group discovered");
                candidates.push(NodeGroupCandidate {
                    group,
                    sample_node: node.clone(),
                });
            }
        }
        Ok(candidates)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::aws::AwsManager;
    use crate::memory::InMemoryAutoscaling;
    use nodescale_core::Resources;

    fn node(name: &str, provider_id: &str) -> NodeShape {
        NodeShape::new(name, provider_id, Resources::new(2000, 4 << 30, 10))
    }

    async fn provider(specs: &[&str]) -> (Arc<InMemoryAutoscaling>, CloudResult<CloudProvider>) {
        let api = Arc::new(InMemoryAutoscaling::new());
        api.add_group("workers", 2);
        api.add_instance("workers", "i-1", "us-east-1a");
        api.add_instance("workers", "i-2", "us-east-1a");
        api.add_group("batch", 1);
        api.add_instance("batch", "i-9", "us-east-1a");
        api.add_group("idle", 1);

        let backend = Arc::new(AwsManager::new(api.clone()));
        let specs: Vec<String> = specs.iter().map(|s| s.to_string()).collect();
        (api, CloudProvider::build(backend, &specs).await)
    }

    #[tokio::test]
    async fn build_rejects_any_bad_spec() {
        let (_, result) = provider(&["1:5:us-east-1a/workers", "0:5:us-east-1a/batch"]).await;
        assert!(matches!(result, Err(CloudError::Parse(_))));

        let (_, result) = provider(&["1:5:us-east-1a/workers", "1:5:workers"]).await;
        assert!(matches!(result, Err(CloudError::Parse(_))));

        let (_, result) = provider(&["1:5:us-east-1a/workers", "2:6:us-east-1a/workers"]).await;
        assert!(matches!(result, Err(CloudError::DuplicateGroup(_))));
    }

    #[tokio::test]
    async fn discovery_is_filtered_to_observed_groups() {
        let (_, result) = provider(&[
            "1:5:us-east-1a/workers",
            "1:5:us-east-1a/batch",
            "1:5:us-east-1a/idle",
        ])
        .await;
        let provider = result.unwrap();
        assert_eq!(provider.node_groups().len(), 3);

        let nodes = vec![
            node("n2", "aws://us-east-1a/i-2"),
            node("n1", "aws://us-east-1a/i-1"),
            node("b", "aws://us-east-1a/i-9"),
            node("g", "gce://acme/europe-west1-b/x"),
            node("stray", "aws://us-west-2a/i-77"),
        ];
        let candidates = provider.get_node_groups(&nodes).await.unwrap();
        let ids: Vec<String> = candidates.iter().map(|c| c.group.id()).collect();
        assert_eq!(ids, vec!["us-east-1a/workers", "us-east-1a/batch"]);
        assert_eq!(candidates[0].sample_node.name, "n2");
    }

    #[tokio::test]
    async fn malformed_provider_id_fails_discovery() {
        let (_, result) = provider(&["1:5:us-east-1a/workers"]).await;
        let provider = result.unwrap();
        let nodes = vec![node("bad", "aws://us-east-1a")];
        assert!(matches!(
            provider.get_node_groups(&nodes).await,
            Err(CloudError::Parse(_))
        ));
    }

    #[tokio::test]
    async fn refresh_failure_fails_discovery() {
        let (api, result) = provider(&["1:5:us-east-1a/workers"]).await;
        let provider = result.unwrap();
        api.set_failing(true);
        let nodes = vec![node("n1", "aws://us-east-1a/i-1")];
        assert!(matches!(
            provider.get_node_groups(&nodes).await,
            Err(CloudError::Backend { .. })
        ));
    }

    #[tokio::test]
    async fn node_group_for_node() {
        let (_, result) = provider(&["1:5:us-east-1a/workers"]).await;
        let provider = result.unwrap();
        let group = provider
            .node_group_for_node(&node("n1", "aws://us-east-1a/i-1"))
            .await
            .unwrap()
            .unwrap();
        assert_eq!(group.id(), "us-east-1a/workers");
        // Member of an unconfigured group in a configured zone.
        assert!(provider
            .node_group_for_node(&node("b", "aws://us-east-1a/i-9"))
            .await
            .unwrap()
            .is_none());
    }
}
