//! AWS backend — auto scaling groups.
//!
//! Group identifiers are `<availability-zone>/<asg-name>`; node provider
//! ids are `aws://<availability-zone>/<instance-id>`.

use std::sync::Arc;

use async_trait::async_trait;
use tracing::debug;

use nodescale_core::{GroupId, ParseError, ResourceRef};

use crate::backend::CloudBackend;
use crate::cache::{MemberLister, MembershipCache};
use crate::error::{CloudError, CloudResult};

const BACKEND: &str = "aws";

/// One auto scaling group as described by the control plane.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AsgDescription {
    pub name: String,
    pub desired_capacity: u32,
    pub instance_ids: Vec<String>,
}

/// One instance as described by the control plane.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AsgInstance {
    pub instance_id: String,
    pub group_name: String,
    pub availability_zone: String,
}

/// The subset of the AWS auto scaling API the manager calls.
///
/// Every call asks for exactly one record.
#[async_trait]
pub trait AutoscalingApi: Send + Sync {
    async fn describe_group(&self, name: &str) -> CloudResult<Option<AsgDescription>>;

    async fn describe_instance(&self, instance_id: &str) -> CloudResult<Option<AsgInstance>>;

    async fn set_desired_capacity(
        &self,
        name: &str,
        size: u32,
        honor_cooldown: bool,
    ) -> CloudResult<()>;

    async fn terminate_instance(&self, instance_id: &str, decrement_desired: bool) -> CloudResult<()>;
}

/// Lists ASG members with the zone each instance actually runs in.
struct AsgLister {
    api: Arc<dyn AutoscalingApi>,
}

#[async_trait]
impl MemberLister for AsgLister {
    async fn list_members(&self, group: &GroupId) -> CloudResult<Vec<ResourceRef>> {
        let asg = self
            .api
            .describe_group(&group.name)
            .await?
            .ok_or_else(|| CloudError::UnknownGroup(group.to_string()))?;

        let mut members = Vec::with_capacity(asg.instance_ids.len());
        for instance_id in &asg.instance_ids {
            match self.api.describe_instance(instance_id).await? {
                Some(details) => members.push(ResourceRef::new(&details.availability_zone, instance_id)),
                None => debug!(%group, %instance_id, "instance vanished during listing"),
            }
        }
        Ok(members)
    }
}

/// AWS implementation of [`CloudBackend`].
pub struct AwsManager {
    api: Arc<dyn AutoscalingApi>,
    cache: Arc<MembershipCache>,
}

impl AwsManager {
    pub fn new(api: Arc<dyn AutoscalingApi>) -> Self {
        let lister = Arc::new(AsgLister { api: api.clone() });
        Self {
            api,
            cache: Arc::new(MembershipCache::new(BACKEND, lister)),
        }
    }

    pub fn cache(&self) -> &Arc<MembershipCache> {
        &self.cache
    }
}

#[async_trait]
impl CloudBackend for AwsManager {
    fn name(&self) -> &'static str {
        BACKEND
    }

    fn parse_group_id(&self, identifier: &str) -> CloudResult<GroupId> {
        match identifier.split('/').collect::<Vec<_>>().as_slice() {
            [zone, name] if !zone.is_empty() && !name.is_empty() => Ok(GroupId::new(zone, name)),
            _ => Err(ParseError::GroupId {
                expected: "<availability-zone>/<asg-name>".to_string(),
                got: identifier.to_string(),
            }
            .into()),
        }
    }

    fn group_url(&self, group: &GroupId) -> String {
        format!("{}/{}", group.zone, group.name)
    }

    fn parse_provider_id(&self, provider_id: &str) -> CloudResult<ResourceRef> {
        Ok(ResourceRef::from_provider_id(provider_id, BACKEND)?)
    }

    async fn register_group(&self, group: GroupId) {
        self.cache.register_group(group).await;
    }

    async fn group_size(&self, group: &GroupId) -> CloudResult<u32> {
        let asg = self
            .api
            .describe_group(&group.name)
            .await?
            .ok_or_else(|| CloudError::UnknownGroup(group.to_string()))?;
        Ok(asg.desired_capacity)
    }

    async fn set_group_size(&self, group: &GroupId, size: u32) -> CloudResult<()> {
        self.api.set_desired_capacity(&group.name, size, false).await
    }

    async fn delete_members(&self, group: &GroupId, members: &[ResourceRef]) -> CloudResult<()> {
        if members.is_empty() {
            return Ok(());
        }
        self.cache.ensure_members_of(group, members).await?;

        for member in members {
            debug!(%group, instance = %member.name, "terminating instance");
            self.api.terminate_instance(&member.name, true).await?;
        }
        Ok(())
    }

    async fn resolve_group(&self, resource: &ResourceRef) -> CloudResult<Option<GroupId>> {
        self.cache.lookup(resource).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::memory::InMemoryAutoscaling;

    async fn manager() -> (Arc<InMemoryAutoscaling>, AwsManager) {
        let api = Arc::new(InMemoryAutoscaling::new());
        api.add_group("workers", 2);
        api.add_instance("workers", "i-1", "us-east-1a");
        api.add_instance("workers", "i-2", "us-east-1a");
        api.add_group("batch", 1);
        api.add_instance("batch", "i-9", "us-east-1a");

        let manager = AwsManager::new(api.clone());
        manager.register_group(GroupId::new("us-east-1a", "workers")).await;
        manager.register_group(GroupId::new("us-east-1a", "batch")).await;
        (api, manager)
    }

    #[test]
    fn parse_group_ids() {
        let api = Arc::new(InMemoryAutoscaling::new());
        let manager = AwsManager::new(api);
        assert_eq!(
            manager.parse_group_id("us-east-1a/workers").unwrap(),
            GroupId::new("us-east-1a", "workers")
        );
        assert!(manager.parse_group_id("workers").is_err());
        assert!(manager.parse_group_id("a/b/c").is_err());
        assert!(manager.parse_provider_id("aws://us-east-1a/i-1").is_ok());
        assert!(manager.parse_provider_id("gce://p/z/n").is_err());
    }

    #[tokio::test]
    async fn size_round_trip() {
        let (api, manager) = manager().await;
        let workers = GroupId::new("us-east-1a", "workers");
        assert_eq!(manager.group_size(&workers).await.unwrap(), 2);
        manager.set_group_size(&workers, 4).await.unwrap();
        assert_eq!(api.desired("workers"), Some(4));
    }

    #[tokio::test]
    async fn unknown_group_size_is_an_error() {
        let (_, manager) = manager().await;
        assert!(matches!(
            manager.group_size(&GroupId::new("us-east-1a", "nope")).await,
            Err(CloudError::UnknownGroup(_))
        ));
    }

    #[tokio::test]
    async fn resolve_uses_instance_zone() {
        let (api, manager) = manager().await;
        api.add_instance("workers", "i-3", "us-east-1b");
        manager.cache().refresh().await.unwrap();

        assert_eq!(
            manager
                .resolve_group(&ResourceRef::new("us-east-1b", "i-3"))
                .await
                .unwrap(),
            Some(GroupId::new("us-east-1a", "workers"))
        );
    }

    #[tokio::test]
    async fn mixed_group_delete_issues_no_termination() {
        let (api, manager) = manager().await;
        let err = manager
            .delete_members(
                &GroupId::new("us-east-1a", "workers"),
                &[
                    ResourceRef::new("us-east-1a", "i-1"),
                    ResourceRef::new("us-east-1a", "i-9"),
                ],
            )
            .await
            .unwrap_err();
        assert!(matches!(err, CloudError::MixedGroups { .. }));
        assert_eq!(api.terminate_calls(), 0);
    }

    #[tokio::test]
    async fn delete_terminates_with_decrement() {
        let (api, manager) = manager().await;
        manager
            .delete_members(
                &GroupId::new("us-east-1a", "workers"),
                &[ResourceRef::new("us-east-1a", "i-1")],
            )
            .await
            .unwrap();
        assert_eq!(api.terminate_calls(), 1);
        assert_eq!(api.desired("workers"), Some(1));
    }

    #[tokio::test]
    async fn backend_failure_surfaces() {
        let (api, manager) = manager().await;
        api.set_failing(true);
        assert!(matches!(
            manager.group_size(&GroupId::new("us-east-1a", "workers")).await,
            Err(CloudError::Backend { backend: "aws", .. })
        ));
    }
}
