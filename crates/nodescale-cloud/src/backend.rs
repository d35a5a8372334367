//! The capability contract every cloud backend implements.

use async_trait::async_trait;

use nodescale_core::{GroupId, ResourceRef};

use crate::error::CloudResult;

/// Minimal set of operations the autoscaler needs from a cloud.
///
/// Implemented once per backend and selected at startup from config.
/// Every async method is a blocking round trip to the control plane
/// (except `resolve_group`, which is served by the membership cache);
/// no timeouts are applied at this layer.
#[async_trait]
pub trait CloudBackend: Send + Sync {
    /// Backend name, also the provider-id scheme of its nodes (`aws`, `gce`).
    fn name(&self) -> &'static str;

    /// Parse the identifier part of a `min:max:identifier` spec.
    fn parse_group_id(&self, identifier: &str) -> CloudResult<GroupId>;

    /// Human-readable, backend-specific id of a group.
    fn group_url(&self, group: &GroupId) -> String;

    /// Parse a node's provider id into a resource reference.
    fn parse_provider_id(&self, provider_id: &str) -> CloudResult<ResourceRef>;

    /// Add a group to the membership cache's refresh set.
    async fn register_group(&self, group: GroupId);

    /// Current target size of the group.
    async fn group_size(&self, group: &GroupId) -> CloudResult<u32>;

    /// Set the target size of the group.
    async fn set_group_size(&self, group: &GroupId, size: u32) -> CloudResult<()>;

    /// Delete instances from `group`.
    ///
    /// Every reference must resolve to `group`; otherwise nothing is
    /// deleted and an error is returned.
    async fn delete_members(&self, group: &GroupId, members: &[ResourceRef]) -> CloudResult<()>;

    /// The group owning `resource`, or `None` if no configured group does.
    async fn resolve_group(&self, resource: &ResourceRef) -> CloudResult<Option<GroupId>>;
}
