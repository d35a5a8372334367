//! Node group — a handle to one elastic pool of machines.
//!
//! Bounds are fixed at construction. The size is never stored locally:
//! every read goes to the backend.

use std::fmt;
use std::sync::Arc;

use tracing::{debug, info};

use nodescale_core::{GroupId, NodeGroupSpec, ResourceRef};

use crate::backend::CloudBackend;
use crate::error::{CloudError, CloudResult};

pub struct NodeGroup {
    id: GroupId,
    min_size: u32,
    max_size: u32,
    backend: Arc<dyn CloudBackend>,
}

impl NodeGroup {
    /// Build a group from a parsed spec string. The backend interprets
    /// the identifier.
    pub fn from_spec(spec: &NodeGroupSpec, backend: Arc<dyn CloudBackend>) -> CloudResult<Self> {
        let id = backend.parse_group_id(&spec.identifier)?;
        Ok(Self {
            id,
            min_size: spec.min_size,
            max_size: spec.max_size,
            backend,
        })
    }

    pub fn group_id(&self) -> &GroupId {
        &self.id
    }

    /// Backend-specific url of the group.
    pub fn id(&self) -> String {
        self.backend.group_url(&self.id)
    }

    /// `"<url> (<min>:<max>)"`.
    pub fn debug(&self) -> String {
        format!("{} ({}:{})", self.id(), self.min_size, self.max_size)
    }

    pub fn backend_name(&self) -> &'static str {
        self.backend.name()
    }

    pub fn min_size(&self) -> u32 {
        self.min_size
    }

    pub fn max_size(&self) -> u32 {
        self.max_size
    }

    /// Current target size, read live from the backend.
    pub async fn current_size(&self) -> CloudResult<u32> {
        self.backend.group_size(&self.id).await
    }

    pub async fn is_scale_up_possible(&self) -> CloudResult<bool> {
        let size = self.current_size().await?;
        if size >= self.max_size {
            debug!(group = %self, size, max = self.max_size, "max size reached, skipping");
            return Ok(false);
        }
        Ok(true)
    }

    /// Set the target size, capped at `max_size`. Returns the size requested.
    pub async fn resize(&self, new_size: u32) -> CloudResult<u32> {
        let size = if new_size > self.max_size {
            info!(group = %self, requested = new_size, max = self.max_size, "capping size to max");
            self.max_size
        } else {
            new_size
        };
        info!(group = %self, size, "setting group size");
        self.backend.set_group_size(&self.id, size).await?;
        Ok(size)
    }

    /// Grow the group by `delta`. Unlike [`NodeGroup::resize`], exceeding
    /// `max_size` is an error rather than a cap.
    pub async fn increase_size(&self, delta: i64) -> CloudResult<()> {
        if delta <= 0 {
            return Err(CloudError::InvalidDelta(delta));
        }
        let size = self.current_size().await?;
        let desired = i64::from(size) + delta;
        if desired > i64::from(self.max_size) {
            return Err(CloudError::MaxSizeExceeded {
                desired,
                max: self.max_size,
            });
        }
        // desired <= max_size, so it fits in u32.
        self.backend
            .set_group_size(&self.id, desired as u32)
            .await
    }

    /// Whether `resource` is a member of this group.
    ///
    /// A resource that no configured group owns is an error here.
    pub async fn belongs(&self, resource: &ResourceRef) -> CloudResult<bool> {
        match self.backend.resolve_group(resource).await? {
            Some(owner) => Ok(owner == self.id),
            None => Err(CloudError::NotManaged(resource.clone())),
        }
    }

    /// Delete members from this group.
    ///
    /// Refused when the group is already at its minimum, when the removal
    /// would take it below the minimum, or when any member belongs
    /// elsewhere. All checks run before the backend is asked to delete.
    pub async fn remove_members(&self, members: &[ResourceRef]) -> CloudResult<()> {
        if members.is_empty() {
            return Ok(());
        }
        let size = self.current_size().await?;
        let removing = members.len();
        let remaining = i64::from(size) - removing as i64;
        if size <= self.min_size || remaining < i64::from(self.min_size) {
            return Err(CloudError::MinSizeReached {
                group: self.id(),
                size,
                min: self.min_size,
                removing,
            });
        }

        for member in members {
            if !self.belongs(member).await? {
                return Err(CloudError::ForeignMember {
                    group: self.id(),
                    member: member.clone(),
                });
            }
        }

        info!(group = %self, count = removing, "deleting group members");
        self.backend.delete_members(&self.id, members).await
    }
}

impl fmt::Display for NodeGroup {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.id())
    }
}

impl fmt::Debug for NodeGroup {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("NodeGroup")
            .field("backend", &self.backend.name())
            .field("id", &self.id)
            .field("min_size", &self.min_size)
            .field("max_size", &self.max_size)
            .finish()
    }
}
