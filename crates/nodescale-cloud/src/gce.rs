//! GCE backend — managed instance groups (MIGs).
//!
//! Group identifiers are MIG urls,
//! `[https://www.googleapis.com/compute/v1/]projects/<p>/zones/<z>/instanceGroups/<n>`,
//! and must name the manager's project. Node provider ids are
//! `gce://<project>/<zone>/<instance>`.
//!
//! Resize and delete calls return a zonal operation; the manager polls it
//! until it is done or `wait_timeout` elapses.

use std::sync::{Arc, LazyLock};
use std::time::{Duration, Instant};

use async_trait::async_trait;
use regex::Regex;
use tracing::{debug, warn};

use nodescale_core::{GroupId, ParseError, ResourceRef};

use crate::backend::CloudBackend;
use crate::cache::{MemberLister, MembershipCache};
use crate::error::{CloudError, CloudResult};

const BACKEND: &str = "gce";
const COMPUTE_PREFIX: &str = "https://www.googleapis.com/compute/v1";

static MIG_URL: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r"^(?:https://(?:www|content)\.googleapis\.com/compute/v1/)?projects/([^/]+)/zones/([^/]+)/instanceGroups/([^/]+)$",
    )
    .expect("MIG url pattern is valid")
});

static INSTANCE_URL: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r"^(?:https://(?:www|content)\.googleapis\.com/compute/v1/)?projects/([^/]+)/zones/([^/]+)/instances/([^/]+)$",
    )
    .expect("instance url pattern is valid")
});

/// A zonal long-running operation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Operation {
    pub name: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum OperationStatus {
    Pending,
    Running,
    Done,
    Failed(String),
}

/// The subset of the compute API the manager calls.
#[async_trait]
pub trait ComputeApi: Send + Sync {
    async fn target_size(&self, project: &str, zone: &str, mig: &str) -> CloudResult<u32>;

    /// Instance urls of the MIG's current members.
    async fn list_managed_instances(
        &self,
        project: &str,
        zone: &str,
        mig: &str,
    ) -> CloudResult<Vec<String>>;

    async fn resize(&self, project: &str, zone: &str, mig: &str, size: u32) -> CloudResult<Operation>;

    async fn delete_instances(
        &self,
        project: &str,
        zone: &str,
        mig: &str,
        instances: &[String],
    ) -> CloudResult<Operation>;

    async fn operation_status(
        &self,
        project: &str,
        zone: &str,
        operation: &str,
    ) -> CloudResult<OperationStatus>;
}

/// Operation polling knobs.
#[derive(Debug, Clone, Copy)]
pub struct GceOptions {
    pub poll_interval: Duration,
    pub wait_timeout: Duration,
}

impl Default for GceOptions {
    fn default() -> Self {
        Self {
            poll_interval: Duration::from_millis(100),
            wait_timeout: Duration::from_secs(5),
        }
    }
}

/// Full url of an instance.
pub fn instance_url(project: &str, zone: &str, name: &str) -> String {
    format!("{COMPUTE_PREFIX}/projects/{project}/zones/{zone}/instances/{name}")
}

/// Parse an instance url into a resource reference.
pub fn parse_instance_url(url: &str) -> CloudResult<ResourceRef> {
    let caps = INSTANCE_URL.captures(url).ok_or_else(|| ParseError::ProviderId {
        expected: "projects/<project>/zones/<zone>/instances/<name>".to_string(),
        got: url.to_string(),
    })?;
    Ok(ResourceRef::new(&caps[2], &caps[3]))
}

struct MigLister {
    project: String,
    api: Arc<dyn ComputeApi>,
}

#[async_trait]
impl MemberLister for MigLister {
    async fn list_members(&self, group: &GroupId) -> CloudResult<Vec<ResourceRef>> {
        let urls = self
            .api
            .list_managed_instances(&self.project, &group.zone, &group.name)
            .await?;
        urls.iter().map(|url| parse_instance_url(url)).collect()
    }
}

/// GCE implementation of [`CloudBackend`].
pub struct GceManager {
    project: String,
    api: Arc<dyn ComputeApi>,
    cache: Arc<MembershipCache>,
    options: GceOptions,
}

impl GceManager {
    pub fn new(project: &str, api: Arc<dyn ComputeApi>, options: GceOptions) -> Self {
        let lister = Arc::new(MigLister {
            project: project.to_string(),
            api: api.clone(),
        });
        Self {
            project: project.to_string(),
            api,
            cache: Arc::new(MembershipCache::new(BACKEND, lister)),
            options,
        }
    }

    pub fn project(&self) -> &str {
        &self.project
    }

    pub fn cache(&self) -> &Arc<MembershipCache> {
        &self.cache
    }

    async fn wait_for_op(&self, operation: &Operation, zone: &str) -> CloudResult<()> {
        let started = Instant::now();
        loop {
            debug!(operation = %operation.name, "waiting for operation");
            match self
                .api
                .operation_status(&self.project, zone, &operation.name)
                .await?
            {
                OperationStatus::Done => return Ok(()),
                OperationStatus::Failed(message) => {
                    return Err(CloudError::OperationFailed {
                        operation: operation.name.clone(),
                        message,
                    });
                }
                OperationStatus::Pending | OperationStatus::Running => {}
            }
            if started.elapsed() >= self.options.wait_timeout {
                warn!(operation = %operation.name, "operation timed out");
                return Err(CloudError::OperationTimeout {
                    operation: operation.name.clone(),
                    timeout: self.options.wait_timeout,
                });
            }
            tokio::time::sleep(self.options.poll_interval).await;
        }
    }
}

#[async_trait]
impl CloudBackend for GceManager {
    fn name(&self) -> &'static str {
        BACKEND
    }

    fn parse_group_id(&self, identifier: &str) -> CloudResult<GroupId> {
        let caps = MIG_URL.captures(identifier).ok_or_else(|| ParseError::GroupId {
            expected: "projects/<project>/zones/<zone>/instanceGroups/<name>".to_string(),
            got: identifier.to_string(),
        })?;
        if &caps[1] != self.project {
            return Err(ParseError::GroupId {
                expected: format!("a MIG in project {}", self.project),
                got: identifier.to_string(),
            }
            .into());
        }
        Ok(GroupId::new(&caps[2], &caps[3]))
    }

    fn group_url(&self, group: &GroupId) -> String {
        format!(
            "{COMPUTE_PREFIX}/projects/{}/zones/{}/instanceGroups/{}",
            self.project, group.zone, group.name
        )
    }

    fn parse_provider_id(&self, provider_id: &str) -> CloudResult<ResourceRef> {
        let err = || ParseError::ProviderId {
            expected: format!("gce://{}/<zone>/<name>", self.project),
            got: provider_id.to_string(),
        };
        let rest = provider_id.strip_prefix("gce://").ok_or_else(err)?;
        let (project, zoned) = rest.split_once('/').ok_or_else(err)?;
        if project != self.project {
            return Err(err().into());
        }
        let scheme_id = format!("{BACKEND}://{zoned}");
        ResourceRef::from_provider_id(&scheme_id, BACKEND).map_err(|_| err().into())
    }

    async fn register_group(&self, group: GroupId) {
        self.cache.register_group(group).await;
    }

    async fn group_size(&self, group: &GroupId) -> CloudResult<u32> {
        self.api
            .target_size(&self.project, &group.zone, &group.name)
            .await
    }

    async fn set_group_size(&self, group: &GroupId, size: u32) -> CloudResult<()> {
        let op = self
            .api
            .resize(&self.project, &group.zone, &group.name, size)
            .await?;
        self.wait_for_op(&op, &group.zone).await
    }

    async fn delete_members(&self, group: &GroupId, members: &[ResourceRef]) -> CloudResult<()> {
        if members.is_empty() {
            return Ok(());
        }
        self.cache.ensure_members_of(group, members).await?;

        let urls: Vec<String> = members
            .iter()
            .map(|m| instance_url(&self.project, &m.zone, &m.name))
            .collect();
        let op = self
            .api
            .delete_instances(&self.project, &group.zone, &group.name, &urls)
            .await?;
        self.wait_for_op(&op, &group.zone).await
    }

    async fn resolve_group(&self, resource: &ResourceRef) -> CloudResult<Option<GroupId>> {
        self.cache.lookup(resource).await
    }
}
