//! In-process wire APIs.
//!
//! `InMemoryAutoscaling` and `InMemoryCompute` stand in for the AWS and
//! GCE control planes. They keep call counters and can be told to fail, so
//! tests can assert exactly which round trips a code path made. The
//! simulator in `nodescaled` seeds them from a JSON snapshot.

use std::collections::BTreeMap;
use std::sync::atomic::{AtomicBool, AtomicU32, AtomicUsize, Ordering};
use std::sync::{Mutex, MutexGuard};

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::aws::{AsgDescription, AsgInstance, AutoscalingApi};
use crate::error::{CloudError, CloudResult};
use crate::gce::{ComputeApi, Operation, OperationStatus, instance_url};

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

// ── AWS ────────────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AwsInstanceState {
    pub id: String,
    pub zone: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AwsGroupState {
    pub name: String,
    pub desired: u32,
    #[serde(default)]
    pub instances: Vec<AwsInstanceState>,
}

#[derive(Default)]
pub struct InMemoryAutoscaling {
    groups: Mutex<BTreeMap<String, AwsGroupState>>,
    failing: AtomicBool,
    describe_group_calls: AtomicUsize,
    describe_instance_calls: AtomicUsize,
    set_calls: AtomicUsize,
    terminate_calls: AtomicUsize,
}

impl InMemoryAutoscaling {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_groups(groups: Vec<AwsGroupState>) -> Self {
        let api = Self::new();
        {
            let mut map = lock(&api.groups);
            for group in groups {
                map.insert(group.name.clone(), group);
            }
        }
        api
    }

    pub fn add_group(&self, name: &str, desired: u32) {
        lock(&self.groups).insert(
            name.to_string(),
            AwsGroupState {
                name: name.to_string(),
                desired,
                instances: Vec::new(),
            },
        );
    }

    pub fn add_instance(&self, group: &str, id: &str, zone: &str) {
        if let Some(g) = lock(&self.groups).get_mut(group) {
            g.instances.push(AwsInstanceState {
                id: id.to_string(),
                zone: zone.to_string(),
            });
        }
    }

    pub fn set_desired(&self, group: &str, desired: u32) {
        if let Some(g) = lock(&self.groups).get_mut(group) {
            g.desired = desired;
        }
    }

    pub fn desired(&self, group: &str) -> Option<u32> {
        lock(&self.groups).get(group).map(|g| g.desired)
    }

    pub fn groups(&self) -> Vec<AwsGroupState> {
        lock(&self.groups).values().cloned().collect()
    }

    /// Make every subsequent call fail until reset.
    pub fn set_failing(&self, failing: bool) {
        self.failing.store(failing, Ordering::SeqCst);
    }

    pub fn describe_group_calls(&self) -> usize {
        self.describe_group_calls.load(Ordering::SeqCst)
    }

    pub fn describe_instance_calls(&self) -> usize {
        self.describe_instance_calls.load(Ordering::SeqCst)
    }

    pub fn set_calls(&self) -> usize {
        self.set_calls.load(Ordering::SeqCst)
    }

    pub fn terminate_calls(&self) -> usize {
        self.terminate_calls.load(Ordering::SeqCst)
    }

    /// Total round trips made so far.
    pub fn total_calls(&self) -> usize {
        self.describe_group_calls()
            + self.describe_instance_calls()
            + self.set_calls()
            + self.terminate_calls()
    }

    fn check(&self) -> CloudResult<()> {
        if self.failing.load(Ordering::SeqCst) {
            return Err(CloudError::backend("aws", "service unavailable"));
        }
        Ok(())
    }
}

#[async_trait]
impl AutoscalingApi for InMemoryAutoscaling {
    async fn describe_group(&self, name: &str) -> CloudResult<Option<AsgDescription>> {
        self.describe_group_calls.fetch_add(1, Ordering::SeqCst);
        self.check()?;
        Ok(lock(&self.groups).get(name).map(|g| AsgDescription {
            name: g.name.clone(),
            desired_capacity: g.desired,
            instance_ids: g.instances.iter().map(|i| i.id.clone()).collect(),
        }))
    }

    async fn describe_instance(&self, instance_id: &str) -> CloudResult<Option<AsgInstance>> {
        self.describe_instance_calls.fetch_add(1, Ordering::SeqCst);
        self.check()?;
        let groups = lock(&self.groups);
        Ok(groups.values().find_map(|g| {
            g.instances
                .iter()
                .find(|i| i.id == instance_id)
                .map(|i| AsgInstance {
                    instance_id: i.id.clone(),
                    group_name: g.name.clone(),
                    availability_zone: i.zone.clone(),
                })
        }))
    }

    async fn set_desired_capacity(
        &self,
        name: &str,
        size: u32,
        _honor_cooldown: bool,
    ) -> CloudResult<()> {
        self.set_calls.fetch_add(1, Ordering::SeqCst);
        self.check()?;
        let mut groups = lock(&self.groups);
        let group = groups
            .get_mut(name)
            .ok_or_else(|| CloudError::UnknownGroup(name.to_string()))?;
        group.desired = size;
        Ok(())
    }

    async fn terminate_instance(&self, instance_id: &str, decrement_desired: bool) -> CloudResult<()> {
        self.terminate_calls.fetch_add(1, Ordering::SeqCst);
        self.check()?;
        let mut groups = lock(&self.groups);
        for group in groups.values_mut() {
            if let Some(pos) = group.instances.iter().position(|i| i.id == instance_id) {
                group.instances.remove(pos);
                if decrement_desired {
                    group.desired = group.desired.saturating_sub(1);
                }
                return Ok(());
            }
        }
        Err(CloudError::backend("aws", format!("instance {instance_id} not found")))
    }
}

// ── GCE ────────────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GceGroupState {
    pub zone: String,
    pub name: String,
    pub target_size: u32,
    /// Instance names (not urls).
    #[serde(default)]
    pub instances: Vec<String>,
}

type MigKey = (String, String, String);

struct PendingOperation {
    polls_left: u32,
    failure: Option<String>,
}

#[derive(Default)]
pub struct InMemoryCompute {
    groups: Mutex<BTreeMap<MigKey, GceGroupState>>,
    operations: Mutex<BTreeMap<String, PendingOperation>>,
    next_operation: AtomicUsize,
    operation_polls: AtomicU32,
    operation_failure: Mutex<Option<String>>,
    failing: AtomicBool,
    list_calls: AtomicUsize,
    resize_calls: AtomicUsize,
    delete_calls: AtomicUsize,
    status_calls: AtomicUsize,
}

impl InMemoryCompute {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_groups(project: &str, groups: Vec<GceGroupState>) -> Self {
        let api = Self::new();
        {
            let mut map = lock(&api.groups);
            for group in groups {
                map.insert(
                    (project.to_string(), group.zone.clone(), group.name.clone()),
                    group,
                );
            }
        }
        api
    }

    pub fn add_group(&self, project: &str, zone: &str, name: &str, target_size: u32) {
        lock(&self.groups).insert(
            key(project, zone, name),
            GceGroupState {
                zone: zone.to_string(),
                name: name.to_string(),
                target_size,
                instances: Vec::new(),
            },
        );
    }

    pub fn add_instance(&self, project: &str, zone: &str, mig: &str, instance: &str) {
        if let Some(g) = lock(&self.groups).get_mut(&key(project, zone, mig)) {
            g.instances.push(instance.to_string());
        }
    }

    pub fn set_target(&self, project: &str, zone: &str, mig: &str, size: u32) {
        if let Some(g) = lock(&self.groups).get_mut(&key(project, zone, mig)) {
            g.target_size = size;
        }
    }

    pub fn target(&self, project: &str, zone: &str, mig: &str) -> Option<u32> {
        lock(&self.groups)
            .get(&key(project, zone, mig))
            .map(|g| g.target_size)
    }

    pub fn groups(&self) -> Vec<GceGroupState> {
        lock(&self.groups).values().cloned().collect()
    }

    /// Number of `Running` polls before new operations report `Done`.
    pub fn set_operation_polls(&self, polls: u32) {
        self.operation_polls.store(polls, Ordering::SeqCst);
    }

    /// Make new operations end in `Failed(message)` without applying.
    pub fn fail_operations(&self, message: &str) {
        *lock(&self.operation_failure) = Some(message.to_string());
    }

    pub fn set_failing(&self, failing: bool) {
        self.failing.store(failing, Ordering::SeqCst);
    }

    pub fn list_calls(&self) -> usize {
        self.list_calls.load(Ordering::SeqCst)
    }

    pub fn resize_calls(&self) -> usize {
        self.resize_calls.load(Ordering::SeqCst)
    }

    pub fn delete_calls(&self) -> usize {
        self.delete_calls.load(Ordering::SeqCst)
    }

    pub fn status_calls(&self) -> usize {
        self.status_calls.load(Ordering::SeqCst)
    }

    fn check(&self) -> CloudResult<()> {
        if self.failing.load(Ordering::SeqCst) {
            return Err(CloudError::backend("gce", "backend unavailable"));
        }
        Ok(())
    }

    /// Register a new operation. Returns it plus whether the change should be applied.
    fn start_operation(&self) -> (Operation, bool) {
        let id = self.next_operation.fetch_add(1, Ordering::SeqCst);
        let name = format!("operation-{id}");
        let failure = lock(&self.operation_failure).clone();
        let apply = failure.is_none();
        lock(&self.operations).insert(
            name.clone(),
            PendingOperation {
                polls_left: self.operation_polls.load(Ordering::SeqCst),
                failure,
            },
        );
        (Operation { name }, apply)
    }
}

fn key(project: &str, zone: &str, mig: &str) -> MigKey {
    (project.to_string(), zone.to_string(), mig.to_string())
}

#[async_trait]
impl ComputeApi for InMemoryCompute {
    async fn target_size(&self, project: &str, zone: &str, mig: &str) -> CloudResult<u32> {
        self.check()?;
        self.target(project, zone, mig)
            .ok_or_else(|| CloudError::UnknownGroup(format!("{zone}/{mig}")))
    }

    async fn list_managed_instances(
        &self,
        project: &str,
        zone: &str,
        mig: &str,
    ) -> CloudResult<Vec<String>> {
        self.list_calls.fetch_add(1, Ordering::SeqCst);
        self.check()?;
        let groups = lock(&self.groups);
        let group = groups
            .get(&key(project, zone, mig))
            .ok_or_else(|| CloudError::UnknownGroup(format!("{zone}/{mig}")))?;
        Ok(group
            .instances
            .iter()
            .map(|name| instance_url(project, zone, name))
            .collect())
    }

    async fn resize(&self, project: &str, zone: &str, mig: &str, size: u32) -> CloudResult<Operation> {
        self.resize_calls.fetch_add(1, Ordering::SeqCst);
        self.check()?;
        if self.target(project, zone, mig).is_none() {
            return Err(CloudError::UnknownGroup(format!("{zone}/{mig}")));
        }
        let (op, apply) = self.start_operation();
        if apply {
            self.set_target(project, zone, mig, size);
        }
        Ok(op)
    }

    async fn delete_instances(
        &self,
        project: &str,
        zone: &str,
        mig: &str,
        instances: &[String],
    ) -> CloudResult<Operation> {
        self.delete_calls.fetch_add(1, Ordering::SeqCst);
        self.check()?;
        let (op, apply) = self.start_operation();
        if apply {
            let mut groups = lock(&self.groups);
            let group = groups
                .get_mut(&key(project, zone, mig))
                .ok_or_else(|| CloudError::UnknownGroup(format!("{zone}/{mig}")))?;
            let before = group.instances.len();
            group
                .instances
                .retain(|name| !instances.contains(&instance_url(project, zone, name)));
            let removed = (before - group.instances.len()) as u32;
            group.target_size = group.target_size.saturating_sub(removed);
        }
        Ok(op)
    }

    async fn operation_status(
        &self,
        _project: &str,
        _zone: &str,
        operation: &str,
    ) -> CloudResult<OperationStatus> {
        self.status_calls.fetch_add(1, Ordering::SeqCst);
        self.check()?;
        let mut operations = lock(&self.operations);
        let op = operations
            .get_mut(operation)
            .ok_or_else(|| CloudError::backend("gce", format!("operation {operation} not found")))?;
        if op.polls_left > 0 {
            op.polls_left -= 1;
            return Ok(OperationStatus::Running);
        }
        Ok(match &op.failure {
            Some(message) => OperationStatus::Failed(message.clone()),
            None => OperationStatus::Done,
        })
    }
}
