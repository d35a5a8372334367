//! Group membership cache — which instance belongs to which group.
//!
//! The map is rebuilt wholesale from the backend: on a fixed background
//! interval, and synchronously when a lookup misses on an instance that
//! lives in the zone of some registered group. A rebuild only replaces the
//! map once every group has been listed; any error leaves the previous map
//! in place.
//!
//! # Concurrency model
//!
//! One `tokio::sync::Mutex` guards the registered groups, the map, and the
//! stats. It is held across the backend listing, so refreshes never overlap
//! each other or a lookup, and no reader sees a half-built map.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use tokio::sync::{Mutex, watch};
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

use nodescale_core::{GroupId, ResourceRef};

use crate::error::{CloudError, CloudResult};

/// Floor for the background refresh interval.
pub const MIN_REFRESH_INTERVAL: Duration = Duration::from_millis(1);

/// Lists the current members of one group. Implemented per backend.
#[async_trait]
pub trait MemberLister: Send + Sync {
    async fn list_members(&self, group: &GroupId) -> CloudResult<Vec<ResourceRef>>;
}

/// Counters describing the cache, for logs and tests.
#[derive(Debug, Clone, Default)]
pub struct CacheStats {
    pub entries: usize,
    pub refreshes: u64,
    pub failed_refreshes: u64,
    pub last_refresh: Option<Instant>,
}

struct CacheState {
    groups: Vec<GroupId>,
    members: HashMap<ResourceRef, GroupId>,
    stats: CacheStats,
}

pub struct MembershipCache {
    backend: &'static str,
    lister: Arc<dyn MemberLister>,
    state: Mutex<CacheState>,
}

impl MembershipCache {
    pub fn new(backend: &'static str, lister: Arc<dyn MemberLister>) -> Self {
        Self {
            backend,
            lister,
            state: Mutex::new(CacheState {
                groups: Vec::new(),
                members: HashMap::new(),
                stats: CacheStats::default(),
            }),
        }
    }

    /// Add a group to the refresh set. Registering twice is a no-op.
    pub async fn register_group(&self, group: GroupId) {
        let mut state = self.state.lock().await;
        if !state.groups.contains(&group) {
            debug!(backend = self.backend, %group, "group registered");
            state.groups.push(group);
        }
    }

    pub async fn groups(&self) -> Vec<GroupId> {
        self.state.lock().await.groups.clone()
    }

    pub async fn stats(&self) -> CacheStats {
        self.state.lock().await.stats.clone()
    }

    /// Resolve the group owning `resource`.
    ///
    /// A miss on a resource in the zone of a registered group forces one
    /// synchronous refresh. `Ok(None)` means the resource is not managed;
    /// `Err` means the refresh failed and the cache was left untouched.
    pub async fn lookup(&self, resource: &ResourceRef) -> CloudResult<Option<GroupId>> {
        let mut state = self.state.lock().await;
        if let Some(group) = state.members.get(resource) {
            return Ok(Some(group.clone()));
        }

        // Members of a group are expected to share its zone.
        if !state.groups.iter().any(|g| g.zone == resource.zone) {
            debug!(backend = self.backend, %resource, "resource outside every configured zone");
            return Ok(None);
        }

        debug!(backend = self.backend, %resource, "cache miss, regenerating");
        self.regenerate(&mut state).await?;

        let found = state.members.get(resource).cloned();
        if found.is_none() {
            debug!(backend = self.backend, %resource, "resource does not belong to any configured group");
        }
        Ok(found)
    }

    /// Check that every member resolves to `group`.
    pub async fn ensure_members_of(
        &self,
        group: &GroupId,
        members: &[ResourceRef],
    ) -> CloudResult<()> {
        for member in members {
            match self.lookup(member).await? {
                Some(owner) if owner == *group => {}
                Some(_) => {
                    return Err(CloudError::MixedGroups {
                        group: group.clone(),
                        member: member.clone(),
                    });
                }
                None => return Err(CloudError::NotManaged(member.clone())),
            }
        }
        Ok(())
    }

    /// Rebuild the map from the backend.
    pub async fn refresh(&self) -> CloudResult<()> {
        let mut state = self.state.lock().await;
        self.regenerate(&mut state).await
    }

    async fn regenerate(&self, state: &mut CacheState) -> CloudResult<()> {
        let groups = state.groups.clone();
        let mut fresh = HashMap::new();

        for group in &groups {
            debug!(backend = self.backend, %group, "regenerating group membership");
            match self.lister.list_members(group).await {
                Ok(members) => {
                    for member in members {
                        fresh.insert(member, group.clone());
                    }
                }
                Err(e) => {
                    state.stats.failed_refreshes += 1;
                    warn!(backend = self.backend, %group, error = %e, "group listing failed, keeping previous cache");
                    return Err(e);
                }
            }
        }

        state.members = fresh;
        state.stats.entries = state.members.len();
        state.stats.refreshes += 1;
        state.stats.last_refresh = Some(Instant::now());
        info!(
            backend = self.backend,
            groups = groups.len(),
            entries = state.stats.entries,
            "membership cache regenerated"
        );
        Ok(())
    }

    /// Start the background refresh task.
    ///
    /// The first refresh runs immediately. Errors are logged and the
    /// previous map is kept. Stop the task with [`RefreshTask::shutdown`];
    /// dropping the handle also ends the loop.
    pub fn spawn_refresher(self: &Arc<Self>, interval: Duration) -> RefreshTask {
        let interval = if interval < MIN_REFRESH_INTERVAL {
            warn!(
                backend = self.backend,
                requested_ms = interval.as_millis() as u64,
                "refresh interval too small, using minimum"
            );
            MIN_REFRESH_INTERVAL
        } else {
            interval
        };
        let (shutdown_tx, mut shutdown_rx) = watch::channel(false);
        let cache = Arc::clone(self);

        let handle = tokio::spawn(async move {
            info!(
                backend = cache.backend,
                interval_secs = interval.as_secs(),
                "membership refresher started"
            );
            let mut ticker = tokio::time::interval(interval);
            ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);

            loop {
                tokio::select! {
                    _ = ticker.tick() => {
                        if let Err(e) = cache.refresh().await {
                            error!(backend = cache.backend, error = %e, "error while regenerating membership cache");
                        }
                    }
                    _ = shutdown_rx.changed() => {
                        info!(backend = cache.backend, "membership refresher shutting down");
                        break;
                    }
                }
            }
        });

        RefreshTask {
            shutdown_tx,
            handle,
        }
    }
}

/// Handle to a running background refresher.
pub struct RefreshTask {
    shutdown_tx: watch::Sender<bool>,
    handle: JoinHandle<()>,
}

impl RefreshTask {
    /// Signal the refresher and wait for it to exit.
    pub async fn shutdown(self) {
        let _ = self.shutdown_tx.send(true);
        if let Err(e) = self.handle.await {
            warn!(error = %e, "membership refresher ended abnormally");
        }
    }

    pub fn is_finished(&self) -> bool {
        self.handle.is_finished()
    }
}
