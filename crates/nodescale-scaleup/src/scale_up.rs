//! The scale-up cycle.
//!
//! `run_once` walks the steps in order:
//! 1. no pending pods, nothing to do;
//! 2. discover candidate node groups from every provider;
//! 3. build an expansion option per group that can still grow, sorting
//!    each pod into the option's estimator or the unhelped set;
//! 4. without options, report every unhelped pod and stop;
//! 5. let the expansion strategy pick an option;
//! 6. estimate the node count and resize the group (capped at max);
//! 7. report every pod the resize is meant for.
//!
//! Cycles are serial. A failed cycle leaves nothing behind; the next one
//! starts from fresh observations.

use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use serde::Serialize;
use tokio::sync::watch;
use tracing::{debug, error, info, warn};

use nodescale_cloud::CloudProvider;
use nodescale_core::{NodeShape, PodSpec, ResizeMode};

use crate::error::{ScaleUpError, ScaleUpResult};
use crate::events::{EventRecorder, LoggingRecorder};
use crate::expander::{ExpansionOption, ExpansionStrategy, FirstOption};
use crate::predicate::PredicateChecker;
use crate::source::ClusterSource;

/// What a successful resize did.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ScaleUpReport {
    /// Url of the resized group.
    pub group: String,
    pub backend: &'static str,
    pub prior_size: u32,
    /// Size actually requested, after capping at the group's max.
    pub new_size: u32,
    /// Nodes the estimator asked for.
    pub estimate: u32,
    /// Keys of the pods the resize is meant to host.
    pub triggering_pods: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum ScaleUpOutcome {
    /// Nothing was resized. `unhelped` lists pods no candidate group could
    /// host; it is empty when there were no pending pods.
    NoDecision { unhelped: Vec<String> },
    ScaledUp(ScaleUpReport),
}

impl ScaleUpOutcome {
    pub fn scaled_up(&self) -> Option<&ScaleUpReport> {
        match self {
            ScaleUpOutcome::ScaledUp(report) => Some(report),
            ScaleUpOutcome::NoDecision { .. } => None,
        }
    }
}

/// The scale-up decision engine.
pub struct ScaleUp {
    providers: Vec<Arc<CloudProvider>>,
    predicates: Arc<dyn PredicateChecker>,
    recorder: Arc<dyn EventRecorder>,
    strategy: Arc<dyn ExpansionStrategy>,
    resize_mode: ResizeMode,
}

impl ScaleUp {
    /// An engine with the logging recorder, the first-option strategy and
    /// absolute resize targets.
    pub fn new(providers: Vec<Arc<CloudProvider>>, predicates: Arc<dyn PredicateChecker>) -> Self {
        Self {
            providers,
            predicates,
            recorder: Arc::new(LoggingRecorder),
            strategy: Arc::new(FirstOption),
            resize_mode: ResizeMode::default(),
        }
    }

    pub fn with_recorder(mut self, recorder: Arc<dyn EventRecorder>) -> Self {
        self.recorder = recorder;
        self
    }

    pub fn with_strategy(mut self, strategy: Arc<dyn ExpansionStrategy>) -> Self {
        self.strategy = strategy;
        self
    }

    pub fn with_resize_mode(mut self, mode: ResizeMode) -> Self {
        self.resize_mode = mode;
        self
    }

    pub fn providers(&self) -> &[Arc<CloudProvider>] {
        &self.providers
    }

    /// Run one scale-up cycle over `pods` (unschedulable) and `nodes`
    /// (currently in the cluster).
    pub async fn run_once(&self, pods: &[PodSpec], nodes: &[NodeShape]) -> ScaleUpResult<ScaleUpOutcome> {
        if pods.is_empty() {
            debug!("no unschedulable pods");
            return Ok(ScaleUpOutcome::NoDecision { unhelped: Vec::new() });
        }
        info!(pods = pods.len(), nodes = nodes.len(), "pending pods, considering scale-up");

        let mut candidates = Vec::new();
        for provider in &self.providers {
            let found = provider
                .get_node_groups(nodes)
                .await
                .map_err(|source| ScaleUpError::Discovery {
                    backend: provider.name(),
                    source,
                })?;
            candidates.extend(found);
        }

        let mut unhelped: HashSet<String> = HashSet::new();
        let mut options: Vec<ExpansionOption> = Vec::new();
        for candidate in candidates {
            match candidate.group.is_scale_up_possible().await {
                Ok(true) => {}
                Ok(false) => continue,
                Err(e) => {
                    warn!(group = %candidate.group, error = %e, "failed to read group size, skipping group");
                    continue;
                }
            }

            let mut option = ExpansionOption::new(candidate.group, candidate.sample_node);
            for pod in pods {
                match self.predicates.check(pod, &option.sample_node) {
                    Ok(()) => option.estimator.add(pod.clone()),
                    Err(failure) => {
                        debug!(pod = %pod, group = %option.group, reason = %failure, "pod does not fit group");
                        unhelped.insert(pod.key());
                    }
                }
            }
            if option.pod_count() > 0 {
                options.push(option);
            }
        }

        let best = if options.is_empty() {
            None
        } else {
            self.strategy.best_option(&options)
        };
        let Some(best) = best else {
            let mut keys = Vec::new();
            for pod in pods.iter().filter(|pod| unhelped.contains(&pod.key())) {
                self.recorder.not_triggered_scale_up(pod);
                keys.push(pod.key());
            }
            info!(options = options.len(), unhelped = keys.len(), "no expansion option, not scaling up");
            return Ok(ScaleUpOutcome::NoDecision { unhelped: keys });
        };

        self.expand(best).await
    }

    async fn expand(&self, option: &ExpansionOption) -> ScaleUpResult<ScaleUpOutcome> {
        let group = &option.group;
        let url = group.id();
        let estimate = option.estimator.estimate(&option.sample_node);
        info!(
            group = %url,
            strategy = self.strategy.name(),
            pods = option.pod_count(),
            nodes = estimate.node_count,
            "expansion option selected"
        );
        debug!(group = %url, "{}\n{}", option.estimator.debug(), estimate.report);

        let current = group
            .current_size()
            .await
            .map_err(|source| ScaleUpError::GroupSize {
                group: url.clone(),
                source,
            })?;
        let target = match self.resize_mode {
            ResizeMode::Absolute => estimate.node_count,
            ResizeMode::Increment => current.saturating_add(estimate.node_count),
        };
        if target < current {
            warn!(group = %url, current, target, "estimate is below the current size");
        }

        let new_size = group
            .resize(target)
            .await
            .map_err(|source| ScaleUpError::Resize {
                group: url.clone(),
                target,
                source,
            })?;

        let mut triggering_pods = Vec::with_capacity(option.pod_count());
        for pod in option.estimator.fitting_pods() {
            self.recorder.triggered_scale_up(pod, &url, current, new_size);
            triggering_pods.push(pod.key());
        }
        info!(group = %url, from = current, to = new_size, "scaled up node group");

        Ok(ScaleUpOutcome::ScaledUp(ScaleUpReport {
            group: url,
            backend: group.backend_name(),
            prior_size: current,
            new_size,
            estimate: estimate.node_count,
            triggering_pods,
        }))
    }

    /// Read the cluster from `source` and run one cycle.
    pub async fn poll_once(&self, source: &dyn ClusterSource) -> anyhow::Result<ScaleUpOutcome> {
        let pods = source
            .unschedulable_pods()
            .await
            .context("listing unschedulable pods")?;
        let nodes = source.nodes().await.context("listing nodes")?;
        Ok(self.run_once(&pods, &nodes).await?)
    }

    /// Run a cycle every `interval` until `shutdown` changes.
    pub async fn run(
        &self,
        source: &dyn ClusterSource,
        interval: Duration,
        mut shutdown: watch::Receiver<bool>,
    ) {
        info!(
            interval_ms = interval.as_millis() as u64,
            providers = self.providers.len(),
            strategy = self.strategy.name(),
            "scale-up loop started"
        );

        loop {
            tokio::select! {
                _ = tokio::time::sleep(interval) => {
                    if let Err(e) = self.poll_once(source).await {
                        error!(error = %e, "scale-up cycle failed");
                    }
                }
                _ = shutdown.changed() => {
                    info!("scale-up loop shutting down");
                    break;
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::events::{CollectingRecorder, ScaleUpEvent};
    use crate::predicate::ResourceFitChecker;
    use crate::source::{ClusterSnapshot, StaticClusterSource};
    use nodescale_cloud::AwsManager;
    use nodescale_cloud::memory::InMemoryAutoscaling;
    use nodescale_core::Resources;

    const GIB: u64 = 1 << 30;

    async fn engine(desired: u32) -> (Arc<InMemoryAutoscaling>, Arc<CollectingRecorder>, ScaleUp) {
        let api = Arc::new(InMemoryAutoscaling::new());
        api.add_group("workers", desired);
        api.add_instance("workers", "i-1", "us-east-1a");
        let backend = Arc::new(AwsManager::new(api.clone()));
        let provider = CloudProvider::build(backend, &["1:10:us-east-1a/workers".to_string()])
            .await
            .unwrap();
        let recorder = Arc::new(CollectingRecorder::new());
        let scale_up = ScaleUp::new(vec![Arc::new(provider)], Arc::new(ResourceFitChecker))
            .with_recorder(recorder.clone());
        (api, recorder, scale_up)
    }

    fn nodes() -> Vec<NodeShape> {
        vec![NodeShape::new("n1", "aws://us-east-1a/i-1", Resources::new(1000, 4 * GIB, 110))]
    }

    fn pods(n: usize, cpu: u64) -> Vec<PodSpec> {
        (0..n).map(|i| PodSpec::new("default", &format!("p{i}"), cpu, GIB)).collect()
    }

    #[tokio::test]
    async fn no_pods_touches_nothing() {
        let (api, recorder, scale_up) = engine(1).await;
        let outcome = scale_up.run_once(&[], &nodes()).await.unwrap();
        assert_eq!(outcome, ScaleUpOutcome::NoDecision { unhelped: vec![] });
        assert_eq!(api.total_calls(), 0);
        assert!(recorder.events().is_empty());
    }

    #[tokio::test]
    async fn absolute_mode_sets_estimate() {
        let (api, recorder, scale_up) = engine(1).await;
        let outcome = scale_up.run_once(&pods(5, 500), &nodes()).await.unwrap();
        let report = outcome.scaled_up().unwrap();
        assert_eq!(report.estimate, 3);
        assert_eq!(report.prior_size, 1);
        assert_eq!(report.new_size, 3);
        assert_eq!(api.desired("workers"), Some(3));
        assert_eq!(recorder.events().len(), 5);
    }

    #[tokio::test]
    async fn increment_mode_adds_estimate() {
        let (api, _, scale_up) = engine(2).await;
        let scale_up = scale_up.with_resize_mode(ResizeMode::Increment);
        let outcome = scale_up.run_once(&pods(2, 500), &nodes()).await.unwrap();
        assert_eq!(outcome.scaled_up().unwrap().new_size, 3);
        assert_eq!(api.desired("workers"), Some(3));
    }

    #[tokio::test]
    async fn oversized_pods_are_reported_unhelped() {
        let (api, recorder, scale_up) = engine(1).await;
        let outcome = scale_up.run_once(&pods(2, 5000), &nodes()).await.unwrap();
        assert_eq!(
            outcome,
            ScaleUpOutcome::NoDecision {
                unhelped: vec!["default/p0".into(), "default/p1".into()]
            }
        );
        assert_eq!(api.set_calls(), 0);
        assert!(recorder
            .events()
            .iter()
            .all(|e| matches!(e, ScaleUpEvent::NotTriggered { .. })));
    }

    #[tokio::test]
    async fn loop_runs_cycles_until_shutdown() {
        let (api, _, scale_up) = engine(1).await;
        let source = StaticClusterSource::new(ClusterSnapshot {
            nodes: nodes(),
            pods: pods(1, 500),
        });
        let (tx, rx) = watch::channel(false);

        let stop = async {
            tokio::time::sleep(Duration::from_millis(100)).await;
            let _ = tx.send(true);
        };
        tokio::join!(scale_up.run(&source, Duration::from_millis(10), rx), stop);

        assert!(api.set_calls() >= 1);
        assert_eq!(api.desired("workers"), Some(1));
    }
}
