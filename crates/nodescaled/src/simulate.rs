//! `nodescaled simulate` — wire the scale-up engine to in-memory clouds.

use std::path::Path;
use std::sync::Arc;

use anyhow::Context;
use serde::{Deserialize, Serialize};
use tokio::sync::watch;
use tracing::info;

use nodescale_cloud::memory::{AwsGroupState, GceGroupState, InMemoryAutoscaling, InMemoryCompute};
use nodescale_cloud::{
    AwsManager, CloudBackend, CloudProvider, GceManager, GceOptions, MembershipCache,
};
use nodescale_core::{NodescaleConfig, ProviderKind};
use nodescale_scaleup::{
    ClusterSnapshot, ResourceFitChecker, ScaleUp, StaticClusterSource, strategy_for,
};

/// Cluster observations plus the cloud state behind them.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Snapshot {
    #[serde(flatten)]
    pub cluster: ClusterSnapshot,
    #[serde(default)]
    pub aws_groups: Vec<AwsGroupState>,
    /// Served under every configured GCE project.
    #[serde(default)]
    pub gce_groups: Vec<GceGroupState>,
}

impl Snapshot {
    pub fn from_file(path: &Path) -> anyhow::Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("reading snapshot {}", path.display()))?;
        serde_json::from_str(&content).with_context(|| format!("parsing snapshot {}", path.display()))
    }
}

/// Simulated cloud state after a run.
#[derive(Debug, Serialize)]
pub struct CloudState {
    pub aws_groups: Vec<AwsGroupState>,
    pub gce_groups: Vec<(String, Vec<GceGroupState>)>,
}

/// An engine over in-memory clouds seeded from a snapshot.
pub struct Simulation {
    pub engine: ScaleUp,
    pub caches: Vec<Arc<MembershipCache>>,
    aws: Arc<InMemoryAutoscaling>,
    gce: Vec<(String, Arc<InMemoryCompute>)>,
}

impl Simulation {
    pub async fn build(config: &NodescaleConfig, snapshot: &Snapshot) -> anyhow::Result<Self> {
        config.validate()?;

        let aws = Arc::new(InMemoryAutoscaling::from_groups(snapshot.aws_groups.clone()));
        let mut gce = Vec::new();
        let mut providers = Vec::new();
        let mut caches = Vec::new();

        for (index, provider) in config.providers.iter().enumerate() {
            let backend: Arc<dyn CloudBackend> = match provider.kind {
                ProviderKind::Aws => {
                    let manager = AwsManager::new(aws.clone());
                    caches.push(manager.cache().clone());
                    Arc::new(manager)
                }
                ProviderKind::Gce => {
                    let project = provider
                        .project
                        .as_deref()
                        .with_context(|| format!("provider {index}: gce requires a project"))?;
                    let defaults = GceOptions::default();
                    let options = GceOptions {
                        poll_interval: provider.poll_interval()?.unwrap_or(defaults.poll_interval),
                        wait_timeout: provider.wait_timeout()?.unwrap_or(defaults.wait_timeout),
                    };
                    let api = Arc::new(InMemoryCompute::from_groups(project, snapshot.gce_groups.clone()));
                    gce.push((project.to_string(), api.clone()));
                    let manager = GceManager::new(project, api, options);
                    caches.push(manager.cache().clone());
                    Arc::new(manager)
                }
            };
            let built = CloudProvider::build(backend, &provider.node_groups)
                .await
                .with_context(|| format!("provider {index} ({})", provider.kind.as_str()))?;
            providers.push(Arc::new(built));
        }

        let engine = ScaleUp::new(providers, Arc::new(ResourceFitChecker))
            .with_strategy(strategy_for(config.scale_up.expander))
            .with_resize_mode(config.scale_up.resize_mode);

        Ok(Self {
            engine,
            caches,
            aws,
            gce,
        })
    }

    pub fn cloud_state(&self) -> CloudState {
        CloudState {
            aws_groups: self.aws.groups(),
            gce_groups: self
                .gce
                .iter()
                .map(|(project, api)| (project.clone(), api.groups()))
                .collect(),
        }
    }
}

pub async fn run(config_path: &Path, snapshot_path: &Path, run_loop: bool) -> anyhow::Result<()> {
    let config = NodescaleConfig::from_file(config_path)?;
    let snapshot = Snapshot::from_file(snapshot_path)?;
    let simulation = Simulation::build(&config, &snapshot).await?;
    let source = StaticClusterSource::new(snapshot.cluster.clone());

    info!(
        nodes = snapshot.cluster.nodes.len(),
        pods = snapshot.cluster.pods.len(),
        providers = simulation.engine.providers().len(),
        "simulation ready"
    );

    if !run_loop {
        let outcome = simulation.engine.poll_once(&source).await?;
        print_json(&outcome)?;
        print_json(&simulation.cloud_state())?;
        return Ok(());
    }

    let refresh = config.refresh_interval()?;
    let refreshers: Vec<_> = simulation
        .caches
        .iter()
        .map(|cache| cache.spawn_refresher(refresh))
        .collect();

    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            info!("shutdown signal received");
        }
        let _ = shutdown_tx.send(true);
    });

    simulation
        .engine
        .run(&source, config.scale_up_interval()?, shutdown_rx)
        .await;

    for refresher in refreshers {
        refresher.shutdown().await;
    }
    print_json(&simulation.cloud_state())?;
    info!("nodescaled stopped");
    Ok(())
}

fn print_json<T: Serialize>(value: &T) -> anyhow::Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    const CONFIG: &str = r#"
        [scale_up]
        expander = "most-pods"

        [[providers]]
        kind = "aws"
        node_groups = ["1:10:us-east-1a/workers"]

        [[providers]]
        kind = "gce"
        project = "acme"
        operation_poll_interval = "1ms"
        node_groups = ["1:5:projects/acme/zones/europe-west1-b/instanceGroups/pool-a"]
    "#;

    const SNAPSHOT: &str = r#"{
        "nodes": [
            {"name": "aws-1", "provider_id": "aws://us-east-1a/i-1",
             "allocatable": {"cpu_millis": 1000, "memory_bytes": 4294967296, "pods": 110}},
            {"name": "gce-1", "provider_id": "gce://acme/europe-west1-b/pool-a-1",
             "allocatable": {"cpu_millis": 8000, "memory_bytes": 34359738368, "pods": 110}}
        ],
        "pods": [
            {"namespace": "default", "name": "small", "requests": {"cpu_millis": 500}},
            {"namespace": "default", "name": "big", "requests": {"cpu_millis": 4000}}
        ],
        "aws_groups": [
            {"name": "workers", "desired": 1,
             "instances": [{"id": "i-1", "zone": "us-east-1a"}]}
        ],
        "gce_groups": [
            {"zone": "europe-west1-b", "name": "pool-a", "target_size": 1,
             "instances": ["pool-a-1"]}
        ]
    }"#;

    #[tokio::test]
    async fn simulation_scales_the_configured_group() {
        let config = NodescaleConfig::from_toml(CONFIG).unwrap();
        let snapshot: Snapshot = serde_json::from_str(SNAPSHOT).unwrap();
        let simulation = Simulation::build(&config, &snapshot).await.unwrap();
        assert_eq!(simulation.caches.len(), 2);

        let source = StaticClusterSource::new(snapshot.cluster.clone());
        let outcome = simulation.engine.poll_once(&source).await.unwrap();
        let report = outcome.scaled_up().unwrap();
        assert_eq!(report.backend, "gce");
        assert_eq!(report.triggering_pods, vec!["default/small", "default/big"]);

        let state = simulation.cloud_state();
        assert_eq!(state.gce_groups[0].0, "acme");
        assert_eq!(state.gce_groups[0].1[0].target_size, 1);
        assert_eq!(state.aws_groups[0].desired, 1);
    }

    #[tokio::test]
    async fn invalid_config_is_rejected() {
        let config = NodescaleConfig::from_toml(
            r#"
            [[providers]]
            kind = "aws"
            node_groups = ["0:10:us-east-1a/workers"]
            "#,
        )
        .unwrap();
        assert!(Simulation::build(&config, &Snapshot::default()).await.is_err());
    }
}
