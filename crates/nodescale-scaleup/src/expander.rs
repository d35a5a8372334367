//! Expansion options and the strategies that choose between them.

use std::fmt;
use std::sync::Arc;

use nodescale_cloud::NodeGroup;
use nodescale_core::{Expander, NodeShape};
use nodescale_estimator::NodeEstimator;

/// One way to scale up: grow `group`, whose new nodes look like
/// `sample_node`, to host the pods collected in `estimator`.
pub struct ExpansionOption {
    pub group: Arc<NodeGroup>,
    pub sample_node: NodeShape,
    pub estimator: NodeEstimator,
}

impl ExpansionOption {
    pub fn new(group: Arc<NodeGroup>, sample_node: NodeShape) -> Self {
        Self {
            group,
            sample_node,
            estimator: NodeEstimator::new(),
        }
    }

    /// Number of pending pods this option would help.
    pub fn pod_count(&self) -> usize {
        self.estimator.count()
    }
}

impl fmt::Debug for ExpansionOption {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ExpansionOption")
            .field("group", &self.group.id())
            .field("sample_node", &self.sample_node.name)
            .field("pods", &self.estimator.count())
            .finish()
    }
}

/// Picks the option to act on. Options arrive in discovery order.
pub trait ExpansionStrategy: Send + Sync {
    fn name(&self) -> &'static str;

    /// `None` when no option helps any pod.
    fn best_option<'a>(&self, options: &'a [ExpansionOption]) -> Option<&'a ExpansionOption>;
}

/// The first option that helps at least one pod.
#[derive(Debug, Clone, Copy, Default)]
pub struct FirstOption;

impl ExpansionStrategy for FirstOption {
    fn name(&self) -> &'static str {
        "first"
    }

    fn best_option<'a>(&self, options: &'a [ExpansionOption]) -> Option<&'a ExpansionOption> {
        options.iter().find(|option| option.pod_count() > 0)
    }
}

/// The option helping the most pods. Ties go to the earlier option.
#[derive(Debug, Clone, Copy, Default)]
pub struct MostPods;

impl ExpansionStrategy for MostPods {
    fn name(&self) -> &'static str {
        "most-pods"
    }

    fn best_option<'a>(&self, options: &'a [ExpansionOption]) -> Option<&'a ExpansionOption> {
        let mut best: Option<&ExpansionOption> = None;
        for option in options.iter().filter(|o| o.pod_count() > 0) {
            match best {
                Some(current) if current.pod_count() >= option.pod_count() => {}
                _ => best = Some(option),
            }
        }
        best
    }
}

/// The strategy configured by `scale_up.expander`.
pub fn strategy_for(expander: Expander) -> Arc<dyn ExpansionStrategy> {
    match expander {
        Expander::First => Arc::new(FirstOption),
        Expander::MostPods => Arc::new(MostPods),
    }
}
