//! nodescale-scaleup — the scale-up decision engine.
//!
//! One cycle takes the pods the scheduler could not place and the nodes
//! currently in the cluster, finds the node groups that could host those
//! pods, picks one, estimates how many nodes it needs and resizes it.
//!
//! The engine owns no cloud state. Node groups come from
//! [`nodescale_cloud::CloudProvider`]s; scheduling checks, event delivery
//! and option selection are pluggable through the traits re-exported here.

pub mod error;
pub mod events;
pub mod expander;
pub mod predicate;
pub mod scale_up;
pub mod source;

pub use error::{ScaleUpError, ScaleUpResult};
pub use events::{CollectingRecorder, EventRecorder, LoggingRecorder, ScaleUpEvent};
pub use expander::{ExpansionOption, ExpansionStrategy, FirstOption, MostPods, strategy_for};
pub use predicate::{PredicateChecker, PredicateFailure, ResourceFitChecker};
pub use scale_up::{ScaleUp, ScaleUpOutcome, ScaleUpReport};
pub use source::{ClusterSnapshot, ClusterSource, StaticClusterSource};
