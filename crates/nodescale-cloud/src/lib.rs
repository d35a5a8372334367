//! nodescale-cloud — node groups and their cloud backends.
//!
//! The engine never talks to a cloud SDK directly. Each backend implements
//! the narrow [`CloudBackend`] capability on top of a wire-API trait
//! (`AutoscalingApi` for AWS, `ComputeApi` for GCE) and owns a
//! [`MembershipCache`] that maps instances to the groups that own them.
//!
//! # Architecture
//!
//! ```text
//! CloudProvider (one per configured backend)
//!   ├── Vec<Arc<NodeGroup>>  (min/max bounds, live size via backend)
//!   └── Arc<dyn CloudBackend>
//!       ├── AwsManager ── AutoscalingApi
//!       └── GceManager ── ComputeApi
//!           └── MembershipCache (ResourceRef → GroupId, refreshed wholesale)
//! ```
//!
//! `memory` holds in-process wire APIs used by tests and by
//! `nodescaled simulate`.

pub mod aws;
pub mod backend;
pub mod cache;
pub mod error;
pub mod gce;
pub mod memory;
pub mod node_group;
pub mod provider;

pub use aws::{AsgDescription, AsgInstance, AutoscalingApi, AwsManager};
pub use backend::CloudBackend;
pub use cache::{CacheStats, MemberLister, MembershipCache, RefreshTask};
pub use error::{CloudError, CloudResult};
pub use gce::{ComputeApi, GceManager, GceOptions, Operation, OperationStatus};
pub use node_group::NodeGroup;
pub use provider::{CloudProvider, NodeGroupCandidate};
