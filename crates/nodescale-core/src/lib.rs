//! nodescale-core — shared types for the nodescale cluster autoscaler.
//!
//! - **`types`** — resource quantities, pending pods, observed node shapes
//! - **`reference`** — resource references, group ids, node-group spec strings
//! - **`config`** — `nodescale.toml` parsing and startup validation
//! - **`error`** — parse and configuration errors

pub mod config;
pub mod error;
pub mod reference;
pub mod types;

pub use config::{
    CacheConfig, Expander, NodescaleConfig, ProviderConfig, ProviderKind, ResizeMode, ScaleUpConfig,
    parse_duration,
};
pub use error::{ConfigError, ParseError};
pub use reference::{GroupId, NodeGroupSpec, ResourceRef};
pub use types::*;
