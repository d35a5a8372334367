//! nodescale.toml configuration parser.

use std::path::Path;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::{ConfigError, ParseError};
use crate::reference::NodeGroupSpec;

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct NodescaleConfig {
    #[serde(default)]
    pub scale_up: ScaleUpConfig,
    #[serde(default)]
    pub cache: CacheConfig,
    #[serde(default)]
    pub providers: Vec<ProviderConfig>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScaleUpConfig {
    #[serde(default = "default_scale_up_interval")]
    pub interval: String,
    #[serde(default)]
    pub expander: Expander,
    #[serde(default)]
    pub resize_mode: ResizeMode,
}

impl Default for ScaleUpConfig {
    fn default() -> Self {
        Self {
            interval: default_scale_up_interval(),
            expander: Expander::default(),
            resize_mode: ResizeMode::default(),
        }
    }
}

/// Which expansion option wins when several node groups could help.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum Expander {
    /// First option (in discovery order) that fits at least one pod.
    #[default]
    First,
    /// Option fitting the most pods; ties go to discovery order.
    MostPods,
}

/// How the node estimate is turned into a group's new target size.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ResizeMode {
    /// The estimate is the new absolute target.
    #[default]
    Absolute,
    /// The estimate is added to the current size.
    Increment,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CacheConfig {
    #[serde(default = "default_refresh_interval")]
    pub refresh_interval: String,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            refresh_interval: default_refresh_interval(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ProviderKind {
    Aws,
    Gce,
}

impl ProviderKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ProviderKind::Aws => "aws",
            ProviderKind::Gce => "gce",
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProviderConfig {
    pub kind: ProviderKind,
    /// GCE project owning every configured MIG.
    pub project: Option<String>,
    #[serde(default)]
    pub node_groups: Vec<String>,
    pub operation_poll_interval: Option<String>,
    pub operation_wait_timeout: Option<String>,
}

impl NodescaleConfig {
    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path)?;
        Self::from_toml(&content)
    }

    pub fn from_toml(content: &str) -> Result<Self, ConfigError> {
        let config: NodescaleConfig = toml::from_str(content)?;
        Ok(config)
    }

    /// Check everything that can be checked without talking to a cloud.
    ///
    /// A single malformed entry rejects the whole config.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.providers.is_empty() {
            return Err(ConfigError::NoProviders);
        }
        non_zero("scale_up.interval", self.scale_up_interval()?)?;
        non_zero("cache.refresh_interval", self.refresh_interval()?)?;

        for (index, provider) in self.providers.iter().enumerate() {
            let kind = provider.kind.as_str().to_string();
            for spec in &provider.node_groups {
                NodeGroupSpec::parse(spec).map_err(|source| ConfigError::Provider {
                    index,
                    kind: kind.clone(),
                    source,
                })?;
            }
            if provider.kind == ProviderKind::Gce && provider.project.is_none() {
                return Err(ConfigError::MissingField {
                    index,
                    kind,
                    field: "project",
                });
            }
            if let Some(poll) = provider.poll_interval()? {
                non_zero("operation_poll_interval", poll)?;
            }
            provider.wait_timeout()?;
        }
        Ok(())
    }

    pub fn scale_up_interval(&self) -> Result<Duration, ConfigError> {
        parse_duration(&self.scale_up.interval).map_err(|source| ConfigError::Field {
            field: "scale_up.interval",
            source,
        })
    }

    pub fn refresh_interval(&self) -> Result<Duration, ConfigError> {
        parse_duration(&self.cache.refresh_interval).map_err(|source| ConfigError::Field {
            field: "cache.refresh_interval",
            source,
        })
    }

    pub fn to_toml_string(&self) -> Result<String, toml::ser::Error> {
        toml::to_string_pretty(self)
    }
}

impl ProviderConfig {
    pub fn poll_interval(&self) -> Result<Option<Duration>, ConfigError> {
        self.operation_poll_interval
            .as_deref()
            .map(parse_duration)
            .transpose()
            .map_err(|source| ConfigError::Field {
                field: "operation_poll_interval",
                source,
            })
    }

    pub fn wait_timeout(&self) -> Result<Option<Duration>, ConfigError> {
        self.operation_wait_timeout
            .as_deref()
            .map(parse_duration)
            .transpose()
            .map_err(|source| ConfigError::Field {
                field: "operation_wait_timeout",
                source,
            })
    }
}

/// Parse a duration string like "100ms", "30s", "5m", "1h".
pub fn parse_duration(s: &str) -> Result<Duration, ParseError> {
    let s = s.trim();
    let err = || ParseError::Duration(s.to_string());
    let digits_end = s
        .find(|c: char| !c.is_ascii_digit())
        .unwrap_or(s.len());
    let (value, unit) = s.split_at(digits_end);
    let value: u64 = value.parse().map_err(|_| err())?;

    match unit {
        "ms" => Ok(Duration::from_millis(value)),
        "s" | "" => Ok(Duration::from_secs(value)),
        "m" => value.checked_mul(60).map(Duration::from_secs).ok_or_else(err),
        "h" => value.checked_mul(3600).map(Duration::from_secs).ok_or_else(err),
        _ => Err(err()),
    }
}

fn non_zero(field: &'static str, value: Duration) -> Result<(), ConfigError> {
    if value.is_zero() {
        return Err(ConfigError::ZeroDuration { field });
    }
    Ok(())
}

fn default_scale_up_interval() -> String {
    "10s".to_string()
}

fn default_refresh_interval() -> String {
    "1h".to_string()
}
