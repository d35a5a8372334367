//! Resource references, group identities, and node-group spec strings.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::error::ParseError;

/// Identifies one compute instance within a backend: `(zone, name)`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ResourceRef {
    pub zone: String,
    pub name: String,
}

impl ResourceRef {
    pub fn new(zone: &str, name: &str) -> Self {
        Self {
            zone: zone.to_string(),
            name: name.to_string(),
        }
    }

    /// Parse a provider id of the form `<scheme>://<zone>/<name>`.
    pub fn from_provider_id(id: &str, scheme: &str) -> Result<Self, ParseError> {
        let err = || ParseError::ProviderId {
            expected: format!("{scheme}://<zone>/<name>"),
            got: id.to_string(),
        };

        let rest = id
            .strip_prefix(scheme)
            .and_then(|r| r.strip_prefix("://"))
            .ok_or_else(err)?;

        match rest.split('/').collect::<Vec<_>>().as_slice() {
            [zone, name] if !zone.is_empty() && !name.is_empty() => Ok(Self::new(zone, name)),
            _ => Err(err()),
        }
    }
}

impl fmt::Display for ResourceRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.zone, self.name)
    }
}

/// Identity of one node group: the zone it lives in plus its name.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct GroupId {
    pub zone: String,
    pub name: String,
}

impl GroupId {
    pub fn new(zone: &str, name: &str) -> Self {
        Self {
            zone: zone.to_string(),
            name: name.to_string(),
        }
    }
}

impl fmt::Display for GroupId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.zone, self.name)
    }
}

/// A parsed `minSize:maxSize:groupIdentifier` string.
///
/// The identifier is backend-specific and is interpreted by the backend
/// that registers the group.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NodeGroupSpec {
    pub min_size: u32,
    pub max_size: u32,
    pub identifier: String,
}

impl NodeGroupSpec {
    pub fn parse(value: &str) -> Result<Self, ParseError> {
        let tokens: Vec<&str> = value.splitn(3, ':').collect();
        let [min, max, identifier] = tokens.as_slice() else {
            return Err(ParseError::NodeGroupFormat(value.to_string()));
        };
        if identifier.is_empty() {
            return Err(ParseError::NodeGroupFormat(value.to_string()));
        }

        let min_size = match min.parse::<i64>() {
            Ok(size) if size <= 0 => return Err(ParseError::MinSizeTooSmall(size)),
            Ok(size) => u32::try_from(size).map_err(|_| ParseError::MinSize(min.to_string()))?,
            Err(_) => return Err(ParseError::MinSize(min.to_string())),
        };

        let max_size = match max.parse::<i64>() {
            Ok(size) if size < i64::from(min_size) => {
                return Err(ParseError::MaxBelowMin {
                    min: min_size,
                    max: u32::try_from(size.max(0)).unwrap_or(0),
                });
            }
            Ok(size) => u32::try_from(size).map_err(|_| ParseError::MaxSize(max.to_string()))?,
            Err(_) => return Err(ParseError::MaxSize(max.to_string())),
        };

        Ok(Self {
            min_size,
            max_size,
            identifier: identifier.to_string(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn parse_aws_provider_id() {
        let r = ResourceRef::from_provider_id("aws://us-east-1a/i-0abc", "aws").unwrap();
        assert_eq!(r, ResourceRef::new("us-east-1a", "i-0abc"));
    }

    #[test]
    fn provider_id_errors_name_expected_format() {
        for bad in [
            "aws://us-east-1a",
            "aws://us-east-1a/i-1/extra",
            "gce://zone/name",
            "aws:/zone/name",
            "aws:///name",
            "",
        ] {
            let err = ResourceRef::from_provider_id(bad, "aws").unwrap_err();
            assert!(
                err.to_string().contains("aws://<zone>/<name>"),
                "{bad}: {err}"
            );
        }
    }

    #[test]
    fn resource_ref_equality_needs_both_fields() {
        assert_ne!(ResourceRef::new("a", "x"), ResourceRef::new("b", "x"));
        assert_ne!(ResourceRef::new("a", "x"), ResourceRef::new("a", "y"));
    }

    #[test]
    fn parse_spec() {
        let spec = NodeGroupSpec::parse("1:10:us-east-1a/workers").unwrap();
        assert_eq!(spec.min_size, 1);
        assert_eq!(spec.max_size, 10);
        assert_eq!(spec.identifier, "us-east-1a/workers");
    }

    #[test]
    fn identifier_may_contain_colons() {
        let spec = NodeGroupSpec::parse("2:2:https://example.com/g").unwrap();
        assert_eq!(spec.identifier, "https://example.com/g");
    }

    #[test]
    fn reject_bad_specs() {
        assert!(matches!(
            NodeGroupSpec::parse("0:3:g"),
            Err(ParseError::MinSizeTooSmall(0))
        ));
        assert!(matches!(
            NodeGroupSpec::parse("3:2:g"),
            Err(ParseError::MaxBelowMin { min: 3, max: 2 })
        ));
        assert!(matches!(NodeGroupSpec::parse("a:2:g"), Err(ParseError::MinSize(_))));
        assert!(matches!(NodeGroupSpec::parse("1:b:g"), Err(ParseError::MaxSize(_))));
        assert!(matches!(NodeGroupSpec::parse(" 2:5:g"), Err(ParseError::MinSize(_))));
        assert!(matches!(NodeGroupSpec::parse("2:5 :g"), Err(ParseError::MaxSize(_))));
        assert!(matches!(
            NodeGroupSpec::parse("1:2"),
            Err(ParseError::NodeGroupFormat(_))
        ));
        assert!(matches!(
            NodeGroupSpec::parse("1:2:"),
            Err(ParseError::NodeGroupFormat(_))
        ));
    }

    proptest! {
        #[test]
        fn valid_bounds_round_trip(min in 1u32..1000, extra in 0u32..1000, id in "[a-z][a-z0-9-]{0,12}") {
            let max = min + extra;
            let spec = NodeGroupSpec::parse(&format!("{min}:{max}:{id}")).unwrap();
            prop_assert_eq!(spec.min_size, min);
            prop_assert_eq!(spec.max_size, max);
            prop_assert_eq!(spec.identifier, id);
        }

        #[test]
        fn non_positive_min_rejected(min in -1000i64..=0, max in 0i64..1000) {
            let value = format!("{min}:{max}:g");
            prop_assert!(NodeGroupSpec::parse(&value).is_err());
        }

        #[test]
        fn max_below_min_rejected(max in 1u32..1000, gap in 1u32..1000) {
            let min = max + gap;
            let value = format!("{min}:{max}:g");
            prop_assert!(NodeGroupSpec::parse(&value).is_err());
        }

        #[test]
        fn wrong_field_count_rejected(fields in proptest::collection::vec("[0-9]{1,3}", 0..3)) {
            prop_assert!(NodeGroupSpec::parse(&fields.join(":")).is_err());
        }
    }
}
