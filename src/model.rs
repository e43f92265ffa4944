use std::fmt;

use serde_derive::Serialize;
use serde_with::serde_as;

use crate::error::ConfigError;
use crate::parser::Node;

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct RouteSpec {
    pub to: String,
    pub via: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub metric: Option<u32>,
}

/// Desired state of one logical interface.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct InterfaceSpec {
    /// MAC address exactly as written in the document.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub match_mac: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub set_name: Option<String>,
    pub addresses: Vec<String>,
    pub routes: Vec<RouteSpec>,
    pub nameservers: Vec<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub mtu: Option<u32>,
}

impl InterfaceSpec {
    /// Reads one interface block.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError::InvalidField` if a present field has the wrong
    /// shape, e.g. `addresses` written as a scalar or a non-numeric `mtu`.
    pub fn from_node(name: &str, node: &Node) -> Result<Self, ConfigError> {
        let invalid = |field, expected| ConfigError::InvalidField {
            interface: name.to_string(),
            field,
            expected,
        };

        let match_mac = match node.get("match") {
            None => None,
            Some(m) if m.as_mapping().is_some() => m
                .get("macaddress")
                .map(|mac| {
                    mac.as_scalar()
                        .ok_or_else(|| invalid("match.macaddress", "a string"))
                })
                .transpose()?
                .map(str::to_string),
            Some(_) => return Err(invalid("match", "a mapping")),
        };

        let set_name = node
            .get("set-name")
            .map(|n| n.as_scalar().ok_or_else(|| invalid("set-name", "a string")))
            .transpose()?
            .map(str::trim)
            .filter(|n| !n.is_empty())
            .map(str::to_string);

        let addresses = scalars(node.get("addresses"))
            .ok_or_else(|| invalid("addresses", "a list of strings"))?;

        let mut routes = Vec::new();
        for route in sequence(node.get("routes")).ok_or_else(|| invalid("routes", "a list"))? {
            let field = |key: &str| route.get(key).and_then(Node::as_scalar);
            let Some(to) = field("to") else {
                return Err(invalid("routes", "entries with a `to` destination"));
            };
            let via = field("via").unwrap_or_default();
            let metric = field("metric")
                .map(|m| m.parse().map_err(|_| invalid("routes.metric", "an integer")))
                .transpose()?;
            routes.push(RouteSpec {
                to: to.to_string(),
                via: via.to_string(),
                metric,
            });
        }

        let nameservers = match node.get("nameservers") {
            None => Vec::new(),
            Some(ns) if ns.as_mapping().is_some() => scalars(ns.get("addresses"))
                .ok_or_else(|| invalid("nameservers.addresses", "a list of strings"))?,
            Some(_) => return Err(invalid("nameservers", "a mapping")),
        };

        let mtu = node
            .get("mtu")
            .map(|m| {
                m.as_scalar()
                    .and_then(|s| s.parse().ok())
                    .ok_or_else(|| invalid("mtu", "an integer"))
            })
            .transpose()?;

        Ok(InterfaceSpec {
            match_mac,
            set_name,
            addresses,
            routes,
            nameservers,
            mtu,
        })
    }
}

// Absent and empty-mapping nodes read as empty lists.
fn sequence(node: Option<&Node>) -> Option<&[Node]> {
    match node {
        None => Some(&[]),
        Some(Node::Sequence(items)) => Some(items),
        Some(Node::Mapping(entries)) if entries.is_empty() => Some(&[]),
        Some(_) => None,
    }
}

fn scalars(node: Option<&Node>) -> Option<Vec<String>> {
    sequence(node)?
        .iter()
        .map(|n| n.as_scalar().map(str::to_string))
        .collect()
}

/// The `ethernets` section of a network-config document, in document order.
#[serde_as]
#[derive(Debug, Default, Serialize)]
pub struct NetworkConfig {
    #[serde_as(as = "serde_with::Map<_, _>")]
    pub ethernets: Vec<(String, InterfaceSpec)>,
    /// Interfaces dropped because a field had the wrong shape.
    #[serde(skip)]
    pub rejected: Vec<ConfigError>,
}

impl fmt::Display for NetworkConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if let Ok(s) = serde_yaml::to_string(self) {
            write!(f, "{s}")
        } else {
            Ok(())
        }
    }
}

impl NetworkConfig {
    /// Builds the model from a parsed document. `ethernets` is looked up at
    /// the top level, then under `network`.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError::MissingSection` if there is no `ethernets`
    /// mapping. Malformed interfaces are collected in `rejected` instead.
    pub fn from_tree(tree: &Node) -> Result<Self, ConfigError> {
        let section = tree
            .get("ethernets")
            .or_else(|| tree.get("network").and_then(|n| n.get("ethernets")))
            .and_then(Node::as_mapping)
            .ok_or(ConfigError::MissingSection("ethernets"))?;

        let mut config = NetworkConfig::default();
        for (name, node) in section {
            match InterfaceSpec::from_node(name, node) {
                Ok(spec) => config.ethernets.push((name.clone(), spec)),
                Err(e) => {
                    tracing::warn!("{e}");
                    config.rejected.push(e);
                }
            }
        }
        Ok(config)
    }

    #[must_use]
    pub fn get(&self, name: &str) -> Option<&InterfaceSpec> {
        self.ethernets
            .iter()
            .find(|(n, _)| n == name)
            .map(|(_, spec)| spec)
    }
}
