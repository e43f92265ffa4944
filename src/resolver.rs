use crate::error::ApplyError;
use crate::model::{InterfaceSpec, NetworkConfig};

/// A network adapter as reported by the host when the run started.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Adapter {
    pub name: String,
    pub mac: String,
    pub id: String,
}

impl Adapter {
    #[must_use]
    pub fn new(name: &str, mac: &str, id: &str) -> Self {
        Adapter {
            name: name.to_string(),
            mac: mac.to_string(),
            id: id.to_string(),
        }
    }
}

/// An interface spec paired with the adapter it matched.
///
/// The adapter snapshot is never refreshed; renames performed during the run
/// are tracked in `current_name`.
#[derive(Debug, Clone)]
pub struct ResolvedAdapter {
    pub interface: String,
    pub spec: InterfaceSpec,
    pub adapter: Adapter,
    current_name: String,
}

impl ResolvedAdapter {
    #[must_use]
    pub fn new(interface: &str, spec: InterfaceSpec, adapter: Adapter) -> Self {
        let current_name = adapter.name.clone();
        ResolvedAdapter {
            interface: interface.to_string(),
            spec,
            adapter,
            current_name,
        }
    }

    /// The name commands must target.
    #[must_use]
    pub fn current_name(&self) -> &str {
        &self.current_name
    }

    pub(crate) fn adopt_name(&mut self, name: &str) {
        self.current_name = name.to_string();
    }
}

#[derive(Debug, Default)]
pub struct Resolution {
    /// Matched interfaces, in the order they must be applied.
    pub resolved: Vec<ResolvedAdapter>,
    pub unmatched: Vec<ApplyError>,
}

/// Canonical MAC form: lowercase, `:` separated.
///
/// Twelve hex digits in any grouping (`AA-BB-..`, `aabb.ccdd.eeff`,
/// `AABBCCDDEEFF`) become `aa:bb:cc:dd:ee:ff`. Anything else only has its
/// case folded and `-`/`.` replaced by `:`.
#[must_use]
pub fn normalize_mac(mac: &str) -> String {
    let lower = mac.trim().to_ascii_lowercase();
    let digits: Vec<char> = lower
        .chars()
        .filter(|c| !matches!(c, ':' | '-' | '.'))
        .collect();
    if digits.len() != 12 || !digits.iter().all(char::is_ascii_hexdigit) {
        return lower.replace(['-', '.'], ":");
    }

    let mut out = String::with_capacity(17);
    for (i, c) in digits.into_iter().enumerate() {
        if i > 0 && i % 2 == 0 {
            out.push(':');
        }
        out.push(c);
    }
    out
}

// "eth1" goes before "eth0" so that a rename of the second NIC does not
// collide with a default name the first NIC still holds. Everything else
// keeps document order after those two.
fn rank(interface: &str) -> u8 {
    match interface {
        "eth1" => 0,
        "eth0" => 1,
        _ => 2,
    }
}

/// Returns the interface keys of `config` in application order.
#[must_use]
pub fn resolution_order(config: &NetworkConfig) -> Vec<&str> {
    let mut names: Vec<&str> = config.ethernets.iter().map(|(n, _)| n.as_str()).collect();
    names.sort_by_key(|n| rank(n));
    names
}

/// Pairs every interface with the live adapter whose MAC matches.
///
/// Interfaces without a `match.macaddress` are dropped silently; those whose
/// MAC is not present are reported in `unmatched`. Neither stops the rest
/// from resolving.
#[must_use]
pub fn resolve(config: &NetworkConfig, adapters: &[Adapter]) -> Resolution {
    let live: Vec<(String, &Adapter)> = adapters
        .iter()
        .filter(|a| !a.mac.trim().is_empty())
        .map(|a| (normalize_mac(&a.mac), a))
        .collect();

    let mut resolution = Resolution::default();
    for interface in resolution_order(config) {
        let Some(spec) = config.get(interface) else {
            continue;
        };
        let Some(mac) = spec.match_mac.as_deref().filter(|m| !m.trim().is_empty()) else {
            tracing::debug!("{interface}: no match criterion, skipping");
            continue;
        };

        let wanted = normalize_mac(mac);
        let mut matches = live.iter().filter(|(m, _)| *m == wanted).map(|(_, a)| a);
        let Some(adapter) = matches.next() else {
            let err = ApplyError::NoMatchingAdapter {
                interface: interface.to_string(),
                mac: mac.to_string(),
            };
            tracing::warn!("{err}");
            resolution.unmatched.push(err);
            continue;
        };
        if let Some(other) = matches.next() {
            tracing::warn!(
                "{interface}: MAC {mac} is shared by \"{}\" and \"{}\", using the first",
                adapter.name,
                other.name
            );
        }

        tracing::info!(
            "{interface}: matched adapter \"{}\" ({})",
            adapter.name,
            adapter.mac
        );
        resolution
            .resolved
            .push(ResolvedAdapter::new(interface, spec.clone(), (*adapter).clone()));
    }
    resolution
}
