use std::fmt;
use std::net::{IpAddr, Ipv4Addr};

use anyhow::Result;
use ipnet::{IpNet, Ipv4Net, Ipv6Net};

use crate::error::{ApplyError, ConfigError};
use crate::model::RouteSpec;
use crate::resolver::{Adapter, ResolvedAdapter};

/// Source of the host's adapters and the only way to rename one.
pub trait AdapterInventory {
    /// Lists the physical adapters present right now.
    ///
    /// # Errors
    ///
    /// Returns an error if the adapters cannot be enumerated.
    fn list_adapters(&self) -> Result<Vec<Adapter>>;

    /// Renames an adapter.
    ///
    /// # Errors
    ///
    /// Returns an error if the host refuses the rename.
    fn rename_adapter(&mut self, current: &str, new: &str) -> Result<()>;

    fn adapter_exists(&self, name: &str) -> bool;
}

/// Executes network stack mutations against a named adapter.
pub trait CommandSink {
    /// # Errors
    ///
    /// Returns an error carrying the diagnostic output if the command failed.
    fn execute(&mut self, adapter: &str, command: &NetCommand) -> Result<()>;
}

/// One network stack mutation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum NetCommand {
    /// Switches IPv4 addressing to DHCP, dropping static addresses.
    SetDhcp,
    /// Removes manually configured IPv6 state.
    ResetIpv6,
    AddAddressV4 {
        address: String,
        netmask: String,
    },
    /// `address` keeps its `/prefix` suffix.
    AddAddressV6 {
        address: String,
    },
    AddRouteV4 {
        destination: String,
        gateway: Option<String>,
        metric: Option<u32>,
    },
    AddRouteV6 {
        destination: String,
        gateway: Option<String>,
        metric: Option<u32>,
    },
    /// Replaces every configured DNS server with `server`.
    SetPrimaryDns {
        server: String,
    },
    AddDns {
        server: String,
        index: usize,
    },
    SetMtu(u32),
}

impl fmt::Display for NetCommand {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            NetCommand::SetDhcp => write!(f, "set-dhcp"),
            NetCommand::ResetIpv6 => write!(f, "reset-ipv6"),
            NetCommand::AddAddressV4 { address, netmask } => {
                write!(f, "add-address {address} {netmask}")
            }
            NetCommand::AddAddressV6 { address } => write!(f, "add-address {address}"),
            NetCommand::AddRouteV4 {
                destination,
                gateway,
                metric,
            }
            | NetCommand::AddRouteV6 {
                destination,
                gateway,
                metric,
            } => {
                write!(f, "add-route {destination}")?;
                if let Some(gateway) = gateway {
                    write!(f, " via {gateway}")?;
                }
                if let Some(metric) = metric {
                    write!(f, " metric {metric}")?;
                }
                Ok(())
            }
            NetCommand::SetPrimaryDns { server } => write!(f, "set-dns {server}"),
            NetCommand::AddDns { server, index } => write!(f, "add-dns {server} index {index}"),
            NetCommand::SetMtu(mtu) => write!(f, "set-mtu {mtu}"),
        }
    }
}

/// Dotted-decimal netmask for an IPv4 prefix length, `None` above 32.
#[must_use]
pub fn prefix_to_mask(prefix: u8) -> Option<Ipv4Addr> {
    Ipv4Net::new(Ipv4Addr::UNSPECIFIED, prefix)
        .ok()
        .map(|net| net.netmask())
}

fn address_command(cidr: &str) -> Option<NetCommand> {
    let (host, prefix) = cidr.trim().split_once('/')?;
    if host.contains(':') {
        cidr.trim().parse::<Ipv6Net>().ok()?;
        return Some(NetCommand::AddAddressV6 {
            address: cidr.trim().to_string(),
        });
    }
    let address: Ipv4Addr = host.parse().ok()?;
    let netmask = prefix_to_mask(prefix.parse().ok()?)?;
    Some(NetCommand::AddAddressV4 {
        address: address.to_string(),
        netmask: netmask.to_string(),
    })
}

fn route_command(route: &RouteSpec) -> Option<NetCommand> {
    let via = route.via.trim();
    let destination = match route.to.trim() {
        "default" if via.contains(':') => "::/0",
        "default" => "0.0.0.0/0",
        to => to,
    };
    let v6 = destination.contains(':');
    destination.parse::<IpNet>().ok()?;

    let gateway = if via.is_empty() {
        None
    } else {
        let addr: IpAddr = via.parse().ok()?;
        if addr.is_ipv6() != v6 {
            return None;
        }
        (!addr.is_unspecified()).then(|| via.to_string())
    };

    let destination = destination.to_string();
    let metric = route.metric;
    Some(if v6 {
        NetCommand::AddRouteV6 {
            destination,
            gateway,
            metric,
        }
    } else {
        NetCommand::AddRouteV4 {
            destination,
            gateway,
            metric,
        }
    })
}

/// Outcome of applying one interface.
#[derive(Debug)]
pub struct ApplyResult {
    pub interface: String,
    /// Adapter name after the rename step.
    pub adapter: String,
    pub executed: usize,
    pub failures: Vec<ApplyError>,
    /// Set when a failed rename stopped the remaining steps.
    pub aborted: bool,
}

impl ApplyResult {
    #[must_use]
    pub fn is_success(&self) -> bool {
        self.failures.is_empty()
    }
}

/// Everything that happened during one run.
#[derive(Debug, Default)]
pub struct RunReport {
    pub rejected: Vec<ConfigError>,
    pub unmatched: Vec<ApplyError>,
    pub results: Vec<ApplyResult>,
}

impl RunReport {
    pub fn failures(&self) -> impl Iterator<Item = &ApplyError> {
        self.unmatched
            .iter()
            .chain(self.results.iter().flat_map(|r| r.failures.iter()))
    }

    #[must_use]
    pub fn is_clean(&self) -> bool {
        self.rejected.is_empty() && self.failures().next().is_none()
    }

    /// Interfaces with at least one failure, each listed once.
    #[must_use]
    pub fn failed_interfaces(&self) -> Vec<&str> {
        let mut names: Vec<&str> = Vec::new();
        for name in self.failures().map(ApplyError::interface) {
            if !names.contains(&name) {
                names.push(name);
            }
        }
        names
    }
}

impl fmt::Display for RunReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let applied = self.results.iter().filter(|r| r.is_success()).count();
        write!(
            f,
            "{applied}/{} interface(s) applied cleanly, {} rejected, {} failure(s)",
            self.results.len(),
            self.rejected.len(),
            self.failures().count()
        )
    }
}

/// Drives the rename, reset, address, route, DNS and MTU steps for each
/// resolved adapter. A failing command is recorded and the next one runs.
pub struct NetworkApplier<'a, I, S> {
    inventory: &'a mut I,
    sink: &'a mut S,
}

impl<'a, I, S> NetworkApplier<'a, I, S>
where
    I: AdapterInventory,
    S: CommandSink,
{
    pub fn new(inventory: &'a mut I, sink: &'a mut S) -> Self {
        NetworkApplier { inventory, sink }
    }

    /// Applies every entry in the given order. A name an adapter receives
    /// is carried over to later entries that resolved to the same adapter.
    pub fn apply_all(&mut self, resolved: Vec<ResolvedAdapter>) -> Vec<ApplyResult> {
        let mut names: Vec<(String, String)> = Vec::new();
        let mut results = Vec::with_capacity(resolved.len());
        for mut entry in resolved {
            if let Some((_, name)) = names.iter().find(|(id, _)| *id == entry.adapter.id) {
                tracing::debug!(
                    "{}: adapter \"{}\" is now \"{name}\"",
                    entry.interface,
                    entry.adapter.name
                );
                entry.adopt_name(name);
            }
            let result = self.apply(&mut entry);
            match names.iter_mut().find(|(id, _)| *id == entry.adapter.id) {
                Some((_, name)) => name.clone_from(&result.adapter),
                None => names.push((entry.adapter.id.clone(), result.adapter.clone())),
            }
            results.push(result);
        }
        results
    }

    pub fn apply(&mut self, resolved: &mut ResolvedAdapter) -> ApplyResult {
        let mut result = ApplyResult {
            interface: resolved.interface.clone(),
            adapter: resolved.current_name().to_string(),
            executed: 0,
            failures: Vec::new(),
            aborted: false,
        };

        if let Err(e) = self.rename(resolved) {
            tracing::warn!("{e}");
            let fatal = matches!(e, ApplyError::RenameFailed { .. });
            result.failures.push(e);
            if fatal {
                result.aborted = true;
                return result;
            }
        }
        result.adapter = resolved.current_name().to_string();

        let spec = &resolved.spec;
        let mut commands = vec![NetCommand::SetDhcp, NetCommand::ResetIpv6];

        for cidr in &spec.addresses {
            match address_command(cidr) {
                Some(cmd) => commands.push(cmd),
                None => result.failures.push(ApplyError::InvalidAddress {
                    interface: resolved.interface.clone(),
                    address: cidr.clone(),
                }),
            }
        }

        for route in &spec.routes {
            match route_command(route) {
                Some(cmd) => commands.push(cmd),
                None => result.failures.push(ApplyError::InvalidRoute {
                    interface: resolved.interface.clone(),
                    to: route.to.clone(),
                    via: route.via.clone(),
                }),
            }
        }

        let mut servers = spec.nameservers.iter();
        if let Some(primary) = servers.next() {
            commands.push(NetCommand::SetPrimaryDns {
                server: primary.clone(),
            });
            commands.extend(servers.enumerate().map(|(i, server)| NetCommand::AddDns {
                server: server.clone(),
                index: i + 2,
            }));
        }

        if let Some(mtu) = spec.mtu {
            commands.push(NetCommand::SetMtu(mtu));
        }

        for failure in &result.failures {
            tracing::warn!("{failure}");
        }

        for command in &commands {
            tracing::info!(
                "{}: {command} on \"{}\"",
                resolved.interface,
                result.adapter
            );
            match self.sink.execute(&result.adapter, command) {
                Ok(()) => result.executed += 1,
                Err(e) => {
                    let failure = ApplyError::CommandFailure {
                        interface: resolved.interface.clone(),
                        command: command.to_string(),
                        reason: format!("{e:#}"),
                    };
                    tracing::warn!("{failure}");
                    result.failures.push(failure);
                }
            }
        }

        result
    }

    // Only `RenameFailed` leaves the adapter without a usable name.
    fn rename(&mut self, resolved: &mut ResolvedAdapter) -> Result<(), ApplyError> {
        let Some(target) = resolved.spec.set_name.clone() else {
            return Ok(());
        };
        let current = resolved.current_name().to_string();
        // Adapter names are case-insensitive on the host.
        if current.eq_ignore_ascii_case(&target) {
            tracing::info!(
                "{}: adapter already named \"{target}\"",
                resolved.interface
            );
            return Ok(());
        }
        if self.inventory.adapter_exists(&target) {
            return Err(ApplyError::RenameConflict {
                interface: resolved.interface.clone(),
                current,
                target,
            });
        }

        tracing::info!(
            "{}: renaming \"{current}\" to \"{target}\"",
            resolved.interface
        );
        let failed = |reason: String| ApplyError::RenameFailed {
            interface: resolved.interface.clone(),
            current: current.clone(),
            target: target.clone(),
            reason,
        };
        if let Err(e) = self.inventory.rename_adapter(&current, &target) {
            return Err(failed(format!("{e:#}")));
        }
        if !self.inventory.adapter_exists(&target) {
            return Err(failed("adapter not found under its new name".to_string()));
        }

        resolved.adopt_name(&target);
        Ok(())
    }
}
