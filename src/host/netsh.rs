use std::fmt;

use anyhow::Result;

use super::{POWERSHELL, ps_literal_pattern, run_command};
use crate::applier::{CommandSink, NetCommand};

const NETSH: &str = "netsh";

/// A program and its arguments, ready to be spawned.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Invocation {
    pub program: &'static str,
    pub args: Vec<String>,
}

impl fmt::Display for Invocation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.program)?;
        for arg in &self.args {
            if arg.contains(' ') {
                write!(f, " \"{arg}\"")?;
            } else {
                write!(f, " {arg}")?;
            }
        }
        Ok(())
    }
}

fn netsh(args: Vec<String>) -> Invocation {
    Invocation {
        program: NETSH,
        args,
    }
}

fn family(address: &str) -> &'static str {
    if address.contains(':') { "ipv6" } else { "ipv4" }
}

fn route_args(
    family: &str,
    adapter: &str,
    destination: &str,
    gateway: Option<&String>,
    metric: Option<u32>,
) -> Vec<String> {
    let mut args = vec![
        "interface".to_string(),
        family.to_string(),
        "add".to_string(),
        "route".to_string(),
        format!("prefix={destination}"),
        format!("interface={adapter}"),
    ];
    if let Some(gateway) = gateway {
        args.push(format!("nexthop={gateway}"));
    }
    if let Some(metric) = metric {
        args.push(format!("metric={metric}"));
    }
    args.push("store=persistent".to_string());
    args
}

/// Translates a command into the netsh (or PowerShell) call that performs
/// it on `adapter`.
#[must_use]
pub fn render(adapter: &str, command: &NetCommand) -> Invocation {
    let words = |list: &[&str]| list.iter().map(|w| (*w).to_string()).collect::<Vec<_>>();
    match command {
        NetCommand::SetDhcp => {
            let mut args = words(&["interface", "ipv4", "set", "address"]);
            args.push(format!("name={adapter}"));
            args.push("source=dhcp".to_string());
            netsh(args)
        }
        NetCommand::ResetIpv6 => {
            let alias = ps_literal_pattern(adapter);
            let script = format!(
                "Get-NetIPAddress -InterfaceAlias {alias} -AddressFamily IPv6 -PrefixOrigin Manual \
                 -ErrorAction SilentlyContinue | Remove-NetIPAddress -Confirm:$false; \
                 Get-NetRoute -InterfaceAlias {alias} -AddressFamily IPv6 -Protocol NetMgmt \
                 -ErrorAction SilentlyContinue | Remove-NetRoute -Confirm:$false"
            );
            Invocation {
                program: POWERSHELL,
                args: vec![
                    "-NoProfile".to_string(),
                    "-NonInteractive".to_string(),
                    "-Command".to_string(),
                    script,
                ],
            }
        }
        NetCommand::AddAddressV4 { address, netmask } => {
            let mut args = words(&["interface", "ipv4", "add", "address"]);
            args.push(format!("name={adapter}"));
            args.push(format!("address={address}"));
            args.push(format!("mask={netmask}"));
            netsh(args)
        }
        NetCommand::AddAddressV6 { address } => {
            let mut args = words(&["interface", "ipv6", "add", "address"]);
            args.push(format!("interface={adapter}"));
            args.push(format!("address={address}"));
            netsh(args)
        }
        NetCommand::AddRouteV4 {
            destination,
            gateway,
            metric,
        } => netsh(route_args(
            "ipv4",
            adapter,
            destination,
            gateway.as_ref(),
            *metric,
        )),
        NetCommand::AddRouteV6 {
            destination,
            gateway,
            metric,
        } => netsh(route_args(
            "ipv6",
            adapter,
            destination,
            gateway.as_ref(),
            *metric,
        )),
        NetCommand::SetPrimaryDns { server } => {
            let mut args = words(&["interface", family(server), "set", "dnsservers"]);
            args.push(format!("name={adapter}"));
            args.push("source=static".to_string());
            args.push(format!("address={server}"));
            args.push("register=primary".to_string());
            args.push("validate=no".to_string());
            netsh(args)
        }
        NetCommand::AddDns { server, index } => {
            let mut args = words(&["interface", family(server), "add", "dnsservers"]);
            args.push(format!("name={adapter}"));
            args.push(format!("address={server}"));
            args.push(format!("index={index}"));
            args.push("validate=no".to_string());
            netsh(args)
        }
        NetCommand::SetMtu(mtu) => {
            let mut args = words(&["interface", "ipv4", "set", "subinterface"]);
            args.push(format!("interface={adapter}"));
            args.push(format!("mtu={mtu}"));
            args.push("store=persistent".to_string());
            netsh(args)
        }
    }
}

/// Executes commands with netsh. With `dry_run` set, commands are only
/// logged.
#[derive(Debug, Default)]
pub struct NetshSink {
    dry_run: bool,
}

impl NetshSink {
    #[must_use]
    pub fn new(dry_run: bool) -> Self {
        NetshSink { dry_run }
    }
}

impl CommandSink for NetshSink {
    fn execute(&mut self, adapter: &str, command: &NetCommand) -> Result<()> {
        let invocation = render(adapter, command);
        if self.dry_run {
            tracing::info!("dry run: {invocation}");
            return Ok(());
        }
        tracing::debug!("{invocation}");
        let args: Vec<&str> = invocation.args.iter().map(String::as_str).collect();
        run_command(invocation.program, &args)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn line(adapter: &str, command: &NetCommand) -> String {
        render(adapter, command).to_string()
    }

    #[test]
    fn renders_address_commands() {
        assert_eq!(
            line("LAN", &NetCommand::SetDhcp),
            "netsh interface ipv4 set address name=LAN source=dhcp"
        );
        assert_eq!(
            line(
                "LAN",
                &NetCommand::AddAddressV4 {
                    address: "10.0.0.5".to_string(),
                    netmask: "255.255.255.0".to_string(),
                }
            ),
            "netsh interface ipv4 add address name=LAN address=10.0.0.5 mask=255.255.255.0"
        );
        assert_eq!(
            line(
                "LAN",
                &NetCommand::AddAddressV6 {
                    address: "fd00::5/64".to_string(),
                }
            ),
            "netsh interface ipv6 add address interface=LAN address=fd00::5/64"
        );
    }

    #[test]
    fn renders_routes_with_and_without_gateway() {
        assert_eq!(
            line(
                "LAN",
                &NetCommand::AddRouteV4 {
                    destination: "0.0.0.0/0".to_string(),
                    gateway: Some("10.0.0.1".to_string()),
                    metric: None,
                }
            ),
            "netsh interface ipv4 add route prefix=0.0.0.0/0 interface=LAN nexthop=10.0.0.1 store=persistent"
        );
        assert_eq!(
            line(
                "LAN",
                &NetCommand::AddRouteV6 {
                    destination: "fd01::/64".to_string(),
                    gateway: None,
                    metric: Some(5),
                }
            ),
            "netsh interface ipv6 add route prefix=fd01::/64 interface=LAN metric=5 store=persistent"
        );
    }

    #[test]
    fn renders_dns_by_family() {
        assert_eq!(
            line(
                "LAN",
                &NetCommand::SetPrimaryDns {
                    server: "8.8.8.8".to_string(),
                }
            ),
            "netsh interface ipv4 set dnsservers name=LAN source=static address=8.8.8.8 register=primary validate=no"
        );
        assert_eq!(
            line(
                "LAN",
                &NetCommand::AddDns {
                    server: "2001:4860:4860::8888".to_string(),
                    index: 2,
                }
            ),
            "netsh interface ipv6 add dnsservers name=LAN address=2001:4860:4860::8888 index=2 validate=no"
        );
    }

    #[test]
    fn adapter_names_with_spaces_stay_one_argument() {
        let invocation = render("Ethernet 2", &NetCommand::SetMtu(1400));
        assert_eq!(invocation.args[4], "interface=Ethernet 2");
        assert_eq!(
            invocation.to_string(),
            "netsh interface ipv4 set subinterface \"interface=Ethernet 2\" mtu=1400 store=persistent"
        );
    }

    #[test]
    fn ipv6_reset_goes_through_powershell() {
        let invocation = render("Bob's NIC", &NetCommand::ResetIpv6);
        assert_eq!(invocation.program, POWERSHELL);
        assert!(invocation.args[3].contains("-InterfaceAlias 'Bob''s NIC'"));
        assert!(invocation.args[3].contains("Remove-NetIPAddress"));
    }

    #[test]
    fn dry_run_executes_nothing() {
        let mut sink = NetshSink::new(true);
        assert!(sink.execute("LAN", &NetCommand::SetMtu(1400)).is_ok());
    }
}
