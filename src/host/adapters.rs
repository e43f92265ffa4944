use anyhow::{Context, Result, anyhow};
use serde::Deserialize;

use super::{POWERSHELL, ps_literal_pattern, ps_quote, run_command, run_command_output};
use crate::applier::AdapterInventory;
use crate::resolver::Adapter;

const LIST_ADAPTERS: &str = "Get-NetAdapter -Physical \
    | Select-Object Name,MacAddress,InterfaceIndex \
    | ConvertTo-Json -Compress";

#[derive(Debug, Deserialize)]
#[serde(rename_all = "PascalCase")]
struct NetAdapter {
    name: String,
    mac_address: Option<String>,
    interface_index: u32,
}

// ConvertTo-Json emits a bare object when there is a single adapter.
#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum NetAdapterList {
    One(NetAdapter),
    Many(Vec<NetAdapter>),
}

fn parse_adapter_list(json: &str) -> Result<Vec<Adapter>> {
    if json.trim().is_empty() {
        return Ok(Vec::new());
    }
    let parsed = serde_json::from_str::<NetAdapterList>(json)
        .context("unexpected Get-NetAdapter output")?;
    let list = match parsed {
        NetAdapterList::One(a) => vec![a],
        NetAdapterList::Many(v) => v,
    };
    Ok(list
        .into_iter()
        .map(|a| Adapter {
            name: a.name,
            mac: a.mac_address.unwrap_or_default(),
            id: a.interface_index.to_string(),
        })
        .collect())
}

fn powershell(script: &str) -> [&str; 4] {
    ["-NoProfile", "-NonInteractive", "-Command", script]
}

/// Windows adapters through the `NetAdapter` PowerShell module.
#[derive(Debug, Default)]
pub struct PowerShellInventory;

impl AdapterInventory for PowerShellInventory {
    fn list_adapters(&self) -> Result<Vec<Adapter>> {
        let json = run_command_output(POWERSHELL, &powershell(LIST_ADAPTERS))
            .ok_or_else(|| anyhow!("Get-NetAdapter failed"))?;
        parse_adapter_list(&json)
    }

    fn rename_adapter(&mut self, current: &str, new: &str) -> Result<()> {
        let script = format!(
            "Rename-NetAdapter -Name {} -NewName {} -ErrorAction Stop",
            ps_literal_pattern(current),
            ps_quote(new)
        );
        run_command(POWERSHELL, &powershell(&script))
    }

    fn adapter_exists(&self, name: &str) -> bool {
        let script = format!(
            "Get-NetAdapter -Name {} -ErrorAction Stop | Out-Null",
            ps_literal_pattern(name)
        );
        run_command(POWERSHELL, &powershell(&script)).is_ok()
    }
}

/// Adapters as seen by the datalink layer. Used for dry runs on hosts
/// without the Windows networking stack; renames are refused.
#[cfg(not(windows))]
#[derive(Debug, Default)]
pub struct PnetInventory;

#[cfg(not(windows))]
impl AdapterInventory for PnetInventory {
    fn list_adapters(&self) -> Result<Vec<Adapter>> {
        Ok(pnet::datalink::interfaces()
            .into_iter()
            .filter(|i| !i.is_loopback())
            .map(|i| Adapter {
                mac: i.mac.map(|m| m.to_string()).unwrap_or_default(),
                id: i.index.to_string(),
                name: i.name,
            })
            .collect())
    }

    fn rename_adapter(&mut self, current: &str, _new: &str) -> Result<()> {
        Err(anyhow!("cannot rename \"{current}\": not supported on this host"))
    }

    fn adapter_exists(&self, name: &str) -> bool {
        pnet::datalink::interfaces().iter().any(|i| i.name == name)
    }
}

/// Wraps an inventory so that renames are only logged. Later lookups see
/// the names the renames would have produced.
#[derive(Debug)]
pub struct DryRunInventory<I> {
    inner: I,
    renamed: Vec<(String, String)>,
}

impl<I> DryRunInventory<I> {
    pub fn new(inner: I) -> Self {
        DryRunInventory {
            inner,
            renamed: Vec::new(),
        }
    }
}

impl<I: AdapterInventory> AdapterInventory for DryRunInventory<I> {
    fn list_adapters(&self) -> Result<Vec<Adapter>> {
        self.inner.list_adapters()
    }

    fn rename_adapter(&mut self, current: &str, new: &str) -> Result<()> {
        tracing::info!("dry run: rename \"{current}\" to \"{new}\"");
        self.renamed.push((current.to_string(), new.to_string()));
        Ok(())
    }

    fn adapter_exists(&self, name: &str) -> bool {
        // The latest rename touching `name` decides.
        for (from, to) in self.renamed.iter().rev() {
            if to == name {
                return true;
            }
            if from == name {
                return false;
            }
        }
        self.inner.adapter_exists(name)
    }
}
