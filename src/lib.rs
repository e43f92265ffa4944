//! Applies a cloud-init style `network-config` document to the adapters of
//! the running host.
//!
//! The document is read by [`parser::parse`], typed by
//! [`model::NetworkConfig`], matched against the host's adapters by
//! [`resolver::resolve`] and finally applied by [`applier::NetworkApplier`].
//! Host access goes through the [`AdapterInventory`] and [`CommandSink`]
//! traits; [`host`] provides the Windows implementations.

pub mod applier;
pub mod error;
pub mod host;
pub mod model;
pub mod parser;
pub mod resolver;

use std::{fs, io, path::Path};

pub use applier::{AdapterInventory, ApplyResult, CommandSink, NetCommand, RunReport};
pub use error::{ApplyError, ConfigError};
pub use model::{InterfaceSpec, NetworkConfig, RouteSpec};
pub use resolver::{Adapter, ResolvedAdapter};

/// Reads the document at `path`.
///
/// # Errors
///
/// * `ConfigError::NotFound` if nothing exists at `path`.
/// * `ConfigError::Io` if the file exists but cannot be read.
pub fn load_document(path: &Path) -> Result<String, ConfigError> {
    fs::read_to_string(path).map_err(|e| {
        if e.kind() == io::ErrorKind::NotFound {
            ConfigError::NotFound(path.display().to_string())
        } else {
            ConfigError::Io {
                path: path.display().to_string(),
                source: e,
            }
        }
    })
}

/// Parses `text`, resolves it against the adapters `inventory` reports and
/// applies every matched interface through `sink`.
///
/// A failure to enumerate adapters is logged and treated as an empty
/// inventory, so every interface ends up unmatched.
///
/// # Errors
///
/// Returns `ConfigError::MissingSection` if the document has no `ethernets`
/// section. Everything else is recorded in the returned report.
pub fn apply_document<I, S>(
    text: &str,
    inventory: &mut I,
    sink: &mut S,
) -> Result<RunReport, ConfigError>
where
    I: AdapterInventory,
    S: CommandSink,
{
    let tree = parser::parse(text);
    let config = NetworkConfig::from_tree(&tree)?;
    for (name, spec) in &config.ethernets {
        tracing::info!(
            "found interface {name} (match {})",
            spec.match_mac.as_deref().unwrap_or("-")
        );
    }

    let adapters = inventory.list_adapters().unwrap_or_else(|e| {
        tracing::error!("failed to list network adapters: {e:#}");
        Vec::new()
    });
    tracing::debug!("{} adapter(s) present", adapters.len());

    let resolution = resolver::resolve(&config, &adapters);
    let results = applier::NetworkApplier::new(inventory, sink).apply_all(resolution.resolved);

    Ok(RunReport {
        rejected: config.rejected,
        unmatched: resolution.unmatched,
        results,
    })
}
