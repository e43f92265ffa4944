use std::io;

use thiserror::Error;

/// Errors raised while loading the network configuration document.
///
/// `NotFound` and `MissingSection` abort the run. `InvalidField` only
/// disqualifies the interface it names.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("network configuration not found: {0}")]
    NotFound(String),

    #[error("required section `{0}` is missing")]
    MissingSection(&'static str),

    #[error("interface {interface}: `{field}` must be {expected}")]
    InvalidField {
        interface: String,
        field: &'static str,
        expected: &'static str,
    },

    #[error("failed to read {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: io::Error,
    },
}

/// Recoverable failures recorded while resolving and applying interfaces.
#[derive(Debug, Error)]
pub enum ApplyError {
    #[error("{interface}: no adapter with MAC address {mac}")]
    NoMatchingAdapter { interface: String, mac: String },

    #[error("{interface}: name \"{target}\" is held by another adapter, keeping \"{current}\"")]
    RenameConflict {
        interface: String,
        current: String,
        target: String,
    },

    #[error("{interface}: rename \"{current}\" -> \"{target}\" failed: {reason}")]
    RenameFailed {
        interface: String,
        current: String,
        target: String,
        reason: String,
    },

    #[error("{interface}: invalid address \"{address}\"")]
    InvalidAddress { interface: String, address: String },

    #[error("{interface}: invalid route to \"{to}\" via \"{via}\"")]
    InvalidRoute {
        interface: String,
        to: String,
        via: String,
    },

    #[error("{interface}: `{command}` failed: {reason}")]
    CommandFailure {
        interface: String,
        command: String,
        reason: String,
    },
}

impl ApplyError {
    /// Returns the interface key the failure belongs to.
    #[must_use]
    pub fn interface(&self) -> &str {
        match self {
            Self::NoMatchingAdapter { interface, .. }
            | Self::RenameConflict { interface, .. }
            | Self::RenameFailed { interface, .. }
            | Self::InvalidAddress { interface, .. }
            | Self::InvalidRoute { interface, .. }
            | Self::CommandFailure { interface, .. } => interface,
        }
    }
}
