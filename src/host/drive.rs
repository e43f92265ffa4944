use std::path::{Path, PathBuf};

use sysinfo::Disks;

use crate::error::ConfigError;

/// Looks for `document_name` at the root of the first mounted volume whose
/// label matches one of `labels` (case-insensitive).
///
/// # Errors
///
/// Returns `ConfigError::NotFound` if no such volume holds the document.
pub fn locate_document(labels: &[String], document_name: &str) -> Result<PathBuf, ConfigError> {
    let disks = Disks::new_with_refreshed_list();
    let volumes: Vec<(String, &Path)> = disks
        .iter()
        .map(|d| (d.name().to_string_lossy().into_owned(), d.mount_point()))
        .collect();
    find_document(
        volumes.iter().map(|(label, mount)| (label.as_str(), *mount)),
        labels,
        document_name,
    )
}

/// Picks the document from a list of `(label, mount point)` volumes.
///
/// # Errors
///
/// Returns `ConfigError::NotFound` if no matching volume holds the document.
pub fn find_document<'a>(
    volumes: impl IntoIterator<Item = (&'a str, &'a Path)>,
    labels: &[String],
    document_name: &str,
) -> Result<PathBuf, ConfigError> {
    for (label, mount) in volumes {
        if !labels.iter().any(|l| l.eq_ignore_ascii_case(label.trim())) {
            continue;
        }
        let candidate = mount.join(document_name);
        if candidate.is_file() {
            tracing::info!("found {} on volume \"{label}\"", candidate.display());
            return Ok(candidate);
        }
        tracing::debug!(
            "volume \"{label}\" at {} has no {document_name}",
            mount.display()
        );
    }
    Err(ConfigError::NotFound(format!(
        "{document_name} on a volume labelled {}",
        labels.join(" or ")
    )))
}
