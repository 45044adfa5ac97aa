//! Reading and writing definition files
//!
//! JSON is the exchange format; `.yaml`/`.yml` files are accepted as well.

use std::fs;
use std::path::{Path, PathBuf};

use tracing::{debug, warn};

use super::WorkflowDefinition;

/// Errors from loading or saving definition files
#[derive(Debug, thiserror::Error)]
pub enum LoadError {
    #[error("failed to read {}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("invalid JSON definition in {}: {source}", path.display())]
    Json {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },

    #[error("invalid YAML definition in {}: {source}", path.display())]
    Yaml {
        path: PathBuf,
        #[source]
        source: serde_yaml::Error,
    },

    #[error("unsupported definition file extension: {}", .0.display())]
    UnsupportedFormat(PathBuf),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Format {
    Json,
    Yaml,
}

fn format_of(path: &Path) -> Option<Format> {
    match path.extension()?.to_str()?.to_ascii_lowercase().as_str() {
        "json" => Some(Format::Json),
        "yaml" | "yml" => Some(Format::Yaml),
        _ => None,
    }
}

/// Parse a single definition file
pub fn load_definition_file(path: impl AsRef<Path>) -> Result<WorkflowDefinition, LoadError> {
    let path = path.as_ref();
    let format = format_of(path).ok_or_else(|| LoadError::UnsupportedFormat(path.to_path_buf()))?;

    let raw = fs::read_to_string(path).map_err(|source| LoadError::Io {
        path: path.to_path_buf(),
        source,
    })?;

    match format {
        Format::Json => serde_json::from_str(&raw).map_err(|source| LoadError::Json {
            path: path.to_path_buf(),
            source,
        }),
        Format::Yaml => serde_yaml::from_str(&raw).map_err(|source| LoadError::Yaml {
            path: path.to_path_buf(),
            source,
        }),
    }
}

/// Parse every definition file in a directory (non-recursive)
///
/// Files with other extensions are skipped. A file that fails to parse is
/// reported in the returned list without aborting the rest. Entries are
/// sorted by file name so repeated loads register in the same order.
pub fn load_definitions_from_dir(
    dir: impl AsRef<Path>,
) -> Result<Vec<(PathBuf, Result<WorkflowDefinition, LoadError>)>, LoadError> {
    let dir = dir.as_ref();
    let entries = fs::read_dir(dir).map_err(|source| LoadError::Io {
        path: dir.to_path_buf(),
        source,
    })?;

    let mut paths: Vec<PathBuf> = entries
        .filter_map(|entry| entry.ok().map(|e| e.path()))
        .filter(|path| path.is_file() && format_of(path).is_some())
        .collect();
    paths.sort();

    let loaded = paths
        .into_iter()
        .map(|path| {
            let result = load_definition_file(&path);
            match &result {
                Ok(def) => debug!(path = %path.display(), workflow_id = %def.id, "loaded definition"),
                Err(e) => warn!(path = %path.display(), error = %e, "skipping invalid definition"),
            }
            (path, result)
        })
        .collect();

    Ok(loaded)
}

/// Write a definition as pretty-printed JSON
pub fn save_definition_file(
    definition: &WorkflowDefinition,
    path: impl AsRef<Path>,
) -> Result<(), LoadError> {
    let path = path.as_ref();
    let json = serde_json::to_string_pretty(definition).map_err(|source| LoadError::Json {
        path: path.to_path_buf(),
        source,
    })?;

    fs::write(path, json).map_err(|source| LoadError::Io {
        path: path.to_path_buf(),
        source,
    })
}
