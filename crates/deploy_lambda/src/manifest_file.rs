use std::fs;
use std::path::{Path, PathBuf};

use deploy_core::contract::RawManifest;
use thiserror::Error;

/// File names polld, in order, when no manifest path is given.
pub const DEFAULT_MANIFEST_FILES: [&str; 2] = ["manifest.toml", "manifest.json"];

#[derive(Debug, Error)]
pub enum ManifestFileError {
    #[error("no manifest found in {0} (looked for manifest.toml, manifest.json)")]
    NotFound(PathBuf),
    #[error("failed to read {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("failed to parse {path}: {message}")]
    Parse { path: PathBuf, message: String },
}

/// First default manifest file present in `directory`.
pub fn find_manifest(directory: &Path) -> Result<PathBuf, ManifestFileError> {
    DEFAULT_MANIFEST_FILES
        .iter()
        .map(|name| directory.join(name))
        .find(|candidate| candidate.is_file())
        .ok_or_else(|| ManifestFileError::NotFound(directory.to_path_buf()))
}

/// Reads a manifest from TOML, or from JSON when the extension is `.json`.
pub fn load_manifest(path: &Path) -> Result<RawManifest, ManifestFileError> {
    let text = fs::read_to_string(path).map_err(|source| ManifestFileError::Read {
        path: path.to_path_buf(),
        source,
    })?;

    let is_json = path
        .extension()
        .and_then(|extension| extension.to_str())
        .is_some_and(|extension| extension.eq_ignore_ascii_case("json"));

    let parsed = if is_json {
        serde_json::from_str(&text).map_err(|error| error.to_string())
    } else {
        toml::from_str(&text).map_err(|error| error.to_string())
    };
    parsed.map_err(|message| ManifestFileError::Parse {
        path: path.to_path_buf(),
        message,
    })
}

/// Name a manifest falls back to when it does not set one: the final
/// component of `directory`.
pub fn directory_name(directory: &Path) -> Option<String> {
    directory
        .file_name()
        .and_then(|name| name.to_str())
        .map(ToString::to_string)
}
