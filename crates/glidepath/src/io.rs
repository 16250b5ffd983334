//! I/O utility functions

use std::fs;
use std::io;
use std::path::Path;

use color_eyre::eyre::{Context, Result};
use glidepath_core::{GlidepathConfig, PlanningRequest};
use serde::de::DeserializeOwned;

/// Write content to a file atomically using write-then-rename pattern.
///
/// The content is first written to a sibling temporary file, then renamed
/// over the target, so readers never see a partial report.
pub fn atomic_write(path: &Path, content: &str) -> io::Result<()> {
    let mut temp_name = path.file_name().unwrap_or_default().to_os_string();
    temp_name.push(".tmp");
    let temp_path = path.with_file_name(temp_name);

    fs::write(&temp_path, content)?;
    fs::rename(&temp_path, path)?;
    Ok(())
}

fn read_yaml<T: DeserializeOwned>(path: &Path, what: &str) -> Result<T> {
    let content = fs::read_to_string(path)
        .wrap_err_with(|| format!("failed to read {what} from {}", path.display()))?;
    serde_saphyr::from_str(&content)
        .wrap_err_with(|| format!("failed to parse {what} in {}", path.display()))
}

pub fn load_request(path: &Path) -> Result<PlanningRequest> {
    read_yaml(path, "planning request")
}

/// Load the configuration, or the defaults when no file is given
pub fn load_config(path: Option<&Path>) -> Result<GlidepathConfig> {
    match path {
        Some(path) => read_yaml(path, "configuration"),
        None => Ok(GlidepathConfig::default()),
    }
}
