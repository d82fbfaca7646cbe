//! Incident file loading.

use std::path::Path;

use thiserror::Error;
use tracing::info;

use triage::Incident;

#[derive(Debug, Error)]
pub enum IncidentLoadError {
    #[error("could not read incident file {path}: {source}")]
    Read {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("could not parse incident file {path}: {source}")]
    Parse {
        path: String,
        #[source]
        source: serde_json::Error,
    },
}

/// Reads a JSON array of incidents from disk.
pub fn load_incidents(path: &Path) -> Result<Vec<Incident>, IncidentLoadError> {
    let raw = std::fs::read_to_string(path).map_err(|source| IncidentLoadError::Read {
        path: path.display().to_string(),
        source,
    })?;
    let incidents: Vec<Incident> =
        serde_json::from_str(&raw).map_err(|source| IncidentLoadError::Parse {
            path: path.display().to_string(),
            source,
        })?;
    info!(count = incidents.len(), path = %path.display(), "incidents loaded");
    Ok(incidents)
}
