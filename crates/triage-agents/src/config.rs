use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use tracing::{info, warn};

use crate::summary::SummaryStyle;

/// Top-level triage configuration, read from `triage.toml`.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct TriageConfig {
    /// How the batch summary is rendered.
    pub style: SummaryStyle,
    /// JSON array of incidents to process.
    pub incidents_path: PathBuf,
    /// Comma-separated topic vocabulary shared across runs.
    pub topics_path: PathBuf,
    /// How many incidents of the file to process per batch.
    pub limit: usize,
    /// Let the router and tool supervisor consult the oracle. Scoring
    /// always uses the oracle; decisions fall back to the deterministic
    /// rules when this is off or the oracle fails.
    pub oracle_decisions: bool,
    pub log_level: String,
    pub model: String,
    pub temperature: f64,
    pub oracle: OracleConfig,
}

impl Default for TriageConfig {
    fn default() -> Self {
        Self {
            style: SummaryStyle::Simple,
            incidents_path: PathBuf::from("data/incidents.json"),
            topics_path: PathBuf::from("data/topics.txt"),
            limit: 5,
            oracle_decisions: false,
            log_level: "info".into(),
            model: std::env::var("TRIAGE_MODEL").unwrap_or_else(|_| "gpt-4o-mini".into()),
            temperature: 0.5,
            oracle: OracleConfig::default(),
        }
    }
}

/// Oracle endpoint configuration. The API key is never stored in the file,
/// only the name of the environment variable holding it.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct OracleConfig {
    pub base_url: String,
    pub api_key_env: String,
    pub timeout_secs: u64,
}

impl Default for OracleConfig {
    fn default() -> Self {
        Self {
            base_url: std::env::var("TRIAGE_ORACLE_URL")
                .unwrap_or_else(|_| "https://api.openai.com/v1".into()),
            api_key_env: "OPENAI_API_KEY".into(),
            timeout_secs: 30,
        }
    }
}

impl OracleConfig {
    pub fn api_key(&self) -> Option<String> {
        std::env::var(&self.api_key_env).ok()
    }
}

impl TriageConfig {
    /// Loads the configuration, writing a default file first if none
    /// exists so the deployment has something to edit.
    pub fn load_or_init(path: &Path) -> Result<Self> {
        if path.exists() {
            let raw = std::fs::read_to_string(path)
                .with_context(|| format!("failed to read config {}", path.display()))?;
            let config: TriageConfig = toml::from_str(&raw)
                .with_context(|| format!("failed to parse config {}", path.display()))?;
            return Ok(config);
        }

        let config = TriageConfig::default();
        match toml::to_string_pretty(&config) {
            Ok(rendered) => {
                if let Err(err) = std::fs::write(path, rendered) {
                    warn!(path = %path.display(), error = %err, "could not write default config");
                } else {
                    info!(path = %path.display(), "wrote default config");
                }
            }
            Err(err) => warn!(error = %err, "could not render default config"),
        }
        Ok(config)
    }
}
