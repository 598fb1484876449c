//! Parameters of a single indexing job.

use anyhow::Context;
use serde::{Deserialize, Serialize};
use std::path::Path;

/// Input handed to the indexer by the upload pipeline, read from a JSON file.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JobParams {
    /// Project the uploaded version belongs to.
    pub project: String,
    /// Version identifier that just finished uploading.
    pub version: String,
    /// Upload completion time in epoch milliseconds.
    pub timestamp: i64,
    /// Replace the project permissions document even if one already exists.
    #[serde(default)]
    pub overwrite_permissions: bool,
    /// Permissions document to store for the project.
    pub permissions: serde_json::Value,
}

impl JobParams {
    /// Reads and parses the job parameters file.
    pub fn from_file(path: &Path) -> anyhow::Result<Self> {
        let raw = std::fs::read(path)
            .with_context(|| format!("reading job parameters from {}", path.display()))?;
        let params = serde_json::from_slice(&raw)
            .with_context(|| format!("parsing job parameters from {}", path.display()))?;
        Ok(params)
    }
}
