//! Per-run artifact directories.

use crate::result::SimhuntResult;
use chrono::{DateTime, Utc};
use std::path::{Path, PathBuf};

/// Directory name for one run: `<playbook>-<YYYYmmdd-HHMMSS-fff>-<id>`
#[must_use]
pub fn run_dir_name(playbook: &str, at: DateTime<Utc>) -> String {
    let id = uuid::Uuid::new_v4().simple().to_string();
    format!("{playbook}-{}-{}", at.format("%Y%m%d-%H%M%S-%3f"), &id[..8])
}

/// Create a fresh run directory under `root`
pub async fn create_run_dir(root: &Path, playbook: &str) -> SimhuntResult<PathBuf> {
    let dir = root.join(run_dir_name(playbook, Utc::now()));
    tokio::fs::create_dir_all(&dir).await?;
    tracing::debug!(dir = %dir.display(), "created run directory");
    Ok(dir)
}
